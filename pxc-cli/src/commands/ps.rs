//! `pxc ps` command

use super::{load_stack, Context};
use crate::output;
use anyhow::{Context as _, Result};
use pxc_core::loader;
use pxc_core::orchestrator::service_container_id;
use pxc_core::pct::ContainerInfo;
use std::collections::BTreeMap;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "VMID")]
    vmid: u32,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "SERVICE")]
    service: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "LOCK")]
    lock: String,
}

/// A `--filter key=value` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Exact status match.
    Status(String),
    /// Substring of the container name.
    Name(String),
}

impl Filter {
    fn matches(&self, container: &ContainerInfo) -> bool {
        match self {
            Filter::Status(status) => container.status == *status,
            Filter::Name(name) => container.name.contains(name.as_str()),
        }
    }
}

/// Parse a `--filter` argument.
pub fn parse_filter(s: &str) -> std::result::Result<Filter, String> {
    match s.split_once('=') {
        Some(("status", value)) => Ok(Filter::Status(value.to_string())),
        Some(("name", value)) => Ok(Filter::Name(value.to_string())),
        Some((key, _)) => Err(format!("Unsupported filter '{}' (expected status or name)", key)),
        None => Err(format!("Invalid filter format: {} (expected key=value)", s)),
    }
}

/// Options for `pxc ps`.
#[derive(Debug, Default)]
pub struct PsOptions {
    pub all: bool,
    pub quiet: bool,
    pub project_name: Option<String>,
    pub filters: Vec<Filter>,
    pub format: Option<String>,
}

/// List containers, limited to the current stack unless `all` is set or no
/// stack file is present.
pub async fn ps(ctx: &Context, options: PsOptions) -> Result<()> {
    let services = if options.all || !loader::default_stack_file(Path::new(".")).is_file() {
        None
    } else {
        let stack = load_stack(None, options.project_name)?;
        Some(stack_services(&stack.project, stack.manifest.services.keys()))
    };

    let containers = ctx.pct().list().await.context("Failed to list containers")?;
    let selected = select(containers, services.as_ref(), &options.filters);

    if options.quiet {
        for (container, _) in &selected {
            println!("{}", container.vmid);
        }
        return Ok(());
    }

    if let Some(format) = &options.format {
        for (container, service) in &selected {
            println!("{}", render_format(format, container, service));
        }
        return Ok(());
    }

    if selected.is_empty() {
        println!("No containers found");
        return Ok(());
    }

    let mut table = Table::new(rows(selected));
    table.with(Style::modern());
    println!("{}", table);

    Ok(())
}

/// Container id to service name for every service of a project.
fn stack_services<'a>(
    project: &str,
    names: impl Iterator<Item = &'a String>,
) -> BTreeMap<u32, String> {
    names.map(|name| (service_container_id(project, name), name.clone())).collect()
}

/// Containers that belong to the stack (when given) and match every filter,
/// paired with their service name.
fn select(
    containers: Vec<ContainerInfo>,
    services: Option<&BTreeMap<u32, String>>,
    filters: &[Filter],
) -> Vec<(ContainerInfo, String)> {
    containers
        .into_iter()
        .filter(|c| filters.iter().all(|f| f.matches(c)))
        .filter_map(|c| {
            let service = match services {
                Some(services) => services.get(&c.vmid)?.clone(),
                None => "-".to_string(),
            };
            Some((c, service))
        })
        .collect()
}

fn rows(selected: Vec<(ContainerInfo, String)>) -> Vec<ContainerRow> {
    selected
        .into_iter()
        .map(|(c, service)| ContainerRow {
            vmid: c.vmid,
            status: output::colorize_status(&c.status),
            lock: c.lock.unwrap_or_else(|| "-".to_string()),
            name: c.name,
            service,
        })
        .collect()
}

/// Substitute `{{.VMID}}`, `{{.Name}}`, `{{.Status}}`, `{{.Lock}}` and
/// `{{.Service}}`. `\t` and `\n` escapes are expanded and a leading `table `
/// is dropped.
fn render_format(template: &str, container: &ContainerInfo, service: &str) -> String {
    let line = template
        .replace("{{.VMID}}", &container.vmid.to_string())
        .replace("{{.Name}}", &container.name)
        .replace("{{.Status}}", &container.status)
        .replace("{{.Lock}}", container.lock.as_deref().unwrap_or(""))
        .replace("{{.Service}}", service)
        .replace("\\t", "\t")
        .replace("\\n", "\n");
    match line.strip_prefix("table ") {
        Some(rest) => rest.to_string(),
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(vmid: u32, status: &str, name: &str) -> ContainerInfo {
        ContainerInfo { vmid, status: status.into(), lock: None, name: name.into() }
    }

    #[test]
    fn test_select_limited_to_stack() {
        let names = vec!["web".to_string(), "db".to_string()];
        let services = stack_services("shop", names.iter());
        let web = service_container_id("shop", "web");
        let containers =
            vec![container(web, "running", "shop-web"), container(9999, "running", "other")];

        let selected = select(containers, Some(&services), &[]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].0.vmid, web);
        assert_eq!(selected[0].1, "web");

        let rows = rows(selected);
        assert_eq!(rows[0].lock, "-");
    }

    #[test]
    fn test_select_unfiltered() {
        let all = select(
            vec![container(100, "running", "a"), container(101, "stopped", "b")],
            None,
            &[],
        );
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].1, "-");
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!(parse_filter("status=running").unwrap(), Filter::Status("running".into()));
        assert_eq!(parse_filter("name=shop").unwrap(), Filter::Name("shop".into()));
        assert!(parse_filter("tag=web").is_err());
        assert!(parse_filter("status").is_err());
    }

    #[test]
    fn test_filters_combine() {
        let containers = vec![
            container(100, "running", "shop-web"),
            container(101, "stopped", "shop-db"),
            container(102, "running", "blog"),
        ];
        let filters = vec![Filter::Status("running".into()), Filter::Name("shop".into())];

        let selected = select(containers, None, &filters);
        let ids: Vec<u32> = selected.iter().map(|(c, _)| c.vmid).collect();
        assert_eq!(ids, vec![100]);
    }

    #[test]
    fn test_render_format() {
        let c = container(205, "running", "shop-web");
        assert_eq!(
            render_format("table {{.VMID}}\\t{{.Name}}\\t{{.Status}}", &c, "web"),
            "205\tshop-web\trunning"
        );
        assert_eq!(render_format("{{.Service}}={{.Lock}}", &c, "web"), "web=");
    }
}
