//! `pxc up` and `pxc down`: stack deployment and teardown.

use super::{load_stack, Context};
use crate::output;
use anyhow::Result;
use colored::Colorize;
use pxc_core::{
    BuilderConfig, DeployPlan, DeploymentResult, Orchestrator, OrchestratorConfig, TemplateBuilder,
};
use std::path::PathBuf;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "SERVICE")]
    name: String,
    #[tabled(rename = "CONTAINER")]
    container_id: String,
    #[tabled(rename = "TEMPLATE")]
    template: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "BUILD")]
    build: String,
}

fn orchestrator(ctx: &Context, project: &str, build_args: Vec<(String, String)>) -> Orchestrator {
    let pct = ctx.pct();
    let builder = TemplateBuilder::new(pct.clone(), BuilderConfig::from(&ctx.config));
    let mut config = OrchestratorConfig::new(project, &ctx.config);
    config.build_args.extend(build_args);
    Orchestrator::new(pct, builder, config)
}

/// Deploy a stack
pub async fn up(
    ctx: &Context,
    file: Option<PathBuf>,
    project_name: Option<String>,
    build_args: Vec<(String, String)>,
) -> Result<()> {
    let stack = load_stack(file, project_name)?;
    let plan = DeployPlan::new(&stack.manifest, &stack.project)?;

    println!(
        "{} Deploying {} service(s) for {}",
        "→".cyan().bold(),
        plan.services.len(),
        stack.manifest.display_name(&stack.project).bold()
    );
    println!();
    for service in &plan.services {
        println!("  {} {} {}", "•".dimmed(), service.name.bold(), service.source.dimmed());
    }
    println!();

    if ctx.dry_run {
        print!("{}", plan);
        println!();
    }

    let orchestrator = orchestrator(ctx, &stack.project, build_args);
    let spinner = output::spinner(
        "Building templates and starting containers (this may take a while)...",
        !ctx.verbose && !ctx.dry_run,
    );
    let outcome = orchestrator.up(&stack.manifest).await;
    spinner.finish_and_clear();

    match outcome {
        Ok(result) => {
            if ctx.dry_run {
                println!("{}", "Dry run complete, no containers were touched".dimmed());
                return Ok(());
            }
            println!(
                "{} Stack deployed: {} ({})",
                "✓".green().bold(),
                result.project.bold(),
                output::format_duration(result.duration).yellow()
            );
            println!();
            print_services(&result);
            output::print_warnings(&result.warnings);
            Ok(())
        }
        Err(failure) => {
            if !failure.result.services.is_empty() {
                println!("{} Stack deployment stopped", "✗".red().bold());
                println!();
                print_services(&failure.result);
                output::print_warnings(&failure.result.warnings);
            }
            Err(failure.into())
        }
    }
}

/// Tear a stack down
pub async fn down(
    ctx: &Context,
    file: Option<PathBuf>,
    project_name: Option<String>,
    remove_volumes: bool,
) -> Result<()> {
    let stack = load_stack(file, project_name)?;

    if ctx.dry_run {
        let plan = DeployPlan::new(&stack.manifest, &stack.project)?;
        println!("Teardown order for {}: {}", plan.project, plan.shutdown_order().join(" -> "));
        println!();
    }

    let orchestrator = orchestrator(ctx, &stack.project, Vec::new());
    let spinner = output::spinner(
        format!("Destroying stack '{}'...", stack.project),
        !ctx.verbose && !ctx.dry_run,
    );
    let report = orchestrator.down(&stack.manifest, remove_volumes).await;
    spinner.finish_and_clear();
    let report = report?;

    for service in &report.services {
        println!(
            "  {} {} {}",
            "•".dimmed(),
            service.bold(),
            orchestrator.container_id(service).to_string().dimmed()
        );
    }
    println!();
    output::print_warnings(&report.warnings);

    if report.warnings.is_empty() {
        println!("{} Stack removed: {}", "✓".green().bold(), stack.project.bold());
    } else {
        println!(
            "{} Stack removed with {} warning(s): {}",
            "⚠".yellow().bold(),
            report.warnings.len(),
            stack.project.bold()
        );
    }
    Ok(())
}

fn print_services(result: &DeploymentResult) {
    if result.services.is_empty() {
        return;
    }

    let rows: Vec<ServiceRow> = result
        .services
        .iter()
        .map(|s| ServiceRow {
            name: s.name.clone(),
            container_id: s.container_id.map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
            template: s.template.clone().unwrap_or_else(|| "-".into()),
            status: output::colorize_status(&s.status.to_string()),
            build: s
                .build_duration
                .map(output::format_duration)
                .unwrap_or_else(|| "-".into()),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
    println!();

    for service in result.services.iter().filter(|s| s.error.is_some()) {
        if let Some(error) = &service.error {
            println!("  {} {}: {}", "✗".red(), service.name.bold(), error);
        }
    }
}
