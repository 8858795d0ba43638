//! `pxc build` command
//!
//! Builds a container template from an LXCfile and prints where to find it.

use super::Context;
use crate::output;
use anyhow::{Context as _, Result};
use colored::Colorize;
use pxc_core::{loader, BuildPlan, BuilderConfig, TemplateBuilder};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Builds a template from a build manifest.
///
/// # Arguments
/// * `file` - Path to the LXCfile, discovered in the working directory if absent
/// * `tag` - Template name, defaults to `metadata.name[:version]`
/// * `build_args` - Build arguments as key-value pairs
pub async fn build(
    ctx: &Context,
    file: Option<PathBuf>,
    tag: Option<String>,
    build_args: Vec<(String, String)>,
) -> Result<()> {
    let path = file.unwrap_or_else(|| loader::default_build_file(Path::new(".")));
    let manifest = loader::load_build_manifest(&path)
        .with_context(|| format!("Failed to load build manifest {}", path.display()))?;

    let template_name = tag.unwrap_or_else(|| manifest.template_name());
    let args: BTreeMap<String, String> = build_args.into_iter().collect();

    println!(
        "{} Building template {} from {}",
        "→".cyan().bold(),
        template_name.green(),
        manifest.base_image.cyan()
    );
    println!(
        "  {} setup steps, {} cleanup steps",
        manifest.setup_steps.len().to_string().yellow(),
        manifest.cleanup_steps.len().to_string().yellow()
    );
    println!();

    if ctx.dry_run {
        print!("{}", BuildPlan::new(&manifest, &template_name));
        println!();
    }

    let builder = TemplateBuilder::new(ctx.pct(), BuilderConfig::from(&ctx.config));
    let spinner = output::spinner(
        "Building template (this may take a while)...",
        !ctx.verbose && !ctx.dry_run,
    );
    let result = builder.build(&manifest, &template_name, &args).await;
    spinner.finish_and_clear();
    let result = result?;

    if ctx.dry_run {
        println!("{}", "Dry run complete, no containers were touched".dimmed());
        return Ok(());
    }

    println!("{}", "✓ Template built successfully!".green().bold());
    println!();
    println!("  Template:    {}", result.template_name.green());
    println!("  Container:   {}", result.template_reference.cyan());
    println!("  Steps:       {}", result.executed_steps.len());
    println!("  Duration:    {}", output::format_duration(result.duration).yellow());
    println!();
    output::print_warnings(&result.warnings);

    println!(
        "  Use it with: {}",
        format!("template: \"{}\"", result.template_reference).cyan()
    );

    Ok(())
}
