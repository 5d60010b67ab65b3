//! Command-line front end for the unified requirements engine.
//!
//! Usage:
//!   compliance-unify frameworks --dump backup.sql
//!   compliance-unify categories
//!   compliance-unify generate --dump backup.sql --framework iso-iec-27001-2022 --framework cis-controls-v8:2
//!   compliance-unify invalidate --category access_control

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prettytable::{Table, row};
use tracing::info;
use tracing_subscriber::EnvFilter;

use compliance_unify::clients::RateLimiter;
use compliance_unify::config::RuntimeConfig;
use compliance_unify::source::dump::load_dump;
use compliance_unify::source::{InMemorySource, RequirementSource, StaticTaxonomy, TaxonomySource};
use compliance_unify::{CategoryId, CategoryOutcome, Config, Engine, FrameworkSelection};

#[derive(Parser)]
#[command(name = "compliance-unify")]
#[command(
    about = "Unify compliance requirements across frameworks into canonical categories",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the frameworks found in a database dump
    Frameworks {
        #[arg(long)]
        dump: PathBuf,
    },
    /// List the canonical categories
    Categories,
    /// Generate unified content for a framework selection
    Generate {
        #[arg(long)]
        dump: PathBuf,
        /// Framework to include, as `id` or `id:tier`; repeatable
        #[arg(long = "framework", short = 'f')]
        frameworks: Vec<String>,
        /// Skip the generation API and use the deterministic fallback
        #[arg(long)]
        no_ai: bool,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drop cached results for one category
    Invalidate {
        #[arg(long)]
        category: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(RuntimeConfig::default().log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load().context("Failed to load configuration")?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Frameworks { dump } => list_frameworks(&dump),
        Commands::Categories => {
            list_categories();
            Ok(())
        }
        Commands::Generate {
            dump,
            frameworks,
            no_ai,
            json,
        } => {
            if no_ai {
                config.ai.enabled = false;
            }
            generate(&config, &dump, &frameworks, json).await
        }
        Commands::Invalidate { category } => invalidate(&config, &category),
    }
}

fn list_frameworks(dump: &Path) -> Result<()> {
    let source =
        load_dump(dump).with_context(|| format!("Failed to load dump {}", dump.display()))?;
    let mut table = Table::new();
    table.add_row(row!["Id", "Name", "Tiers", "Requirements"]);
    for framework in source.frameworks() {
        let count = source.list_requirements(&framework.id, None)?.len();
        let tiers = if framework.tiers.is_empty() {
            "-".to_string()
        } else {
            framework.tiers.join(", ")
        };
        table.add_row(row![framework.id, framework.name, tiers, count]);
    }
    table.printstd();
    Ok(())
}

fn list_categories() {
    let mut table = Table::new();
    table.add_row(row!["Id", "Name", "Keywords"]);
    for category in StaticTaxonomy::default().list_categories() {
        table.add_row(row![category.id, category.name, category.keywords.len()]);
    }
    table.printstd();
}

async fn generate(config: &Config, dump: &Path, specs: &[String], json: bool) -> Result<()> {
    let source =
        load_dump(dump).with_context(|| format!("Failed to load dump {}", dump.display()))?;
    let selection = FrameworkSelection::parse_specs(specs)?;
    let limiter = RateLimiter::new(config.ai.min_interval());
    let engine = Engine::from_config(
        config,
        Arc::new(source),
        &StaticTaxonomy::default(),
        limiter,
    )?;

    let generation = engine.generate(&selection).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&generation)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.add_row(row![
        "Category",
        "Input",
        "Retained",
        "Dedup %",
        "Method",
        "Cached",
        "Frameworks"
    ]);
    for outcome in &generation.categories {
        match outcome {
            CategoryOutcome::Ready(content) => {
                let stats = &content.statistics;
                let frameworks = content
                    .framework_references
                    .iter()
                    .map(|r| r.framework.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                let method = stats
                    .method
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let cached = if stats.from_cache { "yes" } else { "no" };
                table.add_row(row![
                    content.category.name,
                    stats.input_count,
                    stats.retained_count,
                    format!("{:.0}", stats.dedup_rate * 100.0),
                    method,
                    cached,
                    frameworks
                ]);
            }
            CategoryOutcome::Fatal { category, .. } => {
                table.add_row(row![category.name, "-", "-", "-", "FATAL", "-", "-"]);
            }
        }
    }
    table.printstd();

    for outcome in &generation.categories {
        if let Some(text) = outcome.content().and_then(|c| c.text()) {
            println!("\n== {} ==\n{}", outcome.category().name, text);
        }
        if let Some(err) = outcome.error() {
            eprintln!("\n== {} ==\n{}", outcome.category().name, err);
        }
    }
    if !generation.unmapped.is_empty() {
        eprintln!("\n{} requirement(s) matched no category:", generation.unmapped.len());
        for citation in &generation.unmapped {
            eprintln!("  {}", citation);
        }
    }
    Ok(())
}

fn invalidate(config: &Config, category: &str) -> Result<()> {
    let mut config = config.clone();
    config.ai.enabled = false;
    let engine = Engine::from_config(
        &config,
        Arc::new(InMemorySource::default()),
        &StaticTaxonomy::default(),
        RateLimiter::unlimited(),
    )?;
    let id = CategoryId::new(category);
    if !engine.categories().iter().any(|c| c.id == id) {
        anyhow::bail!("Unknown category '{}'", category);
    }
    let removed = engine.invalidate_category(&id);
    info!(category, removed, "invalidation complete");
    println!("Removed {} cached entries for {}", removed, category);
    Ok(())
}
