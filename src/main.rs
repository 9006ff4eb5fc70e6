use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use material_ledger::{
    config::{self, AppConfig},
    db,
    services::ServiceFactory,
};

#[derive(Parser)]
#[command(name = "material-ledger", version, about = "Material stock ledger operations")]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Print aggregate stock totals and incoming PO quantity
    Summary {
        /// Print the category / grade / variant / batch tree instead
        #[arg(long)]
        tree: bool,
    },
    /// Replay every batch ledger and report counter drift
    Audit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    let pool = db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to the stock database")?;
    db::check_connection(&pool)
        .await
        .context("stock database is not answering")?;

    if matches!(cli.command, Commands::Migrate) {
        db::run_migrations(&pool).await.context("migration failed")?;
        info!("Migrations applied");
        return Ok(());
    }
    if cfg.auto_migrate {
        db::run_migrations(&pool).await.context("migration failed")?;
    }

    let factory = ServiceFactory::from_config(Arc::new(pool), &cfg);
    match cli.command {
        Commands::Migrate => Ok(()),
        Commands::Summary { tree } => run_summary(&factory, tree, cli.json).await,
        Commands::Audit => run_audit(&factory, &cfg, cli.json).await,
    }
}

async fn run_summary(factory: &ServiceFactory, tree: bool, json: bool) -> Result<()> {
    let inventory = factory.inventory();
    if tree {
        let categories = inventory.inventory_tree().await?;
        if json {
            return print_json(&categories);
        }
        for category in &categories {
            println!("{}", category.name);
            for grade in &category.grades {
                println!("  {}", grade.grade);
                for variant in &grade.variants {
                    println!(
                        "    {} {} • available {} {} • {} batches",
                        variant.sku,
                        variant.name,
                        variant.totals.available,
                        variant.unit_of_measure,
                        variant.batches.len()
                    );
                }
            }
        }
        return Ok(());
    }

    let summary = inventory.inventory_summary().await?;
    if json {
        return print_json(&summary);
    }
    println!(
        "{} variants • {} batches",
        summary.variant_count, summary.batch_count
    );
    println!(
        "received {} • available {} • reserved {} • consumed {} • held {}",
        summary.received, summary.available, summary.reserved, summary.consumed, summary.held
    );
    println!("incoming on open POs {}", summary.incoming_ordered);
    Ok(())
}

async fn run_audit(factory: &ServiceFactory, cfg: &AppConfig, json: bool) -> Result<()> {
    let report = factory.stock_batches().audit_all().await?;
    if json {
        print_json(&report)?;
    } else {
        for finding in &report.findings {
            println!(
                "- batch {} ({}) • stored {:?} • ledger {:?}",
                finding.batch_id, finding.batch_number, finding.stored, finding.replayed
            );
        }
        println!(
            "{} batches checked, {} with drift",
            report.batches_checked,
            report.findings.len()
        );
    }

    if !report.is_clean() {
        warn!(environment = %cfg.environment, "Ledger audit found drift");
        bail!("ledger drift in {} batches", report.findings.len());
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
