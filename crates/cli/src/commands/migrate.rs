use std::sync::Arc;

use anyhow::Context;
use console::style;
use strata_codegen::ModelSynchronizer;
use strata_core::StrataConfig;
use strata_migrate::{
    BatchReport, Direction, MigrateError, MigrationManager, MigrationStatus, MigrationStore,
    PartialRollback, PlanOutcome, PostgresBackend, StatusRow,
};

async fn manager(config: &StrataConfig) -> anyhow::Result<MigrationManager> {
    config.database.validate()?;
    tracing::debug!(target_db = %config.database.display_target(), "Connecting");
    let backend = PostgresBackend::connect(&config.database, &config.migrations.table)
        .await
        .with_context(|| format!("Could not connect to {}", config.database.display_target()))?;

    let store = MigrationStore::from_config(&config.migrations);
    let mut manager = MigrationManager::new(store, Arc::new(backend));
    if config.models.generate {
        manager = manager.with_mirror(Box::new(ModelSynchronizer::from_config(&config.models)));
    }
    Ok(manager)
}

pub async fn up(config: &StrataConfig) -> anyhow::Result<()> {
    let mut manager = manager(config).await?;
    match manager.up().await {
        Ok(PlanOutcome::NothingToDo) => println!("Nothing to migrate."),
        Ok(PlanOutcome::Executed(report)) => print_batch(&report),
        Err(err) => return Err(halted(err)),
    }
    Ok(())
}

pub async fn down(config: &StrataConfig) -> anyhow::Result<()> {
    let mut manager = manager(config).await?;
    match manager.down().await {
        Ok(PlanOutcome::NothingToDo) => println!("Nothing to roll back."),
        Ok(PlanOutcome::Executed(report)) => print_batch(&report),
        Err(err) => return Err(halted(err)),
    }
    Ok(())
}

pub async fn run(config: &StrataConfig, name: &str, direction: Direction) -> anyhow::Result<()> {
    let mut manager = manager(config).await?;
    let report = manager.run(name, direction).await?;

    match report.batch {
        Some(batch) => println!(
            "{} {} {} (batch {})",
            style("✓").green(),
            verb(direction),
            report.migration,
            batch
        ),
        None => println!("{} {} {}", style("✓").green(), verb(direction), report.migration),
    }
    if let Some(partial) = &report.partial_rollback {
        print_partial(partial);
    }
    Ok(())
}

pub async fn status(config: &StrataConfig, json: bool) -> anyhow::Result<()> {
    let manager = manager(config).await?;
    let rows = manager.status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("No migrations found in {}", manager.store().folder().display());
    } else {
        print!("{}", status_table(&rows));
    }
    Ok(())
}

fn verb(direction: Direction) -> &'static str {
    match direction {
        Direction::Up => "Applied",
        Direction::Down => "Rolled back",
    }
}

fn print_batch(report: &BatchReport) {
    for name in &report.completed {
        println!("  {} {}", style("✓").green(), name);
    }
    println!(
        "{} {} {} migration(s) in batch {}",
        style("✓").green(),
        verb(report.direction),
        report.completed.len(),
        report.batch
    );
    for partial in &report.partial_rollbacks {
        print_partial(partial);
    }
}

fn print_partial(partial: &PartialRollback) {
    println!(
        "{} {} left unreversed: {}",
        style("⚠").yellow(),
        partial.migration,
        partial.unreversed.join(", ")
    );
}

/// Print what completed before a failure, then hand the error back
fn halted(err: MigrateError) -> anyhow::Error {
    match &err {
        MigrateError::BatchHalted { failed, report, .. } => {
            for name in &report.completed {
                println!("  {} {}", style("✓").green(), name);
            }
            eprintln!("  {} {}", style("✗").red(), failed);
            for partial in &report.partial_rollbacks {
                print_partial(partial);
            }
        }
        MigrateError::SyncFailed { report, .. } => {
            print_batch(report);
            eprintln!("  {} model sync failed; run `strata sync` once fixed", style("✗").red());
        }
        _ => {}
    }
    err.into()
}

fn status_table(rows: &[StatusRow]) -> String {
    let name_width = rows
        .iter()
        .map(|row| row.name.len())
        .max()
        .unwrap_or(0)
        .max("Migration".len());
    let table_width = rows
        .iter()
        .map(|row| row.table_name.len())
        .max()
        .unwrap_or(0)
        .max("Table".len());

    let mut out = format!(
        "{:<name_width$}  {:<table_width$}  {:<7}  {:>5}  {}\n",
        "Migration", "Table", "Status", "Batch", "Applied At"
    );
    for row in rows {
        let (state, batch, applied_at) = match &row.status {
            MigrationStatus::Applied { applied_at, batch } => (
                "applied",
                batch.to_string(),
                applied_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            ),
            MigrationStatus::Pending => ("pending", "-".to_string(), "-".to_string()),
        };
        out.push_str(&format!(
            "{:<name_width$}  {:<table_width$}  {:<7}  {:>5}  {}\n",
            row.name, row.table_name, state, batch, applied_at
        ));
    }
    out
}
