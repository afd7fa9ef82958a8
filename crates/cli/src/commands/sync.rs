use console::style;
use strata_codegen::ModelSynchronizer;
use strata_core::StrataConfig;
use strata_migrate::{MigrationStore, MirrorSync};

/// `strata sync` regenerates regardless of `models.generate`
pub fn run(config: &StrataConfig) -> anyhow::Result<()> {
    let store = MigrationStore::from_config(&config.migrations);
    sync_models(config, &store)
}

pub fn sync_models(config: &StrataConfig, store: &MigrationStore) -> anyhow::Result<()> {
    let synchronizer = ModelSynchronizer::from_config(&config.models);
    let report = synchronizer.sync(&store.list()?)?;

    println!(
        "{} Synchronized {} model(s) in {}",
        style("✓").green(),
        report.tables.len(),
        style(synchronizer.folder().display()).bold()
    );
    Ok(())
}
