use console::style;
use strata_core::StrataConfig;
use strata_migrate::{ChangeDescriptor, MigrationStore};

use super::sync::sync_models;

pub fn create(config: &StrataConfig, table: &str, columns: &[String]) -> anyhow::Result<()> {
    let store = MigrationStore::from_config(&config.migrations);
    let (descriptor, path) = store.create_table(table, columns)?;
    announce(&descriptor, &path);
    after_authoring(config, &store)
}

pub fn alter(config: &StrataConfig, table: &str, operations: &[String]) -> anyhow::Result<()> {
    let store = MigrationStore::from_config(&config.migrations);
    let (descriptor, path) = store.alter_table(table, operations)?;
    announce(&descriptor, &path);

    let manual = descriptor.manual_operations();
    if !manual.is_empty() {
        println!(
            "{} The down migration needs hand-written SQL for: {}",
            style("⚠").yellow(),
            manual.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        );
        println!("   Replace the `-- manual:` lines in {}", path.display());
    }
    after_authoring(config, &store)
}

fn announce(descriptor: &ChangeDescriptor, path: &std::path::Path) {
    println!(
        "{} Created migration {} ({})",
        style("✓").green(),
        style(&descriptor.name).bold(),
        path.display()
    );
}

fn after_authoring(config: &StrataConfig, store: &MigrationStore) -> anyhow::Result<()> {
    if config.models.generate {
        sync_models(config, store)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config(dir: &TempDir, generate: bool) -> StrataConfig {
        let mut config = StrataConfig::default();
        config.migrations.folder = dir.path().join("migrations");
        config.models.folder = dir.path().join("models");
        config.models.generate = generate;
        config
    }

    #[test]
    fn test_create_then_alter_regenerates_models() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, true);

        create(&config, "users", &["name:varchar(255)".to_string()]).unwrap();
        alter(&config, "users", &["add".to_string(), "age:integer".to_string()]).unwrap();

        let store = MigrationStore::from_config(&config.migrations);
        assert_eq!(store.list().unwrap().len(), 2);
        let model = fs::read_to_string(dir.path().join("models").join("users.rs")).unwrap();
        assert!(model.contains("pub age: Option<i32>,"));
    }

    #[test]
    fn test_generation_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, false);

        create(&config, "users", &["name".to_string()]).unwrap();
        assert!(!dir.path().join("models").exists());
    }

    #[test]
    fn test_bad_token_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, true);

        assert!(create(&config, "users", &["age:integerish".to_string()]).is_err());
        assert!(MigrationStore::from_config(&config.migrations).list().unwrap().is_empty());
    }
}
