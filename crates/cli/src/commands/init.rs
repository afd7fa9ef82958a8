use std::path::Path;

use console::style;
use strata_core::{StrataConfig, DEFAULT_CONFIG_FILE};

pub fn run(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    StrataConfig::write_default(path, force)?;

    println!("{} Wrote {}", style("✓").green(), style(path.display()).bold());
    println!("   Set the database section (or DB_* variables), then run `strata create`.");
    Ok(())
}
