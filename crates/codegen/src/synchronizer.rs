//! Model Synchronizer - regenerates the model folder from the migrations

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use strata_core::{is_sql_identifier, ModelsConfig};
use strata_migrate::{replay, ChangeDescriptor, MigrateResult, MirrorSync, ModelDescriptor, SyncReport};

use crate::error::{CodegenError, CodegenResult};
use crate::templates::{ModelContext, ModelRenderer};
use crate::writer::CodeWriter;

const INDEX_FILE: &str = "mod.rs";

/// Writes one `<table>.rs` per table plus a `mod.rs` index
pub struct ModelSynchronizer {
    folder: PathBuf,
    base_trait: String,
    writer: CodeWriter,
}

impl ModelSynchronizer {
    pub fn new(folder: impl Into<PathBuf>, base_trait: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            base_trait: base_trait.into(),
            writer: CodeWriter::new(),
        }
    }

    pub fn from_config(config: &ModelsConfig) -> Self {
        Self::new(&config.folder, &config.base_trait)
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Overwrite every model file and the index, then remove generated files
    /// for tables that no longer exist
    pub fn sync_models(&self, models: &[ModelDescriptor]) -> CodegenResult<SyncReport> {
        if !is_sql_identifier(&self.base_trait) {
            return Err(CodegenError::InvalidName {
                what: "the model base trait",
                value: self.base_trait.clone(),
            });
        }

        let renderer = ModelRenderer::new()?;
        let contexts: Vec<ModelContext> = models
            .iter()
            .map(|model| ModelContext::new(model, &self.base_trait))
            .collect();

        let mut report = SyncReport::default();
        for context in &contexts {
            let path = self.folder.join(context.file_name());
            let source = renderer.render_model(context)?;
            if self.writer.write_if_changed(&path, &source)? {
                tracing::debug!(table = %context.table_name, path = %path.display(), "Wrote model");
            }
            report.tables.push(context.table_name.clone());
            report.written.push(path);
        }

        let index = self.folder.join(INDEX_FILE);
        let source = renderer.render_index(&self.base_trait, &contexts)?;
        self.writer.write_if_changed(&index, &source)?;
        report.written.push(index);

        let keep: HashSet<PathBuf> = report.written.iter().cloned().collect();
        for removed in self.writer.remove_stale(&self.folder, &keep)? {
            tracing::info!(path = %removed.display(), "Removed stale model");
        }

        tracing::info!(
            tables = report.tables.len(),
            folder = %self.folder.display(),
            "Models synchronized"
        );
        Ok(report)
    }
}

impl MirrorSync for ModelSynchronizer {
    fn sync(&self, descriptors: &[ChangeDescriptor]) -> MigrateResult<SyncReport> {
        Ok(self.sync_models(&replay(descriptors))?)
    }
}
