use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CodegenError, CodegenResult};
use crate::templates::GENERATED_MARKER;

pub struct CodeWriter;

impl CodeWriter {
    pub fn new() -> Self {
        Self
    }

    /// Write `content` to `path` unless it already holds exactly that.
    /// Returns whether the file was written.
    pub fn write_if_changed(&self, path: &Path, content: &str) -> CodegenResult<bool> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CodegenError::io(parent, e))?;
        }

        if path.exists() {
            let existing = fs::read_to_string(path).map_err(|e| CodegenError::io(path, e))?;
            if existing == content {
                return Ok(false);
            }
        }

        fs::write(path, content).map_err(|e| CodegenError::io(path, e))?;
        Ok(true)
    }

    /// Delete generated `.rs` files in `folder` that are not in `keep`.
    /// Files without the generated marker are left alone.
    pub fn remove_stale(&self, folder: &Path, keep: &HashSet<PathBuf>) -> CodegenResult<Vec<PathBuf>> {
        if !folder.exists() {
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        let entries = fs::read_dir(folder).map_err(|e| CodegenError::io(folder, e))?;
        for entry in entries {
            let path = entry.map_err(|e| CodegenError::io(folder, e))?.path();
            if keep.contains(&path) || !path.is_file() || path.extension().map_or(true, |ext| ext != "rs") {
                continue;
            }
            let content = fs::read_to_string(&path).map_err(|e| CodegenError::io(&path, e))?;
            if content.contains(GENERATED_MARKER) {
                fs::remove_file(&path).map_err(|e| CodegenError::io(&path, e))?;
                removed.push(path);
            }
        }
        Ok(removed)
    }
}

impl Default for CodeWriter {
    fn default() -> Self {
        Self::new()
    }
}
