// Local-disk FileStorage Implementation

use crate::spreadsheet::{self, SpreadsheetFormat};
use async_trait::async_trait;
use datajob_core::error::{AppError, Result};
use datajob_core::port::{FileStorage, Row, Spreadsheet};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Files live under `root`; storage paths are relative to it
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a storage path. Rejects absolute paths and `..`.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || escapes {
            return Err(AppError::Storage(format!("Invalid storage path: {}", path)));
        }
        Ok(self.root.join(relative))
    }

    async fn ensure_parent(&self, target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("Blocking file task failed: {}", e)))?
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn exists(&self, path: &str) -> Result<bool> {
        let target = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&target).await?)
    }

    async fn read_rows(&self, path: &str) -> Result<Vec<Row>> {
        let target = self.resolve(path)?;
        let rows = blocking(move || spreadsheet::read_rows(&target)).await?;
        debug!(path, rows = rows.len(), "Spreadsheet read");
        Ok(rows)
    }

    async fn write_spreadsheet(&self, path: &str, sheet: &Spreadsheet) -> Result<()> {
        let target = self.resolve(path)?;
        match SpreadsheetFormat::from_path(&target) {
            Some(format) if format.can_write() => {}
            _ => {
                return Err(AppError::Storage(format!(
                    "Cannot write spreadsheet format of {}",
                    path
                )))
            }
        }
        self.ensure_parent(&target).await?;

        let sheet = sheet.clone();
        blocking(move || spreadsheet::write(&target, &sheet)).await?;
        info!(path, "Spreadsheet written");
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn store_from(&self, source: &Path, dest: &str) -> Result<u64> {
        let target = self.resolve(dest)?;
        self.ensure_parent(&target).await?;
        let bytes = tokio::fs::copy(source, &target).await?;
        info!(source = %source.display(), dest, bytes, "File stored");
        Ok(bytes)
    }
}
