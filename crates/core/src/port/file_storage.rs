// File Storage Port
// Owns the lifecycle of uploaded inputs and generated outputs

use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;

/// One data row keyed by (trimmed, case-sensitive) column header
pub type Row = BTreeMap<String, String>;

/// Tabular content to be written as a spreadsheet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Spreadsheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Free-text lines appended after a blank row (summaries, notes)
    pub footer: Vec<String>,
}

/// Storage collaborator. Paths are relative to the storage root.
#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Read all data rows. The first row is the header and is not returned.
    async fn read_rows(&self, path: &str) -> Result<Vec<Row>>;

    /// Write `sheet` to `path`, creating parent directories. Format follows the extension.
    async fn write_spreadsheet(&self, path: &str, sheet: &Spreadsheet) -> Result<()>;

    async fn delete(&self, path: &str) -> Result<()>;

    /// Copy a local file into storage at `dest`. Returns bytes written.
    async fn store_from(&self, source: &Path, dest: &str) -> Result<u64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory storage: files are either row sets or written spreadsheets
    #[derive(Default)]
    pub struct InMemoryFileStorage {
        inputs: Mutex<HashMap<String, Vec<Row>>>,
        outputs: Mutex<HashMap<String, Spreadsheet>>,
        fail_writes: Mutex<bool>,
    }

    impl InMemoryFileStorage {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed an input file from a header line and data lines (comma separated)
        pub fn put_csv(&self, path: &str, header: &str, lines: &[&str]) {
            let headers: Vec<String> = header.split(',').map(|h| h.trim().to_string()).collect();
            let rows = lines
                .iter()
                .map(|line| {
                    let cells = split_quoted(line);
                    headers
                        .iter()
                        .cloned()
                        .zip(cells.into_iter().chain(std::iter::repeat(String::new())))
                        .collect::<Row>()
                })
                .collect();
            self.inputs.lock().unwrap().insert(path.to_string(), rows);
        }

        pub fn fail_writes(&self) {
            *self.fail_writes.lock().unwrap() = true;
        }

        pub fn written(&self, path: &str) -> Option<Spreadsheet> {
            self.outputs.lock().unwrap().get(path).cloned()
        }
    }

    /// Split on commas outside double quotes
    fn split_quoted(line: &str) -> Vec<String> {
        let mut cells = Vec::new();
        let mut current = String::new();
        let mut quoted = false;
        for ch in line.chars() {
            match ch {
                '"' => quoted = !quoted,
                ',' if !quoted => cells.push(std::mem::take(&mut current)),
                _ => current.push(ch),
            }
        }
        cells.push(current);
        cells
    }

    #[async_trait]
    impl FileStorage for InMemoryFileStorage {
        async fn exists(&self, path: &str) -> Result<bool> {
            Ok(self.inputs.lock().unwrap().contains_key(path)
                || self.outputs.lock().unwrap().contains_key(path))
        }

        async fn read_rows(&self, path: &str) -> Result<Vec<Row>> {
            self.inputs
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| AppError::Storage(format!("File not found: {}", path)))
        }

        async fn write_spreadsheet(&self, path: &str, sheet: &Spreadsheet) -> Result<()> {
            if *self.fail_writes.lock().unwrap() {
                return Err(AppError::Storage(format!("Disk full writing {}", path)));
            }
            self.outputs
                .lock()
                .unwrap()
                .insert(path.to_string(), sheet.clone());
            Ok(())
        }

        async fn delete(&self, path: &str) -> Result<()> {
            self.inputs.lock().unwrap().remove(path);
            self.outputs.lock().unwrap().remove(path);
            Ok(())
        }

        async fn store_from(&self, source: &Path, dest: &str) -> Result<u64> {
            let content = tokio::fs::read_to_string(source).await?;
            let mut lines = content.lines();
            let header = lines.next().unwrap_or_default().to_string();
            let data: Vec<&str> = lines.collect();
            self.put_csv(dest, &header, &data);
            Ok(content.len() as u64)
        }
    }
}
