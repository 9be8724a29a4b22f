// DataJob Infrastructure - Local File Storage Adapter
// Implements: FileStorage (CSV, XLSX, XLS)

mod local_storage;
mod spreadsheet;

pub use local_storage::LocalFileStorage;
pub use spreadsheet::SpreadsheetFormat;
