// Spreadsheet codecs (blocking; callers run them on the blocking pool)

use calamine::{open_workbook_auto, Reader};
use datajob_core::error::{AppError, Result};
use datajob_core::port::{Row, Spreadsheet};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::path::Path;

/// File formats recognised by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    Csv,
    Xlsx,
    Xls,
}

impl SpreadsheetFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" => Some(Self::Xlsx),
            "xls" => Some(Self::Xls),
            _ => None,
        }
    }

    pub fn can_write(&self) -> bool {
        matches!(self, Self::Csv | Self::Xlsx)
    }
}

fn unsupported(path: &Path) -> AppError {
    AppError::Storage(format!("Unsupported spreadsheet format: {}", path.display()))
}

fn xlsx_error(path: &Path, err: XlsxError) -> AppError {
    AppError::Storage(format!("XLSX write failed for {}: {}", path.display(), err))
}

/// Zip a header row with data cells; blank header columns are dropped and
/// short rows are padded with empty cells
fn keyed(headers: &[String], cells: impl Iterator<Item = String>) -> Row {
    headers
        .iter()
        .zip(cells.chain(std::iter::repeat(String::new())))
        .filter(|(header, _)| !header.is_empty())
        .map(|(header, cell)| (header.clone(), cell))
        .collect()
}

/// All data rows of the first sheet, keyed by trimmed header
pub fn read_rows(path: &Path) -> Result<Vec<Row>> {
    match SpreadsheetFormat::from_path(path) {
        Some(SpreadsheetFormat::Csv) => read_csv(path),
        Some(SpreadsheetFormat::Xlsx) | Some(SpreadsheetFormat::Xls) => read_workbook(path),
        None => Err(unsupported(path)),
    }
}

/// Blank lines keep their position as empty rows, matching the workbook reader
fn read_csv(path: &Path) -> Result<Vec<Row>> {
    let csv_error =
        |e: csv::Error| AppError::Storage(format!("CSV read failed for {}: {}", path.display(), e));

    let data = std::fs::read(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data.as_slice());

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    let mut record = csv::StringRecord::new();
    loop {
        let start = reader.position().byte() as usize;
        if !reader.read_record(&mut record).map_err(csv_error)? {
            break;
        }
        for _ in 0..skipped_blank_lines(&data, start) {
            rows.push(keyed(&headers, std::iter::empty()));
        }
        rows.push(keyed(&headers, record.iter().map(str::to_string)));
    }
    Ok(rows)
}

/// Empty lines between `start` and the next record (the csv reader drops them)
fn skipped_blank_lines(data: &[u8], start: usize) -> usize {
    let mut rest = data.get(start..).unwrap_or_default();
    // The LF of a CRLF terminator may be left for the next read
    if start > 0 && data.get(start - 1) == Some(&b'\r') && rest.first() == Some(&b'\n') {
        rest = &rest[1..];
    }
    rest.iter()
        .take_while(|b| matches!(b, b'\r' | b'\n'))
        .filter(|b| **b == b'\n')
        .count()
}

fn read_workbook(path: &Path) -> Result<Vec<Row>> {
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        AppError::Storage(format!("Cannot open workbook {}: {}", path.display(), e))
    })?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::Storage(format!("Workbook {} has no sheets", path.display())))?
        .map_err(|e| AppError::Storage(format!("Cannot read sheet in {}: {}", path.display(), e)))?;

    let mut lines = range.rows();
    let headers: Vec<String> = match lines.next() {
        Some(header) => header.iter().map(|c| c.to_string().trim().to_string()).collect(),
        None => return Ok(Vec::new()),
    };

    Ok(lines
        .map(|cells| keyed(&headers, cells.iter().map(|c| c.to_string())))
        .collect())
}

/// Write headers, rows, then a blank row and the footer lines
pub fn write(path: &Path, sheet: &Spreadsheet) -> Result<()> {
    match SpreadsheetFormat::from_path(path) {
        Some(SpreadsheetFormat::Csv) => write_csv(path, sheet),
        Some(SpreadsheetFormat::Xlsx) => write_xlsx(path, sheet),
        _ => Err(unsupported(path)),
    }
}

fn write_csv(path: &Path, sheet: &Spreadsheet) -> Result<()> {
    let csv_error =
        |e: csv::Error| AppError::Storage(format!("CSV write failed for {}: {}", path.display(), e));

    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)?;
    writer.write_record(&sheet.headers).map_err(csv_error)?;
    for row in &sheet.rows {
        writer.write_record(row).map_err(csv_error)?;
    }
    if !sheet.footer.is_empty() {
        writer.write_record([""]).map_err(csv_error)?;
        for line in &sheet.footer {
            writer.write_record([line]).map_err(csv_error)?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn write_xlsx(path: &Path, sheet: &Spreadsheet) -> Result<()> {
    let bold = Format::new().set_bold();
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col, header) in sheet.headers.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, header, &bold)
            .map_err(|e| xlsx_error(path, e))?;
    }
    for (idx, row) in sheet.rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            worksheet
                .write_string(idx as u32 + 1, col as u16, value)
                .map_err(|e| xlsx_error(path, e))?;
        }
    }

    // One blank row between data and footer
    let footer_start = sheet.rows.len() as u32 + 2;
    for (offset, line) in sheet.footer.iter().enumerate() {
        let row = footer_start + offset as u32;
        let written = if offset == 0 {
            worksheet.write_string_with_format(row, 0, line, &bold)
        } else {
            worksheet.write_string(row, 0, line)
        };
        written.map_err(|e| xlsx_error(path, e))?;
    }

    workbook.save(path).map_err(|e| xlsx_error(path, e))
}
