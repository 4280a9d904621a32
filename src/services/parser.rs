use std::collections::HashMap;
use std::io::Cursor;

use bytes::Bytes;
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use smallvec::SmallVec;

use super::text::{cell_to_string, is_empty_cell};
use crate::error::AppError;
use crate::models::{ColumnMetadata, DataType, SheetMetadata, SAMPLE_VALUES};

/// Rows scanned when guessing the header position.
const HEADER_SCAN_ROWS: usize = 5;
/// Data rows sampled per column for type inference. A bounded window
/// keeps parse cost flat on very large sheets; `non_empty_count` is an
/// estimate over this window, not a full-column count.
const TYPE_SAMPLE_ROWS: usize = 50;

/// Column values for one sheet, keyed by header text. Row alignment is
/// preserved: index i across all columns reconstructs data row i+1.
pub type SheetData = HashMap<String, Vec<Data>>;

/// Structural first pass over a workbook: header detection, per-column
/// type inference, then bulk extraction against the inferred metadata.
/// Both passes are pure over the input bytes; the async wrappers move
/// the CPU-bound scan off the request-serving runtime.
pub struct WorkbookParser;

impl WorkbookParser {
    pub async fn infer_metadata(&self, file_bytes: Bytes) -> Result<Vec<SheetMetadata>, AppError> {
        tokio::task::spawn_blocking(move || infer_metadata_sync(&file_bytes)).await?
    }

    pub async fn extract_data(
        &self,
        metadata: &[SheetMetadata],
        file_bytes: Bytes,
    ) -> Result<HashMap<String, SheetData>, AppError> {
        let metadata = metadata.to_vec();
        tokio::task::spawn_blocking(move || extract_data_sync(&metadata, &file_bytes)).await?
    }
}

/// Read sheet structure for every sheet holding data. Sheets with at
/// most one physical row (header only or empty) are dropped here and
/// never reach the analyzer or chunker. Workbook order is preserved.
pub fn infer_metadata_sync(file_bytes: &Bytes) -> Result<Vec<SheetMetadata>, AppError> {
    let cursor = Cursor::new(file_bytes.clone());
    let mut workbook: Xlsx<_> = open_workbook_from_rs(cursor).map_err(|e| {
        tracing::error!("Failed to open workbook: {}", e);
        AppError::InvalidFormat(format!("not a readable .xlsx workbook: {}", e))
    })?;

    let sheet_names = workbook.sheet_names().to_vec();
    tracing::info!("Workbook opened with {} sheets", sheet_names.len());

    let mut all_metadata = Vec::new();
    for sheet_name in &sheet_names {
        let range = workbook.worksheet_range(sheet_name).map_err(|e| {
            AppError::ParseFailure(format!("failed to read sheet '{}': {}", sheet_name, e))
        })?;
        // The used range is anchored at the first populated cell, so
        // leading blank rows and columns shift it. start() restores
        // absolute sheet coordinates.
        let (start_row, start_col) = range
            .start()
            .map_or((0, 0), |(r, c)| (r as usize, c as usize));
        let rows: Vec<&[Data]> = range.rows().collect();
        if rows.len() <= 1 {
            tracing::debug!("Skipping sheet '{}': no data rows", sheet_name);
            continue;
        }
        let meta = sheet_metadata(sheet_name, &rows, start_row, start_col);
        tracing::debug!(
            "Sheet '{}': header row {}, {} columns, {} data rows",
            sheet_name,
            meta.header_row,
            meta.columns.len(),
            meta.total_rows
        );
        all_metadata.push(meta);
    }
    Ok(all_metadata)
}

/// Second full pass: pull every column named in the metadata over the
/// complete row range below the header. Empty cells stay in place as
/// `Data::Empty` so rows can be reassembled by position.
pub fn extract_data_sync(
    metadata: &[SheetMetadata],
    file_bytes: &Bytes,
) -> Result<HashMap<String, SheetData>, AppError> {
    let cursor = Cursor::new(file_bytes.clone());
    let mut workbook: Xlsx<_> = open_workbook_from_rs(cursor).map_err(|e| {
        AppError::InvalidFormat(format!("not a readable .xlsx workbook: {}", e))
    })?;

    let mut data = HashMap::new();
    for meta in metadata {
        let range = workbook.worksheet_range(&meta.sheet_name).map_err(|e| {
            AppError::ParseFailure(format!(
                "failed to extract sheet '{}': {}",
                meta.sheet_name, e
            ))
        })?;
        let (start_row, start_col) = range
            .start()
            .map_or((0, 0), |(r, c)| (r as usize, c as usize));
        let rows: Vec<&[Data]> = range.rows().collect();

        let mut sheet_data: SheetData = HashMap::new();
        for col in &meta.columns {
            // header_row and index are absolute; rows are used-range
            // relative, so both lookups subtract the range start.
            let values: Vec<Data> = rows
                .iter()
                .skip(meta.header_row - start_row)
                .map(|row| {
                    row.get(col.index - 1 - start_col)
                        .cloned()
                        .unwrap_or(Data::Empty)
                })
                .collect();
            sheet_data.insert(col.name.clone(), values);
        }
        data.insert(meta.sheet_name.clone(), sheet_data);
    }
    Ok(data)
}

/// Reported positions are absolute sheet coordinates: `header_row` and
/// column `index` are 1-based physical row/column numbers, with
/// `start_row`/`start_col` giving the 0-based used-range origin.
fn sheet_metadata(
    sheet_name: &str,
    rows: &[&[Data]],
    start_row: usize,
    start_col: usize,
) -> SheetMetadata {
    let header_offset = detect_header_row(rows, start_row);
    let header = rows[header_offset - 1];
    let max_col = rows.iter().map(|r| r.len()).max().unwrap_or(0);

    let mut columns = Vec::new();
    for col_idx in 1..=max_col {
        let header_cell = header.get(col_idx - 1).unwrap_or(&Data::Empty);
        let name = cell_to_string(header_cell);
        if is_empty_cell(header_cell) || name.trim().is_empty() {
            // Blank header: the column is skipped, indices keep their gap.
            continue;
        }

        let (counts, samples) = sample_column(rows, header_offset, col_idx);
        columns.push(ColumnMetadata {
            name: name.trim().to_string(),
            index: start_col + col_idx,
            data_type: counts.dominant(),
            sample_values: samples,
            non_empty_count: counts.non_empty(),
        });
    }

    SheetMetadata {
        sheet_name: sheet_name.to_string(),
        header_row: start_row + header_offset,
        columns,
        total_rows: rows.len() - header_offset,
    }
}

/// First of the top HEADER_SCAN_ROWS physical rows where at least two
/// cells are populated and every populated cell is text. Falls back to
/// the first used row. Returns a 1-based offset into `rows`; the scan
/// window shrinks when the used range starts below row 1, since rows
/// above it are blank and cannot hold a header.
/// Known miss: a header row with a single cell, or one mixing a
/// numeric label, is skipped on purpose.
fn detect_header_row(rows: &[&[Data]], start_row: usize) -> usize {
    let window = HEADER_SCAN_ROWS.saturating_sub(start_row);
    for row_idx in 1..=rows.len().min(window) {
        let populated: Vec<&Data> = rows[row_idx - 1]
            .iter()
            .filter(|v| !is_empty_cell(v))
            .collect();
        if populated.len() >= 2 && populated.iter().all(|v| matches!(v, Data::String(_))) {
            return row_idx;
        }
    }
    1
}

fn sample_column(
    rows: &[&[Data]],
    header_offset: usize,
    col_idx: usize,
) -> (TypeCounts, SmallVec<[String; SAMPLE_VALUES]>) {
    let mut counts = TypeCounts::default();
    let mut samples = SmallVec::new();

    for row in rows.iter().skip(header_offset).take(TYPE_SAMPLE_ROWS) {
        let cell = row.get(col_idx - 1).unwrap_or(&Data::Empty);
        counts.classify(cell);
        if !is_empty_cell(cell) && samples.len() < SAMPLE_VALUES {
            samples.push(cell_to_string(cell));
        }
    }
    (counts, samples)
}

#[derive(Debug, Default)]
struct TypeCounts {
    string: usize,
    number: usize,
    date: usize,
    bool: usize,
    empty: usize,
}

impl TypeCounts {
    fn classify(&mut self, value: &Data) {
        match value {
            Data::Empty | Data::Error(_) => self.empty += 1,
            // Bool is checked ahead of the numeric arm so boolean cells
            // are never absorbed into the number bucket.
            Data::Bool(_) => self.bool += 1,
            Data::Int(_) | Data::Float(_) => self.number += 1,
            Data::DateTime(_) | Data::DateTimeIso(_) | Data::DurationIso(_) => self.date += 1,
            Data::String(_) => self.string += 1,
        }
    }

    fn non_empty(&self) -> usize {
        self.string + self.number + self.date + self.bool
    }

    /// Most frequent classification, ties broken in declaration order.
    /// An all-blank sample coerces to string so consumers always see a
    /// concrete primitive type.
    fn dominant(&self) -> DataType {
        let counts = [self.string, self.number, self.date, self.bool, self.empty];
        let mut best = 0;
        for (i, count) in counts.iter().enumerate() {
            if *count > counts[best] {
                best = i;
            }
        }
        match best {
            1 => DataType::Number,
            2 => DataType::Date,
            3 => DataType::Bool,
            // "string" wins ties outright and "empty" reports as string.
            _ => DataType::String,
        }
    }
}
