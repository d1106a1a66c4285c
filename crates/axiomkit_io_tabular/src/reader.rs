//! Header-mapped row reader over the first worksheet of a workbook.
//!
//! The reader walks physical rows as a small state machine:
//! `Seeking` until the header row, `HeaderFound` once the column mapping is
//! resolved, `Emitting` for data rows, and `Done` when the first sheet ends.
//! Later sheets are never consulted.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use calamine::{Data, Range, Reader, Sheets, open_workbook_auto};
use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use log::{debug, info};

use crate::mapping::{derive_unresolved_mapping, resolve_column_mapping};
use crate::spec::{
    EnumCellValue, EnumRowFlow, SheetError, SpecColumnMapping, SpecField, SpecReadOptions,
    SpecReadReport, SpecRow,
};
use crate::util::validate_unique_keys;

////////////////////////////////////////////////////////////////////////////////
// #region HandlerContract

/// Consumer of read rows.
pub trait RowHandler {
    /// Handle one row; return [`EnumRowFlow::Stop`] to end the read early.
    fn handle(&mut self, index: usize, row: SpecRow) -> EnumRowFlow;
}

impl<F> RowHandler for F
where
    F: FnMut(usize, SpecRow) -> EnumRowFlow,
{
    fn handle(&mut self, index: usize, row: SpecRow) -> EnumRowFlow {
        self(index, row)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region PhysicalRows

/// One worksheet row with decoded cells at absolute positions.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecPhysicalRow {
    /// Zero-based absolute worksheet row.
    pub index: usize,
    /// Decoded cells; position `i` is absolute column `i`.
    pub cells: Vec<EnumCellValue>,
}

/// Owned iterator over the rows of a decoded `calamine` range.
///
/// Row and column indices are shifted by the range start so that they are
/// absolute worksheet positions.
pub struct RangeRows {
    range: Range<Data>,
    n_row_start: usize,
    n_col_start: usize,
    n_height: usize,
    n_width: usize,
    n_idx_rel: usize,
}

impl RangeRows {
    pub fn new(range: Range<Data>) -> Self {
        let (n_row_start, n_col_start) = range
            .start()
            .map_or((0, 0), |(row, col)| (row as usize, col as usize));
        let (n_height, n_width) = range.get_size();
        Self {
            range,
            n_row_start,
            n_col_start,
            n_height,
            n_width,
            n_idx_rel: 0,
        }
    }
}

impl Iterator for RangeRows {
    type Item = SpecPhysicalRow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.n_idx_rel >= self.n_height {
            return None;
        }
        let n_idx_rel = self.n_idx_rel;
        self.n_idx_rel += 1;

        let mut cells = vec![EnumCellValue::Empty; self.n_col_start];
        cells.extend((0..self.n_width).map(|n_col| {
            self.range
                .get((n_idx_rel, n_col))
                .map_or(EnumCellValue::Empty, derive_cell_value_from_data)
        }));

        Some(SpecPhysicalRow {
            index: self.n_row_start + n_idx_rel,
            cells,
        })
    }
}

/// Decode one `calamine` cell.
///
/// Date-formatted cells become [`EnumCellValue::Date`]; error cells degrade
/// to [`EnumCellValue::Empty`].
pub fn derive_cell_value_from_data(value: &Data) -> EnumCellValue {
    match value {
        Data::Empty => EnumCellValue::Empty,
        Data::String(val) => EnumCellValue::String(val.clone()),
        Data::Float(val) => EnumCellValue::Number(*val),
        Data::Int(val) => EnumCellValue::Number(*val as f64),
        Data::Bool(val) => EnumCellValue::String(if *val { "TRUE" } else { "FALSE" }.to_string()),
        Data::DateTime(val) => {
            if val.is_duration() {
                EnumCellValue::Number(val.as_f64())
            } else {
                val.as_datetime()
                    .map_or(EnumCellValue::Number(val.as_f64()), EnumCellValue::Date)
            }
        }
        Data::DateTimeIso(val) => {
            parse_iso_datetime(val).map_or_else(|| EnumCellValue::String(val.clone()), EnumCellValue::Date)
        }
        Data::DurationIso(val) => EnumCellValue::String(val.clone()),
        Data::Error(_) => EnumCellValue::Empty,
    }
}

fn parse_iso_datetime(value: &str) -> Option<NaiveDateTime> {
    let c_value = value.trim();
    NaiveDateTime::parse_from_str(c_value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(c_value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(c_value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RowReader

/// Reader state over the physical row stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumReaderState {
    /// Before the header row.
    Seeking,
    /// Header row consumed and mapping resolved.
    HeaderFound,
    /// At least one data row emitted.
    Emitting,
    /// Physical rows exhausted.
    Done,
}

/// Lazy, header-mapped iterator of logical rows.
///
/// Construction consumes rows up to and including the header row and
/// resolves the [`SpecColumnMapping`] once; strict header failures surface
/// from [`RowReader::new`], before any row is yielded.
pub struct RowReader<I> {
    rows: I,
    fields: Vec<SpecField>,
    mapping: SpecColumnMapping,
    n_row_data_first: usize,
    state: EnumReaderState,
}

impl<I> RowReader<I>
where
    I: Iterator<Item = SpecPhysicalRow>,
{
    pub fn new(
        rows: I,
        fields: &[SpecField],
        options: &SpecReadOptions,
        source_id: &str,
    ) -> Result<Self, SheetError> {
        validate_read_options(fields, options)?;

        let mut reader = Self {
            rows,
            fields: fields.to_vec(),
            mapping: SpecColumnMapping {
                cols_idx: vec![None; fields.len()],
                labels_missing: Vec::new(),
            },
            n_row_data_first: options.row_data_first,
            state: EnumReaderState::Seeking,
        };
        reader.seek_header(options, source_id)?;
        Ok(reader)
    }

    /// Leave `Seeking`: skip physical rows up to the header row and resolve the mapping.
    ///
    /// A missing header row moves straight to `Done`.
    fn seek_header(&mut self, options: &SpecReadOptions, source_id: &str) -> Result<(), SheetError> {
        let row_header = self
            .rows
            .by_ref()
            .find(|row| row.index >= options.row_header)
            .filter(|row| row.index == options.row_header);

        match row_header {
            Some(row) => {
                self.mapping =
                    resolve_column_mapping(&self.fields, &row.cells, options.rule_header, source_id)?;
                self.state = EnumReaderState::HeaderFound;
            }
            None => {
                debug!("{source_id}: header row {} not found", options.row_header);
                self.mapping =
                    derive_unresolved_mapping(&self.fields, options.rule_header, source_id)?;
                self.state = EnumReaderState::Done;
            }
        }
        Ok(())
    }

    /// Mapping resolved from the header row.
    pub fn mapping(&self) -> &SpecColumnMapping {
        &self.mapping
    }

    /// Current reader state.
    pub fn state(&self) -> EnumReaderState {
        self.state
    }

    fn derive_row(&self, row: SpecPhysicalRow) -> SpecRow {
        let mut values = IndexMap::with_capacity(self.fields.len());
        for (n_idx_field, field) in self.fields.iter().enumerate() {
            let value = self
                .mapping
                .col_of(n_idx_field)
                .and_then(|n_col| row.cells.get(n_col))
                .cloned()
                .unwrap_or_default();
            values.insert(field.key.clone(), value);
        }
        SpecRow {
            index: row.index - self.n_row_data_first,
            values,
        }
    }
}

impl<I> Iterator for RowReader<I>
where
    I: Iterator<Item = SpecPhysicalRow>,
{
    type Item = SpecRow;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.state, EnumReaderState::Seeking | EnumReaderState::Done) {
            return None;
        }
        loop {
            let Some(row) = self.rows.next() else {
                self.state = EnumReaderState::Done;
                return None;
            };
            if row.index < self.n_row_data_first {
                continue;
            }
            self.state = EnumReaderState::Emitting;
            return Some(self.derive_row(row));
        }
    }
}

fn validate_read_options(fields: &[SpecField], options: &SpecReadOptions) -> Result<(), SheetError> {
    validate_unique_keys(fields)?;
    if options.row_data_first <= options.row_header {
        return Err(SheetError::InvalidOptions(format!(
            "row_data_first ({}) must be > row_header ({}).",
            options.row_data_first, options.row_header
        )));
    }
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WorkbookReader

/// Rows of the first worksheet of an opened workbook.
pub type SheetRows = RowReader<RangeRows>;

/// Read-only workbook handle.
pub struct XlsxReader {
    source_id: String,
    workbook: Sheets<BufReader<File>>,
}

impl XlsxReader {
    /// Open a workbook; unreadable files fail with [`SheetError::FileFormat`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SheetError> {
        let source_id = path.as_ref().to_string_lossy().to_string();
        let workbook = open_workbook_auto(path.as_ref()).map_err(|err| SheetError::FileFormat {
            source_id: source_id.clone(),
            message: err.to_string(),
        })?;
        info!("Opened workbook {source_id}");
        Ok(Self {
            source_id,
            workbook,
        })
    }

    /// Source identifier (file path).
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Lazy rows of the first worksheet, mapped through `fields`.
    pub fn rows(
        &mut self,
        fields: &[SpecField],
        options: &SpecReadOptions,
    ) -> Result<SheetRows, SheetError> {
        let range = match self.workbook.worksheet_range_at(0) {
            Some(Ok(range)) => range,
            Some(Err(err)) => {
                return Err(SheetError::FileFormat {
                    source_id: self.source_id.clone(),
                    message: err.to_string(),
                });
            }
            None => {
                return Err(SheetError::FileFormat {
                    source_id: self.source_id.clone(),
                    message: "workbook has no worksheets".to_string(),
                });
            }
        };
        RowReader::new(RangeRows::new(range), fields, options, &self.source_id)
    }
}

/// Read the first worksheet of `path`, handing each mapped row to `handler`.
///
/// Strict header failures are returned before the handler is called.
pub fn read_sheet<P, H>(
    path: P,
    fields: &[SpecField],
    options: &SpecReadOptions,
    mut handler: H,
) -> Result<SpecReadReport, SheetError>
where
    P: AsRef<Path>,
    H: RowHandler,
{
    let mut reader = XlsxReader::open(path)?;
    let rows = reader.rows(fields, options)?;

    let mut report = SpecReadReport {
        source_id: reader.source_id().to_string(),
        labels_missing: rows.mapping().labels_missing.clone(),
        ..Default::default()
    };
    for row in rows {
        report.n_rows_emitted += 1;
        if handler.handle(row.index, row) == EnumRowFlow::Stop {
            report.if_stopped = true;
            break;
        }
    }

    info!(
        "Read {} row(s) from {}{}",
        report.n_rows_emitted,
        report.source_id,
        if report.if_stopped { " (stopped)" } else { "" }
    );
    Ok(report)
}

/// Read all mapped rows of the first worksheet into memory.
pub fn read_sheet_to_vec<P: AsRef<Path>>(
    path: P,
    fields: &[SpecField],
    options: &SpecReadOptions,
) -> Result<Vec<SpecRow>, SheetError> {
    let mut reader = XlsxReader::open(path)?;
    Ok(reader.rows(fields, options)?.collect())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
