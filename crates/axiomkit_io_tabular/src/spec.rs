//! Shared tabular specification models, options, reports and errors.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use thiserror::Error;

use crate::conf::{
    N_FACTOR_CHAR_WIDTH, N_HEIGHT_ROW_DEFAULT, N_WIDTH_CELL_MAX, N_WIDTH_CELL_MIN,
    derive_default_formats,
};

////////////////////////////////////////////////////////////////////////////////
// #region FieldSpecification

/// One logical column: a field key paired with its header label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpecField {
    /// Logical key used in rows.
    pub key: String,
    /// Header text that identifies the column in a sheet.
    pub label: String,
}

impl SpecField {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

/// Build an ordered field list from `(key, label)` pairs.
pub fn derive_fields<K, L>(pairs: impl IntoIterator<Item = (K, L)>) -> Vec<SpecField>
where
    K: Into<String>,
    L: Into<String>,
{
    pairs
        .into_iter()
        .map(|(key, label)| SpecField::new(key, label))
        .collect()
}

/// Resolved field -> physical column table, parallel to field order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecColumnMapping {
    /// Zero-based column per field; `None` when no header cell matched.
    pub cols_idx: Vec<Option<usize>>,
    /// Labels without a matching header cell, in field order.
    pub labels_missing: Vec<String>,
}

impl SpecColumnMapping {
    /// Column index mapped for the field at `idx_field`.
    pub fn col_of(&self, idx_field: usize) -> Option<usize> {
        self.cols_idx.get(idx_field).copied().flatten()
    }

    /// Whether every field resolved to a column.
    pub fn is_complete(&self) -> bool {
        self.labels_missing.is_empty()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellAndRowValues

/// Normalized cell value shared by the read and write paths.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EnumCellValue {
    /// Missing/blank value.
    #[default]
    Empty,
    /// Text value.
    String(String),
    /// Numeric value.
    Number(f64),
    /// Date or date-time decoded from a date-formatted cell.
    Date(NaiveDateTime),
}

impl EnumCellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Text as it is displayed in a cell.
    ///
    /// Integral numbers drop the fractional suffix; midnight dates drop the time.
    pub fn to_display_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::String(s) => s.clone(),
            Self::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Self::Date(dt) => {
                if dt.time() == chrono::NaiveTime::MIN {
                    dt.format("%Y-%m-%d").to_string()
                } else {
                    dt.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
        }
    }
}

impl From<&str> for EnumCellValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for EnumCellValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for EnumCellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for EnumCellValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for EnumCellValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<NaiveDateTime> for EnumCellValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::Date(value)
    }
}

impl<T: Into<EnumCellValue>> From<Option<T>> for EnumCellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

/// One logical row emitted by the reader.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecRow {
    /// Zero-based position relative to the first data row.
    pub index: usize,
    /// Values keyed by field key, in field order.
    pub values: IndexMap<String, EnumCellValue>,
}

impl SpecRow {
    /// Value of `key`, if the field exists.
    pub fn get(&self, key: &str) -> Option<&EnumCellValue> {
        self.values.get(key)
    }
}

/// Row representation produced by a write-side transform.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumRowRecord {
    /// Values addressed by field key (ordinal keys `"0"`, `"1"`, ... also resolve).
    Keyed(IndexMap<String, EnumCellValue>),
    /// Values addressed by field ordinal.
    Positional(Vec<EnumCellValue>),
}

impl EnumRowRecord {
    /// Build a keyed record from `(key, value)` pairs.
    pub fn keyed<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<EnumCellValue>,
    {
        Self::Keyed(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// Build a positional record.
    pub fn positional<V: Into<EnumCellValue>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }

    /// An empty record carries no values and is skipped by the writer.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Keyed(dict) => dict.is_empty(),
            Self::Positional(values) => values.is_empty(),
        }
    }

    /// Resolve the value for field `key` at ordinal `idx_field`.
    pub fn resolve(&self, key: &str, idx_field: usize) -> Option<&EnumCellValue> {
        match self {
            Self::Keyed(dict) => dict
                .get(key)
                .or_else(|| dict.get(idx_field.to_string().as_str())),
            Self::Positional(values) => values.get(idx_field),
        }
    }
}

impl From<SpecRow> for EnumRowRecord {
    fn from(row: SpecRow) -> Self {
        Self::Keyed(row.values)
    }
}

/// Flow signal returned by read-side row handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumRowFlow {
    /// Keep reading.
    Continue,
    /// Stop reading after this row.
    Stop,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellFormatSpecification

/// Cell format specification translated into `rust_xlsxwriter::Format`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SpecCellFormat {
    /// Font family name.
    pub font_name: Option<String>,
    /// Font size in points.
    pub font_size: Option<i64>,
    /// Bold style.
    pub bold: Option<bool>,
    /// Horizontal alignment.
    pub align: Option<String>,
    /// Vertical alignment.
    pub valign: Option<String>,
    /// Text wrap.
    pub text_wrap: Option<bool>,
    /// Number format code.
    pub num_format: Option<String>,
}

impl SpecCellFormat {
    /// Merge two formats with right-side non-`None` overwrite semantics.
    pub fn merge(&self, other: &SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            font_name: other.font_name.clone().or_else(|| self.font_name.clone()),
            font_size: other.font_size.or(self.font_size),
            bold: other.bold.or(self.bold),
            align: other.align.clone().or_else(|| self.align.clone()),
            valign: other.valign.clone().or_else(|| self.valign.clone()),
            text_wrap: other.text_wrap.or(self.text_wrap),
            num_format: other.num_format.clone().or_else(|| self.num_format.clone()),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ReadOptions

/// How unmatched header labels are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumHeaderPolicy {
    /// Unmatched labels read as `Empty` (default).
    #[default]
    Tolerant,
    /// Any unmatched label fails the read before the first data row.
    Strict,
}

/// Options for one read call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecReadOptions {
    /// Zero-based header row index.
    pub row_header: usize,
    /// Zero-based index of the first data row; must be > `row_header`.
    pub row_data_first: usize,
    /// Missing-label policy.
    pub rule_header: EnumHeaderPolicy,
}

impl Default for SpecReadOptions {
    fn default() -> Self {
        Self {
            row_header: 0,
            row_data_first: 1,
            rule_header: EnumHeaderPolicy::Tolerant,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WriteOptions

/// Write mode of one sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumWriteMode {
    /// Header and data rows only; cells typed by their own variant.
    Simple,
    /// Title, numeric tagging, freeze pane and autofit layout (default).
    #[default]
    Styled,
}

/// Autofit width/height heuristics.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecAutofitPolicy {
    /// Floor for tracked widths.
    pub width_cell_min: usize,
    /// Upper bound of final widths.
    pub width_cell_max: f64,
    /// Width units per displayed character.
    pub factor_char_width: f64,
    /// Base height of the title row.
    pub height_row_default: f64,
}

impl Default for SpecAutofitPolicy {
    fn default() -> Self {
        Self {
            width_cell_min: N_WIDTH_CELL_MIN,
            width_cell_max: N_WIDTH_CELL_MAX,
            factor_char_width: N_FACTOR_CHAR_WIDTH,
            height_row_default: N_HEIGHT_ROW_DEFAULT,
        }
    }
}

/// Per-sheet write options.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecSheetWriteOptions {
    /// Sheet name; sanitized and de-duplicated. Defaults to `Sheet1`.
    pub sheet_name: Option<String>,
    /// Simple vs styled output.
    pub rule_mode: EnumWriteMode,
    /// Title written in a merged first row (styled mode only).
    pub title: Option<String>,
    /// Field keys written as numbers when their value is numeric (styled mode only).
    pub cols_numeric: BTreeSet<String>,
    /// 1-based column of the top-left unfrozen cell; `0` disables freezing.
    pub col_freeze: usize,
    /// Autofit heuristics.
    pub policy_autofit: SpecAutofitPolicy,
}

impl SpecSheetWriteOptions {
    /// Header + rows, no layout.
    pub fn simple() -> Self {
        Self {
            rule_mode: EnumWriteMode::Simple,
            ..Default::default()
        }
    }

    /// Title, numeric fields and freeze column.
    pub fn styled<I, S>(title: &str, cols_numeric: I, col_freeze: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rule_mode: EnumWriteMode::Styled,
            title: if title.is_empty() {
                None
            } else {
                Some(title.to_string())
            },
            cols_numeric: cols_numeric.into_iter().map(Into::into).collect(),
            col_freeze,
            ..Default::default()
        }
    }
}

/// Writer-wide format presets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecXlsxWriteOptions {
    /// Title cell format.
    pub fmt_title: SpecCellFormat,
    /// Header cell format.
    pub fmt_header: SpecCellFormat,
    /// Text cell format.
    pub fmt_text: SpecCellFormat,
    /// Number cell format.
    pub fmt_number: SpecCellFormat,
}

impl Default for SpecXlsxWriteOptions {
    fn default() -> Self {
        let mut dict_fmt = derive_default_formats();
        let mut take = |name: &str| dict_fmt.remove(name).unwrap_or_default();
        Self {
            fmt_title: take("title"),
            fmt_header: take("header"),
            fmt_text: take("text"),
            fmt_number: take("number"),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ReportSpecification

/// Per-read call report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecReadReport {
    /// Source identifier (file path).
    pub source_id: String,
    /// Number of rows handed to the handler.
    pub n_rows_emitted: usize,
    /// Labels without a header match (tolerant mode).
    pub labels_missing: Vec<String>,
    /// Whether the handler stopped the read early.
    pub if_stopped: bool,
}

/// Per-sheet write report.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecWriteReport {
    /// Actual unique sheet name in workbook.
    pub sheet_name: String,
    /// Data rows written.
    pub n_rows_written: usize,
    /// Source items skipped by the transform.
    pub n_rows_skipped: usize,
    /// Final column widths (empty in simple mode).
    pub widths_col: Vec<f64>,
    /// Title row height when it was recomputed.
    pub height_row_title: Option<f64>,
    /// `(row, col)` of the freeze pane, if any.
    pub freeze: Option<(usize, usize)>,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl SpecWriteReport {
    /// Add a warning message.
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        self.warnings.push(msg.as_ref().to_string());
    }
}

impl fmt::Display for SpecWriteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[XLSX] sheet={} written={} skipped={} warnings={}",
            self.sheet_name,
            self.n_rows_written,
            self.n_rows_skipped,
            self.warnings.len()
        )
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Boxed error raised by external collaborators such as chunk cursors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level read/write failure.
#[derive(Error, Debug)]
pub enum SheetError {
    /// Strict header validation found labels without a column.
    #[error("Missing columns in {source_id}: {}", .labels.join(", "))]
    MissingColumns {
        /// Source identifier (file path).
        source_id: String,
        /// Every missing label, in field order.
        labels: Vec<String>,
    },

    /// The workbook could not be opened or parsed.
    #[error("Unreadable workbook {source_id}: {message}")]
    FileFormat {
        /// Source identifier (file path).
        source_id: String,
        /// Codec error text.
        message: String,
    },

    /// Invalid call arguments or policies.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// Excel worksheet size limits exceeded.
    #[error("Excel limit exceeded: {0}")]
    ExcelLimit(String),

    /// Failure surfaced unmodified from a chunk cursor.
    #[error("Row source failed: {0}")]
    Source(#[source] BoxError),

    /// Failure surfaced unmodified from the XLSX writer.
    #[error("xlsx write error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
