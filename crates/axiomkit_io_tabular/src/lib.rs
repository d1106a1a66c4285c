//! `axiomkit_io_tabular` v1:
//! Header-mapped XLSX read/write kernel.
//!
//! Modules:
//! - `conf`    : constants and default presets
//! - `spec`    : fields, values, options, reports and errors
//! - `util`    : pure helper functions
//! - `mapping` : header label -> column resolution
//! - `reader`  : lazy row reader over the first worksheet
//! - `source`  : finite and chunked row sources
//! - `layout`  : autofit widths, title height and freeze pane
//! - `writer`  : workbook writer kernel
//! - `meta`    : metadata-only worksheet lookups
pub mod conf;
pub mod layout;
pub mod mapping;
pub mod meta;
pub mod reader;
pub mod source;
pub mod spec;
pub mod util;
pub mod writer;

pub use conf::{
    N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, N_SIZE_BATCH_DEFAULT,
    TUP_EXCEL_ILLEGAL,
};
pub use layout::{SheetLayout, SpecLayoutPlan, calculate_title_line_count};
pub use mapping::resolve_column_mapping;
pub use meta::read_highest_row;
pub use reader::{
    EnumReaderState, RowHandler, RowReader, SheetRows, XlsxReader, read_sheet, read_sheet_to_vec,
};
pub use source::{ChunkCursor, EnumRowSource, SourceItems, VecCursor};
pub use spec::{
    BoxError, EnumCellValue, EnumHeaderPolicy, EnumRowFlow, EnumRowRecord, EnumWriteMode,
    SheetError, SpecAutofitPolicy, SpecCellFormat, SpecColumnMapping, SpecField, SpecReadOptions,
    SpecReadReport, SpecRow, SpecSheetWriteOptions, SpecWriteReport, SpecXlsxWriteOptions,
    derive_fields,
};
pub use util::{estimate_display_width, sanitize_sheet_name};
pub use writer::{XlsxWriter, convert_write_value, write_xlsx};
