//! Tabular constants and default preset factories.

use std::collections::BTreeMap;

use crate::spec::SpecCellFormat;

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];

/// Items pulled per batch from a chunked source.
pub const N_SIZE_BATCH_DEFAULT: usize = 100;

/// Minimum tracked column width (four wide characters).
pub const N_WIDTH_CELL_MIN: usize = 4 * 2;
/// Upper bound applied to final column widths.
pub const N_WIDTH_CELL_MAX: f64 = 100.0;
/// Width units per displayed character.
pub const N_FACTOR_CHAR_WIDTH: f64 = 1.1;
/// Row height used when the title row has no explicit height yet.
pub const N_HEIGHT_ROW_DEFAULT: f64 = 14.4;

/// Sheet name used when the caller gives none.
pub const C_SHEET_NAME_DEFAULT: &str = "Sheet1";

/// Build default named format presets used by [`crate::writer::XlsxWriter`].
pub fn derive_default_formats() -> BTreeMap<String, SpecCellFormat> {
    let cfg_base_fmt_spec = SpecCellFormat {
        valign: Some("vcenter".to_string()),
        ..Default::default()
    };

    let mut dict_fmt = BTreeMap::new();
    dict_fmt.insert("text".to_string(), cfg_base_fmt_spec.clone());
    dict_fmt.insert("number".to_string(), cfg_base_fmt_spec.clone());
    dict_fmt.insert(
        "header".to_string(),
        cfg_base_fmt_spec.merge(&SpecCellFormat {
            bold: Some(true),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        "title".to_string(),
        cfg_base_fmt_spec.merge(&SpecCellFormat {
            bold: Some(true),
            text_wrap: Some(true),
            ..Default::default()
        }),
    );
    dict_fmt
}
