//! Stateless helper utilities shared by the reader, writer and layout.

use std::collections::BTreeMap;

use unicode_width::UnicodeWidthStr;

use crate::conf::{N_LEN_EXCEL_SHEET_NAME_MAX, TUP_EXCEL_ILLEGAL};
use crate::spec::{EnumCellValue, SheetError, SpecField};

////////////////////////////////////////////////////////////////////////////////
// #region DisplayWidth

/// Displayed width of `s`; wide (e.g. CJK) characters count as two units.
pub fn estimate_display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellValueConversion

/// Numeric value of `value` when it passes the numeric-literal test.
///
/// Numbers must be finite; text must parse as a finite `f64` after trimming.
pub fn convert_numeric_value(value: &EnumCellValue) -> Option<f64> {
    match value {
        EnumCellValue::Number(n) if n.is_finite() => Some(*n),
        EnumCellValue::String(s) => {
            let c_trimmed = s.trim();
            if c_trimmed.is_empty() {
                return None;
            }
            c_trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FieldValidation

/// Validate that field keys are unique.
pub fn validate_unique_keys(fields: &[SpecField]) -> Result<(), SheetError> {
    let mut dict_pos: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (n_idx, field) in fields.iter().enumerate() {
        dict_pos.entry(field.key.as_str()).or_default().push(n_idx);
    }
    if dict_pos.len() == fields.len() {
        return Ok(());
    }

    let c_msg = dict_pos
        .iter()
        .filter(|(_, l_pos)| l_pos.len() > 1)
        .map(|(c_key, l_pos)| format!("{c_key:?} x{} at indices {:?}", l_pos.len(), l_pos))
        .collect::<Vec<_>>()
        .join("; ");

    Err(SheetError::InvalidOptions(format!(
        "Duplicate field keys detected: {c_msg}"
    )))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetNormalization

/// Replace invalid chars and trim to valid Excel sheet name.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    c_name = c_name.trim().to_string();
    if c_name.is_empty() {
        c_name = "Sheet".to_string();
    }

    c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region IndexCasting

pub fn cast_row_num(value: usize) -> Result<u32, SheetError> {
    u32::try_from(value).map_err(|_| SheetError::ExcelLimit(format!("row index overflow: {value}")))
}

pub fn cast_col_num(value: usize) -> Result<u16, SheetError> {
    u16::try_from(value)
        .map_err(|_| SheetError::ExcelLimit(format!("column index overflow: {value}")))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
