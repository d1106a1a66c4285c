//! Header-row resolution of field labels to physical column indices.

use log::{debug, warn};

use crate::spec::{EnumCellValue, EnumHeaderPolicy, SheetError, SpecColumnMapping, SpecField};

/// Resolve each field label to the first header cell whose text equals it.
///
/// The returned table is parallel to `fields`. Under
/// [`EnumHeaderPolicy::Strict`] any unmatched label fails with
/// [`SheetError::MissingColumns`] naming all of them; under
/// [`EnumHeaderPolicy::Tolerant`] unmatched labels map to `None`.
pub fn resolve_column_mapping(
    fields: &[SpecField],
    header_cells: &[EnumCellValue],
    rule_header: EnumHeaderPolicy,
    source_id: &str,
) -> Result<SpecColumnMapping, SheetError> {
    let l_header_text: Vec<String> = header_cells
        .iter()
        .map(EnumCellValue::to_display_text)
        .collect();

    let mut cols_idx = Vec::with_capacity(fields.len());
    let mut labels_missing = Vec::new();
    for field in fields {
        // Blank labels never match, so they cannot bind to an empty header cell.
        let n_col = if field.label.is_empty() {
            None
        } else {
            l_header_text.iter().position(|c_text| *c_text == field.label)
        };
        if n_col.is_none() {
            labels_missing.push(field.label.clone());
        }
        cols_idx.push(n_col);
    }

    if !labels_missing.is_empty() {
        match rule_header {
            EnumHeaderPolicy::Strict => {
                return Err(SheetError::MissingColumns {
                    source_id: source_id.to_string(),
                    labels: labels_missing,
                });
            }
            EnumHeaderPolicy::Tolerant => {
                warn!(
                    "{source_id}: header has no column for {:?}; values read as empty",
                    labels_missing
                );
            }
        }
    }

    debug!("{source_id}: resolved column mapping {cols_idx:?}");
    Ok(SpecColumnMapping {
        cols_idx,
        labels_missing,
    })
}

/// Mapping for a sheet whose header row was never reached.
pub fn derive_unresolved_mapping(
    fields: &[SpecField],
    rule_header: EnumHeaderPolicy,
    source_id: &str,
) -> Result<SpecColumnMapping, SheetError> {
    resolve_column_mapping(fields, &[], rule_header, source_id)
}
