//! Metadata-only worksheet lookups that skip cell decoding.

use std::path::Path;

use calamine::{Dimensions, Reader, Sheets, open_workbook_auto};
use log::debug;

/// Highest used row count of the worksheet at `sheet_index`.
///
/// XLSX sheets answer from their recorded `<dimension>` element without
/// decoding cells; other formats fall back to the decoded used range.
/// Returns `0` when the file cannot be opened, the sheet does not exist, or
/// no used range is recorded.
pub fn read_highest_row(path: impl AsRef<Path>, sheet_index: usize) -> usize {
    match derive_highest_row(path.as_ref(), sheet_index) {
        Ok(n_rows) => n_rows,
        Err(err) => {
            debug!(
                "{}: highest row unavailable: {err}",
                path.as_ref().display()
            );
            0
        }
    }
}

fn derive_highest_row(path: &Path, sheet_index: usize) -> Result<usize, calamine::Error> {
    let mut workbook = open_workbook_auto(path)?;
    let Some(sheet_name) = workbook.sheet_names().get(sheet_index).cloned() else {
        return Ok(0);
    };

    if let Sheets::Xlsx(xlsx) = &mut workbook {
        let dimensions = xlsx.worksheet_cells_reader(&sheet_name)?.dimensions();
        return Ok(derive_row_count(dimensions));
    }

    let range = workbook.worksheet_range(&sheet_name)?;
    Ok(range.end().map_or(0, |(n_row, _)| n_row as usize + 1))
}

/// 1-based last row; an absent or bare `A1` dimension counts as no rows.
fn derive_row_count(dimensions: Dimensions) -> usize {
    if dimensions == Dimensions::default() {
        return 0;
    }
    dimensions.end.0 as usize + 1
}
