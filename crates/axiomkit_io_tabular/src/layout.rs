//! Autofit layout: column widths, title row height and freeze pane.
//!
//! Widths are tracked as running maxima of displayed cell width during the
//! write pass and only scaled/clipped in [`SheetLayout::finalize`].

use std::collections::BTreeMap;

use log::debug;

use crate::spec::{SheetError, SpecAutofitPolicy};
use crate::util::estimate_display_width;

/// Final layout applied to a worksheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecLayoutPlan {
    /// Final width per column.
    pub widths_col: Vec<f64>,
    /// Explicit row heights by zero-based row (only the title row today).
    pub heights_row: BTreeMap<usize, f64>,
    /// Wrapped line count of the title (0 when not recomputed).
    pub n_lines_title: usize,
    /// `(row, col)` passed to the freeze-pane setter.
    pub freeze: Option<(usize, usize)>,
}

/// Mutable layout accumulator threaded through one sheet write.
#[derive(Debug, Clone)]
pub struct SheetLayout {
    widths_col: Vec<usize>,
    policy: SpecAutofitPolicy,
}

impl SheetLayout {
    pub fn new(n_cols: usize, policy: SpecAutofitPolicy) -> Self {
        Self {
            widths_col: vec![0; n_cols],
            policy,
        }
    }

    /// Seed a column from its header label, raised to the width floor.
    pub fn observe_header(&mut self, n_col: usize, label: &str) {
        let n_width = usize::max(estimate_display_width(label), self.policy.width_cell_min);
        self.observe_width(n_col, n_width);
    }

    /// Track the displayed width of one written cell.
    pub fn observe_cell(&mut self, n_col: usize, text: &str) {
        self.observe_width(n_col, estimate_display_width(text));
    }

    fn observe_width(&mut self, n_col: usize, n_width: usize) {
        if let Some(n_width_tracked) = self.widths_col.get_mut(n_col) {
            *n_width_tracked = usize::max(*n_width_tracked, n_width);
        }
    }

    /// Running maximum width of column `n_col`.
    pub fn width_tracked(&self, n_col: usize) -> usize {
        self.widths_col.get(n_col).copied().unwrap_or(0)
    }

    /// Sum of tracked widths, used as the title wrap width.
    pub fn width_total(&self) -> usize {
        self.widths_col.iter().sum()
    }

    /// Compute final widths, title height and freeze pane.
    ///
    /// `title` is placed in row 0; its height is recomputed only when the
    /// text holds an explicit line break. `col_freeze` is the 1-based column
    /// of the top-left unfrozen cell (`0` disables freezing).
    pub fn finalize(
        &self,
        title: Option<&str>,
        col_freeze: usize,
        n_row_data_first: usize,
    ) -> SpecLayoutPlan {
        let widths_col: Vec<f64> = self
            .widths_col
            .iter()
            .map(|n_width| {
                f64::min(
                    *n_width as f64 * self.policy.factor_char_width,
                    self.policy.width_cell_max,
                )
            })
            .collect();

        let mut heights_row = BTreeMap::new();
        let mut n_lines_title = 0;
        if let Some(c_title) = title
            && c_title.contains('\n')
            && self.width_total() > 0
        {
            n_lines_title = calculate_title_line_count(c_title, self.width_total());
            heights_row.insert(
                0,
                self.policy.height_row_default * (n_lines_title + 1) as f64,
            );
        }

        let freeze = if col_freeze > 0 {
            Some((n_row_data_first, col_freeze - 1))
        } else {
            None
        };

        debug!(
            "Layout finalized: widths={widths_col:?}, title_lines={n_lines_title}, freeze={freeze:?}"
        );
        SpecLayoutPlan {
            widths_col,
            heights_row,
            n_lines_title,
            freeze,
        }
    }
}

/// Wrapped line count of `title` in a cell `width_total` units wide.
///
/// Each explicit line wraps into `ceil(width(line) / width_total)` lines.
pub fn calculate_title_line_count(title: &str, width_total: usize) -> usize {
    if width_total == 0 {
        return 0;
    }
    title
        .split('\n')
        .map(|c_line| estimate_display_width(c_line).div_ceil(width_total))
        .sum()
}

/// Validate autofit policy bounds.
pub fn validate_policy_autofit(policy: &SpecAutofitPolicy) -> Result<(), SheetError> {
    if policy.width_cell_min == 0 {
        return Err(SheetError::InvalidOptions(
            "policy_autofit.width_cell_min must be >= 1.".to_string(),
        ));
    }
    if policy.width_cell_max < policy.width_cell_min as f64 {
        return Err(SheetError::InvalidOptions(
            "policy_autofit.width_cell_max must be >= policy_autofit.width_cell_min.".to_string(),
        ));
    }
    if policy.factor_char_width <= 0.0 || !policy.factor_char_width.is_finite() {
        return Err(SheetError::InvalidOptions(
            "policy_autofit.factor_char_width must be > 0.".to_string(),
        ));
    }
    if policy.height_row_default <= 0.0 || !policy.height_row_default.is_finite() {
        return Err(SheetError::InvalidOptions(
            "policy_autofit.height_row_default must be > 0.".to_string(),
        ));
    }
    Ok(())
}
