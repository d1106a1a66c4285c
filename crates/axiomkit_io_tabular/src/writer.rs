//! XLSX writer kernel that streams row sources into header-mapped worksheets.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rust_xlsxwriter::{Format, FormatAlign, Workbook, Worksheet};

use crate::conf::{
    C_SHEET_NAME_DEFAULT, N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX,
};
use crate::layout::{SheetLayout, validate_policy_autofit};
use crate::source::EnumRowSource;
use crate::spec::{
    EnumCellValue, EnumRowRecord, EnumWriteMode, SheetError, SpecCellFormat, SpecField,
    SpecSheetWriteOptions, SpecWriteReport, SpecXlsxWriteOptions,
};
use crate::util::{
    cast_col_num, cast_row_num, convert_numeric_value, sanitize_sheet_name, validate_unique_keys,
};

/// Stateful workbook writer.
pub struct XlsxWriter {
    path_file_out: PathBuf,
    workbook: Workbook,
    write_options: SpecXlsxWriteOptions,
    set_sheet_names_existing: BTreeSet<String>,
    l_reports: Vec<SpecWriteReport>,
    if_closed: bool,
}

impl XlsxWriter {
    /// Create writer bound to output path and format presets.
    ///
    /// The workbook is buffered in memory until [`Self::close`] is called.
    pub fn new(path_file_out: impl Into<PathBuf>, write_options: SpecXlsxWriteOptions) -> Self {
        Self {
            path_file_out: path_file_out.into(),
            workbook: Workbook::new(),
            write_options,
            set_sheet_names_existing: BTreeSet::new(),
            l_reports: Vec::new(),
            if_closed: false,
        }
    }

    /// Output file path.
    pub fn file_out(&self) -> &Path {
        &self.path_file_out
    }

    /// Snapshot of per-sheet write reports.
    pub fn report(&self) -> Vec<SpecWriteReport> {
        self.l_reports.clone()
    }

    /// Flush workbook to disk. Idempotent.
    pub fn close(&mut self) -> Result<(), SheetError> {
        if self.if_closed {
            return Ok(());
        }
        self.workbook.save(&self.path_file_out)?;
        self.if_closed = true;
        info!(
            "Saved workbook {} with {} sheet(s)",
            self.path_file_out.display(),
            self.l_reports.len()
        );
        Ok(())
    }

    /// Write one sheet of [`EnumRowRecord`] items without a transform.
    pub fn write_records(
        &mut self,
        fields: &[SpecField],
        source: EnumRowSource<'_, EnumRowRecord>,
        options: &SpecSheetWriteOptions,
    ) -> Result<SpecWriteReport, SheetError> {
        self.write_sheet(fields, source, |_, record| Some(record), options)
    }

    /// Write one sheet: optional title, header labels, then one row per
    /// transformed source item.
    ///
    /// `transform` receives the zero-based source index and the item. A
    /// `None` or empty record skips the item without consuming an output row.
    pub fn write_sheet<T, F>(
        &mut self,
        fields: &[SpecField],
        source: EnumRowSource<'_, T>,
        mut transform: F,
        options: &SpecSheetWriteOptions,
    ) -> Result<SpecWriteReport, SheetError>
    where
        F: FnMut(usize, T) -> Option<EnumRowRecord>,
    {
        if self.if_closed {
            return Err(SheetError::InvalidOptions(
                "Cannot write after close().".to_string(),
            ));
        }
        validate_sheet_options(fields, options)?;
        let items = source.into_items()?;

        let if_is_styled = options.rule_mode == EnumWriteMode::Styled;
        let title = options
            .title
            .as_deref()
            .filter(|c_title| if_is_styled && !c_title.is_empty());
        let n_row_header = usize::from(title.is_some());
        let n_row_data_first = n_row_header + 1;
        let n_rows_data_max = N_NROWS_EXCEL_MAX - n_row_data_first;

        let fmt_title = derive_rust_xlsx_format(&self.write_options.fmt_title);
        let fmt_header = derive_rust_xlsx_format(&self.write_options.fmt_header);
        let fmt_text = derive_rust_xlsx_format(&self.write_options.fmt_text);
        let fmt_number = derive_rust_xlsx_format(&self.write_options.fmt_number);

        let l_if_numeric: Vec<bool> = fields
            .iter()
            .map(|field| if_is_styled && options.cols_numeric.contains(&field.key))
            .collect();

        let sheet_name_unique = self.derive_unique_sheet_name(&sanitize_sheet_name(
            options.sheet_name.as_deref().unwrap_or(C_SHEET_NAME_DEFAULT),
            "_",
        ));
        // Buffered apart from the workbook so a failed write leaves no partial sheet.
        let mut worksheet = Worksheet::new();
        worksheet.set_name(&sheet_name_unique)?;

        let mut layout = SheetLayout::new(fields.len(), options.policy_autofit.clone());
        let mut report = SpecWriteReport {
            sheet_name: sheet_name_unique,
            ..Default::default()
        };

        if if_is_styled {
            for key in &options.cols_numeric {
                if !fields.iter().any(|field| &field.key == key) {
                    report.warn(format!("cols_numeric key {key:?} is not a field; ignored."));
                }
            }
        }

        if let Some(c_title) = title {
            write_title(&mut worksheet, c_title, fields.len(), &fmt_title)?;
        }

        for (n_idx_col, field) in fields.iter().enumerate() {
            worksheet.write_string_with_format(
                cast_row_num(n_row_header)?,
                cast_col_num(n_idx_col)?,
                &field.label,
                &fmt_header,
            )?;
            layout.observe_header(n_idx_col, &field.label);
        }

        for item in items {
            let (n_idx_src, value) = item?;
            let Some(record) = transform(n_idx_src, value).filter(|record| !record.is_empty())
            else {
                report.n_rows_skipped += 1;
                continue;
            };

            if report.n_rows_written >= n_rows_data_max {
                return Err(SheetError::ExcelLimit(format!(
                    "sheet {:?} cannot hold more than {n_rows_data_max} data rows.",
                    report.sheet_name
                )));
            }
            let n_row = n_row_data_first + report.n_rows_written;

            for (n_idx_col, field) in fields.iter().enumerate() {
                let value_raw = record
                    .resolve(&field.key, n_idx_col)
                    .unwrap_or(&EnumCellValue::Empty);
                let value = convert_write_value(value_raw, l_if_numeric[n_idx_col], options.rule_mode);
                let fmt_cell = if matches!(value, EnumCellValue::Number(_)) {
                    &fmt_number
                } else {
                    &fmt_text
                };
                write_cell_with_format(&mut worksheet, n_row, n_idx_col, &value, fmt_cell)?;
                layout.observe_cell(n_idx_col, &value.to_display_text());
            }
            report.n_rows_written += 1;
        }

        if if_is_styled {
            let plan = layout.finalize(title, options.col_freeze, n_row_data_first);
            for (n_idx_col, width) in plan.widths_col.iter().enumerate() {
                worksheet.set_column_width(cast_col_num(n_idx_col)?, *width)?;
            }
            for (n_row, height) in &plan.heights_row {
                worksheet.set_row_height(cast_row_num(*n_row)?, *height)?;
            }
            if let Some((n_row_freeze, n_col_freeze)) = plan.freeze {
                worksheet.set_freeze_panes(cast_row_num(n_row_freeze)?, cast_col_num(n_col_freeze)?)?;
            }
            report.widths_col = plan.widths_col;
            report.height_row_title = plan.heights_row.get(&0).copied();
            report.freeze = plan.freeze;
        }

        for c_warning in &report.warnings {
            warn!("{}: {c_warning}", report.sheet_name);
        }
        info!(
            "Wrote {} data row(s) to sheet {:?} ({} skipped)",
            report.n_rows_written, report.sheet_name, report.n_rows_skipped
        );
        self.workbook.push_worksheet(worksheet);
        self.set_sheet_names_existing
            .insert(report.sheet_name.to_lowercase());
        self.l_reports.push(report.clone());
        Ok(report)
    }

    /// First free variant of `name`; sheet names compare case-insensitively.
    fn derive_unique_sheet_name(&self, name: &str) -> String {
        if !self.set_sheet_names_existing.contains(&name.to_lowercase()) {
            return name.to_string();
        }

        let base_name: String = name
            .chars()
            .take(usize::max(1, N_LEN_EXCEL_SHEET_NAME_MAX - 3))
            .collect();

        let mut n_idx = 2usize;
        loop {
            let candidate: String = format!("{base_name}__{n_idx}")
                .chars()
                .take(N_LEN_EXCEL_SHEET_NAME_MAX)
                .collect();
            if !self.set_sheet_names_existing.contains(&candidate.to_lowercase()) {
                debug!("Sheet name {name:?} taken; using {candidate:?}");
                return candidate;
            }
            n_idx += 1;
        }
    }
}

/// Write one sheet to a new workbook at `path` and save it.
pub fn write_xlsx<P, T, F>(
    path: P,
    fields: &[SpecField],
    source: EnumRowSource<'_, T>,
    transform: F,
    options: &SpecSheetWriteOptions,
) -> Result<SpecWriteReport, SheetError>
where
    P: AsRef<Path>,
    F: FnMut(usize, T) -> Option<EnumRowRecord>,
{
    let mut writer = XlsxWriter::new(path.as_ref(), SpecXlsxWriteOptions::default());
    let report = writer.write_sheet(fields, source, transform, options)?;
    writer.close()?;
    Ok(report)
}

/// Tag one value for writing.
///
/// Styled mode writes a number only for numeric fields whose value passes the
/// numeric test; simple mode keeps finite numbers as numbers. Everything else
/// is written as its display text.
pub fn convert_write_value(
    value: &EnumCellValue,
    if_is_numeric_col: bool,
    rule_mode: EnumWriteMode,
) -> EnumCellValue {
    if value.is_empty() {
        return EnumCellValue::Empty;
    }
    let n_numeric = match rule_mode {
        EnumWriteMode::Styled if if_is_numeric_col => convert_numeric_value(value),
        EnumWriteMode::Styled => None,
        EnumWriteMode::Simple => match value {
            EnumCellValue::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        },
    };
    match n_numeric {
        Some(n) => EnumCellValue::Number(n),
        None => EnumCellValue::String(value.to_display_text()),
    }
}

fn validate_sheet_options(
    fields: &[SpecField],
    options: &SpecSheetWriteOptions,
) -> Result<(), SheetError> {
    if fields.is_empty() {
        return Err(SheetError::InvalidOptions(
            "fields must hold at least one field.".to_string(),
        ));
    }
    if fields.len() > N_NCOLS_EXCEL_MAX {
        return Err(SheetError::ExcelLimit(format!(
            "{} fields exceed the {N_NCOLS_EXCEL_MAX}-column sheet limit.",
            fields.len()
        )));
    }
    validate_unique_keys(fields)?;
    validate_policy_autofit(&options.policy_autofit)?;
    if options.col_freeze > fields.len() {
        return Err(SheetError::InvalidOptions(format!(
            "col_freeze ({}) must be <= number of fields ({}).",
            options.col_freeze,
            fields.len()
        )));
    }
    Ok(())
}

fn write_title(
    worksheet: &mut Worksheet,
    title: &str,
    n_cols: usize,
    fmt_title: &Format,
) -> Result<(), SheetError> {
    if n_cols > 1 {
        worksheet.merge_range(0, 0, 0, cast_col_num(n_cols - 1)?, title, fmt_title)?;
    } else {
        worksheet.write_string_with_format(0, 0, title, fmt_title)?;
    }
    Ok(())
}

fn write_cell_with_format(
    worksheet: &mut Worksheet,
    row_idx: usize,
    col_idx: usize,
    value: &EnumCellValue,
    format: &Format,
) -> Result<(), SheetError> {
    match value {
        EnumCellValue::Empty => {}
        EnumCellValue::Number(val) => {
            worksheet.write_number_with_format(
                cast_row_num(row_idx)?,
                cast_col_num(col_idx)?,
                *val,
                format,
            )?;
        }
        EnumCellValue::String(val) => {
            worksheet.write_string_with_format(
                cast_row_num(row_idx)?,
                cast_col_num(col_idx)?,
                val,
                format,
            )?;
        }
        EnumCellValue::Date(_) => {
            worksheet.write_string_with_format(
                cast_row_num(row_idx)?,
                cast_col_num(col_idx)?,
                value.to_display_text(),
                format,
            )?;
        }
    }
    Ok(())
}

fn derive_rust_xlsx_format(spec: &SpecCellFormat) -> Format {
    let mut format = Format::new();

    if let Some(val) = &spec.font_name {
        format = format.set_font_name(val.clone());
    }
    if let Some(val) = spec.font_size {
        format = format.set_font_size(val as f64);
    }
    if spec.bold.unwrap_or(false) {
        format = format.set_bold();
    }

    if let Some(val) = &spec.align
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }
    if let Some(val) = &spec.valign
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }

    if let Some(val) = &spec.num_format {
        format = format.set_num_format(val.clone());
    }
    if spec.text_wrap.unwrap_or(false) {
        format = format.set_text_wrap();
    }

    format
}

fn derive_format_align(align: &str) -> Option<FormatAlign> {
    let value = align.trim().to_ascii_lowercase();
    match value.as_str() {
        "general" => Some(FormatAlign::General),
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        "top" => Some(FormatAlign::Top),
        "bottom" => Some(FormatAlign::Bottom),
        "vcenter" | "vertical_center" => Some(FormatAlign::VerticalCenter),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use indexmap::IndexMap;

    use super::*;
    use crate::meta::read_highest_row;
    use crate::reader::read_sheet_to_vec;
    use crate::source::VecCursor;
    use crate::spec::{EnumHeaderPolicy, EnumRowFlow, SpecReadOptions, SpecRow, derive_fields};

    fn fields() -> Vec<SpecField> {
        derive_fields([("id", "编号"), ("name", "姓名"), ("age", "年龄")])
    }

    fn person(id: i64, name: &str, age: i64) -> EnumRowRecord {
        EnumRowRecord::keyed([
            ("id", EnumCellValue::from(id)),
            ("name", EnumCellValue::from(name)),
            ("age", EnumCellValue::from(age)),
        ])
    }

    fn read_back(path: &Path, row_header: usize) -> Vec<SpecRow> {
        let options = SpecReadOptions {
            row_header,
            row_data_first: row_header + 1,
            rule_header: EnumHeaderPolicy::Strict,
        };
        read_sheet_to_vec(path, &fields(), &options).expect("read back")
    }

    fn read_sheet_xml(path: &Path) -> String {
        let file = std::fs::File::open(path).expect("open");
        let mut archive = zip::ZipArchive::new(file).expect("zip");
        let mut entry = archive.by_name("xl/worksheets/sheet1.xml").expect("sheet1");
        let mut xml = String::new();
        entry.read_to_string(&mut xml).expect("read xml");
        xml
    }

    #[test]
    fn test_round_trip_keeps_field_values_and_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("round_trip.xlsx");
        let options = SpecSheetWriteOptions::styled("", ["id", "age"], 0);

        let report = write_xlsx(
            &path,
            &fields(),
            EnumRowSource::finite(vec![person(1, "A", 10), person(2, "B", 20)]),
            |_, record| Some(record),
            &options,
        )
        .expect("write");
        assert_eq!(report.n_rows_written, 2);

        let l_rows = read_back(&path, 0);
        assert_eq!(l_rows.len(), 2);
        let expected: Vec<IndexMap<String, EnumCellValue>> = [(1.0, "A", 10.0), (2.0, "B", 20.0)]
            .into_iter()
            .map(|(id, name, age)| {
                IndexMap::from([
                    ("id".to_string(), EnumCellValue::Number(id)),
                    ("name".to_string(), EnumCellValue::from(name)),
                    ("age".to_string(), EnumCellValue::Number(age)),
                ])
            })
            .collect();
        assert_eq!(l_rows[0].values, expected[0]);
        assert_eq!(l_rows[1].values, expected[1]);
        assert_eq!(
            l_rows.iter().map(|r| r.index).collect::<Vec<_>>(),
            vec![0, 1]
        );
    }

    #[test]
    fn test_styled_mode_writes_non_numeric_fields_as_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("typed.xlsx");
        let options = SpecSheetWriteOptions::styled("", ["age"], 0);

        write_xlsx(
            &path,
            &fields(),
            EnumRowSource::finite(vec![EnumRowRecord::positional([
                EnumCellValue::from(7),
                EnumCellValue::from("甲"),
                EnumCellValue::from("n/a"),
            ])]),
            |_, record| Some(record),
            &options,
        )
        .expect("write");

        let l_rows = read_back(&path, 0);
        assert_eq!(l_rows[0].get("id"), Some(&EnumCellValue::from("7")));
        assert_eq!(l_rows[0].get("age"), Some(&EnumCellValue::from("n/a")));
    }

    #[test]
    fn test_simple_mode_keeps_numbers_and_skips_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("simple.xlsx");
        let mut options = SpecSheetWriteOptions::simple();
        options.title = Some("ignored".to_string());
        options.col_freeze = 1;

        let report = write_xlsx(
            &path,
            &fields(),
            EnumRowSource::finite(vec![person(4, "赵六", 24)]),
            |_, record| Some(record),
            &options,
        )
        .expect("write");
        assert!(report.widths_col.is_empty());
        assert_eq!(report.freeze, None);

        let l_rows = read_back(&path, 0);
        assert_eq!(l_rows[0].get("id"), Some(&EnumCellValue::Number(4.0)));
        assert_eq!(l_rows[0].get("name"), Some(&EnumCellValue::from("赵六")));
    }

    #[test]
    fn test_finite_and_chunked_sources_write_identical_sheets() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path_finite = dir.path().join("finite.xlsx");
        let path_chunked = dir.path().join("chunked.xlsx");
        let l_people: Vec<(i64, String, i64)> =
            (0..250).map(|n| (n, format!("name_{n}"), 20 + n % 40)).collect();
        let to_record = |_: usize, (id, name, age): (i64, String, i64)| {
            Some(person(id, &name, age))
        };
        let options = SpecSheetWriteOptions::styled("", ["id", "age"], 0);

        write_xlsx(
            &path_finite,
            &fields(),
            EnumRowSource::finite(l_people.clone()),
            to_record,
            &options,
        )
        .expect("write finite");
        write_xlsx(
            &path_chunked,
            &fields(),
            EnumRowSource::chunked_with_batch_size(VecCursor::new(l_people), 100),
            to_record,
            &options,
        )
        .expect("write chunked");

        let l_rows_finite = read_back(&path_finite, 0);
        let l_rows_chunked = read_back(&path_chunked, 0);
        assert_eq!(l_rows_finite.len(), 250);
        assert_eq!(l_rows_finite, l_rows_chunked);
        assert_eq!(
            l_rows_chunked[249].get("name"),
            Some(&EnumCellValue::from("name_249"))
        );
    }

    #[test]
    fn test_skipped_items_leave_no_gap() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("skip.xlsx");
        let mut l_indices_seen = Vec::new();

        let report = write_xlsx(
            &path,
            &fields(),
            EnumRowSource::finite(vec![person(1, "A", 10), person(2, "B", 20), person(3, "C", 30)]),
            |n_idx, record| {
                l_indices_seen.push(n_idx);
                (n_idx != 1).then_some(record)
            },
            &SpecSheetWriteOptions::default(),
        )
        .expect("write");
        assert_eq!(l_indices_seen, vec![0, 1, 2]);
        assert_eq!(report.n_rows_written, 2);
        assert_eq!(report.n_rows_skipped, 1);

        let l_rows = read_back(&path, 0);
        assert_eq!(l_rows.iter().map(|r| r.index).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(l_rows[1].get("name"), Some(&EnumCellValue::from("C")));
        assert_eq!(read_highest_row(&path, 0), 3);
    }

    #[test]
    fn test_empty_record_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty_record.xlsx");
        let report = write_xlsx(
            &path,
            &fields(),
            EnumRowSource::finite(vec![
                EnumRowRecord::Positional(vec![]),
                EnumRowRecord::keyed([("name", "A")]),
            ]),
            |_, record| Some(record),
            &SpecSheetWriteOptions::default(),
        )
        .expect("write");
        assert_eq!(report.n_rows_written, 1);

        let l_rows = read_back(&path, 0);
        assert_eq!(l_rows[0].get("id"), Some(&EnumCellValue::Empty));
        assert_eq!(l_rows[0].get("name"), Some(&EnumCellValue::from("A")));
    }

    #[test]
    fn test_width_tracks_longest_cell() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("width.xlsx");
        let name_long = "n".repeat(50);

        let report = write_xlsx(
            &path,
            &fields(),
            EnumRowSource::finite(vec![person(1, &name_long, 10), person(2, "B", 20)]),
            |_, record| Some(record),
            &SpecSheetWriteOptions::default(),
        )
        .expect("write");

        assert!((report.widths_col[1] - 55.0).abs() < 1e-9);
        assert!((report.widths_col[0] - 8.0 * 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_title_freeze_and_highest_row() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("styled.xlsx");
        let options = SpecSheetWriteOptions::styled("测试标题\n第二行", ["id", "age"], 2);

        let report = write_xlsx(
            &path,
            &fields(),
            EnumRowSource::finite(vec![person(4, "赵六", 24), person(5, "孙七", 25), person(6, "周八", 26)]),
            |_, record| Some(record),
            &options,
        )
        .expect("write");
        assert_eq!(report.freeze, Some((2, 1)));
        // total width 24; lines of width 8 and 6 wrap to one line each
        assert!((report.height_row_title.expect("title height") - 14.4 * 3.0).abs() < 1e-9);

        let xml = read_sheet_xml(&path);
        assert!(xml.contains("state=\"frozen\""));
        assert!(xml.contains("topLeftCell=\"B3\""));
        assert!(xml.contains("<mergeCell ref=\"A1:C1\"/>"));

        let l_rows = read_back(&path, 1);
        assert_eq!(l_rows.len(), 3);
        assert_eq!(l_rows[2].get("name"), Some(&EnumCellValue::from("周八")));
        assert_eq!(l_rows[2].get("age"), Some(&EnumCellValue::Number(26.0)));
        assert_eq!(read_highest_row(&path, 0), 5);
    }

    #[test]
    fn test_multiple_sheets_get_unique_names_and_first_sheet_is_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("multi.xlsx");
        let mut writer = XlsxWriter::new(&path, SpecXlsxWriteOptions::default());
        assert_eq!(writer.file_out(), path.as_path());
        let options = SpecSheetWriteOptions {
            sheet_name: Some("人员/名单".to_string()),
            ..Default::default()
        };

        let r1 = writer
            .write_records(&fields(), EnumRowSource::finite(vec![person(1, "A", 10)]), &options)
            .expect("sheet 1");
        let r2 = writer
            .write_records(
                &fields(),
                EnumRowSource::finite(vec![person(2, "B", 20), person(3, "C", 30)]),
                &options,
            )
            .expect("sheet 2");
        writer.close().expect("close");
        writer.close().expect("close is idempotent");

        assert_eq!(r1.sheet_name, "人员_名单");
        assert_eq!(r2.sheet_name, "人员_名单__2");
        assert_eq!(writer.report().len(), 2);
        assert!(matches!(
            writer.write_records(&fields(), EnumRowSource::finite(vec![]), &options),
            Err(SheetError::InvalidOptions(_))
        ));

        assert_eq!(read_back(&path, 0).len(), 1);
        assert_eq!(read_highest_row(&path, 1), 3);
    }

    #[test]
    fn test_sheet_names_differing_in_case_are_deduplicated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("case.xlsx");
        let mut writer = XlsxWriter::new(&path, SpecXlsxWriteOptions::default());
        let mut l_names = Vec::new();
        for c_name in ["Data", "data", "DATA"] {
            let options = SpecSheetWriteOptions {
                sheet_name: Some(c_name.to_string()),
                ..Default::default()
            };
            let report = writer
                .write_records(&fields(), EnumRowSource::finite(vec![person(1, "A", 10)]), &options)
                .expect("write");
            l_names.push(report.sheet_name);
        }
        assert_eq!(l_names, vec!["Data", "data__2", "DATA__3"]);
        writer.close().expect("close");
        assert_eq!(read_highest_row(&path, 2), 2);
    }

    #[test]
    fn test_failed_sheet_is_not_kept_in_workbook() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("failed.xlsx");
        let mut writer = XlsxWriter::new(&path, SpecXlsxWriteOptions::default());
        let options = SpecSheetWriteOptions {
            sheet_name: Some("Broken".to_string()),
            ..Default::default()
        };

        let mut n_calls = 0;
        let cursor = move |_: usize| -> Result<Option<Vec<EnumRowRecord>>, crate::spec::BoxError> {
            n_calls += 1;
            if n_calls == 1 {
                Ok(Some(vec![person(1, "X", 1), person(2, "Y", 2)]))
            } else {
                Err("db down".into())
            }
        };
        let err = writer
            .write_records(&fields(), EnumRowSource::chunked(cursor), &options)
            .expect_err("cursor failure");
        assert!(matches!(err, SheetError::Source(_)));
        assert!(writer.report().is_empty());

        let report = writer
            .write_records(&fields(), EnumRowSource::finite(vec![person(3, "Good", 30)]), &options)
            .expect("retry");
        assert_eq!(report.sheet_name, "Broken");
        writer.close().expect("close");

        let l_rows = read_back(&path, 0);
        assert_eq!(l_rows.len(), 1);
        assert_eq!(l_rows[0].get("name"), Some(&EnumCellValue::from("Good")));
        assert_eq!(read_highest_row(&path, 1), 0);
    }

    #[test]
    fn test_invalid_sheet_options_fail_before_writing() {
        let mut writer = XlsxWriter::new("unused.xlsx", SpecXlsxWriteOptions::default());
        let dup = derive_fields([("id", "a"), ("id", "b")]);
        assert!(matches!(
            writer.write_records(&dup, EnumRowSource::finite(vec![]), &SpecSheetWriteOptions::default()),
            Err(SheetError::InvalidOptions(_))
        ));
        assert!(matches!(
            writer.write_records(&[], EnumRowSource::finite(vec![]), &SpecSheetWriteOptions::default()),
            Err(SheetError::InvalidOptions(_))
        ));
        let options = SpecSheetWriteOptions::styled("", Vec::<String>::new(), 9);
        assert!(matches!(
            writer.write_records(&fields(), EnumRowSource::finite(vec![]), &options),
            Err(SheetError::InvalidOptions(_))
        ));
        assert!(writer.report().is_empty());
    }

    #[test]
    fn test_unknown_numeric_key_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("warn.xlsx");
        let options = SpecSheetWriteOptions::styled("", ["age", "salary"], 0);

        let report = write_xlsx(
            &path,
            &fields(),
            EnumRowSource::finite(vec![person(1, "A", 10)]),
            |_, record| Some(record),
            &options,
        )
        .expect("write");
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("salary"));
        assert!(report.to_string().ends_with("warnings=1"));
    }

    #[test]
    fn test_read_back_with_handler_stop_and_strict_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("handler.xlsx");
        let fields_two = derive_fields([("id", "编号"), ("name", "姓名")]);
        write_xlsx(
            &path,
            &fields_two,
            EnumRowSource::finite(vec![
                EnumRowRecord::positional([EnumCellValue::from(1), EnumCellValue::from("A")]),
                EnumRowRecord::positional([EnumCellValue::from(2), EnumCellValue::from("B")]),
            ]),
            |_, record| Some(record),
            &SpecSheetWriteOptions::simple(),
        )
        .expect("write");

        let mut l_seen = Vec::new();
        let report = crate::reader::read_sheet(
            &path,
            &fields_two,
            &SpecReadOptions::default(),
            |n_idx: usize, row: SpecRow| {
                l_seen.push((n_idx, row.get("name").cloned()));
                EnumRowFlow::Stop
            },
        )
        .expect("read");
        assert!(report.if_stopped);
        assert_eq!(report.n_rows_emitted, 1);
        assert_eq!(l_seen, vec![(0, Some(EnumCellValue::from("A")))]);

        let options = SpecReadOptions {
            rule_header: EnumHeaderPolicy::Strict,
            ..Default::default()
        };
        let err = read_sheet_to_vec(&path, &fields(), &options).expect_err("strict");
        assert!(matches!(
            err,
            SheetError::MissingColumns { ref labels, .. } if labels == &vec!["年龄".to_string()]
        ));

        let report = crate::reader::read_sheet(
            &path,
            &fields(),
            &SpecReadOptions::default(),
            |_: usize, _: SpecRow| EnumRowFlow::Continue,
        )
        .expect("tolerant");
        assert_eq!(report.n_rows_emitted, 2);
        assert_eq!(report.labels_missing, vec!["年龄".to_string()]);
    }

    #[test]
    fn test_convert_write_value() {
        let styled = EnumWriteMode::Styled;
        assert_eq!(
            convert_write_value(&"12".into(), true, styled),
            EnumCellValue::Number(12.0)
        );
        assert_eq!(
            convert_write_value(&"12".into(), false, styled),
            EnumCellValue::from("12")
        );
        assert_eq!(
            convert_write_value(&EnumCellValue::Number(3.0), false, styled),
            EnumCellValue::from("3")
        );
        assert_eq!(
            convert_write_value(&"abc".into(), true, styled),
            EnumCellValue::from("abc")
        );
        assert_eq!(
            convert_write_value(&"5".into(), true, EnumWriteMode::Simple),
            EnumCellValue::from("5")
        );
        assert_eq!(
            convert_write_value(&EnumCellValue::Empty, true, styled),
            EnumCellValue::Empty
        );
    }
}
