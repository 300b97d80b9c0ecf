//! Summary preamble and column-header rows.

use chrono::NaiveDate;

use crate::conf::N_NCOLS_GRID;
use crate::spec::{
    EnumCellValue, EnumRowRole, SpecExportOptions, SpecRecordFilter, SpecSourceRecord,
};

/// Count records per category, in first-appearance order.
pub fn derive_category_counts(records: &[SpecSourceRecord]) -> Vec<(String, usize)> {
    let mut l_counts: Vec<(String, usize)> = Vec::new();
    for record in records {
        match l_counts.iter_mut().find(|(c_name, _)| *c_name == record.category) {
            Some((_, n_count)) => *n_count += 1,
            None => l_counts.push((record.category.clone(), 1)),
        }
    }
    l_counts
}

/// Period bounds: filter bounds when given, else earliest/latest record date.
pub fn derive_period_bounds(
    records: &[SpecSourceRecord],
    filter: &SpecRecordFilter,
) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let date_start = filter
        .date_start
        .or_else(|| records.iter().map(|r| r.date).min());
    let date_end = filter
        .date_end
        .or_else(|| records.iter().map(|r| r.date).max());
    (date_start, date_end)
}

fn build_row(values: Vec<EnumCellValue>) -> Vec<EnumCellValue> {
    let mut l_values = values;
    l_values.resize(N_NCOLS_GRID, EnumCellValue::None);
    l_values
}

/// Build summary rows followed by the header row, each with its row role.
///
/// Order: title, start date, end date, one count row per category, a blank
/// separator, then the header.
pub fn build_summary_rows(
    records: &[SpecSourceRecord],
    filter: &SpecRecordFilter,
    options: &SpecExportOptions,
) -> Vec<(EnumRowRole, Vec<EnumCellValue>)> {
    let (date_start, date_end) = derive_period_bounds(records, filter);
    let fmt_date = |date: Option<NaiveDate>| match date {
        Some(val) => EnumCellValue::text(val.format(&options.date_format).to_string()),
        None => EnumCellValue::text(""),
    };

    let mut l_rows = vec![
        (
            EnumRowRole::SummaryTitle,
            build_row(vec![EnumCellValue::text(options.title.clone())]),
        ),
        (
            EnumRowRole::Summary,
            build_row(vec![
                EnumCellValue::text(options.label_date_start.clone()),
                fmt_date(date_start),
            ]),
        ),
        (
            EnumRowRole::Summary,
            build_row(vec![
                EnumCellValue::text(options.label_date_end.clone()),
                fmt_date(date_end),
            ]),
        ),
    ];

    for (c_category, n_count) in derive_category_counts(records) {
        l_rows.push((
            EnumRowRole::Summary,
            build_row(vec![
                EnumCellValue::text(c_category),
                EnumCellValue::Number(n_count as f64),
            ]),
        ));
    }

    l_rows.push((EnumRowRole::Summary, build_row(vec![])));
    l_rows.push((
        EnumRowRole::Header,
        options
            .labels
            .to_vec()
            .into_iter()
            .map(EnumCellValue::text)
            .collect(),
    ));

    l_rows
}
