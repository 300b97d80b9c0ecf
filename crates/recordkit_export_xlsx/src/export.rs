//! Export pipeline entry points.
//!
//! aggregate -> plan -> write grid -> widths -> serialize. Every call builds a
//! private grid and either returns the whole buffer or fails without output.

use std::path::Path;

use crate::aggregate::{RecordStore, aggregate_records};
use crate::grid::build_workbook_grid;
use crate::spec::{
    ExportError, SpecExportOptions, SpecExportOutput, SpecExportReport, SpecRecordFilter,
    SpecSourceRecord,
};
use crate::writer::{save_workbook_grid, serialize_workbook_grid};

/// Run the full export against a record store and return the workbook bytes.
pub async fn export_records<S: RecordStore>(
    store: &S,
    filter: &SpecRecordFilter,
    options: &SpecExportOptions,
) -> Result<SpecExportOutput, ExportError> {
    options.validate()?;

    let mut report = SpecExportReport::default();
    let l_records = aggregate_records(store, filter, options, &mut report)
        .await
        .inspect_err(|err| tracing::error!("export aborted during aggregation: {err}"))?;

    finish_export(&l_records, filter, options, report)
}

/// Export already-normalized records.
///
/// `filter` only feeds the summary period bounds here; the records are
/// written as given.
pub fn export_source_records(
    records: &[SpecSourceRecord],
    filter: &SpecRecordFilter,
    options: &SpecExportOptions,
) -> Result<SpecExportOutput, ExportError> {
    finish_export(records, filter, options, SpecExportReport::default())
}

/// Export already-normalized records straight into a file.
pub fn save_source_records(
    records: &[SpecSourceRecord],
    filter: &SpecRecordFilter,
    options: &SpecExportOptions,
    path_file_out: impl AsRef<Path>,
) -> Result<SpecExportReport, ExportError> {
    let grid = build_workbook_grid(records, filter, options)?;
    save_workbook_grid(&grid, options, path_file_out)?;
    Ok(derive_report(records, grid.height_data(), SpecExportReport::default()))
}

fn finish_export(
    records: &[SpecSourceRecord],
    filter: &SpecRecordFilter,
    options: &SpecExportOptions,
    report: SpecExportReport,
) -> Result<SpecExportOutput, ExportError> {
    let grid = build_workbook_grid(records, filter, options)?;
    let buffer = serialize_workbook_grid(&grid, options)
        .inspect_err(|err| tracing::error!("export aborted during serialization: {err}"))?;

    let report = derive_report(records, grid.height_data(), report);
    tracing::info!(
        n_records = report.n_records,
        n_rows_data = report.n_rows_data,
        n_excluded = report.excluded.len(),
        n_bytes = buffer.len(),
        "records exported"
    );
    Ok(SpecExportOutput { buffer, report })
}

fn derive_report(
    records: &[SpecSourceRecord],
    n_rows_data: usize,
    mut report: SpecExportReport,
) -> SpecExportReport {
    report.n_records = records.len();
    report.n_rows_data = n_rows_data;
    if !report.excluded.is_empty() {
        report.warn(format!(
            "{} record(s) excluded because their timestamp could not be normalized.",
            report.excluded.len()
        ));
    }
    report
}
