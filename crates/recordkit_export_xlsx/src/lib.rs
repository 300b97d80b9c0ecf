//! `recordkit_export_xlsx` v1:
//! Rust-side tabular export kernel for parent records with child sub-lists.
//!
//! Modules:
//! - `conf`      : constants, fixed column layout and default presets
//! - `spec`      : models, options, report and errors
//! - `util`      : pure helper functions (stringify, widths, sheet names)
//! - `aggregate` : record store seam, timestamp normalization, filtering
//! - `layout`    : row-span and merge planning
//! - `summary`   : summary block and header rows
//! - `grid`      : grid materialization with merge ownership checks
//! - `writer`    : XLSX serializer
//! - `export`    : pipeline entry points
pub mod aggregate;
pub mod conf;
pub mod export;
pub mod grid;
pub mod layout;
pub mod spec;
pub mod summary;
pub mod util;
pub mod writer;

pub use aggregate::{
    RecordStore, RecordStoreMemory, aggregate_records, normalize_raw_timestamp,
    select_raw_records,
};
pub use conf::{
    N_COL_DETAIL, N_COL_PARTICIPANT, N_NCOLS_GRID, N_NCOLS_SCALAR, N_WIDTH_CELL_MIN_DEFAULT,
};
pub use export::{export_records, export_source_records, save_source_records};
pub use grid::{GridWriter, build_workbook_grid};
pub use layout::{derive_row_span, plan_layout, plan_record_layout};
pub use spec::{
    EnumCellValue, EnumRawTimestamp, EnumRecordOrder, EnumRowRole, ExportError, SpecCellFormat,
    SpecColumnLabels, SpecExcludedRecord, SpecExportOptions, SpecExportOutput, SpecExportReport,
    SpecGridCell, SpecLayoutPlan, SpecMergeRange, SpecRawRecord, SpecRecordChildren,
    SpecRecordFilter, SpecRecordLayout, SpecSourceRecord, SpecWorkbookGrid,
};
pub use summary::build_summary_rows;
pub use util::{plan_column_widths, sanitize_sheet_name, stringify_cell_value};
pub use writer::{save_workbook_grid, serialize_workbook_grid};
