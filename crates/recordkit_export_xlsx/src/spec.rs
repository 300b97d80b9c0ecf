//! Shared export specification models and top-level error type.

use std::collections::BTreeMap;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, Utc};
use rust_xlsxwriter::XlsxError;
use serde::Deserialize;
use thiserror::Error;

use crate::conf::{N_WIDTH_CELL_MIN_DEFAULT, derive_default_row_formats};

////////////////////////////////////////////////////////////////////////////////
// #region CellFormatSpecification

/// Cell format specification used by the row-role style table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(default)]
pub struct SpecCellFormat {
    /// Font family name.
    pub font_name: Option<String>,
    /// Font size in points.
    pub font_size: Option<i64>,
    /// Bold style.
    pub bold: Option<bool>,
    /// Italic style.
    pub italic: Option<bool>,

    /// Horizontal alignment.
    pub align: Option<String>,
    /// Vertical alignment.
    pub valign: Option<String>,
    /// Border style for all sides.
    pub border: Option<i64>,
    /// Text wrap.
    pub text_wrap: Option<bool>,

    /// Top border override.
    pub top: Option<i64>,
    /// Bottom border override.
    pub bottom: Option<i64>,
    /// Left border override.
    pub left: Option<i64>,
    /// Right border override.
    pub right: Option<i64>,

    /// Number format code.
    pub num_format: Option<String>,
    /// Background fill color.
    pub bg_color: Option<String>,
    /// Font color.
    pub font_color: Option<String>,
}

impl SpecCellFormat {
    /// Return a new format by overlaying `patch` onto `self`.
    pub fn with_(&self, patch: SpecCellFormat) -> SpecCellFormat {
        self.merge(&patch)
    }

    /// Merge two formats with right-side non-`None` overwrite semantics.
    pub fn merge(&self, other: &SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            font_name: other.font_name.clone().or_else(|| self.font_name.clone()),
            font_size: other.font_size.or(self.font_size),
            bold: other.bold.or(self.bold),
            italic: other.italic.or(self.italic),
            align: other.align.clone().or_else(|| self.align.clone()),
            valign: other.valign.clone().or_else(|| self.valign.clone()),
            border: other.border.or(self.border),
            text_wrap: other.text_wrap.or(self.text_wrap),
            top: other.top.or(self.top),
            bottom: other.bottom.or(self.bottom),
            left: other.left.or(self.left),
            right: other.right.or(self.right),
            num_format: other.num_format.clone().or_else(|| self.num_format.clone()),
            bg_color: other.bg_color.clone().or_else(|| self.bg_color.clone()),
            font_color: other.font_color.clone().or_else(|| self.font_color.clone()),
        }
    }
}

/// Normalized cell value during the grid/write pipeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EnumCellValue {
    /// Blank cell.
    #[default]
    None,
    /// Text value.
    String(String),
    /// Numeric value.
    Number(f64),
}

impl EnumCellValue {
    /// Build a text value; empty text stays an explicit empty string.
    pub fn text(value: impl Into<String>) -> Self {
        EnumCellValue::String(value.into())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RecordSpecification

/// Timestamp as delivered by the record store.
///
/// Untagged so JSON documents may carry an RFC 3339 string, any other string,
/// or a `{seconds, nanoseconds}` object (`_seconds`/`_nanoseconds` accepted).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnumRawTimestamp {
    /// Epoch pair.
    Epoch {
        /// Whole seconds since the Unix epoch.
        #[serde(alias = "_seconds")]
        seconds: i64,
        /// Sub-second part, expected in `0..1_000_000_000`.
        #[serde(alias = "_nanoseconds", default)]
        nanoseconds: i64,
    },
    /// Native instant.
    Instant(DateTime<Utc>),
    /// Free-form text, normalized by the aggregator.
    Text(String),
}

/// Parent record as returned by the record store, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct SpecRawRecord {
    /// Store identifier, used for child lookups and diagnostics.
    pub id: String,
    pub title: String,
    pub leader: String,
    pub place: String,
    /// Free-text time of day; falls back to the timestamp when empty.
    pub time: String,
    pub category: String,
    /// Raw timestamp; `None` is treated as malformed.
    pub timestamp: Option<EnumRawTimestamp>,
    /// Pre-attached detail items. `None` means "fetch from store".
    #[serde(alias = "detailItems")]
    pub detail_items: Option<Vec<String>>,
    /// Pre-attached participant items. `None` means "fetch from store".
    #[serde(alias = "participantItems")]
    pub participant_items: Option<Vec<String>>,
}

/// Child sub-lists of one record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct SpecRecordChildren {
    #[serde(alias = "detailItems")]
    pub detail_items: Vec<String>,
    #[serde(alias = "participantItems")]
    pub participant_items: Vec<String>,
}

/// Normalized record ready for layout planning.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecSourceRecord {
    pub id: String,
    pub title: String,
    pub leader: String,
    pub place: String,
    /// Local calendar date of `instant`.
    pub date: NaiveDate,
    /// Display text for the time column.
    pub time: String,
    pub category: String,
    /// Normalized comparable instant.
    pub instant: DateTime<Utc>,
    pub detail_items: Vec<String>,
    pub participant_items: Vec<String>,
}

impl SpecSourceRecord {
    /// Number of grid rows this record occupies (always >= 1).
    pub fn row_span(&self) -> usize {
        self.detail_items
            .len()
            .max(self.participant_items.len())
            .max(1)
    }
}

/// Caller-supplied record filter. All bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct SpecRecordFilter {
    /// Keep only records whose category equals this value.
    pub category: Option<String>,
    /// Earliest local date kept.
    pub date_start: Option<NaiveDate>,
    /// Latest local date kept.
    pub date_end: Option<NaiveDate>,
}

/// Output ordering of aggregated records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumRecordOrder {
    /// Keep store order.
    #[default]
    Original,
    /// Stable sort by normalized instant (report export).
    Chronological,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region LayoutSpecification

/// Inclusive vertical merge range within one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpecMergeRange {
    /// First row (inclusive).
    pub row_start: usize,
    /// Last row (inclusive).
    pub row_end: usize,
    /// Column index.
    pub col: usize,
}

impl SpecMergeRange {
    /// Number of rows covered.
    pub fn height(&self) -> usize {
        self.row_end - self.row_start + 1
    }

    /// One-row ranges are recorded but serialized as plain cells.
    pub fn is_trivial(&self) -> bool {
        self.row_start == self.row_end
    }

    /// Whether two ranges share at least one cell.
    pub fn overlaps(&self, other: &SpecMergeRange) -> bool {
        self.col == other.col && self.row_start <= other.row_end && other.row_start <= self.row_end
    }
}

/// Value planned for one concrete cell.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecCellPlacement {
    pub row: usize,
    pub col: usize,
    pub value: EnumCellValue,
}

/// Merge + value plan for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecRecordLayout {
    /// First grid row of the record.
    pub row_start: usize,
    /// Rows occupied by the record.
    pub row_span: usize,
    /// Ranges assigned to this record, including trivial one-row ranges.
    pub merges: Vec<SpecMergeRange>,
    /// Anchor values of merged ranges and per-row list items.
    pub placements: Vec<SpecCellPlacement>,
}

impl SpecRecordLayout {
    pub fn row_end_exclusive(&self) -> usize {
        self.row_start + self.row_span
    }
}

/// Layout plan of all records, in output order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecLayoutPlan {
    /// Row where the first record starts.
    pub row_start: usize,
    /// Row after the last record.
    pub row_end_exclusive: usize,
    pub records: Vec<SpecRecordLayout>,
}

impl SpecLayoutPlan {
    /// Total data rows, equal to the sum of all row spans.
    pub fn height_data(&self) -> usize {
        self.row_end_exclusive - self.row_start
    }

    /// Iterate every planned range across all records.
    pub fn merges(&self) -> impl Iterator<Item = &SpecMergeRange> {
        self.records.iter().flat_map(|layout| layout.merges.iter())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region GridSpecification

/// Row role keying the declarative style table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumRowRole {
    /// Report title row.
    SummaryTitle,
    /// Period bounds, category counts and the separator row.
    Summary,
    /// Column-header row.
    Header,
    /// Record rows.
    Data,
}

/// One materialized grid cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecGridCell {
    pub row: usize,
    pub col: usize,
    pub value: EnumCellValue,
    /// Covered by a non-trivial merge range (anchor included).
    pub if_part_of_merge: bool,
}

/// Complete rectangular grid with merge and width directives.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecWorkbookGrid {
    /// Dense rows, each `width` cells long.
    pub rows: Vec<Vec<SpecGridCell>>,
    /// Role of each row, same length as `rows`.
    pub row_roles: Vec<EnumRowRole>,
    /// All recorded ranges, trivial ones included.
    pub merges: Vec<SpecMergeRange>,
    /// Estimated width per column.
    pub widths_by_col: Vec<usize>,
    /// Column count.
    pub width: usize,
    /// Index of the column-header row.
    pub row_header: usize,
}

impl SpecWorkbookGrid {
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Rows after the header row.
    pub fn height_data(&self) -> usize {
        self.rows.len().saturating_sub(self.row_header + 1)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&SpecGridCell> {
        self.rows.get(row).and_then(|cells| cells.get(col))
    }

    /// Ranges recorded in one column, in row order.
    pub fn merges_in_col(&self, col: usize) -> Vec<SpecMergeRange> {
        let mut l_merges: Vec<SpecMergeRange> =
            self.merges.iter().filter(|m| m.col == col).copied().collect();
        l_merges.sort();
        l_merges
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ExportOptions

/// Header labels in fixed column order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SpecColumnLabels {
    pub title: String,
    pub leader: String,
    pub place: String,
    pub date: String,
    pub time: String,
    pub category: String,
    pub details: String,
    pub participants: String,
}

impl Default for SpecColumnLabels {
    fn default() -> Self {
        Self {
            title: "Title".to_string(),
            leader: "Leader".to_string(),
            place: "Place".to_string(),
            date: "Date".to_string(),
            time: "Time".to_string(),
            category: "Category".to_string(),
            details: "Details".to_string(),
            participants: "Participants".to_string(),
        }
    }
}

impl SpecColumnLabels {
    /// Labels in grid column order.
    pub fn to_vec(&self) -> Vec<String> {
        vec![
            self.title.clone(),
            self.leader.clone(),
            self.place.clone(),
            self.date.clone(),
            self.time.clone(),
            self.category.clone(),
            self.details.clone(),
            self.participants.clone(),
        ]
    }
}

/// Export-wide options. Every field has a default so partial JSON works.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpecExportOptions {
    /// Text of the summary title row.
    pub title: String,
    /// Worksheet name, sanitized before use.
    pub sheet_name: String,
    pub labels: SpecColumnLabels,
    /// Label of the period start row.
    pub label_date_start: String,
    /// Label of the period end row.
    pub label_date_end: String,
    /// Minimum column width, never below `N_WIDTH_CELL_MIN_DEFAULT`.
    pub width_cell_min: usize,
    /// Size columns by display units (non-ASCII 1.6) instead of char count.
    pub if_estimate_display_width: bool,
    /// `chrono` format for dates.
    pub date_format: String,
    /// `chrono` format used when a record has no time text.
    pub time_format: String,
    /// Local offset applied to instants before taking date/time.
    pub offset_utc_seconds: i32,
    pub record_order: EnumRecordOrder,
    /// Style patches by row role, overlaid onto the defaults.
    pub formats_by_role: BTreeMap<EnumRowRole, SpecCellFormat>,
}

impl Default for SpecExportOptions {
    fn default() -> Self {
        Self {
            title: "Records Report".to_string(),
            sheet_name: "Records".to_string(),
            labels: SpecColumnLabels::default(),
            label_date_start: "Start Date".to_string(),
            label_date_end: "End Date".to_string(),
            width_cell_min: N_WIDTH_CELL_MIN_DEFAULT,
            if_estimate_display_width: false,
            date_format: "%Y-%m-%d".to_string(),
            time_format: "%H:%M".to_string(),
            offset_utc_seconds: 0,
            record_order: EnumRecordOrder::Original,
            formats_by_role: BTreeMap::new(),
        }
    }
}

impl SpecExportOptions {
    /// Parse options from a JSON document and validate them.
    pub fn from_json_str(text: &str) -> Result<Self, ExportError> {
        let options: SpecExportOptions = serde_json::from_str(text)
            .map_err(|err| ExportError::Options(format!("invalid options document: {err}")))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ExportError> {
        if self.width_cell_min < N_WIDTH_CELL_MIN_DEFAULT {
            return Err(ExportError::Options(format!(
                "width_cell_min must be >= {N_WIDTH_CELL_MIN_DEFAULT}, got {}.",
                self.width_cell_min
            )));
        }
        if chrono::FixedOffset::east_opt(self.offset_utc_seconds).is_none() {
            return Err(ExportError::Options(format!(
                "offset_utc_seconds out of range: {}",
                self.offset_utc_seconds
            )));
        }
        if self.date_format.trim().is_empty() {
            return Err(ExportError::Options(
                "date_format must not be empty.".to_string(),
            ));
        }
        for (c_key, c_fmt) in [
            ("date_format", &self.date_format),
            ("time_format", &self.time_format),
        ] {
            if StrftimeItems::new(c_fmt).any(|item| matches!(item, Item::Error)) {
                return Err(ExportError::Options(format!(
                    "{c_key} is not a valid strftime pattern: {c_fmt:?}"
                )));
            }
        }
        Ok(())
    }

    /// Resolve the final style of one row role (defaults overlaid by patches).
    pub fn format_for_role(&self, role: EnumRowRole) -> SpecCellFormat {
        let fmt_base = derive_default_row_formats()
            .remove(&role)
            .unwrap_or_default();
        match self.formats_by_role.get(&role) {
            Some(fmt_patch) => fmt_base.merge(fmt_patch),
            None => fmt_base,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ReportSpecification

/// Record left out of the export, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecExcludedRecord {
    pub record_id: String,
    pub reason: String,
}

/// Per-export report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecExportReport {
    /// Records written to the grid.
    pub n_records: usize,
    /// Data rows written (sum of row spans).
    pub n_rows_data: usize,
    /// Records dropped during normalization.
    pub excluded: Vec<SpecExcludedRecord>,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl SpecExportReport {
    /// Add a warning message.
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        self.warnings.push(msg.as_ref().to_string());
    }

    pub fn exclude(&mut self, record_id: impl Into<String>, reason: impl Into<String>) {
        self.excluded.push(SpecExcludedRecord {
            record_id: record_id.into(),
            reason: reason.into(),
        });
    }
}

/// Serialized workbook plus its report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecExportOutput {
    pub buffer: Vec<u8>,
    pub report: SpecExportReport,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Errors raised by the export pipeline.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Timestamp could not be normalized; recovered by excluding the record.
    #[error("malformed timestamp on record {record_id:?}")]
    MalformedTimestamp { record_id: String },

    /// Store could not deliver records or child items. Fatal.
    #[error("failed to fetch {target}: {message}")]
    FetchFailure { target: String, message: String },

    /// A cell was assigned twice. Unreachable with a correct layout plan.
    #[error("merge conflict at row {row}, column {col}")]
    MergeConflict { row: usize, col: usize },

    /// A record layout does not start at the next free grid row.
    #[error("record layout starts at row {row_start}, next free row is {row_next}")]
    LayoutMisaligned { row_start: usize, row_next: usize },

    /// Grid does not fit into one worksheet.
    #[error("grid exceeds worksheet limits: {0}")]
    Capacity(String),

    /// Invalid export options.
    #[error("invalid export options: {0}")]
    Options(String),

    /// Workbook serialization failed. Fatal.
    #[error("xlsx write error: {0}")]
    Serialization(#[from] XlsxError),
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
