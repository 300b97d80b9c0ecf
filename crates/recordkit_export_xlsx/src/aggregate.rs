//! Record collection from the external store.
//!
//! Timestamps are normalized to `DateTime<Utc>`; records whose timestamp cannot
//! be normalized are dropped with a diagnostic and never abort the export.
//! Store failures do abort it, without retries.

use std::collections::BTreeMap;
use std::future::Future;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::conf::{C_DATE_ONLY_FORMAT, TUP_NAIVE_DATETIME_FORMATS};
use crate::spec::{
    EnumRawTimestamp, EnumRecordOrder, ExportError, SpecExportOptions, SpecExportReport,
    SpecRawRecord, SpecRecordChildren, SpecRecordFilter, SpecSourceRecord,
};

////////////////////////////////////////////////////////////////////////////////
// #region RecordStore

/// External record store.
///
/// The futures are the only suspension points of an export.
pub trait RecordStore {
    /// Fetch parent records in store order.
    fn fetch_raw_records(
        &self,
    ) -> impl Future<Output = Result<Vec<SpecRawRecord>, String>> + Send;

    /// Fetch the child sub-lists of one parent record.
    fn fetch_record_children(
        &self,
        record_id: &str,
    ) -> impl Future<Output = Result<SpecRecordChildren, String>> + Send;
}

/// In-memory store for embedding callers and tests.
///
/// Records without stored children resolve to empty sub-lists.
#[derive(Debug, Clone, Default)]
pub struct RecordStoreMemory {
    l_records: Vec<SpecRawRecord>,
    dict_children: BTreeMap<String, SpecRecordChildren>,
}

impl RecordStoreMemory {
    pub fn new(records: Vec<SpecRawRecord>) -> Self {
        Self {
            l_records: records,
            dict_children: BTreeMap::new(),
        }
    }

    /// Register child sub-lists for `record_id`.
    pub fn with_children(
        mut self,
        record_id: impl Into<String>,
        children: SpecRecordChildren,
    ) -> Self {
        self.dict_children.insert(record_id.into(), children);
        self
    }
}

/// Store contents as a JSON document:
/// `{"records": [...], "children": {"<record id>": {...}}}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SpecRecordDocument {
    records: Vec<SpecRawRecord>,
    children: BTreeMap<String, SpecRecordChildren>,
}

impl RecordStoreMemory {
    /// Load a store from a JSON records document.
    pub fn from_json_str(text: &str) -> Result<Self, ExportError> {
        let document: SpecRecordDocument =
            serde_json::from_str(text).map_err(|err| ExportError::FetchFailure {
                target: "records document".to_string(),
                message: err.to_string(),
            })?;
        Ok(Self {
            l_records: document.records,
            dict_children: document.children,
        })
    }
}

impl RecordStore for RecordStoreMemory {
    async fn fetch_raw_records(&self) -> Result<Vec<SpecRawRecord>, String> {
        Ok(self.l_records.clone())
    }

    async fn fetch_record_children(&self, record_id: &str) -> Result<SpecRecordChildren, String> {
        Ok(self
            .dict_children
            .get(record_id)
            .cloned()
            .unwrap_or_default())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region TimestampNormalization

fn parse_timestamp_text(text: &str) -> Option<DateTime<Utc>> {
    let c_text = text.trim();
    if c_text.is_empty() {
        return None;
    }
    if let Ok(val) = DateTime::parse_from_rfc3339(c_text) {
        return Some(val.with_timezone(&Utc));
    }
    for c_fmt in TUP_NAIVE_DATETIME_FORMATS {
        if let Ok(val) = NaiveDateTime::parse_from_str(c_text, c_fmt) {
            return Some(val.and_utc());
        }
    }
    NaiveDate::parse_from_str(c_text, C_DATE_ONLY_FORMAT)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|val| val.and_utc())
}

/// Normalize a raw timestamp; `None` when it cannot be represented.
pub fn normalize_raw_timestamp(raw: &EnumRawTimestamp) -> Option<DateTime<Utc>> {
    match raw {
        EnumRawTimestamp::Instant(val) => Some(*val),
        EnumRawTimestamp::Text(val) => parse_timestamp_text(val),
        EnumRawTimestamp::Epoch {
            seconds,
            nanoseconds,
        } => {
            if !(0..1_000_000_000).contains(nanoseconds) {
                return None;
            }
            DateTime::from_timestamp(*seconds, *nanoseconds as u32)
        }
    }
}

/// Normalize one record's timestamp or report it as malformed.
pub fn normalize_record_instant(record: &SpecRawRecord) -> Result<DateTime<Utc>, ExportError> {
    record
        .timestamp
        .as_ref()
        .and_then(normalize_raw_timestamp)
        .ok_or_else(|| ExportError::MalformedTimestamp {
            record_id: record.id.clone(),
        })
}

/// Local calendar date of `instant` at a fixed UTC offset.
pub fn derive_local_date(instant: &DateTime<Utc>, offset_utc_seconds: i32) -> NaiveDate {
    match FixedOffset::east_opt(offset_utc_seconds) {
        Some(tz) => instant.with_timezone(&tz).date_naive(),
        None => instant.date_naive(),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Selection

/// Whether a normalized record passes the category and date filters.
pub fn is_record_selected(category: &str, date: NaiveDate, filter: &SpecRecordFilter) -> bool {
    if let Some(c_category) = &filter.category
        && c_category != category
    {
        return false;
    }
    if let Some(date_start) = filter.date_start
        && date < date_start
    {
        return false;
    }
    if let Some(date_end) = filter.date_end
        && date > date_end
    {
        return false;
    }
    true
}

/// Normalize, filter and order raw records.
///
/// Malformed timestamps are excluded into `report` and logged.
pub fn select_raw_records(
    raw_records: Vec<SpecRawRecord>,
    filter: &SpecRecordFilter,
    options: &SpecExportOptions,
    report: &mut SpecExportReport,
) -> Vec<(SpecRawRecord, DateTime<Utc>)> {
    let mut l_selected = Vec::with_capacity(raw_records.len());
    for record in raw_records {
        let instant = match normalize_record_instant(&record) {
            Ok(val) => val,
            Err(err) => {
                tracing::warn!(
                    record_id = %record.id,
                    timestamp = ?record.timestamp,
                    "record excluded from export: {err}"
                );
                report.exclude(record.id.clone(), err.to_string());
                continue;
            }
        };

        let date = derive_local_date(&instant, options.offset_utc_seconds);
        if is_record_selected(&record.category, date, filter) {
            l_selected.push((record, instant));
        }
    }

    if options.record_order == EnumRecordOrder::Chronological {
        l_selected.sort_by_key(|(_, instant)| *instant);
    }
    l_selected
}

/// Build the normalized record from its raw parts.
pub fn build_source_record(
    raw: SpecRawRecord,
    instant: DateTime<Utc>,
    children: SpecRecordChildren,
    options: &SpecExportOptions,
) -> SpecSourceRecord {
    SpecSourceRecord {
        date: derive_local_date(&instant, options.offset_utc_seconds),
        id: raw.id,
        title: raw.title,
        leader: raw.leader,
        place: raw.place,
        time: raw.time,
        category: raw.category,
        instant,
        detail_items: children.detail_items,
        participant_items: children.participant_items,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Aggregation

/// Collect filtered records with their child sub-lists.
///
/// Child lists missing from a raw record are fetched from `store`, one record
/// at a time in output order. The first failed fetch aborts the call.
pub async fn aggregate_records<S: RecordStore>(
    store: &S,
    filter: &SpecRecordFilter,
    options: &SpecExportOptions,
    report: &mut SpecExportReport,
) -> Result<Vec<SpecSourceRecord>, ExportError> {
    let l_raw_records =
        store
            .fetch_raw_records()
            .await
            .map_err(|message| ExportError::FetchFailure {
                target: "records".to_string(),
                message,
            })?;
    let n_raw_records = l_raw_records.len();

    let l_selected = select_raw_records(l_raw_records, filter, options, report);

    let mut l_records = Vec::with_capacity(l_selected.len());
    for (mut raw, instant) in l_selected {
        let children = match (raw.detail_items.take(), raw.participant_items.take()) {
            (Some(detail_items), Some(participant_items)) => SpecRecordChildren {
                detail_items,
                participant_items,
            },
            (detail_items, participant_items) => {
                let fetched = store.fetch_record_children(&raw.id).await.map_err(|message| {
                    ExportError::FetchFailure {
                        target: format!("child items of record {:?}", raw.id),
                        message,
                    }
                })?;
                SpecRecordChildren {
                    detail_items: detail_items.unwrap_or(fetched.detail_items),
                    participant_items: participant_items.unwrap_or(fetched.participant_items),
                }
            }
        };
        l_records.push(build_source_record(raw, instant, children, options));
    }

    tracing::debug!(
        n_raw_records,
        n_selected = l_records.len(),
        n_excluded = report.excluded.len(),
        "records aggregated"
    );
    Ok(l_records)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn build_raw(id: &str, category: &str, ts: Option<EnumRawTimestamp>) -> SpecRawRecord {
        SpecRawRecord {
            id: id.to_string(),
            title: format!("title {id}"),
            category: category.to_string(),
            timestamp: ts,
            ..Default::default()
        }
    }

    fn text_ts(text: &str) -> Option<EnumRawTimestamp> {
        Some(EnumRawTimestamp::Text(text.to_string()))
    }

    struct RecordStoreFailing;

    impl RecordStore for RecordStoreFailing {
        async fn fetch_raw_records(&self) -> Result<Vec<SpecRawRecord>, String> {
            Ok(vec![build_raw("r1", "weekly", text_ts("2024-01-01"))])
        }

        async fn fetch_record_children(
            &self,
            _record_id: &str,
        ) -> Result<SpecRecordChildren, String> {
            Err("connection reset".to_string())
        }
    }

    #[test]
    fn test_normalize_raw_timestamp_shapes() {
        let expected = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(
            normalize_raw_timestamp(&EnumRawTimestamp::Instant(expected)),
            Some(expected)
        );
        assert_eq!(
            normalize_raw_timestamp(&EnumRawTimestamp::Text("2024-03-01T10:00:00Z".into())),
            Some(expected)
        );
        assert_eq!(
            normalize_raw_timestamp(&EnumRawTimestamp::Text(" 2024-03-01T10:00:00 ".into())),
            Some(expected)
        );
        assert_eq!(
            normalize_raw_timestamp(&EnumRawTimestamp::Text("2024-03-01T19:00:00+09:00".into())),
            Some(expected)
        );
        assert_eq!(
            normalize_raw_timestamp(&EnumRawTimestamp::Epoch {
                seconds: expected.timestamp(),
                nanoseconds: 0
            }),
            Some(expected)
        );
        assert_eq!(
            normalize_raw_timestamp(&EnumRawTimestamp::Text("2024-03-01".into()))
                .map(|v| v.timestamp()),
            Some(expected.timestamp() - 10 * 3600)
        );
    }

    #[test]
    fn test_normalize_rejects_malformed() {
        assert_eq!(
            normalize_raw_timestamp(&EnumRawTimestamp::Text("yesterday".into())),
            None
        );
        assert_eq!(normalize_raw_timestamp(&EnumRawTimestamp::Text("".into())), None);
        assert_eq!(
            normalize_raw_timestamp(&EnumRawTimestamp::Epoch {
                seconds: 0,
                nanoseconds: 1_000_000_000
            }),
            None
        );
        assert_eq!(
            normalize_raw_timestamp(&EnumRawTimestamp::Epoch {
                seconds: i64::MAX,
                nanoseconds: 0
            }),
            None
        );
    }

    #[test]
    fn test_select_excludes_malformed_and_filters() {
        let raw = vec![
            build_raw("a", "weekly", text_ts("2024-01-10")),
            build_raw("b", "weekly", text_ts("not a date")),
            build_raw("c", "board", text_ts("2024-01-11")),
            build_raw("d", "weekly", None),
            build_raw("e", "weekly", text_ts("2024-02-01")),
        ];
        let filter = SpecRecordFilter {
            category: Some("weekly".to_string()),
            date_start: NaiveDate::from_ymd_opt(2024, 1, 1),
            date_end: NaiveDate::from_ymd_opt(2024, 1, 31),
        };
        let mut report = SpecExportReport::default();

        let l_selected =
            select_raw_records(raw, &filter, &SpecExportOptions::default(), &mut report);

        assert_eq!(
            l_selected.iter().map(|(r, _)| r.id.as_str()).collect::<Vec<_>>(),
            vec!["a"]
        );
        assert_eq!(
            report
                .excluded
                .iter()
                .map(|e| e.record_id.as_str())
                .collect::<Vec<_>>(),
            vec!["b", "d"]
        );
    }

    #[test]
    fn test_date_filter_uses_local_offset() {
        let raw = vec![build_raw("late", "x", text_ts("2024-01-31T20:00:00Z"))];
        let filter = SpecRecordFilter {
            date_end: NaiveDate::from_ymd_opt(2024, 1, 31),
            ..Default::default()
        };
        let options = SpecExportOptions {
            offset_utc_seconds: 9 * 3600,
            ..Default::default()
        };
        let mut report = SpecExportReport::default();

        assert!(select_raw_records(raw, &filter, &options, &mut report).is_empty());
    }

    #[test]
    fn test_chronological_order_is_stable() {
        let raw = vec![
            build_raw("late", "x", text_ts("2024-01-03")),
            build_raw("tie-1", "x", text_ts("2024-01-02")),
            build_raw("early", "x", text_ts("2024-01-01")),
            build_raw("tie-2", "x", text_ts("2024-01-02")),
        ];
        let options = SpecExportOptions {
            record_order: EnumRecordOrder::Chronological,
            ..Default::default()
        };
        let mut report = SpecExportReport::default();

        let l_ids: Vec<String> = select_raw_records(
            raw.clone(),
            &SpecRecordFilter::default(),
            &options,
            &mut report,
        )
        .into_iter()
        .map(|(r, _)| r.id)
        .collect();
        assert_eq!(l_ids, vec!["early", "tie-1", "tie-2", "late"]);

        let l_ids_original: Vec<String> = select_raw_records(
            raw,
            &SpecRecordFilter::default(),
            &SpecExportOptions::default(),
            &mut report,
        )
        .into_iter()
        .map(|(r, _)| r.id)
        .collect();
        assert_eq!(l_ids_original, vec!["late", "tie-1", "early", "tie-2"]);
    }

    #[tokio::test]
    async fn test_aggregate_fetches_missing_children() {
        let mut attached = build_raw("attached", "weekly", text_ts("2024-01-02"));
        attached.detail_items = Some(vec!["inline".to_string()]);
        attached.participant_items = Some(vec![]);

        let store = RecordStoreMemory::new(vec![
            build_raw("fetched", "weekly", text_ts("2024-01-01")),
            attached,
        ])
        .with_children(
            "fetched",
            SpecRecordChildren {
                detail_items: vec!["d1".to_string(), "d2".to_string()],
                participant_items: vec!["p1".to_string()],
            },
        )
        .with_children(
            "attached",
            SpecRecordChildren {
                detail_items: vec!["ignored".to_string()],
                participant_items: vec!["ignored".to_string()],
            },
        );

        let mut report = SpecExportReport::default();
        let l_records = aggregate_records(
            &store,
            &SpecRecordFilter::default(),
            &SpecExportOptions::default(),
            &mut report,
        )
        .await
        .unwrap();

        assert_eq!(l_records.len(), 2);
        assert_eq!(l_records[0].detail_items, vec!["d1", "d2"]);
        assert_eq!(l_records[0].participant_items, vec!["p1"]);
        assert_eq!(l_records[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(l_records[1].detail_items, vec!["inline"]);
        assert!(l_records[1].participant_items.is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_aborts_on_fetch_failure() {
        let mut report = SpecExportReport::default();
        let err = aggregate_records(
            &RecordStoreFailing,
            &SpecRecordFilter::default(),
            &SpecExportOptions::default(),
            &mut report,
        )
        .await
        .unwrap_err();

        match err {
            ExportError::FetchFailure { target, message } => {
                assert!(target.contains("r1"));
                assert_eq!(message, "connection reset");
            }
            other => panic!("Expected FetchFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_store_from_json_document() {
        let store = RecordStoreMemory::from_json_str(
            r#"{
                "records": [
                    {"id": "a", "category": "weekly", "timestamp": "2024-01-02T09:00:00Z"},
                    {
                        "id": "b",
                        "category": "weekly",
                        "timestamp": {"_seconds": 1704067200, "_nanoseconds": 0},
                        "detailItems": ["inline"],
                        "participantItems": []
                    },
                    {"id": "c", "category": "weekly", "timestamp": "not a date"}
                ],
                "children": {"a": {"detail_items": ["d1"], "participantItems": ["p1", "p2"]}}
            }"#,
        )
        .unwrap();

        let mut report = SpecExportReport::default();
        let l_records = aggregate_records(
            &store,
            &SpecRecordFilter::default(),
            &SpecExportOptions::default(),
            &mut report,
        )
        .await
        .unwrap();

        assert_eq!(l_records.len(), 2);
        assert_eq!(l_records[0].participant_items, vec!["p1", "p2"]);
        assert_eq!(l_records[1].detail_items, vec!["inline"]);
        assert_eq!(l_records[1].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(report.excluded.len(), 1);
        assert_eq!(report.excluded[0].record_id, "c");
    }

    #[test]
    fn test_store_from_json_rejects_bad_document() {
        let err = RecordStoreMemory::from_json_str(r#"{"records": 5}"#).unwrap_err();
        assert!(matches!(err, ExportError::FetchFailure { .. }));
    }
}
