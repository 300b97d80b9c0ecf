//! Row-span and merge planning for record rows.
//!
//! Every merge range is computed here, before any cell exists. A record at
//! cursor row `r` with span `s` only ever receives ranges inside `[r, r+s-1]`
//! and the cursor then moves to `r+s`, so ranges in one column cannot overlap.

use chrono::{FixedOffset, TimeZone};

use crate::conf::{
    N_COL_CATEGORY, N_COL_DATE, N_COL_DETAIL, N_COL_LEADER, N_COL_PARTICIPANT, N_COL_PLACE,
    N_COL_TIME, N_COL_TITLE,
};
use crate::spec::{
    EnumCellValue, SpecCellPlacement, SpecExportOptions, SpecLayoutPlan, SpecMergeRange,
    SpecRecordLayout, SpecSourceRecord,
};

/// Rows one record occupies: longest sub-list, at least 1.
pub fn derive_row_span(n_detail_items: usize, n_participant_items: usize) -> usize {
    n_detail_items.max(n_participant_items).max(1)
}

/// Scalar column values of one record, in column order.
pub fn derive_scalar_values(
    record: &SpecSourceRecord,
    options: &SpecExportOptions,
) -> Vec<(usize, String)> {
    let c_date = record.date.format(&options.date_format).to_string();
    let c_time = if record.time.trim().is_empty() {
        match FixedOffset::east_opt(options.offset_utc_seconds) {
            Some(tz) => tz
                .from_utc_datetime(&record.instant.naive_utc())
                .format(&options.time_format)
                .to_string(),
            None => record.instant.format(&options.time_format).to_string(),
        }
    } else {
        record.time.clone()
    };

    vec![
        (N_COL_TITLE, record.title.clone()),
        (N_COL_LEADER, record.leader.clone()),
        (N_COL_PLACE, record.place.clone()),
        (N_COL_DATE, c_date),
        (N_COL_TIME, c_time),
        (N_COL_CATEGORY, record.category.clone()),
    ]
}

/// Plan one list column.
///
/// Zero or one item: a single range over the whole span holding the item (or
/// an empty string). More items: no range, one item per row from `row_start`,
/// rows past the last item stay blank.
fn plan_list_column(
    items: &[String],
    col: usize,
    row_start: usize,
    row_span: usize,
    merges: &mut Vec<SpecMergeRange>,
    placements: &mut Vec<SpecCellPlacement>,
) {
    if items.len() <= 1 {
        merges.push(SpecMergeRange {
            row_start,
            row_end: row_start + row_span - 1,
            col,
        });
        placements.push(SpecCellPlacement {
            row: row_start,
            col,
            value: EnumCellValue::text(items.first().cloned().unwrap_or_default()),
        });
        return;
    }

    for (n_offset, item) in items.iter().enumerate() {
        placements.push(SpecCellPlacement {
            row: row_start + n_offset,
            col,
            value: EnumCellValue::text(item.clone()),
        });
    }
}

/// Plan merges and values for one record starting at `row_start`.
pub fn plan_record_layout(
    record: &SpecSourceRecord,
    row_start: usize,
    options: &SpecExportOptions,
) -> SpecRecordLayout {
    let n_row_span = derive_row_span(record.detail_items.len(), record.participant_items.len());
    let n_row_end = row_start + n_row_span - 1;

    let l_scalar_values = derive_scalar_values(record, options);
    let mut l_merges = Vec::with_capacity(l_scalar_values.len() + 2);
    let mut l_placements = Vec::with_capacity(l_scalar_values.len() + n_row_span * 2);

    for (n_col, c_value) in l_scalar_values {
        l_merges.push(SpecMergeRange {
            row_start,
            row_end: n_row_end,
            col: n_col,
        });
        l_placements.push(SpecCellPlacement {
            row: row_start,
            col: n_col,
            value: EnumCellValue::text(c_value),
        });
    }

    plan_list_column(
        &record.detail_items,
        N_COL_DETAIL,
        row_start,
        n_row_span,
        &mut l_merges,
        &mut l_placements,
    );
    plan_list_column(
        &record.participant_items,
        N_COL_PARTICIPANT,
        row_start,
        n_row_span,
        &mut l_merges,
        &mut l_placements,
    );

    SpecRecordLayout {
        row_start,
        row_span: n_row_span,
        merges: l_merges,
        placements: l_placements,
    }
}

/// Plan all records back to back, the first one at `row_start`.
pub fn plan_layout(
    records: &[SpecSourceRecord],
    row_start: usize,
    options: &SpecExportOptions,
) -> SpecLayoutPlan {
    let mut n_row_cursor = row_start;
    let mut l_layouts = Vec::with_capacity(records.len());

    for record in records {
        let layout = plan_record_layout(record, n_row_cursor, options);
        n_row_cursor = layout.row_end_exclusive();
        l_layouts.push(layout);
    }

    tracing::debug!(
        n_records = records.len(),
        row_start,
        row_end_exclusive = n_row_cursor,
        "record layout planned"
    );

    SpecLayoutPlan {
        row_start,
        row_end_exclusive: n_row_cursor,
        records: l_layouts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::N_NCOLS_SCALAR;

    fn build_record(title: &str, details: &[&str], participants: &[&str]) -> SpecSourceRecord {
        SpecSourceRecord {
            id: title.to_string(),
            title: title.to_string(),
            time: "10:00".to_string(),
            detail_items: details.iter().map(|s| s.to_string()).collect(),
            participant_items: participants.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn placement_at(layout: &SpecRecordLayout, row: usize, col: usize) -> Option<&EnumCellValue> {
        layout
            .placements
            .iter()
            .find(|p| p.row == row && p.col == col)
            .map(|p| &p.value)
    }

    #[test]
    fn test_derive_row_span() {
        assert_eq!(derive_row_span(0, 0), 1);
        assert_eq!(derive_row_span(1, 0), 1);
        assert_eq!(derive_row_span(1, 2), 2);
        assert_eq!(derive_row_span(3, 1), 3);
    }

    #[test]
    fn test_single_detail_merges_across_span() {
        let options = SpecExportOptions::default();
        let layout = plan_record_layout(&build_record("A", &["d1"], &["p1", "p2"]), 4, &options);

        assert_eq!(layout.row_span, 2);
        assert!(layout.merges.contains(&SpecMergeRange {
            row_start: 4,
            row_end: 5,
            col: N_COL_DETAIL
        }));
        assert_eq!(
            placement_at(&layout, 4, N_COL_DETAIL),
            Some(&EnumCellValue::text("d1"))
        );
        assert!(!layout.merges.iter().any(|m| m.col == N_COL_PARTICIPANT));
        assert_eq!(
            placement_at(&layout, 5, N_COL_PARTICIPANT),
            Some(&EnumCellValue::text("p2"))
        );
        for col in 0..N_NCOLS_SCALAR {
            assert!(layout.merges.contains(&SpecMergeRange {
                row_start: 4,
                row_end: 5,
                col
            }));
        }
    }

    #[test]
    fn test_empty_lists_record_trivial_ranges() {
        let options = SpecExportOptions::default();
        let layout = plan_record_layout(&build_record("C", &[], &[]), 0, &options);

        assert_eq!(layout.row_span, 1);
        assert_eq!(layout.merges.len(), N_NCOLS_SCALAR + 2);
        assert!(layout.merges.iter().all(|m| m.is_trivial()));
        assert_eq!(
            placement_at(&layout, 0, N_COL_DETAIL),
            Some(&EnumCellValue::text(""))
        );
        assert_eq!(
            placement_at(&layout, 0, N_COL_PARTICIPANT),
            Some(&EnumCellValue::text(""))
        );
    }

    #[test]
    fn test_long_detail_list_leaves_trailing_rows_blank() {
        let options = SpecExportOptions::default();
        let layout =
            plan_record_layout(&build_record("E", &["d1", "d2"], &["p1", "p2", "p3"]), 0, &options);

        assert_eq!(layout.row_span, 3);
        assert!(!layout.merges.iter().any(|m| m.col == N_COL_DETAIL));
        assert_eq!(placement_at(&layout, 2, N_COL_DETAIL), None);
    }

    #[test]
    fn test_plan_layout_advances_cursor_by_span() {
        let options = SpecExportOptions::default();
        let records = vec![
            build_record("A", &["d1"], &["p1", "p2"]),
            build_record("B", &[], &[]),
            build_record("C", &["d1", "d2", "d3"], &["p1"]),
        ];
        let plan = plan_layout(&records, 7, &options);

        assert_eq!(
            plan.records.iter().map(|l| l.row_start).collect::<Vec<_>>(),
            vec![7, 9, 10]
        );
        assert_eq!(plan.row_end_exclusive, 13);
        assert_eq!(plan.height_data(), 6);
    }

    #[test]
    fn test_time_falls_back_to_instant() {
        let options = SpecExportOptions {
            offset_utc_seconds: 9 * 3600,
            ..Default::default()
        };
        let record = SpecSourceRecord {
            instant: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            ..Default::default()
        };
        let l_values = derive_scalar_values(&record, &options);
        // 2023-11-14T22:13:20Z is 07:13 at UTC+9.
        assert_eq!(l_values[N_COL_TIME].1, "07:13");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_record() -> impl Strategy<Value = SpecSourceRecord> {
            (
                proptest::collection::vec("[a-z]{0,6}", 0..5),
                proptest::collection::vec("[a-z]{0,6}", 0..5),
            )
                .prop_map(|(details, participants)| SpecSourceRecord {
                    detail_items: details,
                    participant_items: participants,
                    ..Default::default()
                })
        }

        proptest! {
            #[test]
            fn test_total_rows_equal_sum_of_spans(
                records in proptest::collection::vec(arb_record(), 0..12),
                row_start in 0usize..20,
            ) {
                let plan = plan_layout(&records, row_start, &SpecExportOptions::default());
                let n_sum: usize = records.iter().map(|r| r.row_span()).sum();
                prop_assert_eq!(plan.height_data(), n_sum);
            }

            #[test]
            fn test_merges_never_overlap_within_column(
                records in proptest::collection::vec(arb_record(), 0..12),
            ) {
                let plan = plan_layout(&records, 0, &SpecExportOptions::default());
                let l_merges: Vec<_> = plan.merges().copied().collect();
                for (i, a) in l_merges.iter().enumerate() {
                    for b in &l_merges[i + 1..] {
                        prop_assert!(!a.overlaps(b), "{:?} overlaps {:?}", a, b);
                    }
                }
            }

            #[test]
            fn test_ranges_stay_inside_record_rows(
                records in proptest::collection::vec(arb_record(), 0..12),
            ) {
                let plan = plan_layout(&records, 3, &SpecExportOptions::default());
                for layout in &plan.records {
                    for m in &layout.merges {
                        prop_assert_eq!(m.row_start, layout.row_start);
                        prop_assert_eq!(m.row_end + 1, layout.row_end_exclusive());
                    }
                    for p in &layout.placements {
                        prop_assert!(
                            p.row >= layout.row_start && p.row < layout.row_end_exclusive()
                        );
                    }
                }
            }
        }
    }
}
