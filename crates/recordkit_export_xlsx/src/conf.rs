//! Export constants and default preset factories.

use std::collections::BTreeMap;

use crate::spec::{EnumRowRole, SpecCellFormat, SpecExportOptions};

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Excel column width maximum, in character units.
pub const N_WIDTH_EXCEL_MAX: usize = 255;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];

/// Naive date-time layouts accepted for text timestamps (read as UTC).
pub const TUP_NAIVE_DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];
/// Bare date layout accepted for text timestamps (midnight UTC).
pub const C_DATE_ONLY_FORMAT: &str = "%Y-%m-%d";

/// Default minimum column width.
pub const N_WIDTH_CELL_MIN_DEFAULT: usize = 10;

// Fixed column layout: scalar block, then the two list columns.
pub const N_COL_TITLE: usize = 0;
pub const N_COL_LEADER: usize = 1;
pub const N_COL_PLACE: usize = 2;
pub const N_COL_DATE: usize = 3;
pub const N_COL_TIME: usize = 4;
pub const N_COL_CATEGORY: usize = 5;
/// Number of scalar columns (always merged per record).
pub const N_NCOLS_SCALAR: usize = 6;
pub const N_COL_DETAIL: usize = 6;
pub const N_COL_PARTICIPANT: usize = 7;
/// Total grid width.
pub const N_NCOLS_GRID: usize = 8;

/// Build the default style table keyed by row role.
pub fn derive_default_row_formats() -> BTreeMap<EnumRowRole, SpecCellFormat> {
    let cfg_base_fmt_spec = SpecCellFormat {
        font_name: Some("Times New Roman".to_string()),
        font_size: Some(11),
        align: Some("left".to_string()),
        valign: Some("vcenter".to_string()),
        ..Default::default()
    };

    let mut dict_fmt = BTreeMap::new();
    dict_fmt.insert(
        EnumRowRole::SummaryTitle,
        cfg_base_fmt_spec.with_(SpecCellFormat {
            bold: Some(true),
            font_size: Some(14),
            ..Default::default()
        }),
    );
    dict_fmt.insert(EnumRowRole::Summary, cfg_base_fmt_spec.clone());
    dict_fmt.insert(
        EnumRowRole::Header,
        cfg_base_fmt_spec.with_(SpecCellFormat {
            bold: Some(true),
            align: Some("center".to_string()),
            border: Some(1),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        EnumRowRole::Data,
        cfg_base_fmt_spec.with_(SpecCellFormat {
            top: Some(1),
            bottom: Some(1),
            left: Some(1),
            right: Some(1),
            ..Default::default()
        }),
    );

    dict_fmt
}

/// Build default export options.
pub fn derive_default_export_options() -> SpecExportOptions {
    SpecExportOptions::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_row_formats_cover_every_role() {
        let dict_fmt = derive_default_row_formats();
        for role in [
            EnumRowRole::SummaryTitle,
            EnumRowRole::Summary,
            EnumRowRole::Header,
            EnumRowRole::Data,
        ] {
            assert!(dict_fmt.contains_key(&role), "missing role {role:?}");
        }

        let fmt_header = &dict_fmt[&EnumRowRole::Header];
        assert_eq!(fmt_header.bold, Some(true));
        assert_eq!(fmt_header.align.as_deref(), Some("center"));
        assert_eq!(fmt_header.border, Some(1));

        let fmt_data = &dict_fmt[&EnumRowRole::Data];
        assert_eq!(
            (fmt_data.top, fmt_data.bottom, fmt_data.left, fmt_data.right),
            (Some(1), Some(1), Some(1), Some(1))
        );
        assert_eq!(dict_fmt[&EnumRowRole::Summary].border, None);
    }

    #[test]
    fn test_column_layout_is_contiguous() {
        assert_eq!(N_COL_CATEGORY + 1, N_NCOLS_SCALAR);
        assert_eq!(N_COL_DETAIL, N_NCOLS_SCALAR);
        assert_eq!(N_COL_PARTICIPANT + 1, N_NCOLS_GRID);
    }
}
