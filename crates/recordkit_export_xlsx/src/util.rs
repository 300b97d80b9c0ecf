//! Stateless helper utilities shared by the grid builder and the serializer.

use crate::conf::{
    N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, N_WIDTH_CELL_MIN_DEFAULT,
    TUP_EXCEL_ILLEGAL,
};
use crate::spec::{EnumCellValue, SpecGridCell};

////////////////////////////////////////////////////////////////////////////////
// #region CellValueConversion

/// Render a cell value as the text a reader would see.
pub fn stringify_cell_value(value: &EnumCellValue) -> String {
    match value {
        EnumCellValue::None => String::new(),
        EnumCellValue::String(s) => s.clone(),
        EnumCellValue::Number(n) => {
            if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
                (*n as i64).to_string()
            } else {
                n.to_string()
            }
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ColumnWidth

/// Estimate displayed width units for one string.
///
/// Non-ASCII characters count 1.6 units, so the estimate never falls below
/// the character count.
pub fn estimate_unicode_string_width(s: &str) -> usize {
    let n_ascii = s.chars().filter(|chr| chr.is_ascii()).count();
    let n_non_ascii = s.chars().count().saturating_sub(n_ascii);
    n_ascii + (n_non_ascii as f64 * 1.6).round() as usize
}

/// Width of one cell value.
///
/// Character count of the stringified value, or display units when
/// `if_estimate_display_width` is set.
pub fn estimate_width_len(value: &EnumCellValue, if_estimate_display_width: bool) -> usize {
    match value {
        EnumCellValue::None => 0,
        EnumCellValue::String(s) if if_estimate_display_width => estimate_unicode_string_width(s),
        _ => stringify_cell_value(value).chars().count(),
    }
}

/// Derive per-column widths as `max(width_cell_min, longest cell)`.
///
/// Every row is scanned, blank cells included. The floor never drops below
/// `N_WIDTH_CELL_MIN_DEFAULT`. No upper clamp is applied here.
pub fn plan_column_widths(
    rows: &[Vec<SpecGridCell>],
    width: usize,
    width_cell_min: usize,
    if_estimate_display_width: bool,
) -> Vec<usize> {
    let n_width_floor = usize::max(N_WIDTH_CELL_MIN_DEFAULT, width_cell_min);
    let mut l_width_by_col = vec![n_width_floor; width];
    for row in rows {
        for (n_idx_col, cell) in row.iter().enumerate().take(width) {
            l_width_by_col[n_idx_col] = usize::max(
                l_width_by_col[n_idx_col],
                estimate_width_len(&cell.value, if_estimate_display_width),
            );
        }
    }
    l_width_by_col
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetNormalization

/// Replace invalid chars and trim to valid Excel sheet name.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    c_name = c_name.trim().to_string();
    if c_name.is_empty() {
        c_name = "Sheet".to_string();
    }

    c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect()
}

/// Check that a `height x width` grid fits into one worksheet.
pub fn validate_grid_extent(height: usize, width: usize) -> Result<(), String> {
    if height > N_NROWS_EXCEL_MAX {
        return Err(format!(
            "{height} rows exceed the Excel limit of {N_NROWS_EXCEL_MAX}."
        ));
    }
    if width > N_NCOLS_EXCEL_MAX {
        return Err(format!(
            "{width} columns exceed the Excel limit of {N_NCOLS_EXCEL_MAX}."
        ));
    }
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
