//! XLSX serializer that turns a finished workbook grid into workbook bytes.

use std::collections::BTreeMap;
use std::path::Path;

use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet};

use crate::conf::N_WIDTH_EXCEL_MAX;
use crate::spec::{
    EnumCellValue, EnumRowRole, ExportError, SpecCellFormat, SpecExportOptions, SpecWorkbookGrid,
};
use crate::util::{sanitize_sheet_name, validate_grid_extent};

/// Serialize the grid into an in-memory XLSX buffer.
pub fn serialize_workbook_grid(
    grid: &SpecWorkbookGrid,
    options: &SpecExportOptions,
) -> Result<Vec<u8>, ExportError> {
    let mut workbook = derive_workbook(grid, options)?;
    let buffer = workbook.save_to_buffer()?;
    tracing::debug!(n_bytes = buffer.len(), "workbook serialized");
    Ok(buffer)
}

/// Serialize the grid straight into a file.
pub fn save_workbook_grid(
    grid: &SpecWorkbookGrid,
    options: &SpecExportOptions,
    path_file_out: impl AsRef<Path>,
) -> Result<(), ExportError> {
    let mut workbook = derive_workbook(grid, options)?;
    workbook.save(path_file_out.as_ref())?;
    tracing::debug!(path = %path_file_out.as_ref().display(), "workbook saved");
    Ok(())
}

fn derive_workbook(
    grid: &SpecWorkbookGrid,
    options: &SpecExportOptions,
) -> Result<Workbook, ExportError> {
    validate_grid_extent(grid.height(), grid.width).map_err(ExportError::Capacity)?;

    let dict_fmt_by_role: BTreeMap<EnumRowRole, Format> = [
        EnumRowRole::SummaryTitle,
        EnumRowRole::Summary,
        EnumRowRole::Header,
        EnumRowRole::Data,
    ]
    .into_iter()
    .map(|role| (role, derive_rust_xlsx_format(&options.format_for_role(role))))
    .collect();

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sanitize_sheet_name(&options.sheet_name, "_"))?;

    for (row_idx, row_cells) in grid.rows.iter().enumerate() {
        let role = grid
            .row_roles
            .get(row_idx)
            .copied()
            .unwrap_or(EnumRowRole::Data);
        let format = &dict_fmt_by_role[&role];
        for cell in row_cells {
            // Covered cells of a real merge are written by `merge_range` below.
            if cell.if_part_of_merge {
                continue;
            }
            write_cell_with_format(worksheet, cell.row, cell.col, &cell.value, format)?;
        }
    }

    let fmt_data = &dict_fmt_by_role[&EnumRowRole::Data];
    for merge in grid.merges.iter().filter(|m| !m.is_trivial()) {
        let value = grid
            .cell(merge.row_start, merge.col)
            .map(|cell| &cell.value)
            .unwrap_or(&EnumCellValue::None);
        write_merge_with_format(
            worksheet,
            merge.row_start,
            merge.row_end,
            merge.col,
            value,
            fmt_data,
        )?;
    }

    for (col_idx, n_width) in grid.widths_by_col.iter().enumerate() {
        let n_width_final = usize::min(N_WIDTH_EXCEL_MAX, *n_width);
        worksheet.set_column_width(cast_col_num(col_idx)?, n_width_final as f64)?;
    }

    Ok(workbook)
}

fn write_merge_with_format(
    worksheet: &mut Worksheet,
    row_start: usize,
    row_end: usize,
    col_idx: usize,
    value: &EnumCellValue,
    format: &Format,
) -> Result<(), ExportError> {
    let n_row_start = cast_row_num(row_start)?;
    let n_row_end = cast_row_num(row_end)?;
    let n_col = cast_col_num(col_idx)?;

    match value {
        EnumCellValue::None => {
            worksheet.merge_range(n_row_start, n_col, n_row_end, n_col, "", format)?;
        }
        EnumCellValue::String(val) => {
            worksheet.merge_range(n_row_start, n_col, n_row_end, n_col, val, format)?;
        }
        EnumCellValue::Number(val) => {
            worksheet.merge_range(n_row_start, n_col, n_row_end, n_col, "", format)?;
            worksheet.write_number_with_format(n_row_start, n_col, *val, format)?;
        }
    }
    Ok(())
}

fn write_cell_with_format(
    worksheet: &mut Worksheet,
    row_idx: usize,
    col_idx: usize,
    value: &EnumCellValue,
    format: &Format,
) -> Result<(), ExportError> {
    let n_row = cast_row_num(row_idx)?;
    let n_col = cast_col_num(col_idx)?;

    match value {
        EnumCellValue::None => {
            worksheet.write_blank(n_row, n_col, format)?;
        }
        EnumCellValue::String(val) => {
            worksheet.write_string_with_format(n_row, n_col, val, format)?;
        }
        EnumCellValue::Number(val) => {
            worksheet.write_number_with_format(n_row, n_col, *val, format)?;
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
    if spec.italic.unwrap_or(false) {
        format = format.set_italic();
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
    if let Some(val) = &spec.bg_color {
        format = format.set_background_color(val.as_str());
    }
    if let Some(val) = &spec.font_color {
        format = format.set_font_color(val.as_str());
    }

    if let Some(val) = spec.border {
        format = format.set_border(derive_format_border(val));
    }
    if let Some(val) = spec.top {
        format = format.set_border_top(derive_format_border(val));
    }
    if let Some(val) = spec.bottom {
        format = format.set_border_bottom(derive_format_border(val));
    }
    if let Some(val) = spec.left {
        format = format.set_border_left(derive_format_border(val));
    }
    if let Some(val) = spec.right {
        format = format.set_border_right(derive_format_border(val));
    }

    if spec.text_wrap.unwrap_or(false) {
        format = format.set_text_wrap();
    }

    format
}

fn derive_format_border(border: i64) -> FormatBorder {
    match border {
        1 => FormatBorder::Thin,
        2 => FormatBorder::Medium,
        3 => FormatBorder::Dashed,
        4 => FormatBorder::Dotted,
        5 => FormatBorder::Thick,
        6 => FormatBorder::Double,
        7 => FormatBorder::Hair,
        _ => FormatBorder::None,
    }
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

fn cast_row_num(value: usize) -> Result<u32, ExportError> {
    u32::try_from(value).map_err(|_| ExportError::Capacity(format!("row index overflow: {value}")))
}

fn cast_col_num(value: usize) -> Result<u16, ExportError> {
    u16::try_from(value)
        .map_err(|_| ExportError::Capacity(format!("column index overflow: {value}")))
}
