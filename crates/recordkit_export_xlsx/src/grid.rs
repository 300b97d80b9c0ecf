//! Grid materialization from summary rows and record layout plans.

use std::collections::BTreeMap;

use crate::conf::N_NCOLS_GRID;
use crate::layout::plan_layout;
use crate::spec::{
    EnumCellValue, EnumRowRole, ExportError, SpecExportOptions, SpecGridCell, SpecMergeRange,
    SpecRecordFilter, SpecRecordLayout, SpecSourceRecord, SpecWorkbookGrid,
};
use crate::summary::build_summary_rows;
use crate::util::{plan_column_widths, validate_grid_extent};

/// Accumulates rows and merge ownership for one export call.
///
/// Each cell may belong to at most one recorded range, and only a range's
/// anchor cell may receive a value.
pub struct GridWriter {
    width: usize,
    rows: Vec<Vec<SpecGridCell>>,
    row_roles: Vec<EnumRowRole>,
    merges: Vec<SpecMergeRange>,
    dict_cell_owner: BTreeMap<(usize, usize), usize>,
    row_header: Option<usize>,
}

impl GridWriter {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            rows: Vec::new(),
            row_roles: Vec::new(),
            merges: Vec::new(),
            dict_cell_owner: BTreeMap::new(),
            row_header: None,
        }
    }

    /// Rows written so far; also the next free row index.
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    fn push_blank_row(&mut self, role: EnumRowRole) {
        let n_row = self.rows.len();
        self.rows.push(
            (0..self.width)
                .map(|col| SpecGridCell {
                    row: n_row,
                    col,
                    ..Default::default()
                })
                .collect(),
        );
        self.row_roles.push(role);
    }

    /// Append one unmerged row; missing trailing values stay blank.
    pub fn push_row(&mut self, role: EnumRowRole, values: Vec<EnumCellValue>) -> usize {
        let n_row = self.rows.len();
        self.push_blank_row(role);
        for (n_col, value) in values.into_iter().take(self.width).enumerate() {
            self.rows[n_row][n_col].value = value;
        }
        if role == EnumRowRole::Header {
            self.row_header = Some(n_row);
        }
        n_row
    }

    fn assign_merge(&mut self, merge: SpecMergeRange) -> Result<(), ExportError> {
        for n_row in merge.row_start..=merge.row_end {
            if self.dict_cell_owner.contains_key(&(n_row, merge.col)) {
                return Err(ExportError::MergeConflict {
                    row: n_row,
                    col: merge.col,
                });
            }
        }

        let n_idx_merge = self.merges.len();
        for n_row in merge.row_start..=merge.row_end {
            self.dict_cell_owner.insert((n_row, merge.col), n_idx_merge);
            self.rows[n_row][merge.col].if_part_of_merge = !merge.is_trivial();
        }
        self.merges.push(merge);
        Ok(())
    }

    fn write_value(
        &mut self,
        row: usize,
        col: usize,
        value: EnumCellValue,
    ) -> Result<(), ExportError> {
        if let Some(n_idx_merge) = self.dict_cell_owner.get(&(row, col))
            && self.merges[*n_idx_merge].row_start != row
        {
            return Err(ExportError::MergeConflict { row, col });
        }

        let cell = &mut self.rows[row][col];
        if cell.value != EnumCellValue::None {
            return Err(ExportError::MergeConflict { row, col });
        }
        cell.value = value;
        Ok(())
    }

    /// Materialize one record's planned ranges and values.
    ///
    /// The layout must start at the next free row.
    pub fn write_record_layout(&mut self, layout: &SpecRecordLayout) -> Result<(), ExportError> {
        if layout.row_start != self.rows.len() {
            return Err(ExportError::LayoutMisaligned {
                row_start: layout.row_start,
                row_next: self.rows.len(),
            });
        }
        if layout.placements.iter().any(|p| p.col >= self.width)
            || layout.merges.iter().any(|m| m.col >= self.width)
        {
            return Err(ExportError::Capacity(format!(
                "record layout addresses a column beyond grid width {}",
                self.width
            )));
        }

        for _ in 0..layout.row_span {
            self.push_blank_row(EnumRowRole::Data);
        }
        for merge in &layout.merges {
            self.assign_merge(*merge)?;
        }
        for placement in &layout.placements {
            self.write_value(placement.row, placement.col, placement.value.clone())?;
        }
        Ok(())
    }

    /// Close the grid and derive column widths.
    pub fn finish(self, options: &SpecExportOptions) -> SpecWorkbookGrid {
        let widths_by_col = plan_column_widths(
            &self.rows,
            self.width,
            options.width_cell_min,
            options.if_estimate_display_width,
        );
        SpecWorkbookGrid {
            row_header: self.row_header.unwrap_or(0),
            rows: self.rows,
            row_roles: self.row_roles,
            merges: self.merges,
            widths_by_col,
            width: self.width,
        }
    }
}

/// Build the complete grid: summary block, header row, then record rows.
pub fn build_workbook_grid(
    records: &[SpecSourceRecord],
    filter: &SpecRecordFilter,
    options: &SpecExportOptions,
) -> Result<SpecWorkbookGrid, ExportError> {
    options.validate()?;

    let mut writer = GridWriter::new(N_NCOLS_GRID);
    for (role, values) in build_summary_rows(records, filter, options) {
        writer.push_row(role, values);
    }

    let plan = plan_layout(records, writer.height(), options);
    validate_grid_extent(plan.row_end_exclusive, N_NCOLS_GRID).map_err(ExportError::Capacity)?;
    for layout in &plan.records {
        writer.write_record_layout(layout)?;
    }

    let grid = writer.finish(options);
    tracing::debug!(
        n_rows = grid.height(),
        n_rows_data = grid.height_data(),
        n_merges = grid.merges.len(),
        "workbook grid built"
    );
    Ok(grid)
}
