//! Tile-partitioned damage tracking.
//!
//! The grid is partitioned into fixed-size cell tiles; updates mark tiles
//! dirty in O(1) and frame production drains the dirty set exactly once.
//! Overlay changes (cursor, selection) are tracked with a separate flag
//! because overlays are not tile-partitioned. A full-redraw flag
//! supersedes all incremental damage, and replacing the grid invalidates
//! every stored tile index.

use crate::layout::{CellRect, GridDims};

/// Tile width in cells.
pub const TILE_WIDTH: usize = 8;
/// Tile height in cells.
pub const TILE_HEIGHT: usize = 4;

/// Index math for the tile partition of a grid.
///
/// Edge tiles are clamped to the grid, so rect lookups never extend past
/// the last row or column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    grid: GridDims,
    tile_cols: usize,
    tile_rows: usize,
}

impl TileLayout {
    pub fn new(grid: GridDims) -> Self {
        Self {
            grid,
            tile_cols: grid.columns.div_ceil(TILE_WIDTH).max(1),
            tile_rows: grid.rows.div_ceil(TILE_HEIGHT).max(1),
        }
    }

    pub fn grid(&self) -> GridDims {
        self.grid
    }

    pub fn tile_cols(&self) -> usize {
        self.tile_cols
    }

    pub fn tile_rows(&self) -> usize {
        self.tile_rows
    }

    pub fn tile_count(&self) -> usize {
        self.tile_cols * self.tile_rows
    }

    /// Tile index covering a cell. Out-of-grid coordinates clamp to the
    /// edge tile.
    pub fn tile_for_cell(&self, row: usize, col: usize) -> usize {
        let tile_row = (row / TILE_HEIGHT).min(self.tile_rows - 1);
        let tile_col = (col / TILE_WIDTH).min(self.tile_cols - 1);
        tile_row * self.tile_cols + tile_col
    }

    /// Cell rect covered by a tile, clamped to the grid.
    pub fn tile_rect(&self, index: usize) -> CellRect {
        let tile_row = index / self.tile_cols;
        let tile_col = index % self.tile_cols;
        let row = tile_row * TILE_HEIGHT;
        let col = tile_col * TILE_WIDTH;
        CellRect {
            row,
            col,
            rows: TILE_HEIGHT.min(self.grid.rows.saturating_sub(row)).max(1),
            cols: TILE_WIDTH.min(self.grid.columns.saturating_sub(col)).max(1),
        }
    }

    /// Merge horizontally contiguous dirty tiles into repaint strips.
    ///
    /// `tiles` must be sorted ascending (as produced by
    /// [`DamageTracker::consume`]). Runs never cross tile rows, so each
    /// strip is a clamped rect exactly covering its dirty tiles.
    pub fn merge_regions(&self, tiles: &[usize]) -> Vec<CellRect> {
        let mut regions = Vec::new();
        let mut i = 0;
        while i < tiles.len() {
            let start = tiles[i];
            let tile_row = start / self.tile_cols;
            let mut end = start;
            while i + 1 < tiles.len()
                && tiles[i + 1] == end + 1
                && tiles[i + 1] / self.tile_cols == tile_row
            {
                end = tiles[i + 1];
                i += 1;
            }
            i += 1;

            let first = self.tile_rect(start);
            let last = self.tile_rect(end);
            regions.push(CellRect {
                row: first.row,
                col: first.col,
                rows: first.rows,
                cols: last.col + last.cols - first.col,
            });
        }
        regions
    }
}

/// Damage drained from a tracker for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainedDamage {
    /// Incremental damage is superseded; repaint everything. `tiles` is
    /// empty in this case.
    pub full_redraw: bool,
    /// Dirty tile indices, ascending.
    pub tiles: Vec<usize>,
    /// Cursor or selection overlays changed.
    pub overlay: bool,
}

impl DrainedDamage {
    pub fn is_empty(&self) -> bool {
        !self.full_redraw && !self.overlay && self.tiles.is_empty()
    }
}

/// Per-session damage state.
#[derive(Debug, Clone)]
pub struct DamageTracker {
    layout: TileLayout,
    dirty: Vec<bool>,
    dirty_count: usize,
    needs_full_redraw: bool,
    overlay_changed: bool,
    last_cursor: Option<(usize, usize)>,
}

impl DamageTracker {
    pub fn new(grid: GridDims) -> Self {
        let layout = TileLayout::new(grid);
        Self {
            dirty: vec![false; layout.tile_count()],
            dirty_count: 0,
            needs_full_redraw: false,
            overlay_changed: false,
            last_cursor: None,
            layout,
        }
    }

    pub fn layout(&self) -> &TileLayout {
        &self.layout
    }

    /// Mark one tile dirty. Out-of-range indices are ignored.
    pub fn mark_tile(&mut self, index: usize) {
        if let Some(slot) = self.dirty.get_mut(index) {
            if !*slot {
                *slot = true;
                self.dirty_count += 1;
            }
        }
    }

    /// Mark the tile containing a cell dirty.
    pub fn mark_cell(&mut self, row: usize, col: usize) {
        let index = self.layout.tile_for_cell(row, col);
        self.mark_tile(index);
    }

    /// Cursor or selection overlay changed; the next frame repaints
    /// overlays even when no tiles are dirty.
    pub fn mark_overlay(&mut self) {
        self.overlay_changed = true;
    }

    /// Supersede incremental damage with a full repaint.
    pub fn mark_all(&mut self) {
        self.needs_full_redraw = true;
    }

    /// Record a cursor move: dirties both the vacated and the entered
    /// tile so no stale cursor pixels survive.
    pub fn track_cursor(&mut self, row: usize, col: usize) {
        if let Some((old_row, old_col)) = self.last_cursor {
            self.mark_cell(old_row, old_col);
        }
        self.mark_cell(row, col);
        self.last_cursor = Some((row, col));
        self.overlay_changed = true;
    }

    /// The cell the cursor was last tracked at.
    pub fn last_cursor(&self) -> Option<(usize, usize)> {
        self.last_cursor
    }

    pub fn has_work(&self) -> bool {
        self.needs_full_redraw || self.overlay_changed || self.dirty_count > 0
    }

    pub fn dirty_tile_count(&self) -> usize {
        self.dirty_count
    }

    pub fn needs_full_redraw(&self) -> bool {
        self.needs_full_redraw
    }

    /// Drain all damage. A second call (with no marks in between) returns
    /// an empty drain.
    pub fn consume(&mut self) -> DrainedDamage {
        let full_redraw = self.needs_full_redraw;
        let overlay = self.overlay_changed;
        let tiles = if full_redraw {
            // Bits are discarded wholesale; the frame repaints everything.
            for slot in &mut self.dirty {
                *slot = false;
            }
            Vec::new()
        } else {
            let mut tiles = Vec::with_capacity(self.dirty_count);
            for (index, slot) in self.dirty.iter_mut().enumerate() {
                if *slot {
                    *slot = false;
                    tiles.push(index);
                }
            }
            tiles
        };
        self.dirty_count = 0;
        self.needs_full_redraw = false;
        self.overlay_changed = false;
        DrainedDamage {
            full_redraw,
            tiles,
            overlay,
        }
    }

    /// Re-mark previously drained damage (after a failed upload) so the
    /// repaint work is not lost.
    pub fn restore(&mut self, drained: DrainedDamage) {
        if drained.full_redraw {
            self.needs_full_redraw = true;
        }
        if drained.overlay {
            self.overlay_changed = true;
        }
        for index in drained.tiles {
            self.mark_tile(index);
        }
    }

    /// Replace the tracked grid. All previously stored tile indices are
    /// invalid against the new layout, so the dirty set resets and a full
    /// redraw is forced.
    pub fn reconfigure(&mut self, grid: GridDims) {
        self.layout = TileLayout::new(grid);
        self.dirty = vec![false; self.layout.tile_count()];
        self.dirty_count = 0;
        self.needs_full_redraw = true;
        self.overlay_changed = false;
        self.last_cursor = None;
    }

    /// Reset all damage state without touching the layout.
    pub fn clear(&mut self) {
        for slot in &mut self.dirty {
            *slot = false;
        }
        self.dirty_count = 0;
        self.needs_full_redraw = false;
        self.overlay_changed = false;
        self.last_cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_80x24() -> GridDims {
        GridDims::new(24, 80)
    }

    #[test]
    fn test_tile_layout_80x24() {
        let layout = TileLayout::new(grid_80x24());
        // 80 / 8 = 10 tile columns, 24 / 4 = 6 tile rows
        assert_eq!(layout.tile_cols(), 10);
        assert_eq!(layout.tile_rows(), 6);
        assert_eq!(layout.tile_count(), 60);
    }

    #[test]
    fn test_tile_for_cell() {
        let layout = TileLayout::new(grid_80x24());
        assert_eq!(layout.tile_for_cell(0, 0), 0);
        assert_eq!(layout.tile_for_cell(0, 79), 9);
        assert_eq!(layout.tile_for_cell(4, 0), 10);
        assert_eq!(layout.tile_for_cell(23, 79), 59);
        // Out-of-grid coordinates clamp to the edge tile
        assert_eq!(layout.tile_for_cell(500, 500), 59);
    }

    #[test]
    fn test_tile_rect_clamps_at_edge() {
        // 81 columns: the last tile column covers a single cell column.
        let layout = TileLayout::new(GridDims::new(24, 81));
        assert_eq!(layout.tile_cols(), 11);
        let rect = layout.tile_rect(10);
        assert_eq!(rect.col, 80);
        assert_eq!(rect.cols, 1);
        assert_eq!(rect.rows, 4);

        // 26 rows: the last tile row covers two cell rows.
        let layout = TileLayout::new(GridDims::new(26, 80));
        let rect = layout.tile_rect((layout.tile_rows() - 1) * layout.tile_cols());
        assert_eq!(rect.row, 24);
        assert_eq!(rect.rows, 2);
    }

    #[test]
    fn test_consume_drains_exactly_once() {
        let mut damage = DamageTracker::new(grid_80x24());
        damage.mark_cell(0, 0);
        damage.mark_cell(5, 40);

        let first = damage.consume();
        assert_eq!(first.tiles.len(), 2);
        assert!(!first.full_redraw);

        let second = damage.consume();
        assert!(second.is_empty());
        assert!(!damage.has_work());
    }

    #[test]
    fn test_duplicate_marks_count_once() {
        let mut damage = DamageTracker::new(grid_80x24());
        damage.mark_cell(0, 0);
        damage.mark_cell(1, 1);
        damage.mark_cell(3, 7);
        assert_eq!(damage.dirty_tile_count(), 1);
    }

    #[test]
    fn test_out_of_range_tile_ignored() {
        let mut damage = DamageTracker::new(grid_80x24());
        damage.mark_tile(10_000);
        assert_eq!(damage.dirty_tile_count(), 0);
        assert!(!damage.has_work());
    }

    #[test]
    fn test_full_redraw_supersedes_tiles() {
        let mut damage = DamageTracker::new(grid_80x24());
        damage.mark_cell(0, 0);
        damage.mark_all();

        let drained = damage.consume();
        assert!(drained.full_redraw);
        assert!(drained.tiles.is_empty());

        // The superseded tile bits were discarded too.
        assert!(damage.consume().is_empty());
    }

    #[test]
    fn test_track_cursor_marks_both_tiles() {
        let mut damage = DamageTracker::new(grid_80x24());
        damage.track_cursor(0, 0);
        let _ = damage.consume();

        // Move to a different tile: the vacated tile and the new one are
        // both dirty.
        damage.track_cursor(10, 40);
        let drained = damage.consume();
        assert_eq!(drained.tiles.len(), 2);
        assert!(drained.overlay);
        assert!(drained.tiles.contains(&0));
    }

    #[test]
    fn test_restore_remarks_damage() {
        let mut damage = DamageTracker::new(grid_80x24());
        damage.mark_cell(0, 0);
        damage.mark_overlay();

        let drained = damage.consume();
        assert!(!damage.has_work());

        damage.restore(drained);
        assert!(damage.has_work());
        let again = damage.consume();
        assert_eq!(again.tiles.len(), 1);
        assert!(again.overlay);
    }

    #[test]
    fn test_reconfigure_invalidates_and_forces_full() {
        let mut damage = DamageTracker::new(grid_80x24());
        damage.mark_cell(23, 79);
        damage.track_cursor(23, 79);

        damage.reconfigure(GridDims::new(48, 120));
        assert!(damage.needs_full_redraw());
        assert_eq!(damage.dirty_tile_count(), 0);
        assert_eq!(damage.last_cursor(), None);
        assert_eq!(damage.layout().tile_count(), 15 * 12);
    }

    #[test]
    fn test_merge_contiguous_run() {
        let layout = TileLayout::new(grid_80x24());
        // Tiles 1, 2, 3 sit in tile row 0 and merge into one strip.
        let regions = layout.merge_regions(&[1, 2, 3]);
        assert_eq!(regions.len(), 1);
        assert_eq!(
            regions[0],
            CellRect {
                row: 0,
                col: 8,
                rows: 4,
                cols: 24
            }
        );
    }

    #[test]
    fn test_merge_does_not_cross_tile_rows() {
        let layout = TileLayout::new(grid_80x24());
        // Tiles 9 and 10 are adjacent indices but sit in different tile
        // rows; they must stay separate strips.
        let regions = layout.merge_regions(&[9, 10]);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].row, 0);
        assert_eq!(regions[0].col, 72);
        assert_eq!(regions[1].row, 4);
        assert_eq!(regions[1].col, 0);
    }

    #[test]
    fn test_merge_with_gap() {
        let layout = TileLayout::new(grid_80x24());
        let regions = layout.merge_regions(&[0, 2]);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].col, 0);
        assert_eq!(regions[0].cols, 8);
        assert_eq!(regions[1].col, 16);
    }
}
