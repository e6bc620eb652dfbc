//! Terminal runtime boundary.
//!
//! The renderer consumes terminal state through the [`TerminalRuntime`]
//! trait: an escape-sequence parser and grid state machine living outside
//! this crate. Every mutating call returns the typed updates it produced so
//! the session can translate them into damage.
//!
//! [`EchoRuntime`] is a deliberately small line-discipline implementation
//! for tests, demos, and headless hosts; real hosts supply a full VT
//! implementation behind the same trait.

use crate::color::CellColor;
use crate::layout::GridDims;
use crate::profile::CursorShape;

// ---------------------------------------------------------------------------
// Snapshot model
// ---------------------------------------------------------------------------

/// One cell of the terminal grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellContent {
    pub ch: char,
    pub fg: CellColor,
    pub bg: CellColor,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub inverse: bool,
    pub dim: bool,
    pub invisible: bool,
    /// Leading cell of a double-width glyph.
    pub wide: bool,
    /// Trailing half of a double-width glyph; renders background only.
    pub wide_spacer: bool,
}

impl CellContent {
    pub fn from_char(ch: char) -> Self {
        Self {
            ch,
            fg: CellColor::Default,
            bg: CellColor::Default,
            bold: false,
            italic: false,
            underline: false,
            strikethrough: false,
            inverse: false,
            dim: false,
            invisible: false,
            wide: false,
            wide_spacer: false,
        }
    }

    pub fn blank() -> Self {
        Self::from_char(' ')
    }

    /// Whether this cell paints any foreground ink.
    pub fn has_glyph(&self) -> bool {
        !self.wide_spacer && self.ch != ' ' && self.ch != '\0'
    }
}

impl Default for CellContent {
    fn default() -> Self {
        Self::blank()
    }
}

/// Cursor position and presentation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorState {
    pub row: usize,
    pub col: usize,
    /// Shape requested by the application (DECSCUSR); `None` defers to the
    /// profile default.
    pub shape: Option<CursorShape>,
    pub visible: bool,
}

impl Default for CursorState {
    fn default() -> Self {
        Self {
            row: 0,
            col: 0,
            shape: None,
            visible: true,
        }
    }
}

/// An active selection, linear (reading order) or rectangular.
///
/// `anchor` is where the selection started, `focus` where it currently
/// ends; both are `(row, col)` and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub anchor: (usize, usize),
    pub focus: (usize, usize),
    pub rectangular: bool,
}

impl Selection {
    pub fn linear(anchor: (usize, usize), focus: (usize, usize)) -> Self {
        Self {
            anchor,
            focus,
            rectangular: false,
        }
    }

    pub fn rectangular(anchor: (usize, usize), focus: (usize, usize)) -> Self {
        Self {
            anchor,
            focus,
            rectangular: true,
        }
    }

    /// Anchor and focus ordered row-major (start before end).
    pub fn normalized(&self) -> ((usize, usize), (usize, usize)) {
        if self.anchor <= self.focus {
            (self.anchor, self.focus)
        } else {
            (self.focus, self.anchor)
        }
    }

    /// Whether a cell falls inside the selection.
    ///
    /// Linear selections cover interior rows full-width with the first and
    /// last rows column-bounded; rectangular selections apply the column
    /// bounds on every row.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        let ((start_row, start_col), (end_row, end_col)) = self.normalized();
        if row < start_row || row > end_row {
            return false;
        }
        if self.rectangular {
            let lo = start_col.min(end_col);
            let hi = start_col.max(end_col);
            col >= lo && col <= hi
        } else if start_row == end_row {
            col >= start_col.min(end_col) && col <= start_col.max(end_col)
        } else if row == start_row {
            col >= start_col
        } else if row == end_row {
            col <= end_col
        } else {
            true
        }
    }
}

/// A complete, renderable view of the terminal grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSnapshot {
    pub grid: GridDims,
    /// Row-major, `grid.rows * grid.columns` cells.
    pub cells: Vec<CellContent>,
    pub cursor: CursorState,
    pub selection: Option<Selection>,
}

impl GridSnapshot {
    pub fn blank(grid: GridDims) -> Self {
        Self {
            grid,
            cells: vec![CellContent::blank(); grid.cell_count()],
            cursor: CursorState::default(),
            selection: None,
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&CellContent> {
        if row >= self.grid.rows || col >= self.grid.columns {
            return None;
        }
        self.cells.get(row * self.grid.columns + col)
    }

    pub fn cell_mut(&mut self, row: usize, col: usize) -> Option<&mut CellContent> {
        if row >= self.grid.rows || col >= self.grid.columns {
            return None;
        }
        self.cells.get_mut(row * self.grid.columns + col)
    }
}

// ---------------------------------------------------------------------------
// Updates and batches
// ---------------------------------------------------------------------------

/// A typed state change reported by the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeUpdate {
    /// A cell's content changed; the new content is in the snapshot.
    Cell { row: usize, col: usize },
    /// The cursor moved to a new position.
    CursorMove { row: usize, col: usize },
    /// A selection was established.
    SelectionSet,
    /// The selection focus moved.
    SelectionUpdate,
    /// The selection was dropped.
    SelectionCleared,
    /// Rows scrolled by `amount` (positive = content moved up).
    Scroll { amount: isize },
    /// The visible grid was cleared.
    Clear,
    /// A terminal mode toggled (alternate screen, cursor keys, ...).
    ModeChange,
    /// A palette slot changed (`None` = the whole palette reset).
    PaletteChange { index: Option<u8> },
    /// Pen attributes changed without touching any cell.
    AttributeChange,
    /// BEL was received.
    Bell,
    /// Bytes the terminal wants sent back to the application.
    Response(Vec<u8>),
    /// The application requested a grid resize (remote resize).
    Resize { rows: usize, columns: usize },
    /// The window title changed.
    Title(String),
}

/// Why a batch (and the frame it feeds) was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchReason {
    /// First paint after mount or reset.
    Initial,
    /// Host-driven reconfiguration.
    Sync,
    /// Ordinary runtime updates.
    ApplyUpdates,
    /// Explicitly forced by the host.
    Manual,
}

impl BatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchReason::Initial => "initial",
            BatchReason::Sync => "sync",
            BatchReason::ApplyUpdates => "apply-updates",
            BatchReason::Manual => "manual",
        }
    }
}

/// An ordered group of updates delivered to the session in one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateBatch {
    pub reason: BatchReason,
    pub updates: Vec<RuntimeUpdate>,
}

// ---------------------------------------------------------------------------
// Host-side input forwarded through the runtime
// ---------------------------------------------------------------------------

/// Keyboard modifier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Left,
    Middle,
    Right,
}

/// A pointer button transition over a cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub row: usize,
    pub col: usize,
    pub button: PointerButton,
    pub pressed: bool,
    pub mods: Modifiers,
}

/// Scroll wheel motion over a cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelEvent {
    pub row: usize,
    pub col: usize,
    pub delta_x: f32,
    pub delta_y: f32,
    pub mods: Modifiers,
}

/// A host UI event forwarded to the runtime (mouse reporting etc.).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostEvent {
    Pointer(PointerEvent),
    Wheel(WheelEvent),
}

/// A pre-parsed control event injected directly into the runtime,
/// bypassing the byte transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ParserEvent {
    /// Print a run of text at the cursor.
    Print(String),
    /// Execute a C0/C1 control function.
    Control(u8),
    /// A CSI sequence.
    Csi {
        params: Vec<u16>,
        intermediates: Vec<u8>,
        final_byte: u8,
    },
    /// An OSC string command.
    Osc { command: u16, payload: String },
    /// An ESC sequence.
    Esc {
        intermediates: Vec<u8>,
        final_byte: u8,
    },
}

// ---------------------------------------------------------------------------
// The runtime trait
// ---------------------------------------------------------------------------

/// The terminal state machine the renderer draws from.
///
/// Single-threaded by design; every mutator returns the updates it
/// produced, in order, so callers can damage-track without diffing.
pub trait TerminalRuntime {
    /// Current grid dimensions without materializing a snapshot.
    fn grid(&self) -> GridDims;

    /// A complete view of the current grid state.
    fn snapshot(&self) -> GridSnapshot;

    /// Feed raw bytes (the transport path).
    fn write(&mut self, bytes: &[u8]) -> Vec<RuntimeUpdate>;

    /// Forward a host UI event (pointer, wheel).
    fn dispatch_host_event(&mut self, event: &HostEvent) -> Vec<RuntimeUpdate>;

    /// Inject a pre-parsed control event.
    fn dispatch_parser_event(&mut self, event: &ParserEvent) -> Vec<RuntimeUpdate>;

    fn set_cursor(&mut self, row: usize, col: usize) -> Vec<RuntimeUpdate>;

    fn move_cursor(&mut self, row_delta: isize, col_delta: isize) -> Vec<RuntimeUpdate>;

    fn set_selection(&mut self, selection: Selection) -> Vec<RuntimeUpdate>;

    fn update_selection(&mut self, focus_row: usize, focus_col: usize) -> Vec<RuntimeUpdate>;

    fn clear_selection(&mut self) -> Vec<RuntimeUpdate>;

    /// Replace the selected region with `text` (type-over).
    fn replace_selection(&mut self, text: &str) -> Vec<RuntimeUpdate>;

    /// Paste text at the cursor.
    fn paste(&mut self, text: &str) -> Vec<RuntimeUpdate>;

    fn set_focus(&mut self, focused: bool) -> Vec<RuntimeUpdate>;

    /// Adopt new grid dimensions (host-driven; remote resize requests
    /// travel the other way via [`RuntimeUpdate::Resize`]).
    fn resize(&mut self, grid: GridDims) -> Vec<RuntimeUpdate>;

    /// Drop all state back to a blank grid.
    fn reset(&mut self) -> Vec<RuntimeUpdate>;
}

// ---------------------------------------------------------------------------
// EchoRuntime
// ---------------------------------------------------------------------------

/// Minimal [`TerminalRuntime`]: printable bytes become cells, a handful of
/// control bytes move the cursor, everything else is ignored.
///
/// All characters are treated as single-width. Mouse events are accepted
/// but produce no state change.
#[derive(Debug, Clone)]
pub struct EchoRuntime {
    snapshot: GridSnapshot,
    focused: bool,
}

impl EchoRuntime {
    pub fn new(grid: GridDims) -> Self {
        Self {
            snapshot: GridSnapshot::blank(grid),
            focused: true,
        }
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    fn feed_char(&mut self, ch: char, updates: &mut Vec<RuntimeUpdate>) {
        let grid = self.snapshot.grid;
        match ch {
            '\r' => {
                self.snapshot.cursor.col = 0;
            }
            '\n' => {
                if self.snapshot.cursor.row + 1 < grid.rows {
                    self.snapshot.cursor.row += 1;
                } else {
                    self.scroll_up(updates);
                }
            }
            '\u{8}' => {
                self.snapshot.cursor.col = self.snapshot.cursor.col.saturating_sub(1);
            }
            '\u{7}' => {
                updates.push(RuntimeUpdate::Bell);
            }
            ch if !ch.is_control() => {
                if self.snapshot.cursor.col >= grid.columns {
                    self.snapshot.cursor.col = 0;
                    if self.snapshot.cursor.row + 1 < grid.rows {
                        self.snapshot.cursor.row += 1;
                    } else {
                        self.scroll_up(updates);
                    }
                }
                let (row, col) = (self.snapshot.cursor.row, self.snapshot.cursor.col);
                if let Some(cell) = self.snapshot.cell_mut(row, col) {
                    *cell = CellContent::from_char(ch);
                    updates.push(RuntimeUpdate::Cell { row, col });
                }
                self.snapshot.cursor.col += 1;
            }
            _ => {}
        }
    }

    fn scroll_up(&mut self, updates: &mut Vec<RuntimeUpdate>) {
        let columns = self.snapshot.grid.columns;
        self.snapshot.cells.drain(..columns);
        self.snapshot
            .cells
            .extend(std::iter::repeat_n(CellContent::blank(), columns));
        updates.push(RuntimeUpdate::Scroll { amount: 1 });
    }

    fn feed_str(&mut self, text: &str) -> Vec<RuntimeUpdate> {
        let before = (self.snapshot.cursor.row, self.snapshot.cursor.col);
        let mut updates = Vec::new();
        for ch in text.chars() {
            self.feed_char(ch, &mut updates);
        }
        let after = (self.snapshot.cursor.row, self.snapshot.cursor.col);
        if after != before {
            updates.push(RuntimeUpdate::CursorMove {
                row: after.0,
                col: after.1,
            });
        }
        updates
    }
}

impl TerminalRuntime for EchoRuntime {
    fn grid(&self) -> GridDims {
        self.snapshot.grid
    }

    fn snapshot(&self) -> GridSnapshot {
        self.snapshot.clone()
    }

    fn write(&mut self, bytes: &[u8]) -> Vec<RuntimeUpdate> {
        let text = String::from_utf8_lossy(bytes);
        self.feed_str(&text)
    }

    fn dispatch_host_event(&mut self, event: &HostEvent) -> Vec<RuntimeUpdate> {
        // A full runtime would emit mouse reporting responses here.
        log::trace!("Ignoring host event: {:?}", event);
        Vec::new()
    }

    fn dispatch_parser_event(&mut self, event: &ParserEvent) -> Vec<RuntimeUpdate> {
        match event {
            ParserEvent::Print(text) => self.feed_str(text),
            ParserEvent::Control(byte) => {
                let mut updates = Vec::new();
                self.feed_char(*byte as char, &mut updates);
                updates
            }
            // XTWINOPS 8: the application asks for a new text-area size.
            // Advisory; the grid only changes when the host resizes.
            ParserEvent::Csi {
                params, final_byte, ..
            } if *final_byte == b't' && params.len() >= 3 && params[0] == 8 => {
                vec![RuntimeUpdate::Resize {
                    rows: params[1] as usize,
                    columns: params[2] as usize,
                }]
            }
            ParserEvent::Osc { command, payload } if *command == 0 || *command == 2 => {
                vec![RuntimeUpdate::Title(payload.clone())]
            }
            _ => Vec::new(),
        }
    }

    fn set_cursor(&mut self, row: usize, col: usize) -> Vec<RuntimeUpdate> {
        let grid = self.snapshot.grid;
        self.snapshot.cursor.row = row.min(grid.rows.saturating_sub(1));
        self.snapshot.cursor.col = col.min(grid.columns.saturating_sub(1));
        vec![RuntimeUpdate::CursorMove {
            row: self.snapshot.cursor.row,
            col: self.snapshot.cursor.col,
        }]
    }

    fn move_cursor(&mut self, row_delta: isize, col_delta: isize) -> Vec<RuntimeUpdate> {
        let row = self.snapshot.cursor.row.saturating_add_signed(row_delta);
        let col = self.snapshot.cursor.col.saturating_add_signed(col_delta);
        self.set_cursor(row, col)
    }

    fn set_selection(&mut self, selection: Selection) -> Vec<RuntimeUpdate> {
        self.snapshot.selection = Some(selection);
        vec![RuntimeUpdate::SelectionSet]
    }

    fn update_selection(&mut self, focus_row: usize, focus_col: usize) -> Vec<RuntimeUpdate> {
        match &mut self.snapshot.selection {
            Some(selection) => {
                selection.focus = (focus_row, focus_col);
                vec![RuntimeUpdate::SelectionUpdate]
            }
            None => self.set_selection(Selection::linear(
                (focus_row, focus_col),
                (focus_row, focus_col),
            )),
        }
    }

    fn clear_selection(&mut self) -> Vec<RuntimeUpdate> {
        if self.snapshot.selection.take().is_some() {
            vec![RuntimeUpdate::SelectionCleared]
        } else {
            Vec::new()
        }
    }

    fn replace_selection(&mut self, text: &str) -> Vec<RuntimeUpdate> {
        let mut updates = self.clear_selection();
        updates.extend(self.feed_str(text));
        updates
    }

    fn paste(&mut self, text: &str) -> Vec<RuntimeUpdate> {
        self.feed_str(text)
    }

    fn set_focus(&mut self, focused: bool) -> Vec<RuntimeUpdate> {
        self.focused = focused;
        Vec::new()
    }

    fn resize(&mut self, grid: GridDims) -> Vec<RuntimeUpdate> {
        if grid == self.snapshot.grid {
            return Vec::new();
        }
        let mut next = GridSnapshot::blank(grid);
        // Preserve the overlapping top-left region.
        for row in 0..grid.rows.min(self.snapshot.grid.rows) {
            for col in 0..grid.columns.min(self.snapshot.grid.columns) {
                if let (Some(dst), Some(src)) = (next.cell_mut(row, col), self.snapshot.cell(row, col)) {
                    *dst = *src;
                }
            }
        }
        next.cursor.row = self.snapshot.cursor.row.min(grid.rows.saturating_sub(1));
        next.cursor.col = self.snapshot.cursor.col.min(grid.columns.saturating_sub(1));
        next.cursor.visible = self.snapshot.cursor.visible;
        next.cursor.shape = self.snapshot.cursor.shape;
        self.snapshot = next;
        Vec::new()
    }

    fn reset(&mut self) -> Vec<RuntimeUpdate> {
        let grid = self.snapshot.grid;
        self.snapshot = GridSnapshot::blank(grid);
        vec![
            RuntimeUpdate::Clear,
            RuntimeUpdate::CursorMove { row: 0, col: 0 },
        ]
    }
}
