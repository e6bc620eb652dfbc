//! Host event translation.
//!
//! The bridge is the pure seam between host-facing [`SessionEvent`]s and
//! the [`TerminalRuntime`]: it encodes keys into terminal byte sequences,
//! forwards pointer and selection traffic, and assembles the returned
//! updates into an [`UpdateBatch`]. It never errors; events it does not
//! own (renderer configuration, profile updates) come back with
//! `handled == false` so the session routes them itself.

use crate::layout::RendererConfiguration;
use crate::profile::ProfileUpdate;
use crate::runtime::{
    BatchReason, HostEvent, Modifiers, ParserEvent, PointerEvent, Selection, TerminalRuntime,
    UpdateBatch, WheelEvent,
};

/// A non-character key in a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedKey {
    Enter,
    Tab,
    Space,
    Backspace,
    Escape,
    Insert,
    Delete,
    ArrowUp,
    ArrowDown,
    ArrowRight,
    ArrowLeft,
    Home,
    End,
    PageUp,
    PageDown,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
}

/// Logical key of a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// A character key, already shifted by the host keyboard layer.
    Char(char),
    Named(NamedKey),
}

/// A key press with modifier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub mods: Modifiers,
}

impl KeyEvent {
    pub fn plain(key: Key) -> Self {
        Self {
            key,
            mods: Modifiers::default(),
        }
    }
}

/// Every event a renderer session accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    // Runtime-bound events (translated by the bridge)
    Key(KeyEvent),
    Text(String),
    Pointer(PointerEvent),
    Wheel(WheelEvent),
    Paste(String),
    Focus,
    Blur,
    SetCursor { row: usize, col: usize },
    MoveCursor { row_delta: isize, col_delta: isize },
    SetSelection(Selection),
    UpdateSelection { row: usize, col: usize },
    ClearSelection,
    ReplaceSelection(String),
    ParserDispatch(ParserEvent),
    ParserBatch(Vec<ParserEvent>),
    Data(Vec<u8>),
    Reset,
    // Renderer-owned events (declined by the bridge)
    Configure(RendererConfiguration),
    UpdateProfile(ProfileUpdate),
}

/// Result of routing one event through the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct Bridged {
    /// Updates the runtime produced, when any.
    pub batch: Option<UpdateBatch>,
    /// Whether the bridge consumed the event. `false` means the caller
    /// owns this event type (configure, profile update).
    pub handled: bool,
}

impl Bridged {
    fn consumed(reason: BatchReason, updates: Vec<crate::runtime::RuntimeUpdate>) -> Self {
        let batch = if updates.is_empty() {
            None
        } else {
            Some(UpdateBatch { reason, updates })
        };
        Self {
            batch,
            handled: true,
        }
    }

    fn declined() -> Self {
        Self {
            batch: None,
            handled: false,
        }
    }
}

/// Route one session event into the runtime.
///
/// Pure translation: no damage tracking, no frame scheduling, no errors.
/// Reset batches carry [`BatchReason::Initial`]; everything else is
/// [`BatchReason::ApplyUpdates`].
pub fn apply(runtime: &mut dyn TerminalRuntime, event: &SessionEvent) -> Bridged {
    match event {
        SessionEvent::Key(key_event) => match encode_key(key_event) {
            Some(bytes) => Bridged::consumed(BatchReason::ApplyUpdates, runtime.write(&bytes)),
            None => {
                log::trace!("Key event has no terminal encoding: {:?}", key_event);
                Bridged::consumed(BatchReason::ApplyUpdates, Vec::new())
            }
        },
        SessionEvent::Text(text) => {
            Bridged::consumed(BatchReason::ApplyUpdates, runtime.write(text.as_bytes()))
        }
        SessionEvent::Pointer(pointer) => Bridged::consumed(
            BatchReason::ApplyUpdates,
            runtime.dispatch_host_event(&HostEvent::Pointer(*pointer)),
        ),
        SessionEvent::Wheel(wheel) => Bridged::consumed(
            BatchReason::ApplyUpdates,
            runtime.dispatch_host_event(&HostEvent::Wheel(*wheel)),
        ),
        SessionEvent::Paste(text) => {
            Bridged::consumed(BatchReason::ApplyUpdates, runtime.paste(text))
        }
        SessionEvent::Focus => Bridged::consumed(BatchReason::ApplyUpdates, runtime.set_focus(true)),
        SessionEvent::Blur => Bridged::consumed(BatchReason::ApplyUpdates, runtime.set_focus(false)),
        SessionEvent::SetCursor { row, col } => {
            Bridged::consumed(BatchReason::ApplyUpdates, runtime.set_cursor(*row, *col))
        }
        SessionEvent::MoveCursor {
            row_delta,
            col_delta,
        } => Bridged::consumed(
            BatchReason::ApplyUpdates,
            runtime.move_cursor(*row_delta, *col_delta),
        ),
        SessionEvent::SetSelection(selection) => Bridged::consumed(
            BatchReason::ApplyUpdates,
            runtime.set_selection(*selection),
        ),
        SessionEvent::UpdateSelection { row, col } => Bridged::consumed(
            BatchReason::ApplyUpdates,
            runtime.update_selection(*row, *col),
        ),
        SessionEvent::ClearSelection => {
            Bridged::consumed(BatchReason::ApplyUpdates, runtime.clear_selection())
        }
        SessionEvent::ReplaceSelection(text) => {
            Bridged::consumed(BatchReason::ApplyUpdates, runtime.replace_selection(text))
        }
        SessionEvent::ParserDispatch(parser_event) => Bridged::consumed(
            BatchReason::ApplyUpdates,
            runtime.dispatch_parser_event(parser_event),
        ),
        SessionEvent::ParserBatch(events) => {
            let mut updates = Vec::new();
            for parser_event in events {
                updates.extend(runtime.dispatch_parser_event(parser_event));
            }
            Bridged::consumed(BatchReason::ApplyUpdates, updates)
        }
        SessionEvent::Data(bytes) => {
            Bridged::consumed(BatchReason::ApplyUpdates, runtime.write(bytes))
        }
        SessionEvent::Reset => Bridged::consumed(BatchReason::Initial, runtime.reset()),
        SessionEvent::Configure(_) | SessionEvent::UpdateProfile(_) => Bridged::declined(),
    }
}

/// Convert a key press to terminal input bytes.
///
/// Ctrl+letter produces the control byte (A = 1 .. Z = 26), Ctrl+Space
/// sends NUL, Alt prefixes ESC to character keys. Named keys map to their
/// conventional escape sequences.
pub fn encode_key(event: &KeyEvent) -> Option<Vec<u8>> {
    match event.key {
        Key::Char(ch) => {
            if event.mods.ctrl {
                if ch.is_ascii_alphabetic() {
                    // Ctrl+A through Ctrl+Z map to ASCII 1-26
                    let byte = (ch.to_ascii_lowercase() as u8) - b'a' + 1;
                    return Some(vec![byte]);
                }
                if ch == ' ' {
                    return Some(vec![0x00]);
                }
            }

            let mut bytes = ch.to_string().into_bytes();
            if event.mods.alt {
                bytes.insert(0, 0x1b);
            }
            Some(bytes)
        }
        Key::Named(named) => {
            // Ctrl+Space sends NUL (0x00)
            if event.mods.ctrl && named == NamedKey::Space {
                return Some(vec![0x00]);
            }

            let seq = match named {
                NamedKey::Enter => "\r",
                NamedKey::Tab => "\t",
                NamedKey::Space => " ",
                NamedKey::Backspace => "\x7f",
                NamedKey::Escape => "\x1b",
                NamedKey::Insert => "\x1b[2~",
                NamedKey::Delete => "\x1b[3~",
                NamedKey::ArrowUp => "\x1b[A",
                NamedKey::ArrowDown => "\x1b[B",
                NamedKey::ArrowRight => "\x1b[C",
                NamedKey::ArrowLeft => "\x1b[D",
                NamedKey::Home => "\x1b[H",
                NamedKey::End => "\x1b[F",
                NamedKey::PageUp => "\x1b[5~",
                NamedKey::PageDown => "\x1b[6~",
                NamedKey::F1 => "\x1bOP",
                NamedKey::F2 => "\x1bOQ",
                NamedKey::F3 => "\x1bOR",
                NamedKey::F4 => "\x1bOS",
                NamedKey::F5 => "\x1b[15~",
                NamedKey::F6 => "\x1b[17~",
                NamedKey::F7 => "\x1b[18~",
                NamedKey::F8 => "\x1b[19~",
                NamedKey::F9 => "\x1b[20~",
                NamedKey::F10 => "\x1b[21~",
                NamedKey::F11 => "\x1b[23~",
                NamedKey::F12 => "\x1b[24~",
            };
            Some(seq.as_bytes().to_vec())
        }
    }
}
