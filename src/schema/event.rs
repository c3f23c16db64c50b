use serde::{Deserialize, Serialize};

use super::memory::FragmentKind;
use super::narrative::NarrativeEventId;

/// Everything a turn can hand back to its caller, as one tagged union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A scripted beat fired this turn.
    NarrativeTrigger { id: NarrativeEventId, line: String },
    /// The generated response text.
    PlainResponse { text: String },
    /// A past input was quoted back.
    MemoryEcho { echo_id: u64, quote: String },
    FragmentRevealed {
        kind: FragmentKind,
        id: u32,
        content: String,
    },
    DreamRecorded { content: String },
    /// Side channel: a line meant for an external console surface.
    ConsoleLog { line: String },
}
