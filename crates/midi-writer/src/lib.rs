//! Standard MIDI File writer for resolved compositions.
//!
//! Produces format 1 files: a conductor track followed by one track per
//! sequence. Problems that do not stop encoding (unknown instruments,
//! unresolvable pitches) come back as diagnostics next to the bytes.
//!
//! # Example
//!
//! ```
//! use composition::prepare;
//! use midi_writer::{encode, MidiParams};
//! use serde_json::json;
//!
//! let resolved = prepare(&json!([{"pitch": 60, "time": 0, "duration": 1}])).unwrap();
//! let midi = encode(&resolved, &MidiParams::default());
//! assert_eq!(&midi.value[..4], b"MThd");
//! ```

pub mod encode;
pub mod program;
pub mod track;
pub mod writer;

use composition::{ControllerMap, DEFAULT_PITCH};

pub use encode::encode;
pub use track::TrackBuilder;
pub use writer::ByteWriter;

/// Parameters for MIDI generation
#[derive(Debug, Clone)]
pub struct MidiParams {
    /// Ticks per quarter note (typically 480)
    pub ticks_per_beat: u16,
    /// Pitch used when a note name cannot be resolved
    pub default_pitch: u8,
    /// Parameter name to CC table for automation
    pub controllers: ControllerMap,
}

impl Default for MidiParams {
    fn default() -> Self {
        MidiParams {
            ticks_per_beat: 480,
            default_pitch: DEFAULT_PITCH,
            controllers: ControllerMap::default(),
        }
    }
}
