//! Config sections, one per encoder plus logging.

use serde::{Deserialize, Serialize};

/// Log filter used when neither config nor `RUST_LOG` sets one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `composition=debug,warn`.
    /// Default: warn
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Standard MIDI File output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiConfig {
    /// Ticks per quarter note.
    /// Default: 480
    pub ticks_per_beat: u16,

    /// Note number written when a pitch cannot be resolved.
    /// Default: 60
    pub default_pitch: u8,
}

impl MidiConfig {
    /// Largest division a header can carry; bit 15 selects SMPTE timing.
    pub const MAX_TICKS_PER_BEAT: u16 = 0x7FFF;

    /// Whether `ticks` fits a metrical SMF header division.
    pub fn valid_ticks(ticks: u16) -> bool {
        (1..=Self::MAX_TICKS_PER_BEAT).contains(&ticks)
    }
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            ticks_per_beat: 480,
            default_pitch: composition::DEFAULT_PITCH,
        }
    }
}

/// ABC notation output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotationConfig {
    /// `X:` reference number.
    pub reference: u32,

    /// Bars per line; 0 keeps each voice on one line.
    pub bars_per_line: usize,

    /// `S:` field; empty leaves it out.
    pub source: String,
}

impl Default for NotationConfig {
    fn default() -> Self {
        Self {
            reference: 1,
            bars_per_line: 4,
            source: "tessitura".to_string(),
        }
    }
}

/// SuperCollider script output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Interpreter variable holding the server.
    pub server: String,

    /// Quantization grid in beats; unset means one bar.
    pub default_quant: Option<f64>,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            server: "s".to_string(),
            default_quant: None,
        }
    }
}
