//! tessitura - normalize, validate and convert compositions
//!
//! The binary is a thin shell over these functions so they can be driven
//! from tests without spawning a process.

pub mod commands;

use abc::AbcParams;
use midi_writer::MidiParams;
use sclang::ScriptParams;
use tessconf::TessConfig;

/// Encoder parameters taken from configuration
#[derive(Debug, Clone)]
pub struct EncoderParams {
    pub midi: MidiParams,
    pub abc: AbcParams,
    pub script: ScriptParams,
}

impl From<&TessConfig> for EncoderParams {
    fn from(config: &TessConfig) -> Self {
        let source = Some(config.notation.source.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        EncoderParams {
            midi: MidiParams {
                ticks_per_beat: config.midi.ticks_per_beat.max(1),
                default_pitch: config.midi.default_pitch.min(127),
                controllers: config.controllers.clone(),
            },
            abc: AbcParams {
                reference: config.notation.reference,
                bars_per_line: config.notation.bars_per_line,
                source,
            },
            script: ScriptParams {
                server: config.script.server.clone(),
                default_quant: config.script.default_quant,
            },
        }
    }
}

impl Default for EncoderParams {
    fn default() -> Self {
        EncoderParams::from(&TessConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_from_config() {
        let mut config = TessConfig::default();
        config.midi.ticks_per_beat = 0;
        config.notation.source = "  ".to_string();
        config.script.default_quant = Some(2.0);

        let params = EncoderParams::from(&config);
        assert_eq!(params.midi.ticks_per_beat, 1);
        assert_eq!(params.abc.source, None);
        assert_eq!(params.script.default_quant, Some(2.0));
        assert_eq!(params.abc.bars_per_line, AbcParams::default().bars_per_line);
    }
}
