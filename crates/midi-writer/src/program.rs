//! General MIDI program choice per instrument kind.

use composition::NodeKind;

/// GM program (0-based) for an instrument kind; `None` when the kind has no
/// natural counterpart
pub fn gm_program(kind: &NodeKind) -> Option<u8> {
    match kind {
        NodeKind::Synth => Some(80),         // Lead 1 (square)
        NodeKind::MonoSynth => Some(38),     // Synth Bass 1
        NodeKind::FmSynth => Some(5),        // Electric Piano 2
        NodeKind::AmSynth => Some(89),       // Pad 2 (warm)
        NodeKind::DuoSynth => Some(81),      // Lead 2 (sawtooth)
        NodeKind::PluckSynth => Some(24),    // Acoustic Guitar (nylon)
        NodeKind::MembraneSynth => Some(116), // Taiko Drum
        NodeKind::MetalSynth => Some(14),    // Tubular Bells
        NodeKind::NoiseSynth => Some(122),   // Seashore
        NodeKind::Sampler => Some(0),        // Acoustic Grand Piano
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruments_have_programs() {
        assert_eq!(gm_program(&NodeKind::FmSynth), Some(5));
        assert_eq!(gm_program(&NodeKind::Reverb), None);
        assert_eq!(gm_program(&NodeKind::Unknown("theremin".into())), None);
    }
}
