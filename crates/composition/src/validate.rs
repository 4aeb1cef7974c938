//! Structural and range checks.
//!
//! Errors block conversion; warnings are advisory. Messages are prefixed with
//! the path of the offending value.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::model::{
    Composition, EffectRef, LoopSpec, ModulationKind, NotePitch, PitchValue, Sequence, MASTER,
};

/// Tempo range considered musically sensible
pub const BPM_RANGE: (f64, f64) = (20.0, 400.0);

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub success: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn error(&mut self, message: String) {
        self.errors.push(message);
    }

    fn warning(&mut self, message: String) {
        self.warnings.push(message);
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} error(s), {} warning(s)",
            self.errors.len(),
            self.warnings.len()
        )?;
        for e in &self.errors {
            write!(f, "\n  error: {}", e)?;
        }
        for w in &self.warnings {
            write!(f, "\n  warning: {}", w)?;
        }
        Ok(())
    }
}

/// Check a composition
#[instrument(skip_all)]
pub fn validate(composition: &Composition) -> ValidationReport {
    let mut report = ValidationReport::default();

    for rejected in &composition.rejected {
        report.error(rejected.clone());
    }
    if composition.format_id.is_none() {
        report.error("missing formatId".to_string());
    }
    if composition.version.is_none() {
        report.error("missing version".to_string());
    }
    match composition.bpm {
        None => report.error("missing bpm".to_string()),
        Some(bpm) if !bpm.is_finite() || bpm <= 0.0 => {
            report.error(format!("bpm: must be a positive number, got {}", bpm))
        }
        Some(bpm) if bpm < BPM_RANGE.0 || bpm > BPM_RANGE.1 => report.warning(format!(
            "bpm: {} is outside {}-{}",
            bpm, BPM_RANGE.0, BPM_RANGE.1
        )),
        Some(_) => {}
    }

    for (i, point) in composition.tempo_map.iter().enumerate() {
        if !point.bpm.is_finite() || point.bpm <= 0.0 {
            report.warning(format!(
                "tempoMap[{}]: bpm {} is not positive and will be ignored",
                i, point.bpm
            ));
        }
    }

    check_graph(composition, &mut report);

    match &composition.sequences {
        None => report.error("missing sequences".to_string()),
        Some(sequences) => {
            for (i, seq) in sequences.iter().enumerate() {
                check_sequence(composition, i, seq, &mut report);
            }
        }
    }

    report.success = report.errors.is_empty();
    debug!(
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "validated composition"
    );
    report
}

fn check_graph(composition: &Composition, report: &mut ValidationReport) {
    let mut seen = HashSet::new();
    for (i, node) in composition.audio_graph.iter().enumerate() {
        if !seen.insert(node.id.as_str()) {
            report.error(format!("audioGraph[{}]: duplicate node id '{}'", i, node.id));
        }
        if !node.kind.is_known() {
            report.warning(format!(
                "audioGraph[{}]: unrecognized node type '{}'",
                i, node.kind
            ));
        }
    }

    for (i, connection) in composition.connections.iter().enumerate() {
        let Some((source, target)) = connection.endpoints() else {
            report.error(format!(
                "connections[{}]: expected 2 endpoints, got {}",
                i,
                connection.0.len()
            ));
            continue;
        };
        for endpoint in [source, target] {
            if endpoint != MASTER && composition.node(endpoint).is_none() {
                report.warning(format!(
                    "connections[{}]: endpoint '{}' not found in audioGraph",
                    i, endpoint
                ));
            }
        }
    }
}

fn check_sequence(composition: &Composition, i: usize, seq: &Sequence, report: &mut ValidationReport) {
    let path = format!("sequences[{}]", i);

    match (&seq.synth_ref, &seq.synth) {
        (None, None) => report.error(format!("{}: missing synth or synthRef", path)),
        (Some(_), Some(_)) => report.warning(format!(
            "{}: both synth and synthRef set, synthRef is used",
            path
        )),
        (Some(id), _) if composition.node(id).is_none() => report.warning(format!(
            "{}.synthRef: '{}' names no audio graph node",
            path, id
        )),
        (None, Some(spec)) if !spec.kind.is_known() => report.warning(format!(
            "{}.synth: unrecognized node type '{}'",
            path, spec.kind
        )),
        _ => {}
    }

    for (j, effect) in seq.effects.iter().enumerate() {
        match effect {
            EffectRef::Node(id) if composition.node(id).is_none() => report.warning(format!(
                "{}.effects[{}]: '{}' names no audio graph node",
                path, j, id
            )),
            EffectRef::Inline(spec) if !spec.kind.is_known() => report.warning(format!(
                "{}.effects[{}]: unrecognized node type '{}'",
                path, j, spec.kind
            )),
            _ => {}
        }
    }

    if let Some(channel) = seq.midi_channel {
        if !(0..=15).contains(&channel) {
            report.error(format!("{}.midiChannel: {} is outside 0-15", path, channel));
        }
    }

    if matches!(seq.looping, LoopSpec::Span(_)) && seq.loop_end.is_none() {
        report.warning(format!(
            "{}.loop: finite loop without loopEnd will play once",
            path
        ));
    }

    let Some(notes) = &seq.notes else {
        report.error(format!("{}: missing notes array", path));
        return;
    };

    for (j, note) in notes.iter().enumerate() {
        let note_path = format!("{}.notes[{}]", path, j);
        if note.time.is_none() {
            report.error(format!("{}: missing time", note_path));
        }
        if note.duration.is_none() {
            report.error(format!("{}: missing duration", note_path));
        }
        match &note.note {
            None => report.error(format!("{}: missing note", note_path)),
            Some(NotePitch::Chord(pitches)) if pitches.is_empty() => {
                report.warning(format!("{}.note: empty chord", note_path))
            }
            Some(pitch) => {
                for p in pitch.pitches() {
                    if let PitchValue::Midi(n) = p {
                        if !(0..=127).contains(&n) {
                            report.warning(format!(
                                "{}.note: MIDI number {} is outside 0-127",
                                note_path, n
                            ));
                        }
                    }
                }
            }
        }
        if let Some(v) = note.velocity {
            if !(0.0..=1.0).contains(&v) {
                report.warning(format!("{}.velocity: {} is outside 0-1", note_path, v));
            }
        }
        if let Some(channel) = note.channel {
            if !(0..=15).contains(&channel) {
                report.error(format!("{}.channel: {} is outside 0-15", note_path, channel));
            }
        }

        for (k, m) in note.modulations.iter().enumerate() {
            let mod_path = format!("{}.modulations[{}]", note_path, k);
            match &m.kind {
                ModulationKind::Unknown(name) => {
                    report.error(format!("{}: unknown modulation type '{}'", mod_path, name))
                }
                ModulationKind::Cc => match m.controller {
                    None => report.warning(format!("{}: cc without controller", mod_path)),
                    Some(c) if !(0..=127).contains(&c) => report.warning(format!(
                        "{}: controller {} is outside 0-127",
                        mod_path, c
                    )),
                    Some(_) => {}
                },
                ModulationKind::PitchBend | ModulationKind::Aftertouch => {}
            }
        }
    }
}
