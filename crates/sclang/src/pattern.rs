//! One `Pbind` per sequence.
//!
//! Notes become `[midinote, dur, amp]` rows inside a `Pseq`, positions are in
//! beats, and silence between onsets is written as `\rest` rows. A looping
//! sequence writes its first pass once and lets `Pseq` repeat it.

use composition::{
    pitch, Diagnostic, Diagnostics, Repeat, ResolvedComposition, ResolvedNote, ResolvedSequence,
    DEFAULT_PITCH,
};
use tracing::debug;

use crate::literal::{self, beats, number, Names};
use crate::routing::{Graph, HARDWARE_OUT};
use crate::synthdef::{self, Def, Role};

const EPSILON: f64 = 1e-6;

/// Everything a sequence contributes to the script
#[derive(Debug)]
pub struct Pattern {
    /// Graph node the sequence plays, if any
    pub node: Option<String>,
    pub name: String,
    /// Inline instrument and effect definitions
    pub definitions: Vec<Def>,
    pub buses: Vec<String>,
    pub effect_synths: Vec<String>,
    /// Pbind source, or a comment when nothing plays
    pub lines: Vec<String>,
    pub playable: bool,
}

impl Pattern {
    pub fn group(&self) -> String {
        format!("~group_{}", self.name)
    }

    pub fn variable(&self) -> String {
        format!("~pattern_{}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    start: f64,
    end: f64,
    notes: Vec<String>,
    amp: f64,
}

pub fn plan(
    composition: &ResolvedComposition,
    index: usize,
    seq: &ResolvedSequence,
    name: String,
    graph: &Graph,
    defs: &mut Names,
    server: &str,
    diagnostics: &mut Diagnostics,
) -> Pattern {
    let path = format!("sequences[{}]", index);
    let mut definitions = Vec::new();

    let graph_def = seq
        .instrument
        .node
        .as_deref()
        .and_then(|id| graph.instrument_def(id));
    let instrument = match graph_def {
        Some(def) => def.to_string(),
        None => {
            let template = synthdef::instrument(&seq.instrument.kind, &seq.instrument.options)
                .unwrap_or_else(|| {
                    diagnostics.push(
                        Diagnostic::warning(format!(
                            "unknown synth type '{}', using a generic sine voice",
                            seq.instrument.kind
                        ))
                        .with_path(format!("{}.synth", path)),
                    );
                    synthdef::generic_instrument(&seq.instrument.options)
                });
            let def = defs.fresh(&format!("{}_synth", name));
            definitions.push(Def {
                name: def.clone(),
                role: Role::Instrument,
                template,
            });
            def
        }
    };

    let mut destination = match seq.instrument.node.as_deref() {
        Some(id) if graph.category(id).is_some() => graph.destination(id),
        _ => HARDWARE_OUT.to_string(),
    };

    // inline effects run in order, the last one feeds the node's destination;
    // a graph effect in the chain takes over from there
    let mut chain: Vec<(String, String)> = Vec::new();
    let mut buses = Vec::new();
    let mut effect_synths = Vec::new();
    for (j, device) in seq.effects.iter().enumerate() {
        let effect_path = format!("{}.effects[{}]", path, j);
        if let Some(bus) = device.node.as_deref().and_then(|id| graph.effect_bus(id)) {
            if j + 1 < seq.effects.len() {
                diagnostics.warning(
                    effect_path,
                    "effects after a graph effect are not reachable, dropped",
                );
            }
            destination = bus;
            break;
        }
        let Some(template) = synthdef::effect(&device.kind, &device.options) else {
            diagnostics.warning(
                effect_path,
                format!("unsupported effect '{}', left out of the chain", device.kind),
            );
            effect_synths.push(format!(
                "// effect '{}' is not supported and was skipped",
                device.kind
            ));
            continue;
        };
        let fx = defs.fresh(&format!("fx_{}_{}", name, j));
        let bus = format!("~bus{}", &fx["fx".len()..]);
        buses.push(format!("{} = Bus.audio({}, 2);", bus, server));
        definitions.push(Def {
            name: fx.clone(),
            role: Role::Effect,
            template,
        });
        chain.push((fx, bus));
    }
    for (k, (fx, bus)) in chain.iter().enumerate() {
        let out = match chain.get(k + 1) {
            Some((_, next)) => next.clone(),
            None => destination.clone(),
        };
        effect_synths.push(format!(
            "~{fx} = Synth.tail({s}, \\{fx}, [\\in, {bus}, \\out, {out}]);",
            fx = fx,
            s = server,
            bus = bus,
            out = out
        ));
    }
    let out = match chain.first() {
        Some((_, bus)) => bus.clone(),
        None => destination,
    };

    let steps = steps(composition, seq, &path, diagnostics);
    let mut pattern = Pattern {
        node: seq.instrument.node.clone(),
        name,
        definitions,
        buses,
        effect_synths,
        lines: Vec::new(),
        playable: !steps.is_empty(),
    };

    if steps.is_empty() {
        debug!(label = %seq.label, "sequence has no playable notes");
        pattern.lines.push(format!(
            "// sequence '{}' has no playable notes",
            seq.label
        ));
        return pattern;
    }

    let period = seq
        .repeat
        .period()
        .map(|p| composition.tempo_map.beat_at_seconds(p));
    let repeats = match seq.repeat {
        Repeat::Infinite { .. } => "inf".to_string(),
        other => other.count().unwrap_or(1).to_string(),
    };

    let mut lines = vec![format!("{} = Pbind(", pattern.variable())];
    lines.push(format!("    \\instrument, \\{},", instrument));
    lines.push(format!("    \\group, {},", pattern.group()));
    lines.push(format!("    \\out, {},", out));
    if let Some(id) = seq.instrument.node.as_deref() {
        for (param, bus) in graph.mappings(id) {
            lines.push(format!("    \\{}, {}.asMap,", param, bus));
        }
    }
    lines.push("    [\\midinote, \\dur, \\amp], Pseq([".to_string());
    lines.extend(rows(&steps, period).into_iter().map(|r| format!("        {},", r)));
    lines.push(format!("    ], {})", repeats));
    lines.push(");".to_string());
    pattern.lines = lines;
    pattern
}

/// Onsets in beats; chords merged, overlaps cut at the next onset, and notes
/// outside a loop's first pass dropped
fn steps(
    composition: &ResolvedComposition,
    seq: &ResolvedSequence,
    path: &str,
    diagnostics: &mut Diagnostics,
) -> Vec<Step> {
    let map = &composition.tempo_map;
    let period = seq.repeat.period().map(|p| map.beat_at_seconds(p));

    let mut out: Vec<Step> = Vec::new();
    for note in seq.sorted_notes() {
        let start = map.beat_at_seconds(note.start);
        let mut end = map.beat_at_seconds(note.end());
        if let Some(period) = period {
            if start >= period - EPSILON {
                debug!(label = %seq.label, index = note.index, "note outside loop period dropped");
                continue;
            }
            end = end.min(period);
        }
        if end - start < EPSILON || note.pitches.is_empty() {
            continue;
        }

        let notes = note_numbers(note, &format!("{}.notes[{}].note", path, note.index), diagnostics);
        if let Some(last) = out.last_mut() {
            if (start - last.start).abs() < EPSILON {
                for n in notes {
                    if !last.notes.contains(&n) {
                        last.notes.push(n);
                    }
                }
                last.end = last.end.max(end);
                continue;
            }
            if start < last.end - EPSILON {
                last.end = start;
            }
        }
        out.push(Step {
            start,
            end,
            notes,
            amp: note.velocity,
        });
    }
    out
}

fn note_numbers(note: &ResolvedNote, path: &str, diagnostics: &mut Diagnostics) -> Vec<String> {
    let cents = note.microtuning.unwrap_or(0.0) / 100.0;
    note.pitches
        .iter()
        .map(|p| {
            let midi = pitch::to_midi(p).unwrap_or_else(|| {
                diagnostics.warning(
                    path,
                    format!("unresolvable pitch '{}', using {}", p, DEFAULT_PITCH),
                );
                DEFAULT_PITCH
            });
            number(f64::from(midi) + cents)
        })
        .collect()
}

fn rows(steps: &[Step], period: Option<f64>) -> Vec<String> {
    let mut rows = Vec::new();
    let mut cursor = 0.0;
    for step in steps {
        if step.start > cursor + EPSILON {
            rows.push(rest(step.start - cursor));
        }
        let midinote = match step.notes.as_slice() {
            [single] => single.clone(),
            many => format!("[{}]", many.join(", ")),
        };
        rows.push(format!(
            "[{}, {}, {}]",
            midinote,
            beats(step.end - step.start),
            number(step.amp)
        ));
        cursor = step.end;
    }
    if let Some(period) = period {
        if period > cursor + EPSILON {
            rows.push(rest(period - cursor));
        }
    }
    rows
}

fn rest(beats: f64) -> String {
    format!("[\\rest, {}, 0]", literal::beats(beats))
}
