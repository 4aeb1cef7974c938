//! Shape normalization.
//!
//! Input arrives in several shapes (canonical documents, `tracks` maps,
//! `sequences`/`parts` arrays, bare note lists). [`RULES`] is checked top to
//! bottom and the first rule that matches and applies wins. The last rule
//! matches anything, so [`normalize`] is total.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::model::{
    AudioGraphNode, Composition, Connection, DeviceSpec, EffectRef, LoopSpec, Metadata,
    NodeCategory, NodeKind, NoteEvent, NotePitch, PitchValue, Sequence, TimeExpr, MASTER,
};

/// Id of the synth created when the input has no audio graph
pub const DEFAULT_SYNTH_ID: &str = "synth";

/// Label of the sequence built from a bare note list
pub const DEFAULT_SEQUENCE_LABEL: &str = "sequence";

/// A shape-detection rule
pub struct Rule {
    pub name: &'static str,
    pub matches: fn(&Value) -> bool,
    /// `None` hands the input on to the next rule
    pub apply: fn(&Value) -> Option<Composition>,
}

pub const RULES: &[Rule] = &[
    Rule {
        name: "canonical",
        matches: is_canonical,
        apply: from_canonical,
    },
    Rule {
        name: "tracks",
        matches: has_tracks,
        apply: from_tracks,
    },
    Rule {
        name: "sequences",
        matches: has_sequences,
        apply: from_sequences,
    },
    Rule {
        name: "note-array",
        matches: is_note_array,
        apply: from_note_array,
    },
    Rule {
        name: "fallback",
        matches: always,
        apply: from_unknown,
    },
];

/// Map any JSON value onto the canonical model
#[instrument(skip_all)]
pub fn normalize(input: &Value) -> Composition {
    for rule in RULES {
        if !(rule.matches)(input) {
            continue;
        }
        if let Some(composition) = (rule.apply)(input) {
            debug!(rule = rule.name, "normalized input");
            return composition;
        }
        debug!(rule = rule.name, "rule matched but did not apply");
    }
    empty()
}

fn empty() -> Composition {
    Composition {
        format_id: Some(crate::FORMAT_ID.to_string()),
        version: Some(crate::FORMAT_VERSION.to_string()),
        ..Composition::default()
    }
}

// Rule 1: canonical documents

fn is_canonical(input: &Value) -> bool {
    input.get("formatId").and_then(Value::as_str) == Some(crate::FORMAT_ID)
}

/// Canonical documents never fall through to the other shapes: their numeric
/// times are seconds, which the other rules would read as beats.
fn from_canonical(input: &Value) -> Option<Composition> {
    let mut input = input.clone();
    carry_fractional_pitches(&mut input);
    match serde_json::from_value::<Composition>(input.clone()) {
        Ok(composition) => Some(composition),
        Err(e) => {
            warn!(error = %e, "canonical document did not deserialize, keeping readable fields");
            Some(salvage_canonical(&input))
        }
    }
}

/// Fractional MIDI numbers become the nearest note plus microtuning cents
fn carry_fractional_pitches(input: &mut Value) {
    let Some(sequences) = input.get_mut("sequences").and_then(Value::as_array_mut) else {
        return;
    };
    let notes = sequences
        .iter_mut()
        .filter_map(|seq| seq.get_mut("notes").and_then(Value::as_array_mut))
        .flatten()
        .filter_map(Value::as_object_mut);

    for fields in notes {
        match fields.get_mut("note") {
            Some(Value::Array(chord)) => {
                for pitch in chord.iter_mut() {
                    if let Some((midi, cents)) = split_fractional(pitch) {
                        if cents != 0.0 {
                            warn!(midi, cents, "chord pitch rounded, per-pitch detune is not kept");
                        }
                        *pitch = Value::from(midi);
                    }
                }
            }
            Some(pitch) => {
                if let Some((midi, cents)) = split_fractional(pitch) {
                    *pitch = Value::from(midi);
                    if cents != 0.0 {
                        let base = fields
                            .get("microtuning")
                            .and_then(Value::as_f64)
                            .unwrap_or(0.0);
                        fields.insert("microtuning".to_string(), Value::from(base + cents));
                    }
                }
            }
            None => {}
        }
    }
}

/// A non-integer numeric pitch as (nearest MIDI number, cents off it)
fn split_fractional(pitch: &Value) -> Option<(i64, f64)> {
    let Value::Number(n) = pitch else {
        return None;
    };
    if n.is_i64() || n.is_u64() {
        return None;
    }
    let f = n.as_f64()?;
    let midi = f.round();
    Some((midi as i64, (f - midi) * 100.0))
}

/// Keep every canonical field that reads cleanly and record the rest in
/// `rejected` for the validator.
fn salvage_canonical(input: &Value) -> Composition {
    let Some(obj) = input.as_object() else {
        return empty();
    };
    let mut kept = Map::new();
    let mut rejected = Vec::new();

    for (key, value) in obj {
        if let ("sequences", Value::Array(items)) = (key.as_str(), value) {
            let mut readable = Vec::new();
            for (i, item) in items.iter().enumerate() {
                match serde_json::from_value::<Sequence>(item.clone()) {
                    Ok(_) => readable.push(item.clone()),
                    Err(e) => rejected.push(sequence_failure(i, item, &e)),
                }
            }
            kept.insert(key.clone(), Value::Array(readable));
            continue;
        }

        let single = Value::Object(Map::from_iter([(key.clone(), value.clone())]));
        match serde_json::from_value::<Composition>(single) {
            Ok(_) => {
                kept.insert(key.clone(), value.clone());
            }
            Err(e) => rejected.push(format!("{}: {}", key, e)),
        }
    }

    let mut composition =
        serde_json::from_value::<Composition>(Value::Object(kept)).unwrap_or_else(|_| empty());
    composition.rejected = rejected;
    composition
}

/// Narrow a sequence read failure down to its first unreadable note
fn sequence_failure(index: usize, item: &Value, error: &serde_json::Error) -> String {
    let bad_note = item
        .get("notes")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .enumerate()
        .find_map(|(j, note)| {
            serde_json::from_value::<NoteEvent>(note.clone())
                .err()
                .map(|e| (j, e))
        });
    match bad_note {
        Some((j, e)) => format!("sequences[{}].notes[{}]: {}", index, j, e),
        None => format!("sequences[{}]: {}", index, error),
    }
}

// Rule 2: `{"tracks": {"name": [...] | {...}}}`

fn has_tracks(input: &Value) -> bool {
    input.get("tracks").is_some_and(Value::is_object)
}

fn from_tracks(input: &Value) -> Option<Composition> {
    let obj = input.as_object()?;
    let tracks = obj.get("tracks")?.as_object()?;
    let mut composition = header(obj);

    let sequences = tracks
        .iter()
        .map(|(key, track)| match track {
            Value::Object(fields) => sequence_from(fields, key, &composition),
            other => Sequence {
                label: key.clone(),
                notes: Some(notes_from(other)),
                ..Sequence::default()
            },
        })
        .collect();
    composition.sequences = Some(sequences);
    assign_default_synths(&mut composition);
    Some(composition)
}

// Rule 3: `{"sequences": [...]}` or `{"parts": [...]}`

fn has_sequences(input: &Value) -> bool {
    ["sequences", "parts"]
        .iter()
        .any(|k| input.get(k).is_some_and(Value::is_array))
}

fn from_sequences(input: &Value) -> Option<Composition> {
    let obj = input.as_object()?;
    let items = ["sequences", "parts"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_array))?;
    let mut composition = header(obj);

    let sequences = items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(fields) => {
                sequence_from(fields, &format!("sequence{}", i + 1), &composition)
            }
            other => {
                warn!(index = i, "sequence entry is not an object");
                Sequence {
                    label: format!("sequence{}", i + 1),
                    notes: other.as_array().map(|_| notes_from(other)),
                    ..Sequence::default()
                }
            }
        })
        .collect();
    composition.sequences = Some(sequences);
    Some(composition)
}

// Rule 4: `[{"pitch": 60, ...}, ...]`

fn is_note_array(input: &Value) -> bool {
    input
        .as_array()
        .is_some_and(|items| items.iter().all(Value::is_object))
}

fn from_note_array(input: &Value) -> Option<Composition> {
    let mut composition = header(&Map::new());
    composition.sequences = Some(vec![Sequence {
        label: DEFAULT_SEQUENCE_LABEL.to_string(),
        notes: Some(notes_from(input)),
        ..Sequence::default()
    }]);
    assign_default_synths(&mut composition);
    Some(composition)
}

// Rule 5: anything else

fn always(_: &Value) -> bool {
    true
}

fn from_unknown(input: &Value) -> Option<Composition> {
    warn!(
        kind = value_kind(input),
        "unrecognized input shape, producing an empty composition"
    );
    Some(empty())
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Top-level fields shared by the object shapes
fn header(obj: &Map<String, Value>) -> Composition {
    let mut composition = empty();

    composition.bpm = Some(
        first(obj, &["bpm", "tempo"])
            .and_then(Value::as_f64)
            .unwrap_or(crate::DEFAULT_BPM),
    );
    composition.key_signature = first_str(obj, &["keySignature", "key"]);
    composition.time_signature = first_str(obj, &["timeSignature", "meter"]);

    let nested = obj.get("metadata").and_then(Value::as_object);
    let meta_str = |keys: &[&str]| {
        first_str(obj, keys).or_else(|| nested.and_then(|m| first_str(m, keys)))
    };
    composition.metadata = Metadata {
        name: meta_str(&["name", "title"]),
        author: meta_str(&["author", "composer"]),
        description: meta_str(&["description"]),
    };

    composition.tempo_map = lenient_list(obj.get("tempoMap"), "tempoMap");
    composition.time_signature_map = lenient_list(obj.get("timeSignatureMap"), "timeSignatureMap");
    composition.key_signature_map = lenient_list(obj.get("keySignatureMap"), "keySignatureMap");
    composition.audio_graph = lenient_list(obj.get("audioGraph"), "audioGraph");
    composition.connections = obj
        .get("connections")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(connection_from).collect())
        .unwrap_or_default();
    composition.automation = lenient_list(obj.get("automation"), "automation");
    composition.annotations = lenient_list(obj.get("annotations"), "annotations");
    composition
}

fn sequence_from(fields: &Map<String, Value>, fallback_label: &str, composition: &Composition) -> Sequence {
    let label = first_str(fields, &["label", "name", "id", "title"])
        .unwrap_or_else(|| fallback_label.to_string());

    let (synth_ref, synth) = match first(fields, &["synthRef", "synth", "instrument"]) {
        Some(Value::String(s)) if composition.node(s).is_some() => (Some(s.clone()), None),
        Some(Value::String(s)) => (None, Some(DeviceSpec::new(NodeKind::parse(s)))),
        Some(v @ Value::Object(_)) => (None, device_from(v)),
        _ => (None, None),
    };

    let effects = fields
        .get("effects")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(id) => Some(EffectRef::Node(id.clone())),
                    v @ Value::Object(_) => device_from(v).map(EffectRef::Inline),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let looping = match fields.get("loop") {
        Some(Value::Bool(b)) => LoopSpec::Flag(*b),
        Some(v) => time_expr(v).map(LoopSpec::Span).unwrap_or_default(),
        None => LoopSpec::default(),
    };

    Sequence {
        label,
        synth_ref,
        synth,
        effects,
        notes: first(fields, &["notes", "events"]).map(notes_from),
        looping,
        loop_end: first(fields, &["loopEnd", "loopLength"]).and_then(time_expr),
        midi_channel: first(fields, &["midiChannel", "channel"]).and_then(Value::as_i64),
    }
}

fn device_from(value: &Value) -> Option<DeviceSpec> {
    let obj = value.as_object()?;
    let kind = first_str(obj, &["type", "kind", "name"])?;
    let options = obj
        .get("options")
        .and_then(Value::as_object)
        .map(|o| o.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();
    Some(DeviceSpec {
        kind: NodeKind::parse(&kind),
        options,
    })
}

fn connection_from(value: &Value) -> Option<Connection> {
    match value {
        Value::Array(items) => Some(Connection(
            items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
        )),
        Value::Object(obj) => {
            let source = first_str(obj, &["from", "source"])?;
            let target = first_str(obj, &["to", "target"])?;
            Some(Connection::new(source, target))
        }
        _ => {
            warn!("skipping connection that is neither an array nor an object");
            None
        }
    }
}

/// Give every sequence without a synth one to play through, creating the
/// default `synth -> master` graph when the input had none
fn assign_default_synths(composition: &mut Composition) {
    let needs_synth = composition
        .sequences()
        .iter()
        .any(|s| s.synth_ref.is_none() && s.synth.is_none());
    if !needs_synth {
        return;
    }

    let instrument = composition
        .audio_graph
        .iter()
        .find(|n| n.kind.category() == NodeCategory::Instrument)
        .map(|n| n.id.clone());

    let synth_id = match instrument {
        Some(id) => id,
        None if composition.audio_graph.is_empty() => {
            composition
                .audio_graph
                .push(AudioGraphNode::new(DEFAULT_SYNTH_ID, NodeKind::Synth));
            composition
                .connections
                .push(Connection::new(DEFAULT_SYNTH_ID, MASTER));
            DEFAULT_SYNTH_ID.to_string()
        }
        None => {
            warn!("audio graph has no instrument node, sequences keep no synth");
            return;
        }
    };

    for seq in composition.sequences.iter_mut().flatten() {
        if seq.synth_ref.is_none() && seq.synth.is_none() {
            seq.synth_ref = Some(synth_id.clone());
        }
    }
}

fn notes_from(value: &Value) -> Vec<NoteEvent> {
    match value.as_array() {
        Some(items) => items
            .iter()
            .filter_map(|item| match item.as_object() {
                Some(fields) => Some(note_from(fields)),
                None => {
                    warn!("skipping note entry that is not an object");
                    None
                }
            })
            .collect(),
        None => Vec::new(),
    }
}

fn note_from(fields: &Map<String, Value>) -> NoteEvent {
    NoteEvent {
        note: first(fields, &["note", "pitch", "pitches"]).and_then(pitch_from),
        time: first(fields, &["time", "start"]).and_then(|v| match v {
            Value::Number(n) => n.as_f64().map(beats_to_bar_beat),
            other => time_expr(other),
        }),
        duration: first(fields, &["duration", "length", "dur"]).and_then(|v| match v {
            Value::Number(n) => n.as_f64().map(beats_to_token),
            other => time_expr(other),
        }),
        velocity: first(fields, &["velocity", "volume", "vel"])
            .and_then(Value::as_f64)
            .map(normalize_velocity),
        articulation: first_str(fields, &["articulation"]),
        microtuning: first(fields, &["microtuning", "cents"]).and_then(Value::as_f64),
        channel: fields.get("channel").and_then(Value::as_i64),
        modulations: lenient_list(fields.get("modulations"), "modulations"),
    }
}

fn pitch_from(value: &Value) -> Option<NotePitch> {
    match value {
        Value::Array(items) => Some(NotePitch::Chord(
            items.iter().filter_map(single_pitch).collect(),
        )),
        other => single_pitch(other).map(NotePitch::Single),
    }
}

fn single_pitch(value: &Value) -> Option<PitchValue> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| PitchValue::Midi(f.round() as i64)),
        Value::String(s) => Some(PitchValue::Name(s.clone())),
        _ => None,
    }
}

fn time_expr(value: &Value) -> Option<TimeExpr> {
    match value {
        Value::Number(n) => n.as_f64().map(TimeExpr::Seconds),
        Value::String(s) => Some(TimeExpr::Text(s.clone())),
        _ => None,
    }
}

/// Beats in 4/4 as `"bar:beat:0"`
fn beats_to_bar_beat(beats: f64) -> TimeExpr {
    let beats = beats.max(0.0);
    let bars = (beats / 4.0).floor();
    let beat = beats - bars * 4.0;
    TimeExpr::Text(format!("{}:{}:0", bars, beat))
}

/// Beat length as a notation token
fn beats_to_token(beats: f64) -> TimeExpr {
    let token = match beats {
        b if b == 0.25 => "16n".to_string(),
        b if b == 0.5 => "8n".to_string(),
        b if b == 1.0 => "4n".to_string(),
        b if b == 2.0 => "2n".to_string(),
        b if b == 4.0 => "1n".to_string(),
        b => format!("{}n", b),
    };
    TimeExpr::Text(token)
}

/// Velocities above 1 are MIDI values
fn normalize_velocity(v: f64) -> f64 {
    let v = if v > 1.0 { v / 127.0 } else { v };
    v.clamp(0.0, 1.0)
}

fn first<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
}

fn first_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

/// Deserialize each array element, skipping the ones that do not fit
fn lenient_list<T: DeserializeOwned>(value: Option<&Value>, field: &str) -> Vec<T> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| match serde_json::from_value(item.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(field, index = i, error = %e, "skipping malformed entry");
                None
            }
        })
        .collect()
}
