//! Defaulting and time resolution.
//!
//! [`resolve`] turns a validated [`Composition`] into a [`ResolvedComposition`]:
//! every time expression becomes absolute seconds, defaults are applied, and
//! loop settings become a [`Repeat`] plan. This is the only view the encoders
//! and any playback engine consume.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::key::KeySignature;
use crate::meter::TimeSignature;
use crate::model::{
    AudioGraphNode, Composition, EffectRef, LoopSpec, Metadata, ModulationKind, NodeKind,
    PitchValue, Sequence, TimeExpr,
};
use crate::timing::{parse_time, TempoMap, TimeValue};

/// Velocity used when a note does not set one
pub const DEFAULT_VELOCITY: f64 = 0.8;

/// Most passes a finite loop is unrolled into
pub const MAX_LOOP_PASSES: u32 = 4096;

/// Loops shorter than this (seconds) are played once
pub const MIN_LOOP_PERIOD: f64 = 0.001;

/// A fully defaulted, time-resolved composition
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedComposition {
    pub format_id: String,
    pub version: String,
    /// Tempo at time zero
    pub bpm: f64,
    pub time_signature: TimeSignature,
    pub key_signature: Option<KeySignature>,
    pub tempo_map: TempoMap,
    pub meter_changes: Vec<MeterAt>,
    pub key_changes: Vec<KeyAt>,
    pub metadata: Metadata,
    pub audio_graph: Vec<AudioGraphNode>,
    pub routes: Vec<Route>,
    pub sequences: Vec<ResolvedSequence>,
    pub automation: Vec<ResolvedAutomation>,
    pub annotations: Vec<ResolvedAnnotation>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ResolvedComposition {
    pub fn node(&self, id: &str) -> Option<&AudioGraphNode> {
        self.audio_graph.iter().find(|n| n.id == id)
    }

    /// Seconds of one quarter note at `seconds`
    pub fn quarter_at(&self, seconds: f64) -> f64 {
        60.0 / self.tempo_map.tempo_at(seconds)
    }

    /// End of the last note across all sequences (first pass of any loop)
    pub fn duration(&self) -> f64 {
        self.sequences
            .iter()
            .map(ResolvedSequence::end)
            .fold(0.0, f64::max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeterAt {
    pub seconds: f64,
    pub time_signature: TimeSignature,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KeyAt {
    pub seconds: f64,
    pub key_signature: KeySignature,
}

/// A well-formed connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub source: String,
    pub target: String,
}

/// The device a sequence plays through
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    /// Audio graph node id; `None` for inline devices
    pub node: Option<String>,
    pub kind: NodeKind,
    pub options: BTreeMap<String, Value>,
}

/// How a sequence repeats
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Repeat {
    Once,
    /// Forever, restarting every `period` seconds
    Infinite { period: f64 },
    /// Restarting every `period` seconds until `span` seconds have elapsed
    Finite { span: f64, period: f64 },
}

impl Repeat {
    /// Number of passes, `None` when unbounded
    pub fn count(&self) -> Option<u32> {
        match self {
            Repeat::Once => Some(1),
            Repeat::Infinite { .. } => None,
            Repeat::Finite { span, period } => Some(
                (span / period)
                    .ceil()
                    .clamp(1.0, f64::from(MAX_LOOP_PASSES)) as u32,
            ),
        }
    }

    pub fn period(&self) -> Option<f64> {
        match self {
            Repeat::Once => None,
            Repeat::Infinite { period } | Repeat::Finite { period, .. } => Some(*period),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSequence {
    pub label: String,
    pub instrument: Device,
    pub effects: Vec<Device>,
    pub notes: Vec<ResolvedNote>,
    pub repeat: Repeat,
    pub midi_channel: Option<u8>,
}

impl ResolvedSequence {
    /// End of the last note of the first pass
    pub fn end(&self) -> f64 {
        self.notes.iter().map(ResolvedNote::end).fold(0.0, f64::max)
    }

    /// Notes sorted by start, ties kept in input order
    pub fn sorted_notes(&self) -> Vec<&ResolvedNote> {
        let mut notes: Vec<&ResolvedNote> = self.notes.iter().collect();
        notes.sort_by(|a, b| a.start.total_cmp(&b.start));
        notes
    }

    /// Notes with finite loops unrolled; infinite loops yield a single pass
    pub fn expanded_notes(&self) -> Vec<ResolvedNote> {
        let Repeat::Finite { span, period } = self.repeat else {
            return self.notes.clone();
        };
        let passes = self.repeat.count().unwrap_or(1);
        let mut out = Vec::new();
        for pass in 0..passes {
            let offset = f64::from(pass) * period;
            for note in &self.notes {
                let start = note.start + offset;
                if start >= span || note.start >= period {
                    continue;
                }
                let mut note = note.clone();
                note.start = start;
                for m in &mut note.modulations {
                    m.time += offset;
                }
                out.push(note);
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedNote {
    /// Position in the sequence's input order
    pub index: usize,
    /// One entry for a single note, several for a chord
    pub pitches: Vec<PitchValue>,
    pub start: f64,
    pub duration: f64,
    pub velocity: f64,
    pub articulation: Option<String>,
    pub microtuning: Option<f64>,
    pub channel: Option<u8>,
    pub modulations: Vec<ResolvedModulation>,
}

impl ResolvedNote {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    pub fn is_chord(&self) -> bool {
        self.pitches.len() > 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedModulation {
    pub kind: ModulationKind,
    pub controller: Option<u8>,
    pub value: f64,
    /// Absolute seconds
    pub time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Curve {
    #[default]
    Step,
    Linear,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedAutomation {
    /// Node id when the target path starts with one
    pub node: Option<String>,
    pub parameter: String,
    pub time: f64,
    pub value: f64,
    pub curve: Curve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    #[default]
    Marker,
    Lyric,
    Cue,
    Text,
}

impl AnnotationKind {
    pub fn parse(s: &str) -> Option<AnnotationKind> {
        match s.trim().to_ascii_lowercase().as_str() {
            "marker" | "section" | "rehearsal" => Some(AnnotationKind::Marker),
            "lyric" | "lyrics" => Some(AnnotationKind::Lyric),
            "cue" => Some(AnnotationKind::Cue),
            "text" | "comment" | "note" => Some(AnnotationKind::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedAnnotation {
    pub text: String,
    pub time: f64,
    pub kind: AnnotationKind,
}

/// Resolves expressions against one tempo map, recording fallbacks
struct Resolver {
    tempo: TempoMap,
    quarters_per_bar: f64,
    diagnostics: Diagnostics,
}

impl Resolver {
    fn parse(&mut self, expr: &TimeExpr, path: &str) -> Option<TimeValue> {
        let parsed = parse_time(expr, self.quarters_per_bar);
        if parsed.is_none() {
            self.diagnostics.push(
                Diagnostic::warning(format!("unparseable time expression '{}', using 0", expr))
                    .with_path(path)
                    .with_suggestion("use seconds, bar:beat[:tick] or a token like 4n"),
            );
        }
        parsed
    }

    fn position(&mut self, expr: Option<&TimeExpr>, path: &str) -> f64 {
        match expr.and_then(|e| self.parse(e, path)) {
            Some(value) => self.tempo.position(value).max(0.0),
            None => 0.0,
        }
    }

    fn span(&mut self, start: f64, expr: Option<&TimeExpr>, path: &str) -> f64 {
        match expr.and_then(|e| self.parse(e, path)) {
            Some(value) => self.tempo.span(start, value).max(0.0),
            None => 0.0,
        }
    }
}

/// Resolve every time expression and apply defaults
#[instrument(skip_all, fields(name = ?composition.metadata.name))]
pub fn resolve(composition: &Composition) -> ResolvedComposition {
    let mut diagnostics = Diagnostics::new();

    let base_bpm = match composition.bpm {
        Some(bpm) if bpm.is_finite() && bpm > 0.0 => bpm,
        Some(bpm) => {
            diagnostics.warning("bpm", format!("invalid bpm {}, using {}", bpm, crate::DEFAULT_BPM));
            crate::DEFAULT_BPM
        }
        None => crate::DEFAULT_BPM,
    };

    let time_signature = match composition.time_signature.as_deref() {
        Some(text) => TimeSignature::parse(text).unwrap_or_else(|| {
            diagnostics.warning(
                "timeSignature",
                format!("unrecognized time signature '{}', using 4/4", text),
            );
            TimeSignature::default()
        }),
        None => TimeSignature::default(),
    };

    let key_signature = composition.key_signature.as_deref().and_then(|text| {
        let key = KeySignature::parse(text);
        if key.is_none() {
            diagnostics.warning(
                "keySignature",
                format!("unrecognized key signature '{}', using C", text),
            );
        }
        key
    });

    let quarters_per_bar = time_signature.quarters_per_bar();
    let mut tempo_points = Vec::new();
    for (i, point) in composition.tempo_map.iter().enumerate() {
        let path = format!("tempoMap[{}]", i);
        match parse_time(&point.time, quarters_per_bar) {
            Some(time) if point.bpm.is_finite() && point.bpm > 0.0 => {
                tempo_points.push((time, point.bpm))
            }
            Some(_) => diagnostics.warning(path, format!("invalid bpm {}, entry skipped", point.bpm)),
            None => diagnostics.warning(
                path,
                format!("unparseable time expression '{}', entry skipped", point.time),
            ),
        }
    }

    let mut resolver = Resolver {
        tempo: TempoMap::from_values(base_bpm, tempo_points),
        quarters_per_bar,
        diagnostics,
    };

    let mut meter_changes = Vec::new();
    for (i, change) in composition.time_signature_map.iter().enumerate() {
        let path = format!("timeSignatureMap[{}]", i);
        match TimeSignature::parse(&change.time_signature) {
            Some(time_signature) => meter_changes.push(MeterAt {
                seconds: resolver.position(Some(&change.time), &path),
                time_signature,
            }),
            None => resolver.diagnostics.warning(
                path,
                format!("unrecognized time signature '{}'", change.time_signature),
            ),
        }
    }
    meter_changes.sort_by(|a, b| a.seconds.total_cmp(&b.seconds));

    let mut key_changes = Vec::new();
    for (i, change) in composition.key_signature_map.iter().enumerate() {
        let path = format!("keySignatureMap[{}]", i);
        match KeySignature::parse(&change.key_signature) {
            Some(key_signature) => key_changes.push(KeyAt {
                seconds: resolver.position(Some(&change.time), &path),
                key_signature,
            }),
            None => resolver.diagnostics.warning(
                path,
                format!("unrecognized key signature '{}'", change.key_signature),
            ),
        }
    }
    key_changes.sort_by(|a, b| a.seconds.total_cmp(&b.seconds));

    let routes = composition
        .connections
        .iter()
        .filter_map(|c| c.endpoints())
        .map(|(source, target)| Route {
            source: source.to_string(),
            target: target.to_string(),
        })
        .collect();

    let sequences = composition
        .sequences()
        .iter()
        .enumerate()
        .map(|(i, seq)| resolve_sequence(&mut resolver, composition, i, seq))
        .collect();

    let mut automation = Vec::new();
    for (i, event) in composition.automation.iter().enumerate() {
        let path = format!("automation[{}]", i);
        let (node, parameter) = match event.target.split_once('.') {
            Some((head, rest)) if composition.node(head).is_some() => {
                (Some(head.to_string()), rest.to_string())
            }
            _ => (None, event.target.clone()),
        };
        let curve = match event.curve.as_deref() {
            Some(c) if c.eq_ignore_ascii_case("linear") => Curve::Linear,
            _ => Curve::Step,
        };
        automation.push(ResolvedAutomation {
            node,
            parameter,
            time: resolver.position(Some(&event.time), &path),
            value: event.value,
            curve,
        });
    }
    automation.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut annotations = Vec::new();
    for (i, annotation) in composition.annotations.iter().enumerate() {
        let path = format!("annotations[{}]", i);
        let kind = match annotation.kind.as_deref() {
            None => AnnotationKind::default(),
            Some(k) => AnnotationKind::parse(k).unwrap_or_else(|| {
                resolver
                    .diagnostics
                    .info(path.clone(), format!("unknown annotation type '{}', using marker", k));
                AnnotationKind::default()
            }),
        };
        annotations.push(ResolvedAnnotation {
            text: annotation.text.clone(),
            time: resolver.position(Some(&annotation.time), &path),
            kind,
        });
    }
    annotations.sort_by(|a, b| a.time.total_cmp(&b.time));

    let Resolver {
        tempo, diagnostics, ..
    } = resolver;

    debug!(
        sequences = composition.sequences().len(),
        tempo_changes = tempo.changes().count(),
        "resolved composition"
    );

    ResolvedComposition {
        format_id: composition
            .format_id
            .clone()
            .unwrap_or_else(|| crate::FORMAT_ID.to_string()),
        version: composition
            .version
            .clone()
            .unwrap_or_else(|| crate::FORMAT_VERSION.to_string()),
        bpm: tempo.initial_bpm(),
        time_signature,
        key_signature,
        tempo_map: tempo,
        meter_changes,
        key_changes,
        metadata: composition.metadata.clone(),
        audio_graph: composition.audio_graph.clone(),
        routes,
        sequences,
        automation,
        annotations,
        diagnostics: diagnostics.into_vec(),
    }
}

fn resolve_sequence(
    resolver: &mut Resolver,
    composition: &Composition,
    index: usize,
    seq: &Sequence,
) -> ResolvedSequence {
    let path = format!("sequences[{}]", index);

    let instrument = match (&seq.synth_ref, &seq.synth) {
        (Some(id), _) => match composition.node(id) {
            Some(node) => Device {
                node: Some(node.id.clone()),
                kind: node.kind.clone(),
                options: node.options.clone(),
            },
            None => {
                resolver.diagnostics.warning(
                    format!("{}.synthRef", path),
                    format!("synthRef '{}' names no audio graph node", id),
                );
                Device {
                    node: Some(id.clone()),
                    kind: NodeKind::Unknown(id.clone()),
                    options: BTreeMap::new(),
                }
            }
        },
        (None, Some(spec)) => Device {
            node: None,
            kind: spec.kind.clone(),
            options: spec.options.clone(),
        },
        (None, None) => Device {
            node: None,
            kind: NodeKind::default(),
            options: BTreeMap::new(),
        },
    };

    let mut effects = Vec::new();
    for (i, effect) in seq.effects.iter().enumerate() {
        match effect {
            EffectRef::Node(id) => match composition.node(id) {
                Some(node) => effects.push(Device {
                    node: Some(node.id.clone()),
                    kind: node.kind.clone(),
                    options: node.options.clone(),
                }),
                None => resolver.diagnostics.warning(
                    format!("{}.effects[{}]", path, i),
                    format!("effect '{}' names no audio graph node, skipped", id),
                ),
            },
            EffectRef::Inline(spec) => effects.push(Device {
                node: None,
                kind: spec.kind.clone(),
                options: spec.options.clone(),
            }),
        }
    }

    let mut notes = Vec::new();
    for (i, note) in seq.notes().iter().enumerate() {
        let note_path = format!("{}.notes[{}]", path, i);
        let start = resolver.position(note.time.as_ref(), &format!("{}.time", note_path));
        let duration = resolver.span(start, note.duration.as_ref(), &format!("{}.duration", note_path));

        let velocity = match note.velocity {
            Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
            _ => DEFAULT_VELOCITY,
        };

        let mut modulations = Vec::new();
        for (j, m) in note.modulations.iter().enumerate() {
            let mod_path = format!("{}.modulations[{}]", note_path, j);
            if let ModulationKind::Unknown(name) = &m.kind {
                resolver.diagnostics.warning(
                    mod_path,
                    format!("unknown modulation type '{}', dropped", name),
                );
                continue;
            }
            let offset = resolver.span(start, m.time.as_ref(), &format!("{}.time", mod_path));
            modulations.push(ResolvedModulation {
                kind: m.kind.clone(),
                controller: m.controller.and_then(|c| u8::try_from(c).ok()).filter(|c| *c <= 127),
                value: m.value,
                time: start + offset,
            });
        }

        notes.push(ResolvedNote {
            index: i,
            pitches: note.note.as_ref().map(|n| n.pitches()).unwrap_or_default(),
            start,
            duration,
            velocity,
            articulation: note.articulation.clone(),
            microtuning: note.microtuning.filter(|c| c.is_finite()),
            channel: note.channel.and_then(channel),
            modulations,
        });
    }

    let natural_end = notes.iter().map(ResolvedNote::end).fold(0.0, f64::max);
    let repeat = resolve_repeat(resolver, seq, natural_end, &path);

    ResolvedSequence {
        label: seq.label.clone(),
        instrument,
        effects,
        notes,
        repeat,
        midi_channel: seq.midi_channel.and_then(channel),
    }
}

/// Loop length is taken from `loopEnd` once, at the tempo of the first pass
fn resolve_repeat(
    resolver: &mut Resolver,
    seq: &Sequence,
    natural_end: f64,
    path: &str,
) -> Repeat {
    if seq.looping.is_off() {
        return Repeat::Once;
    }

    let loop_end_path = format!("{}.loopEnd", path);
    let period = match &seq.loop_end {
        Some(expr) => resolver.position(Some(expr), &loop_end_path),
        None => natural_end,
    };

    let repeat = match &seq.looping {
        LoopSpec::Flag(false) => Repeat::Once,
        LoopSpec::Flag(true) => Repeat::Infinite { period },
        LoopSpec::Span(span) => {
            if seq.loop_end.is_none() {
                resolver.diagnostics.warning(
                    format!("{}.loop", path),
                    "finite loop without loopEnd, played once",
                );
                return Repeat::Once;
            }
            let span = resolver.position(Some(span), &format!("{}.loop", path));
            Repeat::Finite { span, period }
        }
    };

    if period.is_nan() || period < MIN_LOOP_PERIOD {
        let message = if period <= 0.0 {
            "loop length is zero, played once".to_string()
        } else {
            format!("loop length {}s is below {}s, played once", period, MIN_LOOP_PERIOD)
        };
        resolver.diagnostics.warning(loop_end_path, message);
        return Repeat::Once;
    }

    if let Repeat::Finite { span, period } = repeat {
        let passes = (span / period).ceil();
        if passes > f64::from(MAX_LOOP_PASSES) {
            resolver.diagnostics.warning(
                format!("{}.loop", path),
                format!(
                    "loop would repeat {} times, capped at {} passes",
                    passes, MAX_LOOP_PASSES
                ),
            );
            return Repeat::Finite {
                span: period * f64::from(MAX_LOOP_PASSES),
                period,
            };
        }
    }
    repeat
}

fn channel(value: i64) -> Option<u8> {
    u8::try_from(value).ok().filter(|c| *c <= 15)
}
