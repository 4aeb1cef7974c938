//! Canonical composition model.
//!
//! These types are the stable, serializable shape every input is normalized
//! into. Fields the validator reports as missing stay optional here so their
//! absence survives a canonical pass-through; [`crate::resolve`] turns the
//! model into a fully defaulted [`crate::ResolvedComposition`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Reserved sink id that every audio graph may route into
pub const MASTER: &str = "master";

/// A complete composition
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Composition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tempo_map: Vec<TempoPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub time_signature_map: Vec<MeterChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_signature_map: Vec<KeyChange>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audio_graph: Vec<AudioGraphNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<Connection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequences: Option<Vec<Sequence>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub automation: Vec<AutomationEvent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    /// Canonical fields that could not be read, as `path: reason`
    #[serde(skip)]
    pub rejected: Vec<String>,
}

impl Composition {
    /// Start an empty canonical composition with the current format id and version
    pub fn new(name: impl Into<String>) -> Self {
        Composition {
            format_id: Some(crate::FORMAT_ID.to_string()),
            version: Some(crate::FORMAT_VERSION.to_string()),
            bpm: Some(crate::DEFAULT_BPM),
            metadata: Metadata {
                name: Some(name.into()),
                ..Metadata::default()
            },
            sequences: Some(Vec::new()),
            ..Composition::default()
        }
    }

    pub fn with_bpm(mut self, bpm: f64) -> Self {
        self.bpm = Some(bpm);
        self
    }

    pub fn with_node(mut self, node: AudioGraphNode) -> Self {
        self.audio_graph.push(node);
        self
    }

    pub fn connect(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.connections.push(Connection::new(source, target));
        self
    }

    pub fn with_sequence(mut self, sequence: Sequence) -> Self {
        self.sequences.get_or_insert_with(Vec::new).push(sequence);
        self
    }

    /// Sequences, or an empty slice when the field is absent
    pub fn sequences(&self) -> &[Sequence] {
        self.sequences.as_deref().unwrap_or(&[])
    }

    /// Look up an audio graph node by id
    pub fn node(&self, id: &str) -> Option<&AudioGraphNode> {
        self.audio_graph.iter().find(|n| n.id == id)
    }

    /// Canonical JSON form; feeding it back to `normalize` is a no-op
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Descriptive metadata
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.author.is_none() && self.description.is_none()
    }
}

/// A tempo breakpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoPoint {
    pub time: TimeExpr,
    pub bpm: f64,
}

/// A time signature change, e.g. `{"time": "8:0", "timeSignature": "3/4"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterChange {
    pub time: TimeExpr,
    pub time_signature: String,
}

/// A key signature change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyChange {
    pub time: TimeExpr,
    pub key_signature: String,
}

/// A time expression as written in the input.
///
/// Numbers are absolute seconds. Strings may be `"bar:beat[:tick]"`,
/// a notation token such as `"4n"`, `"2m"`, `"8t"`, or a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeExpr {
    Seconds(f64),
    Text(String),
}

impl From<f64> for TimeExpr {
    fn from(seconds: f64) -> Self {
        TimeExpr::Seconds(seconds)
    }
}

impl From<&str> for TimeExpr {
    fn from(text: &str) -> Self {
        TimeExpr::Text(text.to_string())
    }
}

impl From<String> for TimeExpr {
    fn from(text: String) -> Self {
        TimeExpr::Text(text)
    }
}

impl fmt::Display for TimeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeExpr::Seconds(s) => write!(f, "{}", s),
            TimeExpr::Text(t) => write!(f, "{}", t),
        }
    }
}

/// One node of the audio graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioGraphNode {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, Value>,
    /// Parameter path driven by a modulator node, e.g. `"lead.filter.frequency"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset_ref: Option<String>,
}

impl AudioGraphNode {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        AudioGraphNode {
            id: id.into(),
            kind,
            options: BTreeMap::new(),
            target: None,
            preset_ref: None,
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Broad role of a node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCategory {
    Instrument,
    Effect,
    Modulator,
    Sink,
    Unknown,
}

/// Node type, parsed from a loose type string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    Synth,
    MonoSynth,
    FmSynth,
    AmSynth,
    DuoSynth,
    PluckSynth,
    MembraneSynth,
    MetalSynth,
    NoiseSynth,
    Sampler,
    Reverb,
    Delay,
    PingPongDelay,
    Distortion,
    Chorus,
    Phaser,
    Tremolo,
    Filter,
    Compressor,
    BitCrusher,
    Lfo,
    Master,
    Unknown(String),
}

impl Default for NodeKind {
    fn default() -> Self {
        NodeKind::Unknown(String::new())
    }
}

impl NodeKind {
    /// Parse a type string (case-insensitive, separators ignored)
    pub fn parse(s: &str) -> NodeKind {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "synth" | "polysynth" | "basicsynth" => NodeKind::Synth,
            "monosynth" | "mono" | "bass" => NodeKind::MonoSynth,
            "fmsynth" | "fm" => NodeKind::FmSynth,
            "amsynth" | "am" => NodeKind::AmSynth,
            "duosynth" | "duo" => NodeKind::DuoSynth,
            "plucksynth" | "pluck" => NodeKind::PluckSynth,
            "membranesynth" | "membrane" | "kick" => NodeKind::MembraneSynth,
            "metalsynth" | "metal" => NodeKind::MetalSynth,
            "noisesynth" | "noise" => NodeKind::NoiseSynth,
            "sampler" | "sample" => NodeKind::Sampler,
            "reverb" | "freeverb" | "jcreverb" => NodeKind::Reverb,
            "delay" | "feedbackdelay" => NodeKind::Delay,
            "pingpongdelay" | "pingpong" => NodeKind::PingPongDelay,
            "distortion" | "overdrive" => NodeKind::Distortion,
            "chorus" => NodeKind::Chorus,
            "phaser" => NodeKind::Phaser,
            "tremolo" => NodeKind::Tremolo,
            "filter" | "autofilter" | "lowpass" => NodeKind::Filter,
            "compressor" | "limiter" => NodeKind::Compressor,
            "bitcrusher" | "crusher" => NodeKind::BitCrusher,
            "lfo" => NodeKind::Lfo,
            "master" | "destination" | "output" => NodeKind::Master,
            _ => NodeKind::Unknown(s.to_string()),
        }
    }

    /// Canonical type string
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::Synth => "synth",
            NodeKind::MonoSynth => "monoSynth",
            NodeKind::FmSynth => "fmSynth",
            NodeKind::AmSynth => "amSynth",
            NodeKind::DuoSynth => "duoSynth",
            NodeKind::PluckSynth => "pluckSynth",
            NodeKind::MembraneSynth => "membraneSynth",
            NodeKind::MetalSynth => "metalSynth",
            NodeKind::NoiseSynth => "noiseSynth",
            NodeKind::Sampler => "sampler",
            NodeKind::Reverb => "reverb",
            NodeKind::Delay => "delay",
            NodeKind::PingPongDelay => "pingPongDelay",
            NodeKind::Distortion => "distortion",
            NodeKind::Chorus => "chorus",
            NodeKind::Phaser => "phaser",
            NodeKind::Tremolo => "tremolo",
            NodeKind::Filter => "filter",
            NodeKind::Compressor => "compressor",
            NodeKind::BitCrusher => "bitCrusher",
            NodeKind::Lfo => "lfo",
            NodeKind::Master => "master",
            NodeKind::Unknown(s) => s,
        }
    }

    pub fn category(&self) -> NodeCategory {
        match self {
            NodeKind::Synth
            | NodeKind::MonoSynth
            | NodeKind::FmSynth
            | NodeKind::AmSynth
            | NodeKind::DuoSynth
            | NodeKind::PluckSynth
            | NodeKind::MembraneSynth
            | NodeKind::MetalSynth
            | NodeKind::NoiseSynth
            | NodeKind::Sampler => NodeCategory::Instrument,
            NodeKind::Reverb
            | NodeKind::Delay
            | NodeKind::PingPongDelay
            | NodeKind::Distortion
            | NodeKind::Chorus
            | NodeKind::Phaser
            | NodeKind::Tremolo
            | NodeKind::Filter
            | NodeKind::Compressor
            | NodeKind::BitCrusher => NodeCategory::Effect,
            NodeKind::Lfo => NodeCategory::Modulator,
            NodeKind::Master => NodeCategory::Sink,
            NodeKind::Unknown(_) => NodeCategory::Unknown,
        }
    }

    pub fn is_effect(&self) -> bool {
        self.category() == NodeCategory::Effect
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, NodeKind::Unknown(_))
    }
}

impl From<String> for NodeKind {
    fn from(s: String) -> Self {
        NodeKind::parse(&s)
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A routing edge, serialized as a JSON array of endpoint ids.
///
/// Well-formed connections have exactly two endpoints; malformed arrays are
/// kept as-is so the validator can report them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Connection(pub Vec<String>);

impl Connection {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Connection(vec![source.into(), target.into()])
    }

    /// `(source, target)` when the connection is well-formed
    pub fn endpoints(&self) -> Option<(&str, &str)> {
        match self.0.as_slice() {
            [source, target] => Some((source.as_str(), target.as_str())),
            _ => None,
        }
    }
}

/// Inline device description (a synth or effect that is not an audio graph node)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSpec {
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, Value>,
}

impl DeviceSpec {
    pub fn new(kind: NodeKind) -> Self {
        DeviceSpec {
            kind,
            options: BTreeMap::new(),
        }
    }
}

/// An effect in a sequence's insert chain: a node id or an inline device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EffectRef {
    Node(String),
    Inline(DeviceSpec),
}

/// Loop setting: off, forever, or for a time span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LoopSpec {
    Flag(bool),
    Span(TimeExpr),
}

impl Default for LoopSpec {
    fn default() -> Self {
        LoopSpec::Flag(false)
    }
}

impl LoopSpec {
    pub fn is_off(&self) -> bool {
        matches!(self, LoopSpec::Flag(false))
    }
}

/// A track of notes played by one instrument
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sequence {
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synth_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synth: Option<DeviceSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effects: Vec<EffectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<NoteEvent>>,
    #[serde(rename = "loop", default, skip_serializing_if = "LoopSpec::is_off")]
    pub looping: LoopSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_end: Option<TimeExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midi_channel: Option<i64>,
}

impl Sequence {
    pub fn new(label: impl Into<String>) -> Self {
        Sequence {
            label: label.into(),
            notes: Some(Vec::new()),
            ..Sequence::default()
        }
    }

    pub fn synth_ref(mut self, id: impl Into<String>) -> Self {
        self.synth_ref = Some(id.into());
        self
    }

    pub fn inline_synth(mut self, spec: DeviceSpec) -> Self {
        self.synth = Some(spec);
        self
    }

    pub fn note(mut self, note: NoteEvent) -> Self {
        self.notes.get_or_insert_with(Vec::new).push(note);
        self
    }

    pub fn looped(mut self, looping: LoopSpec, loop_end: Option<TimeExpr>) -> Self {
        self.looping = looping;
        self.loop_end = loop_end;
        self
    }

    pub fn channel(mut self, channel: i64) -> Self {
        self.midi_channel = Some(channel);
        self
    }

    /// Notes, or an empty slice when the field is absent
    pub fn notes(&self) -> &[NoteEvent] {
        self.notes.as_deref().unwrap_or(&[])
    }
}

/// A single pitch: a note name such as `"C#4"` or a MIDI number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PitchValue {
    Midi(i64),
    Name(String),
}

impl From<i64> for PitchValue {
    fn from(midi: i64) -> Self {
        PitchValue::Midi(midi)
    }
}

impl From<i32> for PitchValue {
    fn from(midi: i32) -> Self {
        PitchValue::Midi(i64::from(midi))
    }
}

impl From<&str> for PitchValue {
    fn from(name: &str) -> Self {
        PitchValue::Name(name.to_string())
    }
}

impl fmt::Display for PitchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PitchValue::Midi(n) => write!(f, "{}", n),
            PitchValue::Name(s) => write!(f, "{}", s),
        }
    }
}

/// A note's pitch content; an array is a chord
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotePitch {
    Single(PitchValue),
    Chord(Vec<PitchValue>),
}

impl NotePitch {
    pub fn pitches(&self) -> Vec<PitchValue> {
        match self {
            NotePitch::Single(p) => vec![p.clone()],
            NotePitch::Chord(ps) => ps.clone(),
        }
    }
}

impl From<PitchValue> for NotePitch {
    fn from(pitch: PitchValue) -> Self {
        NotePitch::Single(pitch)
    }
}

impl From<i64> for NotePitch {
    fn from(midi: i64) -> Self {
        NotePitch::Single(PitchValue::Midi(midi))
    }
}

impl From<i32> for NotePitch {
    fn from(midi: i32) -> Self {
        NotePitch::Single(PitchValue::Midi(i64::from(midi)))
    }
}

impl From<&str> for NotePitch {
    fn from(name: &str) -> Self {
        NotePitch::Single(PitchValue::Name(name.to_string()))
    }
}

/// One note (or chord) event
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<NotePitch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<TimeExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub articulation: Option<String>,
    /// Detune in cents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub microtuning: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modulations: Vec<Modulation>,
}

impl NoteEvent {
    pub fn new(
        note: impl Into<NotePitch>,
        time: impl Into<TimeExpr>,
        duration: impl Into<TimeExpr>,
    ) -> Self {
        NoteEvent {
            note: Some(note.into()),
            time: Some(time.into()),
            duration: Some(duration.into()),
            ..NoteEvent::default()
        }
    }

    pub fn chord(
        pitches: Vec<PitchValue>,
        time: impl Into<TimeExpr>,
        duration: impl Into<TimeExpr>,
    ) -> Self {
        NoteEvent {
            note: Some(NotePitch::Chord(pitches)),
            time: Some(time.into()),
            duration: Some(duration.into()),
            ..NoteEvent::default()
        }
    }

    pub fn velocity(mut self, velocity: f64) -> Self {
        self.velocity = Some(velocity);
        self
    }

    pub fn articulation(mut self, articulation: impl Into<String>) -> Self {
        self.articulation = Some(articulation.into());
        self
    }

    pub fn modulation(mut self, modulation: Modulation) -> Self {
        self.modulations.push(modulation);
        self
    }
}

/// Per-note modulation kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModulationKind {
    Cc,
    PitchBend,
    Aftertouch,
    Unknown(String),
}

impl ModulationKind {
    pub fn parse(s: &str) -> ModulationKind {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "cc" | "controlchange" | "controller" => ModulationKind::Cc,
            "pitchbend" | "bend" => ModulationKind::PitchBend,
            "aftertouch" | "channelpressure" | "pressure" => ModulationKind::Aftertouch,
            _ => ModulationKind::Unknown(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ModulationKind::Cc => "cc",
            ModulationKind::PitchBend => "pitchBend",
            ModulationKind::Aftertouch => "aftertouch",
            ModulationKind::Unknown(s) => s,
        }
    }
}

impl Default for ModulationKind {
    fn default() -> Self {
        ModulationKind::Unknown(String::new())
    }
}

impl From<String> for ModulationKind {
    fn from(s: String) -> Self {
        ModulationKind::parse(&s)
    }
}

impl From<ModulationKind> for String {
    fn from(kind: ModulationKind) -> Self {
        kind.as_str().to_string()
    }
}

/// A modulation message attached to a note.
///
/// `value` is 0-127 for `cc` and `aftertouch`, -1.0..=1.0 for `pitchBend`.
/// `time` is relative to the note start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modulation {
    #[serde(rename = "type", default)]
    pub kind: ModulationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<i64>,
    #[serde(default)]
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeExpr>,
}

impl Modulation {
    pub fn cc(controller: i64, value: f64, time: impl Into<TimeExpr>) -> Self {
        Modulation {
            kind: ModulationKind::Cc,
            controller: Some(controller),
            value,
            time: Some(time.into()),
        }
    }

    pub fn pitch_bend(value: f64, time: impl Into<TimeExpr>) -> Self {
        Modulation {
            kind: ModulationKind::PitchBend,
            controller: None,
            value,
            time: Some(time.into()),
        }
    }

    pub fn aftertouch(value: f64, time: impl Into<TimeExpr>) -> Self {
        Modulation {
            kind: ModulationKind::Aftertouch,
            controller: None,
            value,
            time: Some(time.into()),
        }
    }
}

/// A parameter change over time, targeting `"<nodeId>.<param>"` or `"<param>"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationEvent {
    pub target: String,
    pub time: TimeExpr,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve: Option<String>,
}

/// A textual annotation on the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub text: String,
    pub time: TimeExpr,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_kind_aliases() {
        assert_eq!(NodeKind::parse("FMSynth"), NodeKind::FmSynth);
        assert_eq!(NodeKind::parse("feedback_delay"), NodeKind::Delay);
        assert_eq!(NodeKind::parse("Destination"), NodeKind::Master);
        assert_eq!(
            NodeKind::parse("granulator"),
            NodeKind::Unknown("granulator".to_string())
        );
        assert_eq!(NodeKind::Reverb.category(), NodeCategory::Effect);
        assert_eq!(NodeKind::Lfo.category(), NodeCategory::Modulator);
    }

    #[test]
    fn test_node_kind_serde_is_stable() {
        let node: AudioGraphNode =
            serde_json::from_value(json!({"id": "lead", "type": "FMSynth"})).unwrap();
        assert_eq!(node.kind, NodeKind::FmSynth);

        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], "fmSynth");
        let back: AudioGraphNode = serde_json::from_value(value).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_connection_endpoints() {
        assert_eq!(
            Connection::new("lead", "master").endpoints(),
            Some(("lead", "master"))
        );
        assert_eq!(Connection(vec!["a".into()]).endpoints(), None);
        assert_eq!(
            Connection(vec!["a".into(), "b".into(), "c".into()]).endpoints(),
            None
        );
    }

    #[test]
    fn test_note_pitch_untagged() {
        let note: NoteEvent = serde_json::from_value(json!({
            "note": ["C4", 64, "G4"],
            "time": "0:0",
            "duration": 0.5
        }))
        .unwrap();

        assert_eq!(
            note.note,
            Some(NotePitch::Chord(vec![
                PitchValue::Name("C4".into()),
                PitchValue::Midi(64),
                PitchValue::Name("G4".into()),
            ]))
        );
        assert_eq!(note.time, Some(TimeExpr::Text("0:0".into())));
        assert_eq!(note.duration, Some(TimeExpr::Seconds(0.5)));
    }

    #[test]
    fn test_loop_spec_shapes() {
        let seq: Sequence = serde_json::from_value(json!({
            "label": "drums", "synthRef": "kit", "notes": [], "loop": "4m", "loopEnd": "1m"
        }))
        .unwrap();
        assert_eq!(seq.looping, LoopSpec::Span(TimeExpr::Text("4m".into())));

        let seq: Sequence =
            serde_json::from_value(json!({"label": "pad", "notes": [], "loop": true})).unwrap();
        assert_eq!(seq.looping, LoopSpec::Flag(true));
        assert!(seq.synth.is_none() && seq.synth_ref.is_none());
    }

    #[test]
    fn test_version_accepts_numbers() {
        let comp: Composition =
            serde_json::from_value(json!({"formatId": "x", "version": 2})).unwrap();
        assert_eq!(comp.version.as_deref(), Some("2"));
    }

    #[test]
    fn test_unknown_modulation_kind_round_trips() {
        let m: Modulation =
            serde_json::from_value(json!({"type": "breath", "value": 3})).unwrap();
        assert_eq!(m.kind, ModulationKind::Unknown("breath".into()));
        assert_eq!(serde_json::to_value(&m).unwrap()["type"], "breath");
    }
}
