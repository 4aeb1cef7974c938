//! SynthDef templates per node kind.
//!
//! Defaults follow the usual browser-synth presets for each kind. Node
//! `options` override them by control name; nested objects such as
//! `envelope` or `filterEnvelope` contribute their numeric fields too.

use std::collections::BTreeMap;

use composition::NodeKind;
use serde_json::Value;

use crate::literal::number;
use crate::writer::ScriptWriter;

/// Controls every instrument voice has
const VOICE: [(&str, f64); 5] = [
    ("out", 0.0),
    ("freq", 440.0),
    ("amp", 0.5),
    ("gate", 1.0),
    ("pan", 0.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Instrument,
    Effect,
    Modulator,
}

/// Controls with defaults plus the body lines of a definition
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub controls: Vec<(&'static str, f64)>,
    pub lines: Vec<String>,
}

impl Template {
    pub fn with_options(mut self, options: &BTreeMap<String, Value>) -> Self {
        let values = numeric_options(options);
        for (name, value) in &mut self.controls {
            if let Some(v) = values.get(*name) {
                *value = *v;
            }
        }
        self
    }

    pub fn control(&self, name: &str) -> Option<f64> {
        self.controls
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }

    fn signature(&self) -> String {
        let args: Vec<String> = self
            .controls
            .iter()
            .map(|(name, value)| format!("{} = {}", name, number(*value)))
            .collect();
        format!("|{}|", args.join(", "))
    }
}

/// A named definition ready to write
#[derive(Debug, Clone, PartialEq)]
pub struct Def {
    pub name: String,
    pub role: Role,
    pub template: Template,
}

impl Def {
    pub fn write(&self, w: &mut ScriptWriter) {
        w.open(format!(
            "SynthDef(\\{}, {{ {}",
            self.name,
            self.template.signature()
        ));
        match self.role {
            Role::Instrument => {
                w.line("var env = EnvGen.kr(Env.adsr(attack, decay, sustain, release), gate, doneAction: 2);");
                w.lines(&self.template.lines);
                w.line("Out.ar(out, Pan2.ar(sig * env * amp, pan));");
            }
            Role::Effect => {
                w.line("var sig = In.ar(in, 2);");
                w.lines(&self.template.lines);
                w.line("Out.ar(out, XFade2.ar(sig, wet, mix * 2 - 1));");
            }
            Role::Modulator => {
                w.lines(&self.template.lines);
            }
        }
        w.close("}).add;");
    }
}

/// Numeric options; top-level values win over nested ones, `wet` doubles as
/// `mix`
fn numeric_options(options: &BTreeMap<String, Value>) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    for value in options.values() {
        if let Value::Object(inner) = value {
            for (k, v) in inner {
                if let Some(v) = v.as_f64() {
                    out.insert(k.clone(), v);
                }
            }
        }
    }
    for (k, v) in options {
        if let Some(v) = v.as_f64() {
            out.insert(k.clone(), v);
        }
    }
    if let Some(wet) = out.get("wet").copied() {
        out.entry("mix".to_string()).or_insert(wet);
    }
    out
}

/// `options.<group>.type`, e.g. the oscillator shape
fn option_type<'a>(options: &'a BTreeMap<String, Value>, group: &str) -> Option<&'a str> {
    options.get(group)?.get("type")?.as_str()
}

fn oscillator(shape: &str, rate: &str, freq: &str) -> String {
    let shape = shape.to_ascii_lowercase();
    let ugen = if shape.ends_with("square") || shape.ends_with("pulse") {
        "Pulse"
    } else if shape.ends_with("sawtooth") || shape.ends_with("saw") {
        "Saw"
    } else if shape.ends_with("triangle") {
        "LFTri"
    } else {
        "SinOsc"
    };
    match (ugen, rate) {
        ("Pulse", "kr") => format!("LFPulse.kr({})", freq),
        ("Saw", "kr") => format!("LFSaw.kr({})", freq),
        _ => format!("{}.{}({})", ugen, rate, freq),
    }
}

/// Instrument template for a known instrument kind
pub fn instrument(kind: &NodeKind, options: &BTreeMap<String, Value>) -> Option<Template> {
    let osc = |default: &str| {
        oscillator(
            option_type(options, "oscillator").unwrap_or(default),
            "ar",
            "freq",
        )
    };

    let (envelope, extra, lines): ([f64; 4], Vec<(&'static str, f64)>, Vec<String>) = match kind {
        NodeKind::Synth => (
            [0.005, 0.1, 0.3, 1.0],
            vec![],
            vec![format!("var sig = {};", osc("triangle"))],
        ),
        NodeKind::MonoSynth => (
            [0.005, 0.1, 0.9, 1.0],
            vec![("baseFrequency", 200.0), ("octaves", 3.0), ("rq", 0.2)],
            vec![
                format!("var sig = {};", osc("square")),
                "sig = RLPF.ar(sig, (baseFrequency * (2 ** (octaves * env))).clip(20, 20000), rq);"
                    .to_string(),
            ],
        ),
        NodeKind::FmSynth => (
            [0.01, 0.01, 1.0, 0.5],
            vec![("harmonicity", 3.0), ("modulationIndex", 10.0)],
            vec![
                "var sig = SinOsc.ar(freq + SinOsc.ar(freq * harmonicity, 0, freq * modulationIndex));"
                    .to_string(),
            ],
        ),
        NodeKind::AmSynth => (
            [0.01, 0.01, 1.0, 0.5],
            vec![("harmonicity", 3.0)],
            vec!["var sig = SinOsc.ar(freq) * SinOsc.ar(freq * harmonicity).range(0, 1);".to_string()],
        ),
        NodeKind::DuoSynth => (
            [0.01, 0.0, 1.0, 0.5],
            vec![
                ("harmonicity", 1.5),
                ("vibratoAmount", 0.5),
                ("vibratoRate", 5.0),
            ],
            vec![
                "var sig = Mix([Saw.ar(freq), Saw.ar(freq * harmonicity)]) * 0.5;".to_string(),
                "sig = sig * SinOsc.kr(vibratoRate, 0, vibratoAmount * 0.1, 1);".to_string(),
            ],
        ),
        NodeKind::PluckSynth => (
            [0.001, 0.1, 1.0, 1.0],
            vec![
                ("attackNoise", 1.0),
                ("dampening", 4000.0),
                ("resonance", 0.7),
            ],
            vec![
                "var sig = Pluck.ar(WhiteNoise.ar(attackNoise), Impulse.kr(0), 0.05, freq.reciprocal, resonance * 10, 0.5);"
                    .to_string(),
                "sig = LPF.ar(sig, dampening);".to_string(),
            ],
        ),
        NodeKind::MembraneSynth => (
            [0.001, 0.4, 0.01, 1.4],
            vec![("pitchDecay", 0.05), ("octaves", 10.0)],
            vec![
                "var sig = SinOsc.ar(XLine.kr((freq * (2 ** octaves)).min(18000), freq, pitchDecay));"
                    .to_string(),
            ],
        ),
        NodeKind::MetalSynth => (
            [0.001, 1.4, 0.0, 0.2],
            vec![("harmonicity", 5.1), ("resonance", 4000.0)],
            vec![
                "var sig = Mix(SinOsc.ar(freq * [1, 1.483, 1.932, 2.546, 2.63, 3.897] * (harmonicity / 5.1))) / 6;"
                    .to_string(),
                "sig = HPF.ar(sig, resonance);".to_string(),
            ],
        ),
        NodeKind::NoiseSynth => {
            let noise = match option_type(options, "noise") {
                Some("pink") => "PinkNoise",
                Some("brown") => "BrownNoise",
                _ => "WhiteNoise",
            };
            (
                [0.005, 0.1, 0.0, 1.0],
                vec![],
                vec![format!("var sig = {}.ar;", noise)],
            )
        }
        NodeKind::Sampler => (
            [0.0, 0.0, 1.0, 1.0],
            vec![("bufnum", 0.0), ("rootFreq", 261.626)],
            vec![
                "var sig = PlayBuf.ar(1, bufnum, BufRateScale.kr(bufnum) * freq / rootFreq);"
                    .to_string(),
            ],
        ),
        _ => return None,
    };

    Some(voice(envelope, extra, lines).with_options(options))
}

/// Single sine oscillator for kinds without a template
pub fn generic_instrument(options: &BTreeMap<String, Value>) -> Template {
    voice(
        [0.01, 0.1, 0.8, 0.5],
        vec![],
        vec!["var sig = SinOsc.ar(freq);".to_string()],
    )
    .with_options(options)
}

fn voice(envelope: [f64; 4], extra: Vec<(&'static str, f64)>, lines: Vec<String>) -> Template {
    let mut controls = VOICE.to_vec();
    controls.extend([
        ("attack", envelope[0]),
        ("decay", envelope[1]),
        ("sustain", envelope[2]),
        ("release", envelope[3]),
    ]);
    controls.extend(extra);
    Template { controls, lines }
}

/// Effect template; its lines compute `wet` from the input `sig`
pub fn effect(kind: &NodeKind, options: &BTreeMap<String, Value>) -> Option<Template> {
    let (mix, extra, line): (f64, Vec<(&'static str, f64)>, String) = match kind {
        NodeKind::Reverb => (
            0.33,
            vec![("room", 0.8), ("damp", 0.5)],
            "var wet = FreeVerb2.ar(sig[0], sig[1], 1, room, damp);".to_string(),
        ),
        NodeKind::Delay => (
            0.5,
            vec![("delayTime", 0.25), ("feedback", 0.5)],
            "var wet = CombC.ar(sig, 2, delayTime, delayTime * (0.001.log / feedback.clip(0.01, 0.99).log));"
                .to_string(),
        ),
        NodeKind::PingPongDelay => (
            0.5,
            vec![("delayTime", 0.25), ("feedback", 0.5)],
            "var wet = CombC.ar(sig.reverse, 2, [delayTime, delayTime * 2], delayTime * (0.001.log / feedback.clip(0.01, 0.99).log));"
                .to_string(),
        ),
        NodeKind::Distortion => (
            1.0,
            vec![("distortion", 0.4)],
            "var wet = (sig * (1 + (distortion * 20))).tanh;".to_string(),
        ),
        NodeKind::Chorus => (
            0.5,
            vec![("frequency", 1.5), ("delayTime", 3.5), ("depth", 0.7)],
            "var wet = DelayC.ar(sig, 0.05, SinOsc.kr(frequency, [0, 0.5pi], depth * delayTime * 0.0005, delayTime * 0.001));"
                .to_string(),
        ),
        NodeKind::Phaser => (
            0.5,
            vec![("frequency", 0.5), ("octaves", 3.0), ("baseFrequency", 350.0)],
            "var wet = AllpassC.ar(sig, 0.01, SinOsc.kr(frequency).exprange(baseFrequency, baseFrequency * (2 ** octaves)).reciprocal, 0);"
                .to_string(),
        ),
        NodeKind::Tremolo => (
            1.0,
            vec![("frequency", 10.0), ("depth", 0.5)],
            "var wet = sig * SinOsc.kr(frequency).range(1 - depth, 1);".to_string(),
        ),
        NodeKind::Filter => {
            let ugen = match options.get("type").and_then(Value::as_str) {
                Some("highpass") => "RHPF",
                Some("bandpass") => "BPF",
                _ => "RLPF",
            };
            (
                1.0,
                vec![("frequency", 350.0), ("rq", 1.0)],
                format!("var wet = {}.ar(sig, frequency, rq);", ugen),
            )
        }
        NodeKind::Compressor => (
            1.0,
            vec![
                ("threshold", -24.0),
                ("ratio", 12.0),
                ("attack", 0.003),
                ("release", 0.25),
            ],
            "var wet = Compander.ar(sig, sig, threshold.dbamp, 1, ratio.reciprocal, attack, release);"
                .to_string(),
        ),
        NodeKind::BitCrusher => (
            1.0,
            vec![("bits", 4.0)],
            "var wet = sig.round(0.5 ** bits);".to_string(),
        ),
        _ => return None,
    };

    let mut controls = vec![("in", 0.0), ("out", 0.0), ("mix", mix)];
    controls.extend(extra);
    Some(
        Template {
            controls,
            lines: vec![line],
        }
        .with_options(options),
    )
}

/// Control-rate oscillator writing `min..max` to its bus
pub fn modulator(options: &BTreeMap<String, Value>) -> Template {
    let shape = options.get("type").and_then(Value::as_str).unwrap_or("sine");
    Template {
        controls: vec![("out", 0.0), ("frequency", 1.0), ("min", 0.0), ("max", 1.0)],
        lines: vec![format!(
            "Out.kr(out, {}.range(min, max));",
            oscillator(shape, "kr", "frequency")
        )],
    }
    .with_options(options)
}
