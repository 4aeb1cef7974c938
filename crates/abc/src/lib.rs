//! ABC notation encoder for resolved compositions.
//!
//! Every sequence becomes one voice. Lengths are written against `L:1/4`,
//! bars follow the meter (and its changes), and accidentals are marked
//! against the key signature the way a reader of the score expects.
//!
//! # Example
//!
//! ```
//! use abc::{encode, AbcParams};
//! use composition::prepare;
//! use serde_json::json;
//!
//! let resolved = prepare(&json!({
//!     "title": "Scale",
//!     "tracks": {
//!         "melody": [
//!             {"pitch": "C4", "time": 0, "duration": 1},
//!             {"pitch": "D4", "time": 1, "duration": 1}
//!         ]
//!     }
//! }))
//! .unwrap();
//!
//! let abc = encode(&resolved, &AbcParams::default());
//! assert!(abc.value.starts_with("X:1\nT:Scale\n"));
//! ```

pub mod ast;
mod body;
pub mod duration;

use composition::{Diagnostics, Outcome, Repeat, ResolvedComposition};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

pub use ast::{Decoration, Dynamic, Element, Head, Header, InlineField, Token, Tune, Voice};
pub use duration::Length;

use ast::VoiceDef;
use body::Cues;

/// Parameters for ABC generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbcParams {
    /// Tune index written as `X:`
    pub reference: u32,
    /// Bars per line before wrapping; 0 keeps each voice on one line
    pub bars_per_line: usize,
    /// `S:` source tag
    pub source: Option<String>,
}

impl Default for AbcParams {
    fn default() -> Self {
        AbcParams {
            reference: 1,
            bars_per_line: 4,
            source: Some("tessitura".to_string()),
        }
    }
}

/// Encode a resolved composition as ABC text
pub fn encode(composition: &ResolvedComposition, params: &AbcParams) -> Outcome<String> {
    build(composition, params).map(|tune| tune.to_string())
}

/// Build the tune without rendering it
#[instrument(skip_all, fields(sequences = composition.sequences.len()))]
pub fn build(composition: &ResolvedComposition, params: &AbcParams) -> Outcome<Tune> {
    let mut diagnostics = Diagnostics::new();
    let key = composition.key_signature.unwrap_or_default();

    let mut timelines = Vec::with_capacity(composition.sequences.len().max(1));
    for (i, seq) in composition.sequences.iter().enumerate() {
        let path = format!("sequences[{}]", i);
        if let Repeat::Infinite { .. } = seq.repeat {
            diagnostics.info(
                format!("{}.loop", path),
                "infinite loop written as a single pass",
            );
        }
        timelines.push(body::slots(composition, seq, &path, &mut diagnostics));
    }
    if timelines.is_empty() {
        timelines.push(Vec::new());
    }

    let end = timelines
        .iter()
        .flatten()
        .map(body::Slot::end)
        .fold(0.0, f64::max);
    let bars = body::bar_grid(composition, end);

    let mut cues = Cues::new(composition);
    let mut voices = Vec::with_capacity(timelines.len());
    for (i, slots) in timelines.iter().enumerate() {
        let mut silent = Cues::default();
        let cues = if i == 0 { &mut cues } else { &mut silent };
        voices.push(body::layout(
            i + 1,
            slots,
            &bars,
            key,
            params.bars_per_line,
            cues,
        ));
    }
    for text in cues.into_leftover() {
        diagnostics.info(
            "annotations",
            format!("annotation '{}' falls after the last note, dropped", text),
        );
    }

    let voice_defs = if composition.sequences.len() > 1 {
        composition
            .sequences
            .iter()
            .enumerate()
            .map(|(i, seq)| VoiceDef {
                id: i + 1,
                name: seq.label.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    let metadata = &composition.metadata;
    let header = Header {
        reference: params.reference,
        title: metadata
            .name
            .as_deref()
            .map(one_line)
            .unwrap_or_else(|| "Untitled".to_string()),
        composer: metadata.author.as_deref().map(one_line),
        notes: metadata.description.as_deref().map(one_line),
        source: params.source.clone(),
        meter: composition.time_signature,
        tempo: composition.tempo_map.initial_bpm().round() as u32,
        key,
        voice_defs,
    };

    debug!(voices = voices.len(), bars = bars.len(), "encoded ABC tune");
    Outcome::new(Tune { header, voices }, diagnostics.into_vec())
}

/// Header fields end at the newline
fn one_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
