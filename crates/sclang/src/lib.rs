//! SuperCollider script encoder for resolved compositions.
//!
//! The script is a single block meant for evaluation in the SuperCollider
//! IDE. It boots the server, adds one `SynthDef` per instrument, effect and
//! modulator, wires the audio graph through private buses, and plays every
//! sequence as a `Pbind` on the default `TempoClock`.
//!
//! # Example
//!
//! ```
//! use composition::prepare;
//! use sclang::{encode, ScriptParams};
//! use serde_json::json;
//!
//! let resolved = prepare(&json!({
//!     "title": "Pulse",
//!     "tracks": {
//!         "lead": [{"pitch": "A4", "time": 0, "duration": 1}]
//!     }
//! }))
//! .unwrap();
//!
//! let script = encode(&resolved, &ScriptParams::default());
//! assert!(script.value.contains("s.waitForBoot {"));
//! assert!(script.value.contains("[\\midinote, \\dur, \\amp], Pseq(["));
//! ```

pub mod literal;
pub mod pattern;
pub mod routing;
pub mod synthdef;
pub mod timeline;
pub mod writer;

use composition::{Diagnostics, Outcome, ResolvedComposition};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

pub use literal::{beats, identifier, number, Names};
pub use synthdef::{Def, Role, Template};
pub use writer::ScriptWriter;

use pattern::Pattern;
use routing::Graph;

/// Parameters for script generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptParams {
    /// Interpreter variable holding the server
    pub server: String,
    /// Beat grid patterns and the timeline start on; one bar when unset
    pub default_quant: Option<f64>,
}

impl Default for ScriptParams {
    fn default() -> Self {
        ScriptParams {
            server: "s".to_string(),
            default_quant: None,
        }
    }
}

/// Encode a resolved composition as a SuperCollider script
#[instrument(skip_all, fields(sequences = composition.sequences.len()))]
pub fn encode(composition: &ResolvedComposition, params: &ScriptParams) -> Outcome<String> {
    let mut diagnostics = Diagnostics::new();
    let server = params.server.as_str();
    let quant = params
        .default_quant
        .filter(|q| q.is_finite() && *q > 0.0)
        .unwrap_or_else(|| composition.time_signature.quarters_per_bar());

    let mut defs = Names::default();
    let graph = routing::plan(composition, &mut defs, server, &mut diagnostics);

    let mut sequence_names = Names::default();
    let patterns: Vec<Pattern> = composition
        .sequences
        .iter()
        .enumerate()
        .map(|(i, seq)| {
            let name = sequence_names.fresh(&seq.label);
            pattern::plan(
                composition,
                i,
                seq,
                name,
                &graph,
                &mut defs,
                server,
                &mut diagnostics,
            )
        })
        .collect();

    let timeline = timeline::lines(composition, &graph, &patterns, server, quant, &mut diagnostics);

    let mut w = ScriptWriter::new();
    write_header(&mut w, composition);
    w.line("(").open(format!("{}.waitForBoot {{", server));
    w.line(format!(
        "TempoClock.default.tempo = {} / 60;",
        number(composition.tempo_map.initial_bpm())
    ));

    let all_defs = || {
        graph
            .definitions
            .iter()
            .chain(patterns.iter().flat_map(|p| p.definitions.iter()))
    };
    for (title, role) in [
        ("Instruments", Role::Instrument),
        ("Effects", Role::Effect),
        ("Modulators", Role::Modulator),
    ] {
        let mut section = all_defs().filter(|d| d.role == role).peekable();
        if section.peek().is_none() {
            continue;
        }
        w.blank().comment(title);
        for def in section {
            def.write(&mut w);
        }
    }
    w.blank().line(format!("{}.sync;", server));

    write_routing(&mut w, &graph, &patterns);

    w.blank().comment("Patterns");
    for pattern in &patterns {
        if pattern.playable {
            w.line(format!("{} = Group.head({});", pattern.group(), server));
        }
        w.lines(&pattern.lines);
    }

    if !timeline.is_empty() {
        w.blank().comment("Timeline").lines(&timeline);
    }

    let players: Vec<&Pattern> = patterns.iter().filter(|p| p.playable).collect();
    if !players.is_empty() {
        w.blank().comment("Play");
        for pattern in players {
            w.line(format!(
                "~player_{} = {}.play(TempoClock.default, quant: {});",
                pattern.name,
                pattern.variable(),
                number(quant)
            ));
        }
    }
    w.close("};").line(")");

    debug!(
        definitions = all_defs().count(),
        patterns = patterns.len(),
        "encoded SuperCollider script"
    );
    Outcome::new(w.finish(), diagnostics.into_vec())
}

fn write_header(w: &mut ScriptWriter, composition: &ResolvedComposition) {
    let metadata = &composition.metadata;
    w.comment(format!(
        "Title: {}",
        metadata.name.as_deref().unwrap_or("Untitled")
    ));
    if let Some(author) = &metadata.author {
        w.comment(format!("Author: {}", author));
    }
    if let Some(description) = &metadata.description {
        w.comment(format!("Description: {}", description));
    }
    w.comment(format!(
        "Source: {} {}",
        composition.format_id, composition.version
    ));
    w.comment(format!(
        "Tempo: {} bpm, {}",
        number(composition.tempo_map.initial_bpm()),
        composition.time_signature
    ));
    w.blank();
}

fn write_routing(w: &mut ScriptWriter, graph: &Graph, patterns: &[Pattern]) {
    let buses: Vec<&String> = graph
        .buses
        .iter()
        .chain(patterns.iter().flat_map(|p| p.buses.iter()))
        .collect();
    // inline chains sit ahead of the graph effects they feed
    let synths: Vec<&String> = patterns
        .iter()
        .flat_map(|p| p.effect_synths.iter())
        .chain(graph.effect_synths.iter())
        .collect();
    if buses.is_empty() && synths.is_empty() && graph.modulators.is_empty() {
        return;
    }
    w.blank()
        .comment("Routing")
        .lines(buses)
        .lines(synths)
        .lines(&graph.modulators);
}
