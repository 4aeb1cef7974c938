//! Tempo changes, automation and annotations scheduled on the default clock.

use composition::{
    AnnotationKind, Curve, Diagnostic, Diagnostics, NodeCategory, ResolvedComposition,
};

use crate::literal::{beats, identifier, number};
use crate::pattern::Pattern;
use crate::routing::Graph;

/// Lines for the timeline section; empty when nothing is scheduled
pub fn lines(
    composition: &ResolvedComposition,
    graph: &Graph,
    patterns: &[Pattern],
    server: &str,
    quant: f64,
    diagnostics: &mut Diagnostics,
) -> Vec<String> {
    let map = &composition.tempo_map;
    let mut events: Vec<(f64, String)> = Vec::new();

    for segment in map.changes() {
        events.push((
            segment.beat,
            format!("TempoClock.default.tempo = {} / 60", number(segment.bpm)),
        ));
    }

    let mut linear = 0;
    for event in &composition.automation {
        let param = identifier(
            event
                .parameter
                .rsplit('.')
                .next()
                .unwrap_or(&event.parameter),
        );
        let value = number(event.value);
        let targets = automation_targets(event.node.as_deref(), graph, patterns, server);
        if targets.is_empty() {
            diagnostics.push(Diagnostic::info(format!(
                "no sequence plays '{}', automation of '{}' dropped",
                event.node.as_deref().unwrap_or_default(),
                event.parameter
            )));
            continue;
        }
        if event.curve == Curve::Linear {
            linear += 1;
        }
        let calls: Vec<String> = targets
            .iter()
            .map(|t| format!("{}.set(\\{}, {})", t, param, value))
            .collect();
        events.push((map.beat_at_seconds(event.time), calls.join("; ")));
    }
    if linear > 0 {
        diagnostics.push(Diagnostic::info(format!(
            "{} linear automation point(s) written as steps",
            linear
        )));
    }

    let mut out: Vec<String> = composition
        .annotations
        .iter()
        .map(|a| {
            format!(
                "// beat {}: {} {}",
                number(map.beat_at_seconds(a.time)),
                kind_label(a.kind),
                a.text.split_whitespace().collect::<Vec<_>>().join(" ")
            )
        })
        .collect();

    if events.is_empty() {
        return out;
    }
    events.sort_by(|a, b| a.0.total_cmp(&b.0));
    out.push(format!(
        "~start = TempoClock.default.nextTimeOnGrid({});",
        number(quant)
    ));
    for (beat, body) in events {
        out.push(format!(
            "TempoClock.default.schedAbs(~start + {}, {{ {}; nil }});",
            beats(beat),
            body
        ));
    }
    out
}

/// Receivers of a `.set` for an automation target
fn automation_targets(
    node: Option<&str>,
    graph: &Graph,
    patterns: &[Pattern],
    server: &str,
) -> Vec<String> {
    let Some(id) = node else {
        return vec![format!("{}.defaultGroup", server)];
    };
    let name = graph.name(id).unwrap_or(id);
    match graph.category(id) {
        Some(NodeCategory::Effect) if graph.effect_bus(id).is_some() => {
            vec![format!("~fx_{}", name)]
        }
        Some(NodeCategory::Modulator) => vec![format!("~lfo_{}", name)],
        Some(NodeCategory::Sink) | None => vec![format!("{}.defaultGroup", server)],
        _ => patterns
            .iter()
            .filter(|p| p.playable && p.node.as_deref() == Some(id))
            .map(Pattern::group)
            .collect(),
    }
}

fn kind_label(kind: AnnotationKind) -> &'static str {
    match kind {
        AnnotationKind::Marker => "marker",
        AnnotationKind::Lyric => "lyric",
        AnnotationKind::Cue => "cue",
        AnnotationKind::Text => "text",
    }
}
