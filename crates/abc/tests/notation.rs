use abc::{build, encode, AbcParams};
use composition::{
    prepare_composition, Annotation, AudioGraphNode, Composition, KeyChange, Level,
    MeterChange, Modulation, NodeKind, NoteEvent, PitchValue, ResolvedComposition, Sequence,
    TempoPoint,
};
use pretty_assertions::assert_eq;

fn piece(notes: Vec<NoteEvent>) -> Composition {
    let mut seq = Sequence::new("melody").synth_ref("lead");
    for note in notes {
        seq = seq.note(note);
    }
    Composition::new("Test")
        .with_node(AudioGraphNode::new("lead", NodeKind::Synth))
        .connect("lead", "master")
        .with_sequence(seq)
}

fn resolve(comp: &Composition) -> ResolvedComposition {
    prepare_composition(comp).expect("composition should validate")
}

fn body(comp: &Composition) -> String {
    let abc = encode(&resolve(comp), &AbcParams::default()).value;
    let (_, body) = abc
        .split_once("\nK:")
        .expect("K: field present");
    body.split_once('\n').map(|(_, b)| b.trim_end().to_string()).unwrap_or_default()
}

#[test]
fn single_voice_tune() {
    let mut comp = piece(vec![
        NoteEvent::new("E4", "0:0", "4n"),
        NoteEvent::new("E4", "0:1", "4n"),
        NoteEvent::new("F4", "0:2", "4n"),
        NoteEvent::new("G4", "0:3", "4n"),
        NoteEvent::new("G4", "1:0", "2n"),
    ]);
    comp.metadata.name = Some("Ode".to_string());
    comp.metadata.author = Some("Beethoven".to_string());

    let outcome = encode(&resolve(&comp), &AbcParams::default());
    assert!(outcome.diagnostics.is_empty(), "{:?}", outcome.diagnostics);
    assert_eq!(
        outcome.value,
        "X:1\nT:Ode\nC:Beethoven\nS:tessitura\nM:4/4\nL:1/4\nQ:1/4=120\nK:C\n\
         !f!E E F G | G2 z2 |]\n"
    );
}

#[test]
fn key_is_last_header_field() {
    let mut comp = piece(vec![NoteEvent::new("C4", 0.0, 0.5)]);
    comp.key_signature = Some("Bb".to_string());
    comp.time_signature = Some("6/8".to_string());
    comp.bpm = Some(96.0);

    let abc = encode(&resolve(&comp), &AbcParams::default()).value;
    let header: Vec<&str> = abc.lines().take_while(|l| !l.starts_with("K:")).collect();
    assert_eq!(
        header,
        vec!["X:1", "T:Test", "S:tessitura", "M:6/8", "L:1/4", "Q:1/4=96"]
    );
    assert!(abc.contains("\nK:Bb\n"));
}

#[test]
fn chord_is_one_bracketed_token() {
    let comp = piece(vec![NoteEvent::chord(
        vec![
            PitchValue::Name("C4".into()),
            PitchValue::Name("E4".into()),
            PitchValue::Name("G4".into()),
        ],
        "0:0",
        "2n",
    )]);

    let tune = build(&resolve(&comp), &AbcParams::default()).value;
    let abc::Element::Note(token) = &tune.voices[0].elements[0] else {
        panic!("expected a note first");
    };
    assert_eq!(token.heads.len(), 3);
    assert_eq!(body(&comp), "!f![CEG]2 z2 |]");
}

#[test]
fn quarter_notes_have_no_suffix() {
    let comp = piece(vec![
        NoteEvent::new("C5", 0.0, 0.5),
        NoteEvent::new("D5", 0.5, 0.25),
        NoteEvent::new("B3", 0.75, 0.75),
    ]);
    assert_eq!(body(&comp), "!f!c' d'/2 B3/2 z |]");
}

#[test]
fn multi_voice_declarations_precede_bodies() {
    let comp = Composition::new("Duet")
        .with_node(AudioGraphNode::new("lead", NodeKind::Synth))
        .with_node(AudioGraphNode::new("bass", NodeKind::MonoSynth))
        .with_sequence(
            Sequence::new("melody")
                .synth_ref("lead")
                .note(NoteEvent::new("C5", "0:0", "1m")),
        )
        .with_sequence(
            Sequence::new("bass")
                .synth_ref("bass")
                .note(NoteEvent::new("C2", "0:0", "1m")),
        );

    let abc = encode(&resolve(&comp), &AbcParams::default()).value;
    let lines: Vec<&str> = abc.lines().collect();
    let pos = |needle: &str| {
        lines
            .iter()
            .position(|l| *l == needle)
            .unwrap_or_else(|| panic!("missing line {needle:?} in\n{abc}"))
    };

    assert!(pos("%%score 1 2") < pos("V:1 name=\"melody\""));
    assert!(pos("V:1 name=\"melody\"") < pos("V:2 name=\"bass\""));
    assert!(pos("V:2 name=\"bass\"") < pos("K:C"));
    assert_eq!(pos("K:C") + 1, pos("V:1"));
    assert_eq!(lines[pos("V:1") + 1], "!f!c'4 |]");
    assert_eq!(lines[pos("V:2") + 1], "!f!C,4 |]");
}

#[test]
fn single_voice_has_no_voice_fields() {
    let abc = encode(
        &resolve(&piece(vec![NoteEvent::new("C4", 0.0, 0.5)])),
        &AbcParams::default(),
    )
    .value;
    assert!(!abc.contains("V:"));
    assert!(!abc.contains("%%score"));
}

#[test]
fn accidentals_follow_key_and_bar() {
    let mut comp = piece(vec![
        NoteEvent::new(66, "0:0", "4n"),
        NoteEvent::new(65, "0:1", "4n"),
        NoteEvent::new(65, "0:2", "4n"),
        NoteEvent::new(65, "1:0", "4n"),
    ]);
    comp.key_signature = Some("G".to_string());
    assert_eq!(body(&comp), "!f!F =F F z | =F z3 |]");
}

#[test]
fn notes_across_bar_lines_are_tied() {
    let comp = piece(vec![NoteEvent::new("C4", "0:3", "2n")]);
    assert_eq!(body(&comp), "z3 !f!C- | C z3 |]");
}

#[test]
fn dynamics_articulations_and_ornaments() {
    let comp = piece(vec![
        NoteEvent::new("C4", "0:0", "4n")
            .velocity(0.5)
            .articulation("staccato"),
        NoteEvent::new("D4", "0:1", "4n")
            .velocity(0.5)
            .modulation(Modulation::pitch_bend(0.5, 0.0)),
        NoteEvent::new("E4", "0:2", "4n")
            .velocity(0.95)
            .articulation("accent")
            .modulation(Modulation::cc(1, 90.0, 0.0)),
        NoteEvent::new("F4", "0:3", "4n")
            .velocity(0.95)
            .articulation("legato")
            .modulation(Modulation::aftertouch(60.0, 0.0)),
    ]);
    assert_eq!(body(&comp), "!mp!.C !slide!D !ff!!accent!!trill!E !>!F |]");
}

#[test]
fn annotations_attach_to_next_note() {
    let mut comp = piece(vec![
        NoteEvent::new("C4", "0:0", "4n"),
        NoteEvent::new("E4", "0:2", "4n"),
    ]);
    comp.annotations.push(Annotation {
        text: "Verse".to_string(),
        time: "0:1".into(),
        kind: None,
    });
    comp.annotations.push(Annotation {
        text: "Coda".to_string(),
        time: "4:0".into(),
        kind: None,
    });

    let outcome = encode(&resolve(&comp), &AbcParams::default());
    assert!(outcome.value.contains("!f!C z \"^Verse\"E z |]"));
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.level == Level::Info && d.message.contains("Coda")));
}

#[test]
fn long_bodies_wrap() {
    let notes = (0..6)
        .map(|bar| NoteEvent::new("C4", format!("{}:0", bar), "1m"))
        .collect();
    let comp = piece(notes);
    let params = AbcParams {
        bars_per_line: 2,
        ..AbcParams::default()
    };
    let abc = encode(&resolve(&comp), &params).value;
    let (_, body) = abc.split_once("K:C\n").unwrap();
    assert_eq!(body, "!f!C4 | C4 |\nC4 | C4 |\nC4 | C4 |]\n");
}

#[test]
fn tempo_meter_and_key_changes_are_inline() {
    let mut comp = piece(vec![
        NoteEvent::new("C4", "0:0", "1m"),
        NoteEvent::new("C4", "1:0", "2n."),
    ]);
    comp.tempo_map.push(TempoPoint {
        time: "1:0".into(),
        bpm: 60.0,
    });
    comp.time_signature_map.push(MeterChange {
        time: "1:0".into(),
        time_signature: "3/4".to_string(),
    });
    comp.key_signature_map.push(KeyChange {
        time: "1:0".into(),
        key_signature: "D".to_string(),
    });

    assert_eq!(body(&comp), "!f!C4 | [M:3/4] [K:D] [Q:1/4=60] =C3 |]");
}

#[test]
fn unknown_pitch_warns_and_uses_middle_c() {
    let comp = piece(vec![NoteEvent::new("Q7", "0:0", "1m")]);
    let outcome = encode(&resolve(&comp), &AbcParams::default());
    assert!(outcome.value.ends_with("!f!C4 |]\n"));
    assert_eq!(outcome.diagnostics.len(), 1);
    assert_eq!(outcome.diagnostics[0].level, Level::Warning);
}

#[test]
fn bar_numbers_match_notated_bars_in_compound_meter() {
    let mut comp = piece(vec![
        NoteEvent::new("C4", "0:0", "4n."),
        NoteEvent::new("D4", "0:1.5", "4n."),
        NoteEvent::new("E4", "1:0", "2n."),
    ]);
    comp.time_signature = Some("6/8".to_string());
    assert_eq!(body(&comp), "!f!C3/2 D3/2 | E3 |]");
}

#[test]
fn chord_across_bar_line_is_tied_as_two_groups() {
    let comp = piece(vec![NoteEvent::chord(
        vec![
            PitchValue::Name("C4".into()),
            PitchValue::Name("E4".into()),
            PitchValue::Name("G4".into()),
        ],
        "0:3",
        "2n",
    )]);
    assert_eq!(body(&comp), "z3 !f![CEG]- | [CEG] z3 |]");
}

#[test]
fn off_table_lengths_are_written_in_eighths() {
    let comp = piece(vec![NoteEvent::new("C4", 0.0, 0.05)]);
    assert_eq!(body(&comp), "!f!C1/8 z31/8 |]");
}
