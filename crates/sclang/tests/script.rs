use composition::{
    prepare_composition, AudioGraphNode, AutomationEvent, Composition, DeviceSpec, EffectRef,
    Level, LoopSpec, NodeKind, NoteEvent, ResolvedComposition, Sequence, TempoPoint,
};
use pretty_assertions::assert_eq;
use sclang::{encode, ScriptParams};

fn resolve(comp: &Composition) -> ResolvedComposition {
    prepare_composition(comp).expect("composition should validate")
}

fn with_echo(seq: Sequence) -> Composition {
    Composition::new("Test")
        .with_node(AudioGraphNode::new("lead", NodeKind::Synth))
        .with_node(AudioGraphNode::new("echo", NodeKind::Delay))
        .connect("lead", "echo")
        .connect("echo", "master")
        .with_sequence(seq)
}

fn melody() -> Sequence {
    Sequence::new("melody")
        .synth_ref("lead")
        .note(NoteEvent::new("C4", "0:0", "4n"))
        .note(NoteEvent::new("E4", "0:2", "4n").velocity(0.5))
}

fn script(comp: &Composition) -> String {
    encode(&resolve(comp), &ScriptParams::default()).value
}

#[test]
fn header_and_boot_block() {
    let script = script(&with_echo(melody()));
    assert!(
        script.starts_with(
            "// Title: Test\n\
             // Source: tessitura.composition 1.0\n\
             // Tempo: 120 bpm, 4/4\n\
             \n\
             (\n\
             s.waitForBoot {\n    \
             TempoClock.default.tempo = 120 / 60;\n"
        ),
        "{script}"
    );
    assert!(script.ends_with("\n};\n)\n"), "{script}");
}

#[test]
fn sections_come_in_order() {
    let script = script(&with_echo(melody()));
    let pos = |needle: &str| {
        script
            .find(needle)
            .unwrap_or_else(|| panic!("missing {needle:?} in\n{script}"))
    };

    assert!(pos("// Instruments") < pos("SynthDef(\\lead, {"));
    assert!(pos("SynthDef(\\lead, {") < pos("// Effects"));
    assert!(pos("// Effects") < pos("SynthDef(\\fx_echo, {"));
    assert!(pos("SynthDef(\\fx_echo, {") < pos("s.sync;"));
    assert!(pos("s.sync;") < pos("// Routing"));
    assert!(pos("// Routing") < pos("// Patterns"));
    assert!(pos("// Patterns") < pos("// Play"));
    assert!(!script.contains("// Modulators"));
}

#[test]
fn graph_effects_read_from_their_bus() {
    let script = script(&with_echo(melody()));
    assert!(script.contains("    ~bus_echo = Bus.audio(s, 2);\n"));
    assert!(script.contains(
        "    ~fx_echo = Synth.tail(s, \\fx_echo, [\\in, ~bus_echo, \\out, 0]);\n"
    ));
}

#[test]
fn pattern_rows_with_rests() {
    let script = script(&with_echo(melody()));
    let expected = "    ~group_melody = Group.head(s);\n\
                    \x20   ~pattern_melody = Pbind(\n\
                    \x20       \\instrument, \\lead,\n\
                    \x20       \\group, ~group_melody,\n\
                    \x20       \\out, ~bus_echo,\n\
                    \x20       [\\midinote, \\dur, \\amp], Pseq([\n\
                    \x20           [60, 1, 0.8],\n\
                    \x20           [\\rest, 1, 0],\n\
                    \x20           [64, 1, 0.5],\n\
                    \x20       ], 1)\n\
                    \x20   );\n";
    assert!(script.contains(expected), "{script}");
    assert!(script.contains(
        "    ~player_melody = ~pattern_melody.play(TempoClock.default, quant: 4);\n"
    ));
}

#[test]
fn triplet_lengths_are_written_as_fractions() {
    let seq = Sequence::new("melody")
        .synth_ref("lead")
        .note(NoteEvent::new("C4", "0:0", "8t"))
        .note(NoteEvent::new("D4", "8t", "8t"))
        .note(NoteEvent::new("E4", "4t", "8t"));
    let script = script(&with_echo(seq));
    let expected = "[\\midinote, \\dur, \\amp], Pseq([\n\
                    \x20           [60, 1/3, 0.8],\n\
                    \x20           [62, 1/3, 0.8],\n\
                    \x20           [64, 1/3, 0.8],\n\
                    \x20       ], 1)";
    assert!(script.contains(expected), "{script}");
}

#[test]
fn unknown_connection_warns_and_continues() {
    let comp = Composition::new("Broken")
        .with_node(AudioGraphNode::new("lead", NodeKind::Synth))
        .connect("lead", "ghost")
        .connect("lead", "master")
        .with_sequence(melody());

    let outcome = encode(&resolve(&comp), &ScriptParams::default());
    assert_eq!(outcome.diagnostics.len(), 1);
    assert_eq!(outcome.diagnostics[0].level, Level::Warning);
    assert_eq!(
        outcome.diagnostics[0].path.as_deref(),
        Some("connections[0]")
    );
    assert!(outcome.value.contains("        \\out, 0,\n"));
    assert!(outcome.value.contains("~pattern_melody.play("));
}

#[test]
fn loops_repeat_with_a_padded_pass() {
    let comp = with_echo(
        Sequence::new("beat")
            .synth_ref("lead")
            .note(NoteEvent::new("C4", "0:0", "4n"))
            .looped(LoopSpec::Flag(true), Some("1m".into())),
    );
    let script = script(&comp);
    assert!(script.contains(
        "            [60, 1, 0.8],\n            [\\rest, 3, 0],\n        ], inf)\n"
    ));

    let comp = with_echo(
        Sequence::new("beat")
            .synth_ref("lead")
            .note(NoteEvent::new("C4", "0:0", "4n"))
            .note(NoteEvent::new("D4", "1:0", "4n"))
            .looped(LoopSpec::Span("4m".into()), Some("1m".into())),
    );
    let script = self::script(&comp);
    assert!(script.contains("            [\\rest, 3, 0],\n        ], 4)\n"));
    assert!(!script.contains("[62,"));
}

#[test]
fn timeline_schedules_tempo_and_automation() {
    let mut comp = with_echo(melody());
    comp.tempo_map.push(TempoPoint {
        time: "2:0".into(),
        bpm: 90.0,
    });
    comp.automation.push(AutomationEvent {
        target: "echo.feedback".to_string(),
        time: "1:0".into(),
        value: 0.25,
        curve: None,
    });
    comp.automation.push(AutomationEvent {
        target: "lead.amp".to_string(),
        time: "1:2".into(),
        value: 0.3,
        curve: Some("linear".to_string()),
    });

    let outcome = encode(&resolve(&comp), &ScriptParams::default());
    let script = &outcome.value;
    assert!(script.contains("    ~start = TempoClock.default.nextTimeOnGrid(4);\n"));
    assert!(script.contains(
        "    TempoClock.default.schedAbs(~start + 4, { ~fx_echo.set(\\feedback, 0.25); nil });\n"
    ));
    assert!(script.contains(
        "    TempoClock.default.schedAbs(~start + 6, { ~group_melody.set(\\amp, 0.3); nil });\n"
    ));
    assert!(script.contains(
        "    TempoClock.default.schedAbs(~start + 8, { TempoClock.default.tempo = 90 / 60; nil });\n"
    ));
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.level == Level::Info && d.message.contains("linear")));
}

#[test]
fn inline_synth_and_effect_chain() {
    let seq = Sequence::new("pad")
        .inline_synth(DeviceSpec::new(NodeKind::AmSynth))
        .note(NoteEvent::new("A3", "0:0", "1m"));
    let mut seq = seq;
    seq.effects = vec![
        EffectRef::Inline(DeviceSpec::new(NodeKind::Chorus)),
        EffectRef::Inline(DeviceSpec::new(NodeKind::Unknown("shimmer".to_string()))),
        EffectRef::Inline(DeviceSpec::new(NodeKind::Reverb)),
    ];
    let comp = Composition::new("Pad").with_sequence(seq);

    let outcome = encode(&resolve(&comp), &ScriptParams::default());
    let script = &outcome.value;
    assert!(script.contains("SynthDef(\\pad_synth, {"));
    assert!(script.contains("    ~bus_pad_0 = Bus.audio(s, 2);\n"));
    assert!(script.contains("    ~bus_pad_2 = Bus.audio(s, 2);\n"));
    assert!(script.contains(
        "    ~fx_pad_0 = Synth.tail(s, \\fx_pad_0, [\\in, ~bus_pad_0, \\out, ~bus_pad_2]);\n"
    ));
    assert!(script.contains(
        "    ~fx_pad_2 = Synth.tail(s, \\fx_pad_2, [\\in, ~bus_pad_2, \\out, 0]);\n"
    ));
    assert!(script.contains("    // effect 'shimmer' is not supported and was skipped\n"));
    assert!(script.contains("        \\out, ~bus_pad_0,\n"));
    assert_eq!(
        outcome
            .diagnostics
            .iter()
            .filter(|d| d.level == Level::Warning)
            .map(|d| d.path.as_deref())
            .collect::<Vec<_>>(),
        vec![Some("sequences[0].effects[1]")]
    );
}

#[test]
fn empty_sequence_is_not_played() {
    let comp = with_echo(Sequence::new("silent").synth_ref("lead").note(NoteEvent::new(
        "C4", "0:0", 0.0,
    )));
    let script = script(&comp);
    assert!(script.contains("// sequence 'silent' has no playable notes"));
    assert!(!script.contains("~pattern_silent.play"));
    assert!(!script.contains("// Play"));
}

#[test]
fn custom_server_and_quant() {
    let params = ScriptParams {
        server: "~server".to_string(),
        default_quant: Some(1.0),
    };
    let script = encode(&resolve(&with_echo(melody())), &params).value;
    assert!(script.contains("~server.waitForBoot {"));
    assert!(script.contains("~bus_echo = Bus.audio(~server, 2);"));
    assert!(script.contains("quant: 1);"));
}
