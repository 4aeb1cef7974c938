//! Generated files parsed back with midly.

use composition::{
    prepare, prepare_composition, AudioGraphNode, AutomationEvent, Composition, Level,
    Modulation, NodeKind, NoteEvent, PitchValue, Sequence, TempoPoint, TimeExpr,
};
use midi_writer::{encode, MidiParams};
use midly::{MetaMessage, MidiMessage, Smf, TrackEventKind};
use pretty_assertions::assert_eq;
use serde_json::json;

fn two_voice() -> Composition {
    Composition::new("Two Voices")
        .with_node(AudioGraphNode::new("lead", NodeKind::FmSynth))
        .with_node(AudioGraphNode::new("bass", NodeKind::MonoSynth))
        .connect("lead", "master")
        .connect("bass", "master")
        .with_sequence(
            Sequence::new("melody")
                .synth_ref("lead")
                .note(NoteEvent::new("C4", "0:0", "4n"))
                .note(NoteEvent::new("E4", "0:1", "4n").velocity(0.5)),
        )
        .with_sequence(
            Sequence::new("low")
                .synth_ref("bass")
                .note(NoteEvent::new("C2", "0:0", "2n")),
        )
}

fn encode_composition(comp: &Composition) -> (Vec<u8>, Vec<composition::Diagnostic>) {
    let resolved = prepare_composition(comp).expect("composition should validate");
    let outcome = encode(&resolved, &MidiParams::default());
    (outcome.value, outcome.diagnostics)
}

/// Absolute-tick view of one track
fn events<'a>(smf: &'a Smf<'a>, track: usize) -> Vec<(u32, TrackEventKind<'a>)> {
    let mut tick = 0u32;
    smf.tracks[track]
        .iter()
        .map(|e| {
            tick += e.delta.as_int();
            (tick, e.kind)
        })
        .collect()
}

fn note_ons(smf: &Smf<'_>, track: usize) -> Vec<(u32, u8, u8, u8)> {
    events(smf, track)
        .into_iter()
        .filter_map(|(tick, kind)| match kind {
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn { key, vel },
            } => Some((tick, channel.as_int(), key.as_int(), vel.as_int())),
            _ => None,
        })
        .collect()
}

#[test]
fn header_declares_sequences_plus_one_tracks() {
    let (bytes, _) = encode_composition(&two_voice());

    assert_eq!(&bytes[0..4], b"MThd");
    assert_eq!(&bytes[4..8], &[0, 0, 0, 6]);
    assert_eq!(u16::from_be_bytes([bytes[8], bytes[9]]), 1);
    assert_eq!(u16::from_be_bytes([bytes[10], bytes[11]]), 3);
    assert_eq!(u16::from_be_bytes([bytes[12], bytes[13]]), 480);

    let smf = Smf::parse(&bytes).expect("generated MIDI should be valid");
    assert_eq!(smf.header.format, midly::Format::Parallel);
    assert_eq!(smf.tracks.len(), 3);
}

#[test]
fn chunk_lengths_match_payloads() {
    let (bytes, _) = encode_composition(&two_voice());

    let mut pos = 14;
    let mut chunks = 0;
    while pos < bytes.len() {
        assert_eq!(&bytes[pos..pos + 4], b"MTrk");
        let len = u32::from_be_bytes([bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]])
            as usize;
        let payload = &bytes[pos + 8..pos + 8 + len];
        assert_eq!(&payload[payload.len() - 3..], &[0xFF, 0x2F, 0x00]);
        pos += 8 + len;
        chunks += 1;
    }
    assert_eq!(pos, bytes.len());
    assert_eq!(chunks, 3);
}

#[test]
fn notes_land_on_expected_ticks() {
    let (bytes, diagnostics) = encode_composition(&two_voice());
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    let smf = Smf::parse(&bytes).unwrap();

    assert_eq!(note_ons(&smf, 1), vec![(0, 0, 60, 102), (480, 0, 64, 64)]);
    assert_eq!(note_ons(&smf, 2), vec![(0, 1, 36, 102)]);

    let offs: Vec<(u32, u8)> = events(&smf, 2)
        .into_iter()
        .filter_map(|(tick, kind)| match kind {
            TrackEventKind::Midi {
                message: MidiMessage::NoteOff { key, .. },
                ..
            } => Some((tick, key.as_int())),
            _ => None,
        })
        .collect();
    assert_eq!(offs, vec![(960, 36)]);
}

#[test]
fn track_names_and_programs() {
    let (bytes, _) = encode_composition(&two_voice());
    let smf = Smf::parse(&bytes).unwrap();

    let names: Vec<Vec<u8>> = (0..3)
        .filter_map(|t| {
            events(&smf, t).into_iter().find_map(|(_, kind)| match kind {
                TrackEventKind::Meta(MetaMessage::TrackName(name)) => Some(name.to_vec()),
                _ => None,
            })
        })
        .collect();
    assert_eq!(
        names,
        vec![b"Two Voices".to_vec(), b"melody".to_vec(), b"low".to_vec()]
    );

    let program = events(&smf, 2).into_iter().find_map(|(_, kind)| match kind {
        TrackEventKind::Midi {
            message: MidiMessage::ProgramChange { program },
            ..
        } => Some(program.as_int()),
        _ => None,
    });
    assert_eq!(program, Some(38));
}

#[test]
fn chord_emits_note_ons_on_one_tick_in_order() {
    let comp = Composition::new("chord")
        .with_node(AudioGraphNode::new("pad", NodeKind::AmSynth))
        .with_sequence(Sequence::new("pad").synth_ref("pad").note(NoteEvent::chord(
            vec![
                PitchValue::Name("C4".into()),
                PitchValue::Midi(64),
                PitchValue::Name("G4".into()),
            ],
            "1:0",
            "1m",
        )));
    let (bytes, _) = encode_composition(&comp);
    let smf = Smf::parse(&bytes).unwrap();

    let ons = note_ons(&smf, 1);
    assert_eq!(ons.iter().map(|n| n.0).collect::<Vec<_>>(), vec![1920; 3]);
    assert_eq!(ons.iter().map(|n| n.2).collect::<Vec<_>>(), vec![60, 64, 67]);
}

#[test]
fn conductor_carries_tempo_map_and_meta() {
    let mut comp = two_voice();
    comp.time_signature = Some("3/4".into());
    comp.key_signature = Some("Eb".into());
    comp.tempo_map = vec![TempoPoint {
        time: "2:0".into(),
        bpm: 90.0,
    }];
    comp.annotations.push(composition::Annotation {
        text: "Bridge".into(),
        time: "2:0".into(),
        kind: None,
    });

    let (bytes, _) = encode_composition(&comp);
    let smf = Smf::parse(&bytes).unwrap();
    let conductor = events(&smf, 0);

    let tempos: Vec<(u32, u32)> = conductor
        .iter()
        .filter_map(|(tick, kind)| match kind {
            TrackEventKind::Meta(MetaMessage::Tempo(us)) => Some((*tick, us.as_int())),
            _ => None,
        })
        .collect();
    // two 3/4 bars = 6 beats
    assert_eq!(tempos, vec![(0, 500_000), (2880, 666_667)]);

    assert!(conductor.iter().any(|(tick, kind)| *tick == 0
        && matches!(kind, TrackEventKind::Meta(MetaMessage::TimeSignature(3, 2, 24, 8)))));
    assert!(conductor.iter().any(|(_, kind)| matches!(
        kind,
        TrackEventKind::Meta(MetaMessage::KeySignature(-3, false))
    )));
    assert!(conductor.iter().any(|(tick, kind)| *tick == 2880
        && matches!(kind, TrackEventKind::Meta(MetaMessage::Marker(b"Bridge")))));
}

#[test]
fn unresolvable_pitch_falls_back_with_warning() {
    let comp = Composition::new("bad pitch")
        .with_node(AudioGraphNode::new("lead", NodeKind::Synth))
        .with_sequence(
            Sequence::new("melody")
                .synth_ref("lead")
                .note(NoteEvent::new("H9", 0.0, 0.5)),
        );
    let (bytes, diagnostics) = encode_composition(&comp);
    let smf = Smf::parse(&bytes).unwrap();

    assert_eq!(note_ons(&smf, 1), vec![(0, 0, 60, 102)]);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].level, Level::Warning);
    assert_eq!(
        diagnostics[0].path.as_deref(),
        Some("sequences[0].notes[0].note")
    );
}

#[test]
fn unknown_instrument_uses_generic_program() {
    let comp = Composition::new("odd")
        .with_node(AudioGraphNode::new("x", NodeKind::Unknown("theremin".into())))
        .with_sequence(
            Sequence::new("melody")
                .synth_ref("x")
                .note(NoteEvent::new("A4", 0.0, 0.5)),
        );
    let (bytes, diagnostics) = encode_composition(&comp);
    let smf = Smf::parse(&bytes).unwrap();

    let program = events(&smf, 1).into_iter().find_map(|(_, kind)| match kind {
        TrackEventKind::Midi {
            message: MidiMessage::ProgramChange { program },
            ..
        } => Some(program.as_int()),
        _ => None,
    });
    assert_eq!(program, Some(0));
    assert!(diagnostics.iter().any(|d| d.message.contains("theremin")));
}

#[test]
fn channels_modulations_and_automation() {
    let mut comp = Composition::new("expressive")
        .with_node(AudioGraphNode::new("lead", NodeKind::Synth))
        .with_sequence(
            Sequence::new("melody")
                .synth_ref("lead")
                .channel(9)
                .note(
                    NoteEvent::new("C4", 0.0, 1.0)
                        .modulation(Modulation::cc(1, 100.0, 0.5))
                        .modulation(Modulation::pitch_bend(-1.0, 0.25))
                        .modulation(Modulation::aftertouch(80.0, 0.75)),
                )
                .note({
                    let mut n = NoteEvent::new("D4", 1.0, 1.0);
                    n.channel = Some(3);
                    n.microtuning = Some(100.0);
                    n
                }),
        );
    comp.automation.push(AutomationEvent {
        target: "lead.cutoff".into(),
        time: TimeExpr::Seconds(0.5),
        value: 0.5,
        curve: None,
    });

    let (bytes, _) = encode_composition(&comp);
    let smf = Smf::parse(&bytes).unwrap();
    let track = events(&smf, 1);

    let messages: Vec<(u32, u8, MidiMessage)> = track
        .iter()
        .filter_map(|(tick, kind)| match kind {
            TrackEventKind::Midi { channel, message } => Some((*tick, channel.as_int(), *message)),
            _ => None,
        })
        .filter(|(_, _, m)| !matches!(m, MidiMessage::ProgramChange { .. }))
        .collect();

    let controllers: Vec<(u32, u8, u8)> = messages
        .iter()
        .filter_map(|(tick, _, m)| match m {
            MidiMessage::Controller { controller, value } => {
                Some((*tick, controller.as_int(), value.as_int()))
            }
            _ => None,
        })
        .collect();
    // modulation wheel at 0.5s, cutoff automation at 0.5s
    assert_eq!(controllers, vec![(480, 1, 100), (480, 74, 64)]);

    assert!(messages.iter().any(|(tick, ch, m)| *tick == 240
        && *ch == 9
        && matches!(m, MidiMessage::PitchBend { bend } if bend.0.as_int() == 0)));
    assert!(messages.iter().any(|(tick, _, m)| *tick == 720
        && matches!(m, MidiMessage::ChannelAftertouch { vel } if vel.as_int() == 80)));

    // second note: own channel, bent up a semitone and reset at its end
    let bends: Vec<(u32, u8, u16)> = messages
        .iter()
        .filter_map(|(tick, ch, m)| match m {
            MidiMessage::PitchBend { bend } if *ch == 3 => Some((*tick, *ch, bend.0.as_int())),
            _ => None,
        })
        .collect();
    assert_eq!(bends, vec![(960, 3, 12288), (1920, 3, 8192)]);
}

#[test]
fn overlapping_detuned_notes_share_one_bend_reset() {
    let detuned = |pitch: &str, start: f64, length: f64| {
        let mut n = NoteEvent::new(pitch, start, length);
        n.microtuning = Some(50.0);
        n
    };
    let comp = Composition::new("detuned")
        .with_node(AudioGraphNode::new("lead", NodeKind::Synth))
        .with_sequence(
            Sequence::new("melody")
                .synth_ref("lead")
                .note(detuned("C4", 0.0, 1.0))
                .note(detuned("E4", 0.5, 1.5)),
        );

    let (bytes, _) = encode_composition(&comp);
    let smf = Smf::parse(&bytes).unwrap();
    let bends: Vec<(u32, u16)> = events(&smf, 1)
        .into_iter()
        .filter_map(|(tick, kind)| match kind {
            TrackEventKind::Midi {
                message: MidiMessage::PitchBend { bend },
                ..
            } => Some((tick, bend.0.as_int())),
            _ => None,
        })
        .collect();
    // the first note ends while the second still sounds, so only the second recentres
    assert_eq!(bends, vec![(0, 10240), (480, 10240), (1920, 8192)]);
}

#[test]
fn normalized_input_encodes() {
    let resolved = prepare(&json!({
        "tracks": {
            "a": [{"pitch": 60, "start": 0, "length": 1}],
            "b": [{"pitch": 67, "start": 2, "length": 2}]
        }
    }))
    .unwrap();
    let outcome = encode(&resolved, &MidiParams::default());
    let smf = Smf::parse(&outcome.value).unwrap();
    assert_eq!(smf.tracks.len(), 3);
    assert_eq!(note_ons(&smf, 2), vec![(960, 1, 67, 102)]);
}
