//! Composition to SMF format 1.
//!
//! Track 0 carries the tempo map, meter, key and annotations. Every sequence
//! gets its own track with name, program change, notes, modulations and the
//! automation aimed at its instrument.

use composition::{
    pitch, AnnotationKind, Diagnostic, Diagnostics, ModulationKind, Outcome, Repeat,
    ResolvedAutomation, ResolvedComposition, ResolvedNote, ResolvedSequence,
};
use tracing::{debug, instrument};

use crate::program::gm_program;
use crate::track::{bend_value, meta, TrackBuilder, BEND_CENTER};
use crate::writer::ByteWriter;
use crate::MidiParams;

/// GM percussion channel, never allocated automatically
const DRUM_CHANNEL: u8 = 9;

/// Pitch bend range assumed for microtuning, in cents
const BEND_RANGE_CENTS: f64 = 200.0;

/// Encode a resolved composition as SMF format 1 bytes
#[instrument(skip_all, fields(sequences = composition.sequences.len()))]
pub fn encode(composition: &ResolvedComposition, params: &MidiParams) -> Outcome<Vec<u8>> {
    let mut diagnostics = Diagnostics::new();
    let clock = Clock {
        composition,
        ppq: f64::from(params.ticks_per_beat),
    };

    let mut tracks = Vec::with_capacity(composition.sequences.len() + 1);
    tracks.push(conductor_track(composition, &clock));

    let mut channels = ChannelAllocator::default();
    for (i, seq) in composition.sequences.iter().enumerate() {
        let channel = match seq.midi_channel {
            Some(ch) => ch,
            None => channels.next(),
        };
        tracks.push(sequence_track(
            composition,
            i,
            seq,
            channel,
            &clock,
            params,
            &mut diagnostics,
        ));
    }

    let mut w = ByteWriter::new();
    w.bytes(b"MThd")
        .u32_be(6)
        .u16_be(1)
        .u16_be(tracks.len() as u16)
        .u16_be(params.ticks_per_beat);
    for track in &tracks {
        w.chunk(b"MTrk", track);
    }

    debug!(tracks = tracks.len(), bytes = w.len(), "encoded MIDI file");
    Outcome::new(w.into_inner(), diagnostics.into_vec())
}

/// Seconds to ticks through the tempo map
struct Clock<'a> {
    composition: &'a ResolvedComposition,
    ppq: f64,
}

impl Clock<'_> {
    fn tick(&self, seconds: f64) -> u32 {
        let beats = self.composition.tempo_map.beat_at_seconds(seconds.max(0.0));
        (beats * self.ppq).round().max(0.0) as u32
    }

    fn tick_at_beat(&self, beat: f64) -> u32 {
        (beat * self.ppq).round().max(0.0) as u32
    }
}

/// Hands out channels 0-15 in order, skipping the drum channel
#[derive(Default)]
struct ChannelAllocator {
    next: u8,
}

impl ChannelAllocator {
    fn next(&mut self) -> u8 {
        if self.next == DRUM_CHANNEL {
            self.next += 1;
        }
        let channel = self.next.min(15);
        self.next = self.next.saturating_add(1);
        channel
    }
}

fn conductor_track(composition: &ResolvedComposition, clock: &Clock<'_>) -> Vec<u8> {
    let mut track = TrackBuilder::new();

    if let Some(name) = &composition.metadata.name {
        track.track_name(name);
    }

    let ts = composition.time_signature;
    track.time_signature(0, ts.numerator, ts.denominator_log2());
    if let Some(key) = &composition.key_signature {
        let (sf, mi) = key.midi_bytes();
        track.key_signature(0, sf, mi);
    }

    for segment in composition.tempo_map.segments() {
        track.tempo(clock.tick_at_beat(segment.beat), segment.bpm);
    }

    for change in &composition.meter_changes {
        let ts = change.time_signature;
        track.time_signature(clock.tick(change.seconds), ts.numerator, ts.denominator_log2());
    }
    for change in &composition.key_changes {
        let (sf, mi) = change.key_signature.midi_bytes();
        track.key_signature(clock.tick(change.seconds), sf, mi);
    }

    for annotation in &composition.annotations {
        let event_type = match annotation.kind {
            AnnotationKind::Marker => meta::MARKER,
            AnnotationKind::Lyric => meta::LYRIC,
            AnnotationKind::Cue => meta::CUE,
            AnnotationKind::Text => meta::TEXT,
        };
        track.text(clock.tick(annotation.time), event_type, &annotation.text);
    }

    track.finish()
}

fn sequence_track(
    composition: &ResolvedComposition,
    index: usize,
    seq: &ResolvedSequence,
    channel: u8,
    clock: &Clock<'_>,
    params: &MidiParams,
    diagnostics: &mut Diagnostics,
) -> Vec<u8> {
    let path = format!("sequences[{}]", index);
    let mut track = TrackBuilder::new();
    track.track_name(&seq.label);

    let program = gm_program(&seq.instrument.kind).unwrap_or_else(|| {
        diagnostics.push(
            Diagnostic::warning(format!(
                "no General MIDI program for '{}', using program 0",
                seq.instrument.kind
            ))
            .with_path(format!("{}.synth", path)),
        );
        0
    });
    track.program_change(0, channel, program);

    if let Repeat::Infinite { .. } = seq.repeat {
        diagnostics.info(
            format!("{}.loop", path),
            "infinite loop written as a single pass",
        );
    }

    let mut notes = seq.expanded_notes();
    notes.sort_by(|a, b| a.start.total_cmp(&b.start));
    let resets = bend_resets(&notes, channel, clock);
    for (note, reset) in notes.iter().zip(resets) {
        write_note(&mut track, note, channel, clock, params, &path, diagnostics);
        if let Some((tick, channel)) = reset {
            track.pitch_bend(tick, channel, BEND_CENTER);
        }
    }

    let automation = composition
        .automation
        .iter()
        .filter(|a| a.node.is_none() || a.node == seq.instrument.node);
    for event in automation {
        write_automation(&mut track, event, seq, channel, clock, params, diagnostics);
    }

    track.finish()
}

fn write_note(
    track: &mut TrackBuilder,
    note: &ResolvedNote,
    channel: u8,
    clock: &Clock<'_>,
    params: &MidiParams,
    path: &str,
    diagnostics: &mut Diagnostics,
) {
    let channel = note.channel.unwrap_or(channel);
    let start = clock.tick(note.start);
    let end = clock.tick(note.end()).max(start);
    let velocity = ((note.velocity * 127.0).round() as i64).clamp(1, 127) as u8;

    let pitches: Vec<u8> = note
        .pitches
        .iter()
        .map(|p| {
            pitch::to_midi(p).unwrap_or_else(|| {
                diagnostics.push(
                    Diagnostic::warning(format!(
                        "unresolvable pitch '{}', using {}",
                        p, params.default_pitch
                    ))
                    .with_path(format!("{}.notes[{}].note", path, note.index)),
                );
                params.default_pitch
            })
        })
        .collect();

    if let Some(cents) = note.microtuning.filter(|c| *c != 0.0) {
        track.pitch_bend(start, channel, bend_value(cents / BEND_RANGE_CENTS));
    }

    for pitch in &pitches {
        track.note_on(start, channel, *pitch, velocity);
    }

    for m in &note.modulations {
        let tick = clock.tick(m.time);
        match m.kind {
            ModulationKind::Cc => match m.controller {
                Some(controller) => {
                    track.control_change(tick, channel, controller, midi_value(m.value))
                }
                None => diagnostics.warning(
                    format!("{}.notes[{}].modulations", path, note.index),
                    "cc modulation without controller skipped",
                ),
            },
            ModulationKind::PitchBend => track.pitch_bend(tick, channel, bend_value(m.value)),
            ModulationKind::Aftertouch => {
                track.channel_pressure(tick, channel, midi_value(m.value))
            }
            ModulationKind::Unknown(_) => {}
        }
    }

    for pitch in &pitches {
        track.note_off(end, channel, *pitch);
    }
}

fn is_detuned(note: &ResolvedNote) -> bool {
    note.microtuning.is_some_and(|c| c != 0.0)
}

/// Where each note recentres the pitch bend after its microtuning: at its end,
/// unless another detuned note on the same channel is still sounding then.
/// `notes` must be sorted by start.
fn bend_resets(
    notes: &[ResolvedNote],
    channel: u8,
    clock: &Clock<'_>,
) -> Vec<Option<(u32, u8)>> {
    let spans: Vec<(u8, u32, u32, bool)> = notes
        .iter()
        .map(|n| {
            let start = clock.tick(n.start);
            let end = clock.tick(n.end()).max(start);
            (n.channel.unwrap_or(channel), start, end, is_detuned(n))
        })
        .collect();

    // latest end of an earlier detuned note, per channel
    let mut held_until = [0u32; 16];
    let mut resets = Vec::with_capacity(spans.len());
    for (i, &(ch, _, end, detuned)) in spans.iter().enumerate() {
        let slot = usize::from(ch & 0x0F);
        let earlier = held_until[slot] > end;
        let later = spans[i + 1..]
            .iter()
            .take_while(|(_, start, _, _)| *start < end)
            .any(|&(c, _, e, d)| d && c == ch && e > end);
        resets.push((detuned && !earlier && !later).then_some((end, ch)));
        if detuned {
            held_until[slot] = held_until[slot].max(end);
        }
    }
    resets
}

fn write_automation(
    track: &mut TrackBuilder,
    event: &ResolvedAutomation,
    seq: &ResolvedSequence,
    channel: u8,
    clock: &Clock<'_>,
    params: &MidiParams,
    diagnostics: &mut Diagnostics,
) {
    match params.controllers.lookup(&seq.instrument.kind, &event.parameter) {
        Some(controller) => {
            // normalized values are scaled, anything larger is taken as raw MIDI
            let value = if (0.0..=1.0).contains(&event.value) {
                (event.value * 127.0).round() as u8
            } else {
                midi_value(event.value)
            };
            track.control_change(clock.tick(event.time), channel, controller, value);
        }
        None => diagnostics.info(
            format!("automation.{}", event.parameter),
            format!(
                "no controller mapped for '{}' on {}, skipped",
                event.parameter, seq.instrument.kind
            ),
        ),
    }
}

fn midi_value(value: f64) -> u8 {
    if value.is_finite() {
        value.round().clamp(0.0, 127.0) as u8
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_allocation_skips_drums() {
        let mut alloc = ChannelAllocator::default();
        let channels: Vec<u8> = (0..12).map(|_| alloc.next()).collect();
        assert_eq!(channels, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12]);

        for _ in 0..10 {
            alloc.next();
        }
        assert_eq!(alloc.next(), 15);
    }

    #[test]
    fn test_midi_value_clamps() {
        assert_eq!(midi_value(64.4), 64);
        assert_eq!(midi_value(300.0), 127);
        assert_eq!(midi_value(-5.0), 0);
        assert_eq!(midi_value(f64::NAN), 0);
    }
}
