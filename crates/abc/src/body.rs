//! Voice bodies: notes laid out on a shared bar grid.
//!
//! Positions here are in quarter notes, integrated through the tempo map, so
//! every length is a ratio to one quarter at the tempo in effect.

use std::collections::{HashMap, VecDeque};

use composition::{
    pitch, Accidental, Diagnostic, Diagnostics, KeySignature, ModulationKind, NoteName,
    PitchValue, ResolvedComposition, ResolvedNote, ResolvedSequence, SpelledPitch,
    TimeSignature, DEFAULT_PITCH,
};
use tracing::debug;

use crate::ast::{Decoration, Dynamic, Element, Head, InlineField, Token, Voice};
use crate::duration::Length;

/// Positions closer than this are the same point
const EPSILON: f64 = 1e-6;

/// One bar of the grid, with the header fields that change at its start
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Bar {
    pub start: f64,
    pub end: f64,
    pub meter: Option<TimeSignature>,
    pub key: Option<KeySignature>,
}

/// Split `[0, end)` into bars following the meter changes.
///
/// A meter change that falls mid-bar cuts that bar short. Key changes take
/// effect at the first bar line at or after their position.
pub(crate) fn bar_grid(composition: &ResolvedComposition, end: f64) -> Vec<Bar> {
    let map = &composition.tempo_map;
    let meters: Vec<(f64, TimeSignature)> = composition
        .meter_changes
        .iter()
        .map(|c| (map.beat_at_seconds(c.seconds), c.time_signature))
        .collect();
    let keys: Vec<(f64, KeySignature)> = composition
        .key_changes
        .iter()
        .map(|c| (map.beat_at_seconds(c.seconds), c.key_signature))
        .collect();

    let mut meter = composition.time_signature;
    let mut key = composition.key_signature.unwrap_or_default();
    let (mut m, mut k) = (0, 0);
    let mut bars = Vec::new();
    let mut pos = 0.0;

    loop {
        let mut meter_change = None;
        while m < meters.len() && meters[m].0 <= pos + EPSILON {
            if meters[m].1 != meter {
                meter = meters[m].1;
                meter_change = Some(meter);
            }
            m += 1;
        }
        let mut key_change = None;
        while k < keys.len() && keys[k].0 <= pos + EPSILON {
            if keys[k].1 != key {
                key = keys[k].1;
                key_change = Some(key);
            }
            k += 1;
        }

        let mut next = pos + meter.quarters_per_bar();
        if let Some((at, _)) = meters.get(m) {
            if *at < next - EPSILON {
                next = *at;
            }
        }

        bars.push(Bar {
            start: pos,
            end: next,
            meter: meter_change,
            key: key_change,
        });
        pos = next;
        if pos >= end - EPSILON {
            break;
        }
    }
    bars
}

/// A pitch as given: names keep their spelling, numbers are spelled by key
#[derive(Debug, Clone, Copy, PartialEq)]
enum Written {
    Spelled(SpelledPitch),
    Midi(u8),
}

/// A note or chord occupying `[start, end)` of one voice
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Slot {
    start: f64,
    end: f64,
    pitches: Vec<Written>,
    velocity: f64,
    decorations: Vec<Decoration>,
}

impl Slot {
    pub fn end(&self) -> f64 {
        self.end
    }
}

/// Monophonic timeline for a sequence.
///
/// Notes starting together merge into one chord; a note still sounding when
/// the next one starts is cut at that point.
pub(crate) fn slots(
    composition: &ResolvedComposition,
    seq: &ResolvedSequence,
    path: &str,
    diagnostics: &mut Diagnostics,
) -> Vec<Slot> {
    let map = &composition.tempo_map;
    let mut notes = seq.expanded_notes();
    notes.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut slots: Vec<Slot> = Vec::with_capacity(notes.len());
    for note in &notes {
        let start = map.beat_at_seconds(note.start);
        let end = map.beat_at_seconds(note.end());
        if end - start < EPSILON || note.pitches.is_empty() {
            debug!(label = %seq.label, index = note.index, "skipping empty note");
            continue;
        }

        let note_path = format!("{}.notes[{}].note", path, note.index);
        let pitches: Vec<Written> = note
            .pitches
            .iter()
            .map(|p| written(p, &note_path, diagnostics))
            .collect();

        if let Some(last) = slots.last_mut() {
            if (start - last.start).abs() < EPSILON {
                for p in pitches {
                    if !last.pitches.contains(&p) {
                        last.pitches.push(p);
                    }
                }
                last.end = last.end.max(end);
                continue;
            }
            if start < last.end - EPSILON {
                debug!(label = %seq.label, index = note.index, "clipping overlapped note");
                last.end = start;
            }
        }

        slots.push(Slot {
            start,
            end,
            pitches,
            velocity: note.velocity,
            decorations: decorations(note, &seq.label),
        });
    }
    slots
}

fn written(pitch: &PitchValue, path: &str, diagnostics: &mut Diagnostics) -> Written {
    let Some(midi) = pitch::to_midi(pitch) else {
        diagnostics.push(
            Diagnostic::warning(format!(
                "unresolvable pitch '{}', using {}",
                pitch, DEFAULT_PITCH
            ))
            .with_path(path),
        );
        return Written::Midi(DEFAULT_PITCH);
    };
    let named = matches!(pitch, PitchValue::Name(n) if n.trim().parse::<i64>().is_err());
    match pitch::spell(pitch) {
        Some(spelled) if named => Written::Spelled(spelled),
        _ => Written::Midi(midi),
    }
}

/// Articulation first, then one ornament per modulation kind
fn decorations(note: &ResolvedNote, label: &str) -> Vec<Decoration> {
    let mut out = Vec::new();
    if let Some(articulation) = &note.articulation {
        match Decoration::from_articulation(articulation) {
            Some(d) => out.push(d),
            None => debug!(label, articulation = %articulation, "articulation has no ABC mark"),
        }
    }
    for m in &note.modulations {
        let ornament = match m.kind {
            ModulationKind::PitchBend => Some(Decoration::Slide),
            ModulationKind::Cc if m.controller == Some(1) => Some(Decoration::Trill),
            ModulationKind::Aftertouch => Some(Decoration::Emphasis),
            _ => None,
        };
        if let Some(o) = ornament {
            if !out.contains(&o) {
                out.push(o);
            }
        }
    }
    out
}

/// Spell a MIDI number the way the key writes it: letters the signature
/// already alters first, then sharps in sharp keys and flats in flat keys
pub(crate) fn spell_in_key(midi: u8, key: &KeySignature) -> SpelledPitch {
    let midi = i32::from(midi);
    let pc = midi.rem_euclid(12);

    let from_key = NoteName::all().into_iter().find_map(|name| {
        let offset = key.offset_for(name);
        (offset != 0 && (name.to_semitone() + offset).rem_euclid(12) == pc)
            .then_some((name, offset))
    });

    let (name, offset) = match from_key {
        Some(found) => found,
        None => match NoteName::from_semitone(pc) {
            (name, None) => (name, 0),
            (name, Some(_)) if key.fifths() >= 0 => (name, 1),
            _ => (NoteName::from_semitone(pc + 1).0, -1),
        },
    };

    SpelledPitch {
        name,
        accidental: if offset == 0 {
            None
        } else {
            Accidental::from_offset(offset)
        },
        octave: (midi - name.to_semitone() - offset).div_euclid(12) - 1,
    }
}

/// Head with the accidental mark the bar context calls for.
///
/// Marks carry to the end of the bar for the same letter and octave.
fn head(
    written: &Written,
    key: &KeySignature,
    bar_accidentals: &mut HashMap<(NoteName, i32), i32>,
) -> Head {
    let spelled = match written {
        Written::Spelled(s) => *s,
        Written::Midi(n) => spell_in_key(*n, key),
    };
    let wanted = spelled
        .accidental
        .map(|a| a.to_semitone_offset())
        .unwrap_or(0);
    let slot = (spelled.name, spelled.octave);
    let current = bar_accidentals
        .get(&slot)
        .copied()
        .unwrap_or_else(|| key.offset_for(spelled.name));

    let accidental = if wanted == current {
        None
    } else {
        bar_accidentals.insert(slot, wanted);
        Accidental::from_offset(wanted)
    };
    Head {
        accidental,
        name: spelled.name,
        octave: spelled.octave,
    }
}

/// Tempo changes and annotations, carried by the first voice
#[derive(Debug, Default)]
pub(crate) struct Cues {
    tempos: VecDeque<(f64, u32)>,
    annotations: VecDeque<(f64, String)>,
}

impl Cues {
    pub fn new(composition: &ResolvedComposition) -> Cues {
        let map = &composition.tempo_map;
        let tempos = map
            .changes()
            .map(|s| (s.beat, s.bpm.round() as u32))
            .collect();

        let mut annotations: Vec<(f64, String)> = composition
            .annotations
            .iter()
            .map(|a| (map.beat_at_seconds(a.time), a.text.clone()))
            .collect();
        annotations.sort_by(|a, b| a.0.total_cmp(&b.0));

        Cues {
            tempos,
            annotations: annotations.into(),
        }
    }

    fn tempos_until(&mut self, pos: f64) -> Vec<u32> {
        let mut out = Vec::new();
        while let Some((at, bpm)) = self.tempos.front() {
            if *at > pos + EPSILON {
                break;
            }
            out.push(*bpm);
            self.tempos.pop_front();
        }
        out
    }

    fn annotations_until(&mut self, pos: f64) -> Vec<String> {
        let mut out = Vec::new();
        while self.annotations.front().is_some_and(|(at, _)| *at <= pos + EPSILON) {
            if let Some((_, text)) = self.annotations.pop_front() {
                out.push(text);
            }
        }
        out
    }

    /// Annotations that found no note to attach to
    pub fn into_leftover(self) -> Vec<String> {
        self.annotations.into_iter().map(|(_, text)| text).collect()
    }
}

/// Lay a voice's slots onto the bar grid, filling gaps with rests and tying
/// notes across bar lines
pub(crate) fn layout(
    id: usize,
    slots: &[Slot],
    bars: &[Bar],
    key: KeySignature,
    bars_per_line: usize,
    cues: &mut Cues,
) -> Voice {
    let mut elements = Vec::new();
    let mut key = key;
    let mut bar_accidentals = HashMap::new();
    let mut dynamic: Option<Dynamic> = None;
    let mut next_slot = 0;

    for (b, bar) in bars.iter().enumerate() {
        if let Some(meter) = bar.meter {
            elements.push(Element::Field(InlineField::Meter(meter)));
        }
        if let Some(k) = bar.key {
            key = k;
            elements.push(Element::Field(InlineField::Key(k)));
        }
        bar_accidentals.clear();

        let mut cursor = bar.start;
        while cursor < bar.end - EPSILON {
            for bpm in cues.tempos_until(cursor) {
                elements.push(Element::Field(InlineField::Tempo(bpm)));
            }
            while next_slot < slots.len() && slots[next_slot].end <= cursor + EPSILON {
                next_slot += 1;
            }

            match slots.get(next_slot) {
                Some(slot) if slot.start <= cursor + EPSILON => {
                    let end = slot.end.min(bar.end);
                    let mut token = Token {
                        annotations: Vec::new(),
                        decorations: Vec::new(),
                        heads: slot
                            .pitches
                            .iter()
                            .map(|w| head(w, &key, &mut bar_accidentals))
                            .collect(),
                        length: Length::from_quarters(end - cursor),
                        tie: slot.end > bar.end + EPSILON,
                    };
                    // continuation segments after a tie stay bare
                    if slot.start >= bar.start - EPSILON {
                        token.annotations = cues.annotations_until(cursor);
                        let level = Dynamic::from_velocity(slot.velocity);
                        if dynamic != Some(level) {
                            token.decorations.push(Decoration::Dynamic(level));
                            dynamic = Some(level);
                        }
                        token.decorations.extend(slot.decorations.iter().copied());
                    }
                    elements.push(Element::Note(token));
                    cursor = end;
                }
                next => {
                    let end = next.map_or(bar.end, |s| s.start.min(bar.end));
                    elements.push(Element::Rest(Length::from_quarters(end - cursor)));
                    cursor = end;
                }
            }
        }

        let last = b + 1 == bars.len();
        elements.push(if last {
            Element::FinalBar
        } else {
            Element::BarLine
        });
        if !last && bars_per_line > 0 && (b + 1) % bars_per_line == 0 {
            elements.push(Element::LineBreak);
        }
    }

    Voice { id, elements }
}

#[cfg(test)]
mod tests {
    use super::*;
    use composition::{Mode, TempoMap};

    fn key(s: &str) -> KeySignature {
        KeySignature::parse(s).unwrap()
    }

    fn bare(composition_meter: TimeSignature) -> ResolvedComposition {
        ResolvedComposition {
            format_id: composition::FORMAT_ID.to_string(),
            version: composition::FORMAT_VERSION.to_string(),
            bpm: 120.0,
            time_signature: composition_meter,
            key_signature: None,
            tempo_map: TempoMap::constant(120.0),
            meter_changes: Vec::new(),
            key_changes: Vec::new(),
            metadata: Default::default(),
            audio_graph: Vec::new(),
            routes: Vec::new(),
            sequences: Vec::new(),
            automation: Vec::new(),
            annotations: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn test_spell_in_key() {
        let s = spell_in_key(70, &key("F"));
        assert_eq!((s.name, s.accidental, s.octave), (NoteName::B, Some(Accidental::Flat), 4));

        let s = spell_in_key(70, &key("G"));
        assert_eq!((s.name, s.accidental), (NoteName::A, Some(Accidental::Sharp)));

        let s = spell_in_key(63, &key("Bb"));
        assert_eq!((s.name, s.accidental), (NoteName::E, Some(Accidental::Flat)));

        // Cb major writes B3 as Cb4
        let cb = KeySignature {
            root: NoteName::C,
            accidental: Some(Accidental::Flat),
            mode: Mode::Major,
        };
        let s = spell_in_key(59, &cb);
        assert_eq!((s.name, s.accidental, s.octave), (NoteName::C, Some(Accidental::Flat), 4));
    }

    #[test]
    fn test_accidentals_carry_through_bar() {
        let g = key("G");
        let mut bar = HashMap::new();

        // F natural in G needs a mark, the second one does not
        let f = Written::Midi(65);
        let f_nat = Written::Spelled(SpelledPitch::parse("F4").unwrap());
        assert_eq!(head(&f_nat, &g, &mut bar).accidental, Some(Accidental::Natural));
        assert_eq!(head(&f_nat, &g, &mut bar).accidental, None);
        // back to F# needs the sharp again
        let f_sharp = Written::Midi(66);
        assert_eq!(head(&f_sharp, &g, &mut bar).accidental, Some(Accidental::Sharp));

        bar.clear();
        assert_eq!(head(&f_sharp, &g, &mut bar).accidental, None);
        let plain = head(&f, &g, &mut bar);
        assert_eq!((plain.name, plain.accidental), (NoteName::F, Some(Accidental::Natural)));
    }

    #[test]
    fn test_grid_follows_meter_changes() {
        let mut comp = bare(TimeSignature::new(4, 4));
        comp.meter_changes.push(composition::MeterAt {
            seconds: 2.0,
            time_signature: TimeSignature::new(3, 4),
        });

        let bars = bar_grid(&comp, 10.0);
        let spans: Vec<(f64, f64)> = bars.iter().map(|b| (b.start, b.end)).collect();
        assert_eq!(spans, vec![(0.0, 4.0), (4.0, 7.0), (7.0, 10.0)]);
        assert_eq!(bars[1].meter, Some(TimeSignature::new(3, 4)));
        assert_eq!(bars[2].meter, None);
    }

    #[test]
    fn test_grid_has_at_least_one_bar() {
        let comp = bare(TimeSignature::new(6, 8));
        let bars = bar_grid(&comp, 0.0);
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].end, 3.0);
    }
}
