//! Pitch spelling and MIDI note numbers.

use serde::{Deserialize, Serialize};

use crate::model::PitchValue;

/// Fallback used by encoders when a pitch cannot be resolved
pub const DEFAULT_PITCH: u8 = 60;

/// Natural note letters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteName {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl NoteName {
    /// Semitone offset from C
    pub fn to_semitone(&self) -> i32 {
        match self {
            NoteName::C => 0,
            NoteName::D => 2,
            NoteName::E => 4,
            NoteName::F => 5,
            NoteName::G => 7,
            NoteName::A => 9,
            NoteName::B => 11,
        }
    }

    pub fn all() -> [NoteName; 7] {
        [
            NoteName::C,
            NoteName::D,
            NoteName::E,
            NoteName::F,
            NoteName::G,
            NoteName::A,
            NoteName::B,
        ]
    }

    /// Spell a pitch class, preferring sharps
    pub fn from_semitone(semitone: i32) -> (NoteName, Option<Accidental>) {
        match semitone.rem_euclid(12) {
            0 => (NoteName::C, None),
            1 => (NoteName::C, Some(Accidental::Sharp)),
            2 => (NoteName::D, None),
            3 => (NoteName::D, Some(Accidental::Sharp)),
            4 => (NoteName::E, None),
            5 => (NoteName::F, None),
            6 => (NoteName::F, Some(Accidental::Sharp)),
            7 => (NoteName::G, None),
            8 => (NoteName::G, Some(Accidental::Sharp)),
            9 => (NoteName::A, None),
            10 => (NoteName::A, Some(Accidental::Sharp)),
            _ => (NoteName::B, None),
        }
    }

    pub fn from_char(c: char) -> Option<NoteName> {
        match c.to_ascii_uppercase() {
            'C' => Some(NoteName::C),
            'D' => Some(NoteName::D),
            'E' => Some(NoteName::E),
            'F' => Some(NoteName::F),
            'G' => Some(NoteName::G),
            'A' => Some(NoteName::A),
            'B' => Some(NoteName::B),
            _ => None,
        }
    }

    /// Uppercase letter
    pub fn letter(&self) -> char {
        match self {
            NoteName::C => 'C',
            NoteName::D => 'D',
            NoteName::E => 'E',
            NoteName::F => 'F',
            NoteName::G => 'G',
            NoteName::A => 'A',
            NoteName::B => 'B',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Accidental {
    DoubleSharp,
    Sharp,
    Natural,
    Flat,
    DoubleFlat,
}

impl Accidental {
    pub fn to_semitone_offset(&self) -> i32 {
        match self {
            Accidental::DoubleSharp => 2,
            Accidental::Sharp => 1,
            Accidental::Natural => 0,
            Accidental::Flat => -1,
            Accidental::DoubleFlat => -2,
        }
    }

    /// Parse an accidental as written after a note letter
    pub fn parse(s: &str) -> Option<Accidental> {
        match s {
            "#" | "♯" | "s" => Some(Accidental::Sharp),
            "b" | "♭" => Some(Accidental::Flat),
            "##" | "x" | "𝄪" => Some(Accidental::DoubleSharp),
            "bb" | "𝄫" => Some(Accidental::DoubleFlat),
            "n" | "♮" => Some(Accidental::Natural),
            _ => None,
        }
    }

    pub fn from_offset(offset: i32) -> Option<Accidental> {
        match offset {
            2 => Some(Accidental::DoubleSharp),
            1 => Some(Accidental::Sharp),
            0 => Some(Accidental::Natural),
            -1 => Some(Accidental::Flat),
            -2 => Some(Accidental::DoubleFlat),
            _ => None,
        }
    }
}

/// A pitch with its spelling: letter, accidental and scientific octave (C4 = 60)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpelledPitch {
    pub name: NoteName,
    pub accidental: Option<Accidental>,
    pub octave: i32,
}

impl SpelledPitch {
    /// Parse a note name such as `C4`, `F#3`, `Bb5`, `Cb-1` or `e♭4`.
    ///
    /// The octave defaults to 4 when omitted.
    pub fn parse(s: &str) -> Option<SpelledPitch> {
        let s = s.trim();
        let mut chars = s.chars();
        let name = NoteName::from_char(chars.next()?)?;
        let rest = chars.as_str();

        let octave_start = rest
            .find(|c: char| c.is_ascii_digit() || c == '-')
            .unwrap_or(rest.len());
        let (accidental_text, octave_text) = rest.split_at(octave_start);

        let accidental = if accidental_text.is_empty() {
            None
        } else {
            Some(Accidental::parse(accidental_text)?)
        };

        let octave = if octave_text.is_empty() {
            4
        } else {
            octave_text.parse::<i32>().ok()?
        };

        Some(SpelledPitch {
            name,
            accidental,
            octave,
        })
    }

    /// Spell a MIDI note number with sharps
    pub fn from_midi(midi: u8) -> SpelledPitch {
        let midi = i32::from(midi);
        let (name, accidental) = NoteName::from_semitone(midi);
        SpelledPitch {
            name,
            accidental,
            octave: midi.div_euclid(12) - 1,
        }
    }

    /// Unbounded MIDI number; may fall outside 0-127
    pub fn midi_number(&self) -> i32 {
        let offset = self.accidental.map(|a| a.to_semitone_offset()).unwrap_or(0);
        (self.octave + 1) * 12 + self.name.to_semitone() + offset
    }

    pub fn to_midi(&self) -> Option<u8> {
        u8::try_from(self.midi_number()).ok().filter(|n| *n <= 127)
    }
}

impl std::fmt::Display for SpelledPitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let accidental = match self.accidental {
            Some(Accidental::DoubleSharp) => "##",
            Some(Accidental::Sharp) => "#",
            Some(Accidental::Flat) => "b",
            Some(Accidental::DoubleFlat) => "bb",
            Some(Accidental::Natural) | None => "",
        };
        write!(f, "{}{}{}", self.name.letter(), accidental, self.octave)
    }
}

/// Resolve a pitch value to a MIDI note number in 0-127.
///
/// Numeric strings are accepted as MIDI numbers.
pub fn to_midi(pitch: &PitchValue) -> Option<u8> {
    match pitch {
        PitchValue::Midi(n) => u8::try_from(*n).ok().filter(|n| *n <= 127),
        PitchValue::Name(name) => match name.trim().parse::<i64>() {
            Ok(n) => u8::try_from(n).ok().filter(|n| *n <= 127),
            Err(_) => SpelledPitch::parse(name)?.to_midi(),
        },
    }
}

/// Spelling for a pitch value; names keep their written spelling
pub fn spell(pitch: &PitchValue) -> Option<SpelledPitch> {
    match pitch {
        PitchValue::Name(name) if name.trim().parse::<i64>().is_err() => {
            let spelled = SpelledPitch::parse(name)?;
            spelled.to_midi().map(|_| spelled)
        }
        other => to_midi(other).map(SpelledPitch::from_midi),
    }
}
