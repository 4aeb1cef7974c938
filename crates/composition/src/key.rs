//! Key signatures: parsing, circle-of-fifths position and target-format spellings.

use serde::{Deserialize, Serialize};

use crate::pitch::{Accidental, NoteName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Major,
    Minor,
    Ionian,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Aeolian,
    Locrian,
}

impl Mode {
    /// Parse mode from string (case-insensitive, allows abbreviations)
    pub fn parse(s: &str) -> Option<Mode> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "maj" | "major" | "" => Some(Mode::Major),
            "min" | "minor" | "m" => Some(Mode::Minor),
            "ion" | "ionian" => Some(Mode::Ionian),
            "dor" | "dorian" => Some(Mode::Dorian),
            "phr" | "phrygian" => Some(Mode::Phrygian),
            "lyd" | "lydian" => Some(Mode::Lydian),
            "mix" | "mixolydian" => Some(Mode::Mixolydian),
            "aeo" | "aeolian" => Some(Mode::Aeolian),
            "loc" | "locrian" => Some(Mode::Locrian),
            _ => None,
        }
    }

    /// Offset in fifths from the major key on the same root
    fn fifths_offset(&self) -> i32 {
        match self {
            Mode::Major | Mode::Ionian => 0,
            Mode::Minor | Mode::Aeolian => -3,
            Mode::Dorian => -2,
            Mode::Phrygian => -4,
            Mode::Lydian => 1,
            Mode::Mixolydian => -1,
            Mode::Locrian => -5,
        }
    }

    fn abc_suffix(&self) -> &'static str {
        match self {
            Mode::Major | Mode::Ionian => "",
            Mode::Minor | Mode::Aeolian => "m",
            Mode::Dorian => "dor",
            Mode::Phrygian => "phr",
            Mode::Lydian => "lyd",
            Mode::Mixolydian => "mix",
            Mode::Locrian => "loc",
        }
    }
}

/// A key: tonic plus mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySignature {
    pub root: NoteName,
    pub accidental: Option<Accidental>,
    pub mode: Mode,
}

impl Default for KeySignature {
    fn default() -> Self {
        KeySignature {
            root: NoteName::C,
            accidental: None,
            mode: Mode::Major,
        }
    }
}

impl KeySignature {
    /// Parse `"G"`, `"Am"`, `"Bbm"`, `"F# minor"`, `"D dorian"`
    pub fn parse(s: &str) -> Option<KeySignature> {
        let s = s.trim();
        let mut chars = s.chars();
        let root = NoteName::from_char(chars.next()?)?;
        let rest = chars.as_str();

        let (accidental, rest) = match rest.chars().next() {
            Some(c @ ('#' | '♯')) => (Some(Accidental::Sharp), &rest[c.len_utf8()..]),
            Some(c @ ('b' | '♭')) => (Some(Accidental::Flat), &rest[c.len_utf8()..]),
            _ => (None, rest),
        };

        let mode = Mode::parse(rest)?;
        Some(KeySignature {
            root,
            accidental,
            mode,
        })
    }

    /// Position on the circle of fifths: sharps positive, flats negative
    pub fn fifths(&self) -> i32 {
        let letter = match self.root {
            NoteName::F => -1,
            NoteName::C => 0,
            NoteName::G => 1,
            NoteName::D => 2,
            NoteName::A => 3,
            NoteName::E => 4,
            NoteName::B => 5,
        };
        let accidental = match self.accidental {
            Some(Accidental::Sharp) => 7,
            Some(Accidental::Flat) => -7,
            Some(Accidental::DoubleSharp) => 14,
            Some(Accidental::DoubleFlat) => -14,
            Some(Accidental::Natural) | None => 0,
        };
        letter + accidental + self.mode.fifths_offset()
    }

    /// Letters altered by the signature
    pub fn accidentals(&self) -> Vec<(NoteName, Accidental)> {
        const SHARPS: [NoteName; 7] = [
            NoteName::F,
            NoteName::C,
            NoteName::G,
            NoteName::D,
            NoteName::A,
            NoteName::E,
            NoteName::B,
        ];
        const FLATS: [NoteName; 7] = [
            NoteName::B,
            NoteName::E,
            NoteName::A,
            NoteName::D,
            NoteName::G,
            NoteName::C,
            NoteName::F,
        ];

        let fifths = self.fifths().clamp(-7, 7);
        if fifths >= 0 {
            SHARPS[..fifths as usize]
                .iter()
                .map(|n| (*n, Accidental::Sharp))
                .collect()
        } else {
            FLATS[..fifths.unsigned_abs() as usize]
                .iter()
                .map(|n| (*n, Accidental::Flat))
                .collect()
        }
    }

    /// Semitone offset the signature applies to a letter
    pub fn offset_for(&self, name: NoteName) -> i32 {
        self.accidentals()
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, a)| a.to_semitone_offset())
            .unwrap_or(0)
    }

    /// ABC `K:` value, e.g. `F#m`, `Bb`, `Ddor`
    pub fn to_abc(&self) -> String {
        let accidental = match self.accidental {
            Some(Accidental::Sharp) => "#",
            Some(Accidental::Flat) => "b",
            _ => "",
        };
        format!(
            "{}{}{}",
            self.root.letter(),
            accidental,
            self.mode.abc_suffix()
        )
    }

    /// MIDI key-signature meta payload `(sf, mi)`
    pub fn midi_bytes(&self) -> (u8, u8) {
        let sf = self.fifths().clamp(-7, 7) as i8;
        let mi = matches!(self.mode, Mode::Minor | Mode::Aeolian) as u8;
        (sf as u8, mi)
    }
}
