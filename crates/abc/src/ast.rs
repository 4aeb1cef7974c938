//! Output model for ABC notation.
//!
//! The encoder builds a [`Tune`] first and renders it through `Display`, so
//! every layout rule for the text lives in this module.

use std::fmt;

use composition::{Accidental, KeySignature, NoteName, TimeSignature};
use serde::Serialize;

use crate::duration::Length;

/// A complete ABC tune
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tune {
    pub header: Header,
    pub voices: Vec<Voice>,
}

/// Tune header fields, rendered in the fixed order X T C N S M L Q, voice
/// declarations, then K
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    pub reference: u32,
    pub title: String,
    pub composer: Option<String>,
    pub notes: Option<String>,
    pub source: Option<String>,
    pub meter: TimeSignature,
    /// Quarter notes per minute
    pub tempo: u32,
    pub key: KeySignature,
    pub voice_defs: Vec<VoiceDef>,
}

/// `V:` declaration for multi-voice tunes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceDef {
    pub id: usize,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Voice {
    pub id: usize,
    pub elements: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Element {
    Note(Token),
    Rest(Length),
    Field(InlineField),
    BarLine,
    FinalBar,
    LineBreak,
}

/// Header fields changed mid-tune, written as `[M:3/4]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum InlineField {
    Meter(TimeSignature),
    Key(KeySignature),
    Tempo(u32),
}

/// A note or chord with everything attached to it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub annotations: Vec<String>,
    pub decorations: Vec<Decoration>,
    pub heads: Vec<Head>,
    pub length: Length,
    pub tie: bool,
}

/// One pitch as written: accidental mark, letter and octave
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Head {
    pub accidental: Option<Accidental>,
    pub name: NoteName,
    /// Scientific octave, C4 is middle C
    pub octave: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Dynamic {
    Pp,
    P,
    Mp,
    Mf,
    F,
    Ff,
}

impl Dynamic {
    pub fn from_velocity(velocity: f64) -> Dynamic {
        match velocity {
            v if v >= 0.9 => Dynamic::Ff,
            v if v >= 0.75 => Dynamic::F,
            v if v >= 0.6 => Dynamic::Mf,
            v if v >= 0.45 => Dynamic::Mp,
            v if v >= 0.3 => Dynamic::P,
            _ => Dynamic::Pp,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dynamic::Pp => "pp",
            Dynamic::P => "p",
            Dynamic::Mp => "mp",
            Dynamic::Mf => "mf",
            Dynamic::F => "f",
            Dynamic::Ff => "ff",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decoration {
    Dynamic(Dynamic),
    Staccato,
    Accent,
    Tenuto,
    Marcato,
    Fermata,
    Slide,
    Trill,
    Emphasis,
}

impl Decoration {
    /// Decoration for a note articulation name
    pub fn from_articulation(articulation: &str) -> Option<Decoration> {
        match articulation.trim().to_ascii_lowercase().as_str() {
            "staccato" => Some(Decoration::Staccato),
            "accent" => Some(Decoration::Accent),
            "tenuto" => Some(Decoration::Tenuto),
            "marcato" => Some(Decoration::Marcato),
            "fermata" => Some(Decoration::Fermata),
            _ => None,
        }
    }
}

impl fmt::Display for Decoration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoration::Dynamic(d) => write!(f, "!{}!", d.as_str()),
            Decoration::Staccato => f.write_str("."),
            Decoration::Accent => f.write_str("!accent!"),
            Decoration::Tenuto => f.write_str("!tenuto!"),
            Decoration::Marcato => f.write_str("!marcato!"),
            Decoration::Fermata => f.write_str("!fermata!"),
            Decoration::Slide => f.write_str("!slide!"),
            Decoration::Trill => f.write_str("!trill!"),
            Decoration::Emphasis => f.write_str("!>!"),
        }
    }
}

impl fmt::Display for Head {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = match self.accidental {
            Some(Accidental::DoubleSharp) => "^^",
            Some(Accidental::Sharp) => "^",
            Some(Accidental::Natural) => "=",
            Some(Accidental::Flat) => "_",
            Some(Accidental::DoubleFlat) => "__",
            None => "",
        };
        f.write_str(mark)?;

        let letter = self.name.letter();
        // one apostrophe per octave above 4, one comma per octave below 3
        if self.octave >= 5 {
            write!(f, "{}", letter.to_ascii_lowercase())?;
            for _ in 4..self.octave {
                f.write_str("'")?;
            }
        } else {
            write!(f, "{}", letter)?;
            for _ in self.octave..3 {
                f.write_str(",")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for text in &self.annotations {
            write!(f, "\"^{}\"", text.replace('"', "'"))?;
        }
        for decoration in &self.decorations {
            write!(f, "{}", decoration)?;
        }
        if self.heads.len() > 1 {
            f.write_str("[")?;
            for head in &self.heads {
                write!(f, "{}", head)?;
            }
            f.write_str("]")?;
        } else if let Some(head) = self.heads.first() {
            write!(f, "{}", head)?;
        }
        write!(f, "{}", self.length)?;
        if self.tie {
            f.write_str("-")?;
        }
        Ok(())
    }
}

impl fmt::Display for InlineField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InlineField::Meter(m) => write!(f, "[M:{}]", m),
            InlineField::Key(k) => write!(f, "[K:{}]", k.to_abc()),
            InlineField::Tempo(bpm) => write!(f, "[Q:1/4={}]", bpm),
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Note(token) => write!(f, "{}", token),
            Element::Rest(length) => write!(f, "z{}", length),
            Element::Field(field) => write!(f, "{}", field),
            Element::BarLine => f.write_str("|"),
            Element::FinalBar => f.write_str("|]"),
            Element::LineBreak => f.write_str("\n"),
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "X:{}", self.reference)?;
        writeln!(f, "T:{}", self.title)?;
        if let Some(composer) = &self.composer {
            writeln!(f, "C:{}", composer)?;
        }
        if let Some(notes) = &self.notes {
            writeln!(f, "N:{}", notes)?;
        }
        if let Some(source) = &self.source {
            writeln!(f, "S:{}", source)?;
        }
        writeln!(f, "M:{}", self.meter)?;
        writeln!(f, "L:1/4")?;
        writeln!(f, "Q:1/4={}", self.tempo)?;
        if !self.voice_defs.is_empty() {
            let ids: Vec<String> = self.voice_defs.iter().map(|v| v.id.to_string()).collect();
            writeln!(f, "%%score {}", ids.join(" "))?;
            for def in &self.voice_defs {
                writeln!(f, "V:{} name=\"{}\"", def.id, def.name.replace('"', "'"))?;
            }
        }
        writeln!(f, "K:{}", self.key.to_abc())
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut line_start = true;
        for element in &self.elements {
            if let Element::LineBreak = element {
                f.write_str("\n")?;
                line_start = true;
                continue;
            }
            if !line_start {
                f.write_str(" ")?;
            }
            write!(f, "{}", element)?;
            line_start = false;
        }
        Ok(())
    }
}

impl fmt::Display for Tune {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header)?;
        let multi = self.voices.len() > 1;
        for voice in &self.voices {
            if multi {
                writeln!(f, "V:{}", voice.id)?;
            }
            writeln!(f, "{}", voice)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(name: NoteName, octave: i32) -> Head {
        Head {
            accidental: None,
            name,
            octave,
        }
    }

    #[test]
    fn test_octave_marks() {
        assert_eq!(head(NoteName::C, 4).to_string(), "C");
        assert_eq!(head(NoteName::C, 5).to_string(), "c'");
        assert_eq!(head(NoteName::G, 6).to_string(), "g''");
        assert_eq!(head(NoteName::A, 7).to_string(), "a'''");
        assert_eq!(head(NoteName::B, 3).to_string(), "B");
        assert_eq!(head(NoteName::E, 2).to_string(), "E,");
        assert_eq!(head(NoteName::C, 0).to_string(), "C,,,");
    }

    #[test]
    fn test_token_layout() {
        let token = Token {
            annotations: vec!["Verse".to_string()],
            decorations: vec![Decoration::Dynamic(Dynamic::Mf), Decoration::Staccato],
            heads: vec![
                head(NoteName::C, 4),
                Head {
                    accidental: Some(Accidental::Flat),
                    ..head(NoteName::E, 4)
                },
                head(NoteName::G, 4),
            ],
            length: Length {
                num: 2,
                den: 1,
                snapped: false,
            },
            tie: true,
        };
        assert_eq!(token.to_string(), "\"^Verse\"!mf!.[C_EG]2-");
    }

    #[test]
    fn test_dynamic_thresholds() {
        assert_eq!(Dynamic::from_velocity(0.95), Dynamic::Ff);
        assert_eq!(Dynamic::from_velocity(0.8), Dynamic::F);
        assert_eq!(Dynamic::from_velocity(0.6), Dynamic::Mf);
        assert_eq!(Dynamic::from_velocity(0.5), Dynamic::Mp);
        assert_eq!(Dynamic::from_velocity(0.3), Dynamic::P);
        assert_eq!(Dynamic::from_velocity(0.1), Dynamic::Pp);
    }

    #[test]
    fn test_voice_wraps_lines() {
        let voice = Voice {
            id: 1,
            elements: vec![
                Element::Rest(Length {
                    num: 4,
                    den: 1,
                    snapped: false,
                }),
                Element::BarLine,
                Element::LineBreak,
                Element::Field(InlineField::Tempo(90)),
                Element::Rest(Length::UNIT),
                Element::FinalBar,
            ],
        };
        assert_eq!(voice.to_string(), "z4 |\n[Q:1/4=90] z |]");
    }
}
