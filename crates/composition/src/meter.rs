//! Time signatures.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        TimeSignature {
            numerator: 4,
            denominator: 4,
        }
    }
}

impl TimeSignature {
    pub fn new(numerator: u8, denominator: u8) -> Self {
        TimeSignature {
            numerator,
            denominator,
        }
    }

    /// Parse `"3/4"`, `"6/8"`, `"C"` (4/4) or `"C|"` (2/2).
    ///
    /// The denominator must be a power of two.
    pub fn parse(s: &str) -> Option<TimeSignature> {
        let s = s.trim();
        match s {
            "C" => return Some(TimeSignature::new(4, 4)),
            "C|" => return Some(TimeSignature::new(2, 2)),
            _ => {}
        }

        let (num, den) = s.split_once('/')?;
        let numerator: u8 = num.trim().parse().ok()?;
        let denominator: u8 = den.trim().parse().ok()?;
        if numerator == 0 || denominator == 0 || !denominator.is_power_of_two() {
            return None;
        }
        Some(TimeSignature::new(numerator, denominator))
    }

    /// Bar length measured in quarter notes (6/8 = 3.0)
    pub fn quarters_per_bar(&self) -> f64 {
        f64::from(self.numerator) * 4.0 / f64::from(self.denominator)
    }

    /// Denominator as a power of two, as stored in the MIDI time-signature event
    pub fn denominator_log2(&self) -> u8 {
        self.denominator.trailing_zeros() as u8
    }
}

impl std::fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(TimeSignature::parse("3/4"), Some(TimeSignature::new(3, 4)));
        assert_eq!(TimeSignature::parse(" 6/8 "), Some(TimeSignature::new(6, 8)));
        assert_eq!(TimeSignature::parse("C"), Some(TimeSignature::new(4, 4)));
        assert_eq!(TimeSignature::parse("C|"), Some(TimeSignature::new(2, 2)));
        assert_eq!(TimeSignature::parse("4/3"), None);
        assert_eq!(TimeSignature::parse("0/4"), None);
        assert_eq!(TimeSignature::parse("waltz"), None);
    }

    #[test]
    fn test_bar_lengths() {
        assert_eq!(TimeSignature::new(6, 8).quarters_per_bar(), 3.0);
        assert_eq!(TimeSignature::new(3, 4).quarters_per_bar(), 3.0);
        assert_eq!(TimeSignature::new(6, 8).denominator_log2(), 3);
        assert_eq!(TimeSignature::default().to_string(), "4/4");
    }
}
