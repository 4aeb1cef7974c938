//! Note length suffixes relative to `L:1/4`.

use serde::Serialize;

/// Tolerance when matching a length against the common values
const TOLERANCE: f64 = 1e-3;

/// Common lengths in quarters and their fractions
const COMMON: [(f64, u32, u32); 11] = [
    (4.0, 4, 1),
    (2.0, 2, 1),
    (1.0, 1, 1),
    (0.5, 1, 2),
    (0.25, 1, 4),
    (0.125, 1, 8),
    (1.5, 3, 2),
    (0.75, 3, 4),
    (3.0, 3, 1),
    (2.0 / 3.0, 2, 3),
    (1.0 / 3.0, 1, 3),
];

/// A length as a multiple of the unit note length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Length {
    pub num: u32,
    pub den: u32,
    /// Snapped to eighths; always written as `n/8`
    pub snapped: bool,
}

impl Length {
    pub const UNIT: Length = Length {
        num: 1,
        den: 1,
        snapped: false,
    };

    /// Length of `quarters` quarter notes. Uncommon values snap to eighths of
    /// a quarter, never below one eighth.
    pub fn from_quarters(quarters: f64) -> Length {
        if let Some((_, num, den)) = COMMON
            .iter()
            .find(|(q, _, _)| (quarters - q).abs() < TOLERANCE)
        {
            return Length {
                num: *num,
                den: *den,
                snapped: false,
            };
        }
        let eighths = if quarters.is_finite() {
            (quarters * 8.0).round().max(1.0) as u32
        } else {
            1
        };
        Length {
            num: eighths,
            den: 8,
            snapped: true,
        }
    }

    pub fn quarters(&self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }
}

impl std::fmt::Display for Length {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.snapped {
            return write!(f, "{}/{}", self.num, self.den);
        }
        match (self.num, self.den) {
            (1, 1) => Ok(()),
            (n, 1) => write!(f, "{}", n),
            (1, d) => write!(f, "/{}", d),
            (n, d) => write!(f, "{}/{}", n, d),
        }
    }
}
