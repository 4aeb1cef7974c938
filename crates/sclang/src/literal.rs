//! Numbers and identifiers as sclang source text.

use std::collections::{HashMap, HashSet};

/// Denominators a beat length is written over when it falls on them
const BEAT_FRACTIONS: [u64; 4] = [3, 6, 12, 24];

/// Number literal with at most four decimals and no trailing zeros
pub fn number(value: f64) -> String {
    decimal(value, 4)
}

/// A length or position in beats.
///
/// Binary fractions are exact as decimals; triplet-grid values are written as
/// sclang fractions (`1/3`) so summed durations do not drift. Anything else
/// keeps six decimals.
pub fn beats(value: f64) -> String {
    if value.is_finite() && value > 0.0 && !on_grid(value, 64) {
        for den in BEAT_FRACTIONS {
            if on_grid(value, den) {
                let num = (value * den as f64).round() as u64;
                let g = gcd(num, den);
                return format!("{}/{}", num / g, den / g);
            }
        }
    }
    decimal(value, 6)
}

fn on_grid(value: f64, den: u64) -> bool {
    let scaled = value * den as f64;
    (scaled - scaled.round()).abs() < 1e-6
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn decimal(value: f64, places: usize) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let text = format!("{:.*}", places, value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" || text.is_empty() {
        "0".to_string()
    } else {
        text.to_string()
    }
}

/// A valid sclang identifier: ASCII alphanumerics and `_`, starting with a
/// lowercase letter
pub fn identifier(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    match out.chars().next() {
        None => out.push('x'),
        Some(c) if c.is_ascii_uppercase() => {
            out.replace_range(..1, &c.to_ascii_lowercase().to_string());
        }
        Some(c) if !c.is_ascii_lowercase() => out.insert(0, 'n'),
        _ => {}
    }
    out
}

/// Hands out unique identifiers, remembering the one given to each key
#[derive(Debug, Default)]
pub struct Names {
    taken: HashSet<String>,
    given: HashMap<String, String>,
}

impl Names {
    /// The identifier for `key`, assigned on first use
    pub fn get(&mut self, key: &str) -> String {
        if let Some(name) = self.given.get(key) {
            return name.clone();
        }
        let name = self.fresh(key);
        self.given.insert(key.to_string(), name.clone());
        name
    }

    /// An identifier derived from `raw` that has not been handed out yet
    pub fn fresh(&mut self, raw: &str) -> String {
        let base = identifier(raw);
        let mut name = base.clone();
        let mut n = 2;
        while !self.taken.insert(name.clone()) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        name
    }
}
