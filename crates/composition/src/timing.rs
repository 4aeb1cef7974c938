//! Time expressions and tempo maps.
//!
//! A time expression is either absolute (seconds) or musical (beats). Musical
//! values are converted to seconds by integrating over the tempo map, so a
//! `"2:0"` lands after any tempo change that happens inside the first two bars.
//! With no tempo changes every conversion reduces to `beats * 60 / bpm`.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{TempoPoint, TimeExpr};

/// Ticks per beat used by the `bar:beat:tick` form
pub const TICKS_PER_BEAT: f64 = 480.0;

/// A parsed time expression
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeValue {
    Seconds(f64),
    Beats(f64),
}

/// Context for resolving a single expression without a tempo map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeContext {
    pub bpm: f64,
    /// Bar length in quarter notes
    pub quarters_per_bar: f64,
}

impl TimeContext {
    pub fn new(bpm: f64) -> Self {
        TimeContext {
            bpm,
            quarters_per_bar: 4.0,
        }
    }

    pub fn with_quarters_per_bar(mut self, quarters_per_bar: f64) -> Self {
        self.quarters_per_bar = quarters_per_bar;
        self
    }
}

/// Parse a time expression.
///
/// Returns `None` for text that is neither `bar:beat[:tick]`, a notation
/// token (`4n`, `2m`, `8t`, `4n.`) nor a number.
pub fn parse_time(expr: &TimeExpr, quarters_per_bar: f64) -> Option<TimeValue> {
    match expr {
        TimeExpr::Seconds(s) if s.is_finite() => Some(TimeValue::Seconds(*s)),
        TimeExpr::Seconds(_) => None,
        TimeExpr::Text(text) => parse_text(text.trim(), quarters_per_bar),
    }
}

fn parse_text(text: &str, quarters_per_bar: f64) -> Option<TimeValue> {
    if text.contains(':') {
        return parse_bar_beat(text, quarters_per_bar).map(TimeValue::Beats);
    }
    if let Ok(seconds) = text.parse::<f64>() {
        return seconds.is_finite().then_some(TimeValue::Seconds(seconds));
    }
    parse_notation(text).map(TimeValue::Beats)
}

/// Bars are `quarters_per_bar` long and beats are quarter notes, so bar
/// numbers line up with notated bars in any meter (one 6/8 bar is 3 quarters).
fn parse_bar_beat(text: &str, quarters_per_bar: f64) -> Option<f64> {
    let parts: Vec<&str> = text.split(':').map(str::trim).collect();
    if parts.len() > 3 {
        return None;
    }
    let mut values = [0.0f64; 3];
    for (slot, part) in values.iter_mut().zip(&parts) {
        if !part.is_empty() {
            *slot = part.parse::<f64>().ok().filter(|v| v.is_finite())?;
        }
    }
    let [bars, beats, ticks] = values;
    Some(bars * quarters_per_bar + beats + ticks / TICKS_PER_BEAT)
}

/// `<n><unit>[.]` in beats
fn parse_notation(text: &str) -> Option<f64> {
    let (body, dotted) = match text.strip_suffix('.') {
        Some(body) => (body, true),
        None => (text, false),
    };
    let unit = body.chars().last()?;
    let value: f64 = body[..body.len() - unit.len_utf8()].parse().ok()?;
    if !value.is_finite() || value <= 0.0 {
        return None;
    }

    let beats = match unit {
        'n' => 4.0 / value,
        'm' => 4.0 * value,
        'h' => 2.0 * value,
        'q' => value,
        'w' => 4.0 * value,
        't' => (4.0 / value) * (2.0 / 3.0),
        's' => value / 4.0,
        _ => return None,
    };
    Some(if dotted { beats * 1.5 } else { beats })
}

/// Resolve an expression to seconds at a constant tempo in 4/4.
///
/// Unparseable input resolves to 0 with a warning.
pub fn resolve_time(expr: &TimeExpr, bpm: f64) -> f64 {
    resolve_time_in(expr, &TimeContext::new(bpm))
}

/// Resolve an expression to seconds at a constant tempo and meter
pub fn resolve_time_in(expr: &TimeExpr, ctx: &TimeContext) -> f64 {
    match parse_time(expr, ctx.quarters_per_bar) {
        Some(TimeValue::Seconds(s)) => s,
        Some(TimeValue::Beats(b)) => b * 60.0 / ctx.bpm,
        None => {
            warn!(expr = %expr, "unparseable time expression, using 0");
            0.0
        }
    }
}

/// Tempo in effect at `seconds`: the last breakpoint at or before it.
///
/// Breakpoints at equal times resolve to the last one in array order; before
/// the first breakpoint `base_bpm` applies.
pub fn resolve_tempo_at(tempo_map: &[TempoPoint], base_bpm: f64, seconds: f64) -> f64 {
    TempoMap::new(tempo_map, base_bpm, 4.0).tempo_at(seconds)
}

/// One constant-tempo stretch of the timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoSegment {
    pub beat: f64,
    pub seconds: f64,
    pub bpm: f64,
}

/// A step-function tempo map with beat and second positions for every change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoMap {
    segments: Vec<TempoSegment>,
}

impl TempoMap {
    /// A map with a single tempo
    pub fn constant(bpm: f64) -> Self {
        TempoMap {
            segments: vec![TempoSegment {
                beat: 0.0,
                seconds: 0.0,
                bpm,
            }],
        }
    }

    /// Build from raw breakpoints; unparseable times and non-positive tempos are skipped
    pub fn new(points: &[TempoPoint], base_bpm: f64, quarters_per_bar: f64) -> Self {
        let parsed = points.iter().filter_map(|p| match parse_time(&p.time, quarters_per_bar) {
            Some(time) => Some((time, p.bpm)),
            None => {
                warn!(time = %p.time, "skipping tempo change with unparseable time");
                None
            }
        });
        Self::from_values(base_bpm, parsed)
    }

    /// Build from parsed breakpoints.
    ///
    /// Breakpoints are ordered by their position at the base tempo (stable, so
    /// equal positions keep array order and the last one wins).
    pub fn from_values(base_bpm: f64, points: impl IntoIterator<Item = (TimeValue, f64)>) -> Self {
        let mut points: Vec<(TimeValue, f64)> = points.into_iter().collect();
        let nominal = |t: &TimeValue| match t {
            TimeValue::Seconds(s) => *s,
            TimeValue::Beats(b) => b * 60.0 / base_bpm,
        };
        points.sort_by(|a, b| nominal(&a.0).total_cmp(&nominal(&b.0)));

        let mut map = TempoMap::constant(base_bpm);
        for (time, bpm) in points {
            if !bpm.is_finite() || bpm <= 0.0 {
                warn!(bpm, "skipping tempo change with non-positive bpm");
                continue;
            }
            let (mut beat, mut seconds) = match time {
                TimeValue::Seconds(s) => (map.beat_at_seconds(s), s),
                TimeValue::Beats(b) => (b, map.seconds_at_beat(b)),
            };

            let last = map.last();
            if seconds < last.seconds {
                beat = last.beat;
                seconds = last.seconds;
            }
            if (seconds - last.seconds).abs() < 1e-9 {
                if let Some(segment) = map.segments.last_mut() {
                    segment.bpm = bpm;
                }
            } else {
                map.segments.push(TempoSegment {
                    beat,
                    seconds,
                    bpm,
                });
            }
        }
        map
    }

    fn last(&self) -> TempoSegment {
        self.segments.last().copied().unwrap_or(TempoSegment {
            beat: 0.0,
            seconds: 0.0,
            bpm: crate::DEFAULT_BPM,
        })
    }

    fn segment_at_seconds(&self, seconds: f64) -> TempoSegment {
        self.segments
            .iter()
            .rev()
            .find(|s| s.seconds <= seconds)
            .or_else(|| self.segments.first())
            .copied()
            .unwrap_or_else(|| self.last())
    }

    fn segment_at_beat(&self, beat: f64) -> TempoSegment {
        self.segments
            .iter()
            .rev()
            .find(|s| s.beat <= beat)
            .or_else(|| self.segments.first())
            .copied()
            .unwrap_or_else(|| self.last())
    }

    pub fn segments(&self) -> &[TempoSegment] {
        &self.segments
    }

    /// Tempo changes after time zero
    pub fn changes(&self) -> impl Iterator<Item = &TempoSegment> {
        self.segments.iter().filter(|s| s.seconds > 0.0)
    }

    /// Tempo in effect at time zero
    pub fn initial_bpm(&self) -> f64 {
        self.segments.first().map(|s| s.bpm).unwrap_or(crate::DEFAULT_BPM)
    }

    pub fn tempo_at(&self, seconds: f64) -> f64 {
        self.segment_at_seconds(seconds).bpm
    }

    pub fn seconds_at_beat(&self, beat: f64) -> f64 {
        let s = self.segment_at_beat(beat);
        s.seconds + (beat - s.beat) * 60.0 / s.bpm
    }

    pub fn beat_at_seconds(&self, seconds: f64) -> f64 {
        let s = self.segment_at_seconds(seconds);
        s.beat + (seconds - s.seconds) * s.bpm / 60.0
    }

    /// Absolute position in seconds
    pub fn position(&self, time: TimeValue) -> f64 {
        match time {
            TimeValue::Seconds(s) => s,
            TimeValue::Beats(b) => self.seconds_at_beat(b),
        }
    }

    /// Length in seconds of `length` starting at `start` seconds
    pub fn span(&self, start: f64, length: TimeValue) -> f64 {
        match length {
            TimeValue::Seconds(s) => s,
            TimeValue::Beats(b) => {
                let start_beat = self.beat_at_seconds(start);
                self.seconds_at_beat(start_beat + b) - start
            }
        }
    }
}
