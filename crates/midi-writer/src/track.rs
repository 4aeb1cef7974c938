//! Track event collection and encoding.

use crate::writer::ByteWriter;

/// Meta event types
pub mod meta {
    pub const TEXT: u8 = 0x01;
    pub const TRACK_NAME: u8 = 0x03;
    pub const LYRIC: u8 = 0x05;
    pub const MARKER: u8 = 0x06;
    pub const CUE: u8 = 0x07;
    pub const END_OF_TRACK: u8 = 0x2F;
    pub const TEMPO: u8 = 0x51;
    pub const TIME_SIGNATURE: u8 = 0x58;
    pub const KEY_SIGNATURE: u8 = 0x59;
}

/// Pitch bend center (no bend)
pub const BEND_CENTER: u16 = 8192;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TrackEvent {
    tick: u32,
    data: Vec<u8>,
}

/// Collects events at absolute ticks and encodes them as an `MTrk` payload.
///
/// Events are ordered by tick; events on the same tick keep the order they
/// were added in.
#[derive(Debug, Default)]
pub struct TrackBuilder {
    events: Vec<TrackEvent>,
}

impl TrackBuilder {
    pub fn new() -> Self {
        TrackBuilder { events: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn meta_event(&mut self, tick: u32, event_type: u8, data: &[u8]) {
        let mut w = ByteWriter::with_capacity(data.len() + 3);
        w.u8(0xFF).u8(event_type).vlq(data.len() as u32).bytes(data);
        self.events.push(TrackEvent {
            tick,
            data: w.into_inner(),
        });
    }

    pub fn channel_event(&mut self, tick: u32, data: Vec<u8>) {
        self.events.push(TrackEvent { tick, data });
    }

    pub fn text(&mut self, tick: u32, event_type: u8, text: &str) {
        self.meta_event(tick, event_type, text.as_bytes());
    }

    pub fn track_name(&mut self, name: &str) {
        self.text(0, meta::TRACK_NAME, name);
    }

    /// Tempo as microseconds per quarter note, `round(60,000,000 / bpm)`
    pub fn tempo(&mut self, tick: u32, bpm: f64) {
        let us_per_beat = (60_000_000.0 / bpm).round().clamp(1.0, 16_777_215.0) as u32;
        let mut w = ByteWriter::new();
        w.u24_be(us_per_beat);
        self.meta_event(tick, meta::TEMPO, w.as_slice());
    }

    pub fn time_signature(&mut self, tick: u32, numerator: u8, denominator_log2: u8) {
        self.meta_event(
            tick,
            meta::TIME_SIGNATURE,
            &[numerator, denominator_log2, 0x18, 0x08],
        );
    }

    pub fn key_signature(&mut self, tick: u32, sf: u8, mi: u8) {
        self.meta_event(tick, meta::KEY_SIGNATURE, &[sf, mi]);
    }

    pub fn note_on(&mut self, tick: u32, channel: u8, pitch: u8, velocity: u8) {
        self.channel_event(tick, vec![0x90 | (channel & 0x0F), pitch & 0x7F, velocity & 0x7F]);
    }

    pub fn note_off(&mut self, tick: u32, channel: u8, pitch: u8) {
        self.channel_event(tick, vec![0x80 | (channel & 0x0F), pitch & 0x7F, 0]);
    }

    pub fn control_change(&mut self, tick: u32, channel: u8, controller: u8, value: u8) {
        self.channel_event(
            tick,
            vec![0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F],
        );
    }

    pub fn program_change(&mut self, tick: u32, channel: u8, program: u8) {
        self.channel_event(tick, vec![0xC0 | (channel & 0x0F), program & 0x7F]);
    }

    pub fn channel_pressure(&mut self, tick: u32, channel: u8, value: u8) {
        self.channel_event(tick, vec![0xD0 | (channel & 0x0F), value & 0x7F]);
    }

    /// 14-bit bend, sent LSB then MSB
    pub fn pitch_bend(&mut self, tick: u32, channel: u8, value: u16) {
        let value = value.min(0x3FFF);
        self.channel_event(
            tick,
            vec![
                0xE0 | (channel & 0x0F),
                (value & 0x7F) as u8,
                ((value >> 7) & 0x7F) as u8,
            ],
        );
    }

    /// Delta-encoded payload ending in an end-of-track event
    pub fn finish(mut self) -> Vec<u8> {
        self.events.sort_by_key(|e| e.tick);

        let mut w = ByteWriter::new();
        let mut last_tick = 0u32;
        for event in &self.events {
            w.vlq(event.tick.saturating_sub(last_tick));
            w.bytes(&event.data);
            last_tick = event.tick;
        }
        w.vlq(0).bytes(&[0xFF, meta::END_OF_TRACK, 0x00]);
        w.into_inner()
    }
}

/// Bend amount in -1.0..=1.0 as a 14-bit value
pub fn bend_value(amount: f64) -> u16 {
    let amount = if amount.is_finite() { amount.clamp(-1.0, 1.0) } else { 0.0 };
    (f64::from(BEND_CENTER) + amount * f64::from(BEND_CENTER))
        .round()
        .clamp(0.0, 16383.0) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_sorted_with_stable_ties() {
        let mut track = TrackBuilder::new();
        track.note_on(480, 0, 62, 100);
        track.note_on(0, 0, 60, 100);
        track.note_off(480, 0, 60);
        track.note_on(0, 0, 64, 100);

        assert_eq!(
            track.finish(),
            vec![
                0x00, 0x90, 60, 100, // first at tick 0
                0x00, 0x90, 64, 100, // same tick, insertion order
                0x83, 0x60, 0x90, 62, 100, // tick 480
                0x00, 0x80, 60, 0, // same tick, added after
                0x00, 0xFF, 0x2F, 0x00,
            ]
        );
    }

    #[test]
    fn test_tempo_meta() {
        let mut track = TrackBuilder::new();
        track.tempo(0, 120.0);
        assert_eq!(
            track.finish(),
            vec![0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, 0x00, 0xFF, 0x2F, 0x00]
        );

        let mut track = TrackBuilder::new();
        track.tempo(0, 90.0);
        // 666,667 us
        assert_eq!(&track.finish()[4..7], &[0x0A, 0x2C, 0x2B]);
    }

    #[test]
    fn test_bend_values() {
        assert_eq!(bend_value(0.0), 8192);
        assert_eq!(bend_value(1.0), 16383);
        assert_eq!(bend_value(-1.0), 0);
        assert_eq!(bend_value(0.5), 12288);

        let mut track = TrackBuilder::new();
        track.pitch_bend(0, 2, 12288);
        assert_eq!(&track.finish()[..4], &[0x00, 0xE2, 0x00, 0x60]);
    }
}
