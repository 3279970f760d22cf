//! Song data model.
//!
//! A [`Song`] is plain data: global settings plus one [`Channel`] per voice.
//! The first `pitch_channel_count` channels are pitched, the rest are drums.
//! Instrument and song settings are indices into the tables in
//! [`crate::config`]; the codec clamps them on the way in and the synth
//! validates them before rendering.

pub mod codec;
pub mod history;
pub mod json;
pub mod version;

use crate::config;
use crate::error::ConfigurationError;

pub use version::FormatVersion;

// ── Notes & patterns ────────────────────────────────────────

/// A control point of a note's envelope, relative to the note start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotePin {
    /// Pitch bend from the note's pitches, in semitones (drum steps on drum channels).
    pub interval: i32,
    /// Parts since the start of the note.
    pub time: usize,
    /// 0..=3
    pub volume: u8,
}

impl NotePin {
    pub fn new(interval: i32, time: usize, volume: u8) -> Self {
        Self {
            interval,
            time,
            volume,
        }
    }
}

/// One to four simultaneous pitches sharing a pin envelope.
///
/// Pins are strictly increasing in time; the first pin sits at time 0 with
/// interval 0 and the last pin's time equals `end - start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub pitches: Vec<i32>,
    pub pins: Vec<NotePin>,
    pub start: usize,
    pub end: usize,
}

impl Note {
    /// A flat note from `start` to `end`, optionally fading to silence.
    /// An `end` before `start` collapses to an empty note at `start`.
    pub fn new(pitch: i32, start: usize, end: usize, volume: u8, fadeout: bool) -> Self {
        let end = end.max(start);
        Self {
            pitches: vec![pitch],
            pins: vec![
                NotePin::new(0, 0, volume),
                NotePin::new(0, end - start, if fadeout { 0 } else { volume }),
            ],
            start,
            end,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pattern {
    pub instrument: usize,
    /// Ordered and non-overlapping.
    pub notes: Vec<Note>,
}

impl Pattern {
    pub fn reset(&mut self) {
        self.notes.clear();
        self.instrument = 0;
    }
}

// ── Instruments ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstrumentType {
    #[default]
    Chip,
    Fm,
    Noise,
}

impl InstrumentType {
    pub const ALL: [InstrumentType; 3] = [InstrumentType::Chip, InstrumentType::Fm, InstrumentType::Noise];

    /// Index used by both the compact string and the JSON names table.
    pub fn index(self) -> usize {
        match self {
            InstrumentType::Chip => 0,
            InstrumentType::Fm => 1,
            InstrumentType::Noise => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        config::INSTRUMENT_TYPE_NAMES[self.index()]
    }

    /// The type older songs implied from the channel kind.
    pub fn for_channel(is_drum: bool) -> Self {
        if is_drum {
            InstrumentType::Noise
        } else {
            InstrumentType::Chip
        }
    }
}

/// One FM operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    pub frequency: usize,
    /// 0..=15
    pub amplitude: usize,
    pub envelope: usize,
}

impl Operator {
    pub fn new(index: usize) -> Self {
        let mut op = Self {
            frequency: 0,
            amplitude: 0,
            envelope: 0,
        };
        op.reset(index);
        op
    }

    /// Operators 1 and 2 start audible, and only the first follows the note volume.
    pub fn reset(&mut self, index: usize) {
        self.frequency = 0;
        self.amplitude = if index <= 1 {
            config::OPERATOR_AMPLITUDE_MAX
        } else {
            0
        };
        self.envelope = if index == 0 { 0 } else { 1 };
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub kind: InstrumentType,
    /// Chip wave index, or drum wave index for noise.
    pub wave: usize,
    pub filter: usize,
    pub transition: usize,
    pub effect: usize,
    pub chorus: usize,
    pub volume: usize,
    pub algorithm: usize,
    pub feedback_type: usize,
    pub feedback_amplitude: usize,
    pub feedback_envelope: usize,
    pub operators: [Operator; config::OPERATOR_COUNT],
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            kind: InstrumentType::Chip,
            wave: 1,
            filter: 1,
            transition: 1,
            effect: 0,
            chorus: 0,
            volume: 0,
            algorithm: 0,
            feedback_type: 0,
            feedback_amplitude: 0,
            feedback_envelope: 1,
            operators: std::array::from_fn(Operator::new),
        }
    }
}

impl Instrument {
    pub fn new(kind: InstrumentType) -> Self {
        let mut instrument = Self::default();
        instrument.set_type_and_reset(kind);
        instrument
    }

    /// Switch type and restore the settings that type exposes to defaults.
    pub fn set_type_and_reset(&mut self, kind: InstrumentType) {
        self.kind = kind;
        match kind {
            InstrumentType::Chip => {
                self.wave = 1;
                self.filter = 1;
                self.transition = 1;
                self.effect = 0;
                self.chorus = 0;
                self.volume = 0;
            }
            InstrumentType::Noise => {
                self.wave = 1;
                self.transition = 1;
                self.volume = 0;
            }
            InstrumentType::Fm => {
                self.transition = 1;
                self.effect = 0;
                self.algorithm = 0;
                self.feedback_type = 0;
                self.feedback_amplitude = 0;
                self.feedback_envelope = 1;
                for (i, op) in self.operators.iter_mut().enumerate() {
                    op.reset(i);
                }
            }
        }
    }

    /// Check every table index the synth will read for this instrument.
    pub fn validate(&self, channel: usize, is_drum: bool) -> Result<(), ConfigurationError> {
        let check = |table: &'static str, index: usize, len: usize| {
            if index < len {
                Ok(())
            } else {
                Err(ConfigurationError::UnknownIndex {
                    table,
                    index,
                    channel,
                })
            }
        };

        check("transition", self.transition, config::TRANSITION_NAMES.len())?;
        check("effect", self.effect, config::EFFECT_NAMES.len())?;
        check("volume", self.volume, config::VOLUME_NAMES.len())?;
        check("filter", self.filter, config::FILTER_NAMES.len())?;
        check("chorus", self.chorus, config::CHORUS_NAMES.len())?;
        if is_drum || self.kind == InstrumentType::Noise {
            check("drum", self.wave, config::DRUM_NAMES.len())?;
        } else {
            check("wave", self.wave, config::WAVE_NAMES.len())?;
        }
        if self.kind == InstrumentType::Fm {
            check("algorithm", self.algorithm, config::ALGORITHM_NAMES.len())?;
            check("feedback", self.feedback_type, config::FEEDBACK_NAMES.len())?;
            check(
                "feedback amplitude",
                self.feedback_amplitude,
                config::OPERATOR_AMPLITUDE_MAX + 1,
            )?;
            check(
                "operator envelope",
                self.feedback_envelope,
                config::OPERATOR_ENVELOPE_NAMES.len(),
            )?;
            for op in &self.operators {
                check(
                    "operator frequency",
                    op.frequency,
                    config::OPERATOR_FREQUENCIES.len(),
                )?;
                check(
                    "operator amplitude",
                    op.amplitude,
                    config::OPERATOR_AMPLITUDE_MAX + 1,
                )?;
                check(
                    "operator envelope",
                    op.envelope,
                    config::OPERATOR_ENVELOPE_NAMES.len(),
                )?;
            }
        }
        Ok(())
    }
}

// ── Channels & song ─────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Channel {
    /// Octave offset, 0..=4.
    pub octave: usize,
    pub instruments: Vec<Instrument>,
    pub patterns: Vec<Pattern>,
    /// Per bar: 0 for silence, otherwise a 1-based pattern index.
    pub bars: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    pub scale: usize,
    pub key: usize,
    pub tempo: usize,
    pub reverb: usize,
    pub beats_per_bar: usize,
    pub parts_per_beat: usize,
    pub bar_count: usize,
    pub patterns_per_channel: usize,
    pub instruments_per_channel: usize,
    pub loop_start: usize,
    pub loop_length: usize,
    pub pitch_channel_count: usize,
    pub drum_channel_count: usize,
    pub channels: Vec<Channel>,
}

impl Default for Song {
    fn default() -> Self {
        let mut song = Self::empty();
        song.pitch_channel_count = 3;
        song.drum_channel_count = 1;
        for index in 0..song.channel_count() {
            let is_drum = song.channel_is_drum(index);
            song.channels.push(Channel {
                octave: if is_drum { 0 } else { 3 - index },
                instruments: vec![Instrument::new(InstrumentType::for_channel(is_drum))],
                patterns: vec![Pattern::default(); song.patterns_per_channel],
                bars: vec![1; song.bar_count],
            });
        }
        song
    }
}

impl Song {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default global settings with no channels.
    pub(crate) fn empty() -> Self {
        Self {
            scale: 0,
            key: config::KEY_NAMES.len() - 1,
            tempo: 7,
            reverb: 0,
            beats_per_bar: 8,
            parts_per_beat: 4,
            bar_count: 16,
            patterns_per_channel: 8,
            instruments_per_channel: 1,
            loop_start: 0,
            loop_length: 4,
            pitch_channel_count: 0,
            drum_channel_count: 0,
            channels: Vec::new(),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.pitch_channel_count + self.drum_channel_count
    }

    pub fn channel_is_drum(&self, channel: usize) -> bool {
        channel >= self.pitch_channel_count
    }

    pub fn parts_per_bar(&self) -> usize {
        self.beats_per_bar * self.parts_per_beat
    }

    /// The pattern playing on `channel` during `bar`, if any.
    pub fn pattern(&self, channel: usize, bar: usize) -> Option<&Pattern> {
        let channel = self.channels.get(channel)?;
        match channel.bars.get(bar).copied() {
            None | Some(0) => None,
            Some(index) => channel.patterns.get(index - 1),
        }
    }

    pub fn pattern_instrument(&self, channel: usize, bar: usize) -> usize {
        self.pattern(channel, bar).map_or(0, |p| p.instrument)
    }

    pub fn beats_per_minute(&self) -> u32 {
        (120.0 * 2f64.powf((self.tempo as f64 - 4.0) / 9.0)).round() as u32
    }

    /// Check every instrument against the synthesis tables.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (index, channel) in self.channels.iter().enumerate() {
            let is_drum = self.channel_is_drum(index);
            for instrument in &channel.instruments {
                instrument.validate(index, is_drum)?;
            }
        }
        Ok(())
    }

    // ── Resizing ────────────────────────────────────────────

    pub(crate) fn resize_channels(&mut self) {
        let count = self.channel_count();
        self.channels.resize_with(count, Channel::default);
    }

    pub(crate) fn resize_bars(&mut self) {
        let count = self.bar_count;
        for channel in &mut self.channels {
            channel.bars.resize(count, 1);
        }
    }

    pub(crate) fn resize_patterns(&mut self) {
        let count = self.patterns_per_channel;
        for channel in &mut self.channels {
            channel.patterns.resize_with(count, Pattern::default);
        }
    }

    pub(crate) fn resize_instruments(&mut self) {
        let count = self.instruments_per_channel;
        for channel in &mut self.channels {
            channel.instruments.resize_with(count, Instrument::default);
        }
    }
}

/// Clamp `value` into `[min, max)`, favoring `max - 1` when the range is empty.
pub(crate) fn clip(min: i64, max: i64, value: i64) -> i64 {
    let max = max - 1;
    if value <= max {
        value.max(min)
    } else {
        max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_song_layout() {
        let song = Song::default();
        assert_eq!(song.channel_count(), 4);
        assert_eq!(song.key, 11);
        assert_eq!(song.tempo, 7);
        assert!(!song.channel_is_drum(2));
        assert!(song.channel_is_drum(3));
        let octaves: Vec<usize> = song.channels.iter().map(|c| c.octave).collect();
        assert_eq!(octaves, vec![3, 2, 1, 0]);
        assert_eq!(song.channels[3].instruments[0].kind, InstrumentType::Noise);
        for channel in &song.channels {
            assert_eq!(channel.bars, vec![1; 16]);
            assert_eq!(channel.patterns.len(), 8);
        }
        assert!(song.validate().is_ok());
    }

    #[test]
    fn test_note_new_shapes_pins() {
        let note = Note::new(40, 4, 10, 2, true);
        assert_eq!(note.pins, vec![NotePin::new(0, 0, 2), NotePin::new(0, 6, 0)]);

        let backwards = Note::new(40, 8, 3, 3, false);
        assert_eq!(backwards.end, 8);
        assert_eq!(backwards.pins[1].time, 0);
    }

    #[test]
    fn test_beats_per_minute() {
        let mut song = Song::default();
        song.tempo = 4;
        assert_eq!(song.beats_per_minute(), 120);
        song.tempo = 7;
        assert_eq!(song.beats_per_minute(), 151);
        song.tempo = 13;
        assert_eq!(song.beats_per_minute(), 240);
    }

    #[test]
    fn test_pattern_lookup_skips_empty_bars() {
        let mut song = Song::default();
        song.channels[0].bars[2] = 0;
        song.channels[0].bars[3] = 5;
        song.channels[0].patterns[4].instrument = 0;
        assert!(song.pattern(0, 2).is_none());
        assert!(std::ptr::eq(
            song.pattern(0, 3).unwrap(),
            &song.channels[0].patterns[4]
        ));
        assert!(song.pattern(9, 0).is_none());
    }

    #[test]
    fn test_type_reset_keeps_other_settings() {
        let mut instrument = Instrument::default();
        instrument.filter = 5;
        instrument.set_type_and_reset(InstrumentType::Fm);
        assert_eq!(instrument.filter, 5, "FM does not own the filter setting");
        assert_eq!(instrument.operators[0].amplitude, 15);
        assert_eq!(instrument.operators[2].amplitude, 0);
        assert_eq!(instrument.operators[1].envelope, 1);

        instrument.set_type_and_reset(InstrumentType::Chip);
        assert_eq!(instrument.filter, 1);
    }

    #[test]
    fn test_validate_rejects_bad_indices() {
        let mut song = Song::default();
        song.channels[3].instruments[0].wave = 7;
        let err = song.validate().unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnknownIndex {
                table: "drum",
                index: 7,
                channel: 3
            }
        );

        let mut song = Song::default();
        let fm = &mut song.channels[0].instruments[0];
        fm.set_type_and_reset(InstrumentType::Fm);
        fm.operators[2].envelope = 40;
        assert!(song.validate().is_err());
    }

    #[test]
    fn test_clip_matches_half_open_range() {
        assert_eq!(clip(0, 5, 7), 4);
        assert_eq!(clip(0, 5, -2), 0);
        assert_eq!(clip(0, 5, 3), 3);
    }
}
