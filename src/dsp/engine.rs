//! Audio Engine: renders a [`Song`] into a mono f32 stream.
//!
//! [`Synth`] is pull-based: the host calls [`Synth::synthesize`] with a
//! buffer whenever its audio callback fires. Playback position, oscillator
//! phases and reverb state persist between calls and only reset on seeks.
//!
//! The bound song is an `Arc<Song>` snapshot. Editors mutate their own copy
//! and hand a new snapshot over with [`Synth::set_song`].

use std::f64::consts::PI;
use std::sync::Arc;

use crate::config;
use crate::error::ConfigurationError;
use crate::song::{Instrument, InstrumentType, Song};

use super::fm;
use super::limiter::Limiter;
use super::oscillator::{EffectOscillator, chip_synth, noise_synth};
use super::reverb::Reverb;
use super::scheduler::{ARPEGGIOS_PER_PART, LoopSettings, Scheduler, Step};
use super::tone::{Tone, ToneContext, compute_tone};
use super::waves;

pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;
/// Period of the vibrato/tremolo oscillator in seconds.
const EFFECT_DURATION: f64 = 0.14;

/// Song player and synthesizer.
#[derive(Debug, Clone)]
pub struct Synth {
    samples_per_second: f64,
    /// Master gain applied after the limiter.
    pub volume: f64,
    pub loop_settings: LoopSettings,
    /// Live preview: while pressed, `piano_pitch` replaces the notes on
    /// `piano_channel`.
    pub piano_pressed: bool,
    pub piano_pitch: Vec<i32>,
    pub piano_channel: usize,

    song: Option<Arc<Song>>,
    scheduler: Scheduler,
    playhead: f64,
    paused: bool,
    tones: Vec<Tone>,
    effect_phase: f64,
    reverb: Reverb,
    limiter: Limiter,
    reverb_input: Vec<f32>,
}

impl Default for Synth {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

impl Synth {
    pub fn new(samples_per_second: f64) -> Self {
        Self {
            samples_per_second,
            volume: 1.0,
            loop_settings: LoopSettings::default(),
            piano_pressed: false,
            piano_pitch: vec![0],
            piano_channel: 0,
            song: None,
            scheduler: Scheduler::new(),
            playhead: 0.0,
            paused: true,
            tones: Vec::new(),
            effect_phase: 0.0,
            reverb: Reverb::new(),
            limiter: Limiter::new(samples_per_second),
            reverb_input: Vec::new(),
        }
    }

    /// Create a synth already bound to `song`.
    pub fn with_song(song: impl Into<Arc<Song>>, samples_per_second: f64) -> Result<Self, ConfigurationError> {
        let mut synth = Self::new(samples_per_second);
        synth.set_song(song)?;
        Ok(synth)
    }

    pub fn samples_per_second(&self) -> f64 {
        self.samples_per_second
    }

    /// Bind a song snapshot. Playback position is kept, so swapping in an
    /// edited copy does not restart the song.
    pub fn set_song(&mut self, song: impl Into<Arc<Song>>) -> Result<(), ConfigurationError> {
        let song = song.into();
        song.validate()?;
        log::debug!(
            "binding song: {} channels, {} bars, {} bpm",
            song.channel_count(),
            song.bar_count,
            song.beats_per_minute()
        );
        self.tones.resize_with(song.channel_count(), Tone::new);
        self.song = Some(song);
        Ok(())
    }

    pub fn song(&self) -> Option<&Arc<Song>> {
        self.song.as_ref()
    }

    pub fn play(&mut self) {
        self.paused = false;
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn playing(&self) -> bool {
        !self.paused
    }

    /// Current position, for hosts that only read counters.
    pub fn position(&self) -> &Scheduler {
        &self.scheduler
    }

    // ── Timing ──────────────────────────────────────────────

    /// Samples in one arpeggio tick at the song's tempo; 0 without a song.
    pub fn samples_per_arpeggio(&self) -> usize {
        let Some(song) = &self.song else {
            return 0;
        };
        let beats_per_second = song.beats_per_minute() as f64 / 60.0;
        let arpeggios_per_second = beats_per_second * song.parts_per_beat as f64 * ARPEGGIOS_PER_PART as f64;
        if arpeggios_per_second <= 0.0 {
            return 0;
        }
        (self.samples_per_second / arpeggios_per_second).floor() as usize
    }

    /// Length of one playthrough under the current loop settings.
    pub fn total_samples(&self) -> usize {
        let Some(song) = &self.song else {
            return 0;
        };
        let samples_per_bar =
            self.samples_per_arpeggio() * ARPEGGIOS_PER_PART * song.parts_per_beat * song.beats_per_bar;
        let loop_passes = usize::try_from(self.loop_settings.loop_count).unwrap_or(1);
        let mut bars = song.loop_length * loop_passes;
        if self.loop_settings.enable_intro {
            bars += song.loop_start;
        }
        if self.loop_settings.enable_outro {
            bars += song.bar_count.saturating_sub(song.loop_start + song.loop_length);
        }
        bars * samples_per_bar
    }

    pub fn total_seconds(&self) -> f64 {
        self.total_samples() as f64 / self.samples_per_second
    }

    pub fn total_bars(&self) -> usize {
        self.song.as_ref().map_or(0, |song| song.bar_count)
    }

    // ── Seeking ─────────────────────────────────────────────

    /// Position in bars, fractional within the bar.
    pub fn playhead(&self) -> f64 {
        self.playhead
    }

    /// Seek to a fractional bar. Oscillators and reverb are cleared.
    pub fn set_playhead(&mut self, value: f64) {
        let spa = self.samples_per_arpeggio();
        let Some(song) = &self.song else {
            return;
        };
        self.scheduler.set_playhead(value, song, spa, &mut self.loop_settings);
        self.playhead = if value.is_finite() {
            value.clamp(0.0, song.bar_count as f64)
        } else {
            0.0
        };
        self.clear_voices();
    }

    pub fn snap_to_start(&mut self) {
        self.loop_settings.enable_intro = true;
        self.snap_to_bar(Some(0));
    }

    /// Jump to the top of `bar`, or of the current bar when `None`.
    pub fn snap_to_bar(&mut self, bar: Option<usize>) {
        let bar = bar.unwrap_or(self.scheduler.bar);
        self.scheduler.snap_to_bar(bar);
        self.playhead = bar as f64;
        self.effect_phase = 0.0;
        self.clear_voices();
    }

    pub fn next_bar(&mut self) {
        let Some(song) = &self.song else {
            return;
        };
        let old_bar = self.scheduler.bar;
        let mut bar = old_bar + 1;
        if self.loop_settings.enable_outro {
            if bar >= song.bar_count {
                bar = if self.loop_settings.enable_intro { 0 } else { song.loop_start };
            }
        } else if bar >= song.loop_start + song.loop_length || bar >= song.bar_count {
            bar = song.loop_start;
        }
        self.scheduler.bar = bar;
        self.playhead += bar as f64 - old_bar as f64;
    }

    pub fn prev_bar(&mut self) {
        let Some(song) = &self.song else {
            return;
        };
        let loop_end = song.loop_start + song.loop_length;
        let old_bar = self.scheduler.bar;
        let mut bar = match old_bar.checked_sub(1) {
            Some(bar) => bar,
            None => loop_end.saturating_sub(1),
        };
        if bar >= song.bar_count {
            bar = song.bar_count.saturating_sub(1);
        }
        if bar < song.loop_start {
            self.loop_settings.enable_intro = true;
        }
        if !self.loop_settings.enable_outro && bar >= loop_end {
            bar = loop_end.saturating_sub(1);
        }
        self.scheduler.bar = bar;
        self.playhead += bar as f64 - old_bar as f64;
    }

    fn clear_voices(&mut self) {
        for tone in &mut self.tones {
            tone.reset();
        }
        self.reverb.clear();
    }

    /// Validate the song and build every table it will touch, so the first
    /// audio callback does no setup work.
    pub fn warm_up(&self) -> Result<(), ConfigurationError> {
        waves::warm_up();
        let Some(song) = &self.song else {
            return Ok(());
        };
        song.validate()?;
        for channel in &song.channels {
            for instrument in &channel.instruments {
                if instrument.kind == InstrumentType::Fm {
                    let _ = fm::kernel(instrument.algorithm, instrument.feedback_type);
                }
            }
        }
        Ok(())
    }

    // ── Rendering ───────────────────────────────────────────

    /// Fill `data` with the next `data.len()` samples of playback.
    ///
    /// Without a song the buffer is zeroed. When playback ends inside the
    /// buffer the synth pauses and the remainder carries only the reverb tail.
    pub fn synthesize(&mut self, data: &mut [f32]) -> Result<(), ConfigurationError> {
        data.fill(0.0);
        let Some(song) = self.song.clone() else {
            return Ok(());
        };
        let samples_per_arpeggio = self.samples_per_arpeggio();
        if samples_per_arpeggio == 0 {
            return Ok(());
        }
        let channel_count = song.channel_count();
        self.tones.resize_with(channel_count, Tone::new);

        let mut ended = self
            .scheduler
            .normalize(&song, samples_per_arpeggio, &mut self.loop_settings);
        if ended {
            log::debug!("playback ended before rendering");
            self.pause();
        }

        let buffer_length = data.len();
        self.reverb_input.clear();
        self.reverb_input.resize(buffer_length, 0.0);

        let effect_angle = PI * 2.0 / (EFFECT_DURATION * self.samples_per_second);
        let mut buffer_index = 0;
        while buffer_index < buffer_length && !ended {
            let run_length = self
                .scheduler
                .arpeggio_sample_countdown
                .min(buffer_length - buffer_index);
            let run = buffer_index..buffer_index + run_length;

            for channel in 0..channel_count {
                let instrument = channel_instrument(&song, channel, self.scheduler.bar)?;
                let piano = self.piano_pressed && channel == self.piano_channel;
                let ctx = ToneContext {
                    song: &song,
                    channel,
                    instrument,
                    position: &self.scheduler,
                    samples_per_arpeggio,
                    samples_per_second: self.samples_per_second,
                    run_length,
                    piano_pitches: piano.then_some(self.piano_pitch.as_slice()),
                };
                let tone = &mut self.tones[channel];
                compute_tone(tone, &ctx);
                if !tone.active {
                    continue;
                }
                let is_drum = song.channel_is_drum(channel);
                let out = if is_drum {
                    &mut data[run.clone()]
                } else {
                    &mut self.reverb_input[run.clone()]
                };
                let effect = EffectOscillator::at(self.effect_phase, effect_angle);
                render_tone(out, tone, instrument, is_drum, effect);
            }

            buffer_index += run_length;
            self.effect_phase = (self.effect_phase + effect_angle * run_length as f64) % (PI * 2.0);
            match self
                .scheduler
                .advance(run_length, &song, samples_per_arpeggio, &mut self.loop_settings)
            {
                Step::Continue => {}
                Step::BarChanged => self.effect_phase = 0.0,
                Step::Ended => {
                    log::debug!("playback ended");
                    self.effect_phase = 0.0;
                    ended = true;
                    self.pause();
                }
            }
        }

        self.reverb.set_amount(song.reverb, config::REVERB_RANGE);
        for (sample, wet_input) in data.iter_mut().zip(&self.reverb_input) {
            let mixed = *sample as f64 + self.reverb.process(*wet_input as f64);
            *sample = self.limiter.process(mixed, self.volume) as f32;
        }

        self.playhead = self.scheduler.playhead(&song, samples_per_arpeggio);
        Ok(())
    }
}

fn channel_instrument(song: &Song, channel: usize, bar: usize) -> Result<&Instrument, ConfigurationError> {
    let instrument = song.pattern_instrument(channel, bar);
    song.channels
        .get(channel)
        .and_then(|c| c.instruments.get(instrument))
        .ok_or(ConfigurationError::MissingInstrument { channel, instrument })
}

/// Dispatch a resolved tone to its synth. FM instruments on drum channels
/// are resolved like noise and rendered as noise.
fn render_tone(out: &mut [f32], tone: &mut Tone, instrument: &Instrument, is_drum: bool, effect: EffectOscillator) {
    match instrument.kind {
        InstrumentType::Fm if !is_drum => fm::fm_synth(out, tone, instrument, effect),
        InstrumentType::Chip => chip_synth(out, tone, instrument, effect),
        InstrumentType::Fm | InstrumentType::Noise => noise_synth(out, tone, instrument),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::{Note, Pattern};

    fn note_song() -> Song {
        let mut song = Song::default();
        song.channels[0].patterns[0] = Pattern {
            instrument: 0,
            notes: vec![Note::new(24, 0, song.parts_per_bar(), 3, false)],
        };
        song
    }

    #[test]
    fn test_no_song_renders_silence() {
        let mut synth = Synth::default();
        let mut buffer = vec![1.0f32; 256];
        synth.synthesize(&mut buffer).unwrap();
        assert!(buffer.iter().all(|s| *s == 0.0));
        assert_eq!(synth.total_samples(), 0);
    }

    #[test]
    fn test_default_song_is_silent() {
        let mut synth = Synth::with_song(Song::default(), 44100.0).unwrap();
        synth.play();
        let mut buffer = vec![0.0f32; 4096];
        for _ in 0..8 {
            synth.synthesize(&mut buffer).unwrap();
            assert!(buffer.iter().all(|s| *s == 0.0));
        }
    }

    #[test]
    fn test_note_renders_audio_within_volume() {
        let mut synth = Synth::with_song(note_song(), 44100.0).unwrap();
        synth.volume = 0.5;
        synth.play();
        let mut buffer = vec![0.0f32; 8192];
        synth.synthesize(&mut buffer).unwrap();
        assert!(buffer.iter().any(|s| s.abs() > 0.01), "note should be audible");
        assert!(buffer.iter().all(|s| s.abs() <= 0.5 + 1e-6));
    }

    #[test]
    fn test_total_samples_counts_loop_passes() {
        let mut synth = Synth::with_song(Song::default(), 44100.0).unwrap();
        let spa = synth.samples_per_arpeggio();
        assert!(spa > 0);
        let per_bar = spa * 4 * 4 * 8;
        assert_eq!(synth.total_samples(), per_bar * 4);
        synth.loop_settings.loop_count = 3;
        assert_eq!(synth.total_samples(), per_bar * 12);
        synth.loop_settings.enable_outro = true;
        assert_eq!(synth.total_samples(), per_bar * 24);
        assert!((synth.total_seconds() - (per_bar * 24) as f64 / 44100.0).abs() < 1e-9);
        assert_eq!(synth.total_bars(), 16);
    }

    #[test]
    fn test_finite_loop_pauses_at_end() {
        let mut synth = Synth::with_song(Song::default(), 8000.0).unwrap();
        synth.loop_settings.loop_count = 1;
        synth.play();
        let total = synth.total_samples();
        let mut buffer = vec![0.0f32; total + 100];
        synth.synthesize(&mut buffer).unwrap();
        assert!(!synth.playing());
        assert_eq!(synth.position().bar, 0);
    }

    #[test]
    fn test_snap_and_bar_navigation() {
        let mut synth = Synth::with_song(Song::default(), 44100.0).unwrap();
        synth.snap_to_bar(Some(2));
        assert_eq!(synth.playhead(), 2.0);
        synth.next_bar();
        assert_eq!(synth.position().bar, 3);
        synth.next_bar();
        // Loop is bars 0..4 with no outro.
        assert_eq!(synth.position().bar, 0);
        assert_eq!(synth.playhead(), 0.0);
        synth.prev_bar();
        assert_eq!(synth.position().bar, 3);
        synth.snap_to_start();
        assert_eq!(synth.position().bar, 0);
        assert!(synth.loop_settings.enable_intro);
    }

    #[test]
    fn test_seek_clears_oscillators() {
        let mut synth = Synth::with_song(note_song(), 44100.0).unwrap();
        synth.play();
        let mut buffer = vec![0.0f32; 2048];
        synth.synthesize(&mut buffer).unwrap();
        assert!(synth.tones[0].phases[0] != 0.0 || synth.tones[0].sample != 0.0);
        synth.set_playhead(0.5);
        assert_eq!(synth.tones[0].phases[0], 0.0);
        assert_eq!(synth.tones[0].sample, 0.0);
        assert_eq!(synth.playhead(), 0.5);
        assert_eq!(synth.position().beat, 4);
    }

    #[test]
    fn test_missing_instrument_is_an_error() {
        let mut song = Song::default();
        song.channels[0].patterns[0].instrument = 3;
        let mut synth = Synth::with_song(song, 44100.0).unwrap();
        let mut buffer = vec![0.0f32; 64];
        let err = synth.synthesize(&mut buffer).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::MissingInstrument {
                channel: 0,
                instrument: 3
            }
        );
    }

    #[test]
    fn test_invalid_instrument_rejected_on_bind() {
        let mut song = Song::default();
        song.channels[0].instruments[0].wave = 42;
        assert!(Synth::with_song(song, 44100.0).is_err());
    }

    #[test]
    fn test_piano_sounds_without_notes() {
        let mut synth = Synth::with_song(Song::default(), 44100.0).unwrap();
        synth.piano_pressed = true;
        synth.piano_pitch = vec![36];
        synth.play();
        let mut buffer = vec![0.0f32; 4096];
        synth.synthesize(&mut buffer).unwrap();
        assert!(buffer.iter().any(|s| s.abs() > 0.01));
    }

    #[test]
    fn test_fm_instrument_renders() {
        let mut song = note_song();
        song.channels[0].instruments[0] = Instrument::new(InstrumentType::Fm);
        let mut synth = Synth::with_song(song, 44100.0).unwrap();
        synth.warm_up().unwrap();
        synth.play();
        let mut buffer = vec![0.0f32; 4096];
        synth.synthesize(&mut buffer).unwrap();
        assert!(buffer.iter().all(|s| s.is_finite()));
        assert!(buffer.iter().any(|s| s.abs() > 0.001));
    }
}
