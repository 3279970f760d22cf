//! DSP Engine: song playback rendered sample by sample.
//!
//! [`engine::Synth`] drives the [`scheduler`], asks the [`tone`] resolver
//! for per-run oscillator settings, renders each channel with the chip,
//! noise or FM synth, and finishes with the shared [`reverb`] and
//! [`limiter`]. The same code serves the browser worklet (via WASM) and
//! offline rendering through [`renderer`].

pub mod engine;
pub mod envelope;
pub mod fft;
pub mod fm;
pub mod limiter;
pub mod oscillator;
pub mod renderer;
pub mod reverb;
pub mod scheduler;
pub mod tone;
pub mod waves;

/// Frequency in Hz of a MIDI-style pitch number (69 = A4 = 440 Hz).
#[inline]
pub fn frequency_from_pitch(pitch: f64) -> f64 {
    440.0 * 2f64.powf((pitch - 69.0) / 12.0)
}

/// Perceptual gain of a note volume in `0..=3`.
#[inline]
pub fn volume_conversion(note_volume: f64) -> f64 {
    (note_volume / 3.0).powf(1.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_69_is_a440() {
        assert!((frequency_from_pitch(69.0) - 440.0).abs() < 1e-12);
        assert!((frequency_from_pitch(81.0) - 880.0).abs() < 1e-9);
    }

    #[test]
    fn volume_conversion_endpoints() {
        assert_eq!(volume_conversion(0.0), 0.0);
        assert!((volume_conversion(3.0) - 1.0).abs() < 1e-12);
    }
}
