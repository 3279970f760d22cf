//! Lazily built waveform tables shared by every synth.
//!
//! Each table is constructed once per process on first use and never
//! mutated afterwards. Noise tables use fixed seeds, so two renders of
//! the same song are sample-identical.

use std::f64::consts::PI;
use std::sync::OnceLock;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config;

use super::fft::inverse_real_fourier_transform;

static CHIP_WAVES: OnceLock<Vec<Vec<f64>>> = OnceLock::new();
static SINE_WAVE: OnceLock<Vec<f64>> = OnceLock::new();
static DRUM_WAVES: OnceLock<Vec<Vec<f32>>> = OnceLock::new();

/// Seed for the random drum tables; bumping it changes every noise render.
const NOISE_SEED: u64 = 0x6265_6570;

// ── Chip waves ──────────────────────────────────────────────

/// Centered (zero-mean) chip wave for `index`, or `None` past the table.
pub fn chip_wave(index: usize) -> Option<&'static [f64]> {
    CHIP_WAVES
        .get_or_init(|| config::WAVE_SHAPES.iter().map(|shape| center_wave(shape)).collect())
        .get(index)
        .map(Vec::as_slice)
}

/// Subtract the mean so the wave carries no DC offset.
fn center_wave(shape: &[f64]) -> Vec<f64> {
    let mean = shape.iter().sum::<f64>() / shape.len().max(1) as f64;
    shape.iter().map(|v| v - mean).collect()
}

/// One sine period in `SINE_WAVE_LENGTH` steps plus a guard sample for
/// linear interpolation at the wrap.
pub fn sine_wave() -> &'static [f64] {
    SINE_WAVE.get_or_init(|| {
        (0..=config::SINE_WAVE_LENGTH)
            .map(|i| (i as f64 * PI * 2.0 / config::SINE_WAVE_LENGTH as f64).sin())
            .collect()
    })
}

// ── Drum waves ──────────────────────────────────────────────

/// 32768-sample noise table for drum `index`, or `None` past the table.
pub fn drum_wave(index: usize) -> Option<&'static [f32]> {
    DRUM_WAVES
        .get_or_init(|| {
            (0..config::DRUM_NAMES.len())
                .map(build_drum_wave)
                .collect()
        })
        .get(index)
        .map(Vec::as_slice)
}

fn build_drum_wave(index: usize) -> Vec<f32> {
    let mut wave = vec![0.0f32; config::DRUM_WAVE_LENGTH];
    let mut rng = StdRng::seed_from_u64(NOISE_SEED + index as u64);
    match index {
        0 => fill_lfsr(&mut wave, 1 << 14),
        1 => {
            for sample in wave.iter_mut() {
                *sample = rng.r#gen::<f32>() * 2.0 - 1.0;
            }
        }
        2 => fill_lfsr(&mut wave, 2 << 14),
        3 => fill_lfsr(&mut wave, 10 << 2),
        _ => {
            draw_noise_spectrum(&mut wave, &mut rng, 10.0, 11.0, 1.0, 1.0, 0.0);
            draw_noise_spectrum(&mut wave, &mut rng, 11.0, 14.0, -2.0, -2.0, 0.0);
            inverse_real_fourier_transform(&mut wave);
            let scale = 1.0 / (wave.len() as f32).sqrt();
            for sample in wave.iter_mut() {
                *sample *= scale;
            }
        }
    }
    wave
}

/// Square-ish noise from a linear feedback shift register seeded with 1.
fn fill_lfsr(wave: &mut [f32], feedback: u32) {
    let mut register: u32 = 1;
    for sample in wave.iter_mut() {
        *sample = (register & 1) as f32 * 2.0 - 1.0;
        let mut next = register >> 1;
        if (register + next) & 1 == 1 {
            next += feedback;
        }
        register = next;
    }
}

/// Write random-phase bins between two octaves into a half-complex spectrum,
/// with power interpolated in log2 steps between the octave edges.
fn draw_noise_spectrum(
    wave: &mut [f32],
    rng: &mut StdRng,
    low_octave: f64,
    high_octave: f64,
    low_power: f64,
    high_power: f64,
    overall_slope: f64,
) {
    let reference_index = 2048.0;
    let low_index = 2f64.powf(low_octave) as usize;
    let high_index = 2f64.powf(high_octave) as usize;
    let len = wave.len();
    for i in low_index..high_index.min(len) {
        let octave_fraction = ((i as f64).log2() - low_octave) / (high_octave - low_octave);
        let mut amplitude = 2f64.powf(low_power + (high_power - low_power) * octave_fraction);
        amplitude *= (i as f64 / reference_index).powf(overall_slope);
        let radians = rng.r#gen::<f64>() * PI * 2.0;
        wave[i] = (radians.cos() * amplitude) as f32;
        wave[len - i] = (radians.sin() * amplitude) as f32;
    }
}

/// Build every table up front so the first audio callback does not pay for it.
pub fn warm_up() {
    let _ = chip_wave(0);
    let _ = sine_wave();
    let _ = drum_wave(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chip_waves_are_centered() {
        for index in 0..config::WAVE_NAMES.len() {
            let wave = chip_wave(index).unwrap();
            let mean: f64 = wave.iter().sum::<f64>() / wave.len() as f64;
            assert!(mean.abs() < 1e-9, "wave {index} mean {mean}");
        }
        assert!(chip_wave(config::WAVE_NAMES.len()).is_none());
    }

    #[test]
    fn test_sine_has_guard_sample() {
        let sine = sine_wave();
        assert_eq!(sine.len(), config::SINE_WAVE_LENGTH + 1);
        assert!(sine[0].abs() < 1e-12);
        assert!((sine[64] - 1.0).abs() < 1e-12);
        assert!(sine[config::SINE_WAVE_LENGTH].abs() < 1e-9);
    }

    #[test]
    fn test_drum_waves_shape() {
        for index in 0..config::DRUM_NAMES.len() {
            let wave = drum_wave(index).unwrap();
            assert_eq!(wave.len(), config::DRUM_WAVE_LENGTH);
            assert!(wave.iter().all(|v| v.is_finite()), "drum {index} not finite");
            assert!(wave.iter().any(|v| *v != 0.0), "drum {index} is silent");
        }
    }

    #[test]
    fn test_retro_lfsr_is_binary() {
        let wave = drum_wave(0).unwrap();
        assert_eq!(wave[0], 1.0);
        assert!(wave.iter().all(|v| *v == 1.0 || *v == -1.0));
    }

    #[test]
    fn test_white_noise_in_range() {
        let wave = drum_wave(1).unwrap();
        assert!(wave.iter().all(|v| (-1.0..1.0).contains(v)));
    }
}
