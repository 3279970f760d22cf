//! Wavetable oscillators for chip and noise instruments, plus the shared
//! vibrato/tremolo sinusoid.

use crate::config;
use crate::song::Instrument;

use super::tone::Tone;
use super::waves;

/// The effect LFO, advanced one sample at a time with a two-term
/// recurrence instead of calling `sin` per sample.
#[derive(Debug, Clone, Copy)]
pub struct EffectOscillator {
    y: f64,
    prev_y: f64,
    y_mult: f64,
}

impl EffectOscillator {
    /// Start at `phase` radians, stepping `angle` radians per sample.
    pub fn at(phase: f64, angle: f64) -> Self {
        Self {
            y: phase.sin(),
            prev_y: (phase - angle).sin(),
            y_mult: 2.0 * angle.cos(),
        }
    }

    /// The current value; advances to the next sample.
    #[inline]
    pub fn next(&mut self) -> f64 {
        let y = self.y;
        self.y = self.y_mult * self.y - self.prev_y;
        self.prev_y = y;
        y
    }
}

#[inline]
fn wrap(phase: f64) -> f64 {
    phase - phase.floor()
}

#[inline]
fn lookup<T: Copy + Into<f64>>(wave: &[T], phase: f64) -> f64 {
    let index = (phase * wave.len() as f64) as usize;
    wave[index % wave.len()].into()
}

/// Render a chip tone into `out`: two chorus voices over a centered
/// wavetable through a one-pole lowpass.
pub fn chip_synth(out: &mut [f32], tone: &mut Tone, instrument: &Instrument, mut effect: EffectOscillator) {
    let Some(wave) = waves::chip_wave(instrument.wave) else {
        return;
    };
    let chorus = instrument.chorus;
    let filter_base = 2f64.powf(-config::FILTER_BASES[instrument.filter]);
    let tremolo_scale = config::EFFECT_TREMOLOS[instrument.effect];
    let chorus_a = 2f64.powf((config::CHORUS_OFFSETS[chorus] + config::CHORUS_INTERVALS[chorus]) / 12.0);
    let chorus_b = 2f64.powf((config::CHORUS_OFFSETS[chorus] - config::CHORUS_INTERVALS[chorus]) / 12.0)
        * tone.harmony_mult;
    let chorus_sign = tone.harmony_volume_mult * config::CHORUS_SIGNS[chorus];
    if chorus == 0 {
        tone.phases[1] = tone.phases[0];
    }
    let delta_ratio = chorus_b / chorus_a;

    let mut phase_delta = tone.phase_deltas[0] * chorus_a;
    let phase_delta_scale = tone.phase_delta_scale;
    let mut volume = tone.volume_starts[0];
    let volume_delta = tone.volume_deltas[0];
    let mut filter = tone.filter * filter_base;
    let filter_scale = tone.filter_scale;
    let vibrato_scale = tone.vibrato_scale;
    let mut phase_a = tone.phases[0] % 1.0;
    let mut phase_b = tone.phases[1] % 1.0;
    let mut sample = tone.sample;

    for out_sample in out.iter_mut() {
        let effect_y = effect.next();
        let vibrato = 1.0 + vibrato_scale * effect_y;
        let tremolo = 1.0 + tremolo_scale * (effect_y - 1.0);

        let wave_a = lookup(wave, phase_a);
        let wave_b = lookup(wave, phase_b) * chorus_sign;
        let combined = (wave_a + wave_b) * volume * tremolo;
        sample += (combined - sample) * filter;

        volume += volume_delta;
        phase_a = wrap(phase_a + phase_delta * vibrato);
        phase_b = wrap(phase_b + phase_delta * vibrato * delta_ratio);
        filter *= filter_scale;
        phase_delta *= phase_delta_scale;
        *out_sample += sample as f32;
    }

    tone.phases[0] = phase_a;
    tone.phases[1] = phase_b;
    tone.sample = sample;
}

/// Render a noise tone: the drum table played back at the tone's rate.
pub fn noise_synth(out: &mut [f32], tone: &mut Tone, instrument: &Instrument) {
    let Some(wave) = waves::drum_wave(instrument.wave) else {
        return;
    };
    let mut phase_delta = tone.phase_deltas[0] / config::DRUM_WAVE_LENGTH as f64;
    let phase_delta_scale = tone.phase_delta_scale;
    let mut volume = tone.volume_starts[0];
    let volume_delta = tone.volume_deltas[0];
    let filter = tone.filter;
    let mut phase = tone.phases[0] % 1.0;
    let mut sample = tone.sample;

    for out_sample in out.iter_mut() {
        sample += (lookup(wave, phase) * volume - sample) * filter;
        volume += volume_delta;
        phase = wrap(phase + phase_delta);
        phase_delta *= phase_delta_scale;
        *out_sample += sample as f32;
    }

    tone.phases[0] = phase;
    tone.sample = sample;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::InstrumentType;

    fn steady_tone(frequency: f64, sample_rate: f64) -> Tone {
        let mut tone = Tone::new();
        tone.phase_deltas[0] = frequency / sample_rate;
        tone.volume_starts[0] = 0.5;
        tone.phase_delta_scale = 1.0;
        tone.filter = 1.0;
        tone.filter_scale = 1.0;
        tone.harmony_mult = 1.0;
        tone.harmony_volume_mult = 1.0;
        tone
    }

    fn effect() -> EffectOscillator {
        EffectOscillator::at(0.0, 0.001)
    }

    #[test]
    fn effect_oscillator_tracks_sine() {
        let angle = 0.01;
        let mut osc = EffectOscillator::at(0.3, angle);
        for i in 0..1000 {
            let expected = (0.3 + angle * i as f64).sin();
            let got = osc.next();
            assert!((got - expected).abs() < 1e-9, "sample {i}: {got} vs {expected}");
        }
    }

    #[test]
    fn chip_output_is_bounded() {
        let mut instrument = Instrument::new(InstrumentType::Chip);
        instrument.filter = 0;
        let mut tone = steady_tone(440.0, 44100.0);
        let mut out = vec![0.0f32; 4410];
        chip_synth(&mut out, &mut tone, &instrument, effect());
        assert!(out.iter().any(|s| s.abs() > 0.01));
        assert!(out.iter().all(|s| s.abs() <= 1.0), "chip output out of range");
    }

    #[test]
    fn chip_accumulates_into_buffer() {
        let instrument = Instrument::new(InstrumentType::Chip);
        let mut tone = steady_tone(440.0, 44100.0);
        let mut out = vec![1.0f32; 64];
        chip_synth(&mut out, &mut tone, &instrument, effect());
        assert!(out.iter().any(|s| (*s - 1.0).abs() > 1e-6));
    }

    #[test]
    fn chip_phase_carries_between_runs() {
        let instrument = Instrument::new(InstrumentType::Chip);
        let mut whole_tone = steady_tone(300.0, 44100.0);
        let mut whole = vec![0.0f32; 200];
        chip_synth(&mut whole, &mut whole_tone, &instrument, EffectOscillator::at(0.0, 0.0));

        let mut split_tone = steady_tone(300.0, 44100.0);
        let mut split = vec![0.0f32; 200];
        let (first, second) = split.split_at_mut(100);
        chip_synth(first, &mut split_tone, &instrument, EffectOscillator::at(0.0, 0.0));
        chip_synth(second, &mut split_tone, &instrument, EffectOscillator::at(0.0, 0.0));

        for (i, (a, b)) in whole.iter().zip(&split).enumerate() {
            assert!((a - b).abs() < 1e-6, "sample {i}: {a} vs {b}");
        }
    }

    #[test]
    fn noise_respects_volume_ramp() {
        let instrument = Instrument::new(InstrumentType::Noise);
        let mut tone = steady_tone(1000.0, 44100.0);
        tone.volume_starts[0] = 0.0;
        tone.volume_deltas[0] = 0.0;
        let mut out = vec![0.0f32; 256];
        noise_synth(&mut out, &mut tone, &instrument);
        assert!(out.iter().all(|s| *s == 0.0), "zero volume must stay silent");

        tone.volume_starts[0] = 0.5;
        noise_synth(&mut out, &mut tone, &instrument);
        assert!(out.iter().any(|s| s.abs() > 0.0));
        assert!(out.iter().all(|s| s.abs() <= 0.5 + 1e-6));
    }
}
