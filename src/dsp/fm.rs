//! Four-operator FM synthesis.
//!
//! Operator routing depends only on the (algorithm, feedback type) pair, so
//! each pair is compiled once into an [`FmKernel`] of zero-based index lists
//! and cached process-wide. The per-sample loop then walks those lists.

use std::sync::OnceLock;

use crate::config::{self, OPERATOR_COUNT};
use crate::song::Instrument;

use super::oscillator::EffectOscillator;
use super::tone::Tone;
use super::waves;

/// Keeps phases positive when modulation swings them backwards.
const NEGATIVE_PHASE_GUARD: f64 = 1000.0;

/// Precomputed routing for one (algorithm, feedback type) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FmKernel {
    /// Operators whose scaled output feeds each operator's phase.
    pub modulators: [Vec<usize>; OPERATOR_COUNT],
    /// Operators whose last raw output feeds back into each operator.
    pub feedback: [Vec<usize>; OPERATOR_COUNT],
    /// Operators `0..carrier_count` are summed into the output.
    pub carrier_count: usize,
}

impl FmKernel {
    fn build(algorithm: usize, feedback_type: usize) -> Self {
        let zero_based = |numbers: &[usize]| numbers.iter().map(|n| n - 1).collect::<Vec<_>>();
        Self {
            modulators: std::array::from_fn(|op| zero_based(config::OPERATOR_MODULATED_BY[algorithm][op])),
            feedback: std::array::from_fn(|op| {
                zero_based(config::OPERATOR_FEEDBACK_INDICES[feedback_type][op])
            }),
            carrier_count: config::OPERATOR_CARRIER_COUNTS[algorithm],
        }
    }
}

static KERNELS: OnceLock<Vec<FmKernel>> = OnceLock::new();

/// The cached kernel for a routing pair, or `None` for unknown indices.
pub fn kernel(algorithm: usize, feedback_type: usize) -> Option<&'static FmKernel> {
    let feedback_count = config::FEEDBACK_NAMES.len();
    if algorithm >= config::ALGORITHM_NAMES.len() || feedback_type >= feedback_count {
        return None;
    }
    let kernels = KERNELS.get_or_init(|| {
        let mut kernels = Vec::with_capacity(config::ALGORITHM_NAMES.len() * feedback_count);
        for algorithm in 0..config::ALGORITHM_NAMES.len() {
            for feedback_type in 0..feedback_count {
                kernels.push(FmKernel::build(algorithm, feedback_type));
            }
        }
        kernels
    });
    kernels.get(algorithm * feedback_count + feedback_type)
}

/// Render an FM tone into `out`.
pub fn fm_synth(out: &mut [f32], tone: &mut Tone, instrument: &Instrument, mut effect: EffectOscillator) {
    let Some(kernel) = kernel(instrument.algorithm, instrument.feedback_type) else {
        return;
    };
    let sine = waves::sine_wave();
    let table_length = config::SINE_WAVE_LENGTH as f64;
    let tremolo_scale = config::EFFECT_TREMOLOS[instrument.effect];
    let phase_delta_scale = tone.phase_delta_scale;
    let vibrato_scale = tone.vibrato_scale;

    let mut phases = tone.phases.map(|p| ((p % 1.0) + NEGATIVE_PHASE_GUARD) * table_length);
    let mut phase_deltas = tone.phase_deltas;
    let mut output_mults = tone.volume_starts;
    let output_deltas = tone.volume_deltas;
    let mut outputs = tone.feedback_outputs;
    let mut feedback_mult = tone.feedback_mult;
    let feedback_delta = tone.feedback_delta;
    let mut scaled = [0.0f64; OPERATOR_COUNT];
    let mut sample = tone.sample;

    for out_sample in out.iter_mut() {
        let effect_y = effect.next();
        let vibrato = 1.0 + vibrato_scale * effect_y;
        let tremolo = 1.0 + tremolo_scale * (effect_y - 1.0);

        // Modulators always have higher indices than what they modulate.
        for op in (0..OPERATOR_COUNT).rev() {
            let mut phase_mix = phases[op];
            for &m in &kernel.modulators[op] {
                phase_mix += scaled[m];
            }
            if !kernel.feedback[op].is_empty() {
                let fed_back: f64 = kernel.feedback[op].iter().map(|&f| outputs[f]).sum();
                phase_mix += feedback_mult * fed_back;
            }
            let phase_int = phase_mix.trunc();
            let index = (phase_int as i64 as usize) & config::SINE_WAVE_MASK;
            let low = sine[index];
            outputs[op] = low + (sine[index + 1] - low) * (phase_mix - phase_int);
            scaled[op] = output_mults[op] * outputs[op];
        }

        sample = tremolo * scaled[..kernel.carrier_count].iter().sum::<f64>();
        feedback_mult += feedback_delta;
        for op in 0..OPERATOR_COUNT {
            output_mults[op] += output_deltas[op];
            phases[op] += phase_deltas[op] * vibrato;
            phase_deltas[op] *= phase_delta_scale;
        }
        *out_sample += sample as f32;
    }

    tone.phases = phases.map(|p| p / table_length);
    tone.feedback_outputs = outputs;
    tone.sample = sample;
}
