//! FM operator envelopes: shape functions of elapsed time.
//!
//! Envelopes do not hold state: the tone resolver evaluates them at the
//! start and end of every run and sweeps linearly between the two values.

use crate::config::{self, EnvelopeKind};

/// Evaluate envelope preset `envelope` (an index into the operator
/// envelope tables).
///
/// * `seconds`: time since the note started, scaled by the decay pins.
/// * `beats`: note-relative position in beats, for tremolo presets.
/// * `custom_volume`: the note's own pin volume, used by `custom`.
pub fn operator_envelope(envelope: usize, seconds: f64, beats: f64, custom_volume: f64) -> f64 {
    let speed = config::OPERATOR_ENVELOPE_SPEEDS[envelope];
    match config::OPERATOR_ENVELOPE_KINDS[envelope] {
        EnvelopeKind::Custom => custom_volume,
        EnvelopeKind::Steady => 1.0,
        EnvelopeKind::Punch => (2.0 - seconds * 10.0).max(1.0),
        EnvelopeKind::Flare => {
            let attack = 0.25 / speed.sqrt();
            if seconds < attack {
                seconds / attack
            } else {
                1.0 / (1.0 + (seconds - attack) * speed)
            }
        }
        EnvelopeKind::Decay => {
            let curve = 1.0 / (1.0 + seconds * speed);
            if config::OPERATOR_ENVELOPE_INVERTED[envelope] {
                1.0 - curve
            } else {
                curve
            }
        }
        EnvelopeKind::Tremolo => 0.5 - (beats * 2.0 * std::f64::consts::PI * speed).cos() * 0.5,
    }
}

/// Map a 0..=15 operator amplitude setting onto a perceptual gain.
#[inline]
pub fn operator_amplitude_curve(amplitude: usize) -> f64 {
    (16f64.powf(amplitude as f64 / 15.0) - 1.0) / 15.0
}
