//! Limiter: peak-following gain stage on the master output.
//!
//! Tracks a peak envelope that jumps to any louder sample and falls back
//! linearly (over two seconds from full scale), then divides the signal by
//! `peak * 0.75 + 0.25`. Quiet mixes pass almost untouched; loud ones are
//! pulled down without hard clipping.

/// Master output limiter.
#[derive(Debug, Clone)]
pub struct Limiter {
    sample_rate: f64,
    /// Peak envelope fall per sample.
    decay: f64,
    // Current peak envelope (linear).
    limit: f64,
}

impl Limiter {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            decay: 1.0 / (2.0 * sample_rate),
            limit: 0.0,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Current peak envelope.
    pub fn limit(&self) -> f64 {
        self.limit
    }

    /// Limit one sample and apply the master `volume`. The result never
    /// exceeds `|volume|` in magnitude.
    #[inline]
    pub fn process(&mut self, sample: f64, volume: f64) -> f64 {
        let abs = sample.abs();
        if self.limit < abs {
            self.limit = abs;
        }
        let out = sample / (self.limit * 0.75 + 0.25) * volume;
        self.limit -= self.decay;
        let ceiling = volume.abs();
        out.clamp(-ceiling, ceiling)
    }

    pub fn reset(&mut self) {
        self.limit = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_signal_is_boosted_not_clipped() {
        let mut limiter = Limiter::new(44100.0);
        let out = limiter.process(0.1, 1.0);
        assert!((out - 0.1 / (0.1 * 0.75 + 0.25)).abs() < 1e-12);
    }

    #[test]
    fn test_never_exceeds_volume() {
        let mut limiter = Limiter::new(44100.0);
        for (i, input) in [0.0, 3.0, -8.0, 0.5, 100.0, -0.01, 2.0].iter().cycle().take(5000).enumerate() {
            for volume in [1.0, 0.5, 0.25] {
                let out = limiter.process(*input, volume);
                assert!(out.abs() <= volume + 1e-12, "sample {i}: {out} > {volume}");
            }
        }
    }

    #[test]
    fn test_peak_decays_over_time() {
        let mut limiter = Limiter::new(1000.0);
        limiter.process(1.0, 1.0);
        for _ in 0..1000 {
            limiter.process(0.0, 1.0);
        }
        assert!((limiter.limit() - 0.4995).abs() < 1e-9, "limit {}", limiter.limit());
    }
}
