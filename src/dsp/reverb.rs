//! Reverb effect: a four-tap feedback delay network.
//!
//! One circular delay line is read at four positions; the taps are mixed
//! through a pair of butterflies, lowpassed, and written back. The wet
//! taps are summed with the dry input.

/// Delay line length; must be a power of two.
pub const DELAY_LINE_LENGTH: usize = 1 << 14;
const DELAY_LINE_MASK: usize = DELAY_LINE_LENGTH - 1;
/// Tap offsets from the write position.
const TAP_OFFSETS: [usize; 3] = [3041, 6426, 10907];

/// Mono feedback delay network reverb.
#[derive(Debug, Clone)]
pub struct Reverb {
    delay_line: Vec<f32>,
    position: usize,
    feedback: [f64; 4],
    /// Feedback gain derived from the song's reverb setting.
    gain: f64,
}

impl Default for Reverb {
    fn default() -> Self {
        Self::new()
    }
}

impl Reverb {
    pub fn new() -> Self {
        Self {
            delay_line: vec![0.0; DELAY_LINE_LENGTH],
            position: 0,
            feedback: [0.0; 4],
            gain: 0.0,
        }
    }

    /// Create a reverb for a song reverb setting out of `range`.
    pub fn with_amount(amount: usize, range: usize) -> Self {
        let mut r = Self::new();
        r.set_amount(amount, range);
        r
    }

    /// Map a song reverb setting (0..=range) onto the feedback gain.
    pub fn set_amount(&mut self, amount: usize, range: usize) {
        let normalized = if range == 0 { 0.0 } else { amount as f64 / range as f64 };
        self.gain = normalized.powf(0.667) * 0.425;
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// Feed one input sample; returns the four tap outputs summed (the
    /// first tap includes `input`).
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let pos0 = self.position;
        let pos1 = (pos0 + TAP_OFFSETS[0]) & DELAY_LINE_MASK;
        let pos2 = (pos0 + TAP_OFFSETS[1]) & DELAY_LINE_MASK;
        let pos3 = (pos0 + TAP_OFFSETS[2]) & DELAY_LINE_MASK;

        let d0 = self.delay_line[pos0] as f64 + input;
        let d1 = self.delay_line[pos1] as f64;
        let d2 = self.delay_line[pos2] as f64;
        let d3 = self.delay_line[pos3] as f64;

        let t0 = -d0 + d1;
        let t1 = -d0 - d1;
        let t2 = -d2 + d3;
        let t3 = -d2 - d3;

        let gain = self.gain;
        let fb = &mut self.feedback;
        fb[0] += ((t0 + t2) * gain - fb[0]) * 0.5;
        fb[1] += ((t1 + t3) * gain - fb[1]) * 0.5;
        fb[2] += ((t0 - t2) * gain - fb[2]) * 0.5;
        fb[3] += ((t1 - t3) * gain - fb[3]) * 0.5;

        self.delay_line[pos1] = fb[0] as f32;
        self.delay_line[pos2] = fb[1] as f32;
        self.delay_line[pos3] = fb[2] as f32;
        self.delay_line[pos0] = fb[3] as f32;
        self.position = (pos0 + 1) & DELAY_LINE_MASK;

        d0 + d1 + d2 + d3
    }

    /// Clear the delay line and feedback state.
    pub fn clear(&mut self) {
        self.delay_line.fill(0.0);
        self.feedback = [0.0; 4];
        self.position = 0;
    }
}
