//! Static song and synthesis tables.
//!
//! Every instrument and song setting is stored as an index into one of
//! these tables. The tables are append-only: reordering an entry changes
//! the meaning of every song string ever written.

// ── Scales & keys ───────────────────────────────────────────

pub const SCALE_NAMES: [&str; 12] = [
    "easy :)",
    "easy :(",
    "island :)",
    "island :(",
    "blues :)",
    "blues :(",
    "normal :)",
    "normal :(",
    "dbl harmonic :)",
    "dbl harmonic :(",
    "enigma",
    "expert",
];

const T: bool = true;
const F: bool = false;

/// Which of the twelve semitones above the key each scale allows.
pub const SCALE_FLAGS: [[bool; 12]; 12] = [
    [T, F, T, F, T, F, F, T, F, T, F, F],
    [T, F, F, T, F, T, F, T, F, F, T, F],
    [T, F, F, F, T, T, F, T, F, F, F, T],
    [T, T, F, T, F, F, F, T, T, F, F, F],
    [T, F, T, T, T, F, F, T, F, T, F, F],
    [T, F, F, T, F, T, T, T, F, F, T, F],
    [T, F, T, F, T, T, F, T, F, T, F, T],
    [T, F, T, T, F, T, F, T, T, F, T, F],
    [T, T, F, F, T, T, F, T, T, F, F, T],
    [T, F, T, T, F, F, T, T, T, F, F, T],
    [T, F, T, F, T, F, T, F, T, F, T, F],
    [T, T, T, T, T, T, T, T, T, T, T, T],
];

pub const KEY_NAMES: [&str; 12] = ["B", "A♯", "A", "G♯", "G", "F♯", "F", "E", "D♯", "D", "C♯", "C"];
pub const KEY_TRANSPOSES: [i32; 12] = [23, 22, 21, 20, 19, 18, 17, 16, 15, 14, 13, 12];

// ── Song ranges ─────────────────────────────────────────────

pub const TEMPO_STEPS: usize = 15;
pub const REVERB_RANGE: usize = 4;
pub const BEATS_PER_BAR_MIN: usize = 3;
pub const BEATS_PER_BAR_MAX: usize = 16;
pub const BAR_COUNT_MIN: usize = 1;
pub const BAR_COUNT_MAX: usize = 128;
pub const PATTERNS_PER_CHANNEL_MIN: usize = 1;
pub const PATTERNS_PER_CHANNEL_MAX: usize = 64;
pub const INSTRUMENTS_PER_CHANNEL_MIN: usize = 1;
pub const INSTRUMENTS_PER_CHANNEL_MAX: usize = 10;
pub const PART_COUNTS: [usize; 4] = [3, 4, 6, 8];

pub const PITCH_CHANNEL_COUNT_MIN: usize = 1;
pub const PITCH_CHANNEL_COUNT_MAX: usize = 6;
pub const DRUM_CHANNEL_COUNT_MIN: usize = 0;
pub const DRUM_CHANNEL_COUNT_MAX: usize = 2;

/// Semitones per drum "pitch" step.
pub const DRUM_INTERVAL: i32 = 6;
pub const DRUM_COUNT: i32 = 12;
pub const MAX_PITCH: i32 = 84;
pub const MAX_PITCHES_PER_NOTE: usize = 4;
pub const NOTE_VOLUME_MAX: u8 = 3;
pub const OCTAVE_MAX: usize = 4;

// ── Chip waves ──────────────────────────────────────────────

pub const WAVE_NAMES: [&str; 9] = [
    "triangle",
    "square",
    "pulse wide",
    "pulse narrow",
    "sawtooth",
    "double saw",
    "double pulse",
    "spiky",
    "plateau",
];
pub const WAVE_VOLUMES: [f64; 9] = [1.0, 0.5, 0.5, 0.5, 0.65, 0.5, 0.4, 0.4, 0.94];

/// Raw chip wave shapes, before DC removal.
pub const WAVE_SHAPES: [&[f64]; 9] = [
    &[
        1.0 / 15.0, 3.0 / 15.0, 5.0 / 15.0, 7.0 / 15.0, 9.0 / 15.0, 11.0 / 15.0, 13.0 / 15.0,
        15.0 / 15.0, 15.0 / 15.0, 13.0 / 15.0, 11.0 / 15.0, 9.0 / 15.0, 7.0 / 15.0, 5.0 / 15.0,
        3.0 / 15.0, 1.0 / 15.0, -1.0 / 15.0, -3.0 / 15.0, -5.0 / 15.0, -7.0 / 15.0, -9.0 / 15.0,
        -11.0 / 15.0, -13.0 / 15.0, -15.0 / 15.0, -15.0 / 15.0, -13.0 / 15.0, -11.0 / 15.0,
        -9.0 / 15.0, -7.0 / 15.0, -5.0 / 15.0, -3.0 / 15.0, -1.0 / 15.0,
    ],
    &[1.0, -1.0],
    &[1.0, -1.0, -1.0, -1.0],
    &[1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0],
    &[
        1.0 / 31.0, 3.0 / 31.0, 5.0 / 31.0, 7.0 / 31.0, 9.0 / 31.0, 11.0 / 31.0, 13.0 / 31.0,
        15.0 / 31.0, 17.0 / 31.0, 19.0 / 31.0, 21.0 / 31.0, 23.0 / 31.0, 25.0 / 31.0, 27.0 / 31.0,
        29.0 / 31.0, 31.0 / 31.0, -31.0 / 31.0, -29.0 / 31.0, -27.0 / 31.0, -25.0 / 31.0,
        -23.0 / 31.0, -21.0 / 31.0, -19.0 / 31.0, -17.0 / 31.0, -15.0 / 31.0, -13.0 / 31.0,
        -11.0 / 31.0, -9.0 / 31.0, -7.0 / 31.0, -5.0 / 31.0, -3.0 / 31.0, -1.0 / 31.0,
    ],
    &[
        0.0, -0.2, -0.4, -0.6, -0.8, -1.0, 1.0, -0.8, -0.6, -0.4, -0.2, 1.0, 0.8, 0.6, 0.4, 0.2,
    ],
    &[
        1.0, 1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0, -1.0,
    ],
    &[1.0, -1.0, 1.0, -1.0, 1.0, 0.0],
    &[
        0.0, 0.2, 0.4, 0.5, 0.6, 0.7, 0.8, 0.85, 0.9, 0.95, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0,
        1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.95, 0.9, 0.85, 0.8, 0.7, 0.6, 0.5, 0.4, 0.2,
        0.0, -0.2, -0.4, -0.5, -0.6, -0.7, -0.8, -0.85, -0.9, -0.95, -1.0, -1.0, -1.0, -1.0,
        -1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -1.0, -0.95, -0.9, -0.85, -0.8, -0.7, -0.6, -0.5,
        -0.4, -0.2,
    ],
];

// ── Drums ───────────────────────────────────────────────────

pub const DRUM_NAMES: [&str; 5] = ["retro", "white", "clang", "buzz", "hollow"];
pub const DRUM_VOLUMES: [f64; 5] = [0.25, 1.0, 0.4, 0.3, 1.5];
pub const DRUM_BASE_PITCHES: [i32; 5] = [69, 69, 69, 69, 96];
pub const DRUM_PITCH_FILTER_MULT: [f64; 5] = [100.0, 8.0, 100.0, 100.0, 1.0];
pub const DRUM_WAVE_IS_SOFT: [bool; 5] = [false, true, false, false, true];
pub const DRUM_WAVE_LENGTH: usize = 1 << 15;

// ── Filters, transitions, effects ───────────────────────────

pub const FILTER_NAMES: [&str; 7] = [
    "none",
    "bright",
    "medium",
    "soft",
    "decay bright",
    "decay medium",
    "decay soft",
];
pub const FILTER_BASES: [f64; 7] = [0.0, 2.0, 3.5, 5.0, 1.0, 2.5, 4.0];
pub const FILTER_DECAYS: [f64; 7] = [0.0, 0.0, 0.0, 0.0, 10.0, 7.0, 4.0];
pub const FILTER_VOLUMES: [f64; 7] = [0.2, 0.4, 0.7, 1.0, 0.5, 0.75, 1.0];

pub const TRANSITION_NAMES: [&str; 4] = ["seamless", "sudden", "smooth", "slide"];

pub const EFFECT_NAMES: [&str; 6] = [
    "none",
    "vibrato light",
    "vibrato delayed",
    "vibrato heavy",
    "tremolo light",
    "tremolo heavy",
];
pub const EFFECT_VIBRATOS: [f64; 6] = [0.0, 0.15, 0.3, 0.45, 0.0, 0.0];
pub const EFFECT_TREMOLOS: [f64; 6] = [0.0, 0.0, 0.0, 0.0, 0.25, 0.5];
/// Vibrato onset delay, in parts.
pub const EFFECT_VIBRATO_DELAYS: [f64; 6] = [0.0, 0.0, 3.0, 0.0, 0.0, 0.0];

// ── Chorus ──────────────────────────────────────────────────

pub const CHORUS_NAMES: [&str; 9] = [
    "union",
    "shimmer",
    "hum",
    "honky tonk",
    "dissonant",
    "fifths",
    "octaves",
    "bowed",
    "custom harmony",
];
pub const CHORUS_INTERVALS: [f64; 9] = [0.0, 0.02, 0.05, 0.1, 0.25, 3.5, 6.0, 0.02, 0.05];
pub const CHORUS_OFFSETS: [f64; 9] = [0.0, 0.0, 0.0, 0.0, 0.0, 3.5, 6.0, 0.0, 0.0];
pub const CHORUS_VOLUMES: [f64; 9] = [0.7, 0.8, 1.0, 1.0, 0.9, 0.9, 0.8, 1.0, 1.0];
pub const CHORUS_SIGNS: [f64; 9] = [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, -1.0, 1.0];
pub const CHORUS_HARMONIZES: [bool; 9] = [F, F, F, F, F, F, F, F, T];

// ── Instrument volume ───────────────────────────────────────

pub const VOLUME_NAMES: [&str; 6] = ["loudest", "loud", "medium", "quiet", "quietest", "mute"];
/// Attenuation exponent per volume step; negative means muted.
pub const VOLUME_VALUES: [f64; 6] = [0.0, 0.5, 1.0, 1.5, 2.0, -1.0];

// ── FM operators ────────────────────────────────────────────

pub const OPERATOR_COUNT: usize = 4;
pub const OPERATOR_AMPLITUDE_MAX: usize = 15;

pub const ALGORITHM_NAMES: [&str; 13] = [
    "1←(2 3 4)",
    "1←(2 3←4)",
    "1←2←(3 4)",
    "1←(2 3)←4",
    "1←2←3←4",
    "1←3 2←4",
    "1 2←(3 4)",
    "1 2←3←4",
    "(1 2)←3←4",
    "(1 2)←(3 4)",
    "1 2 3←4",
    "(1 2 3)←4",
    "1 2 3 4",
];

/// One-based operator numbers modulating each operator, per algorithm.
pub const OPERATOR_MODULATED_BY: [[&[usize]; 4]; 13] = [
    [&[2, 3, 4], &[], &[], &[]],
    [&[2, 3], &[], &[4], &[]],
    [&[2], &[3, 4], &[], &[]],
    [&[2, 3], &[4], &[4], &[]],
    [&[2], &[3], &[4], &[]],
    [&[3], &[4], &[], &[]],
    [&[], &[3, 4], &[], &[]],
    [&[], &[3], &[4], &[]],
    [&[3], &[3], &[4], &[]],
    [&[3, 4], &[3, 4], &[], &[]],
    [&[], &[], &[4], &[]],
    [&[4], &[4], &[4], &[]],
    [&[], &[], &[], &[]],
];

/// One-based carrier each operator's pitch follows, per algorithm.
pub const OPERATOR_ASSOCIATED_CARRIER: [[usize; 4]; 13] = [
    [1, 1, 1, 1],
    [1, 1, 1, 1],
    [1, 1, 1, 1],
    [1, 1, 1, 1],
    [1, 1, 1, 1],
    [1, 2, 1, 2],
    [1, 2, 2, 2],
    [1, 2, 2, 2],
    [1, 2, 2, 2],
    [1, 2, 2, 2],
    [1, 2, 3, 3],
    [1, 2, 3, 3],
    [1, 2, 3, 4],
];
pub const OPERATOR_CARRIER_COUNTS: [usize; 13] = [1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 3, 3, 4];
pub const OPERATOR_CARRIER_CHORUS: [f64; 4] = [0.0, 0.04, -0.073, 0.091];

pub const OPERATOR_FREQUENCY_NAMES: [&str; 15] = [
    "1×", "~1×", "2×", "~2×", "3×", "4×", "5×", "6×", "7×", "8×", "9×", "11×", "13×", "16×", "20×",
];
pub const OPERATOR_FREQUENCIES: [f64; 15] = [
    1.0, 1.0, 2.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 11.0, 13.0, 16.0, 20.0,
];
pub const OPERATOR_HZ_OFFSETS: [f64; 15] = [
    0.0, 1.5, 0.0, -1.3, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
];
pub const OPERATOR_AMPLITUDE_SIGNS: [f64; 15] = [
    1.0, -1.0, 1.0, -1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0,
];

/// Shape family of an operator envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Follows the note's own volume pins.
    Custom,
    Steady,
    Punch,
    Flare,
    /// Decaying curve; swells are the inverted form.
    Decay,
    Tremolo,
}

pub const OPERATOR_ENVELOPE_NAMES: [&str; 15] = [
    "custom", "steady", "punch", "flare 1", "flare 2", "flare 3", "pluck 1", "pluck 2", "pluck 3",
    "swell 1", "swell 2", "swell 3", "tremolo1", "tremolo2", "tremolo3",
];
pub const OPERATOR_ENVELOPE_KINDS: [EnvelopeKind; 15] = {
    use EnvelopeKind::*;
    [
        Custom, Steady, Punch, Flare, Flare, Flare, Decay, Decay, Decay, Decay, Decay, Decay,
        Tremolo, Tremolo, Tremolo,
    ]
};
pub const OPERATOR_ENVELOPE_SPEEDS: [f64; 15] = [
    0.0, 0.0, 0.0, 32.0, 8.0, 2.0, 32.0, 8.0, 2.0, 32.0, 8.0, 2.0, 4.0, 2.0, 1.0,
];
pub const OPERATOR_ENVELOPE_INVERTED: [bool; 15] = [F, F, F, F, F, F, F, F, F, T, T, T, F, F, F];

pub const FEEDBACK_NAMES: [&str; 18] = [
    "1⟲",
    "2⟲",
    "3⟲",
    "4⟲",
    "1⟲ 2⟲",
    "3⟲ 4⟲",
    "1⟲ 2⟲ 3⟲",
    "2⟲ 3⟲ 4⟲",
    "1⟲ 2⟲ 3⟲ 4⟲",
    "1→2",
    "1→3",
    "1→4",
    "2→3",
    "2→4",
    "3→4",
    "1→3 2→4",
    "1→4 2→3",
    "1→2→3→4",
];

/// One-based operator numbers whose previous output feeds each operator.
pub const OPERATOR_FEEDBACK_INDICES: [[&[usize]; 4]; 18] = [
    [&[1], &[], &[], &[]],
    [&[], &[2], &[], &[]],
    [&[], &[], &[3], &[]],
    [&[], &[], &[], &[4]],
    [&[1], &[2], &[], &[]],
    [&[], &[], &[3], &[4]],
    [&[1], &[2], &[3], &[]],
    [&[], &[2], &[3], &[4]],
    [&[1], &[2], &[3], &[4]],
    [&[], &[1], &[], &[]],
    [&[], &[], &[1], &[]],
    [&[], &[], &[], &[1]],
    [&[], &[], &[2], &[]],
    [&[], &[], &[], &[2]],
    [&[], &[], &[], &[3]],
    [&[], &[], &[1], &[2]],
    [&[], &[], &[2], &[1]],
    [&[], &[1], &[2], &[3]],
];

pub const INSTRUMENT_TYPE_NAMES: [&str; 3] = ["chip", "FM", "noise"];

// ── Sine table ──────────────────────────────────────────────

pub const SINE_WAVE_LENGTH: usize = 1 << 8;
pub const SINE_WAVE_MASK: usize = SINE_WAVE_LENGTH - 1;

/// Whether `pitch` lands on a note the scale allows.
pub fn scale_allows(scale: usize, pitch: i32) -> bool {
    SCALE_FLAGS
        .get(scale)
        .is_some_and(|flags| flags[pitch.rem_euclid(12) as usize])
}
