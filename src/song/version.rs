//! Song string format versions and the decoding rules each one implies.
//!
//! Every rule that changed between versions is a method here, so the
//! decoder never compares version numbers directly.

use crate::config;

/// Where per-instrument settings live in the tag stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentLayout {
    /// `<tag><channel><value>`, applied to the channel's first instrument.
    PerChannel,
    /// `<tag>` followed by one value per instrument of every channel.
    PerSong,
    /// `T<type>` opens the next instrument; later tags apply to it.
    PerInstrument,
}

/// How bar references are packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarLayout {
    /// `b<channel><count>` then 3-bit one-based references for that channel.
    PerChannel,
    /// Every channel, one-based references sized for `patterns` values.
    OneBased,
    /// Every channel, zero meaning silence, sized for `patterns + 1` values.
    ZeroBased,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FormatVersion {
    V2,
    V3,
    V4,
    V5,
    V6,
}

impl FormatVersion {
    pub const OLDEST: FormatVersion = FormatVersion::V2;
    pub const LATEST: FormatVersion = FormatVersion::V6;

    pub fn from_number(number: usize) -> Option<Self> {
        match number {
            2 => Some(FormatVersion::V2),
            3 => Some(FormatVersion::V3),
            4 => Some(FormatVersion::V4),
            5 => Some(FormatVersion::V5),
            6 => Some(FormatVersion::V6),
            _ => None,
        }
    }

    pub fn number(self) -> usize {
        match self {
            FormatVersion::V2 => 2,
            FormatVersion::V3 => 3,
            FormatVersion::V4 => 4,
            FormatVersion::V5 => 5,
            FormatVersion::V6 => 6,
        }
    }

    pub fn instrument_layout(self) -> InstrumentLayout {
        match self {
            FormatVersion::V2 => InstrumentLayout::PerChannel,
            FormatVersion::V3 | FormatVersion::V4 | FormatVersion::V5 => InstrumentLayout::PerSong,
            FormatVersion::V6 => InstrumentLayout::PerInstrument,
        }
    }

    pub fn bar_layout(self) -> BarLayout {
        match self {
            FormatVersion::V2 => BarLayout::PerChannel,
            FormatVersion::V3 | FormatVersion::V4 => BarLayout::OneBased,
            FormatVersion::V5 | FormatVersion::V6 => BarLayout::ZeroBased,
        }
    }

    /// Instrument types follow the channel kind instead of a `T` tag.
    pub fn types_follow_channel(self) -> bool {
        self < FormatVersion::V6
    }

    /// Only one channel per `p` block, and no per-pattern "has notes" bit.
    pub fn single_channel_patterns(self) -> bool {
        self < FormatVersion::V3
    }

    /// Octaves come as `<channel><value>` pairs.
    pub fn per_channel_octaves(self) -> bool {
        self < FormatVersion::V3
    }

    /// Loop start and length are single characters, length stored as-is.
    pub fn short_loop_fields(self) -> bool {
        self < FormatVersion::V5
    }

    /// Defaults every instrument to seamless transitions and the first drum to retro.
    pub fn legacy_instrument_defaults(self) -> bool {
        self < FormatVersion::V3
    }

    pub fn scale(self, code: usize) -> usize {
        if self < FormatVersion::V3 && code == 10 {
            11
        } else {
            code
        }
    }

    pub fn tempo(self, code: usize) -> i64 {
        if self < FormatVersion::V4 {
            [1, 4, 7, 10].get(code).copied().unwrap_or(config::TEMPO_STEPS as i64)
        } else {
            code as i64
        }
    }

    pub fn beats_per_bar(self, code: usize) -> usize {
        if self < FormatVersion::V3 {
            [6, 7, 8, 9, 10]
                .get(code)
                .copied()
                .unwrap_or(config::BEATS_PER_BAR_MAX)
        } else {
            code + 1
        }
    }

    /// Map a stored filter code onto the current filter table.
    pub fn filter(self, code: usize) -> usize {
        let last = config::FILTER_NAMES.len() - 1;
        match self.instrument_layout() {
            InstrumentLayout::PerChannel => [1, 3, 4, 5].get(code.min(last)).copied().unwrap_or(5),
            InstrumentLayout::PerSong => (code + 1).min(last),
            InstrumentLayout::PerInstrument => code.min(last),
        }
    }

    /// Map a stored effect code onto the current effect table.
    pub fn effect(self, code: usize) -> usize {
        let effect = code.min(config::EFFECT_NAMES.len() - 1);
        if self.instrument_layout() == InstrumentLayout::PerChannel {
            match effect {
                1 => 3,
                3 => 5,
                other => other,
            }
        } else {
            effect
        }
    }
}
