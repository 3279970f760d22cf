//! Error types for decoding, encoding, and synthesis.
//!
//! Decoding failures carry the character offset into the song string so a
//! host can point at the damage with [`DecodeError::report`].

use ariadne::{Config, Label, Report, ReportKind, Source};

/// A song string or JSON document that could not be read.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("bit stream ended early at character {offset}")]
    Truncated { offset: usize },
    #[error("song string ended early at character {offset}")]
    UnexpectedEnd { offset: usize },
    #[error("invalid character {ch:?} at offset {offset}")]
    InvalidCharacter { ch: char, offset: usize },
    #[error("channel {channel} does not exist (offset {offset})")]
    ChannelOutOfRange { channel: usize, offset: usize },
    #[error("instrument tag at offset {offset} has no instrument slot left")]
    InstrumentOutOfRange { offset: usize },
    #[error("recent {kind} index {index} is empty (offset {offset})")]
    RecentIndexOutOfRange {
        kind: &'static str,
        index: usize,
        offset: usize,
    },
    #[error("variable-length integer too long at character {offset}")]
    LongTailOverflow { offset: usize },
    #[error("invalid song JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl DecodeError {
    /// Character offset into the decoded text, when the error has one.
    pub fn offset(&self) -> Option<usize> {
        match self {
            DecodeError::Truncated { offset }
            | DecodeError::UnexpectedEnd { offset }
            | DecodeError::InvalidCharacter { offset, .. }
            | DecodeError::ChannelOutOfRange { offset, .. }
            | DecodeError::InstrumentOutOfRange { offset }
            | DecodeError::RecentIndexOutOfRange { offset, .. }
            | DecodeError::LongTailOverflow { offset } => Some(*offset),
            DecodeError::Json(_) => None,
        }
    }

    /// Render a plain-text diagnostic pointing at the offending character.
    pub fn report(&self, source: &str) -> String {
        let Some(offset) = self.offset() else {
            return self.to_string();
        };
        let len = source.chars().count();
        let start = offset.min(len);
        let span = start..(start + 1).min(len);

        let mut out = Vec::new();
        let written = Report::build(ReportKind::Error, span.clone())
            .with_config(Config::default().with_color(false))
            .with_message(self.to_string())
            .with_label(Label::new(span).with_message("decoding stopped here"))
            .finish()
            .write(Source::from(source), &mut out);
        match written {
            Ok(()) => String::from_utf8_lossy(&out).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

/// A song that cannot be written to the compact string format.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("value {value} is below the long-tail minimum {min}")]
    BelowMinimum { value: i64, min: i64 },
    #[error("{field} value {value} does not fit in {bits} bits")]
    FieldOverflow {
        field: &'static str,
        value: i64,
        bits: u32,
    },
    #[error("{0} parts per beat is not a supported rhythm")]
    UnsupportedRhythm(usize),
    #[error("encoded song is {0} characters, the limit is 65535")]
    TooLong(usize),
}

/// An instrument whose settings point outside the synthesis tables.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("unknown {table} index {index} on channel {channel}")]
    UnknownIndex {
        table: &'static str,
        index: usize,
        channel: usize,
    },
    #[error("channel {channel} has no instrument {instrument}")]
    MissingInstrument { channel: usize, instrument: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

pub type Result<T> = std::result::Result<T, Error>;
