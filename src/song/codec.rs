//! Compact song string codec.
//!
//! Layout: `<version>` then tagged header fields (`n s k l e t m a g j i r o`),
//! one `T<type>` block per instrument, `b` + packed bar references, and `p`
//! + length-prefixed pattern bits. Pattern bits code each pitch and each pin
//! shape against a most-recently-used history, see [`super::history`].

use super::history::{RecentHistory, RECENT_SHAPE_CAPACITY, recent_pitches};
use super::version::{BarLayout, FormatVersion, InstrumentLayout};
use super::{Instrument, InstrumentType, Note, NotePin, Song, clip};
use crate::bitfield::{BitFieldReader, BitFieldWriter, base64_char, base64_value};
use crate::config;
use crate::error::{CodecError, DecodeError};

/// Longest song string the format allows.
pub const MAX_ENCODED_LENGTH: usize = 65535;

/// Smallest bit width able to hold `count` distinct values.
fn bits_for(count: usize) -> u32 {
    let mut bits = 0;
    while (1usize << bits) < count {
        bits += 1;
    }
    bits
}

fn push_value(out: &mut String, field: &'static str, value: usize) -> Result<(), CodecError> {
    out.push(base64_char(field, value)?);
    Ok(())
}

fn write_field(
    bits: &mut BitFieldWriter,
    field: &'static str,
    bit_count: u32,
    value: usize,
) -> Result<(), CodecError> {
    if value >> bit_count != 0 {
        return Err(CodecError::FieldOverflow {
            field,
            value: value as i64,
            bits: bit_count,
        });
    }
    bits.write(bit_count, value);
    Ok(())
}

// ── Encoding ────────────────────────────────────────────────

impl Song {
    /// Encode with the latest format version. The result carries no leading `#`.
    pub fn to_base64_string(&self) -> Result<String, CodecError> {
        let mut out = String::new();
        push_value(&mut out, "version", FormatVersion::LATEST.number())?;

        out.push('n');
        push_value(&mut out, "pitch channels", self.pitch_channel_count)?;
        push_value(&mut out, "drum channels", self.drum_channel_count)?;
        out.push('s');
        push_value(&mut out, "scale", self.scale)?;
        out.push('k');
        push_value(&mut out, "key", self.key)?;
        out.push('l');
        push_value(&mut out, "loop start", self.loop_start >> 6)?;
        push_value(&mut out, "loop start", self.loop_start & 0x3f)?;
        let loop_length = self.loop_length.saturating_sub(1);
        out.push('e');
        push_value(&mut out, "loop length", loop_length >> 6)?;
        push_value(&mut out, "loop length", loop_length & 0x3f)?;
        out.push('t');
        push_value(&mut out, "tempo", self.tempo)?;
        out.push('m');
        push_value(&mut out, "reverb", self.reverb)?;
        out.push('a');
        push_value(&mut out, "beats per bar", self.beats_per_bar.saturating_sub(1))?;
        let bars = self.bar_count.saturating_sub(1);
        out.push('g');
        push_value(&mut out, "bar count", bars >> 6)?;
        push_value(&mut out, "bar count", bars & 0x3f)?;
        out.push('j');
        push_value(&mut out, "patterns", self.patterns_per_channel.saturating_sub(1))?;
        out.push('i');
        push_value(&mut out, "instruments", self.instruments_per_channel.saturating_sub(1))?;
        let rhythm = config::PART_COUNTS
            .iter()
            .position(|&p| p == self.parts_per_beat)
            .ok_or(CodecError::UnsupportedRhythm(self.parts_per_beat))?;
        out.push('r');
        push_value(&mut out, "rhythm", rhythm)?;
        out.push('o');
        for channel in self.channels.iter().take(self.channel_count()) {
            push_value(&mut out, "octave", channel.octave)?;
        }

        for channel in self.channels.iter().take(self.channel_count()) {
            for instrument in channel.instruments.iter().take(self.instruments_per_channel) {
                encode_instrument(&mut out, instrument)?;
            }
        }

        out.push('b');
        let mut bits = BitFieldWriter::new();
        let bar_bits = bits_for(self.patterns_per_channel + 1);
        for channel in self.channels.iter().take(self.channel_count()) {
            for bar in 0..self.bar_count {
                let value = channel.bars.get(bar).copied().unwrap_or(0);
                write_field(&mut bits, "bar", bar_bits, value)?;
            }
        }
        bits.encode_base64(&mut out);

        out.push('p');
        let mut bits = BitFieldWriter::new();
        for channel in 0..self.channel_count() {
            bits.concat(&self.encode_channel_patterns(channel)?);
        }
        let mut length = bits.length_base64();
        let mut digits = Vec::new();
        while length > 0 {
            digits.push(base64_char("pattern length", length & 0x3f)?);
            length >>= 6;
        }
        push_value(&mut out, "pattern length digits", digits.len())?;
        out.extend(digits.iter().rev());
        bits.encode_base64(&mut out);

        if out.len() >= MAX_ENCODED_LENGTH {
            return Err(CodecError::TooLong(out.len()));
        }
        Ok(out)
    }

    /// Pattern bits for one channel, history-coded against its own seeds.
    pub(crate) fn encode_channel_patterns(&self, channel_index: usize) -> Result<BitFieldWriter, CodecError> {
        let mut bits = BitFieldWriter::new();
        let Some(channel) = self.channels.get(channel_index) else {
            return Ok(bits);
        };
        let instrument_bits = bits_for(self.instruments_per_channel);
        let (mut recent_pitches, mut last_pitch) =
            recent_pitches(self.channel_is_drum(channel_index), channel.octave);
        let mut recent_shapes: RecentHistory<BitFieldWriter> = RecentHistory::new(RECENT_SHAPE_CAPACITY);
        let parts_per_bar = self.parts_per_bar();

        for pattern in channel.patterns.iter().take(self.patterns_per_channel) {
            write_field(&mut bits, "pattern instrument", instrument_bits, pattern.instrument)?;
            if pattern.notes.is_empty() {
                bits.write(1, 0);
                continue;
            }
            bits.write(1, 1);

            let mut cur_part = 0;
            for note in &pattern.notes {
                if note.start > cur_part {
                    bits.write(2, 0);
                    bits.write_part_duration(note.start - cur_part)?;
                }

                let (shape_bits, pitch_bends) = encode_shape(note)?;
                match recent_shapes.position(&shape_bits) {
                    None => {
                        bits.write(2, 1);
                        bits.concat(&shape_bits);
                    }
                    Some(index) => {
                        bits.write(1, 1);
                        bits.write_long_tail(0, 0, index)?;
                        recent_shapes.take(index);
                    }
                }
                recent_shapes.promote(shape_bits);

                let all_pitches = note.pitches.iter().chain(pitch_bends.iter()).copied();
                for (i, pitch) in all_pitches.enumerate() {
                    match recent_pitches.position(&pitch) {
                        Some(index) => {
                            bits.write(1, 1);
                            bits.write(3, index);
                            recent_pitches.take(index);
                        }
                        None => {
                            // Count only the steps the history cannot already name.
                            let mut interval = 0;
                            let mut iter = last_pitch;
                            while iter != pitch {
                                let step = if iter < pitch { 1 } else { -1 };
                                iter += step;
                                if !recent_pitches.contains(&iter) {
                                    interval += step;
                                }
                            }
                            bits.write(1, 0);
                            bits.write_pitch_interval(interval)?;
                        }
                    }
                    recent_pitches.promote(pitch);
                    last_pitch = if i == note.pitches.len() - 1 {
                        note.pitches[0]
                    } else {
                        pitch
                    };
                }
                cur_part = note.end;
            }

            if cur_part < parts_per_bar {
                bits.write(2, 0);
                bits.write_part_duration(parts_per_bar - cur_part)?;
            }
        }
        Ok(bits)
    }
}

fn encode_instrument(out: &mut String, instrument: &Instrument) -> Result<(), CodecError> {
    out.push('T');
    push_value(out, "instrument type", instrument.kind.index())?;
    match instrument.kind {
        InstrumentType::Chip => {
            for (tag, field, value) in [
                ('w', "wave", instrument.wave),
                ('f', "filter", instrument.filter),
                ('d', "transition", instrument.transition),
                ('c', "effect", instrument.effect),
                ('h', "chorus", instrument.chorus),
                ('v', "volume", instrument.volume),
            ] {
                out.push(tag);
                push_value(out, field, value)?;
            }
        }
        InstrumentType::Fm => {
            for (tag, field, value) in [
                ('d', "transition", instrument.transition),
                ('c', "effect", instrument.effect),
                ('A', "algorithm", instrument.algorithm),
                ('F', "feedback type", instrument.feedback_type),
                ('B', "feedback amplitude", instrument.feedback_amplitude),
                ('V', "feedback envelope", instrument.feedback_envelope),
            ] {
                out.push(tag);
                push_value(out, field, value)?;
            }
            out.push('Q');
            for op in &instrument.operators {
                push_value(out, "operator frequency", op.frequency)?;
            }
            out.push('P');
            for op in &instrument.operators {
                push_value(out, "operator amplitude", op.amplitude)?;
            }
            out.push('E');
            for op in &instrument.operators {
                push_value(out, "operator envelope", op.envelope)?;
            }
        }
        InstrumentType::Noise => {
            for (tag, field, value) in [
                ('w', "wave", instrument.wave),
                ('d', "transition", instrument.transition),
                ('v', "volume", instrument.volume),
            ] {
                out.push(tag);
                push_value(out, field, value)?;
            }
        }
    }
    Ok(())
}

/// Shape bits of a note plus the absolute pitch of every bend it introduces.
fn encode_shape(note: &Note) -> Result<(BitFieldWriter, Vec<i32>), CodecError> {
    let pitch_count = note.pitches.len();
    if !(1..=config::MAX_PITCHES_PER_NOTE).contains(&pitch_count) {
        return Err(CodecError::FieldOverflow {
            field: "pitch count",
            value: pitch_count as i64,
            bits: 2,
        });
    }
    let first_pin = note.pins.first().ok_or(CodecError::BelowMinimum { value: 0, min: 1 })?;

    let mut shape = BitFieldWriter::new();
    for _ in 1..pitch_count {
        shape.write(1, 1);
    }
    if pitch_count < config::MAX_PITCHES_PER_NOTE {
        shape.write(1, 0);
    }
    shape.write_pin_count(note.pins.len() - 1)?;
    write_field(&mut shape, "pin volume", 2, first_pin.volume as usize)?;

    let start_pitch = note.pitches[0];
    let mut current_pitch = start_pitch;
    let mut shape_part = 0;
    let mut pitch_bends = Vec::new();
    for pin in &note.pins[1..] {
        let next_pitch = start_pitch + pin.interval;
        if next_pitch != current_pitch {
            shape.write(1, 1);
            pitch_bends.push(next_pitch);
            current_pitch = next_pitch;
        } else {
            shape.write(1, 0);
        }
        shape.write_part_duration(pin.time.saturating_sub(shape_part))?;
        shape_part = pin.time;
        write_field(&mut shape, "pin volume", 2, pin.volume as usize)?;
    }
    Ok((shape, pitch_bends))
}

// ── Decoding ────────────────────────────────────────────────

/// Character cursor over the song string.
struct Cursor<'a> {
    chars: &'a [char],
    index: usize,
}

impl<'a> Cursor<'a> {
    fn is_done(&self) -> bool {
        self.index >= self.chars.len()
    }

    fn next_char(&mut self) -> Option<char> {
        let ch = self.chars.get(self.index).copied();
        self.index += 1;
        ch
    }

    fn value(&mut self) -> Result<usize, DecodeError> {
        let offset = self.index;
        let ch = self
            .next_char()
            .ok_or(DecodeError::UnexpectedEnd { offset })?;
        base64_value(ch)
            .map(usize::from)
            .ok_or(DecodeError::InvalidCharacter { ch, offset })
    }

    fn skip(&mut self, count: usize) {
        self.index += count;
    }
}

/// A note shape as remembered by the decoder.
#[derive(Debug, Clone, PartialEq)]
struct Shape {
    pitch_count: usize,
    bend_count: usize,
    initial_volume: u8,
    length: usize,
    pins: Vec<ShapePin>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ShapePin {
    pitch_bend: bool,
    time: usize,
    volume: u8,
}

/// Position of the `T` tag iterator.
#[derive(Debug, Clone, Copy)]
struct InstrumentCursor {
    channel: usize,
    index: Option<usize>,
}

impl Song {
    /// Decode a song string of any supported version, or a JSON document.
    ///
    /// Leading whitespace and a `#` are skipped. An empty string, or one with
    /// an unsupported version, yields the default song.
    pub fn from_base64_string(text: &str) -> Result<Song, DecodeError> {
        let chars: Vec<char> = text.chars().collect();
        let mut cursor = Cursor {
            chars: &chars,
            index: 0,
        };
        while cursor.chars.get(cursor.index).is_some_and(|&c| c <= ' ') {
            cursor.skip(1);
        }
        if cursor.chars.get(cursor.index) == Some(&'#') {
            cursor.skip(1);
        }
        match cursor.chars.get(cursor.index) {
            None => return Ok(Song::default()),
            Some('{') => {
                let json: String = chars[cursor.index..].iter().collect();
                return Song::from_json_str(&json);
            }
            Some(_) => {}
        }

        let version_char = chars[cursor.index];
        cursor.skip(1);
        let version = base64_value(version_char).and_then(|v| FormatVersion::from_number(v as usize));
        let Some(version) = version else {
            log::warn!("song string has unsupported version {version_char:?}, using the default song");
            return Ok(Song::default());
        };
        log::debug!("decoding song string version {}", version.number());

        let mut song = Song::default();
        if version.legacy_instrument_defaults() {
            for channel in &mut song.channels {
                channel.instruments[0].transition = 0;
            }
            if let Some(drums) = song.channels.get_mut(3) {
                drums.instruments[0].wave = 0;
            }
        }

        let mut instrument_cursor = InstrumentCursor {
            channel: 0,
            index: None,
        };
        while !cursor.is_done() {
            let offset = cursor.index;
            let Some(command) = cursor.next_char() else {
                break;
            };
            match command {
                'n' => {
                    let pitch = cursor.value()? as i64;
                    let drum = cursor.value()? as i64;
                    song.pitch_channel_count = clip(
                        config::PITCH_CHANNEL_COUNT_MIN as i64,
                        config::PITCH_CHANNEL_COUNT_MAX as i64 + 1,
                        pitch,
                    ) as usize;
                    song.drum_channel_count = clip(
                        config::DRUM_CHANNEL_COUNT_MIN as i64,
                        config::DRUM_CHANNEL_COUNT_MAX as i64 + 1,
                        drum,
                    ) as usize;
                    fit_channels(&mut song);
                }
                's' => {
                    let scale = version.scale(cursor.value()?);
                    song.scale = scale.min(config::SCALE_NAMES.len() - 1);
                }
                'k' => {
                    song.key = cursor.value()?.min(config::KEY_NAMES.len() - 1);
                }
                'l' => {
                    song.loop_start = if version.short_loop_fields() {
                        cursor.value()?
                    } else {
                        (cursor.value()? << 6) + cursor.value()?
                    };
                }
                'e' => {
                    song.loop_length = if version.short_loop_fields() {
                        cursor.value()?
                    } else {
                        (cursor.value()? << 6) + cursor.value()? + 1
                    };
                }
                't' => {
                    let tempo = version.tempo(cursor.value()?);
                    song.tempo = clip(0, config::TEMPO_STEPS as i64, tempo) as usize;
                }
                'm' => {
                    let reverb = cursor.value()? as i64;
                    song.reverb = clip(0, config::REVERB_RANGE as i64, reverb) as usize;
                }
                'a' => {
                    song.beats_per_bar = version
                        .beats_per_bar(cursor.value()?)
                        .clamp(config::BEATS_PER_BAR_MIN, config::BEATS_PER_BAR_MAX);
                }
                'g' => {
                    let bars = (cursor.value()? << 6) + cursor.value()? + 1;
                    song.bar_count = bars.clamp(config::BAR_COUNT_MIN, config::BAR_COUNT_MAX);
                    song.resize_bars();
                }
                'j' => {
                    song.patterns_per_channel = (cursor.value()? + 1).clamp(
                        config::PATTERNS_PER_CHANNEL_MIN,
                        config::PATTERNS_PER_CHANNEL_MAX,
                    );
                    song.resize_patterns();
                }
                'i' => {
                    song.instruments_per_channel = (cursor.value()? + 1).clamp(
                        config::INSTRUMENTS_PER_CHANNEL_MIN,
                        config::INSTRUMENTS_PER_CHANNEL_MAX,
                    );
                    song.resize_instruments();
                    if version.types_follow_channel() {
                        for index in 0..song.channel_count() {
                            let kind = InstrumentType::for_channel(song.channel_is_drum(index));
                            for instrument in &mut song.channels[index].instruments {
                                instrument.set_type_and_reset(kind);
                            }
                        }
                    }
                }
                'r' => {
                    let index = cursor.value()?.min(config::PART_COUNTS.len() - 1);
                    song.parts_per_beat = config::PART_COUNTS[index];
                }
                'o' => {
                    let octave = |v: usize| clip(0, config::OCTAVE_MAX as i64 + 1, v as i64) as usize;
                    if version.per_channel_octaves() {
                        let channel = cursor.value()?;
                        let value = octave(cursor.value()?);
                        channel_mut(&mut song, channel, offset)?.octave = value;
                    } else {
                        for index in 0..song.channel_count() {
                            song.channels[index].octave = octave(cursor.value()?);
                        }
                    }
                }
                'T' => {
                    let next = match instrument_cursor.index {
                        None => 0,
                        Some(i) => i + 1,
                    };
                    if next >= song.instruments_per_channel {
                        instrument_cursor.channel += 1;
                        instrument_cursor.index = Some(0);
                    } else {
                        instrument_cursor.index = Some(next);
                    }
                    let code = clip(0, InstrumentType::ALL.len() as i64, cursor.value()? as i64);
                    let kind = InstrumentType::from_index(code as usize).unwrap_or_default();
                    current_instrument(&mut song, instrument_cursor, offset)?.set_type_and_reset(kind);
                }
                'w' => {
                    apply_setting(&mut song, version, &mut cursor, instrument_cursor, offset, |inst, code, is_drum, layout| {
                        let len = if is_drum && layout != InstrumentLayout::PerChannel {
                            config::DRUM_NAMES.len()
                        } else {
                            config::WAVE_NAMES.len()
                        };
                        inst.wave = clip(0, len as i64, code as i64) as usize;
                    })?;
                }
                'f' => {
                    apply_setting(&mut song, version, &mut cursor, instrument_cursor, offset, |inst, code, _, _| {
                        inst.filter = version.filter(code);
                    })?;
                }
                'd' => {
                    apply_setting(&mut song, version, &mut cursor, instrument_cursor, offset, |inst, code, _, _| {
                        inst.transition = code.min(config::TRANSITION_NAMES.len() - 1);
                    })?;
                }
                'c' => {
                    apply_setting(&mut song, version, &mut cursor, instrument_cursor, offset, |inst, code, _, _| {
                        inst.effect = version.effect(code);
                    })?;
                }
                'h' => {
                    apply_setting(&mut song, version, &mut cursor, instrument_cursor, offset, |inst, code, _, _| {
                        inst.chorus = code.min(config::CHORUS_NAMES.len() - 1);
                    })?;
                }
                'v' => {
                    apply_setting(&mut song, version, &mut cursor, instrument_cursor, offset, |inst, code, _, _| {
                        inst.volume = code.min(config::VOLUME_NAMES.len() - 1);
                    })?;
                }
                'A' => {
                    let value = cursor.value()?.min(config::ALGORITHM_NAMES.len() - 1);
                    current_instrument(&mut song, instrument_cursor, offset)?.algorithm = value;
                }
                'F' => {
                    let value = cursor.value()?.min(config::FEEDBACK_NAMES.len() - 1);
                    current_instrument(&mut song, instrument_cursor, offset)?.feedback_type = value;
                }
                'B' => {
                    let value = cursor.value()?.min(config::OPERATOR_AMPLITUDE_MAX);
                    current_instrument(&mut song, instrument_cursor, offset)?.feedback_amplitude = value;
                }
                'V' => {
                    let value = cursor.value()?.min(config::OPERATOR_ENVELOPE_NAMES.len() - 1);
                    current_instrument(&mut song, instrument_cursor, offset)?.feedback_envelope = value;
                }
                'Q' | 'P' | 'E' => {
                    let mut values = [0usize; config::OPERATOR_COUNT];
                    for value in &mut values {
                        *value = cursor.value()?;
                    }
                    let instrument = current_instrument(&mut song, instrument_cursor, offset)?;
                    for (op, value) in instrument.operators.iter_mut().zip(values) {
                        match command {
                            'Q' => op.frequency = value.min(config::OPERATOR_FREQUENCIES.len() - 1),
                            'P' => op.amplitude = value.min(config::OPERATOR_AMPLITUDE_MAX),
                            _ => op.envelope = value.min(config::OPERATOR_ENVELOPE_NAMES.len() - 1),
                        }
                    }
                }
                'b' => decode_bars(&mut song, version, &mut cursor, offset)?,
                'p' => decode_patterns(&mut song, version, &mut cursor, offset)?,
                other => {
                    log::debug!("skipping unknown song tag {other:?} at offset {offset}");
                }
            }
        }
        Ok(song)
    }
}

/// Bring channel-indexed arrays in line with the channel counts.
fn fit_channels(song: &mut Song) {
    let old = song.channels.len();
    song.resize_channels();
    song.resize_bars();
    song.resize_patterns();
    song.resize_instruments();
    for index in old..song.channel_count() {
        let kind = InstrumentType::for_channel(song.channel_is_drum(index));
        for instrument in &mut song.channels[index].instruments {
            instrument.set_type_and_reset(kind);
        }
    }
}

fn channel_mut(song: &mut Song, channel: usize, offset: usize) -> Result<&mut super::Channel, DecodeError> {
    song.channels
        .get_mut(channel)
        .ok_or(DecodeError::ChannelOutOfRange { channel, offset })
}

fn current_instrument(
    song: &mut Song,
    cursor: InstrumentCursor,
    offset: usize,
) -> Result<&mut Instrument, DecodeError> {
    cursor
        .index
        .and_then(|index| song.channels.get_mut(cursor.channel)?.instruments.get_mut(index))
        .ok_or(DecodeError::InstrumentOutOfRange { offset })
}

/// Route one chip/noise setting tag to the instruments its version targets.
fn apply_setting(
    song: &mut Song,
    version: FormatVersion,
    cursor: &mut Cursor<'_>,
    instrument_cursor: InstrumentCursor,
    offset: usize,
    apply: impl Fn(&mut Instrument, usize, bool, InstrumentLayout),
) -> Result<(), DecodeError> {
    let layout = version.instrument_layout();
    match layout {
        InstrumentLayout::PerChannel => {
            let channel = cursor.value()?;
            let code = cursor.value()?;
            let is_drum = song.channel_is_drum(channel);
            let target = channel_mut(song, channel, offset)?
                .instruments
                .first_mut()
                .ok_or(DecodeError::InstrumentOutOfRange { offset })?;
            apply(target, code, is_drum, layout);
        }
        InstrumentLayout::PerSong => {
            for channel in 0..song.channel_count() {
                let is_drum = song.channel_is_drum(channel);
                for i in 0..song.instruments_per_channel {
                    let code = cursor.value()?;
                    apply(&mut song.channels[channel].instruments[i], code, is_drum, layout);
                }
            }
        }
        InstrumentLayout::PerInstrument => {
            let code = cursor.value()?;
            let is_drum = song.channel_is_drum(instrument_cursor.channel);
            let target = current_instrument(song, instrument_cursor, offset)?;
            apply(target, code, is_drum, layout);
        }
    }
    Ok(())
}

fn decode_bars(
    song: &mut Song,
    version: FormatVersion,
    cursor: &mut Cursor<'_>,
    offset: usize,
) -> Result<(), DecodeError> {
    match version.bar_layout() {
        BarLayout::PerChannel => {
            let channel = cursor.value()?;
            let bar_count = cursor.value()?;
            let length = bar_count.div_ceil(2);
            let mut bits = BitFieldReader::new(cursor.chars, cursor.index, cursor.index + length)?;
            let bars = &mut channel_mut(song, channel, offset)?.bars;
            for i in 0..bar_count {
                let value = bits.read(3)? + 1;
                if let Some(bar) = bars.get_mut(i) {
                    *bar = value;
                }
            }
            cursor.skip(length);
        }
        layout => {
            let (bar_bits, base) = match layout {
                BarLayout::OneBased => (bits_for(song.patterns_per_channel), 1),
                _ => (bits_for(song.patterns_per_channel + 1), 0),
            };
            let total_bits = song.channel_count() * song.bar_count * bar_bits as usize;
            let length = total_bits.div_ceil(6);
            let mut bits = BitFieldReader::new(cursor.chars, cursor.index, cursor.index + length)?;
            for channel in 0..song.channel_count() {
                for bar in 0..song.bar_count {
                    song.channels[channel].bars[bar] = bits.read(bar_bits)? + base;
                }
            }
            cursor.skip(length);
        }
    }
    Ok(())
}

fn decode_patterns(
    song: &mut Song,
    version: FormatVersion,
    cursor: &mut Cursor<'_>,
    offset: usize,
) -> Result<(), DecodeError> {
    let mut channel;
    let mut length = 0usize;
    if version.single_channel_patterns() {
        channel = cursor.value()?;
        cursor.skip(1);
        length = (cursor.value()? << 6) + cursor.value()?;
    } else {
        channel = 0;
        let digits = cursor.value()?;
        for _ in 0..digits {
            length = (length << 6) + cursor.value()?;
        }
    }
    let mut bits = BitFieldReader::new(cursor.chars, cursor.index, cursor.index + length)?;
    cursor.skip(length);

    loop {
        if channel >= song.channels.len() {
            return Err(DecodeError::ChannelOutOfRange { channel, offset });
        }
        decode_channel_patterns(song, version, channel, &mut bits)?;
        if version.single_channel_patterns() {
            break;
        }
        channel += 1;
        if channel >= song.channel_count() {
            break;
        }
    }
    Ok(())
}

fn decode_channel_patterns(
    song: &mut Song,
    version: FormatVersion,
    channel_index: usize,
    bits: &mut BitFieldReader,
) -> Result<(), DecodeError> {
    let is_drum = song.channel_is_drum(channel_index);
    let instrument_bits = bits_for(song.instruments_per_channel);
    let parts_per_bar = song.parts_per_bar();
    let patterns_per_channel = song.patterns_per_channel;
    let channel = &mut song.channels[channel_index];
    let (mut recent_pitches, mut last_pitch) = recent_pitches(is_drum, channel.octave);
    let mut recent_shapes: RecentHistory<Shape> = RecentHistory::new(RECENT_SHAPE_CAPACITY);

    for pattern in channel.patterns.iter_mut().take(patterns_per_channel) {
        pattern.reset();
        pattern.instrument = bits.read(instrument_bits)?;
        if !version.single_channel_patterns() && bits.read(1)? == 0 {
            continue;
        }

        let mut cur_part = 0;
        while cur_part < parts_per_bar {
            let use_old_shape = bits.read(1)? == 1;
            let shape = if use_old_shape {
                let index = bits.read_long_tail(0, 0)?;
                recent_shapes
                    .take(index)
                    .ok_or(DecodeError::RecentIndexOutOfRange {
                        kind: "shape",
                        index,
                        offset: bits.error_offset(),
                    })?
            } else if bits.read(1)? == 1 {
                read_shape(bits)?
            } else {
                cur_part += bits.read_part_duration()?;
                continue;
            };
            recent_shapes.promote(shape.clone());

            let mut pitches = Vec::with_capacity(shape.pitch_count);
            let mut bend_pitches = Vec::with_capacity(shape.bend_count);
            for j in 0..shape.pitch_count + shape.bend_count {
                let pitch = if bits.read(1)? == 1 {
                    let index = bits.read(3)?;
                    recent_pitches
                        .take(index)
                        .ok_or(DecodeError::RecentIndexOutOfRange {
                            kind: "pitch",
                            index,
                            offset: bits.error_offset(),
                        })?
                } else {
                    let interval = bits.read_pitch_interval()?;
                    let step = interval.signum();
                    let mut pitch = last_pitch;
                    for _ in 0..interval.unsigned_abs() {
                        pitch += step;
                        while recent_pitches.contains(&pitch) {
                            pitch += step;
                        }
                    }
                    pitch
                };
                recent_pitches.promote(pitch);
                if j < shape.pitch_count {
                    pitches.push(pitch);
                } else {
                    bend_pitches.push(pitch);
                }
                last_pitch = if j + 1 == shape.pitch_count {
                    pitches[0]
                } else {
                    pitch
                };
            }

            let base = pitches[0];
            let mut pins = Vec::with_capacity(shape.pins.len() + 1);
            pins.push(NotePin::new(0, 0, shape.initial_volume));
            let mut current = base;
            let mut bends = bend_pitches.into_iter();
            for pin in &shape.pins {
                if pin.pitch_bend {
                    current = bends.next().unwrap_or(current);
                }
                pins.push(NotePin::new(current - base, pin.time, pin.volume));
            }

            let end = cur_part + shape.length;
            pattern.notes.push(Note {
                pitches,
                pins,
                start: cur_part,
                end,
            });
            cur_part = end;
        }
    }
    Ok(())
}

fn read_shape(bits: &mut BitFieldReader) -> Result<Shape, DecodeError> {
    let mut pitch_count = 1;
    while pitch_count < config::MAX_PITCHES_PER_NOTE && bits.read(1)? == 1 {
        pitch_count += 1;
    }
    let pin_count = bits.read_pin_count()?;
    let initial_volume = bits.read(2)? as u8;
    let mut pins = Vec::with_capacity(pin_count);
    let mut length = 0;
    let mut bend_count = 0;
    for _ in 0..pin_count {
        let pitch_bend = bits.read(1)? == 1;
        if pitch_bend {
            bend_count += 1;
        }
        length += bits.read_part_duration()?;
        pins.push(ShapePin {
            pitch_bend,
            time: length,
            volume: bits.read(2)? as u8,
        });
    }
    Ok(Shape {
        pitch_count,
        bend_count,
        initial_volume,
        length,
        pins,
    })
}
