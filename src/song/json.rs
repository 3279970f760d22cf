//! Human-readable JSON interchange.
//!
//! Export goes through typed documents so the same value serializes to a
//! JSON string or a plain JS object. Import walks a `serde_json::Value`
//! leniently: missing or out-of-range fields fall back to the nearest valid
//! value instead of failing.

use serde::Serialize;
use serde_json::Value;

use super::{Channel, Instrument, InstrumentType, Note, NotePin, Pattern, Song, clip};
use crate::config;
use crate::error::DecodeError;

pub const JSON_FORMAT: &str = "BeepBox";

// ── Export documents ────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongJson {
    pub format: &'static str,
    pub version: usize,
    pub scale: &'static str,
    pub key: &'static str,
    pub intro_bars: usize,
    pub loop_bars: usize,
    pub beats_per_bar: usize,
    pub ticks_per_beat: usize,
    pub beats_per_minute: u32,
    pub reverb: usize,
    pub channels: Vec<ChannelJson>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelJson {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub octave_scroll_bar: usize,
    pub instruments: Vec<InstrumentJson>,
    pub patterns: Vec<PatternJson>,
    pub sequence: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum InstrumentJson {
    #[serde(rename = "chip")]
    Chip {
        volume: i64,
        wave: &'static str,
        transition: &'static str,
        filter: &'static str,
        chorus: &'static str,
        effect: &'static str,
    },
    #[serde(rename = "FM")]
    Fm {
        transition: &'static str,
        effect: &'static str,
        algorithm: &'static str,
        feedback_type: &'static str,
        feedback_amplitude: usize,
        feedback_envelope: &'static str,
        operators: Vec<OperatorJson>,
    },
    #[serde(rename = "noise")]
    Noise {
        volume: i64,
        wave: &'static str,
        transition: &'static str,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct OperatorJson {
    pub frequency: &'static str,
    pub amplitude: usize,
    pub envelope: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatternJson {
    /// One-based.
    pub instrument: usize,
    pub notes: Vec<NoteJson>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoteJson {
    pub pitches: Vec<i32>,
    pub points: Vec<PointJson>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointJson {
    pub tick: usize,
    pub pitch_bend: i32,
    pub volume: u32,
}

fn name(table: &[&'static str], index: usize) -> &'static str {
    table.get(index).copied().unwrap_or("")
}

fn instrument_json(instrument: &Instrument) -> InstrumentJson {
    let volume = (5 - instrument.volume as i64) * 20;
    let transition = name(&config::TRANSITION_NAMES, instrument.transition);
    match instrument.kind {
        InstrumentType::Noise => InstrumentJson::Noise {
            volume,
            wave: name(&config::DRUM_NAMES, instrument.wave),
            transition,
        },
        InstrumentType::Chip => InstrumentJson::Chip {
            volume,
            wave: name(&config::WAVE_NAMES, instrument.wave),
            transition,
            filter: name(&config::FILTER_NAMES, instrument.filter),
            chorus: name(&config::CHORUS_NAMES, instrument.chorus),
            effect: name(&config::EFFECT_NAMES, instrument.effect),
        },
        InstrumentType::Fm => InstrumentJson::Fm {
            transition,
            effect: name(&config::EFFECT_NAMES, instrument.effect),
            algorithm: name(&config::ALGORITHM_NAMES, instrument.algorithm),
            feedback_type: name(&config::FEEDBACK_NAMES, instrument.feedback_type),
            feedback_amplitude: instrument.feedback_amplitude,
            feedback_envelope: name(&config::OPERATOR_ENVELOPE_NAMES, instrument.feedback_envelope),
            operators: instrument
                .operators
                .iter()
                .map(|op| OperatorJson {
                    frequency: name(&config::OPERATOR_FREQUENCY_NAMES, op.frequency),
                    amplitude: op.amplitude,
                    envelope: name(&config::OPERATOR_ENVELOPE_NAMES, op.envelope),
                })
                .collect(),
        },
    }
}

fn pattern_json(pattern: &Pattern) -> PatternJson {
    PatternJson {
        instrument: pattern.instrument + 1,
        notes: pattern
            .notes
            .iter()
            .map(|note| NoteJson {
                pitches: note.pitches.clone(),
                points: note
                    .pins
                    .iter()
                    .map(|pin| PointJson {
                        tick: pin.time + note.start,
                        pitch_bend: pin.interval,
                        volume: (pin.volume as f64 * 100.0 / 3.0).round() as u32,
                    })
                    .collect(),
            })
            .collect(),
    }
}

impl Song {
    /// Build the JSON document, unrolling the loop `loop_count` times into
    /// each channel's sequence.
    pub fn to_json_object(&self, enable_intro: bool, loop_count: usize, enable_outro: bool) -> SongJson {
        let loop_end = (self.loop_start + self.loop_length).min(self.bar_count);
        let channels = self
            .channels
            .iter()
            .take(self.channel_count())
            .enumerate()
            .map(|(index, channel)| {
                let mut sequence = Vec::new();
                if enable_intro {
                    sequence.extend_from_slice(&channel.bars[..self.loop_start.min(loop_end)]);
                }
                for _ in 0..loop_count {
                    sequence.extend_from_slice(&channel.bars[self.loop_start.min(loop_end)..loop_end]);
                }
                if enable_outro {
                    sequence.extend_from_slice(&channel.bars[loop_end..self.bar_count.min(channel.bars.len())]);
                }
                ChannelJson {
                    kind: if self.channel_is_drum(index) { "drum" } else { "pitch" },
                    octave_scroll_bar: channel.octave,
                    instruments: channel
                        .instruments
                        .iter()
                        .take(self.instruments_per_channel)
                        .map(instrument_json)
                        .collect(),
                    patterns: channel.patterns.iter().map(pattern_json).collect(),
                    sequence,
                }
            })
            .collect();

        SongJson {
            format: JSON_FORMAT,
            version: super::FormatVersion::LATEST.number(),
            scale: name(&config::SCALE_NAMES, self.scale),
            key: name(&config::KEY_NAMES, self.key),
            intro_bars: self.loop_start,
            loop_bars: self.loop_length,
            beats_per_bar: self.beats_per_bar,
            ticks_per_beat: self.parts_per_beat,
            beats_per_minute: self.beats_per_minute(),
            reverb: self.reverb,
            channels,
        }
    }

    /// Pretty-printed JSON with the intro, one loop pass and the outro.
    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.to_json_object(true, 1, true))
    }

    pub fn from_json_str(text: &str) -> Result<Song, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Song::from_json_object(&value))
    }
}

// ── Import ──────────────────────────────────────────────────

/// Integer view of a JSON field: numbers truncate toward zero, numeric
/// strings parse, anything else is absent.
fn int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

fn index_of(table: &[&str], value: Option<&Value>) -> Option<usize> {
    let text = value?.as_str()?;
    table.iter().position(|&name| name == text)
}

fn array(value: Option<&Value>) -> &[Value] {
    value
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Key index from a note name (`"C"`, `"F#"`, `"Bb"`) or a semitone number.
fn parse_key(value: &Value) -> Option<usize> {
    if let Some(number) = int(Some(value)).filter(|_| value.is_number()) {
        let len = config::KEY_NAMES.len() as i64;
        return Some((len - 1 - (number + 1200).rem_euclid(len)) as usize);
    }
    let text = value.as_str()?;
    let mut chars = text.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let mut index: i32 = match letter {
        'C' => 11,
        'D' => 9,
        'E' => 7,
        'F' => 6,
        'G' => 4,
        'A' => 2,
        'B' => 0,
        _ => return None,
    };
    match chars.next() {
        Some('#' | '♯') => index -= 1,
        Some('b' | 'B' | '♭') => index += 1,
        _ => {}
    }
    Some(index.rem_euclid(12) as usize)
}

fn instrument_volume(object: &Value) -> usize {
    int(object.get("volume")).map_or(0, |v| {
        clip(0, config::VOLUME_NAMES.len() as i64, (5.0 - v as f64 / 20.0).round() as i64) as usize
    })
}

fn instrument_from_json(object: &Value, is_drum: bool) -> Instrument {
    let mut instrument = Instrument::default();

    let transition = object
        .get("transition")
        .filter(|v| !v.is_null())
        .or_else(|| object.get("envelope"));
    instrument.transition = if transition.and_then(Value::as_str) == Some("binary") {
        0
    } else {
        index_of(&config::TRANSITION_NAMES, transition).unwrap_or(1)
    };

    instrument.kind = object
        .get("type")
        .and_then(Value::as_str)
        .and_then(|t| config::INSTRUMENT_TYPE_NAMES.iter().position(|&n| n == t))
        .and_then(InstrumentType::from_index)
        .unwrap_or(InstrumentType::for_channel(is_drum));

    let effect = || index_of(&config::EFFECT_NAMES, object.get("effect")).unwrap_or(0);
    match instrument.kind {
        InstrumentType::Noise => {
            instrument.volume = instrument_volume(object);
            instrument.wave = index_of(&config::DRUM_NAMES, object.get("wave")).unwrap_or(1);
        }
        InstrumentType::Chip => {
            instrument.volume = instrument_volume(object);
            instrument.wave = index_of(&config::WAVE_NAMES, object.get("wave")).unwrap_or(1);
            let filter = object.get("filter");
            let legacy_filter = match filter.and_then(Value::as_str) {
                Some("sustain sharp") => Some(1),
                Some("sustain medium") => Some(2),
                Some("sustain soft") => Some(3),
                Some("decay sharp") => Some(4),
                _ => None,
            };
            instrument.filter = legacy_filter
                .or_else(|| index_of(&config::FILTER_NAMES, filter))
                .unwrap_or(0);
            instrument.chorus = index_of(&config::CHORUS_NAMES, object.get("chorus")).unwrap_or(0);
            instrument.effect = effect();
        }
        InstrumentType::Fm => {
            let amplitude = |v: Option<&Value>| {
                int(v).map_or(0, |a| clip(0, config::OPERATOR_AMPLITUDE_MAX as i64 + 1, a) as usize)
            };
            instrument.effect = effect();
            instrument.algorithm = index_of(&config::ALGORITHM_NAMES, object.get("algorithm")).unwrap_or(0);
            instrument.feedback_type = index_of(&config::FEEDBACK_NAMES, object.get("feedbackType")).unwrap_or(0);
            instrument.feedback_amplitude = amplitude(object.get("feedbackAmplitude"));
            instrument.feedback_envelope =
                index_of(&config::OPERATOR_ENVELOPE_NAMES, object.get("feedbackEnvelope")).unwrap_or(0);
            let operators = array(object.get("operators"));
            for (j, op) in instrument.operators.iter_mut().enumerate() {
                let op_object = operators.get(j);
                let field = |key: &str| op_object.and_then(|o| o.get(key));
                op.frequency = index_of(&config::OPERATOR_FREQUENCY_NAMES, field("frequency")).unwrap_or(0);
                op.amplitude = amplitude(field("amplitude"));
                op.envelope = index_of(&config::OPERATOR_ENVELOPE_NAMES, field("envelope")).unwrap_or(0);
            }
        }
    }
    instrument
}

/// Read one note, or `None` when nothing playable survives the clamping.
/// `tick_clock` is the end of the previous note.
fn note_from_json(object: &Value, tick_clock: usize, parts_per_bar: usize, is_drum: bool) -> Option<Note> {
    let raw_pitches = object.get("pitches")?.as_array()?;
    let points = object.get("points")?.as_array()?;
    if raw_pitches.is_empty() || points.len() < 2 {
        return None;
    }

    let mut pitches: Vec<i32> = Vec::new();
    for raw in raw_pitches {
        let pitch = int(Some(raw)).unwrap_or(0) as i32;
        if pitches.contains(&pitch) {
            continue;
        }
        pitches.push(pitch);
        if pitches.len() >= config::MAX_PITCHES_PER_NOTE {
            break;
        }
    }

    let mut pins: Vec<NotePin> = Vec::new();
    let mut start = 0;
    let mut start_interval = 0;
    let mut note_clock = tick_clock as i64;
    for point in points {
        let Some(time) = int(point.get("tick")) else {
            continue;
        };
        let interval = int(point.get("pitchBend")).unwrap_or(0) as i32;
        let volume = int(point.get("volume")).map_or(config::NOTE_VOLUME_MAX, |v| {
            (v as f64 * 3.0 / 100.0).round().clamp(0.0, config::NOTE_VOLUME_MAX as f64) as u8
        });
        if time > parts_per_bar as i64 {
            continue;
        }
        if pins.is_empty() {
            if time < note_clock {
                continue;
            }
            start = time as usize;
            start_interval = interval;
        } else if time <= note_clock {
            continue;
        }
        note_clock = time;
        pins.push(NotePin::new(interval - start_interval, time as usize - start, volume));
    }
    let last_pin = *pins.get(1..)?.last()?;
    let end = start + last_pin.time;

    let max_pitch = if is_drum {
        config::DRUM_COUNT - 1
    } else {
        config::MAX_PITCH
    };
    let pitches: Vec<i32> = pitches
        .into_iter()
        .map(|p| p + start_interval)
        .filter(|p| (0..=max_pitch).contains(p))
        .collect();
    let lowest = *pitches.iter().min()?;
    let highest = *pitches.iter().max()?;

    let mut k = 0;
    while k < pins.len() {
        let pin = &mut pins[k];
        if pin.interval + lowest < 0 {
            pin.interval = -lowest;
        }
        if pin.interval + highest > max_pitch {
            pin.interval = max_pitch - highest;
        }
        let (interval, volume) = (pin.interval, pin.volume);
        if k >= 2 {
            let flat = |p: &NotePin| p.interval == interval && p.volume == volume;
            if flat(&pins[k - 1]) && flat(&pins[k - 2]) {
                pins.remove(k - 1);
                continue;
            }
        }
        k += 1;
    }

    Some(Note {
        pitches,
        pins,
        start,
        end,
    })
}

impl Song {
    /// Read a JSON document, clamping every field into range.
    ///
    /// Pitch channels are placed before drum channels whatever order the
    /// document lists them in.
    pub fn from_json_object(json: &Value) -> Song {
        let mut song = Song::default();
        if !json.is_object() {
            return song;
        }

        song.scale = 11;
        if let Some(scale) = json.get("scale").and_then(Value::as_str) {
            let legacy = match scale {
                "romani :)" => Some(8),
                "romani :(" => Some(9),
                _ => None,
            };
            if let Some(index) = legacy.or_else(|| config::SCALE_NAMES.iter().position(|&n| n == scale)) {
                song.scale = index;
            }
        }
        if let Some(key) = json.get("key").and_then(parse_key) {
            song.key = key;
        }
        if let Some(bpm) = int(json.get("beatsPerMinute")) {
            // Non-positive tempos saturate onto the slowest step.
            let tempo = (4.0 + 9.0 * (bpm as f64 / 120.0).log2()).round() as i64;
            song.tempo = clip(0, config::TEMPO_STEPS as i64, tempo) as usize;
        }
        if let Some(reverb) = int(json.get("reverb")) {
            song.reverb = clip(0, config::REVERB_RANGE as i64, reverb) as usize;
        }
        if let Some(beats) = int(json.get("beatsPerBar")) {
            song.beats_per_bar = beats.clamp(
                config::BEATS_PER_BAR_MIN as i64,
                config::BEATS_PER_BAR_MAX as i64,
            ) as usize;
        }
        if let Some(parts) = int(json.get("ticksPerBeat")) {
            let last = config::PART_COUNTS[config::PART_COUNTS.len() - 1];
            song.parts_per_beat = config::PART_COUNTS
                .iter()
                .copied()
                .find(|&p| p as i64 == parts)
                .unwrap_or(last);
        }

        let channel_objects = array(json.get("channels"));
        let longest = |key: &str| {
            channel_objects
                .iter()
                .map(|c| array(c.get(key)).len())
                .max()
                .unwrap_or(0)
                .max(1)
        };
        song.instruments_per_channel = longest("instruments").min(config::INSTRUMENTS_PER_CHANNEL_MAX);
        song.patterns_per_channel = longest("patterns").min(config::PATTERNS_PER_CHANNEL_MAX);
        song.bar_count = longest("sequence").min(config::BAR_COUNT_MAX);

        if let Some(intro) = int(json.get("introBars")) {
            song.loop_start = clip(0, song.bar_count as i64, intro) as usize;
        }
        if let Some(bars) = int(json.get("loopBars")) {
            let room = (song.bar_count - song.loop_start + 1) as i64;
            song.loop_length = clip(1, room, bars) as usize;
        }
        if song.loop_start + song.loop_length > song.bar_count {
            song.loop_length = song.bar_count - song.loop_start;
        }

        if channel_objects.is_empty() {
            song.resize_bars();
            song.resize_patterns();
            song.resize_instruments();
            return song;
        }

        let mut pitch_channels = Vec::new();
        let mut drum_channels = Vec::new();
        for (index, object) in channel_objects.iter().enumerate() {
            let is_drum = match object.get("type").and_then(Value::as_str) {
                Some(kind) if !kind.is_empty() => kind == "drum",
                _ => index >= 3,
            };
            if is_drum {
                if drum_channels.len() < config::DRUM_CHANNEL_COUNT_MAX {
                    drum_channels.push(song.channel_from_json(object, true));
                }
            } else if pitch_channels.len() < config::PITCH_CHANNEL_COUNT_MAX {
                pitch_channels.push(song.channel_from_json(object, false));
            }
        }
        if pitch_channels.is_empty() {
            log::debug!("JSON song has no pitch channel, adding an empty one");
            pitch_channels.push(song.channel_from_json(&Value::Null, false));
        }

        song.pitch_channel_count = pitch_channels.len();
        song.drum_channel_count = drum_channels.len();
        song.channels = pitch_channels;
        song.channels.extend(drum_channels);
        song
    }

    fn channel_from_json(&self, object: &Value, is_drum: bool) -> Channel {
        let octave = int(object.get("octaveScrollBar"))
            .map_or(0, |o| clip(0, config::OCTAVE_MAX as i64 + 1, o) as usize);

        let instrument_objects = array(object.get("instruments"));
        let empty = Value::Object(Default::default());
        let instruments = (0..self.instruments_per_channel)
            .map(|i| instrument_from_json(instrument_objects.get(i).unwrap_or(&empty), is_drum))
            .collect();

        let parts_per_bar = self.parts_per_bar();
        let pattern_objects = array(object.get("patterns"));
        let patterns = (0..self.patterns_per_channel)
            .map(|i| {
                let mut pattern = Pattern::default();
                let Some(pattern_object) = pattern_objects.get(i).filter(|p| !p.is_null()) else {
                    return pattern;
                };
                let instrument = int(pattern_object.get("instrument")).unwrap_or(0) - 1;
                pattern.instrument = clip(0, self.instruments_per_channel as i64, instrument) as usize;

                let note_objects = array(pattern_object.get("notes"));
                let max_notes = parts_per_bar.min(note_objects.len());
                let mut tick_clock = 0;
                for note_object in &note_objects[..max_notes] {
                    if let Some(note) = note_from_json(note_object, tick_clock, parts_per_bar, is_drum) {
                        tick_clock = note.end;
                        pattern.notes.push(note);
                    }
                }
                pattern
            })
            .collect();

        let sequence = object.get("sequence").and_then(Value::as_array);
        let bars = (0..self.bar_count)
            .map(|i| match sequence {
                None => 0,
                Some(seq) => {
                    let bar = int(seq.get(i)).unwrap_or(0);
                    if bar < 0 {
                        self.patterns_per_channel
                    } else {
                        (bar as usize).min(self.patterns_per_channel)
                    }
                }
            })
            .collect();

        Channel {
            octave,
            instruments,
            patterns,
            bars,
        }
    }
}
