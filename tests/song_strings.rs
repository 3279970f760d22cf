use chipwalker_core::config;
use chipwalker_core::song::{Channel, Instrument, InstrumentType, Note, NotePin, Pattern, Song};
use chipwalker_core::{DecodeError, load_song};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const RANDOM_SONGS: u64 = 300;
/// Largest bend away from a note's pitches.
const BEND_RANGE: i32 = 3;

fn arrangement() -> Song {
    let mut song = Song::default();
    song.key = 2;
    song.tempo = 9;
    song.reverb = 1;
    song.loop_start = 1;
    song.loop_length = 2;

    let parts = song.parts_per_bar();
    let mut lead = Note::new(55, 0, 8, 3, false);
    lead.pins = vec![NotePin::new(0, 0, 3), NotePin::new(5, 8, 1)];
    let mut chord = Note::new(43, 8, parts, 2, true);
    chord.pitches = vec![43, 47, 50];
    song.channels[0].patterns[0] = Pattern {
        instrument: 0,
        notes: vec![lead, chord],
    };
    song.channels[1].instruments[0].set_type_and_reset(InstrumentType::Fm);
    song.channels[1].patterns[1].notes = vec![Note::new(31, 4, 12, 3, false)];
    song.channels[1].bars[2] = 2;
    song.channels[3].patterns[0].notes = vec![Note::new(4, 0, 2, 3, true), Note::new(7, 16, 18, 2, true)];
    song
}

// ── Random songs ────────────────────────────────────────────

fn random_instrument(rng: &mut StdRng, is_drum: bool) -> Instrument {
    let kind = if is_drum {
        [InstrumentType::Noise, InstrumentType::Fm][rng.gen_range(0..2)]
    } else {
        InstrumentType::ALL[rng.gen_range(0..InstrumentType::ALL.len())]
    };
    let mut instrument = Instrument::new(kind);
    instrument.transition = rng.gen_range(0..config::TRANSITION_NAMES.len());
    match kind {
        InstrumentType::Chip => {
            instrument.wave = rng.gen_range(0..config::WAVE_NAMES.len());
            instrument.filter = rng.gen_range(0..config::FILTER_NAMES.len());
            instrument.effect = rng.gen_range(0..config::EFFECT_NAMES.len());
            instrument.chorus = rng.gen_range(0..config::CHORUS_NAMES.len());
            instrument.volume = rng.gen_range(0..config::VOLUME_NAMES.len());
        }
        InstrumentType::Fm => {
            instrument.effect = rng.gen_range(0..config::EFFECT_NAMES.len());
            instrument.algorithm = rng.gen_range(0..config::ALGORITHM_NAMES.len());
            instrument.feedback_type = rng.gen_range(0..config::FEEDBACK_NAMES.len());
            instrument.feedback_amplitude = rng.gen_range(0..=config::OPERATOR_AMPLITUDE_MAX);
            instrument.feedback_envelope = rng.gen_range(0..config::OPERATOR_ENVELOPE_NAMES.len());
            for op in &mut instrument.operators {
                op.frequency = rng.gen_range(0..config::OPERATOR_FREQUENCIES.len());
                op.amplitude = rng.gen_range(0..=config::OPERATOR_AMPLITUDE_MAX);
                op.envelope = rng.gen_range(0..config::OPERATOR_ENVELOPE_NAMES.len());
            }
        }
        InstrumentType::Noise => {
            instrument.wave = rng.gen_range(0..config::DRUM_NAMES.len());
            instrument.volume = rng.gen_range(0..config::VOLUME_NAMES.len());
        }
    }
    instrument
}

/// A note whose bends stay in range and whose pins never repeat three
/// times in a row.
fn random_note(rng: &mut StdRng, start: usize, length: usize, is_drum: bool) -> Note {
    let max_pitch = if is_drum { config::DRUM_COUNT - 1 } else { config::MAX_PITCH };
    let pitch_count = rng.gen_range(1..=config::MAX_PITCHES_PER_NOTE);
    let mut pitches = Vec::with_capacity(pitch_count);
    while pitches.len() < pitch_count {
        let pitch = rng.gen_range(BEND_RANGE..=max_pitch - BEND_RANGE);
        if !pitches.contains(&pitch) {
            pitches.push(pitch);
        }
    }

    let mut pins = vec![NotePin::new(0, 0, rng.gen_range(0..=3))];
    let mut times: Vec<usize> = (1..length).filter(|_| rng.gen_bool(0.3)).collect();
    times.push(length);
    for time in times {
        let previous = pins[pins.len() - 1];
        let interval = if rng.gen_bool(0.4) {
            rng.gen_range(-BEND_RANGE..=BEND_RANGE)
        } else {
            previous.interval
        };
        let mut pin = NotePin::new(interval, time, rng.gen_range(0..=3));
        let flat = |p: &NotePin| p.interval == pin.interval && p.volume == pin.volume;
        if pins.len() >= 2 && flat(&previous) && flat(&pins[pins.len() - 2]) {
            pin.volume = (pin.volume + 1) % 4;
        }
        pins.push(pin);
    }

    Note {
        pitches,
        pins,
        start,
        end: start + length,
    }
}

fn random_pattern(rng: &mut StdRng, song: &Song, is_drum: bool) -> Pattern {
    let mut pattern = Pattern {
        instrument: rng.gen_range(0..song.instruments_per_channel),
        notes: Vec::new(),
    };
    if rng.gen_bool(0.25) {
        return pattern;
    }
    let parts = song.parts_per_bar();
    let mut cursor = 0;
    while cursor < parts {
        if rng.gen_bool(0.3) {
            cursor += rng.gen_range(1..=3);
            continue;
        }
        let length = rng.gen_range(1..=(parts - cursor).min(6));
        pattern.notes.push(random_note(rng, cursor, length, is_drum));
        cursor += length;
    }
    pattern
}

fn random_song(rng: &mut StdRng) -> Song {
    let mut song = Song::default();
    song.pitch_channel_count = rng.gen_range(config::PITCH_CHANNEL_COUNT_MIN..=config::PITCH_CHANNEL_COUNT_MAX);
    song.drum_channel_count = rng.gen_range(config::DRUM_CHANNEL_COUNT_MIN..=config::DRUM_CHANNEL_COUNT_MAX);
    song.scale = rng.gen_range(0..config::SCALE_NAMES.len());
    song.key = rng.gen_range(0..config::KEY_NAMES.len());
    song.tempo = rng.gen_range(0..config::TEMPO_STEPS);
    song.reverb = rng.gen_range(0..config::REVERB_RANGE);
    song.beats_per_bar = rng.gen_range(config::BEATS_PER_BAR_MIN..=config::BEATS_PER_BAR_MAX);
    song.parts_per_beat = config::PART_COUNTS[rng.gen_range(0..config::PART_COUNTS.len())];
    song.bar_count = rng.gen_range(1..=24);
    song.patterns_per_channel = rng.gen_range(1..=6);
    song.instruments_per_channel = rng.gen_range(1..=3);
    song.loop_start = rng.gen_range(0..song.bar_count);
    song.loop_length = rng.gen_range(1..=song.bar_count - song.loop_start);

    let mut channels = Vec::with_capacity(song.channel_count());
    for index in 0..song.channel_count() {
        let is_drum = song.channel_is_drum(index);
        channels.push(Channel {
            octave: rng.gen_range(0..=config::OCTAVE_MAX),
            instruments: (0..song.instruments_per_channel)
                .map(|_| random_instrument(rng, is_drum))
                .collect(),
            patterns: (0..song.patterns_per_channel)
                .map(|_| random_pattern(rng, &song, is_drum))
                .collect(),
            bars: (0..song.bar_count)
                .map(|_| rng.gen_range(0..=song.patterns_per_channel))
                .collect(),
        });
    }
    song.channels = channels;
    song
}

#[test]
fn random_songs_survive_string_round_trip() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for i in 0..RANDOM_SONGS {
        let song = random_song(&mut rng);
        let encoded = song
            .to_base64_string()
            .unwrap_or_else(|e| panic!("song {i} failed to encode: {e}"));
        let decoded = load_song(&encoded).unwrap_or_else(|e| panic!("song {i} failed to decode: {e}"));
        assert_eq!(decoded, song, "song {i} changed through {encoded}");
        assert_eq!(decoded.to_base64_string().ok(), Some(encoded), "song {i} re-encodes differently");
    }
}

#[test]
fn random_songs_survive_json_round_trip() {
    let mut rng = StdRng::seed_from_u64(0x150b);
    for i in 0..RANDOM_SONGS {
        let song = random_song(&mut rng);
        let text = song
            .to_json_string()
            .unwrap_or_else(|e| panic!("song {i} failed to export: {e}"));
        let imported = Song::from_json_str(&text).unwrap_or_else(|e| panic!("song {i} failed to import: {e}"));
        assert_eq!(imported, song, "song {i} changed through JSON");
    }
}

// ── Fixed songs ─────────────────────────────────────────────

#[test]
fn url_fragment_prefix_is_ignored() {
    let encoded = arrangement().to_base64_string().expect("encode");
    let with_hash = format!("\n  #{encoded}");
    assert_eq!(load_song(&with_hash).expect("decode"), arrangement());
}

#[test]
fn json_text_decodes_through_the_string_entry_point() {
    let song = arrangement();
    let text = song.to_json_string().expect("export");
    assert_eq!(load_song(&text).expect("decode"), song);
}

#[test]
fn broken_strings_report_an_offset() {
    let encoded = arrangement().to_base64_string().expect("encode");
    let truncated = &encoded[..encoded.len() - 4];
    let err = load_song(truncated).expect_err("truncated pattern data should fail");
    let offset = err.offset().expect("decode errors carry an offset");
    assert!(offset <= truncated.len(), "offset {offset} past end of {}", truncated.len());

    let err = load_song("6k!").expect_err("invalid character");
    assert!(matches!(err, DecodeError::InvalidCharacter { ch: '!', .. }), "{err:?}");
    assert!(err.report("6k!").contains("6k!"));
}
