//! Tone resolver: turns the note under the playhead into per-run
//! oscillator parameters.
//!
//! Every run (a slice of one arpeggio tick) gets start values plus a
//! per-sample delta for phase rate, volume and filter, so the synth inner
//! loops never branch on musical state.

use crate::config;
use crate::song::{Instrument, InstrumentType, Note, Song};

use super::envelope::{operator_amplitude_curve, operator_envelope};
use super::scheduler::{ARPEGGIOS_PER_PART, Scheduler};
use super::{frequency_from_pitch, volume_conversion};

/// Seamless transition: notes join without retriggering.
const TRANSITION_SEAMLESS: usize = 0;
const TRANSITION_SUDDEN: usize = 1;
const TRANSITION_SMOOTH: usize = 2;
const TRANSITION_SLIDE: usize = 3;

/// Carrier output gain before the sine boost.
const CARRIER_VOLUME: f64 = 0.03;
/// Modulator depth, in sine-table steps per unit of amplitude.
const MODULATOR_DEPTH: f64 = config::SINE_WAVE_LENGTH as f64 * 1.5;
const FEEDBACK_DEPTH: f64 = config::SINE_WAVE_LENGTH as f64 * 0.3;

/// Oscillator state for one channel, carried across runs.
#[derive(Debug, Clone, Default)]
pub struct Tone {
    pub active: bool,
    /// Last filtered output sample.
    pub sample: f64,
    pub phases: [f64; config::OPERATOR_COUNT],
    pub phase_deltas: [f64; config::OPERATOR_COUNT],
    pub volume_starts: [f64; config::OPERATOR_COUNT],
    pub volume_deltas: [f64; config::OPERATOR_COUNT],
    /// Per-sample multiplier applied to every phase delta (pitch bends).
    pub phase_delta_scale: f64,
    pub filter: f64,
    pub filter_scale: f64,
    pub vibrato_scale: f64,
    pub harmony_mult: f64,
    pub harmony_volume_mult: f64,
    pub feedback_outputs: [f64; config::OPERATOR_COUNT],
    pub feedback_mult: f64,
    pub feedback_delta: f64,
}

impl Tone {
    pub fn new() -> Self {
        Self::default()
    }

    /// Silence the oscillators so the next note starts from phase zero.
    pub fn reset(&mut self) {
        self.phases = [0.0; config::OPERATOR_COUNT];
        self.feedback_outputs = [0.0; config::OPERATOR_COUNT];
        self.sample = 0.0;
    }

    fn begin_run(&mut self) {
        self.phase_delta_scale = 0.0;
        self.filter = 1.0;
        self.filter_scale = 1.0;
        self.vibrato_scale = 0.0;
        self.harmony_mult = 1.0;
        self.harmony_volume_mult = 1.0;
        self.active = false;
        self.phase_deltas = [0.0; config::OPERATOR_COUNT];
        self.volume_starts = [0.0; config::OPERATOR_COUNT];
        self.volume_deltas = [0.0; config::OPERATOR_COUNT];
    }
}

/// Everything the resolver reads for one channel and one run.
#[derive(Debug, Clone, Copy)]
pub struct ToneContext<'a> {
    pub song: &'a Song,
    pub channel: usize,
    pub instrument: &'a Instrument,
    pub position: &'a Scheduler,
    pub samples_per_arpeggio: usize,
    pub samples_per_second: f64,
    pub run_length: usize,
    /// Live-preview pitches that replace pattern notes on this channel.
    pub piano_pitches: Option<&'a [i32]>,
}

/// Channel-wide pitch mapping and timing for one run.
#[derive(Debug, Clone, Copy)]
struct Voicing {
    is_drum: bool,
    base_pitch: f64,
    interval_scale: f64,
    pitch_damping: f64,
    seconds_per_part: f64,
    beats_per_part: f64,
    sample_time: f64,
    run_length: f64,
}

/// Start and end values of every swept quantity across the run.
#[derive(Debug, Clone, Copy, Default)]
struct Sweep {
    interval_start: f64,
    interval_end: f64,
    transition_volume_start: f64,
    transition_volume_end: f64,
    envelope_volume_start: f64,
    envelope_volume_end: f64,
    part_time_start: f64,
    part_time_end: f64,
    decay_time_start: f64,
    decay_time_end: f64,
}

struct Sounding<'a> {
    pitches: &'a [i32],
    parts_since_start: f64,
    reset_phases: bool,
    sweep: Sweep,
}

/// Resolve `tone` for the run described by `ctx`.
pub fn compute_tone(tone: &mut Tone, ctx: &ToneContext<'_>) {
    let song = ctx.song;
    let instrument = ctx.instrument;
    let is_drum = song.channel_is_drum(ctx.channel);
    let key = song.key.min(config::KEY_TRANSPOSES.len() - 1);

    let voicing = if is_drum {
        Voicing {
            is_drum,
            base_pitch: config::DRUM_BASE_PITCHES[instrument.wave] as f64,
            interval_scale: config::DRUM_INTERVAL as f64,
            pitch_damping: if config::DRUM_WAVE_IS_SOFT[instrument.wave] { 24.0 } else { 60.0 },
            ..voicing_timing(ctx)
        }
    } else {
        Voicing {
            is_drum,
            base_pitch: config::KEY_TRANSPOSES[key] as f64,
            interval_scale: 1.0,
            pitch_damping: 48.0,
            ..voicing_timing(ctx)
        }
    };

    tone.begin_run();

    let sounding = match ctx.piano_pitches {
        Some(pitches) => Some(Sounding {
            pitches,
            parts_since_start: 0.0,
            reset_phases: false,
            sweep: Sweep {
                transition_volume_start: 1.0,
                transition_volume_end: 1.0,
                envelope_volume_start: 1.0,
                envelope_volume_end: 1.0,
                ..Sweep::default()
            },
        }),
        None => resolve_note(ctx),
    };

    let Some(sounding) = sounding.filter(|s| !s.pitches.is_empty()) else {
        if !is_drum {
            tone.reset();
        }
        return;
    };

    tone.active = true;
    if !is_drum && instrument.kind == InstrumentType::Fm {
        resolve_fm(tone, instrument, &voicing, &sounding);
    } else {
        resolve_chip(tone, instrument, &voicing, &sounding, ctx.position.arpeggio);
    }

    let sweep = &sounding.sweep;
    tone.phase_delta_scale = 2f64.powf(
        (sweep.interval_end - sweep.interval_start) * voicing.interval_scale / 12.0 / voicing.run_length,
    );
    tone.vibrato_scale = if sounding.parts_since_start < config::EFFECT_VIBRATO_DELAYS[instrument.effect] {
        0.0
    } else {
        2f64.powf(config::EFFECT_VIBRATOS[instrument.effect] / 12.0) - 1.0
    };
}

fn voicing_timing(ctx: &ToneContext<'_>) -> Voicing {
    Voicing {
        is_drum: false,
        base_pitch: 0.0,
        interval_scale: 1.0,
        pitch_damping: 48.0,
        seconds_per_part: ARPEGGIOS_PER_PART as f64 * ctx.samples_per_arpeggio as f64
            / ctx.samples_per_second,
        beats_per_part: 1.0 / ctx.song.parts_per_beat.max(1) as f64,
        sample_time: 1.0 / ctx.samples_per_second,
        run_length: ctx.run_length.max(1) as f64,
    }
}

// ── Note lookup ─────────────────────────────────────────────

/// Find the note under the playhead and its contiguous neighbours.
fn find_notes(notes: &[Note], time: usize) -> (Option<&Note>, Option<&Note>, Option<&Note>) {
    let mut prev = None;
    let mut current = None;
    let mut next = None;
    for note in notes {
        if note.end <= time {
            prev = Some(note);
        } else if note.start <= time && note.end > time {
            current = Some(note);
        } else if note.start > time {
            next = Some(note);
            break;
        }
    }
    if let Some(note) = current {
        prev = prev.filter(|p| p.end == note.start);
        next = next.filter(|n| n.start == note.end);
    }
    (prev, current, next)
}

fn resolve_note<'a>(ctx: &ToneContext<'a>) -> Option<Sounding<'a>> {
    let song = ctx.song;
    let position = ctx.position;
    let pattern = song.pattern(ctx.channel, position.bar)?;
    let time = position.part + position.beat * song.parts_per_beat;
    let (prev, note, next) = find_notes(&pattern.notes, time);
    let note = note?;
    let root = *note.pitches.first()?;
    let first_pin = note.pins.first()?;
    let last_pin = note.pins.last()?;
    if note.pins.len() < 2 {
        return None;
    }

    let mut end_pin_index = 1;
    while end_pin_index < note.pins.len() - 1 && note.pins[end_pin_index].time + note.start <= time {
        end_pin_index += 1;
    }
    let start_pin = &note.pins[end_pin_index - 1];
    let end_pin = &note.pins[end_pin_index];

    let ticks = ARPEGGIOS_PER_PART as f64;
    let note_start = note.start as f64 * ticks;
    let note_end = note.end as f64 * ticks;
    let pin_start = (note.start + start_pin.time) as f64 * ticks;
    let pin_end = (note.start + end_pin.time) as f64 * ticks;
    let tick_time_start = time as f64 * ticks + position.arpeggio as f64;
    let tick_time_end = tick_time_start + 1.0;
    let pin_span = (pin_end - pin_start).max(f64::EPSILON);
    let pin_ratio_start = (tick_time_start - pin_start) / pin_span;
    let pin_ratio_end = (tick_time_end - pin_start) / pin_span;

    let lerp_pin = |a: f64, b: f64, ratio: f64| a + (b - a) * ratio;
    let start_volume = start_pin.volume as f64;
    let end_volume = end_pin.volume as f64;
    let start_interval = start_pin.interval as f64;
    let end_interval = end_pin.interval as f64;
    let start_time = start_pin.time as f64;
    let end_time = end_pin.time as f64;

    let envelope_volume_tick_start = lerp_pin(start_volume, end_volume, pin_ratio_start);
    let envelope_volume_tick_end = lerp_pin(start_volume, end_volume, pin_ratio_end);
    let mut transition_volume_tick_start = 1.0;
    let mut transition_volume_tick_end = 1.0;
    let mut interval_tick_start = lerp_pin(start_interval, end_interval, pin_ratio_start);
    let mut interval_tick_end = lerp_pin(start_interval, end_interval, pin_ratio_end);
    let part_time_tick_start = lerp_pin(start_time, end_time, pin_ratio_start);
    let part_time_tick_end = lerp_pin(start_time, end_time, pin_ratio_end);
    let mut decay_time_tick_start = part_time_tick_start;
    let mut decay_time_tick_end = part_time_tick_end;

    let spa = ctx.samples_per_arpeggio.max(1) as f64;
    let countdown = position.arpeggio_sample_countdown as f64;
    let start_ratio = 1.0 - countdown / spa;
    let end_ratio = 1.0 - (countdown - ctx.run_length as f64) / spa;
    let mut reset_phases = tick_time_start + start_ratio - note_start == 0.0;

    let transition = ctx.instrument.transition;
    if tick_time_start == note_start {
        match transition {
            TRANSITION_SEAMLESS => reset_phases = false,
            TRANSITION_SMOOTH => transition_volume_tick_start = 0.0,
            TRANSITION_SLIDE => match prev.and_then(|p| Some((*p.pitches.first()?, p.pins.last()?))) {
                Some((prev_root, prev_last)) if prev_last.volume != 0 && first_pin.volume != 0 => {
                    interval_tick_start = (prev_root + prev_last.interval - root) as f64 * 0.5;
                    decay_time_tick_start = prev_last.time as f64 * 0.5;
                    reset_phases = false;
                }
                _ => transition_volume_tick_start = 0.0,
            },
            _ => {}
        }
    }
    if tick_time_end == note_end {
        match transition {
            TRANSITION_SEAMLESS => {
                if next.is_none() && note.start + end_pin.time != song.parts_per_bar() {
                    transition_volume_tick_end = 0.0;
                }
            }
            TRANSITION_SUDDEN | TRANSITION_SMOOTH => transition_volume_tick_end = 0.0,
            TRANSITION_SLIDE => match next.and_then(|n| Some((*n.pitches.first()?, n.pins.first()?))) {
                Some((next_root, next_first)) if last_pin.volume != 0 && next_first.volume != 0 => {
                    interval_tick_end = (next_root - root + last_pin.interval) as f64 * 0.5;
                    decay_time_tick_end *= 0.5;
                }
                _ => transition_volume_tick_end = 0.0,
            },
            _ => {}
        }
    }

    let lerp_run = |a: f64, b: f64, ratio: f64| a + (b - a) * ratio;
    let sweep = Sweep {
        interval_start: lerp_run(interval_tick_start, interval_tick_end, start_ratio),
        interval_end: lerp_run(interval_tick_start, interval_tick_end, end_ratio),
        envelope_volume_start: volume_conversion(lerp_run(
            envelope_volume_tick_start,
            envelope_volume_tick_end,
            start_ratio,
        )),
        envelope_volume_end: volume_conversion(lerp_run(
            envelope_volume_tick_start,
            envelope_volume_tick_end,
            end_ratio,
        )),
        transition_volume_start: lerp_run(
            transition_volume_tick_start,
            transition_volume_tick_end,
            start_ratio,
        ),
        transition_volume_end: lerp_run(
            transition_volume_tick_start,
            transition_volume_tick_end,
            end_ratio,
        ),
        part_time_start: note.start as f64
            + lerp_run(part_time_tick_start, part_time_tick_end, start_ratio),
        part_time_end: note.start as f64 + lerp_run(part_time_tick_start, part_time_tick_end, end_ratio),
        decay_time_start: lerp_run(decay_time_tick_start, decay_time_tick_end, start_ratio),
        decay_time_end: lerp_run(decay_time_tick_start, decay_time_tick_end, end_ratio),
    };

    Some(Sounding {
        pitches: &note.pitches,
        parts_since_start: (time - note.start) as f64,
        reset_phases,
        sweep,
    })
}

// ── FM operators ────────────────────────────────────────────

fn resolve_fm(tone: &mut Tone, instrument: &Instrument, voicing: &Voicing, sounding: &Sounding<'_>) {
    let sweep = &sounding.sweep;
    let pitches = sounding.pitches;
    let algorithm = instrument.algorithm;
    let carrier_count = config::OPERATOR_CARRIER_COUNTS[algorithm];
    let mut sine_volume_boost = 1.0;
    let mut total_carrier_volume = 0.0;

    if sounding.reset_phases {
        tone.reset();
    }

    let envelope_at_start = |envelope: usize| {
        operator_envelope(
            envelope,
            voicing.seconds_per_part * sweep.decay_time_start,
            voicing.beats_per_part * sweep.part_time_start,
            sweep.envelope_volume_start,
        )
    };
    let envelope_at_end = |envelope: usize| {
        operator_envelope(
            envelope,
            voicing.seconds_per_part * sweep.decay_time_end,
            voicing.beats_per_part * sweep.part_time_end,
            sweep.envelope_volume_end,
        )
    };

    for (i, operator) in instrument.operators.iter().enumerate() {
        let associated_carrier = config::OPERATOR_ASSOCIATED_CARRIER[algorithm][i] - 1;
        let pitch_index = if i < pitches.len() {
            i
        } else if associated_carrier < pitches.len() {
            associated_carrier
        } else {
            0
        };
        let pitch = pitches[pitch_index] as f64;
        let frequency_mult = config::OPERATOR_FREQUENCIES[operator.frequency];
        let chorus_interval = config::OPERATOR_CARRIER_CHORUS[associated_carrier];
        let start_pitch = (pitch + sweep.interval_start) * voicing.interval_scale + chorus_interval;
        let start_frequency = frequency_mult * frequency_from_pitch(voicing.base_pitch + start_pitch)
            + config::OPERATOR_HZ_OFFSETS[operator.frequency];
        tone.phase_deltas[i] = start_frequency * voicing.sample_time * config::SINE_WAVE_LENGTH as f64;

        let amplitude_curve = operator_amplitude_curve(operator.amplitude);
        let amplitude_mult = amplitude_curve * config::OPERATOR_AMPLITUDE_SIGNS[operator.frequency];
        let mut volume_start = amplitude_mult;
        let mut volume_end = amplitude_mult;
        if i < carrier_count {
            let end_pitch = (pitch + sweep.interval_end) * voicing.interval_scale;
            let pitch_volume_start = 2f64.powf(-start_pitch / voicing.pitch_damping);
            let pitch_volume_end = 2f64.powf(-end_pitch / voicing.pitch_damping);
            volume_start *= pitch_volume_start * CARRIER_VOLUME * sweep.transition_volume_start;
            volume_end *= pitch_volume_end * CARRIER_VOLUME * sweep.transition_volume_end;
            total_carrier_volume += amplitude_curve;
        } else {
            volume_start *= MODULATOR_DEPTH;
            volume_end *= MODULATOR_DEPTH;
            sine_volume_boost *=
                1.0 - (operator.amplitude as f64 / config::OPERATOR_AMPLITUDE_MAX as f64).min(1.0);
        }
        volume_start *= envelope_at_start(operator.envelope);
        volume_end *= envelope_at_end(operator.envelope);
        tone.volume_starts[i] = volume_start;
        tone.volume_deltas[i] = (volume_end - volume_start) / voicing.run_length;
    }

    let feedback_amplitude =
        FEEDBACK_DEPTH * instrument.feedback_amplitude as f64 / config::OPERATOR_AMPLITUDE_MAX as f64;
    let feedback_start = feedback_amplitude * envelope_at_start(instrument.feedback_envelope);
    let feedback_end = feedback_amplitude * envelope_at_end(instrument.feedback_envelope);
    tone.feedback_mult = feedback_start;
    tone.feedback_delta = (feedback_end - feedback_start) / voicing.run_length;

    sine_volume_boost *= 1.0 - instrument.feedback_amplitude as f64 / config::OPERATOR_AMPLITUDE_MAX as f64;
    sine_volume_boost *= 1.0 - ((total_carrier_volume - 1.0).max(0.0) / 2.0).min(1.0);
    let boost = 1.0 + sine_volume_boost * 3.0;
    for i in 0..carrier_count {
        tone.volume_starts[i] *= boost;
        tone.volume_deltas[i] *= boost;
    }
}

// ── Chip and noise ──────────────────────────────────────────

/// Pick the sounding pitch of a chord for this arpeggio tick, or the
/// harmony offset when the chorus preset plays chords together.
fn arpeggiate(tone: &mut Tone, instrument: &Instrument, pitches: &[i32], arpeggio: usize, pitch_damping: f64) -> i32 {
    let arpeggio = arpeggio.min(ARPEGGIOS_PER_PART - 1);
    if config::CHORUS_HARMONIZES[instrument.chorus] {
        let harmony_offset = match pitches.len() {
            2 => pitches[1] - pitches[0],
            3 => pitches[(arpeggio >> 1) + 1] - pitches[0],
            4 => pitches[(if arpeggio == 3 { 1 } else { arpeggio }) + 1] - pitches[0],
            _ => 0,
        } as f64;
        tone.harmony_mult = 2f64.powf(harmony_offset / 12.0);
        tone.harmony_volume_mult = 2f64.powf(-harmony_offset / pitch_damping);
        pitches[0]
    } else {
        match pitches.len() {
            2 => pitches[arpeggio >> 1],
            3 => pitches[if arpeggio == 3 { 1 } else { arpeggio }],
            4 => pitches[arpeggio],
            _ => pitches[0],
        }
    }
}

fn resolve_chip(
    tone: &mut Tone,
    instrument: &Instrument,
    voicing: &Voicing,
    sounding: &Sounding<'_>,
    arpeggio: usize,
) {
    let sweep = &sounding.sweep;
    let pitch = arpeggiate(tone, instrument, sounding.pitches, arpeggio, voicing.pitch_damping) as f64;

    let start_pitch = (pitch + sweep.interval_start) * voicing.interval_scale;
    let end_pitch = (pitch + sweep.interval_end) * voicing.interval_scale;
    let start_frequency = frequency_from_pitch(voicing.base_pitch + start_pitch);
    let pitch_volume_start = 2f64.powf(-start_pitch / voicing.pitch_damping);
    let pitch_volume_end = 2f64.powf(-end_pitch / voicing.pitch_damping);

    let settings_volume_mult = if voicing.is_drum {
        if config::DRUM_WAVE_IS_SOFT[instrument.wave] {
            tone.filter = (start_frequency
                * voicing.sample_time
                * config::DRUM_PITCH_FILTER_MULT[instrument.wave])
                .min(1.0);
        }
        0.19 * config::DRUM_VOLUMES[instrument.wave]
    } else {
        let filter_scale_rate = config::FILTER_DECAYS[instrument.filter];
        tone.filter = 2f64.powf(-filter_scale_rate * voicing.seconds_per_part * sweep.decay_time_start);
        let end_filter = 2f64.powf(-filter_scale_rate * voicing.seconds_per_part * sweep.decay_time_end);
        tone.filter_scale = (end_filter / tone.filter).powf(1.0 / voicing.run_length);
        0.27 * 0.5
            * config::WAVE_VOLUMES[instrument.wave]
            * config::FILTER_VOLUMES[instrument.filter]
            * config::CHORUS_VOLUMES[instrument.chorus]
    };

    if sounding.reset_phases && !voicing.is_drum {
        tone.reset();
    }

    tone.phase_deltas[0] = start_frequency * voicing.sample_time;
    let instrument_volume_mult = instrument_volume(instrument.volume);
    tone.volume_starts[0] = sweep.transition_volume_start
        * sweep.envelope_volume_start
        * pitch_volume_start
        * settings_volume_mult
        * instrument_volume_mult;
    let volume_end = sweep.transition_volume_end
        * sweep.envelope_volume_end
        * pitch_volume_end
        * settings_volume_mult
        * instrument_volume_mult;
    tone.volume_deltas[0] = (volume_end - tone.volume_starts[0]) / voicing.run_length;
}

/// Linear gain of an instrument volume setting; the last entry mutes.
pub fn instrument_volume(volume: usize) -> f64 {
    if volume + 1 >= config::VOLUME_NAMES.len() {
        0.0
    } else {
        2f64.powf(-config::VOLUME_VALUES[volume])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::{Note, NotePin, Pattern};

    fn song_with_note(note: Note) -> Song {
        let mut song = Song::default();
        song.channels[0].patterns[0] = Pattern {
            instrument: 0,
            notes: vec![note],
        };
        song
    }

    fn song_with_transition(transition: usize, notes: Vec<Note>) -> Song {
        let mut song = Song::default();
        song.channels[0].instruments[0].transition = transition;
        song.channels[0].patterns[0] = Pattern { instrument: 0, notes };
        song
    }

    fn resolve(song: &Song, position: &Scheduler, run_length: usize) -> Tone {
        let mut tone = Tone::new();
        resolve_into(&mut tone, song, position, run_length);
        tone
    }

    fn resolve_into(tone: &mut Tone, song: &Song, position: &Scheduler, run_length: usize) {
        let ctx = ToneContext {
            song,
            channel: 0,
            instrument: &song.channels[0].instruments[0],
            position,
            samples_per_arpeggio: 100,
            samples_per_second: 44100.0,
            run_length,
            piano_pitches: None,
        };
        compute_tone(tone, &ctx);
    }

    fn at(part: usize, arpeggio: usize, countdown: usize) -> Scheduler {
        Scheduler {
            bar: 0,
            beat: part / 4,
            part: part % 4,
            arpeggio,
            arpeggio_sample_countdown: countdown,
        }
    }

    #[test]
    fn test_silent_pattern_is_inactive() {
        let song = Song::default();
        let tone = resolve(&song, &at(0, 0, 100), 100);
        assert!(!tone.active);
        assert_eq!(tone.volume_starts[0], 0.0);
    }

    #[test]
    fn test_note_sets_frequency() {
        let song = song_with_note(Note::new(0, 0, 8, 3, false));
        let tone = resolve(&song, &at(2, 0, 100), 100);
        assert!(tone.active);
        let base = config::KEY_TRANSPOSES[song.key] as f64;
        let expected = frequency_from_pitch(base) / 44100.0;
        assert!((tone.phase_deltas[0] - expected).abs() < 1e-12);
        assert!(tone.volume_starts[0] > 0.0);
        assert!((tone.phase_delta_scale - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_note_start_resets_phase() {
        let song = song_with_note(Note::new(0, 0, 8, 3, false));
        let mut tone = Tone::new();
        tone.phases[0] = 0.7;
        tone.sample = 0.3;
        let position = at(0, 0, 100);
        let ctx = ToneContext {
            song: &song,
            channel: 0,
            instrument: &song.channels[0].instruments[0],
            position: &position,
            samples_per_arpeggio: 100,
            samples_per_second: 44100.0,
            run_length: 100,
            piano_pitches: None,
        };
        compute_tone(&mut tone, &ctx);
        assert_eq!(tone.phases[0], 0.0);
        assert_eq!(tone.sample, 0.0);
    }

    #[test]
    fn test_sudden_release_fades_last_tick() {
        let song = song_with_note(Note::new(0, 0, 2, 3, false));
        // Final tick of the note: parts 0..2 → ticks 0..8, last tick is 7.
        let tone = resolve(&song, &at(1, 3, 100), 100);
        assert!(tone.volume_starts[0] > 0.0);
        assert!(tone.volume_deltas[0] < 0.0);
        let end = tone.volume_starts[0] + tone.volume_deltas[0] * 100.0;
        assert!(end.abs() < 1e-12, "end volume {end}");
    }

    #[test]
    fn test_seamless_joins_touching_notes() {
        let song = song_with_transition(
            TRANSITION_SEAMLESS,
            vec![Note::new(0, 0, 4, 3, false), Note::new(7, 4, 8, 3, false)],
        );
        let mut tone = Tone::new();
        tone.phases[0] = 0.4;
        tone.sample = 0.2;
        resolve_into(&mut tone, &song, &at(4, 0, 100), 100);
        assert!(tone.active);
        assert_eq!(tone.phases[0], 0.4, "seamless notes keep their phase");
        assert_eq!(tone.sample, 0.2);
        // No release at the join, so the first note ends at full volume.
        let first = resolve(&song, &at(3, 3, 100), 100);
        assert!(first.volume_starts[0] + first.volume_deltas[0] * 100.0 > 0.0);
    }

    #[test]
    fn test_smooth_fades_in_from_silence() {
        let song = song_with_transition(TRANSITION_SMOOTH, vec![Note::new(0, 0, 8, 3, false)]);
        let tone = resolve(&song, &at(0, 0, 100), 100);
        assert!(tone.active);
        assert_eq!(tone.volume_starts[0], 0.0);
        assert!(tone.volume_deltas[0] > 0.0, "smooth attack should ramp up");
    }

    #[test]
    fn test_slide_starts_from_previous_pitch() {
        let song = song_with_transition(
            TRANSITION_SLIDE,
            vec![Note::new(12, 0, 4, 3, false), Note::new(0, 4, 8, 3, false)],
        );
        let mut tone = Tone::new();
        tone.phases[0] = 0.25;
        resolve_into(&mut tone, &song, &at(4, 0, 100), 100);
        assert_eq!(tone.phases[0], 0.25, "slide does not retrigger");

        let base = config::KEY_TRANSPOSES[song.key] as f64;
        let start = tone.phase_deltas[0] * 44100.0;
        let expected = frequency_from_pitch(base + 6.0);
        assert!((start - expected).abs() < 1e-6, "start {start}, want {expected}");
        assert!(tone.phase_delta_scale < 1.0, "pitch should glide down");
        assert!(tone.volume_starts[0] > 0.0, "slide should not fade in");
    }

    #[test]
    fn test_slide_without_neighbour_fades_in() {
        let song = song_with_transition(
            TRANSITION_SLIDE,
            vec![Note::new(12, 0, 2, 3, false), Note::new(0, 4, 8, 3, false)],
        );
        let tone = resolve(&song, &at(4, 0, 100), 100);
        assert!(tone.active);
        assert_eq!(tone.volume_starts[0], 0.0);
        assert!(tone.volume_deltas[0] > 0.0);
    }

    #[test]
    fn test_pin_bend_sweeps_phase() {
        let mut note = Note::new(0, 0, 4, 3, false);
        note.pins = vec![NotePin::new(0, 0, 3), NotePin::new(12, 4, 3)];
        let song = song_with_note(note);
        let tone = resolve(&song, &at(1, 0, 100), 100);
        assert!(tone.phase_delta_scale > 1.0);
    }

    #[test]
    fn test_chord_arpeggiates() {
        let mut note = Note::new(0, 0, 8, 3, false);
        note.pitches = vec![0, 4, 7];
        let song = song_with_note(note);
        let base = config::KEY_TRANSPOSES[song.key] as f64;
        let picks: Vec<f64> = (0..4)
            .map(|arp| resolve(&song, &at(2, arp, 100), 100).phase_deltas[0] * 44100.0)
            .collect();
        let expected = [0.0, 4.0, 7.0, 4.0].map(|p| frequency_from_pitch(base + p));
        for (got, want) in picks.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "got {got}, want {want}");
        }
    }

    #[test]
    fn test_harmonize_keeps_root() {
        let mut song = song_with_note({
            let mut note = Note::new(0, 0, 8, 3, false);
            note.pitches = vec![0, 12];
            note
        });
        song.channels[0].instruments[0].chorus = 8;
        let tone = resolve(&song, &at(2, 1, 100), 100);
        assert!((tone.harmony_mult - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_piano_override() {
        let song = Song::default();
        let position = at(0, 0, 100);
        let mut tone = Tone::new();
        let pitches = [24];
        let ctx = ToneContext {
            song: &song,
            channel: 0,
            instrument: &song.channels[0].instruments[0],
            position: &position,
            samples_per_arpeggio: 100,
            samples_per_second: 44100.0,
            run_length: 50,
            piano_pitches: Some(&pitches),
        };
        compute_tone(&mut tone, &ctx);
        assert!(tone.active);
        assert!(tone.volume_starts[0] > 0.0);
        assert!(tone.volume_deltas[0].abs() < 1e-15);
    }

    #[test]
    fn test_fm_carriers_only_get_carrier_gain() {
        let mut song = song_with_note(Note::new(0, 0, 8, 3, false));
        song.channels[0].instruments[0] = Instrument::new(InstrumentType::Fm);
        let tone = resolve(&song, &at(2, 0, 100), 100);
        assert!(tone.active);
        // Algorithm 0 has one carrier; operator 1 modulates at sine-table depth.
        assert!(tone.volume_starts[0] > 0.0 && tone.volume_starts[0] < 1.0);
        assert!(tone.volume_starts[1] > 1.0);
        assert!(tone.phase_deltas[0] > 0.0);
    }

    #[test]
    fn test_instrument_volume_table() {
        assert_eq!(instrument_volume(0), 1.0);
        assert!((instrument_volume(2) - 0.5).abs() < 1e-12);
        assert_eq!(instrument_volume(5), 0.0);
    }
}
