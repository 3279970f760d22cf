//! Playback position: a mixed-radix odometer over bar, beat, part and
//! arpeggio tick, with a per-tick sample countdown underneath.
//!
//! The scheduler owns only the position. Loop policy lives in
//! [`LoopSettings`], which the scheduler consumes as the song plays
//! (the intro flag clears once playback enters the loop, a finite loop
//! count decrements on every wrap).

use crate::song::Song;

/// Arpeggio ticks per part.
pub const ARPEGGIOS_PER_PART: usize = 4;

/// How playback treats the bars around the loop region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    /// Play bars before `loop_start` once before looping.
    pub enable_intro: bool,
    /// Play bars after the loop once the loop budget is spent.
    pub enable_outro: bool,
    /// Remaining loop passes; negative loops forever.
    pub loop_count: i32,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            enable_intro: true,
            enable_outro: false,
            loop_count: -1,
        }
    }
}

/// What happened when the position advanced past a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Still inside the same bar.
    Continue,
    /// Crossed into another bar (possibly after a loop wrap).
    BarChanged,
    /// Playback reached its end; the position is back at bar 0.
    Ended,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scheduler {
    pub bar: usize,
    pub beat: usize,
    pub part: usize,
    pub arpeggio: usize,
    /// Samples left in the current arpeggio tick; 0 means "start a fresh tick".
    pub arpeggio_sample_countdown: usize,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jump to the top of `bar`.
    pub fn snap_to_bar(&mut self, bar: usize) {
        self.bar = bar;
        self.beat = 0;
        self.part = 0;
        self.arpeggio = 0;
        self.arpeggio_sample_countdown = 0;
    }

    /// Repair a position that no longer fits the song (after a song swap
    /// or an edit). Returns `true` when the repaired position ended playback.
    pub fn normalize(
        &mut self,
        song: &Song,
        samples_per_arpeggio: usize,
        loops: &mut LoopSettings,
    ) -> bool {
        let loop_end = song.loop_start + song.loop_length;
        let mut ended = false;

        if self.arpeggio_sample_countdown == 0 || self.arpeggio_sample_countdown > samples_per_arpeggio {
            self.arpeggio_sample_countdown = samples_per_arpeggio;
        }
        if self.part >= song.parts_per_beat {
            self.beat += 1;
            self.part = 0;
            self.arpeggio = 0;
            self.arpeggio_sample_countdown = samples_per_arpeggio;
        }
        if self.beat >= song.beats_per_bar {
            self.bar += 1;
            self.beat = 0;
            self.part = 0;
            self.arpeggio = 0;
            self.arpeggio_sample_countdown = samples_per_arpeggio;

            if loops.loop_count < 0 {
                if self.bar < song.loop_start && !loops.enable_intro {
                    self.bar = song.loop_start;
                }
                if self.bar >= loop_end && !loops.enable_outro {
                    self.bar = song.loop_start;
                }
            }
        }
        if self.bar >= song.bar_count {
            if loops.enable_outro {
                self.bar = 0;
                loops.enable_intro = true;
                ended = true;
            } else {
                self.bar = song.loop_start;
            }
        }
        if self.bar >= song.loop_start {
            loops.enable_intro = false;
        }
        ended
    }

    /// Consume `run_length` samples of the current tick and carry into the
    /// outer counters when the tick is exhausted.
    pub fn advance(
        &mut self,
        run_length: usize,
        song: &Song,
        samples_per_arpeggio: usize,
        loops: &mut LoopSettings,
    ) -> Step {
        self.arpeggio_sample_countdown = self.arpeggio_sample_countdown.saturating_sub(run_length);
        if self.arpeggio_sample_countdown > 0 {
            return Step::Continue;
        }

        self.arpeggio_sample_countdown = samples_per_arpeggio;
        self.arpeggio += 1;
        if self.arpeggio < ARPEGGIOS_PER_PART {
            return Step::Continue;
        }
        self.arpeggio = 0;
        self.part += 1;
        if self.part < song.parts_per_beat {
            return Step::Continue;
        }
        self.part = 0;
        self.beat += 1;
        if self.beat < song.beats_per_bar {
            return Step::Continue;
        }
        self.beat = 0;
        self.bar += 1;
        self.wrap_bar(song, loops)
    }

    /// Apply intro, loop and outro rules after entering a new bar.
    fn wrap_bar(&mut self, song: &Song, loops: &mut LoopSettings) -> Step {
        let loop_end = song.loop_start + song.loop_length;

        if self.bar < song.loop_start {
            if !loops.enable_intro {
                self.bar = song.loop_start;
            }
        } else {
            loops.enable_intro = false;
        }

        if self.bar >= loop_end {
            if loops.loop_count > 0 {
                loops.loop_count -= 1;
            }
            if loops.loop_count > 0 || (loops.loop_count < 0 && !loops.enable_outro) {
                self.bar = song.loop_start;
            } else if !loops.enable_outro {
                return self.finish(loops);
            }
        }

        if self.bar >= song.bar_count {
            return self.finish(loops);
        }
        Step::BarChanged
    }

    fn finish(&mut self, loops: &mut LoopSettings) -> Step {
        self.bar = 0;
        loops.enable_intro = true;
        Step::Ended
    }

    /// Fractional position in bars.
    pub fn playhead(&self, song: &Song, samples_per_arpeggio: usize) -> f64 {
        let tick_fraction = if samples_per_arpeggio == 0 {
            0.0
        } else {
            self.arpeggio_sample_countdown as f64 / samples_per_arpeggio as f64
        };
        let parts = song.parts_per_beat.max(1) as f64;
        let beats = song.beats_per_bar.max(1) as f64;
        (((self.arpeggio as f64 + 1.0 - tick_fraction) / ARPEGGIOS_PER_PART as f64
            + self.part as f64)
            / parts
            + self.beat as f64)
            / beats
            + self.bar as f64
    }

    /// Seek to a fractional bar position, clamped to the song.
    pub fn set_playhead(
        &mut self,
        value: f64,
        song: &Song,
        samples_per_arpeggio: usize,
        loops: &mut LoopSettings,
    ) {
        let value = if value.is_finite() { value } else { 0.0 };
        let playhead = value.clamp(0.0, song.bar_count as f64);

        let bar = playhead.floor();
        let beat_position = song.beats_per_bar as f64 * (playhead - bar);
        let beat = beat_position.floor();
        let part_position = song.parts_per_beat as f64 * (beat_position - beat);
        let part = part_position.floor();
        let arpeggio_position = ARPEGGIOS_PER_PART as f64 * (part_position - part);
        let arpeggio = arpeggio_position.floor();
        let spa = samples_per_arpeggio as f64;

        self.bar = bar as usize;
        self.beat = beat as usize;
        self.part = part as usize;
        self.arpeggio = arpeggio as usize;
        self.arpeggio_sample_countdown = (spa - spa * (arpeggio_position - arpeggio)).floor() as usize;

        if self.bar < song.loop_start {
            loops.enable_intro = true;
        }
        if self.bar > song.loop_start + song.loop_length {
            loops.enable_outro = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endless() -> LoopSettings {
        LoopSettings {
            enable_intro: false,
            enable_outro: false,
            loop_count: -1,
        }
    }

    fn tick(scheduler: &mut Scheduler, song: &Song, spa: usize, loops: &mut LoopSettings) -> Step {
        scheduler.advance(spa, song, spa, loops)
    }

    #[test]
    fn test_odometer_carries_whole_bars() {
        let mut song = Song::default();
        song.loop_length = song.bar_count;
        let spa = 10;
        let ticks_per_bar = song.beats_per_bar * song.parts_per_beat * ARPEGGIOS_PER_PART;

        for k in 1..4 {
            let mut scheduler = Scheduler::new();
            let mut loops = endless();
            assert!(!scheduler.normalize(&song, spa, &mut loops));
            for _ in 0..ticks_per_bar * k {
                tick(&mut scheduler, &song, spa, &mut loops);
            }
            assert_eq!(scheduler.bar, k, "after {k} bars");
            assert_eq!((scheduler.beat, scheduler.part, scheduler.arpeggio), (0, 0, 0));
        }
    }

    #[test]
    fn test_partial_run_keeps_tick() {
        let song = Song::default();
        let mut scheduler = Scheduler::new();
        let mut loops = endless();
        scheduler.normalize(&song, 100, &mut loops);
        assert_eq!(scheduler.advance(40, &song, 100, &mut loops), Step::Continue);
        assert_eq!(scheduler.arpeggio_sample_countdown, 60);
        assert_eq!(scheduler.arpeggio, 0);
        scheduler.advance(60, &song, 100, &mut loops);
        assert_eq!(scheduler.arpeggio, 1);
        assert_eq!(scheduler.arpeggio_sample_countdown, 100);
    }

    #[test]
    fn test_endless_loop_wraps_to_loop_start() {
        let mut song = Song::default();
        song.loop_start = 2;
        song.loop_length = 2;
        let mut scheduler = Scheduler::new();
        scheduler.snap_to_bar(3);
        scheduler.beat = song.beats_per_bar - 1;
        scheduler.part = song.parts_per_beat - 1;
        scheduler.arpeggio = 3;
        scheduler.arpeggio_sample_countdown = 1;
        let mut loops = endless();
        assert_eq!(scheduler.advance(1, &song, 1, &mut loops), Step::BarChanged);
        assert_eq!(scheduler.bar, 2);
    }

    #[test]
    fn test_finite_loops_end_without_outro() {
        let mut song = Song::default();
        song.loop_start = 0;
        song.loop_length = 1;
        let ticks_per_bar = song.beats_per_bar * song.parts_per_beat * ARPEGGIOS_PER_PART;
        let mut loops = LoopSettings {
            enable_intro: false,
            enable_outro: false,
            loop_count: 2,
        };
        let mut scheduler = Scheduler::new();
        scheduler.normalize(&song, 1, &mut loops);

        let mut steps = Vec::new();
        for _ in 0..ticks_per_bar * 2 {
            let step = tick(&mut scheduler, &song, 1, &mut loops);
            if step != Step::Continue {
                steps.push(step);
            }
        }
        assert_eq!(steps, vec![Step::BarChanged, Step::Ended]);
        assert_eq!(loops.loop_count, 0);
        assert_eq!(scheduler.bar, 0);
    }

    #[test]
    fn test_outro_plays_then_ends() {
        let mut song = Song::default();
        song.bar_count = 3;
        song.loop_start = 0;
        song.loop_length = 1;
        let mut loops = LoopSettings {
            enable_intro: false,
            enable_outro: true,
            loop_count: 1,
        };
        let mut scheduler = Scheduler::new();
        scheduler.snap_to_bar(0);
        scheduler.normalize(&song, 1, &mut loops);
        let ticks_per_bar = song.beats_per_bar * song.parts_per_beat * ARPEGGIOS_PER_PART;

        let mut bars = Vec::new();
        for _ in 0..ticks_per_bar * 3 {
            match tick(&mut scheduler, &song, 1, &mut loops) {
                Step::BarChanged => bars.push(scheduler.bar),
                Step::Ended => {
                    bars.push(usize::MAX);
                    break;
                }
                Step::Continue => {}
            }
        }
        assert_eq!(bars, vec![1, 2, usize::MAX]);
    }

    #[test]
    fn test_intro_is_consumed_once() {
        let mut song = Song::default();
        song.loop_start = 1;
        song.loop_length = 1;
        let mut loops = LoopSettings::default();
        let mut scheduler = Scheduler::new();
        scheduler.normalize(&song, 1, &mut loops);
        assert!(loops.enable_intro);
        let ticks_per_bar = song.beats_per_bar * song.parts_per_beat * ARPEGGIOS_PER_PART;
        for _ in 0..ticks_per_bar * 2 {
            tick(&mut scheduler, &song, 1, &mut loops);
        }
        assert_eq!(scheduler.bar, 1);
        assert!(!loops.enable_intro);
    }

    #[test]
    fn test_playhead_round_trips_through_seek() {
        let song = Song::default();
        let spa = 1000;
        let mut scheduler = Scheduler::new();
        let mut loops = endless();
        scheduler.set_playhead(2.3, &song, spa, &mut loops);
        assert_eq!(scheduler.bar, 2);
        let playhead = scheduler.playhead(&song, spa);
        assert!((playhead - 2.3).abs() < 1e-3, "playhead {playhead}");
    }

    #[test]
    fn test_seek_clamps_and_flags_regions() {
        let mut song = Song::default();
        song.loop_start = 4;
        song.loop_length = 4;
        let mut scheduler = Scheduler::new();
        let mut loops = endless();
        scheduler.set_playhead(1.0, &song, 10, &mut loops);
        assert!(loops.enable_intro);
        scheduler.set_playhead(12.0, &song, 10, &mut loops);
        assert!(loops.enable_outro);
        scheduler.set_playhead(99.0, &song, 10, &mut loops);
        assert_eq!(scheduler.bar, song.bar_count);
        scheduler.set_playhead(-5.0, &song, 10, &mut loops);
        assert_eq!(scheduler.bar, 0);
    }
}
