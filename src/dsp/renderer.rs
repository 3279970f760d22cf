//! Offline renderer: one full playthrough of a song as mono f32 samples.

use crate::error::ConfigurationError;
use crate::song::Song;

use super::engine::Synth;
use super::scheduler::LoopSettings;

/// Samples rendered per `synthesize` call, matching a typical host buffer.
const BLOCK_SIZE: usize = 4096;

/// Render `song` from the top: intro, `loop_count` passes of the loop
/// (at least one), then the outro. Returns exactly `Synth::total_samples`
/// samples.
pub fn render_samples(song: Song, sample_rate: f64, loop_count: u32) -> Result<Vec<f32>, ConfigurationError> {
    let mut synth = Synth::with_song(song, sample_rate)?;
    synth.loop_settings = LoopSettings {
        enable_intro: true,
        enable_outro: true,
        loop_count: loop_count.clamp(1, i32::MAX as u32) as i32,
    };
    synth.warm_up()?;
    synth.snap_to_start();
    synth.play();

    let total = synth.total_samples();
    let mut samples = vec![0.0f32; total];
    for block in samples.chunks_mut(BLOCK_SIZE) {
        synth.synthesize(block)?;
    }
    Ok(samples)
}
