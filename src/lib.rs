pub mod bitfield;
pub mod config;
pub mod dsp;
pub mod error;
pub mod song;

pub use crate::error::{CodecError, ConfigurationError, DecodeError, Error, Result};
pub use crate::song::{Channel, Instrument, InstrumentType, Note, NotePin, Pattern, Song};

use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the chipwalker-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// Decode a song string (or a JSON document starting with `{`).
pub fn load_song(input: &str) -> std::result::Result<Song, DecodeError> {
    Song::from_base64_string(input)
}

/// WASM-exposed: decode a song string into its JSON export (intro, one loop
/// pass, outro).
#[wasm_bindgen]
pub fn song_to_json(hash: &str) -> std::result::Result<JsValue, JsValue> {
    let song = load_song(hash).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let json = song.to_json_object(true, 1, true);
    serde_wasm_bindgen::to_value(&json).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: import a JSON song object and return its song string.
#[wasm_bindgen]
pub fn song_from_json(value: JsValue) -> std::result::Result<String, JsValue> {
    let json: serde_json::Value =
        serde_wasm_bindgen::from_value(value).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    Song::from_json_object(&json)
        .to_base64_string()
        .map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: decode and re-encode a song string at the latest format
/// version, clamping every field into range.
#[wasm_bindgen]
pub fn normalize_song(hash: &str) -> std::result::Result<String, JsValue> {
    let song = load_song(hash).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    song.to_base64_string().map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: decode a song string and render it to mono f32 samples.
/// Returns the raw audio buffer for AudioWorklet playback.
#[wasm_bindgen]
pub fn render_song_samples(
    hash: &str,
    sample_rate: u32,
    loop_count: u32,
) -> std::result::Result<Vec<f32>, JsValue> {
    let song = load_song(hash).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    dsp::renderer::render_samples(song, sample_rate as f64, loop_count)
        .map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: a caret diagnostic for a song string that fails to decode,
/// or `None` when it decodes cleanly.
#[wasm_bindgen]
pub fn song_error_report(hash: &str) -> Option<String> {
    load_song(hash).err().map(|e| e.report(hash))
}
