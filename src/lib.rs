//! Sound playback on top of a host audio graph.
//!
//! Each [`BufferedSound`] owns a gain node and a pan node wired to the
//! output, and creates a fresh buffer source for every playback. Fetching,
//! decoding, mixing and scheduling are left to the host; in the browser
//! that is the Web Audio API (see the `web` module, built for wasm32).

pub mod backend;
pub mod config;
pub mod error;
pub mod manager;
pub mod sound;
pub mod types;

#[cfg(target_arch = "wasm32")]
pub mod web;

#[cfg(test)]
mod testing;

pub use backend::AudioBackend;
pub use config::AudioSettings;
pub use error::{Result, SoundError};
pub use manager::AudioManager;
pub use sound::{BufferedSound, LoadCallback, StopCallback};
pub use types::{semitones_to_rate, LoadState, SoundInfo};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

// Initialize panic hook and console logging for the browser
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).ok();
}
