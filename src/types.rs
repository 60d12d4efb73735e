use serde::{Deserialize, Serialize};

/// Where a sound is in its load lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
    /// The last load attempt failed. `play` will not download again.
    Failed,
}

/// Snapshot of a sound's state, handed to JavaScript as JSON for debugging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundInfo {
    pub id: String,
    pub src: String,
    pub volume: f32,
    pub pan: f32,
    pub pitch: f32,
    pub looped: bool,
    pub fade: f32,
    pub playing: bool,
    pub state: LoadState,
    pub used_memory: f64,
}

/// Playback rate for a pitch offset given in semitones.
pub fn semitones_to_rate(semitones: f32) -> f32 {
    2f32.powf(semitones / 12.0)
}

pub(crate) fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        return 0.0;
    }
    volume.clamp(0.0, 1.0)
}

pub(crate) fn clamp_pan(pan: f32) -> f32 {
    if pan.is_nan() {
        return 0.0;
    }
    pan.clamp(-1.0, 1.0)
}

/// Longest fade or portamento accepted, in seconds.
pub const MAX_SECONDS: f32 = 86_400.0;

/// Durations and time constants: within [0, MAX_SECONDS], zero when not finite.
pub(crate) fn clamp_seconds(seconds: f32) -> f32 {
    if seconds.is_finite() && seconds > 0.0 {
        seconds.min(MAX_SECONDS)
    } else {
        0.0
    }
}
