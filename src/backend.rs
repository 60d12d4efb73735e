//! The seam between a sound and the host audio subsystem.
//!
//! Every method maps to one host call: create a node, connect it, set a
//! parameter, schedule a ramp. The browser binding lives in `crate::web`.

use std::time::Duration;

use futures::future::LocalBoxFuture;

use crate::error::{Result, SoundError};

/// A decoded, playable sample buffer owned by the host.
pub trait DecodedBuffer: Clone {
    /// Length in seconds.
    fn duration(&self) -> f64;
}

/// Volume node. Values are linear gain.
pub trait GainControl {
    fn set_value(&self, value: f32);

    /// Exponential approach toward `target` starting at `start_time` on the
    /// audio clock. A time constant of zero jumps straight to the target.
    fn set_target_at_time(&self, target: f32, start_time: f64, time_constant: f32) -> Result<()>;
}

/// Stereo or positional panning node.
pub trait PanControl {
    /// `pan` is in [-1, 1], left to right.
    fn set_pan(&self, pan: f32) -> Result<()>;
}

/// A one-shot buffer source. It can be started once; a new one is created
/// for every playback.
pub trait SourceControl {
    fn set_loop(&self, looped: bool, loop_start: f64, loop_end: f64);

    fn set_rate_target(&self, rate: f32, start_time: f64, time_constant: f32) -> Result<()>;

    fn start(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;

    /// Installs (or with `None`, removes) the handler run when playback ends.
    fn set_on_ended(&self, callback: Option<Box<dyn FnOnce()>>);
}

pub trait AudioBackend: 'static {
    type Bytes: 'static;
    type Buffer: DecodedBuffer + 'static;
    type Gain: GainControl + 'static;
    type Panner: PanControl + 'static;
    type Source: SourceControl + 'static;
    type Timeout: 'static;

    /// Audio clock in seconds; ramps are scheduled against it.
    fn current_time(&self) -> f64;

    /// Wall clock in milliseconds.
    fn now_ms(&self) -> f64;

    fn create_gain(&self) -> Result<Self::Gain>;

    /// Stereo panner when the host has one, positional panner otherwise.
    fn create_panner(&self) -> Result<Self::Panner>;

    /// Wires gain -> panner -> destination.
    fn connect_output(&self, gain: &Self::Gain, panner: &Self::Panner) -> Result<()>;

    /// Creates a source playing `buffer`, connected to `gain`.
    fn create_source(&self, buffer: &Self::Buffer, gain: &Self::Gain) -> Result<Self::Source>;

    fn fetch(&self, uri: &str) -> LocalBoxFuture<'static, Result<Self::Bytes>>;

    fn decode(&self, bytes: Self::Bytes) -> LocalBoxFuture<'static, Result<Self::Buffer>>;

    /// Drives a future to completion on the host's event loop.
    fn spawn(&self, task: LocalBoxFuture<'static, ()>);

    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> Result<Self::Timeout>;

    fn clear_timeout(&self, timeout: Self::Timeout);

    /// Resumes a context the host started suspended.
    fn resume(&self) -> LocalBoxFuture<'static, Result<()>>;
}

/// Status check applied to every asset response. `file://` URLs and
/// packaged apps answer with 0.
pub fn check_status(uri: &str, status: u16) -> Result<()> {
    match status {
        200 | 0 => Ok(()),
        status => Err(SoundError::Status {
            uri: uri.to_string(),
            status,
        }),
    }
}
