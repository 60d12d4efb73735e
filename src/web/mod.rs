//! Browser binding: the Web Audio backend and the JavaScript facade.

mod backend;
mod bindings;

pub use backend::{WebAudioBackend, WebGain, WebPanner, WebSource, WebTimeout};
pub use bindings::{WebAudioManager, WebSound};
