use std::cell::Cell;
use std::rc::Rc;

use log::debug;

use crate::backend::AudioBackend;
use crate::config::AudioSettings;
use crate::error::Result;
use crate::sound::BufferedSound;

/// Shared state of every sound: the host binding, settings and the amount
/// of decoded audio currently held in memory.
pub struct AudioManager<B: AudioBackend> {
    backend: B,
    settings: AudioSettings,
    used_memory: Cell<f64>,
}

impl<B: AudioBackend> AudioManager<B> {
    pub fn new(backend: B, settings: AudioSettings) -> Rc<Self> {
        debug!("Creating audio manager with {:?}", settings);
        Rc::new(Self {
            backend,
            settings,
            used_memory: Cell::new(0.0),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settings(&self) -> &AudioSettings {
        &self.settings
    }

    /// Seconds of decoded audio held by loaded sounds.
    pub fn used_memory(&self) -> f64 {
        self.used_memory.get()
    }

    /// URI a sound's `src` is fetched from.
    pub fn resolve(&self, src: &str) -> String {
        format!("{}{}", self.settings.audio_path, src)
    }

    pub fn create_sound(self: &Rc<Self>, id: &str, src: &str) -> Result<BufferedSound<B>> {
        BufferedSound::new(self.clone(), id, src)
    }

    pub async fn resume(&self) -> Result<()> {
        self.backend.resume().await
    }

    pub(crate) fn charge_memory(&self, seconds: f64) {
        self.used_memory.set(self.used_memory.get() + seconds);
    }

    pub(crate) fn release_memory(&self, seconds: f64) {
        self.used_memory.set((self.used_memory.get() - seconds).max(0.0));
    }
}
