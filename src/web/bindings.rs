//! JavaScript-facing wrappers.
//!
//! ```javascript
//! import init, { WebAudioManager } from './buffered_sound.js';
//!
//! await init();
//! const audio = new WebAudioManager('{ "audioPath": "audio/" }');
//! const music = audio.create_sound('theme', 'theme.ogg');
//! music.set_loop(true);
//! music.set_fade(1.5);
//! button.onclick = async () => { await audio.resume(); music.play(0.8); };
//! ```

use std::rc::Rc;

use js_sys::{Function, Promise};
use log::warn;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use super::backend::WebAudioBackend;
use crate::config::AudioSettings;
use crate::error::Result;
use crate::manager::AudioManager;
use crate::sound::BufferedSound;

#[wasm_bindgen]
pub struct WebAudioManager {
    inner: Rc<AudioManager<WebAudioBackend>>,
}

#[wasm_bindgen]
impl WebAudioManager {
    /// `settings` is an optional JSON object, see `AudioSettings`.
    #[wasm_bindgen(constructor)]
    pub fn new(settings: Option<String>) -> std::result::Result<WebAudioManager, JsValue> {
        let settings = match settings {
            Some(json) => AudioSettings::from_json(&json)?,
            None => AudioSettings::default(),
        };
        let backend = WebAudioBackend::new()?;
        Ok(Self {
            inner: AudioManager::new(backend, settings),
        })
    }

    pub fn create_sound(&self, id: &str, src: &str) -> std::result::Result<WebSound, JsValue> {
        Ok(WebSound {
            inner: self.inner.create_sound(id, src)?,
        })
    }

    /// Resumes the audio context; call it from a user gesture.
    pub fn resume(&self) -> Promise {
        let manager = self.inner.clone();
        future_to_promise(async move {
            manager.resume().await?;
            Ok(JsValue::UNDEFINED)
        })
    }

    #[wasm_bindgen(getter)]
    pub fn used_memory(&self) -> f64 {
        self.inner.used_memory()
    }
}

#[wasm_bindgen]
pub struct WebSound {
    inner: BufferedSound<WebAudioBackend>,
}

fn call_js(callback: &Function, arg: &JsValue) {
    if let Err(err) = callback.call1(&JsValue::NULL, arg) {
        warn!("Sound callback threw: {:?}", err);
    }
}

fn js_result(result: Result<()>) -> std::result::Result<(), JsValue> {
    result.map_err(JsValue::from)
}

#[wasm_bindgen]
impl WebSound {
    pub fn play(
        &self,
        volume: Option<f32>,
        pan: Option<f32>,
        pitch: Option<f32>,
    ) -> std::result::Result<(), JsValue> {
        js_result(self.inner.play(volume, pan, pitch))
    }

    /// The callback runs once the sound has faded out.
    pub fn stop(&self, callback: Option<Function>) -> std::result::Result<(), JsValue> {
        let callback = callback.map(|f| {
            Box::new(move || call_js(&f, &JsValue::UNDEFINED)) as Box<dyn FnOnce()>
        });
        js_result(self.inner.stop(callback))
    }

    /// The callback receives `null` on success, an error otherwise.
    pub fn load(&self, callback: Option<Function>) {
        let callback = callback.map(|f| {
            Box::new(move |result: Result<()>| {
                let arg = match result {
                    Ok(()) => JsValue::NULL,
                    Err(err) => JsValue::from(err),
                };
                call_js(&f, &arg);
            }) as Box<dyn FnOnce(Result<()>)>
        });
        self.inner.load(callback);
    }

    pub fn unload(&self) -> std::result::Result<bool, JsValue> {
        Ok(self.inner.unload()?)
    }

    pub fn set_volume(&self, volume: f32) -> std::result::Result<(), JsValue> {
        js_result(self.inner.set_volume(volume))
    }

    pub fn set_pan(&self, pan: f32) -> std::result::Result<(), JsValue> {
        js_result(self.inner.set_pan(pan))
    }

    pub fn set_loop(&self, looped: bool) {
        self.inner.set_loop(looped);
    }

    pub fn set_pitch(&self, pitch: f32, portamento: Option<f32>) -> std::result::Result<(), JsValue> {
        js_result(self.inner.set_pitch(pitch, portamento))
    }

    pub fn set_fade(&self, seconds: f32) {
        self.inner.set_fade(seconds);
    }

    #[wasm_bindgen(getter)]
    pub fn id(&self) -> String {
        self.inner.id()
    }

    #[wasm_bindgen(getter)]
    pub fn playing(&self) -> bool {
        self.inner.is_playing()
    }

    #[wasm_bindgen(getter)]
    pub fn loaded(&self) -> bool {
        self.inner.is_loaded()
    }

    #[wasm_bindgen(getter)]
    pub fn used_memory(&self) -> f64 {
        self.inner.used_memory()
    }

    /// JSON snapshot of the sound's state.
    pub fn info(&self) -> std::result::Result<String, JsValue> {
        Ok(serde_json::to_string(&self.inner.info()).map_err(crate::SoundError::from)?)
    }
}
