use std::cell::RefCell;
use std::time::Duration;

use futures::future::{FutureExt, LocalBoxFuture};
use js_sys::{ArrayBuffer, Reflect};
use log::debug;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    AudioBuffer, AudioBufferSourceNode, AudioContext, AudioScheduledSourceNode, GainNode,
    PannerNode, Response, StereoPannerNode,
};

use crate::backend::{
    check_status, AudioBackend, DecodedBuffer, GainControl, PanControl, SourceControl,
};
use crate::error::{Result, SoundError};

fn js_message(value: JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            value
                .dyn_ref::<js_sys::Error>()
                .map(|err| String::from(err.message()))
        })
        .unwrap_or_else(|| format!("{:?}", value))
}

impl From<JsValue> for SoundError {
    fn from(value: JsValue) -> Self {
        SoundError::Graph(js_message(value))
    }
}

impl From<SoundError> for JsValue {
    fn from(err: SoundError) -> Self {
        js_sys::Error::new(&err.to_string()).into()
    }
}

fn window() -> Result<web_sys::Window> {
    web_sys::window().ok_or_else(|| SoundError::Host("no global window".into()))
}

impl DecodedBuffer for AudioBuffer {
    fn duration(&self) -> f64 {
        AudioBuffer::duration(self)
    }
}

pub struct WebGain(GainNode);

impl GainControl for WebGain {
    fn set_value(&self, value: f32) {
        self.0.gain().set_value(value);
    }

    fn set_target_at_time(&self, target: f32, start_time: f64, time_constant: f32) -> Result<()> {
        self.0
            .gain()
            .set_target_at_time(target, start_time, time_constant.into())?;
        Ok(())
    }
}

pub enum WebPanner {
    Stereo(StereoPannerNode),
    /// Hosts without `createStereoPanner` get a 3-D panner.
    Spatial(PannerNode),
}

impl WebPanner {
    fn node(&self) -> &web_sys::AudioNode {
        match self {
            WebPanner::Stereo(node) => node,
            WebPanner::Spatial(node) => node,
        }
    }
}

impl PanControl for WebPanner {
    #[allow(deprecated)]
    fn set_pan(&self, pan: f32) -> Result<()> {
        match self {
            WebPanner::Stereo(node) => node.pan().set_value(pan),
            WebPanner::Spatial(node) => node.set_position(pan.into(), 0.0, 0.2),
        }
        Ok(())
    }
}

pub struct WebSource {
    node: AudioBufferSourceNode,
    on_ended: RefCell<Option<Closure<dyn FnMut()>>>,
}

impl WebSource {
    fn scheduled(&self) -> &AudioScheduledSourceNode {
        &self.node
    }
}

impl SourceControl for WebSource {
    fn set_loop(&self, looped: bool, loop_start: f64, loop_end: f64) {
        self.node.set_loop(looped);
        self.node.set_loop_start(loop_start);
        self.node.set_loop_end(loop_end);
    }

    fn set_rate_target(&self, rate: f32, start_time: f64, time_constant: f32) -> Result<()> {
        self.node
            .playback_rate()
            .set_target_at_time(rate, start_time, time_constant.into())?;
        Ok(())
    }

    fn start(&self) -> Result<()> {
        self.scheduled().start()?;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.scheduled().stop()?;
        Ok(())
    }

    fn set_on_ended(&self, callback: Option<Box<dyn FnOnce()>>) {
        let closure: Option<Closure<dyn FnMut()>> =
            callback.map(|callback| Closure::once(move || callback()));
        self.scheduled()
            .set_onended(closure.as_ref().map(|c| c.as_ref().unchecked_ref::<js_sys::Function>()));
        *self.on_ended.borrow_mut() = closure;
    }
}

impl Drop for WebSource {
    fn drop(&mut self) {
        // the closure is freed with us, so the node must not call it afterwards
        self.scheduled().set_onended(None);
    }
}

pub struct WebTimeout {
    handle: i32,
    _callback: Closure<dyn FnMut()>,
}

/// Host binding over the browser's Web Audio API.
pub struct WebAudioBackend {
    context: AudioContext,
    stereo: bool,
}

impl WebAudioBackend {
    pub fn new() -> Result<Self> {
        let context = AudioContext::new()?;
        let stereo = Reflect::has(&context, &JsValue::from_str("createStereoPanner")).unwrap_or(false);
        debug!(
            "Created audio context at {}Hz, stereo panner: {}",
            context.sample_rate(),
            stereo
        );
        Ok(Self { context, stereo })
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }
}

impl AudioBackend for WebAudioBackend {
    type Bytes = ArrayBuffer;
    type Buffer = AudioBuffer;
    type Gain = WebGain;
    type Panner = WebPanner;
    type Source = WebSource;
    type Timeout = WebTimeout;

    fn current_time(&self) -> f64 {
        self.context.current_time()
    }

    fn now_ms(&self) -> f64 {
        js_sys::Date::now()
    }

    fn create_gain(&self) -> Result<WebGain> {
        Ok(WebGain(self.context.create_gain()?))
    }

    fn create_panner(&self) -> Result<WebPanner> {
        if self.stereo {
            Ok(WebPanner::Stereo(self.context.create_stereo_panner()?))
        } else {
            Ok(WebPanner::Spatial(self.context.create_panner()?))
        }
    }

    fn connect_output(&self, gain: &WebGain, panner: &WebPanner) -> Result<()> {
        gain.0.connect_with_audio_node(panner.node())?;
        panner
            .node()
            .connect_with_audio_node(&self.context.destination())?;
        Ok(())
    }

    fn create_source(&self, buffer: &AudioBuffer, gain: &WebGain) -> Result<WebSource> {
        let node = self.context.create_buffer_source()?;
        node.set_buffer(Some(buffer));
        node.connect_with_audio_node(&gain.0)?;
        Ok(WebSource {
            node,
            on_ended: RefCell::new(None),
        })
    }

    fn fetch(&self, uri: &str) -> LocalBoxFuture<'static, Result<ArrayBuffer>> {
        let uri = uri.to_string();
        async move {
            let request = window()?.fetch_with_str(&uri);
            let response: Response = JsFuture::from(request)
                .await
                .map_err(|err| SoundError::Fetch(js_message(err)))?
                .dyn_into()?;
            check_status(&uri, response.status())?;
            let body = JsFuture::from(response.array_buffer()?).await?;
            Ok(body.dyn_into::<ArrayBuffer>()?)
        }
        .boxed_local()
    }

    fn decode(&self, bytes: ArrayBuffer) -> LocalBoxFuture<'static, Result<AudioBuffer>> {
        let context = self.context.clone();
        async move {
            let promise = context.decode_audio_data(&bytes)?;
            let decoded = JsFuture::from(promise)
                .await
                .map_err(|err| SoundError::Decode(js_message(err)))?;
            Ok(decoded.dyn_into::<AudioBuffer>()?)
        }
        .boxed_local()
    }

    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        wasm_bindgen_futures::spawn_local(task);
    }

    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> Result<WebTimeout> {
        let closure: Closure<dyn FnMut()> = Closure::once(move || callback());
        let handle = window()?.set_timeout_with_callback_and_timeout_and_arguments_0(
            closure.as_ref().unchecked_ref(),
            delay.as_millis().min(i32::MAX as u128) as i32,
        )?;
        Ok(WebTimeout {
            handle,
            _callback: closure,
        })
    }

    fn clear_timeout(&self, timeout: WebTimeout) {
        if let Ok(window) = window() {
            window.clear_timeout_with_handle(timeout.handle);
        }
    }

    fn resume(&self) -> LocalBoxFuture<'static, Result<()>> {
        let resumed = self.context.resume();
        async move {
            JsFuture::from(resumed?).await?;
            Ok(())
        }
        .boxed_local()
    }
}
