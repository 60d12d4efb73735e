//! Buffered sound: a decoded buffer played through
//! source -> gain -> pan -> destination.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use futures::future::{FutureExt, LocalBoxFuture};
use log::{debug, error, warn};

use crate::backend::{AudioBackend, DecodedBuffer, GainControl, PanControl, SourceControl};
use crate::error::{Result, SoundError};
use crate::manager::AudioManager;
use crate::types::{
    clamp_pan, clamp_seconds, clamp_volume, semitones_to_rate, LoadState, SoundInfo,
};

pub type LoadCallback = Box<dyn FnOnce(Result<()>)>;
pub type StopCallback = Box<dyn FnOnce()>;

/// A play requested before the buffer was available.
#[derive(Debug, Clone, Copy)]
struct PendingPlay {
    requested_at: f64,
    pitch: Option<f32>,
}

struct FadeOut<B: AudioBackend> {
    timeout: B::Timeout,
    on_stopped: Option<StopCallback>,
}

struct SoundState<B: AudioBackend> {
    this: Weak<RefCell<SoundState<B>>>,
    manager: Rc<AudioManager<B>>,
    id: String,
    src: String,

    volume: f32,
    pan: f32,
    pitch: f32,
    play_pitch: f32,
    looped: bool,
    fade: f32,
    playing: bool,

    state: LoadState,
    pending_play: Option<PendingPlay>,
    buffer: Option<B::Buffer>,
    used_memory: f64,

    gain: B::Gain,
    panner: B::Panner,
    source: Option<B::Source>,
    // bumped for every new source; host callbacks carry the value they were made with
    generation: u64,
    fade_out: Option<FadeOut<B>>,

    load_callbacks: Vec<LoadCallback>,
    // user callbacks, run once the state is no longer borrowed
    deferred: Vec<Box<dyn FnOnce()>>,
}

/// Handle to a sound. Clones share the same sound.
pub struct BufferedSound<B: AudioBackend> {
    state: Rc<RefCell<SoundState<B>>>,
}

impl<B: AudioBackend> Clone for BufferedSound<B> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<B: AudioBackend> BufferedSound<B> {
    pub(crate) fn new(manager: Rc<AudioManager<B>>, id: &str, src: &str) -> Result<Self> {
        let backend = manager.backend();
        let gain = backend.create_gain()?;
        let panner = backend.create_panner()?;
        backend.connect_output(&gain, &panner)?;
        gain.set_value(0.0);

        debug!("Created sound {} ({})", id, src);

        let state = Rc::new_cyclic(|this| {
            RefCell::new(SoundState {
                this: this.clone(),
                manager,
                id: id.to_string(),
                src: src.to_string(),
                volume: 1.0,
                pan: 0.0,
                pitch: 0.0,
                play_pitch: 0.0,
                looped: false,
                fade: 0.0,
                playing: false,
                state: LoadState::Unloaded,
                pending_play: None,
                buffer: None,
                used_memory: 0.0,
                gain,
                panner,
                source: None,
                generation: 0,
                fade_out: None,
                load_callbacks: Vec::new(),
                deferred: Vec::new(),
            })
        });

        Ok(Self { state })
    }

    /// Sets the volume in [0, 1]. A playing sound glides there over the fade time.
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.state.borrow_mut().set_volume(volume)
    }

    /// Sets the stereo position in [-1, 1].
    pub fn set_pan(&self, pan: f32) -> Result<()> {
        self.state.borrow_mut().set_pan(pan)
    }

    pub fn set_loop(&self, looped: bool) {
        self.state.borrow_mut().set_loop(looped)
    }

    /// Sets the pitch in semitones. `portamento` is the time constant of
    /// the slide from the current rate, in seconds.
    pub fn set_pitch(&self, pitch: f32, portamento: Option<f32>) -> Result<()> {
        self.state
            .borrow_mut()
            .set_pitch(pitch, portamento.unwrap_or(0.0))
    }

    /// Sets the fade duration in seconds used when starting, stopping and
    /// changing volume. Zero disables fading.
    pub fn set_fade(&self, seconds: f32) {
        self.state.borrow_mut().fade = clamp_seconds(seconds);
    }

    /// Downloads and decodes the sound. The callback receives the outcome;
    /// loading an already loaded sound completes at once.
    pub fn load(&self, callback: Option<LoadCallback>) {
        let task = self.state.borrow_mut().begin_load(callback);
        self.spawn(task);
        flush(&self.state);
    }

    /// Plays the sound, loading it first if needed. `pitch` is a semitone
    /// offset for this playback only, on top of the sound's pitch.
    pub fn play(&self, volume: Option<f32>, pan: Option<f32>, pitch: Option<f32>) -> Result<()> {
        let result = self.state.borrow_mut().play(volume, pan, pitch);
        flush(&self.state);
        self.spawn(result?);
        Ok(())
    }

    /// Stops the sound, fading out if a fade is set. The callback runs once
    /// the sound is silent.
    pub fn stop(&self, callback: Option<StopCallback>) -> Result<()> {
        let result = self.state.borrow_mut().stop(callback);
        flush(&self.state);
        result
    }

    /// Stops playback and frees the decoded buffer. Returns false if the
    /// sound was not loaded.
    pub fn unload(&self) -> Result<bool> {
        let result = self.state.borrow_mut().unload();
        flush(&self.state);
        result
    }

    pub fn id(&self) -> String {
        self.state.borrow().id.clone()
    }

    pub fn src(&self) -> String {
        self.state.borrow().src.clone()
    }

    pub fn volume(&self) -> f32 {
        self.state.borrow().volume
    }

    pub fn pan(&self) -> f32 {
        self.state.borrow().pan
    }

    pub fn pitch(&self) -> f32 {
        self.state.borrow().pitch
    }

    pub fn looped(&self) -> bool {
        self.state.borrow().looped
    }

    pub fn fade(&self) -> f32 {
        self.state.borrow().fade
    }

    pub fn is_playing(&self) -> bool {
        self.state.borrow().playing
    }

    pub fn is_loaded(&self) -> bool {
        self.state.borrow().state == LoadState::Loaded
    }

    pub fn load_state(&self) -> LoadState {
        self.state.borrow().state
    }

    /// Seconds of decoded audio held by this sound.
    pub fn used_memory(&self) -> f64 {
        self.state.borrow().used_memory
    }

    pub fn info(&self) -> SoundInfo {
        let s = self.state.borrow();
        SoundInfo {
            id: s.id.clone(),
            src: s.src.clone(),
            volume: s.volume,
            pan: s.pan,
            pitch: s.pitch,
            looped: s.looped,
            fade: s.fade,
            playing: s.playing,
            state: s.state,
            used_memory: s.used_memory,
        }
    }

    fn spawn(&self, task: Option<LocalBoxFuture<'static, ()>>) {
        if let Some(task) = task {
            let manager = self.state.borrow().manager.clone();
            manager.backend().spawn(task);
        }
    }
}

/// Runs user callbacks queued while the state was borrowed.
fn flush<B: AudioBackend>(state: &RefCell<SoundState<B>>) {
    loop {
        let deferred = std::mem::take(&mut state.borrow_mut().deferred);
        if deferred.is_empty() {
            return;
        }
        for callback in deferred {
            callback();
        }
    }
}

impl<B: AudioBackend> SoundState<B> {
    fn backend(&self) -> &B {
        self.manager.backend()
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.volume = clamp_volume(volume);
        if !self.playing {
            return Ok(());
        }
        let now = self.backend().current_time();
        self.gain.set_target_at_time(self.volume, now, self.fade)
    }

    fn set_pan(&mut self, pan: f32) -> Result<()> {
        self.pan = clamp_pan(pan);
        self.panner.set_pan(self.pan)
    }

    fn set_loop(&mut self, looped: bool) {
        self.looped = looped;
        if let (Some(source), Some(buffer)) = (&self.source, &self.buffer) {
            source.set_loop(looped, 0.0, buffer.duration());
        }
    }

    fn set_pitch(&mut self, pitch: f32, portamento: f32) -> Result<()> {
        if pitch.is_finite() {
            self.pitch = pitch;
        }
        self.apply_playback_rate(clamp_seconds(portamento))
    }

    fn apply_playback_rate(&self, time_constant: f32) -> Result<()> {
        let Some(source) = &self.source else {
            return Ok(());
        };
        let rate = semitones_to_rate(self.play_pitch + self.pitch);
        source.set_rate_target(rate, self.backend().current_time(), time_constant)
    }

    fn begin_load(&mut self, callback: Option<LoadCallback>) -> Option<LocalBoxFuture<'static, ()>> {
        match self.state {
            LoadState::Loaded => {
                if let Some(callback) = callback {
                    self.deferred.push(Box::new(move || callback(Ok(()))));
                }
                None
            }
            LoadState::Loading => {
                self.load_callbacks.extend(callback);
                None
            }
            LoadState::Unloaded | LoadState::Failed => {
                self.load_callbacks.extend(callback);
                self.state = LoadState::Loading;
                Some(self.load_task())
            }
        }
    }

    fn load_task(&self) -> LocalBoxFuture<'static, ()> {
        let manager = self.manager.clone();
        let uri = manager.resolve(&self.src);
        let this = self.this.clone();

        async move {
            debug!("Loading sound from {}", uri);
            let result = match manager.backend().fetch(&uri).await {
                Ok(bytes) => manager.backend().decode(bytes).await,
                Err(err) => Err(err),
            };
            if let Some(state) = this.upgrade() {
                state.borrow_mut().complete_load(result);
                flush(&state);
            }
        }
        .boxed_local()
    }

    fn complete_load(&mut self, result: Result<B::Buffer>) {
        let outcome = match result {
            Ok(buffer) => {
                let duration = buffer.duration();
                self.used_memory = duration;
                self.manager.charge_memory(duration);
                self.buffer = Some(buffer);
                self.state = LoadState::Loaded;
                debug!("Sound {} decoded, {:.2}s", self.id, duration);

                if let Some(pending) = self.pending_play.take() {
                    let waited = self.backend().now_ms() - pending.requested_at;
                    if self.looped || waited < self.manager.settings().max_play_latency_ms {
                        if let Err(err) = self.start_playback(pending.pitch) {
                            error!("Sound {} could not start: {}", self.id, err);
                        }
                    } else {
                        debug!(
                            "Dropping play of sound {}: loading took {:.0}ms",
                            self.id, waited
                        );
                    }
                }
                Ok(())
            }
            Err(err) => {
                error!("Sound {} could not be loaded: {}", self.id, err);
                self.state = LoadState::Failed;
                self.pending_play = None;
                Err(err)
            }
        };

        for callback in std::mem::take(&mut self.load_callbacks) {
            let outcome = outcome.clone();
            self.deferred.push(Box::new(move || callback(outcome)));
        }
    }

    fn play(
        &mut self,
        volume: Option<f32>,
        pan: Option<f32>,
        pitch: Option<f32>,
    ) -> Result<Option<LocalBoxFuture<'static, ()>>> {
        if let Some(volume) = volume {
            self.set_volume(volume)?;
        }
        if let Some(pan) = pan {
            self.set_pan(pan)?;
        }

        match self.state {
            LoadState::Loaded => {
                self.start_playback(pitch)?;
                Ok(None)
            }
            LoadState::Failed => Err(SoundError::Unavailable(self.id.clone())),
            LoadState::Unloaded | LoadState::Loading => {
                self.pending_play = Some(PendingPlay {
                    requested_at: self.backend().now_ms(),
                    pitch,
                });
                Ok(self.begin_load(None))
            }
        }
    }

    fn start_playback(&mut self, pitch: Option<f32>) -> Result<()> {
        let Some(buffer) = self.buffer.clone() else {
            self.pending_play = Some(PendingPlay {
                requested_at: self.backend().now_ms(),
                pitch,
            });
            return Ok(());
        };

        // a looping sound keeps running, only its pitch may change
        if self.looped && self.playing {
            if let Some(pitch) = pitch {
                if pitch != self.play_pitch {
                    self.play_pitch = pitch;
                    self.apply_playback_rate(0.0)?;
                }
            }
            return Ok(());
        }

        self.cancel_fade_out()?;

        let now = self.backend().current_time();
        self.gain.set_target_at_time(self.volume, now, self.fade)?;
        let source = self.backend().create_source(&buffer, &self.gain)?;

        // an overlapping one-shot plays to its end, detached from this sound
        if let Some(previous) = self.source.take() {
            previous.set_on_ended(None);
        }

        self.generation += 1;
        let generation = self.generation;
        let this = self.this.clone();
        source.set_on_ended(Some(Box::new(move || {
            if let Some(state) = this.upgrade() {
                state.borrow_mut().on_source_ended(generation);
                flush(&state);
            }
        })));
        source.set_loop(self.looped, 0.0, buffer.duration());
        self.source = Some(source);

        self.play_pitch = pitch.unwrap_or(0.0);
        let started = if self.play_pitch != 0.0 || self.pitch != 0.0 {
            self.apply_playback_rate(0.0)
        } else {
            Ok(())
        }
        .and_then(|()| match &self.source {
            Some(source) => source.start(),
            None => Ok(()),
        });
        if let Err(err) = started {
            self.playing = false;
            self.source = None;
            return Err(err);
        }
        self.playing = true;
        Ok(())
    }

    fn on_source_ended(&mut self, generation: u64) {
        if generation != self.generation {
            return;
        }
        debug!("Sound {} ended", self.id);
        self.playing = false;
        self.source = None;
        if let Some(fade) = self.fade_out.take() {
            self.backend().clear_timeout(fade.timeout);
            self.deferred.extend(fade.on_stopped);
        }
    }

    fn stop(&mut self, callback: Option<StopCallback>) -> Result<()> {
        self.pending_play = None;
        if !self.playing || self.source.is_none() {
            self.playing = false;
            self.deferred.extend(callback);
            return Ok(());
        }
        self.playing = false;

        if self.fade > 0.0 {
            let now = self.backend().current_time();
            let ratio = self.manager.settings().fade_out_ratio;
            self.gain.set_target_at_time(0.0, now, self.fade * ratio)?;

            let generation = self.generation;
            let this = self.this.clone();
            let timeout = self.backend().set_timeout(
                Duration::from_secs_f32(self.fade),
                Box::new(move || {
                    if let Some(state) = this.upgrade() {
                        state.borrow_mut().finish_fade_out(generation);
                        flush(&state);
                    }
                }),
            )?;
            self.fade_out = Some(FadeOut {
                timeout,
                on_stopped: callback,
            });
            return Ok(());
        }

        let result = self.stop_source();
        self.deferred.extend(callback);
        result
    }

    fn finish_fade_out(&mut self, generation: u64) {
        if generation != self.generation {
            return;
        }
        let Some(fade) = self.fade_out.take() else {
            return;
        };
        if let Err(err) = self.stop_source() {
            warn!("Sound {} failed to stop after fade: {}", self.id, err);
        }
        self.deferred.extend(fade.on_stopped);
    }

    /// Cuts a fade-out short; its stop callback still runs.
    fn cancel_fade_out(&mut self) -> Result<()> {
        let Some(fade) = self.fade_out.take() else {
            return Ok(());
        };
        self.backend().clear_timeout(fade.timeout);
        self.deferred.extend(fade.on_stopped);
        self.stop_source()
    }

    fn stop_source(&mut self) -> Result<()> {
        match self.source.take() {
            Some(source) => {
                source.set_on_ended(None);
                source.stop()
            }
            None => Ok(()),
        }
    }

    fn unload(&mut self) -> Result<bool> {
        if self.state != LoadState::Loaded {
            return Ok(false);
        }

        self.pending_play = None;
        if let Some(fade) = self.fade_out.take() {
            self.backend().clear_timeout(fade.timeout);
            self.deferred.extend(fade.on_stopped);
        }
        self.playing = false;
        let stopped = self.stop_source();

        self.manager.release_memory(self.used_memory);
        self.used_memory = 0.0;
        self.buffer = None;
        self.state = LoadState::Unloaded;

        let now = self.backend().current_time();
        self.gain.set_target_at_time(0.0, now, 0.0)?;
        stopped?;

        debug!("Sound {} unloaded", self.id);
        Ok(true)
    }
}

impl<B: AudioBackend> Drop for SoundState<B> {
    fn drop(&mut self) {
        if let Some(fade) = self.fade_out.take() {
            self.backend().clear_timeout(fade.timeout);
        }
        if let Err(err) = self.stop_source() {
            warn!("Sound {} failed to stop on drop: {}", self.id, err);
        }
        if self.used_memory > 0.0 {
            self.manager.release_memory(self.used_memory);
        }
    }
}
