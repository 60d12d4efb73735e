//! In-memory backend that records every host call, for unit tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use futures::executor::{LocalPool, LocalSpawner};
use futures::future::{self, FutureExt, LocalBoxFuture};
use futures::task::LocalSpawnExt;

use crate::backend::{
    check_status, AudioBackend, DecodedBuffer, GainControl, PanControl, SourceControl,
};
use crate::error::{Result, SoundError};

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    GainValue(f32),
    GainTarget {
        target: f32,
        start: f64,
        time_constant: f32,
    },
    Pan(f32),
    Position(f32, f32, f32),
    Connect,
    CreateSource {
        source: usize,
        duration: f64,
    },
    Loop {
        source: usize,
        looped: bool,
        start: f64,
        end: f64,
    },
    RateTarget {
        source: usize,
        rate: f32,
        start: f64,
        time_constant: f32,
    },
    Start(usize),
    Stop(usize),
    Fetch(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OfflineBuffer {
    duration: f64,
}

impl DecodedBuffer for OfflineBuffer {
    fn duration(&self) -> f64 {
        self.duration
    }
}

#[derive(Default)]
struct Recorder {
    ops: RefCell<Vec<Op>>,
}

impl Recorder {
    fn push(&self, op: Op) {
        self.ops.borrow_mut().push(op);
    }
}

pub struct OfflineGain(Rc<Recorder>);

impl GainControl for OfflineGain {
    fn set_value(&self, value: f32) {
        self.0.push(Op::GainValue(value));
    }

    fn set_target_at_time(&self, target: f32, start: f64, time_constant: f32) -> Result<()> {
        if time_constant < 0.0 {
            return Err(SoundError::Graph("negative time constant".into()));
        }
        self.0.push(Op::GainTarget {
            target,
            start,
            time_constant,
        });
        Ok(())
    }
}

pub struct OfflinePanner {
    stereo: bool,
    recorder: Rc<Recorder>,
}

impl PanControl for OfflinePanner {
    fn set_pan(&self, pan: f32) -> Result<()> {
        if self.stereo {
            self.recorder.push(Op::Pan(pan));
        } else {
            self.recorder.push(Op::Position(pan, 0.0, 0.2));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct SourceSlot {
    pub started: Cell<bool>,
    pub stopped: Cell<bool>,
    pub looped: Cell<bool>,
    on_ended: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl SourceSlot {
    pub fn has_end_handler(&self) -> bool {
        self.on_ended.borrow().is_some()
    }
}

pub struct OfflineSource {
    index: usize,
    slot: Rc<SourceSlot>,
    recorder: Rc<Recorder>,
}

impl SourceControl for OfflineSource {
    fn set_loop(&self, looped: bool, loop_start: f64, loop_end: f64) {
        self.slot.looped.set(looped);
        self.recorder.push(Op::Loop {
            source: self.index,
            looped,
            start: loop_start,
            end: loop_end,
        });
    }

    fn set_rate_target(&self, rate: f32, start: f64, time_constant: f32) -> Result<()> {
        self.recorder.push(Op::RateTarget {
            source: self.index,
            rate,
            start,
            time_constant,
        });
        Ok(())
    }

    fn start(&self) -> Result<()> {
        if self.slot.started.replace(true) {
            return Err(SoundError::Graph("source started twice".into()));
        }
        self.recorder.push(Op::Start(self.index));
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.slot.stopped.set(true);
        self.recorder.push(Op::Stop(self.index));
        Ok(())
    }

    fn set_on_ended(&self, callback: Option<Box<dyn FnOnce()>>) {
        *self.slot.on_ended.borrow_mut() = callback;
    }
}

struct Asset {
    status: u16,
    bytes: Vec<u8>,
}

struct PendingTimeout {
    id: u64,
    due_ms: f64,
    callback: Box<dyn FnOnce()>,
}

pub struct OfflineBackend {
    stereo: bool,
    recorder: Rc<Recorder>,
    now_ms: Cell<f64>,
    assets: RefCell<HashMap<String, Asset>>,
    sources: RefCell<Vec<Rc<SourceSlot>>>,
    timeouts: RefCell<Vec<PendingTimeout>>,
    next_timeout: Cell<u64>,
    resumes: Cell<usize>,
    fail_sources: Cell<bool>,
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
}

impl OfflineBackend {
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            stereo: true,
            recorder: Rc::new(Recorder::default()),
            now_ms: Cell::new(0.0),
            assets: RefCell::new(HashMap::new()),
            sources: RefCell::new(Vec::new()),
            timeouts: RefCell::new(Vec::new()),
            next_timeout: Cell::new(0),
            resumes: Cell::new(0),
            fail_sources: Cell::new(false),
            pool: RefCell::new(pool),
            spawner,
        }
    }

    /// A host without a stereo panner.
    pub fn positional() -> Self {
        Self {
            stereo: false,
            ..Self::new()
        }
    }

    /// Serves a decodable asset lasting `seconds`.
    pub fn serve(&self, uri: &str, seconds: f64) {
        self.serve_bytes(uri, seconds.to_string().as_bytes());
    }

    /// Serves raw bytes; anything that is not a number fails to decode.
    pub fn serve_bytes(&self, uri: &str, bytes: &[u8]) {
        self.respond(uri, 200, bytes);
    }

    /// Answers with `status` and an empty body.
    pub fn serve_status(&self, uri: &str, status: u16) {
        self.respond(uri, status, &[]);
    }

    pub fn respond(&self, uri: &str, status: u16, bytes: &[u8]) {
        self.assets.borrow_mut().insert(
            uri.to_string(),
            Asset {
                status,
                bytes: bytes.to_vec(),
            },
        );
    }

    /// Makes every following `create_source` fail.
    pub fn fail_sources(&self, fail: bool) {
        self.fail_sources.set(fail);
    }

    /// Completes every spawned fetch/decode.
    pub fn run_until_stalled(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }

    /// Moves both clocks forward and fires due timers in order.
    pub fn advance(&self, ms: f64) {
        let target = self.now_ms.get() + ms;
        loop {
            let next = {
                let mut timeouts = self.timeouts.borrow_mut();
                let due = timeouts
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due_ms <= target)
                    .min_by(|(_, a), (_, b)| a.due_ms.total_cmp(&b.due_ms))
                    .map(|(i, _)| i);
                due.map(|i| timeouts.remove(i))
            };
            let Some(timeout) = next else { break };
            self.now_ms.set(timeout.due_ms.max(self.now_ms.get()));
            (timeout.callback)();
        }
        self.now_ms.set(target);
    }

    /// Simulates the host reporting the end of playback for source `index`.
    pub fn end_source(&self, index: usize) {
        let callback = self.sources.borrow()[index].on_ended.borrow_mut().take();
        if let Some(callback) = callback {
            callback();
        }
    }

    pub fn source(&self, index: usize) -> Rc<SourceSlot> {
        self.sources.borrow()[index].clone()
    }

    pub fn source_count(&self) -> usize {
        self.sources.borrow().len()
    }

    pub fn pending_timeouts(&self) -> usize {
        self.timeouts.borrow().len()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.recorder.ops.borrow().clone()
    }

    pub fn clear_ops(&self) {
        self.recorder.ops.borrow_mut().clear();
    }

    pub fn resume_count(&self) -> usize {
        self.resumes.get()
    }
}

impl AudioBackend for OfflineBackend {
    type Bytes = Vec<u8>;
    type Buffer = OfflineBuffer;
    type Gain = OfflineGain;
    type Panner = OfflinePanner;
    type Source = OfflineSource;
    type Timeout = u64;

    fn current_time(&self) -> f64 {
        self.now_ms.get() / 1000.0
    }

    fn now_ms(&self) -> f64 {
        self.now_ms.get()
    }

    fn create_gain(&self) -> Result<OfflineGain> {
        Ok(OfflineGain(self.recorder.clone()))
    }

    fn create_panner(&self) -> Result<OfflinePanner> {
        Ok(OfflinePanner {
            stereo: self.stereo,
            recorder: self.recorder.clone(),
        })
    }

    fn connect_output(&self, _gain: &OfflineGain, _panner: &OfflinePanner) -> Result<()> {
        self.recorder.push(Op::Connect);
        Ok(())
    }

    fn create_source(&self, buffer: &OfflineBuffer, _gain: &OfflineGain) -> Result<OfflineSource> {
        if self.fail_sources.get() {
            return Err(SoundError::Graph("source unavailable".into()));
        }
        let slot = Rc::new(SourceSlot::default());
        let mut sources = self.sources.borrow_mut();
        let index = sources.len();
        sources.push(slot.clone());
        self.recorder.push(Op::CreateSource {
            source: index,
            duration: buffer.duration,
        });
        Ok(OfflineSource {
            index,
            slot,
            recorder: self.recorder.clone(),
        })
    }

    fn fetch(&self, uri: &str) -> LocalBoxFuture<'static, Result<Vec<u8>>> {
        self.recorder.push(Op::Fetch(uri.to_string()));
        let result = match self.assets.borrow().get(uri) {
            Some(asset) => check_status(uri, asset.status).map(|()| asset.bytes.clone()),
            None => check_status(uri, 404).map(|()| Vec::new()),
        };
        future::ready(result).boxed_local()
    }

    fn decode(&self, bytes: Vec<u8>) -> LocalBoxFuture<'static, Result<OfflineBuffer>> {
        let result = std::str::from_utf8(&bytes)
            .ok()
            .and_then(|text| text.parse::<f64>().ok())
            .map(|duration| OfflineBuffer { duration })
            .ok_or_else(|| SoundError::Decode("unsupported format".into()));
        future::ready(result).boxed_local()
    }

    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        self.spawner
            .spawn_local(task)
            .expect("offline pool is alive");
    }

    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> Result<u64> {
        let id = self.next_timeout.get();
        self.next_timeout.set(id + 1);
        self.timeouts.borrow_mut().push(PendingTimeout {
            id,
            due_ms: self.now_ms.get() + delay.as_secs_f64() * 1000.0,
            callback,
        });
        Ok(id)
    }

    fn clear_timeout(&self, timeout: u64) {
        self.timeouts.borrow_mut().retain(|t| t.id != timeout);
    }

    fn resume(&self) -> LocalBoxFuture<'static, Result<()>> {
        self.resumes.set(self.resumes.get() + 1);
        future::ready(Ok(())).boxed_local()
    }
}
