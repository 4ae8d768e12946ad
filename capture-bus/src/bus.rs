use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    sync::{broadcast, oneshot, watch},
    task::JoinHandle,
};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use crate::{
    demux::{DEFAULT_MAX_BUFFER, FrameDemuxer, StreamMode},
    error::{CaptureError, Result},
    fanout::{ConsumerStream, FanOut},
    process::{ProcessControl, ProcessPipe, ProcessRunner, TokioProcessRunner},
    signature::SignatureProvider,
};

const DEFAULT_EVENT_CAPACITY: usize = 64;
const DEFAULT_READ_BUFFER: usize = 64 * 1024;

/// Frames as they are carved out of the stream.
pub type FrameStream = Pin<Box<dyn Stream<Item = Bytes> + Send>>;

#[derive(Clone, Debug)]
pub enum BusEvent {
    Frame(Bytes),
    Error(Arc<CaptureError>),
    /// The process output ended or the session was stopped. Sent once per session.
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Starting,
    Capturing,
    Failed,
    Stopped,
}

#[derive(Clone, Debug)]
pub struct BusConfig {
    pub program: String,
    pub args: Vec<String>,
    pub mode: StreamMode,
    // upper bound of the demuxer's rolling buffer
    pub max_buffer: usize,
    // bytes requested per stdout read
    pub read_buffer: usize,
    // events a slow subscriber may fall behind before it starts skipping
    pub event_capacity: usize,
}

impl BusConfig {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            mode: StreamMode::Plain,
            max_buffer: DEFAULT_MAX_BUFFER,
            read_buffer: DEFAULT_READ_BUFFER,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn with_mode(mut self, mode: StreamMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = max_buffer;
        self
    }

    pub fn with_read_buffer(mut self, read_buffer: usize) -> Self {
        self.read_buffer = read_buffer.max(1);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

struct Session {
    id: u64,
    cancel: CancellationToken,
    control: Box<dyn ProcessControl>,
    reader: Option<JoinHandle<()>>,
}

/// Owns one capture process at a time and publishes what it produces.
///
/// Raw stdout chunks go to every stream created with [`CaptureBus::register`].
/// In [`StreamMode::MultipartImage`] the chunks are also split into frames,
/// published as [`BusEvent::Frame`].
pub struct CaptureBus {
    id: String,
    config: BusConfig,
    runner: Arc<dyn ProcessRunner>,
    signatures: Arc<dyn SignatureProvider>,
    fanout: FanOut,
    events: broadcast::Sender<BusEvent>,
    state: watch::Sender<CaptureState>,
    session: Mutex<Option<Session>>,
    next_session: AtomicU64,
}

impl CaptureBus {
    pub fn new(id: &str, config: BusConfig, signatures: Arc<dyn SignatureProvider>) -> Self {
        Self::with_runner(id, config, Arc::new(TokioProcessRunner), signatures)
    }

    pub fn with_runner(
        id: &str,
        config: BusConfig,
        runner: Arc<dyn ProcessRunner>,
        signatures: Arc<dyn SignatureProvider>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (state, _) = watch::channel(CaptureState::Idle);
        Self {
            id: id.to_string(),
            config,
            runner,
            signatures,
            fanout: FanOut::new(),
            events,
            state,
            session: Mutex::new(None),
            next_session: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn state(&self) -> CaptureState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<CaptureState> {
        self.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.lock_session().is_some()
    }

    /// Launches the capture process.
    ///
    /// Resolves once the process has written its first chunk. Fails without
    /// spawning anything when a session is already active or the frame
    /// signature cannot be resolved.
    pub async fn start(&self) -> Result<()> {
        let (session_id, started) = {
            let mut slot = self.lock_session();
            if slot.is_some() {
                log::warn!("bus {}: start requested while a session is active", self.id);
                return Err(CaptureError::AlreadyStarted);
            }

            let demuxer = match self.config.mode {
                StreamMode::Plain => None,
                StreamMode::MultipartImage => {
                    let signature = self.signatures.resolve()?;
                    log::debug!("bus {}: frame signature {:02x?}", self.id, signature.as_ref());
                    Some(FrameDemuxer::new(signature, self.config.max_buffer)?)
                }
            };

            log::info!(
                "bus {}: starting {} {}",
                self.id,
                self.config.program,
                self.config.args.join(" ")
            );
            let mut handle = self.runner.spawn(&self.config.program, &self.config.args)?;
            let Some(stdout) = handle.stdout.take() else {
                if let Err(e) = handle.control.terminate() {
                    log::warn!("bus {}: terminate after missing stdout: {}", self.id, e);
                }
                return Err(CaptureError::PipeUnavailable {
                    program: self.config.program.clone(),
                });
            };

            let id = self.next_session.fetch_add(1, Ordering::Relaxed);
            let cancel = CancellationToken::new();
            let (started_tx, started_rx) = oneshot::channel();
            self.state.send_replace(CaptureState::Starting);

            let reader = Reader {
                bus_id: self.id.clone(),
                program: self.config.program.clone(),
                read_buffer: self.config.read_buffer,
                cancel: cancel.clone(),
                fanout: self.fanout.clone(),
                events: self.events.clone(),
                state: self.state.clone(),
                demuxer,
                started: Some(started_tx),
                chunks: 0,
                bytes: 0,
            };
            let task = tokio::spawn(reader.run(stdout, handle.stderr.take()));

            *slot = Some(Session {
                id,
                cancel,
                control: handle.control,
                reader: Some(task),
            });
            (id, started_rx)
        };

        let result = match started.await {
            Ok(result) => result,
            // The reader went away without a verdict, i.e. stop() won the race.
            Err(_) => Err(CaptureError::Closed),
        };
        if let Err(e) = &result {
            log::error!("bus {}: start failed: {}", self.id, e);
            self.abort_session(session_id);
        }
        result
    }

    /// Terminates the process and ends every consumer stream.
    ///
    /// Does not wait for the process to exit. A no-op without a session.
    pub async fn stop(&self) {
        let session = self.lock_session().take();
        let Some(mut session) = session else {
            log::debug!("bus {}: stop requested but nothing is running", self.id);
            return;
        };

        session.cancel.cancel();
        if let Err(e) = session.control.terminate() {
            log::warn!("bus {}: terminate: {}", self.id, e);
        }
        if let Some(reader) = session.reader.take() {
            if let Err(e) = reader.await {
                log::error!("bus {}: reader task: {}", self.id, e);
            }
        }
        let closed = self.fanout.close_all();
        self.state.send_replace(CaptureState::Stopped);
        log::info!("bus {}: stopped, closed {} consumer stream(s)", self.id, closed);
    }

    /// Creates an independent stream of raw process output.
    pub fn register(&self) -> ConsumerStream {
        self.fanout.register()
    }

    pub fn consumers(&self) -> usize {
        self.fanout.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.events.subscribe()
    }

    /// Frames emitted from now on, ending when the session closes.
    ///
    /// A listener that falls more than [`BusConfig::event_capacity`] events
    /// behind skips the oldest ones; the gap is logged and the stream carries
    /// on with the newest frames.
    pub fn frames(&self) -> FrameStream {
        let bus_id = self.id.clone();
        let stream = BroadcastStream::new(self.events.subscribe())
            .take_while(|event| futures::future::ready(!matches!(event, Ok(BusEvent::Closed))))
            .filter_map(move |event| {
                let bus_id = bus_id.clone();
                async move {
                    match event {
                        Ok(BusEvent::Frame(frame)) => Some(frame),
                        Ok(_) => None,
                        Err(e) => {
                            log::warn!("bus {}: frame listener {}", bus_id, e);
                            None
                        }
                    }
                }
            });
        Box::pin(stream)
    }

    /// Waits for the next frame emitted after this call.
    ///
    /// Only valid in [`StreamMode::MultipartImage`]; otherwise fails right away.
    /// If the future is polled so late that the event queue overran, the
    /// oldest frame still queued is returned instead.
    pub fn take_image(
        &self,
    ) -> Result<impl Future<Output = Result<Bytes>> + Send + 'static + use<>> {
        if self.config.mode != StreamMode::MultipartImage {
            return Err(CaptureError::Precondition(
                "take_image requires multipart image mode",
            ));
        }
        let mut events = self.events.subscribe();
        Ok(async move {
            loop {
                match events.recv().await {
                    Ok(BusEvent::Frame(frame)) => return Ok(frame),
                    Ok(BusEvent::Closed) | Err(broadcast::error::RecvError::Closed) => {
                        return Err(CaptureError::Closed);
                    }
                    Ok(BusEvent::Error(_)) => continue,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("take_image: skipped {} event(s)", n);
                        continue;
                    }
                }
            }
        })
    }

    fn abort_session(&self, session_id: u64) {
        let mut slot = self.lock_session();
        if slot.as_ref().is_none_or(|s| s.id != session_id) {
            return;
        }
        if let Some(mut session) = slot.take() {
            session.cancel.cancel();
            if let Err(e) = session.control.terminate() {
                log::debug!("bus {}: terminate after failed start: {}", self.id, e);
            }
            self.fanout.close_all();
            self.state.send_replace(CaptureState::Failed);
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for CaptureBus {
    fn drop(&mut self) {
        if let Some(mut session) = self.lock_session().take() {
            session.cancel.cancel();
            if let Err(e) = session.control.terminate() {
                log::warn!("bus {}: terminate on drop: {}", self.id, e);
            }
            self.fanout.close_all();
        }
    }
}

/// Line reader for stderr that tolerates bytes which are not UTF-8.
///
/// The partial line survives a cancelled read, so it can sit in `select!`.
struct StderrLines {
    reader: BufReader<ProcessPipe>,
    line: Vec<u8>,
}

impl StderrLines {
    fn new(pipe: ProcessPipe) -> Self {
        Self {
            reader: BufReader::new(pipe),
            line: Vec::new(),
        }
    }

    async fn next_line(&mut self) -> Option<std::io::Result<String>> {
        match self.reader.read_until(b'\n', &mut self.line).await {
            Ok(0) if self.line.is_empty() => None,
            Ok(_) => {
                let raw = std::mem::take(&mut self.line);
                let text = String::from_utf8_lossy(&raw);
                Some(Ok(text.trim_end_matches(['\n', '\r']).to_string()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Pumps one session's stdout into the fan-out and the demuxer.
struct Reader {
    bus_id: String,
    program: String,
    read_buffer: usize,
    cancel: CancellationToken,
    fanout: FanOut,
    events: broadcast::Sender<BusEvent>,
    state: watch::Sender<CaptureState>,
    demuxer: Option<FrameDemuxer>,
    started: Option<oneshot::Sender<Result<()>>>,
    chunks: u64,
    bytes: u64,
}

impl Reader {
    async fn run(mut self, mut stdout: ProcessPipe, stderr: Option<ProcessPipe>) {
        let mut stderr = stderr.map(StderrLines::new);
        let mut buf = BytesMut::with_capacity(self.read_buffer);

        loop {
            buf.reserve(self.read_buffer);
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    log::debug!("bus {}: reader cancelled", self.bus_id);
                    break;
                }
                read = stdout.read_buf(&mut buf) => match read {
                    Ok(0) => {
                        if self.started.is_some() {
                            self.fail(CaptureError::ExitedBeforeOutput {
                                program: self.program.clone(),
                            });
                        } else {
                            log::info!("bus {}: {} closed its output", self.bus_id, self.program);
                        }
                        break;
                    }
                    Ok(_) => self.on_chunk(buf.split().freeze()),
                    Err(e) => {
                        self.fail(CaptureError::Io(e));
                        break;
                    }
                },
                line = next_line(&mut stderr) => match line {
                    Some(Ok(line)) => {
                        log::warn!("bus {}: {} stderr: {}", self.bus_id, self.program, line);
                        self.publish_error(CaptureError::Stderr(line));
                    }
                    Some(Err(e)) => {
                        log::warn!("bus {}: stderr read: {}", self.bus_id, e);
                        self.publish_error(CaptureError::Io(e));
                        stderr = None;
                    }
                    None => stderr = None,
                },
            }
        }

        log::info!(
            "bus {}: reader finished after {} chunk(s), {} byte(s)",
            self.bus_id,
            self.chunks,
            self.bytes
        );
        let _ = self.events.send(BusEvent::Closed);
    }

    fn on_chunk(&mut self, chunk: Bytes) {
        if let Some(started) = self.started.take() {
            // An error seen while starting keeps the state at Failed.
            self.state.send_if_modified(|state| {
                let starting = *state == CaptureState::Starting;
                if starting {
                    *state = CaptureState::Capturing;
                }
                starting
            });
            log::info!("bus {}: capturing", self.bus_id);
            let _ = started.send(Ok(()));
        }

        self.chunks += 1;
        self.bytes += chunk.len() as u64;
        if self.chunks % 100 == 0 {
            log::trace!(
                "bus {}: {} chunks, {} bytes total",
                self.bus_id,
                self.chunks,
                self.bytes
            );
        }

        self.fanout.dispatch(&chunk);

        if let Some(demuxer) = self.demuxer.as_mut() {
            let events = &self.events;
            let pushed = demuxer.push(&chunk, |frame| {
                let _ = events.send(BusEvent::Frame(frame));
            });
            if let Err(e) = pushed {
                log::warn!("bus {}: {}", self.bus_id, e);
                self.publish_error(e);
            }
        }
    }

    /// Rejects a pending start, or reports a live-session failure.
    fn fail(&mut self, err: CaptureError) {
        match self.started.take() {
            Some(started) => {
                self.state.send_replace(CaptureState::Failed);
                let _ = started.send(Err(err));
            }
            None => {
                log::error!("bus {}: {}", self.bus_id, err);
                self.publish_error(err);
            }
        }
    }

    /// Reports an error on a live session and marks it `Failed`.
    ///
    /// The process keeps running until the owner calls `stop()`.
    fn publish_error(&self, err: CaptureError) {
        self.state.send_replace(CaptureState::Failed);
        let _ = self.events.send(BusEvent::Error(Arc::new(err)));
    }
}

async fn next_line(lines: &mut Option<StderrLines>) -> Option<std::io::Result<String>> {
    match lines {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "bus_test.rs"]
mod bus_test;
