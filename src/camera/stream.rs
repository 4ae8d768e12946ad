use std::{future::Future, sync::Arc};

use bytes::Bytes;
use capture_bus::{
    BusConfig, BusEvent, CaptureBus, CaptureState, ConsumerStream, FrameStream, ProcessRunner,
    SignatureProvider, TokioProcessRunner, DEFAULT_MAX_BUFFER,
};
use tokio::sync::{broadcast, watch};

use crate::camera::{
    args::{stream_args, STREAM_PROGRAM},
    host::HostSignature,
    types::{Codec, StreamOptions},
};

/// Continuous capture from the camera module.
///
/// H.264 output is only relayed to consumer streams. MJPEG output is also
/// split into JPEG frames, available through [`StreamCamera::frames`] and
/// [`StreamCamera::take_image`].
pub struct StreamCamera {
    options: StreamOptions,
    bus: CaptureBus,
}

impl StreamCamera {
    pub fn new(options: StreamOptions) -> capture_bus::Result<Self> {
        Self::builder(options).build()
    }

    pub fn builder(options: StreamOptions) -> StreamCameraBuilder {
        StreamCameraBuilder {
            options,
            program: STREAM_PROGRAM.to_string(),
            runner: Arc::new(TokioProcessRunner),
            signatures: Arc::new(HostSignature::new()),
            max_buffer: DEFAULT_MAX_BUFFER,
        }
    }

    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    pub fn codec(&self) -> Codec {
        self.options.codec
    }

    /// Resolves once the camera has produced its first bytes.
    pub async fn start(&self) -> capture_bus::Result<()> {
        log::info!(
            "camera: starting {}x{}@{} {:?}",
            self.options.width,
            self.options.height,
            self.options.fps,
            self.options.codec
        );
        self.bus.start().await
    }

    pub async fn stop(&self) {
        self.bus.stop().await
    }

    /// A new stream of the raw encoded bytes.
    pub fn create_stream(&self) -> ConsumerStream {
        self.bus.register()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.bus.subscribe()
    }

    pub fn frames(&self) -> FrameStream {
        self.bus.frames()
    }

    /// Next JPEG frame. Fails immediately unless the codec is MJPEG.
    pub fn take_image(
        &self,
    ) -> capture_bus::Result<impl Future<Output = capture_bus::Result<Bytes>> + Send + 'static>
    {
        self.bus.take_image()
    }

    pub fn state(&self) -> CaptureState {
        self.bus.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<CaptureState> {
        self.bus.watch_state()
    }
}

pub struct StreamCameraBuilder {
    options: StreamOptions,
    program: String,
    runner: Arc<dyn ProcessRunner>,
    signatures: Arc<dyn SignatureProvider>,
    max_buffer: usize,
}

impl StreamCameraBuilder {
    /// Overrides the capture executable, e.g. a full path to `raspivid`.
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn signature_provider(mut self, signatures: Arc<dyn SignatureProvider>) -> Self {
        self.signatures = signatures;
        self
    }

    pub fn max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = max_buffer;
        self
    }

    pub fn build(self) -> capture_bus::Result<StreamCamera> {
        self.options.validate()?;
        let config = BusConfig::new(self.program, stream_args(&self.options))
            .with_mode(self.options.codec.stream_mode())
            .with_max_buffer(self.max_buffer);
        let bus = CaptureBus::with_runner("camera", config, self.runner, self.signatures);
        Ok(StreamCamera {
            options: self.options,
            bus,
        })
    }
}

#[cfg(test)]
#[path = "stream_test.rs"]
mod stream_test;
