// ============================================================================
// StreamCamera Tests
// ============================================================================

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use capture_bus::{
    CaptureError, CaptureState, FixedSignature, ProcessHandle, ProcessRunner, TokioProcessRunner,
};
use futures::StreamExt;

use super::StreamCamera;
use crate::camera::{
    args::stream_args,
    types::{Codec, StreamOptions},
};

const WAIT: Duration = Duration::from_secs(5);

/// Runs a shell script in place of the camera, remembering the requested command line.
struct ScriptRunner {
    script: String,
    requested: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptRunner {
    fn new(script: &str) -> Arc<Self> {
        Arc::new(Self {
            script: script.to_string(),
            requested: Mutex::new(Vec::new()),
        })
    }
}

impl ProcessRunner for ScriptRunner {
    fn spawn(&self, program: &str, args: &[String]) -> capture_bus::Result<ProcessHandle> {
        self.requested
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));
        TokioProcessRunner.spawn("sh", &["-c".to_string(), self.script.clone()])
    }
}

fn camera(codec: Codec, runner: Arc<ScriptRunner>) -> StreamCamera {
    let options = StreamOptions::builder()
        .resolution(640, 480)
        .codec(codec)
        .build()
        .unwrap();
    StreamCamera::builder(options)
        .runner(runner)
        .signature_provider(Arc::new(FixedSignature::new(Bytes::from_static(
            b"\xff\xd8",
        ))))
        .build()
        .unwrap()
}

#[test]
fn test_build_rejects_invalid_options() {
    let options = StreamOptions {
        fps: 0,
        ..Default::default()
    };
    let err = StreamCamera::new(options).err().unwrap();
    assert!(matches!(err, CaptureError::InvalidConfig(_)));
}

#[test]
fn test_take_image_requires_mjpeg() {
    let camera = camera(Codec::H264, ScriptRunner::new("true"));
    let err = camera.take_image().err().unwrap();
    assert!(matches!(err, CaptureError::Precondition(_)));
}

#[cfg(unix)]
#[tokio::test]
async fn test_h264_stream_relays_raw_bytes() {
    let runner = ScriptRunner::new("printf 'nal-units'; exec sleep 30");
    let camera = camera(Codec::H264, Arc::clone(&runner));
    let stream = camera.create_stream();

    tokio::time::timeout(WAIT, camera.start())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(camera.state(), CaptureState::Capturing);

    let (program, args) = runner.requested.lock().unwrap()[0].clone();
    assert_eq!(program, "raspivid");
    assert_eq!(args, stream_args(camera.options()));

    camera.stop().await;
    let bytes: Vec<Bytes> = tokio::time::timeout(WAIT, stream.collect()).await.unwrap();
    assert_eq!(bytes.concat(), b"nal-units");
}

#[cfg(unix)]
#[tokio::test]
async fn test_mjpeg_stream_yields_frames() {
    let runner = ScriptRunner::new(r"printf 'xx\377\330one\377\330two\377\330'; exec sleep 30");
    let camera = camera(Codec::Mjpeg, runner);
    let first = camera.take_image().unwrap();
    let frames = camera.frames();

    tokio::time::timeout(WAIT, camera.start())
        .await
        .unwrap()
        .unwrap();

    let image = tokio::time::timeout(WAIT, first).await.unwrap().unwrap();
    assert_eq!(image.as_ref(), b"\xff\xd8one");

    let all: Vec<Bytes> = tokio::time::timeout(WAIT, frames.take(2).collect())
        .await
        .unwrap();
    assert_eq!(
        all,
        vec![
            Bytes::from_static(b"\xff\xd8one"),
            Bytes::from_static(b"\xff\xd8two")
        ]
    );

    camera.stop().await;
    assert_eq!(camera.state(), CaptureState::Stopped);
}

#[cfg(unix)]
#[tokio::test]
async fn test_missing_program_fails_start() {
    let options = StreamOptions::default();
    let camera = StreamCamera::builder(options)
        .program("no-such-raspivid")
        .build()
        .unwrap();

    let err = camera.start().await.unwrap_err();
    assert!(matches!(err, CaptureError::Launch { .. }));
    assert!(err.is_setup_error());
}
