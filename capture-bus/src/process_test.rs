use tokio::io::AsyncReadExt;

use super::{ProcessRunner, TokioProcessRunner, run_to_completion};
use crate::error::CaptureError;

fn sh(script: &str) -> Vec<String> {
    vec!["-c".to_string(), script.to_string()]
}

#[test]
fn test_spawn_missing_program_is_launch_error() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();

    let err = TokioProcessRunner
        .spawn("definitely-not-a-camera-binary", &[])
        .err()
        .unwrap();
    match err {
        CaptureError::Launch { program, .. } => {
            assert_eq!(program, "definitely-not-a-camera-binary")
        }
        other => panic!("Expected Launch error, got {:?}", other),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_spawn_exposes_stdout() -> anyhow::Result<()> {
    let handle = TokioProcessRunner.spawn("sh", &sh("printf frame-bytes"))?;
    let mut stdout = handle.stdout.expect("stdout is piped");

    let mut out = Vec::new();
    stdout.read_to_end(&mut out).await?;
    assert_eq!(out, b"frame-bytes");
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_terminate_running_process() -> anyhow::Result<()> {
    let mut handle = TokioProcessRunner.spawn("sh", &sh("exec sleep 30"))?;
    assert!(handle.control.id().is_some());
    handle.control.terminate()?;

    let mut stdout = handle.stdout.expect("stdout is piped");
    let mut out = Vec::new();
    stdout.read_to_end(&mut out).await?;
    assert!(out.is_empty());
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_run_to_completion_collects_stdout() -> anyhow::Result<()> {
    let out = run_to_completion("sh", &sh("printf one; printf two")).await?;
    assert_eq!(out.as_ref(), b"onetwo");
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_run_to_completion_reports_failure() {
    let err = run_to_completion("sh", &sh("echo no camera >&2; exit 3"))
        .await
        .unwrap_err();
    match err {
        CaptureError::ProcessFailed { status, stderr, .. } => {
            assert_eq!(status.code(), Some(3));
            assert_eq!(stderr, "no camera");
        }
        other => panic!("Expected ProcessFailed, got {:?}", other),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_run_to_completion_empty_output() {
    let err = run_to_completion("sh", &sh("true")).await.unwrap_err();
    assert!(matches!(err, CaptureError::ExitedBeforeOutput { .. }));
}
