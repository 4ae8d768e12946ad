use std::process::ExitStatus;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CaptureError>;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// The capture program could not be spawned at all.
    #[error("failed to launch {program:?}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The process was spawned without a readable stdout.
    #[error("stdout of {program:?} is not available")]
    PipeUnavailable { program: String },
    #[error("capture pipe i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// No start signature is known for this host.
    #[error("unrecognised host model {0:?}, no frame signature available")]
    UnknownHost(String),
    #[error("invalid frame signature: {0}")]
    InvalidSignature(String),
    #[error("precondition violated: {0}")]
    Precondition(&'static str),
    #[error("capture session already started")]
    AlreadyStarted,
    #[error("{program:?} closed its output before producing any data")]
    ExitedBeforeOutput { program: String },
    #[error("{program:?} exited with {status}: {stderr}")]
    ProcessFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    /// The rolling buffer grew past its bound without a second signature.
    #[error("frame buffer overflow: {len} bytes buffered, limit is {max}")]
    BufferOverflow { len: usize, max: usize },
    #[error("capture process stderr: {0}")]
    Stderr(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("capture session closed")]
    Closed,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CaptureError {
    /// True for errors raised before a session is live.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::Launch { .. }
                | Self::PipeUnavailable { .. }
                | Self::UnknownHost(_)
                | Self::InvalidSignature(_)
                | Self::AlreadyStarted
                | Self::InvalidConfig(_)
                | Self::Precondition(_)
        )
    }
}
