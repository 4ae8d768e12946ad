//! Capture bus: supervises an external capture process and republishes its output.
//!
//! Data flow:
//! ```text
//!                                  ┌─► FanOut ─► [ConsumerStream] x N   (raw chunks)
//!                                  │
//! process stdout ─► Reader task ───┤
//!                                  │
//!                                  └─► FrameDemuxer? ─► BusEvent::Frame (multipart mode only)
//! ```
//!
//! The reader task is the only writer of the demuxer buffer, so frames and
//! chunks are published strictly in the order the pipe delivers them.

pub mod bus;
pub mod demux;
pub mod error;
pub mod fanout;
pub mod process;
pub mod signature;

pub use bus::{BusConfig, BusEvent, CaptureBus, CaptureState, FrameStream};
pub use demux::{DEFAULT_MAX_BUFFER, FrameDemuxer, StreamMode};
pub use error::{CaptureError, Result};
pub use fanout::{ConsumerStream, FanOut};
pub use process::{
    ProcessControl, ProcessHandle, ProcessPipe, ProcessRunner, TokioProcessRunner,
    run_to_completion,
};
pub use signature::{FixedSignature, SignatureProvider};
