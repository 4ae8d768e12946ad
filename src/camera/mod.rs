//! Camera module capture on top of the capture bus.
//!
//! Data Flow:
//! ```text
//!                                         ┌─► create_stream() ─► raw H.264 / MJPEG bytes
//!                                         │
//! StreamOptions ─► stream_args ─► raspivid┤
//!                                         │
//!                                         └─► frames() / take_image() ─► JPEG frames (MJPEG only)
//!
//! StillOptions ─► still_args ─► raspistill ─► one JPEG
//! ```

pub mod args;
pub mod host;
pub mod still;
pub mod stream;
pub mod types;

pub use host::HostSignature;
pub use still::StillCamera;
pub use stream::{StreamCamera, StreamCameraBuilder};
pub use types::{
    AwbMode, Codec, ExposureMode, Flip, Rotation, StillOptions, StreamOptions, Tuning,
};
