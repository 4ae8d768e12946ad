//! Raspberry Pi camera capture as typed byte and frame streams.

pub mod camera;
pub mod config;

pub use capture_bus::{BusEvent, CaptureError, CaptureState, ConsumerStream, FrameStream};
