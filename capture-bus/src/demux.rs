use bytes::{Bytes, BytesMut};

use crate::error::{CaptureError, Result};

/// Default bound on the rolling buffer, roughly ten full-resolution JPEGs.
pub const DEFAULT_MAX_BUFFER: usize = 16 * 1024 * 1024;

/// How the process output is carved up before it reaches frame listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StreamMode {
    /// Elementary video stream, chunks are only fanned out.
    #[default]
    Plain,
    /// Concatenated still images delimited by a start signature.
    MultipartImage,
}

/// Splits a concatenated image stream into frames.
///
/// Each frame runs from one occurrence of the start signature (inclusive) to
/// the next one (exclusive). Bytes ahead of the first signature are dropped.
/// Chunk boundaries are irrelevant: the search always runs over the
/// accumulated buffer, so a signature split across two reads is still found.
pub struct FrameDemuxer {
    signature: Bytes,
    buffer: BytesMut,
    max_buffer: usize,
    // offset from which the next-signature search resumes
    scan_from: usize,
}

impl FrameDemuxer {
    pub fn new(signature: Bytes, max_buffer: usize) -> Result<Self> {
        if signature.is_empty() {
            return Err(CaptureError::InvalidSignature(
                "signature must not be empty".to_string(),
            ));
        }
        if max_buffer < signature.len() {
            return Err(CaptureError::InvalidConfig(format!(
                "max_buffer {} is smaller than the signature ({} bytes)",
                max_buffer,
                signature.len()
            )));
        }
        Ok(Self {
            signature,
            buffer: BytesMut::new(),
            max_buffer,
            scan_from: 0,
        })
    }

    pub fn signature(&self) -> &Bytes {
        &self.signature
    }

    /// Bytes currently held back waiting for the next signature.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// The held-back bytes: empty, an open frame starting with the signature,
    /// or a tail shorter than the signature that may still grow into one.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Appends `chunk` and hands every completed frame to `emit`, in order.
    ///
    /// Frames completed by this chunk are always emitted before an overflow
    /// error is returned.
    pub fn push<F>(&mut self, chunk: &[u8], mut emit: F) -> Result<()>
    where
        F: FnMut(Bytes),
    {
        self.buffer.extend_from_slice(chunk);
        let sig_len = self.signature.len();

        loop {
            let Some(start) = find(&self.buffer, &self.signature, 0) else {
                // Nothing but noise; only a split signature prefix can matter.
                let keep = sig_len - 1;
                if self.buffer.len() > keep {
                    let _ = self.buffer.split_to(self.buffer.len() - keep);
                }
                self.scan_from = 0;
                break;
            };
            if start > 0 {
                let _ = self.buffer.split_to(start);
                self.scan_from = self.scan_from.saturating_sub(start);
            }

            let from = self.scan_from.max(sig_len);
            match find(&self.buffer, &self.signature, from) {
                Some(next) => {
                    emit(self.buffer.split_to(next).freeze());
                    self.scan_from = 0;
                }
                None => {
                    // Resume just before the tail next time, a signature may straddle it.
                    self.scan_from = (self.buffer.len() + 1).saturating_sub(sig_len).max(sig_len);
                    break;
                }
            }
        }

        if self.buffer.len() > self.max_buffer {
            let len = self.buffer.len();
            self.reset();
            return Err(CaptureError::BufferOverflow {
                len,
                max: self.max_buffer,
            });
        }
        Ok(())
    }

    /// Drops everything buffered so far.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scan_from = 0;
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() || haystack.len() - from < needle.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

#[cfg(test)]
#[path = "demux_test.rs"]
mod demux_test;
