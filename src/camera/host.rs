//! Host model detection for the MJPEG frame signature.

use std::path::PathBuf;

use bytes::Bytes;
use capture_bus::{CaptureError, SignatureProvider};

/// SOI marker followed by the first quantisation table header, as written by
/// the VideoCore MJPEG encoder.
pub const VIDEOCORE_JPEG_SIGNATURE: &[u8] = &[0xff, 0xd8, 0xff, 0xdb, 0x00, 0x84, 0x00];

const DEVICE_TREE_MODEL: &str = "/proc/device-tree/model";
const CPUINFO: &str = "/proc/cpuinfo";

/// Board families whose camera stack emits [`VIDEOCORE_JPEG_SIGNATURE`].
const KNOWN_MODELS: &[&str] = &[
    "Raspberry Pi Model",
    "Raspberry Pi 2",
    "Raspberry Pi 3",
    "Raspberry Pi 4",
    "Raspberry Pi 400",
    "Raspberry Pi Zero",
    "Raspberry Pi Compute Module",
];

/// Picks the frame signature from the board the process runs on.
#[derive(Clone, Debug)]
pub struct HostSignature {
    model_path: PathBuf,
    cpuinfo_path: PathBuf,
}

impl Default for HostSignature {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEVICE_TREE_MODEL),
            cpuinfo_path: PathBuf::from(CPUINFO),
        }
    }
}

impl HostSignature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the model from other locations, mostly useful for tests.
    pub fn with_paths(model_path: impl Into<PathBuf>, cpuinfo_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            cpuinfo_path: cpuinfo_path.into(),
        }
    }

    /// The board model string, empty when it cannot be read.
    pub fn model(&self) -> String {
        if let Ok(raw) = std::fs::read(&self.model_path) {
            // device-tree strings are NUL terminated
            let model = String::from_utf8_lossy(&raw);
            let model = model.trim_end_matches('\0').trim();
            if !model.is_empty() {
                return model.to_string();
            }
        }
        std::fs::read_to_string(&self.cpuinfo_path)
            .ok()
            .and_then(|cpuinfo| model_from_cpuinfo(&cpuinfo))
            .unwrap_or_default()
    }
}

impl SignatureProvider for HostSignature {
    fn resolve(&self) -> capture_bus::Result<Bytes> {
        let model = self.model();
        signature_for_model(&model).ok_or_else(|| {
            log::error!("no frame signature for host model {:?}", model);
            CaptureError::UnknownHost(model)
        })
    }
}

pub fn signature_for_model(model: &str) -> Option<Bytes> {
    KNOWN_MODELS
        .iter()
        .any(|known| model.starts_with(known))
        .then(|| Bytes::from_static(VIDEOCORE_JPEG_SIGNATURE))
}

fn model_from_cpuinfo(cpuinfo: &str) -> Option<String> {
    cpuinfo.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim() == "Model").then(|| value.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn file_with(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    #[test]
    fn test_known_models() {
        for model in [
            "Raspberry Pi 4 Model B Rev 1.4",
            "Raspberry Pi Zero W Rev 1.1",
            "Raspberry Pi 3 Model B Plus Rev 1.3",
            "Raspberry Pi Compute Module 4 Rev 1.0",
        ] {
            assert_eq!(
                signature_for_model(model).as_deref(),
                Some(VIDEOCORE_JPEG_SIGNATURE),
                "{}",
                model
            );
        }
        assert!(signature_for_model("").is_none());
        assert!(signature_for_model("Jetson Nano").is_none());
    }

    #[test]
    fn test_model_from_device_tree() {
        let model = file_with(b"Raspberry Pi 4 Model B Rev 1.2\0");
        let host = HostSignature::with_paths(model.path(), "/nonexistent/cpuinfo");
        assert_eq!(host.model(), "Raspberry Pi 4 Model B Rev 1.2");
        assert!(host.resolve().is_ok());
    }

    #[test]
    fn test_model_falls_back_to_cpuinfo() {
        let cpuinfo = file_with(b"processor\t: 0\nHardware\t: BCM2835\nModel\t\t: Raspberry Pi Zero 2 W Rev 1.0\n");
        let host = HostSignature::with_paths("/nonexistent/model", cpuinfo.path());
        assert_eq!(host.model(), "Raspberry Pi Zero 2 W Rev 1.0");
    }

    #[test]
    fn test_unknown_host_is_an_error() {
        let model = file_with(b"Generic x86 Box\0");
        let host = HostSignature::with_paths(model.path(), "/nonexistent/cpuinfo");
        match host.resolve() {
            Err(CaptureError::UnknownHost(m)) => assert_eq!(m, "Generic x86 Box"),
            other => panic!("Expected UnknownHost, got {:?}", other),
        }
    }
}
