use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use capture_bus::{FixedSignature, SignatureProvider, DEFAULT_MAX_BUFFER};
use serde::{Deserialize, Serialize};

use crate::camera::{HostSignature, StillOptions, StreamOptions};

/// Environment variable holding the path of a JSON config file.
pub const CONFIG_ENV: &str = "PICAM_CONFIG";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stream: StreamOptions,
    /// Take one still before streaming starts.
    pub still: Option<StillOptions>,
    /// Capture executable, defaults to `raspivid`.
    pub program: Option<String>,
    /// Hex frame signature, skips host detection when set.
    pub signature: Option<String>,
    pub max_buffer: usize,
    pub stats_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            stream: StreamOptions::default(),
            still: None,
            program: None,
            signature: None,
            max_buffer: DEFAULT_MAX_BUFFER,
            stats_interval_secs: 10,
        }
    }
}

impl AppConfig {
    /// Loads the file named by `PICAM_CONFIG`, or the defaults when it is unset.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            log::info!("config: {} not set, using defaults", CONFIG_ENV);
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.stream.validate().context("invalid stream options")?;
        if let Some(still) = &config.still {
            still.validate().context("invalid still options")?;
        }
        log::info!("config: loaded {}", path.display());
        Ok(config)
    }

    pub fn signature_provider(&self) -> anyhow::Result<Arc<dyn SignatureProvider>> {
        match &self.signature {
            Some(hex) => {
                let fixed = FixedSignature::from_hex(hex).context("invalid signature override")?;
                Ok(Arc::new(fixed))
            }
            None => Ok(Arc::new(HostSignature::new())),
        }
    }
}
