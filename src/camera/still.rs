use bytes::Bytes;
use capture_bus::run_to_completion;

use crate::camera::{
    args::{still_args, STILL_PROGRAM},
    types::StillOptions,
};

/// One-shot JPEG capture through `raspistill`.
pub struct StillCamera {
    options: StillOptions,
    program: String,
}

impl StillCamera {
    pub fn new(options: StillOptions) -> capture_bus::Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            program: STILL_PROGRAM.to_string(),
        })
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn options(&self) -> &StillOptions {
        &self.options
    }

    pub async fn take_image(&self) -> capture_bus::Result<Bytes> {
        let args = still_args(&self.options);
        let image = run_to_completion(&self.program, &args).await?;
        log::info!("still: captured {} bytes", image.len());
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use capture_bus::CaptureError;

    use super::*;

    #[test]
    fn test_rejects_invalid_options() {
        let options = StillOptions {
            height: 0,
            ..Default::default()
        };
        assert!(StillCamera::new(options).is_err());
    }

    #[tokio::test]
    async fn test_missing_program() {
        let camera = StillCamera::new(StillOptions::default())
            .unwrap()
            .with_program("no-such-raspistill");
        let err = camera.take_image().await.unwrap_err();
        assert!(matches!(err, CaptureError::Launch { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_stdout() {
        // `echo` ignores the raspistill flags and prints them back.
        let camera = StillCamera::new(StillOptions::default())
            .unwrap()
            .with_program("echo");
        let image = camera.take_image().await.unwrap();
        let printed = String::from_utf8_lossy(&image);
        assert!(printed.contains("--encoding jpg"));
    }
}
