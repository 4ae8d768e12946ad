use capture_bus::{CaptureError, StreamMode};
use serde::{Deserialize, Serialize};

// ============================================================================
// Enumerations
// ============================================================================

/// Stream encoding produced by the capture process
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// H.264 elementary stream, forwarded as-is
    #[default]
    H264,
    /// Motion JPEG, split into still frames
    Mjpeg,
}

impl Codec {
    pub fn as_arg(self) -> &'static str {
        match self {
            Codec::H264 => "H264",
            Codec::Mjpeg => "MJPEG",
        }
    }

    pub fn stream_mode(self) -> StreamMode {
        match self {
            Codec::H264 => StreamMode::Plain,
            Codec::Mjpeg => StreamMode::MultipartImage,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    Rotate0,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Rotate0 => 0,
            Rotation::Rotate90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Rotate270 => 270,
        }
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::Rotate0),
            90 => Ok(Rotation::Rotate90),
            180 => Ok(Rotation::Rotate180),
            270 => Ok(Rotation::Rotate270),
            other => Err(format!("rotation must be 0, 90, 180 or 270, got {}", other)),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flip {
    #[default]
    None,
    Horizontal,
    Vertical,
    Both,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExposureMode {
    Off,
    Auto,
    Night,
    NightPreview,
    Backlight,
    Spotlight,
    Sports,
    Snow,
    Beach,
    VeryLong,
    FixedFps,
    AntiShake,
    Fireworks,
}

impl ExposureMode {
    pub fn as_arg(self) -> &'static str {
        match self {
            ExposureMode::Off => "off",
            ExposureMode::Auto => "auto",
            ExposureMode::Night => "night",
            ExposureMode::NightPreview => "nightpreview",
            ExposureMode::Backlight => "backlight",
            ExposureMode::Spotlight => "spotlight",
            ExposureMode::Sports => "sports",
            ExposureMode::Snow => "snow",
            ExposureMode::Beach => "beach",
            ExposureMode::VeryLong => "verylong",
            ExposureMode::FixedFps => "fixedfps",
            ExposureMode::AntiShake => "antishake",
            ExposureMode::Fireworks => "fireworks",
        }
    }
}

/// Automatic white balance preset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AwbMode {
    Off,
    Auto,
    Sun,
    Cloud,
    Shade,
    Tungsten,
    Fluorescent,
    Incandescent,
    Flash,
    Horizon,
    GreyWorld,
}

impl AwbMode {
    pub fn as_arg(self) -> &'static str {
        match self {
            AwbMode::Off => "off",
            AwbMode::Auto => "auto",
            AwbMode::Sun => "sun",
            AwbMode::Cloud => "cloud",
            AwbMode::Shade => "shade",
            AwbMode::Tungsten => "tungsten",
            AwbMode::Fluorescent => "fluorescent",
            AwbMode::Incandescent => "incandescent",
            AwbMode::Flash => "flash",
            AwbMode::Horizon => "horizon",
            AwbMode::GreyWorld => "greyworld",
        }
    }
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Image tuning shared by stream and still capture. `None` keeps the camera default.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub rotation: Rotation,
    pub flip: Flip,
    // microseconds
    pub shutter: Option<u32>,
    // -100..=100
    pub sharpness: Option<i32>,
    // -100..=100
    pub contrast: Option<i32>,
    // 0..=100
    pub brightness: Option<i32>,
    // -100..=100
    pub saturation: Option<i32>,
    pub iso: Option<u32>,
    // -10..=10
    pub exposure_compensation: Option<i32>,
    pub exposure_mode: Option<ExposureMode>,
    pub awb_mode: Option<AwbMode>,
    pub analog_gain: Option<f32>,
    pub digital_gain: Option<f32>,
}

impl Tuning {
    pub fn validate(&self) -> capture_bus::Result<()> {
        check_range("sharpness", self.sharpness, -100, 100)?;
        check_range("contrast", self.contrast, -100, 100)?;
        check_range("brightness", self.brightness, 0, 100)?;
        check_range("saturation", self.saturation, -100, 100)?;
        check_range("exposure_compensation", self.exposure_compensation, -10, 10)?;
        for (name, gain) in [
            ("analog_gain", self.analog_gain),
            ("digital_gain", self.digital_gain),
        ] {
            if let Some(gain) = gain {
                if !gain.is_finite() || gain < 0.0 {
                    return Err(invalid(format!("{} must be a positive number, got {}", name, gain)));
                }
            }
        }
        Ok(())
    }
}

/// Continuous capture settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    // bps
    pub bit_rate: u32,
    pub codec: Codec,
    // 0 = pick automatically, 1..=7 = fixed sensor mode
    pub sensor_mode: u8,
    #[serde(flatten)]
    pub tuning: Tuning,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            bit_rate: 17_000_000,
            codec: Codec::H264,
            sensor_mode: 0,
            tuning: Tuning::default(),
        }
    }
}

impl StreamOptions {
    pub fn builder() -> StreamOptionsBuilder {
        StreamOptionsBuilder::default()
    }

    pub fn validate(&self) -> capture_bus::Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(invalid(format!(
                "resolution must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(invalid("fps must be non-zero".to_string()));
        }
        if self.sensor_mode > 7 {
            return Err(invalid(format!(
                "sensor_mode must be 0..=7, got {}",
                self.sensor_mode
            )));
        }
        self.tuning.validate()
    }
}

/// Single still image settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StillOptions {
    pub width: u32,
    pub height: u32,
    // time before the shot is taken
    pub delay_ms: u32,
    #[serde(flatten)]
    pub tuning: Tuning,
}

impl Default for StillOptions {
    fn default() -> Self {
        Self {
            width: 3280,
            height: 2464,
            delay_ms: 1,
            tuning: Tuning::default(),
        }
    }
}

impl StillOptions {
    pub fn validate(&self) -> capture_bus::Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(invalid(format!(
                "resolution must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        self.tuning.validate()
    }
}

#[derive(Default)]
pub struct StreamOptionsBuilder {
    options: StreamOptions,
}

impl StreamOptionsBuilder {
    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.options.width = width;
        self.options.height = height;
        self
    }

    pub fn fps(mut self, fps: u32) -> Self {
        self.options.fps = fps;
        self
    }

    pub fn bit_rate(mut self, bit_rate: u32) -> Self {
        self.options.bit_rate = bit_rate;
        self
    }

    pub fn codec(mut self, codec: Codec) -> Self {
        self.options.codec = codec;
        self
    }

    pub fn sensor_mode(mut self, mode: u8) -> Self {
        self.options.sensor_mode = mode;
        self
    }

    pub fn tuning(mut self, tuning: Tuning) -> Self {
        self.options.tuning = tuning;
        self
    }

    pub fn build(self) -> capture_bus::Result<StreamOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

fn check_range(name: &str, value: Option<i32>, min: i32, max: i32) -> capture_bus::Result<()> {
    match value {
        Some(v) if v < min || v > max => Err(invalid(format!(
            "{} must be within {}..={}, got {}",
            name, min, max, v
        ))),
        _ => Ok(()),
    }
}

fn invalid(msg: String) -> CaptureError {
    CaptureError::InvalidConfig(msg)
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
