use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;

use crate::encode::{boomerang, stop_motion, BoomerangEncoder, StopMotionEncoder};
use crate::error::Error;
use crate::processing::compose::CompositeStyle;
use crate::processing::resample::{Resampler, DEFAULT_MAX_DECODE_BYTES};
use crate::processing::slots::LayoutKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureMode {
    /// Runs every shot unattended after a single start.
    Auto,
    /// One countdown and shot per external trigger.
    Manual,
}

/// Parameters of one capture session. Read-only while the session runs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SessionConfig {
    pub target_shot_count: usize,
    pub countdown_seconds: u32,
    pub mode: CaptureMode,
    /// Only used in [`CaptureMode::Auto`].
    pub inter_shot_delay_seconds: u32,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.target_shot_count == 0 {
            return Err(Error::InvalidSessionConfig(
                "target-shot-count must be at least 1".into(),
            ));
        }
        if self.countdown_seconds == 0 {
            return Err(Error::InvalidSessionConfig(
                "countdown-seconds must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn inter_shot_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.inter_shot_delay_seconds))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_shot_count: 4,
            countdown_seconds: 3,
            mode: CaptureMode::Auto,
            inter_shot_delay_seconds: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CueKind {
    #[default]
    Bell,
    Silent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FrameSourceOptions {
    /// Directory replayed as camera frames.
    pub directory: PathBuf,
}

impl Default for FrameSourceOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("camera-roll"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LayoutOptions {
    pub kind: LayoutKind,
    pub background: [u8; 3],
    /// Transparent PNG drawn over the finished print.
    pub frame_overlay: Option<PathBuf>,
    pub output_name: String,
}

impl LayoutOptions {
    pub fn style(&self) -> CompositeStyle {
        CompositeStyle {
            background: self.background,
        }
    }
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            kind: LayoutKind::Grid,
            background: [255, 255, 255],
            frame_overlay: None,
            output_name: "print.png".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DecoderOptions {
    /// Largest single decode allocation before the resampler backs off.
    pub max_decode_bytes: u64,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            max_decode_bytes: DEFAULT_MAX_DECODE_BYTES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BoomerangOptions {
    pub enabled: bool,
    pub target_width: u32,
    #[serde(with = "humantime_serde")]
    pub frame_delay: Duration,
    pub output_name: String,
}

impl Default for BoomerangOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            target_width: boomerang::DEFAULT_TARGET_WIDTH,
            frame_delay: boomerang::DEFAULT_FRAME_DELAY,
            output_name: "boomerang.gif".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StopMotionOptions {
    pub enabled: bool,
    pub target_width: u32,
    pub fps: u32,
    pub repeat: u32,
    /// ffmpeg executable name or path.
    pub ffmpeg: PathBuf,
    pub output_name: String,
}

impl Default for StopMotionOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            target_width: stop_motion::DEFAULT_TARGET_WIDTH,
            fps: stop_motion::DEFAULT_FPS,
            repeat: stop_motion::DEFAULT_REPEAT,
            ffmpeg: PathBuf::from("ffmpeg"),
            output_name: "stop-motion.mp4".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Each session gets its own timestamped directory below this one.
    pub output_directory: PathBuf,
    pub session: SessionConfig,
    /// Pause before the single shutter retry.
    #[serde(with = "humantime_serde")]
    pub shutter_retry_backoff: Duration,
    pub frame_source: FrameSourceOptions,
    pub cue: CueKind,
    pub layout: LayoutOptions,
    pub decoder: DecoderOptions,
    pub boomerang: BoomerangOptions,
    pub stop_motion: StopMotionOptions,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        self.session
            .validate()
            .context("invalid session configuration")?;
        ensure!(
            self.decoder.max_decode_bytes > 0,
            "decoder.max-decode-bytes must be greater than zero"
        );
        ensure!(
            !self.layout.output_name.trim().is_empty(),
            "layout.output-name must not be empty"
        );
        if let Some(overlay) = &self.layout.frame_overlay {
            ensure!(
                overlay.is_file(),
                "layout.frame-overlay {} must point to a file",
                overlay.display()
            );
        }
        ensure!(
            self.boomerang.target_width > 0,
            "boomerang.target-width must be greater than zero"
        );
        ensure!(
            !self.boomerang.frame_delay.is_zero(),
            "boomerang.frame-delay must be positive"
        );
        ensure!(
            self.stop_motion.target_width >= 2,
            "stop-motion.target-width must be at least 2"
        );
        ensure!(self.stop_motion.fps > 0, "stop-motion.fps must be greater than zero");
        ensure!(
            self.stop_motion.repeat > 0,
            "stop-motion.repeat must be greater than zero"
        );
        Ok(self)
    }

    pub fn resampler(&self) -> Resampler {
        Resampler::new(self.decoder.max_decode_bytes)
    }

    pub fn boomerang_encoder(&self) -> BoomerangEncoder {
        BoomerangEncoder::new(self.resampler(), self.boomerang.target_width)
    }

    pub fn stop_motion_encoder(&self) -> StopMotionEncoder {
        StopMotionEncoder::new(self.resampler())
            .with_target_width(self.stop_motion.target_width)
            .with_fps(self.stop_motion.fps)
            .with_repeat(self.stop_motion.repeat)
            .with_ffmpeg(self.stop_motion.ffmpeg.clone())
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("sessions"),
            session: SessionConfig::default(),
            shutter_retry_backoff: Duration::from_millis(500),
            frame_source: FrameSourceOptions::default(),
            cue: CueKind::default(),
            layout: LayoutOptions::default(),
            decoder: DecoderOptions::default(),
            boomerang: BoomerangOptions::default(),
            stop_motion: StopMotionOptions::default(),
        }
    }
}
