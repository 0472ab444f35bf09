//! Configuration loaded from `genjob.toml`.
//!
//! Every key is optional and falls back to the defaults observed for the
//! kie.ai image and video models. `KIE_API_KEY` from the environment (or a
//! `.env` file loaded by the binary) takes precedence over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::kie::ClientConfig;
use crate::kie::client::API_BASE;
use crate::state_machine::{Backoff, PollPolicy};
use crate::upload::{UPLOAD_ENDPOINT, UploadConfig};

pub const DEFAULT_CONFIG_FILE: &str = "genjob.toml";
pub const API_KEY_ENV: &str = "KIE_API_KEY";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenjobConfig {
    /// Overridden by `KIE_API_KEY` when that is set.
    pub api_key: String,
    pub api_base: String,
    /// File host used for local images in the video flow.
    pub upload_endpoint: String,
    /// Root of the date-keyed output layout.
    pub output_root: PathBuf,
    pub connect_timeout_secs: u64,
    pub image: ImageProfile,
    pub video: VideoProfile,
}

impl Default for GenjobConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: API_BASE.to_string(),
            upload_endpoint: UPLOAD_ENDPOINT.to_string(),
            output_root: PathBuf::from("output"),
            connect_timeout_secs: 10,
            image: ImageProfile::default(),
            video: VideoProfile::default(),
        }
    }
}

/// Upper bound for any poll interval, plain or backed off.
pub const MAX_POLL_INTERVAL_SECS: u64 = 3600;

/// Wait budget and request timeouts of one profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    /// Give up on a job after this long, counted from the first status query.
    pub max_wait_secs: u64,
    /// Base delay between status queries. Must be at least 1.
    pub poll_interval_secs: u64,
    /// Timeout of the submit request.
    pub submit_timeout_secs: u64,
    /// Timeout of the artifact download.
    pub fetch_timeout_secs: u64,
    /// Values above 1.0 switch polling to exponential backoff.
    pub backoff_multiplier: f64,
    /// Cap of the backed-off delay.
    pub max_poll_interval_secs: u64,
}

impl Timing {
    /// Check the values, then build the poll schedule.
    ///
    /// A zero interval, an interval or cap above [`MAX_POLL_INTERVAL_SECS`]
    /// and a non-finite multiplier are [`Error::Configuration`].
    pub fn poll_policy(&self) -> Result<PollPolicy> {
        if self.poll_interval_secs == 0 {
            return Err(Error::Configuration(
                "poll_interval_secs must be at least 1".into(),
            ));
        }
        if self.poll_interval_secs > MAX_POLL_INTERVAL_SECS
            || self.max_poll_interval_secs > MAX_POLL_INTERVAL_SECS
        {
            return Err(Error::Configuration(format!(
                "poll intervals must not exceed {MAX_POLL_INTERVAL_SECS}s"
            )));
        }
        if !self.backoff_multiplier.is_finite() {
            return Err(Error::Configuration(
                "backoff_multiplier must be a finite number".into(),
            ));
        }

        let policy = PollPolicy::fixed(
            Duration::from_secs(self.max_wait_secs),
            Duration::from_secs(self.poll_interval_secs),
        );
        if self.backoff_multiplier > 1.0 {
            Ok(policy.with_backoff(Backoff::Exponential {
                multiplier: self.backoff_multiplier,
                max_interval: Duration::from_secs(
                    self.max_poll_interval_secs.max(self.poll_interval_secs),
                ),
            }))
        } else {
            Ok(policy)
        }
    }
}

/// Model input and timings of the portrait flow. Timing fields mirror
/// [`Timing`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageProfile {
    pub model: String,
    /// Also the output file extension.
    pub output_format: String,
    pub aspect_ratio: String,
    pub resolution: String,
    /// Replaces the dated output directory when set.
    pub output_dir: Option<PathBuf>,
    pub max_wait_secs: u64,
    pub poll_interval_secs: u64,
    pub submit_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub backoff_multiplier: f64,
    pub max_poll_interval_secs: u64,
}

impl Default for ImageProfile {
    fn default() -> Self {
        Self {
            model: "nano-banana-pro".to_string(),
            output_format: "png".to_string(),
            aspect_ratio: "3:4".to_string(),
            resolution: "2K".to_string(),
            output_dir: None,
            max_wait_secs: 120,
            poll_interval_secs: 2,
            submit_timeout_secs: 30,
            fetch_timeout_secs: 60,
            backoff_multiplier: 1.0,
            max_poll_interval_secs: 2,
        }
    }
}

impl ImageProfile {
    pub fn timing(&self) -> Timing {
        Timing {
            max_wait_secs: self.max_wait_secs,
            poll_interval_secs: self.poll_interval_secs,
            submit_timeout_secs: self.submit_timeout_secs,
            fetch_timeout_secs: self.fetch_timeout_secs,
            backoff_multiplier: self.backoff_multiplier,
            max_poll_interval_secs: self.max_poll_interval_secs,
        }
    }
}

/// Model input, upload settings and timings of the image-to-video flow.
/// Timing fields mirror [`Timing`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VideoProfile {
    pub model: String,
    pub mode: String,
    /// Clip length in seconds, sent as a string.
    pub duration: String,
    /// Long-edge limit of uploaded images.
    pub max_upload_edge: u32,
    pub jpeg_quality: u8,
    /// Used when a persona has no `motion_prompt`, and for scanned images.
    pub default_motion_prompt: String,
    /// Replaces the dated output directory when set.
    pub output_dir: Option<PathBuf>,
    pub max_wait_secs: u64,
    pub poll_interval_secs: u64,
    pub submit_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub backoff_multiplier: f64,
    pub max_poll_interval_secs: u64,
}

impl Default for VideoProfile {
    fn default() -> Self {
        Self {
            model: "grok-imagine/image-to-video".to_string(),
            mode: "normal".to_string(),
            duration: "6".to_string(),
            max_upload_edge: 768,
            jpeg_quality: 80,
            default_motion_prompt: "Gentle subtle movement, natural blinking, soft ambient light"
                .to_string(),
            output_dir: None,
            max_wait_secs: 600,
            poll_interval_secs: 5,
            submit_timeout_secs: 60,
            fetch_timeout_secs: 120,
            backoff_multiplier: 1.0,
            max_poll_interval_secs: 5,
        }
    }
}

impl VideoProfile {
    pub fn timing(&self) -> Timing {
        Timing {
            max_wait_secs: self.max_wait_secs,
            poll_interval_secs: self.poll_interval_secs,
            submit_timeout_secs: self.submit_timeout_secs,
            fetch_timeout_secs: self.fetch_timeout_secs,
            backoff_multiplier: self.backoff_multiplier,
            max_poll_interval_secs: self.max_poll_interval_secs,
        }
    }
}

impl GenjobConfig {
    /// Load `path`, or `genjob.toml` in the current directory when `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file is
    /// an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_key(std::env::var(API_KEY_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    /// Reject timing values that would make polling spin or overflow.
    pub fn validate(&self) -> Result<()> {
        self.image
            .timing()
            .poll_policy()
            .map_err(|e| Error::Configuration(format!("[image] {}", inner_reason(&e))))?;
        self.video
            .timing()
            .poll_policy()
            .map_err(|e| Error::Configuration(format!("[video] {}", inner_reason(&e))))?;
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// The environment key wins over the file when it is non-empty.
    pub fn apply_env_key(&mut self, key: Option<String>) {
        if let Some(key) = key
            && !key.trim().is_empty()
        {
            self.api_key = key.trim().to_string();
        }
    }

    pub fn client_config(&self, timing: &Timing) -> ClientConfig {
        let mut client = ClientConfig::new(self.api_key.clone()).with_api_base(self.api_base.as_str());
        client.connect_timeout = Duration::from_secs(self.connect_timeout_secs);
        client.submit_timeout = Duration::from_secs(timing.submit_timeout_secs);
        client.fetch_timeout = Duration::from_secs(timing.fetch_timeout_secs);
        client
    }

    pub fn upload_config(&self) -> UploadConfig {
        UploadConfig {
            endpoint: self.upload_endpoint.clone(),
            max_edge: self.video.max_upload_edge,
            jpeg_quality: self.video.jpeg_quality,
            timeout: Duration::from_secs(self.video.submit_timeout_secs),
        }
    }
}

fn inner_reason(error: &Error) -> String {
    match error {
        Error::Configuration(reason) => reason.clone(),
        other => other.to_string(),
    }
}
