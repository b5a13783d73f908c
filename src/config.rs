//! Configuration management with serde serialization/deserialization
//!
//! This module provides the capture option bag shared by every job, the
//! shallow merge used to layer per-source overrides on run defaults, and the
//! run-level configuration loaded by the CLI.

use crate::error::BatchError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Filename template used when neither the run nor the source sets one.
pub const DEFAULT_FILENAME_TEMPLATE: &str = "{url}-{size}{crop}";

/// Page listing global screen resolution statistics.
pub const W3COUNTER_STATS_URL: &str = "https://www.w3counter.com/globalstats.php";

/// Main configuration structure for a batch run
///
/// # Examples
///
/// ```rust
/// use screenshot_batch::{Config, Options};
///
/// let config = Config {
///     defaults: Options {
///         crop: Some(true),
///         ..Default::default()
///     },
///     ..Default::default()
/// };
/// assert_eq!(config.defaults.crop, Some(true));
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Options applied to every source unless the source overrides them
    pub defaults: Options,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Upper bound for a single capture when the job sets no `timeout`
    /// (default: 60 seconds)
    pub capture_timeout: Duration,

    /// Page scraped for the "popular resolutions" keyword
    pub resolution_source: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            defaults: Options {
                filename: Some(DEFAULT_FILENAME_TEMPLATE.to_string()),
                format: Some(OutputFormat::Png),
                ..Default::default()
            },
            chrome_path: None,
            capture_timeout: Duration::from_secs(60),
            resolution_source: W3COUNTER_STATS_URL.to_string(),
        }
    }
}

impl Config {
    /// Rejects settings no run could succeed with.
    pub fn validate(&self) -> crate::Result<()> {
        if self.capture_timeout.is_zero() {
            return Err(BatchError::Configuration(
                "capture timeout must be greater than 0".to_string(),
            ));
        }

        if url::Url::parse(&self.resolution_source).is_err() {
            return Err(BatchError::Configuration(format!(
                "resolution source '{}' is not a valid URL",
                self.resolution_source
            )));
        }

        self.defaults.validate()
    }
}

/// Capture parameters for a single screenshot
///
/// Every field is optional so that per-source options can be layered over
/// run defaults with [`Options::merged_with`]. Unknown header names go in
/// `headers`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Options {
    /// Seconds to wait after load before capturing
    pub delay: Option<u64>,

    /// Seconds before the capture is abandoned
    pub timeout: Option<u64>,

    /// Capture only the viewport instead of the full page
    pub crop: Option<bool>,

    /// Stylesheet text injected into the page before capture
    pub css: Option<String>,

    /// Cookies as `name=value` strings (attributes after `;` are ignored)
    pub cookies: Option<Vec<String>>,

    /// Filename template, see [`crate::render_filename`]
    pub filename: Option<String>,

    /// Capture only the first element matching this selector
    pub selector: Option<String>,

    /// Selectors hidden with `visibility: hidden` before capture
    pub hide: Option<Vec<String>>,

    pub username: Option<String>,
    pub password: Option<String>,

    /// Device scale factor
    pub scale: Option<f64>,

    pub format: Option<OutputFormat>,
    pub user_agent: Option<String>,

    /// Extra request headers
    pub headers: BTreeMap<String, String>,
}

impl Options {
    /// Shallow merge: fields set on `overrides` win, headers merge key by key.
    pub fn merged_with(&self, overrides: &Options) -> Options {
        let mut headers = self.headers.clone();
        headers.extend(
            overrides
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        Options {
            delay: overrides.delay.or(self.delay),
            timeout: overrides.timeout.or(self.timeout),
            crop: overrides.crop.or(self.crop),
            css: overrides.css.clone().or_else(|| self.css.clone()),
            cookies: overrides.cookies.clone().or_else(|| self.cookies.clone()),
            filename: overrides.filename.clone().or_else(|| self.filename.clone()),
            selector: overrides.selector.clone().or_else(|| self.selector.clone()),
            hide: overrides.hide.clone().or_else(|| self.hide.clone()),
            username: overrides.username.clone().or_else(|| self.username.clone()),
            password: overrides.password.clone().or_else(|| self.password.clone()),
            scale: overrides.scale.or(self.scale),
            format: overrides.format.or(self.format),
            user_agent: overrides
                .user_agent
                .clone()
                .or_else(|| self.user_agent.clone()),
            headers,
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        if let Some(scale) = self.scale {
            if scale.is_nan() || scale <= 0.0 {
                return Err(BatchError::Configuration(format!(
                    "scale must be positive, got {scale}"
                )));
            }
        }

        if let Some(template) = &self.filename {
            if template.trim().is_empty() {
                return Err(BatchError::Configuration(
                    "filename template must not be empty".to_string(),
                ));
            }
        }

        if self.password.is_some() && self.username.is_none() {
            return Err(BatchError::Configuration(
                "password given without username".to_string(),
            ));
        }

        Ok(())
    }

    pub fn is_cropped(&self) -> bool {
        self.crop.unwrap_or(false)
    }

    pub fn filename_template(&self) -> &str {
        self.filename.as_deref().unwrap_or(DEFAULT_FILENAME_TEMPLATE)
    }

    pub fn output_format(&self) -> OutputFormat {
        self.format.unwrap_or_default()
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay.filter(|d| *d > 0).map(Duration::from_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| *t > 0).map(Duration::from_secs)
    }
}

/// Supported output image formats for screenshots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG format - lossless compression, best quality
    #[default]
    Png,
    /// JPEG format - lossy compression, smaller files
    #[serde(alias = "jpg")]
    Jpeg,
    /// WebP format - modern compression, good balance of size and quality
    Webp,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Webp => "webp",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            "webp" => Ok(OutputFormat::Webp),
            other => Err(BatchError::Configuration(format!(
                "unsupported format '{other}' (expected png, jpg or webp)"
            ))),
        }
    }
}
