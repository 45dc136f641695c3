//! Pipeline configuration: defaults, `FLIPBOOK_DL_*` environment overrides,
//! and validation.
//!
//! Everything here is plain data handed to the pipeline by its caller; the
//! pipeline itself never reads the environment.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Public viewer host.
pub const DEFAULT_VIEWER_BASE: &str = "https://online.fliphtml5.com";

/// Default cap on the number of images fetched per publication.
pub const DEFAULT_MAX_IMAGES: usize = 1000;

/// Download retry schedule: `base_delay * 2^attempt` before every attempt after the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Pause before the zero-based `attempt`. None for the first.
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        (attempt > 0).then(|| self.base_delay * 2u32.saturating_pow(attempt))
    }

    /// No pauses at all. For tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }
}

/// Fixed waits and retry pauses used when driving the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureTiming {
    /// Wait after navigation before touching the page.
    pub load_wait: Duration,
    /// Wait after revealing hidden elements and firing triggers.
    pub reveal_wait: Duration,
    /// Wait after isolating the target page, before the screenshot.
    pub isolate_wait: Duration,
    /// Render attempts per page in one pass.
    pub attempts: u32,
    /// Pause between attempts in the concurrent pass.
    pub retry_pause: Duration,
    /// Delay before each worker starts a render, to avoid launch races.
    pub stagger: Duration,
    /// Pause between batches while the previous session's processes exit.
    pub batch_pause: Duration,
    /// Pause before each page in the serial retry pass.
    pub serial_pause: Duration,
    /// Pause between attempts in the serial retry pass.
    pub serial_retry_pause: Duration,
    /// Upper bound on one render attempt.
    pub attempt_timeout: Duration,
}

impl Default for CaptureTiming {
    fn default() -> Self {
        Self {
            load_wait: Duration::from_secs(3),
            reveal_wait: Duration::from_secs(1),
            isolate_wait: Duration::from_secs(1),
            attempts: 2,
            retry_pause: Duration::from_secs(2),
            stagger: Duration::from_millis(200),
            batch_pause: Duration::from_secs(2),
            serial_pause: Duration::from_secs(3),
            serial_retry_pause: Duration::from_secs(4),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

impl CaptureTiming {
    /// All waits zeroed. For tests.
    pub fn immediate() -> Self {
        Self {
            load_wait: Duration::ZERO,
            reveal_wait: Duration::ZERO,
            isolate_wait: Duration::ZERO,
            retry_pause: Duration::ZERO,
            stagger: Duration::ZERO,
            batch_pause: Duration::ZERO,
            serial_pause: Duration::ZERO,
            serial_retry_pause: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Everything one pipeline run needs to know.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Viewer host the manifest and images are fetched from.
    pub viewer_base_url: String,
    /// Concurrent image downloads.
    pub concurrency: usize,
    /// Images per download batch.
    pub download_batch_size: usize,
    /// Concurrent browser renders. Kept at or below `concurrency`.
    pub capture_concurrency: usize,
    /// Pages per capture batch; each batch gets its own browser session.
    pub capture_batch_size: usize,
    /// Directory the final PDF is written to.
    pub output_dir: PathBuf,
    /// Directory for downloaded images. Defaults to a per-publication
    /// directory under the system temp dir so interrupted runs resume.
    pub image_output_dir: Option<PathBuf>,
    /// Overwrite an existing PDF.
    pub force: bool,
    /// Run the browser capture phase.
    pub interactive: bool,
    /// Cap on images per publication. `None` disables the cap.
    pub max_images: Option<usize>,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub capture_timing: CaptureTiming,
    /// Explicit Chromium binary.
    pub chromium_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        Self {
            viewer_base_url: DEFAULT_VIEWER_BASE.to_string(),
            concurrency: cpus.saturating_sub(1).max(1),
            download_batch_size: 50,
            capture_concurrency: 4,
            capture_batch_size: 8,
            output_dir: PathBuf::from("."),
            image_output_dir: None,
            force: false,
            interactive: false,
            max_images: Some(DEFAULT_MAX_IMAGES),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            capture_timing: CaptureTiming::default(),
            chromium_path: None,
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with `FLIPBOOK_DL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("FLIPBOOK_DL_VIEWER_URL") {
            config.viewer_base_url = v;
        }
        if let Some(v) = lookup("FLIPBOOK_DL_CONCURRENCY") {
            config.concurrency = parse_env("FLIPBOOK_DL_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("FLIPBOOK_DL_BATCH_SIZE") {
            config.download_batch_size = parse_env("FLIPBOOK_DL_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("FLIPBOOK_DL_CAPTURE_CONCURRENCY") {
            config.capture_concurrency = parse_env("FLIPBOOK_DL_CAPTURE_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("FLIPBOOK_DL_CAPTURE_BATCH_SIZE") {
            config.capture_batch_size = parse_env("FLIPBOOK_DL_CAPTURE_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("FLIPBOOK_DL_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FLIPBOOK_DL_IMAGE_DIR") {
            config.image_output_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("FLIPBOOK_DL_MAX_IMAGES") {
            // 0 disables the cap
            let max: usize = parse_env("FLIPBOOK_DL_MAX_IMAGES", &v)?;
            config.max_images = (max > 0).then_some(max);
        }
        if let Some(v) = lookup("FLIPBOOK_DL_CHROMIUM_PATH") {
            config.chromium_path = Some(PathBuf::from(v));
        }

        Ok(config)
    }

    /// Reject unusable values and normalize the capture pool.
    ///
    /// The capture pool never exceeds the download pool, and a capture batch
    /// always holds at least one full round of concurrent renders.
    pub fn validate(mut self) -> Result<Self> {
        if self.concurrency == 0 {
            return Err(invalid("concurrency", "must be at least 1"));
        }
        if self.download_batch_size == 0 {
            return Err(invalid("download_batch_size", "must be at least 1"));
        }
        if self.capture_concurrency == 0 {
            return Err(invalid("capture_concurrency", "must be at least 1"));
        }
        if self.capture_batch_size == 0 {
            return Err(invalid("capture_batch_size", "must be at least 1"));
        }
        if self.max_images == Some(0) {
            return Err(invalid("max_images", "use None to disable the cap"));
        }
        if self.retry.max_attempts == 0 || self.capture_timing.attempts == 0 {
            return Err(invalid("attempts", "must be at least 1"));
        }
        if url::Url::parse(&self.viewer_base_url).is_err() {
            return Err(invalid("viewer_base_url", "not a valid URL"));
        }

        self.capture_concurrency = self.capture_concurrency.min(self.concurrency);
        self.capture_batch_size = self.capture_batch_size.max(self.capture_concurrency);
        Ok(self)
    }

    /// Where downloaded images for `slug` live.
    pub fn image_dir(&self, slug: &str) -> PathBuf {
        match &self.image_output_dir {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir().join("flipbook-dl").join(slug),
        }
    }

    /// Where interactive screenshots for `slug` live.
    pub fn capture_dir(&self, slug: &str) -> PathBuf {
        self.image_dir(slug).join("interactive")
    }
}

fn invalid(key: &str, message: &str) -> Error {
    Error::InvalidConfig {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| Error::InvalidConfig {
        key: key.to_string(),
        message: format!("cannot parse {value:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default().validate().unwrap();
        assert!(config.concurrency >= 1);
        assert_eq!(config.max_images, Some(DEFAULT_MAX_IMAGES));
        assert!(config.capture_concurrency <= config.concurrency);
        assert!(config.capture_batch_size >= config.capture_concurrency);
    }

    #[test]
    fn test_env_overrides() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("FLIPBOOK_DL_CONCURRENCY", "6"),
            ("FLIPBOOK_DL_CAPTURE_BATCH_SIZE", "12"),
            ("FLIPBOOK_DL_MAX_IMAGES", "0"),
            ("FLIPBOOK_DL_OUTPUT_DIR", "/tmp/out"),
        ]))
        .unwrap();
        assert_eq!(config.concurrency, 6);
        assert_eq!(config.capture_batch_size, 12);
        assert_eq!(config.max_images, None);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_env_parse_error_names_key() {
        let err = PipelineConfig::from_lookup(lookup(&[("FLIPBOOK_DL_CONCURRENCY", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("FLIPBOOK_DL_CONCURRENCY"));
    }

    #[test]
    fn test_validate_rejects_zero_pools() {
        let config = PipelineConfig {
            concurrency: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig { .. })
        ));

        let config = PipelineConfig {
            download_batch_size: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_normalizes_capture_pool() {
        let config = PipelineConfig {
            concurrency: 2,
            capture_concurrency: 4,
            capture_batch_size: 1,
            ..PipelineConfig::default()
        }
        .validate()
        .unwrap();
        assert_eq!(config.capture_concurrency, 2);
        assert_eq!(config.capture_batch_size, 2);
    }

    #[test]
    fn test_retry_delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(0), None);
        assert_eq!(policy.delay_before(1), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_before(2), Some(Duration::from_secs(4)));
        assert_eq!(RetryPolicy::immediate(3).delay_before(2), Some(Duration::ZERO));
    }

    #[test]
    fn test_image_dirs() {
        let config = PipelineConfig {
            image_output_dir: Some(PathBuf::from("/data/imgs")),
            ..PipelineConfig::default()
        };
        assert_eq!(config.image_dir("a-b"), PathBuf::from("/data/imgs"));
        assert_eq!(
            config.capture_dir("a-b"),
            PathBuf::from("/data/imgs/interactive")
        );

        let config = PipelineConfig::default();
        assert!(config.image_dir("a-b").ends_with("flipbook-dl/a-b"));
    }
}
