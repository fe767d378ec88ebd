//! Runner configuration
//!
//! Every section has a `Default` suitable for a local development server, can
//! be loaded from a YAML file, and is further overridden by CLI flags in the
//! harness binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{E2eError, E2eResult};
use crate::visual::VisualConfig;

/// Remote server under test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Base URL; a trailing `/index.php` is stripped
    pub base_url: String,

    /// Administrator used for provisioning test users
    pub admin_user: String,
    pub admin_password: String,

    /// Password given to generated test users
    pub user_password: String,

    /// Timeout for individual HTTP requests
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,

    /// How long to wait for the server status probe before giving up
    #[serde(with = "duration_ms")]
    pub startup_timeout: Duration,
}

impl TargetConfig {
    /// Base URL with any trailing `/index.php` removed
    pub fn normalized_base_url(&self) -> String {
        normalize_base_url(&self.base_url)
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081/index.php".to_string(),
            admin_user: "admin".to_string(),
            admin_password: "admin".to_string(),
            user_password: "password".to_string(),
            request_timeout: Duration::from_secs(30),
            startup_timeout: Duration::from_secs(60),
        }
    }
}

/// Chromium launch options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,

    /// Chrome executable (None = auto-detect)
    pub chrome_path: Option<PathBuf>,

    /// Extra command line arguments
    pub args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1280,
            window_height: 720,
            chrome_path: None,
            // Containers usually lack user namespaces and a large /dev/shm.
            args: vec![
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ],
        }
    }
}

/// Configuration for the test runner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub target: TargetConfig,
    pub browser: BrowserConfig,
    pub visual: VisualConfig,
    pub scenarios_dir: PathBuf,
    pub fixtures_dir: PathBuf,
    pub output_dir: PathBuf,

    /// Default assertion timeout for DOM steps
    #[serde(with = "duration_ms")]
    pub assertion_timeout: Duration,
}

impl RunnerConfig {
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            E2eError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            target: TargetConfig::default(),
            browser: BrowserConfig::default(),
            visual: VisualConfig::default(),
            scenarios_dir: PathBuf::from("scenarios"),
            fixtures_dir: PathBuf::from("fixtures"),
            output_dir: PathBuf::from("test-results"),
            assertion_timeout: crate::wait::DEFAULT_TIMEOUT,
        }
    }
}

/// Strips a trailing `/index.php` (with or without a final slash).
pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.strip_suffix('/').unwrap_or(url);
    trimmed
        .strip_suffix("/index.php")
        .unwrap_or(trimmed)
        .to_string()
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
