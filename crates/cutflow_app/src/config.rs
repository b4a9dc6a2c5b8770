//! RON configuration for the `cutflow` binary.
//!
//! Looked up at `./cutflow.ron` unless `--config` names another file. Every
//! field is optional; anything missing keeps its default.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cutflow_core::CreateOptions;
use cutflow_engine::{BackendSettings, OrchestratorSettings, PollSettings, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::logging::LogDestination;

pub const DEFAULT_CONFIG_PATH: &str = "cutflow.ron";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub output_dir: PathBuf,
    pub log_destination: LogDestination,
    pub log_level: String,
    pub retry: RetryConfig,
    pub poll: PollConfig,
    pub connect_timeout_ms: u64,
    pub download_deadline_secs: u64,
    pub health_deadline_ms: u64,
    pub defaults: OptionDefaults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub deadline_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
    pub max_consecutive_failures: Option<u32>,
}

/// Editing preferences used when the command line does not override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionDefaults {
    pub platform: String,
    pub style: String,
    pub pace: String,
    pub subtitle_density: String,
    pub music_preference: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let backend = BackendSettings::default();
        let orchestrator = OrchestratorSettings::default();
        Self {
            base_url: backend.base_url,
            output_dir: orchestrator.output_dir,
            log_destination: LogDestination::Terminal,
            log_level: "info".to_string(),
            retry: RetryConfig::default(),
            poll: PollConfig::default(),
            connect_timeout_ms: millis(backend.connect_timeout),
            download_deadline_secs: orchestrator.download_deadline.as_secs(),
            health_deadline_ms: millis(orchestrator.health_deadline),
            defaults: OptionDefaults::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: millis(policy.initial_delay),
            deadline_ms: millis(policy.deadline),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        let poll = PollSettings::default();
        Self {
            interval_ms: millis(poll.interval),
            max_consecutive_failures: poll.max_consecutive_failures,
        }
    }
}

impl Default for OptionDefaults {
    fn default() -> Self {
        let options = CreateOptions::default();
        Self {
            platform: options.platform,
            style: options.style,
            pace: options.pace,
            subtitle_density: options.subtitle_density,
            music_preference: options.music_preference,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl AppConfig {
    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            base_url: self.base_url.clone(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        let retry = RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            deadline: Duration::from_millis(self.retry.deadline_ms),
        };
        OrchestratorSettings {
            poll: PollSettings {
                interval: Duration::from_millis(self.poll.interval_ms.max(1)),
                query_deadline: retry.deadline,
                max_consecutive_failures: self.poll.max_consecutive_failures,
            },
            retry,
            download_deadline: Duration::from_secs(self.download_deadline_secs),
            health_deadline: Duration::from_millis(self.health_deadline_ms),
            output_dir: self.output_dir.clone(),
        }
    }

    pub fn create_options(&self) -> CreateOptions {
        CreateOptions {
            platform: self.defaults.platform.clone(),
            style: self.defaults.style.clone(),
            pace: self.defaults.pace.clone(),
            subtitle_density: self.defaults.subtitle_density.clone(),
            music_preference: self.defaults.music_preference.clone(),
        }
    }
}

/// Reads the config file. A missing `cutflow.ron` yields defaults silently;
/// any other read or parse failure yields defaults plus a warning for the
/// caller to log once logging is up.
pub fn load(path: Option<&Path>) -> (AppConfig, Option<String>) {
    let explicit = path.is_some();
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound && !explicit => {
            return (AppConfig::default(), None);
        }
        Err(err) => {
            return (
                AppConfig::default(),
                Some(format!("Failed to read config {:?}: {}", path, err)),
            );
        }
    };

    match ron::from_str(&content) {
        Ok(config) => (config, None),
        Err(err) => (
            AppConfig::default(),
            Some(format!("Failed to parse config {:?}: {}; using defaults", path, err)),
        ),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_follow_engine_settings() {
        let config = AppConfig::default();
        let settings = config.orchestrator_settings();
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.retry.initial_delay, Duration::from_millis(1000));
        assert_eq!(settings.retry.deadline, Duration::from_secs(30));
        assert_eq!(settings.poll.interval, Duration::from_millis(2000));
        assert_eq!(settings.poll.max_consecutive_failures, None);
        assert_eq!(settings.health_deadline, Duration::from_secs(5));
        assert_eq!(config.create_options(), CreateOptions::default());
    }

    #[test]
    fn missing_explicit_file_warns() {
        let dir = tempfile::tempdir().unwrap();
        let (config, warning) = load(Some(&dir.path().join("absent.ron")));
        assert_eq!(config, AppConfig::default());
        assert!(warning.is_some());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cutflow.ron");
        fs::write(
            &path,
            r#"(
                base_url: "http://editor.local:8000",
                poll: (interval_ms: 500, max_consecutive_failures: Some(5)),
                defaults: (platform: "kuaishou"),
            )"#,
        )
        .unwrap();

        let (config, warning) = load(Some(&path));
        assert_eq!(warning, None);
        assert_eq!(config.base_url, "http://editor.local:8000");
        assert_eq!(config.poll.interval_ms, 500);
        assert_eq!(config.poll.max_consecutive_failures, Some(5));
        assert_eq!(config.defaults.platform, "kuaishou");
        assert_eq!(config.defaults.style, "viral");
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn malformed_file_falls_back_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cutflow.ron");
        fs::write(&path, "(base_url: 42,").unwrap();

        let (config, warning) = load(Some(&path));
        assert_eq!(config, AppConfig::default());
        assert!(warning.unwrap().contains("Failed to parse config"));
    }

    #[test]
    fn round_trips_through_pretty_ron() {
        let config = AppConfig {
            log_destination: LogDestination::Both,
            ..AppConfig::default()
        };
        let text = ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new()).unwrap();
        let parsed: AppConfig = ron::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
