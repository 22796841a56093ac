use crate::model::{ClipWindow, ClipWindows};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_schema_version() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipConfig {
    pub full_start_offset_ms: u64,
    pub full_duration_ms: u64,
    pub preview_start_offset_ms: u64,
    pub preview_duration_ms: u64,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            full_start_offset_ms: 30_000,
            full_duration_ms: 30_000,
            preview_start_offset_ms: 0,
            preview_duration_ms: 15_000,
        }
    }
}

impl ClipConfig {
    pub fn windows(&self) -> ClipWindows {
        ClipWindows {
            full: ClipWindow {
                start_offset: Duration::from_millis(self.full_start_offset_ms),
                duration: Duration::from_millis(self.full_duration_ms),
            },
            preview: ClipWindow {
                start_offset: Duration::from_millis(self.preview_start_offset_ms),
                duration: Duration::from_millis(self.preview_duration_ms),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    pub tick_interval_ms: u64,
    pub settle_delay_ms: u64,
    pub config_watch_poll_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            settle_delay_ms: 300,
            config_watch_poll_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub api_base_url: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.spotify.com/v1".to_string(),
            device_id: None,
            access_token: None,
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub log_level: String,
    #[serde(default)]
    pub clips: ClipConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub interstitial: Option<String>,
    #[serde(default)]
    pub playlist: Option<PathBuf>,
    /// Length the simulated local output reports for every source it plays.
    pub preview_length_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            log_level: "info".to_string(),
            clips: ClipConfig::default(),
            timing: TimingConfig::default(),
            remote: RemoteConfig::default(),
            interstitial: None,
            playlist: None,
            preview_length_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AppConfig;
    use std::time::Duration;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
log_level = "debug"
preview_length_ms = 10000

[clips]
full_start_offset_ms = 45000
full_duration_ms = 20000
preview_start_offset_ms = 0
preview_duration_ms = 8000
"#,
        )
        .unwrap();

        assert_eq!(cfg.schema_version, 1);
        assert_eq!(cfg.timing.tick_interval_ms, 100);
        assert_eq!(cfg.timing.settle_delay_ms, 300);
        assert!(cfg.remote.access_token.is_none());

        let windows = cfg.clips.windows();
        assert_eq!(windows.full.start_offset, Duration::from_secs(45));
        assert_eq!(windows.preview.duration, Duration::from_secs(8));
    }

    #[test]
    fn default_preview_clip_is_shorter() {
        let windows = AppConfig::default().clips.windows();
        assert!(windows.preview.duration < windows.full.duration);
        assert_eq!(windows.preview.start_offset, Duration::ZERO);
    }

    #[test]
    fn defaults_survive_toml_round_trip() {
        let text = toml::to_string_pretty(&AppConfig::default()).unwrap();
        let back: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.log_level, "info");
        assert_eq!(back.remote.api_base_url, "https://api.spotify.com/v1");
    }
}
