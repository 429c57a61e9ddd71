use std::{fs, path::Path};

use serde::Deserialize;
use shared::domain::FallbackIdentity;
use url::Url;

use crate::{
    error::SyncError, grouping::DEFAULT_GROUPING_WINDOW_MS,
    scroll::DEFAULT_NEAR_BOTTOM_THRESHOLD_PX,
};

pub const DEFAULT_CONFIG_PATH: &str = "room_sync.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub api_base_url: String,
    pub storage_base_url: String,
    pub default_avatar: String,
    pub near_bottom_threshold_px: f64,
    pub grouping_window_ms: i64,
    pub fallback_name: String,
    pub fallback_rank: String,
    pub auth_token: Option<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.infinity00.world".into(),
            storage_base_url: "https://storage.googleapis.com/yj_study/".into(),
            default_avatar: "/defaultprofile.png".into(),
            near_bottom_threshold_px: DEFAULT_NEAR_BOTTOM_THRESHOLD_PX,
            grouping_window_ms: DEFAULT_GROUPING_WINDOW_MS,
            fallback_name: "Participant".into(),
            fallback_rank: String::new(),
            auth_token: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_base_url: Option<String>,
    storage_base_url: Option<String>,
    default_avatar: Option<String>,
    near_bottom_threshold_px: Option<f64>,
    grouping_window_ms: Option<i64>,
    fallback_name: Option<String>,
    fallback_rank: Option<String>,
    auth_token: Option<String>,
}

impl SyncSettings {
    pub fn fallback_identity(&self) -> FallbackIdentity {
        FallbackIdentity {
            name: self.fallback_name.clone(),
            rank: self.fallback_rank.clone(),
            avatar_url: self.default_avatar.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        Url::parse(&self.api_base_url).map_err(|err| {
            SyncError::InvalidConfig(format!("api_base_url '{}': {err}", self.api_base_url))
        })?;
        if !self.near_bottom_threshold_px.is_finite() || self.near_bottom_threshold_px < 0.0 {
            return Err(SyncError::InvalidConfig(format!(
                "near_bottom_threshold_px must be a non-negative number, got {}",
                self.near_bottom_threshold_px
            )));
        }
        if self.grouping_window_ms < 0 {
            return Err(SyncError::InvalidConfig(format!(
                "grouping_window_ms must not be negative, got {}",
                self.grouping_window_ms
            )));
        }
        Ok(())
    }

    fn apply_file(&mut self, file_cfg: FileSettings) {
        if let Some(v) = file_cfg.api_base_url {
            self.api_base_url = v;
        }
        if let Some(v) = file_cfg.storage_base_url {
            self.storage_base_url = v;
        }
        if let Some(v) = file_cfg.default_avatar {
            self.default_avatar = v;
        }
        if let Some(v) = file_cfg.near_bottom_threshold_px {
            self.near_bottom_threshold_px = v;
        }
        if let Some(v) = file_cfg.grouping_window_ms {
            self.grouping_window_ms = v;
        }
        if let Some(v) = file_cfg.fallback_name {
            self.fallback_name = v;
        }
        if let Some(v) = file_cfg.fallback_rank {
            self.fallback_rank = v;
        }
        if let Some(v) = file_cfg.auth_token {
            self.auth_token = Some(v);
        }
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("APP__API_BASE_URL") {
            self.api_base_url = v;
        }
        if let Some(v) = var("APP__STORAGE_BASE_URL") {
            self.storage_base_url = v;
        }
        if let Some(v) = var("APP__DEFAULT_AVATAR") {
            self.default_avatar = v;
        }
        if let Some(v) = var("APP__NEAR_BOTTOM_THRESHOLD_PX") {
            if let Ok(parsed) = v.parse::<f64>() {
                self.near_bottom_threshold_px = parsed;
            }
        }
        if let Some(v) = var("APP__GROUPING_WINDOW_MS") {
            if let Ok(parsed) = v.parse::<i64>() {
                self.grouping_window_ms = parsed;
            }
        }
        if let Some(v) = var("APP__FALLBACK_NAME") {
            self.fallback_name = v;
        }
        if let Some(v) = var("APP__FALLBACK_RANK") {
            self.fallback_rank = v;
        }
        if let Some(v) = var("APP__AUTH_TOKEN") {
            self.auth_token = Some(v);
        }
    }
}

/// Defaults, then `room_sync.toml` (or `$ROOM_SYNC_CONFIG`), then `APP__*` env.
pub fn load_settings() -> SyncSettings {
    let path = std::env::var("ROOM_SYNC_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    load_settings_from(Path::new(&path), |name| std::env::var(name).ok())
}

pub fn load_settings_from(path: &Path, var: impl Fn(&str) -> Option<String>) -> SyncSettings {
    let mut settings = SyncSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => settings.apply_file(file_cfg),
            Err(err) => tracing::warn!(
                path = %path.display(),
                "config: ignoring unreadable settings file: {err}"
            ),
        }
    }

    settings.apply_env(var);
    settings
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn temp_config(contents: &str) -> std::path::PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("room_sync_config_test_{suffix}.toml"));
        fs::write(&path, contents).expect("write config");
        path
    }

    #[test]
    fn missing_file_and_env_yield_defaults() {
        let settings = load_settings_from(Path::new("/nonexistent/room_sync.toml"), |_| None);
        assert_eq!(settings, SyncSettings::default());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn env_overrides_file_values() {
        let path = temp_config(
            "api_base_url = \"http://file.local\"\nnear_bottom_threshold_px = 16.0\nfallback_name = \"Colleague\"\n",
        );
        let env: HashMap<&str, &str> = HashMap::from([
            ("APP__API_BASE_URL", "http://env.local"),
            ("APP__GROUPING_WINDOW_MS", "30000"),
        ]);

        let settings = load_settings_from(&path, |name| env.get(name).map(|v| v.to_string()));

        assert_eq!(settings.api_base_url, "http://env.local");
        assert_eq!(settings.near_bottom_threshold_px, 16.0);
        assert_eq!(settings.grouping_window_ms, 30_000);
        assert_eq!(settings.fallback_identity().label(), "Colleague");
        fs::remove_file(path).expect("cleanup");
    }

    #[test]
    fn unparsable_numeric_env_keeps_default() {
        let settings = load_settings_from(Path::new("/nonexistent"), |name| {
            (name == "APP__NEAR_BOTTOM_THRESHOLD_PX").then(|| "close".to_string())
        });
        assert_eq!(
            settings.near_bottom_threshold_px,
            DEFAULT_NEAR_BOTTOM_THRESHOLD_PX
        );
    }

    #[test]
    fn validate_rejects_bad_url_and_threshold() {
        let mut settings = SyncSettings {
            api_base_url: "not a url".into(),
            ..SyncSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SyncError::InvalidConfig(_))
        ));

        settings.api_base_url = "http://ok.local".into();
        settings.near_bottom_threshold_px = -1.0;
        assert!(settings.validate().is_err());
    }
}
