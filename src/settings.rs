//! Page settings and store credentials
//!
//! Every section falls back to its defaults, so a partial JSON document only
//! overrides what it names.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::autofire::AutofireConfig;
use crate::bullets::BulletConfig;
use crate::consts::*;
use crate::counter::{CounterConfig, RetryPolicy};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid settings: {0}")]
    Json(#[from] serde_json::Error),
}

/// Sound preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Master volume (0.0 - 1.0)
    pub master_volume: f32,
    /// Voices playing at once before the oldest is cut
    pub max_voices: usize,
    pub muted: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            master_volume: 0.8,
            max_voices: MAX_CONCURRENT_SOUNDS,
            muted: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub autofire: AutofireConfig,
    pub bullets: BulletConfig,
    pub counter: CounterConfig,
    pub retry: RetryPolicy,
    pub audio: AudioSettings,
}

impl Settings {
    /// Overlay a (possibly partial) JSON document on the defaults
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Remote store URL and token
///
/// The web build bakes both into the wasm bundle at compile time, so anyone
/// loading the page can read the token. Only ship a restricted token whose ACL
/// allows `EXISTS`, `GET`, `SET`, `INCR`, `INCRBY` and `PING` on the counter key
/// and nothing else. Never a full read/write token for the database.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteCredentials {
    pub url: String,
    pub token: String,
}

impl std::fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl RemoteCredentials {
    pub const URL_VAR: &'static str = "KV_REST_API_URL";
    pub const TOKEN_VAR: &'static str = "KV_REST_API_TOKEN";

    /// Build from a raw pair. `None` if either half is missing or blank.
    pub fn new(url: Option<&str>, token: Option<&str>) -> Option<Self> {
        let url = url.map(str::trim).filter(|s| !s.is_empty())?;
        let token = token.map(str::trim).filter(|s| !s.is_empty())?;
        Some(Self {
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Credentials from the process environment
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> Option<Self> {
        let url = std::env::var(Self::URL_VAR).ok();
        let token = std::env::var(Self::TOKEN_VAR).ok();
        Self::new(url.as_deref(), token.as_deref())
    }

    /// Credentials baked in at build time. The token ends up in the public bundle.
    #[cfg(target_arch = "wasm32")]
    pub fn from_env() -> Option<Self> {
        Self::new(option_env!("KV_REST_API_URL"), option_env!("KV_REST_API_TOKEN"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_overrides_only_named_fields() {
        let settings = Settings::from_json(
            r#"{"counter": {"display_floor": 1000}, "autofire": {"final_interval_ms": 40}}"#,
        )
        .unwrap();
        assert_eq!(settings.counter.display_floor, 1000);
        assert_eq!(settings.counter.offline_floor, 170_000);
        assert_eq!(settings.counter.key, "lol_guy_counter");
        assert_eq!(settings.autofire.final_interval_ms, 40);
        assert_eq!(settings.autofire.initial_interval_ms, 100);
        assert_eq!(settings.audio, AudioSettings::default());
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(Settings::from_json("{}").unwrap(), Settings::default());
    }

    #[test]
    fn test_json_round_trip() {
        let mut settings = Settings::default();
        settings.bullets.max_live = 12;
        let json = settings.to_json().unwrap();
        assert_eq!(Settings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn test_bad_json_is_an_error() {
        assert!(matches!(
            Settings::from_json(r#"{"counter": {"display_floor": "lots"}}"#),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn test_credentials_require_both_halves() {
        assert!(RemoteCredentials::new(None, Some("t")).is_none());
        assert!(RemoteCredentials::new(Some("https://x"), None).is_none());
        assert!(RemoteCredentials::new(Some("  "), Some("t")).is_none());

        let creds = RemoteCredentials::new(Some("https://db.upstash.io/"), Some(" t0k ")).unwrap();
        assert_eq!(creds.url, "https://db.upstash.io");
        assert_eq!(creds.token, "t0k");
        assert!(!format!("{creds:?}").contains("t0k"));
    }
}
