//! Persistent application configuration model and defaults.

use std::path::PathBuf;

use crate::catalog::{CatalogOrder, Period};

/// Root configuration persisted to `shufflefm.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    /// Scrobble-source credentials and account.
    #[serde(default)]
    pub lastfm: LastfmConfig,
    /// Video-search credentials.
    #[serde(default)]
    pub youtube: YoutubeConfig,
    /// Session defaults applied when the start command gives no overrides.
    #[serde(default)]
    pub session: SessionConfig,
    /// Resolution-cache locations.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Last.fm API credentials. All values are opaque strings obtained from the
/// API account page; the session key comes from the auth flow.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LastfmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub shared_secret: String,
    #[serde(default)]
    pub session_key: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct YoutubeConfig {
    #[serde(default)]
    pub api_key: String,
}

/// Play-count band, period, and ordering used when starting a session.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_min_plays")]
    pub min_plays: u32,
    #[serde(default = "default_max_plays")]
    pub max_plays: u32,
    #[serde(default)]
    pub period: Period,
    #[serde(default)]
    pub order: CatalogOrder,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_plays: default_min_plays(),
            max_plays: default_max_plays(),
            period: Period::default(),
            order: CatalogOrder::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CacheConfig {
    /// Optional read-only snapshot merged beneath the local layer.
    #[serde(default)]
    pub bundled_snapshot: Option<PathBuf>,
}

fn default_min_plays() -> u32 {
    1
}

fn default_max_plays() -> u32 {
    100_000
}

/// Clamps the play-count band so the floor never exceeds the ceiling.
pub fn sanitize_config(mut config: Config) -> Config {
    if config.session.max_plays < config.session.min_plays {
        config.session.max_plays = config.session.min_plays;
    }
    config
}

/// Names of credentials that are required but missing. The session must not
/// start while this is non-empty.
pub fn missing_credentials(config: &Config) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if config.lastfm.api_key.trim().is_empty() {
        missing.push("lastfm.api_key");
    }
    if config.lastfm.shared_secret.trim().is_empty() {
        missing.push("lastfm.shared_secret");
    }
    if config.lastfm.session_key.trim().is_empty() {
        missing.push("lastfm.session_key");
    }
    if config.youtube.api_key.trim().is_empty() {
        missing.push("youtube.api_key");
    }
    missing
}
