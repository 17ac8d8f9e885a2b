use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::types::Mode;

pub const DEFAULT_CONFIG_FILE: &str = "pregen.toml";
pub const DEFAULT_CACHE_DIR: &str = ".pregen";
pub const DEFAULT_CACHE_EXPIRY_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_RELOAD_DEBOUNCE_MS: u64 = 500;
/// A pregeneration pass running longer than this gets an advisory warning.
pub const SLOW_GENERATION_WARN_SECS: u64 = 5;

/// Top-level config (pregen.toml + PREGEN_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PregenConfig {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    /// Bot token. Falls back to the `TOKEN` environment variable.
    pub token: Option<String>,
    /// Application (client) id, needed for command registration.
    /// Falls back to the `CLIENT_ID` environment variable.
    pub client_id: Option<u64>,
    /// When set, commands are registered to this guild instead of globally.
    pub guild_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory for persisted static responses.
    #[serde(default = "default_cache_dir")]
    pub dir: String,
    /// Default revalidation window in seconds. Per-handler `revalidate` wins.
    #[serde(default = "default_expiry_secs")]
    pub expiry_secs: u64,
    /// Serialize regeneration per handler so a cold cache runs the body once.
    #[serde(default = "bool_true")]
    pub serialize_regeneration: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            expiry_secs: default_expiry_secs(),
            serialize_regeneration: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Directory watched for source changes in development mode.
    #[serde(default = "default_watch_root")]
    pub root: String,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: default_watch_root(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_cache_dir() -> String {
    DEFAULT_CACHE_DIR.to_string()
}
fn default_expiry_secs() -> u64 {
    DEFAULT_CACHE_EXPIRY_SECS
}
fn default_watch_root() -> String {
    ".".to_string()
}
fn default_debounce_ms() -> u64 {
    DEFAULT_RELOAD_DEBOUNCE_MS
}

impl PregenConfig {
    /// Load config from a TOML file with PREGEN_* env var overrides.
    ///
    /// Nested keys use a double underscore: `PREGEN_CACHE__EXPIRY_SECS=60`.
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path.unwrap_or(DEFAULT_CONFIG_FILE);

        let mut config: PregenConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("PREGEN_").split("__"))
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        if config.bot.token.is_none() {
            config.bot.token = std::env::var("TOKEN").ok().filter(|t| !t.is_empty());
        }
        if config.bot.client_id.is_none() {
            config.bot.client_id = std::env::var("CLIENT_ID")
                .ok()
                .and_then(|id| id.trim().parse().ok());
        }

        Ok(config)
    }

    pub fn require_token(&self) -> Result<&str> {
        self.bot
            .token
            .as_deref()
            .ok_or(CoreError::MissingCredential {
                name: "bot.token",
                env: "TOKEN",
            })
    }

    pub fn require_client_id(&self) -> Result<u64> {
        self.bot.client_id.ok_or(CoreError::MissingCredential {
            name: "bot.client_id",
            env: "CLIENT_ID",
        })
    }
}

/// Resolve the process mode from `PREGEN_ENV`, defaulting to [`Mode::Build`].
pub fn mode_from_env() -> Result<Mode> {
    match std::env::var("PREGEN_ENV") {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(CoreError::Config),
        _ => Ok(Mode::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_file() {
        let config = PregenConfig::default();
        assert_eq!(config.cache.dir, ".pregen");
        assert_eq!(config.cache.expiry_secs, 86_400);
        assert!(config.cache.serialize_regeneration);
        assert_eq!(config.watch.debounce_ms, 500);
    }

    #[test]
    fn loads_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[bot]\ntoken = \"abc\"\nclient_id = 42\n\n[cache]\nexpiry_secs = 60\n"
        )
        .unwrap();

        let config = PregenConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.require_token().unwrap(), "abc");
        assert_eq!(config.require_client_id().unwrap(), 42);
        assert_eq!(config.cache.expiry_secs, 60);
        assert_eq!(config.cache.dir, ".pregen");
    }

    #[test]
    fn missing_client_id_is_reported() {
        let config = PregenConfig::default();
        let err = config.require_client_id().unwrap_err();
        assert_eq!(err.code(), "MISSING_CREDENTIAL");
    }
}
