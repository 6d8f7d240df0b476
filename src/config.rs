//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$POSTBOX_CONFIG` (environment variable)
//! 2. `~/.config/postbox/config.toml` (Linux/macOS)
//!    `%APPDATA%\postbox\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::parser::mime::{MimeDecoder, DEFAULT_MAX_DEPTH};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// MIME decoding limits.
    pub parser: ParserConfig,
    /// Representation selection.
    pub render: RenderConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// MIME decoding limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Deepest multipart nesting that is still split into child parts.
    pub max_depth: usize,
    /// Maximum accepted message size in bytes (default: 64 MB).
    pub max_message_size: u64,
}

/// Representation selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Accept value assumed when a request carries none.
    pub default_accept: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_message_size: 64 * 1024 * 1024, // 64 MB
        }
    }
}

impl RenderConfig {
    /// The Accept value to negotiate with: the request's own, else the
    /// configured default. `None` accepts everything.
    pub fn accept<'a>(&'a self, requested: Option<&'a str>) -> Option<&'a str> {
        requested.or(self.default_accept.as_deref())
    }
}

impl ParserConfig {
    /// Build a decoder honoring these limits.
    pub fn decoder(&self) -> MimeDecoder {
        MimeDecoder::new(self.max_depth)
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("POSTBOX_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("postbox").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("postbox")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.parser.max_depth, 20);
        assert_eq!(cfg.parser.max_message_size, 64 * 1024 * 1024);
        assert!(cfg.render.default_accept.is_none());
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let mut cfg = Config::default();
        cfg.render.default_accept = Some("text/plain".to_string());
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.general.log_level, cfg.general.log_level);
        assert_eq!(parsed.parser.max_depth, cfg.parser.max_depth);
        assert_eq!(parsed.render.default_accept.as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[parser]
max_depth = 4
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.parser.max_depth, 4);
        // Other fields use defaults
        assert_eq!(cfg.parser.max_message_size, 64 * 1024 * 1024);
        assert_eq!(cfg.general.log_level, "warn");
    }

    #[test]
    fn test_default_accept_fills_missing_header() {
        let cfg: Config = toml::from_str(
            r#"
[render]
default_accept = "text/plain"
"#,
        )
        .expect("parse render section");
        assert_eq!(cfg.render.accept(None), Some("text/plain"));
        assert_eq!(cfg.render.accept(Some("text/html")), Some("text/html"));
        assert_eq!(Config::default().render.accept(None), None);
    }

    #[test]
    fn test_cache_dir_override() {
        let mut cfg = Config::default();
        cfg.general.cache_dir = Some(PathBuf::from("/tmp/postbox-test"));
        assert_eq!(cache_dir(&cfg), PathBuf::from("/tmp/postbox-test"));
    }
}
