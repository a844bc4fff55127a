use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the TOML config file.
pub const CONFIG_ENV: &str = "PRICELENS_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub ocr: OcrSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    /// Upper bound for one uploaded image.
    pub max_upload_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8787)),
            max_upload_bytes: 8 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct OcrSettings {
    /// Operating language passed to the recognition engine at init.
    pub language: String,
    /// Characters the engine is allowed to emit.
    pub whitelist: String,
    pub tessdata_path: Option<PathBuf>,
    /// Preprocessed images are downsized to at most this width.
    pub max_image_width: u32,
    pub shutdown_timeout_secs: u64,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            whitelist: "0123456789.,".to_string(),
            tessdata_path: None,
            max_image_width: 1600,
            shutdown_timeout_secs: 30,
        }
    }
}

impl OcrSettings {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read the file at `path`, or fall back to defaults when no path is given.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&raw)
            }
            None => Ok(Self::default()),
        }
    }

    /// Load from `$PRICELENS_CONFIG` (if set) and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = Self::load_from(path.as_deref())?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// `PRICELENS_BIND` wins over `PORT`; `PRICELENS_OCR_LANG` sets the language.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("PRICELENS_BIND") {
            self.server.bind = bind.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "PRICELENS_BIND",
                value: bind.clone(),
            })?;
        } else if let Some(port) = lookup("PORT") {
            let port: u16 = port.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "PORT",
                value: port.clone(),
            })?;
            self.server.bind.set_port(port);
        }
        if let Some(lang) = lookup("PRICELENS_OCR_LANG") {
            self.ocr.language = lang;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_upload_and_whitelist_limits() {
        let c = AppConfig::default();
        assert_eq!(c.server.max_upload_bytes, 8 * 1024 * 1024);
        assert_eq!(c.ocr.whitelist, "0123456789.,");
        assert_eq!(c.ocr.max_image_width, 1600);
        assert_eq!(c.ocr.shutdown_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let c = AppConfig::from_toml_str("[ocr]\nlanguage = \"bul\"\n").unwrap();
        assert_eq!(c.ocr.language, "bul");
        assert_eq!(c.ocr.whitelist, "0123456789.,");
        assert_eq!(c.server, ServerSettings::default());
    }

    #[test]
    fn full_toml_parses() {
        let raw = r#"
            [server]
            bind = "127.0.0.1:9000"
            max_upload_bytes = 1024

            [ocr]
            tessdata_path = "/opt/tessdata"
            max_image_width = 800
            shutdown_timeout_secs = 5
        "#;
        let c = AppConfig::from_toml_str(raw).unwrap();
        assert_eq!(c.server.bind, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(c.server.max_upload_bytes, 1024);
        assert_eq!(c.ocr.tessdata_path, Some(PathBuf::from("/opt/tessdata")));
        assert_eq!(c.ocr.max_image_width, 800);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(matches!(
            AppConfig::from_toml_str("[server]\nbind = 42"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pricelens.toml");
        std::fs::write(&path, "[server]\nmax_upload_bytes = 2048\n").unwrap();
        let c = AppConfig::load_from(Some(&path)).unwrap();
        assert_eq!(c.server.max_upload_bytes, 2048);
    }

    #[test]
    fn load_from_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(matches!(AppConfig::load_from(Some(&path)), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> =
            [("PORT", "3000"), ("PRICELENS_OCR_LANG", "bul")].into_iter().collect();
        let mut c = AppConfig::default();
        c.apply_overrides(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(c.server.bind.port(), 3000);
        assert_eq!(c.ocr.language, "bul");
    }

    #[test]
    fn bind_override_beats_port() {
        let env: HashMap<&str, &str> =
            [("PORT", "3000"), ("PRICELENS_BIND", "127.0.0.1:4000")].into_iter().collect();
        let mut c = AppConfig::default();
        c.apply_overrides(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(c.server.bind, "127.0.0.1:4000".parse().unwrap());
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut c = AppConfig::default();
        let err = c
            .apply_overrides(|k| (k == "PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: "PORT", .. }));
    }
}
