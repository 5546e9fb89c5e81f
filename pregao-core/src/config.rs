//! Pipeline configuration.
//!
//! One `PipelineConfig` is loaded at startup and handed to every stage. It can
//! come from the environment (optionally seeded by a `.env` file) or from a
//! TOML file; every field has a default matching the production layout.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str =
    "https://sistemaswebb3-listados.b3.com.br/indexProxy/indexCall/GetPortfolioDay/";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
pub const DEFAULT_RAW_DIR: &str = "dados_brutos";
pub const DEFAULT_PROCESSED_DIR: &str = "dados_brutos_processados";
pub const DEFAULT_DATASET_URI: &str = "s3://bucket-bovespa-363362475222/raw/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: {value:?}")]
    InvalidVar { var: &'static str, value: String },
}

/// Everything the three stages need to know about the outside world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Where the fetcher drops `pregao_<date>.csv` files.
    pub raw_dir: PathBuf,

    /// Where the loader archives files it has written to the dataset.
    pub processed_dir: PathBuf,

    /// Root of the partitioned dataset: `s3://bucket/prefix/`, `file:///dir`
    /// or a plain local directory.
    pub dataset_uri: String,

    pub http: HttpConfig,

    pub request: RequestConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from(DEFAULT_RAW_DIR),
            processed_dir: PathBuf::from(DEFAULT_PROCESSED_DIR),
            dataset_uri: DEFAULT_DATASET_URI.to_string(),
            http: HttpConfig::default(),
            request: RequestConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
        }
    }
}

/// Fixed fields of the portfolio request descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub index: String,
    pub language: String,
    pub page_size: u32,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            index: "IBOV".to_string(),
            language: "pt-br".to_string(),
            page_size: 120,
        }
    }
}

impl PipelineConfig {
    /// Load a config from a TOML file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Build the config from `PREGAO_*` environment variables, reading `.env`
    /// first if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup. Unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("PREGAO_RAW_DIR") {
            config.raw_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("PREGAO_PROCESSED_DIR") {
            config.processed_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("PREGAO_DATASET_URI") {
            config.dataset_uri = v;
        }
        if let Some(v) = lookup("PREGAO_BASE_URL") {
            config.http.base_url = v;
        }
        if let Some(v) = lookup("PREGAO_USER_AGENT") {
            config.http.user_agent = v;
        }
        if let Some(v) = lookup("PREGAO_HTTP_TIMEOUT_SECS") {
            config.http.timeout_secs = parse_var("PREGAO_HTTP_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("PREGAO_INDEX") {
            config.request.index = v;
        }
        if let Some(v) = lookup("PREGAO_LANGUAGE") {
            config.request.language = v;
        }
        if let Some(v) = lookup("PREGAO_PAGE_SIZE") {
            config.request.page_size = parse_var("PREGAO_PAGE_SIZE", v)?;
        }

        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidVar { var, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_production_layout() {
        let config = PipelineConfig::default();
        assert_eq!(config.raw_dir, PathBuf::from("dados_brutos"));
        assert_eq!(config.processed_dir, PathBuf::from("dados_brutos_processados"));
        assert_eq!(config.dataset_uri, "s3://bucket-bovespa-363362475222/raw/");
        assert_eq!(config.http.timeout(), Duration::from_secs(30));
        assert_eq!(config.request.index, "IBOV");
        assert_eq!(config.request.page_size, 120);
    }

    #[test]
    fn env_overrides_defaults() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("PREGAO_RAW_DIR", "/tmp/raw"),
            ("PREGAO_DATASET_URI", "/tmp/lake"),
            ("PREGAO_HTTP_TIMEOUT_SECS", "5"),
            ("PREGAO_INDEX", "IBXX"),
        ]))
        .unwrap();

        assert_eq!(config.raw_dir, PathBuf::from("/tmp/raw"));
        assert_eq!(config.dataset_uri, "/tmp/lake");
        assert_eq!(config.http.timeout_secs, 5);
        assert_eq!(config.request.index, "IBXX");
        assert_eq!(config.processed_dir, PathBuf::from(DEFAULT_PROCESSED_DIR));
    }

    #[test]
    fn invalid_number_is_an_error() {
        let err = PipelineConfig::from_lookup(lookup_from(&[("PREGAO_PAGE_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidVar {
                var: "PREGAO_PAGE_SIZE",
                ..
            }
        ));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
raw_dir = "in"
dataset_uri = "s3://other-bucket/raw/"

[http]
timeout_secs = 10
"#,
        )
        .unwrap();

        assert_eq!(config.raw_dir, PathBuf::from("in"));
        assert_eq!(config.dataset_uri, "s3://other-bucket/raw/");
        assert_eq!(config.http.timeout_secs, 10);
        assert_eq!(config.http.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.request, RequestConfig::default());
    }
}
