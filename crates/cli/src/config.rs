#![forbid(unsafe_code)]

use boost_core::{CollectionKey, LayoutConfig, TransformError, TransformSet};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "boost.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("transform for {key} is invalid: {source}")]
    InvalidTransform {
        key: CollectionKey,
        #[source]
        source: TransformError,
    },
    #[error("viewport_width must be a positive number (got {0})")]
    InvalidViewport(f64),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub data_dir: PathBuf,
    pub viewport_width: f64,
    /// `EnvFilter` directives; `RUST_LOG` wins when set.
    pub log_filter: String,
    pub layout: LayoutConfig,
    pub transforms: TransformSet,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".boost"),
            viewport_width: 1280.0,
            log_filter: "warn".to_string(),
            layout: LayoutConfig::default(),
            transforms: TransformSet::default(),
        }
    }
}

impl Config {
    /// An explicit path must exist; otherwise `boost.toml` is used when present.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    return Ok(Self::default());
                }
                fallback
            }
        };
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::parse(&raw).map_err(|err| match err {
            ParseFailure::Toml(source) => ConfigError::Parse { path, source },
            ParseFailure::Invalid(err) => err,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Self::parse(raw).map_err(|err| match err {
            ParseFailure::Toml(source) => ConfigError::Parse {
                path: PathBuf::from("<inline>"),
                source,
            },
            ParseFailure::Invalid(err) => err,
        })
    }

    fn parse(raw: &str) -> Result<Self, ParseFailure> {
        let config: Self = toml::from_str(raw).map_err(ParseFailure::Toml)?;
        config.validate().map_err(ParseFailure::Invalid)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.viewport_width.is_finite() && self.viewport_width > 0.0) {
            return Err(ConfigError::InvalidViewport(self.viewport_width));
        }
        self.transforms
            .validate()
            .map_err(|(key, source)| ConfigError::InvalidTransform { key, source })
    }
}

enum ParseFailure {
    Toml(toml::de::Error),
    Invalid(ConfigError),
}
