use std::fs;
use std::path::{Path, PathBuf};

use flate2::Compression;
use serde::Deserialize;
use thiserror::Error;

use crate::build::FragmentPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] toml::de::Error),
    #[error("compression level {0} out of range 0-9")]
    Level(u32),
}

// Configuration
//
// ```toml
// output_dir = "extracted"
// compression_level = 9
// extension = "RPT"
// fragment_policy = { count = 4 }
// ```
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub output_dir: PathBuf,
    pub compression_level: u32,
    pub fragment_policy: FragmentPolicy,

    /// Container file extension picked up in folder mode, case insensitive
    pub extension: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            output_dir: PathBuf::from("."),
            compression_level: Compression::default().level(),
            fragment_policy: FragmentPolicy::default(),
            extension: "RPT".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        if config.compression_level > 9 {
            return Err(ConfigError::Level(config.compression_level));
        }
        Ok(config)
    }

    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            None => Ok(Config::default()),
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Config::from_toml(&text)
            }
        }
    }

    pub fn compression(&self) -> Compression {
        Compression::new(self.compression_level)
    }
}
