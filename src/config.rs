//! Configuration management for chunkferry

use std::env;
use std::time::Duration;

use serde::Deserialize;

use crate::hash::HashAlgorithm;
use crate::transfer::{FaultInjection, SessionConfig, DEFAULT_TOTAL_CHUNKS};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub ledger: LedgerConfig,
    pub staging: StagingConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub base_url: String,
    pub csrf_token: String,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StagingConfig {
    pub database_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub total_chunks: u32,
    pub hash_algorithm: HashAlgorithm,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ledger: LedgerConfig {
                base_url: "http://localhost:8000".to_string(),
                csrf_token: String::new(),
                timeout_secs: None,
            },
            staging: StagingConfig {
                database_url: "sqlite:./chunkferry-staging.db".to_string(),
            },
            upload: UploadConfig {
                total_chunks: DEFAULT_TOTAL_CHUNKS,
                hash_algorithm: HashAlgorithm::Md5,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        Ok(Config {
            ledger: LedgerConfig {
                base_url: env::var("LEDGER_BASE_URL").unwrap_or(defaults.ledger.base_url),
                csrf_token: env::var("LEDGER_CSRF_TOKEN").unwrap_or_default(),
                timeout_secs: parse_var::<u64>("LEDGER_TIMEOUT_SECS")?,
            },
            staging: StagingConfig {
                database_url: env::var("STAGING_DATABASE_URL")
                    .unwrap_or(defaults.staging.database_url),
            },
            upload: UploadConfig {
                total_chunks: match parse_var::<u32>("UPLOAD_TOTAL_CHUNKS")? {
                    Some(0) => {
                        return Err(ConfigError::InvalidValue {
                            name: "UPLOAD_TOTAL_CHUNKS",
                            value: "0".to_string(),
                        })
                    }
                    Some(n) => n,
                    None => defaults.upload.total_chunks,
                },
                hash_algorithm: parse_var::<HashAlgorithm>("UPLOAD_HASH_ALGORITHM")?
                    .unwrap_or(defaults.upload.hash_algorithm),
            },
        })
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.ledger.timeout_secs.map(Duration::from_secs)
    }

    /// Session policy derived from the upload settings
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            total_chunks: self.upload.total_chunks,
            hash_algorithm: self.upload.hash_algorithm,
            fault_injection: FaultInjection::none(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(None),
    }
}
