//! Engine and command-line configuration.
//!
//! [`Options`] tunes the storage engine. [`Config`] adds the database path and
//! is loaded from environment variables by the `slotdb` binary.
//!
//! # Environment Variables
//!
//! - `SLOTDB_PATH`: database file (default: `./slotdb.db`)
//! - `SLOTDB_MIN_FILL_PERCENT`: fraction of a page below which a node is
//!   rebalanced (default: `0.5`)
//! - `SLOTDB_MAX_FILL_PERCENT`: fraction of a page above which a node splits
//!   (default: `0.95`)
//! - `SLOTDB_PAGE_SIZE`: page size in bytes (default: the platform memory page
//!   size). Must match the size the file was created with.

use std::path::PathBuf;

use crate::storage::{MAX_PAGE_SIZE, MIN_PAGE_SIZE, default_page_size};

/// Storage engine tuning.
///
/// # Invariants
///
/// After [`Options::validate`] succeeds:
/// - `0 < min_fill_percent < max_fill_percent < 1`
/// - `page_size` is within `MIN_PAGE_SIZE..=MAX_PAGE_SIZE`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Options {
    pub min_fill_percent: f32,
    pub max_fill_percent: f32,
    pub page_size: usize,
}

impl Options {
    pub const DEFAULT_MIN_FILL_PERCENT: f32 = 0.5;
    pub const DEFAULT_MAX_FILL_PERCENT: f32 = 0.95;

    /// Check the invariants listed on the type.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("min_fill_percent", self.min_fill_percent),
            ("max_fill_percent", self.max_fill_percent),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(ConfigError::InvalidOptions(format!(
                    "{name} must be between 0 and 1 exclusive, got {value}"
                )));
            }
        }

        if self.min_fill_percent >= self.max_fill_percent {
            return Err(ConfigError::InvalidOptions(format!(
                "min_fill_percent ({}) must be below max_fill_percent ({})",
                self.min_fill_percent, self.max_fill_percent
            )));
        }

        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(ConfigError::InvalidOptions(format!(
                "page_size must be between {MIN_PAGE_SIZE} and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }

        Ok(())
    }

    /// Load options from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let options = Self {
            min_fill_percent: parse_var(
                "SLOTDB_MIN_FILL_PERCENT",
                std::env::var("SLOTDB_MIN_FILL_PERCENT").ok(),
                Self::DEFAULT_MIN_FILL_PERCENT,
            )?,
            max_fill_percent: parse_var(
                "SLOTDB_MAX_FILL_PERCENT",
                std::env::var("SLOTDB_MAX_FILL_PERCENT").ok(),
                Self::DEFAULT_MAX_FILL_PERCENT,
            )?,
            page_size: parse_var(
                "SLOTDB_PAGE_SIZE",
                std::env::var("SLOTDB_PAGE_SIZE").ok(),
                default_page_size(),
            )?,
        };
        options.validate()?;
        Ok(options)
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            min_fill_percent: Self::DEFAULT_MIN_FILL_PERCENT,
            max_fill_percent: Self::DEFAULT_MAX_FILL_PERCENT,
            page_size: default_page_size(),
        }
    }
}

/// Configuration for the `slotdb` binary.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database file. Created on first use.
    pub path: PathBuf,
    pub options: Options,
}

impl Config {
    pub const DEFAULT_PATH: &'static str = "./slotdb.db";

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but does not parse, or if the
    /// resulting options fail validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("SLOTDB_PATH")
            .map_or_else(|_| PathBuf::from(Self::DEFAULT_PATH), PathBuf::from);
        let options = Options::from_env()?;
        Ok(Self { path, options })
    }
}

/// Error returned when loading or validating configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
    /// Options are individually well-formed but not usable together.
    InvalidOptions(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
            Self::InvalidOptions(message) => write!(f, "invalid options: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse an optional raw value, using `default` when it is absent.
fn parse_var<T: std::str::FromStr>(
    name: &str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("'{value}' does not parse"),
        }),
        None => Ok(default),
    }
}
