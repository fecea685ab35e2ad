//! Host configuration.
//!
//! [`HostConfig`] deserializes from application config (JSON) or is read
//! from environment variables:
//! - `STRUCTDB_DB_PATH`: SQLite database file path (unset: in-memory)
//! - `STRUCTDB_RAW_UTF8`: store values verbatim (default: "true")
//! - `STRUCTDB_VERBOSE`: emit bulk-path diagnostics (default: "false")
//! - `STRUCTDB_BUSY_TIMEOUT_MS`: SQLite busy timeout (default: "5000")

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::StoreError;

/// Diagnostic policy handed to each structure at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    #[default]
    Quiet,
    Verbose,
}

impl Verbosity {
    pub fn is_verbose(self) -> bool {
        self == Verbosity::Verbose
    }
}

impl From<bool> for Verbosity {
    fn from(verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Quiet
        }
    }
}

/// Connection settings for a [`Host`](crate::host::Host).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Database file. `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    /// Whether the backing store holds arbitrary value content verbatim.
    /// When false, values are hex encoded on write and decoded on read.
    pub raw_utf8: bool,
    pub verbose: bool,
    pub busy_timeout_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            path: None,
            raw_utf8: true,
            verbose: false,
            busy_timeout_ms: 5000,
        }
    }
}

impl HostConfig {
    /// Reads the `STRUCTDB_*` environment variables.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup, falling back to
    /// defaults for unset variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = HostConfig::default();
        let path = lookup("STRUCTDB_DB_PATH")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        let raw_utf8 = match lookup("STRUCTDB_RAW_UTF8") {
            Some(v) => parse_bool("STRUCTDB_RAW_UTF8", &v)?,
            None => defaults.raw_utf8,
        };
        let verbose = match lookup("STRUCTDB_VERBOSE") {
            Some(v) => parse_bool("STRUCTDB_VERBOSE", &v)?,
            None => defaults.verbose,
        };
        let busy_timeout_ms = match lookup("STRUCTDB_BUSY_TIMEOUT_MS") {
            Some(v) => v.trim().parse().map_err(|_| StoreError::Config {
                reason: format!("STRUCTDB_BUSY_TIMEOUT_MS is not a number: {v:?}"),
            })?,
            None => defaults.busy_timeout_ms,
        };
        Ok(HostConfig {
            path,
            raw_utf8,
            verbose,
            busy_timeout_ms,
        })
    }

    /// Parses a JSON config document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from(self.verbose)
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, StoreError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(StoreError::Config {
            reason: format!("{name} is not a boolean: {value:?}"),
        }),
    }
}
