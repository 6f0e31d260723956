// ABOUTME: Parses dumpfs configuration files for limits and read options
// ABOUTME: Merges TOML settings with command-line overrides

use crate::limits::Limits;
use crate::tree::{ReadOptions, MAX_EXTENDED_INSERT};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DumpfsConfig {
    #[serde(default)]
    pub limits: Vec<String>,
    #[serde(default)]
    pub read: ReadConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadConfig {
    #[serde(default)]
    pub add_drop_database: bool,
    #[serde(default)]
    pub skip_extended_insert: bool,
    pub max_extended_insert: Option<usize>,
}

/// Command-line settings that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct ReadOverrides {
    pub add_drop_database: bool,
    pub skip_extended_insert: bool,
    pub max_extended_insert: Option<usize>,
}

pub fn load_config_from_file(path: &Path) -> Result<DumpfsConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    toml::from_str(&raw)
        .with_context(|| format!("Failed to parse TOML config at {}", path.display()))
}

/// Loads the config file if one was given, otherwise an empty config
pub fn load_optional(path: Option<&Path>) -> Result<DumpfsConfig> {
    match path {
        Some(path) => load_config_from_file(path),
        None => Ok(DumpfsConfig::default()),
    }
}

impl DumpfsConfig {
    /// Builds limits from config tokens followed by command-line tokens
    ///
    /// Command-line tokens come last so they win when both name the same key.
    pub fn limits(&self, cli_limits: &[String]) -> Result<Limits> {
        let tokens: Vec<&str> = self
            .limits
            .iter()
            .chain(cli_limits.iter())
            .map(String::as_str)
            .collect();
        Limits::new(&tokens)
    }

    /// Read options from the config file with command-line flags applied on top
    pub fn read_options(&self, overrides: &ReadOverrides) -> Result<ReadOptions> {
        let max_extended_insert = overrides
            .max_extended_insert
            .or(self.read.max_extended_insert)
            .unwrap_or(MAX_EXTENDED_INSERT);

        if max_extended_insert == 0 {
            bail!("max_extended_insert must be greater than zero");
        }

        Ok(ReadOptions {
            add_drop_database: overrides.add_drop_database || self.read.add_drop_database,
            skip_extended_insert: overrides.skip_extended_insert
                || self.read.skip_extended_insert,
            max_extended_insert,
        })
    }
}
