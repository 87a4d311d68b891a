// Configuration for the unit source printer

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "unibox-fmt.json";

/// Formatter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Number of spaces for indentation
    #[serde(default = "default_indent_size")]
    pub indent_size: usize,

    /// Empty lines printed between top-level items
    #[serde(default = "default_blank_lines")]
    pub blank_lines_between_items: usize,
}

// Default values
fn default_indent_size() -> usize {
    4
}
fn default_blank_lines() -> usize {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            indent_size: default_indent_size(),
            blank_lines_between_items: default_blank_lines(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Search `dir` and its parents for unibox-fmt.json, defaults otherwise
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let mut current = Some(dir.as_ref());
        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Self::from_file(config_path);
            }
            current = dir.parent();
        }

        Ok(Self::default())
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
