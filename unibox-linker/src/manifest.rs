// Manifest parser - unibox.json

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use unibox_formatter::Config;

pub const MANIFEST_FILE: &str = "unibox.json";

/// Multiplexer name used when the manifest does not give one
pub const DEFAULT_PROGRAM_NAME: &str = "unibox";

/// Merge manifest (unibox.json)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeManifest {
    /// Name the merged program answers to as a multiplexer
    #[serde(default = "default_name")]
    pub name: String,

    pub units: Vec<UnitSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Dependency index file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<PathBuf>,

    /// Loader worker bound (default: available parallelism)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,

    #[serde(default)]
    pub formatter: Config,
}

/// A unit location: a bare path (named after its directory) or a named path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnitSpec {
    Path(PathBuf),
    Named { name: String, path: PathBuf },
}

impl UnitSpec {
    pub fn path(&self) -> &Path {
        match self {
            UnitSpec::Path(path) | UnitSpec::Named { path, .. } => path,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            UnitSpec::Path(_) => None,
            UnitSpec::Named { name, .. } => Some(name),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ManifestError {
    #[error("manifest lists no units")]
    NoUnits,
    #[error("jobs must be at least 1")]
    InvalidJobs,
    #[error("program name `{0}` is not a valid command name")]
    InvalidName(String),
}

fn default_name() -> String {
    DEFAULT_PROGRAM_NAME.to_string()
}

impl MergeManifest {
    /// Parse unibox.json from file; relative paths are taken from the
    /// manifest's directory
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let mut manifest = Self::from_str(&content)
            .with_context(|| format!("Invalid manifest {}", path.display()))?;
        if let Some(base) = path.parent() {
            manifest.rebase(base);
        }
        Ok(manifest)
    }

    /// Parse unibox.json from string
    pub fn from_str(content: &str) -> Result<Self> {
        let manifest: MergeManifest =
            serde_json::from_str(content).context("Failed to parse unibox.json")?;

        manifest.validate()?;
        Ok(manifest)
    }

    /// Write manifest to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize manifest")?;

        fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.as_ref().display()))?;

        Ok(())
    }

    fn validate(&self) -> Result<(), ManifestError> {
        if self.units.is_empty() {
            return Err(ManifestError::NoUnits);
        }
        if self.jobs == Some(0) {
            return Err(ManifestError::InvalidJobs);
        }
        let valid_name = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        if !valid_name {
            return Err(ManifestError::InvalidName(self.name.clone()));
        }
        Ok(())
    }

    fn rebase(&mut self, base: &Path) {
        let join = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        for unit in &mut self.units {
            match unit {
                UnitSpec::Path(path) | UnitSpec::Named { path, .. } => join(path),
            }
        }
        if let Some(output) = &mut self.output {
            join(output);
        }
        if let Some(dependencies) = &mut self.dependencies {
            join(dependencies);
        }
    }
}
