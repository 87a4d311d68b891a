// registry.json: the Registry as written next to the merged sources

use crate::registry::Registry;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A synthesized or renamed function in the merged output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThunkRef {
    pub symbol: String,
    /// Output-relative file declaring `symbol`
    pub file: String,
}

/// A unit's (renamed) entry function and how it must be called
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRef {
    pub symbol: String,
    pub file: String,
    pub takes_args: bool,
    pub returns_status: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramManifest {
    /// Multiplexer name of the merged program
    pub program: String,
    pub registry: Registry<ThunkRef, EntryRef>,
}

impl ProgramManifest {
    pub fn to_json(&self) -> serde_json::Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_roundtrip_on_disk() {
        let registry = Registry::builder()
            .with(
                "cat",
                ThunkRef {
                    symbol: "initializers_cat".to_string(),
                    file: "cat/main.ub".to_string(),
                },
                EntryRef {
                    symbol: "main_cat".to_string(),
                    file: "cat/main.ub".to_string(),
                    takes_args: true,
                    returns_status: true,
                },
            )
            .unwrap()
            .build();
        let manifest = ProgramManifest {
            program: "unibox".to_string(),
            registry,
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, manifest.to_json().unwrap()).unwrap();

        let loaded = ProgramManifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(
            loaded.registry.get("cat").map(|e| e.entry.symbol.as_str()),
            Some("main_cat")
        );
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, "not json").unwrap();
        let err = ProgramManifest::load(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
