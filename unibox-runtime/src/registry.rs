// Command registry: public unit name -> (initializer thunk, entry thunk)

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry<I, E> {
    pub init: I,
    pub entry: E,
}

/// Read-only once built; entries are ordered by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registry<I, E> {
    entries: IndexMap<String, RegistryEntry<I, E>>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("command `{0}` is registered twice")]
    DuplicateName(String),
    #[error("invalid command name `{0}`")]
    InvalidName(String),
}

impl<I, E> Registry<I, E> {
    pub fn builder() -> RegistryBuilder<I, E> {
        RegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry<I, E>> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RegistryEntry<I, E>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Collects registrations; `build` freezes them into a `Registry`
pub struct RegistryBuilder<I, E> {
    entries: IndexMap<String, RegistryEntry<I, E>>,
}

impl<I, E> Default for RegistryBuilder<I, E> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<I, E> RegistryBuilder<I, E> {
    pub fn register(&mut self, name: &str, init: I, entry: E) -> Result<(), RegistryError> {
        if name.is_empty() || name.contains('/') {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        if self.entries.contains_key(name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        self.entries
            .insert(name.to_string(), RegistryEntry { init, entry });
        Ok(())
    }

    pub fn with(mut self, name: &str, init: I, entry: E) -> Result<Self, RegistryError> {
        self.register(name, init, entry)?;
        Ok(self)
    }

    pub fn build(mut self) -> Registry<I, E> {
        self.entries.sort_keys();
        Registry {
            entries: self.entries,
        }
    }
}
