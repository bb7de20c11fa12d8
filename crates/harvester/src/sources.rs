//! Named harvest source configurations.

use oaiharvest_common::{Error, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where and what to harvest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestSource {
    pub name: String,
    pub base_url: String,
    pub metadata_prefix: String,
    /// Comma-separated set specs.
    #[serde(default)]
    pub set_specs: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub last_run: Option<Timestamp>,
}

/// Lookup of harvest sources by name.
pub trait HarvestSourceStore {
    fn find(&self, name: &str) -> Option<HarvestSource>;
}

/// Store backed by a map, usually filled from configuration.
#[derive(Debug, Clone, Default)]
pub struct InMemorySourceStore {
    sources: HashMap<String, HarvestSource>,
}

impl InMemorySourceStore {
    pub fn new(sources: impl IntoIterator<Item = HarvestSource>) -> Self {
        Self {
            sources: sources.into_iter().map(|s| (s.name.clone(), s)).collect(),
        }
    }

    pub fn insert(&mut self, source: HarvestSource) {
        self.sources.insert(source.name.clone(), source);
    }
}

impl HarvestSourceStore for InMemorySourceStore {
    fn find(&self, name: &str) -> Option<HarvestSource> {
        self.sources.get(name).cloned()
    }
}

/// Fetch a source by name, failing with [`Error::ConfigNotFound`] if absent.
pub fn get_harvest_source(store: &dyn HarvestSourceStore, name: &str) -> Result<HarvestSource> {
    store
        .find(name)
        .ok_or_else(|| Error::ConfigNotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str) -> HarvestSource {
        HarvestSource {
            name: name.to_string(),
            base_url: "https://repo.example.org/oai".to_string(),
            metadata_prefix: "oai_dc".to_string(),
            set_specs: None,
            comment: None,
            last_run: None,
        }
    }

    #[test]
    fn test_found() {
        let store = InMemorySourceStore::new(vec![source("a"), source("b")]);
        assert_eq!(get_harvest_source(&store, "b").unwrap().name, "b");
    }

    #[test]
    fn test_not_found() {
        let mut store = InMemorySourceStore::default();
        store.insert(source("a"));
        let err = get_harvest_source(&store, "missing").unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("missing"));
    }
}
