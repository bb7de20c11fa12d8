//! OAI-PMH namespace resolution.

use oaiharvest_common::{Error, Result};
use std::collections::BTreeMap;

/// Namespace of OAI-PMH 2.0 responses.
pub const DEFAULT_OAI_NAMESPACE: &str = "http://www.openarchives.org/OAI/2.0/";

/// Prefix under which an explicitly supplied namespace URI is mapped.
pub const OAI_PMH_PREFIX: &str = "OAI-PMH";

/// Prefix → namespace URI table.
pub type NamespaceMap = BTreeMap<String, String>;

/// A resolved namespace mapping plus the namespace OAI elements are matched in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNamespace {
    /// Mapping declared on every reconstructed wrapper.
    pub map: NamespaceMap,
    /// Namespace that `record`, `identifier` etc. must belong to.
    /// `None` matches elements that are in no namespace.
    pub element_namespace: Option<String>,
}

/// Builds namespace mappings, falling back to a host-configured default table.
#[derive(Debug, Clone, Default)]
pub struct NamespaceResolver {
    default_map: Option<NamespaceMap>,
}

impl NamespaceResolver {
    /// Resolver with no default mapping. Calls without a URI fail.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver that falls back to `default_map` when no URI is supplied.
    pub fn with_default_map(default_map: NamespaceMap) -> Self {
        Self {
            default_map: Some(default_map),
        }
    }

    /// Resolve the mapping for `uri`.
    ///
    /// A present, non-empty URI yields `{"OAI-PMH": uri}`. Otherwise the
    /// configured default table is used and elements are matched in its
    /// `OAI-PMH` entry, or in no namespace if the table has none.
    pub fn resolve(&self, uri: Option<&str>) -> Result<ResolvedNamespace> {
        match uri.filter(|u| !u.is_empty()) {
            Some(uri) => {
                let mut map = NamespaceMap::new();
                map.insert(OAI_PMH_PREFIX.to_string(), uri.to_string());
                Ok(ResolvedNamespace {
                    map,
                    element_namespace: Some(uri.to_string()),
                })
            }
            None => {
                let map = self.default_map.clone().ok_or(Error::ConfigurationMissing)?;
                let element_namespace = map.get(OAI_PMH_PREFIX).cloned();
                Ok(ResolvedNamespace {
                    map,
                    element_namespace,
                })
            }
        }
    }
}
