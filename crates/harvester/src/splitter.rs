//! Split an OAI-PMH response into standalone per-record documents.

use crate::namespace::NamespaceResolver;
use crate::xml::{self, Element};
use oaiharvest_common::{Error, Result};
use std::path::Path;
use tracing::debug;

/// Root element name of every reconstructed record document.
const WRAPPER_NAME: &str = "OAI-PMH";

/// Response elements copied into every record document, in this order.
const HEADER_NAMES: [&str; 2] = ["responseDate", "request"];

/// A serialized `<OAI-PMH>` document holding the response headers and
/// exactly one `<record>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDocument {
    raw: String,
}

impl RecordDocument {
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl AsRef<str> for RecordDocument {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

/// Splits harvest responses into [`RecordDocument`]s.
#[derive(Debug, Clone, Default)]
pub struct RecordSplitter {
    namespaces: NamespaceResolver,
}

impl RecordSplitter {
    pub fn new(namespaces: NamespaceResolver) -> Self {
        Self { namespaces }
    }

    /// Split `xml` into one document per `<record>`, in source order.
    ///
    /// Every document carries all `responseDate` elements followed by all
    /// `request` elements of the source. A response without records yields
    /// an empty list.
    pub fn split(&self, xml: &[u8], namespace: Option<&str>) -> Result<Vec<RecordDocument>> {
        let root = xml::parse(xml)?;
        let resolved = self.namespaces.resolve(namespace)?;
        let ns = resolved.element_namespace.as_deref();

        let headers: Vec<&Element> = HEADER_NAMES
            .into_iter()
            .flat_map(|name| root.find_all(ns, name))
            .collect();

        let mut documents = Vec::new();
        for record in root.find_all(ns, "record") {
            let mut wrapper = Element::new(WRAPPER_NAME, resolved.element_namespace.clone());
            for (prefix, uri) in &resolved.map {
                wrapper.push_attribute(format!("xmlns:{}", prefix), uri.as_str());
            }
            for header in &headers {
                wrapper.push_element((*header).clone());
            }
            wrapper.push_element(record.clone());

            documents.push(RecordDocument {
                raw: wrapper.to_xml_string()?,
            });
        }

        debug!(
            records = documents.len(),
            headers = headers.len(),
            "Split harvest response"
        );
        Ok(documents)
    }

    /// Read a harvested file and split it.
    pub fn split_file(&self, path: &Path, namespace: Option<&str>) -> Result<Vec<RecordDocument>> {
        let content = std::fs::read(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        self.split(&content, namespace)
    }
}
