//! OAI identifier extraction.

use crate::namespace::NamespaceResolver;
use crate::xml;
use oaiharvest_common::Result;

/// Reads the OAI `<identifier>` out of a record document or response fragment.
#[derive(Debug, Clone, Default)]
pub struct IdentifierExtractor {
    namespaces: NamespaceResolver,
}

impl IdentifierExtractor {
    pub fn new(namespaces: NamespaceResolver) -> Self {
        Self { namespaces }
    }

    /// Text of the first `identifier` element below the root, or `None` if
    /// there is no such element or it has no text.
    pub fn extract(&self, xml: &[u8], namespace: Option<&str>) -> Result<Option<String>> {
        let root = xml::parse(xml)?;
        let resolved = self.namespaces.resolve(namespace)?;
        Ok(root
            .find(resolved.element_namespace.as_deref(), "identifier")
            .and_then(|e| e.text()))
    }
}

/// Split a comma-separated identifier list, trimming each entry.
pub fn identifier_names(identifiers: Option<&str>) -> Vec<String> {
    match identifiers {
        Some(list) => list.split(',').map(|s| s.trim().to_string()).collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::DEFAULT_OAI_NAMESPACE;
    use oaiharvest_common::Error;

    const RECORD: &str = r#"<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
  <responseDate>2016-03-07T10:00:00Z</responseDate>
  <record>
    <header>
      <identifier>oai:example.org:42</identifier>
      <datestamp>2016-03-01</datestamp>
    </header>
    <metadata>
      <dc xmlns="http://purl.org/dc/elements/1.1/"><identifier>doi:10/xyz</identifier></dc>
    </metadata>
  </record>
</OAI-PMH>"#;

    #[test]
    fn test_extract_identifier() {
        let id = IdentifierExtractor::default()
            .extract(RECORD.as_bytes(), Some(DEFAULT_OAI_NAMESPACE))
            .unwrap();
        assert_eq!(id.as_deref(), Some("oai:example.org:42"));
    }

    #[test]
    fn test_identifier_in_other_namespace_ignored() {
        let xml = r#"<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/"><record><metadata><dc xmlns="http://purl.org/dc/elements/1.1/"><identifier>doi:10/xyz</identifier></dc></metadata></record></OAI-PMH>"#;
        let id = IdentifierExtractor::default()
            .extract(xml.as_bytes(), Some(DEFAULT_OAI_NAMESPACE))
            .unwrap();
        assert_eq!(id, None);
    }

    #[test]
    fn test_missing_identifier_is_absent() {
        let xml = r#"<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/"><record/></OAI-PMH>"#;
        let id = IdentifierExtractor::default()
            .extract(xml.as_bytes(), Some(DEFAULT_OAI_NAMESPACE))
            .unwrap();
        assert_eq!(id, None);
    }

    #[test]
    fn test_malformed_fragment() {
        let err = IdentifierExtractor::default()
            .extract(b"<record><identifier>x</record>", Some(DEFAULT_OAI_NAMESPACE))
            .unwrap_err();
        assert!(matches!(err, Error::MalformedXml(_)));
    }

    #[test]
    fn test_identifier_names() {
        assert_eq!(
            identifier_names(Some("oai:a:1, oai:a:2 ,oai:a:3")),
            vec!["oai:a:1", "oai:a:2", "oai:a:3"]
        );
        assert_eq!(identifier_names(Some("single")), vec!["single"]);
        assert!(identifier_names(None).is_empty());
    }
}
