//! OAI-PMH harvest core - record splitting, batch persistence and endpoint
//! certificate trust.

pub mod config;
pub mod identifier;
pub mod namespace;
pub mod sources;
pub mod splitter;
pub mod trust;
pub mod writer;
pub mod xml;

pub use config::HarvesterConfig;
pub use identifier::{identifier_names, IdentifierExtractor};
pub use namespace::{NamespaceMap, NamespaceResolver, ResolvedNamespace, DEFAULT_OAI_NAMESPACE};
pub use sources::{get_harvest_source, HarvestSource, HarvestSourceStore, InMemorySourceStore};
pub use splitter::{RecordDocument, RecordSplitter};
pub use trust::{CertificateTrustEvaluator, PeerCertificateInfo, TrustDecision, TrustReason};
pub use writer::{create_file_name, ensure_output_dir, ChunkedWriter, WriteSummary};
