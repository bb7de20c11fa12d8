//! oaiharvest - split, store and inspect OAI-PMH harvest responses.

use anyhow::Context;
use clap::{Parser, Subcommand};
use oaiharvest_common::TextEncoding;
use oaiharvest_core::{
    get_harvest_source, CertificateTrustEvaluator, ChunkedWriter, HarvesterConfig,
    IdentifierExtractor, InMemorySourceStore, NamespaceResolver, RecordSplitter,
    DEFAULT_OAI_NAMESPACE,
};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "oaiharvest")]
#[command(author, version, about = "Split and store OAI-PMH harvest responses")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (json, text)
    #[arg(long, global = true, default_value = "text")]
    format: String,

    /// Harvester configuration file (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a harvested response into record batches on disk
    Split {
        /// Harvested OAI-PMH response
        #[arg(long, short = 'i')]
        input: PathBuf,

        /// Output directory, relative to the configured work directory
        #[arg(long)]
        out_dir: PathBuf,

        /// OAI-PMH namespace URI; empty to use the configured default map
        #[arg(long, default_value = DEFAULT_OAI_NAMESPACE)]
        namespace: String,

        /// Maximum number of records per file
        #[arg(long)]
        max_records: Option<usize>,

        /// Output encoding (utf-8, iso-8859-1)
        #[arg(long)]
        encoding: Option<String>,
    },

    /// Print the OAI identifier of a record document
    Identifier {
        #[arg(long, short = 'i')]
        input: PathBuf,

        #[arg(long, default_value = DEFAULT_OAI_NAMESPACE)]
        namespace: String,
    },

    /// Decide whether TLS verification applies to an endpoint
    CheckCert {
        #[arg(long)]
        url: String,
    },

    /// Show a configured harvest source
    Source {
        #[arg(long)]
        name: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let config = match &cli.config {
        Some(path) => HarvesterConfig::load(path)
            .with_context(|| format!("Failed to load configuration {:?}", path))?,
        None => HarvesterConfig::default(),
    };
    let namespaces = match &config.default_namespace_map {
        Some(map) => NamespaceResolver::with_default_map(map.clone()),
        None => NamespaceResolver::new(),
    };
    let json_output = cli.format == "json";

    match cli.command {
        Commands::Split {
            input,
            out_dir,
            namespace,
            max_records,
            encoding,
        } => {
            info!("Splitting {:?}", input);
            let records = RecordSplitter::new(namespaces)
                .split_file(&input, Some(namespace.as_str()))
                .with_context(|| format!("Failed to split {:?}", input))?;

            let mut writer = ChunkedWriter::from_config(&config);
            if let Some(max) = max_records {
                writer = writer.with_max_records(max);
            }
            if let Some(encoding) = encoding {
                writer = writer.with_encoding(encoding.parse::<TextEncoding>()?);
            }
            let summary = writer.write(&records, &out_dir)?;

            if json_output {
                let value = json!({ "files": summary.files, "total": summary.total });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                for file in &summary.files {
                    println!("{}", file.display());
                }
                println!("{} records in {} files", summary.total, summary.files.len());
            }
        }

        Commands::Identifier { input, namespace } => {
            let content =
                std::fs::read(&input).with_context(|| format!("Failed to read {:?}", input))?;
            let identifier =
                IdentifierExtractor::new(namespaces).extract(&content, Some(namespace.as_str()))?;

            if json_output {
                println!("{}", json!({ "identifier": identifier }));
            } else {
                match identifier {
                    Some(id) => println!("{}", id),
                    None => println!("No identifier found"),
                }
            }
        }

        Commands::CheckCert { url } => {
            let decision = CertificateTrustEvaluator::from_config(&config).evaluate(&url);

            if json_output {
                let value = json!({
                    "url": url,
                    "verify": decision.verify,
                    "reason": format!("{:?}", decision.reason),
                });
                println!("{}", value);
            } else {
                println!("verify={} ({:?})", decision.verify, decision.reason);
            }
        }

        Commands::Source { name } => {
            let store = InMemorySourceStore::new(config.sources.clone());
            let source = get_harvest_source(&store, &name)?;

            if json_output {
                println!("{}", serde_json::to_string_pretty(&source)?);
            } else {
                println!("{}: {} ({})", source.name, source.base_url, source.metadata_prefix);
                if let Some(sets) = &source.set_specs {
                    println!("  sets: {}", oaiharvest_core::identifier_names(Some(sets)).join(", "));
                }
            }
        }
    }

    Ok(())
}
