//! # pubchem-resolver
//!
//! Resolve noisy chemical names to PubChem identifiers against a local name
//! index, then fetch the matching records in bulk from PubChem's pc_fetch
//! service.
//!
//! ## Modules
//!
//! - [`ingest`]: streaming reader for PubChem compound/substance XML
//! - [`index`]: bucketed name index and identifier maps, with persistence
//! - [`matching`]: Jaro-Winkler matcher and identifier resolver
//! - [`retrieval`]: async submit → poll → validate → download client
//! - [`catalog`]: a session tying ingestion, matching and resolution together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pubchem_resolver::{Catalog, RecordKind, RetrievalClient, RetrieveMode};
//! use pubchem_resolver::retrieval::{PcFetchConfig, PollPolicy, WgetDownloader};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Build the index
//!     let mut catalog = Catalog::new();
//!     catalog.ingest_path(Path::new("compound_000001.xml"), None)?;
//!
//!     // Match and resolve
//!     catalog.match_names(&["aspirin", "caffiene"], 0.95);
//!     let resolution = catalog.resolve_compound_ids()?;
//!
//!     // Fetch the records
//!     let client = RetrievalClient::pc_fetch(
//!         &PcFetchConfig::default(),
//!         WgetDownloader::default(),
//!         PollPolicy::default(),
//!     )?;
//!     let report = client
//!         .submit_and_fetch(
//!             &resolution.identifiers(),
//!             "hits.sdf",
//!             RecordKind::Compound,
//!             RetrieveMode::Sdf,
//!             None,
//!         )
//!         .await?;
//!
//!     println!("Wrote {} bytes to {:?}", report.bytes, report.destination);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod index;
pub mod ingest;
pub mod matching;
pub mod retrieval;

// Re-export top-level types for convenience
pub use catalog::Catalog;

pub use error::{CatalogError, CatalogResult, UsageError};

pub use index::{IndexError, IndexPaths, IndexResult, IndexStats, NameIndex, RecordKind};

pub use ingest::{IngestReport, IngestionError, Record, RecordReader};

pub use matching::{
    AmbiguityPolicy, AmbiguousMatch, MatchOutcome, MatchResult, Matcher, Resolution, DEFAULT_THRESHOLD,
};

pub use retrieval::{
    CancelToken, JobState, PollPolicy, RetrievalClient, RetrievalError, RetrievalReport, RetrievalResult,
    RetrieveMode,
};

pub use config::{Config, ConfigError};
