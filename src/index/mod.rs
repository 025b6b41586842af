//! Name Index Structures
//!
//! Provides the lookup structures that approximate matching runs against:
//!
//! - **BucketMap**: bucket-key → insertion-ordered set of canonical names
//! - **IdentifierMap**: canonical name → insertion-ordered set of identifiers,
//!   one map per [`RecordKind`]
//! - **NameIndex**: the pair of the above, grown append-only during ingestion
//!
//! # Architecture
//!
//! ```text
//! Query: "4-methoxy-1H-indole-3-carbaldehyde"
//!        ↓
//! bucket_key → "4-m"
//!        ↓
//! BucketMap["4-m"] → {"4-methoxy-1H-indole-3-carbaldehyde", "4-methylphenol", ...}
//!        ↓
//! IdentifierMap[Compound]["4-methoxy-1H-indole-3-carbaldehyde"] → {2245}
//! ```
//!
//! # Design Notes
//! - Buckets trade recall for lookup speed: a name is only ever compared
//!   against names sharing its normalized three-character prefix.
//! - Names are keyed by exact string equality; case and whitespace are kept
//!   as ingested. Only the bucket key is normalized.

mod error;
mod name_index;
mod persist;

pub use error::{IndexError, IndexResult};
pub use name_index::{BucketMap, IdentifierMap, NameIndex};
pub use persist::{IndexFormat, IndexPaths};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of leading characters that form a bucket key
pub const BUCKET_KEY_CHARS: usize = 3;

/// Source category of a record; each kind has its own identifier namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// Deposited substance (SID namespace)
    Substance,
    /// Standardized compound (CID namespace)
    Compound,
}

impl RecordKind {
    /// All kinds, in persistence order
    pub const ALL: [RecordKind; 2] = [RecordKind::Substance, RecordKind::Compound];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Substance => "substance",
            RecordKind::Compound => "compound",
        }
    }

    /// Database selector understood by pc_fetch (`pcsubstance` / `pccompound`)
    pub fn db_selector(&self) -> &'static str {
        match self {
            RecordKind::Substance => "pcsubstance",
            RecordKind::Compound => "pccompound",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "substance" | "sid" => Ok(RecordKind::Substance),
            "compound" | "cid" => Ok(RecordKind::Compound),
            other => Err(format!("unknown record kind: {}", other)),
        }
    }
}

/// Compute the bucket key of a name: its first three characters, lowercased
pub fn bucket_key(name: &str) -> String {
    name.chars()
        .take(BUCKET_KEY_CHARS)
        .collect::<String>()
        .to_lowercase()
}

/// Statistics about index contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Number of buckets
    pub buckets: usize,
    /// Number of distinct names across all buckets
    pub names: usize,
    /// Number of names with substance identifiers
    pub substance_names: usize,
    /// Number of names with compound identifiers
    pub compound_names: usize,
    /// Names mapping to more than one identifier (either kind)
    pub ambiguous_names: usize,
}

impl fmt::Display for IndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} names in {} buckets ({} substance, {} compound, {} ambiguous)",
            self.names, self.buckets, self.substance_names, self.compound_names, self.ambiguous_names
        )
    }
}
