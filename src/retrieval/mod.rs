//! Bulk record retrieval from pc_fetch
//!
//! # Protocol
//!
//! ```text
//! submit(idstr, retmode, db) ──► page ─┬─ ftp:// link ─────────────┐
//!                                      └─ pc_fetch.cgi?reqid=… ──► poll ↺
//!                                                                   │
//!              validate_location ◄─────────────────────────────────┘
//!                     │
//!              Downloader → temp file → rename to destination
//! ```
//!
//! The result location is untrusted input. It is validated against a strict
//! character whitelist and the `ftp` scheme before any transfer, and a
//! rejected location is never retried.

mod client;
mod download;
mod error;
mod job;
mod location;
mod policy;
mod service;

pub use client::{FetchJob, RetrievalClient, RetrievalReport};
pub use download::{Downloader, WgetDownloader, DEFAULT_PROGRAM};
pub use error::{RetrievalError, RetrievalResult};
pub use job::{JobState, RetrievalJob};
pub use location::validate_location;
pub use policy::{CancelToken, PollPolicy};
pub use service::{parse_page, FetchPage, FetchRequest, FetchService, PcFetchConfig, PcFetchService, DEFAULT_ENDPOINT};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output format requested from pc_fetch (`retmode`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrieveMode {
    Xml,
    /// ASN.1 text
    Asnt,
    /// ASN.1 binary
    Asnb,
    Json,
    Sdf,
    Smiles,
    #[default]
    Image,
}

impl RetrieveMode {
    pub const ALL: [RetrieveMode; 7] = [
        RetrieveMode::Xml,
        RetrieveMode::Asnt,
        RetrieveMode::Asnb,
        RetrieveMode::Json,
        RetrieveMode::Sdf,
        RetrieveMode::Smiles,
        RetrieveMode::Image,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RetrieveMode::Xml => "xml",
            RetrieveMode::Asnt => "asnt",
            RetrieveMode::Asnb => "asnb",
            RetrieveMode::Json => "json",
            RetrieveMode::Sdf => "sdf",
            RetrieveMode::Smiles => "smiles",
            RetrieveMode::Image => "image",
        }
    }
}

impl fmt::Display for RetrieveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrieveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        RetrieveMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == lower)
            .ok_or_else(|| format!("Unknown retrieve mode: {}", s))
    }
}
