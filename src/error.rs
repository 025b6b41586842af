//! Crate-level error types
//!
//! Module errors ([`IngestionError`], [`IndexError`], [`RetrievalError`])
//! convert into [`CatalogError`] so callers driving a whole session can use `?`.

use crate::index::IndexError;
use crate::ingest::IngestionError;
use crate::retrieval::RetrievalError;
use thiserror::Error;

/// Programmer errors: the API was called in the wrong order or with an
/// inconsistent set of arguments
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("no names have been matched yet; call match_names before resolving identifiers")]
    ResolveBeforeMatch,

    #[error("index paths must be given all together (names, substance ids, compound ids) or not at all")]
    PartialIndexPaths,
}

/// Errors surfaced by a [`Catalog`](crate::Catalog) session
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
}

/// Result type alias for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;
