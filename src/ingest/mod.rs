//! PubChem XML ingestion
//!
//! Turns `PC-Compounds` and `PC-Substances` documents into flat [`Record`]s
//! and folds them into a [`NameIndex`].
//!
//! - Compounds contribute their `SMILES` and `IUPAC Name` property values
//! - Substances contribute their deposited synonyms
//!
//! A document is ingested all-or-nothing: records are parsed first and only
//! folded into the index once the whole document parsed cleanly.

mod reader;

pub use reader::RecordReader;

use crate::index::{NameIndex, RecordKind};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One parsed entity, transient: it only lives until folded into the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub kind: RecordKind,
    pub identifier: u64,
    pub names: Vec<String>,
}

/// Summary of one ingested document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Source path, when ingested from a file
    pub source: Option<PathBuf>,
    pub kind: Option<RecordKind>,
    /// Records parsed from the document
    pub records: usize,
    /// Names seen across all records
    pub names_seen: usize,
    /// Names that changed the index
    pub names_added: usize,
}

/// Errors that can occur while ingesting a document
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed XML at byte {position}: {message}")]
    Xml { position: usize, message: String },

    #[error("Cannot infer record kind from file name {0:?}; expected it to start with 'compound' or 'substance'")]
    UnknownKind(PathBuf),

    #[error("Expected a <{expected}> document but found <{found}>")]
    UnexpectedRoot { expected: String, found: String },

    #[error("{kind} record #{ordinal} has no identifier")]
    MissingIdentifier { kind: RecordKind, ordinal: usize },

    #[error("{kind} record #{ordinal} has invalid identifier {value:?}")]
    InvalidIdentifier {
        kind: RecordKind,
        ordinal: usize,
        value: String,
    },
}

/// Infer the record kind from a file name (`compound*` / `substance*`)
pub fn infer_kind(path: &Path) -> Result<RecordKind, IngestionError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if file_name.starts_with("compound") {
        Ok(RecordKind::Compound)
    } else if file_name.starts_with("substance") {
        Ok(RecordKind::Substance)
    } else {
        Err(IngestionError::UnknownKind(path.to_path_buf()))
    }
}

/// Open a PubChem XML file, inferring its kind from the file name when not given
pub fn open(path: &Path, kind: Option<RecordKind>) -> Result<RecordReader<BufReader<File>>, IngestionError> {
    let kind = match kind {
        Some(kind) => kind,
        None => infer_kind(path)?,
    };

    let file = File::open(path)?;
    Ok(RecordReader::new(BufReader::new(file), kind))
}

/// Parse a whole document and fold its records into `index`
///
/// The index is untouched if the document fails to parse.
pub fn ingest_reader<R: BufRead>(
    index: &mut NameIndex,
    reader: RecordReader<R>,
) -> Result<IngestReport, IngestionError> {
    let kind = reader.kind();
    let records = reader.collect::<Result<Vec<_>, _>>()?;

    let mut report = IngestReport {
        kind: Some(kind),
        records: records.len(),
        ..Default::default()
    };

    for record in &records {
        report.names_seen += record.names.len();
        report.names_added += index.add_record(record);
    }

    tracing::debug!(
        kind = %kind,
        records = report.records,
        names_added = report.names_added,
        "Ingested document"
    );
    Ok(report)
}

/// Ingest a PubChem XML file into `index`
pub fn ingest_path(
    index: &mut NameIndex,
    path: &Path,
    kind: Option<RecordKind>,
) -> Result<IngestReport, IngestionError> {
    let reader = open(path, kind)?;
    let mut report = ingest_reader(index, reader).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "Ingestion aborted");
        e
    })?;
    report.source = Some(path.to_path_buf());

    tracing::info!(
        path = %path.display(),
        records = report.records,
        names_added = report.names_added,
        "Ingested PubChem file"
    );
    Ok(report)
}
