//! Index persistence
//!
//! The index is stored as three files, mirroring its three maps:
//! canonical names (buckets), substance identifiers and compound identifiers.
//! Files ending in `.bin` are written with bincode, everything else as JSON.
//!
//! Writes go to a temporary file in the target directory which is then
//! renamed over the destination, so a crashed save never leaves a truncated
//! index behind.

use crate::error::UsageError;
use crate::index::{BucketMap, IdentifierMap, IndexError, IndexResult, NameIndex, RecordKind};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const INDEX_FILE_VERSION: u32 = 1;

/// On-disk encoding of an index file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Json,
    Bincode,
}

impl IndexFormat {
    /// Pick the encoding from a file extension (`.bin` → bincode)
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("bin") => IndexFormat::Bincode,
            _ => IndexFormat::Json,
        }
    }

    /// File extension written for this encoding
    pub fn extension(&self) -> &'static str {
        match self {
            IndexFormat::Json => "json",
            IndexFormat::Bincode => "bin",
        }
    }
}

impl FromStr for IndexFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(IndexFormat::Json),
            "bincode" | "bin" => Ok(IndexFormat::Bincode),
            other => Err(format!("Unknown index format: {}", other)),
        }
    }
}

/// Locations of the three index files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPaths {
    pub names: PathBuf,
    pub substance_ids: PathBuf,
    pub compound_ids: PathBuf,
}

impl IndexPaths {
    pub fn new(
        names: impl Into<PathBuf>,
        substance_ids: impl Into<PathBuf>,
        compound_ids: impl Into<PathBuf>,
    ) -> Self {
        Self {
            names: names.into(),
            substance_ids: substance_ids.into(),
            compound_ids: compound_ids.into(),
        }
    }

    /// Standard JSON file names inside one directory
    pub fn in_dir(dir: &Path) -> Self {
        Self::in_dir_as(dir, IndexFormat::Json)
    }

    /// Standard file names inside one directory, encoded as `format`
    pub fn in_dir_as(dir: &Path, format: IndexFormat) -> Self {
        let ext = format.extension();
        Self::new(
            dir.join(format!("names.{ext}")),
            dir.join(format!("substance_ids.{ext}")),
            dir.join(format!("compound_ids.{ext}")),
        )
    }

    /// Build from optional parts: all three or none
    ///
    /// Supplying some but not all of the paths is a usage error.
    pub fn from_parts(
        names: Option<PathBuf>,
        substance_ids: Option<PathBuf>,
        compound_ids: Option<PathBuf>,
    ) -> Result<Option<Self>, UsageError> {
        match (names, substance_ids, compound_ids) {
            (Some(names), Some(substance_ids), Some(compound_ids)) => Ok(Some(Self {
                names,
                substance_ids,
                compound_ids,
            })),
            (None, None, None) => Ok(None),
            _ => Err(UsageError::PartialIndexPaths),
        }
    }

    /// Identifier file for one kind
    pub fn identifiers(&self, kind: RecordKind) -> &Path {
        match kind {
            RecordKind::Substance => &self.substance_ids,
            RecordKind::Compound => &self.compound_ids,
        }
    }

    /// Whether all three files exist
    pub fn exist(&self) -> bool {
        self.names.exists() && self.substance_ids.exists() && self.compound_ids.exists()
    }

    /// Directory of the names file, or the file itself for a bare file name
    pub fn location(&self) -> &Path {
        match self.names.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => &self.names,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct NamesFile {
    version: u32,
    saved_at: DateTime<Utc>,
    buckets: BucketMap,
}

#[derive(Serialize, Deserialize)]
struct IdentifiersFile {
    version: u32,
    saved_at: DateTime<Utc>,
    kind: RecordKind,
    identifiers: IdentifierMap,
}

impl NameIndex {
    /// Persist the index to its three files
    pub fn save(&self, paths: &IndexPaths) -> IndexResult<()> {
        let saved_at = Utc::now();

        write_file(
            &paths.names,
            &NamesFile {
                version: INDEX_FILE_VERSION,
                saved_at,
                buckets: self.buckets().clone(),
            },
        )?;

        for kind in RecordKind::ALL {
            write_file(
                paths.identifiers(kind),
                &IdentifiersFile {
                    version: INDEX_FILE_VERSION,
                    saved_at,
                    kind,
                    identifiers: self.identifiers(kind).clone(),
                },
            )?;
        }

        tracing::info!(
            names = %paths.names.display(),
            stats = %self.stats(),
            "Saved name index"
        );
        Ok(())
    }

    /// Load an index previously written by [`NameIndex::save`]
    pub fn load(paths: &IndexPaths) -> IndexResult<Self> {
        let names: NamesFile = read_file(&paths.names)?;
        check_version(&paths.names, names.version)?;

        let substances = load_identifiers(paths, RecordKind::Substance)?;
        let compounds = load_identifiers(paths, RecordKind::Compound)?;

        let index = NameIndex::from_parts(names.buckets, substances, compounds);

        let orphaned = index.orphaned_names().len();
        if orphaned > 0 {
            tracing::warn!(orphaned, "Loaded index has names without identifiers");
        }

        tracing::info!(stats = %index.stats(), "Loaded name index");
        Ok(index)
    }
}

fn load_identifiers(paths: &IndexPaths, kind: RecordKind) -> IndexResult<IdentifierMap> {
    let path = paths.identifiers(kind);
    let file: IdentifiersFile = read_file(path)?;
    check_version(path, file.version)?;

    if file.kind != kind {
        return Err(IndexError::KindMismatch {
            path: path.to_path_buf(),
            found: file.kind,
            expected: kind,
        });
    }

    Ok(file.identifiers)
}

fn check_version(path: &Path, found: u32) -> IndexResult<()> {
    if found != INDEX_FILE_VERSION {
        return Err(IndexError::UnsupportedVersion {
            path: path.to_path_buf(),
            found,
            expected: INDEX_FILE_VERSION,
        });
    }
    Ok(())
}

fn write_file<T: Serialize>(path: &Path, value: &T) -> IndexResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let temp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        match IndexFormat::from_path(path) {
            IndexFormat::Json => serde_json::to_writer(&mut writer, value)?,
            IndexFormat::Bincode => bincode::serialize_into(&mut writer, value)?,
        }
        writer.flush()?;
    }

    temp.persist(path).map_err(|e| IndexError::Io(e.error))?;
    Ok(())
}

fn read_file<T: DeserializeOwned>(path: &Path) -> IndexResult<T> {
    let reader = BufReader::new(File::open(path)?);
    let value = match IndexFormat::from_path(path) {
        IndexFormat::Json => serde_json::from_reader(reader)?,
        IndexFormat::Bincode => bincode::deserialize_from(reader)?,
    };
    Ok(value)
}
