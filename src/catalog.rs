//! Catalog session
//!
//! Owns a [`NameIndex`] together with the most recent match batch, so that
//! identifiers are always resolved from names that were actually matched
//! against this index.
//!
//! ```text
//! ingest_path(compound_*.xml) ─┐
//! ingest_path(substance_*.xml) ┴→ NameIndex → match_names(terms) → resolve(kind)
//! ```

use crate::error::{CatalogResult, UsageError};
use crate::index::{IndexPaths, IndexResult, NameIndex, RecordKind};
use crate::ingest::{self, IngestReport, IngestionError, RecordReader};
use crate::matching::{self, AmbiguityPolicy, MatchResult, Matcher, Resolution, DEFAULT_THRESHOLD};
use std::io::BufRead;
use std::path::Path;

/// Name index plus matching state for one session
#[derive(Debug, Clone)]
pub struct Catalog {
    index: NameIndex,
    matches: Option<Vec<MatchResult>>,
    threshold: f64,
    policy: AmbiguityPolicy,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Create a catalog with an empty index
    pub fn new() -> Self {
        Self::with_index(NameIndex::new())
    }

    /// Wrap an existing index
    pub fn with_index(index: NameIndex) -> Self {
        Self {
            index,
            matches: None,
            threshold: DEFAULT_THRESHOLD,
            policy: AmbiguityPolicy::default(),
        }
    }

    /// Open a persisted index, or start empty when no paths are given
    pub fn open(paths: Option<&IndexPaths>) -> IndexResult<Self> {
        match paths {
            Some(paths) => Ok(Self::with_index(NameIndex::load(paths)?)),
            None => Ok(Self::new()),
        }
    }

    /// Default threshold used by [`Catalog::match_all`]
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Policy used for names that map to several identifiers
    pub fn ambiguity_policy(mut self, policy: AmbiguityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn index(&self) -> &NameIndex {
        &self.index
    }

    pub fn matcher(&self) -> Matcher<'_> {
        Matcher::new(&self.index)
    }

    /// Ingest a PubChem XML file; the kind is inferred from the file name when absent
    pub fn ingest_path(&mut self, path: &Path, kind: Option<RecordKind>) -> Result<IngestReport, IngestionError> {
        let report = ingest::ingest_path(&mut self.index, path, kind)?;
        self.invalidate_matches();
        Ok(report)
    }

    /// Ingest an already opened document
    pub fn ingest_reader<R: BufRead>(&mut self, source: R, kind: RecordKind) -> Result<IngestReport, IngestionError> {
        let report = ingest::ingest_reader(&mut self.index, RecordReader::new(source, kind))?;
        self.invalidate_matches();
        Ok(report)
    }

    /// Match a batch of queries and remember the results for resolution
    pub fn match_names<S: AsRef<str>>(&mut self, queries: &[S], threshold: f64) -> &[MatchResult] {
        let results = Matcher::new(&self.index).match_names(queries, threshold);
        self.matches.insert(results).as_slice()
    }

    /// Match a batch of queries at the catalog's default threshold
    pub fn match_all<S: AsRef<str>>(&mut self, queries: &[S]) -> &[MatchResult] {
        let threshold = self.threshold;
        self.match_names(queries, threshold)
    }

    /// Results of the last [`Catalog::match_names`] call
    pub fn last_matches(&self) -> Option<&[MatchResult]> {
        self.matches.as_deref()
    }

    /// Resolve the last match batch to identifiers of `kind`
    pub fn resolve(&self, kind: RecordKind) -> Result<Resolution, UsageError> {
        let matches = self.matches.as_deref().ok_or(UsageError::ResolveBeforeMatch)?;

        let resolution = matching::resolve(matches, self.index.identifiers(kind), kind, self.policy);
        if resolution.ambiguous_count() > 0 {
            tracing::warn!(
                kind = %kind,
                ambiguous = resolution.ambiguous_count(),
                resolved = resolution.len(),
                "Resolved batch contains ambiguous names"
            );
        }
        Ok(resolution)
    }

    pub fn resolve_substance_ids(&self) -> Result<Resolution, UsageError> {
        self.resolve(RecordKind::Substance)
    }

    pub fn resolve_compound_ids(&self) -> Result<Resolution, UsageError> {
        self.resolve(RecordKind::Compound)
    }

    /// Match `queries` and resolve them in one step
    pub fn match_and_resolve<S: AsRef<str>>(&mut self, queries: &[S], kind: RecordKind) -> CatalogResult<Resolution> {
        self.match_all(queries);
        Ok(self.resolve(kind)?)
    }

    /// Persist the index
    pub fn save(&self, paths: &IndexPaths) -> IndexResult<()> {
        self.index.save(paths)
    }

    fn invalidate_matches(&mut self) {
        if self.matches.take().is_some() {
            tracing::debug!("Index changed; discarding previous match batch");
        }
    }
}
