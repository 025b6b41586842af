//! Name Index - bucketed canonical names plus per-kind identifier maps
//!
//! Both maps are insertion-ordered so that iteration (and therefore
//! tie-breaking during approximate matching) is deterministic, including
//! after a persistence round trip.

use crate::index::{bucket_key, IndexStats, RecordKind};
use crate::ingest::Record;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// bucket-key → set of distinct canonical names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketMap(IndexMap<String, IndexSet<String>>);

impl BucketMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the bucket for `key`, inserting an empty one the first time it is touched
    pub fn get_or_insert_default(&mut self, key: &str) -> &mut IndexSet<String> {
        self.0.entry(key.to_string()).or_default()
    }

    pub fn get(&self, key: &str) -> Option<&IndexSet<String>> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &IndexSet<String>)> {
        self.0.iter()
    }

    /// Number of buckets
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of names across all buckets
    pub fn name_count(&self) -> usize {
        self.0.values().map(|names| names.len()).sum()
    }
}

/// canonical name → set of record identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentifierMap(IndexMap<String, IndexSet<u64>>);

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the identifier set for `name`, inserting an empty one the first time it is touched
    pub fn get_or_insert_default(&mut self, name: &str) -> &mut IndexSet<u64> {
        self.0.entry(name.to_string()).or_default()
    }

    pub fn get(&self, name: &str) -> Option<&IndexSet<u64>> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.get(name).is_some_and(|ids| !ids.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &IndexSet<u64>)> {
        self.0.iter()
    }

    /// Number of names
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names that map to more than one identifier
    pub fn ambiguous_names(&self) -> impl Iterator<Item = &String> {
        self.0
            .iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(name, _)| name)
    }
}

/// Append-only index of canonical names built during ingestion
///
/// Built through `&mut self` during ingestion and read through `&self`
/// afterwards; the type is `Send + Sync`, so a finished index can be shared
/// across matching tasks behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameIndex {
    buckets: BucketMap,
    substances: IdentifierMap,
    compounds: IdentifierMap,
}

impl NameIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Reassemble an index from its persisted parts
    pub fn from_parts(buckets: BucketMap, substances: IdentifierMap, compounds: IdentifierMap) -> Self {
        Self {
            buckets,
            substances,
            compounds,
        }
    }

    /// Add one name for a record identifier
    ///
    /// Empty names are ignored. Repeated identical insertions are absorbed.
    /// Returns `true` if the index changed.
    pub fn add_name(&mut self, kind: RecordKind, identifier: u64, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }

        let new_name = self
            .buckets
            .get_or_insert_default(&bucket_key(name))
            .insert(name.to_string());

        let new_id = self
            .identifiers_mut(kind)
            .get_or_insert_default(name)
            .insert(identifier);

        new_name || new_id
    }

    /// Fold every name of a record into the index
    ///
    /// Returns the number of names that changed the index.
    pub fn add_record(&mut self, record: &Record) -> usize {
        record
            .names
            .iter()
            .filter(|name| self.add_name(record.kind, record.identifier, name))
            .count()
    }

    /// Names sharing the bucket of `query`
    pub fn candidates(&self, query: &str) -> Option<&IndexSet<String>> {
        self.buckets.get(&bucket_key(query))
    }

    /// Whether `name` is a canonical name (exact, case-sensitive)
    pub fn contains_name(&self, name: &str) -> bool {
        self.candidates(name)
            .is_some_and(|names| names.contains(name))
    }

    pub fn buckets(&self) -> &BucketMap {
        &self.buckets
    }

    /// Identifier map of one record kind
    pub fn identifiers(&self, kind: RecordKind) -> &IdentifierMap {
        match kind {
            RecordKind::Substance => &self.substances,
            RecordKind::Compound => &self.compounds,
        }
    }

    fn identifiers_mut(&mut self, kind: RecordKind) -> &mut IdentifierMap {
        match kind {
            RecordKind::Substance => &mut self.substances,
            RecordKind::Compound => &mut self.compounds,
        }
    }

    /// Number of distinct canonical names
    pub fn len(&self) -> usize {
        self.buckets.name_count()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Names present in a bucket without identifiers under any kind
    pub fn orphaned_names(&self) -> Vec<&String> {
        self.buckets
            .iter()
            .flat_map(|(_, names)| names.iter())
            .filter(|name| !self.substances.contains(name) && !self.compounds.contains(name))
            .collect()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            buckets: self.buckets.len(),
            names: self.buckets.name_count(),
            substance_names: self.substances.len(),
            compound_names: self.compounds.len(),
            ambiguous_names: self.substances.ambiguous_names().count()
                + self.compounds.ambiguous_names().count(),
        }
    }
}
