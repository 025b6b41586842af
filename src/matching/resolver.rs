//! Identifier Resolver
//!
//! Maps matched canonical names to record identifiers of one kind.
//!
//! A canonical name can map to several identifiers (the same synonym is
//! deposited by several sources, for example). Such names are resolved
//! according to an [`AmbiguityPolicy`] and reported in
//! [`Resolution::ambiguous`] instead of failing the batch.

use crate::index::{IdentifierMap, RecordKind};
use crate::matching::MatchResult;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How to pick one identifier when a name maps to several
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Identifier that was ingested first
    #[default]
    FirstInserted,
    /// Numerically lowest identifier
    LowestIdentifier,
    /// Leave the query unresolved; the caller has to disambiguate
    Reject,
}

impl AmbiguityPolicy {
    fn pick(&self, candidates: &[u64]) -> Option<u64> {
        match self {
            AmbiguityPolicy::FirstInserted => candidates.first().copied(),
            AmbiguityPolicy::LowestIdentifier => candidates.iter().min().copied(),
            AmbiguityPolicy::Reject => None,
        }
    }
}

impl fmt::Display for AmbiguityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AmbiguityPolicy::FirstInserted => "first_inserted",
            AmbiguityPolicy::LowestIdentifier => "lowest_identifier",
            AmbiguityPolicy::Reject => "reject",
        };
        f.write_str(s)
    }
}

impl FromStr for AmbiguityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "first_inserted" | "first" => Ok(AmbiguityPolicy::FirstInserted),
            "lowest_identifier" | "lowest" => Ok(AmbiguityPolicy::LowestIdentifier),
            "reject" => Ok(AmbiguityPolicy::Reject),
            other => Err(format!("unknown ambiguity policy: {}", other)),
        }
    }
}

/// A canonical name that mapped to more than one identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguousMatch {
    pub query: String,
    pub name: String,
    /// All identifiers of the name, in ingestion order
    pub candidates: Vec<u64>,
    /// Identifier used, absent under [`AmbiguityPolicy::Reject`]
    pub chosen: Option<u64>,
}

/// Outcome of resolving a match batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub kind: Option<RecordKind>,
    /// query → identifier, in query order; unresolved queries are absent
    pub ids: IndexMap<String, u64>,
    pub ambiguous: Vec<AmbiguousMatch>,
}

impl Resolution {
    /// Number of names that mapped to several identifiers
    pub fn ambiguous_count(&self) -> usize {
        self.ambiguous.len()
    }

    pub fn get(&self, query: &str) -> Option<u64> {
        self.ids.get(query).copied()
    }

    /// Resolved identifiers in query order
    pub fn identifiers(&self) -> Vec<u64> {
        self.ids.values().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Resolve matched names to identifiers of `kind`
///
/// Queries without a match, and matched names without identifiers of `kind`,
/// are left out of the result.
pub fn resolve(
    matches: &[MatchResult],
    identifiers: &IdentifierMap,
    kind: RecordKind,
    policy: AmbiguityPolicy,
) -> Resolution {
    let mut resolution = Resolution {
        kind: Some(kind),
        ..Default::default()
    };

    for result in matches {
        let Some(name) = result.matched_name() else {
            continue;
        };
        let Some(ids) = identifiers.get(name).filter(|ids| !ids.is_empty()) else {
            continue;
        };

        let candidates: Vec<u64> = ids.iter().copied().collect();
        let chosen = if candidates.len() > 1 {
            let chosen = policy.pick(&candidates);
            tracing::warn!(
                query = %result.query,
                name,
                kind = %kind,
                candidates = ?candidates,
                chosen = ?chosen,
                policy = %policy,
                "Canonical name maps to multiple identifiers"
            );
            resolution.ambiguous.push(AmbiguousMatch {
                query: result.query.clone(),
                name: name.to_string(),
                candidates,
                chosen,
            });
            chosen
        } else {
            candidates.first().copied()
        };

        if let Some(id) = chosen {
            resolution.ids.insert(result.query.clone(), id);
        }
    }

    resolution
}
