//! Approximate Matcher
//!
//! Resolves a query to the closest canonical name in its bucket.

use crate::index::NameIndex;
use serde::Serialize;

/// Default similarity threshold
///
/// Jaro-Winkler scores a single substituted ring locant ("1H" vs "2H") only
/// slightly below 1.0, so anything more lenient starts pairing chemically
/// distinct compounds.
pub const DEFAULT_THRESHOLD: f64 = 0.99;

/// How a query was resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    /// Query is itself a canonical name
    Exact { name: String },
    /// Closest canonical name in the bucket scored above the threshold
    Fuzzy { name: String, score: f64 },
    /// Nothing scored above the threshold; `best_score` is absent when no
    /// similarity was computed
    NoMatch { best_score: Option<f64> },
}

/// Immutable pairing of a query with its outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub query: String,
    #[serde(flatten)]
    pub outcome: MatchOutcome,
}

impl MatchResult {
    fn new(query: &str, outcome: MatchOutcome) -> Self {
        Self {
            query: query.to_string(),
            outcome,
        }
    }

    /// Matched canonical name, if any
    pub fn matched_name(&self) -> Option<&str> {
        match &self.outcome {
            MatchOutcome::Exact { name } | MatchOutcome::Fuzzy { name, .. } => Some(name),
            MatchOutcome::NoMatch { .. } => None,
        }
    }

    /// Similarity that produced the outcome (1.0 for exact matches)
    pub fn score(&self) -> Option<f64> {
        match &self.outcome {
            MatchOutcome::Exact { .. } => Some(1.0),
            MatchOutcome::Fuzzy { score, .. } => Some(*score),
            MatchOutcome::NoMatch { best_score } => *best_score,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self.outcome, MatchOutcome::Exact { .. })
    }

    pub fn is_match(&self) -> bool {
        self.matched_name().is_some()
    }
}

/// Read-only matcher over a finished [`NameIndex`]
#[derive(Debug, Clone, Copy)]
pub struct Matcher<'a> {
    index: &'a NameIndex,
}

impl<'a> Matcher<'a> {
    pub fn new(index: &'a NameIndex) -> Self {
        Self { index }
    }

    /// Find the canonical name closest to `query`
    ///
    /// Exact (case-sensitive) hits return immediately. With a threshold of
    /// 1.0 or more only exact hits are accepted. Otherwise every name in the
    /// query's bucket is scored with Jaro-Winkler and the best one is
    /// returned if its score is strictly greater than `threshold`; on equal
    /// scores the name inserted first wins.
    pub fn lookup(&self, query: &str, threshold: f64) -> MatchResult {
        let Some(candidates) = self.index.candidates(query) else {
            return MatchResult::new(query, MatchOutcome::NoMatch { best_score: None });
        };

        if candidates.contains(query) {
            return MatchResult::new(
                query,
                MatchOutcome::Exact {
                    name: query.to_string(),
                },
            );
        }

        if threshold >= 1.0 {
            return MatchResult::new(query, MatchOutcome::NoMatch { best_score: None });
        }

        let mut best: Option<(&String, f64)> = None;
        for name in candidates {
            let score = strsim::jaro_winkler(query, name);
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((name, score));
            }
        }

        match best {
            Some((name, score)) if score > threshold => {
                tracing::trace!(query, name = %name, score, "Fuzzy match");
                MatchResult::new(
                    query,
                    MatchOutcome::Fuzzy {
                        name: name.clone(),
                        score,
                    },
                )
            }
            Some((_, score)) => MatchResult::new(query, MatchOutcome::NoMatch { best_score: Some(score) }),
            None => MatchResult::new(query, MatchOutcome::NoMatch { best_score: None }),
        }
    }

    /// Look up a batch of queries, preserving order
    ///
    /// Repeated queries are only looked up (and reported) once.
    pub fn match_names<S: AsRef<str>>(&self, queries: &[S], threshold: f64) -> Vec<MatchResult> {
        let mut seen = std::collections::HashSet::new();
        let results: Vec<MatchResult> = queries
            .iter()
            .map(AsRef::as_ref)
            .filter(|query| seen.insert(*query))
            .map(|query| self.lookup(query, threshold))
            .collect();

        let matched = results.iter().filter(|r| r.is_match()).count();
        tracing::debug!(
            queries = results.len(),
            matched,
            threshold,
            "Matched query batch"
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::RecordKind;

    fn index_of(names: &[&str]) -> NameIndex {
        let mut index = NameIndex::new();
        for (id, name) in names.iter().enumerate() {
            index.add_name(RecordKind::Compound, id as u64 + 1, name);
        }
        index
    }

    #[test]
    fn test_exact_match() {
        let index = index_of(&["aspirin"]);
        let result = Matcher::new(&index).lookup("aspirin", DEFAULT_THRESHOLD);

        assert!(result.is_exact());
        assert_eq!(result.matched_name(), Some("aspirin"));
        assert_eq!(result.score(), Some(1.0));
    }

    #[test]
    fn test_exact_match_at_any_threshold() {
        let names = ["aspirin", "CC(=O)OC1=CC=CC=C1C(=O)O", "4-methoxy-1H-indole-3-carbaldehyde"];
        let index = index_of(&names);
        let matcher = Matcher::new(&index);

        for name in names {
            for threshold in [0.0, 0.5, 0.99, 1.0, 1.5] {
                let result = matcher.lookup(name, threshold);
                assert!(result.is_exact(), "{name} at {threshold}");
                assert_eq!(result.score(), Some(1.0));
            }
        }
    }

    #[test]
    fn test_fuzzy_match_above_threshold() {
        let index = index_of(&["aspirin"]);
        let result = Matcher::new(&index).lookup("aspirim", 0.90);

        assert!(!result.is_exact());
        assert_eq!(result.matched_name(), Some("aspirin"));
        assert!(result.score().unwrap() > 0.90);
    }

    #[test]
    fn test_fuzzy_match_rejected_by_strict_threshold() {
        let index = index_of(&["aspirin"]);
        let matcher = Matcher::new(&index);

        let result = matcher.lookup("aspirim", 0.999);
        assert!(!result.is_match());
        assert!(result.score().unwrap() < 0.999);

        assert!(matcher.lookup("aspirin", 0.99).is_exact());
    }

    #[test]
    fn test_threshold_one_is_exact_only() {
        let index = index_of(&["aspirin", "aspirine"]);
        let matcher = Matcher::new(&index);

        for query in ["aspirim", "aspirin ", "Aspirin", "asp"] {
            let result = matcher.lookup(query, 1.0);
            assert!(!result.is_match(), "{query}");
            assert_eq!(result.score(), None);
        }
    }

    #[test]
    fn test_ring_locant_substitution_is_not_matched() {
        let index = index_of(&["4-methoxy-1H-indole-3-carbaldehyde"]);
        let result = Matcher::new(&index).lookup("4-methoxy-2H-indole-3-carbaldehyde", DEFAULT_THRESHOLD);

        assert!(!result.is_match());
        assert!(result.score().unwrap() < DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_different_buckets_never_match() {
        let index = index_of(&["xaspirin"]);
        let matcher = Matcher::new(&index);

        for threshold in [0.0, 0.5, 0.9] {
            assert!(!matcher.lookup("aspirin", threshold).is_match());
        }
    }

    #[test]
    fn test_prefix_case_shares_bucket() {
        let index = index_of(&["Aspirin"]);
        let result = Matcher::new(&index).lookup("aspirin", 0.8);

        assert_eq!(result.matched_name(), Some("Aspirin"));
        assert!(!result.is_exact());
    }

    #[test]
    fn test_ties_prefer_first_inserted() {
        // Both candidates differ from the query by one trailing character.
        let index = index_of(&["abcdx", "abcdy"]);
        let result = Matcher::new(&index).lookup("abcdz", 0.5);
        assert_eq!(result.matched_name(), Some("abcdx"));

        let index = index_of(&["abcdy", "abcdx"]);
        let result = Matcher::new(&index).lookup("abcdz", 0.5);
        assert_eq!(result.matched_name(), Some("abcdy"));
    }

    #[test]
    fn test_best_candidate_wins() {
        let index = index_of(&["ethanal", "ethanol", "ethane"]);
        let result = Matcher::new(&index).lookup("ethanoll", 0.8);
        assert_eq!(result.matched_name(), Some("ethanol"));
    }

    #[test]
    fn test_empty_index() {
        let index = NameIndex::new();
        let result = Matcher::new(&index).lookup("aspirin", 0.0);
        assert_eq!(result.outcome, MatchOutcome::NoMatch { best_score: None });
    }

    #[test]
    fn test_match_names_preserves_order_and_dedups() {
        let index = index_of(&["aspirin", "caffeine"]);
        let results = Matcher::new(&index).match_names(
            &["caffeine", "unknown", "aspirin", "caffeine"],
            DEFAULT_THRESHOLD,
        );

        let queries: Vec<&str> = results.iter().map(|r| r.query.as_str()).collect();
        assert_eq!(queries, vec!["caffeine", "unknown", "aspirin"]);
        assert!(results[0].is_exact());
        assert!(!results[1].is_match());
        assert!(results[2].is_exact());
    }

    #[test]
    fn test_match_result_serializes_flat() {
        let result = MatchResult::new(
            "aspirim",
            MatchOutcome::Fuzzy {
                name: "aspirin".to_string(),
                score: 0.95,
            },
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["query"], "aspirim");
        assert_eq!(json["outcome"], "fuzzy");
        assert_eq!(json["name"], "aspirin");
    }
}
