//! Approximate name matching and identifier resolution
//!
//! ## Pipeline
//!
//! 1. [`Matcher`] turns free-text queries into [`MatchResult`]s: an exact
//!    canonical name, a fuzzy (Jaro-Winkler) canonical name, or no match
//! 2. [`resolve`] turns a batch of match results into identifiers of one
//!    [`RecordKind`](crate::index::RecordKind), recording ambiguous names
//!
//! ## Known limitation
//!
//! Candidates are restricted to the bucket of the query (its lowercased
//! three-character prefix). A query whose first three characters differ from
//! its true canonical name is never matched, at any threshold.

mod matcher;
mod resolver;

pub use matcher::{MatchOutcome, MatchResult, Matcher, DEFAULT_THRESHOLD};
pub use resolver::{resolve, AmbiguityPolicy, AmbiguousMatch, Resolution};
