//! Result location validation
//!
//! The location published by the remote service is handed to an external
//! transfer program, so it is checked before anything else sees it:
//!
//! - only `A-Z a-z 0-9 / : . -` are allowed; any other character rejects the
//!   location outright (it is never cleaned up and retried)
//! - the location must parse as a URL with the `ftp` scheme

use super::{RetrievalError, RetrievalResult};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9/:.\-]").expect("location whitelist pattern"));

/// Validate a raw result location
pub fn validate_location(raw: &str) -> RetrievalResult<Url> {
    let sanitized = UNSAFE_CHARS.replace_all(raw, "");
    if sanitized.len() != raw.len() {
        tracing::error!(
            location = %raw,
            rejected = raw.len() - sanitized.len(),
            "Security: result location contains disallowed characters"
        );
        return Err(unsafe_location(raw, "contains characters outside [A-Za-z0-9/:.-]"));
    }

    let url = Url::parse(raw).map_err(|e| unsafe_location(raw, &format!("not a valid URL: {}", e)))?;
    if url.scheme() != "ftp" {
        tracing::error!(location = %raw, scheme = url.scheme(), "Security: result location is not ftp");
        return Err(unsafe_location(raw, &format!("scheme '{}' is not ftp", url.scheme())));
    }

    Ok(url)
}

fn unsafe_location(raw: &str, reason: &str) -> RetrievalError {
    RetrievalError::UnsafeLocation {
        location: raw.to_string(),
        reason: reason.to_string(),
    }
}
