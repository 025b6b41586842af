//! Result transfer
//!
//! Transfers hand a validated URL to an external program. The URL is passed
//! as a single argument vector element, never through a shell.

use super::{RetrievalError, RetrievalResult};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use url::Url;

/// Default transfer program
pub const DEFAULT_PROGRAM: &str = "wget";

/// Moves a validated result location to a local file
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &Url, target: &Path) -> RetrievalResult<()>;
}

/// [`Downloader`] that shells out to `wget -q -O <target> <url>`
#[derive(Debug, Clone)]
pub struct WgetDownloader {
    program: String,
}

impl Default for WgetDownloader {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl WgetDownloader {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl Downloader for WgetDownloader {
    async fn download(&self, url: &Url, target: &Path) -> RetrievalResult<()> {
        tracing::debug!(program = %self.program, %url, target = %target.display(), "Starting transfer");

        let output = Command::new(&self.program)
            .arg("-q")
            .arg("-O")
            .arg(target)
            .arg(url.as_str())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RetrievalError::Transfer(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RetrievalError::Transfer(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_program() {
        assert_eq!(WgetDownloader::default().program(), "wget");
    }

    #[tokio::test]
    async fn test_missing_program_is_transfer_error() {
        let dir = tempdir().unwrap();
        let downloader = WgetDownloader::new("pubchem-resolver-no-such-program");
        let url = Url::parse("ftp://ftp.ncbi.nlm.nih.gov/a.sdf").unwrap();

        let err = downloader
            .download(&url, &dir.path().join("a.sdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Transfer(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_program_is_transfer_error() {
        let dir = tempdir().unwrap();
        let downloader = WgetDownloader::new("false");
        let url = Url::parse("ftp://ftp.ncbi.nlm.nih.gov/a.sdf").unwrap();

        let err = downloader
            .download(&url, &dir.path().join("a.sdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Transfer(_)));
    }
}
