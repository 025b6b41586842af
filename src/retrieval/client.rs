//! Retrieval job client
//!
//! Drives one job through submit → poll → validate → download. Each call owns
//! its [`RetrievalJob`]; independent jobs can run concurrently through
//! [`RetrievalClient::spawn_fetch`].

use super::download::{Downloader, WgetDownloader};
use super::job::{JobState, RetrievalJob};
use super::location::validate_location;
use super::policy::{CancelToken, PollPolicy};
use super::service::{FetchRequest, FetchService, PcFetchConfig, PcFetchService};
use super::{RetrievalError, RetrievalResult, RetrieveMode};
use crate::index::RecordKind;
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;
use uuid::Uuid;

/// Outcome of a completed retrieval
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalReport {
    pub job_id: Uuid,
    pub identifiers: Vec<u64>,
    pub kind: RecordKind,
    pub mode: RetrieveMode,
    /// Validated result location
    pub location: String,
    pub destination: PathBuf,
    pub poll_attempts: u32,
    pub elapsed_ms: u64,
    /// Size of the written file
    pub bytes: u64,
}

/// Everything one spawned job needs
#[derive(Debug, Clone)]
pub struct FetchJob {
    pub identifiers: Vec<u64>,
    pub destination: PathBuf,
    pub kind: RecordKind,
    pub mode: RetrieveMode,
    pub delay_override: Option<Duration>,
}

/// Client for the pc_fetch submit/poll/download protocol
#[derive(Clone)]
pub struct RetrievalClient {
    service: Arc<dyn FetchService>,
    downloader: Arc<dyn Downloader>,
    policy: PollPolicy,
}

impl RetrievalClient {
    pub fn new(service: Arc<dyn FetchService>, downloader: Arc<dyn Downloader>, policy: PollPolicy) -> Self {
        Self {
            service,
            downloader,
            policy,
        }
    }

    /// Client against the real pc_fetch endpoint, transferring with `wget`
    pub fn pc_fetch(config: &PcFetchConfig, downloader: WgetDownloader, policy: PollPolicy) -> RetrievalResult<Self> {
        let service = PcFetchService::new(config)?;
        Ok(Self::new(Arc::new(service), Arc::new(downloader), policy))
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Submit `identifiers` and write the finished result to `destination`
    pub async fn submit_and_fetch(
        &self,
        identifiers: &[u64],
        destination: impl AsRef<Path>,
        kind: RecordKind,
        mode: RetrieveMode,
        delay_override: Option<Duration>,
    ) -> RetrievalResult<RetrievalReport> {
        self.submit_and_fetch_with_cancel(identifiers, destination, kind, mode, delay_override, &CancelToken::new())
            .await
    }

    /// Like [`submit_and_fetch`](Self::submit_and_fetch), stopping with
    /// [`RetrievalError::Cancelled`] once `cancel` fires
    pub async fn submit_and_fetch_with_cancel(
        &self,
        identifiers: &[u64],
        destination: impl AsRef<Path>,
        kind: RecordKind,
        mode: RetrieveMode,
        delay_override: Option<Duration>,
        cancel: &CancelToken,
    ) -> RetrievalResult<RetrievalReport> {
        if identifiers.is_empty() {
            return Err(RetrievalError::EmptyBatch);
        }

        let mut job = RetrievalJob::new(identifiers.to_vec(), kind, mode, destination.as_ref().to_path_buf());
        tracing::info!(
            job_id = %job.id(),
            kind = %kind,
            mode = %mode,
            identifiers = identifiers.len(),
            destination = %job.destination().display(),
            "Submitting retrieval job"
        );

        match self.drive(&mut job, delay_override, cancel).await {
            Ok(report) => {
                tracing::info!(
                    job_id = %report.job_id,
                    poll_attempts = report.poll_attempts,
                    bytes = report.bytes,
                    elapsed_ms = report.elapsed_ms,
                    "Retrieval complete"
                );
                Ok(report)
            }
            Err(e) => {
                let state = job.state();
                job.fail();
                tracing::warn!(job_id = %job.id(), state = %state, error = %e, "Retrieval failed");
                Err(e)
            }
        }
    }

    /// Run `job` on its own tokio task
    pub fn spawn_fetch(&self, job: FetchJob, cancel: CancelToken) -> JoinHandle<RetrievalResult<RetrievalReport>> {
        let client = self.clone();
        tokio::spawn(async move {
            client
                .submit_and_fetch_with_cancel(
                    &job.identifiers,
                    &job.destination,
                    job.kind,
                    job.mode,
                    job.delay_override,
                    &cancel,
                )
                .await
        })
    }

    async fn drive(
        &self,
        job: &mut RetrievalJob,
        delay_override: Option<Duration>,
        cancel: &CancelToken,
    ) -> RetrievalResult<RetrievalReport> {
        let request = FetchRequest {
            id_batch: job.id_batch(),
            kind: job.kind(),
            mode: job.mode(),
        };
        let mut page = cancellable(cancel, self.service.submit(&request)).await?;

        let delay = self.policy.delay(delay_override);
        let mut poll_location: Option<Url> = None;

        let raw = loop {
            if let Some(location) = page.result_location.take() {
                break location;
            }
            if let Some(next) = page.poll_location.take() {
                poll_location = Some(next);
            }
            let Some(location) = poll_location.as_ref() else {
                return Err(RetrievalError::Protocol(
                    "response carries neither a result location nor a poll location".to_string(),
                ));
            };

            self.policy.check(job.poll_attempts() + 1, job.elapsed())?;
            job.transition(JobState::Polling)?;
            tracing::debug!(
                job_id = %job.id(),
                attempt = job.poll_attempts(),
                delay_ms = delay.as_millis() as u64,
                "Waiting for result location"
            );

            cancellable(cancel, async {
                tokio::time::sleep(delay).await;
                Ok(())
            })
            .await?;
            page = cancellable(cancel, self.service.poll(location)).await?;
        };

        job.transition(JobState::LinkReady)?;
        let url = validate_location(&raw)?;
        job.start_download(url.clone())?;

        let bytes = self.transfer(&url, job.destination(), cancel).await?;
        job.transition(JobState::Complete)?;

        Ok(RetrievalReport {
            job_id: job.id(),
            identifiers: job.identifiers().to_vec(),
            kind: job.kind(),
            mode: job.mode(),
            location: url.to_string(),
            destination: job.destination().to_path_buf(),
            poll_attempts: job.poll_attempts(),
            elapsed_ms: job.elapsed().as_millis() as u64,
            bytes,
        })
    }

    /// Download into a temporary sibling of `destination`, renamed on success
    async fn transfer(&self, url: &Url, destination: &Path, cancel: &CancelToken) -> RetrievalResult<u64> {
        let dir = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let temp = tempfile::Builder::new()
            .prefix(".pubchem-fetch-")
            .tempfile_in(dir)?
            .into_temp_path();

        cancellable(cancel, self.downloader.download(url, &temp)).await?;

        let bytes = tokio::fs::metadata(&temp).await?.len();
        temp.persist(destination).map_err(|e| RetrievalError::Io(e.error))?;
        Ok(bytes)
    }
}

async fn cancellable<T, F>(cancel: &CancelToken, future: F) -> RetrievalResult<T>
where
    F: Future<Output = RetrievalResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RetrievalError::Cancelled),
        result = future => result,
    }
}
