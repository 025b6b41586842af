//! Retrieval job state machine
//!
//! ```text
//! Submitted → Polling ↺ → LinkReady → Downloading → Complete
//! Submitted ───────────→ LinkReady            (immediate result location)
//! any non-terminal state → Failed
//! ```
//!
//! `Complete` and `Failed` are terminal; a job is never reused.

use super::{RetrievalError, RetrievalResult, RetrieveMode};
use crate::index::RecordKind;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use url::Url;
use uuid::Uuid;

/// Lifecycle state of a retrieval job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Submitted,
    Polling,
    LinkReady,
    Downloading,
    Complete,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;

        match (self, next) {
            (Complete | Failed, _) => false,
            (_, Failed) => true,
            (Submitted, Polling | LinkReady) => true,
            (Polling, Polling | LinkReady) => true,
            (LinkReady, Downloading) => true,
            (Downloading, Complete) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Submitted => "submitted",
            JobState::Polling => "polling",
            JobState::LinkReady => "link_ready",
            JobState::Downloading => "downloading",
            JobState::Complete => "complete",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One outstanding request to the remote service
#[derive(Debug)]
pub struct RetrievalJob {
    id: Uuid,
    identifiers: Vec<u64>,
    kind: RecordKind,
    mode: RetrieveMode,
    destination: PathBuf,
    state: JobState,
    poll_attempts: u32,
    result_location: Option<Url>,
    started: Instant,
}

impl RetrievalJob {
    /// Create a job in the `Submitted` state
    pub fn new(identifiers: Vec<u64>, kind: RecordKind, mode: RetrieveMode, destination: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            identifiers,
            kind,
            mode,
            destination,
            state: JobState::Submitted,
            poll_attempts: 0,
            result_location: None,
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn identifiers(&self) -> &[u64] {
        &self.identifiers
    }

    /// Identifiers in the service's batch format (comma-joined)
    pub fn id_batch(&self) -> String {
        self.identifiers
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn mode(&self) -> RetrieveMode {
        self.mode
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn poll_attempts(&self) -> u32 {
        self.poll_attempts
    }

    pub fn result_location(&self) -> Option<&Url> {
        self.result_location.as_ref()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    pub fn transition(&mut self, next: JobState) -> RetrievalResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(RetrievalError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }

        tracing::debug!(job_id = %self.id, from = %self.state, to = %next, "Job transition");
        if next == JobState::Polling {
            self.poll_attempts += 1;
        }
        self.state = next;
        Ok(())
    }

    /// Accept the validated result location and move on to `Downloading`
    pub fn start_download(&mut self, location: Url) -> RetrievalResult<()> {
        self.transition(JobState::Downloading)?;
        self.result_location = Some(location);
        Ok(())
    }

    /// Mark the job failed; no-op when already terminal
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = JobState::Failed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> RetrievalJob {
        RetrievalJob::new(
            vec![2244, 887, 2519],
            RecordKind::Compound,
            RetrieveMode::Sdf,
            PathBuf::from("out.sdf"),
        )
    }

    #[test]
    fn test_new_job() {
        let job = job();
        assert_eq!(job.state(), JobState::Submitted);
        assert_eq!(job.id_batch(), "2244,887,2519");
        assert_eq!(job.poll_attempts(), 0);
        assert!(job.result_location().is_none());
    }

    #[test]
    fn test_happy_path_with_polling() {
        let mut job = job();
        job.transition(JobState::Polling).unwrap();
        job.transition(JobState::Polling).unwrap();
        job.transition(JobState::LinkReady).unwrap();
        job.start_download(Url::parse("ftp://ftp.ncbi.nlm.nih.gov/a.sdf").unwrap())
            .unwrap();
        job.transition(JobState::Complete).unwrap();

        assert_eq!(job.poll_attempts(), 2);
        assert_eq!(job.state(), JobState::Complete);
        assert!(job.result_location().is_some());
    }

    #[test]
    fn test_immediate_link() {
        let mut job = job();
        assert!(job.transition(JobState::LinkReady).is_ok());
        assert_eq!(job.poll_attempts(), 0);
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!JobState::Submitted.can_transition_to(JobState::Downloading));
        assert!(!JobState::Submitted.can_transition_to(JobState::Complete));
        assert!(!JobState::Polling.can_transition_to(JobState::Downloading));
        assert!(!JobState::LinkReady.can_transition_to(JobState::Polling));
        assert!(!JobState::Downloading.can_transition_to(JobState::LinkReady));

        let mut job = job();
        let err = job.transition(JobState::Complete).unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidTransition { .. }));
        assert_eq!(job.state(), JobState::Submitted);
    }

    #[test]
    fn test_failed_reachable_from_non_terminal() {
        for state in [
            JobState::Submitted,
            JobState::Polling,
            JobState::LinkReady,
            JobState::Downloading,
        ] {
            assert!(state.can_transition_to(JobState::Failed), "{state}");
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [JobState::Complete, JobState::Failed] {
            for next in [
                JobState::Submitted,
                JobState::Polling,
                JobState::LinkReady,
                JobState::Downloading,
                JobState::Complete,
                JobState::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_fail() {
        let mut job = job();
        job.fail();
        assert_eq!(job.state(), JobState::Failed);
        assert!(job.transition(JobState::Polling).is_err());
    }
}
