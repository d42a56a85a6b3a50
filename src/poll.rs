//! Blocking-until-terminal wait for asynchronous remote jobs.
//!
//! Index creation, index extension, and assistant runs all finish in the
//! background on the remote side. [`await_completion`] polls a job at a
//! fixed interval until it reports a terminal state. Callers only see the
//! outcome, so a push-based implementation can replace this later without
//! changing them.

use std::future::Future;
use std::time::Duration;

/// One observation of a remote job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus<T> {
    Pending,
    Done(T),
    Failed(String),
}

/// Poll `check` every `interval` until the job is done or failed.
///
/// Errors returned by `check` itself (transport failures) abort the wait.
/// `on_failed` converts a remote job failure into the caller's error type.
/// There is no overall deadline.
pub async fn await_completion<F, Fut, T, E>(
    job: &str,
    interval: Duration,
    mut check: F,
    on_failed: impl FnOnce(String) -> E,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<JobStatus<T>, E>>,
{
    let mut polls = 0u64;
    loop {
        polls += 1;
        match check().await? {
            JobStatus::Done(value) => {
                tracing::debug!(job, polls, "remote job finished");
                return Ok(value);
            }
            JobStatus::Failed(reason) => {
                tracing::warn!(job, polls, %reason, "remote job failed");
                return Err(on_failed(reason));
            }
            JobStatus::Pending => tokio::time::sleep(interval).await,
        }
    }
}
