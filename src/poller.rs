//! The status poll loop.
//!
//! [`poll`] queries a [`StatusSource`] until the job settles, the wait
//! budget runs out, or the [`CancellationToken`] fires. Time is read and
//! slept through a [`Clock`] so the loop can be driven by virtual time.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::kie::{ResultPayload, StatusSource};
use crate::state_machine::{Job, JobState, PollPolicy, StateMachine, Transition};

pub trait Clock {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Real time, backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Receives progress while a job is still waiting.
pub trait PollObserver {
    fn waiting(&self, _task_id: &str, _state: &JobState, _elapsed: Duration) {}
}

/// Observer that ignores progress.
pub struct Silent;

impl PollObserver for Silent {}

/// Result locator(s) of a finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLocator {
    urls: Vec<String>,
}

impl ResultLocator {
    /// The URL callers download. The list is never empty.
    pub fn primary(&self) -> &str {
        &self.urls[0]
    }
}

/// Poll `task_id` until it settles.
///
/// Returns `Ok(Some(_))` on success with at least one URL and `Ok(None)`
/// when the job succeeded but its result payload is absent, empty or
/// malformed. A reported failure is [`Error::JobFailed`], an exhausted
/// budget [`Error::PollTimeout`], a fired token [`Error::Cancelled`].
///
/// Errors from `source` never end the loop: they are logged and the job is
/// treated as still waiting.
pub async fn poll<S, C, O>(
    source: &S,
    clock: &C,
    task_id: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    observer: &O,
) -> Result<Option<ResultLocator>>
where
    S: StatusSource,
    C: Clock,
    O: PollObserver + ?Sized,
{
    let (job, outcome) = poll_job(source, clock, task_id, policy, cancel, observer).await;
    tracing::debug!(
        task_id,
        state = %job.poll_state,
        reports = job.reports,
        "Poll loop finished",
    );
    outcome
}

/// Same as [`poll`], also handing back the [`Job`] with its state history.
pub async fn poll_job<S, C, O>(
    source: &S,
    clock: &C,
    task_id: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    observer: &O,
) -> (Job, Result<Option<ResultLocator>>)
where
    S: StatusSource,
    C: Clock,
    O: PollObserver + ?Sized,
{
    let mut job = Job::new(task_id);
    let start = clock.now();
    let mut attempt = 0u32;

    loop {
        let elapsed = clock.now().saturating_duration_since(start);
        if elapsed >= policy.max_wait {
            return timed_out(job, elapsed, policy);
        }
        if cancel.is_cancelled() {
            return (job, Err(Error::Cancelled));
        }

        attempt += 1;
        match source.record_info(task_id).await {
            Ok(report) => match StateMachine::next(&mut job, &report) {
                Transition::Succeed(payload) => {
                    let outcome = Ok(locator_from(task_id, payload));
                    return (job, outcome);
                }
                Transition::Fail(message) => {
                    tracing::warn!(task_id, %message, "Job failed");
                    return (job, Err(Error::JobFailed(message)));
                }
                Transition::Wait(state) => {
                    tracing::debug!(task_id, %state, elapsed_secs = elapsed.as_secs(), "Job in progress");
                    observer.waiting(task_id, &state, elapsed);
                }
                Transition::TimeOut => {}
            },
            Err(e) => {
                tracing::warn!(task_id, attempt, error = %e, "Status query failed, still waiting");
            }
        }

        // The query itself may have used up the budget.
        let elapsed = clock.now().saturating_duration_since(start);
        let Some(remaining) = policy.max_wait.checked_sub(elapsed).filter(|r| !r.is_zero()) else {
            return timed_out(job, elapsed, policy);
        };
        let delay = policy.delay_for_attempt(attempt).min(remaining);
        tokio::select! {
            _ = cancel.cancelled() => return (job, Err(Error::Cancelled)),
            _ = clock.sleep(delay) => {}
        }
    }
}

fn timed_out(
    mut job: Job,
    elapsed: Duration,
    policy: &PollPolicy,
) -> (Job, Result<Option<ResultLocator>>) {
    StateMachine::time_out(&mut job);
    tracing::warn!(task_id = %job.task_id, waited_secs = elapsed.as_secs(), "Job timed out");
    let err = Error::PollTimeout {
        task_id: job.task_id.clone(),
        waited: policy.max_wait,
    };
    (job, Err(err))
}

fn locator_from(task_id: &str, payload: ResultPayload) -> Option<ResultLocator> {
    match payload {
        ResultPayload::Urls(urls) => {
            if urls.len() > 1 {
                tracing::debug!(task_id, count = urls.len(), "Job returned several results");
            }
            Some(ResultLocator { urls })
        }
        ResultPayload::Absent => {
            tracing::warn!(task_id, "Job succeeded without a result payload");
            None
        }
        ResultPayload::Empty => {
            tracing::warn!(task_id, "Job succeeded with an empty result list");
            None
        }
        ResultPayload::Malformed(reason) => {
            tracing::warn!(task_id, %reason, "Job result payload could not be parsed");
            None
        }
    }
}
