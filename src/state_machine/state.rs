use std::fmt;

use serde::{Deserialize, Serialize};

use super::job::Job;
use crate::error::UNKNOWN_ERROR;
use crate::kie::{RecordInfo, ResultPayload};

/// A state token as reported by the remote service.
///
/// The service is authoritative over this set, so unknown tokens are kept
/// verbatim rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobState {
    Pending,
    Processing,
    Running,
    Success,
    Fail,
    Other(String),
}

impl JobState {
    pub fn parse(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "pending" => JobState::Pending,
            "processing" => JobState::Processing,
            "running" => JobState::Running,
            "success" => JobState::Success,
            "fail" => JobState::Fail,
            _ => JobState::Other(token.trim().to_string()),
        }
    }
}

impl From<String> for JobState {
    fn from(token: String) -> Self {
        JobState::parse(&token)
    }
}

impl From<JobState> for String {
    fn from(state: JobState) -> Self {
        state.to_string()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Processing => write!(f, "processing"),
            JobState::Running => write!(f, "running"),
            JobState::Success => write!(f, "success"),
            JobState::Fail => write!(f, "fail"),
            JobState::Other(token) if token.is_empty() => write!(f, "unknown"),
            JobState::Other(token) => write!(f, "{token}"),
        }
    }
}

/// The poll loop's own view of a job.
///
/// Flows `Waiting → Success | Failed | TimedOut`; the three right-hand
/// states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollState {
    Waiting,
    Success,
    Failed,
    TimedOut,
}

impl PollState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PollState::Waiting)
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollState::Waiting => write!(f, "WAITING"),
            PollState::Success => write!(f, "SUCCESS"),
            PollState::Failed => write!(f, "FAILED"),
            PollState::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}

/// The result of feeding one status report into the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Still in progress; poll again after the next delay.
    Wait(JobState),
    /// Finished. The payload may still turn out to hold no URL.
    Succeed(ResultPayload),
    /// The service reported a terminal failure.
    Fail(String),
    /// The wait budget ran out.
    TimeOut,
}

/// Drives a [`Job`] through the poll states.
pub struct StateMachine;

impl StateMachine {
    /// Classify one status report and apply it to `job`.
    ///
    /// - `success` moves to `Success` and decodes the nested result.
    /// - `fail` moves to `Failed` with the service message or a placeholder.
    /// - Anything else, including unknown or missing tokens, stays `Waiting`.
    ///
    /// A job already in a terminal state is left untouched and the
    /// transition matching that state is returned again.
    pub fn next(job: &mut Job, report: &RecordInfo) -> Transition {
        if job.poll_state.is_terminal() {
            return Self::settled(job);
        }

        let state = JobState::parse(report.state.as_deref().unwrap_or_default());
        job.observe(state.clone());

        match state {
            JobState::Success => {
                let payload = report.result_payload();
                if let ResultPayload::Urls(urls) = &payload {
                    job.result_urls = urls.clone();
                }
                job.poll_state = PollState::Success;
                Transition::Succeed(payload)
            }
            JobState::Fail => {
                let message = report
                    .failure_message()
                    .unwrap_or(UNKNOWN_ERROR)
                    .to_string();
                job.fail_msg = Some(message.clone());
                job.poll_state = PollState::Failed;
                Transition::Fail(message)
            }
            other => Transition::Wait(other),
        }
    }

    /// Mark a waiting job as timed out. Terminal jobs are left untouched.
    pub fn time_out(job: &mut Job) -> Transition {
        if job.poll_state.is_terminal() {
            return Self::settled(job);
        }
        job.poll_state = PollState::TimedOut;
        Transition::TimeOut
    }

    fn settled(job: &Job) -> Transition {
        match job.poll_state {
            PollState::Success if job.result_urls.is_empty() => {
                Transition::Succeed(ResultPayload::Empty)
            }
            PollState::Success => Transition::Succeed(ResultPayload::Urls(job.result_urls.clone())),
            PollState::Failed => Transition::Fail(
                job.fail_msg
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
            ),
            PollState::TimedOut => Transition::TimeOut,
            PollState::Waiting => Transition::Wait(
                job.current_state()
                    .cloned()
                    .unwrap_or(JobState::Other(String::new())),
            ),
        }
    }
}
