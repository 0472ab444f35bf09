use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{JobState, PollState};

/// How the delay between two status queries grows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Always wait the base interval.
    Fixed,
    /// Multiply the delay after every query, up to `max_interval`.
    Exponential { multiplier: f64, max_interval: Duration },
}

/// Wait budget and delay schedule of one poll loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Wall-clock budget, measured from the first status query.
    pub max_wait: Duration,
    /// Base delay between two status queries.
    pub interval: Duration,
    pub backoff: Backoff,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(120), Duration::from_secs(2))
    }
}

impl PollPolicy {
    pub fn fixed(max_wait: Duration, interval: Duration) -> Self {
        Self {
            max_wait,
            interval,
            backoff: Backoff::Fixed,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay to wait after the `attempt`-th query (1-based).
    ///
    /// Never shorter than `interval`. Exponential backoff yields
    /// `interval * multiplier^(attempt - 1)`, clamped to `max_interval`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential {
                multiplier,
                max_interval,
            } => {
                let factor = multiplier.max(1.0).powi(attempt.saturating_sub(1) as i32);
                let scaled = self.interval.as_secs_f64() * factor;
                let delay = Duration::try_from_secs_f64(scaled.min(max_interval.as_secs_f64()))
                    .unwrap_or(max_interval);
                delay.max(self.interval)
            }
        }
    }
}

/// One remote job, as seen by a single poll loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub task_id: String,
    pub poll_state: PollState,
    /// Distinct consecutive state tokens reported by the service.
    pub state_history: Vec<JobState>,
    pub result_urls: Vec<String>,
    pub fail_msg: Option<String>,
    /// Number of status reports applied.
    pub reports: u32,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            poll_state: PollState::Waiting,
            state_history: Vec::new(),
            result_urls: Vec::new(),
            fail_msg: None,
            reports: 0,
            created_at: Utc::now(),
        }
    }

    pub(crate) fn observe(&mut self, state: JobState) {
        self.reports += 1;
        if self.state_history.last() != Some(&state) {
            self.state_history.push(state);
        }
    }

    pub fn current_state(&self) -> Option<&JobState> {
        self.state_history.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_creation_defaults() {
        let job = Job::new("task_1");
        assert_eq!(job.task_id, "task_1");
        assert_eq!(job.poll_state, PollState::Waiting);
        assert!(job.state_history.is_empty());
        assert!(job.result_urls.is_empty());
        assert_eq!(job.reports, 0);
    }

    #[test]
    fn observe_collapses_repeated_states() {
        let mut job = Job::new("t");
        job.observe(JobState::Pending);
        job.observe(JobState::Processing);
        job.observe(JobState::Processing);
        job.observe(JobState::Success);
        assert_eq!(
            job.state_history,
            vec![JobState::Pending, JobState::Processing, JobState::Success]
        );
        assert_eq!(job.reports, 4);
        assert_eq!(job.current_state(), Some(&JobState::Success));
    }

    #[test]
    fn fixed_policy_keeps_interval() {
        let policy = PollPolicy::fixed(Duration::from_secs(180), Duration::from_secs(3));
        for attempt in 1..10 {
            assert_eq!(policy.delay_for_attempt(attempt), Duration::from_secs(3));
        }
    }

    #[test]
    fn exponential_policy_grows_and_clamps() {
        let policy = PollPolicy::fixed(Duration::from_secs(600), Duration::from_secs(1))
            .with_backoff(Backoff::Exponential {
                multiplier: 2.0,
                max_interval: Duration::from_secs(10),
            });
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(500), Duration::from_secs(10));
    }

    #[test]
    fn exponential_policy_never_below_interval() {
        let policy = PollPolicy::fixed(Duration::from_secs(60), Duration::from_secs(5))
            .with_backoff(Backoff::Exponential {
                multiplier: 0.5,
                max_interval: Duration::from_secs(1),
            });
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(5));
    }

    #[test]
    fn exponential_policy_with_unbounded_cap_does_not_overflow() {
        let policy = PollPolicy::fixed(Duration::from_secs(600), Duration::from_secs(5))
            .with_backoff(Backoff::Exponential {
                multiplier: 2.0,
                max_interval: Duration::from_secs(u64::MAX),
            });
        assert_eq!(policy.delay_for_attempt(80), Duration::from_secs(u64::MAX));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(10));
    }

    #[test]
    fn job_serialization_roundtrip() {
        let mut job = Job::new("task_rt");
        job.observe(JobState::Other("queued".into()));
        let json = serde_json::to_string(&job).unwrap();
        let parsed: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.task_id, "task_rt");
        assert_eq!(parsed.state_history, vec![JobState::Other("queued".into())]);
    }
}
