mod job;
mod state;

pub use job::{Backoff, Job, PollPolicy};
pub use state::{JobState, PollState, StateMachine, Transition};
