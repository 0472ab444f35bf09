//! Client for asynchronous generative-media jobs.
//!
//! A job is submitted with [`kie::JobClient::submit`], polled to completion
//! with [`poller::poll`] and its artifact downloaded with
//! [`kie::JobClient::fetch`]. [`pipeline::Pipeline`] chains the three over a
//! list of units, skipping units whose output already exists.

pub mod artifact;
pub mod config;
pub mod error;
pub mod kie;
pub mod manifest;
pub mod pipeline;
pub mod poller;
pub mod state_machine;
pub mod units;
pub mod upload;

pub use error::{Error, Result};
