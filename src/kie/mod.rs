pub mod client;
pub mod error;
pub mod types;

pub use client::{ClientConfig, JobClient, StatusSource};
pub use error::KieError;
pub use types::{GenerationRequest, RecordInfo, ResultPayload};
