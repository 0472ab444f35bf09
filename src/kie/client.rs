use std::time::Duration;

use reqwest::Client;

use super::error::KieError;
use super::types::{Envelope, GenerationRequest, RecordInfo};
use crate::error::{Error, Result, UNKNOWN_ERROR};

pub const API_BASE: &str = "https://api.kie.ai/api/v1/jobs";

/// Everything the client needs, passed explicitly instead of read from globals.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the jobs API, without a trailing slash.
    pub api_base: String,
    /// Bearer token. Must not be blank.
    pub api_key: String,
    pub connect_timeout: Duration,
    /// Per-request timeout of `createTask`.
    pub submit_timeout: Duration,
    /// Per-request timeout of every `recordInfo` query.
    pub status_timeout: Duration,
    /// Per-request timeout of the artifact download.
    pub fetch_timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: API_BASE.to_string(),
            api_key: api_key.into(),
            connect_timeout: Duration::from_secs(10),
            submit_timeout: Duration::from_secs(30),
            status_timeout: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(60),
        }
    }

    /// Point the client at a custom base URL (useful for testing).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

/// Anything that can report the current status of a job.
///
/// Implemented by [`JobClient`]; the poll loop only depends on this seam.
pub trait StatusSource {
    async fn record_info(&self, task_id: &str) -> std::result::Result<RecordInfo, KieError>;
}

/// HTTP client for the jobs API: submission, status queries and artifact
/// download. One instance reuses its connection pool across a whole run.
pub struct JobClient {
    config: ClientConfig,
    client: Client,
}

impl JobClient {
    /// Build a client. Fails with [`Error::Configuration`] when the API key is
    /// blank, so no request is ever sent without credentials.
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(Error::Configuration(
                "KIE_API_KEY is not set (add it to .env or export it)".into(),
            ));
        }
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(KieError::from)?;
        Ok(Self { config, client })
    }

    /// Submit a generation job and return its task id.
    ///
    /// Transport failures surface as [`Error::Api`]; an envelope that does not
    /// signal success, or carries no task id, is [`Error::SubmissionRejected`].
    pub async fn submit(&self, req: &GenerationRequest) -> Result<String> {
        let url = format!("{}/createTask", self.config.api_base);
        tracing::debug!(model = %req.model, %url, "Submitting generation job");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.submit_timeout)
            .json(req)
            .send()
            .await
            .map_err(KieError::from)?;

        let envelope = read_envelope(response).await?;
        match envelope.task_id() {
            Some(id) if envelope.is_ok() => {
                tracing::info!(task_id = %id, model = %req.model, "Job submitted");
                Ok(id.to_string())
            }
            _ => {
                let message = envelope
                    .message()
                    .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
                tracing::warn!(code = ?envelope.code, %message, "Job submission rejected");
                Err(Error::SubmissionRejected(message))
            }
        }
    }

    /// Download an artifact. Any failure is [`Error::FetchFailed`]; there is no retry.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let fetch_failed = |reason: String| Error::FetchFailed {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .timeout(self.config.fetch_timeout)
            .send()
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_failed(format!("HTTP {}", status.as_u16())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;
        tracing::info!(%url, bytes = bytes.len(), "Artifact downloaded");
        Ok(bytes.to_vec())
    }
}

impl StatusSource for JobClient {
    async fn record_info(&self, task_id: &str) -> std::result::Result<RecordInfo, KieError> {
        let url = format!("{}/recordInfo", self.config.api_base);
        let response = self
            .client
            .get(&url)
            .query(&[("taskId", task_id)])
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.status_timeout)
            .send()
            .await?;

        let envelope = read_envelope(response).await?;
        if !envelope.is_ok() {
            return Err(KieError::Envelope {
                code: envelope.code().unwrap_or_default(),
                message: envelope
                    .message()
                    .unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
            });
        }
        Ok(envelope.record_info()?)
    }
}

async fn read_envelope(response: reqwest::Response) -> std::result::Result<Envelope, KieError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(KieError::Http {
            status: status.as_u16(),
            body,
        });
    }
    Ok(serde_json::from_str(&body)?)
}
