//! Transport-level errors of the kie.ai jobs client.
//!
//! These describe what went wrong on the wire. Whether a failure is fatal
//! is decided by the caller: submission surfaces them, the poll loop
//! absorbs them and keeps waiting.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KieError {
    /// Non-2xx HTTP response, with the body as returned by the server.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The envelope decoded but its `code` does not signal success. `code`
    /// is 0 when the service sent none, or sent a non-integer one.
    #[error("envelope code {code}: {message}")]
    Envelope { code: i64, message: String },

    /// The response body is not the expected envelope.
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    /// DNS, connection refused, timeout.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}
