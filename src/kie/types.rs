//! Wire types of the kie.ai jobs API.
//!
//! Every endpoint answers with an [`Envelope`]: a status `code`, an optional
//! `msg` and a `data` payload. The status payload carries the job result as
//! a JSON document *encoded inside a string* (`resultJson`), which is decoded
//! in a second pass by [`RecordInfo::result_payload`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope code the service uses for success.
pub const CODE_OK: i64 = 200;

/// Body of `POST /createTask`.
///
/// `input` is free-form; the service interprets it according to `model`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: String,
    pub input: Map<String, Value>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            input: Map::new(),
        }
    }

    /// Adds one input field, replacing any previous value under `key`.
    pub fn with_input(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.input.insert(key.to_string(), value.into());
        self
    }
}

/// Response wrapper shared by every endpoint.
///
/// Decoded loosely: a rejection may come with a string `code`, no `code` at
/// all, or a `data` that is not an object, and its `msg` must survive all
/// of those shapes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub msg: Option<Value>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl Envelope {
    /// Numeric `code`, if the service sent one.
    pub fn code(&self) -> Option<i64> {
        self.code.as_ref().and_then(Value::as_i64)
    }

    /// Only an integer `code` of [`CODE_OK`] signals success.
    pub fn is_ok(&self) -> bool {
        self.code() == Some(CODE_OK)
    }

    /// The non-blank `msg`, whatever JSON type it arrived as.
    pub fn message(&self) -> Option<String> {
        let text = match self.msg.as_ref()? {
            Value::Null => return None,
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        };
        (!text.is_empty()).then_some(text)
    }

    /// `data.taskId` of a `createTask` answer, when it is a non-blank string.
    pub fn task_id(&self) -> Option<&str> {
        self.data
            .as_ref()?
            .get("taskId")?
            .as_str()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// `data` decoded as a status record. A missing or null `data` is an
    /// empty record.
    pub fn record_info(&self) -> Result<RecordInfo, serde_json::Error> {
        match &self.data {
            None | Some(Value::Null) => Ok(RecordInfo::default()),
            Some(data) => serde_json::from_value(data.clone()),
        }
    }
}

/// `data` of `GET /recordInfo`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordInfo {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub result_json: Option<String>,
    #[serde(default)]
    pub fail_msg: Option<String>,
}

/// Outcome of decoding the nested `resultJson` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultPayload {
    /// No `resultJson` field, or an empty string.
    Absent,
    /// The string is not the expected JSON document.
    Malformed(String),
    /// Well-formed, but `resultUrls` is missing or empty.
    Empty,
    Urls(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultJson {
    #[serde(default)]
    result_urls: Vec<String>,
}

impl RecordInfo {
    pub fn result_payload(&self) -> ResultPayload {
        let raw = match self.result_json.as_deref().map(str::trim) {
            None | Some("") => return ResultPayload::Absent,
            Some(raw) => raw,
        };
        match serde_json::from_str::<ResultJson>(raw) {
            Ok(parsed) => {
                let urls: Vec<String> = parsed
                    .result_urls
                    .into_iter()
                    .filter(|u| !u.trim().is_empty())
                    .collect();
                if urls.is_empty() {
                    ResultPayload::Empty
                } else {
                    ResultPayload::Urls(urls)
                }
            }
            Err(e) => ResultPayload::Malformed(e.to_string()),
        }
    }

    /// The failure reason, if the service gave a non-blank one.
    pub fn failure_message(&self) -> Option<&str> {
        self.fail_msg
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}
