//! Query request/result types and the bridge wire format

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Outcome of one query, always carrying the request id it answers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryResult {
    Success { response: String, request_id: String },
    Failure { error: String, request_id: String },
}

impl QueryResult {
    pub fn success(response: impl Into<String>, request_id: impl Into<String>) -> Self {
        QueryResult::Success {
            response: response.into(),
            request_id: request_id.into(),
        }
    }

    pub fn failure(error: impl Into<String>, request_id: impl Into<String>) -> Self {
        QueryResult::Failure {
            error: error.into(),
            request_id: request_id.into(),
        }
    }

    pub fn request_id(&self) -> &str {
        match self {
            QueryResult::Success { request_id, .. } | QueryResult::Failure { request_id, .. } => {
                request_id
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, QueryResult::Success { .. })
    }

    pub fn response(&self) -> Option<&str> {
        match self {
            QueryResult::Success { response, .. } => Some(response),
            QueryResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            QueryResult::Success { .. } => None,
            QueryResult::Failure { error, .. } => Some(error),
        }
    }

    /// Response text, or the failure message as [`Error::Query`]
    pub fn into_response(self) -> Result<String> {
        match self {
            QueryResult::Success { response, .. } => Ok(response),
            QueryResult::Failure { error, .. } => Err(Error::Query(error)),
        }
    }
}

/// A query addressed to a remote agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub target_address: String,
    pub query_text: String,
    pub request_id: String,
}

impl QueryRequest {
    /// Validate inputs and attach `request_id`, generating one if absent
    pub fn new(target_address: &str, query_text: &str, request_id: Option<&str>) -> Result<Self> {
        if target_address.trim().is_empty() {
            return Err(Error::Validation("Agent address is required".to_string()));
        }
        if query_text.trim().is_empty() {
            return Err(Error::Validation("Query is required".to_string()));
        }

        let request_id = request_id
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(generate_request_id);

        Ok(Self {
            target_address: target_address.to_string(),
            query_text: query_text.to_string(),
            request_id,
        })
    }

    pub(crate) fn payload<'a>(&'a self, seed: Option<&'a str>) -> QueryPayload<'a> {
        QueryPayload {
            target_agent: &self.target_address,
            query: &self.query_text,
            request_id: &self.request_id,
            seed,
        }
    }
}

/// Body of `POST /query`
#[derive(Debug, Serialize)]
pub(crate) struct QueryPayload<'a> {
    pub target_agent: &'a str,
    pub query: &'a str,
    pub request_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<&'a str>,
}

/// Body of a `POST /query` reply
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct BridgeReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

/// `req_<unix millis>_<8 hex chars>`; unique within a process, not globally
pub fn generate_request_id() -> String {
    format!(
        "req_{}_{:08x}",
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u32>()
    )
}
