//! Correlated queries over the bridge's `POST /query`

use super::types::{BridgeReply, QueryRequest, QueryResult};
use super::UAgentClient;
use crate::error::Result;
use reqwest::StatusCode;

/// Failure text when the bridge never answered (refused, reset, timed out)
pub const NO_RESPONSE: &str = "no response from bridge";

/// Failure text when the bridge reply carries no usable message
const QUERY_FAILED: &str = "Query failed";

impl UAgentClient {
    /// Send `query` to the agent at `agent_address`
    ///
    /// Only input validation fails with `Err`. Bridge startup, transport and
    /// agent failures come back as [`QueryResult::Failure`], always carrying
    /// the supplied or generated request id.
    pub async fn query(
        &self,
        agent_address: &str,
        query: &str,
        request_id: Option<&str>,
    ) -> Result<QueryResult> {
        let request = QueryRequest::new(agent_address, query, request_id)?;

        if let Err(e) = self.ensure_ready().await {
            tracing::warn!(
                request_id = %request.request_id,
                "Bridge not available: {}",
                e
            );
            return Ok(QueryResult::failure(e.to_string(), request.request_id));
        }

        Ok(self.send(request).await)
    }

    /// Send a query and return only the response text
    ///
    /// Failures are raised as [`crate::Error::Query`] with the bridge's
    /// message.
    pub async fn ask(&self, agent_address: &str, query: &str) -> Result<String> {
        self.query(agent_address, query, None)
            .await?
            .into_response()
    }

    async fn send(&self, request: QueryRequest) -> QueryResult {
        let url = format!("{}/query", self.bridge_url());
        let payload = request.payload(self.config.user_seed.as_deref());

        tracing::debug!(
            request_id = %request.request_id,
            target = %request.target_address,
            "Sending query to bridge"
        );

        let response = match self
            .http
            .post(&url)
            .timeout(self.config.timeout())
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return transport_failure(e, request.request_id),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return transport_failure(e, request.request_id),
        };

        let result = classify_reply(status, &body, request.request_id);
        tracing::debug!(
            request_id = %result.request_id(),
            success = result.is_success(),
            "Query finished"
        );
        result
    }
}

fn transport_failure(err: reqwest::Error, request_id: String) -> QueryResult {
    if err.is_builder() {
        return QueryResult::failure(err.to_string(), request_id);
    }
    tracing::debug!(request_id = %request_id, "No response from bridge: {}", err);
    QueryResult::failure(NO_RESPONSE, request_id)
}

/// Map a bridge reply onto a result for `request_id`
fn classify_reply(status: StatusCode, body: &str, request_id: String) -> QueryResult {
    let reply = serde_json::from_str::<BridgeReply>(body).ok();

    if !status.is_success() {
        let error = reply
            .and_then(|reply| reply.error)
            .filter(|error| !error.is_empty())
            .unwrap_or_else(|| format!("Request failed with status code {}", status.as_u16()));
        return QueryResult::failure(error, request_id);
    }

    match reply {
        Some(BridgeReply {
            success: true,
            response: Some(response),
            request_id: echoed,
            ..
        }) => {
            if let Some(echoed) = echoed.filter(|echoed| *echoed != request_id) {
                tracing::warn!(
                    request_id = %request_id,
                    echoed = %echoed,
                    "Bridge echoed a different request id"
                );
            }
            QueryResult::success(response, request_id)
        }
        Some(reply) => QueryResult::failure(
            reply
                .error
                .filter(|error| !error.is_empty())
                .unwrap_or_else(|| QUERY_FAILED.to_string()),
            request_id,
        ),
        None => QueryResult::failure(QUERY_FAILED, request_id),
    }
}
