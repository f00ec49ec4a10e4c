//! Client side of the healing agent service.
//!
//! The controller talks to the agent through [`AgentApi`] so the polling
//! protocol can be driven by something other than a live HTTP endpoint.

mod http;

use crate::model::{RunId, StatusPayload, TriggerRequest};
use std::future::Future;

pub use http::HttpAgentClient;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("unexpected response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("trigger response did not contain a run_id")]
    MissingRunId,
    #[error("agent does not know run `{run_id}`")]
    RunNotFound { run_id: RunId },
}

/// The two endpoints of the agent service.
pub trait AgentApi: Send + Sync + 'static {
    /// `POST /trigger-agent`; yields the identifier of the new run.
    fn trigger(
        &self,
        request: &TriggerRequest,
    ) -> impl Future<Output = Result<RunId, AgentError>> + Send;

    /// `GET /status/{run_id}`.
    fn fetch_status(
        &self,
        run_id: &RunId,
    ) -> impl Future<Output = Result<StatusPayload, AgentError>> + Send;
}
