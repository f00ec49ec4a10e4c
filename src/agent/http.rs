use super::{AgentApi, AgentError};
use crate::model::{RunId, StatusPayload, TriggerRequest, TriggerResponse};
use anyhow::{Context, Result};
use reqwest::Url;
use std::time::Duration;

/// `reqwest`-backed client for the agent's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpAgentClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpAgentClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).with_context(|| format!("invalid API URL `{base_url}`"))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            anyhow::bail!("API URL must be an http(s) URL, got `{base_url}`");
        }
        let http = reqwest::Client::builder()
            .user_agent(format!("healing-dashboard/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`: the base URL can always take path segments.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_body(&self, url: Url) -> Result<Vec<u8>, AgentError> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| AgentError::Transport {
                url: url.to_string(),
                source,
            })?;
        read_success_body(url, response).await
    }
}

async fn read_success_body(url: Url, response: reqwest::Response) -> Result<Vec<u8>, AgentError> {
    let status = response.status();
    if !status.is_success() {
        return Err(AgentError::Status {
            url: url.to_string(),
            status,
        });
    }
    let body = response
        .bytes()
        .await
        .map_err(|source| AgentError::Transport {
            url: url.to_string(),
            source,
        })?;
    Ok(body.to_vec())
}

impl AgentApi for HttpAgentClient {
    async fn trigger(&self, request: &TriggerRequest) -> Result<RunId, AgentError> {
        let url = self.endpoint(&["trigger-agent"]);
        tracing::debug!(%url, repo = %request.github_url, "triggering agent run");
        let response = self
            .http
            .post(url.clone())
            .json(request)
            .send()
            .await
            .map_err(|source| AgentError::Transport {
                url: url.to_string(),
                source,
            })?;
        let body = read_success_body(url.clone(), response).await?;
        let parsed: TriggerResponse =
            serde_json::from_slice(&body).map_err(|source| AgentError::Decode {
                url: url.to_string(),
                source,
            })?;
        tracing::debug!(run_id = ?parsed.run_id, status = ?parsed.status, "trigger accepted");
        match parsed.run_id {
            Some(id) if !id.trim().is_empty() => Ok(RunId::new(id)),
            _ => Err(AgentError::MissingRunId),
        }
    }

    async fn fetch_status(&self, run_id: &RunId) -> Result<StatusPayload, AgentError> {
        let url = self.endpoint(&["status", run_id.as_str()]);
        let body = self.get_body(url.clone()).await?;
        let value: serde_json::Value =
            serde_json::from_slice(&body).map_err(|source| AgentError::Decode {
                url: url.to_string(),
                source,
            })?;
        // The agent answers unknown ids with 200 and `{"status": "not_found"}`.
        if value.get("run_summary").is_none()
            && value.get("status").and_then(serde_json::Value::as_str) == Some("not_found")
        {
            return Err(AgentError::RunNotFound {
                run_id: run_id.clone(),
            });
        }
        serde_json::from_value(value).map_err(|source| AgentError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        format!("http://{addr}")
    }

    fn client(base: &str) -> HttpAgentClient {
        HttpAgentClient::new(base, Duration::from_secs(5)).expect("client")
    }

    fn request() -> TriggerRequest {
        TriggerRequest {
            github_url: "https://github.com/x/y".into(),
            team_name: "Alpha".into(),
            leader_name: "A. Lead".into(),
        }
    }

    #[test]
    fn rejects_non_http_base_urls() {
        assert!(HttpAgentClient::new("not a url", Duration::from_secs(1)).is_err());
        assert!(HttpAgentClient::new("mailto:ops@example.com", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn endpoints_respect_base_path() {
        let c = client("http://127.0.0.1:8000/");
        assert_eq!(
            c.endpoint(&["status", "abc"]).as_str(),
            "http://127.0.0.1:8000/status/abc"
        );
        let nested = client("https://agent.example.com/api");
        assert_eq!(
            nested.endpoint(&["trigger-agent"]).as_str(),
            "https://agent.example.com/api/trigger-agent"
        );
        assert_eq!(
            nested.endpoint(&["status", "a/b"]).as_str(),
            "https://agent.example.com/api/status/a%2Fb"
        );
    }

    #[tokio::test]
    async fn trigger_posts_configuration_and_returns_run_id() {
        let seen: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let captured = seen.clone();
        let router = Router::new().route(
            "/trigger-agent",
            post(move |Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    *captured.lock().expect("lock") = Some(body);
                    Json(json!({ "run_id": "abc", "status": "started" }))
                }
            }),
        );
        let base = spawn_server(router).await;

        let run_id = client(&base).trigger(&request()).await.expect("trigger");
        assert_eq!(run_id, RunId::new("abc"));
        assert_eq!(
            seen.lock().expect("lock").clone(),
            Some(json!({
                "github_url": "https://github.com/x/y",
                "team_name": "Alpha",
                "leader_name": "A. Lead"
            }))
        );
    }

    #[tokio::test]
    async fn trigger_without_run_id_fails() {
        let router = Router::new().route(
            "/trigger-agent",
            post(|| async { Json(json!({ "status": "started" })) }),
        );
        let base = spawn_server(router).await;
        let err = client(&base).trigger(&request()).await.expect_err("no run id");
        assert!(matches!(err, AgentError::MissingRunId));
    }

    #[tokio::test]
    async fn trigger_non_success_status_fails() {
        let router = Router::new().route(
            "/trigger-agent",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = spawn_server(router).await;
        let err = client(&base).trigger(&request()).await.expect_err("500");
        assert!(matches!(
            err,
            AgentError::Status { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
    }

    #[tokio::test]
    async fn trigger_connection_refused_is_transport_error() {
        // Bind then drop so nothing listens on the port.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let err = client(&format!("http://{addr}"))
            .trigger(&request())
            .await
            .expect_err("refused");
        assert!(matches!(err, AgentError::Transport { .. }));
    }

    #[tokio::test]
    async fn status_decodes_payload() {
        let router = Router::new().route(
            "/status/{run_id}",
            get(|Path(run_id): Path<String>| async move {
                Json(json!({
                    "run_summary": {
                        "repository_url": "https://github.com/x/y",
                        "team_name": "Alpha",
                        "leader_name": "A. Lead",
                        "branch_created": format!("fix/{run_id}"),
                        "final_status": "PASSED",
                        "total_time_seconds": 31
                    },
                    "score_breakdown": {
                        "base_score": 100,
                        "speed_bonus": 10,
                        "efficiency_penalty": 0,
                        "final_total_score": 110
                    },
                    "fixes_applied": [{
                        "file": "app.py",
                        "bug_type": "LOGIC",
                        "line_number": 3,
                        "commit_message": "fix",
                        "status": "Applied"
                    }],
                    "ci_cd_timeline": [{ "iteration": "1/5", "status": "PASSED", "timestamp": "t" }],
                    "logs": ["Analyzed repo"]
                }))
            }),
        );
        let base = spawn_server(router).await;

        let payload = client(&base)
            .fetch_status(&RunId::new("abc"))
            .await
            .expect("status");
        assert_eq!(payload.run_summary.branch_created, "fix/abc");
        assert_eq!(payload.run_summary.total_time_seconds, 31);
        assert_eq!(
            payload.score_breakdown.map(|s| s.final_total_score),
            Some(110.0)
        );
        assert_eq!(payload.fixes_applied.len(), 1);
        assert_eq!(payload.ci_cd_timeline[0].iteration, "1/5");
        assert_eq!(payload.logs[0].message, "Analyzed repo");
    }

    #[tokio::test]
    async fn status_not_found_and_malformed_bodies_are_errors() {
        let router = Router::new()
            .route(
                "/status/missing",
                get(|| async { Json(json!({ "status": "not_found" })) }),
            )
            .route(
                "/status/partial",
                get(|| async { Json(json!({ "logs": [] })) }),
            )
            .route("/status/garbage", get(|| async { "<html>oops</html>" }));
        let base = spawn_server(router).await;
        let c = client(&base);

        let err = c.fetch_status(&RunId::new("missing")).await.expect_err("not found");
        assert!(matches!(err, AgentError::RunNotFound { .. }));

        let err = c.fetch_status(&RunId::new("partial")).await.expect_err("no summary");
        assert!(matches!(err, AgentError::Decode { .. }));

        let err = c.fetch_status(&RunId::new("garbage")).await.expect_err("not json");
        assert!(matches!(err, AgentError::Decode { .. }));
    }
}
