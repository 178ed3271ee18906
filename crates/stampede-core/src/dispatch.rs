//! Single request/response execution.
//!
//! One call, one cycle: build headers, send, measure wall-clock latency to
//! full body receipt, report what happened. No retries here, ever; retry
//! behavior belongs to the contract under test, not to the harness.

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::error::{Result, StampedeError};
use crate::session::Session;

/// Everything needed to issue one create call
#[derive(Clone, Debug)]
pub struct CallPlan {
    pub url: String,
    pub key: Option<String>,
    pub body: Value,
}

/// Raw result of one cycle. `status` is `None` when the request never
/// completed; latency is recorded either way.
#[derive(Debug)]
pub struct CallResult {
    pub status: Option<u16>,
    pub latency: Duration,
    pub error_kind: Option<&'static str>,
}

/// Shared client for the run
pub fn build_client(timeout: Duration, max_connections: usize) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(max_connections)
        .build()
        .map_err(StampedeError::ClientBuild)
}

/// Perform exactly one request/response cycle
pub async fn execute(
    client: &reqwest::Client,
    session: &Session,
    plan: &CallPlan,
    timeout: Duration,
) -> CallResult {
    let started = Instant::now();

    let mut request = client
        .post(&plan.url)
        .timeout(timeout)
        .header(reqwest::header::AUTHORIZATION, session.bearer())
        .json(&plan.body);
    if let Some(key) = &plan.key {
        request = request.header("Idempotency-Key", key);
    }

    match request.send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            // latency covers the full body receipt; a truncated body keeps
            // the status but is surfaced as an error kind
            let error_kind = response.bytes().await.err().map(|_| "body");
            CallResult {
                status: Some(status),
                latency: started.elapsed().max(Duration::from_micros(1)),
                error_kind,
            }
        }
        Err(e) => {
            let error_kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connect"
            } else {
                "request"
            };
            CallResult {
                status: None,
                latency: started.elapsed().max(Duration::from_micros(1)),
                error_kind: Some(error_kind),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_plan_carries_optional_key() {
        let with_key = CallPlan {
            url: "http://x.example/api/entries".to_string(),
            key: Some("k".to_string()),
            body: serde_json::json!({"title": "t"}),
        };
        assert!(with_key.key.is_some());

        let bare = CallPlan {
            key: None,
            ..with_key
        };
        assert!(bare.key.is_none());
    }
}
