//! HTTP planner client
//!
//! Posts the utterance window to a remote planning service and reads back
//! an ordered plan.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use voice_turn_config::PlannerConfig;
use voice_turn_core::{Error, Plan, Planner, Result, Utterance};

#[derive(Serialize)]
struct PlanRequest<'a> {
    session_id: &'a str,
    utterances: &'a [Utterance],
}

/// Remote planner reached over HTTP
#[derive(Clone)]
pub struct HttpPlanner {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpPlanner {
    /// `timeout` bounds a whole request; the orchestrator still applies its own
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: None,
        })
    }

    pub fn from_config(config: &PlannerConfig, timeout: Duration) -> Result<Option<Self>> {
        match &config.endpoint {
            Some(endpoint) => {
                let mut planner = Self::new(endpoint.clone(), timeout)?;
                planner.api_key = config.api_key.clone();
                Ok(Some(planner))
            },
            None => Ok(None),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::UpstreamTimeout(format!("planner: {}", err))
    } else {
        Error::UpstreamDisconnect(format!("planner: {}", err))
    }
}

#[async_trait]
impl Planner for HttpPlanner {
    async fn plan(&self, session_id: &str, context: &[Utterance]) -> Result<Plan> {
        let mut request = self.client.post(&self.endpoint).json(&PlanRequest {
            session_id,
            utterances: context,
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamDisconnect(format!("planner HTTP {}: {}", status, body)));
        }

        let plan: Plan = response.json().await.map_err(|e| {
            if e.is_timeout() {
                transport_error(e)
            } else {
                Error::UpstreamDisconnect(format!("planner sent an unreadable plan: {}", e))
            }
        })?;

        tracing::debug!(
            session_id,
            tool_calls = plan.tool_calls.len(),
            "Remote plan received"
        );
        Ok(plan)
    }

    fn name(&self) -> &str {
        "http"
    }
}
