use canvas_core::action::Action;
use canvas_core::config::Config;
use canvas_core::executor::{AcceptAll, ExecutionResult, Executor, Rejection};
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// POSTs each approved action as JSON and treats any 2xx as success.
pub struct HttpExecutor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpExecutor {
    pub fn new(endpoint: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Executor for HttpExecutor {
    fn execute<'a>(&'a self, action: &'a Action) -> BoxFuture<'a, ExecutionResult> {
        Box::pin(async move {
            tracing::debug!(action_id = %action.id, endpoint = %self.endpoint, "posting action");
            let response = self
                .client
                .post(&self.endpoint)
                .json(action)
                .send()
                .await
                .map_err(|e| Rejection::new(format!("request failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let body = body.trim();
                return Err(Rejection::new(if body.is_empty() {
                    format!("endpoint returned {status}")
                } else {
                    format!("endpoint returned {status}: {body}")
                }));
            }
            // An empty or non-JSON body still counts as success.
            Ok(response.json::<Value>().await.unwrap_or(Value::Null))
        })
    }
}

/// The executor `config` asks for: HTTP when an endpoint is set, local
/// acceptance otherwise.
pub fn from_config(config: &Config) -> anyhow::Result<Arc<dyn Executor>> {
    match config.execution.endpoint.as_deref() {
        Some(endpoint) => Ok(Arc::new(HttpExecutor::new(endpoint)?)),
        None => Ok(Arc::new(AcceptAll)),
    }
}
