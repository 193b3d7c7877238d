use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer request failed: {0}")]
    Request(String),
    #[error("renderer protocol error: {0}")]
    Protocol(String),
}

/// Rendering capability behind the RenderedFetch tier: load a page in a
/// JavaScript-executing environment and return the rendered DOM text.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, RenderError>;
}

/// Talks the plain WebDriver HTTP protocol to an already-running driver
/// (chromedriver or a Selenium grid). Driver process lifecycle is the
/// operator's problem; only the endpoint URL is configured here.
pub struct WebDriverRenderer {
    endpoint: String,
    http: Client,
    settle: Duration,
}

impl WebDriverRenderer {
    pub fn new(endpoint: &str) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http,
            settle: Duration::from_secs(3),
        }
    }

    async fn new_session(&self) -> Result<String, RenderError> {
        let response = self
            .http
            .post(format!("{}/session", self.endpoint))
            .json(&chrome_capabilities())
            .send()
            .await
            .map_err(|err| RenderError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(RenderError::Request(format!("HTTP {}", response.status())));
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|err| RenderError::Protocol(err.to_string()))?;
        payload["value"]["sessionId"]
            .as_str()
            .map(|id| id.to_string())
            .ok_or_else(|| RenderError::Protocol("missing sessionId".into()))
    }

    async fn page_source(&self, session_id: &str, url: &str) -> Result<String, RenderError> {
        let navigate = self
            .http
            .post(format!("{}/session/{session_id}/url", self.endpoint))
            .json(&json!({ "url": url }))
            .send()
            .await
            .map_err(|err| RenderError::Request(err.to_string()))?;
        if !navigate.status().is_success() {
            return Err(RenderError::Request(format!("HTTP {}", navigate.status())));
        }

        // Let dynamic price widgets settle before reading the DOM.
        sleep(self.settle).await;

        let response = self
            .http
            .get(format!("{}/session/{session_id}/source", self.endpoint))
            .send()
            .await
            .map_err(|err| RenderError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(RenderError::Request(format!("HTTP {}", response.status())));
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|err| RenderError::Protocol(err.to_string()))?;
        payload["value"]
            .as_str()
            .map(|source| source.to_string())
            .ok_or_else(|| RenderError::Protocol("missing page source".into()))
    }

    async fn close_session(&self, session_id: &str) {
        let result = self
            .http
            .delete(format!("{}/session/{session_id}", self.endpoint))
            .send()
            .await;
        if let Err(err) = result {
            warn!(target = "pricescan.render", error = %err, "webdriver session cleanup failed");
        }
    }
}

#[async_trait]
impl Renderer for WebDriverRenderer {
    async fn render(&self, url: &str) -> Result<String, RenderError> {
        let session_id = self.new_session().await?;
        let outcome = self.page_source(&session_id, url).await;
        // The session is closed whether or not the fetch succeeded.
        self.close_session(&session_id).await;
        outcome
    }
}

fn chrome_capabilities() -> Value {
    json!({
        "capabilities": {
            "alwaysMatch": {
                "goog:chromeOptions": {
                    "args": [
                        "--headless=new",
                        "--no-sandbox",
                        "--disable-dev-shm-usage",
                        "--disable-blink-features=AutomationControlled",
                        "--disable-extensions",
                        "--log-level=3",
                    ],
                    "excludeSwitches": ["enable-automation"],
                }
            }
        }
    })
}
