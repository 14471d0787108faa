//! Remote template rendering over HTTP.

use async_trait::async_trait;
use relay_core::{config::TemplatesConfig, error::RelayError, traits::TemplateRenderer};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RenderResponse {
    #[serde(default)]
    text: Option<String>,
}

/// Client for `POST {base_url}/render`.
pub struct TemplateClient {
    http: reqwest::Client,
    base_url: String,
    /// `(header name, value)` when a shared secret is configured.
    secret: Option<(String, String)>,
}

impl TemplateClient {
    /// Build from config. Returns `None` when no template API is configured.
    pub fn from_config(config: &TemplatesConfig) -> Result<Option<Self>, RelayError> {
        if config.base_url.trim().is_empty() {
            return Ok(None);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RelayError::Config(format!("failed to build template http client: {e}")))?;

        let secret = if config.secret.is_empty() {
            None
        } else {
            Some((config.secret_header.clone(), config.secret.clone()))
        };

        Ok(Some(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret,
        }))
    }
}

#[async_trait]
impl TemplateRenderer for TemplateClient {
    async fn render(&self, key: &str, params: &Map<String, Value>) -> Result<String, RelayError> {
        let mut req = self
            .http
            .post(format!("{}/render", self.base_url))
            .json(&json!({"key": key, "params": params}));
        if let Some((ref header, ref value)) = self.secret {
            req = req.header(header.as_str(), value.as_str());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| RelayError::Render(format!("template api request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RelayError::Render(format!(
                "template api returned {status} for '{key}'"
            )));
        }

        let body: RenderResponse = resp
            .json()
            .await
            .map_err(|e| RelayError::Render(format!("template api returned invalid json: {e}")))?;

        match body.text {
            Some(text) if !text.trim().is_empty() => {
                debug!("rendered template '{key}' ({} chars)", text.chars().count());
                Ok(text)
            }
            _ => Err(RelayError::Render(format!(
                "template api returned empty text for '{key}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str, secret: &str) -> TemplatesConfig {
        TemplatesConfig {
            base_url: base_url.to_string(),
            secret: secret.to_string(),
            ..Default::default()
        }
    }

    fn params() -> Map<String, Value> {
        let mut p = Map::new();
        p.insert("name".into(), json!("Sara"));
        p
    }

    #[test]
    fn test_unconfigured_is_none() {
        assert!(TemplateClient::from_config(&TemplatesConfig::default())
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_render_sends_secret_and_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/render"))
            .and(header("x-api-key", "s3cret"))
            .and(body_partial_json(json!({"key": "welcome", "params": {"name": "Sara"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "Hi Sara"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = TemplateClient::from_config(&config(&server.uri(), "s3cret"))
            .unwrap()
            .unwrap();
        let text = client.render("welcome", &params()).await.unwrap();
        assert_eq!(text, "Hi Sara");
    }

    #[tokio::test]
    async fn test_render_non_success_is_render_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/render"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = TemplateClient::from_config(&config(&server.uri(), ""))
            .unwrap()
            .unwrap();
        let err = client.render("welcome", &params()).await.unwrap_err();
        assert!(matches!(err, RelayError::Render(_)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_render_empty_text_is_render_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/render"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "  "})))
            .mount(&server)
            .await;

        let client = TemplateClient::from_config(&config(&server.uri(), ""))
            .unwrap()
            .unwrap();
        let err = client.render("welcome", &params()).await.unwrap_err();
        assert!(err.to_string().contains("empty text"));
    }
}
