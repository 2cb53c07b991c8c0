//! HTTP backend for the AI service
//!
//! POSTs the request payload to `{base_url}/{endpoint}` and expects the
//! model's JSON answer in the body, optionally wrapped in a markdown fence.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::gateway::{AiBackend, BackendResponse};
use super::upstream::UpstreamError;
use crate::config::AiConfig;
use crate::models::AiEndpoint;

pub struct HttpBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// None while no base URL is configured
    pub fn from_config(config: &AiConfig) -> Option<Self> {
        let base_url = config.base_url.as_deref().filter(|u| !u.trim().is_empty())?;
        let api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        Some(Self::new(base_url, api_key))
    }

    fn url(&self, endpoint: AiEndpoint) -> String {
        format!("{}/{}", self.base_url, endpoint.as_str())
    }
}

fn transport_error(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::with_code("ETIMEDOUT", e.to_string())
    } else if e.is_connect() {
        UpstreamError::with_code("ECONNREFUSED", e.to_string())
    } else if let Some(status) = e.status() {
        UpstreamError::http(status.as_u16(), e.to_string())
    } else {
        UpstreamError {
            status: None,
            code: None,
            message: e.to_string(),
        }
    }
}

/// Parse model output, tolerating a ```json fence around it
pub fn parse_model_json(text: &str) -> Result<Value, serde_json::Error> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(unfenced.trim())
}

#[async_trait]
impl AiBackend for HttpBackend {
    async fn generate(&self, endpoint: AiEndpoint, payload: &Value) -> Result<BackendResponse, UpstreamError> {
        let mut request = self.client.post(self.url(endpoint)).json(payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(UpstreamError::http(status.as_u16(), body));
        }

        let content = parse_model_json(&body)
            .map_err(|e| UpstreamError::malformed_response(format!("response is not JSON: {}", e)))?;
        Ok(BackendResponse {
            content,
            raw: Some(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_fenced_and_plain_json() {
        assert_eq!(parse_model_json("{\"a\": 1}").unwrap(), json!({"a": 1}));
        assert_eq!(
            parse_model_json("```json\n{\"vocabulary\": []}\n```").unwrap(),
            json!({"vocabulary": []})
        );
        assert_eq!(parse_model_json("```\n[1, 2]\n```\n").unwrap(), json!([1, 2]));
        assert!(parse_model_json("Sorry, I can't help").is_err());
    }

    #[test]
    fn test_from_config_requires_base_url() {
        let mut config = AiConfig::default();
        assert!(HttpBackend::from_config(&config).is_none());

        config.base_url = Some("http://localhost:9000/ai/".into());
        let backend = HttpBackend::from_config(&config).unwrap();
        assert_eq!(backend.url(AiEndpoint::AnalyzeImage), "http://localhost:9000/ai/analyzeImage");
    }
}
