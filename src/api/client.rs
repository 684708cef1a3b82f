use super::logging::{debug_payload_enabled, emit_debug_payload, emit_response_failure};
use super::Transport;
use crate::config::Config;
use crate::error::TransportError;
use crate::types::{ChatRequest, ChatResponse};
use crate::util::is_local_endpoint_url;
use anyhow::Result;
use futures::future::{BoxFuture, FutureExt};
use std::time::Duration;

const MAX_ERROR_BODY_CHARS: usize = 2000;

/// Chat-completions client over reqwest. Cheap to clone; the underlying
/// connection pool is shared.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    api_url: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_timeout(config, config.request_timeout())
    }

    pub fn with_timeout(config: &Config, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            api_url: config.api_url.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn complete(
        &self,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<String, TransportError> {
        let payload = ChatRequest::new(&self.model, system_prompt, user_text);
        if debug_payload_enabled() {
            emit_debug_payload(&self.api_url, &payload);
        }

        let mut request = self
            .http
            .post(&self.api_url)
            .header("content-type", "application/json")
            .json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|error| map_request_error(error, &self.api_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = truncate_chars(&body, MAX_ERROR_BODY_CHARS);
            emit_response_failure(&self.api_url, status.as_u16(), &body);
            return Err(TransportError::HttpStatus {
                code: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|error| map_request_error(error, &self.api_url))?;
        parse_completion(&body)
    }
}

impl Transport for ApiClient {
    fn send<'a>(
        &'a self,
        system_prompt: &'a str,
        user_text: &'a str,
    ) -> BoxFuture<'a, Result<String, TransportError>> {
        self.complete(system_prompt, user_text).boxed()
    }
}

/// Pulls `choices[0].message.content` out of a response body.
pub fn parse_completion(body: &str) -> Result<String, TransportError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|error| TransportError::Malformed(format!("invalid response JSON: {error}")))?;
    match response.into_text().filter(|text| !text.trim().is_empty()) {
        Some(text) => Ok(text),
        None => Err(TransportError::Malformed(
            "response has no non-empty choices[0].message.content".to_string(),
        )),
    }
}

// Timeouts surface as Network failures.
fn map_request_error(error: reqwest::Error, request_url: &str) -> TransportError {
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return TransportError::Network(format!(
            "cannot reach local endpoint '{request_url}': {error}. Start your local server or update RESTYLE_API_URL."
        ));
    }
    if error.is_connect() {
        return TransportError::Network(format!("cannot reach '{request_url}': {error}"));
    }
    if error.is_timeout() {
        return TransportError::Network(format!("request to '{request_url}' timed out: {error}"));
    }
    if error.is_decode() {
        return TransportError::Malformed(format!("could not read response body: {error}"));
    }
    TransportError::Network(format!("request to '{request_url}' failed: {error}"))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
