use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{Value, json};

use crate::chat::{CompletionProvider, Message, ProviderError, Role};

/// Message shape expected by OpenAI compatible APIs. Timestamps and
/// anything else the session tracks stay out of the request.
#[derive(Serialize, Debug, PartialEq)]
pub struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

impl<'a> From<&'a Message> for WireMessage<'a> {
    fn from(msg: &'a Message) -> Self {
        WireMessage {
            role: msg.role(),
            content: msg.content(),
        }
    }
}

fn status_error(status: StatusCode) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::Unauthorized,
        429 => ProviderError::RateLimited,
        _ => ProviderError::Unavailable(format!("unexpected status {}", status)),
    }
}

/// Pull the assistant's reply out of a chat completion response.
pub fn reply_content(resp: &Value) -> Result<String, ProviderError> {
    resp["choices"][0]["message"]["content"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| ProviderError::MalformedResponse(format!("No message received: {}", resp)))
}

pub async fn completion(
    client: &reqwest::Client,
    messages: &[Message],
    api_hostname: &str,
    api_key: &str,
    model: &str,
    timeout: Duration,
) -> Result<Value, ProviderError> {
    let wire_messages: Vec<WireMessage> = messages.iter().map(WireMessage::from).collect();
    let payload = json!({
        "model": model,
        "messages": wire_messages,
    });
    let url = format!("{}/v1/chat/completions", api_hostname.trim_end_matches("/"));
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .header("Content-Type", "application/json")
        .timeout(timeout)
        .json(&payload)
        .send()
        .await
        .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(status_error(status));
    }

    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
    serde_json::from_str(&body).map_err(|e| ProviderError::MalformedResponse(e.to_string()))
}

/// Completion provider backed by an OpenAI compatible chat completions
/// API, local or commercial.
#[derive(Clone, Debug)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_hostname: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(api_hostname: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_hostname: api_hostname.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout: Duration::from_secs(60 * 10),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, messages: &[Message]) -> Result<String, ProviderError> {
        let resp = completion(
            &self.client,
            messages,
            &self.api_hostname,
            &self.api_key,
            &self.model,
            self.timeout,
        )
        .await?;
        reply_content(&resp)
    }
}
