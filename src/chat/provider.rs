use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::error::ProviderError;
use super::models::{Message, Role};
use crate::core::{AppConfig, ProviderKind};
use crate::openai::OpenAiProvider;

/// Anything that can turn an ordered list of messages into the next
/// assistant reply. Each call is attempted exactly once, there is no
/// retry at this layer.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, ProviderError>;
}

pub type SharedProvider = Arc<dyn CompletionProvider + Send + Sync + 'static>;

/// Build the provider selected in the config.
pub fn provider_from_config(config: &AppConfig) -> SharedProvider {
    match config.provider {
        ProviderKind::OpenAi => Arc::new(
            OpenAiProvider::new(
                &config.openai_api_hostname,
                &config.openai_api_key,
                &config.openai_model,
            )
            .timeout(Duration::from_secs(config.request_timeout_secs)),
        ),
        ProviderKind::Rules => Arc::new(RuleProvider::new(&config.assistant_name)),
    }
}

/// Keyword matching bot that replies without any network access.
/// Useful for demos and for exercising sessions in tests.
#[derive(Clone, Debug)]
pub struct RuleProvider {
    assistant_name: String,
}

impl RuleProvider {
    pub fn new(assistant_name: &str) -> Self {
        Self {
            assistant_name: assistant_name.to_string(),
        }
    }

    pub fn reply_to(&self, text: &str) -> String {
        let text = text.to_lowercase();
        if text.contains("hello") {
            String::from("Hi there! How can I help you?")
        } else if text.contains("your name") {
            format!("I'm {}, your assistant!", self.assistant_name)
        } else if text.contains("bye") {
            String::from("Goodbye! Have a great day!")
        } else {
            String::from("I'm still learning. Can you rephrase that?")
        }
    }
}

impl Default for RuleProvider {
    fn default() -> Self {
        Self::new("Smart Chatbot")
    }
}

#[async_trait]
impl CompletionProvider for RuleProvider {
    async fn complete(&self, messages: &[Message]) -> Result<String, ProviderError> {
        let latest = messages
            .iter()
            .rev()
            .find(|m| m.role() == Role::User)
            .ok_or_else(|| {
                ProviderError::MalformedResponse(String::from("no user message to reply to"))
            })?;
        Ok(self.reply_to(latest.content()))
    }
}
