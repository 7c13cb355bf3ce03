use std::env;
use std::str::FromStr;

use anyhow::{Error, anyhow};

/// Which completion provider backs chat sessions.
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderKind {
    /// Any OpenAI compatible chat completions API
    OpenAi,
    /// Canned replies that work without network access
    Rules,
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "rules" => Ok(ProviderKind::Rules),
            other => Err(anyhow!("Unknown provider \"{}\"", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub storage_path: String,
    pub db_path: String,
    pub provider: ProviderKind,
    pub openai_model: String,
    pub openai_api_hostname: String,
    pub openai_api_key: String,
    pub request_timeout_secs: u64,
    /// Live sessions the server keeps before dropping the least
    /// recently used one
    pub max_sessions: usize,
    /// Sessions untouched for this long are dropped
    pub session_idle_secs: u64,
    pub system_message: String,
    pub default_persona: Option<String>,
    pub assistant_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let storage_path = env::var("PALAVER_STORAGE_PATH").unwrap_or("./".to_string());
        let db_path = format!("{}/db", storage_path.trim_end_matches('/'));
        let provider = env::var("PALAVER_PROVIDER")
            .ok()
            .and_then(|p| {
                p.parse()
                    .map_err(|e| tracing::warn!("Ignoring PALAVER_PROVIDER: {}", e))
                    .ok()
            })
            .unwrap_or(ProviderKind::OpenAi);
        let openai_api_hostname = env::var("PALAVER_LLM_HOST")
            .unwrap_or_else(|_| "https://api.openai.com".to_string());
        let openai_api_key =
            env::var("OPENAI_API_KEY").unwrap_or_else(|_| "thiswontworkforopenai".to_string());
        let openai_model =
            env::var("PALAVER_LLM_MODEL").unwrap_or_else(|_| "gpt-4.1-mini".to_string());
        let request_timeout_secs = env::var("PALAVER_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60 * 10);
        let max_sessions = env::var("PALAVER_MAX_SESSIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);
        let session_idle_secs = env::var("PALAVER_SESSION_IDLE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60 * 60);
        let system_message = env::var("PALAVER_SYSTEM_MESSAGE")
            .unwrap_or_else(|_| "You are a helpful assistant.".to_string());
        // An empty value means sessions start without a system message
        let default_persona = match env::var("PALAVER_PERSONA") {
            Ok(p) if p.trim().is_empty() => None,
            Ok(p) => Some(p),
            Err(_) => Some("assistant".to_string()),
        };
        let assistant_name =
            env::var("PALAVER_ASSISTANT_NAME").unwrap_or_else(|_| "Smart Chatbot".to_string());

        Self {
            storage_path,
            db_path,
            provider,
            openai_api_hostname,
            openai_api_key,
            openai_model,
            request_timeout_secs,
            max_sessions,
            session_idle_secs,
            system_message,
            default_persona,
            assistant_name,
        }
    }
}
