use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_rusqlite::Connection;

use crate::auth::{SharedAuth, SqliteAccounts};
use crate::chat::{
    Chat, PersonaRegistry, SharedProvider, SharedStore, SqliteStore, provider_from_config,
};
use crate::core::AppConfig;

/// A live chat session. The mutex makes turns for one session run one
/// at a time while other sessions proceed independently.
pub type SharedChat = Arc<Mutex<Chat>>;

struct SessionEntry {
    chat: SharedChat,
    last_used: Instant,
}

/// Live sessions by session ID, bounded in size and idle time.
pub struct Sessions {
    entries: HashMap<String, SessionEntry>,
    max_sessions: usize,
    idle_timeout: Duration,
}

impl Sessions {
    pub fn new(max_sessions: usize, idle_timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_sessions: max_sessions.max(1),
            idle_timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add a session, first dropping idle ones and then the least
    /// recently used one if still full.
    pub fn insert(&mut self, id: String, chat: Chat) -> SharedChat {
        self.insert_at(id, chat, Instant::now())
    }

    fn insert_at(&mut self, id: String, chat: Chat, now: Instant) -> SharedChat {
        self.evict_idle(now);
        while self.entries.len() >= self.max_sessions {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            tracing::debug!("Dropping least recently used chat session {}", oldest);
            self.entries.remove(&oldest);
        }

        let chat = Arc::new(Mutex::new(chat));
        self.entries.insert(
            id,
            SessionEntry {
                chat: Arc::clone(&chat),
                last_used: now,
            },
        );
        chat
    }

    /// Look up a session and mark it as used.
    pub fn get(&mut self, id: &str) -> Option<SharedChat> {
        self.get_at(id, Instant::now())
    }

    fn get_at(&mut self, id: &str, now: Instant) -> Option<SharedChat> {
        self.evict_idle(now);
        let entry = self.entries.get_mut(id)?;
        entry.last_used = now;
        Some(Arc::clone(&entry.chat))
    }

    pub fn remove(&mut self, id: &str) -> Option<SharedChat> {
        self.entries.remove(id).map(|entry| entry.chat)
    }

    fn evict_idle(&mut self, now: Instant) {
        let idle_timeout = self.idle_timeout;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.last_used) < idle_timeout);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            tracing::debug!("Dropped {} idle chat session(s)", evicted);
        }
    }
}

pub struct AppState {
    pub config: AppConfig,
    pub provider: SharedProvider,
    pub store: SharedStore,
    pub accounts: SharedAuth,
    pub personas: Arc<PersonaRegistry>,
    pub sessions: Sessions,
}

impl AppState {
    pub fn new(db: Connection, config: AppConfig) -> Self {
        let provider = provider_from_config(&config);
        let personas = PersonaRegistry::new(&config.assistant_name, &config.system_message);
        let sessions = Sessions::new(
            config.max_sessions,
            Duration::from_secs(config.session_idle_secs),
        );
        Self {
            store: Arc::new(SqliteStore::new(&db)),
            accounts: Arc::new(SqliteAccounts::new(&db)),
            personas: Arc::new(personas),
            sessions,
            provider,
            config,
        }
    }

    /// Swap the completion provider, e.g. for a stub in tests.
    pub fn with_provider(mut self, provider: SharedProvider) -> Self {
        self.provider = provider;
        self
    }
}
