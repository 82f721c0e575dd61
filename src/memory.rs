//! Conversation transcripts and the per-session arena that owns them.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};
use crate::role::JobRole;

/// System-turn prefix recording the detected job role.
pub const JOB_ROLE_TAG: &str = "DETECTED_JOB_ROLE:";
/// System-turn prefix recording resume keywords.
pub const RESUME_KEYWORDS_TAG: &str = "RESUME_KEYWORDS:";
/// Session used by requests that do not name one.
pub const DEFAULT_SESSION: &str = "default";
const MAX_SESSION_ID_LEN: usize = 128;

/// Speaker of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// Candidate input.
    User,
    /// Interviewer (model) output.
    Assistant,
    /// Out-of-band facts injected by the service.
    System,
}

impl TurnRole {
    /// Label used when rendering the transcript into a prompt.
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
            Self::System => "System",
        }
    }
}

/// One entry of the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Speaker.
    pub role: TurnRole,
    /// Turn text.
    pub content: String,
}

impl Turn {
    /// Candidate turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    /// Interviewer turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }

    /// Tagged system turn, e.g. `DETECTED_JOB_ROLE: Sales Executive`.
    pub fn tagged(tag: &str, value: &str) -> Self {
        Self {
            role: TurnRole::System,
            content: format!("{tag} {value}"),
        }
    }
}

/// Append-only transcript plus the facts learned about the candidate.
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    turns: Vec<Turn>,
    job_role: Option<JobRole>,
    resume_keywords: Vec<String>,
}

impl ConversationMemory {
    /// Empty memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a turn.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// All turns in append order.
    pub fn all(&self) -> &[Turn] {
        &self.turns
    }

    /// True when no turn has been recorded.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drops every turn and every recorded fact.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.job_role = None;
        self.resume_keywords.clear();
    }

    /// Scans system turns newest-first for one starting with `tag` and
    /// returns the trimmed remainder.
    pub fn find_latest(&self, tag: &str) -> Option<String> {
        self.turns
            .iter()
            .rev()
            .filter(|turn| turn.role == TurnRole::System)
            .find_map(|turn| turn.content.strip_prefix(tag))
            .map(|rest| rest.trim().to_string())
    }

    /// Role detected for this candidate, if any.
    pub fn job_role(&self) -> Option<&JobRole> {
        self.job_role.as_ref()
    }

    /// Keywords extracted from the candidate's resume.
    pub fn resume_keywords(&self) -> &[String] {
        &self.resume_keywords
    }

    /// Stores the detected role and mirrors it into the transcript.
    pub fn record_job_role(&mut self, role: JobRole) {
        self.append(Turn::tagged(JOB_ROLE_TAG, role.as_str()));
        self.job_role = Some(role);
    }

    /// Stores resume keywords and mirrors them into the transcript.
    pub fn record_resume_keywords(&mut self, keywords: Vec<String>) {
        self.append(Turn::tagged(RESUME_KEYWORDS_TAG, &keywords.join(", ")));
        self.resume_keywords = keywords;
    }

    /// Effective role: explicit override, then the recorded role, then the
    /// latest tagged turn, then [`JobRole::General`].
    pub fn resolve_job_role(&self, role_override: Option<&str>) -> JobRole {
        if let Some(label) = role_override.filter(|label| !label.trim().is_empty()) {
            return JobRole::from_label(label);
        }
        if let Some(role) = &self.job_role {
            return role.clone();
        }
        self.find_latest(JOB_ROLE_TAG)
            .map(|label| JobRole::from_label(&label))
            .unwrap_or_default()
    }
}

/// Memory handle shared between the store and in-flight requests.
pub type SharedMemory = Arc<Mutex<ConversationMemory>>;

struct SessionEntry {
    memory: SharedMemory,
    last_used: Instant,
}

/// Bounded arena of conversations keyed by session id.
///
/// Least recently used sessions are dropped when capacity is reached, and
/// [`SessionStore::evict_idle`] removes sessions idle for longer than the TTL.
pub struct SessionStore {
    sessions: Mutex<LruCache<String, SessionEntry>>,
    idle_ttl: Duration,
}

impl SessionStore {
    /// Builds a store holding at most `capacity` sessions.
    pub fn new(capacity: usize, idle_ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: Mutex::new(LruCache::new(capacity)),
            idle_ttl,
        }
    }

    /// Opens a new session and returns its id.
    pub async fn create(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.insert(id.clone()).await;
        id
    }

    /// Returns the memory for `id`, creating it on first use.
    pub async fn get_or_create(&self, id: &str) -> AppResult<SharedMemory> {
        validate_session_id(id)?;
        let mut sessions = self.sessions.lock().await;
        if let Some(entry) = sessions.get_mut(id) {
            entry.last_used = Instant::now();
            return Ok(Arc::clone(&entry.memory));
        }
        drop(sessions);
        Ok(self.insert(id.to_string()).await)
    }

    /// Forgets a session; returns whether it existed.
    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.lock().await.pop(id).is_some()
    }

    /// Removes sessions idle for longer than the TTL and returns how many were dropped.
    pub async fn evict_idle(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        let stale: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_used) > self.idle_ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            sessions.pop(id);
        }
        if !stale.is_empty() {
            tracing::info!(evicted = stale.len(), "evicted idle sessions");
        }
        stale.len()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// True when no session is live.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn insert(&self, id: String) -> SharedMemory {
        let memory: SharedMemory = Arc::new(Mutex::new(ConversationMemory::new()));
        let entry = SessionEntry {
            memory: Arc::clone(&memory),
            last_used: Instant::now(),
        };
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(&id) {
            return Arc::clone(&existing.memory);
        }
        if let Some((evicted, _)) = sessions.push(id, entry) {
            tracing::debug!(session = %evicted, "session evicted at capacity");
        }
        memory
    }
}

fn validate_session_id(id: &str) -> AppResult<()> {
    let valid = !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(AppError::InvalidRequest(format!("invalid session id {id:?}")))
    }
}
