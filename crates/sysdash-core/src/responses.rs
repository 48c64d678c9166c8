use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_RESPONSE_TTL: Duration = Duration::from_secs(10);
pub const DEFAULT_RESPONSE_CAPACITY: usize = 100;
/// Stand-in body for empty messages so the entry still renders a line.
pub const EMPTY_RESPONSE_TEXT: &str = "\u{00A0}";

/// Lifecycle policy for the response log, chosen per deployment.
///
/// `Ephemeral` entries vanish `ttl` after their last push. `Persistent`
/// entries mirror a server-side cache and only leave through explicit
/// deletion, a cache replacement, or capacity eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLogMode {
    Ephemeral { ttl: Duration, capacity: usize },
    Persistent { capacity: usize },
}

impl ResponseLogMode {
    pub fn capacity(&self) -> usize {
        match self {
            ResponseLogMode::Ephemeral { capacity, .. } => *capacity,
            ResponseLogMode::Persistent { capacity } => *capacity,
        }
        .max(1)
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self, ResponseLogMode::Persistent { .. })
    }
}

impl Default for ResponseLogMode {
    fn default() -> Self {
        ResponseLogMode::Ephemeral {
            ttl: DEFAULT_RESPONSE_TTL,
            capacity: DEFAULT_RESPONSE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Notice,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEntry {
    pub id: String,
    pub page: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub kind: ResponseKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

pub fn normalize_text(text: &str) -> String {
    if text.is_empty() {
        EMPTY_RESPONSE_TEXT.to_string()
    } else {
        text.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct ResponseLog {
    mode: ResponseLogMode,
    entries: VecDeque<ResponseEntry>,
}

impl ResponseLog {
    pub fn new(mode: ResponseLogMode) -> Self {
        Self {
            mode,
            entries: VecDeque::new(),
        }
    }

    pub fn mode(&self) -> ResponseLogMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ResponseEntry> {
        self.entries.iter()
    }

    pub fn get(&self, id: &str) -> Option<&ResponseEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Appends a message under a freshly generated id and returns the id.
    pub fn push(
        &mut self,
        text: &str,
        kind: ResponseKind,
        page: Option<String>,
        now: DateTime<Utc>,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        self.push_with_id(&id, text, kind, page, now);
        id
    }

    /// Inserts or refreshes the entry `id`. Refreshing replaces the body and
    /// restarts its expiry. Returns `true` when an existing entry was refreshed.
    pub fn push_with_id(
        &mut self,
        id: &str,
        text: &str,
        kind: ResponseKind,
        page: Option<String>,
        now: DateTime<Utc>,
    ) -> bool {
        let expires_at = self.deadline_from(now);
        if let Some(existing) = self.entries.iter_mut().find(|entry| entry.id == id) {
            existing.text = normalize_text(text);
            existing.kind = kind;
            existing.timestamp = now;
            existing.expires_at = expires_at;
            if page.is_some() {
                existing.page = page;
            }
            return true;
        }
        self.entries.push_back(ResponseEntry {
            id: id.to_string(),
            page,
            timestamp: now,
            text: normalize_text(text),
            kind,
            expires_at,
        });
        self.enforce_capacity();
        false
    }

    /// Drops every entry whose deadline is at or before `now`.
    pub fn expire(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|entry| entry.expires_at.map_or(true, |deadline| deadline > now));
        before - self.entries.len()
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().filter_map(|entry| entry.expires_at).min()
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        before != self.entries.len()
    }

    /// Loads a server-provided cache. A persistent log is replaced wholesale.
    /// An ephemeral log merges the entries by id, each expiring `ttl` after
    /// `now`. Only the newest `capacity` entries are kept.
    pub fn load_cache(&mut self, entries: Vec<ResponseEntry>, now: DateTime<Utc>) {
        if self.mode.is_persistent() {
            self.entries = entries.into();
            self.enforce_capacity();
            return;
        }
        for entry in entries {
            self.push_with_id(&entry.id, &entry.text, entry.kind, entry.page, now);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn snapshot(&self) -> Vec<ResponseEntry> {
        self.entries.iter().cloned().collect()
    }

    fn deadline_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.mode {
            // Deadlines past the calendar's end saturate instead of wrapping.
            ResponseLogMode::Ephemeral { ttl, .. } => Some(
                chrono::Duration::from_std(ttl)
                    .ok()
                    .and_then(|ttl| now.checked_add_signed(ttl))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            ),
            ResponseLogMode::Persistent { .. } => None,
        }
    }

    fn enforce_capacity(&mut self) {
        let capacity = self.mode.capacity();
        while self.entries.len() > capacity {
            self.entries.pop_front();
        }
    }
}

impl Default for ResponseLog {
    fn default() -> Self {
        Self::new(ResponseLogMode::default())
    }
}
