use crate::screen::{NavigationError, ScreenRouter, Transition};
use parking_lot::RwLock;
use rand::{Rng, distributions::Alphanumeric, thread_rng};
use std::collections::HashMap;
use std::sync::Arc;

const SESSION_ID_LEN: usize = 24;
const MAX_SESSION_COUNT: usize = 4096;

/// In-memory screen state per browser session. Lost on restart.
///
/// Holds at most `capacity` sessions; opening one more evicts the session
/// that was touched least recently.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<Sessions>>,
}

struct Sessions {
    entries: HashMap<String, SessionEntry>,
    capacity: usize,
    clock: u64,
}

struct SessionEntry {
    router: ScreenRouter,
    last_seen: u64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_capacity(MAX_SESSION_COUNT)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Sessions {
                entries: HashMap::new(),
                capacity: capacity.max(1),
                clock: 0,
            })),
        }
    }

    /// Returns the session's id and a snapshot of its router, creating a
    /// fresh session when `id` is missing or unknown.
    pub fn resolve(&self, id: Option<&str>) -> (String, ScreenRouter, bool) {
        let mut sessions = self.inner.write();
        let now = sessions.tick();
        if let Some(id) = id {
            if let Some(entry) = sessions.entries.get_mut(id) {
                entry.last_seen = now;
                return (id.to_string(), entry.router.clone(), false);
            }
        }
        let id = new_session_id();
        let router = ScreenRouter::new();
        sessions.insert(id.clone(), router.clone(), now);
        (id, router, true)
    }

    pub fn apply(&self, id: &str, transition: Transition) -> Result<ScreenRouter, NavigationError> {
        let mut sessions = self.inner.write();
        let now = sessions.tick();
        let entry = sessions.touch(id, now);
        entry.router.apply(transition)?;
        Ok(entry.router.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}

impl Sessions {
    fn tick(&mut self) -> u64 {
        self.clock = self.clock.wrapping_add(1);
        self.clock
    }

    fn insert(&mut self, id: String, router: ScreenRouter, now: u64) {
        self.make_room();
        self.entries.insert(
            id,
            SessionEntry {
                router,
                last_seen: now,
            },
        );
    }

    /// The entry for `id`, created on first use.
    fn touch(&mut self, id: &str, now: u64) -> &mut SessionEntry {
        if !self.entries.contains_key(id) {
            self.make_room();
        }
        let entry = self
            .entries
            .entry(id.to_string())
            .or_insert_with(|| SessionEntry {
                router: ScreenRouter::new(),
                last_seen: now,
            });
        entry.last_seen = now;
        entry
    }

    fn make_room(&mut self) {
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.oldest_key() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    fn oldest_key(&self) -> Option<String> {
        self.entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_seen)
            .map(|(key, _)| key.clone())
    }
}

fn new_session_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}
