use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

/// Per-username memo of resolved identity attributes.
///
/// Entries are never invalidated; two concurrent misses for the same user may
/// both write, and the last write wins.
#[derive(Debug, Default)]
pub struct IdentityCache {
    pronouns: RwLock<HashMap<String, String>>,
    avatars: RwLock<HashMap<String, String>>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pronouns(&self, username: &str) -> Option<String> {
        read(&self.pronouns, username)
    }

    pub fn store_pronouns(&self, username: &str, pronouns: String) {
        write(&self.pronouns, username, pronouns);
    }

    pub fn avatar(&self, username: &str) -> Option<String> {
        read(&self.avatars, username)
    }

    pub fn store_avatar(&self, username: &str, url: String) {
        write(&self.avatars, username, url);
    }

    pub fn entry_counts(&self) -> (usize, usize) {
        let pronouns = self
            .pronouns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        let avatars = self
            .avatars
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        (pronouns, avatars)
    }
}

pub fn cache_key(username: &str) -> String {
    username.to_lowercase()
}

fn read(map: &RwLock<HashMap<String, String>>, username: &str) -> Option<String> {
    map.read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&cache_key(username))
        .cloned()
}

fn write(map: &RwLock<HashMap<String, String>>, username: &str, value: String) {
    map.write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(cache_key(username), value);
}
