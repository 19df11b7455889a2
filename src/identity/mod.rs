mod cache;
mod http;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

pub use self::cache::{cache_key, IdentityCache};
pub use self::http::{HttpIdentityService, AVATAR_API_BASE, PRONOUNS_API_BASE};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PronounRecord {
    pub subject: String,
    pub object: String,
}

impl PronounRecord {
    pub fn display(&self) -> String {
        format!("{}/{}", self.subject, self.object)
    }
}

/// Upstream identity providers. `login` is always the lowercased username.
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn fetch_pronouns(&self, login: &str) -> Result<Vec<PronounRecord>>;

    /// Returns the raw response body; validation happens in the resolver.
    async fn fetch_avatar(&self, login: &str) -> Result<String>;
}

pub fn fallback_avatar_url(username: &str) -> String {
    format!("https://api.dicebear.com/7.x/pixel-art/svg?seed={username}")
}

fn accept_avatar_payload(body: &str) -> Option<String> {
    let url = body.trim();
    if !url.starts_with("http") || url.to_ascii_lowercase().contains("not found") {
        return None;
    }
    Some(url.to_owned())
}

/// Cache-first pronoun and avatar resolution. Lookups are attempted once and
/// every failure degrades locally.
#[derive(Clone)]
pub struct IdentityResolver {
    cache: Arc<IdentityCache>,
    service: Arc<dyn IdentityService>,
}

impl IdentityResolver {
    pub fn new(cache: Arc<IdentityCache>, service: Arc<dyn IdentityService>) -> Self {
        Self { cache, service }
    }

    pub fn cache(&self) -> &Arc<IdentityCache> {
        &self.cache
    }

    pub async fn resolve_pronouns(&self, username: &str) -> Option<String> {
        if let Some(hit) = self.cache.pronouns(username) {
            return Some(hit);
        }
        let login = cache_key(username);
        match self.service.fetch_pronouns(&login).await {
            Ok(records) => {
                let pronouns = records.first()?.display();
                self.cache.store_pronouns(username, pronouns.clone());
                Some(pronouns)
            }
            Err(err) => {
                debug!(?err, user = %login, "pronoun lookup failed");
                None
            }
        }
    }

    pub async fn resolve_avatar(&self, username: &str) -> String {
        if let Some(hit) = self.cache.avatar(username) {
            return hit;
        }
        let login = cache_key(username);
        let url = match self.service.fetch_avatar(&login).await {
            Ok(body) => accept_avatar_payload(&body).unwrap_or_else(|| {
                debug!(user = %login, payload = %body.trim(), "avatar lookup returned no url");
                fallback_avatar_url(username)
            }),
            Err(err) => {
                debug!(?err, user = %login, "avatar lookup failed");
                fallback_avatar_url(username)
            }
        };
        self.cache.store_avatar(username, url.clone());
        url
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
        time::Duration,
    };

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    use super::{IdentityService, PronounRecord};

    /// Scripted identity provider with per-user latency and call counters.
    #[derive(Default)]
    pub struct StubIdentityService {
        pronouns: Mutex<HashMap<String, PronounRecord>>,
        avatars: Mutex<HashMap<String, String>>,
        delays: Mutex<HashMap<String, Duration>>,
        pronoun_calls: AtomicUsize,
        avatar_calls: AtomicUsize,
    }

    impl StubIdentityService {
        pub fn with_pronouns(self, login: &str, subject: &str, object: &str) -> Self {
            self.pronouns.lock().expect("stub lock").insert(
                login.to_owned(),
                PronounRecord {
                    subject: subject.to_owned(),
                    object: object.to_owned(),
                },
            );
            self
        }

        pub fn with_avatar(self, login: &str, body: &str) -> Self {
            self.avatars
                .lock()
                .expect("stub lock")
                .insert(login.to_owned(), body.to_owned());
            self
        }

        pub fn with_delay(self, login: &str, delay: Duration) -> Self {
            self.delays
                .lock()
                .expect("stub lock")
                .insert(login.to_owned(), delay);
            self
        }

        pub fn pronoun_calls(&self) -> usize {
            self.pronoun_calls.load(Ordering::SeqCst)
        }

        pub fn avatar_calls(&self) -> usize {
            self.avatar_calls.load(Ordering::SeqCst)
        }

        async fn simulate_latency(&self, login: &str) {
            let delay = self.delays.lock().expect("stub lock").get(login).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
        }
    }

    #[async_trait]
    impl IdentityService for StubIdentityService {
        async fn fetch_pronouns(&self, login: &str) -> Result<Vec<PronounRecord>> {
            self.pronoun_calls.fetch_add(1, Ordering::SeqCst);
            self.simulate_latency(login).await;
            let record = self.pronouns.lock().expect("stub lock").get(login).cloned();
            Ok(record.into_iter().collect())
        }

        async fn fetch_avatar(&self, login: &str) -> Result<String> {
            self.avatar_calls.fetch_add(1, Ordering::SeqCst);
            self.simulate_latency(login).await;
            self.avatars
                .lock()
                .expect("stub lock")
                .get(login)
                .cloned()
                .ok_or_else(|| anyhow!("stub has no avatar for {login}"))
        }
    }
}
