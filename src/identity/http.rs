use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

use super::{IdentityService, PronounRecord};

pub const PRONOUNS_API_BASE: &str = "https://pronouns.alejo.io/api/users";
pub const AVATAR_API_BASE: &str = "https://decapi.me/twitch/avatar";

/// Pronoun and avatar providers reached over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpIdentityService {
    client: reqwest::Client,
    pronouns_base: String,
    avatar_base: String,
}

impl HttpIdentityService {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_endpoints(timeout, PRONOUNS_API_BASE, AVATAR_API_BASE)
    }

    pub fn with_endpoints(
        timeout: Duration,
        pronouns_base: impl Into<String>,
        avatar_base: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("y2k-chat-overlay/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed building identity http client")?;
        Ok(Self {
            client,
            pronouns_base: pronouns_base.into().trim_end_matches('/').to_owned(),
            avatar_base: avatar_base.into().trim_end_matches('/').to_owned(),
        })
    }
}

#[async_trait]
impl IdentityService for HttpIdentityService {
    async fn fetch_pronouns(&self, login: &str) -> Result<Vec<PronounRecord>> {
        let url = format!("{}/{login}", self.pronouns_base);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("pronoun lookup request failed for {login}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("pronoun lookup for {login} returned {status}"));
        }
        response
            .json::<Vec<PronounRecord>>()
            .await
            .with_context(|| format!("invalid pronoun payload for {login}"))
    }

    async fn fetch_avatar(&self, login: &str) -> Result<String> {
        let url = format!("{}/{login}", self.avatar_base);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("avatar lookup request failed for {login}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("avatar lookup for {login} returned {status}"));
        }
        response
            .text()
            .await
            .with_context(|| format!("unreadable avatar payload for {login}"))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use axum::{http::StatusCode, routing::get, Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::HttpIdentityService;
    use crate::identity::{fallback_avatar_url, IdentityCache, IdentityResolver, IdentityService};

    const TIMEOUT: Duration = Duration::from_secs(2);

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("test server");
        });
        format!("http://{addr}")
    }

    fn service(base: &str) -> HttpIdentityService {
        HttpIdentityService::with_endpoints(
            TIMEOUT,
            format!("{base}/pronouns/"),
            format!("{base}/avatar/"),
        )
        .expect("identity client")
    }

    #[tokio::test]
    async fn non_success_status_is_an_error_even_with_url_body() {
        let base = serve(Router::new().route(
            "/avatar/missing",
            get(|| async { (StatusCode::NOT_FOUND, "https://x") }),
        ))
        .await;

        assert!(service(&base).fetch_avatar("missing").await.is_err());
    }

    #[tokio::test]
    async fn pronoun_body_must_be_an_array() {
        let base = serve(Router::new().route(
            "/pronouns/odd",
            get(|| async { (StatusCode::OK, "{}") }),
        ))
        .await;

        assert!(service(&base).fetch_pronouns("odd").await.is_err());
    }

    #[tokio::test]
    async fn pronoun_records_parse_from_trimmed_base() {
        let base = serve(Router::new().route(
            "/pronouns/glitchqueen",
            get(|| async { Json(json!([{ "subject": "she", "object": "her" }])) }),
        ))
        .await;

        let records = service(&base)
            .fetch_pronouns("glitchqueen")
            .await
            .expect("pronoun records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].display(), "she/her");
    }

    #[tokio::test]
    async fn failing_avatar_endpoint_is_hit_once_then_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let route_hits = hits.clone();
        let base = serve(Router::new().route(
            "/avatar/flaky",
            get(move || {
                let hits = route_hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }),
        ))
        .await;
        let resolver = IdentityResolver::new(Arc::new(IdentityCache::new()), Arc::new(service(&base)));

        assert_eq!(resolver.resolve_avatar("Flaky").await, fallback_avatar_url("Flaky"));
        assert_eq!(resolver.resolve_avatar("Flaky").await, fallback_avatar_url("Flaky"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_endpoint_degrades_to_fallback() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("reserve port");
        let addr = listener.local_addr().expect("listener addr");
        drop(listener);
        let resolver = IdentityResolver::new(
            Arc::new(IdentityCache::new()),
            Arc::new(service(&format!("http://{addr}"))),
        );

        assert!(resolver.resolve_pronouns("Ghost").await.is_none());
        assert_eq!(resolver.resolve_avatar("Ghost").await, fallback_avatar_url("Ghost"));
        assert_eq!(
            resolver.cache().avatar("ghost"),
            Some(fallback_avatar_url("Ghost"))
        );
        assert!(resolver.cache().pronouns("ghost").is_none());
    }
}
