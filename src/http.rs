use crate::models::ErrorKind;
use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("unexpected status {0}")]
    Status(u16),
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Timeout => ErrorKind::Timeout,
            FetchError::Transport(_) | FetchError::Status(_) => ErrorKind::Transport,
        }
    }
}

/// Network seam used by the resolvers; the scripted doubles in the tier
/// tests implement it without touching the network.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_text(&self, url: &str, referer: &str) -> Result<String, FetchError>;
    async fn fetch_json(&self, url: &str, referer: &str) -> Result<Value, FetchError>;
}

/// Browser-like identity presented on a request. Rotated per attempt to
/// blur the client fingerprint, not for correctness.
#[derive(Debug, Clone, Copy)]
pub struct HeaderProfile {
    pub user_agent: &'static str,
    pub accept: &'static str,
    pub accept_language: &'static str,
}

pub const HEADER_PROFILES: &[HeaderProfile] = &[
    HeaderProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        accept_language: "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7",
    },
    HeaderProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        accept_language: "ru-RU,ru;q=0.8,en-US;q=0.5,en;q=0.3",
    },
    HeaderProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 \
                     Firefox/121.0",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,*/*;q=0.8",
        accept_language: "ru-RU,ru;q=0.9,en;q=0.6",
    },
];

pub fn pick_profile() -> HeaderProfile {
    let index = rand::rng().random_range(0..HEADER_PROFILES.len());
    HEADER_PROFILES[index]
}

/// Sleeps a random duration in `range`. Zero-width ranges sleep the fixed
/// amount; a zero max skips the pause entirely (tests run dry).
pub async fn jitter_pause(range: (Duration, Duration)) {
    let (min, max) = range;
    if max.is_zero() {
        return;
    }
    let millis = if max > min {
        rand::rng().random_range(min.as_millis() as u64..=max.as_millis() as u64)
    } else {
        min.as_millis() as u64
    };
    sleep(Duration::from_millis(millis)).await;
}

/// Connection/session pool shared by every concurrent task in a run.
/// Opened once before scheduling begins and dropped once when the run
/// scope ends, on every exit path.
#[derive(Debug, Clone)]
pub struct HttpSession {
    client: Client,
}

impl HttpSession {
    pub fn open(per_request_timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(per_request_timeout)
            .connect_timeout(Duration::from_secs(5))
            .cookie_store(true)
            .build()
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        Ok(Self { client })
    }

    async fn send(&self, url: &str, referer: &str) -> Result<reqwest::Response, FetchError> {
        let profile = pick_profile();
        let response = self
            .client
            .get(url)
            .header("User-Agent", profile.user_agent)
            .header("Accept", profile.accept)
            .header("Accept-Language", profile.accept_language)
            .header("Referer", referer)
            .header("Connection", "keep-alive")
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Transport(err.to_string())
                }
            })?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl Fetcher for HttpSession {
    async fn fetch_text(&self, url: &str, referer: &str) -> Result<String, FetchError> {
        let response = self.send(url, referer).await?;
        response.text().await.map_err(|err| {
            if err.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Transport(err.to_string())
            }
        })
    }

    async fn fetch_json(&self, url: &str, referer: &str) -> Result<Value, FetchError> {
        let response = self.send(url, referer).await?;
        response
            .json::<Value>()
            .await
            .map_err(|err| FetchError::Transport(format!("malformed envelope: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn profile_rotation_stays_in_pool() {
        for _ in 0..16 {
            let profile = pick_profile();
            assert!(
                HEADER_PROFILES
                    .iter()
                    .any(|candidate| candidate.user_agent == profile.user_agent)
            );
        }
    }

    #[test]
    fn fetch_error_kinds_map_to_taxonomy() {
        assert_eq!(FetchError::Timeout.kind(), ErrorKind::Timeout);
        assert_eq!(FetchError::Status(403).kind(), ErrorKind::Transport);
        assert_eq!(
            FetchError::Transport("reset".into()).kind(),
            ErrorKind::Transport
        );
    }

    #[tokio::test]
    async fn zero_jitter_does_not_sleep() {
        let started = Instant::now();
        jitter_pause((Duration::ZERO, Duration::ZERO)).await;
        assert!(started.elapsed() < Duration::from_millis(50));
    }
}
