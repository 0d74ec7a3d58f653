//! Outbound call throttling shared by all concurrent runs.
//!
//! A [`Throttle`] spaces calls on the same *lane* by a minimum delay (plus
//! optional jitter) and can cap the number of calls in flight across all
//! lanes. Lanes are plain strings: one per search provider, one for the
//! judge, and one per fetched domain (scheme + host + port).
//!
//! [`Throttled`] wraps any [`SearchProvider`], [`Judge`], [`Fetcher`] or
//! [`ImageProbe`] and picks the lane from the call.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use scout_core::throttle::{Throttle, ThrottleConfig, Throttled};
//!
//! # use scout_core::traits::Fetcher;
//! # #[derive(Clone)] struct MyFetcher;
//! # impl Fetcher for MyFetcher {
//! #     async fn fetch(&self, _: &str) -> Result<String, scout_core::error::AppError> { todo!() }
//! # }
//! let throttle = Throttle::new(
//!     ThrottleConfig::new(Duration::from_secs(1))
//!         .with_jitter(Duration::from_millis(500))
//!         .with_max_in_flight(8),
//! );
//! let fetcher = Throttled::new(MyFetcher, throttle.clone());
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use url::Url;

use crate::error::AppError;
use crate::models::{RawResult, SearchConfig};
use crate::traits::{Fetcher, ImageProbe, Judge, JudgeRequest, SearchProvider};

#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Minimum delay between consecutive calls on the same lane.
    pub delay: Duration,

    /// Maximum random jitter added on top of `delay` (uniform [0, jitter]).
    pub jitter: Duration,

    /// Upper bound on calls in flight across all lanes. `None` means unbounded.
    pub max_in_flight: Option<usize>,
}

impl ThrottleConfig {
    /// Create a new config with the given per-lane delay, no jitter and no cap.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            jitter: Duration::ZERO,
            max_in_flight: None,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = Some(max.max(1));
        self
    }

    /// Compute the effective delay for a single wait (delay + random jitter).
    fn effective_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.delay;
        }
        let jitter_ms = rand_jitter_ms(self.jitter.as_millis() as u64);
        self.delay + Duration::from_millis(jitter_ms)
    }
}

impl Default for ThrottleConfig {
    /// 1 second delay, 500ms jitter, no in-flight cap.
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            jitter: Duration::from_millis(500),
            max_in_flight: None,
        }
    }
}

/// Held for the duration of one throttled call.
pub struct ThrottlePermit {
    _permit: Option<OwnedSemaphorePermit>,
}

/// Shared lane scheduler. Cloning shares state.
#[derive(Clone)]
pub struct Throttle {
    config: ThrottleConfig,
    /// Earliest start time already handed out per lane.
    next_slot: Arc<Mutex<HashMap<String, Instant>>>,
    in_flight: Option<Arc<Semaphore>>,
}

impl Throttle {
    pub fn new(config: ThrottleConfig) -> Self {
        let in_flight = config.max_in_flight.map(|n| Arc::new(Semaphore::new(n)));
        Self {
            config,
            next_slot: Arc::new(Mutex::new(HashMap::new())),
            in_flight,
        }
    }

    /// Extract the domain key from a URL (scheme://host:port).
    pub fn domain_key(url_str: &str) -> Option<String> {
        let url = Url::parse(url_str).ok()?;
        let host = url.host_str()?;
        let port = url
            .port_or_known_default()
            .map(|p| format!(":{p}"))
            .unwrap_or_default();
        Some(format!("{}://{}{}", url.scheme(), host, port))
    }

    /// Wait for a free in-flight slot and for this lane's next start time.
    pub async fn acquire(&self, lane: &str) -> ThrottlePermit {
        let permit = match &self.in_flight {
            Some(sem) => Arc::clone(sem).acquire_owned().await.ok(),
            None => None,
        };

        let start_at = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let start_at = match slots.get(lane) {
                Some(&reserved) if reserved > now => reserved,
                _ => now,
            };
            slots.insert(lane.to_string(), start_at + self.config.effective_delay());
            start_at
        };

        if start_at > Instant::now() {
            tracing::debug!(
                lane = %lane,
                sleep_ms = %(start_at - Instant::now()).as_millis(),
                "Throttling call"
            );
            tokio::time::sleep_until(start_at).await;
        }

        ThrottlePermit { _permit: permit }
    }
}

/// Wraps a capability so every call goes through a [`Throttle`] lane.
#[derive(Clone)]
pub struct Throttled<T> {
    inner: T,
    throttle: Throttle,
}

impl<T> Throttled<T> {
    pub fn new(inner: T, throttle: Throttle) -> Self {
        Self { inner, throttle }
    }

    async fn url_permit(&self, prefix: &str, url: &str) -> Option<ThrottlePermit> {
        match Throttle::domain_key(url) {
            Some(domain) => Some(self.throttle.acquire(&format!("{prefix}:{domain}")).await),
            None => None,
        }
    }
}

impl<T: SearchProvider> SearchProvider for Throttled<T> {
    async fn search(&self, config: &SearchConfig, query: &str) -> Result<Vec<RawResult>, AppError> {
        let _permit = self
            .throttle
            .acquire(&format!("search:{}", config.provider))
            .await;
        self.inner.search(config, query).await
    }
}

impl<T: Judge> Judge for Throttled<T> {
    async fn judge(&self, request: JudgeRequest<'_>) -> Result<serde_json::Value, AppError> {
        let _permit = self.throttle.acquire("judge").await;
        self.inner.judge(request).await
    }
}

impl<T: Fetcher> Fetcher for Throttled<T> {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let _permit = self.url_permit("fetch", url).await;
        self.inner.fetch(url).await
    }
}

impl<T: ImageProbe> ImageProbe for Throttled<T> {
    async fn probe(&self, url: &str) -> Result<bool, AppError> {
        let _permit = self.url_permit("image", url).await;
        self.inner.probe(url).await
    }
}

// Jitter from a time-seeded xorshift; not suitable for anything but spacing calls.
fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}
