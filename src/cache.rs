//! Refresh-on-expiry cache for the rendered digest.
//!
//! The cache keeps one [`Snapshot`] for the whole process. Readers take the
//! current snapshot under a shared lock; when it is older than the TTL, one
//! caller wins the refresh lock, re-checks staleness and runs the fetch and
//! render. Everybody else either keeps reading the old snapshot or waits on
//! the refresh lock and then sees the new one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::FetchError;
use crate::fetch::Fetcher;
use crate::render::Renderer;

/// Source of wall-clock time for TTL checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Cached state at a point in time. Never mutated once published.
#[derive(Debug, Default)]
pub struct Snapshot {
    content: String,
    raw_content: String,
    fetched_at: Option<DateTime<Utc>>,
    last_error: Option<Arc<FetchError>>,
    succeeded: bool,
}

impl Snapshot {
    /// Rendered markup of the last successful refresh, empty if none.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Fetched text the current `content` was rendered from.
    pub fn raw_content(&self) -> &str {
        &self.raw_content
    }

    /// When the last refresh attempt finished, successful or not.
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_deref()
    }

    pub fn has_succeeded(&self) -> bool {
        self.succeeded
    }

    fn with_success(raw_content: String, content: String, at: DateTime<Utc>) -> Self {
        Self {
            content,
            raw_content,
            fetched_at: Some(at),
            last_error: None,
            succeeded: true,
        }
    }

    fn with_failure(&self, err: FetchError, at: DateTime<Utc>) -> Self {
        Self {
            content: self.content.clone(),
            raw_content: self.raw_content.clone(),
            fetched_at: Some(at),
            last_error: Some(Arc::new(err)),
            succeeded: self.succeeded,
        }
    }

    /// Stamp for the next attempt. Never earlier than the previous one, so a
    /// clock stepping backwards cannot reorder attempts.
    fn next_stamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.fetched_at {
            Some(prev) if prev > now => prev,
            _ => now,
        }
    }

    /// Whether this snapshot is due for a refresh at `now`.
    ///
    /// A snapshot nobody has tried to fill yet is always due. After that,
    /// failed and successful attempts alike wait out the TTL.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match self.fetched_at {
            None => true,
            Some(at) => {
                // A negative age (clock skew) counts as just fetched.
                let age = (now - at).to_std().unwrap_or_default();
                age >= ttl
            }
        }
    }

    pub fn state(&self, now: DateTime<Utc>, ttl: Duration) -> CacheState {
        match (self.succeeded, self.last_error.is_some()) {
            (false, false) => CacheState::Empty,
            (false, true) => CacheState::Failed,
            (true, true) => CacheState::StaleWithError,
            (true, false) if self.is_stale(now, ttl) => CacheState::Stale,
            (true, false) => CacheState::Fresh,
        }
    }
}

/// Lifecycle of the cached digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No refresh attempted yet.
    Empty,
    /// Never succeeded; the latest attempt failed.
    Failed,
    /// Succeeded and within the TTL.
    Fresh,
    /// Succeeded once, TTL elapsed, next read refreshes.
    Stale,
    /// Latest attempt failed; the last good content is retained.
    StaleWithError,
}

pub struct RefreshCache {
    ttl: Duration,
    fetcher: Arc<dyn Fetcher>,
    renderer: Arc<dyn Renderer>,
    clock: Arc<dyn Clock>,
    snapshot: RwLock<Arc<Snapshot>>,
    refresh_lock: Mutex<()>,
}

impl RefreshCache {
    pub fn new(ttl: Duration, fetcher: Arc<dyn Fetcher>, renderer: Arc<dyn Renderer>) -> Self {
        Self::with_clock(ttl, fetcher, renderer, Arc::new(SystemClock))
    }

    pub fn with_clock(
        ttl: Duration,
        fetcher: Arc<dyn Fetcher>,
        renderer: Arc<dyn Renderer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ttl,
            fetcher,
            renderer,
            clock,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current snapshot, without triggering a refresh.
    pub async fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    pub async fn state(&self) -> CacheState {
        self.snapshot().await.state(self.clock.now(), self.ttl)
    }

    /// Best available snapshot, refreshing it first when it is stale.
    ///
    /// Never fails: a failed refresh leaves the previous content in place and
    /// records the error on the returned snapshot.
    ///
    /// The refresh itself runs on a spawned task, so a caller that goes away
    /// mid-refresh does not cancel it.
    pub async fn get_current(self: &Arc<Self>) -> Arc<Snapshot> {
        let current = self.snapshot().await;
        if !current.is_stale(self.clock.now(), self.ttl) {
            return current;
        }

        let cache = Arc::clone(self);
        match tokio::spawn(async move { cache.refresh().await }).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(error = %err, "refresh task aborted");
                self.snapshot().await
            }
        }
    }

    async fn refresh(&self) -> Arc<Snapshot> {
        let _guard = self.refresh_lock.lock().await;

        // Someone else may have refreshed while we waited for the lock.
        let current = self.snapshot().await;
        if !current.is_stale(self.clock.now(), self.ttl) {
            debug!("snapshot refreshed by a concurrent caller");
            return current;
        }

        info!("digest expired or empty, refreshing");
        let started = Instant::now();
        let result = self.fetcher.fetch().await;
        let at = current.next_stamp(self.clock.now());

        let next = match result {
            Ok(raw) => {
                let content = self.renderer.render(&raw);
                info!(
                    raw_bytes = raw.len(),
                    markup_bytes = content.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "digest refreshed"
                );
                Snapshot::with_success(raw, content, at)
            }
            Err(err) => {
                warn!(
                    error = %err,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    retry_in_s = self.ttl.as_secs(),
                    "digest refresh failed, keeping previous content"
                );
                current.with_failure(err, at)
            }
        };

        let next = Arc::new(next);
        *self.snapshot.write().await = Arc::clone(&next);
        next
    }
}
