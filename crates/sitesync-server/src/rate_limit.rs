//! Per-client sliding-window rate limiting.
//!
//! Every client address owns two timestamp queues, one per window. A request
//! is recorded first, expired timestamps are evicted, and the request is
//! rejected when either window holds more entries than its ceiling.

use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sitesync_core::site::{
    parse_setting, SettingsProvider, RATE_LIMIT_PER_HOUR_KEY, RATE_LIMIT_PER_MINUTE_KEY,
};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::error::AppError;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DEFAULT_PER_MINUTE: u32 = 60;
const DEFAULT_PER_HOUR: u32 = 1_000;

/// Clients idle for longer than this are forgotten by [`RateLimiter::sweep`]
pub const IDLE_TTL: Duration = Duration::from_secs(2 * 60 * 60);
/// How often the background sweeper runs
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Monotonic time source
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Ceilings for the two windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub per_minute: u32,
    pub per_hour: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_minute: DEFAULT_PER_MINUTE,
            per_hour: DEFAULT_PER_HOUR,
        }
    }
}

impl RateLimits {
    /// Environment first, then the site's settings, then the defaults.
    pub fn resolve(config: &AppConfig, settings: &dyn SettingsProvider) -> Self {
        let defaults = Self::default();
        let per_minute = config
            .rate_limit_per_minute
            .or_else(|| parse_setting::<u32>(settings, RATE_LIMIT_PER_MINUTE_KEY))
            .filter(|value| *value > 0)
            .unwrap_or(defaults.per_minute);
        let per_hour = config
            .rate_limit_per_hour
            .or_else(|| parse_setting::<u32>(settings, RATE_LIMIT_PER_HOUR_KEY))
            .filter(|value| *value > 0)
            .unwrap_or(defaults.per_hour);
        Self {
            per_minute,
            per_hour,
        }
    }
}

#[derive(Default)]
struct RateLimitMetrics {
    allowed: AtomicU64,
    limited: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitMetricsSnapshot {
    pub allowed: u64,
    pub limited: u64,
    pub tracked_clients: usize,
    pub per_minute: u32,
    pub per_hour: u32,
}

struct ClientWindows {
    minute: VecDeque<Instant>,
    hour: VecDeque<Instant>,
    last_seen: Instant,
}

impl ClientWindows {
    fn new(now: Instant) -> Self {
        Self {
            minute: VecDeque::new(),
            hour: VecDeque::new(),
            last_seen: now,
        }
    }

    fn record(&mut self, now: Instant) {
        self.minute.push_back(now);
        self.hour.push_back(now);
        self.last_seen = now;
        evict(&mut self.minute, now, MINUTE);
        evict(&mut self.hour, now, HOUR);
    }
}

fn evict(window: &mut VecDeque<Instant>, now: Instant, length: Duration) {
    while window
        .front()
        .is_some_and(|oldest| now.saturating_duration_since(*oldest) >= length)
    {
        window.pop_front();
    }
}

fn retry_after(window: &VecDeque<Instant>, now: Instant, length: Duration) -> u64 {
    window.front().map_or(1, |oldest| {
        length
            .saturating_sub(now.saturating_duration_since(*oldest))
            .as_secs()
            .max(1)
    })
}

pub struct RateLimiter {
    clients: RwLock<HashMap<String, Arc<Mutex<ClientWindows>>>>,
    limits: RateLimits,
    clock: Arc<dyn Clock>,
    metrics: RateLimitMetrics,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self::with_clock(limits, Arc::new(SystemClock))
    }

    pub fn with_clock(limits: RateLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            limits,
            clock,
            metrics: RateLimitMetrics::default(),
        }
    }

    pub const fn limits(&self) -> RateLimits {
        self.limits
    }

    /// Record a request from `client` and decide whether it may proceed.
    ///
    /// Requests from different clients only contend on the map lookup.
    pub async fn check(&self, client: &str) -> Result<(), AppError> {
        let candidate = self.windows_for(client).await;
        let mut windows = self.lock_current(client, candidate).await;
        let now = self.clock.now();
        windows.record(now);

        let exceeded = if windows.minute.len() > self.limits.per_minute as usize {
            Some(("minute", retry_after(&windows.minute, now, MINUTE)))
        } else if windows.hour.len() > self.limits.per_hour as usize {
            Some(("hour", retry_after(&windows.hour, now, HOUR)))
        } else {
            None
        };
        drop(windows);

        if let Some((window, retry_after_secs)) = exceeded {
            self.metrics.limited.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                client = client_fingerprint(client),
                window,
                retry_after_secs,
                "Rate limit exceeded"
            );
            return Err(AppError::too_many_requests(
                format!("Rate limit exceeded for the current {window}"),
                retry_after_secs,
            ));
        }

        self.metrics.allowed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Forget clients idle for longer than [`IDLE_TTL`].
    ///
    /// Entries currently locked by an in-flight request are kept.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut clients = self.clients.write().await;
        let before = clients.len();
        clients.retain(|_, windows| {
            windows.try_lock().map_or(true, |windows| {
                now.saturating_duration_since(windows.last_seen) < IDLE_TTL
            })
        });
        before - clients.len()
    }

    /// Run [`Self::sweep`] every `interval` until the handle is aborted
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = self.sweep().await;
                if removed > 0 {
                    tracing::debug!(removed, "Swept idle rate limit entries");
                }
            }
        })
    }

    pub async fn metrics_snapshot(&self) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            allowed: self.metrics.allowed.load(Ordering::Relaxed),
            limited: self.metrics.limited.load(Ordering::Relaxed),
            tracked_clients: self.clients.read().await.len(),
            per_minute: self.limits.per_minute,
            per_hour: self.limits.per_hour,
        }
    }

    async fn windows_for(&self, client: &str) -> Arc<Mutex<ClientWindows>> {
        if let Some(windows) = self.clients.read().await.get(client) {
            return windows.clone();
        }
        let now = self.clock.now();
        self.clients
            .write()
            .await
            .entry(client.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ClientWindows::new(now))))
            .clone()
    }

    /// Lock the windows that are still registered for `client`.
    ///
    /// A sweep can drop `candidate` from the map between lookup and lock; the
    /// lookup is then repeated so no request lands in a forgotten window.
    async fn lock_current(
        &self,
        client: &str,
        mut candidate: Arc<Mutex<ClientWindows>>,
    ) -> OwnedMutexGuard<ClientWindows> {
        loop {
            let guard = Arc::clone(&candidate).lock_owned().await;
            let registered = self
                .clients
                .read()
                .await
                .get(client)
                .is_some_and(|current| Arc::ptr_eq(current, &candidate));
            if registered {
                return guard;
            }
            drop(guard);
            candidate = self.windows_for(client).await;
        }
    }
}

fn client_fingerprint(client: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    client.hash(&mut hasher);
    hasher.finish()
}
