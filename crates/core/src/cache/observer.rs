use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

/// Lifecycle notification emitted by [`super::TtlCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheEvent<'a> {
    Hit { key: &'a str },
    Miss { key: &'a str },
    Set { key: &'a str, ttl: Duration },
    Expired { key: &'a str },
    Invalidated { key: &'a str },
    Evicted { key: &'a str },
    Cleared { entries: usize },
}

impl CacheEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hit { .. } => "cache.hit",
            Self::Miss { .. } => "cache.miss",
            Self::Set { .. } => "cache.set",
            Self::Expired { .. } => "cache.expired",
            Self::Invalidated { .. } => "cache.invalidated",
            Self::Evicted { .. } => "cache.evicted",
            Self::Cleared { .. } => "cache.cleared",
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Hit { key }
            | Self::Miss { key }
            | Self::Set { key, .. }
            | Self::Expired { key }
            | Self::Invalidated { key }
            | Self::Evicted { key } => Some(key),
            Self::Cleared { .. } => None,
        }
    }
}

pub trait CacheObserver: Send + Sync {
    fn observe(&self, event: CacheEvent<'_>);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCacheObserver;

impl CacheObserver for NoopCacheObserver {
    fn observe(&self, _event: CacheEvent<'_>) {}
}

/// Routes cache lifecycle events into structured `tracing` output.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingCacheObserver;

impl CacheObserver for TracingCacheObserver {
    fn observe(&self, event: CacheEvent<'_>) {
        match event {
            CacheEvent::Set { key, ttl } => {
                debug!(event_name = "cache.set", cache_key = key, ttl_secs = ttl.as_secs(), "cache set");
            }
            CacheEvent::Cleared { entries } => {
                debug!(event_name = "cache.cleared", entries, "cache cleared");
            }
            other => {
                debug!(event_name = other.name(), cache_key = other.key().unwrap_or(""), "cache event");
            }
        }
    }
}

/// Keeps every event in memory; used by tests and diagnostics.
#[derive(Clone, Default)]
pub struct InMemoryCacheObserver {
    events: Arc<Mutex<Vec<(&'static str, Option<String>)>>>,
}

impl InMemoryCacheObserver {
    pub fn events(&self) -> Vec<(&'static str, Option<String>)> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self, name: &str) -> usize {
        self.events().iter().filter(|(event, _)| *event == name).count()
    }
}

impl CacheObserver for InMemoryCacheObserver {
    fn observe(&self, event: CacheEvent<'_>) {
        let record = (event.name(), event.key().map(str::to_owned));
        match self.events.lock() {
            Ok(mut events) => events.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}
