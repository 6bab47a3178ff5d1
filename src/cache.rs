//! Bounded in-memory caches for registry metadata and plugin logos.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Capacity of the registry metadata cache.
pub const METADATA_CACHE_CAPACITY: usize = 200;

/// Expiry of registry metadata entries.
pub const METADATA_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

/// Capacity of the logo cache.
pub const LOGO_CACHE_CAPACITY: usize = 50;

struct Entry<V> {
    value: V,
    inserted: Instant,
}

struct Inner<V> {
    map: HashMap<String, Entry<V>>,
    order: VecDeque<String>,
}

/// A bounded LRU cache with an optional per-entry time-to-live.
///
/// Least-recently-used entries are evicted once the capacity is reached;
/// expired entries behave as misses and are dropped on access.
pub struct BoundedCache<V> {
    inner: Mutex<Inner<V>>,
    capacity: usize,
    ttl: Option<Duration>,
}

impl<V: Clone> BoundedCache<V> {
    /// Create a cache that never expires entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity,
            ttl: None,
        }
    }

    /// Create a cache whose entries expire after `ttl`.
    pub fn with_ttl(capacity: usize, ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::new(capacity)
        }
    }

    /// Look up a key, refreshing its recency on hit.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().ok()?;
        let expired = match inner.map.get(key) {
            Some(entry) => match self.ttl {
                Some(ttl) => entry.inserted.elapsed() >= ttl,
                None => false,
            },
            None => return None,
        };
        if expired {
            inner.map.remove(key);
            inner.order.retain(|k| k != key);
            return None;
        }
        inner.order.retain(|k| k != key);
        inner.order.push_back(key.to_string());
        inner.map.get(key).map(|e| e.value.clone())
    }

    /// Insert a value, evicting the least-recently-used entry when full.
    pub fn put(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        if let Ok(mut inner) = self.inner.lock() {
            if inner.map.insert(
                key.clone(),
                Entry {
                    value,
                    inserted: Instant::now(),
                },
            )
            .is_none()
            {
                while inner.map.len() > self.capacity {
                    if let Some(oldest) = inner.order.pop_front() {
                        inner.map.remove(&oldest);
                    } else {
                        break;
                    }
                }
            } else {
                inner.order.retain(|k| k != &key);
            }
            inner.order.push_back(key);
        }
    }

    /// Number of live entries (expired entries may still be counted).
    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.map.len()).unwrap_or(0)
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.map.clear();
            inner.order.clear();
        }
    }
}
