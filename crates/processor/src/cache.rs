//! Keyed single-flight cache with TTL expiry and stale fallback.
//!
//! Published values are replaced, never mutated, and at most one fetch is in
//! flight per key: the in-flight marker is installed under the map lock
//! before any I/O starts, and concurrent callers await the same shared
//! future. A failed refresh leaves the previous value in place so stale data
//! can be served instead of an error.

use chainpulse_ingestor::error::FetchError;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
    future::Future,
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};
use tracing::warn;

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, FetchError>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Served from a fresh entry, no upstream call.
    Hit,
    /// Fetched from upstream (directly or by joining an in-flight fetch).
    Miss,
    /// Refresh failed; an expired entry was served instead.
    Stale,
}

impl Display for CacheStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Stale => "stale",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct Lookup<T> {
    pub data: T,
    pub status: CacheStatus,
}

struct Stored<T> {
    data: T,
    stored_at: Instant,
}

struct Slot<T> {
    value: Option<Stored<T>>,
    inflight: Option<SharedFetch<T>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            value: None,
            inflight: None,
        }
    }
}

pub struct CacheStore<T: Clone + Send + 'static> {
    name: &'static str,
    ttl: Duration,
    stale_if_error: bool,
    slots: Mutex<HashMap<String, Slot<T>>>,
}

enum Plan<T: Clone> {
    Hit(T),
    Join(SharedFetch<T>),
    Lead(SharedFetch<T>),
}

impl<T: Clone + Send + 'static> CacheStore<T> {
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            stale_if_error: true,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Surfaces refresh errors even when an expired entry exists.
    pub fn without_stale_fallback(mut self) -> Self {
        self.stale_if_error = false;
        self
    }

    /// Returns the cached value for `key`, fetching it via `fetch` when the
    /// entry is missing or expired. Any number of concurrent callers for the
    /// same uncached key produce exactly one `fetch` invocation.
    pub async fn get<F, Fut>(&self, key: &str, fetch: F) -> Result<Lookup<T>, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let plan = {
            let mut slots = self.lock();
            let slot = slots.entry(key.to_string()).or_default();
            let fresh = slot
                .value
                .as_ref()
                .filter(|stored| stored.stored_at.elapsed() < self.ttl)
                .map(|stored| stored.data.clone());

            if let Some(data) = fresh {
                Plan::Hit(data)
            } else if let Some(inflight) = &slot.inflight {
                Plan::Join(inflight.clone())
            } else {
                // The marker must be installed before the lock is released,
                // closing the race window ahead of any I/O.
                let fut = fetch().boxed().shared();
                slot.inflight = Some(fut.clone());
                Plan::Lead(fut)
            }
        };

        match plan {
            Plan::Hit(data) => {
                metrics::counter!("chainpulse_cache_hit", "cache" => self.name).increment(1);
                Ok(Lookup {
                    data,
                    status: CacheStatus::Hit,
                })
            }
            Plan::Join(fut) => match fut.await {
                Ok(data) => Ok(Lookup {
                    data,
                    status: CacheStatus::Miss,
                }),
                Err(err) => self.stale_or(key, err),
            },
            Plan::Lead(fut) => {
                let handle = fut.clone();
                let result = fut.await;

                {
                    let mut slots = self.lock();
                    // Invalidation may have dropped the slot while the fetch
                    // ran, and a newer fetch may already be installed in its
                    // place. Publish and clear the marker only while this
                    // fetch still owns the slot, otherwise a pre-invalidation
                    // result would overwrite the newer fetch's state.
                    if let Some(slot) = slots.get_mut(key) {
                        let owns_slot = slot
                            .inflight
                            .as_ref()
                            .is_some_and(|current| current.ptr_eq(&handle));
                        if owns_slot {
                            slot.inflight = None;
                            if let Ok(data) = &result {
                                slot.value = Some(Stored {
                                    data: data.clone(),
                                    stored_at: Instant::now(),
                                });
                            }
                        }
                    }
                }

                match result {
                    Ok(data) => {
                        metrics::counter!("chainpulse_cache_miss", "cache" => self.name)
                            .increment(1);
                        Ok(Lookup {
                            data,
                            status: CacheStatus::Miss,
                        })
                    }
                    Err(err) => {
                        warn!(cache = self.name, key, error = %err, "cache refresh failed");
                        metrics::counter!("chainpulse_cache_refresh_failed", "cache" => self.name)
                            .increment(1);
                        self.stale_or(key, err)
                    }
                }
            }
        }
    }

    /// Explicit clear, used by the cache-bypass control.
    pub fn invalidate(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn invalidate_all(&self) {
        self.lock().clear();
    }

    fn stale_or(&self, key: &str, err: FetchError) -> Result<Lookup<T>, FetchError> {
        if self.stale_if_error {
            let slots = self.lock();
            if let Some(stored) = slots.get(key).and_then(|slot| slot.value.as_ref()) {
                metrics::counter!("chainpulse_cache_stale_served", "cache" => self.name)
                    .increment(1);
                return Ok(Lookup {
                    data: stored.data.clone(),
                    status: CacheStatus::Stale,
                });
            }
        }
        Err(err)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot<T>>> {
        self.slots.lock().expect("cache lock poisoned")
    }
}
