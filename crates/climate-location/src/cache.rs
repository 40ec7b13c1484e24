//! Keyed query cache with in-flight de-duplication and time-based refresh.
//!
//! For any key, at most one producer runs at a time; every caller asking for
//! that key while it runs waits on the same result. Producers run on their own
//! task, so a caller that gives up does not cancel the work other callers
//! still wait for.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::LookupError;
use crate::notify::ChangeNotifier;

/// Future returned by a producer. It must own everything it touches because it
/// outlives the caller that started it.
pub type Producer<V> = BoxFuture<'static, Result<V, LookupError>>;

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Pending,
    Fresh,
    Stale,
    Failed,
}

/// What a reader sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Never requested, or not eligible to be requested yet
    Idle,
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    pub ttl: Duration,
    /// Disabled queries never invoke the producer and report `Idle`
    pub enabled: bool,
}

impl QueryOptions {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, enabled: true }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<V> {
    pub value: Option<V>,
    pub status: QueryStatus,
    pub error: Option<LookupError>,
    /// Value is past its TTL and a refresh has been started
    pub stale: bool,
}

impl<V> QueryResult<V> {
    fn idle() -> Self {
        Self {
            value: None,
            status: QueryStatus::Idle,
            error: None,
            stale: false,
        }
    }

    fn success(value: V, stale: bool) -> Self {
        Self {
            value: Some(value),
            status: QueryStatus::Success,
            error: None,
            stale,
        }
    }

    fn failure(error: LookupError, last_value: Option<V>) -> Self {
        Self {
            value: last_value,
            status: QueryStatus::Error,
            error: Some(error),
            stale: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    /// Collapse into a `Result`, treating `Idle`/`Loading` as no value yet.
    pub fn into_result(self) -> Result<Option<V>, LookupError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.value),
        }
    }
}

/// Snapshot of one entry.
#[derive(Debug, Clone)]
pub struct CacheEntry<K, V> {
    pub key: K,
    pub status: EntryStatus,
    pub value: Option<V>,
    pub fetched_at: Option<Instant>,
    pub error: Option<LookupError>,
}

type Settled<V> = Option<Result<V, LookupError>>;

struct InFlight<V> {
    generation: u64,
    rx: watch::Receiver<Settled<V>>,
}

struct Slot<V> {
    value: Option<V>,
    fetched_at: Option<Instant>,
    error: Option<LookupError>,
    ttl: Duration,
    generation: u64,
    in_flight: Option<InFlight<V>>,
}

impl<V> Slot<V> {
    fn new(ttl: Duration) -> Self {
        Self {
            value: None,
            fetched_at: None,
            error: None,
            ttl,
            generation: 0,
            in_flight: None,
        }
    }

    fn status(&self, now: Instant) -> Option<EntryStatus> {
        if self.in_flight.is_some() {
            return Some(EntryStatus::Pending);
        }
        if self.error.is_some() {
            return Some(EntryStatus::Failed);
        }
        match self.fetched_at {
            Some(at) if now.saturating_duration_since(at) < self.ttl => Some(EntryStatus::Fresh),
            Some(_) => Some(EntryStatus::Stale),
            None if self.value.is_some() => Some(EntryStatus::Stale),
            None => None,
        }
    }
}

type Slots<K, V> = Arc<Mutex<HashMap<K, Slot<V>>>>;

/// Keys kept before stale and failed entries are dropped.
pub const DEFAULT_CAPACITY: usize = 256;

pub struct QueryCache<K, V> {
    name: &'static str,
    slots: Slots<K, V>,
    notifier: ChangeNotifier,
    capacity: usize,
}

impl<K, V> QueryCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self::with_notifier(name, ChangeNotifier::new())
    }

    /// Share a notifier so settled requests wake the same subscribers as the stores.
    pub fn with_notifier(name: &'static str, notifier: ChangeNotifier) -> Self {
        Self {
            name,
            slots: Arc::new(Mutex::new(HashMap::new())),
            notifier,
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// Cap the number of keys held. Pending requests are never dropped, so
    /// the map can briefly exceed the cap while they run.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Return the cached value for `key`, or run `producer` to get one.
    ///
    /// - Fresh entries return immediately.
    /// - If a request for `key` is already running, wait for it instead of
    ///   starting another.
    /// - Stale entries return their last value right away and start one
    ///   background refresh.
    /// - Failed or missing entries start a new request and wait for it.
    pub async fn get<F>(&self, key: K, options: QueryOptions, producer: F) -> QueryResult<V>
    where
        F: FnOnce() -> Producer<V>,
    {
        if !options.enabled {
            return QueryResult::idle();
        }

        let mut rx = {
            let mut slots = self.slots.lock();
            let slot = self.slot_for(&mut slots, &key, options.ttl);

            if slot.in_flight.as_ref().is_some_and(|f| f.rx.has_changed().is_err()) {
                // The producer task died without settling; start over.
                tracing::warn!(cache = self.name, ?key, "Replacing abandoned request");
                slot.in_flight = None;
            }

            if let Some(in_flight) = &slot.in_flight {
                tracing::debug!(cache = self.name, ?key, "Attaching to in-flight request");
                in_flight.rx.clone()
            } else {
                match slot.status(Instant::now()) {
                    Some(EntryStatus::Fresh) => {
                        tracing::debug!(cache = self.name, ?key, "Cache hit");
                        if let Some(value) = slot.value.clone() {
                            return QueryResult::success(value, false);
                        }
                        self.start(&key, slot, producer())
                    }
                    Some(EntryStatus::Stale) => {
                        tracing::debug!(cache = self.name, ?key, "Serving stale value, refreshing");
                        let last = slot.value.clone();
                        let rx = self.start(&key, slot, producer());
                        match last {
                            Some(value) => return QueryResult::success(value, true),
                            None => rx,
                        }
                    }
                    _ => {
                        tracing::debug!(cache = self.name, ?key, "Cache miss");
                        self.start(&key, slot, producer())
                    }
                }
            }
        };

        Self::wait(&mut rx).await
    }

    /// Start a new request for `key` even if one is running. The older
    /// request still answers its own waiters but can no longer update the
    /// entry.
    pub async fn refetch<F>(&self, key: K, options: QueryOptions, producer: F) -> QueryResult<V>
    where
        F: FnOnce() -> Producer<V>,
    {
        if !options.enabled {
            return QueryResult::idle();
        }

        let mut rx = {
            let mut slots = self.slots.lock();
            let slot = self.slot_for(&mut slots, &key, options.ttl);
            self.start(&key, slot, producer())
        };

        Self::wait(&mut rx).await
    }

    /// Current state of `key` without invoking anything.
    pub fn peek(&self, key: &K) -> QueryResult<V> {
        let slots = self.slots.lock();
        let Some(slot) = slots.get(key) else {
            return QueryResult::idle();
        };

        match slot.status(Instant::now()) {
            None => QueryResult::idle(),
            Some(EntryStatus::Pending) => QueryResult {
                value: slot.value.clone(),
                status: QueryStatus::Loading,
                error: None,
                stale: slot.value.is_some(),
            },
            Some(EntryStatus::Failed) => QueryResult::failure(
                slot.error.clone().unwrap_or_else(|| LookupError::Unknown("failed".into())),
                slot.value.clone(),
            ),
            Some(status) => match slot.value.clone() {
                Some(value) => QueryResult::success(value, status == EntryStatus::Stale),
                None => QueryResult::idle(),
            },
        }
    }

    pub fn entry(&self, key: &K) -> Option<CacheEntry<K, V>> {
        let slots = self.slots.lock();
        let slot = slots.get(key)?;
        let status = slot.status(Instant::now())?;
        Some(CacheEntry {
            key: key.clone(),
            status,
            value: slot.value.clone(),
            fetched_at: slot.fetched_at,
            error: slot.error.clone(),
        })
    }

    /// Mark `key` stale so the next read refreshes it.
    pub fn invalidate(&self, key: &K) {
        if let Some(slot) = self.slots.lock().get_mut(key) {
            slot.fetched_at = None;
        }
    }

    /// Drop every entry. Running requests finish but their results are discarded.
    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    fn slot_for<'a>(
        &self,
        slots: &'a mut HashMap<K, Slot<V>>,
        key: &K,
        ttl: Duration,
    ) -> &'a mut Slot<V> {
        if !slots.contains_key(key) && slots.len() >= self.capacity {
            self.evict(slots);
        }
        let slot = slots.entry(key.clone()).or_insert_with(|| Slot::new(ttl));
        slot.ttl = ttl;
        slot
    }

    /// Drop stale and failed entries, then the oldest settled ones until a
    /// new key fits.
    fn evict(&self, slots: &mut HashMap<K, Slot<V>>) {
        let now = Instant::now();
        let before = slots.len();
        slots.retain(|_, slot| {
            matches!(
                slot.status(now),
                Some(EntryStatus::Pending) | Some(EntryStatus::Fresh)
            )
        });

        while slots.len() >= self.capacity {
            let oldest = slots
                .iter()
                .filter(|(_, slot)| slot.in_flight.is_none())
                .min_by_key(|(_, slot)| slot.fetched_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    slots.remove(&key);
                }
                None => break,
            }
        }

        tracing::debug!(
            cache = self.name,
            evicted = before - slots.len(),
            "Evicted cache entries"
        );
    }

    fn start(&self, key: &K, slot: &mut Slot<V>, producer: Producer<V>) -> watch::Receiver<Settled<V>> {
        slot.generation += 1;
        let generation = slot.generation;
        let (tx, rx) = watch::channel(None);
        slot.in_flight = Some(InFlight {
            generation,
            rx: rx.clone(),
        });

        let slots = Arc::clone(&self.slots);
        let notifier = self.notifier.clone();
        let name = self.name;
        let key = key.clone();

        tokio::spawn(async move {
            let result = match AssertUnwindSafe(producer).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(LookupError::Unknown("request panicked".into())),
            };

            {
                let mut slots = slots.lock();
                match slots.get_mut(&key) {
                    Some(slot)
                        if slot
                            .in_flight
                            .as_ref()
                            .is_some_and(|f| f.generation == generation) =>
                    {
                        slot.in_flight = None;
                        match &result {
                            Ok(value) => {
                                slot.value = Some(value.clone());
                                slot.fetched_at = Some(Instant::now());
                                slot.error = None;
                            }
                            Err(err) => {
                                tracing::warn!(cache = name, ?key, "Request failed: {}", err);
                                slot.error = Some(err.clone());
                            }
                        }
                    }
                    _ => {
                        tracing::debug!(cache = name, ?key, "Discarding superseded response");
                    }
                }
            }

            notifier.notify();
            // Waiters that went away simply never read this.
            let _ = tx.send(Some(result));
        });

        rx
    }

    async fn wait(rx: &mut watch::Receiver<Settled<V>>) -> QueryResult<V> {
        let settled = match rx.wait_for(Option::is_some).await {
            Ok(settled) => settled.clone(),
            Err(_) => None,
        };

        match settled {
            Some(Ok(value)) => QueryResult::success(value, false),
            Some(Err(err)) => QueryResult::failure(err, None),
            None => QueryResult::failure(LookupError::Unknown("request abandoned".into()), None),
        }
    }
}
