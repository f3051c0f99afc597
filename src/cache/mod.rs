//! Polling cache
//!
//! Keeps one poller per resource key, shared by every subscriber of that
//! key. At most one fetch per key is in flight; refreshes issued while one
//! is running wait on it instead of sending another request. Fetch failures
//! never escape: they are recorded in the entry and the last good value is
//! kept.

pub mod entry;

pub use entry::{CachedEntry, FetchStatus, ResourceKey, StaleDataWarning};

use crate::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Produces a fresh value for one resource
#[async_trait]
pub trait Fetcher<T>: Send + Sync {
    async fn fetch(&self) -> Result<T>;
}

#[async_trait]
impl<T, F, Fut> Fetcher<T> for F
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    async fn fetch(&self) -> Result<T> {
        (self)().await
    }
}

/// Handle returned by `subscribe`; pass it back to `unsubscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    key: ResourceKey,
    id: Uuid,
}

impl Subscription {
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }
}

struct Slot<T> {
    /// Identifies this incarnation of the key; a fetch started for an older
    /// incarnation must not touch a newer one.
    epoch: Uuid,
    entry: CachedEntry<T>,
    fetcher: Arc<dyn Fetcher<T>>,
    subscribers: HashSet<Uuid>,
    in_flight: Option<watch::Receiver<bool>>,
    poller: Option<JoinHandle<()>>,
}

struct CacheInner<T> {
    slots: RwLock<HashMap<ResourceKey, Slot<T>>>,
}

impl<T> Drop for CacheInner<T> {
    fn drop(&mut self) {
        for slot in self.slots.get_mut().values_mut() {
            if let Some(poller) = slot.poller.take() {
                poller.abort();
            }
        }
    }
}

/// What a caller must do after inspecting a slot under the lock
enum FetchPlan<T> {
    Attach(watch::Receiver<bool>),
    Issue {
        epoch: Uuid,
        fetcher: Arc<dyn Fetcher<T>>,
        done: watch::Sender<bool>,
    },
    Missing,
}

/// Key-indexed, subscription-counted cache of polled resources
pub struct PollingCache<T> {
    inner: Arc<CacheInner<T>>,
}

impl<T> Clone for PollingCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for PollingCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PollingCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CacheInner {
                slots: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Start polling `key`, or attach to the poller already running for it.
    ///
    /// The first subscriber's fetcher and interval are used for the key's
    /// lifetime. The first tick fires immediately.
    pub async fn subscribe(
        &self,
        key: ResourceKey,
        fetcher: Arc<dyn Fetcher<T>>,
        interval: Duration,
    ) -> Subscription {
        let id = Uuid::new_v4();
        let mut slots = self.inner.slots.write().await;

        match slots.get_mut(&key) {
            Some(slot) => {
                slot.subscribers.insert(id);
                debug!(key = %key, subscribers = slot.subscribers.len(), "Attached to existing poller");
            }
            None => {
                let epoch = Uuid::new_v4();
                let poller = self.spawn_poller(key.clone(), epoch, interval);
                let mut subscribers = HashSet::new();
                subscribers.insert(id);

                slots.insert(
                    key.clone(),
                    Slot {
                        epoch,
                        entry: CachedEntry::default(),
                        fetcher,
                        subscribers,
                        in_flight: None,
                        poller: Some(poller),
                    },
                );
                info!(key = %key, interval_secs = interval.as_secs_f64(), "Started polling");
            }
        }

        Subscription { key, id }
    }

    /// Detach a subscriber. Polling for the key stops with the last one.
    pub async fn unsubscribe(&self, subscription: Subscription) {
        let mut slots = self.inner.slots.write().await;

        let Some(slot) = slots.get_mut(&subscription.key) else {
            return;
        };

        slot.subscribers.remove(&subscription.id);
        if !slot.subscribers.is_empty() {
            debug!(key = %subscription.key, subscribers = slot.subscribers.len(), "Subscriber detached");
            return;
        }

        if let Some(mut slot) = slots.remove(&subscription.key) {
            if let Some(poller) = slot.poller.take() {
                poller.abort();
            }
            info!(key = %subscription.key, "Stopped polling, no subscribers left");
        }
    }

    /// Current state of `key`; `Idle` with no value when nobody polls it.
    pub async fn snapshot(&self, key: &ResourceKey) -> CachedEntry<T> {
        let slots = self.inner.slots.read().await;
        slots
            .get(key)
            .map(|slot| slot.entry.clone())
            .unwrap_or_default()
    }

    /// Fetch `key` now, out of band. Joins the in-flight fetch if there is
    /// one. Returns once the entry reflects a completed fetch.
    pub async fn refresh(&self, key: &ResourceKey) {
        match self.plan_fetch(key, None).await {
            FetchPlan::Attach(mut done) => {
                debug!(key = %key, "Joining in-flight fetch");
                // A dropped sender means the fetch was abandoned with its key.
                let _ = done.wait_for(|finished| *finished).await;
            }
            FetchPlan::Issue { epoch, fetcher, done } => {
                self.run_fetch(key, epoch, fetcher, done).await;
            }
            FetchPlan::Missing => {
                debug!(key = %key, "Refresh ignored, key has no subscribers");
            }
        }
    }

    pub async fn subscriber_count(&self, key: &ResourceKey) -> usize {
        let slots = self.inner.slots.read().await;
        slots.get(key).map(|slot| slot.subscribers.len()).unwrap_or(0)
    }

    pub async fn is_polling(&self, key: &ResourceKey) -> bool {
        let slots = self.inner.slots.read().await;
        slots
            .get(key)
            .and_then(|slot| slot.poller.as_ref())
            .map(|poller| !poller.is_finished())
            .unwrap_or(false)
    }

    fn spawn_poller(&self, key: ResourceKey, epoch: Uuid, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<CacheInner<T>> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let cache = PollingCache { inner };

                if !cache.tick(&key, epoch).await {
                    break;
                }
            }
        })
    }

    /// One poll tick. Skipped while a fetch is in flight. Returns false once
    /// this poller's key incarnation is gone.
    async fn tick(&self, key: &ResourceKey, epoch: Uuid) -> bool {
        match self.plan_fetch(key, Some(epoch)).await {
            FetchPlan::Issue { fetcher, done, .. } => {
                self.run_fetch(key, epoch, fetcher, done).await;
                true
            }
            FetchPlan::Attach(_) => {
                debug!(key = %key, "Tick skipped, fetch already in flight");
                true
            }
            FetchPlan::Missing => false,
        }
    }

    /// Decide under the lock whether to join the in-flight fetch or start a
    /// new one. With `expected_epoch`, a key recreated since then counts as
    /// missing.
    async fn plan_fetch(&self, key: &ResourceKey, expected_epoch: Option<Uuid>) -> FetchPlan<T> {
        let mut slots = self.inner.slots.write().await;

        let Some(slot) = slots.get_mut(key) else {
            return FetchPlan::Missing;
        };
        if expected_epoch.is_some_and(|epoch| epoch != slot.epoch) {
            return FetchPlan::Missing;
        }

        if let Some(in_flight) = &slot.in_flight {
            // Err means the fetching future was dropped before finishing.
            if in_flight.has_changed().is_ok() {
                return FetchPlan::Attach(in_flight.clone());
            }
            debug!(key = %key, "Previous fetch was abandoned, issuing a new one");
        }

        let (done, receiver) = watch::channel(false);
        slot.in_flight = Some(receiver);
        slot.entry.begin_fetch();

        FetchPlan::Issue {
            epoch: slot.epoch,
            fetcher: slot.fetcher.clone(),
            done,
        }
    }

    async fn run_fetch(
        &self,
        key: &ResourceKey,
        epoch: Uuid,
        fetcher: Arc<dyn Fetcher<T>>,
        done: watch::Sender<bool>,
    ) {
        let outcome = fetcher.fetch().await;

        {
            let mut slots = self.inner.slots.write().await;
            match slots.get_mut(key) {
                Some(slot) if slot.epoch == epoch => {
                    if let Err(error) = &outcome {
                        warn!(key = %key, "Fetch failed, keeping last value: {}", error);
                    } else {
                        debug!(key = %key, "Fetch succeeded");
                    }
                    slot.entry.apply(outcome);
                    slot.in_flight = None;
                }
                _ => {
                    debug!(key = %key, "Discarding fetch result, key no longer subscribed");
                }
            }
        }

        let _ = done.send(true);
    }
}
