//! Extension-point bus.
//!
//! Each named point holds an ordered subscriber list. A point's payload type
//! is fixed by whichever side touches it first; subscribing or publishing with
//! a different payload type fails with [`BusError::SignatureMismatch`].

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use everhook_protocols::{BusError, ExtensionPoint, SubscriptionId};

use crate::scope::ModuleScope;

type Callback = Arc<dyn Fn(&mut dyn Any) + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    owner: Option<String>,
    callback: Callback,
}

struct PointEntry {
    payload: TypeId,
    payload_name: &'static str,
    subscribers: Vec<Subscriber>,
}

impl PointEntry {
    fn new<A: 'static>() -> Self {
        Self {
            payload: TypeId::of::<A>(),
            payload_name: std::any::type_name::<A>(),
            subscribers: Vec::new(),
        }
    }

    fn check<A: 'static>(&self, point: &'static str) -> Result<(), BusError> {
        if self.payload == TypeId::of::<A>() {
            Ok(())
        } else {
            Err(BusError::SignatureMismatch {
                point,
                expected: self.payload_name,
                found: std::any::type_name::<A>(),
            })
        }
    }
}

/// Returned by subscribe; pass it back to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    point: &'static str,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn point(&self) -> &'static str {
        self.point
    }
}

/// Bookkeeping view of one subscription.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionRecord {
    pub id: SubscriptionId,
    pub point: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// Named multicast subscription lists.
pub struct ExtensionBus {
    points: RwLock<HashMap<&'static str, PointEntry>>,
    next_id: AtomicU64,
    frozen: AtomicBool,
    scope: Arc<ModuleScope>,
}

impl ExtensionBus {
    pub fn new(scope: Arc<ModuleScope>) -> Self {
        Self {
            points: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            frozen: AtomicBool::new(false),
            scope,
        }
    }

    /// Appends `callback` to the subscribers of `point`.
    pub fn subscribe<A, F>(
        &self,
        point: ExtensionPoint<A>,
        callback: F,
    ) -> Result<SubscriptionHandle, BusError>
    where
        A: 'static,
        F: Fn(&mut A) + Send + Sync + 'static,
    {
        if self.is_frozen() {
            return Err(BusError::Frozen("subscribe"));
        }
        let name = point.name();
        let owner = self.scope.current();
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));

        let callback: Callback = Arc::new(move |payload: &mut dyn Any| {
            if let Some(args) = payload.downcast_mut::<A>() {
                callback(args);
            }
        });

        {
            let mut points = self.points.write();
            let entry = points.entry(name).or_insert_with(PointEntry::new::<A>);
            entry.check::<A>(name)?;
            entry.subscribers.push(Subscriber {
                id,
                owner: owner.clone(),
                callback,
            });
        }

        debug!(
            subscription = %id,
            point = name,
            owner = owner.as_deref().unwrap_or("-"),
            "Subscribed"
        );
        Ok(SubscriptionHandle { id, point: name })
    }

    /// Removes a subscription. Removing it during a dispatch does not affect
    /// that dispatch.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), BusError> {
        if self.is_frozen() {
            return Err(BusError::Frozen("unsubscribe"));
        }
        let mut points = self.points.write();
        let removed = points.get_mut(handle.point).and_then(|entry| {
            let pos = entry.subscribers.iter().position(|s| s.id == handle.id)?;
            Some(entry.subscribers.remove(pos))
        });
        match removed {
            Some(sub) => {
                debug!(
                    subscription = %sub.id,
                    point = handle.point,
                    owner = sub.owner.as_deref().unwrap_or("-"),
                    "Unsubscribed"
                );
                Ok(())
            }
            None => {
                warn!(subscription = %handle.id, point = handle.point, "Subscription not found");
                Err(BusError::NotSubscribed(handle.id))
            }
        }
    }

    /// Calls every subscriber of `point` with `args`, in subscription order.
    ///
    /// The subscriber list is captured when the call starts; subscribe and
    /// unsubscribe made by a callback take effect on the next publish.
    /// Returns how many subscribers ran.
    pub fn publish<A: 'static>(
        &self,
        point: ExtensionPoint<A>,
        args: &mut A,
    ) -> Result<usize, BusError> {
        let name = point.name();
        let callbacks: Vec<Callback> = {
            let points = self.points.read();
            match points.get(name) {
                Some(entry) => {
                    entry.check::<A>(name)?;
                    entry.subscribers.iter().map(|s| Arc::clone(&s.callback)).collect()
                }
                None => Vec::new(),
            }
        };

        debug!(point = name, subscribers = callbacks.len(), "Publishing");
        for callback in &callbacks {
            let payload: &mut dyn Any = &mut *args;
            callback(payload);
        }
        Ok(callbacks.len())
    }

    pub fn subscriber_count(&self, point: &str) -> usize {
        self.points
            .read()
            .get(point)
            .map_or(0, |entry| entry.subscribers.len())
    }

    /// Subscriptions attributed to `module`, in subscription order.
    pub fn owned_by(&self, module: &str) -> Vec<SubscriptionHandle> {
        let mut owned: Vec<_> = self
            .points
            .read()
            .iter()
            .flat_map(|(&point, entry)| {
                entry
                    .subscribers
                    .iter()
                    .filter(|s| s.owner.as_deref() == Some(module))
                    .map(move |s| SubscriptionHandle { id: s.id, point })
            })
            .collect();
        owned.sort_by_key(|h| h.id);
        owned
    }

    /// Every subscription, in subscription order.
    pub fn snapshot(&self) -> Vec<SubscriptionRecord> {
        let mut records: Vec<_> = self
            .points
            .read()
            .iter()
            .flat_map(|(&point, entry)| {
                entry.subscribers.iter().map(move |s| SubscriptionRecord {
                    id: s.id,
                    point,
                    owner: s.owner.clone(),
                })
            })
            .collect();
        records.sort_by_key(|r| r.id);
        records
    }

    pub fn len(&self) -> usize {
        self.points.read().values().map(|e| e.subscribers.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rejects every later subscribe and unsubscribe. Publishing still works.
    pub fn freeze(&self) {
        if !self.frozen.swap(true, Ordering::SeqCst) {
            info!("Subscriptions frozen");
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
