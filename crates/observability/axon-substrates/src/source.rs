//! Sources, subscribers, subscriptions, and the per-conduit hub.
//!
//! A source is anything that can be observed through a subscriber. The hub
//! is a source's subscription registry: it keeps the strong subscription
//! records and a monotonic epoch that channels compare against to decide
//! when their delivery lists are stale. Subscribers hold weak handles to
//! the subscriptions they produced, so closing a subscriber cascades across
//! every conduit it joined without creating ownership cycles.

use crate::pipe::Pipe;
use crate::subject::{Resource, Subject, Substrate};
use crate::types::{Id, SubjectType, SubstratesError, SubstratesResult};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Trait for components that can be observed by subscribers.
///
/// Subscribing registers interest; the subscriber's callback runs lazily on
/// the owning circuit's worker thread the first time each channel emits
/// after a registration change.
pub trait Source<E>: Substrate {
    /// Attach a subscriber to this source
    fn subscribe(&self, subscriber: Arc<Subscriber<E>>) -> SubstratesResult<Subscription>;
}

/// Collects the pipes a subscriber registers for one channel.
///
/// Handed to the subscriber callback by exclusive reference, so it cannot
/// outlive the callback scope.
pub struct Registrar<E> {
    pipes: Vec<Arc<dyn Pipe<E>>>,
}

impl<E> Registrar<E> {
    pub(crate) fn new() -> Self {
        Self { pipes: Vec::new() }
    }

    /// Register a pipe to receive the channel's emissions
    pub fn register(&mut self, pipe: Arc<dyn Pipe<E>>) {
        self.pipes.push(pipe);
    }

    pub(crate) fn into_pipes(self) -> Vec<Arc<dyn Pipe<E>>> {
        self.pipes
    }
}

impl<E> fmt::Debug for Registrar<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrar")
            .field("pipes", &self.pipes.len())
            .finish()
    }
}

/// Object-safe face of a hub, used by subscriptions to invalidate delivery
/// lists without knowing the emission type.
pub(crate) trait HubCore: Send + Sync {
    fn bump(&self);
}

pub(crate) struct SubscriptionInner {
    subject: Subject,
    alive: AtomicBool,
    hub: Weak<dyn HubCore>,
}

impl SubscriptionInner {
    pub(crate) fn alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn retire(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            if let Some(hub) = self.hub.upgrade() {
                hub.bump();
            }
        }
    }
}

/// The record of one subscriber attached to one source.
///
/// Closing marks the record dead and invalidates every channel of the hub;
/// the next rebuild drops the registration. Idempotent.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Substrate for Subscription {
    fn subject(&self) -> &Subject {
        &self.inner.subject
    }
}

impl Resource for Subscription {
    fn close(&self) {
        self.inner.retire();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.inner.subject)
            .field("alive", &self.inner.alive())
            .finish()
    }
}

/// A dynamic observer of a source.
///
/// Carries the user callback invoked per channel during delivery-list
/// rebuilds, always on the worker thread of the circuit that owns the
/// channel. A subscriber created by a circuit can only join sources of that
/// circuit; one created by the cortex is unbound and accepted anywhere.
pub struct Subscriber<E> {
    subject: Subject,
    circuit_id: Option<Id>,
    #[allow(clippy::type_complexity)]
    callback: Box<dyn Fn(&Subject, &mut Registrar<E>) + Send + Sync>,
    subscriptions: Mutex<Vec<Weak<SubscriptionInner>>>,
    closed: AtomicBool,
}

impl<E> Subscriber<E> {
    pub(crate) fn new<F>(subject: Subject, circuit_id: Option<Id>, callback: F) -> Arc<Self>
    where
        F: Fn(&Subject, &mut Registrar<E>) + Send + Sync + 'static,
    {
        Arc::new(Self {
            subject,
            circuit_id,
            callback: Box::new(callback),
            subscriptions: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn circuit_id(&self) -> Option<Id> {
        self.circuit_id
    }

    pub(crate) fn accept(&self, subject: &Subject, registrar: &mut Registrar<E>) {
        if !self.is_closed() {
            (self.callback)(subject, registrar);
        }
    }

    fn track(&self, handle: &Arc<SubscriptionInner>) {
        self.subscriptions.lock().push(Arc::downgrade(handle));
    }

    /// True once the subscriber was closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<E> Substrate for Subscriber<E> {
    fn subject(&self) -> &Subject {
        &self.subject
    }
}

impl<E> Resource for Subscriber<E> {
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let handles = std::mem::take(&mut *self.subscriptions.lock());
        for weak in handles {
            if let Some(handle) = weak.upgrade() {
                handle.retire();
            }
        }
    }
}

impl<E> fmt::Debug for Subscriber<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("subject", &self.subject)
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct HubEntry<E> {
    subscriber: Arc<Subscriber<E>>,
    handle: Arc<SubscriptionInner>,
}

/// A source's subscription registry.
///
/// Subscribe and unsubscribe are O(1) plus an epoch bump; the real work of
/// rebuilding delivery lists is deferred to the channels that actually emit.
pub(crate) struct Hub<E> {
    circuit_id: Id,
    epoch: AtomicU64,
    entries: RwLock<Vec<HubEntry<E>>>,
}

impl<E: 'static> Hub<E> {
    pub(crate) fn new(circuit_id: Id) -> Arc<Self> {
        Arc::new(Self {
            circuit_id,
            epoch: AtomicU64::new(0),
            entries: RwLock::new(Vec::new()),
        })
    }

    /// Version counter channels compare their seen epoch against
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Id of the circuit whose worker rebuilds against this hub
    pub(crate) fn circuit_id(&self) -> Id {
        self.circuit_id
    }

    pub(crate) fn subscribe(
        self: &Arc<Self>,
        source_subject: &Subject,
        subscriber: Arc<Subscriber<E>>,
    ) -> SubstratesResult<Subscription> {
        if subscriber.is_closed() {
            return Err(SubstratesError::Closed(format!(
                "subscriber {} is closed",
                subscriber.subject().name()
            )));
        }
        if let Some(circuit_id) = subscriber.circuit_id() {
            if circuit_id != self.circuit_id {
                return Err(SubstratesError::CrossCircuit(format!(
                    "subscriber {} belongs to a different circuit",
                    subscriber.subject().name()
                )));
            }
        }
        let subject = Subject::enclosed(
            source_subject.name().child_part("subscription"),
            SubjectType::Subscription,
            source_subject.clone(),
        );
        let hub_core: Arc<dyn HubCore> = self.clone();
        let weak_hub: Weak<dyn HubCore> = Arc::downgrade(&hub_core);
        let handle = Arc::new(SubscriptionInner {
            subject,
            alive: AtomicBool::new(true),
            hub: weak_hub,
        });
        subscriber.track(&handle);
        self.entries.write().push(HubEntry {
            subscriber,
            handle: handle.clone(),
        });
        self.bump();
        Ok(Subscription { inner: handle })
    }

    /// Alive (subscriber, handle) pairs, for rebuild on the worker thread
    pub(crate) fn snapshot(&self) -> Vec<(Arc<Subscriber<E>>, Arc<SubscriptionInner>)> {
        self.entries
            .read()
            .iter()
            .map(|entry| (entry.subscriber.clone(), entry.handle.clone()))
            .collect()
    }
}

impl<E: 'static> HubCore for Hub<E> {
    fn bump(&self) {
        self.entries.write().retain(|entry| entry.handle.alive());
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }
}

impl<E> fmt::Debug for Hub<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("epoch", &self.epoch.load(Ordering::Relaxed))
            .field("entries", &self.entries.read().len())
            .finish()
    }
}
