//! Channels: subject-named ports with lazily rebuilt delivery lists.
//!
//! A channel owns an immutable snapshot of its downstream pipes. The root
//! pipe reads the snapshot with a single lock-free-equivalent pointer read
//! and enqueues delivery onto the owning circuit. When the hub's epoch has
//! moved past the channel's seen epoch the delivery list is rebuilt first,
//! on the worker thread, by replaying every alive subscriber's callback.
//! The emission that triggered the rebuild is then processed with the fresh
//! list, so nothing is lost around a subscribe.

use crate::flow::{Flow, FlowStages};
use crate::pipe::Pipe;
use crate::source::{Hub, Registrar};
use crate::subject::{Subject, Substrate};
use crate::valve::Valve;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub(crate) struct ChannelInner<E> {
    subject: Subject,
    valve: Arc<Valve>,
    hub: Arc<Hub<E>>,
    /// Conduit-level flow applied ahead of the fan-out
    flow: Option<Arc<FlowStages<E>>>,
    deliveries: RwLock<Arc<Vec<Arc<dyn Pipe<E>>>>>,
    seen_epoch: AtomicU64,
    /// Set on channels manufactured after their conduit closed; emissions
    /// into a muted channel are dropped at the door
    muted: AtomicBool,
}

/// A named port belonging to a conduit.
///
/// Cheap to clone; all clones are the same channel. For a given conduit and
/// name there is exactly one channel instance, ever.
pub struct Channel<E> {
    inner: Arc<ChannelInner<E>>,
}

impl<E> Clone for Channel<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: Clone + Send + 'static> Channel<E> {
    pub(crate) fn new(
        subject: Subject,
        valve: Arc<Valve>,
        hub: Arc<Hub<E>>,
        flow: Option<Arc<FlowStages<E>>>,
    ) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                subject,
                valve,
                hub,
                flow,
                deliveries: RwLock::new(Arc::new(Vec::new())),
                seen_epoch: AtomicU64::new(0),
                muted: AtomicBool::new(false),
            }),
        }
    }

    /// Turn the channel into a degraded sink whose emissions are dropped
    pub(crate) fn mute(&self) -> Self {
        self.inner.muted.store(true, Ordering::Release);
        self.clone()
    }

    /// The root pipe of this channel: emissions fan out over the current
    /// delivery snapshot
    pub fn pipe(&self) -> Arc<dyn Pipe<E>> {
        Arc::new(RootPipe {
            channel: self.inner.clone(),
        })
    }

    /// A pipe that applies an inline flow chain before forwarding to the
    /// registered downstreams
    pub fn pipe_with_flow<C>(&self, configure: C) -> Arc<dyn Pipe<E>>
    where
        C: FnOnce(Flow<E>) -> Flow<E>,
    {
        let flow = configure(Flow::new());
        if flow.is_identity() {
            return self.pipe();
        }
        Arc::new(FlowPipe {
            channel: self.inner.clone(),
            stages: Arc::new(flow.into_stages()),
        })
    }

    pub(crate) fn downgrade(&self) -> Weak<ChannelInner<E>> {
        Arc::downgrade(&self.inner)
    }

    /// Deliver on the worker thread, applying the channel flow, rebuilding a
    /// stale list, then fanning out. Callers must already be on the worker.
    pub(crate) fn deliver_on_worker(&self, emission: E) {
        self.inner.deliver(emission);
    }
}

impl<E> Substrate for Channel<E> {
    fn subject(&self) -> &Subject {
        &self.inner.subject
    }
}

impl<E> fmt::Debug for Channel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("subject", &self.inner.subject)
            .field("deliveries", &self.inner.deliveries.read().len())
            .finish()
    }
}

impl<E: Clone + Send + 'static> ChannelInner<E> {
    fn stale(&self) -> bool {
        self.seen_epoch.load(Ordering::Acquire) != self.hub.epoch()
    }

    /// True when an emission can be discarded without enqueueing
    fn vacant(&self) -> bool {
        self.muted.load(Ordering::Acquire)
            || (self.flow.is_none() && !self.stale() && self.deliveries.read().is_empty())
    }

    pub(crate) fn deliver(&self, emission: E) {
        if self.muted.load(Ordering::Acquire) {
            return;
        }
        let emission = match &self.flow {
            Some(stages) => match stages.process(emission) {
                Some(value) => value,
                None => return,
            },
            None => emission,
        };
        let epoch = self.hub.epoch();
        if self.seen_epoch.load(Ordering::Acquire) != epoch {
            self.rebuild(epoch);
        }
        let snapshot = self.deliveries.read().clone();
        let Some((last, rest)) = snapshot.split_last() else {
            return;
        };
        for pipe in rest {
            pipe.emit(emission.clone());
        }
        last.emit(emission);
    }

    fn rebuild(&self, epoch: u64) {
        let mut pipes: Vec<Arc<dyn Pipe<E>>> = Vec::new();
        for (subscriber, handle) in self.hub.snapshot() {
            if !handle.alive() {
                continue;
            }
            let mut registrar = Registrar::new();
            subscriber.accept(&self.subject, &mut registrar);
            pipes.extend(registrar.into_pipes());
        }
        tracing::trace!(
            target: "axon::channel",
            channel = %self.subject.name(),
            downstreams = pipes.len(),
            "delivery list rebuilt"
        );
        *self.deliveries.write() = Arc::new(pipes);
        self.seen_epoch.store(epoch, Ordering::Release);
    }

    fn enqueue(self: &Arc<Self>, emission: E) {
        if self.vacant() {
            return;
        }
        let channel = self.clone();
        self.valve.submit(Box::new(move || channel.deliver(emission)));
    }
}

/// Fan-out pipe over a channel's delivery snapshot
struct RootPipe<E> {
    channel: Arc<ChannelInner<E>>,
}

impl<E: Clone + Send + 'static> Pipe<E> for RootPipe<E> {
    fn emit(&self, emission: E) {
        self.channel.enqueue(emission);
    }
}

/// Root pipe with an inline operator chain ahead of the fan-out
struct FlowPipe<E> {
    channel: Arc<ChannelInner<E>>,
    stages: Arc<FlowStages<E>>,
}

impl<E: Clone + Send + 'static> Pipe<E> for FlowPipe<E> {
    fn emit(&self, emission: E) {
        let channel = self.channel.clone();
        let stages = self.stages.clone();
        self.channel.valve.submit(Box::new(move || {
            if let Some(value) = stages.process(emission) {
                channel.deliver(value);
            }
        }));
    }
}
