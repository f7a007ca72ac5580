//! Circuits: single-worker processing engines.
//!
//! A circuit owns one valve and a name-scoped subtree of conduits, pipes,
//! and subscribers. Every receptor attached to a circuit executes on its
//! worker thread, one at a time. The circuit observes itself through a
//! `Source<State>`: receptor faults are surfaced there as emission-fault
//! states rather than as errors.

use crate::channel::Channel;
use crate::conduit::{Composer, Conduit};
use crate::flow::Flow;
use crate::name::Name;
use crate::pipe::CircuitPipe;
use crate::queue::Queue;
use crate::source::{Hub, Registrar, Source, Subscriber, Subscription};
use crate::subject::{Resource, Subject, Substrate};
use crate::types::{Slot, SlotValue, State, SubjectType, SubstratesResult};
use crate::valve::Valve;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Slot name carrying the message of an emission fault
static FAULT_MESSAGE: Lazy<Name> =
    Lazy::new(|| Name::from_parts(["fault", "message"]).expect("literal name"));

static ANONYMOUS: AtomicU64 = AtomicU64::new(0);

pub(crate) fn sequenced(prefix: &str) -> Name {
    let n = ANONYMOUS.fetch_add(1, Ordering::Relaxed);
    Name::root_part(&format!("{prefix}-{n}"))
}

struct CircuitInner {
    subject: Subject,
    valve: Arc<Valve>,
    state_hub: Arc<Hub<State>>,
    /// Keeps the state channel alive; the fault hook only holds it weakly
    #[allow(dead_code)]
    state_channel: Channel<State>,
    queue: Queue,
}

impl Drop for CircuitInner {
    fn drop(&mut self) {
        // release the worker thread when the last handle goes away
        self.valve.close();
    }
}

/// A deterministic, single-threaded processing engine.
///
/// Cheap to clone; all clones drive the same worker. Closing stops intake
/// of new work while everything already accepted still drains.
#[derive(Clone)]
pub struct Circuit {
    inner: Arc<CircuitInner>,
}

impl Circuit {
    pub(crate) fn new(enclosure: Subject, name: Name) -> SubstratesResult<Circuit> {
        let subject = Subject::enclosed(name, SubjectType::Circuit, enclosure);
        let valve = Valve::spawn(&subject.name().to_path())?;
        let state_hub = Hub::new(subject.id());
        let state_subject = Subject::enclosed(
            subject.name().child_part("state"),
            SubjectType::Source,
            subject.clone(),
        );
        let state_channel =
            Channel::new(state_subject, valve.clone(), state_hub.clone(), None);
        let weak_state = state_channel.downgrade();
        valve.set_fault_hook(Box::new(move |message| {
            if let Some(channel) = weak_state.upgrade() {
                let state = State::of(Slot::new(
                    FAULT_MESSAGE.clone(),
                    SlotValue::String(message.to_string()),
                ));
                channel.deliver(state);
            }
        }));
        let queue = Queue::new(
            Subject::enclosed(
                subject.name().child_part("queue"),
                SubjectType::Queue,
                subject.clone(),
            ),
            valve.clone(),
        );
        Ok(Circuit {
            inner: Arc::new(CircuitInner {
                subject,
                valve,
                state_hub,
                state_channel,
                queue,
            }),
        })
    }

    /// Create an anonymously named conduit
    pub fn conduit<P, E, C>(&self, composer: C) -> SubstratesResult<Conduit<P, E>>
    where
        P: Clone + Send + Sync + 'static,
        E: Clone + Send + 'static,
        C: Composer<P, E> + 'static,
    {
        self.conduit_inner(sequenced("conduit"), Box::new(composer), None)
    }

    /// Create a named conduit
    pub fn conduit_named<P, E, C>(&self, name: Name, composer: C) -> SubstratesResult<Conduit<P, E>>
    where
        P: Clone + Send + Sync + 'static,
        E: Clone + Send + 'static,
        C: Composer<P, E> + 'static,
    {
        self.conduit_inner(name, Box::new(composer), None)
    }

    /// Create a named conduit whose channels run a flow chain ahead of
    /// their fan-out
    pub fn conduit_configured<P, E, C, G>(
        &self,
        name: Name,
        composer: C,
        configurer: G,
    ) -> SubstratesResult<Conduit<P, E>>
    where
        P: Clone + Send + Sync + 'static,
        E: Clone + Send + 'static,
        C: Composer<P, E> + 'static,
        G: Fn(Flow<E>) -> Flow<E> + Send + Sync + 'static,
    {
        self.conduit_inner(name, Box::new(composer), Some(Arc::new(configurer)))
    }

    #[allow(clippy::type_complexity)]
    fn conduit_inner<P, E>(
        &self,
        name: Name,
        composer: Box<dyn Composer<P, E>>,
        configurer: Option<Arc<dyn Fn(Flow<E>) -> Flow<E> + Send + Sync>>,
    ) -> SubstratesResult<Conduit<P, E>>
    where
        P: Clone + Send + Sync + 'static,
        E: Clone + Send + 'static,
    {
        let subject = Subject::enclosed(name, SubjectType::Conduit, self.inner.subject.clone());
        let hub = Hub::new(self.inner.subject.id());
        Ok(Conduit::new(
            subject,
            self.inner.valve.clone(),
            hub,
            composer,
            configurer,
        ))
    }

    /// Wrap a receptor as a pipe; emissions are delivered on this circuit's
    /// worker thread
    pub fn pipe<E, F>(&self, receptor: F) -> Arc<CircuitPipe<E>>
    where
        E: Send + 'static,
        F: Fn(E) + Send + Sync + 'static,
    {
        self.pipe_inner(sequenced("pipe"), None, receptor)
    }

    /// Named variant of [`pipe`]
    ///
    /// [`pipe`]: Circuit::pipe
    pub fn pipe_named<E, F>(&self, name: Name, receptor: F) -> Arc<CircuitPipe<E>>
    where
        E: Send + 'static,
        F: Fn(E) + Send + Sync + 'static,
    {
        self.pipe_inner(name, None, receptor)
    }

    /// Wrap a receptor behind an inline flow chain
    pub fn pipe_configured<E, F, C>(&self, receptor: F, configure: C) -> Arc<CircuitPipe<E>>
    where
        E: Send + 'static,
        F: Fn(E) + Send + Sync + 'static,
        C: FnOnce(Flow<E>) -> Flow<E>,
    {
        let flow = configure(Flow::new());
        let flow = (!flow.is_identity()).then(|| Arc::new(flow.into_stages()));
        self.pipe_inner(sequenced("pipe"), flow, receptor)
    }

    fn pipe_inner<E, F>(
        &self,
        name: Name,
        flow: Option<Arc<crate::flow::FlowStages<E>>>,
        receptor: F,
    ) -> Arc<CircuitPipe<E>>
    where
        E: Send + 'static,
        F: Fn(E) + Send + Sync + 'static,
    {
        let subject = Subject::enclosed(name, SubjectType::Pipe, self.inner.subject.clone());
        Arc::new(CircuitPipe::new(
            subject,
            self.inner.valve.clone(),
            flow,
            Arc::new(receptor),
        ))
    }

    /// Create a subscriber owned by this circuit.
    ///
    /// The callback runs on this circuit's worker thread during delivery
    /// list rebuilds; the subscriber is rejected by conduits of any other
    /// circuit.
    pub fn subscriber<E, F>(&self, name: Name, callback: F) -> Arc<Subscriber<E>>
    where
        E: 'static,
        F: Fn(&Subject, &mut Registrar<E>) + Send + Sync + 'static,
    {
        Subscriber::new(
            Subject::enclosed(name, SubjectType::Subscriber, self.inner.subject.clone()),
            Some(self.inner.subject.id()),
            callback,
        )
    }

    /// The script coordination surface of this circuit
    pub fn queue(&self) -> Queue {
        self.inner.queue.clone()
    }

    /// Block until both queues are empty and no receptor is executing.
    ///
    /// Fails with `IllegalState` when called from this circuit's own worker
    /// thread; returns immediately once the circuit has fully closed.
    pub fn await_empty(&self) -> SubstratesResult<()> {
        self.inner.valve.await_empty()
    }

    /// Bounded variant of [`await_empty`]; returns false on timeout
    ///
    /// [`await_empty`]: Circuit::await_empty
    pub fn await_empty_timeout(&self, timeout: Duration) -> SubstratesResult<bool> {
        self.inner.valve.await_empty_timeout(timeout)
    }
}

impl Substrate for Circuit {
    fn subject(&self) -> &Subject {
        &self.inner.subject
    }
}

impl Source<State> for Circuit {
    fn subscribe(&self, subscriber: Arc<Subscriber<State>>) -> SubstratesResult<Subscription> {
        self.inner
            .state_hub
            .subscribe(&self.inner.subject, subscriber)
    }
}

impl Resource for Circuit {
    fn close(&self) {
        self.inner.valve.close();
    }
}

impl fmt::Debug for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Circuit")
            .field("subject", &self.inner.subject)
            .finish()
    }
}
