//! Conduits: named factories of typed emission endpoints.
//!
//! A conduit composes a percept around each channel it manufactures. The
//! channel pool guarantees identity: for a given conduit and name, percept
//! construction happens once and every caller observes the same channel.

use crate::channel::Channel;
use crate::flow::Flow;
use crate::pipe::Pipe;
use crate::pool::Pool;
use crate::reservoir::Reservoir;
use crate::source::{Hub, Source, Subscriber, Subscription};
use crate::subject::{Resource, Subject, Substrate};
use crate::types::{SubjectType, SubstratesResult};
use crate::valve::Valve;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Forms percepts around channels.
///
/// The channel reference is only guaranteed valid during `compose`; percepts
/// keep the pipes they obtained from it, not the channel itself.
pub trait Composer<P, E>: Send + Sync {
    /// Compose a channel into a percept
    fn compose(&self, channel: &Channel<E>) -> SubstratesResult<P>;
}

impl<P, E, F> Composer<P, E> for F
where
    F: Fn(&Channel<E>) -> SubstratesResult<P> + Send + Sync,
{
    fn compose(&self, channel: &Channel<E>) -> SubstratesResult<P> {
        self(channel)
    }
}

/// Composer that hands out each channel's root pipe
pub struct PipeComposer;

impl<E: Clone + Send + 'static> Composer<Arc<dyn Pipe<E>>, E> for PipeComposer {
    fn compose(&self, channel: &Channel<E>) -> SubstratesResult<Arc<dyn Pipe<E>>> {
        Ok(channel.pipe())
    }
}

/// Composer that hands out the channel itself
pub struct ChannelComposer;

impl<E: Clone + Send + 'static> Composer<Channel<E>, E> for ChannelComposer {
    fn compose(&self, channel: &Channel<E>) -> SubstratesResult<Channel<E>> {
        Ok(channel.clone())
    }
}

type Configurer<E> = Arc<dyn Fn(Flow<E>) -> Flow<E> + Send + Sync>;

struct ConduitInner<P, E> {
    subject: Subject,
    valve: Arc<Valve>,
    hub: Arc<Hub<E>>,
    composer: Box<dyn Composer<P, E>>,
    configurer: Option<Configurer<E>>,
    pool: Pool<P>,
    closed: AtomicBool,
}

/// A named factory of typed emission endpoints, owned by a circuit.
///
/// Cheap to clone; all clones are the same conduit.
pub struct Conduit<P, E> {
    inner: Arc<ConduitInner<P, E>>,
}

impl<P, E> Clone for Conduit<P, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P, E> Conduit<P, E>
where
    P: Clone + Send + Sync + 'static,
    E: Clone + Send + 'static,
{
    pub(crate) fn new(
        subject: Subject,
        valve: Arc<Valve>,
        hub: Arc<Hub<E>>,
        composer: Box<dyn Composer<P, E>>,
        configurer: Option<Configurer<E>>,
    ) -> Self {
        Self {
            inner: Arc::new(ConduitInner {
                subject,
                valve,
                hub,
                composer,
                configurer,
                pool: Pool::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the percept for a name, manufacturing its channel on first
    /// call. Repeated and concurrent calls observe the same instance.
    ///
    /// Percepts requested after the owning circuit closed still compose, but
    /// their emissions are silently dropped.
    pub fn percept(&self, name: &crate::name::Name) -> SubstratesResult<P> {
        let inner = &self.inner;
        inner.pool.get(name, |relative| {
            let channel_name = inner.subject.name().concat(relative);
            let subject =
                Subject::enclosed(channel_name, SubjectType::Channel, inner.subject.clone());
            let flow = inner
                .configurer
                .as_ref()
                .map(|configure| Arc::new(configure(Flow::new()).into_stages()));
            let channel = Channel::new(subject, inner.valve.clone(), inner.hub.clone(), flow);
            // late arrivals during shutdown get a degraded channel instead
            // of an error
            let channel = if inner.closed.load(std::sync::atomic::Ordering::Acquire) {
                channel.mute()
            } else {
                channel
            };
            tracing::debug!(
                target: "axon::conduit",
                conduit = %inner.subject.name(),
                channel = %relative,
                "channel manufactured"
            );
            inner.composer.compose(&channel)
        })
    }

    /// Create a reservoir capturing every emission of this conduit
    pub fn reservoir(&self) -> SubstratesResult<Reservoir<E>> {
        Reservoir::attach(self)
    }

    /// Derive a source whose emissions are this conduit's, transformed by
    /// the mapper; a `None` result drops the emission
    pub fn tap<T, M>(&self, mapper: M) -> SubstratesResult<TapSource<T>>
    where
        T: Clone + Send + 'static,
        M: Fn(E) -> Option<T> + Send + Sync + 'static,
    {
        self.tap_with_flow(mapper, None)
    }

    /// Like [`tap`], with a flow configurer applied to each derived channel
    ///
    /// [`tap`]: Conduit::tap
    pub fn tap_configured<T, M, C>(&self, mapper: M, configurer: C) -> SubstratesResult<TapSource<T>>
    where
        T: Clone + Send + 'static,
        M: Fn(E) -> Option<T> + Send + Sync + 'static,
        C: Fn(Flow<T>) -> Flow<T> + Send + Sync + 'static,
    {
        self.tap_with_flow(mapper, Some(Arc::new(configurer)))
    }

    fn tap_with_flow<T, M>(
        &self,
        mapper: M,
        configurer: Option<Configurer<T>>,
    ) -> SubstratesResult<TapSource<T>>
    where
        T: Clone + Send + 'static,
        M: Fn(E) -> Option<T> + Send + Sync + 'static,
    {
        let subject = Subject::enclosed(
            self.inner.subject.name().child_part("tap"),
            SubjectType::Source,
            self.inner.subject.clone(),
        );
        let tap = TapSource {
            inner: Arc::new(TapInner {
                subject: subject.clone(),
                valve: self.inner.valve.clone(),
                hub: Hub::new(self.inner.hub.circuit_id()),
                channels: Pool::new(),
                configurer,
                subscription: Mutex::new(None),
            }),
        };
        let weak = Arc::downgrade(&tap.inner);
        let mapper = Arc::new(mapper);
        let observer = Subscriber::new(
            Subject::enclosed(
                subject.name().child_part("observer"),
                SubjectType::Subscriber,
                subject,
            ),
            None,
            move |channel_subject, registrar| {
                let Some(tap) = weak.upgrade() else {
                    return;
                };
                let Ok(channel) = tap.channel_for(channel_subject) else {
                    return;
                };
                registrar.register(Arc::new(TapPipe {
                    channel,
                    mapper: mapper.clone(),
                }));
            },
        );
        let subscription = self.subscribe(observer)?;
        *tap.inner.subscription.lock() = Some(subscription);
        Ok(tap)
    }
}

impl<P, E> Substrate for Conduit<P, E> {
    fn subject(&self) -> &Subject {
        &self.inner.subject
    }
}

impl<P, E> Source<E> for Conduit<P, E>
where
    P: Clone + Send + Sync + 'static,
    E: Clone + Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<Subscriber<E>>) -> SubstratesResult<Subscription> {
        self.inner.hub.subscribe(&self.inner.subject, subscriber)
    }
}

impl<P, E> Resource for Conduit<P, E> {
    fn close(&self) {
        self.inner
            .closed
            .store(true, std::sync::atomic::Ordering::Release);
    }
}

impl<P, E> fmt::Debug for Conduit<P, E>
where
    P: Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conduit")
            .field("subject", &self.inner.subject)
            .field("channels", &self.inner.pool.len())
            .finish()
    }
}

struct TapInner<T> {
    subject: Subject,
    valve: Arc<Valve>,
    hub: Arc<Hub<T>>,
    /// Derived channels, one per upstream channel, keyed by its name
    channels: Pool<Channel<T>>,
    configurer: Option<Configurer<T>>,
    subscription: Mutex<Option<Subscription>>,
}

impl<T: Clone + Send + 'static> TapInner<T> {
    fn channel_for(&self, upstream: &Subject) -> SubstratesResult<Channel<T>> {
        self.channels.get(upstream.name(), |name| {
            let subject = Subject::enclosed(name.clone(), SubjectType::Channel, self.subject.clone());
            let flow = self
                .configurer
                .as_ref()
                .map(|configure| Arc::new(configure(Flow::new()).into_stages()));
            Ok(Channel::new(subject, self.valve.clone(), self.hub.clone(), flow))
        })
    }
}

/// A derived source produced by [`Conduit::tap`].
///
/// Emissions of the parent conduit arrive mapped; subscribers attach to the
/// tap exactly as they would to a conduit.
pub struct TapSource<T> {
    inner: Arc<TapInner<T>>,
}

impl<T> Clone for TapSource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> TapSource<T> {
    /// Create a reservoir capturing every mapped emission
    pub fn reservoir(&self) -> SubstratesResult<Reservoir<T>> {
        Reservoir::attach(self)
    }
}

impl<T> Substrate for TapSource<T> {
    fn subject(&self) -> &Subject {
        &self.inner.subject
    }
}

impl<T: Clone + Send + 'static> Source<T> for TapSource<T> {
    fn subscribe(&self, subscriber: Arc<Subscriber<T>>) -> SubstratesResult<Subscription> {
        self.inner.hub.subscribe(&self.inner.subject, subscriber)
    }
}

impl<T> Resource for TapSource<T> {
    fn close(&self) {
        if let Some(subscription) = self.inner.subscription.lock().take() {
            subscription.close();
        }
    }
}

impl<T> fmt::Debug for TapSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapSource")
            .field("subject", &self.inner.subject)
            .finish()
    }
}

/// Pipe registered on the parent conduit that maps into a tap channel
struct TapPipe<E, T> {
    channel: Channel<T>,
    mapper: Arc<dyn Fn(E) -> Option<T> + Send + Sync>,
}

impl<E, T> Pipe<E> for TapPipe<E, T>
where
    E: Send,
    T: Clone + Send + 'static,
{
    fn emit(&self, emission: E) {
        // runs during parent delivery, already on the worker thread
        if let Some(mapped) = (self.mapper)(emission) {
            self.channel.deliver_on_worker(mapped);
        }
    }
}
