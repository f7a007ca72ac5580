//! Reservoirs: in-memory capture buffers.
//!
//! A reservoir subscribes to a source and accumulates every emission,
//! together with the subject that emitted it, until drained. Draining swaps
//! the storage wholesale so all strong references to drained emissions are
//! released at once.

use crate::pipe::Pipe;
use crate::source::{Source, Subscriber, Subscription};
use crate::subject::{Resource, Subject, Substrate};
use crate::types::{SubjectType, SubstratesResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// An emitted value paired with the subject that emitted it
#[derive(Debug, Clone)]
pub struct Capture<E> {
    subject: Subject,
    emission: E,
}

impl<E> Capture<E> {
    /// The subject that emitted the value
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// The emitted value
    pub fn emission(&self) -> &E {
        &self.emission
    }

    /// Consume the capture and return the emission
    pub fn into_emission(self) -> E {
        self.emission
    }
}

struct ReservoirInner<E> {
    subject: Subject,
    captures: Mutex<Vec<Capture<E>>>,
    subscription: Mutex<Option<Subscription>>,
}

/// A FIFO buffer of captures accumulated between drains.
///
/// Cheap to clone; all clones share the same buffer.
pub struct Reservoir<E> {
    inner: Arc<ReservoirInner<E>>,
}

impl<E> Clone for Reservoir<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: Clone + Send + 'static> Reservoir<E> {
    /// Create a reservoir subscribed to the given source
    pub(crate) fn attach<S>(source: &S) -> SubstratesResult<Reservoir<E>>
    where
        S: Source<E> + ?Sized,
    {
        let subject = Subject::enclosed(
            source.subject().name().child_part("reservoir"),
            SubjectType::Sink,
            source.subject().clone(),
        );
        let reservoir = Reservoir {
            inner: Arc::new(ReservoirInner {
                subject: subject.clone(),
                captures: Mutex::new(Vec::new()),
                subscription: Mutex::new(None),
            }),
        };
        // The delivery path holds the reservoir weakly: once every handle is
        // dropped, captures stop without waiting for an explicit close.
        let weak = Arc::downgrade(&reservoir.inner);
        let observer = Subscriber::new(
            Subject::enclosed(
                subject.name().child_part("observer"),
                SubjectType::Subscriber,
                subject,
            ),
            None,
            move |channel_subject: &Subject, registrar| {
                registrar.register(Arc::new(ReservoirPipe {
                    reservoir: weak.clone(),
                    subject: channel_subject.clone(),
                }));
            },
        );
        let subscription = source.subscribe(observer)?;
        *reservoir.inner.subscription.lock() = Some(subscription);
        Ok(reservoir)
    }

    /// Return all captures accumulated since creation or the last drain,
    /// atomically clearing the buffer
    pub fn drain(&self) -> Vec<Capture<E>> {
        std::mem::take(&mut *self.inner.captures.lock())
    }

    /// Number of captures currently buffered
    pub fn len(&self) -> usize {
        self.inner.captures.lock().len()
    }

    /// True when nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.inner.captures.lock().is_empty()
    }
}

impl<E> Substrate for Reservoir<E> {
    fn subject(&self) -> &Subject {
        &self.inner.subject
    }
}

impl<E> Resource for Reservoir<E> {
    fn close(&self) {
        if let Some(subscription) = self.inner.subscription.lock().take() {
            subscription.close();
        }
        self.inner.captures.lock().clear();
    }
}

impl<E> fmt::Debug for Reservoir<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservoir")
            .field("subject", &self.inner.subject)
            .field("captures", &self.inner.captures.lock().len())
            .finish()
    }
}

struct ReservoirPipe<E> {
    reservoir: Weak<ReservoirInner<E>>,
    subject: Subject,
}

impl<E: Clone + Send + 'static> Pipe<E> for ReservoirPipe<E> {
    fn emit(&self, emission: E) {
        if let Some(reservoir) = self.reservoir.upgrade() {
            reservoir.captures.lock().push(Capture {
                subject: self.subject.clone(),
                emission,
            });
        }
    }
}
