//! Emission endpoints.
//!
//! A pipe is the minimal contract for passing a typed value along: `emit`
//! never blocks and never fails. The concrete pipes are the channel root
//! pipe (fan-out over the delivery snapshot, see `channel`), the circuit
//! pipe built around a user receptor (enqueues onto the owning circuit), the
//! flow pipe (operator chain, see `flow`), and the empty pipe.

use crate::flow::FlowStages;
use crate::subject::{Subject, Substrate};
use crate::valve::Valve;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Abstraction for passing typed values along a pipeline.
///
/// Emitters always enqueue and return; overload manifests as queue growth,
/// never as blocking. Emissions into closed circuits are silently dropped.
pub trait Pipe<E>: Send + Sync {
    /// Pass a value along the pipeline
    fn emit(&self, emission: E);
}

/// Pipe that ignores all emissions
pub struct EmptyPipe<E> {
    _marker: PhantomData<fn(E)>,
}

impl<E> EmptyPipe<E> {
    /// Create an empty pipe
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// Create a shared empty pipe handle
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl<E> Default for EmptyPipe<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EmptyPipe<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmptyPipe").finish()
    }
}

impl<E: Send> Pipe<E> for EmptyPipe<E> {
    fn emit(&self, _emission: E) {}
}

/// Pipe that invokes a function inline on the emitting thread.
///
/// When registered as a delivery target this runs on the worker thread of
/// the delivering circuit, which makes it the cheapest receptor form.
pub struct FunctionPipe<E> {
    func: Box<dyn Fn(E) + Send + Sync>,
}

impl<E> FunctionPipe<E> {
    /// Wrap a function as a pipe
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(E) + Send + Sync + 'static,
    {
        Self {
            func: Box::new(func),
        }
    }
}

impl<E> fmt::Debug for FunctionPipe<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionPipe").finish()
    }
}

impl<E: Send> Pipe<E> for FunctionPipe<E> {
    fn emit(&self, emission: E) {
        (self.func)(emission);
    }
}

/// Pipe that runs a user receptor on its circuit's worker thread.
///
/// Emitting from any other thread enqueues onto the circuit's ingress
/// queue; emitting from within a receptor of the same circuit enqueues onto
/// the transit queue, so cascades complete before the next external task.
pub struct CircuitPipe<E> {
    subject: Subject,
    valve: Arc<Valve>,
    flow: Option<Arc<FlowStages<E>>>,
    receptor: Arc<dyn Fn(E) + Send + Sync>,
}

impl<E> CircuitPipe<E> {
    pub(crate) fn new(
        subject: Subject,
        valve: Arc<Valve>,
        flow: Option<Arc<FlowStages<E>>>,
        receptor: Arc<dyn Fn(E) + Send + Sync>,
    ) -> Self {
        Self {
            subject,
            valve,
            flow,
            receptor,
        }
    }
}

impl<E> fmt::Debug for CircuitPipe<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitPipe")
            .field("subject", &self.subject)
            .finish()
    }
}

impl<E> Substrate for CircuitPipe<E> {
    fn subject(&self) -> &Subject {
        &self.subject
    }
}

impl<E: Send + 'static> Pipe<E> for CircuitPipe<E> {
    fn emit(&self, emission: E) {
        let receptor = self.receptor.clone();
        let flow = self.flow.clone();
        // dropped silently when the circuit no longer accepts work
        self.valve.submit(Box::new(move || {
            let emission = match &flow {
                Some(stages) => match stages.process(emission) {
                    Some(v) => v,
                    None => return,
                },
                None => emission,
            };
            receptor(emission);
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_empty_pipe_drops() {
        let pipe = EmptyPipe::<i32>::new();
        pipe.emit(42);
    }

    #[test]
    fn test_function_pipe_invokes_inline() {
        let count = Arc::new(AtomicUsize::new(0));
        let pipe = {
            let count = count.clone();
            FunctionPipe::new(move |_: i32| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        pipe.emit(1);
        pipe.emit(2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
