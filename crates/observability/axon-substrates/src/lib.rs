//! # Axon Substrates
//!
//! A runtime for building deterministic, high-throughput, event-driven
//! observation networks from circuits, conduits, channels, pipes,
//! subscribers, subscriptions, and subjects.
//!
//! ## Key Components
//!
//! - **Circuit**: Single-threaded processing engine; every receptor it owns
//!   runs on its dedicated worker thread
//! - **Conduit**: Named factory of typed emission endpoints (percepts)
//! - **Channel**: Subject-named port with a lazily rebuilt delivery list
//! - **Pipe**: Emission endpoint; emitters enqueue and return, never block
//! - **Flow**: In-line stateful operators (diff, guard, limit, sample, ...)
//! - **Subscriber**: Dynamic observer registering pipes per channel
//! - **Reservoir**: In-memory capture buffer draining between polls
//! - **Subject**: Hierarchical identity built from interned names
//! - **Cortex**: Entry point and root of the substrate forest
//!
//! ## Example
//!
//! ```rust
//! use axon_substrates::{create_cortex, Name, PipeComposer, Pipe, Source, Resource};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicI64, Ordering};
//!
//! let cortex = create_cortex();
//! let circuit = cortex.circuit().unwrap();
//! let conduit = circuit
//!     .conduit::<Arc<dyn Pipe<i64>>, i64, _>(PipeComposer)
//!     .unwrap();
//!
//! let total = Arc::new(AtomicI64::new(0));
//! let observer = {
//!     let total = total.clone();
//!     circuit.subscriber(Name::from_path("sum").unwrap(), move |_subject, registrar| {
//!         let total = total.clone();
//!         registrar.register(Arc::new(axon_substrates::FunctionPipe::new(move |v: i64| {
//!             total.fetch_add(v, Ordering::SeqCst);
//!         })));
//!     })
//! };
//! conduit.subscribe(observer).unwrap();
//!
//! let pipe = conduit.percept(&Name::from_path("ticks").unwrap()).unwrap();
//! for v in 1..=10 {
//!     pipe.emit(v);
//! }
//! circuit.await_empty().unwrap();
//! assert_eq!(total.load(Ordering::SeqCst), 55);
//! circuit.close();
//! ```

pub mod channel;
pub mod circuit;
pub mod conduit;
pub mod cortex;
pub mod flow;
pub mod name;
pub mod pipe;
pub mod pool;
pub mod queue;
pub mod reservoir;
pub mod scope;
pub mod source;
pub mod subject;
pub mod types;

mod valve;

// Re-export main interfaces
pub use channel::Channel;
pub use circuit::Circuit;
pub use conduit::{ChannelComposer, Composer, Conduit, PipeComposer, TapSource};
pub use cortex::{create_cortex, Cortex};
pub use flow::{Flow, Sift};
pub use name::Name;
pub use pipe::{CircuitPipe, EmptyPipe, FunctionPipe, Pipe};
pub use pool::Pool;
pub use queue::{Current, Queue, Script};
pub use reservoir::{Capture, Reservoir};
pub use scope::Scope;
pub use source::{Registrar, Source, Subscriber, Subscription};
pub use subject::{Resource, Subject, Substrate};
pub use types::{
    Id, Slot, SlotType, SlotValue, State, SubjectType, SubstratesError, SubstratesResult,
};

// Re-export core types for better integration
pub use axon_core::{AxonError, AxonResult};

// Map SubstratesError to AxonError at the crate boundary
impl From<types::SubstratesError> for AxonError {
    fn from(err: types::SubstratesError) -> Self {
        match err {
            types::SubstratesError::InvalidName(msg) => AxonError::InvalidInput(msg),
            types::SubstratesError::IllegalState(msg) => AxonError::IllegalState(msg),
            types::SubstratesError::CrossCircuit(msg) => AxonError::InvalidInput(msg),
            types::SubstratesError::Closed(msg) => {
                AxonError::IllegalState(format!("resource closed: {msg}"))
            }
            types::SubstratesError::Internal(msg) => AxonError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let err: AxonError = SubstratesError::InvalidName("bad".to_string()).into();
        assert!(matches!(err, AxonError::InvalidInput(_)));

        let err: AxonError = SubstratesError::Closed("circuit".to_string()).into();
        assert!(matches!(err, AxonError::IllegalState(_)));
    }
}
