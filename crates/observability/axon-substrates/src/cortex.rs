//! Cortex: the process-wide root and factory.
//!
//! The cortex is the entry point into the substrates runtime and the parent
//! subject of all circuits. Name interning stays global, so identity
//! equality of names holds even across cortex instances in one process.

use crate::circuit::{sequenced, Circuit};
use crate::name::Name;
use crate::pool::Pool;
use crate::reservoir::Reservoir;
use crate::scope::Scope;
use crate::source::{Registrar, Source, Subscriber};
use crate::subject::{Resource, Subject, Substrate};
use crate::types::{Slot, SlotValue, State, SubjectType, SubstratesResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The root of the substrate forest and factory for its components.
pub struct Cortex {
    subject: Subject,
    circuits: RwLock<HashMap<Name, Circuit>>,
}

impl Cortex {
    /// Create a cortex instance
    pub fn new() -> Self {
        Self {
            subject: Subject::new(Name::root_part("cortex"), SubjectType::Cortex),
            circuits: RwLock::new(HashMap::new()),
        }
    }

    /// Create an anonymously named circuit
    pub fn circuit(&self) -> SubstratesResult<Circuit> {
        Circuit::new(self.subject.clone(), sequenced("circuit"))
    }

    /// Return the circuit for a name, creating it on first call
    pub fn circuit_named(&self, name: Name) -> SubstratesResult<Circuit> {
        if let Some(circuit) = self.circuits.read().get(&name) {
            return Ok(circuit.clone());
        }
        let mut circuits = self.circuits.write();
        if let Some(circuit) = circuits.get(&name) {
            return Ok(circuit.clone());
        }
        let circuit = Circuit::new(self.subject.clone(), name.clone())?;
        circuits.insert(name, circuit.clone());
        Ok(circuit)
    }

    /// Intern a name from a dotted path
    pub fn name(&self, path: &str) -> SubstratesResult<Name> {
        Name::from_path(path)
    }

    /// Intern a name from an iterable of parts
    pub fn name_from_parts<I, S>(&self, parts: I) -> SubstratesResult<Name>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Name::from_parts(parts)
    }

    /// Intern the canonical dotted name of a Rust type
    pub fn name_from_type<T: ?Sized>(&self) -> SubstratesResult<Name> {
        Name::from_type::<T>()
    }

    /// Intern a name for an enum constant as `Type.Variant`
    pub fn name_from_enum<T: fmt::Debug>(&self, value: &T) -> SubstratesResult<Name> {
        Name::from_enum(value)
    }

    /// Create an anonymous resource management scope
    pub fn scope(&self) -> Scope {
        Scope::new(sequenced("scope"), Some(self.subject.clone()))
    }

    /// Create a named resource management scope
    pub fn scope_named(&self, name: Name) -> Scope {
        Scope::new(name, Some(self.subject.clone()))
    }

    /// Create a boolean slot
    pub fn slot_bool(&self, name: Name, value: bool) -> Slot {
        Slot::new(name, SlotValue::Bool(value))
    }

    /// Create an i32 slot
    pub fn slot_i32(&self, name: Name, value: i32) -> Slot {
        Slot::new(name, SlotValue::I32(value))
    }

    /// Create an i64 slot
    pub fn slot_i64(&self, name: Name, value: i64) -> Slot {
        Slot::new(name, SlotValue::I64(value))
    }

    /// Create an f32 slot
    pub fn slot_f32(&self, name: Name, value: f32) -> Slot {
        Slot::new(name, SlotValue::F32(value))
    }

    /// Create an f64 slot
    pub fn slot_f64(&self, name: Name, value: f64) -> Slot {
        Slot::new(name, SlotValue::F64(value))
    }

    /// Create a string slot
    pub fn slot_string(&self, name: Name, value: impl Into<String>) -> Slot {
        Slot::new(name, SlotValue::String(value.into()))
    }

    /// Create a name slot
    pub fn slot_name(&self, name: Name, value: Name) -> Slot {
        Slot::new(name, SlotValue::Name(value))
    }

    /// Create a nested state slot
    pub fn slot_state(&self, name: Name, value: State) -> Slot {
        Slot::new(name, SlotValue::State(value))
    }

    /// Create an empty state
    pub fn state(&self) -> State {
        State::new()
    }

    /// Create a state holding a single slot
    pub fn state_of(&self, slot: Slot) -> State {
        State::of(slot)
    }

    /// Create a subscriber not bound to any circuit.
    ///
    /// Unbound subscribers are accepted by conduits of every circuit; their
    /// callback runs on the worker thread of whichever circuit rebuilds.
    pub fn subscriber<E, F>(&self, name: Name, callback: F) -> Arc<Subscriber<E>>
    where
        E: 'static,
        F: Fn(&Subject, &mut Registrar<E>) + Send + Sync + 'static,
    {
        Subscriber::new(
            Subject::enclosed(name, SubjectType::Subscriber, self.subject.clone()),
            None,
            callback,
        )
    }

    /// Create a subscriber that registers the pooled pipe for each emitting
    /// channel, looked up by the channel's name
    pub fn subscriber_pooled<E>(
        &self,
        name: Name,
        pool: Arc<Pool<Arc<dyn crate::pipe::Pipe<E>>>>,
    ) -> Arc<Subscriber<E>>
    where
        E: 'static,
    {
        Subscriber::new(
            Subject::enclosed(name, SubjectType::Subscriber, self.subject.clone()),
            None,
            move |subject: &Subject, registrar| {
                if let Some(pipe) = pool.lookup(subject.name()) {
                    registrar.register(pipe);
                }
            },
        )
    }

    /// Create a pool handing out the same value for every name
    pub fn pool<V: Clone>(&self, singleton: V) -> Pool<V> {
        Pool::singleton(singleton)
    }

    /// Create a reservoir capturing every emission of a source
    pub fn sink<E, S>(&self, source: &S) -> SubstratesResult<Reservoir<E>>
    where
        E: Clone + Send + 'static,
        S: Source<E> + ?Sized,
    {
        Reservoir::attach(source)
    }
}

impl Default for Cortex {
    fn default() -> Self {
        Self::new()
    }
}

impl Substrate for Cortex {
    fn subject(&self) -> &Subject {
        &self.subject
    }
}

impl Resource for Cortex {
    fn close(&self) {
        for circuit in self.circuits.write().drain().map(|(_, c)| c) {
            circuit.close();
        }
    }
}

impl fmt::Debug for Cortex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cortex")
            .field("circuits", &self.circuits.read().len())
            .finish()
    }
}

/// Create a shared cortex instance
pub fn create_cortex() -> Arc<Cortex> {
    Arc::new(Cortex::new())
}
