//! Core types for the substrates runtime

use crate::name::Name;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Result type for substrates operations
pub type SubstratesResult<T> = Result<T, SubstratesError>;

/// Errors that can occur in substrates operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubstratesError {
    /// A name path failed validation
    #[error("Invalid name: {0}")]
    InvalidName(String),
    /// An operation was issued in a state that forbids it
    #[error("Illegal state: {0}")]
    IllegalState(String),
    /// A subscriber was used with a conduit of a different circuit
    #[error("Cross-circuit subscriber: {0}")]
    CrossCircuit(String),
    /// An operation was issued against a closed resource
    #[error("Resource closed: {0}")]
    Closed(String),
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Unique identifier for substrate components.
///
/// Two subjects sharing a name remain distinguishable through their ids;
/// comparison is total so ids can serve as an ordering tiebreaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Id(Uuid);

impl Id {
    /// Create a fresh process-unique identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// View the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subject type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubjectType {
    /// A named port into a conduit
    Channel,
    /// A processing engine with a dedicated worker
    Circuit,
    /// A named factory of typed emission endpoints
    Conduit,
    /// The process-wide root and factory
    Cortex,
    /// Execution context handed to a running script
    Current,
    /// An emission endpoint
    Pipe,
    /// Script coordination surface of a circuit
    Queue,
    /// A resource management scope
    Scope,
    /// An in-memory capture buffer
    Sink,
    /// A subscribable emitter of subject registrations
    Source,
    /// A dynamic observer
    Subscriber,
    /// The record of one subscriber attached to one source
    Subscription,
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Type tag of a slot value, used when compacting state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotType {
    /// Boolean slot
    Bool,
    /// 32-bit integer slot
    I32,
    /// 64-bit integer slot
    I64,
    /// 32-bit float slot
    F32,
    /// 64-bit float slot
    F64,
    /// String slot
    String,
    /// Name slot
    Name,
    /// Nested state slot
    State,
}

/// A typed slot value
#[derive(Debug, Clone, PartialEq)]
pub enum SlotValue {
    /// Boolean value
    Bool(bool),
    /// 32-bit integer value
    I32(i32),
    /// 64-bit integer value
    I64(i64),
    /// 32-bit float value
    F32(f32),
    /// 64-bit float value
    F64(f64),
    /// String value
    String(String),
    /// Name value
    Name(Name),
    /// Nested state value
    State(State),
}

impl SlotValue {
    /// The type tag of this value
    pub fn slot_type(&self) -> SlotType {
        match self {
            SlotValue::Bool(_) => SlotType::Bool,
            SlotValue::I32(_) => SlotType::I32,
            SlotValue::I64(_) => SlotType::I64,
            SlotValue::F32(_) => SlotType::F32,
            SlotValue::F64(_) => SlotType::F64,
            SlotValue::String(_) => SlotType::String,
            SlotValue::Name(_) => SlotType::Name,
            SlotValue::State(_) => SlotType::State,
        }
    }
}

impl fmt::Display for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotValue::Bool(v) => write!(f, "{v}"),
            SlotValue::I32(v) => write!(f, "{v}"),
            SlotValue::I64(v) => write!(f, "{v}"),
            SlotValue::F32(v) => write!(f, "{v}"),
            SlotValue::F64(v) => write!(f, "{v}"),
            SlotValue::String(v) => write!(f, "{v}"),
            SlotValue::Name(v) => write!(f, "{v}"),
            SlotValue::State(v) => write!(f, "{v}"),
        }
    }
}

/// A named, typed value held by a state
#[derive(Debug, Clone)]
pub struct Slot {
    name: Name,
    value: SlotValue,
}

impl Slot {
    /// Create a slot from a name and a value
    pub fn new(name: Name, value: SlotValue) -> Self {
        Self { name, value }
    }

    /// The name of this slot
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// The value held by this slot
    pub fn value(&self) -> &SlotValue {
        &self.value
    }

    /// The type tag of the held value
    pub fn slot_type(&self) -> SlotType {
        self.value.slot_type()
    }
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        // names compare by identity, values by value
        self.name == other.name && self.value == other.value
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

struct StateNode {
    slot: Slot,
    next: Option<Arc<StateNode>>,
}

/// An immutable, persistent list of slots.
///
/// `with` prepends and shares the tail structurally, so deriving a new state
/// from an existing one is O(1) and never disturbs readers of the original.
#[derive(Clone, Default)]
pub struct State {
    head: Option<Arc<StateNode>>,
    len: usize,
}

impl State {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state holding a single slot
    pub fn of(slot: Slot) -> Self {
        Self::new().with(slot)
    }

    /// Returns a new state with the slot prepended
    pub fn with(&self, slot: Slot) -> Self {
        Self {
            head: Some(Arc::new(StateNode {
                slot,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    /// The first slot whose name matches, front to back
    pub fn get(&self, name: &Name) -> Option<&SlotValue> {
        self.iter()
            .find(|slot| slot.name() == name)
            .map(Slot::value)
    }

    /// Number of slots, duplicates included
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no slots are held
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a state with duplicate (name, type) slots removed, keeping the
    /// first occurrence of each
    pub fn compact(&self) -> State {
        let mut seen: Vec<(Name, SlotType)> = Vec::new();
        let mut kept: Vec<Slot> = Vec::new();
        for slot in self.iter() {
            let key = (slot.name().clone(), slot.slot_type());
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            kept.push(slot.clone());
        }
        let mut compacted = State::new();
        for slot in kept.into_iter().rev() {
            compacted = compacted.with(slot);
        }
        compacted
    }

    /// Iterate slots front (most recent) to back
    pub fn iter(&self) -> StateIter<'_> {
        StateIter {
            node: self.head.as_deref(),
        }
    }
}

/// Iterator over the slots of a state
pub struct StateIter<'a> {
    node: Option<&'a StateNode>,
}

impl<'a> Iterator for StateIter<'a> {
    type Item = &'a Slot;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.node?;
        self.node = node.next.as_deref();
        Some(&node.slot)
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, slot) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{slot}")?;
        }
        write!(f, "}}")
    }
}
