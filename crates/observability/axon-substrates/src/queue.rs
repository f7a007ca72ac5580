//! Script scheduling over a circuit's worker.
//!
//! A queue posts scripts onto its circuit's ingress queue; each script
//! executes on the worker thread under the same ordering guarantees as
//! emissions. A running script receives a `Current` through which follow-up
//! work can be posted; such work lands on the transit queue and therefore
//! runs before the next externally posted script.

use crate::subject::{Subject, Substrate};
use crate::types::{SubjectType, SubstratesError, SubstratesResult};
use crate::valve::Valve;
use std::fmt;
use std::sync::Arc;

/// An executable unit of work scheduled on a circuit
pub trait Script: Send + Sync {
    /// Execute this script on the circuit's worker thread
    fn exec(&self, current: &Current);
}

impl<F> Script for F
where
    F: Fn(&Current) + Send + Sync,
{
    fn exec(&self, current: &Current) {
        self(current)
    }
}

/// Coordinates the processing of queued scripts for one circuit.
///
/// Cheap to clone; all clones post into the same worker.
#[derive(Clone)]
pub struct Queue {
    subject: Subject,
    valve: Arc<Valve>,
}

impl Queue {
    pub(crate) fn new(subject: Subject, valve: Arc<Valve>) -> Self {
        Self { subject, valve }
    }

    /// Post a script for execution on the worker thread
    pub fn post(&self, script: Arc<dyn Script>) -> SubstratesResult<()> {
        let current = Current {
            subject: Subject::enclosed(
                self.subject.name().child_part("current"),
                SubjectType::Current,
                self.subject.clone(),
            ),
            valve: self.valve.clone(),
        };
        let accepted = self
            .valve
            .submit(Box::new(move || script.exec(&current)));
        if accepted {
            Ok(())
        } else {
            Err(SubstratesError::Closed(format!(
                "queue {} no longer accepts scripts",
                self.subject.name()
            )))
        }
    }

    /// Block until the queue has fully drained
    pub fn await_empty(&self) -> SubstratesResult<()> {
        self.valve.await_empty()
    }
}

impl Substrate for Queue {
    fn subject(&self) -> &Subject {
        &self.subject
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("subject", &self.subject)
            .finish()
    }
}

/// Execution context of a running script.
///
/// Posting through the current enqueues onto the transit queue, so the
/// posted work completes before the next externally submitted script.
#[derive(Clone)]
pub struct Current {
    subject: Subject,
    valve: Arc<Valve>,
}

impl Current {
    /// Post follow-up work from within a running script
    pub fn post(&self, script: Arc<dyn Script>) -> SubstratesResult<()> {
        let current = self.clone();
        let accepted = self
            .valve
            .submit(Box::new(move || script.exec(&current)));
        if accepted {
            Ok(())
        } else {
            Err(SubstratesError::Closed(
                "circuit no longer accepts scripts".to_string(),
            ))
        }
    }
}

impl Substrate for Current {
    fn subject(&self) -> &Subject {
        &self.subject
    }
}

impl fmt::Debug for Current {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Current")
            .field("subject", &self.subject)
            .finish()
    }
}
