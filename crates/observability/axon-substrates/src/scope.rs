//! Resource management scopes.
//!
//! A scope collects resources and closes them together, most recently
//! registered first. Child scopes are themselves resources of their parent,
//! so closing the outermost scope tears down the whole subtree.

use crate::circuit::sequenced;
use crate::name::Name;
use crate::subject::{Resource, Subject, Substrate};
use crate::types::{SubjectType, SubstratesError, SubstratesResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct ScopeInner {
    subject: Subject,
    resources: Mutex<Vec<Box<dyn Resource + Send>>>,
    closed: AtomicBool,
}

/// A scope owning the lifetime of registered resources.
///
/// Cheap to clone; all clones manage the same resource set.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    pub(crate) fn new(name: Name, enclosure: Option<Subject>) -> Self {
        let subject = match enclosure {
            Some(parent) => Subject::enclosed(name, SubjectType::Scope, parent),
            None => Subject::new(name, SubjectType::Scope),
        };
        Self {
            inner: Arc::new(ScopeInner {
                subject,
                resources: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Register a resource to be closed with this scope.
    ///
    /// Fails with `IllegalState` once the scope is closed.
    pub fn register<R>(&self, resource: R) -> SubstratesResult<()>
    where
        R: Resource + Send + 'static,
    {
        if self.is_closed() {
            return Err(SubstratesError::IllegalState(format!(
                "scope {} is closed",
                self.inner.subject.name()
            )));
        }
        self.inner.resources.lock().push(Box::new(resource));
        Ok(())
    }

    /// Create an anonymous child scope
    pub fn scope(&self) -> SubstratesResult<Scope> {
        self.scope_named(sequenced("scope"))
    }

    /// Create a named child scope, closed together with this one
    pub fn scope_named(&self, name: Name) -> SubstratesResult<Scope> {
        let child = Scope::new(name, Some(self.inner.subject.clone()));
        self.register(child.clone())?;
        Ok(child)
    }

    /// True once the scope was closed
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl Substrate for Scope {
    fn subject(&self) -> &Subject {
        &self.inner.subject
    }
}

impl Resource for Scope {
    fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let resources = std::mem::take(&mut *self.inner.resources.lock());
        for resource in resources.iter().rev() {
            resource.close();
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("subject", &self.inner.subject)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe {
        closed: Arc<Mutex<Vec<&'static str>>>,
        label: &'static str,
    }

    impl Resource for Probe {
        fn close(&self) {
            self.closed.lock().push(self.label);
        }
    }

    fn scope() -> Scope {
        Scope::new(Name::from_path("scope").unwrap(), None)
    }

    #[test]
    fn test_close_runs_in_reverse_registration_order() {
        let scope = scope();
        let order = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second", "third"] {
            scope
                .register(Probe {
                    closed: order.clone(),
                    label,
                })
                .unwrap();
        }
        scope.close();
        assert_eq!(*order.lock(), vec!["third", "second", "first"]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let scope = scope();
        let order = Arc::new(Mutex::new(Vec::new()));
        scope
            .register(Probe {
                closed: order.clone(),
                label: "only",
            })
            .unwrap();
        scope.close();
        scope.close();
        assert_eq!(order.lock().len(), 1);
    }

    #[test]
    fn test_register_after_close_is_illegal() {
        let scope = scope();
        scope.close();
        let result = scope.register(Probe {
            closed: Arc::new(Mutex::new(Vec::new())),
            label: "late",
        });
        assert!(matches!(result, Err(SubstratesError::IllegalState(_))));
    }

    #[test]
    fn test_child_scope_closes_with_parent() {
        let parent = scope();
        let child = parent.scope_named(Name::from_path("child").unwrap()).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        child
            .register(Probe {
                closed: order.clone(),
                label: "nested",
            })
            .unwrap();
        parent.close();
        assert!(child.is_closed());
        assert_eq!(*order.lock(), vec!["nested"]);
    }
}
