//! Subject identity and the substrate/resource traits.
//!
//! A subject is the identity of a component in the substrate hierarchy: an
//! interned name, a type tag, and a process-unique id, optionally enclosed
//! by the subject of the owning component. Subjects form a forest rooted at
//! the cortex.

use crate::name::Name;
use crate::types::{Id, State, SubjectType};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

struct SubjectInner {
    id: Id,
    name: Name,
    subject_type: SubjectType,
    enclosure: Option<Subject>,
    depth: usize,
    state: State,
}

/// The identity of a substrate component.
///
/// Cheap to clone; two clones of one subject are the same identity. Subjects
/// sharing a name remain distinguishable through their ids.
#[derive(Clone)]
pub struct Subject {
    inner: Arc<SubjectInner>,
}

impl Subject {
    /// Create a root subject with no enclosure
    pub fn new(name: Name, subject_type: SubjectType) -> Self {
        Self {
            inner: Arc::new(SubjectInner {
                id: Id::new(),
                name,
                subject_type,
                enclosure: None,
                depth: 1,
                state: State::new(),
            }),
        }
    }

    /// Create a subject enclosed by the subject of its owning component
    pub fn enclosed(name: Name, subject_type: SubjectType, enclosure: Subject) -> Self {
        let depth = enclosure.depth() + 1;
        Self {
            inner: Arc::new(SubjectInner {
                id: Id::new(),
                name,
                subject_type,
                enclosure: Some(enclosure),
                depth,
                state: State::new(),
            }),
        }
    }

    /// The process-unique identifier of this subject
    pub fn id(&self) -> Id {
        self.inner.id
    }

    /// The name of this subject
    pub fn name(&self) -> &Name {
        &self.inner.name
    }

    /// The type tag of this subject
    pub fn subject_type(&self) -> SubjectType {
        self.inner.subject_type
    }

    /// The state captured by this subject
    pub fn state(&self) -> &State {
        &self.inner.state
    }

    /// The enclosing subject, absent only for the root
    pub fn enclosure(&self) -> Option<&Subject> {
        self.inner.enclosure.as_ref()
    }

    /// The outermost subject of this subject's enclosure chain
    pub fn extremity(&self) -> &Subject {
        let mut current = self;
        while let Some(parent) = current.enclosure() {
            current = parent;
        }
        current
    }

    /// Number of subjects from the root to this subject, inclusive
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    /// The enclosure chain rendered with a separator, outermost first
    pub fn path(&self, separator: char) -> String {
        let mut names: Vec<&Name> = self.iter_refs().map(Subject::name).collect();
        names.reverse();
        let mut out = String::new();
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                out.push(separator);
            }
            out.push_str(&name.path_with_separator(separator));
        }
        out
    }

    /// True when this subject is directly or indirectly enclosed by `enclosure`
    pub fn within(&self, enclosure: &Subject) -> bool {
        let mut current = self.enclosure();
        while let Some(parent) = current {
            if parent.id() == enclosure.id() {
                return true;
            }
            current = parent.enclosure();
        }
        false
    }

    /// Iterate this subject and its enclosures, self first
    pub fn iter(&self) -> impl Iterator<Item = Subject> + '_ {
        self.iter_refs().cloned()
    }

    fn iter_refs(&self) -> SubjectIter<'_> {
        SubjectIter {
            current: Some(self),
        }
    }

    /// Representation of just this subject
    pub fn part(&self) -> String {
        format!(
            "Subject[name={},type={},id={}]",
            self.inner.name, self.inner.subject_type, self.inner.id
        )
    }
}

struct SubjectIter<'a> {
    current: Option<&'a Subject>,
}

impl<'a> Iterator for SubjectIter<'a> {
    type Item = &'a Subject;

    fn next(&mut self) -> Option<Self::Item> {
        let subject = self.current?;
        self.current = subject.enclosure();
        Some(subject)
    }
}

impl PartialEq for Subject {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Subject {}

impl Hash for Subject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl PartialOrd for Subject {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Subject {
    fn cmp(&self, other: &Self) -> Ordering {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return Ordering::Equal;
        }
        let by_enclosure = match (self.enclosure(), other.enclosure()) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(b),
        };
        by_enclosure
            .then_with(|| self.inner.name.cmp(&other.inner.name))
            .then_with(|| self.inner.id.cmp(&other.inner.id))
    }
}

impl fmt::Debug for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject")
            .field("name", &self.inner.name)
            .field("type", &self.inner.subject_type)
            .field("id", &self.inner.id)
            .finish()
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path('/'))
    }
}

/// Base trait for all substrate components that carry a subject
pub trait Substrate {
    /// Returns the subject identifying this substrate
    fn subject(&self) -> &Subject;
}

/// Trait for components whose usage can be terminated.
///
/// `close` is idempotent: calling it any number of times has the same effect
/// as calling it once, and it never fails.
pub trait Resource {
    /// Indicate that no more usage will be made of the instance
    fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;

    fn name(path: &str) -> Name {
        Name::from_path(path).unwrap()
    }

    #[test]
    fn test_subject_creation() {
        let subject = Subject::new(name("root"), SubjectType::Circuit);
        assert_eq!(subject.depth(), 1);
        assert!(subject.enclosure().is_none());
        assert_eq!(subject.subject_type(), SubjectType::Circuit);
    }

    #[test]
    fn test_subject_hierarchy() {
        let root = Subject::new(name("root"), SubjectType::Circuit);
        let child = Subject::enclosed(name("child"), SubjectType::Channel, root.clone());

        assert_eq!(child.depth(), 2);
        assert!(child.within(&root));
        assert!(!root.within(&child));
        assert_eq!(child.extremity().id(), root.id());
    }

    #[test]
    fn test_subject_path() {
        let root = Subject::new(name("root"), SubjectType::Circuit);
        let child = Subject::enclosed(name("a.b"), SubjectType::Channel, root);
        assert_eq!(child.path('/'), "root/a/b");
    }

    #[test]
    fn test_identity_not_shared_by_name() {
        let a = Subject::new(name("same"), SubjectType::Pipe);
        let b = Subject::new(name("same"), SubjectType::Pipe);
        assert_ne!(a, b);
        assert_ne!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn test_total_order() {
        let root = Subject::new(name("root"), SubjectType::Circuit);
        let a = Subject::enclosed(name("a"), SubjectType::Channel, root.clone());
        let b = Subject::enclosed(name("b"), SubjectType::Channel, root.clone());

        assert!(a < b);
        assert!(b > a);
        assert_eq!(a.cmp(&a), Ordering::Equal);
        assert!(root < a);
    }

    #[test]
    fn test_iter_walks_to_root() {
        let root = Subject::new(name("root"), SubjectType::Circuit);
        let mid = Subject::enclosed(name("mid"), SubjectType::Conduit, root.clone());
        let leaf = Subject::enclosed(name("leaf"), SubjectType::Channel, mid);

        let chain: Vec<_> = leaf.iter().map(|s| s.name().to_path()).collect();
        assert_eq!(chain, vec!["leaf", "mid", "root"]);
    }
}
