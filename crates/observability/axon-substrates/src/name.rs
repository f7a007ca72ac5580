//! Interned hierarchical names.
//!
//! Names are ordered sequences of non-empty string parts. They are interned
//! in a process-wide table keyed on (parent identity, part), so two names
//! built from the same sequence of parts are always the same instance and
//! equality is reference identity. Names are immutable and retained for the
//! lifetime of the process.

use crate::types::{SubstratesError, SubstratesResult};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Separator used by the canonical dotted string form
pub const SEPARATOR: char = '.';

/// First level of the intern table: part string to root name.
static ROOTS: Lazy<RwLock<HashMap<String, Name>>> = Lazy::new(|| RwLock::new(HashMap::new()));

struct NameInner {
    parent: Option<Name>,
    part: String,
    depth: usize,
    children: RwLock<HashMap<String, Name>>,
}

/// An interned hierarchical name.
///
/// Cheap to clone; comparison by `==` is reference identity, which by the
/// interning invariant coincides with structural equality of the part
/// sequences.
#[derive(Clone)]
pub struct Name {
    inner: Arc<NameInner>,
}

impl Name {
    /// Intern the name for a dotted path such as `"service.queue.depth"`.
    ///
    /// Rejects empty input, empty segments, and leading, trailing, or
    /// consecutive separators.
    pub fn from_path(path: &str) -> SubstratesResult<Name> {
        if path.is_empty() {
            return Err(SubstratesError::InvalidName("empty path".to_string()));
        }
        if path.starts_with(SEPARATOR) || path.ends_with(SEPARATOR) {
            return Err(SubstratesError::InvalidName(format!(
                "path must not start or end with '{SEPARATOR}': {path}"
            )));
        }
        let mut name: Option<Name> = None;
        for part in path.split(SEPARATOR) {
            if part.is_empty() {
                return Err(SubstratesError::InvalidName(format!(
                    "path contains an empty segment: {path}"
                )));
            }
            name = Some(match name {
                None => Self::root(part),
                Some(parent) => parent.child(part),
            });
        }
        name.ok_or_else(|| SubstratesError::InvalidName(format!("empty path: {path}")))
    }

    /// Intern a name from an iterable of parts
    pub fn from_parts<I, S>(parts: I) -> SubstratesResult<Name>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut name: Option<Name> = None;
        for part in parts {
            let part = part.as_ref();
            Self::validate_part(part)?;
            name = Some(match name {
                None => Self::root(part),
                Some(parent) => parent.child(part),
            });
        }
        name.ok_or_else(|| SubstratesError::InvalidName("no parts provided".to_string()))
    }

    /// Intern the canonical dotted name of a Rust type, derived from its
    /// module path (`my_crate::queue::Depth` becomes `my_crate.queue.Depth`)
    pub fn from_type<T: ?Sized>() -> SubstratesResult<Name> {
        Self::from_path(&std::any::type_name::<T>().replace("::", "."))
    }

    /// Intern a name for an enum constant as `Type.Variant`
    pub fn from_enum<T: fmt::Debug>(value: &T) -> SubstratesResult<Name> {
        let type_name = std::any::type_name::<T>();
        let simple = type_name.rsplit("::").next().unwrap_or(type_name);
        Self::from_path(&format!("{simple}{SEPARATOR}{value:?}"))
    }

    /// Returns the unique child of this name for the given part
    pub fn name(&self, part: &str) -> SubstratesResult<Name> {
        Self::validate_part(part)?;
        Ok(self.child(part))
    }

    /// Returns the concatenation of this name and all parts of `other`
    pub fn concat(&self, other: &Name) -> Name {
        let mut name = self.clone();
        for part in other.parts() {
            name = name.child(part);
        }
        name
    }

    /// The enclosing (parent) name, if any
    pub fn enclosure(&self) -> Option<&Name> {
        self.inner.parent.as_ref()
    }

    /// The final part of this name
    pub fn part(&self) -> &str {
        &self.inner.part
    }

    /// Number of parts in this name
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    /// Parts of this name, outermost first
    pub fn parts(&self) -> Vec<&str> {
        let mut parts = Vec::with_capacity(self.inner.depth);
        let mut current = Some(self);
        while let Some(name) = current {
            parts.push(name.inner.part.as_str());
            current = name.inner.parent.as_ref();
        }
        parts.reverse();
        parts
    }

    /// Canonical dotted form
    pub fn to_path(&self) -> String {
        self.path_with_separator(SEPARATOR)
    }

    /// String form joined by an arbitrary separator
    pub fn path_with_separator(&self, separator: char) -> String {
        let mut out = String::new();
        for (i, part) in self.parts().iter().enumerate() {
            if i > 0 {
                out.push(separator);
            }
            out.push_str(part);
        }
        out
    }

    /// Child lookup for crate-internal literal parts that need no validation
    pub(crate) fn child_part(&self, part: &str) -> Name {
        self.child(part)
    }

    /// Root lookup for crate-internal literal parts that need no validation
    pub(crate) fn root_part(part: &str) -> Name {
        Self::root(part)
    }

    fn validate_part(part: &str) -> SubstratesResult<()> {
        if part.is_empty() {
            return Err(SubstratesError::InvalidName("empty part".to_string()));
        }
        if part.contains(SEPARATOR) {
            return Err(SubstratesError::InvalidName(format!(
                "part must not contain '{SEPARATOR}': {part}"
            )));
        }
        Ok(())
    }

    fn root(part: &str) -> Name {
        if let Some(hit) = ROOTS.read().get(part) {
            return hit.clone();
        }
        let mut roots = ROOTS.write();
        if let Some(hit) = roots.get(part) {
            return hit.clone();
        }
        let name = Name {
            inner: Arc::new(NameInner {
                parent: None,
                part: part.to_string(),
                depth: 1,
                children: RwLock::new(HashMap::new()),
            }),
        };
        roots.insert(part.to_string(), name.clone());
        name
    }

    fn child(&self, part: &str) -> Name {
        if let Some(hit) = self.inner.children.read().get(part) {
            return hit.clone();
        }
        let mut children = self.inner.children.write();
        if let Some(hit) = children.get(part) {
            return hit.clone();
        }
        let name = Name {
            inner: Arc::new(NameInner {
                parent: Some(self.clone()),
                part: part.to_string(),
                depth: self.inner.depth + 1,
                children: RwLock::new(HashMap::new()),
            }),
        };
        children.insert(part.to_string(), name.clone());
        name
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.inner) as usize).hash(state);
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return std::cmp::Ordering::Equal;
        }
        self.parts().cmp(&other.parts())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.to_path())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_path())
    }
}
