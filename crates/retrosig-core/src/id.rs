//! Stable identity newtypes for the object model.
//!
//! [`ClassId`] names a class, module or singleton class in the
//! [`ClassRegistry`](crate::class::ClassRegistry). [`MethodKey`] is the stable
//! identity of a callable: the class that owns the definition plus the method
//! name. Signatures are keyed by `MethodKey`, never by source location.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Class, module or singleton-class identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub u32);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a callable: owning class plus method name.
///
/// Two lookups of the same inherited method through different subclasses
/// resolve to the same key, because the key always names the owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodKey {
    pub owner: ClassId,
    pub name: Arc<str>,
}

impl MethodKey {
    pub fn new(owner: ClassId, name: impl Into<Arc<str>>) -> Self {
        MethodKey {
            owner,
            name: name.into(),
        }
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.owner, self.name)
    }
}

/// A file/line pair naming where something was declared or called from.
///
/// Built from `std::panic::Location` at `#[track_caller]` entry points, so a
/// definition's location is the Rust line that defined it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: Arc<str>,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<Arc<str>>, line: u32) -> Self {
        SourceLocation {
            file: file.into(),
            line,
        }
    }

    /// Placeholder for callables with no known definition site.
    pub fn unknown() -> Self {
        SourceLocation::new("<unknown location>", 0)
    }

    pub fn is_unknown(&self) -> bool {
        self.line == 0 && &*self.file == "<unknown location>"
    }

    /// Location of the caller of the enclosing `#[track_caller]` function.
    #[track_caller]
    pub fn caller() -> Self {
        std::panic::Location::caller().into()
    }
}

impl From<&std::panic::Location<'_>> for SourceLocation {
    fn from(loc: &std::panic::Location<'_>) -> Self {
        SourceLocation::new(loc.file(), loc.line())
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            write!(f, "{}", self.file)
        } else {
            write!(f, "{}:{}", self.file, self.line)
        }
    }
}
