//! Document path identity.

use std::fmt;

/// Canonical resource name of a single document.
///
/// Opaque to the scheduler: equality is plain string equality, and no path
/// segment parsing or normalization happens here. Building a valid resource
/// name (database/collection/document hierarchy) is a client-bootstrap
/// concern that lives outside this crate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath(String);

impl DocumentPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DocumentPath {
    fn from(s: String) -> Self {
        DocumentPath(s)
    }
}

impl From<&str> for DocumentPath {
    fn from(s: &str) -> Self {
        DocumentPath(s.to_string())
    }
}
