//! Shared entity types

use serde::Serialize;

/// Index into the Program's class table
pub type ClassId = usize;

/// Member visibility.
///
/// `Inaccessible` marks a private member copied into a derived class's view
/// during inheritance: it still occupies the name, but any access to it is a
/// distinct error, not a lookup miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Visibility {
    Public,
    Protected,
    Private,
    Inaccessible,
}

/// What kind of entity a reference step resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Primitive,
    Method,
    Object,
}

/// A source location used for definitions and find-references
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRef {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl SourceRef {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self { file: file.into(), line, column }
    }
}

/// Result of a visibility-aware member lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberLookup<T> {
    Found(T),
    Inaccessible,
    NotFound,
}

impl<T> MemberLookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_inaccessible(&self) -> bool {
        matches!(self, Self::Inaccessible)
    }
}

/// Identifiers may not contain a double underscore; `__` is reserved for
/// compiler-generated names, which keeps the namespaces disjoint.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("__")
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_rejects_double_underscore() {
        assert!(!is_valid_identifier("foo__bar"));
        assert!(!is_valid_identifier("__foo"));
        assert!(!is_valid_identifier("foo__"));
        assert!(is_valid_identifier("foo_bar"));
        assert!(is_valid_identifier("_foo"));
    }

    #[test]
    fn test_identifier_shape() {
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("a-b"));
        assert!(is_valid_identifier("Window"));
    }
}
