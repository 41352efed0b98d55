//! Common definitions that are shared between different parts of the compiler.

// Use sorted sets and maps for consistent output
pub use std::collections::{BTreeMap as Map, BTreeSet as Set};

/// Identifiers: interned strings. Two `Id`s compare equal iff their text is
/// equal, and interning keeps name lookups cheap to copy around.
pub type Id = internment::Intern<String>;

/// A 1-based source line number, attached to diagnostics.
pub type Line = u32;

/// Intern a fresh identifier from any string-like value.
pub fn intern(s: impl Into<String>) -> Id {
    internment::Intern::new(s.into())
}
