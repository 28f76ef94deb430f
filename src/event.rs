//! The data model: versions, UIDs, and indexable operations.

use std::fmt;

#[cfg_attr(feature = "testing", derive(proptest_derive::Arbitrary))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version(pub u64);

impl Version {
    pub const ZERO: Version = Version(0);

    pub fn max(self, other: Version) -> Version {
        Version(self.0.max(other.0))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(v: u64) -> Self {
        Version(v)
    }
}

/// A document's caller-provided 64-bit unique identifier.
pub type Uid = u64;

/// The output of the interpreter: a document plus a stable UID and an
/// add/update/delete flag. Generic over the document payload type `D` so
/// the core never needs to know what a "document" concretely looks like.
#[cfg_attr(feature = "testing", derive(proptest_derive::Arbitrary))]
#[derive(Debug, Clone)]
pub enum Indexable<D> {
    Add { uid: Uid, doc: D },
    Update { uid: Uid, doc: D },
    Delete { uid: Uid },
}

impl<D> Indexable<D> {
    pub fn uid(&self) -> Uid {
        match self {
            Indexable::Add { uid, .. } => *uid,
            Indexable::Update { uid, .. } => *uid,
            Indexable::Delete { uid } => *uid,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Indexable::Delete { .. })
    }
}

/// A single versioned batch handed to `consume`: an ordered sequence of
/// events plus the highest version the batch represents. `E` is the raw,
/// opaque producer payload; the interpreter turns each `E` into an
/// `Indexable<D>`.
#[derive(Debug, Clone)]
pub struct EventBatch<E> {
    pub events: Vec<E>,
    pub version: Version,
}

impl<E> EventBatch<E> {
    pub fn new(events: Vec<E>, version: Version) -> Self {
        Self { events, version }
    }
}
