//! Event input: named collections of raw hits.

use crate::hit::RawHit;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A named collection of raw hits.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HitCollection {
    /// Collection name.
    pub name: String,
    /// Hit records.
    pub hits: Vec<RawHit>,
}

impl HitCollection {
    /// Creates a collection.
    #[must_use]
    pub fn new(name: impl Into<String>, hits: Vec<RawHit>) -> Self {
        Self {
            name: name.into(),
            hits,
        }
    }

    /// Number of hit records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// True if the collection holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// One event: the input collections of a single bunch crossing.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Event {
    /// Event number.
    #[cfg_attr(feature = "serde", serde(default))]
    pub number: u64,
    /// Input collections.
    pub collections: Vec<HitCollection>,
}

impl Event {
    /// Creates an event without collections.
    #[must_use]
    pub fn new(number: u64) -> Self {
        Self {
            number,
            collections: Vec::new(),
        }
    }

    /// Adds a collection.
    #[must_use]
    pub fn with_collection(mut self, collection: HitCollection) -> Self {
        self.collections.push(collection);
        self
    }

    /// Collection named `name`.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&HitCollection> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Total number of hit records over all collections.
    #[must_use]
    pub fn hit_count(&self) -> usize {
        self.collections.iter().map(HitCollection::len).sum()
    }
}
