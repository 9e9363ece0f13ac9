//! Segments and the hit ownership registry.
//!
//! [`SegmentStore`] is the single owner of all segments of an event and the
//! only place where hit ownership is recorded. Every operation that changes
//! segment membership updates the owner table in the same step, so a hit
//! belongs to at most one active segment at any time.

use std::collections::HashSet;
use std::fmt;

use crate::error::{Error, Result};
use crate::hit::HitId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Handle of a segment in a [`SegmentStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SegmentId(pub usize);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// An ordered group of hits believed to belong to one trajectory.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Segment {
    id: SegmentId,
    hits: Vec<HitId>,
}

impl Segment {
    /// Segment handle.
    #[must_use]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Hits in insertion order.
    #[must_use]
    pub fn hits(&self) -> &[HitId] {
        &self.hits
    }

    /// Number of hits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// True if the segment holds no hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// First hit in insertion order.
    #[must_use]
    pub fn front(&self) -> Option<HitId> {
        self.hits.first().copied()
    }

    /// Last hit in insertion order.
    #[must_use]
    pub fn back(&self) -> Option<HitId> {
        self.hits.last().copied()
    }
}

/// Registry of all segments of one event and of hit ownership.
#[derive(Debug, Clone, Default)]
pub struct SegmentStore {
    slots: Vec<Option<Segment>>,
    owners: Vec<Option<SegmentId>>,
    active: usize,
}

impl SegmentStore {
    /// Creates a store for an event with `hit_count` hits.
    #[must_use]
    pub fn new(hit_count: usize) -> Self {
        Self {
            slots: Vec::new(),
            owners: vec![None; hit_count],
            active: 0,
        }
    }

    /// Number of hits in the event.
    #[must_use]
    pub fn hit_count(&self) -> usize {
        self.owners.len()
    }

    /// Number of active segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active
    }

    /// True if there are no active segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    /// Segment owning `hit`, if any.
    #[must_use]
    pub fn owner(&self, hit: HitId) -> Option<SegmentId> {
        self.owners.get(hit.0).copied().flatten()
    }

    /// True if `hit` belongs to an active segment.
    #[must_use]
    pub fn is_used(&self, hit: HitId) -> bool {
        self.owner(hit).is_some()
    }

    /// Active segment with handle `id`.
    #[must_use]
    pub fn get(&self, id: SegmentId) -> Option<&Segment> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    /// Iterates over active segments in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Handles of the active segments in creation order.
    #[must_use]
    pub fn ids(&self) -> Vec<SegmentId> {
        self.iter().map(Segment::id).collect()
    }

    /// Creates a segment and claims all of its hits.
    ///
    /// Nothing is modified if any hit is unknown, already owned, or listed
    /// twice.
    ///
    /// # Errors
    /// [`Error::UnknownHit`] or [`Error::AlreadyOwned`].
    pub fn create(&mut self, hits: Vec<HitId>) -> Result<SegmentId> {
        let id = SegmentId(self.slots.len());
        let mut seen = HashSet::with_capacity(hits.len());
        for &hit in &hits {
            match self.owners.get(hit.0) {
                None => return Err(Error::UnknownHit(hit)),
                Some(Some(owner)) => return Err(Error::AlreadyOwned { hit, owner: *owner }),
                Some(None) => {}
            }
            if !seen.insert(hit) {
                return Err(Error::AlreadyOwned { hit, owner: id });
            }
        }
        for &hit in &hits {
            self.owners[hit.0] = Some(id);
        }
        self.slots.push(Some(Segment { id, hits }));
        self.active += 1;
        Ok(id)
    }

    /// Appends an unowned hit to a segment and marks it used.
    ///
    /// # Errors
    /// [`Error::UnknownSegment`], [`Error::UnknownHit`] or
    /// [`Error::AlreadyOwned`].
    pub fn claim(&mut self, id: SegmentId, hit: HitId) -> Result<()> {
        if self.get(id).is_none() {
            return Err(Error::UnknownSegment(id));
        }
        match self.owners.get(hit.0) {
            None => return Err(Error::UnknownHit(hit)),
            Some(Some(owner)) => return Err(Error::AlreadyOwned { hit, owner: *owner }),
            Some(None) => {}
        }
        self.owners[hit.0] = Some(id);
        if let Some(Some(segment)) = self.slots.get_mut(id.0) {
            segment.hits.push(hit);
        }
        Ok(())
    }

    /// Destroys a segment and releases its hits.
    ///
    /// # Errors
    /// [`Error::UnknownSegment`] if `id` is not active.
    pub fn dissolve(&mut self, id: SegmentId) -> Result<Vec<HitId>> {
        let segment = self
            .slots
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(Error::UnknownSegment(id))?;
        for &hit in &segment.hits {
            self.owners[hit.0] = None;
        }
        self.active -= 1;
        Ok(segment.hits)
    }

    /// Moves all hits of `absorbed` into `survivor` and destroys `absorbed`.
    ///
    /// # Errors
    /// [`Error::UnknownSegment`] if either segment is inactive or both
    /// handles are the same.
    pub fn merge(&mut self, survivor: SegmentId, absorbed: SegmentId) -> Result<()> {
        if survivor == absorbed || self.get(survivor).is_none() {
            return Err(Error::UnknownSegment(survivor));
        }
        let moved = self
            .slots
            .get_mut(absorbed.0)
            .and_then(Option::take)
            .ok_or(Error::UnknownSegment(absorbed))?;
        for &hit in &moved.hits {
            self.owners[hit.0] = Some(survivor);
        }
        if let Some(Some(segment)) = self.slots.get_mut(survivor.0) {
            segment.hits.extend(moved.hits);
        }
        self.active -= 1;
        Ok(())
    }

    /// Hits not owned by any segment, in id order.
    pub fn unowned(&self) -> impl Iterator<Item = HitId> + '_ {
        self.owners
            .iter()
            .enumerate()
            .filter(|(_, owner)| owner.is_none())
            .map(|(i, _)| HitId(i))
    }

    /// Splits all hits of the event into `(used, unused)`.
    #[must_use]
    pub fn partition(&self) -> (Vec<HitId>, Vec<HitId>) {
        let mut used = Vec::with_capacity(self.owners.len());
        let mut unused = Vec::new();
        for (i, owner) in self.owners.iter().enumerate() {
            if owner.is_some() {
                used.push(HitId(i));
            } else {
                unused.push(HitId(i));
            }
        }
        (used, unused)
    }
}
