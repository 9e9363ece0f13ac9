//! Nearest-neighbour clustering.
//!
//! Uses a union-find data structure over items tagged with a bucket id.
//! Items are only compared when their bucket ids differ by at most one.

use clutrack_core::ClusteringError;

use crate::predicates::MergePredicate;

/// How the pairwise sweep bounds its search window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SweepMode {
    /// Compare every pair and skip pairs more than one bucket apart.
    Exhaustive,
    /// Stop scanning once the bucket gap exceeds one. Requires input sorted
    /// by bucket id.
    #[default]
    SortedByBucket,
}

/// Union-Find data structure for connected component detection.
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[x] != root {
            let next = self.parent[x];
            self.parent[x] = root;
            x = next;
        }
        root
    }

    fn union(&mut self, x: usize, y: usize) {
        let px = self.find(x);
        let py = self.find(y);

        if px == py {
            return;
        }

        match self.rank[px].cmp(&self.rank[py]) {
            std::cmp::Ordering::Less => self.parent[px] = py,
            std::cmp::Ordering::Greater => self.parent[py] = px,
            std::cmp::Ordering::Equal => {
                self.parent[py] = px;
                self.rank[px] += 1;
            }
        }
    }
}

/// Groups items connected by a [`MergePredicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NearestNeighborClusterer {
    min_size: usize,
    mode: SweepMode,
}

impl Default for NearestNeighborClusterer {
    fn default() -> Self {
        Self::new(1)
    }
}

impl NearestNeighborClusterer {
    /// Creates a clusterer keeping groups of at least `min_size` items.
    #[must_use]
    pub fn new(min_size: usize) -> Self {
        Self {
            min_size: min_size.max(1),
            mode: SweepMode::default(),
        }
    }

    /// Sets the sweep mode.
    #[must_use]
    pub fn with_mode(mut self, mode: SweepMode) -> Self {
        self.mode = mode;
        self
    }

    /// Minimum group size.
    #[must_use]
    pub fn min_size(&self) -> usize {
        self.min_size
    }

    /// Clusters `items`, with `buckets[i]` the bucket id of `items[i]`.
    ///
    /// Returns groups of item indices. Members of a group are in index order
    /// and groups are ordered by their first member. Groups smaller than the
    /// minimum size are dropped.
    ///
    /// # Errors
    /// [`ClusteringError::BucketMismatch`] if the slices differ in length,
    /// [`ClusteringError::UnsortedInput`] if the sorted sweep gets unsorted
    /// bucket ids.
    pub fn cluster<T, P>(
        &self,
        items: &[&T],
        buckets: &[i32],
        predicate: &P,
    ) -> Result<Vec<Vec<usize>>, ClusteringError>
    where
        T: ?Sized,
        P: MergePredicate<T> + ?Sized,
    {
        if items.len() != buckets.len() {
            return Err(ClusteringError::BucketMismatch {
                items: items.len(),
                buckets: buckets.len(),
            });
        }
        if self.mode == SweepMode::SortedByBucket {
            if let Some(position) = buckets.windows(2).position(|w| w[1] < w[0]) {
                return Err(ClusteringError::UnsortedInput {
                    position: position + 1,
                });
            }
        }

        let n = items.len();
        let mut uf = UnionFind::new(n);

        for i in 0..n {
            for j in (i + 1)..n {
                let gap = (buckets[j] - buckets[i]).abs();
                if gap > 1 {
                    match self.mode {
                        SweepMode::SortedByBucket => break,
                        SweepMode::Exhaustive => continue,
                    }
                }
                if predicate.merges(items[i], items[j]) {
                    uf.union(i, j);
                }
            }
        }

        // Group by root, ordered by first member.
        let mut slot_of_root = vec![usize::MAX; n];
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for i in 0..n {
            let root = uf.find(i);
            if slot_of_root[root] == usize::MAX {
                slot_of_root[root] = groups.len();
                groups.push(Vec::new());
            }
            groups[slot_of_root[root]].push(i);
        }

        groups.retain(|g| g.len() >= self.min_size);
        Ok(groups)
    }
}
