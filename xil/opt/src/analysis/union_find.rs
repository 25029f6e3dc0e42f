use std::collections::BTreeMap;

/// Disjoint sets over `0..n`. The representative of a set is always its
/// lowest member, so merging never depends on the order of the arguments.
#[derive(Clone, Debug)]
pub struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression.
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// The representative of `x`, without compressing paths.
    pub fn root(&self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        root
    }

    pub fn is_representative(&self, x: usize) -> bool {
        self.parent[x] == x
    }

    /// Merge the sets of `a` and `b` and return the new representative.
    pub fn union(&mut self, a: usize, b: usize) -> usize {
        let (ra, rb) = (self.find(a), self.find(b));
        let (lo, hi) = if ra <= rb { (ra, rb) } else { (rb, ra) };
        self.parent[hi] = lo;
        lo
    }

    /// Merge the sets of `a` and `b` if `can_merge` accepts their
    /// representatives. Returns whether a merge happened.
    pub fn try_union<F>(&mut self, a: usize, b: usize, can_merge: F) -> bool
    where
        F: FnOnce(usize, usize) -> bool,
    {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb || !can_merge(ra.min(rb), ra.max(rb)) {
            return false;
        }
        self.union(ra, rb);
        true
    }

    /// Every set, keyed by its representative, with members in ascending
    /// order.
    pub fn classes(&mut self) -> BTreeMap<usize, Vec<usize>> {
        let mut classes: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for x in 0..self.parent.len() {
            let root = self.find(x);
            classes.entry(root).or_default().push(x);
        }
        classes
    }
}
