//! Closed intervals on an ordered key, and an interval "tree" supporting
//! point/interval containment and batch overlap queries.
//!
//! Implemented as a max-end-augmented sorted vector rather than a classic
//! self-balancing BST: insertion happens once up front (datasets build the
//! exclusion tree, or an overlap index, from a fixed batch of files), so a
//! sort-once, query-many structure is simpler and just as fast as a tree
//! for this crate's access pattern.

/// A closed interval `[start, end]`. Both endpoints are inclusive, so two
/// intervals that only share an endpoint are considered to overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval<T> {
    pub start: T,
    pub end: T,
}

impl<T: Ord + Copy> Interval<T> {
    pub fn new(start: T, end: T) -> Self {
        Self { start, end }
    }

    pub fn contains_point(&self, point: T) -> bool {
        self.start <= point && point <= self.end
    }

    pub fn overlaps(&self, other: &Interval<T>) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Widen both ends by `delta` (e.g. a tolerance window).
    pub fn widen(&self, delta_sub_start: T, delta_add_end: T) -> Interval<T>
    where
        T: std::ops::Sub<Output = T> + std::ops::Add<Output = T>,
    {
        Interval::new(self.start - delta_sub_start, self.end + delta_add_end)
    }
}

/// What to probe the tree with: either a single point or a whole interval.
pub enum Probe<T> {
    Point(T),
    Interval(Interval<T>),
}

/// An augmented collection of stored intervals supporting overlap queries.
///
/// Entries keep their original insertion index, so `query` results are
/// reported in a stable, insertion-ordered sequence rather than whatever
/// order the internal sort produces.
pub struct IntervalTree<T, V> {
    // (interval, original insertion index, value), sorted by start.
    entries: Vec<(Interval<T>, usize, V)>,
    // entries[i].1's running max of .end over entries[0..=i], for pruning.
    running_max_end: Vec<T>,
}

impl<T: Ord + Copy, V> IntervalTree<T, V> {
    pub fn new() -> Self {
        Self { entries: Vec::new(), running_max_end: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Build a tree from an iterator of `(interval, value)` pairs. Insertion
    /// order here becomes the stable ordering used to report query results.
    pub fn from_intervals(items: impl IntoIterator<Item = (Interval<T>, V)>) -> Self {
        let mut entries: Vec<(Interval<T>, usize, V)> =
            items.into_iter().enumerate().map(|(i, (iv, v))| (iv, i, v)).collect();
        entries.sort_by_key(|(iv, _, _)| iv.start);

        let mut running_max_end = Vec::with_capacity(entries.len());
        let mut max_end: Option<T> = None;
        for (iv, _, _) in &entries {
            max_end = Some(match max_end {
                Some(m) if m >= iv.end => m,
                _ => iv.end,
            });
            running_max_end.push(max_end.unwrap());
        }

        Self { entries, running_max_end }
    }

    pub fn contains(&self, point: T) -> bool {
        self.entries.iter().any(|(iv, _, _)| iv.contains_point(point))
    }

    pub fn overlaps(&self, probe: &Interval<T>) -> bool {
        self.entries.iter().any(|(iv, _, _)| iv.overlaps(probe))
    }

    /// For each probe, the insertion indices of stored intervals that
    /// overlap it, in insertion order. Empty tree -> empty lists for every
    /// probe.
    pub fn query(&self, probes: &[Probe<T>]) -> Vec<Vec<usize>> {
        probes.iter().map(|p| self.query_one(p)).collect()
    }

    fn query_one(&self, probe: &Probe<T>) -> Vec<usize> {
        let probe_iv = match probe {
            Probe::Point(p) => Interval::new(*p, *p),
            Probe::Interval(iv) => *iv,
        };

        // Entries are sorted by start; once start exceeds the probe's end
        // no later entry can overlap (start-ascending pruning). The running
        // max-end lets us skip scanning once the running max can no longer
        // reach the probe's start, mirroring a classic augmented-tree prune.
        let mut hits: Vec<usize> = Vec::new();
        for (i, (iv, orig_idx, _)) in self.entries.iter().enumerate() {
            if iv.start > probe_iv.end {
                break;
            }
            if self.running_max_end[i] < probe_iv.start {
                continue;
            }
            if iv.overlaps(&probe_iv) {
                hits.push(*orig_idx);
            }
        }
        hits.sort_unstable();
        hits
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, _, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Interval<T>, &V)> {
        self.entries.iter().map(|(iv, _, v)| (iv, v))
    }
}

impl<T: Ord + Copy, V> Default for IntervalTree<T, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_matches_closed_semantics() {
        let iv = Interval::new(10, 20);
        assert!(iv.contains_point(10));
        assert!(iv.contains_point(20));
        assert!(iv.contains_point(15));
        assert!(!iv.contains_point(9));
        assert!(!iv.contains_point(21));
    }

    #[test]
    fn empty_tree_queries_are_empty() {
        let tree: IntervalTree<i64, ()> = IntervalTree::new();
        let result = tree.query(&[Probe::Point(5), Probe::Interval(Interval::new(1, 2))]);
        assert_eq!(result, vec![Vec::<usize>::new(), Vec::<usize>::new()]);
    }

    #[test]
    fn query_is_insertion_ordered() {
        let tree = IntervalTree::from_intervals(vec![
            (Interval::new(0, 5), "a"),
            (Interval::new(3, 8), "b"),
            (Interval::new(100, 200), "c"),
        ]);
        let result = tree.query(&[Probe::Point(4)]);
        assert_eq!(result, vec![vec![0, 1]]);
    }

    #[test]
    fn overlap_tolerance_scenario() {
        // S6: primary (10,20), secondary (22,30), delta=3 -> overlap; delta=1 -> not.
        let primary = Interval::new(10, 20);
        let secondary = Interval::new(22, 30);

        let widened_3 = Interval::new(secondary.start - 3, secondary.end + 3);
        assert!(primary.overlaps(&widened_3));

        let widened_1 = Interval::new(secondary.start - 1, secondary.end + 1);
        assert!(!primary.overlaps(&widened_1));
    }
}
