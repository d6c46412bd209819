/*!

A `NatSet` is a set of small natural numbers, backed by a bitset rather than a `HashSet<usize>`. It is used
throughout the core for dependency sets, cone-of-influence closures, and "ignored index" filters, all of which are
sets of small integers (variable indices) that are frequently unioned, intersected, and iterated in order.

*/

use std::fmt::{Debug, Formatter};
use bit_set::BitSet;

#[derive(Clone, Default, PartialEq, Eq)]
pub struct NatSet {
    bits: BitSet,
}

impl NatSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        NatSet { bits: BitSet::with_capacity(capacity) }
    }

    #[inline]
    pub fn insert(&mut self, n: usize) -> bool {
        self.bits.insert(n)
    }

    #[inline]
    pub fn remove(&mut self, n: usize) -> bool {
        self.bits.remove(n)
    }

    #[inline]
    pub fn contains(&self, n: usize) -> bool {
        self.bits.contains(n)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn clear(&mut self) {
        self.bits.clear()
    }

    /// In-place union: `self = self ∪ other`. Returns `true` if `self` changed.
    pub fn union_with(&mut self, other: &NatSet) -> bool {
        let before = self.bits.len();
        self.bits.union_with(&other.bits);
        self.bits.len() != before
    }

    pub fn intersect_with(&mut self, other: &NatSet) {
        self.bits.intersect_with(&other.bits);
    }

    pub fn difference_with(&mut self, other: &NatSet) {
        self.bits.difference_with(&other.bits);
    }

    /// Returns a new set containing the elements of `self` not present in `other`.
    pub fn difference(&self, other: &NatSet) -> NatSet {
        let mut result = self.clone();
        result.difference_with(other);
        result
    }

    pub fn union(&self, other: &NatSet) -> NatSet {
        let mut result = self.clone();
        result.union_with(other);
        result
    }

    pub fn iter(&self) -> bit_set::Iter<'_, u32> {
        self.bits.iter()
    }

    pub fn is_disjoint(&self, other: &NatSet) -> bool {
        self.bits.is_disjoint(&other.bits)
    }

    pub fn is_subset(&self, other: &NatSet) -> bool {
        self.bits.is_subset(&other.bits)
    }
}

impl FromIterator<usize> for NatSet {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        let mut set = NatSet::new();
        for i in iter {
            set.insert(i);
        }
        set
    }
}

impl<'a> IntoIterator for &'a NatSet {
    type Item = usize;
    type IntoIter = bit_set::Iter<'a, u32>;

    fn into_iter(self) -> Self::IntoIter {
        self.bits.iter()
    }
}

impl Debug for NatSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.bits.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_contains() {
        let mut s = NatSet::new();
        assert!(s.is_empty());
        s.insert(3);
        s.insert(5);
        assert!(s.contains(3));
        assert!(s.contains(5));
        assert!(!s.contains(4));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn union_and_difference() {
        let a: NatSet = [1usize, 2, 3].into_iter().collect();
        let b: NatSet = [2usize, 3, 4].into_iter().collect();

        let u = a.union(&b);
        assert_eq!(u.len(), 4);
        for i in [1, 2, 3, 4] {
            assert!(u.contains(i));
        }

        let d = a.difference(&b);
        assert_eq!(d.len(), 1);
        assert!(d.contains(1));
    }

    #[test]
    fn subset_and_disjoint() {
        let a: NatSet = [1usize, 2].into_iter().collect();
        let b: NatSet = [1usize, 2, 3].into_iter().collect();
        let c: NatSet = [9usize].into_iter().collect();

        assert!(a.is_subset(&b));
        assert!(a.is_disjoint(&c));
        assert!(!a.is_disjoint(&b));
    }
}
