/*!

A `SpecialIndex<N>` acts like the unsigned integer type `N` but reserves its maximum value, `N::MAX`, to mean
"no index" (`NONE`/`UNDEFINED`). This is an alternative to the common practice of using a signed integer type and
encoding "no value" as a negative sentinel: using a signed type wastes half of the representable range, while
`SpecialIndex` only gives up the single largest value.

Used throughout the core for variable indices, CNF variable indices, and sort/kind indices — anywhere a `usize`-like
quantity needs a cheap, `Copy`, "not present" sentinel without paying for an `Option<usize>`'s discriminant in
hot inner loops (substitution arrays, the CNF vertex↔variable tables).

*/

use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};
use std::ops::{Add, AddAssign, Sub, SubAssign};

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct SpecialIndex<N> {
    inner: N,
}

macro_rules! impl_special_index {
    ($ty:ty) => {
        impl SpecialIndex<$ty> {
            pub const NONE: Self = Self { inner: <$ty>::MAX };

            #[inline(always)]
            pub const fn new(index: $ty) -> Self {
                Self { inner: index }
            }

            #[inline(always)]
            pub fn from_usize(index: usize) -> Self {
                debug_assert!(index < <$ty>::MAX as usize, "index too large for SpecialIndex");
                Self { inner: index as $ty }
            }

            #[inline(always)]
            pub fn is_index(&self) -> bool {
                self.inner != <$ty>::MAX
            }

            #[inline(always)]
            pub fn get(&self) -> Option<$ty> {
                if self.is_index() { Some(self.inner) } else { None }
            }

            #[inline(always)]
            pub fn idx(&self) -> usize {
                debug_assert!(self.is_index(), "called idx() on a NONE SpecialIndex");
                self.inner as usize
            }
        }

        impl Default for SpecialIndex<$ty> {
            fn default() -> Self {
                Self::NONE
            }
        }

        impl Display for SpecialIndex<$ty> {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                if self.is_index() { write!(f, "{}", self.inner) } else { write!(f, "NONE") }
            }
        }

        impl Debug for SpecialIndex<$ty> {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                if self.is_index() {
                    write!(f, "SpecialIndex({})", self.inner)
                } else {
                    write!(f, "SpecialIndex(NONE)")
                }
            }
        }

        impl Ord for SpecialIndex<$ty> {
            fn cmp(&self, other: &Self) -> Ordering {
                self.inner.cmp(&other.inner)
            }
        }

        impl PartialOrd for SpecialIndex<$ty> {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl From<$ty> for SpecialIndex<$ty> {
            fn from(value: $ty) -> Self {
                Self::new(value)
            }
        }

        impl Add<$ty> for SpecialIndex<$ty> {
            type Output = Self;
            fn add(self, rhs: $ty) -> Self::Output {
                if self.is_index() { Self::new(self.inner + rhs) } else { self }
            }
        }

        impl AddAssign<$ty> for SpecialIndex<$ty> {
            fn add_assign(&mut self, rhs: $ty) {
                if self.is_index() {
                    self.inner += rhs;
                }
            }
        }

        impl Sub<$ty> for SpecialIndex<$ty> {
            type Output = Self;
            fn sub(self, rhs: $ty) -> Self::Output {
                if self.is_index() { Self::new(self.inner - rhs) } else { self }
            }
        }

        impl SubAssign<$ty> for SpecialIndex<$ty> {
            fn sub_assign(&mut self, rhs: $ty) {
                if self.is_index() {
                    self.inner -= rhs;
                }
            }
        }
    };
}

impl_special_index!(u32);
impl_special_index!(u16);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_default_and_not_index() {
        let none: SpecialIndex<u32> = SpecialIndex::default();
        assert_eq!(none, SpecialIndex::NONE);
        assert!(!none.is_index());
        assert_eq!(none.get(), None);
    }

    #[test]
    fn round_trips_small_indices() {
        let idx = SpecialIndex::<u32>::from_usize(42);
        assert!(idx.is_index());
        assert_eq!(idx.idx(), 42);
        assert_eq!(idx.get(), Some(42));
    }

    #[test]
    fn arithmetic_is_noop_on_none() {
        let none = SpecialIndex::<u32>::NONE;
        assert_eq!(none + 5, none);
        let idx = SpecialIndex::<u32>::new(10);
        assert_eq!((idx + 5).idx(), 15);
        assert_eq!((idx - 3).idx(), 7);
    }

    #[test]
    fn ordering_matches_inner() {
        let a = SpecialIndex::<u32>::new(1);
        let b = SpecialIndex::<u32>::new(2);
        assert!(a < b);
    }
}
