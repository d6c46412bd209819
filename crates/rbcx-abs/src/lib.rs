/*!

Types/type aliases that abstract over the implementing backing type.

# Background and Motivation

A motivating example is the `IString` type, an interned string type. A number of external crates could provide
this functionality. This module redirects to whatever chosen implementation we want. To use the
[`string_cache` crate](https://crates.io/crates/string_cache), we just define `IString` as an alias for
`string_cache::DefaultAtom`.

For types or infrastructure with very different possible backing implementations, we define an abstraction layer
over the implementation. For example, the `log` module could use any of a number of logging frameworks or even a
bespoke solution. However, its (crate) public interface consists only of
`set_global_logging_threshold()`/`get_global_logging_threshold()` and the macros `critical!`, `error!`, `warning!`,
`info!`, `debug!`, and `trace!`. The backing implementation (`tracing`) is encapsulated in the `log` module.

*/

mod nat_set;
mod index_set;
mod unsafe_ptr;
mod special_index;
mod string_util;

pub use std::collections::{HashMap, HashSet};

// For vectors that are expected to have few or zero elements.
pub use smallvec::{smallvec, SmallVec};

// A set of (small) natural numbers.
pub use nat_set::NatSet;

// Swaps a value for an index assigned on first insertion; the backbone of hash-consing.
pub use index_set::IndexSet;

// An opaque wrapper around a raw pointer to memory this crate does not own.
pub use unsafe_ptr::UnsafePtr;

// A `usize`-like index type that can also represent a small, fixed number of sentinel values.
pub use special_index::SpecialIndex;

// Join sequences with a separator; subscript rendering for pretty-printed arities.
pub use string_util::{int_to_subscript, join_iter, join_string};

// Logging
pub use tracing;
pub mod log;

// Interned string used for symbol, module, and instance names.
pub use string_cache::DefaultAtom as IString;

#[cfg(test)]
mod tests {
    #[test]
    fn smoke() {
        assert_eq!(2 + 2, 4);
    }
}
