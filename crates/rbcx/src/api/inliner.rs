//! Component H: harvests variable-defining equivalences out of an RBC so a CNF pass can choose
//! to keep a variable explicit or substitute it away.

pub use crate::core::inliner::{inline, flattenize, ConjElem, ConjSet, InlineResult};
