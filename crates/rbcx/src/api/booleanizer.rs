//! Component F: scalar/word/array expressions compiled down to pure boolean expressions over
//! an [`Encoding`]'s bit vectors. [`TypeOracle`] and [`AddOracle`] are the two collaborators a
//! host application must supply — the type checker and BDD engine this crate does not
//! implement (spec Non-goals).

pub use crate::core::booleanizer::{Add, AddOracle, BitVector, Booleanizer, Encoding, TypeOracle};
