//! Component D: identifier resolution through lexical contexts and `DEFINE` expansion.

pub use crate::core::flatten::{concat_contexts, type_of_defined_symbol, FlattenMode, Flattener};
