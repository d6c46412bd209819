//! Component A: the hash-consed parse-tree arena every other component reads from and writes
//! into. Callers construct input with [`NodePool`] and [`Tag`] before handing it to any other
//! component's entry point.

pub use crate::core::node_pool::{NodeId, NodePool, NodeShape, Tag};
