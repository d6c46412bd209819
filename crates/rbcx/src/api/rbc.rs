//! Component G: the hash-consed Reduced Boolean Circuit DAG.

pub use crate::core::rbc::{RbcManager, RbcRef, RbcStats, VertexId};
