//! Component E: the constraints-to-variables index and the cone-of-influence queries built
//! on top of it.

pub use crate::core::dependency::{indices_to_nat_set, ConstraintIndex, DependencyAnalyzer, VarCategory, VarFilter};
