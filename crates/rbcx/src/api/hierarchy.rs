//! Component C: module-hierarchy instantiation, process-selector synthesis, and
//! next-assignment flattening into a single [`FlatHierarchy`].

pub use crate::core::hierarchy::{AssignItem, FlatHierarchy, HierarchyFlattener, Item, ModuleDef, SpecKind};
