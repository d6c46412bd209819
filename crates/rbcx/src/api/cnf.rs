//! Component I: Tseitin and Sheridan CNF translation, plus DIMACS rendering.

pub use crate::core::cnf::{write_dimacs, CnfManager, CnfResult};
pub use crate::core::context::CnfAlgorithm;
