//! Component B: layered symbol declarations and resolution.

pub use crate::core::symbol_table::{
    CategoryMask, LayerId, LayerPolicy, ResolveResult, SymbolCategory, SymbolEntry, SymbolTable,
    TriggerAction, Type, VarKind,
};
