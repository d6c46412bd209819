/*!

The public surface of `rbcx`. Each submodule re-exports the types and entry points one
component of the pipeline needs, mirroring the component table in the crate's top-level
documentation; the implementation behind them lives in `core` (private), keeping wire/ABI-facing
types separate from internals that are free to change shape.

[`pipeline::Session`] wires the nine components together into the "parse tree in, CNF out"
path most callers want; components are equally usable standalone for callers who only need,
say, the booleanizer.

*/

pub mod node_pool;
pub mod symbol_table;
pub mod hierarchy;
pub mod flatten;
pub mod dependency;
pub mod booleanizer;
pub mod rbc;
pub mod inliner;
pub mod cnf;
pub mod pipeline;
