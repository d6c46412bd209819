/*!

[`Session`] owns the per-run state the nine components share (the node pool and symbol table
every component reads, plus each component's own memoization caches) and offers one method per
pipeline stage, named after the stage it runs: [`Session::flatten_module`],
[`Session::booleanize`], [`Session::to_cnf`]. None of this is required — every component in
`api::*` is independently constructible and usable — but most callers want the whole "parsed
module in, CNF clauses out" path, and wiring it by hand means threading the node pool and symbol
table through nine constructors in the right order.

*/

use std::rc::Rc;

use rbcx_abs::{HashMap, IString};

use crate::api::booleanizer::{AddOracle, Booleanizer, Encoding, TypeOracle};
use crate::api::cnf::{CnfManager, CnfResult};
use crate::api::dependency::DependencyAnalyzer;
use crate::api::flatten::Flattener;
use crate::api::hierarchy::{FlatHierarchy, HierarchyFlattener, ModuleDef};
use crate::api::node_pool::{NodeId, NodePool};
use crate::api::rbc::{RbcManager, RbcRef};
use crate::api::symbol_table::{LayerId, SymbolTable};
use crate::core::context::RunConfig;
use crate::core::error::CoreResult;

/// Owns a node pool, symbol table, and every per-component cache for one run of the pipeline.
/// A `Session` is not `Clone`/`Send`: two independent analyses use two independent `Session`s,
/// which is the point of threading caches as fields instead of process-wide statics (see the
/// crate's configuration design note).
pub struct Session {
    pub pool: NodePool,
    pub symbols: SymbolTable,
    pub flattener: Flattener,
    pub dependencies: DependencyAnalyzer,
    pub booleanizer: Booleanizer,
    pub rbc: RbcManager,
    pub config: RunConfig,
}

impl Session {
    pub fn new(config: RunConfig) -> Self {
        Session {
            pool: NodePool::new(),
            symbols: SymbolTable::new(),
            flattener: Flattener::new(),
            dependencies: DependencyAnalyzer::new(),
            booleanizer: Booleanizer::new(),
            rbc: RbcManager::new(),
            config,
        }
    }

    /// Instantiates `root_module` (component C) against `modules`, producing the finished
    /// [`FlatHierarchy`] (conjoined `init`/`invar`/`trans`, per-variable assignment maps,
    /// property lists). Declares variables into `layer` as it walks the hierarchy.
    pub fn flatten_module(
        &mut self,
        modules: HashMap<IString, Rc<ModuleDef>>,
        layer: LayerId,
        root_module: &IString,
        actuals: &[NodeId],
    ) -> CoreResult<FlatHierarchy> {
        let mut hierarchy_flattener = HierarchyFlattener::new(modules);
        hierarchy_flattener.flatten_hierarchy(&mut self.pool, &mut self.symbols, &mut self.flattener, layer, root_module, actuals)
    }

    /// Booleanizes `expr` (component F) against `encoding`, delegating to `type_oracle`/
    /// `add_oracle` for the type information and arithmetic-predicate handling this crate
    /// leaves to an external type checker and BDD engine (spec Non-goals).
    #[allow(clippy::too_many_arguments)]
    pub fn booleanize(
        &mut self,
        type_oracle: &dyn TypeOracle,
        add_oracle: &mut dyn AddOracle,
        encoding: &Encoding,
        det_layer: LayerId,
        expr: NodeId,
        context: NodeId,
        in_next: bool,
    ) -> CoreResult<NodeId> {
        self.booleanizer.expr2bexpr(&mut self.pool, &mut self.symbols, type_oracle, add_oracle, encoding, det_layer, expr, context, in_next)
    }

    /// Translates `f` (an RBC root built via `self.rbc`) to CNF (component I) per
    /// `self.config.cnf_algorithm`, reusing `cnf_manager`'s variable numbering across calls.
    pub fn to_cnf(&self, cnf_manager: &mut CnfManager, f: RbcRef, polarity: i8) -> CnfResult {
        cnf_manager.to_cnf(&self.rbc, f, polarity, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::hierarchy::Item;
    use crate::api::symbol_table::LayerPolicy;

    #[test]
    fn flattens_a_trivial_single_module_hierarchy() {
        let mut session = Session::new(RunConfig::new());
        let layer = session.symbols.create_layer("main", LayerPolicy::Top).unwrap();

        let x_true = session.pool.find_atom("TRUE");
        let module = Rc::new(ModuleDef { name: IString::from("main"), formal_params: Vec::new(), items: vec![Item::Invar(x_true)] });

        let mut modules = HashMap::new();
        modules.insert(IString::from("main"), module);

        let hierarchy = session.flatten_module(modules, layer, &IString::from("main"), &[]).unwrap();
        assert!(!session.pool.is_nil(hierarchy.invar));
    }
}
