/*!

The dependency analyzer answers two questions: "which variables does this expression depend
on" (`get_dependencies`, grounded in `compileCone.c`'s variable-collection helpers) and "what
is the cone of influence of this set of variables" (`cone_of_influence`/`coi_fixpoint`, grounded
in `compileCone.c`'s `ConeOfInfluence` family). Both are memoized on a per-analyzer basis
(never as a process-wide static, per the Design Notes).

*/

use rbcx_abs::{HashMap, HashSet, NatSet};

use crate::core::error::{CoreError, CoreResult, ErrorKind};
use crate::core::node_pool::{NodeId, NodePool, Tag};
use crate::core::symbol_table::SymbolTable;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VarCategory {
    Current,
    Next,
    Input,
    Frozen,
    Defines,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct VarFilter(u8);

impl VarFilter {
    pub const NONE: VarFilter = VarFilter(0);

    pub fn with(mut self, category: VarCategory) -> Self {
        self.0 |= 1 << category as u8;
        self
    }

    pub fn all() -> Self {
        VarFilter::NONE
            .with(VarCategory::Current)
            .with(VarCategory::Next)
            .with(VarCategory::Input)
            .with(VarCategory::Frozen)
            .with(VarCategory::Defines)
    }

    pub fn contains(&self, category: VarCategory) -> bool {
        self.0 & (1 << category as u8) != 0
    }
}

/// The per-variable index the hierarchy flattener (§4.C) must install so cone-of-influence
/// queries don't have to rescan the whole flat hierarchy: which variables occur in the
/// `init`/`invar`/`next` constraint(s) of a given variable.
#[derive(Default, Clone)]
pub struct ConstraintIndex {
    pub occurs_in: HashMap<NodeId, HashSet<NodeId>>,
}

impl ConstraintIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, var: NodeId, referenced: impl IntoIterator<Item = NodeId>) {
        self.occurs_in.entry(var).or_default().extend(referenced);
    }

    pub fn coi0(&self, var: NodeId) -> HashSet<NodeId> {
        self.occurs_in.get(&var).cloned().unwrap_or_default()
    }
}

type DependencyKey = (NodeId, NodeId, VarFilter, bool);

#[derive(Default)]
pub struct DependencyAnalyzer {
    memo: HashMap<DependencyKey, Vec<NodeId>>,
    coi_memo: HashMap<NodeId, HashSet<NodeId>>,
    building: HashSet<rbcx_abs::IString>,
}

impl DependencyAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self) {
        self.memo.clear();
        self.coi_memo.clear();
    }

    /// `get_dependencies`: the set of identifiers `expr` depends on, filtered by category.
    /// When `preserve_time` is true, `NEXT(v)`/`ATTIME(v, t)` wrappers are preserved on the
    /// returned identifiers instead of being stripped down to the bare variable.
    pub fn get_dependencies(
        &mut self,
        pool: &mut NodePool,
        table: &SymbolTable,
        expr: NodeId,
        context: NodeId,
        filter: VarFilter,
        preserve_time: bool,
    ) -> CoreResult<Vec<NodeId>> {
        let key = (expr, context, filter, preserve_time);
        if let Some(cached) = self.memo.get(&key) {
            return Ok(cached.clone());
        }
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        self.collect_dependencies(pool, table, expr, filter, preserve_time, false, &mut out, &mut seen)?;
        self.memo.insert(key, out.clone());
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_dependencies(
        &mut self,
        pool: &mut NodePool,
        table: &SymbolTable,
        expr: NodeId,
        filter: VarFilter,
        preserve_time: bool,
        under_next: bool,
        out: &mut Vec<NodeId>,
        seen: &mut HashSet<NodeId>,
    ) -> CoreResult<()> {
        if pool.is_nil(expr) {
            return Ok(());
        }
        match pool.tag(expr) {
            Tag::Atom | Tag::Dot | Tag::Bit => {
                if !seen.insert(expr) {
                    return Ok(());
                }
                let name = crate::core::flatten::Flattener::node_to_canonical_name_pub(pool, expr);
                if table.is_symbol_define(&name) {
                    if !filter.contains(VarCategory::Defines) {
                        return Ok(());
                    }
                    if !self.building.insert(name.clone()) {
                        return Err(CoreError::new(ErrorKind::CircularDefine, pool.line(expr), format!("define '{name}' depends on itself")));
                    }
                    let body = table.get_define_body(&name)?;
                    let result = self.collect_dependencies(pool, table, body, filter, preserve_time, under_next, out, seen);
                    self.building.remove(&name);
                    return result;
                }
                let category = if !table.is_symbol_var(&name) {
                    return Ok(());
                } else {
                    match table.entry(&name) {
                        Some(crate::core::symbol_table::SymbolEntry::Variable { kind, .. }) => match kind {
                            crate::core::symbol_table::VarKind::State => VarCategory::Current,
                            crate::core::symbol_table::VarKind::Input => VarCategory::Input,
                            crate::core::symbol_table::VarKind::Frozen => VarCategory::Frozen,
                        },
                        _ => return Ok(()),
                    }
                };
                let effective = if under_next { VarCategory::Next } else { category };
                if !filter.contains(effective) {
                    return Ok(());
                }
                if preserve_time && under_next {
                    let nil = pool.nil();
                    out.push(pool.find_node(Tag::Next, expr, nil));
                } else {
                    out.push(expr);
                }
                Ok(())
            }
            Tag::Next => {
                let inner = pool.car(expr);
                self.collect_dependencies(pool, table, inner, filter, preserve_time, true, out, seen)
            }
            Tag::AtTime => {
                let inner = pool.car(expr);
                self.collect_dependencies(pool, table, inner, filter, preserve_time, under_next, out, seen)
            }
            _ => {
                let car = pool.car(expr);
                let cdr = pool.cdr(expr);
                self.collect_dependencies(pool, table, car, filter, preserve_time, under_next, out, seen)?;
                self.collect_dependencies(pool, table, cdr, filter, preserve_time, under_next, out, seen)
            }
        }
    }

    /// Unbounded cone-of-influence fixpoint (spec §4.E steps 1-4).
    pub fn cone_of_influence(&mut self, index: &ConstraintIndex, base_vars: &[NodeId]) -> HashSet<NodeId> {
        let (result, _reached) = self.coi_fixpoint_inner(index, base_vars, None);
        result
    }

    /// Bounded variant: performs at most `steps` iterations, returning both the set reached so
    /// far and whether the unbounded fixpoint had already been reached.
    pub fn coi_fixpoint(&mut self, index: &ConstraintIndex, base_vars: &[NodeId], steps: usize) -> (HashSet<NodeId>, bool) {
        self.coi_fixpoint_inner(index, base_vars, Some(steps))
    }

    fn coi_fixpoint_inner(&mut self, index: &ConstraintIndex, base_vars: &[NodeId], steps: Option<usize>) -> (HashSet<NodeId>, bool) {
        let mut result: HashSet<NodeId> = base_vars.iter().copied().collect();
        let mut frontier: Vec<NodeId> = base_vars.to_vec();
        let mut iterations = 0usize;

        loop {
            if frontier.is_empty() {
                return (result, true);
            }
            if let Some(limit) = steps {
                if iterations >= limit {
                    return (result, false);
                }
            }
            iterations += 1;

            let mut next_frontier = Vec::new();
            for &var in &frontier {
                let coi0 = if let Some(cached) = self.coi_memo.get(&var) {
                    cached.clone()
                } else {
                    let computed = index.coi0(var);
                    self.coi_memo.insert(var, computed.clone());
                    computed
                };
                for referenced in coi0 {
                    if result.insert(referenced) {
                        next_frontier.push(referenced);
                    }
                }
            }
            frontier = next_frontier;
        }
    }
}

/// Converts a `NatSet` of RBC-variable indices to nothing in particular; present because the
/// booleanizer and CNF translator both need the `NatSet` bit-set representation of a
/// dependency set once variables have been assigned numeric indices, whereas the analyzer
/// above tracks dependencies at the `NodeId` level (before index assignment).
pub fn indices_to_nat_set(indices: impl IntoIterator<Item = usize>) -> NatSet {
    indices.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::symbol_table::{LayerPolicy, Type};

    #[test]
    fn coi_closure_p15() {
        let mut analyzer = DependencyAnalyzer::new();
        let mut pool = NodePool::new();
        let a = pool.find_atom("a");
        let b = pool.find_atom("b");
        let c = pool.find_atom("c");

        let mut index = ConstraintIndex::new();
        index.record(a, []);
        index.record(b, [c]);
        index.record(c, [c]);
        // next(a) := b
        index.occurs_in.entry(a).or_default().insert(b);

        let coi_a = analyzer.cone_of_influence(&index, &[a]);
        assert_eq!(coi_a, [a, b, c].into_iter().collect());

        let coi_c = analyzer.cone_of_influence(&index, &[c]);
        assert_eq!(coi_c, [c].into_iter().collect());
    }

    #[test]
    fn bounded_fixpoint_reports_reached() {
        let mut analyzer = DependencyAnalyzer::new();
        let mut index = ConstraintIndex::new();
        let mut pool = NodePool::new();
        let a = pool.find_atom("a");
        let b = pool.find_atom("b");
        index.record(a, [b]);
        let (set, reached) = analyzer.coi_fixpoint(&index, &[a], 10);
        assert!(reached);
        assert_eq!(set, [a, b].into_iter().collect());

        let (partial, reached_zero) = analyzer.coi_fixpoint(&index, &[a], 0);
        assert!(!reached_zero);
        assert_eq!(partial, [a].into_iter().collect());
    }

    #[test]
    fn get_dependencies_filters_by_category() {
        let mut pool = NodePool::new();
        let mut table = SymbolTable::new();
        let layer = table.create_layer("main", LayerPolicy::Top).unwrap();
        table.declare_state_var(layer, "s", Type::Boolean).unwrap();
        table.declare_input_var(layer, "i", Type::Boolean).unwrap();

        let s = pool.find_atom("s");
        let i = pool.find_atom("i");
        let expr = pool.find_node(Tag::And, s, i);

        let mut analyzer = DependencyAnalyzer::new();
        let nil = pool.nil();
        let only_current = analyzer
            .get_dependencies(&mut pool, &table, expr, nil, VarFilter::NONE.with(VarCategory::Current), false)
            .unwrap();
        assert_eq!(only_current, vec![s]);
    }
}
