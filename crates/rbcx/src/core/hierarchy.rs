/*!

The hierarchy flattener instantiates a module hierarchy with possibly parameterized
sub-modules into a single flat namespace, following `compileFlatten.c`'s two-pass
`Compile_FlattenHierarchy`/`Compile_InstantiateVarTree` approach: a first pass walks every
module body exactly once per instantiation site, populating the [`crate::core::symbol_table::SymbolTable`]
and a [`FlatHierarchy`] record of constraints; a second pass (`finish`) expands the
process selector, flattens every stored constraint (§4.D), and rewrites per-process
`next`-assignments into guarded case expressions.

Unlike `compileFlatten.c`, where a module body is a parser-produced `node_ptr` tree with
`VAR`/`TRANS`/`MODTYPE`/… tags mixed in with ordinary expression tags, this crate gives the
hierarchy its own small AST ([`ModuleDef`]/[`Item`]) rather than overloading [`crate::core::node_pool::Tag`]
with declaration-level tags that the rest of the crate never needs to know about — the same
"give each concern its own shape" split this codebase draws elsewhere between
`parser::ast::ModuleAST` (declaration-level) and `core::term::Term` (expression-level).

*/

use rbcx_abs::{HashMap, HashSet, IString};

use crate::core::dependency::{ConstraintIndex, DependencyAnalyzer, VarFilter};
use crate::core::error::{CoreError, CoreResult, ErrorKind};
use crate::core::flatten::{concat_contexts, FlattenMode, Flattener};
use crate::core::node_pool::{NodeId, NodePool, Tag};
use crate::core::symbol_table::{LayerId, SymbolTable, Type};

/// One declaration inside a module body (spec §4.C's bulleted list of declaration kinds).
/// Produced by an external parser; this crate only ever consumes it.
pub enum Item {
    Var(IString, Type),
    IVar(IString, Type),
    FrozenVar(IString, Type),
    Define(IString, NodeId),
    ArrayDefine(IString, Vec<NodeId>),
    /// `ISA name`: macro-include another module's body in place, under the current prefix.
    Isa(IString),
    /// `MODTYPE name(actuals)`, plain submodule instantiation.
    Instance { instance_name: IString, module_type: IString, actuals: Vec<NodeId> },
    /// `PROCESS MODTYPE name(actuals)`: as `Instance`, but the instance name is also recorded
    /// among the process names and every assignment inside it is eligible for the
    /// process-selector rewrite.
    Process { instance_name: IString, module_type: IString, actuals: Vec<NodeId> },
    Trans(NodeId),
    Init(NodeId),
    Invar(NodeId),
    Justice(NodeId),
    Compassion(NodeId, NodeId),
    Assign(AssignItem),
    Spec(SpecKind, Option<IString>, NodeId),
}

pub enum AssignItem {
    Init(NodeId, NodeId),
    Next(NodeId, NodeId),
    /// A plain `v := expr` assignment, stored as an `invar-assign`.
    Plain(NodeId, NodeId),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SpecKind {
    Spec,
    LtlSpec,
    PslSpec,
    InvarSpec,
    Compute,
}

/// A parsed module body: a name, its formal parameter names, and an ordered list of
/// declarations. The whole input this component consumes for one module (spec §4.C).
pub struct ModuleDef {
    pub name: IString,
    pub formal_params: Vec<IString>,
    pub items: Vec<Item>,
}

/// Accumulates the conjoined constraints, fairness/spec lists, and per-variable assignment
/// maps produced by instantiating a module hierarchy (spec §3 "Flat hierarchy").
pub struct FlatHierarchy {
    pub init: NodeId,
    pub invar: NodeId,
    pub trans: NodeId,
    pub justice: Vec<NodeId>,
    pub compassion: Vec<(NodeId, NodeId)>,
    pub spec: Vec<(Option<IString>, NodeId)>,
    pub ltlspec: Vec<(Option<IString>, NodeId)>,
    pub invarspec: Vec<(Option<IString>, NodeId)>,
    pub pslspec: Vec<(Option<IString>, NodeId)>,
    pub compute: Vec<(Option<IString>, NodeId)>,
    pub invar_assign: HashMap<IString, NodeId>,
    pub init_assign: HashMap<IString, NodeId>,
    pub next_assign: HashMap<IString, NodeId>,
    /// Raw (unflattened, still `CONTEXT`-wrapped) `next-assign` right-hand sides collected
    /// during instantiation, one entry per `(process, rhs)` contribution to a variable. A
    /// variable assigned in two processes accumulates two entries here; `finish` folds them
    /// into one guarded `case` chain in `next_assign`. `None` means the assign was outside any
    /// process.
    next_assign_entries: HashMap<IString, Vec<(Option<IString>, NodeId)>>,
    pub declared_vars: Vec<IString>,
    pub property_names: HashSet<IString>,
}

impl FlatHierarchy {
    /// `init`/`invar`/`trans` start as `pool.nil()`, the logical-TRUE sentinel `conjoin` treats
    /// as the empty conjunction's identity element.
    fn new(pool: &NodePool) -> Self {
        let nil = pool.nil();
        FlatHierarchy {
            init: nil,
            invar: nil,
            trans: nil,
            justice: Vec::new(),
            compassion: Vec::new(),
            spec: Vec::new(),
            ltlspec: Vec::new(),
            invarspec: Vec::new(),
            pslspec: Vec::new(),
            compute: Vec::new(),
            invar_assign: HashMap::default(),
            init_assign: HashMap::default(),
            next_assign: HashMap::default(),
            next_assign_entries: HashMap::default(),
            declared_vars: Vec::new(),
            property_names: HashSet::default(),
        }
    }

    fn conjoin(pool: &mut NodePool, acc: NodeId, addition: NodeId) -> NodeId {
        if pool.is_nil(acc) {
            addition
        } else if pool.is_nil(addition) {
            acc
        } else {
            pool.find_node(Tag::And, acc, addition)
        }
    }

    /// Installs the per-variable `occurs_in` index (spec §4.C post-processing: "Install
    /// vars↔constraints indexing used later for cone-of-influence queries").
    pub fn build_constraint_index(&self, pool: &mut NodePool, table: &SymbolTable, analyzer: &mut DependencyAnalyzer) -> CoreResult<ConstraintIndex> {
        let mut index = ConstraintIndex::new();
        let nil = pool.nil();
        let all_current = VarFilter::all();
        for var_name in &self.declared_vars {
            let var_node = pool.find_atom(var_name.clone());
            let mut referenced = HashSet::new();
            for constraint in [self.invar_assign.get(var_name), self.init_assign.get(var_name), self.next_assign.get(var_name)].into_iter().flatten() {
                for dep in analyzer.get_dependencies(pool, table, *constraint, nil, all_current, false)? {
                    referenced.insert(dep);
                }
            }
            index.record(var_node, referenced);
        }
        Ok(index)
    }
}

/// Wraps `expr` with its instance `prefix` as a `CONTEXT(prefix, expr)` node so the
/// post-processing flattening pass (§4.D) resolves it under the right lexical context
/// regardless of what ambient context the caller of `flatten_sexp` happens to pass.
fn wrap_context(pool: &mut NodePool, prefix: NodeId, expr: NodeId) -> NodeId {
    pool.find_node(Tag::Context, prefix, expr)
}

/// Turns an instance name into the `DOT`-identifier form `concat_contexts` expects.
fn extend_prefix(pool: &mut NodePool, prefix: NodeId, instance_name: &IString) -> NodeId {
    let atom = pool.find_atom(instance_name.clone());
    concat_contexts(pool, prefix, atom)
}

fn canonical_name(pool: &mut NodePool, prefix: NodeId, name: &IString) -> IString {
    let atom = pool.find_atom(name.clone());
    let full = concat_contexts(pool, prefix, atom);
    Flattener::node_to_canonical_name_pub(pool, full)
}

/// Resolves an assignment's LHS `var` to the canonical name of the variable it actually
/// declares to, walking outward from `prefix` one instance level at a time. A bare reference
/// inside a process body to a variable declared in an enclosing module's scope (not passed as
/// a formal parameter) otherwise canonicalizes to a process-qualified name nothing ever
/// declares, rather than the variable itself.
fn resolve_lhs_var(pool: &mut NodePool, table: &SymbolTable, prefix: NodeId, var: NodeId) -> CoreResult<IString> {
    let mut candidate_prefix = prefix;
    loop {
        let full = concat_contexts(pool, candidate_prefix, var);
        let name = Flattener::node_to_canonical_name_pub(pool, full);
        if table.entry(&name).is_some() {
            return Ok(name);
        }
        if pool.is_nil(candidate_prefix) {
            return Err(CoreError::new(ErrorKind::UndefinedSymbol, 0, format!("undefined symbol '{name}' in assignment")));
        }
        candidate_prefix = crate::core::flatten::strip_last_segment(pool, candidate_prefix);
    }
}

/// Recursively declares `name: ty` under `prefix`, expanding array types into the composite
/// `VariableArray` entry plus one entry per scalar element (spec §4.C instantiation, `VAR`).
fn declare_variable(table: &mut SymbolTable, layer: LayerId, kind: VarKindTag, canonical: IString, ty: Type, declared: &mut Vec<IString>) -> CoreResult<()> {
    if let Type::Array { subtype, lo, hi } = &ty {
        table.declare_variable_array(layer, canonical.clone(), ty.clone())?;
        for i in *lo..=*hi {
            let element_name = IString::from(format!("{canonical}[{i}]"));
            declare_variable(table, layer, kind, element_name.clone(), (**subtype).clone(), declared)?;
            table.add_variable_array_element(&canonical, element_name)?;
        }
        return Ok(());
    }
    match kind {
        VarKindTag::State => table.declare_state_var(layer, canonical.clone(), ty)?,
        VarKindTag::Input => table.declare_input_var(layer, canonical.clone(), ty)?,
        VarKindTag::Frozen => table.declare_frozen_var(layer, canonical.clone(), ty)?,
    }
    declared.push(canonical);
    Ok(())
}

#[derive(Copy, Clone)]
enum VarKindTag {
    State,
    Input,
    Frozen,
}

/// Instantiates a module hierarchy and produces its [`FlatHierarchy`], populating the given
/// [`SymbolTable`] layer as it goes (spec §4.C).
pub struct HierarchyFlattener {
    modules: HashMap<IString, std::rc::Rc<ModuleDef>>,
    instantiating: Vec<IString>,
    process_names: Vec<IString>,
}

impl HierarchyFlattener {
    pub fn new(modules: HashMap<IString, std::rc::Rc<ModuleDef>>) -> Self {
        HierarchyFlattener { modules, instantiating: Vec::new(), process_names: Vec::new() }
    }

    /// Top-level entry point: instantiate `root_module` with `actuals`, then run
    /// post-processing (process-selector expansion, constraint flattening, assignment
    /// rewriting) to produce the finished [`FlatHierarchy`].
    #[allow(clippy::too_many_arguments)]
    pub fn flatten_hierarchy(
        &mut self,
        pool: &mut NodePool,
        table: &mut SymbolTable,
        flattener: &mut Flattener,
        layer: LayerId,
        root_module: &IString,
        actuals: &[NodeId],
    ) -> CoreResult<FlatHierarchy> {
        let mut hierarchy = FlatHierarchy::new(pool);
        let nil = pool.nil();
        self.instantiate(pool, table, &mut hierarchy, layer, root_module, nil, nil, actuals, None)?;
        self.finish(pool, table, flattener, &mut hierarchy, layer)?;
        Ok(hierarchy)
    }

    #[allow(clippy::too_many_arguments)]
    fn instantiate(
        &mut self,
        pool: &mut NodePool,
        table: &mut SymbolTable,
        hierarchy: &mut FlatHierarchy,
        layer: LayerId,
        module_name: &IString,
        prefix: NodeId,
        actual_context: NodeId,
        actuals: &[NodeId],
        process_ctx: Option<IString>,
    ) -> CoreResult<()> {
        if self.instantiating.contains(module_name) {
            return Err(CoreError::new(ErrorKind::RecursiveModule, 0, format!("module '{module_name}' instantiates itself (directly or indirectly)")));
        }
        let module = self
            .modules
            .get(module_name)
            .cloned()
            .ok_or_else(|| CoreError::new(ErrorKind::UndefinedSymbol, 0, format!("module '{module_name}' is not defined")))?;
        self.instantiating.push(module_name.clone());

        for (formal, actual) in module.formal_params.iter().zip(actuals.iter()) {
            let canonical = canonical_name(pool, prefix, formal);
            table.declare_parameter(layer, canonical, *actual, actual_context)?;
        }

        for item in &module.items {
            self.instantiate_item(pool, table, hierarchy, layer, item, prefix, process_ctx.clone())?;
        }

        self.instantiating.pop();
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn instantiate_item(
        &mut self,
        pool: &mut NodePool,
        table: &mut SymbolTable,
        hierarchy: &mut FlatHierarchy,
        layer: LayerId,
        item: &Item,
        prefix: NodeId,
        process_ctx: Option<IString>,
    ) -> CoreResult<()> {
        match item {
            Item::Var(name, ty) => {
                let canonical = canonical_name(pool, prefix, name);
                declare_variable(table, layer, VarKindTag::State, canonical, ty.clone(), &mut hierarchy.declared_vars)
            }
            Item::IVar(name, ty) => {
                let canonical = canonical_name(pool, prefix, name);
                declare_variable(table, layer, VarKindTag::Input, canonical, ty.clone(), &mut hierarchy.declared_vars)
            }
            Item::FrozenVar(name, ty) => {
                let canonical = canonical_name(pool, prefix, name);
                declare_variable(table, layer, VarKindTag::Frozen, canonical, ty.clone(), &mut hierarchy.declared_vars)
            }
            Item::Define(name, body) => {
                let canonical = canonical_name(pool, prefix, name);
                table.declare_define(layer, canonical, prefix, *body)
            }
            Item::ArrayDefine(name, bodies) => {
                let canonical = canonical_name(pool, prefix, name);
                table.declare_array_define(layer, canonical, bodies.clone())
            }
            Item::Isa(name) => {
                // Macro-include: process the named module's items in place, under the *same*
                // prefix, still guarded by the recursion stack.
                let module = self.modules.get(name).cloned().ok_or_else(|| CoreError::new(ErrorKind::UndefinedSymbol, 0, format!("ISA '{name}' is not defined")))?;
                if self.instantiating.contains(name) {
                    return Err(CoreError::new(ErrorKind::RecursiveModule, 0, format!("ISA '{name}' instantiates itself (directly or indirectly)")));
                }
                self.instantiating.push(name.clone());
                for inner in &module.items {
                    self.instantiate_item(pool, table, hierarchy, layer, inner, prefix, process_ctx.clone())?;
                }
                self.instantiating.pop();
                Ok(())
            }
            Item::Instance { instance_name, module_type, actuals } => {
                let new_prefix = extend_prefix(pool, prefix, instance_name);
                self.instantiate(pool, table, hierarchy, layer, module_type, new_prefix, prefix, actuals, process_ctx)
            }
            Item::Process { instance_name, module_type, actuals } => {
                let new_prefix = extend_prefix(pool, prefix, instance_name);
                let canonical_instance = Flattener::node_to_canonical_name_pub(pool, new_prefix);
                self.process_names.push(canonical_instance.clone());
                self.instantiate(pool, table, hierarchy, layer, module_type, new_prefix, prefix, actuals, Some(canonical_instance))
            }
            Item::Trans(e) => {
                let wrapped = wrap_context(pool, prefix, *e);
                hierarchy.trans = FlatHierarchy::conjoin(pool, hierarchy.trans, wrapped);
                Ok(())
            }
            Item::Init(e) => {
                let wrapped = wrap_context(pool, prefix, *e);
                hierarchy.init = FlatHierarchy::conjoin(pool, hierarchy.init, wrapped);
                Ok(())
            }
            Item::Invar(e) => {
                let wrapped = wrap_context(pool, prefix, *e);
                hierarchy.invar = FlatHierarchy::conjoin(pool, hierarchy.invar, wrapped);
                Ok(())
            }
            Item::Justice(e) => {
                let wrapped = wrap_context(pool, prefix, *e);
                hierarchy.justice.insert(0, wrapped);
                Ok(())
            }
            Item::Compassion(p, q) => {
                let wp = wrap_context(pool, prefix, *p);
                let wq = wrap_context(pool, prefix, *q);
                hierarchy.compassion.insert(0, (wp, wq));
                Ok(())
            }
            Item::Assign(assign) => self.instantiate_assign(pool, table, hierarchy, assign, prefix, process_ctx),
            Item::Spec(kind, name, e) => {
                if let Some(n) = name {
                    if !hierarchy.property_names.insert(n.clone()) {
                        return Err(CoreError::new(ErrorKind::RedefiningSymbol, 0, format!("specification name '{n}' is already used")));
                    }
                }
                let wrapped = wrap_context(pool, prefix, *e);
                let entry = (name.clone(), wrapped);
                match kind {
                    SpecKind::Spec => hierarchy.spec.push(entry),
                    SpecKind::LtlSpec => hierarchy.ltlspec.push(entry),
                    SpecKind::PslSpec => hierarchy.pslspec.push(entry),
                    SpecKind::InvarSpec => hierarchy.invarspec.push(entry),
                    SpecKind::Compute => hierarchy.compute.push(entry),
                }
                Ok(())
            }
        }
    }

    fn instantiate_assign(
        &mut self,
        pool: &mut NodePool,
        table: &SymbolTable,
        hierarchy: &mut FlatHierarchy,
        assign: &AssignItem,
        prefix: NodeId,
        process_ctx: Option<IString>,
    ) -> CoreResult<()> {
        let (var, rhs, map_name) = match assign {
            AssignItem::Init(v, r) => (*v, *r, "init"),
            AssignItem::Next(v, r) => (*v, *r, "next"),
            AssignItem::Plain(v, r) => (*v, *r, "invar"),
        };
        let canonical_var = resolve_lhs_var(pool, table, prefix, var)?;
        let wrapped_rhs = wrap_context(pool, prefix, rhs);

        if map_name == "next" {
            let entries = hierarchy.next_assign_entries.entry(canonical_var.clone()).or_default();
            if entries.iter().any(|(p, _)| *p == process_ctx) {
                let where_ = match &process_ctx {
                    Some(p) => format!(" in process '{p}'"),
                    None => String::new(),
                };
                return Err(CoreError::new(ErrorKind::RedefiningSymbol, 0, format!("'{canonical_var}' already has a next-assign{where_}")));
            }
            entries.push((process_ctx, wrapped_rhs));
            return Ok(());
        }

        let target = if map_name == "init" { &mut hierarchy.init_assign } else { &mut hierarchy.invar_assign };
        if target.contains_key(&canonical_var) {
            return Err(CoreError::new(ErrorKind::RedefiningSymbol, 0, format!("'{canonical_var}' already has a {map_name}-assign")));
        }
        target.insert(canonical_var, wrapped_rhs);
        Ok(())
    }

    /// §4.C post-processing: process-selector expansion, constraint flattening, and the
    /// per-process `next`-assign rewrite.
    fn finish(&mut self, pool: &mut NodePool, table: &mut SymbolTable, flattener: &mut Flattener, hierarchy: &mut FlatHierarchy, layer: LayerId) -> CoreResult<()> {
        let running_defines = self.expand_process_selector(pool, table, layer)?;

        let nil = pool.nil();
        hierarchy.init = flattener.flatten_sexp(pool, table, hierarchy.init, nil, FlattenMode::ExpandDefines)?;
        hierarchy.invar = flattener.flatten_sexp(pool, table, hierarchy.invar, nil, FlattenMode::ExpandDefines)?;
        hierarchy.trans = flattener.flatten_sexp(pool, table, hierarchy.trans, nil, FlattenMode::ExpandDefines)?;
        for list in [&mut hierarchy.justice] {
            for e in list.iter_mut() {
                *e = flattener.flatten_sexp(pool, table, *e, nil, FlattenMode::ExpandDefines)?;
            }
        }
        for (p, q) in hierarchy.compassion.iter_mut() {
            *p = flattener.flatten_sexp(pool, table, *p, nil, FlattenMode::ExpandDefines)?;
            *q = flattener.flatten_sexp(pool, table, *q, nil, FlattenMode::ExpandDefines)?;
        }
        for list in [&mut hierarchy.spec, &mut hierarchy.ltlspec, &mut hierarchy.invarspec, &mut hierarchy.pslspec, &mut hierarchy.compute] {
            for (_, e) in list.iter_mut() {
                *e = flattener.flatten_sexp(pool, table, *e, nil, FlattenMode::ExpandDefines)?;
            }
        }

        let invar_vars: Vec<IString> = hierarchy.invar_assign.keys().cloned().collect();
        for var in invar_vars {
            let e = hierarchy.invar_assign[&var];
            let flat = flattener.flatten_sexp(pool, table, e, nil, FlattenMode::ExpandDefines)?;
            hierarchy.invar_assign.insert(var, flat);
        }
        let init_vars: Vec<IString> = hierarchy.init_assign.keys().cloned().collect();
        for var in init_vars {
            let e = hierarchy.init_assign[&var];
            let flat = flattener.flatten_sexp(pool, table, e, nil, FlattenMode::ExpandDefines)?;
            hierarchy.init_assign.insert(var, flat);
        }
        // Flatten every raw (still `CONTEXT`-wrapped) next-assign contribution, then fold each
        // variable's contributions into a single result: a plain expression if only one
        // unguarded contribution exists, otherwise a `case running@P1: rhs1; running@P2: rhs2;
        // ...; default: v esac` chain, one arm per process that assigns this variable, in the
        // order those processes were instantiated.
        let next_entries: Vec<(IString, Vec<(Option<IString>, NodeId)>)> = hierarchy.next_assign_entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        for (var, entries) in next_entries {
            let mut flat_entries = Vec::with_capacity(entries.len());
            for (process, rhs) in entries {
                let flat = flattener.flatten_sexp(pool, table, rhs, nil, FlattenMode::ExpandDefines)?;
                flat_entries.push((process, flat));
            }

            let (guarded, unguarded): (Vec<_>, Vec<_>) = flat_entries.into_iter().partition(|(p, _)| p.is_some());
            if !guarded.is_empty() && !unguarded.is_empty() {
                return Err(CoreError::new(ErrorKind::RedefiningSymbol, 0, format!("'{var}' has both a process-qualified and an unqualified next-assign")));
            }

            if guarded.is_empty() {
                let (_, flat) = unguarded.into_iter().next().expect("non-empty: every variable in next_assign_entries has at least one contribution");
                hierarchy.next_assign.insert(var, flat);
                continue;
            }

            // `case running@P: rhs; TRUE: v; esac` — each arm is a `(guard, value)` pair under
            // `Tag::Eqdef` (the same untagged-pair shape `ASSIGN` bodies already use), chained
            // by `Tag::Case` spine links terminated in a `Failure` sentinel, exactly the shape
            // `collect_bool_arms`/`collect_word_arms` expect.
            let var_atom = pool.find_atom(var.clone());
            let true_atom = pool.find_atom("TRUE");
            let failure = pool.find_node(Tag::Failure, nil, nil);
            let default_pair = pool.find_node(Tag::Eqdef, true_atom, var_atom);
            let mut chain = pool.find_node(Tag::Case, default_pair, failure);
            for (process, rhs) in guarded.into_iter().rev() {
                let process = process.expect("partitioned by is_some above");
                let Some(&running_define) = running_defines.get(&process) else { continue };
                let guard_pair = pool.find_node(Tag::Eqdef, running_define, rhs);
                chain = pool.find_node(Tag::Case, guard_pair, chain);
            }
            hierarchy.next_assign.insert(var, chain);
        }

        self.check_no_next_assign_cycle(pool, table, hierarchy)?;
        Ok(())
    }

    /// Declares `PROCESS_SELECTOR` and one `running@module` define per recorded process name,
    /// iff more than one process exists (spec §4.C post-processing step 1). Returns the map
    /// from process canonical name to its `running@process` define node, for `finish`'s
    /// guarded-case rewrite.
    fn expand_process_selector(&mut self, pool: &mut NodePool, table: &mut SymbolTable, layer: LayerId) -> CoreResult<HashMap<IString, NodeId>> {
        let mut running = HashMap::new();
        if self.process_names.len() <= 1 {
            return Ok(running);
        }

        let selector_name = IString::from("PROCESS_SELECTOR");
        if table.entry(&selector_name).is_some() {
            return Err(CoreError::new(ErrorKind::RedefiningSymbol, 0, "'PROCESS_SELECTOR' is reserved for process-selector expansion and must not be declared by the model"));
        }
        let enum_values: Vec<IString> = self.process_names.clone();
        table.declare_input_var(layer, selector_name.clone(), Type::Enum(enum_values.clone()))?;

        let selector_atom = pool.find_atom(selector_name);
        for process in &self.process_names {
            let running_name = IString::from(format!("running@{process}"));
            if table.entry(&running_name).is_some() {
                return Err(CoreError::new(ErrorKind::RedefiningSymbol, 0, format!("'{running_name}' is reserved for process-selector expansion and must not be declared by the model")));
            }
            let process_const = pool.find_atom(process.clone());
            let body = pool.find_node(Tag::Equal, selector_atom, process_const);
            let nil = pool.nil();
            table.declare_define(layer, running_name.clone(), nil, body)?;
            running.insert(process.clone(), pool.find_atom(running_name));
        }
        Ok(running)
    }

    /// Tarjan-style cycle check over the variable graph induced by `next-assign` (spec §4.C
    /// post-processing, invariant-preserving pass): a variable whose `next-assign` expression
    /// transitively depends on itself through other `next-assign`s is a `recursive-assignment`
    /// error.
    fn check_no_next_assign_cycle(&self, pool: &mut NodePool, table: &SymbolTable, hierarchy: &FlatHierarchy) -> CoreResult<()> {
        let nil = pool.nil();
        let mut analyzer = DependencyAnalyzer::new();
        let mut color: HashMap<IString, u8> = HashMap::new(); // 0 unvisited, 1 in-progress, 2 done

        #[allow(clippy::too_many_arguments)]
        fn visit(
            pool: &mut NodePool,
            table: &SymbolTable,
            hierarchy: &FlatHierarchy,
            analyzer: &mut DependencyAnalyzer,
            color: &mut HashMap<IString, u8>,
            var: &IString,
            nil: NodeId,
        ) -> CoreResult<()> {
            match color.get(var) {
                Some(2) => return Ok(()),
                Some(1) => return Err(CoreError::new(ErrorKind::RecursiveAssignment, 0, format!("assignment to '{var}' is part of a dependency cycle"))),
                _ => {}
            }
            let Some(&rhs) = hierarchy.next_assign.get(var) else {
                color.insert(var.clone(), 2);
                return Ok(());
            };
            color.insert(var.clone(), 1);
            // Only current-state dependencies matter for this cycle; `next(v)`'s own body
            // referring to `next(w)` would already have been rejected as nested NEXT upstream.
            for dep in analyzer.get_dependencies(pool, table, rhs, nil, VarFilter::all(), false).unwrap_or_default() {
                if let Some(name) = pool.atom_name(dep).cloned() {
                    if hierarchy.next_assign.contains_key(&name) {
                        visit(pool, table, hierarchy, analyzer, color, &name, nil)?;
                    }
                }
            }
            color.insert(var.clone(), 2);
            Ok(())
        }

        let vars: Vec<IString> = hierarchy.next_assign.keys().cloned().collect();
        for var in vars {
            visit(pool, table, hierarchy, &mut analyzer, &mut color, &var, nil)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::symbol_table::LayerPolicy;

    fn setup() -> (NodePool, SymbolTable, LayerId) {
        let mut pool = NodePool::new();
        let mut table = SymbolTable::new();
        let layer = table.create_layer("main", LayerPolicy::Top).unwrap();
        (pool, table, layer)
    }

    #[test]
    fn single_module_declares_vars_and_constraints() {
        let (mut pool, mut table, layer) = setup();
        let x = pool.find_atom("x");
        let nil = pool.nil();
        let init_expr = pool.find_node(Tag::Equal, x, pool.find_atom("FALSE"));
        let module = ModuleDef { name: IString::from("main"), formal_params: vec![], items: vec![Item::Var(IString::from("x"), Type::Boolean), Item::Init(init_expr)] };

        let mut modules = HashMap::new();
        modules.insert(IString::from("main"), std::rc::Rc::new(module));
        let mut hf = HierarchyFlattener::new(modules);
        let mut flattener = Flattener::new();
        let hierarchy = hf.flatten_hierarchy(&mut pool, &mut table, &mut flattener, layer, &IString::from("main"), &[]).unwrap();

        assert_eq!(hierarchy.declared_vars, vec![IString::from("x")]);
        assert!(!pool.is_nil(hierarchy.init));
        let _ = nil;
    }

    #[test]
    fn recursive_module_rejected() {
        let (mut pool, mut table, layer) = setup();
        let module = ModuleDef {
            name: IString::from("loop"),
            formal_params: vec![],
            items: vec![Item::Instance { instance_name: IString::from("inner"), module_type: IString::from("loop"), actuals: vec![] }],
        };
        let mut modules = HashMap::new();
        modules.insert(IString::from("loop"), std::rc::Rc::new(module));
        let mut hf = HierarchyFlattener::new(modules);
        let mut flattener = Flattener::new();
        let err = hf.flatten_hierarchy(&mut pool, &mut table, &mut flattener, layer, &IString::from("loop"), &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RecursiveModule);
    }

    #[test]
    fn duplicate_next_assign_rejected() {
        let (mut pool, mut table, layer) = setup();
        let v = pool.find_atom("v");
        let one = pool.find_atom("1");
        let module = ModuleDef {
            name: IString::from("m"),
            formal_params: vec![],
            items: vec![Item::Var(IString::from("v"), Type::Boolean), Item::Assign(AssignItem::Next(v, one)), Item::Assign(AssignItem::Next(v, one))],
        };
        let mut modules = HashMap::new();
        modules.insert(IString::from("m"), std::rc::Rc::new(module));
        let mut hf = HierarchyFlattener::new(modules);
        let mut flattener = Flattener::new();
        let err = hf.flatten_hierarchy(&mut pool, &mut table, &mut flattener, layer, &IString::from("m"), &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RedefiningSymbol);
    }

    #[test]
    fn process_selector_expansion_scenario() {
        let (mut pool, mut table, layer) = setup();
        table.declare_constant(layer, IString::from("1")).unwrap();
        let v = pool.find_atom("v");
        let one = pool.find_atom("1");
        let plus = pool.find_node(Tag::Plus, v, one);

        // `v` is declared in `main`, not passed to `P` as a formal parameter: `P`'s body
        // reaches it only through the scope-walk fallback in identifier resolution.
        let p_module = ModuleDef { name: IString::from("P"), formal_params: vec![], items: vec![Item::Assign(AssignItem::Next(v, plus))] };
        let main_module = ModuleDef {
            name: IString::from("main"),
            formal_params: vec![],
            items: vec![
                Item::Var(IString::from("v"), Type::Integer),
                Item::Process { instance_name: IString::from("P1"), module_type: IString::from("P"), actuals: vec![] },
                Item::Process { instance_name: IString::from("P2"), module_type: IString::from("P"), actuals: vec![] },
            ],
        };
        let mut modules = HashMap::new();
        modules.insert(IString::from("P"), std::rc::Rc::new(p_module));
        modules.insert(IString::from("main"), std::rc::Rc::new(main_module));
        let mut hf = HierarchyFlattener::new(modules);
        let mut flattener = Flattener::new();
        let hierarchy = hf.flatten_hierarchy(&mut pool, &mut table, &mut flattener, layer, &IString::from("main"), &[]).unwrap();

        assert!(table.entry(&IString::from("PROCESS_SELECTOR")).is_some());
        assert!(table.entry(&IString::from("running@P1")).is_some());
        assert!(table.entry(&IString::from("running@P2")).is_some());

        // The two processes' `next(v)`s must merge into one variable, not two phantom
        // `P1.v`/`P2.v` entries: `case running@P1: v+1; running@P2: v+1; default: v esac`.
        assert_eq!(hierarchy.next_assign.len(), 1);
        let merged = *hierarchy.next_assign.get(&IString::from("v")).expect("merged under the real variable name, not a process-qualified phantom");

        let arms = pool.chain(merged, Tag::Case);
        assert_eq!(arms.len(), 4, "case running@P1: ..; running@P2: ..; default: .. esac, plus the FAILURE terminator");
        assert_eq!(pool.tag(arms[3]), Tag::Failure);

        let running_p1 = pool.find_atom("running@P1");
        let running_p2 = pool.find_atom("running@P2");
        let true_atom = pool.find_atom("TRUE");
        let v_atom = pool.find_atom("v");

        assert_eq!(pool.tag(arms[0]), Tag::Eqdef);
        assert_eq!(pool.car(arms[0]), running_p1);
        assert_eq!(pool.tag(arms[1]), Tag::Eqdef);
        assert_eq!(pool.car(arms[1]), running_p2);
        assert_eq!(pool.tag(arms[2]), Tag::Eqdef);
        assert_eq!(pool.car(arms[2]), true_atom);
        assert_eq!(pool.cdr(arms[2]), v_atom, "default arm falls back to the variable itself");

        // Both processes assign the same `v+1`, so they flatten to the identical node.
        assert_eq!(pool.cdr(arms[0]), pool.cdr(arms[1]));
        assert_ne!(pool.cdr(arms[0]), v_atom, "the guarded value is v+1, not a bare v");
    }
}
