/*!

The expression flattener/resolver rewrites raw parse-tree nodes under a lexical context into
context-free canonical nodes, following `CompileFlatten_concat_contexts` and
`compileFlatten.c`'s `flatten_sexp` family in the original source. Every public operation is a
method on [`Flattener`], which owns the memo tables the original kept as process-wide statics
(the Design Notes' "module `STATIC` caches" point): the cache is a field here, not a global, so
two independent flattening runs never share (or corrupt) each other's memo entries.

*/

use rbcx_abs::{HashMap, HashSet, IString};

use crate::core::error::{CoreError, CoreResult, ErrorKind};
use crate::core::node_pool::{NodeId, NodePool, Tag};
use crate::core::symbol_table::{ResolveResult, SymbolEntry, SymbolTable, Type};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FlattenMode {
    /// `ATOM`/`DOT` resolving to a define is replaced by the flattened body.
    ExpandDefines,
    /// The resolved name is returned as a leaf; defines are not expanded.
    Preserve,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct FlattenKey {
    expr: NodeId,
    context: NodeId,
    mode: FlattenMode,
}

/// `concat_contexts(outer, inner)` places `outer` at the bottom of `inner`'s left spine,
/// following the exact case split from `CompileFlatten_concat_contexts`.
pub fn concat_contexts(pool: &mut NodePool, outer: NodeId, inner: NodeId) -> NodeId {
    if pool.is_nil(inner) {
        return outer;
    }
    match *pool.shape(inner) {
        crate::core::node_pool::NodeShape::Op { tag: Tag::Dot, car, cdr } if pool.is_nil(car) => {
            // `DOT(Nil, atom)` → `DOT(outer, atom)`.
            pool.find_node(Tag::Dot, outer, cdr)
        }
        crate::core::node_pool::NodeShape::Bit { base, bit_index } => {
            let new_base = concat_contexts(pool, outer, base);
            pool.find_bit(new_base, bit_index)
        }
        _ => match pool.tag(inner) {
            Tag::Atom | Tag::Number => pool.find_node(Tag::Dot, outer, inner),
            // `DOT(prefix, NUMBER)` is accepted as a legal identifier shape (spec §9 open
            // question, resolved positively): the NUMBER case above already covers it because
            // `inner` here is the *whole* `DOT(prefix, NUMBER)` node, which falls through to
            // the generic recursive case below, not the atom/number leaf case.
            tag => {
                let car = pool.car(inner);
                let cdr = pool.cdr(inner);
                let new_car = concat_contexts(pool, outer, car);
                pool.find_node(tag, new_car, cdr)
            }
        },
    }
}

/// One context level up from `prefix`: instance prefixes are always built as `DOT(outer,
/// instance)` (see `core::hierarchy::extend_prefix`), so the car of that node is the prefix
/// before its innermost instance segment. Used to walk outward from a lexical context when an
/// identifier isn't declared at the fully-qualified name (`flatten_identifier`'s scope-walk).
pub(crate) fn strip_last_segment(pool: &NodePool, prefix: NodeId) -> NodeId {
    match *pool.shape(prefix) {
        crate::core::node_pool::NodeShape::Op { tag: Tag::Dot, car, .. } => car,
        _ => pool.nil(),
    }
}

/// Owns the flattener's memo tables and define-cycle "building" set.
#[derive(Default)]
pub struct Flattener {
    memo: HashMap<FlattenKey, NodeId>,
    resolve_number_memo: HashMap<(NodeId, NodeId), Option<NodeId>>,
    building: HashSet<IString>,
}

impl Flattener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidates every cache entry; called from the symbol table's `Remove` trigger (spec
    /// §4.D: "cache entries are invalidated by layer removal triggers").
    pub fn invalidate(&mut self) {
        self.memo.clear();
        self.resolve_number_memo.clear();
    }

    pub fn flatten_sexp(&mut self, pool: &mut NodePool, table: &SymbolTable, expr: NodeId, context: NodeId, mode: FlattenMode) -> CoreResult<NodeId> {
        let key = FlattenKey { expr, context, mode };
        if let Some(&cached) = self.memo.get(&key) {
            return Ok(cached);
        }
        let result = self.flatten_sexp_uncached(pool, table, expr, context, mode)?;
        self.memo.insert(key, result);
        Ok(result)
    }

    fn flatten_sexp_uncached(&mut self, pool: &mut NodePool, table: &SymbolTable, expr: NodeId, context: NodeId, mode: FlattenMode) -> CoreResult<NodeId> {
        if pool.is_nil(expr) {
            return Ok(expr);
        }
        let line = pool.line(expr);

        match pool.tag(expr) {
            Tag::Atom => self.flatten_identifier(pool, table, expr, context, mode, line),
            Tag::Dot => self.flatten_identifier(pool, table, expr, context, mode, line),

            Tag::Next => {
                let inner = pool.car(expr);
                if pool.tag(inner) == Tag::Next {
                    return Err(CoreError::new(ErrorKind::TypeMismatch, line, "nested NEXT is not allowed"));
                }
                let flat_inner = self.flatten_sexp(pool, table, inner, context, mode)?;
                let nil = pool.nil();
                Ok(pool.find_node_lined(Tag::Next, flat_inner, nil, line))
            }

            // `CAST_BOOL`/`CAST_TOINT` (§4.D): the rewrite depends on the operand's type
            // (boolean/word-1/integer-real-enum for the former, boolean/arithmetic/word for the
            // latter), and no type oracle is in scope here — only the booleanizer has one (see
            // DESIGN.md). Flatten the operand and re-wrap under the same tag, the way `NEXT` is
            // re-wrapped above, so the tag survives to `core::booleanizer::expr2bexpr`/
            // `booleanize_word`, which perform the actual §4.D rewrite.
            Tag::CastBool | Tag::CastToInt => {
                let tag = pool.tag(expr);
                let inner = pool.car(expr);
                let flat_inner = self.flatten_sexp(pool, table, inner, context, mode)?;
                let nil = pool.nil();
                Ok(pool.find_node_lined(tag, flat_inner, nil, line))
            }

            Tag::UnsignedWordConstant | Tag::SignedWordConstant => self.resolve_number(pool, table, expr, context)?.ok_or_else(|| {
                CoreError::new(ErrorKind::NonConstant, line, "UWCONST/SWCONST value or width must be a compile-time constant")
            }),

            Tag::Case | Tag::IfThenElse => self.flatten_case(pool, table, expr, context, mode, line),

            Tag::Range => Ok(expr),

            // `CONTEXT(prefix, e)`: the hierarchy flattener (§4.C) wraps every stored
            // constraint in one of these at instantiation time so that post-processing can
            // flatten each piece under its own instance prefix regardless of the ambient
            // `context` the caller passed in.
            Tag::Context => {
                let inner_context = pool.car(expr);
                let inner = pool.cdr(expr);
                self.flatten_sexp(pool, table, inner, inner_context, mode)
            }

            // Generic binary operator: flatten both children, rebuild under the same tag.
            _ => {
                let tag = pool.tag(expr);
                let car = pool.car(expr);
                let cdr = pool.cdr(expr);
                let flat_car = self.flatten_sexp(pool, table, car, context, mode)?;
                let flat_cdr = self.flatten_sexp(pool, table, cdr, context, mode)?;
                Ok(pool.find_node_lined(tag, flat_car, flat_cdr, line))
            }
        }
    }

    fn flatten_case(&mut self, pool: &mut NodePool, table: &SymbolTable, expr: NodeId, context: NodeId, mode: FlattenMode, line: u32) -> CoreResult<NodeId> {
        let tag = pool.tag(expr);
        let arms = pool.chain(expr, tag);
        if arms.is_empty() || pool.tag(*arms.last().unwrap()) != Tag::Failure {
            return Err(CoreError::new(ErrorKind::InternalInconsistency, line, "CASE/IFTHENELSE must end in a FAILURE leaf"));
        }
        let mut flat_arms = Vec::with_capacity(arms.len());
        for arm in arms {
            flat_arms.push(self.flatten_sexp(pool, table, arm, context, mode)?);
        }
        Ok(pool.build_chain(tag, &flat_arms))
    }

    fn flatten_identifier(&mut self, pool: &mut NodePool, table: &SymbolTable, expr: NodeId, context: NodeId, mode: FlattenMode, line: u32) -> CoreResult<NodeId> {
        let atom_name = pool.atom_name(expr).cloned();

        // Scope-walk: try the fully-qualified name under `context` first, then strip one
        // instance level at a time until the identifier resolves or the context is exhausted.
        // A process body referencing a variable declared in an enclosing module's scope (not
        // passed to it as a formal parameter) only resolves through this fallback.
        let mut candidate_context = context;
        let (contextual_name, resolved) = loop {
            let contextual = concat_contexts(pool, candidate_context, expr);
            let contextual_name = Self::node_to_canonical_name(pool, contextual);
            let resolved = table.resolve_symbol(atom_name.as_ref(), &contextual_name);
            let exhausted = pool.is_nil(candidate_context);
            if !matches!(resolved, ResolveResult::Undefined(_, _)) || exhausted {
                break (contextual_name, resolved);
            }
            candidate_context = strip_last_segment(pool, candidate_context);
        };

        match resolved {
            ResolveResult::Constant(name) => Ok(pool.find_atom(name)),
            ResolveResult::StateVar(_) | ResolveResult::InputVar(_) | ResolveResult::FrozenVar(_) | ResolveResult::VariableArray(_) | ResolveResult::Function(_) => {
                Ok(pool.find_atom(contextual_name))
            }
            ResolveResult::Parameter(name) => {
                let (actual, actual_context) = table.get_actual_parameter(&name)?;
                self.flatten_sexp(pool, table, actual, actual_context, mode)
            }
            ResolveResult::Define(name) => {
                if mode == FlattenMode::Preserve {
                    return Ok(pool.find_atom(name));
                }
                if self.building.contains(&name) {
                    return Err(CoreError::new(ErrorKind::CircularDefine, line, format!("define '{name}' depends on itself")));
                }
                self.building.insert(name.clone());
                let body = table.get_define_body(&name)?;
                let define_context = table.get_define_context(&name)?;
                let result = self.flatten_sexp(pool, table, body, define_context, mode);
                self.building.remove(&name);
                result
            }
            ResolveResult::ArrayDefine(name) => Ok(pool.find_atom(name)),
            ResolveResult::Ambiguous(_, err) | ResolveResult::Undefined(_, err) => Err(err),
        }
    }

    /// Crate-visible so `core::dependency` can turn an already-canonical identifier node back
    /// into its symbol-table key without re-running resolution.
    pub(crate) fn node_to_canonical_name_pub(pool: &mut NodePool, node: NodeId) -> IString {
        Self::node_to_canonical_name(pool, node)
    }

    fn node_to_canonical_name(pool: &mut NodePool, node: NodeId) -> IString {
        // A conservative, total rendering of a concatenated identifier node into a single
        // interned name, used as the symbol table's lookup key. Mirrors the original's
        // practice of using the node itself (via its printed form) as the hash key.
        match pool.shape(node).clone() {
            crate::core::node_pool::NodeShape::Atom(name) => name,
            crate::core::node_pool::NodeShape::Number(value) => IString::from(value.to_string()),
            // `DOT(Nil, x)` is a root-level identifier (no enclosing instance prefix): render
            // as `x` alone, mirroring `concat_contexts`'s own nil-car collapse.
            crate::core::node_pool::NodeShape::Op { tag: Tag::Dot, car, cdr } if pool.is_nil(car) => Self::node_to_canonical_name(pool, cdr),
            crate::core::node_pool::NodeShape::Op { tag: Tag::Dot, car, cdr } => {
                let left = Self::node_to_canonical_name(pool, car);
                let right = Self::node_to_canonical_name(pool, cdr);
                IString::from(format!("{left}.{right}"))
            }
            crate::core::node_pool::NodeShape::Bit { base, bit_index } => {
                let base_name = Self::node_to_canonical_name(pool, base);
                IString::from(format!("{base_name}[{bit_index}]"))
            }
            _ => IString::from(format!("<expr:{:?}>", node)),
        }
    }

    /// Evaluates `expr` under `context`, expecting a compile-time numeric constant. Follows
    /// defines and parameters; returns `None` ("not constant") rather than raising, since
    /// callers frequently probe speculatively (e.g. to decide whether a shift amount is fixed).
    pub fn resolve_number(&mut self, pool: &mut NodePool, table: &SymbolTable, expr: NodeId, context: NodeId) -> CoreResult<Option<NodeId>> {
        let key = (expr, context);
        if let Some(cached) = self.resolve_number_memo.get(&key) {
            return Ok(*cached);
        }
        let result = self.resolve_number_uncached(pool, table, expr, context)?;
        self.resolve_number_memo.insert(key, result);
        Ok(result)
    }

    fn resolve_number_uncached(&mut self, pool: &mut NodePool, table: &SymbolTable, expr: NodeId, context: NodeId) -> CoreResult<Option<NodeId>> {
        match pool.tag(expr) {
            Tag::Number | Tag::NumberUnsignedWord | Tag::NumberSignedWord => Ok(Some(expr)),
            Tag::Atom | Tag::Dot => {
                let flat = self.flatten_sexp(pool, table, expr, context, FlattenMode::ExpandDefines)?;
                if flat == expr {
                    Ok(None)
                } else {
                    self.resolve_number(pool, table, flat, pool.nil())
                }
            }
            Tag::UnsignedWordConstant | Tag::SignedWordConstant => {
                let value_expr = pool.car(expr);
                let width_expr = pool.cdr(expr);
                let value = self.resolve_number(pool, table, value_expr, context)?;
                let width = self.resolve_number(pool, table, width_expr, context)?;
                match (value, width) {
                    (Some(v), Some(w)) => {
                        let signed = pool.tag(expr) == Tag::SignedWordConstant;
                        let value_big = match pool.shape(v) {
                            crate::core::node_pool::NodeShape::Number(n) => n.clone(),
                            _ => return Ok(None),
                        };
                        let width_big = match pool.shape(w) {
                            crate::core::node_pool::NodeShape::Number(n) => n.clone(),
                            _ => return Ok(None),
                        };
                        let width_u32: u32 = width_big
                            .try_into()
                            .map_err(|_| CoreError::new(ErrorKind::NonConstant, pool.line(expr), "word width must be a small non-negative integer"))?;
                        Ok(Some(pool.find_number_word(value_big, width_u32, signed)))
                    }
                    _ => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }
}

/// Reports whether `name` is already declared as `PROCESS_SELECTOR`/`running@...`, which the
/// hierarchy flattener (§4.C) must reject before fabricating those symbols itself.
pub fn type_of_defined_symbol(table: &SymbolTable, name: &IString) -> Option<Type> {
    match table.entry(name) {
        Some(SymbolEntry::Variable { ty, .. }) => Some(ty.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::symbol_table::LayerPolicy;

    #[test]
    fn concat_with_nil_is_identity_p3() {
        let mut pool = NodePool::new();
        let outer = pool.find_atom("m1");
        let nil = pool.nil();
        assert_eq!(concat_contexts(&mut pool, outer, nil), outer);
    }

    #[test]
    fn concat_dot_nil_scenario() {
        let mut pool = NodePool::new();
        let nil = pool.nil();
        let m1 = pool.find_atom("m1");
        let m2 = pool.find_atom("m2");
        let outer = pool.find_node(Tag::Dot, nil, m1);
        let inner = pool.find_node(Tag::Dot, nil, m2);
        let result = concat_contexts(&mut pool, outer, inner);
        let expected = pool.find_node(Tag::Dot, outer, m2);
        assert_eq!(result, expected);
    }

    #[test]
    fn concat_associativity_p4() {
        let mut pool = NodePool::new();
        let nil = pool.nil();
        let a = pool.find_node(Tag::Dot, nil, pool.find_atom("a"));
        let b = pool.find_atom("b");
        let c = pool.find_atom("c");

        let left = concat_contexts(&mut pool, concat_contexts(&mut pool, a, b), c);
        let bc = concat_contexts(&mut pool, b, c);
        let right = concat_contexts(&mut pool, a, bc);
        assert_eq!(left, right);
    }

    #[test]
    fn flatten_resolves_atom_to_contextual_name() {
        let mut pool = NodePool::new();
        let mut table = SymbolTable::new();
        let layer = table.create_layer("main", LayerPolicy::Top).unwrap();
        let nil = pool.nil();
        let prefix = pool.find_node(Tag::Dot, nil, pool.find_atom("m1"));
        table.declare_state_var(layer, "m1.x", Type::Boolean).unwrap();

        let mut flattener = Flattener::new();
        let x = pool.find_atom("x");
        let flat = flattener.flatten_sexp(&mut pool, &table, x, prefix, FlattenMode::ExpandDefines).unwrap();
        assert_eq!(pool.atom_name(flat).unwrap().to_string(), "m1.x");
    }

    #[test]
    fn flatten_expands_defines() {
        let mut pool = NodePool::new();
        let mut table = SymbolTable::new();
        let layer = table.create_layer("main", LayerPolicy::Top).unwrap();
        let nil = pool.nil();
        table.declare_state_var(layer, "x", Type::Boolean).unwrap();
        let x_atom = pool.find_atom("x");
        table.declare_define(layer, "d", nil, x_atom).unwrap();

        let mut flattener = Flattener::new();
        let d_atom = pool.find_atom("d");
        let flat = flattener.flatten_sexp(&mut pool, &table, d_atom, nil, FlattenMode::ExpandDefines).unwrap();
        assert_eq!(flat, x_atom);
    }

    #[test]
    fn flatten_is_idempotent_p5() {
        let mut pool = NodePool::new();
        let mut table = SymbolTable::new();
        let layer = table.create_layer("main", LayerPolicy::Top).unwrap();
        let nil = pool.nil();
        table.declare_state_var(layer, "x", Type::Boolean).unwrap();
        table.declare_state_var(layer, "y", Type::Boolean).unwrap();

        let mut flattener = Flattener::new();
        let x = pool.find_atom("x");
        let y = pool.find_atom("y");
        let expr = pool.find_node(Tag::And, x, y);

        let once = flattener.flatten_sexp(&mut pool, &table, expr, nil, FlattenMode::ExpandDefines).unwrap();
        let twice = flattener.flatten_sexp(&mut pool, &table, once, nil, FlattenMode::ExpandDefines).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn circular_define_detected() {
        let mut pool = NodePool::new();
        let mut table = SymbolTable::new();
        let layer = table.create_layer("main", LayerPolicy::Top).unwrap();
        let nil = pool.nil();

        let a_plus_one_placeholder = pool.find_atom("b");
        table.declare_define(layer, "a", nil, a_plus_one_placeholder).unwrap();
        let b_placeholder = pool.find_atom("a");
        table.declare_define(layer, "b", nil, b_placeholder).unwrap();

        let mut flattener = Flattener::new();
        let a_atom = pool.find_atom("a");
        let err = flattener.flatten_sexp(&mut pool, &table, a_atom, nil, FlattenMode::ExpandDefines).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CircularDefine);
    }

    #[test]
    fn nested_next_rejected() {
        let mut pool = NodePool::new();
        let table = SymbolTable::new();
        let nil = pool.nil();
        let x = pool.find_atom("x");
        let next_x = pool.find_node(Tag::Next, x, nil);
        let next_next_x = pool.find_node(Tag::Next, next_x, nil);

        let mut flattener = Flattener::new();
        let err = flattener.flatten_sexp(&mut pool, &table, next_next_x, nil, FlattenMode::ExpandDefines).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }
}
