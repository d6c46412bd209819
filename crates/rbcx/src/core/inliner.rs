/*!

The inliner harvests `IFF`/two-level-AND-of-ANDs equivalences out of an RBC and produces a
conjunction of variable-defining equations plus the residual formula, so a CNF pass downstream
can choose whether to keep a variable explicit or substitute it away — grounded in the same
equivalence-harvesting idea as `rbcInline.c`'s `Rbc_Inline`.

*/

use std::rc::Rc;

use rbcx_abs::HashMap;

use crate::core::rbc::{RbcManager, RbcRef};

/// One harvested equation: `var ↔ rhs`, plus how many (still-mapped) variables `rhs` itself
/// depends on — the ordering used to prefer the "better" (fewer-dependency) equation when two
/// are found for the same variable.
#[derive(Clone)]
pub struct ConjElem {
    pub var: u32,
    pub rhs: RbcRef,
    pub dependency_count: usize,
}

/// The conjunction set accumulated by the DFS: one (at most) equation per variable, always the
/// best (fewest-dependency) one seen so far.
#[derive(Default, Clone)]
pub struct ConjSet {
    by_var: HashMap<u32, ConjElem>,
}

impl ConjSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `elem`, keeping the existing entry unless `elem` has strictly fewer dependencies.
    pub fn offer(&mut self, elem: ConjElem) {
        match self.by_var.get(&elem.var) {
            Some(existing) if existing.dependency_count <= elem.dependency_count => {}
            _ => {
                self.by_var.insert(elem.var, elem);
            }
        }
    }

    pub fn get(&self, var: u32) -> Option<&ConjElem> {
        self.by_var.get(&var)
    }

    pub fn vars(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_var.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.by_var.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_var.is_empty()
    }

    /// The conjunction of every harvested equation, `AND_i (var_i ↔ rhs_i)`.
    pub fn conjunction(&self, manager: &mut RbcManager) -> RbcRef {
        let mut acc = manager.top();
        for elem in self.by_var.values() {
            let var_ref = manager.make_var(elem.var);
            let iff = manager.make_iff(var_ref, elem.rhs, false);
            acc = manager.make_and(acc, iff, false);
        }
        acc
    }
}

/// The immutable result of inlining one RBC: `f` (the input), `c` (harvested equations),
/// `f_ns` (`f` with recognized patterns collapsed but not substituted), `f_in` (`f_ns` fully
/// substituted through `c`), and `finc = c ∧ f_in` (lazily computed, logically equivalent to
/// `f`).
pub struct InlineResult {
    f: RbcRef,
    f_ns: RbcRef,
    conj: ConjSet,
    f_in: once_cell::unsync::OnceCell<RbcRef>,
    finc: once_cell::unsync::OnceCell<RbcRef>,
}

impl InlineResult {
    pub fn f(&self) -> RbcRef {
        self.f
    }

    pub fn f_ns(&self) -> RbcRef {
        self.f_ns
    }

    pub fn conj_set(&self) -> &ConjSet {
        &self.conj
    }

    pub fn get_c(&self, manager: &mut RbcManager) -> RbcRef {
        self.conj.conjunction(manager)
    }

    pub fn get_inlined_f(&self, manager: &mut RbcManager) -> RbcRef {
        *self.f_in.get_or_init(|| Self::substitute_through(manager, self.f_ns, &self.conj))
    }

    pub fn get_inlined_f_and_c(&self, manager: &mut RbcManager) -> RbcRef {
        if let Some(&cached) = self.finc.get() {
            return cached;
        }
        let c = self.get_c(manager);
        let f_in = self.get_inlined_f(manager);
        let result = manager.make_and(c, f_in, false);
        let _ = self.finc.set(result);
        result
    }

    fn substitute_through(manager: &mut RbcManager, f_ns: RbcRef, conj: &ConjSet) -> RbcRef {
        let flat = flattenize(manager, conj);
        let sub: HashMap<u32, RbcRef> = flat.by_var.iter().map(|(&v, elem)| (v, elem.rhs)).collect();
        manager.subst_rbc(f_ns, &sub).unwrap_or(f_ns)
    }
}

/// §4.H step 4: rewrites every mapped variable's right-hand side so that it refers only to
/// *non-mapped* variables, transitively. Uses a per-variable "processed" set to break cycles —
/// a variable reached while it is still being resolved is left as-is (self-referential
/// equations are not flattened further).
pub fn flattenize(manager: &mut RbcManager, conj: &ConjSet) -> ConjSet {
    let mut flat = conj.clone();
    let mut processed: HashMap<u32, bool> = HashMap::new();

    fn resolve(manager: &mut RbcManager, flat: &mut ConjSet, processed: &mut HashMap<u32, bool>, var: u32, in_progress: &mut std::collections::HashSet<u32>) {
        if processed.get(&var).copied().unwrap_or(false) {
            return;
        }
        if !in_progress.insert(var) {
            // Cycle: leave this variable's current rhs as-is.
            return;
        }
        let deps: Vec<u32> = {
            let Some(elem) = flat.get(var) else {
                in_progress.remove(&var);
                return;
            };
            collect_var_indices(manager, elem.rhs)
        };
        for dep in deps {
            if flat.get(dep).is_some() {
                resolve(manager, flat, processed, dep, in_progress);
            }
        }
        if let Some(elem) = flat.get(var).cloned() {
            let sub: HashMap<u32, RbcRef> = flat.by_var.iter().filter(|(&v, _)| v != var).map(|(&v, e)| (v, e.rhs)).collect();
            if let Some(new_rhs) = manager.subst_rbc(elem.rhs, &sub) {
                flat.by_var.insert(var, ConjElem { var, rhs: new_rhs, dependency_count: count_mapped_deps(manager, new_rhs, flat) });
            }
        }
        processed.insert(var, true);
        in_progress.remove(&var);
    }

    let vars: Vec<u32> = flat.vars().collect();
    let mut in_progress = std::collections::HashSet::new();
    for var in vars {
        resolve(manager, &mut flat, &mut processed, var, &mut in_progress);
    }
    flat
}

fn count_mapped_deps(manager: &mut RbcManager, f: RbcRef, conj: &ConjSet) -> usize {
    collect_var_indices(manager, f).into_iter().filter(|v| conj.get(*v).is_some()).count()
}

fn collect_var_indices(manager: &mut RbcManager, f: RbcRef) -> Vec<u32> {
    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut stack = vec![f];
    while let Some(r) = stack.pop() {
        if !seen.insert(r.vertex_id()) {
            continue;
        }
        if let Some(idx) = manager.var_index(r) {
            out.push(idx);
            continue;
        }
        if let Some(l) = manager.left_child(r) {
            stack.push(l);
        }
        if let Some(rt) = manager.right_child(r) {
            stack.push(rt);
        }
        if let Some(e) = manager.ite_else(r) {
            stack.push(e);
        }
    }
    out
}

#[derive(Clone, Copy)]
enum DfsResult {
    /// The subtree was collapsed into an equivalence; its replacement (for substitution
    /// purposes) is this reference to the *original* vertex.
    Collapsed(RbcRef),
    Plain(RbcRef),
}

impl DfsResult {
    fn value(self) -> RbcRef {
        match self {
            DfsResult::Collapsed(r) | DfsResult::Plain(r) => r,
        }
    }
}

/// Runs the inliner's DFS over `f` (spec §4.H steps 1-3) and packages the result.
pub fn inline(manager: &mut RbcManager, f: RbcRef) -> Rc<InlineResult> {
    let mut conj = ConjSet::new();
    let mut cache: HashMap<RbcRef, DfsResult> = HashMap::new();
    let f_ns = dfs(manager, f, &mut conj, &mut cache).value();
    Rc::new(InlineResult { f, f_ns, conj, f_in: once_cell::unsync::OnceCell::new(), finc: once_cell::unsync::OnceCell::new() })
}

fn dfs(manager: &mut RbcManager, f: RbcRef, conj: &mut ConjSet, cache: &mut HashMap<RbcRef, DfsResult>) -> DfsResult {
    if let Some(&cached) = cache.get(&f) {
        return cached;
    }
    if manager.is_var(f) || manager.is_constant(f) {
        let result = DfsResult::Plain(f);
        cache.insert(f, result);
        return result;
    }

    if manager.is_iff(f) {
        let l = manager.left_child(f).unwrap();
        let r = manager.right_child(f).unwrap();
        dfs(manager, l, conj, cache);
        dfs(manager, r, conj, cache);
        try_harvest(manager, conj, l, r);
        let result = DfsResult::Plain(f);
        cache.insert(f, result);
        return result;
    }

    if manager.is_and(f) {
        let l = manager.left_child(f).unwrap();
        let r = manager.right_child(f).unwrap();
        let dl = dfs(manager, l, conj, cache).value();
        let dr = dfs(manager, r, conj, cache).value();

        // Recognize ¬AND(¬AND(x,y), ¬AND(¬x,¬y)) == IFF(x,y) when this vertex is read negated.
        if let Some((x, y)) = recognize_iff_pattern(manager, f) {
            try_harvest(manager, conj, x, y);
            let result = DfsResult::Collapsed(f);
            cache.insert(f, result);
            return result;
        }

        let rebuilt = manager.make_and(dl, dr, f.is_negated());
        let result = DfsResult::Plain(rebuilt);
        cache.insert(f, result);
        return result;
    }

    if manager.is_ite(f) {
        let i = manager.left_child(f).unwrap();
        let t = manager.right_child(f).unwrap();
        let e = manager.ite_else(f).unwrap();
        dfs(manager, i, conj, cache);
        dfs(manager, t, conj, cache);
        dfs(manager, e, conj, cache);
        let result = DfsResult::Plain(f);
        cache.insert(f, result);
        return result;
    }

    let result = DfsResult::Plain(f);
    cache.insert(f, result);
    result
}

/// If `f` (read with its own sign) is exactly `¬AND(¬AND(x,y), ¬AND(¬x,¬y))`, returns `(x, y)`.
fn recognize_iff_pattern(manager: &RbcManager, f: RbcRef) -> Option<(RbcRef, RbcRef)> {
    if !f.is_negated() {
        return None;
    }
    let positive = f.vertex_id();
    let positive_ref = RbcRef::from_parts(positive, false);
    let left = manager.left_child(positive_ref)?;
    let right = manager.right_child(positive_ref)?;
    if !left.is_negated() || !right.is_negated() {
        return None;
    }
    let (x1, y1) = (manager.left_child(left)?, manager.right_child(left)?);
    let (x2, y2) = (manager.left_child(right)?, manager.right_child(right)?);
    if x2 == x1.complement() && y2 == y1.complement() {
        return Some((x1, y1));
    }
    None
}

/// Harvests `x ↔ y` into the conjunction set when one side is a bare variable.
fn try_harvest(manager: &mut RbcManager, conj: &mut ConjSet, x: RbcRef, y: RbcRef) {
    if let Some(var) = manager.var_index(x) {
        let deps = collect_var_indices(manager, y).len();
        conj.offer(ConjElem { var, rhs: if x.is_negated() { y.complement() } else { y }, dependency_count: deps });
    } else if let Some(var) = manager.var_index(y) {
        let deps = collect_var_indices(manager, x).len();
        conj.offer(ConjElem { var, rhs: if y.is_negated() { x.complement() } else { x }, dependency_count: deps });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harvests_explicit_iff() {
        let mut mgr = RbcManager::new();
        let v = mgr.make_var(0);
        let x = mgr.make_var(1);
        let y = mgr.make_var(2);
        let rhs = mgr.make_and(x, y, false);
        let f = mgr.make_iff(v, rhs, false);

        let result = inline(&mut mgr, f);
        assert_eq!(result.conj_set().len(), 1);
        let elem = result.conj_set().get(0).unwrap();
        assert_eq!(elem.rhs, rhs);
    }

    #[test]
    fn plain_formula_has_empty_conjunction() {
        let mut mgr = RbcManager::new();
        let a = mgr.make_var(0);
        let b = mgr.make_var(1);
        let f = mgr.make_and(a, b, false);
        let result = inline(&mut mgr, f);
        assert!(result.conj_set().is_empty());
        assert_eq!(result.f_ns(), f);
    }

    #[test]
    fn inlined_f_substitutes_harvested_equations() {
        let mut mgr = RbcManager::new();
        let v = mgr.make_var(0);
        let x = mgr.make_var(1);
        let y = mgr.make_var(2);
        let rhs = mgr.make_and(x, y, false);
        let f = mgr.make_iff(v, rhs, false);

        let result = inline(&mut mgr, f);
        let f_in = result.get_inlined_f(&mut mgr);
        // v is mapped to `rhs`; the flattened formula should no longer mention v.
        assert!(collect_var_indices(&mut mgr, f_in).iter().all(|&idx| idx != 0));
    }
}
