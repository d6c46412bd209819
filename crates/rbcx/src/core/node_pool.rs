/*!

The node pool is the primitive every other component is built on: an immutable, hash-consed
AST. Two structurally equal nodes share the same identity (`find_node`), so every later
component (the symbol table, the flattener, the booleanizer) can use pointer/index equality
as a cheap proxy for structural equality and can safely use [`NodeId`] as a hash map key.

Grounded on [`rbcx_abs::IndexSet`] for the structural hash table, and on the "interned vs.
unique" split the Design Notes call for: [`NodeId`] distinguishes the two allocation kinds
*structurally*, as an enum, not via a flag that the rest of the code could ignore.

*/

use std::fmt::{Debug, Display, Formatter};

use num_bigint::BigInt;
use rbcx_abs::{IString, SmallVec};

use crate::core::node_pool::NodeIdRepr::{Interned, Unique};

/// The source language's operators. Leaf shapes (`Atom`, `Number`, …) are not represented as
/// tags on a generic `Op` record; they get their own [`NodeShape`] variants instead, so the
/// node pool never needs to smuggle a string or a bignum through a `car`/`cdr` pair of
/// indices. `Tag` still enumerates the full operator vocabulary because later components
/// (the flattener, the booleanizer) dispatch on it directly.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    Nil,
    Atom,
    Number,
    NumberUnsignedWord,
    NumberSignedWord,
    Dot,
    Array,
    Bit,
    And,
    Or,
    Not,
    Iff,
    Xor,
    Implies,
    Eqdef,
    Next,
    AtTime,
    Case,
    IfThenElse,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Plus,
    Minus,
    Times,
    Divide,
    Mod,
    UnaryMinus,
    Concatenation,
    BitSelection,
    Extend,
    WordResize,
    LeftShift,
    RightShift,
    LeftRotate,
    RightRotate,
    CastBool,
    CastToInt,
    CastWord,
    UnsignedWordConstant,
    SignedWordConstant,
    Range,
    Failure,
    ProcessSelector,
    Context,
}

/// The structural shape of a node: everything needed both to decide whether two nodes are
/// "the same" and to reconstruct the node's children/payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeShape {
    Nil,
    Atom(IString),
    Number(BigInt),
    NumberWord { value: BigInt, width: u32, signed: bool },
    /// A bit-indexed identifier, `BIT(base, bit_index)` (spec §3 identifier shapes).
    Bit { base: NodeId, bit_index: u32 },
    /// Every other operator: a tag plus an ordered pair of children. `n`-ary operators
    /// (`CASE` arm lists, `AND`-of-many) are represented as right-nested `cdr` chains over
    /// a `(tag, car, cdr)` record.
    Op { tag: Tag, car: NodeId, cdr: NodeId },
}

impl NodeShape {
    pub fn tag(&self) -> Tag {
        match self {
            NodeShape::Nil => Tag::Nil,
            NodeShape::Atom(_) => Tag::Atom,
            NodeShape::Number(_) => Tag::Number,
            NodeShape::NumberWord { signed, .. } => {
                if *signed {
                    Tag::NumberSignedWord
                } else {
                    Tag::NumberUnsignedWord
                }
            }
            NodeShape::Bit { .. } => Tag::Bit,
            NodeShape::Op { tag, .. } => *tag,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
enum NodeIdRepr {
    /// Index into the pool's interned (shared) node table.
    Interned(u32),
    /// Index into the pool's unique (owner-bound) node table, produced by `new_lined_node`.
    Unique(u32),
}

/// An opaque reference to a node. Two `NodeId`s compare equal iff they were produced by the
/// same `find_*`/`new_lined_node` call or by two `find_*` calls with equal arguments; there is
/// no way to recover a raw index or pointer from a `NodeId` outside this module.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(NodeIdRepr);

impl Debug for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Interned(i) => write!(f, "NodeId(#{})", i),
            Unique(i) => write!(f, "NodeId(unique#{})", i),
        }
    }
}

struct StoredShape {
    shape: NodeShape,
    line: u32,
}

/// Interns AST nodes and provides the pool's two allocation kinds: shared, structurally
/// deduplicated nodes (`find_*`) and unique, owner-bound nodes with their own line (`new_lined_node`).
#[derive(Default)]
pub struct NodePool {
    interned: rbcx_abs::IndexSet<NodeShape, u32>,
    unique: Vec<StoredShape>,
    nil_id: Option<NodeId>,
}

impl NodePool {
    pub fn new() -> Self {
        let mut pool = NodePool::default();
        let nil = pool.intern(NodeShape::Nil, 0);
        pool.nil_id = Some(nil);
        pool
    }

    fn intern(&mut self, shape: NodeShape, line: u32) -> NodeId {
        let index = self.interned.insert_with_key(shape, line);
        NodeId(Interned(index as u32))
    }

    /// The distinguished empty node. Present from pool construction; stable for the pool's
    /// entire lifetime.
    pub fn nil(&self) -> NodeId {
        self.nil_id.expect("NodePool::new always interns Nil first")
    }

    /// Returns the unique canonical node of shape `(tag, car, cdr)`. Constant: two calls with
    /// equal arguments return the same `NodeId` (property P1). Line information is attached
    /// only on first insertion; later calls do not change it.
    pub fn find_node(&mut self, tag: Tag, car: NodeId, cdr: NodeId) -> NodeId {
        self.find_node_lined(tag, car, cdr, 0)
    }

    pub fn find_node_lined(&mut self, tag: Tag, car: NodeId, cdr: NodeId, line: u32) -> NodeId {
        self.intern(NodeShape::Op { tag, car, cdr }, line)
    }

    /// Creates a *non-interned* node carrying its own line, distinct from any structurally
    /// equal interned or unique node (property P2).
    pub fn new_lined_node(&mut self, tag: Tag, car: NodeId, cdr: NodeId, line: u32) -> NodeId {
        let index = self.unique.len() as u32;
        self.unique.push(StoredShape { shape: NodeShape::Op { tag, car, cdr }, line });
        NodeId(Unique(index))
    }

    pub fn find_atom(&mut self, name: impl Into<IString>) -> NodeId {
        self.intern(NodeShape::Atom(name.into()), 0)
    }

    /// Alias for `find_atom`: string literals and atom names are interned through the same
    /// `IString` table, so they collapse to one implementation under two entry-point names.
    pub fn find_string(&mut self, s: impl Into<IString>) -> NodeId {
        self.find_atom(s)
    }

    pub fn find_number(&mut self, value: BigInt) -> NodeId {
        self.intern(NodeShape::Number(value), 0)
    }

    pub fn find_number_word(&mut self, value: BigInt, width: u32, signed: bool) -> NodeId {
        self.intern(NodeShape::NumberWord { value, width, signed }, 0)
    }

    pub fn find_bit(&mut self, base: NodeId, bit_index: u32) -> NodeId {
        self.intern(NodeShape::Bit { base, bit_index }, 0)
    }

    pub fn shape(&self, id: NodeId) -> &NodeShape {
        match id.0 {
            Interned(i) => self.interned.index_to_key_ref(i as usize).expect("dangling interned NodeId"),
            Unique(i) => &self.unique[i as usize].shape,
        }
    }

    pub fn line(&self, id: NodeId) -> u32 {
        match id.0 {
            Interned(i) => *self.interned.index_to_value(i as usize).expect("dangling interned NodeId"),
            Unique(i) => self.unique[i as usize].line,
        }
    }

    pub fn tag(&self, id: NodeId) -> Tag {
        self.shape(id).tag()
    }

    pub fn is_nil(&self, id: NodeId) -> bool {
        matches!(self.shape(id), NodeShape::Nil)
    }

    /// Children of an `Op`-shaped node; `Nil` for anything else.
    pub fn car(&self, id: NodeId) -> NodeId {
        match self.shape(id) {
            NodeShape::Op { car, .. } => *car,
            _ => self.nil(),
        }
    }

    pub fn cdr(&self, id: NodeId) -> NodeId {
        match self.shape(id) {
            NodeShape::Op { cdr, .. } => *cdr,
            _ => self.nil(),
        }
    }

    pub fn atom_name(&self, id: NodeId) -> Option<&IString> {
        match self.shape(id) {
            NodeShape::Atom(name) => Some(name),
            _ => None,
        }
    }

    /// Walks a right-nested `cdr` chain of a given `tag` (e.g. a flattened `AND`-of-many or a
    /// `CASE` arm list) and collects its elements left to right.
    pub fn chain(&self, id: NodeId, tag: Tag) -> SmallVec<[NodeId; 4]> {
        let mut out = SmallVec::new();
        let mut current = id;
        loop {
            match self.shape(current) {
                NodeShape::Op { tag: t, car, cdr } if *t == tag => {
                    out.push(*car);
                    current = *cdr;
                }
                _ => {
                    if !self.is_nil(current) {
                        out.push(current);
                    }
                    break;
                }
            }
        }
        out
    }

    /// Builds a right-nested `cdr` chain of `tag` from `items`, terminated by `Nil`. Inverse
    /// of [`NodePool::chain`].
    pub fn build_chain(&mut self, tag: Tag, items: &[NodeId]) -> NodeId {
        let mut acc = self.nil();
        for &item in items.iter().rev() {
            acc = self.find_node(tag, item, acc);
        }
        acc
    }

    /// The bignum payload of a `NUMBER` leaf, if `id` is one.
    pub fn number_value(&self, id: NodeId) -> Option<BigInt> {
        match self.shape(id) {
            NodeShape::Number(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// The `(value, width, signed)` payload of a word-constant leaf, if `id` is one.
    pub fn number_word_value(&self, id: NodeId) -> Option<(BigInt, u32, bool)> {
        match self.shape(id) {
            NodeShape::NumberWord { value, width, signed } => Some((value.clone(), *width, *signed)),
            _ => None,
        }
    }

    /// Decodes a `BIT_SELECTION(base, RANGE(low, high))` node's bounds as plain `usize`s.
    pub fn bit_range(&self, id: NodeId) -> Option<(usize, usize)> {
        let range = self.cdr(id);
        if self.tag(range) != Tag::Range {
            return None;
        }
        let low = self.number_value(self.car(range))?;
        let high = self.number_value(self.cdr(range))?;
        Some((num_traits::ToPrimitive::to_usize(&low)?, num_traits::ToPrimitive::to_usize(&high)?))
    }

    /// Decodes an `EXTEND(base, delta)` node's constant delta as a `usize`.
    pub fn extend_delta(&self, id: NodeId) -> Option<usize> {
        let delta = self.number_value(self.cdr(id))?;
        num_traits::ToPrimitive::to_usize(&delta)
    }

    /// Decodes a `WRESIZE(base, n)` node's constant target width as a `usize`.
    pub fn resize_width(&self, id: NodeId) -> Option<usize> {
        let n = self.number_value(self.cdr(id))?;
        num_traits::ToPrimitive::to_usize(&n)
    }
}

impl Display for NodePool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodePool({} interned, {} unique)", self.interned.len(), self.unique.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_node_is_structural_p1() {
        let mut pool = NodePool::new();
        let a = pool.find_atom("a");
        let b = pool.find_atom("b");
        let n1 = pool.find_node(Tag::And, a, b);
        let n2 = pool.find_node(Tag::And, a, b);
        assert_eq!(n1, n2);
    }

    #[test]
    fn new_lined_node_is_unique_p2() {
        let mut pool = NodePool::new();
        let a = pool.find_atom("a");
        let b = pool.find_atom("b");
        let n1 = pool.new_lined_node(Tag::And, a, b, 1);
        let n2 = pool.new_lined_node(Tag::And, a, b, 2);
        assert_ne!(n1, n2);
        assert_eq!(pool.line(n1), 1);
        assert_eq!(pool.line(n2), 2);
    }

    #[test]
    fn line_attached_only_on_first_intern() {
        let mut pool = NodePool::new();
        let a = pool.find_atom("a");
        let b = pool.find_atom("b");
        let n1 = pool.find_node_lined(Tag::Or, a, b, 5);
        let n2 = pool.find_node_lined(Tag::Or, a, b, 99);
        assert_eq!(n1, n2);
        assert_eq!(pool.line(n1), 5);
    }

    #[test]
    fn chain_round_trips() {
        let mut pool = NodePool::new();
        let items: Vec<NodeId> = (0..4).map(|i| pool.find_atom(format!("v{i}"))).collect();
        let chained = pool.build_chain(Tag::And, &items);
        let recovered = pool.chain(chained, Tag::And);
        assert_eq!(recovered.as_slice(), items.as_slice());
    }

    #[test]
    fn distinct_atoms_are_distinct_nodes() {
        let mut pool = NodePool::new();
        let a = pool.find_atom("a");
        let b = pool.find_atom("b");
        assert_ne!(a, b);
        let a2 = pool.find_atom("a");
        assert_eq!(a, a2);
    }
}
