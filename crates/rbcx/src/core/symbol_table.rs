/*!

The symbol table is the named container that the hierarchy flattener (`core::hierarchy`)
populates and that the flattener/resolver (`core::flatten`) and booleanizer (`core::booleanizer`)
query. Declarations are grouped into insertion-ordered *layers* that can be added and removed
as a unit — the generalization of the pattern [`Module`] shows elsewhere in this codebase for
owning `submodules`/`symbols`/`equations` as a group reclaimed together on drop, here turned
into an explicit, removable unit with registered trigger callbacks rather than only a destructor.

*/

use std::fmt::{Display, Formatter};

use enumflags2::{bitflags, BitFlags};
use rbcx_abs::{join_string, HashMap, IString};

use crate::core::error::{CoreError, CoreResult, ErrorKind};
use crate::core::node_pool::NodeId;

/// A type descriptor (spec §3). Owned individually by the symbol entry that holds it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Boolean,
    Integer,
    Real,
    Enum(Vec<IString>),
    SignedWord(u32),
    UnsignedWord(u32),
    WordArray { address_width: u32, data_width: u32 },
    Array { subtype: Box<Type>, lo: i64, hi: i64 },
}

impl Type {
    /// Whether every value of this type can be represented by a fixed number of boolean bits
    /// (spec §4.F's `is_booleanizable` predicate leans on this at the leaves).
    pub fn is_finite_domain(&self, word_unbooleanizable: bool) -> bool {
        match self {
            Type::Boolean | Type::Enum(_) => true,
            Type::SignedWord(_) | Type::UnsignedWord(_) => !word_unbooleanizable,
            Type::WordArray { .. } => !word_unbooleanizable,
            Type::Array { subtype, .. } => subtype.is_finite_domain(word_unbooleanizable),
            Type::Integer | Type::Real => false,
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Boolean => write!(f, "boolean"),
            Type::Integer => write!(f, "integer"),
            Type::Real => write!(f, "real"),
            Type::Enum(values) => write!(f, "{{{}}}", join_string(values, ", ")),
            Type::SignedWord(w) => write!(f, "signed word[{w}]"),
            Type::UnsignedWord(w) => write!(f, "unsigned word[{w}]"),
            Type::WordArray { address_width, data_width } => write!(f, "array word[{address_width}] of word[{data_width}]"),
            Type::Array { subtype, lo, hi } => write!(f, "array {lo}..{hi} of {subtype}"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VarKind {
    State,
    Input,
    Frozen,
}

/// What a declared name denotes (spec §3's "Symbol entry").
#[derive(Clone, Debug, PartialEq)]
pub enum SymbolEntry {
    Variable { kind: VarKind, ty: Type },
    Define { context: NodeId, body: NodeId },
    ArrayDefine { bodies: Vec<NodeId> },
    Parameter { actual: NodeId, context: NodeId },
    FunctionSignature { arity: usize },
    VariableArray { ty: Type, elements: Vec<IString> },
    Constant,
}

#[bitflags]
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SymbolCategory {
    StateVar,
    InputVar,
    FrozenVar,
    Define,
    ArrayDefine,
    VariableArray,
    Parameter,
    Constant,
    Function,
}

pub type CategoryMask = BitFlags<SymbolCategory>;

impl SymbolEntry {
    pub fn category(&self) -> SymbolCategory {
        match self {
            SymbolEntry::Variable { kind: VarKind::State, .. } => SymbolCategory::StateVar,
            SymbolEntry::Variable { kind: VarKind::Input, .. } => SymbolCategory::InputVar,
            SymbolEntry::Variable { kind: VarKind::Frozen, .. } => SymbolCategory::FrozenVar,
            SymbolEntry::Define { .. } => SymbolCategory::Define,
            SymbolEntry::ArrayDefine { .. } => SymbolCategory::ArrayDefine,
            SymbolEntry::Parameter { .. } => SymbolCategory::Parameter,
            SymbolEntry::FunctionSignature { .. } => SymbolCategory::Function,
            SymbolEntry::VariableArray { .. } => SymbolCategory::VariableArray,
            SymbolEntry::Constant => SymbolCategory::Constant,
        }
    }
}

/// Where a new layer is inserted relative to its siblings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayerPolicy {
    Top,
    Bottom,
    Before(IString),
    After(IString),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LayerId(u32);

struct Layer {
    id: LayerId,
    name: IString,
    class: Option<IString>,
    /// Insertion order of the names this layer owns.
    symbols: Vec<IString>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TriggerAction {
    Add,
    Remove,
}

type TriggerFn = Box<dyn Fn(&IString, &SymbolEntry)>;

struct Trigger {
    action: TriggerAction,
    callback: TriggerFn,
}

/// The tagged result of [`SymbolTable::resolve_symbol`], mirroring `ResolveSymbol.h`'s return
/// categories one-for-one.
pub enum ResolveResult {
    Constant(IString),
    StateVar(IString),
    InputVar(IString),
    FrozenVar(IString),
    Define(IString),
    ArrayDefine(IString),
    VariableArray(IString),
    Parameter(IString),
    Function(IString),
    Ambiguous(IString, CoreError),
    Undefined(IString, CoreError),
}

impl ResolveResult {
    /// The canonical name the resolution attempt was performed against, even when undefined —
    /// needed so diagnostics can still point at the identifier that failed to resolve.
    pub fn canonical_name(&self) -> &IString {
        match self {
            ResolveResult::Constant(n)
            | ResolveResult::StateVar(n)
            | ResolveResult::InputVar(n)
            | ResolveResult::FrozenVar(n)
            | ResolveResult::Define(n)
            | ResolveResult::ArrayDefine(n)
            | ResolveResult::VariableArray(n)
            | ResolveResult::Parameter(n)
            | ResolveResult::Function(n)
            | ResolveResult::Ambiguous(n, _)
            | ResolveResult::Undefined(n, _) => n,
        }
    }

    /// Aborts with the formatted error carried by an `Ambiguous`/`Undefined` result. A no-op
    /// (`Ok(())`) for every successful resolution category.
    pub fn throw_error(self) -> CoreResult<ResolveResult> {
        match self {
            ResolveResult::Ambiguous(_, err) | ResolveResult::Undefined(_, err) => Err(err),
            other => Ok(other),
        }
    }
}

#[derive(Default)]
pub struct SymbolTable {
    layers: Vec<Layer>,
    next_layer_id: u32,
    symbols: HashMap<IString, (SymbolEntry, LayerId)>,
    triggers: Vec<Trigger>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn layer_position(&self, policy: &LayerPolicy) -> usize {
        match policy {
            LayerPolicy::Top => 0,
            LayerPolicy::Bottom => self.layers.len(),
            LayerPolicy::Before(name) => self.layers.iter().position(|l| &l.name == name).unwrap_or(self.layers.len()),
            LayerPolicy::After(name) => self.layers.iter().position(|l| &l.name == name).map(|i| i + 1).unwrap_or(self.layers.len()),
        }
    }

    pub fn create_layer(&mut self, name: impl Into<IString>, policy: LayerPolicy) -> CoreResult<LayerId> {
        let name = name.into();
        if self.layers.iter().any(|l| l.name == name) {
            return Err(CoreError::new(ErrorKind::RedefiningSymbol, 0, format!("layer '{name}' already exists")));
        }
        let id = LayerId(self.next_layer_id);
        self.next_layer_id += 1;
        let position = self.layer_position(&policy);
        self.layers.insert(position, Layer { id, name, class: None, symbols: Vec::new() });
        Ok(id)
    }

    pub fn set_layer_class(&mut self, layer: LayerId, class: impl Into<IString>) {
        if let Some(l) = self.layers.iter_mut().find(|l| l.id == layer) {
            l.class = Some(class.into());
        }
    }

    /// Removes the layer and every symbol it owns, firing `Remove` triggers for each symbol
    /// first (in the order the symbols were declared), then invalidating every cache entry
    /// that depended on it via the same trigger mechanism (caches subscribe with their own
    /// `add_trigger(Remove, ...)` closures).
    pub fn remove_layer(&mut self, layer: LayerId) {
        let Some(idx) = self.layers.iter().position(|l| l.id == layer) else { return };
        let removed = self.layers.remove(idx);
        for name in &removed.symbols {
            if let Some((entry, _)) = self.symbols.remove(name) {
                self.fire(TriggerAction::Remove, name, &entry);
            }
        }
    }

    fn fire(&self, action: TriggerAction, name: &IString, entry: &SymbolEntry) {
        for trigger in &self.triggers {
            if trigger.action == action {
                (trigger.callback)(name, entry);
            }
        }
    }

    fn declare(&mut self, layer: LayerId, name: IString, entry: SymbolEntry) -> CoreResult<()> {
        if self.symbols.contains_key(&name) {
            return Err(CoreError::new(ErrorKind::RedefiningSymbol, 0, format!("symbol '{name}' is already declared")));
        }
        let Some(l) = self.layers.iter_mut().find(|l| l.id == layer) else {
            return Err(CoreError::new(ErrorKind::InternalInconsistency, 0, "declare into unknown layer"));
        };
        l.symbols.push(name.clone());
        self.fire(TriggerAction::Add, &name, &entry);
        self.symbols.insert(name, (entry, layer));
        Ok(())
    }

    pub fn declare_state_var(&mut self, layer: LayerId, name: impl Into<IString>, ty: Type) -> CoreResult<()> {
        self.declare(layer, name.into(), SymbolEntry::Variable { kind: VarKind::State, ty })
    }

    pub fn declare_input_var(&mut self, layer: LayerId, name: impl Into<IString>, ty: Type) -> CoreResult<()> {
        self.declare(layer, name.into(), SymbolEntry::Variable { kind: VarKind::Input, ty })
    }

    pub fn declare_frozen_var(&mut self, layer: LayerId, name: impl Into<IString>, ty: Type) -> CoreResult<()> {
        self.declare(layer, name.into(), SymbolEntry::Variable { kind: VarKind::Frozen, ty })
    }

    pub fn declare_define(&mut self, layer: LayerId, name: impl Into<IString>, context: NodeId, body: NodeId) -> CoreResult<()> {
        self.declare(layer, name.into(), SymbolEntry::Define { context, body })
    }

    pub fn declare_array_define(&mut self, layer: LayerId, name: impl Into<IString>, bodies: Vec<NodeId>) -> CoreResult<()> {
        self.declare(layer, name.into(), SymbolEntry::ArrayDefine { bodies })
    }

    pub fn declare_variable_array(&mut self, layer: LayerId, name: impl Into<IString>, ty: Type) -> CoreResult<()> {
        self.declare(layer, name.into(), SymbolEntry::VariableArray { ty, elements: Vec::new() })
    }

    pub fn add_variable_array_element(&mut self, array_name: &IString, element: IString) -> CoreResult<()> {
        match self.symbols.get_mut(array_name) {
            Some((SymbolEntry::VariableArray { elements, .. }, _)) => {
                elements.push(element);
                Ok(())
            }
            _ => Err(CoreError::new(ErrorKind::InternalInconsistency, 0, format!("'{array_name}' is not a variable-array"))),
        }
    }

    pub fn declare_parameter(&mut self, layer: LayerId, name: impl Into<IString>, actual: NodeId, context: NodeId) -> CoreResult<()> {
        self.declare(layer, name.into(), SymbolEntry::Parameter { actual, context })
    }

    pub fn declare_function(&mut self, layer: LayerId, name: impl Into<IString>, arity: usize) -> CoreResult<()> {
        self.declare(layer, name.into(), SymbolEntry::FunctionSignature { arity })
    }

    /// Constants are declared at most once, globally (spec §4.B); `layer` is still recorded so
    /// `remove_layer` can reclaim them like any other symbol.
    pub fn declare_constant(&mut self, layer: LayerId, name: impl Into<IString>) -> CoreResult<()> {
        self.declare(layer, name.into(), SymbolEntry::Constant)
    }

    pub fn add_trigger(&mut self, action: TriggerAction, callback: impl Fn(&IString, &SymbolEntry) + 'static) {
        self.triggers.push(Trigger { action, callback: Box::new(callback) });
    }

    pub fn is_symbol_var(&self, name: &IString) -> bool {
        matches!(self.symbols.get(name), Some((SymbolEntry::Variable { .. }, _)))
    }
    pub fn is_symbol_define(&self, name: &IString) -> bool {
        matches!(self.symbols.get(name), Some((SymbolEntry::Define { .. }, _)))
    }
    pub fn is_symbol_parameter(&self, name: &IString) -> bool {
        matches!(self.symbols.get(name), Some((SymbolEntry::Parameter { .. }, _)))
    }
    pub fn is_symbol_constant(&self, name: &IString) -> bool {
        matches!(self.symbols.get(name), Some((SymbolEntry::Constant, _)))
    }
    pub fn is_symbol_array_define(&self, name: &IString) -> bool {
        matches!(self.symbols.get(name), Some((SymbolEntry::ArrayDefine { .. }, _)))
    }
    pub fn is_symbol_variable_array(&self, name: &IString) -> bool {
        matches!(self.symbols.get(name), Some((SymbolEntry::VariableArray { .. }, _)))
    }

    pub fn entry(&self, name: &IString) -> Option<&SymbolEntry> {
        self.symbols.get(name).map(|(e, _)| e)
    }

    pub fn get_var_type(&self, name: &IString) -> CoreResult<&Type> {
        match self.entry(name) {
            Some(SymbolEntry::Variable { ty, .. }) => Ok(ty),
            _ => Err(CoreError::new(ErrorKind::InternalInconsistency, 0, format!("'{name}' is not a variable"))),
        }
    }

    pub fn get_define_body(&self, name: &IString) -> CoreResult<NodeId> {
        match self.entry(name) {
            Some(SymbolEntry::Define { body, .. }) => Ok(*body),
            _ => Err(CoreError::new(ErrorKind::InternalInconsistency, 0, format!("'{name}' is not a define"))),
        }
    }

    pub fn get_define_context(&self, name: &IString) -> CoreResult<NodeId> {
        match self.entry(name) {
            Some(SymbolEntry::Define { context, .. }) => Ok(*context),
            _ => Err(CoreError::new(ErrorKind::InternalInconsistency, 0, format!("'{name}' is not a define"))),
        }
    }

    pub fn get_actual_parameter(&self, name: &IString) -> CoreResult<(NodeId, NodeId)> {
        match self.entry(name) {
            Some(SymbolEntry::Parameter { actual, context }) => Ok((*actual, *context)),
            _ => Err(CoreError::new(ErrorKind::InternalInconsistency, 0, format!("'{name}' is not a parameter"))),
        }
    }

    pub fn get_array_define_body(&self, name: &IString, index: usize) -> CoreResult<NodeId> {
        match self.entry(name) {
            Some(SymbolEntry::ArrayDefine { bodies }) => bodies
                .get(index)
                .copied()
                .ok_or_else(|| CoreError::new(ErrorKind::OutOfBounds, 0, format!("index {index} out of bounds for array define '{name}'"))),
            _ => Err(CoreError::new(ErrorKind::InternalInconsistency, 0, format!("'{name}' is not an array define"))),
        }
    }

    /// Lazily filters declared symbols whose category is in `mask` and for which `filter`
    /// (when given) returns `true`. Declaration order is not guaranteed across layers; callers
    /// that need layer order should iterate `layers` directly.
    pub fn iter<'a>(&'a self, mask: CategoryMask, filter: Option<&'a dyn Fn(&IString, &SymbolEntry) -> bool>) -> impl Iterator<Item = &'a IString> + 'a {
        self.symbols.iter().filter_map(move |(name, (entry, _))| {
            if mask.contains(entry.category()) && filter.map(|f| f(name, entry)).unwrap_or(true) {
                Some(name)
            } else {
                None
            }
        })
    }

    /// Central name lookup (spec §4.B's resolution algorithm). `context_of` is the already
    /// context-free candidate identifier produced by `concat_contexts(context, expr)` when
    /// `expr` is not itself a bare constant atom; callers in `core::flatten` drive that step
    /// since `concat_contexts` lives there.
    pub fn resolve_symbol(&self, atom_name: Option<&IString>, contextual_name: &IString) -> ResolveResult {
        if let Some(name) = atom_name {
            if self.is_symbol_constant(name) {
                // A bare atom that is itself a globally declared constant. Still check whether
                // the contextual form *also* resolves to something, which is the only source
                // of ambiguity here.
                if contextual_name != name {
                    if let Some((entry, _)) = self.symbols.get(contextual_name) {
                        if !matches!(entry, SymbolEntry::Constant) {
                            let err = CoreError::new(
                                ErrorKind::AmbiguousSymbol,
                                0,
                                format!("'{name}' is ambiguous: both a constant and a context-qualified symbol"),
                            );
                            return ResolveResult::Ambiguous(name.clone(), err);
                        }
                    }
                }
                return ResolveResult::Constant(name.clone());
            }
        }

        match self.symbols.get(contextual_name) {
            Some((SymbolEntry::Constant, _)) => ResolveResult::Constant(contextual_name.clone()),
            Some((SymbolEntry::Parameter { .. }, _)) => ResolveResult::Parameter(contextual_name.clone()),
            Some((SymbolEntry::Variable { kind: VarKind::State, .. }, _)) => ResolveResult::StateVar(contextual_name.clone()),
            Some((SymbolEntry::Variable { kind: VarKind::Input, .. }, _)) => ResolveResult::InputVar(contextual_name.clone()),
            Some((SymbolEntry::Variable { kind: VarKind::Frozen, .. }, _)) => ResolveResult::FrozenVar(contextual_name.clone()),
            Some((SymbolEntry::Define { .. }, _)) => ResolveResult::Define(contextual_name.clone()),
            Some((SymbolEntry::ArrayDefine { .. }, _)) => ResolveResult::ArrayDefine(contextual_name.clone()),
            Some((SymbolEntry::VariableArray { .. }, _)) => ResolveResult::VariableArray(contextual_name.clone()),
            Some((SymbolEntry::FunctionSignature { .. }, _)) => ResolveResult::Function(contextual_name.clone()),
            None => {
                let err = CoreError::new(ErrorKind::UndefinedSymbol, 0, format!("undefined symbol '{contextual_name}'"));
                ResolveResult::Undefined(contextual_name.clone(), err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declare_and_redeclare_fails() {
        let mut table = SymbolTable::new();
        let layer = table.create_layer("main", LayerPolicy::Top).unwrap();
        table.declare_state_var(layer, "x", Type::Boolean).unwrap();
        let err = table.declare_state_var(layer, "x", Type::Boolean).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RedefiningSymbol);
    }

    #[test]
    fn remove_layer_fires_triggers_and_drops_symbols() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut table = SymbolTable::new();
        let layer = table.create_layer("main", LayerPolicy::Top).unwrap();
        table.declare_state_var(layer, "x", Type::Boolean).unwrap();

        let removed: Rc<RefCell<Vec<IString>>> = Rc::new(RefCell::new(Vec::new()));
        let removed_clone = removed.clone();
        table.add_trigger(TriggerAction::Remove, move |name, _| removed_clone.borrow_mut().push(name.clone()));

        table.remove_layer(layer);
        assert_eq!(removed.borrow().len(), 1);
        assert!(!table.is_symbol_var(&IString::from("x")));
    }

    #[test]
    fn resolve_symbol_categories() {
        let mut table = SymbolTable::new();
        let layer = table.create_layer("main", LayerPolicy::Top).unwrap();
        table.declare_state_var(layer, "x", Type::Boolean).unwrap();
        let name = IString::from("x");
        match table.resolve_symbol(None, &name) {
            ResolveResult::StateVar(n) => assert_eq!(n, name),
            _ => panic!("expected state var"),
        }
        let missing = IString::from("y");
        match table.resolve_symbol(None, &missing) {
            ResolveResult::Undefined(n, _) => assert_eq!(n, missing),
            _ => panic!("expected undefined"),
        }
    }

    #[test]
    fn layer_policy_ordering() {
        let mut table = SymbolTable::new();
        let bottom = table.create_layer("bottom", LayerPolicy::Bottom).unwrap();
        let top = table.create_layer("top", LayerPolicy::Top).unwrap();
        assert_eq!(table.layers[0].id, top);
        assert_eq!(table.layers[1].id, bottom);
    }
}
