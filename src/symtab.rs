//! Symbol Table
//!
//! String interning plus typed named items for one compile. Interned
//! strings get a stable [`SymId`]; equality between identifiers is id
//! equality from then on. Each `(SymId, SymKind)` pair maps to at most one
//! item: script variables hold numbers, labels hold parse-operator
//! references, and the runtime-published name tables (waves, noises, line
//! shapes, math functions) hold indices into their table.
//!
//! Lookups return nothing unless the kind matches; the variable kind is
//! created lazily on first lookup so `$name =` assignment and `$name`
//! reference share one path.

use crate::ast::OpKey;
use std::collections::HashMap;

/// Stable id of an interned string within one compile
pub type SymId = u32;

/// Index into a runtime-published name table
pub type NameId = u32;

/// Namespace an item lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymKind {
    /// Script `$name` variables
    Variable,
    /// Script `'name` operator labels
    Label,
    /// Wave type names
    Wave,
    /// Noise type names
    Noise,
    /// Ramp shape names
    LineShape,
    /// Math function names usable in expressions
    MathFunc,
}

/// Payload of a named item
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SymValue {
    /// Created but not yet assigned
    Unset,
    /// Numeric variable value
    Number(f64),
    /// Reference to a parse operator node (labels)
    Object(OpKey),
    /// Index into the item's name table
    Name(NameId),
}

/// Interner and typed item store for one compile
#[derive(Debug, Default)]
pub struct SymTab {
    strings: Vec<String>,
    index: HashMap<String, SymId>,
    items: HashMap<(SymId, SymKind), SymValue>,
}

impl SymTab {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning its stable id.
    pub fn intern(&mut self, s: &str) -> SymId {
        if let Some(&id) = self.index.get(s) {
            return id;
        }
        let id = self.strings.len() as SymId;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), id);
        id
    }

    /// The string behind an id.
    pub fn name(&self, id: SymId) -> &str {
        &self.strings[id as usize]
    }

    /// Look up an item; `None` unless one exists under exactly this kind.
    pub fn get(&self, id: SymId, kind: SymKind) -> Option<SymValue> {
        self.items.get(&(id, kind)).copied()
    }

    /// Set (or replace) the item under `(id, kind)`.
    pub fn set(&mut self, id: SymId, kind: SymKind, value: SymValue) {
        self.items.insert((id, kind), value);
    }

    /// Look up a variable, creating it unset on first reference.
    pub fn variable(&mut self, id: SymId) -> SymValue {
        *self
            .items
            .entry((id, SymKind::Variable))
            .or_insert(SymValue::Unset)
    }

    /// Assign a numeric value to a variable.
    pub fn set_variable(&mut self, id: SymId, value: f64) {
        self.items
            .insert((id, SymKind::Variable), SymValue::Number(value));
    }

    /// Bind a label to an operator node.
    pub fn set_label(&mut self, id: SymId, op: OpKey) {
        self.items.insert((id, SymKind::Label), SymValue::Object(op));
    }

    /// Resolve a label to its operator node.
    pub fn label(&self, id: SymId) -> Option<OpKey> {
        match self.get(id, SymKind::Label) {
            Some(SymValue::Object(op)) => Some(op),
            _ => None,
        }
    }

    /// Bulk-register a runtime name table. Each name receives its index in
    /// the slice as [`NameId`]. Called once per compile per kind.
    pub fn register_names(&mut self, kind: SymKind, names: &[&str]) {
        for (i, name) in names.iter().enumerate() {
            let id = self.intern(name);
            self.items.insert((id, kind), SymValue::Name(i as NameId));
        }
    }

    /// Resolve an interned name within a registered table.
    pub fn name_id(&self, id: SymId, kind: SymKind) -> Option<NameId> {
        match self.get(id, kind) {
            Some(SymValue::Name(n)) => Some(n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_stable() {
        let mut st = SymTab::new();
        let a = st.intern("osc");
        let b = st.intern("osc");
        let c = st.intern("lfo");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(st.name(a), "osc");
    }

    #[test]
    fn test_kind_separation() {
        let mut st = SymTab::new();
        let id = st.intern("sin");
        st.set(id, SymKind::Wave, SymValue::Name(0));
        st.set(id, SymKind::MathFunc, SymValue::Name(4));
        assert_eq!(st.name_id(id, SymKind::Wave), Some(0));
        assert_eq!(st.name_id(id, SymKind::MathFunc), Some(4));
        assert_eq!(st.get(id, SymKind::Noise), None);
    }

    #[test]
    fn test_variable_lazy_creation() {
        let mut st = SymTab::new();
        let id = st.intern("tempo");
        assert_eq!(st.get(id, SymKind::Variable), None);
        assert_eq!(st.variable(id), SymValue::Unset);
        assert_eq!(st.get(id, SymKind::Variable), Some(SymValue::Unset));
        st.set_variable(id, 120.0);
        assert_eq!(st.variable(id), SymValue::Number(120.0));
    }

    #[test]
    fn test_register_names_assigns_indices() {
        let mut st = SymTab::new();
        st.register_names(SymKind::Wave, &["sin", "sqr", "tri"]);
        let sqr = st.intern("sqr");
        assert_eq!(st.name_id(sqr, SymKind::Wave), Some(1));
        let tri = st.intern("tri");
        assert_eq!(st.name_id(tri, SymKind::Wave), Some(2));
    }

    #[test]
    fn test_label_roundtrip() {
        use slotmap::SlotMap;
        let mut ops: SlotMap<OpKey, ()> = SlotMap::with_key();
        let key = ops.insert(());

        let mut st = SymTab::new();
        let id = st.intern("bass");
        assert_eq!(st.label(id), None);
        st.set_label(id, key);
        assert_eq!(st.label(id), Some(key));
    }
}
