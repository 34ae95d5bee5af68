//! Arena-backed scope chain used by the type checker.
//!
//! Scopes are dense records addressed by integer ids; each record stores its
//! parent id instead of a live reference, so the chain has no ownership
//! cycles and snapshots cheaply.

use std::num::NonZeroU32;

use ahash::AHashMap;

use crate::check::types::Type;
use crate::lang::ast::Mutability;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(NonZeroU32);

impl ScopeId {
    fn from_index(index: usize) -> Self {
        let raw = NonZeroU32::new((index as u32) + 1).expect("scope index overflow");
        Self(raw)
    }

    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub ty: Type,
    pub mutability: Mutability,
}

#[derive(Debug, Default)]
struct ScopeRecord {
    parent: Option<ScopeId>,
    bindings: AHashMap<String, Binding>,
}

#[derive(Debug, Default)]
pub struct ScopeArena {
    records: Vec<ScopeRecord>,
}

impl ScopeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a root scope with no parent.
    pub fn push_root(&mut self) -> ScopeId {
        self.push(None)
    }

    /// Opens a scope nested inside `parent`.
    pub fn push_child(&mut self, parent: ScopeId) -> ScopeId {
        self.push(Some(parent))
    }

    fn push(&mut self, parent: Option<ScopeId>) -> ScopeId {
        self.records.push(ScopeRecord {
            parent,
            bindings: AHashMap::new(),
        });
        ScopeId::from_index(self.records.len() - 1)
    }

    /// Defines `name` in `scope`. Returns false when the scope already
    /// defines the name directly (shadowing an outer scope is fine).
    pub fn define(&mut self, scope: ScopeId, name: impl Into<String>, binding: Binding) -> bool {
        let record = &mut self.records[scope.index()];
        let name = name.into();
        if record.bindings.contains_key(&name) {
            return false;
        }
        record.bindings.insert(name, binding);
        true
    }

    /// Resolves `name` by walking outward to the nearest scope defining it.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<&Binding> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let record = &self.records[id.index()];
            if let Some(binding) = record.bindings.get(name) {
                return Some(binding);
            }
            current = record.parent;
        }
        None
    }
}
