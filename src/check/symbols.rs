//! Global symbol table: function signatures and CSR definitions.
//!
//! Built once per architecture configuration before checking begins and
//! read-only while any checking runs, so concurrent compilations can share
//! one table without locking.

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::arch::{Architecture, CsrDef};
use crate::check::types::Type;

/// A callable signature. `min_args` allows trailing optional parameters
/// (used by the `implemented` built-in's version argument).
#[derive(Debug, Clone)]
pub struct FunctionSig {
    pub name: String,
    pub params: SmallVec<[Type; 4]>,
    pub min_args: usize,
    pub ret: Type,
}

impl FunctionSig {
    pub fn new(name: impl Into<String>, params: Vec<Type>, ret: Type) -> Self {
        let params: SmallVec<[Type; 4]> = params.into();
        Self {
            name: name.into(),
            min_args: params.len(),
            params,
            ret,
        }
    }

    pub fn with_optional(mut self, optional: usize) -> Self {
        self.min_args = self.params.len().saturating_sub(optional);
        self
    }
}

/// Name of the extension-presence built-in.
pub const IMPLEMENTED: &str = "implemented";

#[derive(Debug, Default)]
pub struct SymbolTable {
    functions: AHashMap<String, FunctionSig>,
    csrs: AHashMap<String, CsrDef>,
}

impl SymbolTable {
    /// Seeds the table with the built-ins and the architecture's CSRs.
    pub fn for_architecture(arch: &dyn Architecture) -> Self {
        let mut table = Self::default();
        table.insert_function(
            FunctionSig::new(IMPLEMENTED, vec![Type::Str, Type::Str], Type::Boolean)
                .with_optional(1),
        );
        for csr in arch.csrs() {
            table.csrs.insert(csr.name.clone(), csr.clone());
        }
        table
    }

    pub fn insert_function(&mut self, sig: FunctionSig) -> bool {
        if self.functions.contains_key(&sig.name) {
            return false;
        }
        self.functions.insert(sig.name.clone(), sig);
        true
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSig> {
        self.functions.get(name)
    }

    pub fn csr(&self, name: &str) -> Option<&CsrDef> {
        self.csrs.get(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len() + self.csrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.csrs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::StaticArchitecture;
    use crate::check::types::Width;

    #[test]
    fn seeds_builtins_and_csrs() {
        let mut arch = StaticArchitecture::baseline();
        arch.csrs.push(CsrDef {
            name: "mstatus".to_string(),
            width: Width::Xlen,
            requires: None,
        });
        let table = SymbolTable::for_architecture(&arch);
        let implemented = table.function(IMPLEMENTED).expect("builtin");
        assert_eq!(implemented.params.len(), 2);
        assert_eq!(implemented.min_args, 1);
        assert_eq!(implemented.ret, Type::Boolean);
        assert!(table.csr("mstatus").is_some());
        assert!(table.csr("sstatus").is_none());
    }

    #[test]
    fn duplicate_function_names_are_rejected() {
        let arch = StaticArchitecture::baseline();
        let mut table = SymbolTable::for_architecture(&arch);
        assert!(table.insert_function(FunctionSig::new("f", vec![], Type::Void)));
        assert!(!table.insert_function(FunctionSig::new("f", vec![], Type::Void)));
    }
}
