//! Type environment and the checking pass.

pub mod checker;
pub mod scope;
pub mod symbols;
pub mod types;

pub use checker::{CheckOptions, Checker};
pub use scope::{Binding, ScopeArena, ScopeId};
pub use symbols::{FunctionSig, SymbolTable};
pub use types::{Type, Width};
