//! Compile-time constant evaluation.

pub mod folder;
pub mod value;

pub use folder::{Folded, Folder, NotConstant};
pub use value::Value;
