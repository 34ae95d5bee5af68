//! Read-only architecture model the compiler consumes.
//!
//! The checker and evaluator thread a shared [`Architecture`] reference
//! through every pass; nothing in the compiler mutates it, so a single
//! instance is safely shared across concurrent compilations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::check::types::Width;
use crate::error::OdlError;

/// Provider of extension-presence predicates, parameter values, and register
/// definitions. Implementations must be fully materialized before any
/// compilation begins.
pub trait Architecture: Send + Sync {
    /// Whether an extension is enabled, optionally at least at `version`
    /// ("major.minor" ordering).
    fn extension_present(&self, name: &str, version: Option<&str>) -> bool;

    fn parameter(&self, name: &str) -> Option<&ParamSpec>;

    fn register_file(&self, name: &str) -> Option<&RegisterFile>;

    fn csr(&self, name: &str) -> Option<&CsrDef>;

    /// All CSR definitions; used to seed the global symbol table.
    fn csrs(&self) -> &[CsrDef];

    /// The width of one element of a register file, resolved against an
    /// effective XLEN when the file is XLEN-wide and one was supplied.
    fn register_width(&self, file: &str, effective_xlen: Option<u32>) -> Option<Width> {
        self.register_file(file)
            .map(|def| def.width.resolve(effective_xlen))
    }

    fn register_exists(&self, file: &str, index: u64) -> bool {
        self.register_file(file)
            .map(|def| index < def.count as u64)
            .unwrap_or(false)
    }
}

/// An architecture parameter: a declared shape plus an optional value. A
/// parameter without a value is declared but unresolved, and constant
/// evaluation over it yields a not-constant outcome rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParamSpec {
    Int {
        width: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<u64>,
    },
    Bool {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<bool>,
    },
    Str {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
}

impl ParamSpec {
    pub fn is_resolved(&self) -> bool {
        match self {
            ParamSpec::Int { value, .. } => value.is_some(),
            ParamSpec::Bool { value } => value.is_some(),
            ParamSpec::Str { value } => value.is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// An indexed register file such as the integer registers `X[0..31]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterFile {
    pub name: String,
    pub count: u32,
    pub width: Width,
}

/// A named control/status register, optionally gated on an extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrDef {
    pub name: String,
    pub width: Width,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<ExtensionDef>,
}

/// A fully precomputed architecture configuration, deserializable from a
/// JSON document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticArchitecture {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xlen: Option<u32>,
    #[serde(default)]
    pub extensions: Vec<ExtensionDef>,
    #[serde(default)]
    pub parameters: HashMap<String, ParamSpec>,
    #[serde(default)]
    pub register_files: Vec<RegisterFile>,
    #[serde(default)]
    pub csrs: Vec<CsrDef>,
}

impl StaticArchitecture {
    pub fn from_json(source: &str) -> Result<Self, OdlError> {
        serde_json::from_str(source)
            .map_err(|err| OdlError::Configuration(format!("invalid architecture config: {err}")))
    }

    /// An RV-style baseline with 32 XLEN-wide `X` registers, handy for tests
    /// and the `eval` command.
    pub fn baseline() -> Self {
        Self {
            xlen: None,
            extensions: vec![ExtensionDef {
                name: "I".to_string(),
                version: Some("2.1".to_string()),
            }],
            parameters: HashMap::new(),
            register_files: vec![RegisterFile {
                name: "X".to_string(),
                count: 32,
                width: Width::Xlen,
            }],
            csrs: Vec::new(),
        }
    }
}

impl Architecture for StaticArchitecture {
    fn extension_present(&self, name: &str, version: Option<&str>) -> bool {
        self.extensions.iter().any(|ext| {
            if ext.name != name {
                return false;
            }
            match version {
                None => true,
                Some(wanted) => match &ext.version {
                    Some(have) => version_at_least(have, wanted),
                    // An extension with no recorded version cannot satisfy a
                    // versioned requirement.
                    None => false,
                },
            }
        })
    }

    fn parameter(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.get(name)
    }

    fn register_file(&self, name: &str) -> Option<&RegisterFile> {
        self.register_files.iter().find(|file| file.name == name)
    }

    fn csr(&self, name: &str) -> Option<&CsrDef> {
        self.csrs.iter().find(|csr| csr.name == name)
    }

    fn csrs(&self) -> &[CsrDef] {
        &self.csrs
    }
}

/// Compares "major.minor[.patch]" strings numerically, component by
/// component; missing components count as zero.
fn version_at_least(have: &str, wanted: &str) -> bool {
    let parse = |version: &str| -> Vec<u32> {
        version
            .split('.')
            .map(|part| part.parse::<u32>().unwrap_or(0))
            .collect()
    };
    let have = parse(have);
    let wanted = parse(wanted);
    let len = have.len().max(wanted.len());
    for idx in 0..len {
        let h = have.get(idx).copied().unwrap_or(0);
        let w = wanted.get(idx).copied().unwrap_or(0);
        if h != w {
            return h > w;
        }
    }
    true
}
