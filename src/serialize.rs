//! Round-trippable structured form of the AST.
//!
//! The tree flattens into a pre-order sequence of [`NodeRecord`]s addressed
//! by dense ids, rendered as JSON. Deserializing and re-serializing the
//! output is byte-identical; the source path and raw lexemes are the only
//! intentionally excluded inputs. A SHA-256 digest of the canonical form
//! lets external tooling key caches by content.

use std::path::PathBuf;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::check::types::Type;
use crate::diagnostic::{SourcePosition, SourceSpan};
use crate::error::OdlError;
use crate::lang::ast::{Ast, AstNode, BinaryOp, Mutability, NodeKind, TypeSpec, UnaryOp};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SerializeOptions: u8 {
        /// Emit each node's resolved type.
        const INCLUDE_TYPES = 1 << 0;
        /// Emit each node's source position.
        const INCLUDE_POSITIONS = 1 << 1;
    }
}

impl Default for SerializeOptions {
    fn default() -> Self {
        SerializeOptions::all()
    }
}

/// Path attached to nodes rebuilt from the serialized form.
const RECONSTRUCTED_PATH: &str = "<serialized>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePosition {
    pub line: usize,
    pub column: usize,
}

/// The source-level shape of a type annotation. `Bits`/`Signed` widths are
/// child nodes of the record that carries the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeForm {
    XReg,
    Boolean,
    Str,
    Void,
    Bits,
    Signed,
}

impl TypeForm {
    fn of(spec: &TypeSpec) -> Self {
        match spec {
            TypeSpec::XReg => TypeForm::XReg,
            TypeSpec::Boolean => TypeForm::Boolean,
            TypeSpec::Str => TypeForm::Str,
            TypeSpec::Void => TypeForm::Void,
            TypeSpec::Bits(_) => TypeForm::Bits,
            TypeSpec::Signed(_) => TypeForm::Signed,
        }
    }

    fn has_width(self) -> bool {
        matches!(self, TypeForm::Bits | TypeForm::Signed)
    }
}

/// One node, minus its children, which are referenced by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum RecordKind {
    Literal {
        value: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<u16>,
    },
    String {
        value: String,
    },
    Bool {
        value: bool,
    },
    Identifier {
        name: String,
    },
    Binary {
        op: BinaryOp,
    },
    Unary {
        op: UnaryOp,
    },
    Ternary,
    Cast {
        form: TypeForm,
    },
    Call {
        callee: String,
    },
    Index,
    Slice,
    Csr {
        name: String,
    },
    Decl {
        name: String,
        mutability: Mutability,
        form: TypeForm,
        has_array_len: bool,
        has_init: bool,
    },
    Assign,
    If {
        has_else: bool,
    },
    Block,
    For,
    While,
    Return {
        has_value: bool,
    },
    Param {
        name: String,
        form: TypeForm,
    },
    Function {
        name: String,
        param_count: u32,
        ret: TypeForm,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u32,
    #[serde(flatten)]
    pub kind: RecordKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<Type>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<NodePosition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedAst {
    pub version: u32,
    pub roots: Vec<u32>,
    pub records: Vec<NodeRecord>,
}

impl SerializedAst {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("serializable records")
    }

    pub fn from_json(source: &str) -> Result<Self, OdlError> {
        serde_json::from_str(source)
            .map_err(|err| OdlError::Configuration(format!("malformed serialized AST: {err}")))
    }

    /// Hex SHA-256 of the canonical JSON form.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_json().as_bytes());
        let bytes = hasher.finalize();
        bytes.iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

/// Flattens an AST into the serialized form.
pub fn serialize(ast: &Ast, options: SerializeOptions) -> SerializedAst {
    let mut writer = Writer {
        options,
        records: Vec::new(),
    };
    let roots = ast.items.iter().map(|item| writer.emit(item)).collect();
    SerializedAst {
        version: 1,
        roots,
        records: writer.records,
    }
}

/// Rebuilds an AST from its serialized form.
pub fn reconstruct(serialized: &SerializedAst) -> Result<Ast, OdlError> {
    let reader = Reader {
        records: &serialized.records,
    };
    let mut items = Vec::with_capacity(serialized.roots.len());
    for &root in &serialized.roots {
        items.push(reader.node(root)?);
    }
    Ok(Ast::new(PathBuf::from(RECONSTRUCTED_PATH), items))
}

struct Writer {
    options: SerializeOptions,
    records: Vec<NodeRecord>,
}

impl Writer {
    /// Emits `node` and its subtree, returning the node's id. Records land
    /// in pre-order.
    fn emit(&mut self, node: &AstNode) -> u32 {
        let id = self.records.len() as u32;
        let kind = self.record_kind(node);
        let ty = if self.options.contains(SerializeOptions::INCLUDE_TYPES) && !node.ty.is_unknown()
        {
            Some(node.ty.clone())
        } else {
            None
        };
        let pos = if self.options.contains(SerializeOptions::INCLUDE_POSITIONS) {
            Some(NodePosition {
                line: node.span.start.line,
                column: node.span.start.column,
            })
        } else {
            None
        };
        self.records.push(NodeRecord {
            id,
            kind,
            ty,
            pos,
            children: Vec::new(),
        });
        let children = self.emit_children(node);
        self.records[id as usize].children = children;
        id
    }

    fn emit_children(&mut self, node: &AstNode) -> Vec<u32> {
        let mut children = Vec::new();
        let spec_width = |writer: &mut Self, spec: &TypeSpec, out: &mut Vec<u32>| {
            if let Some(width) = spec.width_expr() {
                out.push(writer.emit(width));
            }
        };
        match &node.kind {
            NodeKind::Literal { .. }
            | NodeKind::StringLit { .. }
            | NodeKind::BoolLit { .. }
            | NodeKind::Identifier { .. }
            | NodeKind::CsrRef { .. } => {}
            NodeKind::Binary { lhs, rhs, .. } => {
                children.push(self.emit(lhs));
                children.push(self.emit(rhs));
            }
            NodeKind::Unary { operand, .. } => children.push(self.emit(operand)),
            NodeKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                children.push(self.emit(cond));
                children.push(self.emit(then_expr));
                children.push(self.emit(else_expr));
            }
            NodeKind::Cast { spec, operand } => {
                spec_width(self, spec, &mut children);
                children.push(self.emit(operand));
            }
            NodeKind::Call { args, .. } => {
                for arg in args {
                    children.push(self.emit(arg));
                }
            }
            NodeKind::Index { base, index } => {
                children.push(self.emit(base));
                children.push(self.emit(index));
            }
            NodeKind::Slice { base, high, low } => {
                children.push(self.emit(base));
                children.push(self.emit(high));
                children.push(self.emit(low));
            }
            NodeKind::Decl {
                spec,
                array_len,
                init,
                ..
            } => {
                spec_width(self, spec, &mut children);
                if let Some(len) = array_len {
                    children.push(self.emit(len));
                }
                if let Some(init) = init {
                    children.push(self.emit(init));
                }
            }
            NodeKind::Assign { target, value } => {
                children.push(self.emit(target));
                children.push(self.emit(value));
            }
            NodeKind::If {
                cond,
                then_block,
                else_block,
            } => {
                children.push(self.emit(cond));
                children.push(self.emit(then_block));
                if let Some(else_block) = else_block {
                    children.push(self.emit(else_block));
                }
            }
            NodeKind::Block { statements } => {
                for statement in statements {
                    children.push(self.emit(statement));
                }
            }
            NodeKind::For {
                init,
                cond,
                step,
                body,
            } => {
                children.push(self.emit(init));
                children.push(self.emit(cond));
                children.push(self.emit(step));
                children.push(self.emit(body));
            }
            NodeKind::While { cond, body } => {
                children.push(self.emit(cond));
                children.push(self.emit(body));
            }
            NodeKind::Return { value } => {
                if let Some(value) = value {
                    children.push(self.emit(value));
                }
            }
            NodeKind::Param { spec, .. } => spec_width(self, spec, &mut children),
            NodeKind::Function {
                params, ret, body, ..
            } => {
                for param in params {
                    children.push(self.emit(param));
                }
                spec_width(self, ret, &mut children);
                children.push(self.emit(body));
            }
        }
        children
    }

    fn record_kind(&self, node: &AstNode) -> RecordKind {
        match &node.kind {
            NodeKind::Literal {
                value,
                declared_width,
            } => RecordKind::Literal {
                value: *value,
                width: *declared_width,
            },
            NodeKind::StringLit { value } => RecordKind::String {
                value: value.clone(),
            },
            NodeKind::BoolLit { value } => RecordKind::Bool { value: *value },
            NodeKind::Identifier { name } => RecordKind::Identifier { name: name.clone() },
            NodeKind::Binary { op, .. } => RecordKind::Binary { op: *op },
            NodeKind::Unary { op, .. } => RecordKind::Unary { op: *op },
            NodeKind::Ternary { .. } => RecordKind::Ternary,
            NodeKind::Cast { spec, .. } => RecordKind::Cast {
                form: TypeForm::of(spec),
            },
            NodeKind::Call { callee, .. } => RecordKind::Call {
                callee: callee.clone(),
            },
            NodeKind::Index { .. } => RecordKind::Index,
            NodeKind::Slice { .. } => RecordKind::Slice,
            NodeKind::CsrRef { name } => RecordKind::Csr { name: name.clone() },
            NodeKind::Decl {
                name,
                spec,
                mutability,
                array_len,
                init,
            } => RecordKind::Decl {
                name: name.clone(),
                mutability: *mutability,
                form: TypeForm::of(spec),
                has_array_len: array_len.is_some(),
                has_init: init.is_some(),
            },
            NodeKind::Assign { .. } => RecordKind::Assign,
            NodeKind::If { else_block, .. } => RecordKind::If {
                has_else: else_block.is_some(),
            },
            NodeKind::Block { .. } => RecordKind::Block,
            NodeKind::For { .. } => RecordKind::For,
            NodeKind::While { .. } => RecordKind::While,
            NodeKind::Return { value } => RecordKind::Return {
                has_value: value.is_some(),
            },
            NodeKind::Param { name, spec } => RecordKind::Param {
                name: name.clone(),
                form: TypeForm::of(spec),
            },
            NodeKind::Function {
                name, params, ret, ..
            } => RecordKind::Function {
                name: name.clone(),
                param_count: params.len() as u32,
                ret: TypeForm::of(ret),
            },
        }
    }
}

struct Reader<'a> {
    records: &'a [NodeRecord],
}

impl<'a> Reader<'a> {
    fn node(&self, id: u32) -> Result<AstNode, OdlError> {
        let record = self
            .records
            .get(id as usize)
            .ok_or_else(|| malformed(format!("node id {id} is out of range")))?;
        let children = &record.children;
        let kind = match &record.kind {
            RecordKind::Literal { value, width } => NodeKind::Literal {
                value: *value,
                declared_width: *width,
            },
            RecordKind::String { value } => NodeKind::StringLit {
                value: value.clone(),
            },
            RecordKind::Bool { value } => NodeKind::BoolLit { value: *value },
            RecordKind::Identifier { name } => NodeKind::Identifier { name: name.clone() },
            RecordKind::Binary { op } => NodeKind::Binary {
                op: *op,
                lhs: self.boxed(record, 0)?,
                rhs: self.boxed(record, 1)?,
            },
            RecordKind::Unary { op } => NodeKind::Unary {
                op: *op,
                operand: self.boxed(record, 0)?,
            },
            RecordKind::Ternary => NodeKind::Ternary {
                cond: self.boxed(record, 0)?,
                then_expr: self.boxed(record, 1)?,
                else_expr: self.boxed(record, 2)?,
            },
            RecordKind::Cast { form } => {
                let (spec, consumed) = self.type_spec(record, *form, 0)?;
                NodeKind::Cast {
                    spec,
                    operand: self.boxed(record, consumed)?,
                }
            }
            RecordKind::Call { callee } => {
                let mut args = Vec::with_capacity(children.len());
                for index in 0..children.len() {
                    args.push(self.child(record, index)?);
                }
                NodeKind::Call {
                    callee: callee.clone(),
                    args,
                }
            }
            RecordKind::Index => NodeKind::Index {
                base: self.boxed(record, 0)?,
                index: self.boxed(record, 1)?,
            },
            RecordKind::Slice => NodeKind::Slice {
                base: self.boxed(record, 0)?,
                high: self.boxed(record, 1)?,
                low: self.boxed(record, 2)?,
            },
            RecordKind::Csr { name } => NodeKind::CsrRef { name: name.clone() },
            RecordKind::Decl {
                name,
                mutability,
                form,
                has_array_len,
                has_init,
            } => {
                let (spec, mut cursor) = self.type_spec(record, *form, 0)?;
                let array_len = if *has_array_len {
                    let len = self.boxed(record, cursor)?;
                    cursor += 1;
                    Some(len)
                } else {
                    None
                };
                let init = if *has_init {
                    Some(self.boxed(record, cursor)?)
                } else {
                    None
                };
                NodeKind::Decl {
                    name: name.clone(),
                    spec,
                    mutability: *mutability,
                    array_len,
                    init,
                }
            }
            RecordKind::Assign => NodeKind::Assign {
                target: self.boxed(record, 0)?,
                value: self.boxed(record, 1)?,
            },
            RecordKind::If { has_else } => NodeKind::If {
                cond: self.boxed(record, 0)?,
                then_block: self.boxed(record, 1)?,
                else_block: if *has_else {
                    Some(self.boxed(record, 2)?)
                } else {
                    None
                },
            },
            RecordKind::Block => {
                let mut statements = Vec::with_capacity(children.len());
                for index in 0..children.len() {
                    statements.push(self.child(record, index)?);
                }
                NodeKind::Block { statements }
            }
            RecordKind::For => NodeKind::For {
                init: self.boxed(record, 0)?,
                cond: self.boxed(record, 1)?,
                step: self.boxed(record, 2)?,
                body: self.boxed(record, 3)?,
            },
            RecordKind::While => NodeKind::While {
                cond: self.boxed(record, 0)?,
                body: self.boxed(record, 1)?,
            },
            RecordKind::Return { has_value } => NodeKind::Return {
                value: if *has_value {
                    Some(self.boxed(record, 0)?)
                } else {
                    None
                },
            },
            RecordKind::Param { name, form } => {
                let (spec, _) = self.type_spec(record, *form, 0)?;
                NodeKind::Param {
                    name: name.clone(),
                    spec,
                }
            }
            RecordKind::Function {
                name,
                param_count,
                ret,
            } => {
                let param_count = *param_count as usize;
                let mut params = Vec::with_capacity(param_count);
                for index in 0..param_count {
                    params.push(self.child(record, index)?);
                }
                let (ret_spec, cursor) = self.type_spec(record, *ret, param_count)?;
                NodeKind::Function {
                    name: name.clone(),
                    params,
                    ret: ret_spec,
                    body: self.boxed(record, cursor)?,
                }
            }
        };
        let position = record.pos.unwrap_or(NodePosition { line: 0, column: 0 });
        let span = SourceSpan::point(
            PathBuf::from(RECONSTRUCTED_PATH),
            SourcePosition::new(position.line, position.column),
        );
        let mut node = AstNode::new(kind, span);
        if let Some(ty) = &record.ty {
            node.ty = ty.clone();
        }
        Ok(node)
    }

    /// Reads a type annotation starting at child `cursor`; returns the spec
    /// and the next unread child index.
    fn type_spec(
        &self,
        record: &NodeRecord,
        form: TypeForm,
        cursor: usize,
    ) -> Result<(TypeSpec, usize), OdlError> {
        if form.has_width() {
            let width = self.boxed(record, cursor)?;
            let spec = match form {
                TypeForm::Bits => TypeSpec::Bits(width),
                _ => TypeSpec::Signed(width),
            };
            Ok((spec, cursor + 1))
        } else {
            let spec = match form {
                TypeForm::XReg => TypeSpec::XReg,
                TypeForm::Boolean => TypeSpec::Boolean,
                TypeForm::Str => TypeSpec::Str,
                _ => TypeSpec::Void,
            };
            Ok((spec, cursor))
        }
    }

    fn child(&self, record: &NodeRecord, index: usize) -> Result<AstNode, OdlError> {
        let id = record.children.get(index).copied().ok_or_else(|| {
            malformed(format!(
                "node {} is missing child {index}",
                record.id
            ))
        })?;
        // Pre-order ids only ever reference forward; anything else would
        // let a malformed input recurse without bound.
        if id <= record.id {
            return Err(malformed(format!(
                "node {} references non-forward child {id}",
                record.id
            )));
        }
        self.node(id)
    }

    fn boxed(&self, record: &NodeRecord, index: usize) -> Result<Box<AstNode>, OdlError> {
        self.child(record, index).map(Box::new)
    }
}

fn malformed(message: String) -> OdlError {
    OdlError::Configuration(format!("malformed serialized AST: {message}"))
}
