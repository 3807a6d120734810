//! Backend-neutral description of the code to emit.
//!
//! Code generation fills these items from parsed structs, their layouts
//! and the uniform declarations; a backend only decides how to spell them.

use crate::layout::AccessPath;
use crate::types::{ScalarKind, Type};

/// A value type as the host sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostType {
    Scalar(ScalarKind),
    Vector { kind: ScalarKind, dims: u8 },
    /// Column-major: `columns` arrays of `rows` elements.
    Matrix { kind: ScalarKind, columns: u8, rows: u8 },
    Array(Box<HostType>, usize),
    /// A generated struct.
    Named(String),
}

impl HostType {
    pub fn from_type(ty: &Type) -> Self {
        match ty {
            Type::Scalar(kind) => HostType::Scalar(*kind),
            Type::Vector(v) => HostType::Vector {
                kind: v.kind,
                dims: v.dims,
            },
            Type::Matrix(m) => HostType::Matrix {
                kind: m.kind,
                columns: m.columns,
                rows: m.rows,
            },
            Type::Array(a) => HostType::Array(Box::new(HostType::from_type(a.element())), a.length()),
            Type::Struct(s) => HostType::Named(s.name().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SerializeOp {
    Pad(usize),
    Write(AccessPath),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldItem {
    pub name: String,
    pub ty: HostType,
}

/// A host struct plus its std140 serializer.
#[derive(Debug, Clone, PartialEq)]
pub struct StructItem {
    pub name: String,
    pub fields: Vec<FieldItem>,
    pub size: usize,
    pub alignment: usize,
    pub body: Vec<SerializeOp>,
}

/// How a value reaches the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// One `set_uniform` call with the value itself.
    Direct,
    /// Field by field through the struct setter of the named struct.
    Fields(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetterKind {
    Single,
    /// One element of an array uniform, bounds-checked against `length`.
    Indexed { length: usize },
    /// All elements of an array uniform; the slice must hold exactly `length`.
    Bulk { length: usize },
    /// A uniform block uploaded as its std140 bytes.
    Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetterItem {
    pub method: String,
    /// Name the uniform has in the shader.
    pub uniform: String,
    /// Element type for array setters.
    pub ty: HostType,
    pub kind: SetterKind,
    pub route: Route,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSetter {
    pub name: String,
    pub ty: HostType,
    pub array_length: Option<usize>,
    pub route: Route,
}

/// Private setter that forwards every field of a struct under
/// `name.field` / `name.field[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct StructSetterItem {
    pub method: String,
    pub struct_name: String,
    pub fields: Vec<FieldSetter>,
}

/// Setter bindings for one shader stage.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingItem {
    pub name: String,
    pub setters: Vec<SetterItem>,
    pub struct_setters: Vec<StructSetterItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Struct(StructItem),
    Bindings(BindingItem),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub items: Vec<Item>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: Item) {
        self.items.push(item);
    }

    pub fn extend(&mut self, other: Module) {
        self.items.extend(other.items);
    }

    pub fn structs(&self) -> impl Iterator<Item = &StructItem> {
        self.items.iter().filter_map(|item| match item {
            Item::Struct(s) => Some(s),
            Item::Bindings(_) => None,
        })
    }

    pub fn bindings(&self) -> impl Iterator<Item = &BindingItem> {
        self.items.iter().filter_map(|item| match item {
            Item::Bindings(b) => Some(b),
            Item::Struct(_) => None,
        })
    }
}
