//! GLSL value types and their std140 size/alignment rules.
//!
//! Every type knows three numbers:
//! - `size`: the documented byte size (elements × element size for
//!   vectors and matrices, the padded total for arrays and structs),
//! - `alignment`: the boundary its starting offset must be a multiple of,
//! - `footprint`: the bytes it actually occupies in a std140 buffer,
//!   which differs from `size` only for matrices (each column is padded
//!   like an array element).

use crate::error::Result;
use crate::{bail_construct, bail_struct, bail_type};
use log::debug;
use nom::{
    IResult,
    bytes::complete::tag,
    character::complete::{char, one_of},
    combinator::{all_consuming, map, opt},
    sequence::{preceded, tuple},
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Every array stride and every struct alignment is a multiple of a vec4.
pub const VEC4_ALIGNMENT: usize = 16;

/// Longest array accepted in a declaration.
pub const MAX_ARRAY_LENGTH: usize = 1 << 16;

/// Largest std140 size, in bytes, of any array or struct.
pub const MAX_TYPE_SIZE: usize = 1 << 24;

/// Round `value` up to the next multiple of `multiple`.
pub fn next_multiple(value: usize, multiple: usize) -> usize {
    if multiple == 0 {
        return value;
    }
    match value % multiple {
        0 => value,
        remainder => value - remainder + multiple,
    }
}

/// Bytes needed to move `offset` onto an `alignment` boundary.
pub fn padding_for(offset: usize, alignment: usize) -> usize {
    next_multiple(offset, alignment) - offset
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Int,
    UInt,
    Float,
    Double,
}

impl ScalarKind {
    pub fn size(self) -> usize {
        match self {
            ScalarKind::Double => 8,
            _ => 4,
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<ScalarKind> {
        match keyword {
            "bool" => Some(ScalarKind::Bool),
            "int" => Some(ScalarKind::Int),
            "uint" => Some(ScalarKind::UInt),
            "float" => Some(ScalarKind::Float),
            "double" => Some(ScalarKind::Double),
            _ => None,
        }
    }

    fn from_prefix(prefix: char) -> ScalarKind {
        match prefix {
            'b' => ScalarKind::Bool,
            'i' => ScalarKind::Int,
            'u' => ScalarKind::UInt,
            'd' => ScalarKind::Double,
            _ => ScalarKind::Float,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int => "int",
            ScalarKind::UInt => "uint",
            ScalarKind::Float => "float",
            ScalarKind::Double => "double",
        }
    }

    /// One-letter prefix used by vector and matrix names (`ivec3`, `dmat4`).
    pub fn prefix(self) -> &'static str {
        match self {
            ScalarKind::Bool => "b",
            ScalarKind::Int => "i",
            ScalarKind::UInt => "u",
            ScalarKind::Float => "",
            ScalarKind::Double => "d",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorType {
    pub kind: ScalarKind,
    pub dims: u8,
}

impl VectorType {
    pub fn size(&self) -> usize {
        self.kind.size() * self.dims as usize
    }

    /// 3-vectors align like 4-vectors.
    pub fn alignment(&self) -> usize {
        match self.dims {
            2 => 2 * self.kind.size(),
            _ => 4 * self.kind.size(),
        }
    }
}

/// Column-major matrix: `columns` vectors of `rows` elements each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatrixType {
    pub kind: ScalarKind,
    pub columns: u8,
    pub rows: u8,
}

impl MatrixType {
    pub fn column(&self) -> VectorType {
        VectorType {
            kind: self.kind,
            dims: self.rows,
        }
    }

    /// The array of column vectors this matrix is stored as.
    pub fn column_array(&self) -> ArrayType {
        ArrayType {
            element: Box::new(Type::Vector(self.column())),
            length: self.columns as usize,
        }
    }

    pub fn size(&self) -> usize {
        self.kind.size() * self.rows as usize * self.columns as usize
    }

    pub fn alignment(&self) -> usize {
        self.column_array().alignment()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayType {
    element: Box<Type>,
    length: usize,
}

impl ArrayType {
    pub fn new(element: Type, length: usize) -> Result<ArrayType> {
        if length == 0 {
            bail_construct!("cannot have a zero-length array of {}", element);
        }
        if length > MAX_ARRAY_LENGTH {
            bail_construct!("array {}[{}] is longer than {} elements", element, length, MAX_ARRAY_LENGTH);
        }
        let array = ArrayType {
            element: Box::new(element),
            length,
        };
        match array.stride().checked_mul(length) {
            Some(size) if size <= MAX_TYPE_SIZE => Ok(array),
            _ => bail_construct!("array {}[{}] is larger than {} bytes", array.element, length, MAX_TYPE_SIZE),
        }
    }

    pub fn element(&self) -> &Type {
        &self.element
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn alignment(&self) -> usize {
        next_multiple(self.element.alignment(), VEC4_ALIGNMENT)
    }

    /// Distance between consecutive elements.
    pub fn stride(&self) -> usize {
        next_multiple(self.element.footprint(), self.alignment())
    }

    pub fn size(&self) -> usize {
        self.stride() * self.length
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub ty: Type,
    pub name: String,
}

impl Member {
    pub fn new(ty: Type, name: impl Into<String>) -> Self {
        Member { ty, name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructType {
    name: String,
    members: Vec<Member>,
    alignment: usize,
    size: usize,
}

impl StructType {
    pub fn new(name: impl Into<String>, members: Vec<Member>) -> Result<StructType> {
        let name = name.into();
        for (i, member) in members.iter().enumerate() {
            if members[..i].iter().any(|m| m.name == member.name) {
                bail_struct!("struct {} declares member '{}' twice", name, member.name);
            }
        }

        // Rounded up to a vec4 even when empty, so the rounding below never
        // divides by zero.
        let widest = members.iter().map(|m| m.ty.alignment()).max().unwrap_or(0);
        let alignment = next_multiple(widest, VEC4_ALIGNMENT).max(VEC4_ALIGNMENT);

        let mut offset = 0;
        for member in &members {
            let end = next_multiple(offset, member.ty.alignment()).checked_add(member.ty.footprint());
            match end {
                Some(end) if end <= MAX_TYPE_SIZE => offset = end,
                _ => bail_construct!(
                    "struct {} is larger than {} bytes at member '{}'",
                    name,
                    MAX_TYPE_SIZE,
                    member.name
                ),
            }
        }
        let size = next_multiple(offset, alignment);

        debug!("struct {}: {} members, size {}, alignment {}", name, members.len(), size, alignment);
        Ok(StructType {
            name,
            members,
            alignment,
            size,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// A GLSL value type. Structs are shared with the symbol table that owns them.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Scalar(ScalarKind),
    Vector(VectorType),
    Matrix(MatrixType),
    Array(ArrayType),
    Struct(Arc<StructType>),
}

impl Type {
    pub fn size(&self) -> usize {
        match self {
            Type::Scalar(kind) => kind.size(),
            Type::Vector(v) => v.size(),
            Type::Matrix(m) => m.size(),
            Type::Array(a) => a.size(),
            Type::Struct(s) => s.size(),
        }
    }

    pub fn alignment(&self) -> usize {
        match self {
            Type::Scalar(kind) => kind.size(),
            Type::Vector(v) => v.alignment(),
            Type::Matrix(m) => m.alignment(),
            Type::Array(a) => a.alignment(),
            Type::Struct(s) => s.alignment(),
        }
    }

    pub fn footprint(&self) -> usize {
        match self {
            Type::Matrix(m) => m.column_array().size(),
            other => other.size(),
        }
    }

    pub fn array(self, length: usize) -> Result<Type> {
        Ok(Type::Array(ArrayType::new(self, length)?))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Scalar(kind) => write!(f, "{}", kind.keyword()),
            Type::Vector(v) => write!(f, "{}vec{}", v.kind.prefix(), v.dims),
            Type::Matrix(m) if m.columns == m.rows => write!(f, "{}mat{}", m.kind.prefix(), m.columns),
            Type::Matrix(m) => write!(f, "{}mat{}x{}", m.kind.prefix(), m.columns, m.rows),
            Type::Array(a) => write!(f, "{}[{}]", a.element, a.length),
            Type::Struct(s) => write!(f, "{}", s.name),
        }
    }
}

/// Structs declared so far, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    structs: HashMap<String, Arc<StructType>>,
    order: Vec<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fully parsed struct. Entries are never replaced: an
    /// identical re-declaration returns the registered entry, a different
    /// body under the same name is an error.
    pub fn insert(&mut self, ty: StructType) -> Result<Arc<StructType>> {
        if let Some(existing) = self.structs.get(ty.name()) {
            if **existing == ty {
                return Ok(Arc::clone(existing));
            }
            bail_struct!("struct {} is already defined with different members", ty.name());
        }
        let name = ty.name().to_string();
        let ty = Arc::new(ty);
        self.structs.insert(name.clone(), Arc::clone(&ty));
        self.order.push(name);
        Ok(ty)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<StructType>> {
        self.structs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.structs.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<StructType>> {
        self.order.iter().filter_map(|name| self.structs.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// Specifier grammar: [biufd]?vec[2-4] and [biufd]?mat([2-4]x[2-4]|[2-4])

fn scalar_prefix(input: &str) -> IResult<&str, ScalarKind> {
    map(opt(one_of("biufd")), |prefix| {
        prefix.map_or(ScalarKind::Float, ScalarKind::from_prefix)
    })(input)
}

fn dimension(input: &str) -> IResult<&str, u8> {
    map(one_of("234"), |digit| digit as u8 - b'0')(input)
}

fn vector_spec(input: &str) -> IResult<&str, VectorType> {
    map(tuple((scalar_prefix, tag("vec"), dimension)), |(kind, _, dims)| {
        VectorType { kind, dims }
    })(input)
}

fn matrix_spec(input: &str) -> IResult<&str, MatrixType> {
    map(
        tuple((scalar_prefix, tag("mat"), dimension, opt(preceded(char('x'), dimension)))),
        |(kind, _, columns, rows)| MatrixType {
            kind,
            columns,
            rows: rows.unwrap_or(columns),
        },
    )(input)
}

fn is_sampler(spec: &str) -> bool {
    ["sampler", "isampler", "usampler"]
        .iter()
        .any(|prefix| spec.strip_prefix(prefix).is_some_and(|rest| !rest.is_empty()))
}

/// Resolve a type specifier against the builtin grammar and the structs seen so far.
pub fn resolve_type(spec: &str, symbols: &SymbolTable) -> Result<Type> {
    if let Some(kind) = ScalarKind::from_keyword(spec) {
        return Ok(Type::Scalar(kind));
    }
    if let Ok((_, vector)) = all_consuming(vector_spec)(spec) {
        return Ok(Type::Vector(vector));
    }
    if let Ok((_, matrix)) = all_consuming(matrix_spec)(spec) {
        return Ok(Type::Matrix(matrix));
    }
    // Samplers are bound by texture unit.
    if is_sampler(spec) {
        return Ok(Type::Scalar(ScalarKind::Int));
    }
    if let Some(ty) = symbols.get(spec) {
        return Ok(Type::Struct(Arc::clone(ty)));
    }
    bail_type!("unknown type '{}'", spec)
}
