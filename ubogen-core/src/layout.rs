//! std140 layout engine.
//!
//! Walks a type with a running byte offset and records, in order, the
//! padding to emit and the leaf values to serialize. Replaying the steps
//! against an empty buffer reproduces the std140 byte image of the value.
//! Matrices are walked as their array of column vectors, so every leaf is a
//! scalar or a vector.

use crate::types::{ArrayType, StructType, Type, VEC4_ALIGNMENT, padding_for};
use log::debug;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

/// The expression a serializer uses to reach a value, e.g. `val.items[3].x`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessPath {
    pub root: String,
    pub segments: Vec<PathSegment>,
}

impl AccessPath {
    pub fn new(root: impl Into<String>) -> Self {
        AccessPath {
            root: root.into(),
            segments: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Self {
        self.with(PathSegment::Field(name.to_string()))
    }

    pub fn index(&self, index: usize) -> Self {
        self.with(PathSegment::Index(index))
    }

    fn with(&self, segment: PathSegment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        AccessPath {
            root: self.root.clone(),
            segments,
        }
    }
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for segment in &self.segments {
            match segment {
                PathSegment::Field(name) => write!(f, ".{}", name)?,
                PathSegment::Index(i) => write!(f, "[{}]", i)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutStep {
    /// Append this many zero bytes.
    Pad(usize),
    /// Append the std140 bytes of the scalar or vector at `path`.
    Serialize {
        path: AccessPath,
        ty: Type,
        offset: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub size: usize,
    pub steps: Vec<LayoutStep>,
}

impl Layout {
    /// Serialized leaves with their byte offsets, in buffer order.
    pub fn leaves(&self) -> impl Iterator<Item = (&AccessPath, &Type, usize)> {
        self.steps.iter().filter_map(|step| match step {
            LayoutStep::Serialize { path, ty, offset } => Some((path, ty, *offset)),
            LayoutStep::Pad(_) => None,
        })
    }

    pub fn padding(&self) -> usize {
        self.steps
            .iter()
            .map(|step| match step {
                LayoutStep::Pad(n) => *n,
                LayoutStep::Serialize { .. } => 0,
            })
            .sum()
    }
}

struct LayoutBuilder {
    offset: usize,
    steps: Vec<LayoutStep>,
}

impl LayoutBuilder {
    fn new() -> Self {
        LayoutBuilder {
            offset: 0,
            steps: Vec::new(),
        }
    }

    fn align_to(&mut self, alignment: usize) {
        let padding = padding_for(self.offset, alignment);
        if padding > 0 {
            self.steps.push(LayoutStep::Pad(padding));
            self.offset += padding;
        }
    }

    fn place(&mut self, ty: &Type, path: AccessPath) {
        match ty {
            Type::Scalar(_) | Type::Vector(_) => {
                self.align_to(ty.alignment());
                self.steps.push(LayoutStep::Serialize {
                    path,
                    ty: ty.clone(),
                    offset: self.offset,
                });
                self.offset += ty.size();
            }
            Type::Matrix(matrix) => self.place_array(&matrix.column_array(), path),
            Type::Array(array) => self.place_array(array, path),
            Type::Struct(st) => self.place_struct(st, path),
        }
    }

    fn place_array(&mut self, array: &ArrayType, path: AccessPath) {
        self.align_to(array.alignment());
        for i in 0..array.length() {
            self.place(array.element(), path.index(i));
            self.align_to(VEC4_ALIGNMENT);
        }
    }

    fn place_struct(&mut self, st: &StructType, path: AccessPath) {
        self.align_to(st.alignment());
        for member in st.members() {
            self.place(&member.ty, path.field(&member.name));
        }
        self.align_to(st.alignment());
    }

    fn finish(self) -> Layout {
        Layout {
            size: self.offset,
            steps: self.steps,
        }
    }
}

/// Lay out a value of `ty` reached through `path`, starting at offset 0.
pub fn layout_type(ty: &Type, path: AccessPath) -> Layout {
    let mut builder = LayoutBuilder::new();
    builder.place(ty, path);
    builder.finish()
}

/// Lay out the members of `st` as `root.member`.
pub fn layout_struct(st: &StructType, root: &str) -> Layout {
    let mut builder = LayoutBuilder::new();
    builder.place_struct(st, AccessPath::new(root));
    let layout = builder.finish();
    debug!(
        "layout {}: {} bytes, {} leaves, {} padding",
        st.name(),
        layout.size,
        layout.leaves().count(),
        layout.padding()
    );
    layout
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Member, SymbolTable, resolve_type};
    use std::sync::Arc;

    fn ty(spec: &str) -> Type {
        resolve_type(spec, &SymbolTable::new()).unwrap()
    }

    fn offsets(layout: &Layout) -> Vec<(String, usize)> {
        layout.leaves().map(|(path, _, offset)| (path.to_string(), offset)).collect()
    }

    fn hi() -> StructType {
        StructType::new(
            "Hi",
            vec![
                Member::new(ty("vec3"), "point"),
                Member::new(ty("vec3"), "diffuse"),
                Member::new(ty("float"), "intensity"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_access_path_display() {
        let path = AccessPath::new("val").field("items").index(3).field("x");
        assert_eq!(path.to_string(), "val.items[3].x");
    }

    #[test]
    fn test_hi_offsets() {
        let layout = layout_struct(&hi(), "val");
        assert_eq!(
            offsets(&layout),
            vec![
                ("val.point".to_string(), 0),
                ("val.diffuse".to_string(), 16),
                ("val.intensity".to_string(), 28),
            ]
        );
        assert_eq!(layout.size, 32);
        assert_eq!(
            layout.steps.iter().filter(|s| matches!(s, LayoutStep::Pad(_))).cloned().collect::<Vec<_>>(),
            vec![LayoutStep::Pad(4)]
        );
    }

    #[test]
    fn test_layout_is_idempotent() {
        let st = hi();
        assert_eq!(layout_struct(&st, "val"), layout_struct(&st, "val"));
    }

    #[test]
    fn test_array_elements_use_vec4_stride() {
        for spec in ["float", "vec2", "vec3", "int", "double"] {
            let array = ty(spec).array(4).unwrap();
            let layout = layout_type(&array, AccessPath::new("w"));
            let got: Vec<_> = layout.leaves().map(|(_, _, offset)| offset).collect();
            assert_eq!(got, vec![0, 16, 32, 48], "{spec}");
            assert_eq!(layout.size, 64, "{spec}");
        }
    }

    #[test]
    fn test_matrix_is_laid_out_as_columns() {
        let layout = layout_type(&ty("mat3"), AccessPath::new("m"));
        assert_eq!(
            offsets(&layout),
            vec![("m[0]".to_string(), 0), ("m[1]".to_string(), 16), ("m[2]".to_string(), 32)]
        );
        assert_eq!(layout.size, 48);

        let layout = layout_type(&ty("dmat2x3"), AccessPath::new("m"));
        let got: Vec<_> = layout.leaves().map(|(_, _, offset)| offset).collect();
        assert_eq!(got, vec![0, 32]);
        assert_eq!(layout.size, 64);
    }

    #[test]
    fn test_nested_struct_alignment() {
        let inner = Arc::new(
            StructType::new("Inner", vec![Member::new(ty("float"), "x")]).unwrap(),
        );
        let outer = StructType::new(
            "Outer",
            vec![
                Member::new(ty("float"), "a"),
                Member::new(Type::Struct(Arc::clone(&inner)), "inner"),
                Member::new(ty("float"), "b"),
                Member::new(Type::Struct(inner).array(2).unwrap(), "items"),
            ],
        )
        .unwrap();

        let layout = layout_struct(&outer, "val");
        assert_eq!(
            offsets(&layout),
            vec![
                ("val.a".to_string(), 0),
                ("val.inner.x".to_string(), 16),
                ("val.b".to_string(), 32),
                ("val.items[0].x".to_string(), 48),
                ("val.items[1].x".to_string(), 64),
            ]
        );
        assert_eq!(layout.size, outer.size());
        assert_eq!(layout.size, 80);
    }

    #[test]
    fn test_every_leaf_is_aligned() {
        let st = StructType::new(
            "Mixed",
            vec![
                Member::new(ty("bool"), "flag"),
                Member::new(ty("dvec3"), "d"),
                Member::new(ty("vec2"), "uv"),
                Member::new(ty("mat2x3"), "m"),
                Member::new(ty("uvec3").array(3).unwrap(), "ids"),
                Member::new(ty("double"), "tail"),
            ],
        )
        .unwrap();
        let layout = layout_struct(&st, "val");
        for (path, leaf, offset) in layout.leaves() {
            assert_eq!(offset % leaf.alignment(), 0, "{path} at {offset}");
        }
        assert_eq!(layout.size, st.size());
        assert_eq!(layout.size % st.alignment(), 0);
    }

    #[test]
    fn test_empty_struct_has_no_steps() {
        let empty = StructType::new("Empty", vec![]).unwrap();
        let layout = layout_struct(&empty, "val");
        assert_eq!(layout.size, 0);
        assert!(layout.steps.is_empty());
    }

    #[test]
    fn test_steps_account_for_every_byte() {
        let st = hi();
        let layout = layout_struct(&st, "val");
        let written: usize = layout.leaves().map(|(_, leaf, _)| leaf.size()).sum();
        assert_eq!(written + layout.padding(), layout.size);
    }
}
