//! Serialize values leaf by leaf through the runtime, following the layout
//! steps, and read them back at the offsets the layout reports.

use ubogen_core::layout::{Layout, LayoutStep, layout_struct};
use ubogen_core::types::{ScalarKind, StructType, SymbolTable, Type};
use ubogen_core::Compiler;
use ubogen_runtime::{Std140, Std140Reader, pad};

#[derive(Debug, Clone, PartialEq)]
enum Leaf {
    Bool(Vec<bool>),
    Int(Vec<i32>),
    UInt(Vec<u32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

fn leaf_shape(ty: &Type) -> (ScalarKind, usize) {
    match ty {
        Type::Scalar(kind) => (*kind, 1),
        Type::Vector(v) => (v.kind, v.dims as usize),
        other => panic!("layout produced a non-leaf {}", other),
    }
}

/// Distinct, non-trivial values for the `n`-th leaf.
fn sample(ty: &Type, n: usize) -> Leaf {
    let (kind, count) = leaf_shape(ty);
    let seed = (n * 7 + 1) as i64;
    match kind {
        ScalarKind::Bool => Leaf::Bool((0..count).map(|i| (n + i) % 2 == 0).collect()),
        ScalarKind::Int => Leaf::Int((0..count).map(|i| -(seed as i32) * 31 - i as i32).collect()),
        ScalarKind::UInt => Leaf::UInt((0..count).map(|i| (seed as u32).wrapping_mul(0x0101_0101) + i as u32).collect()),
        ScalarKind::Float => Leaf::Float((0..count).map(|i| seed as f32 * 0.37 + i as f32).collect()),
        ScalarKind::Double => Leaf::Double((0..count).map(|i| seed as f64 * -1.0e-3 - i as f64).collect()),
    }
}

fn write_leaf(leaf: &Leaf, output: &mut Vec<u8>) {
    match leaf {
        Leaf::Bool(v) => v.iter().for_each(|x| x.write_std140(output)),
        Leaf::Int(v) => v.iter().for_each(|x| x.write_std140(output)),
        Leaf::UInt(v) => v.iter().for_each(|x| x.write_std140(output)),
        Leaf::Float(v) => v.iter().for_each(|x| x.write_std140(output)),
        Leaf::Double(v) => v.iter().for_each(|x| x.write_std140(output)),
    }
}

fn read_leaf(reader: &Std140Reader<'_>, ty: &Type, offset: usize) -> Leaf {
    let (kind, count) = leaf_shape(ty);
    let at = |i: usize| offset + i * kind.size();
    match kind {
        ScalarKind::Bool => Leaf::Bool((0..count).map(|i| reader.read_at(at(i)).unwrap()).collect()),
        ScalarKind::Int => Leaf::Int((0..count).map(|i| reader.read_at(at(i)).unwrap()).collect()),
        ScalarKind::UInt => Leaf::UInt((0..count).map(|i| reader.read_at(at(i)).unwrap()).collect()),
        ScalarKind::Float => Leaf::Float((0..count).map(|i| reader.read_at(at(i)).unwrap()).collect()),
        ScalarKind::Double => Leaf::Double((0..count).map(|i| reader.read_at(at(i)).unwrap()).collect()),
    }
}

/// Replay the layout the way a generated serializer does.
fn serialize(layout: &Layout) -> (Vec<u8>, Vec<Leaf>) {
    let mut output = Vec::new();
    let mut written = Vec::new();
    for step in &layout.steps {
        match step {
            LayoutStep::Pad(n) => pad(&mut output, *n),
            LayoutStep::Serialize { ty, offset, .. } => {
                assert_eq!(output.len(), *offset, "leaf written at the wrong offset");
                let leaf = sample(ty, written.len());
                write_leaf(&leaf, &mut output);
                written.push(leaf);
            }
        }
    }
    (output, written)
}

fn assert_round_trip(st: &StructType) {
    let layout = layout_struct(st, "val");
    let (bytes, written) = serialize(&layout);
    assert_eq!(bytes.len(), st.size(), "{}", st.name());

    let reader = Std140Reader::new(&bytes);
    let read: Vec<_> = layout.leaves().map(|(_, ty, offset)| read_leaf(&reader, ty, offset)).collect();
    assert_eq!(read, written, "{}", st.name());

    // Everything that is not a leaf is zero padding.
    let mut covered = vec![false; bytes.len()];
    for (_, ty, offset) in layout.leaves() {
        covered[offset..offset + ty.size()].iter_mut().for_each(|c| *c = true);
    }
    for (i, byte) in bytes.iter().enumerate() {
        if !covered[i] {
            assert_eq!(*byte, 0, "{}: padding byte {} is not zero", st.name(), i);
        }
    }
}

fn parse_all(source: &str) -> SymbolTable {
    Compiler::new()
        .parse(source, &SymbolTable::new())
        .expect("Failed to parse")
        .symbols
}

#[test]
fn test_round_trip_hi() {
    let symbols = parse_all("struct Hi { vec3 point; vec3 diffuse; float intensity; };");
    assert_round_trip(symbols.get("Hi").unwrap());
}

#[test]
fn test_round_trip_every_leaf_kind() {
    let symbols = parse_all(
        r#"
struct Inner {
    bool flag;
    ivec2 cell;
    dvec3 origin;
};

struct Everything {
    float f;
    uvec3 ids;
    double d;
    bvec4 mask;
    mat2x3 m;
    dmat2 dm;
    Inner inner;
    Inner inners[2];
    vec2 uv[3];
    int tail;
};
"#,
    );
    for st in symbols.iter() {
        assert_round_trip(st);
    }
}

#[test]
fn test_round_trip_uniform_block() {
    let symbols = parse_all(
        "layout(std140) uniform Globals { mat4 viewProj; vec3 eye; float time; vec4 fog[2]; } globals;",
    );
    let globals = symbols.get("Globals").unwrap();
    assert_eq!(globals.size(), 112);
    assert_round_trip(globals);
}
