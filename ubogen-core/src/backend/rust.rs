//! Rust backend.
//!
//! Each struct becomes a `Copy` struct of plain arrays plus an `Std140`
//! impl whose body replays the serialize ops. Each binding item becomes a
//! type wrapping a `&mut dyn UniformSink` with one method per setter.

use super::Backend;
use crate::codegen::{CodegenOptions, SERIALIZER_ROOT, struct_setter_name};
use crate::ir::{
    BindingItem, FieldSetter, HostType, Item, Module, Route, SerializeOp, SetterItem, SetterKind, StructItem,
    StructSetterItem,
};
use crate::layout::{AccessPath, PathSegment};
use crate::types::ScalarKind;
use std::collections::BTreeSet;
use std::fmt::Write;

const RUST_KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "do", "dyn", "else", "enum",
    "extern", "false", "final", "fn", "for", "gen", "if", "impl", "in", "let", "loop", "macro", "match", "mod",
    "move", "mut", "override", "priv", "pub", "ref", "return", "static", "struct", "trait", "true", "try", "type",
    "typeof", "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

#[derive(Debug, Clone)]
pub struct RustBackend {
    runtime_crate: String,
    derive_debug: bool,
    indent: usize,
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new(&CodegenOptions::default())
    }
}

impl RustBackend {
    pub fn new(options: &CodegenOptions) -> Self {
        RustBackend {
            runtime_crate: options.runtime_crate.clone(),
            derive_debug: options.derive_debug,
            indent: 0,
        }
    }

    fn indent_str(&self) -> String {
        "    ".repeat(self.indent)
    }

    fn render_imports(&self, module: &Module, output: &mut String) {
        let mut used = BTreeSet::new();
        for st in module.structs() {
            used.insert("Std140");
            if st.body.iter().any(|op| matches!(op, SerializeOp::Pad(_))) {
                used.insert("pad");
            }
        }
        for bindings in module.bindings() {
            used.insert("UniformSink");
            for setter in &bindings.setters {
                match (setter.kind, &setter.route) {
                    (SetterKind::Block, _) => {
                        used.insert("Std140");
                    }
                    (SetterKind::Indexed { .. } | SetterKind::Bulk { .. }, route) => {
                        used.insert("BoundsError");
                        if *route == Route::Direct {
                            used.insert("AsUniform");
                        }
                    }
                    (SetterKind::Single, Route::Direct) => {
                        used.insert("AsUniform");
                    }
                    (SetterKind::Single, Route::Fields(_)) => {}
                }
            }
            if bindings.struct_setters.iter().flat_map(|s| &s.fields).any(|f| f.route == Route::Direct) {
                used.insert("AsUniform");
            }
        }

        if used.is_empty() {
            return;
        }
        let names: Vec<_> = used.into_iter().collect();
        match names.as_slice() {
            [single] => writeln!(output, "use {}::{};", self.runtime_crate, single).unwrap(),
            _ => writeln!(output, "use {}::{{{}}};", self.runtime_crate, names.join(", ")).unwrap(),
        }
        writeln!(output).unwrap();
    }

    fn render_struct(&mut self, st: &StructItem, output: &mut String) {
        let name = ident(&st.name);
        let derives = if self.derive_debug {
            "Debug, Clone, Copy, PartialEq"
        } else {
            "Clone, Copy, PartialEq"
        };

        writeln!(output, "/// std140: {} bytes, aligned to {}.", st.size, st.alignment).unwrap();
        writeln!(output, "#[allow(non_snake_case)]").unwrap();
        writeln!(output, "#[derive({})]", derives).unwrap();
        writeln!(output, "pub struct {} {{", name).unwrap();
        self.indent += 1;
        for field in &st.fields {
            writeln!(output, "{}pub {}: {},", self.indent_str(), ident(&field.name), host_type(&field.ty)).unwrap();
        }
        self.indent -= 1;
        writeln!(output, "}}").unwrap();
        writeln!(output).unwrap();

        writeln!(output, "impl Std140 for {} {{", name).unwrap();
        self.indent += 1;
        writeln!(output, "{}const STD140_SIZE: usize = {};", self.indent_str(), st.size).unwrap();
        writeln!(output).unwrap();
        writeln!(output, "{}fn write_std140(&self, output: &mut Vec<u8>) {{", self.indent_str()).unwrap();
        self.indent += 1;
        if st.body.iter().any(|op| matches!(op, SerializeOp::Write(_))) {
            writeln!(output, "{}let {} = self;", self.indent_str(), SERIALIZER_ROOT).unwrap();
        }
        writeln!(output, "{}let initial_size = output.len();", self.indent_str()).unwrap();
        for op in &st.body {
            match op {
                SerializeOp::Pad(n) => writeln!(output, "{}pad(output, {});", self.indent_str(), n).unwrap(),
                SerializeOp::Write(path) => {
                    writeln!(output, "{}{}.write_std140(output);", self.indent_str(), access(path)).unwrap()
                }
            }
        }
        writeln!(
            output,
            "{}assert_eq!(output.len() - initial_size, Self::STD140_SIZE);",
            self.indent_str()
        )
        .unwrap();
        self.indent -= 1;
        writeln!(output, "{}}}", self.indent_str()).unwrap();
        self.indent -= 1;
        writeln!(output, "}}").unwrap();
        writeln!(output).unwrap();
    }

    fn render_bindings(&mut self, bindings: &BindingItem, output: &mut String) {
        let name = ident(&bindings.name);

        writeln!(output, "/// Uniform setters for the `{}` stage.", bindings.name).unwrap();
        writeln!(output, "pub struct {}<'a> {{", name).unwrap();
        writeln!(output, "    sink: &'a mut dyn UniformSink,").unwrap();
        writeln!(output, "}}").unwrap();
        writeln!(output).unwrap();

        writeln!(output, "impl<'a> {}<'a> {{", name).unwrap();
        self.indent += 1;
        writeln!(output, "{}pub fn new(sink: &'a mut dyn UniformSink) -> Self {{", self.indent_str()).unwrap();
        writeln!(output, "{}    {} {{ sink }}", self.indent_str(), name).unwrap();
        writeln!(output, "{}}}", self.indent_str()).unwrap();

        for setter in &bindings.setters {
            writeln!(output).unwrap();
            self.render_setter(setter, output);
        }
        for struct_setter in &bindings.struct_setters {
            writeln!(output).unwrap();
            self.render_struct_setter(struct_setter, output);
        }
        self.indent -= 1;
        writeln!(output, "}}").unwrap();
        writeln!(output).unwrap();
    }

    fn render_setter(&mut self, setter: &SetterItem, output: &mut String) {
        let indent = self.indent_str();
        let uniform = &setter.uniform;
        let value_ty = param_type(&setter.ty);

        match setter.kind {
            SetterKind::Single => {
                writeln!(output, "{}pub fn {}(&mut self, value: {}) {{", indent, setter.method, value_ty).unwrap();
                writeln!(output, "{}    {}", indent, forward(&setter.route, &format!("{:?}", uniform), "value"))
                    .unwrap();
                writeln!(output, "{}}}", indent).unwrap();
            }
            SetterKind::Indexed { length } => {
                writeln!(
                    output,
                    "{}pub fn {}(&mut self, index: usize, value: {}) -> Result<(), BoundsError> {{",
                    indent, setter.method, value_ty
                )
                .unwrap();
                writeln!(output, "{}    if index >= {} {{", indent, length).unwrap();
                writeln!(
                    output,
                    "{}        return Err(BoundsError::Index {{ uniform: {:?}, index, length: {} }});",
                    indent, uniform, length
                )
                .unwrap();
                writeln!(output, "{}    }}", indent).unwrap();
                let name = format!("&format!(\"{}[{{index}}]\")", uniform);
                writeln!(output, "{}    {}", indent, forward(&setter.route, &name, "value")).unwrap();
                writeln!(output, "{}    Ok(())", indent).unwrap();
                writeln!(output, "{}}}", indent).unwrap();
            }
            SetterKind::Bulk { length } => {
                writeln!(
                    output,
                    "{}pub fn {}(&mut self, values: &[{}]) -> Result<(), BoundsError> {{",
                    indent,
                    setter.method,
                    host_type(&setter.ty)
                )
                .unwrap();
                writeln!(output, "{}    if values.len() != {} {{", indent, length).unwrap();
                writeln!(
                    output,
                    "{}        return Err(BoundsError::Length {{ uniform: {:?}, expected: {}, actual: values.len() }});",
                    indent, uniform, length
                )
                .unwrap();
                writeln!(output, "{}    }}", indent).unwrap();
                writeln!(output, "{}    for (index, value) in values.iter().enumerate() {{", indent).unwrap();
                let name = format!("&format!(\"{}[{{index}}]\")", uniform);
                writeln!(output, "{}        {}", indent, forward(&setter.route, &name, "value")).unwrap();
                writeln!(output, "{}    }}", indent).unwrap();
                writeln!(output, "{}    Ok(())", indent).unwrap();
                writeln!(output, "{}}}", indent).unwrap();
            }
            SetterKind::Block => {
                writeln!(output, "{}pub fn {}(&mut self, value: {}) {{", indent, setter.method, value_ty).unwrap();
                writeln!(
                    output,
                    "{}    self.sink.set_uniform_block({:?}, &value.to_std140_bytes());",
                    indent, uniform
                )
                .unwrap();
                writeln!(output, "{}}}", indent).unwrap();
            }
        }
    }

    fn render_struct_setter(&mut self, setter: &StructSetterItem, output: &mut String) {
        let indent = self.indent_str();
        writeln!(
            output,
            "{}fn {}(&mut self, name: &str, value: &{}) {{",
            indent,
            setter.method,
            ident(&setter.struct_name)
        )
        .unwrap();
        for field in &setter.fields {
            self.render_field_setter(field, output);
        }
        writeln!(output, "{}}}", indent).unwrap();
    }

    fn render_field_setter(&self, field: &FieldSetter, output: &mut String) {
        let indent = format!("{}    ", self.indent_str());
        let member = format!("value.{}", ident(&field.name));
        match field.array_length {
            None => {
                let name = format!("&format!(\"{{name}}.{}\")", field.name);
                let value = match field.route {
                    Route::Direct => member,
                    Route::Fields(_) => format!("&{}", member),
                };
                writeln!(output, "{}{}", indent, forward(&field.route, &name, &value)).unwrap();
            }
            Some(_) => {
                writeln!(output, "{}for (index, element) in {}.iter().enumerate() {{", indent, member).unwrap();
                let name = format!("&format!(\"{{name}}.{}[{{index}}]\")", field.name);
                writeln!(output, "{}    {}", indent, forward(&field.route, &name, "element")).unwrap();
                writeln!(output, "{}}}", indent).unwrap();
            }
        }
    }
}

impl Backend for RustBackend {
    fn render(&self, module: &Module) -> String {
        let mut backend = self.clone();
        let mut output = String::new();

        writeln!(output, "// Generated by ubogen. Do not edit.").unwrap();
        writeln!(output).unwrap();
        backend.render_imports(module, &mut output);

        for item in &module.items {
            match item {
                Item::Struct(st) => backend.render_struct(st, &mut output),
                Item::Bindings(bindings) => backend.render_bindings(bindings, &mut output),
            }
        }

        // Single trailing newline.
        while output.ends_with("\n\n") {
            output.pop();
        }
        output
    }
}

/// The statement that hands `value` to the sink under `name`.
fn forward(route: &Route, name: &str, value: &str) -> String {
    match route {
        Route::Direct => format!("self.sink.set_uniform({}, {}.as_uniform());", name, value),
        Route::Fields(st) => format!("self.{}({}, {});", struct_setter_name(st), name, value),
    }
}

/// Escape Rust keywords as raw identifiers.
pub fn ident(name: &str) -> String {
    if RUST_KEYWORDS.contains(&name) {
        format!("r#{}", name)
    } else {
        name.to_string()
    }
}

fn scalar_type(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Bool => "bool",
        ScalarKind::Int => "i32",
        ScalarKind::UInt => "u32",
        ScalarKind::Float => "f32",
        ScalarKind::Double => "f64",
    }
}

pub fn host_type(ty: &HostType) -> String {
    match ty {
        HostType::Scalar(kind) => scalar_type(*kind).to_string(),
        HostType::Vector { kind, dims } => format!("[{}; {}]", scalar_type(*kind), dims),
        HostType::Matrix { kind, columns, rows } => format!("[[{}; {}]; {}]", scalar_type(*kind), rows, columns),
        HostType::Array(element, length) => format!("[{}; {}]", host_type(element), length),
        HostType::Named(name) => ident(name),
    }
}

/// Structs are passed by reference, everything else by value.
fn param_type(ty: &HostType) -> String {
    match ty {
        HostType::Named(_) => format!("&{}", host_type(ty)),
        other => host_type(other),
    }
}

fn access(path: &AccessPath) -> String {
    let mut out = path.root.clone();
    for segment in &path.segments {
        match segment {
            PathSegment::Field(name) => {
                out.push('.');
                out.push_str(&ident(name));
            }
            PathSegment::Index(i) => {
                write!(out, "[{}]", i).unwrap();
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{generate_bindings, generate_module};
    use crate::error::Span;
    use crate::parser::{Parser, UniformDecl};
    use crate::types::SymbolTable;

    fn render(source: &str, stage: &str) -> String {
        let shader = Parser::from_source(source).unwrap().parse(SymbolTable::new()).unwrap();
        let module = generate_module(&shader, stage, &CodegenOptions::default()).unwrap();
        RustBackend::default().render(&module)
    }

    fn assert_contains(output: &str, expected: &str) {
        if !output.contains(expected) {
            println!("Generated:\n{}", output);
            panic!("Expected generated code to contain:\n{}", expected);
        }
    }

    #[test]
    fn test_render_struct_serializer() {
        let output = render("struct Hi { vec3 point; vec3 diffuse; float intensity; };", "Hi");
        assert_contains(&output, "use ubogen_runtime::{Std140, pad};");
        assert_contains(&output, "pub struct Hi {\n    pub point: [f32; 3],\n    pub diffuse: [f32; 3],\n    pub intensity: f32,\n}");
        assert_contains(&output, "const STD140_SIZE: usize = 32;");
        assert_contains(
            &output,
            "        val.point.write_std140(output);\n        pad(output, 4);\n        val.diffuse.write_std140(output);\n        val.intensity.write_std140(output);\n        assert_eq!(output.len() - initial_size, Self::STD140_SIZE);",
        );
        assert!(!output.contains("UniformSink"));
    }

    #[test]
    fn test_render_empty_struct() {
        let output = render("struct Empty { };", "Empty");
        assert_contains(&output, "pub struct Empty {\n}");
        assert_contains(&output, "const STD140_SIZE: usize = 0;");
        assert!(!output.contains("let val"));
        assert!(!output.contains("pad"));
    }

    #[test]
    fn test_render_array_setters_check_bounds() {
        let uniforms = [UniformDecl {
            type_name: "float".to_string(),
            name: "weights".to_string(),
            array_length: Some(4),
            span: Span::new(1, 1),
        }];
        let bindings = generate_bindings("Blur", &uniforms, &[], &SymbolTable::new()).unwrap();
        let mut module = Module::new();
        module.push(Item::Bindings(bindings));
        let output = RustBackend::default().render(&module);

        assert_contains(&output, "use ubogen_runtime::{AsUniform, BoundsError, UniformSink};");
        assert_contains(&output, "pub fn set_weights_at(&mut self, index: usize, value: f32) -> Result<(), BoundsError> {");
        assert_contains(&output, "if index >= 4 {");
        assert_contains(&output, "return Err(BoundsError::Index { uniform: \"weights\", index, length: 4 });");
        assert_contains(&output, "self.sink.set_uniform(&format!(\"weights[{index}]\"), value.as_uniform());");
        assert_contains(&output, "pub fn set_weights(&mut self, values: &[f32]) -> Result<(), BoundsError> {");
        assert_contains(&output, "if values.len() != 4 {");
    }

    #[test]
    fn test_render_struct_uniform_setters() {
        let output = render(
            "struct Light { vec3 color; float w[2]; }; uniform Light lights[2]; uniform Light sun;",
            "Phong",
        );
        assert_contains(&output, "pub struct Phong<'a> {\n    sink: &'a mut dyn UniformSink,\n}");
        assert_contains(&output, "pub fn set_sun(&mut self, value: &Light) {\n        self.set_light_fields(\"sun\", value);");
        assert_contains(&output, "self.set_light_fields(&format!(\"lights[{index}]\"), value);");
        assert_contains(&output, "fn set_light_fields(&mut self, name: &str, value: &Light) {");
        assert_contains(&output, "self.sink.set_uniform(&format!(\"{name}.color\"), value.color.as_uniform());");
        assert_contains(
            &output,
            "for (index, element) in value.w.iter().enumerate() {\n            self.sink.set_uniform(&format!(\"{name}.w[{index}]\"), element.as_uniform());",
        );
    }

    #[test]
    fn test_render_uniform_block_setter() {
        let output = render("uniform Matrices { mat4 projection; mat4 view; };", "Scene");
        assert_contains(&output, "pub projection: [[f32; 4]; 4],");
        assert_contains(&output, "val.projection[3].write_std140(output);");
        assert_contains(
            &output,
            "pub fn set_matrices(&mut self, value: &Matrices) {\n        self.sink.set_uniform_block(\"Matrices\", &value.to_std140_bytes());",
        );
    }

    #[test]
    fn test_keywords_become_raw_identifiers() {
        let output = render("struct Item { int type; vec2 ref[2]; };", "Items");
        assert_contains(&output, "pub r#type: i32,");
        assert_contains(&output, "pub r#ref: [[f32; 2]; 2],");
        assert_contains(&output, "val.r#ref[1].write_std140(output);");
    }

    #[test]
    fn test_runtime_crate_option() {
        let options = CodegenOptions {
            runtime_crate: "crate::std140".to_string(),
            derive_debug: false,
            ..CodegenOptions::default()
        };
        let shader = Parser::from_source("struct A { vec4 x; };").unwrap().parse(SymbolTable::new()).unwrap();
        let module = generate_module(&shader, "A", &options).unwrap();
        let output = RustBackend::new(&options).render(&module);
        assert_contains(&output, "use crate::std140::Std140;");
        assert_contains(&output, "#[derive(Clone, Copy, PartialEq)]");
    }
}
