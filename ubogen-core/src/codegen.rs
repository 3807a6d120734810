//! Code generation: parsed declarations and layouts to IR items.

use crate::bail_codegen;
use crate::error::{CompilerError, Result};
use crate::ir::{
    BindingItem, FieldItem, FieldSetter, HostType, Item, Module, Route, SerializeOp, SetterItem, SetterKind,
    StructItem, StructSetterItem,
};
use crate::layout::{LayoutStep, layout_struct};
use crate::parser::{ShaderInterface, UniformBlock, UniformDecl};
use crate::types::{ScalarKind, StructType, SymbolTable, Type, resolve_type};
use log::debug;
use std::collections::HashSet;
use std::sync::Arc;

/// Accessor root the serializer binds the value to.
pub const SERIALIZER_ROOT: &str = "val";

/// Names that cannot be written even as raw identifiers.
const RESERVED_IDENTIFIERS: &[&str] = &["self", "Self", "super", "crate", "_"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Path the generated code imports its support items from.
    pub runtime_crate: String,
    /// Emit a setter binding type for each stage.
    pub emit_bindings: bool,
    pub derive_debug: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            runtime_crate: "ubogen_runtime".to_string(),
            emit_bindings: true,
            derive_debug: true,
        }
    }
}

/// Host struct and serializer for `st`.
pub fn generate_struct(st: &StructType) -> Result<StructItem> {
    check_identifier(st.name(), st.name())?;
    let mut fields = Vec::new();
    for member in st.members() {
        check_identifier(&member.name, st.name())?;
        fields.push(FieldItem {
            name: member.name.clone(),
            ty: HostType::from_type(&member.ty),
        });
    }

    let layout = layout_struct(st, SERIALIZER_ROOT);
    let body = layout
        .steps
        .into_iter()
        .map(|step| match step {
            LayoutStep::Pad(n) => SerializeOp::Pad(n),
            LayoutStep::Serialize { path, .. } => SerializeOp::Write(path),
        })
        .collect();

    Ok(StructItem {
        name: st.name().to_string(),
        fields,
        size: layout.size,
        alignment: st.alignment(),
        body,
    })
}

/// Setter bindings named `stage` for the uniforms and blocks of one shader.
/// A uniform or block `lightColor` is set through `set_light_color`.
pub fn generate_bindings(
    stage: &str,
    uniforms: &[UniformDecl],
    blocks: &[UniformBlock],
    symbols: &SymbolTable,
) -> Result<BindingItem> {
    let mut setters = Vec::new();
    let mut routed: Vec<Arc<StructType>> = Vec::new();

    for uniform in uniforms {
        let ty = resolve_type(&uniform.type_name, symbols).map_err(|_| {
            CompilerError::TypeResolutionError(
                format!("uniform {}: unknown type '{}'", uniform.name, uniform.type_name),
                Some(uniform.span),
            )
        })?;
        check_bindable(&ty, &uniform.name).map_err(|e| e.at(uniform.span))?;
        let route = route_for(&ty, &mut routed);
        let method = format!("set_{}", snake_case(&uniform.name));
        let host = HostType::from_type(&ty);

        match uniform.array_length {
            None => setters.push(SetterItem {
                method,
                uniform: uniform.name.clone(),
                ty: host,
                kind: SetterKind::Single,
                route,
            }),
            Some(length) => {
                setters.push(SetterItem {
                    method: format!("{}_at", method),
                    uniform: uniform.name.clone(),
                    ty: host.clone(),
                    kind: SetterKind::Indexed { length },
                    route: route.clone(),
                });
                setters.push(SetterItem {
                    method,
                    uniform: uniform.name.clone(),
                    ty: host,
                    kind: SetterKind::Bulk { length },
                    route,
                });
            }
        }
    }

    for block in blocks {
        setters.push(SetterItem {
            method: format!("set_{}", snake_case(block.name())),
            uniform: block.name().to_string(),
            ty: HostType::Named(block.name().to_string()),
            kind: SetterKind::Block,
            route: Route::Direct,
        });
    }

    // Struct setters for every struct reachable from a routed uniform.
    let mut struct_setters = Vec::new();
    let mut i = 0;
    while i < routed.len() {
        let st = Arc::clone(&routed[i]);
        let mut fields = Vec::new();
        for member in st.members() {
            let (element, array_length) = match &member.ty {
                Type::Array(a) => (a.element(), Some(a.length())),
                other => (other, None),
            };
            fields.push(FieldSetter {
                name: member.name.clone(),
                ty: HostType::from_type(element),
                array_length,
                route: route_for(element, &mut routed),
            });
        }
        struct_setters.push(StructSetterItem {
            method: struct_setter_name(st.name()),
            struct_name: st.name().to_string(),
            fields,
        });
        i += 1;
    }

    let mut methods = HashSet::new();
    let names = setters.iter().map(|s| &s.method).chain(struct_setters.iter().map(|s| &s.method));
    for method in names {
        if !methods.insert(method.as_str()) {
            bail_codegen!("{}: two uniforms map to the setter '{}'", stage, method);
        }
    }

    debug!(
        "bindings {}: {} setters, {} struct setters",
        stage,
        setters.len(),
        struct_setters.len()
    );
    Ok(BindingItem {
        name: stage.to_string(),
        setters,
        struct_setters,
    })
}

/// Everything generated for one parsed shader.
pub fn generate_module(interface: &ShaderInterface, stage: &str, options: &CodegenOptions) -> Result<Module> {
    let mut module = Module::new();
    for st in &interface.structs {
        module.push(Item::Struct(generate_struct(st)?));
    }
    for block in interface.blocks.iter().filter(|b| !b.redeclared) {
        module.push(Item::Struct(generate_struct(&block.layout)?));
    }

    let has_uniforms = !interface.uniforms.is_empty() || !interface.blocks.is_empty();
    if options.emit_bindings && has_uniforms {
        let bindings = generate_bindings(stage, &interface.uniforms, &interface.blocks, &interface.symbols)?;
        module.push(Item::Bindings(bindings));
    }
    Ok(module)
}

fn route_for(ty: &Type, routed: &mut Vec<Arc<StructType>>) -> Route {
    match ty {
        Type::Struct(st) => {
            if !routed.iter().any(|seen| seen.name() == st.name()) {
                routed.push(Arc::clone(st));
            }
            Route::Fields(st.name().to_string())
        }
        _ => Route::Direct,
    }
}

/// Uniform values are uploaded as float or double matrices only.
fn check_bindable(ty: &Type, uniform: &str) -> Result<()> {
    match ty {
        Type::Matrix(m) if !matches!(m.kind, ScalarKind::Float | ScalarKind::Double) => {
            bail_codegen!("uniform {}: {} matrices cannot be set as uniforms", uniform, m.kind.keyword())
        }
        Type::Array(a) => check_bindable(a.element(), uniform),
        Type::Struct(st) => st.members().iter().try_for_each(|m| check_bindable(&m.ty, uniform)),
        _ => Ok(()),
    }
}

fn check_identifier(name: &str, owner: &str) -> Result<()> {
    if RESERVED_IDENTIFIERS.contains(&name) {
        bail_codegen!("struct {}: '{}' cannot be used as a host identifier", owner, name);
    }
    Ok(())
}

pub fn struct_setter_name(struct_name: &str) -> String {
    format!("set_{}_fields", snake_case(struct_name))
}

/// `lightColor` / `LightColor` -> `light_color`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_uppercase() {
            let after_lower = prev.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit());
            let ends_acronym =
                prev.is_some_and(|p| p.is_ascii_uppercase()) && chars.peek().is_some_and(|n| n.is_ascii_lowercase());
            if after_lower || ends_acronym {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}

/// `phong_shader` / `phong-shader` -> `PhongShader`.
pub fn pascal_case(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}
