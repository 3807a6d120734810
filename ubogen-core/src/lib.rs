pub mod backend;
pub mod codegen;
pub mod error;
pub mod ir;
pub mod layout;
pub mod lexer;
pub mod parser;
pub mod types;

use backend::{Backend, RustBackend};
use codegen::CodegenOptions;
use error::Result;
use ir::Module;
use log::debug;
use parser::{Parser, ShaderInterface};
use types::SymbolTable;

#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CodegenOptions,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CodegenOptions) -> Self {
        Compiler { options }
    }

    pub fn options(&self) -> &CodegenOptions {
        &self.options
    }

    /// Extract structs, blocks and uniforms without generating code.
    /// `symbols` is left untouched; the extended table is in the result.
    pub fn parse(&self, source: &str, symbols: &SymbolTable) -> Result<ShaderInterface> {
        Parser::from_source(source)?.parse(symbols.clone())
    }

    /// Compile one shader into IR. `stage` names its binding type.
    /// `symbols` is extended only if the whole unit compiles.
    pub fn compile_module(&self, source: &str, stage: &str, symbols: &mut SymbolTable) -> Result<Module> {
        let interface = self.parse(source, symbols)?;
        let module = codegen::generate_module(&interface, stage, &self.options)?;
        debug!(
            "compiled {}: {} structs, {} uniforms, {} blocks",
            stage,
            interface.structs.len(),
            interface.uniforms.len(),
            interface.blocks.len()
        );

        *symbols = interface.symbols;
        Ok(module)
    }

    /// Compile one shader straight to Rust source.
    pub fn compile(&self, source: &str, stage: &str, symbols: &mut SymbolTable) -> Result<String> {
        let module = self.compile_module(source, stage, symbols)?;
        Ok(self.render(&module))
    }

    pub fn render(&self, module: &Module) -> String {
        RustBackend::new(&self.options).render(module)
    }
}
