use clap::{Parser, Subcommand};
use log::info;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use ubogen_core::codegen::{CodegenOptions, pascal_case};
use ubogen_core::ir::Module;
use ubogen_core::layout::layout_struct;
use ubogen_core::types::SymbolTable;
use ubogen_core::Compiler;

#[derive(Parser)]
#[command(name = "ubogen")]
#[command(about = "Generate std140 serializers and uniform setters from GLSL declarations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate Rust source for one or more preprocessed shaders
    Generate {
        /// Shader sources; structs from earlier files are visible to later ones
        #[arg(value_name = "FILES", required = true)]
        inputs: Vec<PathBuf>,

        /// Output Rust file (defaults to stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Path the generated code imports runtime support from
        #[arg(long, value_name = "PATH", default_value = "ubogen_runtime")]
        runtime_crate: String,

        /// Only emit structs and serializers
        #[arg(long)]
        no_bindings: bool,

        /// Print verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Parse and lay out shaders without generating code
    Check {
        #[arg(value_name = "FILES", required = true)]
        inputs: Vec<PathBuf>,

        /// Print verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the std140 offset of every struct member in a shader
    Layout {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

#[derive(Debug, Error)]
enum DriverError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("{path}:{location}{source}")]
    CompilationError {
        path: String,
        location: String,
        source: ubogen_core::error::CompilerError,
    },

    #[error("cannot name a binding type after {0}")]
    InvalidStage(String),

    #[error("{0} and another input both name the binding type {1}")]
    DuplicateStage(String, String),

    #[error("binding type {0} has the same name as a generated struct")]
    StageNameClash(String),
}

fn compile_error(path: &Path, source: ubogen_core::error::CompilerError) -> DriverError {
    DriverError::CompilationError {
        path: path.display().to_string(),
        location: source.span().map(|span| format!("{}: ", span)).unwrap_or_else(|| " ".to_string()),
        source,
    }
}

fn main() -> Result<(), DriverError> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            inputs,
            output,
            runtime_crate,
            no_bindings,
            verbose,
        } => {
            let options = CodegenOptions {
                runtime_crate,
                emit_bindings: !no_bindings,
                ..CodegenOptions::default()
            };
            generate_files(&inputs, output, options, verbose)?;
        }
        Commands::Check { inputs, verbose } => {
            check_files(&inputs, verbose)?;
        }
        Commands::Layout { input } => {
            print_layout(&input)?;
        }
    }

    Ok(())
}

/// Binding type name from the file stem: `phong_shader.frag` -> `PhongShader`.
fn stage_name(path: &Path) -> Result<String, DriverError> {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let name = pascal_case(stem);
    match name.chars().next() {
        Some(first) if first.is_ascii_alphabetic() => Ok(name),
        _ => Err(DriverError::InvalidStage(path.display().to_string())),
    }
}

fn generate_files(
    inputs: &[PathBuf],
    output: Option<PathBuf>,
    options: CodegenOptions,
    verbose: bool,
) -> Result<(), DriverError> {
    let compiler = Compiler::with_options(options);
    let mut symbols = SymbolTable::new();
    let mut stages = HashSet::new();
    let mut module = Module::new();

    for input in inputs {
        if verbose {
            info!("Compiling {}...", input.display());
        }
        let stage = stage_name(input)?;
        if !stages.insert(stage.clone()) {
            return Err(DriverError::DuplicateStage(input.display().to_string(), stage));
        }

        let source = fs::read_to_string(input)?;
        let unit = compiler
            .compile_module(&source, &stage, &mut symbols)
            .map_err(|e| compile_error(input, e))?;

        if verbose {
            info!(
                "  {} structs, {} binding types",
                unit.structs().count(),
                unit.bindings().count()
            );
        }
        module.extend(unit);
    }
    check_stage_names(&module)?;

    let generated = compiler.render(&module);
    match output {
        Some(path) => {
            let mut file = fs::File::create(&path)?;
            file.write_all(generated.as_bytes())?;
            if verbose {
                info!("Wrote {}", path.display());
            }
        }
        None => {
            std::io::stdout().write_all(generated.as_bytes())?;
        }
    }

    Ok(())
}

/// Binding types and struct items share one Rust namespace.
fn check_stage_names(module: &Module) -> Result<(), DriverError> {
    let structs: HashSet<&str> = module.structs().map(|s| s.name.as_str()).collect();
    match module.bindings().find(|b| structs.contains(b.name.as_str())) {
        Some(clash) => Err(DriverError::StageNameClash(clash.name.clone())),
        None => Ok(()),
    }
}

fn check_files(inputs: &[PathBuf], verbose: bool) -> Result<(), DriverError> {
    let compiler = Compiler::new();
    let mut symbols = SymbolTable::new();
    let mut module = Module::new();

    for input in inputs {
        if verbose {
            info!("Checking {}...", input.display());
        }
        let source = fs::read_to_string(input)?;
        let shader = compiler.parse(&source, &symbols).map_err(|e| compile_error(input, e))?;

        // Code generation also resolves the uniform types.
        let stage = stage_name(input)?;
        let unit = ubogen_core::codegen::generate_module(&shader, &stage, compiler.options())
            .map_err(|e| compile_error(input, e))?;
        module.extend(unit);

        println!(
            "{}: {} structs, {} uniform blocks, {} uniforms",
            input.display(),
            shader.structs.len(),
            shader.blocks.len(),
            shader.uniforms.len()
        );
        symbols = shader.symbols;
    }
    check_stage_names(&module)?;

    println!("✓ All files are valid");
    Ok(())
}

fn print_layout(input: &Path) -> Result<(), DriverError> {
    let source = fs::read_to_string(input)?;
    let shader = Compiler::new()
        .parse(&source, &SymbolTable::new())
        .map_err(|e| compile_error(input, e))?;

    let layouts = shader.structs.iter().chain(shader.blocks.iter().map(|b| &b.layout));
    for st in layouts {
        let layout = layout_struct(st, st.name());
        println!("struct {} ({} bytes, align {})", st.name(), layout.size, st.alignment());
        println!("  {:>6}  {:>4}  {:<8}  path", "offset", "size", "type");
        for (path, ty, offset) in layout.leaves() {
            println!("  {:>6}  {:>4}  {:<8}  {}", offset, ty.size(), ty.to_string(), path);
        }
        println!();
    }

    Ok(())
}
