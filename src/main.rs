//! Cinder Compiler
//!
//! A class-based superset of C that compiles to plain C. The front end
//! (lexing, preprocessing, parsing) runs as a separate tool and hands this
//! binary a serialized syntax tree; `cindc` performs semantic analysis and
//! lowers the checked tree to C.

mod backend;
mod frontend;
mod middle;
mod types;
mod utils;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};

use backend::c::lower_program;
use backend::Emitter;
use frontend::ast::Program;
use middle::check::ProgramAnalyzer;
use middle::CompilationContext;
use types::TypeEnvironment;
use utils::Error;

/// Cinder Compiler
#[derive(Parser, Debug)]
#[command(name = "cindc")]
#[command(version = "0.1.0")]
#[command(about = "Cinder compiler - lowers a class-based C superset to plain C")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input syntax tree (.ast.json)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output C file
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Report errors as JSON on stderr
    #[arg(long)]
    json_errors: bool,

    /// Name of the generated virtual-table field
    #[arg(long, default_value = "__vtable")]
    vtable_name: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile a syntax tree to C
    Build {
        /// Input syntax tree
        input: PathBuf,

        /// Output C file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check a syntax tree for errors without generating C
    Check {
        /// Input syntax tree
        input: PathBuf,
    },
    /// Print version information
    Version,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    match &cli.command {
        Some(Commands::Build { input, output }) => {
            compile_file(input, output.clone().or_else(|| cli.output.clone()), &cli);
        }
        Some(Commands::Check { input }) => {
            check_file(input, &cli);
        }
        Some(Commands::Version) => {
            println!("cindc 0.1.0");
            println!("Cinder Compiler");
            println!("License: Apache-2.0");
        }
        None => {
            if let Some(input) = cli.input.clone() {
                compile_file(&input, cli.output.clone(), &cli);
            } else {
                eprintln!("Error: no input file specified");
                eprintln!("Usage: cindc <FILE> or cindc build <FILE>");
                process::exit(1);
            }
        }
    }
}

fn load_program(input: &Path) -> anyhow::Result<Program> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("parsing syntax tree {}", input.display()))
}

fn report(error: &Error, json: bool) {
    if json {
        let payload = serde_json::json!({
            "error": error.to_string(),
            "span": error.span(),
        });
        eprintln!("{}", payload);
    } else {
        match error.span() {
            Some(span) => eprintln!("Semantic error at {}..{}: {}", span.start, span.end, error),
            None => eprintln!("Semantic error: {}", error),
        }
    }
}

/// Compile a syntax tree to a C source file
fn compile_file(input: &Path, output: Option<PathBuf>, cli: &Cli) {
    let mut program = match load_program(input) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    };

    let env = TypeEnvironment::with_vtable_field(&cli.vtable_name);
    let mut ctx = CompilationContext::new(env);
    ctx.env.define_standard_boolean();

    let mut analyzer = ProgramAnalyzer::new(&mut ctx);
    if let Err(e) = analyzer.analyze(&mut program).and_then(|()| analyzer.require_main()) {
        report(&e, cli.json_errors);
        process::exit(1);
    }
    drop(analyzer);

    let mut em = Emitter::new();
    if let Err(e) = lower_program(&mut em, &mut ctx, &program) {
        report(&e, cli.json_errors);
        process::exit(1);
    }

    let out_path = output.unwrap_or_else(|| input.with_extension("c"));
    if let Err(e) = fs::write(&out_path, em.finish()) {
        report(&Error::Io(e.to_string()), cli.json_errors);
        process::exit(1);
    }
    println!("Wrote {}", out_path.display());
}

/// Check a syntax tree for errors without generating code
fn check_file(input: &Path, cli: &Cli) {
    let mut program = match load_program(input) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    };

    let env = TypeEnvironment::with_vtable_field(&cli.vtable_name);
    let mut ctx = CompilationContext::new(env);
    ctx.env.define_standard_boolean();

    let mut analyzer = ProgramAnalyzer::new(&mut ctx);
    if let Err(e) = analyzer.analyze(&mut program) {
        report(&e, cli.json_errors);
        process::exit(1);
    }

    println!("No errors found");
}
