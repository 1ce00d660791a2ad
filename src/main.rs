//! Skiff CLI: run a script file or start the REPL.
//!
//! Exit codes: 0 success, 64 usage, 65 compile error, 70 runtime error,
//! 74 I/O error.

use std::env;
use std::fs;
use std::process;

use skiff::{interpret, repl, InterpretResult};

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    match args.len() {
        0 => repl::run(),
        1 => run_file(&args[0]),
        _ => {
            eprintln!("Usage: skiff [script]");
            process::exit(64);
        }
    }
}

fn run_file(path: &str) {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("could not read '{}': {}", path, err);
            process::exit(74);
        }
    };
    match interpret(&source) {
        InterpretResult::Ok => {}
        InterpretResult::CompileError => process::exit(65),
        InterpretResult::RuntimeError => process::exit(70),
    }
}
