//! Skiff: a bytecode interpreter for a small, dynamically typed,
//! class-based scripting language.
//!
//! Source text is scanned and compiled to stack-based bytecode in a
//! single pass, then executed by a virtual machine cooperating with a
//! tracing mark-and-sweep garbage collector.

pub mod bytecode;
pub mod error;
pub mod lexer;
pub mod repl;

pub use bytecode::{disassemble_function, Vm};
use error::SkiffError;

/// Outcome of interpreting a piece of source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

/// Interpret a program with a fresh VM, reporting errors to stderr.
///
/// For embedding (or to keep globals alive across inputs, as the REPL
/// does), drive a [`Vm`] directly via [`Vm::interpret`].
pub fn interpret(source: &str) -> InterpretResult {
    let mut vm = Vm::new();
    report(vm.interpret(source))
}

/// Print an error the standard way and classify the outcome.
pub fn report(result: Result<(), SkiffError>) -> InterpretResult {
    match result {
        Ok(()) => InterpretResult::Ok,
        Err(SkiffError::Compile(err)) => {
            eprintln!("{}", err);
            InterpretResult::CompileError
        }
        Err(SkiffError::Runtime(err)) => {
            eprintln!("{}", err.render());
            InterpretResult::RuntimeError
        }
        Err(SkiffError::Io(err)) => {
            eprintln!("IO error: {}", err);
            InterpretResult::RuntimeError
        }
    }
}
