//! Shared helpers for the Skiff integration tests.
//!
//! In a test file, add:
//! ```ignore
//! mod common;
//! use common::*;
//! ```

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

pub use skiff::error::{CompileError, RuntimeError, SkiffError};
pub use skiff::Vm;

struct SharedWriter(Rc<RefCell<Vec<u8>>>);

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A VM whose output lands in a shared buffer.
pub fn capturing_vm() -> (Vm, Rc<RefCell<Vec<u8>>>) {
    let buffer = Rc::new(RefCell::new(Vec::new()));
    let vm = Vm::with_output(Box::new(SharedWriter(buffer.clone())));
    (vm, buffer)
}

/// Run a program on a fresh VM and return everything it printed.
pub fn run_program(source: &str) -> Result<String, SkiffError> {
    let (mut vm, buffer) = capturing_vm();
    vm.interpret(source)?;
    let bytes = buffer.borrow().clone();
    Ok(String::from_utf8(bytes).expect("program output is not UTF-8"))
}

/// Run a program and return its output, panicking on any error.
#[allow(dead_code)]
pub fn expect_output(source: &str) -> String {
    match run_program(source) {
        Ok(output) => output,
        Err(err) => panic!("program failed: {}\nsource: {}", err, source),
    }
}

/// Run a program expected to fail at compile time.
#[allow(dead_code)]
pub fn expect_compile_error(source: &str) -> CompileError {
    match run_program(source) {
        Err(SkiffError::Compile(err)) => err,
        other => panic!("expected compile error, got {:?}\nsource: {}", other, source),
    }
}

/// Run a program expected to fail at runtime.
#[allow(dead_code)]
pub fn expect_runtime_error(source: &str) -> RuntimeError {
    match run_program(source) {
        Err(SkiffError::Runtime(err)) => err,
        other => panic!("expected runtime error, got {:?}\nsource: {}", other, source),
    }
}
