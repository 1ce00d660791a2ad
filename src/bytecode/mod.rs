//! Bytecode engine for Skiff.
//!
//! - `instruction`: opcode definitions and operand widths
//! - `chunk`: compiled code, constant pool, and line table
//! - `value`: runtime values and heap object payloads
//! - `gc`: the object arena and mark-and-sweep collector
//! - `compiler`: single-pass Pratt compiler from tokens to bytecode
//! - `vm`: the stack-based virtual machine
//! - `disassembler`: debug output for bytecode inspection

pub mod chunk;
pub mod compiler;
pub mod disassembler;
pub mod gc;
pub mod instruction;
pub mod value;
pub mod vm;

pub use chunk::Chunk;
pub use disassembler::disassemble_function;
pub use gc::Heap;
pub use instruction::OpCode;
pub use value::{Function, Value};
pub use vm::Vm;
