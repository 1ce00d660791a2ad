//! Bytecode disassembler for debugging.

use std::fmt::Write;

use crate::bytecode::chunk::Chunk;
use crate::bytecode::gc::Heap;
use crate::bytecode::instruction::OpCode;
use crate::bytecode::value::{Function, Obj, Value};

/// Disassemble a compiled function, then every function nested in its
/// constant pool.
pub fn disassemble_function(heap: &Heap, function: &Function) -> String {
    let mut output = String::new();

    writeln!(
        &mut output,
        "== {} (arity: {}) ==",
        if function.name.is_empty() {
            "<script>"
        } else {
            &function.name
        },
        function.arity
    )
    .unwrap();

    disassemble_chunk(heap, &function.chunk, &mut output);

    for constant in function.chunk.constants() {
        if let Value::Obj(obj) = constant {
            if let Obj::Function(nested) = heap.get(*obj) {
                writeln!(&mut output).unwrap();
                output.push_str(&disassemble_function(heap, nested));
            }
        }
    }

    output
}

/// Disassemble every instruction in a chunk.
pub fn disassemble_chunk(heap: &Heap, chunk: &Chunk, output: &mut String) {
    let mut offset = 0;
    while offset < chunk.len() {
        offset = disassemble_instruction(heap, chunk, offset, output);
    }
}

/// Disassemble one instruction; returns the offset of the next one.
pub fn disassemble_instruction(
    heap: &Heap,
    chunk: &Chunk,
    offset: usize,
    output: &mut String,
) -> usize {
    write!(output, "{:04} ", offset).unwrap();

    let line = chunk.line_at(offset);
    if offset > 0 && line == chunk.line_at(offset - 1) {
        write!(output, "   | ").unwrap();
    } else {
        write!(output, "{:4} ", line).unwrap();
    }

    let byte = chunk.code[offset];
    let Some(opcode) = OpCode::from_u8(byte) else {
        writeln!(output, "Unknown opcode {}", byte).unwrap();
        return offset + 1;
    };

    match opcode {
        // No operands
        OpCode::Pop
        | OpCode::CloseUpvalue
        | OpCode::Equal
        | OpCode::Greater
        | OpCode::Less
        | OpCode::Add
        | OpCode::Subtract
        | OpCode::Multiply
        | OpCode::Divide
        | OpCode::Not
        | OpCode::Negate
        | OpCode::Print
        | OpCode::Return
        | OpCode::DefineMethod => {
            writeln!(output, "{:?}", opcode).unwrap();
            offset + 1
        }

        // Raw one-byte operand
        OpCode::GetLocal
        | OpCode::SetLocal
        | OpCode::GetUpvalue
        | OpCode::SetUpvalue
        | OpCode::Call => {
            let operand = chunk.code[offset + 1];
            writeln!(output, "{:?} {}", opcode, operand).unwrap();
            offset + 2
        }

        // Constant-pool operand
        OpCode::Constant
        | OpCode::DefineGlobal
        | OpCode::GetGlobal
        | OpCode::SetGlobal
        | OpCode::Class
        | OpCode::GetProperty
        | OpCode::SetProperty => {
            let index = chunk.code[offset + 1];
            let constant = chunk.constant(index);
            writeln!(
                output,
                "{:?} {} ({})",
                opcode,
                index,
                constant_str(heap, constant)
            )
            .unwrap();
            offset + 2
        }

        // Signed 16-bit jump offset
        OpCode::Jump | OpCode::JumpIfFalse => {
            let jump = chunk.read_u16(offset + 1) as i16;
            let target = (offset as isize + 3 + jump as isize) as usize;
            writeln!(output, "{:?} {} -> {}", opcode, jump, target).unwrap();
            offset + 3
        }

        // Function index plus two inline bytes per captured upvalue
        OpCode::Closure => {
            let index = chunk.code[offset + 1];
            let constant = chunk.constant(index);
            let Value::Obj(obj) = constant else {
                writeln!(output, "{:?} {} (invalid)", opcode, index).unwrap();
                return offset + 2;
            };
            let Obj::Function(function) = heap.get(obj) else {
                writeln!(output, "{:?} {} (invalid)", opcode, index).unwrap();
                return offset + 2;
            };

            writeln!(output, "{:?} {} (<fn {}>)", opcode, index, function.name).unwrap();

            let mut next = offset + 2;
            for _ in 0..function.upvalues.len() {
                let is_local = chunk.code[next] != 0;
                let slot = chunk.code[next + 1];
                writeln!(
                    output,
                    "{:04}      |              {} {}",
                    next,
                    if is_local { "local" } else { "upvalue" },
                    slot
                )
                .unwrap();
                next += 2;
            }
            next
        }
    }
}

/// Render a constant for the disassembly listing. Strings are quoted here,
/// unlike `print` output.
fn constant_str(heap: &Heap, constant: Value) -> String {
    match constant {
        Value::Nil => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Obj(obj) => match heap.get(obj) {
            Obj::Str(s) => {
                if s.len() > 20 {
                    format!("\"{}...\"", &s[..20])
                } else {
                    format!("\"{}\"", s)
                }
            }
            Obj::Function(f) => format!("<fn {}>", f.name),
            _ => heap.object_to_string(obj),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compiler;

    fn disassemble_source(source: &str) -> String {
        let mut heap = Heap::new();
        let function = compiler::compile(source, &mut heap).unwrap();
        disassemble_function(&heap, &function)
    }

    #[test]
    fn test_disassemble_simple() {
        let output = disassemble_source("var x = 42;");
        assert!(output.contains("Constant"));
        assert!(output.contains("42"));
        assert!(output.contains("DefineGlobal"));
        assert!(output.contains("Return"));
    }

    #[test]
    fn test_disassemble_lists_nested_function() {
        let output = disassemble_source("fun add(a, b) { return a + b; }");
        assert!(output.contains("== add (arity: 2) =="));
        assert!(output.contains("GetLocal"));
        assert!(output.contains("Add"));
    }

    #[test]
    fn test_disassemble_jump_targets() {
        let output = disassemble_source("if (true) print 1;");
        assert!(output.contains("JumpIfFalse"));
        assert!(output.contains("->"));
    }

    #[test]
    fn test_disassemble_closure_upvalues() {
        let output = disassemble_source("fun o() { var x = 1; fun i() { return x; } }");
        assert!(output.contains("Closure"));
        assert!(output.contains("local 1"));
    }

    #[test]
    fn test_string_constants_are_quoted() {
        let output = disassemble_source("print \"hi\";");
        assert!(output.contains("(\"hi\")"));
    }

    #[test]
    fn test_round_trips_every_offset() {
        let mut heap = Heap::new();
        let function = compiler::compile(
            "fun f(n) { if (n < 1) return 0; return f(n - 1); } print f(3);",
            &mut heap,
        )
        .unwrap();
        // Walking the chunk must land exactly on its end.
        let mut output = String::new();
        let mut offset = 0;
        while offset < function.chunk.len() {
            offset = disassemble_instruction(&heap, &function.chunk, offset, &mut output);
        }
        assert_eq!(offset, function.chunk.len());
    }
}
