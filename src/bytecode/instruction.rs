//! Bytecode instruction definitions for the Skiff VM.

/// Opcodes for the bytecode virtual machine.
///
/// Operand widths are fixed so a disassembler can round-trip the stream:
/// constant indices and slots are one byte, jump offsets are two bytes
/// (signed, big-endian), and `Closure` is variable-length with two inline
/// bytes per captured upvalue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Push a constant from the pool: CONSTANT <index:u8>.
    /// `nil`, `true` and `false` travel through the pool too.
    Constant = 0,
    /// Pop the top value from the stack
    Pop,

    // ============ Variables ============
    /// Get a local by frame slot: GET_LOCAL <slot:u8>
    GetLocal,
    /// Set a local by frame slot (does not pop): SET_LOCAL <slot:u8>
    SetLocal,
    /// Get an upvalue: GET_UPVALUE <index:u8>
    GetUpvalue,
    /// Set an upvalue (does not pop): SET_UPVALUE <index:u8>
    SetUpvalue,
    /// Close the upvalue pointing at the top stack slot, then pop
    CloseUpvalue,
    /// Define a global: DEFINE_GLOBAL <name_index:u8>
    DefineGlobal,
    /// Get a global: GET_GLOBAL <name_index:u8>
    GetGlobal,
    /// Set a global (does not pop): SET_GLOBAL <name_index:u8>
    SetGlobal,

    // ============ Operators ============
    Equal,
    Greater,
    Less,
    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Negate,

    /// Pop and render the top value to the output with a trailing newline
    Print,

    // ============ Control flow ============
    /// Relative jump: JUMP <offset:i16 big-endian>
    Jump,
    /// Jump if the top of stack is falsy (does not pop): JUMP_IF_FALSE <offset:i16>
    JumpIfFalse,

    // ============ Functions & classes ============
    /// Call a value with N arguments: CALL <arg_count:u8>
    Call,
    /// Build a closure: CLOSURE <fn_index:u8> then (is_local:u8, index:u8)
    /// per captured upvalue
    Closure,
    /// Return from the current frame
    Return,
    /// Push a new empty class: CLASS <name_index:u8>
    Class,
    /// Pop a closure and attach it to the class below it; the method name
    /// is read from the closure's function
    DefineMethod,
    /// Get a property (field first, then bound method): GET_PROPERTY <name_index:u8>
    GetProperty,
    /// Set a field on an instance: SET_PROPERTY <name_index:u8>
    SetProperty,
}

impl OpCode {
    /// Convert from a raw byte.
    pub fn from_u8(byte: u8) -> Option<OpCode> {
        if byte <= OpCode::SetProperty as u8 {
            Some(unsafe { std::mem::transmute::<u8, OpCode>(byte) })
        } else {
            None
        }
    }

    /// Number of fixed operand bytes. `Closure` additionally carries two
    /// inline bytes per captured upvalue.
    pub fn operand_size(self) -> usize {
        match self {
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
            | OpCode::DefineMethod => 0,

            OpCode::Constant
            | OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::GetUpvalue
            | OpCode::SetUpvalue
            | OpCode::DefineGlobal
            | OpCode::GetGlobal
            | OpCode::SetGlobal
            | OpCode::Call
            | OpCode::Closure
            | OpCode::Class
            | OpCode::GetProperty
            | OpCode::SetProperty => 1,

            OpCode::Jump | OpCode::JumpIfFalse => 2,
        }
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> u8 {
        op as u8
    }
}
