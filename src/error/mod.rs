//! Error types for compilation and execution.

use thiserror::Error;

/// A compile-time error: lexer, syntax, scope, or capacity.
///
/// Compilation records the first error it encounters and stops; the
/// rendered form is `[line N] Error: message`.
#[derive(Debug, Clone, Error)]
#[error("[line {line}] Error: {message}")]
pub struct CompileError {
    pub message: String,
    pub line: usize,
}

impl CompileError {
    pub fn new(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

/// One entry of a runtime call-stack trace, innermost first.
#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub line: usize,
    pub function: String,
}

/// A runtime error: type mismatch, arity mismatch, undefined global,
/// stack overflow, and friends. Carries the line of the faulting
/// instruction plus one trace entry per active call frame.
#[derive(Debug, Clone, Error)]
#[error("line {line}: {message}")]
pub struct RuntimeError {
    pub message: String,
    pub line: usize,
    pub trace: Vec<TraceFrame>,
}

impl RuntimeError {
    /// The headline followed by the call-stack trace, one frame per line.
    pub fn render(&self) -> String {
        let mut out = self.to_string();
        for frame in &self.trace {
            out.push_str(&format!("\n  line {} in {}", frame.line, frame.function));
        }
        out
    }
}

/// Unified error type for all phases.
#[derive(Debug, Error)]
pub enum SkiffError {
    #[error("{0}")]
    Compile(#[from] CompileError),

    #[error("{0}")]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
