//! Single-pass compiler: pulls tokens from the scanner and emits bytecode
//! directly, with no intermediate tree.
//!
//! Expressions go through a Pratt precedence table; declarations and
//! statements are plain recursive descent. Each function under
//! compilation gets its own [`FunctionCompiler`] frame holding the locals
//! table, scope depth, upvalue descriptors, and a link to the enclosing
//! frame for upvalue resolution. The first error is recorded and parsing
//! stops; the partially emitted code is discarded by the caller.

use std::mem;

use crate::bytecode::gc::Heap;
use crate::bytecode::instruction::OpCode;
use crate::bytecode::value::{Function, Obj, ObjRef, UpvalueDescriptor, Value};
use crate::error::CompileError;
use crate::lexer::{Scanner, Token, TokenKind};

/// Slot indices are one byte, and slot 0 is reserved per frame.
const MAX_LOCALS: usize = 256;
/// Upvalue indices are one byte.
const MAX_UPVALUES: usize = 256;
/// Parameter and argument counts are one byte.
const MAX_ARITY: usize = 255;

/// Compile a program into its top-level function.
pub fn compile(source: &str, heap: &mut Heap) -> Result<Function, CompileError> {
    Parser::new(source, heap, None).run()
}

/// Compile with an extra root-marking hook, for callers whose heap already
/// holds live objects (the VM's globals and stack during a REPL session).
pub fn compile_with_roots(
    source: &str,
    heap: &mut Heap,
    extra_roots: Option<&dyn Fn(&mut Heap)>,
) -> Result<Function, CompileError> {
    Parser::new(source, heap, extra_roots).run()
}

/// Expression precedence, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ()
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::Primary,
            Precedence::Primary => unreachable!("PRIMARY has the highest precedence"),
        }
    }
}

type ParseFn<'src, 'h, 'r> = fn(&mut Parser<'src, 'h, 'r>, bool);

struct Rule<'src, 'h, 'r> {
    prefix: Option<ParseFn<'src, 'h, 'r>>,
    infix: Option<ParseFn<'src, 'h, 'r>>,
    precedence: Precedence,
}

/// What kind of function a compiler frame is building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    Toplevel,
    Function,
    Method,
    Initializer,
}

/// A local variable in scope.
struct Local<'src> {
    name: &'src str,
    depth: usize,
    is_captured: bool,
}

/// Per-function compiler state.
struct FunctionCompiler<'src> {
    function: Function,
    kind: FunctionKind,
    locals: Vec<Local<'src>>,
    scope_depth: usize,
    enclosing: Option<Box<FunctionCompiler<'src>>>,
}

impl<'src> FunctionCompiler<'src> {
    fn new(name: &str, kind: FunctionKind) -> Self {
        // Slot 0 is reserved: it holds the callee at runtime, or `this`
        // inside methods.
        let reserved = match kind {
            FunctionKind::Method | FunctionKind::Initializer => "this",
            _ => "",
        };
        Self {
            function: Function::new(name),
            kind,
            locals: vec![Local {
                name: reserved,
                depth: 0,
                is_captured: false,
            }],
            scope_depth: 0,
            enclosing: None,
        }
    }

    fn resolve_local(&self, name: &str) -> Option<usize> {
        self.locals.iter().rposition(|local| local.name == name)
    }

    fn resolve_upvalue(&mut self, name: &str) -> Result<Option<u8>, &'static str> {
        let Some(enclosing) = self.enclosing.as_mut() else {
            return Ok(None);
        };
        if let Some(slot) = enclosing.resolve_local(name) {
            enclosing.locals[slot].is_captured = true;
            return self.add_upvalue(slot as u8, true).map(Some);
        }
        if let Some(index) = self.enclosing.as_mut().unwrap().resolve_upvalue(name)? {
            return self.add_upvalue(index, false).map(Some);
        }
        Ok(None)
    }

    fn add_upvalue(&mut self, index: u8, is_local: bool) -> Result<u8, &'static str> {
        let descriptor = UpvalueDescriptor { is_local, index };
        if let Some(existing) = self
            .function
            .upvalues
            .iter()
            .position(|u| *u == descriptor)
        {
            return Ok(existing as u8);
        }
        if self.function.upvalues.len() >= MAX_UPVALUES {
            return Err("too many captured variables in function");
        }
        self.function.upvalues.push(descriptor);
        Ok((self.function.upvalues.len() - 1) as u8)
    }
}

/// The parser-compiler. Owns the scanner and the compiler frame stack.
pub struct Parser<'src, 'h, 'r> {
    scanner: Scanner<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    error: Option<CompileError>,
    heap: &'h mut Heap,
    extra_roots: Option<&'r dyn Fn(&mut Heap)>,
    compiler: Box<FunctionCompiler<'src>>,
    class_depth: usize,
}

impl<'src, 'h, 'r> Parser<'src, 'h, 'r> {
    fn new(
        source: &'src str,
        heap: &'h mut Heap,
        extra_roots: Option<&'r dyn Fn(&mut Heap)>,
    ) -> Self {
        Self {
            scanner: Scanner::new(source),
            current: Token::eof(1),
            previous: Token::eof(1),
            error: None,
            heap,
            extra_roots,
            compiler: Box::new(FunctionCompiler::new("", FunctionKind::Toplevel)),
            class_depth: 0,
        }
    }

    fn run(mut self) -> Result<Function, CompileError> {
        self.advance();
        while self.current.kind != TokenKind::Eof && self.error.is_none() {
            self.declaration();
        }
        self.emit_implicit_return();
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.compiler.function),
        }
    }

    // ===== Token plumbing =====

    fn advance(&mut self) {
        self.previous = self.current;
        self.current = self.scanner.scan_token();
        if self.current.kind == TokenKind::Error {
            let message = self.current.lexeme;
            self.error(message, self.current.line);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.check(kind) {
            self.advance();
        } else {
            self.error(message, self.current.line);
        }
    }

    /// Record the first error; later ones are dropped.
    fn error(&mut self, message: impl Into<String>, line: usize) {
        if self.error.is_none() {
            self.error = Some(CompileError::new(message, line));
        }
    }

    // ===== Declarations =====

    fn declaration(&mut self) {
        if self.matches(TokenKind::Var) {
            self.var_declaration();
        } else if self.matches(TokenKind::Fun) {
            self.function(false);
        } else if self.matches(TokenKind::Class) {
            self.class_declaration();
        } else {
            self.statement();
        }
    }

    fn var_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "expected variable name");
        let name = self.previous.lexeme;
        if self.matches(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_constant(Value::Nil);
        }
        self.define_variable(name);
        self.consume(
            TokenKind::Semicolon,
            "expected ';' after variable declaration",
        );
    }

    fn function(&mut self, is_method: bool) {
        self.consume(TokenKind::Identifier, "expected function name");
        let name = self.previous.lexeme;
        self.consume(TokenKind::LeftParen, "expected '(' after function name");

        let kind = if is_method {
            if name == "init" {
                FunctionKind::Initializer
            } else {
                FunctionKind::Method
            }
        } else {
            FunctionKind::Function
        };
        self.begin_function(name, kind);
        self.begin_scope();

        let mut arity: usize = 0;
        if !self.matches(TokenKind::RightParen) {
            loop {
                arity += 1;
                if arity > MAX_ARITY {
                    self.error("cannot have more than 255 parameters", self.previous.line);
                }
                self.consume(TokenKind::Identifier, "expected parameter name");
                let parameter = self.previous.lexeme;
                self.define_variable(parameter);
                if self.matches(TokenKind::Comma) {
                    continue;
                }
                if self.matches(TokenKind::RightParen) {
                    break;
                }
                self.error("expected ',' or ')' after parameter", self.previous.line);
                break;
            }
        }
        self.compiler.function.arity = arity.min(MAX_ARITY) as u8;

        self.consume(TokenKind::LeftBrace, "expected '{' before function body");
        self.block();

        let function = self.end_function();
        let descriptors = function.upvalues.clone();
        let function_ref = self.alloc_function(function);
        let index = self.make_constant(Value::Obj(function_ref));
        self.emit_op(OpCode::Closure);
        self.emit_byte(index);
        for upvalue in &descriptors {
            self.emit_byte(upvalue.is_local as u8);
            self.emit_byte(upvalue.index);
        }

        // A method's name lives in the class's method table, not in a
        // variable of its own.
        if !is_method {
            self.define_variable(name);
        }
    }

    fn class_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "expected class name");
        let name = self.previous.lexeme;
        let name_ref = self.intern(name);
        let index = self.make_constant(Value::Obj(name_ref));
        self.emit_op(OpCode::Class);
        self.emit_byte(index);

        self.class_depth += 1;
        self.define_variable(name);
        // Put the class back on top of the stack so DEFINE_METHOD can find
        // it below each compiled method.
        self.named_variable(name, false);

        self.consume(TokenKind::LeftBrace, "expected '{' before class body");
        while !self.check(TokenKind::RightBrace)
            && !self.check(TokenKind::Eof)
            && self.error.is_none()
        {
            self.method();
        }
        self.consume(TokenKind::RightBrace, "expected '}' after class body");

        self.emit_op(OpCode::Pop);
        self.class_depth -= 1;
    }

    fn method(&mut self) {
        self.function(true);
        // The VM reads the method name from the compiled function itself,
        // so no operand is needed.
        self.emit_op(OpCode::DefineMethod);
    }

    /// Bind whatever the emitted code leaves on the stack to `name`,
    /// either as a fresh local or via DEFINE_GLOBAL.
    fn define_variable(&mut self, name: &'src str) {
        if self.compiler.scope_depth > 0 {
            self.declare_local(name);
        } else {
            let name_ref = self.intern(name);
            let index = self.make_constant(Value::Obj(name_ref));
            self.emit_op(OpCode::DefineGlobal);
            self.emit_byte(index);
        }
    }

    fn declare_local(&mut self, name: &'src str) {
        if self.compiler.locals.len() >= MAX_LOCALS {
            self.error("too many local variables in function", self.previous.line);
            return;
        }
        let depth = self.compiler.scope_depth;
        for local in self.compiler.locals.iter().rev() {
            if local.depth < depth {
                break;
            }
            if local.name == name {
                self.error(
                    format!("variable '{}' already declared in this scope", name),
                    self.previous.line,
                );
                return;
            }
        }
        self.compiler.locals.push(Local {
            name,
            depth,
            is_captured: false,
        });
    }

    // ===== Statements =====

    fn statement(&mut self) {
        if self.matches(TokenKind::Print) {
            self.print_statement();
        } else if self.matches(TokenKind::If) {
            self.if_statement();
        } else if self.matches(TokenKind::While) {
            self.while_statement();
        } else if self.matches(TokenKind::For) {
            self.for_statement();
        } else if self.matches(TokenKind::Return) {
            self.return_statement();
        } else if self.matches(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace)
            && !self.check(TokenKind::Eof)
            && self.error.is_none()
        {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "expected '}' after block");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(
            TokenKind::Semicolon,
            "expected ';' after value in print statement",
        );
        self.emit_op(OpCode::Print);
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "expected '(' after 'if'");
        self.expression();
        self.consume(TokenKind::RightParen, "expected ')' after condition");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        let else_jump = self.emit_jump(OpCode::Jump);

        let else_target = self.chunk_len();
        self.patch_jump(then_jump, else_target);
        self.emit_op(OpCode::Pop);
        if self.matches(TokenKind::Else) {
            self.statement();
        }
        let end_target = self.chunk_len();
        self.patch_jump(else_jump, end_target);
    }

    fn while_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "expected '(' after 'while'");
        let loop_start = self.chunk_len();
        self.expression();
        self.consume(TokenKind::RightParen, "expected ')' after while condition");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        let loop_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(loop_jump, loop_start);

        let exit_target = self.chunk_len();
        self.patch_jump(exit_jump, exit_target);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "expected '(' after 'for'");
        self.begin_scope();

        // Initializer; each branch eats the trailing semicolon.
        if self.matches(TokenKind::Semicolon) {
            // none
        } else if self.matches(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let condition_start = self.chunk_len();
        let has_condition = !self.matches(TokenKind::Semicolon);
        let mut exit_jump = 0;
        if has_condition {
            self.expression();
            self.consume(TokenKind::Semicolon, "expected ';' after loop condition");
            exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        }

        // Jump over the increment; it runs after the body.
        let body_jump = self.emit_jump(OpCode::Jump);
        let increment_start = self.chunk_len();
        if self.matches(TokenKind::RightParen) {
            // no increment
        } else {
            self.expression();
            self.consume(TokenKind::RightParen, "expected ')' after for clauses");
            self.emit_op(OpCode::Pop);
        }
        if has_condition {
            let condition_jump = self.emit_jump(OpCode::Jump);
            self.patch_jump(condition_jump, condition_start);
        }

        let body_target = self.chunk_len();
        self.patch_jump(body_jump, body_target);
        if has_condition {
            self.emit_op(OpCode::Pop);
        }
        self.statement();
        let increment_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(increment_jump, increment_start);

        if has_condition {
            let exit_target = self.chunk_len();
            self.patch_jump(exit_jump, exit_target);
            self.emit_op(OpCode::Pop);
        }

        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.compiler.kind == FunctionKind::Toplevel {
            self.error("cannot return from top-level code", self.previous.line);
        }
        if self.matches(TokenKind::Semicolon) {
            self.emit_implicit_return();
        } else {
            if self.compiler.kind == FunctionKind::Initializer {
                self.error(
                    "cannot return a value from an initializer",
                    self.previous.line,
                );
            }
            self.expression();
            self.consume(TokenKind::Semicolon, "expected ';' after return value");
            self.emit_op(OpCode::Return);
        }
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "expected ';' after expression");
        self.emit_op(OpCode::Pop);
    }

    // ===== Expressions (Pratt) =====

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let Some(prefix) = Self::rule(self.previous.kind).prefix else {
            self.error("expected expression", self.previous.line);
            return;
        };
        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while Self::rule(self.current.kind).precedence >= precedence && self.error.is_none() {
            self.advance();
            let infix = Self::rule(self.previous.kind)
                .infix
                .expect("token with an expression precedence has no infix rule");
            infix(self, can_assign);
        }

        if can_assign && self.matches(TokenKind::Equal) {
            self.error("invalid assignment target", self.previous.line);
        }
    }

    fn rule(kind: TokenKind) -> Rule<'src, 'h, 'r> {
        let (prefix, infix, precedence): (
            Option<ParseFn<'src, 'h, 'r>>,
            Option<ParseFn<'src, 'h, 'r>>,
            Precedence,
        ) = match kind {
            TokenKind::LeftParen => (Some(Self::grouping), Some(Self::call), Precedence::Call),
            TokenKind::Dot => (None, Some(Self::dot), Precedence::Call),
            TokenKind::Minus => (Some(Self::unary), Some(Self::binary), Precedence::Term),
            TokenKind::Plus => (None, Some(Self::binary), Precedence::Term),
            TokenKind::Slash | TokenKind::Star => {
                (None, Some(Self::binary), Precedence::Factor)
            }
            TokenKind::Bang => (Some(Self::unary), None, Precedence::None),
            TokenKind::BangEqual | TokenKind::EqualEqual => {
                (None, Some(Self::binary), Precedence::Equality)
            }
            TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::Less
            | TokenKind::LessEqual => (None, Some(Self::binary), Precedence::Comparison),
            TokenKind::Identifier => (Some(Self::variable), None, Precedence::None),
            TokenKind::String => (Some(Self::string), None, Precedence::None),
            TokenKind::Number => (Some(Self::number), None, Precedence::None),
            TokenKind::And => (None, Some(Self::and_operator), Precedence::And),
            TokenKind::Or => (None, Some(Self::or_operator), Precedence::Or),
            TokenKind::False | TokenKind::Nil | TokenKind::True => {
                (Some(Self::literal), None, Precedence::None)
            }
            TokenKind::This => (Some(Self::this), None, Precedence::None),
            _ => (None, None, Precedence::None),
        };
        Rule {
            prefix,
            infix,
            precedence,
        }
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightParen, "expected ')'");
    }

    fn number(&mut self, _can_assign: bool) {
        match self.previous.lexeme.parse::<f64>() {
            Ok(value) => self.emit_constant(Value::Number(value)),
            Err(_) => self.error("invalid number literal", self.previous.line),
        }
    }

    fn string(&mut self, _can_assign: bool) {
        let text = self.previous.lexeme;
        let obj = self.intern(text);
        self.emit_constant(Value::Obj(obj));
    }

    fn literal(&mut self, _can_assign: bool) {
        let value = match self.previous.kind {
            TokenKind::False => Value::Bool(false),
            TokenKind::True => Value::Bool(true),
            TokenKind::Nil => Value::Nil,
            kind => unreachable!("unknown literal token {:?}", kind),
        };
        self.emit_constant(value);
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.previous.lexeme;
        self.named_variable(name, can_assign);
    }

    fn this(&mut self, _can_assign: bool) {
        if self.class_depth == 0 {
            self.error("cannot use 'this' outside of a class", self.previous.line);
            return;
        }
        // `this` is an ordinary read of the reserved slot-0 local of the
        // enclosing method, possibly through an upvalue.
        self.variable(false);
    }

    fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            TokenKind::Bang => self.emit_op(OpCode::Not),
            kind => unreachable!("unknown unary operator {:?}", kind),
        }
    }

    fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        let rule = Self::rule(operator);
        self.parse_precedence(rule.precedence.next());
        match operator {
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::BangEqual => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => {
                self.emit_op(OpCode::Less);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => {
                self.emit_op(OpCode::Greater);
                self.emit_op(OpCode::Not);
            }
            kind => unreachable!("unknown binary operator {:?}", kind),
        }
    }

    fn and_operator(&mut self, _can_assign: bool) {
        // Left operand is on the stack. Falsy: skip the right operand and
        // keep the left value. Truthy: discard it and evaluate the right.
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        let end_target = self.chunk_len();
        self.patch_jump(end_jump, end_target);
    }

    fn or_operator(&mut self, _can_assign: bool) {
        // There is no jump-if-true opcode, so falsy hops over an
        // unconditional jump that short-circuits the truthy case.
        let right_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        let right_target = self.chunk_len();
        self.patch_jump(right_jump, right_target);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        let end_target = self.chunk_len();
        self.patch_jump(end_jump, end_target);
    }

    fn call(&mut self, _can_assign: bool) {
        let arg_count = self.argument_list();
        self.emit_op(OpCode::Call);
        self.emit_byte(arg_count);
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: usize = 0;
        if !self.matches(TokenKind::RightParen) {
            loop {
                count += 1;
                if count > MAX_ARITY {
                    self.error("cannot have more than 255 arguments", self.previous.line);
                }
                self.expression();
                if self.matches(TokenKind::Comma) {
                    continue;
                }
                if self.matches(TokenKind::RightParen) {
                    break;
                }
                self.error("expected ',' or ')' after argument", self.previous.line);
                break;
            }
        }
        count.min(MAX_ARITY) as u8
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenKind::Identifier, "expected property name after '.'");
        let name = self.previous.lexeme;
        let name_ref = self.intern(name);
        let index = self.make_constant(Value::Obj(name_ref));
        self.emit_variable_access(OpCode::SetProperty, OpCode::GetProperty, can_assign, index);
    }

    // ===== Variable resolution =====

    fn named_variable(&mut self, name: &'src str, can_assign: bool) {
        if let Some(slot) = self.compiler.resolve_local(name) {
            self.emit_variable_access(OpCode::SetLocal, OpCode::GetLocal, can_assign, slot as u8);
        } else if let Some(index) = self.resolve_upvalue(name) {
            self.emit_variable_access(OpCode::SetUpvalue, OpCode::GetUpvalue, can_assign, index);
        } else {
            // Not found anywhere lexically, so it's a global. That can't be
            // checked here: the global may be defined later at runtime.
            let name_ref = self.intern(name);
            let index = self.make_constant(Value::Obj(name_ref));
            self.emit_variable_access(OpCode::SetGlobal, OpCode::GetGlobal, can_assign, index);
        }
    }

    fn resolve_upvalue(&mut self, name: &str) -> Option<u8> {
        match self.compiler.resolve_upvalue(name) {
            Ok(result) => result,
            Err(message) => {
                self.error(message, self.previous.line);
                Some(0)
            }
        }
    }

    fn emit_variable_access(&mut self, set: OpCode, get: OpCode, can_assign: bool, operand: u8) {
        if self.matches(TokenKind::Equal) {
            if !can_assign {
                self.error("invalid assignment target", self.previous.line);
            }
            self.expression();
            self.emit_op(set);
            self.emit_byte(operand);
        } else {
            self.emit_op(get);
            self.emit_byte(operand);
        }
    }

    // ===== Scopes and function frames =====

    fn begin_scope(&mut self) {
        self.compiler.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.compiler.scope_depth -= 1;
        while let Some(local) = self.compiler.locals.last() {
            if local.depth <= self.compiler.scope_depth {
                break;
            }
            let op = if local.is_captured {
                OpCode::CloseUpvalue
            } else {
                OpCode::Pop
            };
            self.compiler.locals.pop();
            self.emit_op(op);
        }
    }

    fn begin_function(&mut self, name: &str, kind: FunctionKind) {
        let fresh = Box::new(FunctionCompiler::new(name, kind));
        let enclosing = mem::replace(&mut self.compiler, fresh);
        self.compiler.enclosing = Some(enclosing);
    }

    fn end_function(&mut self) -> Function {
        self.emit_implicit_return();
        let enclosing = self
            .compiler
            .enclosing
            .take()
            .expect("function compiler has no enclosing frame");
        let finished = mem::replace(&mut self.compiler, enclosing);
        finished.function
    }

    /// Falling off the end of a body returns nil, except initializers,
    /// which return `this` from slot 0.
    fn emit_implicit_return(&mut self) {
        if self.compiler.kind == FunctionKind::Initializer {
            self.emit_op(OpCode::GetLocal);
            self.emit_byte(0);
        } else {
            self.emit_constant(Value::Nil);
        }
        self.emit_op(OpCode::Return);
    }

    // ===== Emission =====

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.compiler.function.chunk.write_byte(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op as u8);
    }

    fn chunk_len(&self) -> usize {
        self.compiler.function.chunk.len()
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        match self.compiler.function.chunk.push_constant(value) {
            Some(index) => index,
            None => {
                self.error("Too many constants in one chunk.", self.previous.line);
                0
            }
        }
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_op(OpCode::Constant);
        self.emit_byte(index);
    }

    /// Emit a jump with a placeholder offset; returns the offset of the
    /// two operand bytes for patching.
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.chunk_len() - 2
    }

    /// Patch the jump whose operand sits at `operand_offset` to land on
    /// `target`. Offsets are signed, so this covers backward jumps too.
    fn patch_jump(&mut self, operand_offset: usize, target: usize) {
        let jump = target as isize - operand_offset as isize - 2;
        if jump > i16::MAX as isize || jump < i16::MIN as isize {
            self.error("Too much code to jump over.", self.previous.line);
            return;
        }
        let [high, low] = (jump as i16).to_be_bytes();
        self.compiler.function.chunk.patch_byte(operand_offset, high);
        self.compiler.function.chunk.patch_byte(operand_offset + 1, low);
    }

    // ===== Heap cooperation =====

    fn intern(&mut self, text: &str) -> ObjRef {
        if self.heap.should_collect() {
            self.mark_roots();
            self.heap.collect();
        }
        self.heap.intern(text)
    }

    fn alloc_function(&mut self, function: Function) -> ObjRef {
        if self.heap.should_collect() {
            // The finished function is not reachable from any frame yet;
            // its constants must survive this collection.
            for value in function.chunk.constants() {
                self.heap.mark_value(*value);
            }
            self.mark_roots();
            self.heap.collect();
        }
        self.heap.alloc(Obj::Function(function))
    }

    /// The constants of every in-flight function are GC roots while
    /// compilation is running.
    fn mark_roots(&mut self) {
        let mut frame = Some(self.compiler.as_ref());
        while let Some(current) = frame {
            for value in current.function.chunk.constants() {
                self.heap.mark_value(*value);
            }
            frame = current.enclosing.as_deref();
        }
        if let Some(extra) = self.extra_roots {
            extra(self.heap);
        }
    }
}
