//! AST to bytecode compiler.
//!
//! Each function body compiles in its own scope with its own instruction
//! buffer and a two-deep history of emitted instructions, which is enough to
//! erase a trailing `OpPop` before a jump target is patched or to rewrite it
//! into an implicit return. Forward jumps are emitted with a `0xFFFF`
//! sentinel operand and patched once the target offset is known.

use std::{fmt, rc::Rc};

use super::{
    code::{Instructions, make},
    op::Opcode,
    symbols::{LeftScope, Symbol, SymbolScope, SymbolTable},
};
use crate::{
    ast::{Block, Expression, InfixOperator, PrefixOperator, Program, Statement},
    builtins::BUILTINS,
    value::{CompiledFunction, Value},
};

/// Placeholder operand for forward jumps, patched by `change_operand`.
const JUMP_SENTINEL: usize = 0xFFFF;

/// Compilation failure. The compiler fails fast: no partial bytecode is
/// returned, though symbol definitions made before the failure persist in
/// session mode (mirroring the host contract for constants and globals).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    UndefinedVariable(String),
    MacrosUnsupported,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UndefinedVariable(name) => write!(f, "undefined variable {name}"),
            Self::MacrosUnsupported => f.write_str("macro literals are not supported"),
        }
    }
}

impl std::error::Error for CompileError {}

/// The compiled program: main instructions plus the constant pool.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

pub struct Compiler {
    /// Append-only; equal literals may occupy distinct slots, and dedup
    /// would shift indices under running sessions.
    constants: Vec<Value>,
    symbols: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// A fresh compiler with the built-ins registered in order.
    #[must_use]
    pub fn new() -> Self {
        let mut symbols = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbols.define_builtin(index, builtin.name());
        }
        Self::with_state(symbols, Vec::new())
    }

    /// A compiler seeded with an existing symbol table and constant pool,
    /// the session-mode entry point.
    #[must_use]
    pub fn with_state(symbols: SymbolTable, constants: Vec<Value>) -> Self {
        Self {
            constants,
            symbols,
            scopes: vec![CompilationScope::default()],
        }
    }

    pub fn compile(&mut self, program: &Program) -> Result<(), CompileError> {
        for statement in &program.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    /// Consumes the compiler, returning the compiled program and the symbol
    /// table for the next session-mode compilation. Callable after a failed
    /// `compile` too, in which case the bytecode is meaningless.
    #[must_use]
    pub fn finish(mut self) -> (Bytecode, SymbolTable) {
        let main = self.scopes.swap_remove(0);
        (
            Bytecode {
                instructions: main.instructions,
                constants: self.constants,
            },
            self.symbols,
        )
    }

    /// One-shot convenience when the symbol table is not carried forward.
    #[must_use]
    pub fn into_bytecode(self) -> Bytecode {
        self.finish().0
    }

    fn compile_statement(&mut self, statement: &Statement) -> Result<(), CompileError> {
        match statement {
            Statement::Let { name, value } => {
                // Define before compiling the value so function bodies can
                // refer to themselves.
                let symbol = self.symbols.define(name);
                self.compile_expression(value)?;
                match symbol.scope {
                    SymbolScope::Global => self.emit(Opcode::SetGlobal, &[symbol.index]),
                    _ => self.emit(Opcode::SetLocal, &[symbol.index]),
                };
                Ok(())
            }
            Statement::Return(value) => {
                self.compile_expression(value)?;
                self.emit(Opcode::ReturnValue, &[]);
                Ok(())
            }
            Statement::Expression(expression) => {
                self.compile_expression(expression)?;
                self.emit(Opcode::Pop, &[]);
                Ok(())
            }
            Statement::Block(block) => self.compile_block(block),
        }
    }

    fn compile_block(&mut self, block: &Block) -> Result<(), CompileError> {
        for statement in &block.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    fn compile_expression(&mut self, expression: &Expression) -> Result<(), CompileError> {
        match expression {
            Expression::Identifier(name) => {
                let symbol = self
                    .symbols
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedVariable(name.clone()))?;
                self.load_symbol(&symbol);
                Ok(())
            }
            Expression::IntegerLiteral(value) => {
                let index = self.add_constant(Value::Integer(*value));
                self.emit(Opcode::Constant, &[index]);
                Ok(())
            }
            Expression::StringLiteral(value) => {
                let index = self.add_constant(Value::string(value));
                self.emit(Opcode::Constant, &[index]);
                Ok(())
            }
            Expression::BooleanLiteral(value) => {
                self.emit(if *value { Opcode::True } else { Opcode::False }, &[]);
                Ok(())
            }
            Expression::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator {
                    PrefixOperator::Bang => self.emit(Opcode::Bang, &[]),
                    PrefixOperator::Minus => self.emit(Opcode::Minus, &[]),
                };
                Ok(())
            }
            Expression::Infix { operator, left, right } => self.compile_infix(*operator, left, right),
            Expression::If {
                condition,
                consequence,
                alternative,
            } => self.compile_if(condition, consequence, alternative.as_ref()),
            Expression::ArrayLiteral(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Opcode::Array, &[elements.len()]);
                Ok(())
            }
            Expression::HashLiteral(pairs) => {
                // Deterministic emission order: sort by the canonical string
                // form of the key expression.
                let mut sorted: Vec<&(Expression, Expression)> = pairs.iter().collect();
                sorted.sort_by_key(|(key, _)| key.to_string());
                for (key, value) in sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(Opcode::Hash, &[pairs.len() * 2]);
                Ok(())
            }
            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Opcode::Index, &[]);
                Ok(())
            }
            Expression::FunctionLiteral {
                name,
                parameters,
                body,
            } => self.compile_function(name.as_deref(), parameters, body),
            Expression::Call { function, arguments } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(Opcode::Call, &[arguments.len()]);
                Ok(())
            }
            Expression::MacroLiteral { .. } => Err(CompileError::MacrosUnsupported),
        }
    }

    fn compile_infix(
        &mut self,
        operator: InfixOperator,
        left: &Expression,
        right: &Expression,
    ) -> Result<(), CompileError> {
        // `<` has no opcode: compile operands swapped and reuse GreaterThan.
        if operator == InfixOperator::Lt {
            self.compile_expression(right)?;
            self.compile_expression(left)?;
            self.emit(Opcode::GreaterThan, &[]);
            return Ok(());
        }

        self.compile_expression(left)?;
        self.compile_expression(right)?;
        let opcode = match operator {
            InfixOperator::Add => Opcode::Add,
            InfixOperator::Sub => Opcode::Sub,
            InfixOperator::Mul => Opcode::Mul,
            InfixOperator::Div => Opcode::Div,
            InfixOperator::Eq => Opcode::Equal,
            InfixOperator::NotEq => Opcode::NotEqual,
            InfixOperator::Gt => Opcode::GreaterThan,
            InfixOperator::Lt => unreachable!("handled above"),
        };
        self.emit(opcode, &[]);
        Ok(())
    }

    fn compile_if(
        &mut self,
        condition: &Expression,
        consequence: &Block,
        alternative: Option<&Block>,
    ) -> Result<(), CompileError> {
        self.compile_expression(condition)?;
        let jump_not_truthy = self.emit(Opcode::JumpNotTruthy, &[JUMP_SENTINEL]);

        let consequence_start = self.current_scope().instructions.len();
        self.compile_block(consequence)?;
        if self.last_instruction_is(Opcode::Pop) {
            self.remove_last_pop();
        }
        self.ensure_arm_value(consequence_start);

        let jump = self.emit(Opcode::Jump, &[JUMP_SENTINEL]);
        let after_consequence = self.current_scope().instructions.len();
        self.change_operand(jump_not_truthy, after_consequence);

        match alternative {
            None => {
                self.emit(Opcode::Null, &[]);
            }
            Some(alternative) => {
                let alternative_start = self.current_scope().instructions.len();
                self.compile_block(alternative)?;
                if self.last_instruction_is(Opcode::Pop) {
                    self.remove_last_pop();
                }
                self.ensure_arm_value(alternative_start);
            }
        }

        let after_alternative = self.current_scope().instructions.len();
        self.change_operand(jump, after_alternative);
        Ok(())
    }

    /// An arm that is empty or ends in a binding leaves nothing on the stack
    /// for the surrounding expression; give it a `null` value.
    fn ensure_arm_value(&mut self, arm_start: usize) {
        if self.current_scope().instructions.len() == arm_start
            || self.last_instruction_is(Opcode::SetGlobal)
            || self.last_instruction_is(Opcode::SetLocal)
        {
            self.emit(Opcode::Null, &[]);
        }
    }

    fn compile_function(
        &mut self,
        name: Option<&str>,
        parameters: &[String],
        body: &Block,
    ) -> Result<(), CompileError> {
        self.enter_scope();

        if let Some(name) = name {
            self.symbols.define_function_name(name);
        }
        for parameter in parameters {
            self.symbols.define(parameter);
        }

        let compiled = self.compile_block(body);
        if compiled.is_ok() {
            // A trailing expression becomes the return value; an empty or
            // non-returning body returns explicitly.
            if self.last_instruction_is(Opcode::Pop) {
                self.replace_last_pop_with_return();
            }
            if !self.last_instruction_is(Opcode::ReturnValue) {
                self.emit(Opcode::Return, &[]);
            }
        }

        // The scope must be popped even when the body failed to compile:
        // the symbol table outlives this compilation in session mode, and a
        // leaked scope would misclassify every later global as a local.
        let (instructions, left) = self.leave_scope();
        compiled?;

        // Push captured values in the enclosing scope, then build the
        // closure around them.
        for free in &left.free_symbols {
            self.load_symbol(free);
        }

        let function = CompiledFunction {
            instructions,
            num_locals: left.num_definitions,
            num_parameters: parameters.len(),
        };
        let index = self.add_constant(Value::Function(Rc::new(function)));
        self.emit(Opcode::Closure, &[index, left.free_symbols.len()]);
        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Opcode::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Opcode::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(Opcode::GetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(Opcode::CurrentClosure, &[]),
        };
    }

    /// Appends `value` to the constant pool, returning its index.
    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Emits an instruction into the current scope, returning its offset.
    fn emit(&mut self, opcode: Opcode, operands: &[usize]) -> usize {
        let encoded = make(opcode, operands);
        let scope = self.current_scope_mut();
        let position = scope.instructions.append(&encoded);
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode, position });
        position
    }

    fn last_instruction_is(&self, opcode: Opcode) -> bool {
        self.current_scope()
            .last_instruction
            .is_some_and(|instruction| instruction.opcode == opcode)
    }

    /// Erases a trailing `OpPop`, restoring the previous instruction as last.
    fn remove_last_pop(&mut self) {
        let scope = self.current_scope_mut();
        let last = scope.last_instruction.expect("remove_last_pop follows a Pop check");
        scope.instructions.truncate(last.position);
        scope.last_instruction = scope.previous_instruction.take();
    }

    /// Rewrites a trailing `OpPop` into `OpReturnValue` in place.
    fn replace_last_pop_with_return(&mut self) {
        let scope = self.current_scope_mut();
        let last = scope
            .last_instruction
            .as_mut()
            .expect("replace_last_pop_with_return follows a Pop check");
        let position = last.position;
        last.opcode = Opcode::ReturnValue;
        scope.instructions.replace(position, &make(Opcode::ReturnValue, &[]));
    }

    /// Rewrites the operand of the instruction at `position`.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let opcode = self.current_scope().instructions.opcode_at(position);
        let encoded = make(opcode, &[operand]);
        self.current_scope_mut().instructions.replace(position, &encoded);
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        self.symbols.enter_scope();
    }

    fn leave_scope(&mut self) -> (Instructions, LeftScope) {
        let scope = self.scopes.pop().expect("enter/leave scopes are paired");
        let left = self.symbols.leave_scope();
        (scope.instructions, left)
    }

    fn current_scope(&self) -> &CompilationScope {
        self.scopes.last().expect("scope stack is never empty")
    }

    fn current_scope_mut(&mut self) -> &mut CompilationScope {
        self.scopes.last_mut().expect("scope stack is never empty")
    }
}
