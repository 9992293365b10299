//! Persistent execution sessions.
//!
//! A [`Session`] keeps the constant pool, the globals slice, and the symbol
//! table alive across successive `execute` calls, so later snippets see the
//! bindings of earlier ones; the read-eval loop and hosted execution
//! surfaces both sit on this. One-shot execution is a fresh session used
//! once.

use std::fmt;

use crate::{
    builtins::BUILTINS,
    bytecode::{CompileError, Compiler, RunError, SymbolTable, VM, new_globals},
    io::{CollectStringPrint, PrintWriter},
    parse::Parser,
    value::Value,
};

/// Host-facing outcome of one `execute` call.
///
/// Serializes with the exact field names hosts consume: `success` plus at
/// most one of `result`, `parserErrors`, `compilerError`, `runtimeError`;
/// absent fields are omitted.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parser_errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_error: Option<String>,
}

impl ExecutionResult {
    /// A successful outcome; an empty result string is omitted entirely.
    #[must_use]
    pub fn success(result: String) -> Self {
        Self {
            success: true,
            result: (!result.is_empty()).then_some(result),
            parser_errors: None,
            compiler_error: None,
            runtime_error: None,
        }
    }

    fn failure() -> Self {
        Self {
            success: false,
            result: None,
            parser_errors: None,
            compiler_error: None,
            runtime_error: None,
        }
    }
}

impl From<SessionError> for ExecutionResult {
    fn from(error: SessionError) -> Self {
        let mut result = Self::failure();
        match error {
            SessionError::Parse(messages) => result.parser_errors = Some(messages),
            SessionError::Compile(error) => result.compiler_error = Some(error.to_string()),
            SessionError::Runtime(error) => result.runtime_error = Some(error.to_string()),
        }
        result
    }
}

/// Error type for session execution, separating failures by pipeline stage.
///
/// Keeping parse/compile/runtime failures distinct lets callers handle user
/// feedback and recovery accurately without string matching.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Parsing failed; the accumulated parser messages, in source order.
    Parse(Vec<String>),
    /// Compilation failed after parsing succeeded.
    Compile(CompileError),
    /// Execution failed after compilation succeeded.
    Runtime(RunError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(messages) => {
                writeln!(f, "parser errors:")?;
                for message in messages {
                    writeln!(f, "\t{message}")?;
                }
                Ok(())
            }
            Self::Compile(error) => write!(f, "compiler error: {error}"),
            Self::Runtime(error) => write!(f, "runtime error: {error}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<CompileError> for SessionError {
    fn from(error: CompileError) -> Self {
        Self::Compile(error)
    }
}

impl From<RunError> for SessionError {
    fn from(error: RunError) -> Self {
        Self::Runtime(error)
    }
}

/// A persistent session: constants, globals, and the symbol table survive
/// across `execute` calls.
///
/// The session owns all three artifacts between calls. After each call the
/// constant pool is replaced by the compiler's updated list and globals are
/// updated in place; symbol definitions persist once compilation reached
/// them, even if the subsequent run fails.
pub struct Session {
    constants: Vec<Value>,
    globals: Vec<Value>,
    symbols: SymbolTable,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A fresh session with the built-ins registered.
    #[must_use]
    pub fn new() -> Self {
        let mut symbols = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbols.define_builtin(index, builtin.name());
        }
        Self {
            constants: Vec::new(),
            globals: new_globals(),
            symbols,
        }
    }

    /// Discards all session state and re-registers the built-ins.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Compiles and runs `source`, collecting `puts` output into the result.
    ///
    /// On success the result string is the concatenation of any `puts`
    /// output and the canonical form of the final expression value (omitted
    /// when that value is `null`).
    pub fn execute(&mut self, source: &str) -> ExecutionResult {
        let mut writer = CollectStringPrint::new();
        match self.run_source(source, &mut writer) {
            Ok(value) => {
                let mut result = writer.into_output();
                if !matches!(value, Value::Null) {
                    result.push_str(&value.to_string());
                }
                ExecutionResult::success(result)
            }
            Err(error) => error.into(),
        }
    }

    /// Like [`execute`](Self::execute), but streams `puts` output to the
    /// given sink as it happens; the result string then carries only the
    /// final expression value.
    pub fn execute_with<W: PrintWriter>(&mut self, source: &str, writer: &mut W) -> ExecutionResult {
        match self.run_source(source, writer) {
            Ok(Value::Null) => ExecutionResult::success(String::new()),
            Ok(value) => ExecutionResult::success(value.to_string()),
            Err(error) => error.into(),
        }
    }

    /// The typed pipeline: parse, compile against session state, run.
    pub fn run_source<W: PrintWriter>(&mut self, source: &str, writer: &mut W) -> Result<Value, SessionError> {
        let mut parser = Parser::from_source(source);
        let program = parser.parse_program();
        if !parser.errors().is_empty() {
            return Err(SessionError::Parse(parser.into_errors()));
        }

        let mut compiler = Compiler::with_state(std::mem::take(&mut self.symbols), self.constants.clone());
        let compiled = compiler.compile(&program);
        let (bytecode, symbols) = compiler.finish();
        self.symbols = symbols;
        if let Err(error) = compiled {
            return Err(error.into());
        }
        // Persist the updated pool before running, so a failed run cannot
        // strand bytecode that references constants the session forgot.
        self.constants = bytecode.constants.clone();

        let mut vm = VM::new(&bytecode, &mut self.globals, writer);
        vm.run()?;
        Ok(vm.last_popped().clone())
    }
}
