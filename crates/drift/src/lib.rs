#![doc = include_str!("../../../README.md")]

mod ast;
mod builtins;
mod bytecode;
mod io;
mod lexer;
mod parse;
mod session;
mod token;
mod value;

pub use crate::{
    ast::{Block, Expression, InfixOperator, PrefixOperator, Program, Statement},
    builtins::{BUILTINS, Builtin},
    bytecode::{
        Bytecode, CompileError, Compiler, Definition, GLOBALS_SIZE, Instructions, LeftScope, MAX_FRAMES, Opcode,
        Operands, RunError, STACK_SIZE, Symbol, SymbolScope, SymbolTable, VM, make, new_globals, read_operands,
    },
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    lexer::Lexer,
    parse::Parser,
    session::{ExecutionResult, Session, SessionError},
    token::{Token, TokenKind},
    value::{Closure, CompiledFunction, HashKey, HashPair, Value, ValueKind},
};
