//! Bytecode backend: ISA, symbol table, compiler, and virtual machine.
//!
//! # Module structure
//!
//! - `op` - opcode enum and the per-opcode definitions table
//! - `code` - instruction encoding, decoding, and disassembly
//! - `symbols` - lexically scoped symbol table with free-variable promotion
//! - `compiler` - AST to bytecode compiler
//! - `vm` - stack virtual machine

pub use code::{Instructions, Operands, make, read_operands, read_u16};
pub use compiler::{Bytecode, CompileError, Compiler};
pub use op::{Definition, Opcode};
pub use symbols::{LeftScope, Symbol, SymbolScope, SymbolTable};
pub use vm::{GLOBALS_SIZE, MAX_FRAMES, RunError, STACK_SIZE, VM, new_globals};

pub(crate) mod code;
mod compiler;
mod op;
mod symbols;
mod vm;
