//! Stack virtual machine.
//!
//! The VM executes compiled bytecode against a value stack, a frame stack,
//! and a globals slice supplied by the host. Each frame owns its own
//! instruction pointer; the base pointer marks where the callee's locals
//! begin on the value stack. Execution is single-threaded and runs to
//! completion; the only I/O is `puts` writing to the host-provided sink.

use std::{fmt, rc::Rc};

use indexmap::IndexMap;

use super::{code, compiler::Bytecode, op::Opcode};
use crate::{
    builtins::BUILTINS,
    io::PrintWriter,
    value::{Closure, CompiledFunction, HashPair, Value, ValueKind},
};

/// Value stack capacity; hitting it is a fatal `stack overflow`.
pub const STACK_SIZE: usize = 2048;
/// Call depth limit; hitting it is a fatal `frame overflow`.
pub const MAX_FRAMES: usize = 1024;
/// Globals slice size. Indices are u16 in the bytecode, so the compiler
/// cannot address past this.
pub const GLOBALS_SIZE: usize = 65536;

/// A fatal runtime error. The VM does not continue past one; the call frame
/// stack is discarded with the VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    StackOverflow,
    FrameOverflow,
    CallingNonFunction,
    WrongArgumentCount { want: usize, got: usize },
    UnsupportedBinaryTypes { left: ValueKind, operator: &'static str, right: ValueKind },
    /// Operator applied to operand kinds it is not defined for; the payload
    /// is the rendered operator-and-operands text.
    UnknownOperator(String),
    UnknownIntegerOperator(Opcode),
    DivisionByZero,
    IndexNotSupported(ValueKind),
    UnusableHashKey(ValueKind),
    /// Not-a-closure constant reached `OpClosure`; indicates corrupt bytecode.
    NotAFunction(ValueKind),
    /// A built-in rejected its arguments; the message is already formatted.
    Builtin(String),
}

impl RunError {
    pub(crate) fn builtin(message: impl Into<String>) -> Self {
        Self::Builtin(message.into())
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackOverflow => f.write_str("stack overflow"),
            Self::FrameOverflow => f.write_str("frame overflow"),
            Self::CallingNonFunction => f.write_str("calling non-function"),
            Self::WrongArgumentCount { want, got } => {
                write!(f, "wrong number of arguments: want={want}, got={got}")
            }
            Self::UnsupportedBinaryTypes { left, operator, right } => {
                write!(f, "unsupported types for binary operation: {left} {operator} {right}")
            }
            Self::UnknownOperator(rendered) => write!(f, "unknown operator: {rendered}"),
            Self::UnknownIntegerOperator(opcode) => write!(f, "unknown integer operator: {opcode}"),
            Self::DivisionByZero => f.write_str("division by zero"),
            Self::IndexNotSupported(kind) => write!(f, "index operator not supported: {kind}"),
            Self::UnusableHashKey(kind) => write!(f, "unusable as hash key: {kind}"),
            Self::NotAFunction(kind) => write!(f, "not a function: {kind}"),
            Self::Builtin(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for RunError {}

/// A single function activation: the executing closure, its instruction
/// pointer, and the stack index where its locals begin.
#[derive(Debug)]
struct Frame {
    closure: Rc<Closure>,
    ip: usize,
    base_pointer: usize,
}

impl Frame {
    fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Self {
            closure,
            ip: 0,
            base_pointer,
        }
    }
}

/// The virtual machine. Borrows the program's constants and the host's
/// globals slice; owns its value and frame stacks.
pub struct VM<'a, W: PrintWriter> {
    constants: &'a [Value],
    stack: Vec<Value>,
    /// Points one past the top of the stack.
    sp: usize,
    globals: &'a mut [Value],
    frames: Vec<Frame>,
    /// Exposes the most recent expression value to the host.
    last_popped: Value,
    writer: &'a mut W,
}

impl<'a, W: PrintWriter> VM<'a, W> {
    /// Builds a VM over compiled bytecode. The main program runs as a
    /// zero-argument closure in the bottom frame.
    pub fn new(bytecode: &'a Bytecode, globals: &'a mut [Value], writer: &'a mut W) -> Self {
        let main_function = Rc::new(CompiledFunction {
            instructions: bytecode.instructions.clone(),
            num_locals: 0,
            num_parameters: 0,
        });
        let main_closure = Rc::new(Closure {
            function: main_function,
            free: Vec::new(),
        });
        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame::new(main_closure, 0));

        Self {
            constants: &bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals,
            frames,
            last_popped: Value::Null,
            writer,
        }
    }

    /// The value most recently popped by `OpPop`, which is the result of
    /// the last expression statement.
    #[must_use]
    pub fn last_popped(&self) -> &Value {
        &self.last_popped
    }

    /// Runs until the main frame exhausts its instructions or an error ends
    /// execution.
    pub fn run(&mut self) -> Result<(), RunError> {
        loop {
            let frame = self.frames.last().expect("the main frame is never popped");
            let ip = frame.ip;
            let closure = Rc::clone(&frame.closure);
            let ins = closure.function.instructions.as_bytes();
            if ip >= ins.len() {
                return Ok(());
            }

            let opcode = Opcode::from_repr(ins[ip]).expect("compiled bytecode holds only valid opcodes");
            match opcode {
                Opcode::Constant => {
                    let index = usize::from(code::read_u16(ins, ip + 1));
                    self.frame_mut().ip = ip + 3;
                    self.push(self.constants[index].clone())?;
                }
                Opcode::Pop => {
                    self.frame_mut().ip = ip + 1;
                    self.last_popped = self.pop();
                }
                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                    self.frame_mut().ip = ip + 1;
                    self.execute_binary_operation(opcode)?;
                }
                Opcode::True => {
                    self.frame_mut().ip = ip + 1;
                    self.push(Value::Boolean(true))?;
                }
                Opcode::False => {
                    self.frame_mut().ip = ip + 1;
                    self.push(Value::Boolean(false))?;
                }
                Opcode::Null => {
                    self.frame_mut().ip = ip + 1;
                    self.push(Value::Null)?;
                }
                Opcode::Equal | Opcode::NotEqual | Opcode::GreaterThan => {
                    self.frame_mut().ip = ip + 1;
                    self.execute_comparison(opcode)?;
                }
                Opcode::Minus => {
                    self.frame_mut().ip = ip + 1;
                    match self.pop() {
                        Value::Integer(value) => self.push(Value::Integer(value.wrapping_neg()))?,
                        other => return Err(RunError::UnknownOperator(format!("-{}", other.kind()))),
                    }
                }
                Opcode::Bang => {
                    self.frame_mut().ip = ip + 1;
                    let operand = self.pop();
                    self.push(Value::Boolean(!operand.is_truthy()))?;
                }
                Opcode::JumpNotTruthy => {
                    let target = usize::from(code::read_u16(ins, ip + 1));
                    self.frame_mut().ip = ip + 3;
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.frame_mut().ip = target;
                    }
                }
                Opcode::Jump => {
                    let target = usize::from(code::read_u16(ins, ip + 1));
                    self.frame_mut().ip = target;
                }
                Opcode::SetGlobal => {
                    let index = usize::from(code::read_u16(ins, ip + 1));
                    self.frame_mut().ip = ip + 3;
                    self.globals[index] = self.pop();
                }
                Opcode::GetGlobal => {
                    let index = usize::from(code::read_u16(ins, ip + 1));
                    self.frame_mut().ip = ip + 3;
                    self.push(self.globals[index].clone())?;
                }
                Opcode::SetLocal => {
                    let index = usize::from(ins[ip + 1]);
                    self.frame_mut().ip = ip + 2;
                    let base_pointer = self.frame().base_pointer;
                    let value = self.pop();
                    self.stack[base_pointer + index] = value;
                }
                Opcode::GetLocal => {
                    let index = usize::from(ins[ip + 1]);
                    self.frame_mut().ip = ip + 2;
                    let base_pointer = self.frame().base_pointer;
                    self.push(self.stack[base_pointer + index].clone())?;
                }
                Opcode::GetBuiltin => {
                    let index = usize::from(ins[ip + 1]);
                    self.frame_mut().ip = ip + 2;
                    self.push(Value::Builtin(BUILTINS[index]))?;
                }
                Opcode::GetFree => {
                    let index = usize::from(ins[ip + 1]);
                    self.frame_mut().ip = ip + 2;
                    self.push(closure.free[index].clone())?;
                }
                Opcode::Closure => {
                    let const_index = usize::from(code::read_u16(ins, ip + 1));
                    let num_free = usize::from(ins[ip + 3]);
                    self.frame_mut().ip = ip + 4;
                    self.push_closure(const_index, num_free)?;
                }
                Opcode::CurrentClosure => {
                    self.frame_mut().ip = ip + 1;
                    self.push(Value::Closure(Rc::clone(&closure)))?;
                }
                Opcode::Call => {
                    let num_args = usize::from(ins[ip + 1]);
                    self.frame_mut().ip = ip + 2;
                    self.execute_call(num_args)?;
                }
                Opcode::ReturnValue => {
                    let return_value = self.pop();
                    // A top-level `return` ends the program with its value.
                    if self.frames.len() == 1 {
                        self.last_popped = return_value;
                        return Ok(());
                    }
                    let frame = self.frames.pop().expect("a call frame is executing");
                    self.sp = frame.base_pointer - 1;
                    self.push(return_value)?;
                }
                Opcode::Return => {
                    if self.frames.len() == 1 {
                        self.last_popped = Value::Null;
                        return Ok(());
                    }
                    let frame = self.frames.pop().expect("a call frame is executing");
                    self.sp = frame.base_pointer - 1;
                    self.push(Value::Null)?;
                }
                Opcode::Array => {
                    let count = usize::from(code::read_u16(ins, ip + 1));
                    self.frame_mut().ip = ip + 3;
                    let elements = self.drain_top(count);
                    self.push(Value::Array(Rc::new(elements)))?;
                }
                Opcode::Hash => {
                    let count = usize::from(code::read_u16(ins, ip + 1));
                    self.frame_mut().ip = ip + 3;
                    let hash = self.build_hash(count)?;
                    self.push(hash)?;
                }
                Opcode::Index => {
                    self.frame_mut().ip = ip + 1;
                    let index = self.pop();
                    let left = self.pop();
                    let result = execute_index(&left, &index)?;
                    self.push(result)?;
                }
            }
        }
    }

    fn frame(&self) -> &Frame {
        self.frames.last().expect("the main frame is never popped")
    }

    fn frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("the main frame is never popped")
    }

    fn push(&mut self, value: Value) -> Result<(), RunError> {
        if self.sp >= STACK_SIZE {
            return Err(RunError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.sp -= 1;
        std::mem::replace(&mut self.stack[self.sp], Value::Null)
    }

    /// Removes the top `count` values, preserving their stack order.
    fn drain_top(&mut self, count: usize) -> Vec<Value> {
        let start = self.sp - count;
        let values = self.stack[start..self.sp]
            .iter_mut()
            .map(|slot| std::mem::replace(slot, Value::Null))
            .collect();
        self.sp = start;
        values
    }

    fn execute_binary_operation(&mut self, opcode: Opcode) -> Result<(), RunError> {
        let right = self.pop();
        let left = self.pop();
        match (&left, &right) {
            (Value::Integer(a), Value::Integer(b)) => {
                let result = match opcode {
                    Opcode::Add => a.wrapping_add(*b),
                    Opcode::Sub => a.wrapping_sub(*b),
                    Opcode::Mul => a.wrapping_mul(*b),
                    Opcode::Div => {
                        if *b == 0 {
                            return Err(RunError::DivisionByZero);
                        }
                        a.wrapping_div(*b)
                    }
                    other => return Err(RunError::UnknownIntegerOperator(other)),
                };
                self.push(Value::Integer(result))
            }
            (Value::String(a), Value::String(b)) if opcode == Opcode::Add => {
                self.push(Value::string(format!("{a}{b}")))
            }
            _ => Err(RunError::UnsupportedBinaryTypes {
                left: left.kind(),
                operator: arithmetic_symbol(opcode),
                right: right.kind(),
            }),
        }
    }

    fn execute_comparison(&mut self, opcode: Opcode) -> Result<(), RunError> {
        let right = self.pop();
        let left = self.pop();
        let result = match (&left, &right) {
            (Value::Integer(a), Value::Integer(b)) => match opcode {
                Opcode::Equal => a == b,
                Opcode::NotEqual => a != b,
                _ => a > b,
            },
            (Value::Boolean(a), Value::Boolean(b)) => match opcode {
                Opcode::Equal => a == b,
                Opcode::NotEqual => a != b,
                _ => return Err(unknown_comparison(&left, opcode, &right)),
            },
            (Value::String(a), Value::String(b)) => match opcode {
                Opcode::Equal => a == b,
                Opcode::NotEqual => a != b,
                _ => return Err(unknown_comparison(&left, opcode, &right)),
            },
            _ => return Err(unknown_comparison(&left, opcode, &right)),
        };
        self.push(Value::Boolean(result))
    }

    fn build_hash(&mut self, count: usize) -> Result<Value, RunError> {
        let values = self.drain_top(count);
        let mut pairs = IndexMap::with_capacity(count / 2);
        let mut iter = values.into_iter();
        while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
            let hash_key = key.hash_key().ok_or_else(|| RunError::UnusableHashKey(key.kind()))?;
            pairs.insert(hash_key, HashPair { key, value });
        }
        Ok(Value::Hash(Rc::new(pairs)))
    }

    /// `OpCall`: the callee sits below the arguments on the stack.
    fn execute_call(&mut self, num_args: usize) -> Result<(), RunError> {
        let callee = self.stack[self.sp - 1 - num_args].clone();
        match callee {
            Value::Closure(closure) => self.call_closure(closure, num_args),
            Value::Builtin(builtin) => {
                let args = self.stack[self.sp - num_args..self.sp].to_vec();
                let result = builtin.call(&args, self.writer)?;
                // Discard the arguments and replace the callee slot.
                self.sp = self.sp - num_args - 1;
                self.push(result)
            }
            _ => Err(RunError::CallingNonFunction),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, num_args: usize) -> Result<(), RunError> {
        if num_args != closure.function.num_parameters {
            return Err(RunError::WrongArgumentCount {
                want: closure.function.num_parameters,
                got: num_args,
            });
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(RunError::FrameOverflow);
        }

        // Arguments are already in place as the first locals.
        let base_pointer = self.sp - num_args;
        let new_sp = base_pointer + closure.function.num_locals;
        if new_sp > STACK_SIZE {
            return Err(RunError::StackOverflow);
        }
        // Remaining local slots may hold leftovers from earlier frames; a
        // local read before its first write must see null.
        for slot in &mut self.stack[self.sp..new_sp] {
            *slot = Value::Null;
        }
        self.frames.push(Frame::new(closure, base_pointer));
        self.sp = new_sp;
        Ok(())
    }

    fn push_closure(&mut self, const_index: usize, num_free: usize) -> Result<(), RunError> {
        let constant = &self.constants[const_index];
        let Value::Function(function) = constant else {
            return Err(RunError::NotAFunction(constant.kind()));
        };
        let function = Rc::clone(function);
        let free = self.drain_top(num_free);
        self.push(Value::Closure(Rc::new(Closure { function, free })))
    }
}

/// Allocates a globals slice of the size the compiler can address.
#[must_use]
pub fn new_globals() -> Vec<Value> {
    vec![Value::Null; GLOBALS_SIZE]
}

fn arithmetic_symbol(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::Add => "+",
        Opcode::Sub => "-",
        Opcode::Mul => "*",
        Opcode::Div => "/",
        _ => "?",
    }
}

fn comparison_symbol(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::Equal => "==",
        Opcode::NotEqual => "!=",
        Opcode::GreaterThan => ">",
        _ => "?",
    }
}

fn unknown_comparison(left: &Value, opcode: Opcode, right: &Value) -> RunError {
    RunError::UnknownOperator(format!(
        "{} {} {}",
        left.kind(),
        comparison_symbol(opcode),
        right.kind()
    ))
}

/// `OpIndex`: array and hash lookups; misses produce `Null`.
fn execute_index(left: &Value, index: &Value) -> Result<Value, RunError> {
    match (left, index) {
        (Value::Array(elements), Value::Integer(position)) => {
            let Ok(position) = usize::try_from(*position) else {
                return Ok(Value::Null);
            };
            Ok(elements.get(position).cloned().unwrap_or(Value::Null))
        }
        (Value::Hash(pairs), _) => {
            let Some(key) = index.hash_key() else {
                return Err(RunError::UnusableHashKey(index.kind()));
            };
            Ok(pairs.get(&key).map_or(Value::Null, |pair| pair.value.clone()))
        }
        _ => Err(RunError::IndexNotSupported(left.kind())),
    }
}
