//! Built-in functions.
//!
//! Built-ins are an ordered list known at both compile and run time: the
//! compiler emits `OpGetBuiltin` by position, so [`BUILTINS`] must never be
//! reordered. Appending is the only safe change; anything else decouples
//! running sessions from the bytecode they already compiled.

use std::rc::Rc;

use crate::{bytecode::RunError, io::PrintWriter, value::Value};

/// The ordered built-in list. Index in this array is the wire ABI.
pub const BUILTINS: [Builtin; 6] = [
    Builtin::Len,
    Builtin::Puts,
    Builtin::First,
    Builtin::Last,
    Builtin::Rest,
    Builtin::Push,
];

/// A native function, identified by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Builtin {
    Len,
    Puts,
    First,
    Last,
    Rest,
    Push,
}

impl Builtin {
    /// The source-level name the symbol table registers.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Len => "len",
            Self::Puts => "puts",
            Self::First => "first",
            Self::Last => "last",
            Self::Rest => "rest",
            Self::Push => "push",
        }
    }

    /// Invokes the built-in. `puts` writes through the host sink; everything
    /// else is pure.
    pub fn call<W: PrintWriter>(self, args: &[Value], writer: &mut W) -> Result<Value, RunError> {
        match self {
            Self::Len => {
                expect_args(args, 1)?;
                match &args[0] {
                    Value::String(value) => Ok(Value::Integer(value.len() as i64)),
                    Value::Array(elements) => Ok(Value::Integer(elements.len() as i64)),
                    other => Err(RunError::builtin(format!(
                        "argument to `len` not supported, got {}",
                        other.kind()
                    ))),
                }
            }
            Self::Puts => {
                for arg in args {
                    writer.write_line(&arg.to_string());
                }
                Ok(Value::Null)
            }
            Self::First => {
                let elements = array_arg(args, "first")?;
                Ok(elements.first().cloned().unwrap_or(Value::Null))
            }
            Self::Last => {
                let elements = array_arg(args, "last")?;
                Ok(elements.last().cloned().unwrap_or(Value::Null))
            }
            Self::Rest => {
                let elements = array_arg(args, "rest")?;
                if elements.is_empty() {
                    Ok(Value::Null)
                } else {
                    Ok(Value::Array(Rc::new(elements[1..].to_vec())))
                }
            }
            Self::Push => {
                expect_args(args, 2)?;
                let Value::Array(elements) = &args[0] else {
                    return Err(RunError::builtin(format!(
                        "argument to `push` must be ARRAY, got {}",
                        args[0].kind()
                    )));
                };
                // Arrays are immutable at the language level; build a new one.
                let mut extended = elements.as_ref().clone();
                extended.push(args[1].clone());
                Ok(Value::Array(Rc::new(extended)))
            }
        }
    }
}

fn expect_args(args: &[Value], want: usize) -> Result<(), RunError> {
    if args.len() == want {
        Ok(())
    } else {
        Err(RunError::builtin(format!(
            "wrong number of arguments. got={}, want={want}",
            args.len()
        )))
    }
}

fn array_arg<'a>(args: &'a [Value], name: &str) -> Result<&'a [Value], RunError> {
    expect_args(args, 1)?;
    match &args[0] {
        Value::Array(elements) => Ok(elements),
        other => Err(RunError::builtin(format!(
            "argument to `{name}` must be ARRAY, got {}",
            other.kind()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{CollectStringPrint, NoPrint};

    fn array(values: &[i64]) -> Value {
        Value::Array(Rc::new(values.iter().copied().map(Value::Integer).collect()))
    }

    #[test]
    fn ordered_list_is_stable() {
        let names: Vec<&str> = BUILTINS.iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["len", "puts", "first", "last", "rest", "push"]);
    }

    #[test]
    fn len_counts_strings_and_arrays() {
        let mut sink = NoPrint;
        assert_eq!(
            Builtin::Len.call(&[Value::string("hello")], &mut sink),
            Ok(Value::Integer(5))
        );
        assert_eq!(Builtin::Len.call(&[array(&[1, 2, 3])], &mut sink), Ok(Value::Integer(3)));
        assert_eq!(
            Builtin::Len
                .call(&[Value::Integer(1)], &mut sink)
                .unwrap_err()
                .to_string(),
            "argument to `len` not supported, got INTEGER"
        );
        assert_eq!(
            Builtin::Len.call(&[], &mut sink).unwrap_err().to_string(),
            "wrong number of arguments. got=0, want=1"
        );
    }

    #[test]
    fn array_accessors_return_null_on_empty() {
        let mut sink = NoPrint;
        assert_eq!(Builtin::First.call(&[array(&[])], &mut sink), Ok(Value::Null));
        assert_eq!(Builtin::Last.call(&[array(&[])], &mut sink), Ok(Value::Null));
        assert_eq!(Builtin::Rest.call(&[array(&[])], &mut sink), Ok(Value::Null));
        assert_eq!(Builtin::First.call(&[array(&[1, 2])], &mut sink), Ok(Value::Integer(1)));
        assert_eq!(Builtin::Last.call(&[array(&[1, 2])], &mut sink), Ok(Value::Integer(2)));
        assert_eq!(Builtin::Rest.call(&[array(&[1, 2, 3])], &mut sink), Ok(array(&[2, 3])));
    }

    #[test]
    fn push_leaves_the_original_array_untouched() {
        let mut sink = NoPrint;
        let original = array(&[1]);
        let pushed = Builtin::Push
            .call(&[original.clone(), Value::Integer(2)], &mut sink)
            .unwrap();
        assert_eq!(pushed, array(&[1, 2]));
        assert_eq!(original, array(&[1]));
    }

    #[test]
    fn puts_writes_each_argument_on_its_own_line() {
        let mut sink = CollectStringPrint::new();
        let result = Builtin::Puts
            .call(&[Value::string("hello"), Value::Integer(3)], &mut sink)
            .unwrap();
        assert_eq!(result, Value::Null);
        assert_eq!(sink.output(), "hello\n3\n");
    }
}
