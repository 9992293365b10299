//! Runtime values and hash-key computation.
//!
//! A [`Value`] is a tagged variant. Small values (integers, booleans, null)
//! are stored inline; strings, arrays, hashes, compiled functions, and
//! closures are heap-allocated behind `Rc` and shared by reference. The VM
//! never mutates a value in place, only replaces stack and globals slots, so
//! plain reference counting is all the memory management the core needs.

use std::{fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{builtins::Builtin, bytecode::code::Instructions};

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
    String(Rc<str>),
    Null,
    Array(Rc<Vec<Value>>),
    /// Keyed by precomputed [`HashKey`]; each entry retains the original key
    /// value for inspection. Insertion order is preserved by the map but is
    /// not part of the language contract.
    Hash(Rc<IndexMap<HashKey, HashPair>>),
    /// A unit of compiled bytecode before closure construction.
    Function(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    Builtin(Builtin),
}

impl Value {
    /// The kind tag used in error messages and hash keys.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Integer(_) => ValueKind::Integer,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::String(_) => ValueKind::String,
            Self::Null => ValueKind::Null,
            Self::Array(_) => ValueKind::Array,
            Self::Hash(_) => ValueKind::Hash,
            Self::Function(_) => ValueKind::CompiledFunction,
            Self::Closure(_) => ValueKind::Closure,
            Self::Builtin(_) => ValueKind::Builtin,
        }
    }

    /// `false` and `null` are falsy; every other value is truthy, including
    /// `0` and the empty string.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Boolean(false) | Self::Null)
    }

    /// Computes the hash key for this value, or `None` if the kind is not
    /// hashable. Only integers, booleans, and strings are hashable.
    #[must_use]
    pub fn hash_key(&self) -> Option<HashKey> {
        let raw = match self {
            Self::Integer(value) => u64::from_ne_bytes(value.to_ne_bytes()),
            Self::Boolean(value) => u64::from(*value),
            Self::String(value) => fnv1a_64(value.as_bytes()),
            _ => return None,
        };
        Some(HashKey {
            kind: self.kind(),
            value: raw,
        })
    }

    #[must_use]
    pub fn string(value: impl AsRef<str>) -> Self {
        Self::String(Rc::from(value.as_ref()))
    }

    /// Builds a hash value from key/value pairs, or `None` if any key is
    /// unhashable. A repeated key overwrites the earlier entry.
    #[must_use]
    pub fn hash_from_pairs(pairs: impl IntoIterator<Item = (Self, Self)>) -> Option<Self> {
        let mut map = IndexMap::new();
        for (key, value) in pairs {
            let hash_key = key.hash_key()?;
            map.insert(hash_key, HashPair { key, value });
        }
        Some(Self::Hash(Rc::new(map)))
    }
}

/// Equality follows language semantics: by value for data, by identity for
/// functions and closures. Values of different kinds are never equal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Null, Self::Null) => true,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Hash(a), Self::Hash(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Closure(a), Self::Closure(b)) => Rc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => a == b,
            _ => false,
        }
    }
}

/// Canonical textual form ("inspect") of a value.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
            Self::Null => f.write_str("null"),
            Self::Array(elements) => {
                let rendered: Vec<String> = elements.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            Self::Hash(pairs) => {
                let rendered: Vec<String> = pairs
                    .values()
                    .map(|pair| format!("{}: {}", pair.key, pair.value))
                    .collect();
                write!(f, "{{{}}}", rendered.join(", "))
            }
            Self::Function(function) => write!(f, "Function[{:p}]", Rc::as_ptr(function)),
            Self::Closure(closure) => write!(f, "Closure[{:p}]", Rc::as_ptr(closure)),
            Self::Builtin(_) => f.write_str("builtin function"),
        }
    }
}

/// Kind tags, rendered the way runtime error messages spell them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueKind {
    Integer,
    Boolean,
    String,
    Null,
    Array,
    Hash,
    CompiledFunction,
    Closure,
    Builtin,
}

/// Precomputed key for hash objects: the kind tag plus a 64-bit payload.
///
/// The payload is the integer's bits, 0/1 for booleans, or an FNV-1a digest
/// of the string's UTF-8 bytes. Values that compare equal always produce
/// equal keys; the kind tag keeps `1`, `true`, and `"1"` distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    kind: ValueKind,
    value: u64,
}

/// One hash entry, retaining the original key value alongside the mapped
/// value so inspection can print the key as written.
#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

/// Bytecode plus the frame layout facts the VM needs to call it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// A compiled function paired with its captured free values.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub function: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over raw bytes.
///
/// Hash keys only need to be deterministic within a single process and
/// non-adversarial; FNV-1a is stable, cheap, and has no seed to manage.
fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
