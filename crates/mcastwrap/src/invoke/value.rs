// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type-erased argument values.
//!
//! Every argument travels as a [`Value`] (closed set of kinds, one tag byte
//! each) next to a declared type name. The declared name, not the value
//! kind, selects the overload on the receiving node.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A self-describing argument or return value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
}

impl Value {
    /// Human-readable kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F64(_) => "f64",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
        }
    }

    /// Convert into a typed argument.
    pub fn get<A: Argument>(self) -> std::result::Result<A, String> {
        A::from_value(self)
    }
}

/// A type that can be passed to, or returned from, a replicated method.
pub trait Argument: Sized {
    /// Declared type name carried on the wire.
    fn type_name() -> String;

    /// Convert into a wire value. Fails with [`Error::Serialization`].
    fn into_value(self) -> Result<Value>;

    /// Convert back from a wire value; `Err` carries the mismatch reason.
    fn from_value(value: Value) -> std::result::Result<Self, String>;
}

fn mismatch<T>(expected: &str, value: &Value) -> std::result::Result<T, String> {
    Err(format!("expected {}, found {}", expected, value.kind()))
}

macro_rules! impl_scalar_argument {
    ($ty:ty, $name:expr, $variant:ident) => {
        impl Argument for $ty {
            fn type_name() -> String {
                $name.to_string()
            }

            fn into_value(self) -> Result<Value> {
                Ok(Value::$variant(self))
            }

            fn from_value(value: Value) -> std::result::Result<Self, String> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => mismatch($name, &other),
                }
            }
        }
    };
}

impl_scalar_argument!(bool, "bool", Bool);
impl_scalar_argument!(i32, "i32", I32);
impl_scalar_argument!(i64, "i64", I64);
impl_scalar_argument!(u32, "u32", U32);
impl_scalar_argument!(u64, "u64", U64);
impl_scalar_argument!(f64, "f64", F64);
impl_scalar_argument!(String, "str", Str);

impl Argument for () {
    fn type_name() -> String {
        "unit".to_string()
    }

    fn into_value(self) -> Result<Value> {
        Ok(Value::Unit)
    }

    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Unit => Ok(()),
            other => mismatch("unit", &other),
        }
    }
}

/// The "any" super type: accepts every value kind unchanged.
impl Argument for Value {
    fn type_name() -> String {
        "any".to_string()
    }

    fn into_value(self) -> Result<Value> {
        Ok(self)
    }

    fn from_value(value: Value) -> std::result::Result<Self, String> {
        Ok(value)
    }
}

/// Raw byte string argument.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Blob(pub Vec<u8>);

impl Argument for Blob {
    fn type_name() -> String {
        "bytes".to_string()
    }

    fn into_value(self) -> Result<Value> {
        Ok(Value::Bytes(self.0))
    }

    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Bytes(bytes) => Ok(Blob(bytes)),
            other => mismatch("bytes", &other),
        }
    }
}

impl<A: Argument> Argument for Vec<A> {
    fn type_name() -> String {
        format!("list<{}>", A::type_name())
    }

    fn into_value(self) -> Result<Value> {
        self.into_iter()
            .map(A::into_value)
            .collect::<Result<Vec<_>>>()
            .map(Value::List)
    }

    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| A::from_value(item).map_err(|e| format!("item {}: {}", i, e)))
                .collect(),
            other => mismatch("list", &other),
        }
    }
}

/// Any serde type, carried as JSON inside a `bytes` value.
///
/// The declared type is `json<T>` with `T`'s Rust type path; all nodes are
/// expected to run the same build.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Serialize + DeserializeOwned> Argument for Json<T> {
    fn type_name() -> String {
        format!("json<{}>", std::any::type_name::<T>())
    }

    fn into_value(self) -> Result<Value> {
        serde_json::to_vec(&self.0)
            .map(Value::Bytes)
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Bytes(bytes) => serde_json::from_slice(&bytes)
                .map(Json)
                .map_err(|e| format!("invalid JSON payload: {}", e)),
            other => mismatch("bytes", &other),
        }
    }
}

/// One argument as sent: declared type plus value.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedArg {
    pub type_name: String,
    pub value: Value,
}

impl TypedArg {
    /// Argument declared with its own type.
    pub fn of<A: Argument>(arg: A) -> Result<Self> {
        Ok(Self {
            type_name: A::type_name(),
            value: arg.into_value()?,
        })
    }

    /// Argument declared with a super type, e.g. `any` for a concrete value.
    pub fn declared<A: Argument>(type_name: impl Into<String>, arg: A) -> Result<Self> {
        Ok(Self {
            type_name: type_name.into(),
            value: arg.into_value()?,
        })
    }
}
