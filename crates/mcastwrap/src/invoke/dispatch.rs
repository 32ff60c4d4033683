// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dispatch table for replicated methods.
//!
//! Methods are registered ahead of time under a class name; a received
//! request selects one by `(method name, declared parameter types)` with an
//! exact, ordered match. Overloads are distinct entries.
//!
//! ```
//! use mcastwrap::invoke::{Dispatcher, InvocationRequest, TypedArg, Value};
//!
//! #[derive(Default)]
//! struct Counter {
//!     total: i64,
//! }
//!
//! let mut dispatcher = Dispatcher::<Counter>::new();
//! dispatcher
//!     .class("Counter")
//!     .method("add", |c: &mut Counter, n: i64| {
//!         c.total += n;
//!         Ok(c.total)
//!     });
//!
//! let frame = InvocationRequest::new("Counter", "add", vec![TypedArg::of(5i64)?]).encode()?;
//! let mut counter = Counter::default();
//! assert_eq!(dispatcher.dispatch(&mut counter, &frame)?, Value::I64(5));
//! # Ok::<(), mcastwrap::Error>(())
//! ```

use super::codec::InvocationRequest;
use super::value::{Argument, Value};
use crate::error::{BoxError, Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of a replicated method: its return value or its own failure.
pub type MethodResult<R> = std::result::Result<R, BoxError>;

/// A callable registered for one method signature.
///
/// Implemented for every `Fn(&mut T, A1, .., An) -> MethodResult<R>` with up
/// to six [`Argument`] parameters. `Args` is the parameter tuple and only
/// serves to keep the implementations apart.
pub trait Handler<T, Args>: Send + Sync + 'static {
    /// Declared parameter types, in order.
    fn param_types() -> Vec<String>;

    /// Convert `args` and call the method.
    ///
    /// The outer `Result` reports argument conversion failures, which occur
    /// before the method runs. The inner one is the method's own outcome,
    /// including a return value that cannot be converted.
    fn call(&self, target: &mut T, args: Vec<Value>) -> Result<MethodResult<Value>>;
}

macro_rules! impl_handler {
    ($($arg:ident),*) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<T, F, R, $($arg,)*> Handler<T, ($($arg,)*)> for F
        where
            F: Fn(&mut T, $($arg),*) -> MethodResult<R> + Send + Sync + 'static,
            R: Argument,
            $($arg: Argument,)*
        {
            fn param_types() -> Vec<String> {
                vec![$($arg::type_name()),*]
            }

            fn call(&self, target: &mut T, args: Vec<Value>) -> Result<MethodResult<Value>> {
                let mut args = args.into_iter().enumerate();
                $(
                    let $arg = match args.next() {
                        Some((index, value)) => $arg::from_value(value).map_err(|reason| {
                            Error::deserialization(format!("argument {}: {}", index, reason))
                        })?,
                        None => return Err(Error::deserialization("missing argument")),
                    };
                )*
                if args.next().is_some() {
                    return Err(Error::deserialization("too many arguments"));
                }
                // The method has run: a return value that fails to convert is its failure.
                Ok(self(target, $($arg),*).and_then(|ret| {
                    ret.into_value().map_err(|e| Box::new(e) as BoxError)
                }))
            }
        }
    };
}

impl_handler!();
impl_handler!(A1);
impl_handler!(A1, A2);
impl_handler!(A1, A2, A3);
impl_handler!(A1, A2, A3, A4);
impl_handler!(A1, A2, A3, A4, A5);
impl_handler!(A1, A2, A3, A4, A5, A6);

type BoxedMethod<T> = Box<dyn Fn(&mut T, Vec<Value>) -> Result<MethodResult<Value>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MethodKey {
    name: String,
    params: Vec<String>,
}

/// Registry of replicated classes and their methods for a target type `T`.
pub struct Dispatcher<T> {
    classes: HashMap<String, HashMap<MethodKey, BoxedMethod<T>>>,
}

impl<T: 'static> Default for Dispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Dispatcher<T> {
    pub fn new() -> Self {
        Self {
            classes: HashMap::new(),
        }
    }

    /// Register (or reopen) a class and add methods to it.
    pub fn class(&mut self, name: impl Into<String>) -> ClassRegistrar<'_, T> {
        let name = name.into();
        let methods = self.classes.entry(name.clone()).or_default();
        ClassRegistrar {
            class: name,
            methods,
        }
    }

    pub fn contains_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Every registered signature as `Class::method(types)`, sorted.
    pub fn signatures(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .classes
            .iter()
            .flat_map(|(class, methods)| {
                methods
                    .keys()
                    .map(move |key| format!("{}::{}({})", class, key.name, key.params.join(", ")))
            })
            .collect();
        out.sort();
        out
    }

    /// Decode a wire message and invoke the selected method on `target`.
    ///
    /// Failure order: [`Error::Deserialization`] for the frame,
    /// [`Error::ClassNotFound`], [`Error::Deserialization`] for argument
    /// values, [`Error::MethodNotFound`], then [`Error::Invocation`] when
    /// the method itself fails or its return value cannot be converted.
    /// Nothing is invoked unless every earlier step succeeded; an
    /// [`Error::Invocation`] means the method ran and `target` may have
    /// changed.
    pub fn dispatch(&self, target: &mut T, message: &[u8]) -> Result<Value> {
        let request = InvocationRequest::decode(message)?;
        self.dispatch_request(target, request)
    }

    /// Invoke an already decoded request.
    pub fn dispatch_request(&self, target: &mut T, request: InvocationRequest) -> Result<Value> {
        let methods = self
            .classes
            .get(&request.class)
            .ok_or_else(|| Error::ClassNotFound(request.class.clone()))?;

        let values = request.decode_values()?;
        let key = MethodKey {
            name: request.method,
            params: request.args.into_iter().map(|a| a.type_name).collect(),
        };
        let Some(method) = methods.get(&key) else {
            return Err(Error::MethodNotFound {
                class: request.class,
                method: key.name,
                params: key.params,
            });
        };

        log::debug!(
            "[INVOKE] {}::{}({})",
            request.class,
            key.name,
            key.params.join(", ")
        );
        match method(target, values)? {
            Ok(value) => Ok(value),
            Err(source) => Err(Error::Invocation {
                class: request.class,
                method: key.name,
                source,
            }),
        }
    }

    /// Turn this dispatcher into a transport receive callback.
    ///
    /// Every received frame is dispatched against `target`; failures are
    /// logged and the next datagram is processed normally.
    ///
    /// `target` is locked on the receive thread for the duration of each
    /// call. Do not hold that lock while closing or dropping the transport
    /// that owns this callback: the close waits for the receive thread, which
    /// may be waiting for the lock.
    pub fn into_callback(self, target: Arc<Mutex<T>>) -> impl FnMut(Vec<u8>) + Send + 'static
    where
        T: Send,
    {
        move |message: Vec<u8>| {
            let mut guard = target.lock();
            match self.dispatch(&mut guard, &message) {
                Ok(value) => log::debug!("[INVOKE] completed len={} ret={}", message.len(), value.kind()),
                Err(e) => log::error!("[INVOKE] dispatch failed len={}: {}", message.len(), e),
            }
        }
    }
}

impl<T> std::fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut classes: Vec<&String> = self.classes.keys().collect();
        classes.sort();
        f.debug_struct("Dispatcher")
            .field("classes", &classes)
            .finish_non_exhaustive()
    }
}

/// Adds methods to one class of a [`Dispatcher`].
pub struct ClassRegistrar<'a, T> {
    class: String,
    methods: &'a mut HashMap<MethodKey, BoxedMethod<T>>,
}

impl<'a, T: 'static> ClassRegistrar<'a, T> {
    /// Register `handler` under `name` with the signature derived from its
    /// parameter types. Re-registering a signature replaces the handler.
    pub fn method<H, Args>(self, name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T, Args>,
        Args: 'static,
    {
        let key = MethodKey {
            name: name.into(),
            params: H::param_types(),
        };
        let boxed: BoxedMethod<T> = Box::new(move |target, args| handler.call(target, args));
        if self.methods.insert(key.clone(), boxed).is_some() {
            log::warn!(
                "[INVOKE] replaced {}::{}({})",
                self.class,
                key.name,
                key.params.join(", ")
            );
        }
        self
    }
}
