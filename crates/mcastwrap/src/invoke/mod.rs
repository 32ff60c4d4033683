// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Remote invocation over the multicast transport.
//!
//! ```text
//! GroupInvoker::invoke_in_group(class, method, args)
//!     -> InvocationRequest::encode() -> MulticastTransport::send()
//!                         ... network ...
//! receive loop -> Dispatcher::dispatch(target, bytes)
//!     -> decode -> class -> argument values -> method signature -> call
//! ```
//!
//! Every node registers the same classes and methods in its [`Dispatcher`];
//! the declared argument types select the overload.

mod codec;
mod dispatch;
mod invoker;
mod value;

pub use codec::{
    decode_request, decode_value, encode_request, encode_value, EncodedArg, InvocationRequest,
};
pub use dispatch::{ClassRegistrar, Dispatcher, Handler, MethodResult};
pub use invoker::{Broadcast, GroupInvoker};
pub use value::{Argument, Blob, Json, TypedArg, Value};
