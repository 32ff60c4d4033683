// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # mcastwrap - multicast group messaging and replicated invocation
//!
//! Nodes of a cluster join one IPv4 multicast group, broadcast opaque
//! payloads to every member and receive the other members' payloads on a
//! dedicated thread. On top of that, a method call named by class, method
//! and typed arguments can be encoded, broadcast and dispatched against a
//! local target object on every receiving node.
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------+
//! |  invoke   GroupInvoker -> InvocationRequest -> Dispatcher<T>  |
//! |  status   StatusMessage (JSON)                                |
//! +---------------------------------------------------------------+
//! |  transport  MulticastTransport: send / receive loop / close   |
//! |             NetworkInterface enumeration                      |
//! +---------------------------------------------------------------+
//! |  config   limits, TransportConfig (TOML + MCASTWRAP_* env)    |
//! +---------------------------------------------------------------+
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mcastwrap::invoke::{Dispatcher, GroupInvoker, TypedArg};
//! use mcastwrap::{MulticastTransport, NetworkInterface, Result};
//! use parking_lot::Mutex;
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct Cache {
//!     entries: Vec<String>,
//! }
//!
//! fn main() -> Result<()> {
//!     let mut dispatcher = Dispatcher::<Cache>::new();
//!     dispatcher.class("Cache").method("put", |c: &mut Cache, key: String| {
//!         c.entries.push(key);
//!         Ok(())
//!     });
//!
//!     let cache = Arc::new(Mutex::new(Cache::default()));
//!     let iface = NetworkInterface::by_name("eth0")?.expect("eth0");
//!     let transport = MulticastTransport::builder()
//!         .interface(iface)
//!         .group_address("224.0.0.1")
//!         .port(14725)
//!         .callback(dispatcher.into_callback(Arc::clone(&cache)))
//!         .ignore_own_messages(true)
//!         .build()?;
//!     transport.launch_consumer()?;
//!
//!     GroupInvoker::new(&transport).invoke_in_group(
//!         "Cache",
//!         "put",
//!         vec![TypedArg::of("session-42".to_string())?],
//!     )?;
//!
//!     transport.close()
//! }
//! ```

pub mod config;
pub mod error;
pub mod invoke;
pub mod status;
pub mod transport;

pub use config::{TransportConfig, MAX_PAYLOAD_SIZE};
pub use error::{BoxError, Error, Result};
pub use status::StatusMessage;
pub use transport::{MulticastTransport, NetworkInterface, TransportBuilder};
