// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multicast transport layer.
//!
//! Payload-agnostic: the transport moves opaque byte buffers of at most
//! [`MAX_PAYLOAD_SIZE`](crate::config::MAX_PAYLOAD_SIZE) bytes between the
//! members of one IPv4 multicast group.
//!
//! # Example
//!
//! ```no_run
//! use mcastwrap::transport::{list_network_interfaces, MulticastTransport};
//!
//! # fn main() -> mcastwrap::Result<()> {
//! let iface = list_network_interfaces()?
//!     .into_iter()
//!     .next()
//!     .expect("no multicast-capable interface");
//!
//! let transport = MulticastTransport::builder()
//!     .interface(iface)
//!     .group_address("224.1.1.1")
//!     .port(14725)
//!     .callback(|msg| println!("received {} bytes", msg.len()))
//!     .loopback(true)
//!     .build()?;
//!
//! transport.launch_consumer()?;
//! transport.send(b"hello group")?;
//! transport.close()?;
//! # Ok(())
//! # }
//! ```

mod consumer;
mod interfaces;
mod multicast;

pub use consumer::MessageCallback;
pub use interfaces::{
    all_network_interfaces, has_inet_address, list_network_interfaces, NetworkInterface,
};
pub use multicast::{check_payload, MulticastTransport, TransportBuilder};
