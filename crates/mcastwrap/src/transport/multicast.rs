// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP multicast transport: one group membership, one receive loop.
//!
//! Lifecycle:
//!
//! ```text
//! builder().build()  -> membership socket: SO_REUSEADDR + bind group port + join
//!                       send socket:       IP_MULTICAST_IF + loop + TTL
//! launch_consumer()  -> dedicated receive thread (at most once, needs a callback)
//! send(bytes)        -> one datagram to group:port (caller thread, blocking)
//! close() / drop     -> stop flag + wake + join + leave group + release sockets
//! ```
//!
//! The receive loop switches its socket to non-blocking mode. That flag is
//! shared by every clone of a descriptor, so sends go through their own
//! socket and keep blocking semantics.

use super::consumer::{CallbackSlot, Consumer, MessageCallback};
use super::interfaces::NetworkInterface;
use crate::config::{DEFAULT_MULTICAST_TTL, MAX_PAYLOAD_SIZE, MAX_PORT, MAX_TTL};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs, UdpSocket};
use std::sync::Arc;

/// Builder for [`MulticastTransport`].
///
/// Every parameter is checked in [`build`](Self::build) before a socket is
/// created, so a rejected build leaves nothing to clean up.
#[must_use]
pub struct TransportBuilder {
    interface: Option<NetworkInterface>,
    group_address: Option<String>,
    port: Option<u32>,
    callback: Option<MessageCallback>,
    loopback: bool,
    ignore_own_messages: bool,
    ttl: u32,
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self {
            interface: None,
            group_address: None,
            port: None,
            callback: None,
            loopback: true,
            ignore_own_messages: false,
            ttl: DEFAULT_MULTICAST_TTL,
        }
    }
}

impl TransportBuilder {
    /// Interface to send on and join the group with.
    pub fn interface(mut self, interface: NetworkInterface) -> Self {
        self.interface = Some(interface);
        self
    }

    /// Multicast group, as a textual IPv4 address or a host name.
    pub fn group_address(mut self, group: impl Into<String>) -> Self {
        self.group_address = Some(group.into());
        self
    }

    /// Group port (0-65535).
    pub fn port(mut self, port: u32) -> Self {
        self.port = Some(port);
        self
    }

    /// Callback invoked for each received datagram. Omit for send-only use.
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(Vec<u8>) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Deliver datagrams sent from this socket back to the local callback.
    pub fn loopback(mut self, enabled: bool) -> Self {
        self.loopback = enabled;
        self
    }

    /// Drop datagrams whose source address is this node's interface address.
    ///
    /// Best-effort: prefer `loopback(false)` when the OS option is enough.
    pub fn ignore_own_messages(mut self, enabled: bool) -> Self {
        self.ignore_own_messages = enabled;
        self
    }

    /// Multicast TTL (default 1, link-local).
    pub fn ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Validate parameters, then open the socket and join the group.
    pub fn build(self) -> Result<MulticastTransport> {
        let interface = self
            .interface
            .ok_or_else(|| Error::invalid_argument("'interface' parameter must not be absent"))?;
        let iface_addr = interface.ipv4().ok_or_else(|| {
            Error::invalid_argument(format!(
                "'interface' {} carries no IPv4 address",
                interface.name
            ))
        })?;
        let group_text = self.group_address.ok_or_else(|| {
            Error::invalid_argument("'group_address' parameter must not be absent")
        })?;
        let port = validate_port(self.port)?;
        if self.ttl > MAX_TTL {
            return Err(Error::invalid_argument(format!(
                "'ttl' is out of range: {}",
                self.ttl
            )));
        }
        let group = resolve_group(&group_text, port)?;

        let socket = open_membership(iface_addr, group, port)?;
        let sender = open_sender(iface_addr, self.loopback, self.ttl)?;
        log::debug!(
            "[MCAST] joined group={}:{} iface={} ({}) loopback={} ttl={}",
            group,
            port,
            interface.name,
            iface_addr,
            self.loopback,
            self.ttl
        );

        let has_callback = self.callback.is_some();
        Ok(MulticastTransport {
            socket,
            sender,
            group,
            port,
            interface,
            iface_addr,
            ignore_own_messages: self.ignore_own_messages,
            has_callback,
            callback: Arc::new(Mutex::new(self.callback)),
            consumer: Mutex::new(None),
            closed: false,
        })
    }
}

/// A joined multicast group membership with an optional receive loop.
///
/// The sockets and the membership are owned exclusively by this value and
/// released exactly once, by [`close`](Self::close) or on drop.
///
/// Closing joins the receive thread. When the callback locks shared state
/// (as [`Dispatcher::into_callback`](crate::invoke::Dispatcher::into_callback)
/// does), release that lock before calling `close` or dropping the transport.
pub struct MulticastTransport {
    socket: UdpSocket,
    sender: UdpSocket,
    group: Ipv4Addr,
    port: u16,
    interface: NetworkInterface,
    iface_addr: Ipv4Addr,
    ignore_own_messages: bool,
    has_callback: bool,
    callback: CallbackSlot,
    consumer: Mutex<Option<Consumer>>,
    closed: bool,
}

impl MulticastTransport {
    /// Start building a transport.
    pub fn builder() -> TransportBuilder {
        TransportBuilder::default()
    }

    /// Send `message` to the group as a single datagram.
    ///
    /// Fire-and-forget: no acknowledgment, no retry. May block briefly while
    /// the OS send buffer drains, whether or not the consumer is running.
    pub fn send(&self, message: &[u8]) -> Result<()> {
        check_payload(message)?;
        let dest = SocketAddr::V4(SocketAddrV4::new(self.group, self.port));
        match self.sender.send_to(message, dest) {
            Ok(sent) => {
                log::debug!(
                    "[MCAST] send dest={} len={} iface={}",
                    dest,
                    sent,
                    self.iface_addr
                );
                Ok(())
            }
            Err(err) => {
                log::debug!(
                    "[MCAST] send error={} dest={} len={}",
                    err,
                    dest,
                    message.len()
                );
                Err(err.into())
            }
        }
    }

    /// Start the receive loop on its own thread.
    ///
    /// Fails with [`Error::InvalidState`] when no callback was supplied at
    /// construction or when the loop was already launched.
    pub fn launch_consumer(&self) -> Result<()> {
        if !self.has_callback {
            return Err(Error::invalid_state(
                "no callback was supplied, this transport is send-only",
            ));
        }
        let mut slot = self.consumer.lock();
        if slot.is_some() {
            return Err(Error::invalid_state("consumer has already been launched"));
        }

        // The callback is only taken by the receive thread once it runs.
        let socket = self.socket.try_clone()?;
        let own_address = self.ignore_own_messages.then_some(self.iface_addr);
        *slot = Some(Consumer::spawn(
            socket,
            Arc::clone(&self.callback),
            own_address,
        )?);
        log::debug!(
            "[MCAST] consumer launched group={}:{} ignore_own={}",
            self.group,
            self.port,
            self.ignore_own_messages
        );
        Ok(())
    }

    /// Whether the receive loop is currently running.
    pub fn is_consuming(&self) -> bool {
        self.consumer
            .lock()
            .as_ref()
            .is_some_and(Consumer::is_running)
    }

    /// Stop the receive loop, leave the group and release the sockets.
    ///
    /// Waits for a callback in progress to return, so it must not be called
    /// while holding a lock that callback needs.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some(mut consumer) = self.consumer.lock().take() {
            consumer.stop();
        }
        let left = self.socket.leave_multicast_v4(&self.group, &self.iface_addr);
        log::debug!(
            "[MCAST] left group={}:{} iface={} ok={}",
            self.group,
            self.port,
            self.iface_addr,
            left.is_ok()
        );
        left.map_err(Error::from)
    }

    /// Multicast group address.
    pub fn group(&self) -> Ipv4Addr {
        self.group
    }

    /// Group port; also the bind port of the receive socket.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Interface the membership was established on.
    pub fn interface(&self) -> &NetworkInterface {
        &self.interface
    }

    /// This node's IPv4 address on the membership interface.
    pub fn local_ipv4(&self) -> Ipv4Addr {
        self.iface_addr
    }
}

impl Drop for MulticastTransport {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("[MCAST] Error while closing transport on drop: {}", e);
        }
    }
}

impl std::fmt::Debug for MulticastTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MulticastTransport")
            .field("group", &self.group)
            .field("port", &self.port)
            .field("interface", &self.interface.name)
            .field("iface_addr", &self.iface_addr)
            .field("ignore_own_messages", &self.ignore_own_messages)
            .finish_non_exhaustive()
    }
}

/// Reject payloads that cannot fit in one IPv4 UDP datagram.
pub fn check_payload(message: &[u8]) -> Result<()> {
    if message.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::invalid_argument(format!(
            "message's length must be less than or equal {} bytes",
            MAX_PAYLOAD_SIZE
        )));
    }
    Ok(())
}

fn validate_port(port: Option<u32>) -> Result<u16> {
    let port =
        port.ok_or_else(|| Error::invalid_argument("'port' parameter must not be absent"))?;
    if port > MAX_PORT {
        return Err(Error::invalid_argument(format!(
            "'port' is out of range: {}",
            port
        )));
    }
    Ok(port as u16)
}

/// Resolve a textual group (dotted-decimal or host name) to an IPv4 multicast address.
fn resolve_group(text: &str, port: u16) -> Result<Ipv4Addr> {
    let addr = match text.trim().parse::<Ipv4Addr>() {
        Ok(addr) => addr,
        Err(_) => (text.trim(), port)
            .to_socket_addrs()?
            .find_map(|sa| match sa.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .ok_or_else(|| {
                Error::invalid_argument(format!(
                    "'group_address' does not resolve to an IPv4 address: {}",
                    text
                ))
            })?,
    };
    if !addr.is_multicast() {
        return Err(Error::invalid_argument(format!(
            "'group_address' is not a multicast address: {}",
            addr
        )));
    }
    Ok(addr)
}

/// Socket bound to the group port with the membership; receive side only.
fn open_membership(iface_addr: Ipv4Addr, group: Ipv4Addr, port: u16) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&bind_addr.into())?;
    socket.join_multicast_v4(&group, &iface_addr)?;
    Ok(socket.into())
}

/// Blocking socket that sends to the group through `iface_addr`.
fn open_sender(iface_addr: Ipv4Addr, loopback: bool, ttl: u32) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_multicast_if_v4(&iface_addr)?;
    socket.set_multicast_loop_v4(loopback)?;
    socket.set_multicast_ttl_v4(ttl)?;
    let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
    socket.bind(&bind_addr.into())?;
    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_interface() -> NetworkInterface {
        NetworkInterface::new("test0", vec![IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))])
    }

    fn expect_invalid_argument(result: Result<MulticastTransport>, expected: &str) {
        match result {
            Err(Error::InvalidArgument(msg)) => assert_eq!(msg, expected),
            Err(other) => panic!("expected invalid argument, got {:?}", other),
            Ok(_) => panic!("expected invalid argument, got a transport"),
        }
    }

    #[test]
    fn test_missing_interface() {
        expect_invalid_argument(
            MulticastTransport::builder()
                .group_address("")
                .port(0)
                .loopback(false)
                .build(),
            "'interface' parameter must not be absent",
        );
    }

    #[test]
    fn test_missing_group_address() {
        expect_invalid_argument(
            MulticastTransport::builder()
                .interface(fake_interface())
                .port(0)
                .build(),
            "'group_address' parameter must not be absent",
        );
    }

    #[test]
    fn test_port_out_of_range() {
        expect_invalid_argument(
            MulticastTransport::builder()
                .interface(fake_interface())
                .group_address("224.0.0.1")
                .port(65_536)
                .build(),
            "'port' is out of range: 65536",
        );
    }

    #[test]
    fn test_interface_without_ipv4() {
        let iface = NetworkInterface::new("v6only", vec![IpAddr::V6(std::net::Ipv6Addr::LOCALHOST)]);
        expect_invalid_argument(
            MulticastTransport::builder()
                .interface(iface)
                .group_address("224.0.0.1")
                .port(14725)
                .build(),
            "'interface' v6only carries no IPv4 address",
        );
    }

    #[test]
    fn test_ttl_out_of_range() {
        expect_invalid_argument(
            MulticastTransport::builder()
                .interface(fake_interface())
                .group_address("224.0.0.1")
                .port(14725)
                .ttl(256)
                .build(),
            "'ttl' is out of range: 256",
        );
    }

    #[test]
    fn test_group_must_be_multicast() {
        expect_invalid_argument(
            MulticastTransport::builder()
                .interface(fake_interface())
                .group_address("192.168.1.1")
                .port(14725)
                .build(),
            "'group_address' is not a multicast address: 192.168.1.1",
        );
    }

    #[test]
    fn test_check_payload_bounds() {
        assert!(check_payload(&[]).is_ok());
        assert!(check_payload(&vec![0u8; MAX_PAYLOAD_SIZE]).is_ok());
        match check_payload(&vec![0u8; MAX_PAYLOAD_SIZE + 1]) {
            Err(Error::InvalidArgument(msg)) => {
                assert_eq!(msg, "message's length must be less than or equal 65507 bytes");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_resolve_group_dotted() {
        assert_eq!(
            resolve_group(" 239.255.0.1 ", 7400).expect("multicast group"),
            Ipv4Addr::new(239, 255, 0, 1)
        );
    }

    #[test]
    fn test_validate_port_edges() {
        assert_eq!(validate_port(Some(0)).expect("port 0"), 0);
        assert_eq!(validate_port(Some(65_535)).expect("port max"), 65_535);
        assert!(validate_port(None).is_err());
    }

    const LOOPBACK_GROUP: &str = "224.0.0.1";

    /// Real transport on `lo`, or `None` when this host cannot join there.
    fn loopback_transport(
        port: u32,
        callback: Option<MessageCallback>,
    ) -> Option<MulticastTransport> {
        let lo = NetworkInterface::new("lo", vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);
        let mut builder = MulticastTransport::builder()
            .interface(lo)
            .group_address(LOOPBACK_GROUP)
            .port(port);
        builder.callback = callback;
        match builder.build() {
            Ok(transport) => Some(transport),
            Err(Error::Io(e)) => {
                eprintln!("skipping: cannot use {} on lo: {}", LOOPBACK_GROUP, e);
                None
            }
            Err(other) => panic!("unexpected build error {:?}", other),
        }
    }

    #[cfg(unix)]
    fn is_nonblocking(socket: &UdpSocket) -> bool {
        use std::os::fd::AsRawFd;

        // SAFETY: F_GETFL only reads the status flags of a descriptor owned by `socket`.
        let flags = unsafe { libc::fcntl(socket.as_raw_fd(), libc::F_GETFL) };
        assert!(flags >= 0, "fcntl(F_GETFL) failed");
        flags & libc::O_NONBLOCK != 0
    }

    #[test]
    fn test_loopback_transport_send_only() {
        let Some(transport) = loopback_transport(14791, None) else {
            return;
        };
        assert_eq!(transport.port(), 14791);
        assert_eq!(transport.local_ipv4(), Ipv4Addr::LOCALHOST);

        match transport.launch_consumer() {
            Err(Error::InvalidState(msg)) => {
                assert_eq!(msg, "no callback was supplied, this transport is send-only");
            }
            other => panic!("unexpected launch result {:?}", other),
        }
        assert!(!transport.is_consuming());

        match transport.send(&vec![0u8; MAX_PAYLOAD_SIZE + 1]) {
            Err(Error::InvalidArgument(_)) => {}
            other => panic!("unexpected send result {:?}", other),
        }
        transport.send(b"abc").expect("send");
        transport.close().expect("close");
    }

    #[test]
    fn test_send_burst_while_consuming() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::{Duration, Instant};

        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);
        let callback: MessageCallback = Box::new(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        let Some(transport) = loopback_transport(14792, Some(callback)) else {
            return;
        };

        transport.launch_consumer().expect("launch");
        assert!(transport.is_consuming());
        match transport.launch_consumer() {
            Err(Error::InvalidState(msg)) => assert_eq!(msg, "consumer has already been launched"),
            other => panic!("unexpected relaunch result {:?}", other),
        }

        #[cfg(unix)]
        {
            assert!(is_nonblocking(&transport.socket));
            assert!(!is_nonblocking(&transport.sender));
        }

        let payload = vec![0x5A; MAX_PAYLOAD_SIZE];
        let failures: Vec<Error> = (0..2000)
            .filter_map(|_| transport.send(&payload).err())
            .collect();
        assert!(failures.is_empty(), "{} sends failed, first: {}", failures.len(), failures[0]);

        let deadline = Instant::now() + Duration::from_secs(5);
        while received.load(Ordering::Relaxed) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(received.load(Ordering::Relaxed) > 0);
        transport.close().expect("close");
    }
}
