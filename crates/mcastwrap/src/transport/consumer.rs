// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Receive loop for a multicast transport.
//!
//! ```text
//! mio::poll() -> recv_from(buf) -> own-address filter -> buf[..len].to_vec() -> callback
//!      ^
//!      +-- Waker (close) : loop re-checks the running flag and exits
//! ```
//!
//! The loop owns a clone of the membership socket, which is never used for
//! sending. It blocks in `poll` with no timeout; the waker is the only way to
//! interrupt a parked receive. The callback stays in its shared slot until
//! the receive thread takes it, so a launch that fails during setup leaves it
//! in place for the next attempt.

use crate::config::{CONSUMER_THREAD_NAME, RECV_BUFFER_SIZE};
use mio::{Events, Interest, Poll, Token, Waker};
use parking_lot::Mutex;
use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Callback invoked once per received datagram, on the receive thread.
pub type MessageCallback = Box<dyn FnMut(Vec<u8>) + Send + 'static>;

/// Callback waiting to be taken by the receive thread.
pub(crate) type CallbackSlot = Arc<Mutex<Option<MessageCallback>>>;

const SOCKET_TOKEN: Token = Token(0);
const WAKER_TOKEN: Token = Token(1);

/// Handle on a running receive loop.
pub(crate) struct Consumer {
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl Consumer {
    /// Register `socket` with a fresh poll and spawn the receive thread.
    ///
    /// Poll/waker setup errors surface here, on the caller's thread, and
    /// leave `callback` untouched.
    pub(crate) fn spawn(
        socket: UdpSocket,
        callback: CallbackSlot,
        own_address: Option<Ipv4Addr>,
    ) -> io::Result<Self> {
        socket.set_nonblocking(true)?;
        let mut mio_socket = mio::net::UdpSocket::from_std(socket);

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut mio_socket, SOCKET_TOKEN, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);

        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name(CONSUMER_THREAD_NAME.to_string())
            .spawn(move || {
                run_loop(poll, mio_socket, running_clone, callback, own_address);
            })?;

        Ok(Self {
            handle: Some(handle),
            running,
            waker,
        })
    }

    /// Whether the receive thread is still looping.
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop to stop and wait for the thread to exit.
    pub(crate) fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Err(e) = self.waker.wake() {
            log::error!("[MCAST-RX] Failed to wake receive loop: {}", e);
        }
        if let Some(handle) = self.handle.take() {
            // Stopping from inside the callback must not join the current thread.
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::error!("[MCAST-RX] Receive thread panicked");
            }
        }
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(
    mut poll: Poll,
    socket: mio::net::UdpSocket,
    running: Arc<AtomicBool>,
    callback: CallbackSlot,
    own_address: Option<Ipv4Addr>,
) {
    let Some(mut callback) = callback.lock().take() else {
        log::error!("[MCAST-RX] no callback left to deliver to, receive loop not started");
        return;
    };
    let local_addr = socket
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    log::debug!("[MCAST-RX] receive loop started addr={}", local_addr);

    let mut events = Events::with_capacity(16);
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    'outer: while running.load(Ordering::Acquire) {
        if let Err(e) = poll.poll(&mut events, None) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            log::error!("[MCAST-RX] poll failed, stopping receive loop: {}", e);
            break;
        }

        for event in events.iter() {
            if event.token() != SOCKET_TOKEN {
                // Waker: the loop condition decides.
                continue;
            }

            // Drain every queued datagram (edge-triggered readiness).
            while running.load(Ordering::Acquire) {
                let (len, src) = match socket.recv_from(&mut buf) {
                    Ok(received) => received,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        log::error!("[MCAST-RX] recv_from failed, stopping receive loop: {}", e);
                        break 'outer;
                    }
                };

                let own = is_own_datagram(own_address, src.ip());
                log::debug!(
                    "[MCAST-RX] recv len={} src={} local={:?} own={}",
                    len,
                    src,
                    own_address,
                    own
                );
                if own {
                    continue;
                }

                callback(buf[..len].to_vec());
            }
        }
    }

    log::debug!("[MCAST-RX] receive loop stopped addr={}", local_addr);
}

/// Best-effort self-detection: compares the datagram source with this
/// node's interface address. Multi-homed or NAT'd hosts may slip through.
fn is_own_datagram(own_address: Option<Ipv4Addr>, src: IpAddr) -> bool {
    match (own_address, src) {
        (Some(own), IpAddr::V4(src)) => own == src,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;
    use std::time::Duration;

    fn slot(callback: impl FnMut(Vec<u8>) + Send + 'static) -> CallbackSlot {
        Arc::new(Mutex::new(Some(Box::new(callback) as MessageCallback)))
    }

    #[test]
    fn test_is_own_datagram() {
        let own = Ipv4Addr::new(192, 168, 1, 22);
        assert!(is_own_datagram(Some(own), IpAddr::V4(own)));
        assert!(!is_own_datagram(
            Some(own),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 23))
        ));
        assert!(!is_own_datagram(None, IpAddr::V4(own)));
        assert!(!is_own_datagram(
            Some(own),
            IpAddr::V6(std::net::Ipv6Addr::LOCALHOST)
        ));
    }

    // Unicast on 127.0.0.1 exercises the loop without needing multicast routing.
    #[test]
    fn test_consumer_delivers_exact_bytes_in_order() {
        let rx_socket = UdpSocket::bind("127.0.0.1:0").expect("bind receiver");
        let rx_addr = rx_socket.local_addr().expect("local addr");
        let (tx, rx) = unbounded();

        let mut consumer = Consumer::spawn(
            rx_socket,
            slot(move |msg| {
                let _ = tx.send(msg);
            }),
            None,
        )
        .expect("spawn consumer");

        let sender = UdpSocket::bind("127.0.0.1:0").expect("bind sender");
        sender.send_to(b"first", rx_addr).expect("send");
        sender.send_to(&[0xAB; 3000], rx_addr).expect("send");

        let first = rx.recv_timeout(Duration::from_secs(5)).expect("first datagram");
        let second = rx.recv_timeout(Duration::from_secs(5)).expect("second datagram");
        assert_eq!(first, b"first");
        assert_eq!(second, vec![0xAB; 3000]);

        consumer.stop();
        assert!(!consumer.is_running());
    }

    #[test]
    fn test_consumer_filters_own_address() {
        let rx_socket = UdpSocket::bind("127.0.0.1:0").expect("bind receiver");
        let rx_addr = rx_socket.local_addr().expect("local addr");
        let (tx, rx) = unbounded();

        let mut consumer = Consumer::spawn(
            rx_socket,
            slot(move |msg| {
                let _ = tx.send(msg);
            }),
            Some(Ipv4Addr::LOCALHOST),
        )
        .expect("spawn consumer");

        let sender = UdpSocket::bind("127.0.0.1:0").expect("bind sender");
        sender.send_to(b"mine", rx_addr).expect("send");

        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        consumer.stop();
    }

    #[test]
    fn test_stop_unblocks_idle_loop() {
        let rx_socket = UdpSocket::bind("127.0.0.1:0").expect("bind receiver");
        let mut consumer =
            Consumer::spawn(rx_socket, slot(|_| {}), None).expect("spawn consumer");
        assert!(consumer.is_running());

        // No datagram ever arrives: only the waker can end the poll.
        consumer.stop();
        assert!(!consumer.is_running());
    }

    #[test]
    fn test_receive_thread_takes_callback() {
        let rx_socket = UdpSocket::bind("127.0.0.1:0").expect("bind receiver");
        let rx_addr = rx_socket.local_addr().expect("local addr");
        let (tx, rx) = unbounded();
        let callback = slot(move |msg| {
            let _ = tx.send(msg);
        });

        let mut consumer =
            Consumer::spawn(rx_socket, Arc::clone(&callback), None).expect("spawn consumer");
        let sender = UdpSocket::bind("127.0.0.1:0").expect("bind sender");
        sender.send_to(b"ping", rx_addr).expect("send");
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).expect("datagram"), b"ping");
        assert!(callback.lock().is_none());
        consumer.stop();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_setup_keeps_callback() {
        use std::os::fd::{FromRawFd, IntoRawFd};

        // epoll refuses regular files, so registration fails after the
        // descriptor has been switched to non-blocking mode.
        let file = tempfile::tempfile().expect("temp file");
        // SAFETY: the descriptor comes from `into_raw_fd` and is owned by
        // exactly one value from here on.
        let not_a_socket = unsafe { UdpSocket::from_raw_fd(file.into_raw_fd()) };

        let callback = slot(|_| {});
        match Consumer::spawn(not_a_socket, Arc::clone(&callback), None) {
            Err(_) => {}
            Ok(_) => panic!("registering a regular file must fail"),
        }
        assert!(callback.lock().is_some());
    }
}
