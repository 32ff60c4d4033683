// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Caller side of group invocation: encode a request and broadcast it.

use super::codec::InvocationRequest;
use super::value::TypedArg;
use crate::config::MAX_PAYLOAD_SIZE;
use crate::error::{Error, Result};
use crate::transport::MulticastTransport;
use std::sync::Arc;

/// Anything that can push one datagram to every group member.
pub trait Broadcast {
    fn broadcast(&self, message: &[u8]) -> Result<()>;
}

impl Broadcast for MulticastTransport {
    fn broadcast(&self, message: &[u8]) -> Result<()> {
        self.send(message)
    }
}

impl<B: Broadcast + ?Sized> Broadcast for &B {
    fn broadcast(&self, message: &[u8]) -> Result<()> {
        (**self).broadcast(message)
    }
}

impl<B: Broadcast + ?Sized> Broadcast for Arc<B> {
    fn broadcast(&self, message: &[u8]) -> Result<()> {
        (**self).broadcast(message)
    }
}

/// Invokes replicated methods on every node of a group.
///
/// Fire-and-forget: return values stay on the receiving nodes.
#[derive(Debug)]
pub struct GroupInvoker<S> {
    sink: S,
}

impl<S: Broadcast> GroupInvoker<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Encode `class::method(args)` and broadcast it to the group.
    ///
    /// Frames over [`MAX_PAYLOAD_SIZE`] are rejected with
    /// [`Error::InvalidArgument`] before anything is sent.
    pub fn invoke_in_group(
        &self,
        class: impl Into<String>,
        method: impl Into<String>,
        args: Vec<TypedArg>,
    ) -> Result<()> {
        let request = InvocationRequest::new(class, method, args);
        let frame = request.encode()?;
        if frame.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::invalid_argument(format!(
                "encoded invocation {}::{} is {} bytes, limit is {}",
                request.class,
                request.method,
                frame.len(),
                MAX_PAYLOAD_SIZE
            )));
        }
        log::debug!(
            "[INVOKE] broadcast {}::{} argc={} len={}",
            request.class,
            request.method,
            request.args.len(),
            frame.len()
        );
        self.sink.broadcast(&frame)
    }

    pub fn get_ref(&self) -> &S {
        &self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::value::Blob;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl Broadcast for Recorder {
        fn broadcast(&self, message: &[u8]) -> Result<()> {
            self.sent.lock().push(message.to_vec());
            Ok(())
        }
    }

    #[test]
    fn test_invoke_broadcasts_decodable_frame() {
        let invoker = GroupInvoker::new(Recorder::default());
        invoker
            .invoke_in_group("Cache", "evict", vec![TypedArg::of("k1".to_string()).unwrap()])
            .expect("broadcast");

        let sent = invoker.get_ref().sent.lock();
        assert_eq!(sent.len(), 1);
        let request = InvocationRequest::decode(&sent[0]).expect("decode");
        assert_eq!(request.class, "Cache");
        assert_eq!(request.method, "evict");
        assert_eq!(request.param_types(), vec!["str"]);
    }

    #[test]
    fn test_oversized_invocation_rejected() {
        let recorder = Arc::new(Recorder::default());
        let invoker = GroupInvoker::new(Arc::clone(&recorder));
        let err = invoker
            .invoke_in_group(
                "Cache",
                "load",
                vec![TypedArg::of(Blob(vec![0u8; MAX_PAYLOAD_SIZE])).unwrap()],
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(recorder.sent.lock().is_empty());
    }

    #[test]
    fn test_borrowed_sink() {
        let recorder = Recorder::default();
        GroupInvoker::new(&recorder)
            .invoke_in_group("Cache", "clear", Vec::new())
            .expect("broadcast");
        assert_eq!(recorder.sent.lock().len(), 1);
    }
}
