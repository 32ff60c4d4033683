// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types shared by the transport and the invocation layer.

use thiserror::Error;

/// Boxed error returned by replicated methods.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for mcastwrap operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the transport, the codec and the dispatcher.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad construction or send parameter, detected before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Lifecycle misuse (consumer started twice, started without callback).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Socket-level failure during construction, send or shutdown.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An argument value could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Malformed, truncated or corrupted wire payload.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// The class identifier is not registered in this process.
    #[error("class not found: {0}")]
    ClassNotFound(String),

    /// No method with this name and exact parameter signature.
    #[error("method not found: {class}::{method}({})", .params.join(", "))]
    MethodNotFound {
        class: String,
        method: String,
        params: Vec<String>,
    },

    /// The target method itself failed.
    #[error("invocation of {class}::{method} failed: {source}")]
    Invocation {
        class: String,
        method: String,
        #[source]
        source: BoxError,
    },

    /// Configuration file or environment could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub(crate) fn deserialization(msg: impl Into<String>) -> Self {
        Self::Deserialization(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_method_not_found_lists_signature() {
        let err = Error::MethodNotFound {
            class: "Inventory".into(),
            method: "restock".into(),
            params: vec!["str".into(), "u32".into()],
        };
        assert_eq!(
            err.to_string(),
            "method not found: Inventory::restock(str, u32)"
        );
    }

    #[test]
    fn test_invocation_keeps_source() {
        let err = Error::Invocation {
            class: "Inventory".into(),
            method: "restock".into(),
            source: "out of stock".into(),
        };
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("out of stock")
        );
    }

    #[test]
    fn test_io_conversion() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert!(matches!(err, Error::Io(_)));
    }
}
