// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Transport error types.

use thiserror::Error;

/// Errors surfaced by transport construction and operation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Session arguments did not select exactly one backend.
    #[error("session arguments must populate exactly one of websocket, room_url, or webrtc_connection")]
    InvalidSessionArguments,

    /// A capability was requested that the selected backend does not have.
    #[error("operation `{operation}` is not supported by the {backend} transport")]
    UnsupportedOperation {
        operation: String,
        backend: &'static str,
    },

    /// Handlers were registered on a registry that was already bound.
    #[error("event handlers were already bound to a transport")]
    HandlersAlreadyBound,

    /// The transport has not been started or has already shut down.
    #[error("transport is not connected")]
    NotConnected,

    /// An error reported by the underlying backend.
    #[error("transport backend error: {0}")]
    Backend(String),
}
