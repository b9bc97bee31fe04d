// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Frame serialization for WebSocket transport protocols.

pub mod json;

pub use json::JsonFrameSerializer;

use crate::frames::{Frame, FrameRef};

/// Serialized frame data - either text or binary.
pub enum SerializedFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Base trait for frame serializers.
///
/// `serialize` and `should_ignore_frame` accept `&dyn Frame` because the
/// transport layer already holds frames as `Arc<dyn Frame>` and the
/// serializer only needs to inspect the frame (via `downcast_ref`).
///
/// `deserialize` returns a freshly-allocated [`FrameRef`] ready to be pushed
/// into the pipeline.
pub trait FrameSerializer: Send + Sync {
    /// Check if a frame should be skipped during serialization.
    fn should_ignore_frame(&self, _frame: &dyn Frame) -> bool {
        false
    }

    /// Serialize a frame to wire format.
    ///
    /// Returns `None` when the frame type has no wire representation.
    fn serialize(&self, frame: &dyn Frame) -> Option<SerializedFrame>;

    /// Deserialize wire data to a frame.
    ///
    /// Returns `None` when the data is malformed or the frame type unknown.
    fn deserialize(&self, data: &[u8]) -> Option<FrameRef>;
}
