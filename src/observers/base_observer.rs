// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Base observer types for monitoring frame flow in the pipeline.
//!
//! Observers view every frame a processor forwards without being part of the
//! pipeline structure, enabling frame logging, debugging and analytics
//! without inserting extra processors.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use framewire::observers::{FramePushed, Observer};
//!
//! struct DebugObserver;
//!
//! #[async_trait]
//! impl Observer for DebugObserver {
//!     async fn on_push_frame(&self, data: &FramePushed) {
//!         println!("{}: {} ({:?})", data.source_name, data.frame_name, data.direction);
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::frames::FrameKind;
use crate::processors::FrameDirection;

/// Event data for a frame being forwarded out of a processor.
///
/// Produced by the pipeline driver each time a processor's buffered output
/// frame is routed to a neighbor.
#[derive(Debug, Clone)]
pub struct FramePushed {
    /// Unique identifier of the processor that emitted the frame.
    pub source_id: u64,
    /// Human-readable name of the processor that emitted the frame.
    pub source_name: String,
    /// Unique identifier of the frame being forwarded.
    pub frame_id: u64,
    /// Human-readable name (type) of the frame being forwarded.
    pub frame_name: String,
    /// The direction of the transfer (downstream or upstream).
    pub direction: FrameDirection,
    /// The kind (category) of the frame: System, Data, or Control.
    pub frame_kind: FrameKind,
    /// Wall-clock time of the push, in milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// Base trait for pipeline observers that monitor frame flow without
/// modifying it.
///
/// Observers are passed to a `PipelineTask`, which wires them into every
/// processor during setup. The callback has a default no-op implementation.
#[async_trait]
pub trait Observer: Send + Sync {
    /// Called when a frame is forwarded from one processor to the next.
    async fn on_push_frame(&self, _data: &FramePushed) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// A test observer that counts callback invocations.
    struct CountingObserver {
        push_count: AtomicU64,
    }

    #[async_trait]
    impl Observer for CountingObserver {
        async fn on_push_frame(&self, _data: &FramePushed) {
            self.push_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// A no-op observer relying on the default implementation.
    struct NoOpObserver;

    #[async_trait]
    impl Observer for NoOpObserver {}

    fn sample_push() -> FramePushed {
        FramePushed {
            source_id: 1,
            source_name: "test_processor".to_string(),
            frame_id: 100,
            frame_name: "TextFrame".to_string(),
            direction: FrameDirection::Downstream,
            frame_kind: FrameKind::Data,
            timestamp: 1234567890,
        }
    }

    #[tokio::test]
    async fn test_counting_observer() {
        let observer = CountingObserver {
            push_count: AtomicU64::new(0),
        };
        let data = sample_push();
        observer.on_push_frame(&data).await;
        observer.on_push_frame(&data).await;
        assert_eq!(observer.push_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_noop_observer() {
        let observer = NoOpObserver;
        observer.on_push_frame(&sample_push()).await;
    }

    #[test]
    fn test_observer_is_object_safe() {
        fn _accept_observer(_obs: &dyn Observer) {}
    }

    #[test]
    fn test_frame_pushed_clone() {
        let data = sample_push();
        let cloned = data.clone();
        assert_eq!(cloned.source_id, 1);
        assert_eq!(cloned.frame_kind, FrameKind::Data);
    }
}
