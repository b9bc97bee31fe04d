// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Frame processing infrastructure.
//!
//! This module provides the core frame processing system that pipelines are
//! built from: the [`FrameProcessor`] trait, the [`BaseProcessor`] state all
//! processors embed, and [`drive_processor`], the forwarding loop.
//!
//! # Architecture
//!
//! Frame processors are connected in a chain. Each processor receives frames,
//! processes them, and buffers output frames via `push_frame`. The
//! [`drive_processor`] function handles the actual forwarding: it locks a
//! processor, calls `process_frame`, drains the buffered output frames,
//! releases the lock, and then forwards each buffered frame to the
//! appropriate next/prev processor. This avoids recursive locking deadlocks
//! when processors push frames in both directions.
//!
//! The `next`/`prev` links exist only for routing. The enclosing pipeline
//! owns its processors; neighbors never own each other.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::frames::{ErrorFrame, Frame, FrameRef};
use crate::observers::{FramePushed, Observer};
use crate::utils::base_object::BaseObject;
use crate::utils::helpers::now_millis;

/// Direction of frame flow in the processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameDirection {
    /// Frames flowing from input to output.
    Downstream,
    /// Frames flowing back from output to input.
    Upstream,
}

/// Configuration handed to every processor before the pipeline starts.
#[derive(Default, Clone)]
pub struct FrameProcessorSetup {
    /// Observer notified of every forwarded frame.
    pub observer: Option<Arc<dyn Observer>>,
}

/// Implement `Debug` and `Display` for a type that contains a
/// `base: BaseProcessor` field.
///
/// The `Debug` impl prints `TypeName(name)` and the `Display` impl prints
/// just the processor name obtained from `self.base.name()`.
#[macro_export]
macro_rules! impl_base_debug_display {
    ($struct_name:ident) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($struct_name), self.base.name())
            }
        }

        impl std::fmt::Display for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.base.name())
            }
        }
    };
}

/// Implement only `Display` for a type that contains a `base: BaseProcessor`
/// field. Use this when the type needs a custom `Debug`.
#[macro_export]
macro_rules! impl_base_display {
    ($struct_name:ident) => {
        impl std::fmt::Display for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.base.name())
            }
        }
    };
}

/// Core trait for all frame processors in the pipeline.
///
/// Frame processors receive frames, process them, and push results toward the
/// next or previous processor in the chain. Frames are buffered during
/// processing and forwarded after the processor's lock is released.
///
/// The base contract is transparent pass-through: a processor intercepts only
/// the frame kinds it cares about and must re-emit (or deliberately drop)
/// everything else. Swallowing a frame the processor did not mean to consume
/// breaks pipeline liveness.
///
/// # Reducing boilerplate
///
/// Most methods have default implementations that delegate to `self.base()`
/// or `self.base_mut()`. Implementors only need to provide:
///
/// - [`base()`](FrameProcessor::base) / [`base_mut()`](FrameProcessor::base_mut)
///   -- accessors for the `BaseProcessor` field.
/// - [`process_frame()`](FrameProcessor::process_frame) -- the custom
///   frame-handling logic.
#[async_trait]
pub trait FrameProcessor: Send + Sync + fmt::Debug + fmt::Display {
    /// Return a shared reference to the underlying [`BaseProcessor`].
    fn base(&self) -> &BaseProcessor;

    /// Return a mutable reference to the underlying [`BaseProcessor`].
    fn base_mut(&mut self) -> &mut BaseProcessor;

    /// Get the unique identifier for this processor.
    fn id(&self) -> u64 {
        self.base().id()
    }

    /// Get the name of this processor.
    fn name(&self) -> &str {
        self.base().name()
    }

    /// Get the list of sub-processors (for composite processors).
    fn processors(&self) -> Vec<Arc<Mutex<dyn FrameProcessor>>> {
        vec![]
    }

    /// Set up the processor before the pipeline starts.
    ///
    /// Composite processors forward the setup to their members.
    async fn setup(&mut self, setup: &FrameProcessorSetup) {
        self.base_mut().observer = setup.observer.clone();
    }

    /// Clean up processor resources after the pipeline has finished.
    async fn cleanup(&mut self) {}

    /// Process a frame in the given direction.
    ///
    /// Implementations call `self.push_frame(frame, direction)` to buffer
    /// output frames for forwarding.
    async fn process_frame(&mut self, frame: FrameRef, direction: FrameDirection);

    /// Link this processor to the next processor in the pipeline.
    fn link(&mut self, next: Arc<Mutex<dyn FrameProcessor>>) {
        self.base_mut().next = Some(next);
    }

    /// Set the previous processor in the pipeline.
    fn set_prev(&mut self, prev: Arc<Mutex<dyn FrameProcessor>>) {
        self.base_mut().prev = Some(prev);
    }

    /// Get a routing reference to the next processor.
    fn next_processor(&self) -> Option<Arc<Mutex<dyn FrameProcessor>>> {
        self.base().next.clone()
    }

    /// Get a routing reference to the previous processor.
    fn prev_processor(&self) -> Option<Arc<Mutex<dyn FrameProcessor>>> {
        self.base().prev.clone()
    }

    /// Get mutable access to the pending frames buffer.
    ///
    /// Used by [`drive_processor`] to drain buffered frames after processing.
    fn pending_frames_mut(&mut self) -> &mut Vec<(FrameRef, FrameDirection)> {
        &mut self.base_mut().pending_frames
    }

    /// Buffer a frame for later forwarding by [`drive_processor`].
    ///
    /// This is the primary mechanism for processors to send frames to
    /// neighboring processors without causing recursive lock deadlocks.
    async fn push_frame(&mut self, frame: FrameRef, direction: FrameDirection) {
        self.pending_frames_mut().push((frame, direction));
    }

    /// Push an error frame upstream.
    async fn push_error(&mut self, error_msg: &str, fatal: bool) {
        let frame = Arc::new(ErrorFrame::new(error_msg.to_string(), fatal));
        self.push_frame(frame, FrameDirection::Upstream).await;
    }
}

/// Drive frame processing on a processor without holding locks during
/// forwarding.
///
/// This function:
/// 1. Locks the processor
/// 2. Calls `process_frame` (which buffers output via `push_frame`)
/// 3. Drains the buffered frames and captures next/prev routing references
/// 4. Releases the lock
/// 5. Forwards each buffered frame to the appropriate neighbor, notifying
///    the observer (if configured) per forwarded frame
///
/// A frame that reaches the end of the chain (no neighbor in its direction)
/// is dropped with a trace log; pipeline boundaries install capture
/// processors so this only happens for genuinely unrouted frames.
///
/// One invocation processes the given frame *completely* -- including every
/// frame transitively emitted while handling it -- before returning, which
/// is what preserves per-link FIFO ordering for consecutive calls.
pub async fn drive_processor(
    processor: Arc<Mutex<dyn FrameProcessor>>,
    frame: FrameRef,
    direction: FrameDirection,
) {
    // Iterative work stack instead of async recursion (which would need
    // Box::pin at every hop). DFS order: pending frames are pushed in
    // reverse so the first emitted frame is forwarded first.
    type WorkItem = (Arc<Mutex<dyn FrameProcessor>>, FrameRef, FrameDirection);
    let mut work_stack: Vec<WorkItem> = Vec::new();
    work_stack.push((processor, frame, direction));

    while let Some((proc, f, d)) = work_stack.pop() {
        // Phase 1: lock, process, drain buffer, capture routing info, unlock.
        let (pending, next, prev, observer, source_id, source_name) = {
            let mut p = proc.lock().await;
            p.process_frame(f, d).await;
            let pending = std::mem::take(p.pending_frames_mut());
            (
                pending,
                p.next_processor(),
                p.prev_processor(),
                p.base().observer.clone(),
                p.id(),
                p.name().to_string(),
            )
        }; // Lock released here.

        // Phase 2: notify the observer in emission order.
        if let Some(observer) = &observer {
            for (frame, dir) in pending.iter() {
                observer
                    .on_push_frame(&FramePushed {
                        source_id,
                        source_name: source_name.clone(),
                        frame_id: frame.id(),
                        frame_name: frame.name().to_string(),
                        direction: *dir,
                        frame_kind: frame.kind(),
                        timestamp: now_millis(),
                    })
                    .await;
            }
        }

        // Phase 3: push pending frames to the work stack in reverse (DFS).
        for (frame, dir) in pending.into_iter().rev() {
            let target = match dir {
                FrameDirection::Downstream => next.clone(),
                FrameDirection::Upstream => prev.clone(),
            };
            match target {
                Some(target) => work_stack.push((target, frame, dir)),
                None => {
                    tracing::trace!(
                        source = %source_name,
                        frame = %frame.name(),
                        ?dir,
                        "drive_processor: frame dropped at chain boundary"
                    );
                }
            }
        }
    }
}

/// Common state embedded by every concrete frame processor.
pub struct BaseProcessor {
    base: BaseObject,
    /// Routing reference to the next processor; never an ownership edge.
    pub next: Option<Arc<Mutex<dyn FrameProcessor>>>,
    /// Routing reference to the previous processor; never an ownership edge.
    pub prev: Option<Arc<Mutex<dyn FrameProcessor>>>,
    /// Whether a `StartFrame` has been seen.
    pub started: bool,
    /// Observer notified of forwarded frames (set during setup).
    pub observer: Option<Arc<dyn Observer>>,
    /// Output frames buffered during `process_frame`, drained by the driver.
    pub pending_frames: Vec<(FrameRef, FrameDirection)>,
}

impl BaseProcessor {
    pub fn new(name: Option<String>) -> Self {
        Self {
            base: BaseObject::with_type_name("FrameProcessor", name),
            next: None,
            prev: None,
            started: false,
            observer: None,
            pending_frames: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.base.id()
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }
}

impl fmt::Debug for BaseProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseProcessor")
            .field("id", &self.base.id())
            .field("name", &self.base.name())
            .finish()
    }
}

impl_base_display!(BaseProcessor);

/// A simple passthrough processor that forwards all frames unchanged.
pub struct PassthroughProcessor {
    base: BaseProcessor,
}

impl PassthroughProcessor {
    pub fn new(name: Option<String>) -> Self {
        Self {
            base: BaseProcessor::new(name),
        }
    }
}

impl_base_debug_display!(PassthroughProcessor);

#[async_trait]
impl FrameProcessor for PassthroughProcessor {
    fn base(&self) -> &BaseProcessor {
        &self.base
    }
    fn base_mut(&mut self) -> &mut BaseProcessor {
        &mut self.base
    }

    async fn process_frame(&mut self, frame: FrameRef, direction: FrameDirection) {
        self.push_frame(frame, direction).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
