// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Linear pipeline: an ordered chain of frame processors wired into one
//! composite processor.
//!
//! On construction, processor *i*'s downstream output is linked to processor
//! *i+1*'s input and *i+1*'s upstream output back to *i*. Internal boundary
//! processors sit at both ends of the chain: frames exiting the chain are
//! captured into exit channels and forwarded to the pipeline's own linked
//! neighbors by background drainer tasks. This keeps the chain's drive fully
//! inside the pipeline (no lock is ever taken on an enclosing processor while
//! the pipeline's own lock is held) while still letting asynchronous
//! producers inside the chain -- transport readers, parallel-branch mergers
//! -- stream frames out at any time.
//!
//! A `Pipeline` is itself a [`FrameProcessor`], so pipelines nest: pushing a
//! frame downstream into a pipeline injects it at the first member, pushing
//! upstream injects it at the last member.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::frames::{Frame, FrameRef};
use crate::impl_base_debug_display;
use crate::processors::{
    drive_processor, BaseProcessor, FrameDirection, FrameProcessor, FrameProcessorSetup,
};

/// Shared routing cell for the pipeline's outer neighbors.
///
/// Written when the enclosing container links the pipeline, read by the
/// drainer tasks each time a frame exits the chain.
pub(crate) type SharedLink = Arc<std::sync::Mutex<Option<Arc<Mutex<dyn FrameProcessor>>>>>;

pub(crate) fn shared_link() -> SharedLink {
    Arc::new(std::sync::Mutex::new(None))
}

pub(crate) fn store_link(cell: &SharedLink, target: Arc<Mutex<dyn FrameProcessor>>) {
    *cell.lock().expect("pipeline link cell poisoned") = Some(target);
}

pub(crate) fn load_link(cell: &SharedLink) -> Option<Arc<Mutex<dyn FrameProcessor>>> {
    cell.lock().expect("pipeline link cell poisoned").clone()
}

// ---------------------------------------------------------------------------
// Boundary processors
// ---------------------------------------------------------------------------

/// Chain-end processor capturing frames that exit the pipeline.
///
/// Frames flowing in the boundary's exit direction are moved to the exit
/// channel; frames in the other direction are forwarded into the chain.
struct PipelineBoundary {
    base: BaseProcessor,
    exit_direction: FrameDirection,
    exit_tx: mpsc::UnboundedSender<FrameRef>,
}

impl PipelineBoundary {
    fn new(
        name: &str,
        exit_direction: FrameDirection,
        exit_tx: mpsc::UnboundedSender<FrameRef>,
    ) -> Self {
        Self {
            base: BaseProcessor::new(Some(name.to_string())),
            exit_direction,
            exit_tx,
        }
    }
}

impl_base_debug_display!(PipelineBoundary);

#[async_trait]
impl FrameProcessor for PipelineBoundary {
    fn base(&self) -> &BaseProcessor {
        &self.base
    }
    fn base_mut(&mut self) -> &mut BaseProcessor {
        &mut self.base
    }

    async fn process_frame(&mut self, frame: FrameRef, direction: FrameDirection) {
        if direction == self.exit_direction {
            if self.exit_tx.send(frame).is_err() {
                tracing::warn!("{}: exit channel closed, frame lost", self.name());
            }
        } else {
            self.push_frame(frame, direction).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// An ordered chain of frame processors behaving as one composite processor.
pub struct Pipeline {
    base: BaseProcessor,
    /// The user's processors, in chain order. Owned by the pipeline; the
    /// next/prev links between them are routing references only.
    processors: Vec<Arc<Mutex<dyn FrameProcessor>>>,
    /// Upstream chain end (`PipelineSource`).
    source: Arc<Mutex<dyn FrameProcessor>>,
    /// Downstream chain end (`PipelineSink`).
    sink: Arc<Mutex<dyn FrameProcessor>>,
    /// Routing cell mirroring `base.next`, read by the downstream drainer.
    outer_next: SharedLink,
    /// Routing cell mirroring `base.prev`, read by the upstream drainer.
    outer_prev: SharedLink,
    /// Cancels the drainer tasks.
    drain_token: CancellationToken,
}

impl Pipeline {
    /// Build a pipeline from an ordered list of processors.
    ///
    /// Must be called within a Tokio runtime: the boundary drainer tasks are
    /// spawned here.
    pub fn new(processors: Vec<Arc<Mutex<dyn FrameProcessor>>>) -> Self {
        let (down_tx, down_rx) = mpsc::unbounded_channel();
        let (up_tx, up_rx) = mpsc::unbounded_channel();

        let source = Arc::new(Mutex::new(PipelineBoundary::new(
            "PipelineSource",
            FrameDirection::Upstream,
            up_tx,
        ))) as Arc<Mutex<dyn FrameProcessor>>;
        let sink = Arc::new(Mutex::new(PipelineBoundary::new(
            "PipelineSink",
            FrameDirection::Downstream,
            down_tx,
        ))) as Arc<Mutex<dyn FrameProcessor>>;

        // Wire source -> p0 -> ... -> pn -> sink. Construction-time wiring:
        // none of these mutexes can be contended yet.
        let mut chain: Vec<Arc<Mutex<dyn FrameProcessor>>> = Vec::with_capacity(processors.len() + 2);
        chain.push(source.clone());
        chain.extend(processors.iter().cloned());
        chain.push(sink.clone());
        for pair in chain.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            a.try_lock()
                .expect("BUG: processor locked during pipeline construction")
                .link(b.clone());
            b.try_lock()
                .expect("BUG: processor locked during pipeline construction")
                .set_prev(a.clone());
        }

        let outer_next = shared_link();
        let outer_prev = shared_link();
        let drain_token = CancellationToken::new();

        spawn_drainer(
            down_rx,
            outer_next.clone(),
            FrameDirection::Downstream,
            drain_token.clone(),
        );
        spawn_drainer(
            up_rx,
            outer_prev.clone(),
            FrameDirection::Upstream,
            drain_token.clone(),
        );

        Self {
            base: BaseProcessor::new(None),
            processors,
            source,
            sink,
            outer_next,
            outer_prev,
            drain_token,
        }
    }
}

/// Forward frames exiting the chain to the pipeline's outer neighbor.
///
/// One drainer per direction preserves per-direction FIFO ordering of the
/// chain's output.
fn spawn_drainer(
    mut exit_rx: mpsc::UnboundedReceiver<FrameRef>,
    link: SharedLink,
    direction: FrameDirection,
    token: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                frame = exit_rx.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };
            match load_link(&link) {
                Some(target) => drive_processor(target, frame, direction).await,
                None => {
                    tracing::trace!(
                        frame = %frame.name(),
                        ?direction,
                        "Pipeline: frame exited unlinked pipeline boundary"
                    );
                }
            }
        }
    });
}

impl_base_debug_display!(Pipeline);

#[async_trait]
impl FrameProcessor for Pipeline {
    fn base(&self) -> &BaseProcessor {
        &self.base
    }
    fn base_mut(&mut self) -> &mut BaseProcessor {
        &mut self.base
    }

    fn processors(&self) -> Vec<Arc<Mutex<dyn FrameProcessor>>> {
        self.processors.clone()
    }

    fn link(&mut self, next: Arc<Mutex<dyn FrameProcessor>>) {
        store_link(&self.outer_next, next.clone());
        self.base_mut().next = Some(next);
    }

    fn set_prev(&mut self, prev: Arc<Mutex<dyn FrameProcessor>>) {
        store_link(&self.outer_prev, prev.clone());
        self.base_mut().prev = Some(prev);
    }

    async fn setup(&mut self, setup: &FrameProcessorSetup) {
        self.base_mut().observer = setup.observer.clone();
        self.source.lock().await.setup(setup).await;
        for processor in &self.processors {
            processor.lock().await.setup(setup).await;
        }
        self.sink.lock().await.setup(setup).await;
    }

    async fn cleanup(&mut self) {
        for processor in &self.processors {
            processor.lock().await.cleanup().await;
        }
        self.drain_token.cancel();
    }

    /// Inject a frame into the chain: downstream frames enter at the first
    /// member, upstream frames at the last. The drive runs the frame through
    /// the whole chain before returning; anything exiting the chain is
    /// forwarded asynchronously by the boundary drainers.
    async fn process_frame(&mut self, frame: FrameRef, direction: FrameDirection) {
        match direction {
            FrameDirection::Downstream => {
                drive_processor(self.source.clone(), frame, direction).await;
            }
            FrameDirection::Upstream => {
                drive_processor(self.sink.clone(), frame, direction).await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
