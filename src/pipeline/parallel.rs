// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Parallel pipeline: N branch pipelines sharing one input and one output.
//!
//! Every frame arriving at the parallel pipeline is fanned out to all
//! branches (an `Arc` clone per branch -- frames are immutable, so no deep
//! copy). Each branch runs on its own Tokio task, fed through a bounded
//! input queue, so a slow branch exerts backpressure instead of piling up
//! frames. Branch output converges through a single merger task, which
//! preserves per-branch emission order; ordering *across* branches is
//! unspecified.
//!
//! # Lifecycle barriers
//!
//! `Start`, `End` and `Cancel` frames are counted rather than forwarded
//! per-branch: each branch's copy of the frame travels its full chain and is
//! absorbed at the branch boundary as an acknowledgment. Only when all N
//! branches have acknowledged does the merger emit the pipeline's own single
//! copy downstream. Because acknowledgments travel in-band behind each
//! branch's data frames, the `End` barrier also guarantees that every branch
//! has flushed: a fast branch cannot close the shared output while a slower
//! branch still has frames in flight.
//!
//! Data frames that surface before the `Start` barrier completes are held
//! back and flushed right after it, so downstream always observes `Start`
//! first.
//!
//! # Failure isolation
//!
//! A fatal `ErrorFrame` emitted upstream by any branch is surfaced upstream
//! exactly once; the merger then delivers a `CancelFrame` to every branch.
//! Subsequent fatal errors from sibling branches are suppressed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::frames::{CancelFrame, EndFrame, ErrorFrame, Frame, FrameRef, StartFrame};
use crate::impl_base_debug_display;
use crate::pipeline::pipeline::{load_link, shared_link, store_link, Pipeline, SharedLink};
use crate::processors::{
    drive_processor, BaseProcessor, FrameDirection, FrameProcessor, FrameProcessorSetup,
};

/// Capacity of each branch's bounded input queue.
const BRANCH_QUEUE_CAPACITY: usize = 64;

/// Returns `true` for the lifecycle frames subject to barrier counting.
fn is_lifecycle_frame(frame: &dyn Frame) -> bool {
    frame.downcast_ref::<StartFrame>().is_some()
        || frame.downcast_ref::<EndFrame>().is_some()
        || frame.downcast_ref::<CancelFrame>().is_some()
}

/// Items flowing from branch boundaries to the merger task.
enum MergeItem {
    /// A branch emitted a frame out of its chain.
    Frame {
        branch: usize,
        frame: FrameRef,
        direction: FrameDirection,
    },
    /// A lifecycle frame finished traversing a branch (barrier count).
    Lifecycle { branch: usize, frame: FrameRef },
}

// ---------------------------------------------------------------------------
// Branch boundary collector
// ---------------------------------------------------------------------------

/// Sits at one end of a branch pipeline and funnels everything the branch
/// emits into the merge channel.
///
/// On the downstream side, lifecycle frames become barrier acknowledgments;
/// the branch-local copy is absorbed here so only the merger's single copy
/// continues downstream.
struct BranchCollector {
    base: BaseProcessor,
    branch: usize,
    side: FrameDirection,
    merge_tx: mpsc::UnboundedSender<MergeItem>,
}

impl BranchCollector {
    fn new(branch: usize, side: FrameDirection, merge_tx: mpsc::UnboundedSender<MergeItem>) -> Self {
        let name = match side {
            FrameDirection::Downstream => format!("BranchSink#{}", branch),
            FrameDirection::Upstream => format!("BranchSource#{}", branch),
        };
        Self {
            base: BaseProcessor::new(Some(name)),
            branch,
            side,
            merge_tx,
        }
    }
}

impl_base_debug_display!(BranchCollector);

#[async_trait]
impl FrameProcessor for BranchCollector {
    fn base(&self) -> &BaseProcessor {
        &self.base
    }
    fn base_mut(&mut self) -> &mut BaseProcessor {
        &mut self.base
    }

    async fn process_frame(&mut self, frame: FrameRef, _direction: FrameDirection) {
        let item = if self.side == FrameDirection::Downstream && is_lifecycle_frame(frame.as_ref())
        {
            MergeItem::Lifecycle {
                branch: self.branch,
                frame,
            }
        } else {
            MergeItem::Frame {
                branch: self.branch,
                frame,
                direction: self.side,
            }
        };
        if self.merge_tx.send(item).is_err() {
            tracing::warn!("{}: merge channel closed, frame lost", self.name());
        }
    }
}

// ---------------------------------------------------------------------------
// ParallelPipeline
// ---------------------------------------------------------------------------

/// Concurrent composition of branch pipelines sharing one input/output.
pub struct ParallelPipeline {
    base: BaseProcessor,
    /// Branch pipelines, owned here. Routing between a branch and its
    /// collectors is reference-only.
    branches: Vec<Arc<Mutex<dyn FrameProcessor>>>,
    /// Bounded input queues, one per branch.
    branch_inputs: Vec<mpsc::Sender<(FrameRef, FrameDirection)>>,
    /// Routing cell mirroring `base.next`, read by the merger.
    outer_next: SharedLink,
    /// Routing cell mirroring `base.prev`, read by the merger.
    outer_prev: SharedLink,
    /// Cancels branch tasks and the merger.
    token: CancellationToken,
    /// Branch and merger tasks, joined during cleanup.
    tasks: JoinSet<()>,
}

impl ParallelPipeline {
    /// Build a parallel pipeline; each entry of `branches` becomes one
    /// branch [`Pipeline`].
    ///
    /// Must be called within a Tokio runtime: branch tasks and the merger
    /// are spawned here.
    pub fn new(branches: Vec<Vec<Arc<Mutex<dyn FrameProcessor>>>>) -> Self {
        let num_branches = branches.len();
        if num_branches == 0 {
            tracing::warn!("ParallelPipeline: constructed with no branches, acting as passthrough");
        }

        let (merge_tx, merge_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let outer_next = shared_link();
        let outer_prev = shared_link();
        let mut tasks = JoinSet::new();

        let mut branch_pipelines = Vec::with_capacity(num_branches);
        let mut branch_inputs = Vec::with_capacity(num_branches);

        for (idx, processors) in branches.into_iter().enumerate() {
            let pipeline = Arc::new(Mutex::new(Pipeline::new(processors)))
                as Arc<Mutex<dyn FrameProcessor>>;

            let sink = Arc::new(Mutex::new(BranchCollector::new(
                idx,
                FrameDirection::Downstream,
                merge_tx.clone(),
            ))) as Arc<Mutex<dyn FrameProcessor>>;
            let source = Arc::new(Mutex::new(BranchCollector::new(
                idx,
                FrameDirection::Upstream,
                merge_tx.clone(),
            ))) as Arc<Mutex<dyn FrameProcessor>>;

            {
                let mut p = pipeline
                    .try_lock()
                    .expect("BUG: branch pipeline locked during construction");
                p.link(sink);
                p.set_prev(source);
            }

            let (in_tx, in_rx) = mpsc::channel(BRANCH_QUEUE_CAPACITY);
            branch_inputs.push(in_tx);

            tasks.spawn(branch_loop(pipeline.clone(), in_rx, token.clone()));
            branch_pipelines.push(pipeline);
        }

        tasks.spawn(merger_loop(
            merge_rx,
            outer_next.clone(),
            outer_prev.clone(),
            branch_inputs.clone(),
            num_branches,
            token.clone(),
        ));

        Self {
            base: BaseProcessor::new(None),
            branches: branch_pipelines,
            branch_inputs,
            outer_next,
            outer_prev,
            token,
            tasks,
        }
    }
}

/// Per-branch task: pulls frames from the branch's bounded input queue and
/// drives them through the branch pipeline, one at a time (per-branch FIFO).
async fn branch_loop(
    pipeline: Arc<Mutex<dyn FrameProcessor>>,
    mut in_rx: mpsc::Receiver<(FrameRef, FrameDirection)>,
    token: CancellationToken,
) {
    loop {
        let (frame, direction) = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            item = in_rx.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };
        drive_processor(pipeline.clone(), frame, direction).await;
    }
}

/// Fan-in task: forwards branch emissions to the parallel pipeline's outer
/// neighbors and runs the lifecycle barriers.
async fn merger_loop(
    mut merge_rx: mpsc::UnboundedReceiver<MergeItem>,
    outer_next: SharedLink,
    outer_prev: SharedLink,
    branch_inputs: Vec<mpsc::Sender<(FrameRef, FrameDirection)>>,
    num_branches: usize,
    token: CancellationToken,
) {
    // Downstream frames surfacing before the Start barrier completes are
    // held here and flushed right after Start goes out.
    let mut pre_start: Vec<FrameRef> = Vec::new();
    let mut started = false;
    // Countdown per lifecycle frame id.
    let mut barriers: HashMap<u64, usize> = HashMap::new();
    // Set after the first fatal branch error; later fatals are suppressed.
    let mut failed = false;
    // Id of the cancel frame injected for sibling teardown. Its barrier is
    // internal cleanup and must not surface downstream: the surviving error
    // already travels upstream, and the enclosing task decides what follows.
    let mut internal_cancel: Option<u64> = None;

    loop {
        let item = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            item = merge_rx.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        match item {
            MergeItem::Lifecycle { branch, frame } => {
                let count = barriers.entry(frame.id()).or_insert(0);
                *count += 1;
                tracing::trace!(
                    frame = %frame.name(),
                    branch,
                    count = *count,
                    total = num_branches,
                    "ParallelPipeline: lifecycle barrier"
                );
                if *count >= num_branches {
                    barriers.remove(&frame.id());
                    if internal_cancel == Some(frame.id()) {
                        internal_cancel = None;
                        continue;
                    }
                    let is_start = frame.downcast_ref::<StartFrame>().is_some();
                    forward(&outer_next, frame, FrameDirection::Downstream).await;
                    if is_start && !started {
                        started = true;
                        for held in pre_start.drain(..) {
                            forward(&outer_next, held, FrameDirection::Downstream).await;
                        }
                    }
                }
            }
            MergeItem::Frame {
                frame,
                direction: FrameDirection::Downstream,
                ..
            } => {
                if started {
                    forward(&outer_next, frame, FrameDirection::Downstream).await;
                } else {
                    pre_start.push(frame);
                }
            }
            MergeItem::Frame {
                branch,
                frame,
                direction: FrameDirection::Upstream,
            } => {
                let fatal = frame
                    .downcast_ref::<ErrorFrame>()
                    .map(|e| e.fatal)
                    .unwrap_or(false);
                if fatal {
                    if failed {
                        tracing::debug!(
                            branch,
                            "ParallelPipeline: suppressing fatal error after first failure"
                        );
                        continue;
                    }
                    failed = true;
                    tracing::error!(branch, "ParallelPipeline: branch failed, cancelling siblings");
                    forward(&outer_prev, frame, FrameDirection::Upstream).await;
                    let cancel: FrameRef =
                        Arc::new(CancelFrame::new(Some("parallel branch failed".into())));
                    internal_cancel = Some(cancel.id());
                    for tx in &branch_inputs {
                        if tx
                            .send((cancel.clone(), FrameDirection::Downstream))
                            .await
                            .is_err()
                        {
                            tracing::warn!("ParallelPipeline: branch input closed during cancel");
                        }
                    }
                } else {
                    forward(&outer_prev, frame, FrameDirection::Upstream).await;
                }
            }
        }
    }
}

async fn forward(link: &SharedLink, frame: FrameRef, direction: FrameDirection) {
    match load_link(link) {
        Some(target) => drive_processor(target, frame, direction).await,
        None => {
            tracing::trace!(
                frame = %frame.name(),
                ?direction,
                "ParallelPipeline: frame exited unlinked boundary"
            );
        }
    }
}

impl_base_debug_display!(ParallelPipeline);

#[async_trait]
impl FrameProcessor for ParallelPipeline {
    fn base(&self) -> &BaseProcessor {
        &self.base
    }
    fn base_mut(&mut self) -> &mut BaseProcessor {
        &mut self.base
    }

    fn processors(&self) -> Vec<Arc<Mutex<dyn FrameProcessor>>> {
        self.branches.clone()
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
        for branch in &self.branches {
            branch.lock().await.setup(setup).await;
        }
    }

    async fn cleanup(&mut self) {
        for branch in &self.branches {
            branch.lock().await.cleanup().await;
        }
        self.token.cancel();
        // Abort-and-join: the merger may be parked on a neighbor's lock, so
        // a plain join here could wait on ourselves.
        self.tasks.shutdown().await;
    }

    /// Fan a frame out to every branch, in input order, as `Arc` clones.
    ///
    /// This never blocks on the merger, only on a branch's bounded input
    /// queue (backpressure). Lifecycle frames are emitted downstream by the
    /// merger once every branch acknowledges them; everything else surfaces
    /// through the merger as branches emit it.
    async fn process_frame(&mut self, frame: FrameRef, direction: FrameDirection) {
        if self.branch_inputs.is_empty() {
            self.push_frame(frame, direction).await;
            return;
        }
        for tx in &self.branch_inputs {
            if tx.send((frame.clone(), direction)).await.is_err() {
                tracing::warn!("{}: branch input closed, frame lost", self.name());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
