// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Pipeline task: lifecycle controller for a (possibly parallel) pipeline.
//!
//! A [`PipelineTask`] owns the top-level pipeline, the frame queue, and the
//! task state machine:
//!
//! ```text
//! Created -> Running -> { Completed | Cancelled | Failed }
//! ```
//!
//! Terminal states are final. `Completed` is reached only once an `EndFrame`
//! has propagated through every processor -- including every parallel branch
//! -- and arrived at the task's own sink. A fatal `ErrorFrame` surfacing
//! upstream moves the task to `Failed` (carrying the originating error) and
//! stops delivery of any still-queued frames. Cancellation requested by the
//! caller or by the pipeline (`CancelTaskFrame`) ends in `Cancelled`;
//! external disconnects map to cancellation, not failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::frames::{
    CancelFrame, CancelTaskFrame, EndFrame, EndTaskFrame, ErrorFrame, Frame, FrameRef,
    HeartbeatFrame, InterruptionFrame, StartFrame,
};
use crate::impl_base_debug_display;
use crate::observers::{FramePushed, Observer};
use crate::pipeline::Pipeline;
use crate::processors::{
    drive_processor, BaseProcessor, FrameDirection, FrameProcessor, FrameProcessorSetup,
};
use crate::utils::base_object::BaseObject;
use crate::utils::helpers::now_millis;

/// Configuration parameters for a pipeline task.
#[derive(Debug, Clone)]
pub struct PipelineParams {
    /// Whether frames signalling a user interruption are delivered. When
    /// `false`, interruption frames are suppressed instead of cancelling
    /// in-flight output.
    pub allow_interruptions: bool,
    /// Input audio sample rate announced in the `StartFrame`.
    pub audio_in_sample_rate: u32,
    /// Output audio sample rate announced in the `StartFrame`.
    pub audio_out_sample_rate: u32,
    /// Whether the task emits periodic heartbeat frames while running.
    pub enable_heartbeats: bool,
    /// Period between heartbeat frames.
    pub heartbeat_period: Duration,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            allow_interruptions: false,
            audio_in_sample_rate: 16000,
            audio_out_sample_rate: 24000,
            enable_heartbeats: false,
            heartbeat_period: Duration::from_secs(1),
        }
    }
}

/// Lifecycle state of a pipeline task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl TaskState {
    /// Returns `true` for final states.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Cancelled | TaskState::Failed
        )
    }
}

/// Control events flowing from the task's boundary processors (and from
/// caller-facing methods) to the driver loop.
enum TaskEvent {
    /// An `ErrorFrame` surfaced at the task source.
    UpstreamError { error: String, fatal: bool },
    /// The pipeline requested a graceful end (`EndTaskFrame`).
    EndTaskRequested,
    /// The pipeline requested cancellation (`CancelTaskFrame`).
    CancelTaskRequested,
    /// The pipeline requested an interruption (`InterruptionFrame` upstream).
    InterruptionRequested,
    /// `cancel()` was called.
    CancelRequested,
    /// The task sink observed the `EndFrame`.
    EndReached,
    /// The task sink observed the `CancelFrame`.
    CancelReached,
}

// ---------------------------------------------------------------------------
// Task boundary processors
// ---------------------------------------------------------------------------

/// First processor in the task's chain; turns upstream control frames into
/// task events.
struct TaskSource {
    base: BaseProcessor,
    event_tx: mpsc::UnboundedSender<TaskEvent>,
}

impl_base_debug_display!(TaskSource);

#[async_trait]
impl FrameProcessor for TaskSource {
    fn base(&self) -> &BaseProcessor {
        &self.base
    }
    fn base_mut(&mut self) -> &mut BaseProcessor {
        &mut self.base
    }

    async fn process_frame(&mut self, frame: FrameRef, direction: FrameDirection) {
        match direction {
            FrameDirection::Downstream => self.push_frame(frame, direction).await,
            FrameDirection::Upstream => {
                let event = if let Some(err) = frame.downcast_ref::<ErrorFrame>() {
                    Some(TaskEvent::UpstreamError {
                        error: err.error.clone(),
                        fatal: err.fatal,
                    })
                } else if frame.downcast_ref::<EndTaskFrame>().is_some() {
                    Some(TaskEvent::EndTaskRequested)
                } else if frame.downcast_ref::<CancelTaskFrame>().is_some() {
                    Some(TaskEvent::CancelTaskRequested)
                } else if frame.downcast_ref::<InterruptionFrame>().is_some() {
                    Some(TaskEvent::InterruptionRequested)
                } else {
                    tracing::trace!(
                        frame = %frame.name(),
                        "PipelineTask: upstream frame reached task boundary"
                    );
                    None
                };
                if let Some(event) = event {
                    let _ = self.event_tx.send(event);
                }
            }
        }
    }
}

/// Last processor in the task's chain; watches for terminal frames reaching
/// the very end of the pipeline.
struct TaskSink {
    base: BaseProcessor,
    event_tx: mpsc::UnboundedSender<TaskEvent>,
}

impl_base_debug_display!(TaskSink);

#[async_trait]
impl FrameProcessor for TaskSink {
    fn base(&self) -> &BaseProcessor {
        &self.base
    }
    fn base_mut(&mut self) -> &mut BaseProcessor {
        &mut self.base
    }

    async fn process_frame(&mut self, frame: FrameRef, direction: FrameDirection) {
        match direction {
            FrameDirection::Downstream => {
                if frame.downcast_ref::<EndFrame>().is_some() {
                    let _ = self.event_tx.send(TaskEvent::EndReached);
                } else if frame.downcast_ref::<CancelFrame>().is_some() {
                    let _ = self.event_tx.send(TaskEvent::CancelReached);
                } else if let Some(hb) = frame.downcast_ref::<HeartbeatFrame>() {
                    let latency = now_millis().saturating_sub(hb.timestamp);
                    tracing::debug!(latency_ms = latency, "PipelineTask: heartbeat round trip");
                } else {
                    tracing::trace!(
                        frame = %frame.name(),
                        "PipelineTask: frame delivered at pipeline end"
                    );
                }
            }
            FrameDirection::Upstream => self.push_frame(frame, direction).await,
        }
    }
}

/// Fans observer callbacks out to a list of observers, in order.
struct CompositeObserver {
    observers: Vec<Arc<dyn Observer>>,
}

#[async_trait]
impl Observer for CompositeObserver {
    async fn on_push_frame(&self, data: &FramePushed) {
        for observer in &self.observers {
            observer.on_push_frame(data).await;
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineTask
// ---------------------------------------------------------------------------

/// Owns and drives a pipeline: queues frames, injects lifecycle frames, and
/// tracks the task state machine.
pub struct PipelineTask {
    base: BaseObject,
    params: PipelineParams,
    source: Arc<Mutex<dyn FrameProcessor>>,
    pipeline: Arc<Mutex<dyn FrameProcessor>>,
    sink: Arc<Mutex<dyn FrameProcessor>>,
    observers: Vec<Arc<dyn Observer>>,
    queue_tx: mpsc::UnboundedSender<FrameRef>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<FrameRef>>>,
    event_tx: mpsc::UnboundedSender<TaskEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<TaskEvent>>>,
    state: std::sync::Mutex<TaskState>,
    error: std::sync::Mutex<Option<String>>,
}

impl PipelineTask {
    /// Create a task around a pipeline.
    ///
    /// The pipeline is wrapped between the task's own source and sink
    /// processors; the task keeps sole ownership of all three.
    pub fn new(
        pipeline: Pipeline,
        params: PipelineParams,
        observers: Vec<Arc<dyn Observer>>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let source = Arc::new(Mutex::new(TaskSource {
            base: BaseProcessor::new(Some("TaskSource".into())),
            event_tx: event_tx.clone(),
        })) as Arc<Mutex<dyn FrameProcessor>>;
        let sink = Arc::new(Mutex::new(TaskSink {
            base: BaseProcessor::new(Some("TaskSink".into())),
            event_tx: event_tx.clone(),
        })) as Arc<Mutex<dyn FrameProcessor>>;
        let pipeline = Arc::new(Mutex::new(pipeline)) as Arc<Mutex<dyn FrameProcessor>>;

        // Construction-time wiring; no contention possible yet.
        source
            .try_lock()
            .expect("BUG: task source locked during construction")
            .link(pipeline.clone());
        {
            let mut p = pipeline
                .try_lock()
                .expect("BUG: pipeline locked during task construction");
            p.set_prev(source.clone());
            p.link(sink.clone());
        }
        sink.try_lock()
            .expect("BUG: task sink locked during construction")
            .set_prev(pipeline.clone());

        Self {
            base: BaseObject::with_type_name("PipelineTask", None),
            params,
            source,
            pipeline,
            sink,
            observers,
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            state: std::sync::Mutex::new(TaskState::Created),
            error: std::sync::Mutex::new(None),
        }
    }

    /// Task name (for logging).
    pub fn name(&self) -> &str {
        self.base.name()
    }

    /// Current task state.
    pub fn state(&self) -> TaskState {
        *self.state.lock().expect("task state poisoned")
    }

    /// The error that moved the task to `Failed`, if any.
    pub fn error(&self) -> Option<String> {
        self.error.lock().expect("task error poisoned").clone()
    }

    /// Returns `true` once the task has reached a terminal state.
    pub fn has_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Enqueue a single frame for delivery to the pipeline input.
    pub async fn queue_frame(&self, frame: FrameRef) {
        if self.has_finished() {
            tracing::warn!("{}: frame queued after task finished, dropped", self.name());
            return;
        }
        let _ = self.queue_tx.send(frame);
    }

    /// Enqueue frames for delivery to the pipeline input, preserving order.
    pub async fn queue_frames(&self, frames: Vec<FrameRef>) {
        for frame in frames {
            self.queue_frame(frame).await;
        }
    }

    /// Request cancellation: a `CancelFrame` is pushed through the pipeline
    /// and no further queued frames are delivered.
    pub async fn cancel(&self) {
        match self.state() {
            TaskState::Created => {
                *self.state.lock().expect("task state poisoned") = TaskState::Cancelled;
            }
            TaskState::Running => {
                let _ = self.event_tx.send(TaskEvent::CancelRequested);
            }
            _ => tracing::debug!("{}: cancel after task finished", self.name()),
        }
    }

    fn set_state(&self, state: TaskState) {
        *self.state.lock().expect("task state poisoned") = state;
    }

    async fn drive(&self, frame: FrameRef) {
        drive_processor(self.source.clone(), frame, FrameDirection::Downstream).await;
    }

    /// Run the task to a terminal state.
    ///
    /// Injects the `StartFrame`, then delivers queued frames in order until
    /// an `EndFrame` completes the pipeline, the task is cancelled, or a
    /// fatal error surfaces.
    pub async fn run(&self) {
        {
            let mut state = self.state.lock().expect("task state poisoned");
            if *state != TaskState::Created {
                tracing::warn!("{}: run() called in state {:?}", self.name(), *state);
                return;
            }
            *state = TaskState::Running;
        }

        let (mut queue_rx, mut event_rx) = {
            let queue = self.queue_rx.lock().await.take();
            let events = self.event_rx.lock().await.take();
            match (queue, events) {
                (Some(q), Some(e)) => (q, e),
                _ => {
                    tracing::warn!("{}: run() called twice", self.name());
                    return;
                }
            }
        };

        // Wire observers into every processor before any frame flows.
        let observer: Option<Arc<dyn Observer>> = if self.observers.is_empty() {
            None
        } else {
            Some(Arc::new(CompositeObserver {
                observers: self.observers.clone(),
            }))
        };
        let setup = FrameProcessorSetup { observer };
        self.source.lock().await.setup(&setup).await;
        self.pipeline.lock().await.setup(&setup).await;
        self.sink.lock().await.setup(&setup).await;

        let start: FrameRef = Arc::new(StartFrame::new(
            self.params.audio_in_sample_rate,
            self.params.audio_out_sample_rate,
            self.params.allow_interruptions,
        ));
        self.drive(start).await;
        tracing::debug!("{}: running", self.name());

        let mut heartbeat = if self.params.enable_heartbeats {
            let mut interval = tokio::time::interval(self.params.heartbeat_period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            Some(interval)
        } else {
            None
        };

        // Whether queued frames are still being delivered. Cleared once a
        // terminal frame has been injected or a fatal error surfaced.
        let mut delivering = true;
        let mut final_state: Option<TaskState> = None;
        let mut pending_error: Option<String> = None;

        loop {
            tokio::select! {
                biased;
                event = event_rx.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        TaskEvent::EndReached => {
                            final_state = Some(if pending_error.is_some() {
                                TaskState::Failed
                            } else {
                                TaskState::Completed
                            });
                            break;
                        }
                        TaskEvent::CancelReached => {
                            final_state = Some(if pending_error.is_some() {
                                TaskState::Failed
                            } else {
                                TaskState::Cancelled
                            });
                            break;
                        }
                        TaskEvent::UpstreamError { error, fatal } => {
                            if fatal {
                                tracing::error!("{}: fatal pipeline error: {}", self.name(), error);
                                if pending_error.is_none() {
                                    pending_error = Some(error);
                                    delivering = false;
                                    self.drive(Arc::new(CancelFrame::new(Some(
                                        "fatal pipeline error".into(),
                                    ))))
                                    .await;
                                }
                            } else {
                                tracing::warn!("{}: pipeline error: {}", self.name(), error);
                            }
                        }
                        TaskEvent::EndTaskRequested => {
                            if delivering {
                                delivering = false;
                                self.drive(Arc::new(EndFrame::new())).await;
                            }
                        }
                        TaskEvent::CancelTaskRequested | TaskEvent::CancelRequested => {
                            if final_state.is_none() {
                                delivering = false;
                                self.drive(Arc::new(CancelFrame::new(None))).await;
                            }
                        }
                        TaskEvent::InterruptionRequested => {
                            if self.params.allow_interruptions {
                                self.drive(Arc::new(InterruptionFrame::new())).await;
                            } else {
                                tracing::debug!(
                                    "{}: interruption suppressed (interruptions disallowed)",
                                    self.name()
                                );
                            }
                        }
                    }
                }
                frame = queue_rx.recv(), if delivering => {
                    let Some(frame) = frame else { break };
                    if frame.downcast_ref::<InterruptionFrame>().is_some()
                        && !self.params.allow_interruptions
                    {
                        tracing::debug!(
                            "{}: interruption suppressed (interruptions disallowed)",
                            self.name()
                        );
                    } else if frame.downcast_ref::<EndFrame>().is_some()
                        || frame.downcast_ref::<CancelFrame>().is_some()
                    {
                        delivering = false;
                        self.drive(frame).await;
                    } else {
                        self.drive(frame).await;
                    }
                }
                _ = async { heartbeat.as_mut().expect("heartbeat interval").tick().await },
                    if heartbeat.is_some() =>
                {
                    self.drive(Arc::new(HeartbeatFrame::new(now_millis()))).await;
                }
            }
        }

        let final_state = final_state.unwrap_or_else(|| {
            tracing::warn!("{}: driver loop ended without terminal frame", self.name());
            TaskState::Failed
        });
        *self.error.lock().expect("task error poisoned") = pending_error;
        self.set_state(final_state);

        self.pipeline.lock().await.cleanup().await;
        self.source.lock().await.cleanup().await;
        self.sink.lock().await.cleanup().await;
        self.base.cleanup().await;

        tracing::debug!("{}: finished with state {:?}", self.name(), final_state);
    }
}

impl std::fmt::Debug for PipelineTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineTask")
            .field("name", &self.base.name())
            .field("state", &self.state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
