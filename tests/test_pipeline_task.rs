// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Pipeline task lifecycle tests, including the end-to-end echo scenario:
//! an echo processor feeding an output adapter, driven to completion.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use framewire::frames::*;
use framewire::impl_base_debug_display;
use framewire::observers::{FramePushed, Observer};
use framewire::pipeline::{Pipeline, PipelineParams, PipelineRunner, PipelineTask, TaskState};
use framewire::processors::{BaseProcessor, FrameDirection, FrameProcessor};

/// Re-emits text frames unchanged (and everything else, transparently).
struct EchoProcessor {
    base: BaseProcessor,
}

impl EchoProcessor {
    fn new() -> Arc<Mutex<dyn FrameProcessor>> {
        Arc::new(Mutex::new(Self {
            base: BaseProcessor::new(Some("Echo".to_string())),
        }))
    }
}

impl_base_debug_display!(EchoProcessor);

#[async_trait]
impl FrameProcessor for EchoProcessor {
    fn base(&self) -> &BaseProcessor {
        &self.base
    }
    fn base_mut(&mut self) -> &mut BaseProcessor {
        &mut self.base
    }
    async fn process_frame(&mut self, frame: FrameRef, direction: FrameDirection) {
        if let Some(text) = frame.downcast_ref::<TextFrame>() {
            self.push_frame(Arc::new(TextFrame::new(text.text.clone())), direction)
                .await;
        } else {
            self.push_frame(frame, direction).await;
        }
    }
}

/// Terminal adapter recording everything it is handed, in order.
struct OutputAdapter {
    base: BaseProcessor,
    received: Arc<std::sync::Mutex<Vec<String>>>,
}

impl OutputAdapter {
    fn new(received: Arc<std::sync::Mutex<Vec<String>>>) -> Arc<Mutex<dyn FrameProcessor>> {
        Arc::new(Mutex::new(Self {
            base: BaseProcessor::new(Some("OutputAdapter".to_string())),
            received,
        }))
    }
}

impl_base_debug_display!(OutputAdapter);

#[async_trait]
impl FrameProcessor for OutputAdapter {
    fn base(&self) -> &BaseProcessor {
        &self.base
    }
    fn base_mut(&mut self) -> &mut BaseProcessor {
        &mut self.base
    }
    async fn process_frame(&mut self, frame: FrameRef, direction: FrameDirection) {
        let label = if let Some(text) = frame.downcast_ref::<TextFrame>() {
            format!("text:{}", text.text)
        } else {
            frame.name().to_string()
        };
        self.received.lock().unwrap().push(label);
        self.push_frame(frame, direction).await;
    }
}

#[tokio::test]
async fn test_end_to_end_echo_pipeline() {
    let received = Arc::new(std::sync::Mutex::new(Vec::new()));
    let pipeline = Pipeline::new(vec![EchoProcessor::new(), OutputAdapter::new(received.clone())]);

    let task = PipelineTask::new(pipeline, PipelineParams::default(), vec![]);
    task.queue_frames(vec![
        Arc::new(TextFrame::new("hi")) as FrameRef,
        Arc::new(EndFrame::new()) as FrameRef,
    ])
    .await;

    let runner = PipelineRunner::new();
    runner.run(&task).await;

    assert_eq!(task.state(), TaskState::Completed);
    let got = received.lock().unwrap().clone();
    assert_eq!(got, vec!["StartFrame", "text:hi", "EndFrame"]);
}

#[tokio::test]
async fn test_queue_frames_preserves_order() {
    let received = Arc::new(std::sync::Mutex::new(Vec::new()));
    let pipeline = Pipeline::new(vec![OutputAdapter::new(received.clone())]);

    let task = PipelineTask::new(pipeline, PipelineParams::default(), vec![]);
    task.queue_frames(vec![
        Arc::new(TextFrame::new("a")) as FrameRef,
        Arc::new(TextFrame::new("b")) as FrameRef,
        Arc::new(TextFrame::new("c")) as FrameRef,
        Arc::new(EndFrame::new()) as FrameRef,
    ])
    .await;
    task.run().await;

    assert_eq!(task.state(), TaskState::Completed);
    let got = received.lock().unwrap().clone();
    assert_eq!(
        got,
        vec!["StartFrame", "text:a", "text:b", "text:c", "EndFrame"]
    );
}

#[tokio::test]
async fn test_cancel_stops_delivery_of_queued_frames() {
    /// Slows the pipeline down so cancellation lands mid-stream.
    struct SlowAdapter {
        base: BaseProcessor,
        received: Arc<std::sync::Mutex<Vec<String>>>,
    }
    impl_base_debug_display!(SlowAdapter);
    #[async_trait]
    impl FrameProcessor for SlowAdapter {
        fn base(&self) -> &BaseProcessor {
            &self.base
        }
        fn base_mut(&mut self) -> &mut BaseProcessor {
            &mut self.base
        }
        async fn process_frame(&mut self, frame: FrameRef, direction: FrameDirection) {
            if frame.downcast_ref::<TextFrame>().is_some() {
                tokio::time::sleep(std::time::Duration::from_millis(40)).await;
                self.received.lock().unwrap().push("text".into());
            }
            self.push_frame(frame, direction).await;
        }
    }

    let received = Arc::new(std::sync::Mutex::new(Vec::new()));
    let pipeline = Pipeline::new(vec![Arc::new(Mutex::new(SlowAdapter {
        base: BaseProcessor::new(None),
        received: received.clone(),
    })) as Arc<Mutex<dyn FrameProcessor>>]);

    let task = Arc::new(PipelineTask::new(
        pipeline,
        PipelineParams::default(),
        vec![],
    ));
    for i in 0..20 {
        task.queue_frame(Arc::new(TextFrame::new(format!("{}", i))))
            .await;
    }

    let task_clone = task.clone();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        task_clone.cancel().await;
    });

    task.run().await;
    canceller.await.unwrap();

    assert_eq!(task.state(), TaskState::Cancelled);
    let delivered = received.lock().unwrap().len();
    assert!(
        delivered < 20,
        "cancellation should stop queued-frame delivery, delivered {}",
        delivered
    );
}

#[tokio::test]
async fn test_observer_sees_forwarded_frames() {
    struct CountingObserver {
        count: std::sync::atomic::AtomicUsize,
    }
    #[async_trait]
    impl Observer for CountingObserver {
        async fn on_push_frame(&self, _data: &FramePushed) {
            self.count
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    let observer = Arc::new(CountingObserver {
        count: std::sync::atomic::AtomicUsize::new(0),
    });
    let pipeline = Pipeline::new(vec![EchoProcessor::new()]);
    let task = PipelineTask::new(
        pipeline,
        PipelineParams::default(),
        vec![observer.clone() as Arc<dyn Observer>],
    );

    task.queue_frame(Arc::new(TextFrame::new("watched"))).await;
    task.queue_frame(Arc::new(EndFrame::new())).await;
    task.run().await;

    assert_eq!(task.state(), TaskState::Completed);
    assert!(
        observer.count.load(std::sync::atomic::Ordering::SeqCst) > 0,
        "observer should have seen forwarded frames"
    );
}

#[tokio::test]
async fn test_client_disconnect_maps_to_cancellation_not_failure() {
    // A transport-ish processor that requests task cancellation when it
    // sees a disconnect message, the way a transport event handler would.
    struct DisconnectingInput {
        base: BaseProcessor,
    }
    impl_base_debug_display!(DisconnectingInput);
    #[async_trait]
    impl FrameProcessor for DisconnectingInput {
        fn base(&self) -> &BaseProcessor {
            &self.base
        }
        fn base_mut(&mut self) -> &mut BaseProcessor {
            &mut self.base
        }
        async fn process_frame(&mut self, frame: FrameRef, direction: FrameDirection) {
            if frame.downcast_ref::<InputTransportMessageFrame>().is_some() {
                self.push_frame(Arc::new(CancelTaskFrame::new()), FrameDirection::Upstream)
                    .await;
            }
            self.push_frame(frame, direction).await;
        }
    }

    let pipeline = Pipeline::new(vec![Arc::new(Mutex::new(DisconnectingInput {
        base: BaseProcessor::new(None),
    })) as Arc<Mutex<dyn FrameProcessor>>]);
    let task = PipelineTask::new(pipeline, PipelineParams::default(), vec![]);

    task.queue_frame(Arc::new(InputTransportMessageFrame::new(
        serde_json::json!({"event": "client-disconnected"}),
    )))
    .await;
    task.run().await;

    assert_eq!(task.state(), TaskState::Cancelled);
    assert!(task.error().is_none());
}
