// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Frame processor behavior tests.
//!
//! Verifies the base contract: a processor intercepts only the frame kinds
//! it cares about and transparently re-emits everything else, in order.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use framewire::frames::*;
use framewire::impl_base_debug_display;
use framewire::processors::{
    BaseProcessor, FrameDirection, FrameProcessor, PassthroughProcessor,
};
use framewire::tests::run_test;

/// A processor that uppercases text frames and forwards everything else.
struct UpperCaseProcessor {
    base: BaseProcessor,
}

impl UpperCaseProcessor {
    fn new() -> Self {
        Self {
            base: BaseProcessor::new(Some("UpperCase".to_string())),
        }
    }
}

impl_base_debug_display!(UpperCaseProcessor);

#[async_trait]
impl FrameProcessor for UpperCaseProcessor {
    fn base(&self) -> &BaseProcessor {
        &self.base
    }
    fn base_mut(&mut self) -> &mut BaseProcessor {
        &mut self.base
    }

    async fn process_frame(&mut self, frame: FrameRef, direction: FrameDirection) {
        if let Some(text) = frame.downcast_ref::<TextFrame>() {
            let upper = TextFrame::new(text.text.to_uppercase());
            self.push_frame(Arc::new(upper), direction).await;
        } else {
            self.push_frame(frame, direction).await;
        }
    }
}

/// A processor that deliberately drops speak frames and forwards the rest.
struct SpeakMuter {
    base: BaseProcessor,
}

impl_base_debug_display!(SpeakMuter);

#[async_trait]
impl FrameProcessor for SpeakMuter {
    fn base(&self) -> &BaseProcessor {
        &self.base
    }
    fn base_mut(&mut self) -> &mut BaseProcessor {
        &mut self.base
    }

    async fn process_frame(&mut self, frame: FrameRef, direction: FrameDirection) {
        if frame.downcast_ref::<SpeakFrame>().is_none() {
            self.push_frame(frame, direction).await;
        }
    }
}

#[tokio::test]
async fn test_passthrough_forwards_everything() {
    let processor = Arc::new(Mutex::new(PassthroughProcessor::new(None)))
        as Arc<Mutex<dyn FrameProcessor>>;

    let frames_to_send: Vec<FrameRef> = vec![
        Arc::new(TextFrame::new("one")),
        Arc::new(UserStartedSpeakingFrame::new()),
        Arc::new(InputAudioRawFrame::new(vec![0u8; 320], 16000, 1)),
        Arc::new(UserStoppedSpeakingFrame::new()),
    ];

    let expected_down = vec![
        "TextFrame",
        "UserStartedSpeakingFrame",
        "InputAudioRawFrame",
        "UserStoppedSpeakingFrame",
    ];

    run_test(
        processor,
        frames_to_send,
        Some(expected_down),
        None,
        true,
        vec![],
        None,
    )
    .await;
}

#[tokio::test]
async fn test_intercepting_processor_transforms_only_its_frames() {
    let processor =
        Arc::new(Mutex::new(UpperCaseProcessor::new())) as Arc<Mutex<dyn FrameProcessor>>;

    let frames_to_send: Vec<FrameRef> = vec![
        Arc::new(TextFrame::new("hello")),
        Arc::new(UserStartedSpeakingFrame::new()),
        Arc::new(TextFrame::new("world")),
    ];

    let expected_down = vec!["TextFrame", "UserStartedSpeakingFrame", "TextFrame"];

    let result = run_test(
        processor,
        frames_to_send,
        Some(expected_down),
        None,
        true,
        vec![],
        None,
    )
    .await;

    let texts: Vec<&str> = result
        .downstream_frames
        .iter()
        .filter_map(|f| f.downcast_ref::<TextFrame>())
        .map(|t| t.text.as_str())
        .collect();
    assert_eq!(texts, vec!["HELLO", "WORLD"]);
}

#[tokio::test]
async fn test_deliberate_drop_removes_only_intercepted_frames() {
    let processor = Arc::new(Mutex::new(SpeakMuter {
        base: BaseProcessor::new(None),
    })) as Arc<Mutex<dyn FrameProcessor>>;

    let frames_to_send: Vec<FrameRef> = vec![
        Arc::new(TextFrame::new("keep me")),
        Arc::new(SpeakFrame::new("drop me")),
        Arc::new(TextFrame::new("keep me too")),
    ];

    let expected_down = vec!["TextFrame", "TextFrame"];

    run_test(
        processor,
        frames_to_send,
        Some(expected_down),
        None,
        true,
        vec![],
        None,
    )
    .await;
}

#[tokio::test]
async fn test_processor_error_reporting_goes_upstream() {
    /// Fails (non-fatally) on every messages frame.
    struct MessagesRejector {
        base: BaseProcessor,
    }
    impl_base_debug_display!(MessagesRejector);

    #[async_trait]
    impl FrameProcessor for MessagesRejector {
        fn base(&self) -> &BaseProcessor {
            &self.base
        }
        fn base_mut(&mut self) -> &mut BaseProcessor {
            &mut self.base
        }
        async fn process_frame(&mut self, frame: FrameRef, direction: FrameDirection) {
            if frame.downcast_ref::<MessagesFrame>().is_some() {
                self.push_error("messages are not supported here", false).await;
            } else {
                self.push_frame(frame, direction).await;
            }
        }
    }

    let processor = Arc::new(Mutex::new(MessagesRejector {
        base: BaseProcessor::new(None),
    })) as Arc<Mutex<dyn FrameProcessor>>;

    let frames_to_send: Vec<FrameRef> = vec![
        Arc::new(MessagesFrame::new(vec![serde_json::json!({"role": "user"})])),
        Arc::new(TextFrame::new("still flows")),
    ];

    let expected_down = vec!["TextFrame"];
    let expected_up = vec!["ErrorFrame"];

    run_test(
        processor,
        frames_to_send,
        Some(expected_down),
        Some(expected_up),
        true,
        vec![],
        None,
    )
    .await;
}
