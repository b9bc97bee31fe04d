// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Base transport abstractions shared by every backend.
//!
//! A transport bridges the pipeline and a network connection through two
//! frame processors:
//!
//! - [`TransportInputProcessor`] sits near the top of a pipeline. Frames
//!   received from the network arrive on an ingress channel fed by the
//!   backend's reader task; once the processor sees the `StartFrame` it
//!   spawns a forwarder that pushes ingress frames downstream as they
//!   arrive.
//! - [`TransportOutputProcessor`] sits near the bottom. Output frames
//!   (audio, images, app messages, terminal frames) are copied to an egress
//!   channel consumed by the backend's writer task, and also passed through
//!   so the chain stays live when the output is not the last processor.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::frames::{
    CancelFrame, EndFrame, Frame, FrameRef, OutputAudioRawFrame, OutputImageRawFrame,
    OutputTransportMessageFrame, StartFrame,
};
use crate::impl_base_debug_display;
use crate::processors::{drive_processor, BaseProcessor, FrameDirection, FrameProcessor};
use crate::transports::error::TransportError;
use crate::utils::base_object::EventHandler;

/// Media configuration shared by every backend transport.
///
/// Each backend consumes only the fields that apply to it; inapplicable
/// fields are ignored, never an error.
#[derive(Debug, Clone, Default)]
pub struct TransportParams {
    /// Whether incoming camera/video frames are accepted.
    pub camera_in_enabled: bool,
    /// Whether outgoing camera/video frames are sent.
    pub camera_out_enabled: bool,
    /// Whether the outgoing camera stream is live (continuous) rather than
    /// a static image.
    pub camera_out_is_live: bool,
    /// Whether incoming audio frames are accepted.
    pub audio_in_enabled: bool,
    /// Whether outgoing audio frames are sent.
    pub audio_out_enabled: bool,
    /// Whether voice-activity detection runs on incoming audio.
    pub vad_enabled: bool,
}

/// Interface every concrete backend transport implements.
///
/// `start`/`stop`/`cancel` receive the corresponding lifecycle frame so a
/// backend can pick up negotiated parameters (e.g. sample rates from the
/// `StartFrame`).
#[async_trait]
pub trait BaseTransport: Send + Sync {
    /// Transport name (for logging).
    fn name(&self) -> &str;

    /// The processor feeding received frames into the pipeline.
    fn input(&self) -> Arc<Mutex<dyn FrameProcessor>>;

    /// The processor delivering pipeline output to the network.
    fn output(&self) -> Arc<Mutex<dyn FrameProcessor>>;

    /// Connect and begin moving frames.
    async fn start(&mut self, frame: &StartFrame) -> Result<(), TransportError>;

    /// Disconnect gracefully.
    async fn stop(&mut self, frame: &EndFrame) -> Result<(), TransportError>;

    /// Tear the connection down immediately.
    async fn cancel(&mut self, frame: &CancelFrame) -> Result<(), TransportError>;

    /// Attach a handler to one of the backend's native events.
    ///
    /// Unknown event names are an error, not a silent no-op.
    fn add_event_handler(
        &self,
        event_name: &str,
        handler: EventHandler,
    ) -> Result<(), TransportError>;
}

// ---------------------------------------------------------------------------
// Input processor
// ---------------------------------------------------------------------------

/// Pipeline-side input stage of a transport.
///
/// Everything the processor receives in-band is passed through unchanged.
/// Frames received from the network arrive out-of-band on the ingress
/// channel and are forwarded downstream by a task spawned when the
/// `StartFrame` passes by (linking is complete by then).
pub struct TransportInputProcessor {
    base: BaseProcessor,
    ingress_rx: Option<mpsc::UnboundedReceiver<FrameRef>>,
    token: CancellationToken,
}

impl TransportInputProcessor {
    pub fn new(name: &str, ingress_rx: mpsc::UnboundedReceiver<FrameRef>) -> Self {
        Self {
            base: BaseProcessor::new(Some(name.to_string())),
            ingress_rx: Some(ingress_rx),
            token: CancellationToken::new(),
        }
    }
}

impl_base_debug_display!(TransportInputProcessor);

#[async_trait]
impl FrameProcessor for TransportInputProcessor {
    fn base(&self) -> &BaseProcessor {
        &self.base
    }
    fn base_mut(&mut self) -> &mut BaseProcessor {
        &mut self.base
    }

    async fn cleanup(&mut self) {
        self.token.cancel();
    }

    async fn process_frame(&mut self, frame: FrameRef, direction: FrameDirection) {
        if frame.downcast_ref::<StartFrame>().is_some() && !self.base.started {
            self.base.started = true;
            if let (Some(mut ingress_rx), Some(next)) =
                (self.ingress_rx.take(), self.base.next.clone())
            {
                let token = self.token.clone();
                tokio::spawn(async move {
                    loop {
                        let frame = tokio::select! {
                            biased;
                            _ = token.cancelled() => break,
                            frame = ingress_rx.recv() => match frame {
                                Some(frame) => frame,
                                None => break,
                            },
                        };
                        drive_processor(next.clone(), frame, FrameDirection::Downstream).await;
                    }
                });
            } else if self.base.next.is_none() {
                tracing::warn!("{}: started while unlinked, ingress disabled", self.name());
            }
        } else if frame.downcast_ref::<EndFrame>().is_some()
            || frame.downcast_ref::<CancelFrame>().is_some()
        {
            self.token.cancel();
        }
        self.push_frame(frame, direction).await;
    }
}

// ---------------------------------------------------------------------------
// Output processor
// ---------------------------------------------------------------------------

/// Pipeline-side output stage of a transport.
///
/// Sendable frames are copied to the egress channel (consumed by the
/// backend's writer task) and passed through for any processors further
/// down. Media kinds disabled in [`TransportParams`] are passed through but
/// not sent.
pub struct TransportOutputProcessor {
    base: BaseProcessor,
    egress_tx: mpsc::UnboundedSender<FrameRef>,
    audio_out_enabled: bool,
    camera_out_enabled: bool,
}

impl TransportOutputProcessor {
    pub fn new(name: &str, egress_tx: mpsc::UnboundedSender<FrameRef>, params: &TransportParams) -> Self {
        Self {
            base: BaseProcessor::new(Some(name.to_string())),
            egress_tx,
            audio_out_enabled: params.audio_out_enabled,
            camera_out_enabled: params.camera_out_enabled,
        }
    }

    fn should_send(&self, frame: &dyn Frame) -> bool {
        if frame.downcast_ref::<OutputAudioRawFrame>().is_some() {
            return self.audio_out_enabled;
        }
        if frame.downcast_ref::<OutputImageRawFrame>().is_some() {
            return self.camera_out_enabled;
        }
        frame.downcast_ref::<OutputTransportMessageFrame>().is_some()
            || frame.downcast_ref::<EndFrame>().is_some()
            || frame.downcast_ref::<CancelFrame>().is_some()
    }
}

impl_base_debug_display!(TransportOutputProcessor);

#[async_trait]
impl FrameProcessor for TransportOutputProcessor {
    fn base(&self) -> &BaseProcessor {
        &self.base
    }
    fn base_mut(&mut self) -> &mut BaseProcessor {
        &mut self.base
    }

    async fn process_frame(&mut self, frame: FrameRef, direction: FrameDirection) {
        if direction == FrameDirection::Downstream && self.should_send(frame.as_ref()) {
            if self.egress_tx.send(frame.clone()).is_err() {
                tracing::warn!("{}: egress channel closed, frame not sent", self.name());
            }
        }
        self.push_frame(frame, direction).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::TextFrame;

    #[tokio::test]
    async fn test_output_processor_sends_enabled_media() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let params = TransportParams {
            audio_out_enabled: true,
            ..Default::default()
        };
        let mut out = TransportOutputProcessor::new("out", tx, &params);

        out.process_frame(
            Arc::new(OutputAudioRawFrame::new(vec![0u8; 32], 16000, 1)),
            FrameDirection::Downstream,
        )
        .await;

        let sent = rx.try_recv().expect("audio should be sent");
        assert_eq!(sent.name(), "OutputAudioRawFrame");
        // Passed through as well.
        assert_eq!(out.pending_frames_mut().len(), 1);
    }

    #[tokio::test]
    async fn test_output_processor_gates_disabled_media() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let params = TransportParams::default(); // audio_out disabled
        let mut out = TransportOutputProcessor::new("out", tx, &params);

        out.process_frame(
            Arc::new(OutputAudioRawFrame::new(vec![0u8; 32], 16000, 1)),
            FrameDirection::Downstream,
        )
        .await;

        assert!(rx.try_recv().is_err(), "disabled audio must not be sent");
        // Still passed through downstream.
        assert_eq!(out.pending_frames_mut().len(), 1);
    }

    #[tokio::test]
    async fn test_output_processor_sends_terminal_frames() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut out = TransportOutputProcessor::new("out", tx, &TransportParams::default());

        out.process_frame(Arc::new(EndFrame::new()), FrameDirection::Downstream)
            .await;
        assert_eq!(rx.try_recv().unwrap().name(), "EndFrame");
    }

    #[tokio::test]
    async fn test_output_processor_ignores_plain_data() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut out = TransportOutputProcessor::new("out", tx, &TransportParams::default());

        out.process_frame(Arc::new(TextFrame::new("x")), FrameDirection::Downstream)
            .await;
        assert!(rx.try_recv().is_err());
        assert_eq!(out.pending_frames_mut().len(), 1);
    }

    #[tokio::test]
    async fn test_input_processor_forwards_ingress_after_start() {
        let (ingress_tx, ingress_rx) = mpsc::unbounded_channel();
        let input = Arc::new(Mutex::new(TransportInputProcessor::new("in", ingress_rx)))
            as Arc<Mutex<dyn FrameProcessor>>;

        // Downstream neighbor capturing what arrives.
        struct Capture {
            base: BaseProcessor,
            seen: Arc<std::sync::Mutex<Vec<String>>>,
        }
        impl_base_debug_display!(Capture);
        #[async_trait]
        impl FrameProcessor for Capture {
            fn base(&self) -> &BaseProcessor {
                &self.base
            }
            fn base_mut(&mut self) -> &mut BaseProcessor {
                &mut self.base
            }
            async fn process_frame(&mut self, frame: FrameRef, _direction: FrameDirection) {
                self.seen.lock().unwrap().push(frame.name().to_string());
            }
        }
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let capture = Arc::new(Mutex::new(Capture {
            base: BaseProcessor::new(None),
            seen: seen.clone(),
        })) as Arc<Mutex<dyn FrameProcessor>>;

        input.lock().await.link(capture.clone());

        // Start the input processor, then push a network frame.
        drive_processor(
            input.clone(),
            Arc::new(StartFrame::default()),
            FrameDirection::Downstream,
        )
        .await;
        ingress_tx
            .send(Arc::new(TextFrame::new("from network")) as FrameRef)
            .unwrap();

        for _ in 0..100 {
            if seen.lock().unwrap().iter().any(|n| n == "TextFrame") {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let got = seen.lock().unwrap().clone();
        assert!(got.contains(&"StartFrame".to_string()));
        assert!(got.contains(&"TextFrame".to_string()));
    }
}
