// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Peer-connection backend transport.
//!
//! Exchanges media directly with a browser (or other) peer over an already
//! negotiated WebRTC connection. ICE/SDP negotiation is out of scope: the
//! connection is handed in as a [`PeerConnection`] trait object and this
//! module only maps frames onto it, mirroring the room backend's shape.
//!
//! Native events: `on_client_connected`, `on_client_disconnected`,
//! `on_client_closed`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::frames::{
    AudioRawData, CancelFrame, EndFrame, FrameRef, ImageRawData, InputAudioRawFrame,
    InputImageRawFrame, InputTransportMessageFrame, OutputAudioRawFrame, OutputImageRawFrame,
    OutputTransportMessageFrame, StartFrame,
};
use crate::processors::FrameProcessor;
use crate::transports::base::{
    BaseTransport, TransportInputProcessor, TransportOutputProcessor, TransportParams,
};
use crate::transports::error::TransportError;
use crate::utils::base_object::{BaseObject, EventHandler, EventPayload};

/// Events surfaced by a peer connection.
#[derive(Debug)]
pub enum PeerEvent {
    /// The remote client's media channels are up.
    Connected { client_id: String },
    /// The remote client disconnected (may reconnect).
    Disconnected { client_id: String },
    /// The connection was closed for good.
    Closed,
    /// Audio received from the peer.
    AudioReceived { audio: AudioRawData },
    /// A video frame received from the peer.
    VideoReceived { image: ImageRawData },
    /// An application message received over the data channel.
    MessageReceived { message: serde_json::Value },
}

/// Boundary contract to a negotiated WebRTC peer connection.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Identifier of the remote client.
    fn client_id(&self) -> String;

    /// Send audio to the peer.
    async fn send_audio(&self, audio: &AudioRawData) -> Result<(), TransportError>;

    /// Send a video frame to the peer.
    async fn send_image(&self, image: &ImageRawData) -> Result<(), TransportError>;

    /// Send an application message over the data channel.
    async fn send_message(&self, message: &serde_json::Value) -> Result<(), TransportError>;

    /// Close the connection.
    async fn close(&self) -> Result<(), TransportError>;

    /// Subscribe to connection events. Called once, at transport start.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<PeerEvent>;
}

/// Peer-connection-backed transport.
pub struct WebRtcTransport {
    events: Arc<BaseObject>,
    connection: Arc<dyn PeerConnection>,
    params: TransportParams,
    input: Arc<Mutex<dyn FrameProcessor>>,
    output: Arc<Mutex<dyn FrameProcessor>>,
    ingress_tx: mpsc::UnboundedSender<FrameRef>,
    egress_rx: Option<mpsc::UnboundedReceiver<FrameRef>>,
    token: CancellationToken,
    tasks: JoinSet<()>,
}

impl WebRtcTransport {
    pub fn new(connection: Arc<dyn PeerConnection>, params: TransportParams) -> Self {
        let events = Arc::new(BaseObject::with_type_name("WebRtcTransport", None));
        events.register_event_handler("on_client_connected", true);
        events.register_event_handler("on_client_disconnected", true);
        events.register_event_handler("on_client_closed", true);

        let (ingress_tx, ingress_rx) = mpsc::unbounded_channel();
        let (egress_tx, egress_rx) = mpsc::unbounded_channel();

        let input = Arc::new(Mutex::new(TransportInputProcessor::new(
            "WebRtcInput",
            ingress_rx,
        ))) as Arc<Mutex<dyn FrameProcessor>>;
        let output = Arc::new(Mutex::new(TransportOutputProcessor::new(
            "WebRtcOutput",
            egress_tx,
            &params,
        ))) as Arc<Mutex<dyn FrameProcessor>>;

        Self {
            events,
            connection,
            params,
            input,
            output,
            ingress_tx,
            egress_rx: Some(egress_rx),
            token: CancellationToken::new(),
            tasks: JoinSet::new(),
        }
    }
}

#[async_trait]
impl BaseTransport for WebRtcTransport {
    fn name(&self) -> &str {
        self.events.name()
    }

    fn input(&self) -> Arc<Mutex<dyn FrameProcessor>> {
        self.input.clone()
    }

    fn output(&self) -> Arc<Mutex<dyn FrameProcessor>> {
        self.output.clone()
    }

    async fn start(&mut self, _frame: &StartFrame) -> Result<(), TransportError> {
        let egress_rx = self.egress_rx.take().ok_or(TransportError::NotConnected)?;
        let mut peer_rx = self.connection.subscribe();

        // Event task: peer events -> transport events + input frames.
        let events = self.events.clone();
        let ingress_tx = self.ingress_tx.clone();
        let audio_in_enabled = self.params.audio_in_enabled;
        let camera_in_enabled = self.params.camera_in_enabled;
        let token = self.token.clone();
        self.tasks.spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    event = peer_rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                match event {
                    PeerEvent::Connected { client_id } => {
                        events
                            .call_event_handler(
                                "on_client_connected",
                                EventPayload::for_client(client_id),
                            )
                            .await;
                    }
                    PeerEvent::Disconnected { client_id } => {
                        events
                            .call_event_handler(
                                "on_client_disconnected",
                                EventPayload::for_client(client_id),
                            )
                            .await;
                    }
                    PeerEvent::Closed => {
                        events
                            .call_event_handler("on_client_closed", EventPayload::empty())
                            .await;
                        break;
                    }
                    PeerEvent::AudioReceived { audio } => {
                        if audio_in_enabled {
                            let _ = ingress_tx.send(Arc::new(InputAudioRawFrame::new(
                                audio.audio,
                                audio.sample_rate,
                                audio.num_channels,
                            )) as FrameRef);
                        }
                    }
                    PeerEvent::VideoReceived { image } => {
                        if camera_in_enabled {
                            let _ = ingress_tx.send(Arc::new(InputImageRawFrame::new(
                                image.image,
                                image.size,
                                image.format,
                            )) as FrameRef);
                        }
                    }
                    PeerEvent::MessageReceived { message } => {
                        let _ = ingress_tx
                            .send(Arc::new(InputTransportMessageFrame::new(message)) as FrameRef);
                    }
                }
            }
        });

        // Writer task: output frames -> peer calls.
        let connection = self.connection.clone();
        let token = self.token.clone();
        let mut egress_rx = egress_rx;
        self.tasks.spawn(async move {
            loop {
                let frame = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    frame = egress_rx.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };
                let result = if let Some(audio) = frame.downcast_ref::<OutputAudioRawFrame>() {
                    connection.send_audio(&audio.audio).await
                } else if let Some(image) = frame.downcast_ref::<OutputImageRawFrame>() {
                    connection.send_image(&image.image).await
                } else if let Some(msg) = frame.downcast_ref::<OutputTransportMessageFrame>() {
                    connection.send_message(&msg.message).await
                } else if frame.downcast_ref::<EndFrame>().is_some()
                    || frame.downcast_ref::<CancelFrame>().is_some()
                {
                    let _ = connection.close().await;
                    break;
                } else {
                    Ok(())
                };
                if let Err(e) = result {
                    tracing::warn!("WebRtcTransport: send failed: {}", e);
                }
            }
        });

        Ok(())
    }

    async fn stop(&mut self, _frame: &EndFrame) -> Result<(), TransportError> {
        self.connection.close().await?;
        self.token.cancel();
        while self.tasks.join_next().await.is_some() {}
        self.events.cleanup().await;
        Ok(())
    }

    async fn cancel(&mut self, _frame: &CancelFrame) -> Result<(), TransportError> {
        self.token.cancel();
        let _ = self.connection.close().await;
        while self.tasks.join_next().await.is_some() {}
        Ok(())
    }

    fn add_event_handler(
        &self,
        event_name: &str,
        handler: EventHandler,
    ) -> Result<(), TransportError> {
        if !self.events.has_event(event_name) {
            return Err(TransportError::UnsupportedOperation {
                operation: format!("event `{}`", event_name),
                backend: "webrtc",
            });
        }
        self.events.add_event_handler(event_name, handler);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
