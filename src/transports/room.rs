// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Managed-room backend transport.
//!
//! Joins a hosted room (conference) service and exchanges media with its
//! participants. The service's wire protocol is out of scope here: all
//! signaling and media I/O goes through the [`RoomClient`] boundary trait,
//! which a concrete integration implements. This module maps the pipeline
//! world onto that boundary: output frames become client calls, client
//! events become input frames and named transport events.
//!
//! Native events: `on_joined`, `on_left`, `on_participant_joined`,
//! `on_first_participant_joined`, `on_participant_left`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::frames::{
    AudioRawData, CancelFrame, EndFrame, FrameRef, ImageRawData, InputAudioRawFrame,
    InputTransportMessageFrame, OutputAudioRawFrame, OutputImageRawFrame,
    OutputTransportMessageFrame, StartFrame, TranscriptionFrame,
};
use crate::processors::FrameProcessor;
use crate::transports::base::{
    BaseTransport, TransportInputProcessor, TransportOutputProcessor, TransportParams,
};
use crate::transports::error::TransportError;
use crate::utils::base_object::{BaseObject, EventHandler, EventPayload};

/// Dial-in bridging configuration for rooms with PSTN access.
#[derive(Debug, Clone)]
pub struct DialinSettings {
    /// Provider call identifier being bridged into the room.
    pub call_id: String,
    /// Provider domain the call originates from.
    pub call_domain: String,
}

/// Server-side transcription configuration.
#[derive(Debug, Clone)]
pub struct TranscriptionSettings {
    /// BCP-47 language tag to transcribe.
    pub language: String,
    /// Transcription model identifier.
    pub model: String,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            model: "general".to_string(),
        }
    }
}

/// Configuration consumed by the room backend.
#[derive(Debug, Clone)]
pub struct RoomTransportParams {
    /// Media configuration shared with every backend.
    pub base: TransportParams,
    /// Base URL of the room service REST API.
    pub api_url: String,
    /// API key used for service-side operations.
    pub api_key: String,
    /// Dial-in bridging, when the session originates from a phone call.
    pub dialin_settings: Option<DialinSettings>,
    /// Whether server-side transcription is started on join.
    pub transcription_enabled: bool,
    /// Transcription configuration.
    pub transcription_settings: TranscriptionSettings,
}

impl Default for RoomTransportParams {
    fn default() -> Self {
        Self {
            base: TransportParams::default(),
            api_url: "https://api.daily.co/v1".to_string(),
            api_key: String::new(),
            dialin_settings: None,
            transcription_enabled: false,
            transcription_settings: TranscriptionSettings::default(),
        }
    }
}

/// Events surfaced by a room client.
#[derive(Debug)]
pub enum RoomEvent {
    /// The local participant joined the room.
    Joined { session_id: String },
    /// The local participant left the room.
    Left,
    /// A remote participant joined. `is_first` is set for the first remote
    /// participant of the session.
    ParticipantJoined {
        participant_id: String,
        is_first: bool,
    },
    /// A remote participant left.
    ParticipantLeft { participant_id: String },
    /// Audio received from a participant.
    AudioReceived {
        participant_id: String,
        audio: AudioRawData,
    },
    /// An application message received from a participant.
    MessageReceived {
        participant_id: String,
        message: serde_json::Value,
    },
    /// A server-side transcription segment.
    TranscriptionReceived {
        participant_id: String,
        text: String,
        timestamp: String,
    },
}

/// Boundary contract to a concrete room-service integration.
///
/// The transport drives this trait; the trait implementation owns the
/// service connection, signaling, and media encoding.
#[async_trait]
pub trait RoomClient: Send + Sync {
    /// Join a room, returning the service session id.
    async fn join(&self, room_url: &str, token: Option<&str>) -> Result<String, TransportError>;

    /// Leave the room.
    async fn leave(&self) -> Result<(), TransportError>;

    /// Send audio to the room.
    async fn send_audio(&self, audio: &AudioRawData) -> Result<(), TransportError>;

    /// Send a video frame to the room.
    async fn send_image(&self, image: &ImageRawData) -> Result<(), TransportError>;

    /// Send an application message to the room.
    async fn send_message(&self, message: &serde_json::Value) -> Result<(), TransportError>;

    /// Start server-side transcription.
    async fn start_transcription(
        &self,
        settings: &TranscriptionSettings,
    ) -> Result<(), TransportError>;

    /// Subscribe to room events. Called once, at transport start.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<RoomEvent>;
}

/// Room-service-backed transport.
pub struct RoomTransport {
    events: Arc<BaseObject>,
    room_url: String,
    token: Option<String>,
    client: Arc<dyn RoomClient>,
    params: RoomTransportParams,
    input: Arc<Mutex<dyn FrameProcessor>>,
    output: Arc<Mutex<dyn FrameProcessor>>,
    ingress_tx: mpsc::UnboundedSender<FrameRef>,
    egress_rx: Option<mpsc::UnboundedReceiver<FrameRef>>,
    cancel_token: CancellationToken,
    tasks: JoinSet<()>,
}

impl RoomTransport {
    pub fn new(
        room_url: impl Into<String>,
        token: Option<String>,
        client: Arc<dyn RoomClient>,
        params: RoomTransportParams,
    ) -> Self {
        let events = Arc::new(BaseObject::with_type_name("RoomTransport", None));
        events.register_event_handler("on_joined", true);
        events.register_event_handler("on_left", true);
        events.register_event_handler("on_participant_joined", true);
        events.register_event_handler("on_first_participant_joined", true);
        events.register_event_handler("on_participant_left", true);

        let (ingress_tx, ingress_rx) = mpsc::unbounded_channel();
        let (egress_tx, egress_rx) = mpsc::unbounded_channel();

        let input = Arc::new(Mutex::new(TransportInputProcessor::new(
            "RoomInput",
            ingress_rx,
        ))) as Arc<Mutex<dyn FrameProcessor>>;
        let output = Arc::new(Mutex::new(TransportOutputProcessor::new(
            "RoomOutput",
            egress_tx,
            &params.base,
        ))) as Arc<Mutex<dyn FrameProcessor>>;

        Self {
            events,
            room_url: room_url.into(),
            token,
            client,
            params,
            input,
            output,
            ingress_tx,
            egress_rx: Some(egress_rx),
            cancel_token: CancellationToken::new(),
            tasks: JoinSet::new(),
        }
    }
}

#[async_trait]
impl BaseTransport for RoomTransport {
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
        let mut room_rx = self.client.subscribe();

        let session_id = self
            .client
            .join(&self.room_url, self.token.as_deref())
            .await?;
        tracing::info!(
            "{}: joined {} (session {})",
            self.name(),
            self.room_url,
            session_id
        );
        self.events
            .call_event_handler("on_joined", EventPayload::for_client(session_id))
            .await;

        if self.params.transcription_enabled {
            self.client
                .start_transcription(&self.params.transcription_settings)
                .await?;
        }

        // Event task: room events -> transport events + input frames.
        let events = self.events.clone();
        let ingress_tx = self.ingress_tx.clone();
        let audio_in_enabled = self.params.base.audio_in_enabled;
        let token = self.cancel_token.clone();
        self.tasks.spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    event = room_rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                match event {
                    RoomEvent::Joined { session_id } => {
                        // Re-joins after reconnects also surface here.
                        events
                            .call_event_handler("on_joined", EventPayload::for_client(session_id))
                            .await;
                    }
                    RoomEvent::Left => {
                        events
                            .call_event_handler("on_left", EventPayload::empty())
                            .await;
                        break;
                    }
                    RoomEvent::ParticipantJoined {
                        participant_id,
                        is_first,
                    } => {
                        let payload = EventPayload::for_client(participant_id);
                        events
                            .call_event_handler("on_participant_joined", payload.clone())
                            .await;
                        if is_first {
                            events
                                .call_event_handler("on_first_participant_joined", payload)
                                .await;
                        }
                    }
                    RoomEvent::ParticipantLeft { participant_id } => {
                        events
                            .call_event_handler(
                                "on_participant_left",
                                EventPayload::for_client(participant_id),
                            )
                            .await;
                    }
                    RoomEvent::AudioReceived {
                        participant_id,
                        audio,
                    } => {
                        if audio_in_enabled {
                            let mut frame = InputAudioRawFrame::new(
                                audio.audio,
                                audio.sample_rate,
                                audio.num_channels,
                            );
                            frame.fields = frame.fields.with_transport_source(participant_id);
                            let _ = ingress_tx.send(Arc::new(frame) as FrameRef);
                        }
                    }
                    RoomEvent::MessageReceived { message, .. } => {
                        let _ = ingress_tx
                            .send(Arc::new(InputTransportMessageFrame::new(message)) as FrameRef);
                    }
                    RoomEvent::TranscriptionReceived {
                        participant_id,
                        text,
                        timestamp,
                    } => {
                        let _ = ingress_tx.send(Arc::new(TranscriptionFrame::new(
                            text,
                            participant_id,
                            timestamp,
                        )) as FrameRef);
                    }
                }
            }
        });

        // Writer task: output frames -> client calls.
        let client = self.client.clone();
        let token = self.cancel_token.clone();
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
                    client.send_audio(&audio.audio).await
                } else if let Some(image) = frame.downcast_ref::<OutputImageRawFrame>() {
                    client.send_image(&image.image).await
                } else if let Some(msg) = frame.downcast_ref::<OutputTransportMessageFrame>() {
                    client.send_message(&msg.message).await
                } else if frame.downcast_ref::<EndFrame>().is_some()
                    || frame.downcast_ref::<CancelFrame>().is_some()
                {
                    break;
                } else {
                    Ok(())
                };
                if let Err(e) = result {
                    tracing::warn!("RoomTransport: send failed: {}", e);
                }
            }
        });

        Ok(())
    }

    async fn stop(&mut self, _frame: &EndFrame) -> Result<(), TransportError> {
        self.client.leave().await?;
        self.events
            .call_event_handler("on_left", EventPayload::empty())
            .await;
        self.cancel_token.cancel();
        while self.tasks.join_next().await.is_some() {}
        self.events.cleanup().await;
        Ok(())
    }

    async fn cancel(&mut self, _frame: &CancelFrame) -> Result<(), TransportError> {
        self.cancel_token.cancel();
        let _ = self.client.leave().await;
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
                backend: "room",
            });
        }
        self.events.add_event_handler(event_name, handler);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory room client for testing the event/frame mapping.
    pub(crate) struct MockRoomClient {
        event_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<RoomEvent>>>,
        pub joined: AtomicBool,
        pub transcription_started: AtomicBool,
    }

    impl MockRoomClient {
        pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedSender<RoomEvent>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                Arc::new(Self {
                    event_rx: std::sync::Mutex::new(Some(rx)),
                    joined: AtomicBool::new(false),
                    transcription_started: AtomicBool::new(false),
                }),
                tx,
            )
        }
    }

    #[async_trait]
    impl RoomClient for MockRoomClient {
        async fn join(&self, _room_url: &str, _token: Option<&str>) -> Result<String, TransportError> {
            self.joined.store(true, Ordering::SeqCst);
            Ok("session-1".to_string())
        }
        async fn leave(&self) -> Result<(), TransportError> {
            self.joined.store(false, Ordering::SeqCst);
            Ok(())
        }
        async fn send_audio(&self, _audio: &AudioRawData) -> Result<(), TransportError> {
            Ok(())
        }
        async fn send_image(&self, _image: &ImageRawData) -> Result<(), TransportError> {
            Ok(())
        }
        async fn send_message(&self, _message: &serde_json::Value) -> Result<(), TransportError> {
            Ok(())
        }
        async fn start_transcription(
            &self,
            _settings: &TranscriptionSettings,
        ) -> Result<(), TransportError> {
            self.transcription_started.store(true, Ordering::SeqCst);
            Ok(())
        }
        fn subscribe(&self) -> mpsc::UnboundedReceiver<RoomEvent> {
            self.event_rx
                .lock()
                .unwrap()
                .take()
                .expect("subscribe called twice")
        }
    }

    #[tokio::test]
    async fn test_start_joins_and_fires_on_joined() {
        let (client, _event_tx) = MockRoomClient::new();
        let mut transport = RoomTransport::new(
            "https://rooms.example/room",
            Some("tok".into()),
            client.clone(),
            RoomTransportParams::default(),
        );

        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        transport
            .add_event_handler(
                "on_joined",
                Arc::new(move |_payload| {
                    let f = fired_clone.clone();
                    Box::pin(async move {
                        f.store(true, Ordering::SeqCst);
                    })
                }),
            )
            .unwrap();

        transport.start(&StartFrame::default()).await.unwrap();
        assert!(client.joined.load(Ordering::SeqCst));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_first_participant_event_mapping() {
        let (client, event_tx) = MockRoomClient::new();
        let mut transport = RoomTransport::new(
            "https://rooms.example/room",
            None,
            client,
            RoomTransportParams::default(),
        );

        let first = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
        let first_clone = first.clone();
        transport
            .add_event_handler(
                "on_first_participant_joined",
                Arc::new(move |payload| {
                    let f = first_clone.clone();
                    Box::pin(async move {
                        f.lock().unwrap().push(payload.client_id.unwrap_or_default());
                    })
                }),
            )
            .unwrap();

        transport.start(&StartFrame::default()).await.unwrap();

        event_tx
            .send(RoomEvent::ParticipantJoined {
                participant_id: "p1".into(),
                is_first: true,
            })
            .unwrap();
        event_tx
            .send(RoomEvent::ParticipantJoined {
                participant_id: "p2".into(),
                is_first: false,
            })
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(*first.lock().unwrap(), vec!["p1".to_string()]);
    }

    #[tokio::test]
    async fn test_transcription_started_when_enabled() {
        let (client, _event_tx) = MockRoomClient::new();
        let params = RoomTransportParams {
            transcription_enabled: true,
            ..Default::default()
        };
        let mut transport =
            RoomTransport::new("https://rooms.example/room", None, client.clone(), params);
        transport.start(&StartFrame::default()).await.unwrap();
        assert!(client.transcription_started.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unknown_event_is_unsupported() {
        let (client, _event_tx) = MockRoomClient::new();
        let transport = RoomTransport::new(
            "https://rooms.example/room",
            None,
            client,
            RoomTransportParams::default(),
        );
        let result =
            transport.add_event_handler("on_dialout_answered", Arc::new(|_| Box::pin(async {})));
        assert!(matches!(
            result,
            Err(TransportError::UnsupportedOperation { .. })
        ));
    }
}
