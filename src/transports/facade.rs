// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Transport facade: one logical transport over interchangeable backends.
//!
//! Application code addresses a single transport surface while the concrete
//! backend -- WebSocket, managed room, or peer connection -- is selected
//! once, at construction, from the [`SessionArguments`] discriminant. The
//! facade translates the superset [`TransportFacadeParams`] into each
//! backend's own parameter type through explicit projection functions, and
//! remaps a small logical event vocabulary onto backend-native event names:
//!
//! | logical                  | websocket              | room                          | webrtc                 |
//! |--------------------------|------------------------|-------------------------------|------------------------|
//! | `on_client_connected`    | `on_client_connected`  | `on_first_participant_joined` | `on_client_connected`  |
//! | `on_client_disconnected` | `on_client_disconnected` | `on_participant_left`       | `on_client_disconnected` |
//! | (all others)             | pass-through           | pass-through                  | pass-through           |
//!
//! Handlers registered before the facade exists are buffered in an
//! [`EventHandlerRegistry`] and flushed -- in registration order, exactly
//! once -- right after the backend is constructed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::frames::{CancelFrame, EndFrame, StartFrame};
use crate::processors::FrameProcessor;
use crate::serializers::FrameSerializer;
use crate::transports::base::{BaseTransport, TransportParams};
use crate::transports::error::TransportError;
use crate::transports::room::{
    DialinSettings, RoomClient, RoomTransport, RoomTransportParams, TranscriptionSettings,
};
use crate::transports::webrtc::{PeerConnection, WebRtcTransport};
use crate::transports::websocket::{
    WebsocketStreamHandle, WebsocketTransport, WebsocketTransportParams,
};
use crate::utils::base_object::EventHandler;

// ---------------------------------------------------------------------------
// Session arguments
// ---------------------------------------------------------------------------

/// Arguments selecting the concrete backend for one session.
///
/// Exactly one variant exists per session; use [`SessionArguments::builder`]
/// when the populated discriminant is only known at runtime (e.g. parsed
/// from an HTTP request).
pub enum SessionArguments {
    /// An accepted WebSocket connection.
    Websocket {
        stream: WebsocketStreamHandle,
        session_id: Option<String>,
    },
    /// A managed room to join.
    Room {
        room_url: String,
        token: Option<String>,
        client: Arc<dyn RoomClient>,
        session_id: Option<String>,
    },
    /// A negotiated peer connection.
    WebRtc {
        connection: Arc<dyn PeerConnection>,
        session_id: Option<String>,
    },
}

impl SessionArguments {
    /// Start building session arguments field by field.
    pub fn builder() -> SessionArgumentsBuilder {
        SessionArgumentsBuilder::default()
    }

    /// The session identifier, if one was supplied.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            SessionArguments::Websocket { session_id, .. }
            | SessionArguments::Room { session_id, .. }
            | SessionArguments::WebRtc { session_id, .. } => session_id.as_deref(),
        }
    }
}

impl std::fmt::Debug for SessionArguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionArguments::Websocket { session_id, .. } => f
                .debug_struct("SessionArguments::Websocket")
                .field("session_id", session_id)
                .finish_non_exhaustive(),
            SessionArguments::Room {
                room_url,
                session_id,
                ..
            } => f
                .debug_struct("SessionArguments::Room")
                .field("room_url", room_url)
                .field("session_id", session_id)
                .finish_non_exhaustive(),
            SessionArguments::WebRtc { session_id, .. } => f
                .debug_struct("SessionArguments::WebRtc")
                .field("session_id", session_id)
                .finish_non_exhaustive(),
        }
    }
}

/// Builder validating that exactly one backend discriminant is populated.
#[derive(Default)]
pub struct SessionArgumentsBuilder {
    websocket: Option<WebsocketStreamHandle>,
    room_url: Option<String>,
    token: Option<String>,
    room_client: Option<Arc<dyn RoomClient>>,
    webrtc_connection: Option<Arc<dyn PeerConnection>>,
    session_id: Option<String>,
}

impl SessionArgumentsBuilder {
    /// Use an accepted WebSocket connection.
    pub fn websocket(mut self, stream: WebsocketStreamHandle) -> Self {
        self.websocket = Some(stream);
        self
    }

    /// Use a managed room.
    pub fn room_url(mut self, room_url: impl Into<String>) -> Self {
        self.room_url = Some(room_url.into());
        self
    }

    /// Room join token.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Room-service integration the room backend drives.
    pub fn room_client(mut self, client: Arc<dyn RoomClient>) -> Self {
        self.room_client = Some(client);
        self
    }

    /// Use a negotiated peer connection.
    pub fn webrtc_connection(mut self, connection: Arc<dyn PeerConnection>) -> Self {
        self.webrtc_connection = Some(connection);
        self
    }

    /// Session identifier attached to whichever variant is built.
    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Validate and build: exactly one of websocket / room_url /
    /// webrtc_connection must be populated.
    pub fn build(self) -> Result<SessionArguments, TransportError> {
        let populated = usize::from(self.websocket.is_some())
            + usize::from(self.room_url.is_some())
            + usize::from(self.webrtc_connection.is_some());
        if populated != 1 {
            return Err(TransportError::InvalidSessionArguments);
        }

        if let Some(stream) = self.websocket {
            return Ok(SessionArguments::Websocket {
                stream,
                session_id: self.session_id,
            });
        }
        if let Some(room_url) = self.room_url {
            let client = self.room_client.ok_or_else(|| {
                TransportError::Backend("room session arguments require a room client".into())
            })?;
            return Ok(SessionArguments::Room {
                room_url,
                token: self.token,
                client,
                session_id: self.session_id,
            });
        }
        if let Some(connection) = self.webrtc_connection {
            return Ok(SessionArguments::WebRtc {
                connection,
                session_id: self.session_id,
            });
        }
        Err(TransportError::InvalidSessionArguments)
    }
}

// ---------------------------------------------------------------------------
// Superset parameters
// ---------------------------------------------------------------------------

/// Superset of every backend's configuration.
///
/// Each backend consumes only its own projection; inapplicable fields are
/// simply not part of that projection and can never leak into a backend.
#[derive(Clone, Default)]
pub struct TransportFacadeParams {
    /// Media configuration shared by every backend.
    pub base: TransportParams,

    // WebSocket backend fields.
    /// Prepend a WAV header to outgoing WebSocket audio.
    pub add_wav_header: bool,
    /// Wire serializer for the WebSocket backend.
    pub serializer: Option<Arc<dyn FrameSerializer>>,
    /// WebSocket session timeout.
    pub session_timeout: Option<Duration>,

    // Room backend fields.
    /// Base URL of the room service REST API. Empty selects the backend
    /// default.
    pub api_url: Option<String>,
    /// Room service API key.
    pub api_key: String,
    /// Dial-in bridging configuration.
    pub dialin_settings: Option<DialinSettings>,
    /// Whether server-side transcription is enabled.
    pub transcription_enabled: bool,
    /// Server-side transcription configuration.
    pub transcription_settings: TranscriptionSettings,
}

impl TransportFacadeParams {
    /// Project the fields the WebSocket backend consumes.
    pub fn websocket_params(&self) -> WebsocketTransportParams {
        WebsocketTransportParams {
            base: self.base.clone(),
            add_wav_header: self.add_wav_header,
            serializer: self.serializer.clone(),
            session_timeout: self.session_timeout,
        }
    }

    /// Project the fields the room backend consumes.
    pub fn room_params(&self) -> RoomTransportParams {
        let defaults = RoomTransportParams::default();
        RoomTransportParams {
            base: self.base.clone(),
            api_url: self.api_url.clone().unwrap_or(defaults.api_url),
            api_key: self.api_key.clone(),
            dialin_settings: self.dialin_settings.clone(),
            transcription_enabled: self.transcription_enabled,
            transcription_settings: self.transcription_settings.clone(),
        }
    }

    /// Project the fields the peer-connection backend consumes.
    pub fn peer_params(&self) -> TransportParams {
        self.base.clone()
    }
}

// ---------------------------------------------------------------------------
// Event handler registry
// ---------------------------------------------------------------------------

/// Two-state buffer for handlers registered before a backend exists.
///
/// `Unbound` accumulates `(logical event, handler)` pairs in registration
/// order; the single `bind` transition flushes them exactly once and moves
/// the registry to `Bound`, after which further registration through the
/// registry is rejected (register on the facade instead).
pub enum EventHandlerRegistry {
    Unbound {
        pending: Vec<(String, EventHandler)>,
    },
    Bound,
}

impl EventHandlerRegistry {
    /// Create an empty, unbound registry.
    pub fn new() -> Self {
        EventHandlerRegistry::Unbound {
            pending: Vec::new(),
        }
    }

    /// Buffer a handler for a logical event.
    pub fn add_handler(
        &mut self,
        event_name: impl Into<String>,
        handler: EventHandler,
    ) -> Result<(), TransportError> {
        match self {
            EventHandlerRegistry::Unbound { pending } => {
                pending.push((event_name.into(), handler));
                Ok(())
            }
            EventHandlerRegistry::Bound => Err(TransportError::HandlersAlreadyBound),
        }
    }

    /// Number of buffered handlers.
    pub fn pending_len(&self) -> usize {
        match self {
            EventHandlerRegistry::Unbound { pending } => pending.len(),
            EventHandlerRegistry::Bound => 0,
        }
    }

    /// Flush buffered handlers through `apply`, in registration order, and
    /// transition to `Bound`.
    fn bind<F>(&mut self, mut apply: F) -> Result<(), TransportError>
    where
        F: FnMut(&str, EventHandler) -> Result<(), TransportError>,
    {
        match std::mem::replace(self, EventHandlerRegistry::Bound) {
            EventHandlerRegistry::Unbound { pending } => {
                for (name, handler) in pending {
                    apply(&name, handler)?;
                }
                Ok(())
            }
            EventHandlerRegistry::Bound => Err(TransportError::HandlersAlreadyBound),
        }
    }
}

impl Default for EventHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Backend selection and event remapping
// ---------------------------------------------------------------------------

/// Identity of the backend a facade resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Websocket,
    Room,
    WebRtc,
}

impl BackendKind {
    pub fn label(&self) -> &'static str {
        match self {
            BackendKind::Websocket => "websocket",
            BackendKind::Room => "room",
            BackendKind::WebRtc => "webrtc",
        }
    }
}

/// Map a logical event name onto the backend's native name.
///
/// Names absent from the table pass through unchanged.
fn native_event_name<'a>(kind: BackendKind, logical: &'a str) -> &'a str {
    match (kind, logical) {
        (BackendKind::Room, "on_client_connected") => "on_first_participant_joined",
        (BackendKind::Room, "on_client_disconnected") => "on_participant_left",
        _ => logical,
    }
}

/// The concrete backend behind a facade, resolved once at construction.
enum TransportBackend {
    Websocket(WebsocketTransport),
    Room(RoomTransport),
    WebRtc(WebRtcTransport),
}

impl TransportBackend {
    fn as_ref(&self) -> &dyn BaseTransport {
        match self {
            TransportBackend::Websocket(t) => t,
            TransportBackend::Room(t) => t,
            TransportBackend::WebRtc(t) => t,
        }
    }

    fn as_mut(&mut self) -> &mut dyn BaseTransport {
        match self {
            TransportBackend::Websocket(t) => t,
            TransportBackend::Room(t) => t,
            TransportBackend::WebRtc(t) => t,
        }
    }
}

// ---------------------------------------------------------------------------
// TransportFacade
// ---------------------------------------------------------------------------

/// One logical transport backed by exactly one concrete backend.
pub struct TransportFacade {
    kind: BackendKind,
    session_id: Option<String>,
    backend: TransportBackend,
}

impl TransportFacade {
    /// Construct a facade with no pre-registered handlers.
    pub fn new(
        args: SessionArguments,
        params: TransportFacadeParams,
    ) -> Result<Self, TransportError> {
        Self::with_registry(args, params, EventHandlerRegistry::new())
    }

    /// Construct a facade, then flush `registry` -- in registration order,
    /// exactly once -- onto the selected backend.
    pub fn with_registry(
        args: SessionArguments,
        params: TransportFacadeParams,
        mut registry: EventHandlerRegistry,
    ) -> Result<Self, TransportError> {
        let session_id = args.session_id().map(str::to_owned);
        let (kind, backend) = match args {
            SessionArguments::Websocket { stream, .. } => {
                tracing::info!("TransportFacade: using websocket transport");
                (
                    BackendKind::Websocket,
                    TransportBackend::Websocket(WebsocketTransport::new(
                        stream,
                        params.websocket_params(),
                    )),
                )
            }
            SessionArguments::Room {
                room_url,
                token,
                client,
                ..
            } => {
                tracing::info!("TransportFacade: using room transport");
                (
                    BackendKind::Room,
                    TransportBackend::Room(RoomTransport::new(
                        room_url,
                        token,
                        client,
                        params.room_params(),
                    )),
                )
            }
            SessionArguments::WebRtc { connection, .. } => {
                tracing::info!("TransportFacade: using webrtc transport");
                (
                    BackendKind::WebRtc,
                    TransportBackend::WebRtc(WebRtcTransport::new(
                        connection,
                        params.peer_params(),
                    )),
                )
            }
        };

        let facade = Self {
            kind,
            session_id,
            backend,
        };
        registry.bind(|name, handler| facade.add_event_handler(name, handler))?;
        Ok(facade)
    }

    /// The backend this facade resolved to.
    pub fn backend_kind(&self) -> BackendKind {
        self.kind
    }

    /// The session identifier supplied with the session arguments.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// The processor feeding received frames into the pipeline.
    pub fn input(&self) -> Arc<Mutex<dyn FrameProcessor>> {
        self.backend.as_ref().input()
    }

    /// The processor delivering pipeline output to the network.
    pub fn output(&self) -> Arc<Mutex<dyn FrameProcessor>> {
        self.backend.as_ref().output()
    }

    /// Connect the backend and begin moving frames.
    pub async fn start(&mut self, frame: &StartFrame) -> Result<(), TransportError> {
        self.backend.as_mut().start(frame).await
    }

    /// Disconnect gracefully.
    pub async fn stop(&mut self, frame: &EndFrame) -> Result<(), TransportError> {
        self.backend.as_mut().stop(frame).await
    }

    /// Tear the connection down immediately.
    pub async fn cancel(&mut self, frame: &CancelFrame) -> Result<(), TransportError> {
        self.backend.as_mut().cancel(frame).await
    }

    /// Attach a handler to a logical event, remapped to the backend's
    /// native event name.
    pub fn add_event_handler(
        &self,
        logical_name: &str,
        handler: EventHandler,
    ) -> Result<(), TransportError> {
        let native = native_event_name(self.kind, logical_name);
        if native != logical_name {
            tracing::debug!(
                "TransportFacade: event {} mapped to {} for {} backend",
                logical_name,
                native,
                self.kind.label()
            );
        }
        self.backend.as_ref().add_event_handler(native, handler)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_with_nothing_populated_fails() {
        let result = SessionArguments::builder().build();
        assert!(matches!(
            result,
            Err(TransportError::InvalidSessionArguments)
        ));
    }

    #[test]
    fn test_builder_session_id_alone_fails() {
        let result = SessionArguments::builder().session_id("s-1").build();
        assert!(matches!(
            result,
            Err(TransportError::InvalidSessionArguments)
        ));
    }

    #[test]
    fn test_native_event_name_mapping() {
        assert_eq!(
            native_event_name(BackendKind::Room, "on_client_connected"),
            "on_first_participant_joined"
        );
        assert_eq!(
            native_event_name(BackendKind::Room, "on_client_disconnected"),
            "on_participant_left"
        );
        // Pass-through everywhere else.
        assert_eq!(
            native_event_name(BackendKind::Websocket, "on_client_connected"),
            "on_client_connected"
        );
        assert_eq!(
            native_event_name(BackendKind::WebRtc, "on_client_disconnected"),
            "on_client_disconnected"
        );
        assert_eq!(
            native_event_name(BackendKind::Room, "on_joined"),
            "on_joined"
        );
    }

    #[test]
    fn test_registry_buffers_in_order_and_binds_once() {
        let mut registry = EventHandlerRegistry::new();
        registry
            .add_handler("on_a", Arc::new(|_| Box::pin(async {})))
            .unwrap();
        registry
            .add_handler("on_b", Arc::new(|_| Box::pin(async {})))
            .unwrap();
        assert_eq!(registry.pending_len(), 2);

        let mut flushed = Vec::new();
        registry
            .bind(|name, _handler| {
                flushed.push(name.to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(flushed, vec!["on_a", "on_b"]);

        // Bound: no further buffering, no second flush.
        assert!(matches!(
            registry.add_handler("on_c", Arc::new(|_| Box::pin(async {}))),
            Err(TransportError::HandlersAlreadyBound)
        ));
        assert!(matches!(
            registry.bind(|_, _| Ok(())),
            Err(TransportError::HandlersAlreadyBound)
        ));
    }

    #[test]
    fn test_websocket_projection_selects_websocket_fields() {
        let params = TransportFacadeParams {
            add_wav_header: true,
            session_timeout: Some(Duration::from_secs(30)),
            api_key: "room-key".into(),
            transcription_enabled: true,
            ..Default::default()
        };
        let ws = params.websocket_params();
        assert!(ws.add_wav_header);
        assert_eq!(ws.session_timeout, Some(Duration::from_secs(30)));
        // Room-only fields do not exist on the websocket parameter type;
        // the shared media params carry over.
        assert_eq!(ws.base.audio_in_enabled, params.base.audio_in_enabled);
    }

    #[test]
    fn test_room_projection_selects_room_fields() {
        let params = TransportFacadeParams {
            api_url: Some("https://api.example.test/v1".into()),
            api_key: "key".into(),
            dialin_settings: Some(DialinSettings {
                call_id: "c-1".into(),
                call_domain: "sip.example.test".into(),
            }),
            transcription_enabled: true,
            ..Default::default()
        };
        let room = params.room_params();
        assert_eq!(room.api_url, "https://api.example.test/v1");
        assert_eq!(room.api_key, "key");
        assert!(room.transcription_enabled);
        assert_eq!(room.dialin_settings.as_ref().unwrap().call_id, "c-1");
    }

    #[test]
    fn test_room_projection_defaults_api_url() {
        let params = TransportFacadeParams::default();
        let room = params.room_params();
        assert_eq!(room.api_url, RoomTransportParams::default().api_url);
    }

    #[test]
    fn test_peer_projection_is_base_media_params() {
        let params = TransportFacadeParams {
            base: TransportParams {
                camera_in_enabled: true,
                audio_out_enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let peer = params.peer_params();
        assert!(peer.camera_in_enabled);
        assert!(peer.audio_out_enabled);
        assert!(!peer.vad_enabled);
    }
}
