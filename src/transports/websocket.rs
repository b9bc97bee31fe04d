// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! WebSocket backend transport.
//!
//! Owns an accepted WebSocket stream and moves frames over it through a
//! [`FrameSerializer`] (JSON by default). The reader task deserializes
//! incoming messages into frames and feeds the transport input processor;
//! the writer task serializes frames from the output processor and sends
//! them. Optionally prepends a WAV header to outgoing audio so thin clients
//! can play the stream without knowing the PCM layout.
//!
//! Native events: `on_client_connected`, `on_client_disconnected`,
//! `on_session_timeout`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::frames::{CancelFrame, EndFrame, FrameRef, OutputAudioRawFrame, StartFrame};
use crate::processors::FrameProcessor;
use crate::serializers::{FrameSerializer, JsonFrameSerializer, SerializedFrame};
use crate::transports::base::{
    BaseTransport, TransportInputProcessor, TransportOutputProcessor, TransportParams,
};
use crate::transports::error::TransportError;
use crate::utils::base_object::{BaseObject, EventHandler, EventPayload};

/// The accepted socket handle this backend is built around.
pub type WebsocketStreamHandle = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration consumed by the WebSocket backend.
#[derive(Clone)]
pub struct WebsocketTransportParams {
    /// Media configuration shared with every backend.
    pub base: TransportParams,
    /// Prepend a WAV header to outgoing audio and send it as binary,
    /// bypassing the serializer.
    pub add_wav_header: bool,
    /// Wire serializer; defaults to [`JsonFrameSerializer`].
    pub serializer: Option<Arc<dyn FrameSerializer>>,
    /// Close the session after this long, firing `on_session_timeout`.
    pub session_timeout: Option<Duration>,
}

impl Default for WebsocketTransportParams {
    fn default() -> Self {
        Self {
            base: TransportParams::default(),
            add_wav_header: false,
            serializer: None,
            session_timeout: None,
        }
    }
}

impl std::fmt::Debug for WebsocketTransportParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebsocketTransportParams")
            .field("base", &self.base)
            .field("add_wav_header", &self.add_wav_header)
            .field("has_serializer", &self.serializer.is_some())
            .field("session_timeout", &self.session_timeout)
            .finish()
    }
}

/// Build a 44-byte WAV header for 16-bit PCM.
pub(crate) fn wav_header(sample_rate: u32, num_channels: u32, data_len: u32) -> Vec<u8> {
    let byte_rate = sample_rate * num_channels * 2;
    let block_align = (num_channels * 2) as u16;

    let mut header = Vec::with_capacity(44);
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&(36 + data_len).to_le_bytes());
    header.extend_from_slice(b"WAVE");
    header.extend_from_slice(b"fmt ");
    header.extend_from_slice(&16u32.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes()); // PCM
    header.extend_from_slice(&(num_channels as u16).to_le_bytes());
    header.extend_from_slice(&sample_rate.to_le_bytes());
    header.extend_from_slice(&byte_rate.to_le_bytes());
    header.extend_from_slice(&block_align.to_le_bytes());
    header.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    header.extend_from_slice(b"data");
    header.extend_from_slice(&data_len.to_le_bytes());
    header
}

/// WebSocket-backed transport.
pub struct WebsocketTransport {
    events: Arc<BaseObject>,
    params: WebsocketTransportParams,
    serializer: Arc<dyn FrameSerializer>,
    stream: Option<WebsocketStreamHandle>,
    input: Arc<Mutex<dyn FrameProcessor>>,
    output: Arc<Mutex<dyn FrameProcessor>>,
    ingress_tx: mpsc::UnboundedSender<FrameRef>,
    egress_rx: Option<mpsc::UnboundedReceiver<FrameRef>>,
    token: CancellationToken,
    tasks: JoinSet<()>,
}

impl WebsocketTransport {
    pub fn new(stream: WebsocketStreamHandle, params: WebsocketTransportParams) -> Self {
        let events = Arc::new(BaseObject::with_type_name("WebsocketTransport", None));
        events.register_event_handler("on_client_connected", true);
        events.register_event_handler("on_client_disconnected", true);
        events.register_event_handler("on_session_timeout", true);

        let serializer = params
            .serializer
            .clone()
            .unwrap_or_else(|| Arc::new(JsonFrameSerializer::new()) as Arc<dyn FrameSerializer>);

        let (ingress_tx, ingress_rx) = mpsc::unbounded_channel();
        let (egress_tx, egress_rx) = mpsc::unbounded_channel();

        let input = Arc::new(Mutex::new(TransportInputProcessor::new(
            "WebsocketInput",
            ingress_rx,
        ))) as Arc<Mutex<dyn FrameProcessor>>;
        let output = Arc::new(Mutex::new(TransportOutputProcessor::new(
            "WebsocketOutput",
            egress_tx,
            &params.base,
        ))) as Arc<Mutex<dyn FrameProcessor>>;

        Self {
            events,
            params,
            serializer,
            stream: Some(stream),
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
impl BaseTransport for WebsocketTransport {
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
        let stream = self.stream.take().ok_or(TransportError::NotConnected)?;
        let egress_rx = self.egress_rx.take().ok_or(TransportError::NotConnected)?;
        let (mut ws_sink, mut ws_stream) = stream.split();

        self.events
            .call_event_handler("on_client_connected", EventPayload::empty())
            .await;

        // Reader: wire messages -> frames -> input processor.
        let ingress_tx = self.ingress_tx.clone();
        let serializer = self.serializer.clone();
        let events = self.events.clone();
        let token = self.token.clone();
        self.tasks.spawn(async move {
            loop {
                let message = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    message = ws_stream.next() => message,
                };
                match message {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serializer.deserialize(text.as_bytes()) {
                            Some(frame) => {
                                let _ = ingress_tx.send(frame);
                            }
                            None => tracing::warn!("WebsocketTransport: undecodable text message"),
                        }
                    }
                    Some(Ok(WsMessage::Binary(data))) => match serializer.deserialize(&data) {
                        Some(frame) => {
                            let _ = ingress_tx.send(frame);
                        }
                        None => tracing::warn!("WebsocketTransport: undecodable binary message"),
                    },
                    Some(Ok(WsMessage::Close(_))) | None => {
                        tracing::debug!("WebsocketTransport: peer closed connection");
                        events
                            .call_event_handler("on_client_disconnected", EventPayload::empty())
                            .await;
                        break;
                    }
                    Some(Ok(_)) => {} // ping/pong
                    Some(Err(e)) => {
                        tracing::warn!("WebsocketTransport: read error: {}", e);
                        events
                            .call_event_handler("on_client_disconnected", EventPayload::empty())
                            .await;
                        break;
                    }
                }
            }
        });

        // Writer: frames from the output processor -> wire messages.
        let serializer = self.serializer.clone();
        let add_wav_header = self.params.add_wav_header;
        let token = self.token.clone();
        let mut egress_rx = egress_rx;
        self.tasks.spawn(async move {
            loop {
                let frame = tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        let _ = ws_sink.send(WsMessage::Close(None)).await;
                        break;
                    }
                    frame = egress_rx.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };

                if frame.downcast_ref::<EndFrame>().is_some()
                    || frame.downcast_ref::<CancelFrame>().is_some()
                {
                    let _ = ws_sink.send(WsMessage::Close(None)).await;
                    break;
                }

                let message = if add_wav_header {
                    if let Some(audio) = frame.downcast_ref::<OutputAudioRawFrame>() {
                        let mut data = wav_header(
                            audio.audio.sample_rate,
                            audio.audio.num_channels,
                            audio.audio.audio.len() as u32,
                        );
                        data.extend_from_slice(&audio.audio.audio);
                        Some(WsMessage::Binary(data))
                    } else {
                        serialized_message(serializer.as_ref(), frame.as_ref())
                    }
                } else {
                    serialized_message(serializer.as_ref(), frame.as_ref())
                };

                if let Some(message) = message {
                    if let Err(e) = ws_sink.send(message).await {
                        tracing::warn!("WebsocketTransport: write error: {}", e);
                        break;
                    }
                }
            }
        });

        // Session timeout watchdog.
        if let Some(timeout) = self.params.session_timeout {
            let events = self.events.clone();
            let token = self.token.clone();
            self.tasks.spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(timeout) => {
                        tracing::info!("WebsocketTransport: session timeout after {:?}", timeout);
                        events
                            .call_event_handler("on_session_timeout", EventPayload::empty())
                            .await;
                    }
                }
            });
        }

        Ok(())
    }

    async fn stop(&mut self, _frame: &EndFrame) -> Result<(), TransportError> {
        self.token.cancel();
        while self.tasks.join_next().await.is_some() {}
        self.events.cleanup().await;
        Ok(())
    }

    async fn cancel(&mut self, _frame: &CancelFrame) -> Result<(), TransportError> {
        self.token.cancel();
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
                backend: "websocket",
            });
        }
        self.events.add_event_handler(event_name, handler);
        Ok(())
    }
}

fn serialized_message(serializer: &dyn FrameSerializer, frame: &dyn crate::frames::Frame) -> Option<WsMessage> {
    if serializer.should_ignore_frame(frame) {
        return None;
    }
    match serializer.serialize(frame) {
        Some(SerializedFrame::Text(text)) => Some(WsMessage::Text(text)),
        Some(SerializedFrame::Binary(data)) => Some(WsMessage::Binary(data)),
        None => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
