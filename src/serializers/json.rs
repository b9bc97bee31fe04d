// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! JSON-based frame serializer.
//!
//! Provides serialization and deserialization of common pipeline frames
//! to and from JSON. Audio data is base64-encoded within the JSON payload.
//!
//! # Wire format
//!
//! Each serialized message is a JSON object with a `type` field that
//! identifies the frame kind, plus frame-specific fields:
//!
//! ```json
//! { "type": "text", "text": "Hello world" }
//! { "type": "speak", "text": "Say this" }
//! { "type": "transcription", "text": "...", "user_id": "...", "timestamp": "..." }
//! { "type": "audio_input",  "audio": "<base64>", "sample_rate": 16000, "num_channels": 1 }
//! { "type": "audio_output", "audio": "<base64>", "sample_rate": 16000, "num_channels": 1 }
//! { "type": "message_input",  "message": { ... } }
//! { "type": "message_output", "message": { ... } }
//! { "type": "start", "audio_in_sample_rate": 16000, "audio_out_sample_rate": 24000, "allow_interruptions": false }
//! { "type": "end" }
//! { "type": "cancel" }
//! { "type": "error", "error": "...", "fatal": false }
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::frames::*;
use crate::serializers::{FrameSerializer, SerializedFrame};
use crate::utils::helpers::{decode_base64, encode_base64};

/// A JSON frame serializer for common framewire frame types.
///
/// Supports `TextFrame`, `SpeakFrame`, `TranscriptionFrame`,
/// `InputAudioRawFrame`, `OutputAudioRawFrame`, `InputTransportMessageFrame`,
/// `OutputTransportMessageFrame`, `StartFrame`, `EndFrame`, `CancelFrame`,
/// and `ErrorFrame`.
///
/// Audio bytes are base64-encoded in the JSON payload to keep the format
/// text-safe for WebSocket text messages.
#[derive(Debug)]
pub struct JsonFrameSerializer;

impl JsonFrameSerializer {
    /// Create a new JSON frame serializer.
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonFrameSerializer {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Internal wire-format types
// ---------------------------------------------------------------------------

/// Envelope used when serializing frames to JSON (borrows the type string).
#[derive(Serialize)]
struct WireFrameOut<'a> {
    #[serde(rename = "type")]
    frame_type: &'a str,
    #[serde(flatten)]
    payload: serde_json::Value,
}

/// Envelope used when deserializing frames from JSON (owned type string).
#[derive(Deserialize)]
struct WireFrameIn {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(flatten)]
    payload: serde_json::Value,
}

#[derive(Serialize)]
struct WireTranscriptionOut<'a> {
    text: &'a str,
    user_id: &'a str,
    timestamp: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

#[derive(Deserialize)]
struct WireTranscriptionIn {
    text: String,
    user_id: String,
    timestamp: String,
    #[serde(default)]
    language: Option<String>,
}

/// Audio payload (base64 string is always freshly allocated).
#[derive(Serialize, Deserialize)]
struct WireAudio {
    /// Base64-encoded PCM audio bytes.
    audio: String,
    sample_rate: u32,
    num_channels: u32,
}

#[derive(Serialize, Deserialize)]
struct WireStart {
    audio_in_sample_rate: u32,
    audio_out_sample_rate: u32,
    allow_interruptions: bool,
}

#[derive(Deserialize)]
struct WireCancelIn {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct WireErrorIn {
    error: String,
    fatal: bool,
}

#[derive(Deserialize)]
struct WireMessageIn {
    message: serde_json::Value,
}

// ---------------------------------------------------------------------------
// FrameSerializer implementation
// ---------------------------------------------------------------------------

impl FrameSerializer for JsonFrameSerializer {
    fn serialize(&self, frame: &dyn Frame) -> Option<SerializedFrame> {
        let json_str = serialize_frame_to_json(frame)?;
        Some(SerializedFrame::Text(json_str))
    }

    fn deserialize(&self, data: &[u8]) -> Option<FrameRef> {
        let text = std::str::from_utf8(data).ok()?;
        deserialize_frame_from_json(text)
    }
}

/// Serialize a frame reference to a JSON string.
///
/// Returns `None` if the frame type is not supported. Uses the `json!` macro
/// for simple frames (Text, Speak, End, Cancel, Error) and struct-based
/// serialization for complex frames (Audio, Transcription, Start).
fn serialize_frame_to_json(frame: &dyn Frame) -> Option<String> {
    if let Some(f) = frame.downcast_ref::<TextFrame>() {
        let json = serde_json::json!({
            "type": "text",
            "text": &f.text,
        });
        return serde_json::to_string(&json).ok();
    }

    if let Some(f) = frame.downcast_ref::<SpeakFrame>() {
        let json = serde_json::json!({
            "type": "speak",
            "text": &f.text,
        });
        return serde_json::to_string(&json).ok();
    }

    if let Some(f) = frame.downcast_ref::<TranscriptionFrame>() {
        let wire = WireFrameOut {
            frame_type: "transcription",
            payload: serde_json::to_value(WireTranscriptionOut {
                text: &f.text,
                user_id: &f.user_id,
                timestamp: &f.timestamp,
                language: f.language.as_deref(),
            })
            .ok()?,
        };
        return serde_json::to_string(&wire).ok();
    }

    if let Some(f) = frame.downcast_ref::<InputAudioRawFrame>() {
        let wire = WireFrameOut {
            frame_type: "audio_input",
            payload: serde_json::to_value(WireAudio {
                audio: encode_base64(&f.audio.audio),
                sample_rate: f.audio.sample_rate,
                num_channels: f.audio.num_channels,
            })
            .ok()?,
        };
        return serde_json::to_string(&wire).ok();
    }

    if let Some(f) = frame.downcast_ref::<OutputAudioRawFrame>() {
        let wire = WireFrameOut {
            frame_type: "audio_output",
            payload: serde_json::to_value(WireAudio {
                audio: encode_base64(&f.audio.audio),
                sample_rate: f.audio.sample_rate,
                num_channels: f.audio.num_channels,
            })
            .ok()?,
        };
        return serde_json::to_string(&wire).ok();
    }

    if let Some(f) = frame.downcast_ref::<InputTransportMessageFrame>() {
        let json = serde_json::json!({
            "type": "message_input",
            "message": &f.message,
        });
        return serde_json::to_string(&json).ok();
    }

    if let Some(f) = frame.downcast_ref::<OutputTransportMessageFrame>() {
        let json = serde_json::json!({
            "type": "message_output",
            "message": &f.message,
        });
        return serde_json::to_string(&json).ok();
    }

    if let Some(f) = frame.downcast_ref::<StartFrame>() {
        let wire = WireFrameOut {
            frame_type: "start",
            payload: serde_json::to_value(WireStart {
                audio_in_sample_rate: f.audio_in_sample_rate,
                audio_out_sample_rate: f.audio_out_sample_rate,
                allow_interruptions: f.allow_interruptions,
            })
            .ok()?,
        };
        return serde_json::to_string(&wire).ok();
    }

    if frame.downcast_ref::<EndFrame>().is_some() {
        let json = serde_json::json!({ "type": "end" });
        return serde_json::to_string(&json).ok();
    }

    if let Some(f) = frame.downcast_ref::<CancelFrame>() {
        let json = serde_json::json!({
            "type": "cancel",
            "reason": f.reason.as_deref(),
        });
        return serde_json::to_string(&json).ok();
    }

    if let Some(f) = frame.downcast_ref::<ErrorFrame>() {
        let json = serde_json::json!({
            "type": "error",
            "error": &f.error,
            "fatal": f.fatal,
        });
        return serde_json::to_string(&json).ok();
    }

    warn!(
        "JsonFrameSerializer: unsupported frame type '{}'",
        frame.name()
    );
    None
}

/// Deserialize a JSON string to a pipeline frame.
///
/// Returns `None` if the JSON is malformed or the frame type is unknown.
fn deserialize_frame_from_json(text: &str) -> Option<FrameRef> {
    let wire: WireFrameIn = serde_json::from_str(text).ok()?;

    match wire.frame_type.as_str() {
        "text" => {
            let text_val = wire.payload.get("text")?.as_str()?;
            Some(Arc::new(TextFrame::new(text_val.to_owned())) as FrameRef)
        }
        "speak" => {
            let text_val = wire.payload.get("text")?.as_str()?;
            Some(Arc::new(SpeakFrame::new(text_val.to_owned())) as FrameRef)
        }
        "transcription" => {
            let w: WireTranscriptionIn = serde_json::from_value(wire.payload).ok()?;
            let mut frame = TranscriptionFrame::new(w.text, w.user_id, w.timestamp);
            frame.language = w.language;
            Some(Arc::new(frame) as FrameRef)
        }
        "audio_input" => {
            let w: WireAudio = serde_json::from_value(wire.payload).ok()?;
            let audio = decode_base64(&w.audio)?;
            Some(Arc::new(InputAudioRawFrame::new(audio, w.sample_rate, w.num_channels)) as FrameRef)
        }
        "audio_output" => {
            let w: WireAudio = serde_json::from_value(wire.payload).ok()?;
            let audio = decode_base64(&w.audio)?;
            Some(
                Arc::new(OutputAudioRawFrame::new(audio, w.sample_rate, w.num_channels)) as FrameRef,
            )
        }
        "message_input" => {
            let w: WireMessageIn = serde_json::from_value(wire.payload).ok()?;
            Some(Arc::new(InputTransportMessageFrame::new(w.message)) as FrameRef)
        }
        "message_output" => {
            let w: WireMessageIn = serde_json::from_value(wire.payload).ok()?;
            Some(Arc::new(OutputTransportMessageFrame::new(w.message)) as FrameRef)
        }
        "start" => {
            let w: WireStart = serde_json::from_value(wire.payload).ok()?;
            Some(Arc::new(StartFrame::new(
                w.audio_in_sample_rate,
                w.audio_out_sample_rate,
                w.allow_interruptions,
            )) as FrameRef)
        }
        "end" => Some(Arc::new(EndFrame::new()) as FrameRef),
        "cancel" => {
            let w: WireCancelIn = serde_json::from_value(wire.payload).ok()?;
            Some(Arc::new(CancelFrame::new(w.reason)) as FrameRef)
        }
        "error" => {
            let w: WireErrorIn = serde_json::from_value(wire.payload).ok()?;
            Some(Arc::new(ErrorFrame::new(w.error, w.fatal)) as FrameRef)
        }
        other => {
            warn!("JsonFrameSerializer: unknown frame type '{}'", other);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
