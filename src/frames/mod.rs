// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Core frame definitions for the framewire pipeline.
//!
//! All data flows as [`Frame`] trait objects through a pipeline of frame
//! processors. Frames represent data units (audio, images, text, messages)
//! and control signals. They flow **downstream** (input to output) or
//! **upstream** (acknowledgments, errors, task requests).
//!
//! Frames are immutable once created: a processor that wants to "modify" a
//! frame constructs a new one. Pipelines pass frames as [`FrameRef`]
//! (`Arc<dyn Frame>`), so fanning a frame out to parallel branches is a
//! reference-count bump, never a deep copy.
//!
//! # Frame Hierarchy
//!
//! - **System frames** ([`SystemFrameMarker`]): lifecycle and out-of-band
//!   signals, not discarded by interruptions.
//! - **Data frames** ([`DataFrameMarker`]): ordered content.
//! - **Control frames** ([`ControlFrameMarker`]): ordered control signals.
//! - **Uninterruptible** ([`UninterruptibleFrameMarker`]): mixin that
//!   prevents interruption disposal (`StartFrame`, `EndFrame`).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use downcast_rs::{impl_downcast, DowncastSync};
use serde::{Deserialize, Serialize};

use crate::utils::base_object::obj_id;

// ---------------------------------------------------------------------------
// Presentation timestamp helpers
// ---------------------------------------------------------------------------

/// Format a presentation timestamp (nanoseconds) to a human-readable string.
pub fn format_pts(pts: Option<u64>) -> String {
    match pts {
        Some(ns) => {
            let secs = ns / 1_000_000_000;
            let frac = ns % 1_000_000_000;
            format!("{}.{:09}", secs, frac)
        }
        None => "None".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Frame category enum
// ---------------------------------------------------------------------------

/// Categorizes a frame into one of the primary processing categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameKind {
    /// System frame: high-priority, not affected by interruptions.
    System,
    /// Data frame: ordered content.
    Data,
    /// Control frame: ordered control signals.
    Control,
}

// ---------------------------------------------------------------------------
// Embedded data structs (not frames themselves)
// ---------------------------------------------------------------------------

/// Raw audio data embedded in audio frame types.
#[derive(Debug, Clone)]
pub struct AudioRawData {
    /// Raw audio bytes in PCM format (16-bit signed little-endian).
    pub audio: Vec<u8>,
    /// Audio sample rate in Hz (e.g. 16000, 24000).
    pub sample_rate: u32,
    /// Number of audio channels (1 = mono, 2 = stereo).
    pub num_channels: u32,
    /// Number of audio frames (computed from audio length).
    pub num_frames: u32,
}

impl AudioRawData {
    /// Create new audio data, computing `num_frames` automatically.
    pub fn new(audio: Vec<u8>, sample_rate: u32, num_channels: u32) -> Self {
        let num_frames = if num_channels > 0 {
            let bytes_per_frame = (num_channels as usize).saturating_mul(2);
            if bytes_per_frame > 0 {
                (audio.len() / bytes_per_frame).min(u32::MAX as usize) as u32
            } else {
                0
            }
        } else {
            0
        };
        Self {
            audio,
            sample_rate,
            num_channels,
            num_frames,
        }
    }
}

/// Pixel format of a raw image frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    Rgb,
    Rgba,
    Jpeg,
    Png,
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::Rgb => write!(f, "RGB"),
            ImageFormat::Rgba => write!(f, "RGBA"),
            ImageFormat::Jpeg => write!(f, "JPEG"),
            ImageFormat::Png => write!(f, "PNG"),
        }
    }
}

/// Raw image data embedded in image frame types.
#[derive(Debug, Clone)]
pub struct ImageRawData {
    /// Raw image bytes.
    pub image: Vec<u8>,
    /// Image dimensions as (width, height).
    pub size: (u32, u32),
    /// Pixel format of the image bytes.
    pub format: ImageFormat,
}

impl ImageRawData {
    pub fn new(image: Vec<u8>, size: (u32, u32), format: ImageFormat) -> Self {
        Self {
            image,
            size,
            format,
        }
    }
}

// ---------------------------------------------------------------------------
// Frame trait and marker traits
// ---------------------------------------------------------------------------

/// Core trait implemented by all frame types in the pipeline.
///
/// Every frame has a unique [`id`](Frame::id), a human-readable
/// [`name`](Frame::name), an optional presentation timestamp
/// ([`pts`](Frame::pts)), and metadata.
pub trait Frame: DowncastSync + fmt::Debug + fmt::Display + Send + Sync {
    /// Unique numeric identifier for this frame instance.
    fn id(&self) -> u64;

    /// Human-readable name (e.g. `"TextFrame"`).
    fn name(&self) -> &str;

    /// Presentation timestamp in nanoseconds, or `None`.
    fn pts(&self) -> Option<u64>;

    /// Arbitrary key-value metadata.
    fn metadata(&self) -> &HashMap<String, serde_json::Value>;

    /// Name of the transport source that created this frame.
    fn transport_source(&self) -> Option<&str>;

    /// Name of the transport destination for this frame.
    fn transport_destination(&self) -> Option<&str>;

    /// Returns `true` if this is a system frame.
    fn is_system_frame(&self) -> bool {
        false
    }

    /// Returns `true` if this is a data frame.
    fn is_data_frame(&self) -> bool {
        false
    }

    /// Returns `true` if this is a control frame.
    fn is_control_frame(&self) -> bool {
        false
    }

    /// Returns `true` if this frame must not be discarded during interruptions.
    fn is_uninterruptible(&self) -> bool {
        false
    }

    /// Returns the [`FrameKind`] for this frame.
    fn kind(&self) -> FrameKind {
        if self.is_system_frame() {
            FrameKind::System
        } else if self.is_data_frame() {
            FrameKind::Data
        } else {
            FrameKind::Control
        }
    }
}

impl_downcast!(sync Frame);

/// Marker trait for system frames: high-priority, not affected by interruptions.
pub trait SystemFrameMarker: Frame {}

/// Marker trait for data frames: ordered content.
pub trait DataFrameMarker: Frame {}

/// Marker trait for control frames: ordered control signals.
pub trait ControlFrameMarker: Frame {}

/// Marker trait for frames that must not be discarded during interruptions.
pub trait UninterruptibleFrameMarker: Frame {}

/// A thread-safe, reference-counted frame for passing through pipelines.
pub type FrameRef = Arc<dyn Frame>;

// ---------------------------------------------------------------------------
// Common base fields for all frames
// ---------------------------------------------------------------------------

/// Transport source/destination info, boxed to save space when unused.
#[derive(Debug, Clone, Default)]
pub struct TransportInfo {
    /// Name of the transport source that created this frame.
    pub source: Option<String>,
    /// Name of the transport destination for this frame.
    pub destination: Option<String>,
}

/// Returns a reference to a static empty metadata HashMap.
fn empty_metadata() -> &'static HashMap<String, serde_json::Value> {
    use std::sync::OnceLock;
    static EMPTY: OnceLock<HashMap<String, serde_json::Value>> = OnceLock::new();
    EMPTY.get_or_init(HashMap::new)
}

/// Common fields stored in every frame struct via the declaration macros.
///
/// Frames are immutable after construction, so optional fields are set
/// through the builder-style `with_*` methods before the frame enters the
/// pipeline. `metadata` and `transport` are lazily boxed to keep the struct
/// small when unused.
#[derive(Debug, Clone)]
pub struct FrameFields {
    pub id: u64,
    pub pts: Option<u64>,
    pub metadata: Option<Box<HashMap<String, serde_json::Value>>>,
    pub transport: Option<Box<TransportInfo>>,
}

impl FrameFields {
    /// Create a new `FrameFields` with a unique ID.
    pub fn new() -> Self {
        Self {
            id: obj_id(),
            pts: None,
            metadata: None,
            transport: None,
        }
    }

    /// Set the presentation timestamp (builder style, pre-publication).
    pub fn with_pts(mut self, pts: u64) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Set the transport source name (builder style, pre-publication).
    pub fn with_transport_source(mut self, source: impl Into<String>) -> Self {
        self.transport
            .get_or_insert_with(|| Box::new(TransportInfo::default()))
            .source = Some(source.into());
        self
    }

    /// Set the transport destination name (builder style, pre-publication).
    pub fn with_transport_destination(mut self, dest: impl Into<String>) -> Self {
        self.transport
            .get_or_insert_with(|| Box::new(TransportInfo::default()))
            .destination = Some(dest.into());
        self
    }
}

impl Default for FrameFields {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Macros for reducing frame boilerplate
// ---------------------------------------------------------------------------

/// Internal macro: implements the Frame trait delegating to `self.fields`.
macro_rules! impl_frame_trait {
    ($name:ident) => {
        fn id(&self) -> u64 {
            self.fields.id
        }
        fn name(&self) -> &str {
            stringify!($name)
        }
        fn pts(&self) -> Option<u64> {
            self.fields.pts
        }
        fn metadata(&self) -> &HashMap<String, serde_json::Value> {
            self.fields
                .metadata
                .as_deref()
                .unwrap_or_else(|| empty_metadata())
        }
        fn transport_source(&self) -> Option<&str> {
            self.fields
                .transport
                .as_ref()
                .and_then(|t| t.source.as_deref())
        }
        fn transport_destination(&self) -> Option<&str> {
            self.fields
                .transport
                .as_ref()
                .and_then(|t| t.destination.as_deref())
        }
    };
}

/// Implements Frame + marker traits for a system frame.
macro_rules! impl_system_frame {
    ($name:ident) => {
        impl Frame for $name {
            impl_frame_trait!($name);
            fn is_system_frame(&self) -> bool {
                true
            }
        }
        impl SystemFrameMarker for $name {}
    };
}

/// Implements Frame + marker traits for a data frame.
macro_rules! impl_data_frame {
    ($name:ident) => {
        impl Frame for $name {
            impl_frame_trait!($name);
            fn is_data_frame(&self) -> bool {
                true
            }
        }
        impl DataFrameMarker for $name {}
    };
}

/// Implements Frame + marker traits for a control frame.
macro_rules! impl_control_frame {
    ($name:ident) => {
        impl Frame for $name {
            impl_frame_trait!($name);
            fn is_control_frame(&self) -> bool {
                true
            }
        }
        impl ControlFrameMarker for $name {}
    };
}

/// Implements Frame + marker traits for a control + uninterruptible frame.
macro_rules! impl_control_uninterruptible_frame {
    ($name:ident) => {
        impl Frame for $name {
            impl_frame_trait!($name);
            fn is_control_frame(&self) -> bool {
                true
            }
            fn is_uninterruptible(&self) -> bool {
                true
            }
        }
        impl ControlFrameMarker for $name {}
        impl UninterruptibleFrameMarker for $name {}
    };
}

/// Default Display implementation showing just the frame name.
macro_rules! impl_frame_display_simple {
    ($name:ident) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", stringify!($name))
            }
        }
    };
}

/// Declares a payload-less frame struct with only `fields`, plus new()/Default.
macro_rules! declare_simple_frame {
    ($(#[$meta:meta])* $name:ident, system) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name {
            pub fields: FrameFields,
        }
        impl $name {
            pub fn new() -> Self {
                Self { fields: FrameFields::new() }
            }
        }
        impl Default for $name {
            fn default() -> Self { Self::new() }
        }
        impl_frame_display_simple!($name);
        impl_system_frame!($name);
    };
    ($(#[$meta:meta])* $name:ident, control_uninterruptible) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name {
            pub fields: FrameFields,
        }
        impl $name {
            pub fn new() -> Self {
                Self { fields: FrameFields::new() }
            }
        }
        impl Default for $name {
            fn default() -> Self { Self::new() }
        }
        impl_frame_display_simple!($name);
        impl_control_uninterruptible_frame!($name);
    };
}

// =========================================================================
// SYSTEM FRAMES
// =========================================================================

/// Initial frame to start pipeline processing.
///
/// This is the first frame pushed down a pipeline to initialize all
/// processors with their configuration parameters.
#[derive(Debug)]
pub struct StartFrame {
    pub fields: FrameFields,
    /// Input audio sample rate in Hz.
    pub audio_in_sample_rate: u32,
    /// Output audio sample rate in Hz.
    pub audio_out_sample_rate: u32,
    /// Whether to allow user interruptions.
    pub allow_interruptions: bool,
}

impl StartFrame {
    pub fn new(audio_in_sample_rate: u32, audio_out_sample_rate: u32, allow_interruptions: bool) -> Self {
        Self {
            fields: FrameFields::new(),
            audio_in_sample_rate,
            audio_out_sample_rate,
            allow_interruptions,
        }
    }
}

impl Default for StartFrame {
    fn default() -> Self {
        Self::new(16000, 24000, false)
    }
}

impl_frame_display_simple!(StartFrame);

// StartFrame is system + uninterruptible (must never be dropped).
impl Frame for StartFrame {
    impl_frame_trait!(StartFrame);
    fn is_system_frame(&self) -> bool {
        true
    }
    fn is_uninterruptible(&self) -> bool {
        true
    }
}
impl SystemFrameMarker for StartFrame {}
impl UninterruptibleFrameMarker for StartFrame {}

/// Frame requesting immediate pipeline cancellation.
#[derive(Debug)]
pub struct CancelFrame {
    pub fields: FrameFields,
    /// Optional reason for the cancellation.
    pub reason: Option<String>,
}

impl CancelFrame {
    pub fn new(reason: Option<String>) -> Self {
        Self {
            fields: FrameFields::new(),
            reason,
        }
    }
}

impl Default for CancelFrame {
    fn default() -> Self {
        Self::new(None)
    }
}

impl fmt::Display for CancelFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(reason: {:?})", self.name(), self.reason)
    }
}

impl_system_frame!(CancelFrame);

/// Error notification frame.
///
/// Notifies upstream that an error has occurred downstream. A fatal error
/// indicates the error is unrecoverable and fails the enclosing task.
#[derive(Debug)]
pub struct ErrorFrame {
    pub fields: FrameFields,
    /// Description of the error.
    pub error: String,
    /// Whether the error is fatal and requires shutdown.
    pub fatal: bool,
}

impl ErrorFrame {
    pub fn new(error: impl Into<String>, fatal: bool) -> Self {
        Self {
            fields: FrameFields::new(),
            error: error.into(),
            fatal,
        }
    }

    /// Convenience constructor for non-fatal errors.
    pub fn non_fatal(error: impl Into<String>) -> Self {
        Self::new(error, false)
    }
}

impl fmt::Display for ErrorFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(error: {}, fatal: {})", self.name(), self.error, self.fatal)
    }
}

impl_system_frame!(ErrorFrame);

declare_simple_frame!(
    /// Signals that the user interrupted in-flight output (e.g. started
    /// speaking while synthesis was playing). Suppressed by the pipeline
    /// task when interruptions are disallowed.
    InterruptionFrame,
    system
);

declare_simple_frame!(
    /// Emitted when the user starts speaking.
    UserStartedSpeakingFrame,
    system
);

declare_simple_frame!(
    /// Emitted when the user stops speaking.
    UserStoppedSpeakingFrame,
    system
);

declare_simple_frame!(
    /// Upstream request for the task to end the pipeline gracefully.
    EndTaskFrame,
    system
);

declare_simple_frame!(
    /// Upstream request for the task to cancel the pipeline immediately.
    CancelTaskFrame,
    system
);

/// Raw audio input from a transport.
#[derive(Debug)]
pub struct InputAudioRawFrame {
    pub fields: FrameFields,
    pub audio: AudioRawData,
}

impl InputAudioRawFrame {
    pub fn new(audio: Vec<u8>, sample_rate: u32, num_channels: u32) -> Self {
        Self {
            fields: FrameFields::new(),
            audio: AudioRawData::new(audio, sample_rate, num_channels),
        }
    }
}

impl fmt::Display for InputAudioRawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(frames: {}, rate: {}, channels: {})",
            self.name(),
            self.audio.num_frames,
            self.audio.sample_rate,
            self.audio.num_channels
        )
    }
}

impl_system_frame!(InputAudioRawFrame);

/// Raw image input from a transport.
#[derive(Debug)]
pub struct InputImageRawFrame {
    pub fields: FrameFields,
    pub image: ImageRawData,
}

impl InputImageRawFrame {
    pub fn new(image: Vec<u8>, size: (u32, u32), format: ImageFormat) -> Self {
        Self {
            fields: FrameFields::new(),
            image: ImageRawData::new(image, size, format),
        }
    }
}

impl fmt::Display for InputImageRawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(size: {}x{}, format: {})",
            self.name(),
            self.image.size.0,
            self.image.size.1,
            self.image.format
        )
    }
}

impl_system_frame!(InputImageRawFrame);

/// Application message received from a transport.
#[derive(Debug)]
pub struct InputTransportMessageFrame {
    pub fields: FrameFields,
    pub message: serde_json::Value,
}

impl InputTransportMessageFrame {
    pub fn new(message: serde_json::Value) -> Self {
        Self {
            fields: FrameFields::new(),
            message,
        }
    }
}

impl_frame_display_simple!(InputTransportMessageFrame);
impl_system_frame!(InputTransportMessageFrame);

/// Test-only frame used by the test harness to insert a delay between
/// queued frames. Never produced by pipeline components.
#[derive(Debug)]
pub struct SleepFrame {
    pub fields: FrameFields,
    /// How long to sleep, in seconds.
    pub sleep_secs: f64,
}

impl SleepFrame {
    pub fn new(sleep_secs: f64) -> Self {
        Self {
            fields: FrameFields::new(),
            sleep_secs,
        }
    }
}

impl_frame_display_simple!(SleepFrame);
impl_system_frame!(SleepFrame);

// =========================================================================
// DATA FRAMES
// =========================================================================

/// Text data flowing through the pipeline.
#[derive(Debug)]
pub struct TextFrame {
    pub fields: FrameFields,
    pub text: String,
}

impl TextFrame {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            fields: FrameFields::new(),
            text: text.into(),
        }
    }
}

impl fmt::Display for TextFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(text: {})", self.name(), self.text)
    }
}

impl_data_frame!(TextFrame);

/// Text that should be spoken by a speech-synthesis stage.
#[derive(Debug)]
pub struct SpeakFrame {
    pub fields: FrameFields,
    pub text: String,
}

impl SpeakFrame {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            fields: FrameFields::new(),
            text: text.into(),
        }
    }
}

impl fmt::Display for SpeakFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(text: {})", self.name(), self.text)
    }
}

impl_data_frame!(SpeakFrame);

/// An ordered list of conversation messages.
#[derive(Debug)]
pub struct MessagesFrame {
    pub fields: FrameFields,
    /// Messages in conversation order.
    pub messages: Vec<serde_json::Value>,
}

impl MessagesFrame {
    pub fn new(messages: Vec<serde_json::Value>) -> Self {
        Self {
            fields: FrameFields::new(),
            messages,
        }
    }
}

impl fmt::Display for MessagesFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(messages: {})", self.name(), self.messages.len())
    }
}

impl_data_frame!(MessagesFrame);

/// Raw audio output for a transport.
#[derive(Debug)]
pub struct OutputAudioRawFrame {
    pub fields: FrameFields,
    pub audio: AudioRawData,
}

impl OutputAudioRawFrame {
    pub fn new(audio: Vec<u8>, sample_rate: u32, num_channels: u32) -> Self {
        Self {
            fields: FrameFields::new(),
            audio: AudioRawData::new(audio, sample_rate, num_channels),
        }
    }
}

impl fmt::Display for OutputAudioRawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(frames: {}, rate: {}, channels: {})",
            self.name(),
            self.audio.num_frames,
            self.audio.sample_rate,
            self.audio.num_channels
        )
    }
}

impl_data_frame!(OutputAudioRawFrame);

/// Raw image output for a transport.
#[derive(Debug)]
pub struct OutputImageRawFrame {
    pub fields: FrameFields,
    pub image: ImageRawData,
}

impl OutputImageRawFrame {
    pub fn new(image: Vec<u8>, size: (u32, u32), format: ImageFormat) -> Self {
        Self {
            fields: FrameFields::new(),
            image: ImageRawData::new(image, size, format),
        }
    }
}

impl fmt::Display for OutputImageRawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(size: {}x{}, format: {})",
            self.name(),
            self.image.size.0,
            self.image.size.1,
            self.image.format
        )
    }
}

impl_data_frame!(OutputImageRawFrame);

/// Final transcription of user speech.
#[derive(Debug)]
pub struct TranscriptionFrame {
    pub fields: FrameFields,
    pub text: String,
    pub user_id: String,
    pub timestamp: String,
    pub language: Option<String>,
}

impl TranscriptionFrame {
    pub fn new(text: String, user_id: String, timestamp: String) -> Self {
        Self {
            fields: FrameFields::new(),
            text,
            user_id,
            timestamp,
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

impl fmt::Display for TranscriptionFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(user: {}, text: {})",
            self.name(),
            self.user_id,
            self.text
        )
    }
}

impl_data_frame!(TranscriptionFrame);

/// Application message to be sent through a transport.
#[derive(Debug)]
pub struct OutputTransportMessageFrame {
    pub fields: FrameFields,
    pub message: serde_json::Value,
}

impl OutputTransportMessageFrame {
    pub fn new(message: serde_json::Value) -> Self {
        Self {
            fields: FrameFields::new(),
            message,
        }
    }
}

impl_frame_display_simple!(OutputTransportMessageFrame);
impl_data_frame!(OutputTransportMessageFrame);

// =========================================================================
// CONTROL FRAMES
// =========================================================================

declare_simple_frame!(
    /// Graceful pipeline shutdown. Travels the full length of the pipeline
    /// (and every parallel branch) before the task reports completion.
    EndFrame,
    control_uninterruptible
);

/// Pipeline health heartbeat, emitted periodically by the task driver.
#[derive(Debug)]
pub struct HeartbeatFrame {
    pub fields: FrameFields,
    /// Wall-clock time at emission, in milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl HeartbeatFrame {
    pub fn new(timestamp: u64) -> Self {
        Self {
            fields: FrameFields::new(),
            timestamp,
        }
    }
}

impl_frame_display_simple!(HeartbeatFrame);
impl_control_frame!(HeartbeatFrame);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
