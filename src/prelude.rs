// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Common re-exports for convenient use of the framewire crate.
//!
//! ```
//! use framewire::prelude::*;
//! ```

pub use std::sync::Arc;

pub use crate::frames::{
    AudioRawData, CancelFrame, CancelTaskFrame, EndFrame, EndTaskFrame, ErrorFrame, Frame,
    FrameKind, FrameRef, HeartbeatFrame, ImageFormat, ImageRawData, InputAudioRawFrame,
    InputImageRawFrame, InputTransportMessageFrame, InterruptionFrame, MessagesFrame,
    OutputAudioRawFrame, OutputImageRawFrame, OutputTransportMessageFrame, SpeakFrame, StartFrame,
    TextFrame, TranscriptionFrame, UserStartedSpeakingFrame, UserStoppedSpeakingFrame,
};

pub use crate::observers::{FramePushed, Observer};
pub use crate::pipeline::{
    ParallelPipeline, Pipeline, PipelineParams, PipelineRunner, PipelineTask, TaskState,
};
pub use crate::processors::{
    drive_processor, BaseProcessor, FrameDirection, FrameProcessor, FrameProcessorSetup,
    PassthroughProcessor,
};
pub use crate::serializers::{FrameSerializer, JsonFrameSerializer, SerializedFrame};
pub use crate::transports::{
    BackendKind, BaseTransport, EventHandlerRegistry, SessionArguments, SessionArgumentsBuilder,
    TransportError, TransportFacade, TransportFacadeParams, TransportParams,
};
pub use crate::utils::base_object::{EventHandler, EventPayload};
