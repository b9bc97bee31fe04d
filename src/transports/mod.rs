// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Network transports: interchangeable backends behind one facade.
//!
//! Three concrete backends move frames between the pipeline and the network:
//!
//! - [`websocket::WebsocketTransport`]: a raw WebSocket, framed through a
//!   [`crate::serializers::FrameSerializer`].
//! - [`room::RoomTransport`]: a managed room service, reached through the
//!   [`room::RoomClient`] boundary trait.
//! - [`webrtc::WebRtcTransport`]: a browser peer connection, reached through
//!   the [`webrtc::PeerConnection`] boundary trait.
//!
//! [`facade::TransportFacade`] selects exactly one of them at construction
//! from a [`facade::SessionArguments`] value and presents a single surface:
//! unified parameters, one logical event vocabulary, and input/output frame
//! processors to splice into a pipeline.

pub mod base;
pub mod error;
pub mod facade;
pub mod room;
pub mod webrtc;
pub mod websocket;

pub use base::{BaseTransport, TransportParams};
pub use error::TransportError;
pub use facade::{
    BackendKind, EventHandlerRegistry, SessionArguments, SessionArgumentsBuilder, TransportFacade,
    TransportFacadeParams,
};
