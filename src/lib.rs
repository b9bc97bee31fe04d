// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! framewire - real-time multimodal frame pipelines with interchangeable
//! network transports.
//!
//! framewire streams audio, video, text and control signals through
//! composable processing pipelines. Frames flow through ordered chains of
//! processors -- optionally fanned out across concurrent parallel branches
//! -- while a transport facade lets the pipeline address one logical
//! transport whose concrete backend (WebSocket, managed room, peer
//! connection) is selected at runtime.

pub mod frames;
pub mod observers;
pub mod pipeline;
pub mod prelude;
pub mod processors;
pub mod serializers;
pub mod tests;
pub mod transports;
pub mod utils;
