// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Pipeline observers: non-intrusive monitoring of frame flow.

pub mod base_observer;

pub use base_observer::{FramePushed, Observer};
