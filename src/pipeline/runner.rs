// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Pipeline runner: runs a task to completion, optionally mapping SIGINT
//! (Ctrl-C) to task cancellation.

use crate::pipeline::task::PipelineTask;

/// Runs a [`PipelineTask`] to a terminal state.
///
/// With [`with_sigint`](PipelineRunner::with_sigint) enabled, a Ctrl-C while
/// the task is running requests ordinary cancellation (not failure) and then
/// waits for the task to wind down.
pub struct PipelineRunner {
    handle_sigint: bool,
}

impl PipelineRunner {
    /// Create a runner that does not intercept signals.
    pub fn new() -> Self {
        Self {
            handle_sigint: false,
        }
    }

    /// Enable or disable SIGINT handling.
    pub fn with_sigint(mut self, handle_sigint: bool) -> Self {
        self.handle_sigint = handle_sigint;
        self
    }

    /// Run the task until it reaches a terminal state.
    pub async fn run(&self, task: &PipelineTask) {
        if !self.handle_sigint {
            task.run().await;
            return;
        }

        let run_fut = task.run();
        tokio::pin!(run_fut);
        tokio::select! {
            _ = &mut run_fut => {}
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::warn!("PipelineRunner: failed to listen for Ctrl-C: {}", e);
                } else {
                    tracing::info!("PipelineRunner: interrupted, cancelling task");
                    task.cancel().await;
                }
                run_fut.await;
            }
        }
    }
}

impl Default for PipelineRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::sync::Mutex;

    use crate::frames::EndFrame;
    use crate::pipeline::{Pipeline, PipelineParams, PipelineTask, TaskState};
    use crate::processors::{FrameProcessor, PassthroughProcessor};

    #[tokio::test]
    async fn test_runner_runs_task_to_completion() {
        let pipeline = Pipeline::new(vec![Arc::new(Mutex::new(PassthroughProcessor::new(None)))
            as Arc<Mutex<dyn FrameProcessor>>]);
        let task = PipelineTask::new(pipeline, PipelineParams::default(), vec![]);
        task.queue_frame(Arc::new(EndFrame::new())).await;

        let runner = PipelineRunner::new();
        runner.run(&task).await;

        assert_eq!(task.state(), TaskState::Completed);
    }
}
