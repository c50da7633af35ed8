//! Response pipeline contract — the external collaborator that turns a grant
//! into spoken output.
//!
//! This core never decides *what* a persona says, only whether it may say
//! anything; generation and synthesis live behind [`ResponsePipeline`]. The
//! only requirements on an implementation: report completion or failure, and
//! stop producing output promptly when cancelled.

use crate::error::{FloorError, FloorResult};
use crate::participant::ParticipantId;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Terminal state of a synthesis invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed,
    Failed(String),
}

/// Produces spoken output for a persona that has been granted the floor.
/// Implement for the real generation + synthesis stack; use
/// [`PlaceholderPipeline`] in tests.
#[async_trait]
pub trait ResponsePipeline: Send + Sync {
    /// Start producing speech for `persona`. Returns a handle the scheduler
    /// awaits for completion or cancels on preemption.
    async fn synthesize(&self, persona: &ParticipantId) -> FloorResult<SynthesisHandle>;
}

/// Handle to an in-flight synthesis: await completion, or cancel it.
/// Cancelling is idempotent and safe after the pipeline has already finished.
pub struct SynthesisHandle {
    completion: oneshot::Receiver<PipelineOutcome>,
    cancel: CancellationToken,
}

impl SynthesisHandle {
    /// Create a handle plus the reporter half the pipeline implementation
    /// uses to signal completion and observe cancellation.
    pub fn channel() -> (Self, SynthesisReporter) {
        let (tx, rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        (
            Self {
                completion: rx,
                cancel: cancel.clone(),
            },
            SynthesisReporter { outcome: tx, cancel },
        )
    }

    /// Stop producing output. Safe to call at any point, any number of times.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the pipeline to finish. A pipeline that drops its reporter
    /// without reporting counts as a failure.
    pub async fn wait(&mut self) -> PipelineOutcome {
        match (&mut self.completion).await {
            Ok(outcome) => outcome,
            Err(_) => PipelineOutcome::Failed("pipeline dropped without reporting".to_string()),
        }
    }
}

/// The pipeline-side half of a [`SynthesisHandle`].
pub struct SynthesisReporter {
    outcome: oneshot::Sender<PipelineOutcome>,
    cancel: CancellationToken,
}

impl SynthesisReporter {
    /// Resolves when the scheduler cancels the synthesis (preemption).
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Report successful completion. Ignores a scheduler that went away.
    pub fn complete(self) {
        let _ = self.outcome.send(PipelineOutcome::Completed);
    }

    /// Report failure. The scheduler still releases the floor; this core does
    /// not retry (retry policy belongs to the pipeline itself).
    pub fn fail(self, reason: impl Into<String>) {
        let _ = self.outcome.send(PipelineOutcome::Failed(reason.into()));
    }
}

/// Placeholder pipeline: "speaks" for a fixed duration, then completes (or
/// fails, when configured). Stops immediately on cancellation.
#[derive(Debug, Clone)]
pub struct PlaceholderPipeline {
    /// How long a synthesized response "plays".
    pub duration: Duration,
    /// When set, every invocation reports failure after `duration`.
    pub fail_with: Option<String>,
}

impl PlaceholderPipeline {
    pub fn speaking_for(duration: Duration) -> Self {
        Self {
            duration,
            fail_with: None,
        }
    }

    pub fn failing_after(duration: Duration, reason: impl Into<String>) -> Self {
        Self {
            duration,
            fail_with: Some(reason.into()),
        }
    }
}

#[async_trait]
impl ResponsePipeline for PlaceholderPipeline {
    async fn synthesize(&self, persona: &ParticipantId) -> FloorResult<SynthesisHandle> {
        let (handle, reporter) = SynthesisHandle::channel();
        let duration = self.duration;
        let fail_with = self.fail_with.clone();
        let persona = persona.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => match fail_with {
                    Some(reason) => reporter.fail(reason),
                    None => reporter.complete(),
                },
                _ = reporter.cancelled() => {
                    debug!("placeholder synthesis for {} cancelled", persona);
                }
            }
        });
        Ok(handle)
    }
}

/// Pipeline that always fails to start (for wiring tests).
#[derive(Debug, Default)]
pub struct UnavailablePipeline;

#[async_trait]
impl ResponsePipeline for UnavailablePipeline {
    async fn synthesize(&self, persona: &ParticipantId) -> FloorResult<SynthesisHandle> {
        Err(FloorError::Pipeline(format!(
            "no pipeline available for {}",
            persona
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn placeholder_completes_after_duration() {
        let pipeline = PlaceholderPipeline::speaking_for(Duration::from_millis(300));
        let mut handle = pipeline.synthesize(&"alba".into()).await.unwrap();
        assert_eq!(handle.wait().await, PipelineOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_safe_after_completion() {
        let pipeline = PlaceholderPipeline::speaking_for(Duration::from_millis(10));
        let mut handle = pipeline.synthesize(&"alba".into()).await.unwrap();
        assert_eq!(handle.wait().await, PipelineOutcome::Completed);
        handle.cancel();
        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_reported_not_raised() {
        let pipeline = PlaceholderPipeline::failing_after(Duration::from_millis(10), "tts 500");
        let mut handle = pipeline.synthesize(&"alba".into()).await.unwrap();
        assert_eq!(
            handle.wait().await,
            PipelineOutcome::Failed("tts 500".to_string())
        );
    }
}
