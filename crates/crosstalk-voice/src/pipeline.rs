//! Orchestration of the recognize → translate → synthesize sequence.

use crate::capability::{Recognizer, Synthesizer, Translator};
use crate::error::{CapabilityError, Stage};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// One inbound audio submission.
#[derive(Debug, Clone)]
pub struct TranslationJob {
    pub audio: Vec<u8>,
    pub source_language: String,
    pub target_language: String,
}

/// The payload of a completed job.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationResult {
    pub original_text: String,
    pub translated_text: String,
    pub audio: Vec<u8>,
}

/// How a job ended, short of a capability fault.
///
/// The two empty-result halts are ordinary outcomes, not faults: they are
/// reported to the originating session with specific wording and do not
/// count against the capability.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Complete(TranslationResult),
    NoSpeech,
    EmptyTranslation,
}

/// Resilience tunables for capability invocations.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Upper bound for a single capability invocation.
    pub stage_timeout: Duration,
    /// Retries after the first attempt, applied only to transient failures.
    pub max_retries: u32,
    /// Pause between retry attempts.
    pub retry_backoff: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// The three-stage audio translation pipeline.
pub struct TranslationPipeline {
    recognizer: Arc<dyn Recognizer>,
    translator: Arc<dyn Translator>,
    synthesizer: Arc<dyn Synthesizer>,
    config: PipelineConfig,
}

impl TranslationPipeline {
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        translator: Arc<dyn Translator>,
        synthesizer: Arc<dyn Synthesizer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            recognizer,
            translator,
            synthesizer,
            config,
        }
    }

    /// Runs one job to completion or to its first non-retryable failure.
    ///
    /// Stages run strictly in order; a halt at recognition means the
    /// translator and synthesizer are never invoked.
    pub async fn run(&self, job: &TranslationJob) -> Result<PipelineOutcome, CapabilityError> {
        let text = self
            .run_stage(Stage::Recognize, || {
                self.recognizer.recognize(&job.audio, &job.source_language)
            })
            .await?;

        if text.trim().is_empty() {
            tracing::debug!(source_language = %job.source_language, "no speech detected");
            return Ok(PipelineOutcome::NoSpeech);
        }

        let translated = self
            .run_stage(Stage::Translate, || {
                self.translator
                    .translate(&text, &job.source_language, &job.target_language)
            })
            .await?;

        if translated.trim().is_empty() {
            tracing::debug!(
                source_language = %job.source_language,
                target_language = %job.target_language,
                "translation produced no usable output"
            );
            return Ok(PipelineOutcome::EmptyTranslation);
        }

        let audio = self
            .run_stage(Stage::Synthesize, || {
                self.synthesizer.synthesize(&translated, &job.target_language)
            })
            .await?;

        Ok(PipelineOutcome::Complete(TranslationResult {
            original_text: text,
            translated_text: translated,
            audio,
        }))
    }

    /// Runs one capability invocation under the stage timeout, retrying
    /// transient failures up to the configured limit.
    async fn run_stage<T, F, Fut>(&self, stage: Stage, op: F) -> Result<T, CapabilityError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CapabilityError>>,
    {
        let mut attempt = 0u32;
        loop {
            let err = match tokio::time::timeout(self.config.stage_timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => {
                    CapabilityError::Timeout(stage, self.config.stage_timeout.as_secs())
                }
            };

            if !err.is_transient() || attempt >= self.config.max_retries {
                return Err(err);
            }
            attempt += 1;
            tracing::warn!(
                stage = %stage,
                attempt,
                "transient capability failure, retrying: {}",
                err
            );
            tokio::time::sleep(self.config.retry_backoff).await;
        }
    }
}
