//! Audio translation pipeline for the Crosstalk platform.
//!
//! Routes one audio clip through three ordered external capabilities:
//! speech recognition, text translation, and speech synthesis. Each
//! capability sits behind a trait seam so the pipeline can be exercised
//! with fakes in tests and rewired to different providers in production.
//!
//! Capability faults are typed ([`CapabilityError`]) and propagate to the
//! dispatcher, which decides the client-visible wording; empty recognition
//! or translation results are distinguishable non-fault halts
//! ([`PipelineOutcome::NoSpeech`], [`PipelineOutcome::EmptyTranslation`]).
//! Every stage runs under a bounded timeout with limited retries on
//! transient failures, so a stalled provider stalls one job, briefly, not
//! forever.

mod capability;
mod error;
mod pipeline;
mod stt;
mod translate;
mod tts;

pub use capability::{Recognizer, Synthesizer, Translator};
pub use error::{CapabilityError, Stage};
pub use pipeline::{
    PipelineConfig, PipelineOutcome, TranslationJob, TranslationPipeline, TranslationResult,
};
pub use stt::WhisperRecognizer;
pub use translate::HttpTranslator;
pub use tts::PiperSynthesizer;
