//! Capability trait seams for the three pipeline stages.

use crate::error::CapabilityError;
use async_trait::async_trait;

/// Converts audio bytes in a given language to text.
///
/// An empty (or whitespace-only) transcript means "no speech detected" and
/// is not an error.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, audio: &[u8], language: &str) -> Result<String, CapabilityError>;
}

/// Translates text between two language tags.
///
/// An empty result means the provider produced nothing usable and is not an
/// error.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, CapabilityError>;
}

/// Renders text to audio bytes in a given language.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, CapabilityError>;
}
