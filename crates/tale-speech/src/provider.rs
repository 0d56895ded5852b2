use crate::error::SpeechResult;
use crate::types::{SynthesisRequest, SynthesizedAudio};
use async_trait::async_trait;

/// Trait for remote speech synthesis services
#[async_trait]
pub trait SynthesisProvider: Send + Sync {
    /// Synthesize speech for a request (required)
    ///
    /// # Arguments
    /// * `request` - Text, voice, speaking rate and encoding
    ///
    /// # Returns
    /// Encoded audio in the requested encoding
    async fn synthesize(&self, request: &SynthesisRequest) -> SpeechResult<SynthesizedAudio>;

    /// Whether a usable credential is configured. No call is issued when this is false.
    fn is_configured(&self) -> bool;

    /// Cheap authenticated round trip used by connection tests (default: Ok)
    async fn health_check(&self) -> SpeechResult<()> {
        Ok(())
    }

    /// Name used in logs
    fn provider_name(&self) -> &str;
}
