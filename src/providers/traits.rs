use async_trait::async_trait;

use super::types::{ByteStream, GenerationRequest, ProviderError};

/// The remote generation call. Failing to return a readable stream is fatal
/// for the turn; errors inside the returned stream are handled downstream.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<ByteStream, ProviderError>;
}
