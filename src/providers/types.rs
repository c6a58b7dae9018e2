use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Message, SystemPrompt};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Rate limited: retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Everything a generation call needs: the full history including the new
/// user message, plus the active system prompt when one is configured.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<SystemPrompt>,
}

/// Ordered chunk stream returned by a generator. The transport guarantees
/// FIFO delivery; an `Err` item or the end of the stream terminates it.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProviderError>> + Send>>;

/// One structured record decoded from a stream chunk. Only content deltas
/// carry text; every other discriminator is tolerated and ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum StreamRecord {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: DeltaPayload },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct DeltaPayload {
    #[serde(default)]
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_delta_record_parses() {
        let record: StreamRecord =
            serde_json::from_str(r#"{"type":"content_block_delta","delta":{"text":"Hel"}}"#)
                .unwrap();
        match record {
            StreamRecord::ContentBlockDelta { delta } => assert_eq!(delta.text, "Hel"),
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn unknown_record_kinds_fold_into_other() {
        let record: StreamRecord =
            serde_json::from_str(r#"{"type":"message_start","message":{"id":"m1"}}"#).unwrap();
        assert!(matches!(record, StreamRecord::Other));
    }

    #[test]
    fn delta_without_text_defaults_to_empty() {
        let record: StreamRecord =
            serde_json::from_str(r#"{"type":"content_block_delta","delta":{}}"#).unwrap();
        match record {
            StreamRecord::ContentBlockDelta { delta } => assert_eq!(delta.text, ""),
            other => panic!("unexpected record: {:?}", other),
        }
    }
}
