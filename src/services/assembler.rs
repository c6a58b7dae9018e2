use futures::StreamExt;
use tokio::sync::mpsc;

use crate::models::Message;
use crate::providers::types::{ByteStream, StreamRecord};

/// Ordered events produced while assembling one assistant reply. Exactly one
/// terminal event (`Done` or `Error`) closes the stream.
#[derive(Debug)]
pub enum AssemblerEvent {
    /// The accumulated message after another content delta landed.
    Snapshot(Message),
    /// End of stream; carries the full accumulated message (possibly empty).
    Done(Message),
    Error(String),
}

/// Stateful UTF-8 decoder that carries incomplete trailing bytes over to the
/// next chunk instead of failing on a multi-byte sequence split across a
/// chunk boundary.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    byte_buf: Vec<u8>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much valid UTF-8 as possible, buffering any trailing
    /// incomplete sequence. Returns an empty string while a sequence is
    /// still incomplete. Invalid sequences mid-buffer are replaced with
    /// U+FFFD so one bad byte cannot stall the rest of the stream.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.byte_buf.extend_from_slice(bytes);
        let mut decoded = String::new();
        loop {
            match std::str::from_utf8(&self.byte_buf) {
                Ok(s) => {
                    decoded.push_str(s);
                    self.byte_buf.clear();
                    return decoded;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    decoded.push_str(&String::from_utf8_lossy(&self.byte_buf[..valid_up_to]));
                    match e.error_len() {
                        Some(len) => {
                            decoded.push(char::REPLACEMENT_CHARACTER);
                            self.byte_buf.drain(..valid_up_to + len);
                        }
                        None => {
                            // incomplete trailing sequence, carry to next chunk
                            self.byte_buf.drain(..valid_up_to);
                            return decoded;
                        }
                    }
                }
            }
        }
    }
}

/// Drive a chunk stream to completion, accumulating content deltas into a
/// single assistant message with a stable id and emitting a snapshot after
/// each delta. Chunks that fail to decode into a content record are skipped;
/// only a transport error aborts the stream.
pub async fn assemble(mut chunks: ByteStream, message_id: String, tx: mpsc::Sender<AssemblerEvent>) {
    let mut decoder = StreamDecoder::new();
    let mut content = String::new();
    let mut skipped: u64 = 0;

    while let Some(next) = chunks.next().await {
        let bytes = match next {
            Ok(b) => b,
            Err(e) => {
                let _ = tx.send(AssemblerEvent::Error(e.to_string())).await;
                return;
            }
        };

        let decoded = decoder.decode(&bytes);
        if decoded.is_empty() {
            continue;
        }

        match serde_json::from_str::<StreamRecord>(decoded.trim()) {
            Ok(StreamRecord::ContentBlockDelta { delta }) => {
                content.push_str(&delta.text);
                let snapshot = Message::assistant(message_id.clone(), content.clone());
                if tx.send(AssemblerEvent::Snapshot(snapshot)).await.is_err() {
                    return; // receiver dropped
                }
            }
            Ok(StreamRecord::Other) => {}
            Err(e) => {
                skipped += 1;
                tracing::warn!("Skipping unparsable stream chunk: {}", e);
            }
        }
    }

    if skipped > 0 {
        tracing::debug!("Stream finished with {} unparsable chunks skipped", skipped);
    }

    let _ = tx
        .send(AssemblerEvent::Done(Message::assistant(message_id, content)))
        .await;
}
