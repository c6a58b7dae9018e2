use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};

use crate::providers::types::{ByteStream, ProviderError};

struct FrameState<E> {
    source: BoxStream<'static, Result<Bytes, E>>,
    buf: Vec<u8>,
    done: bool,
}

/// Reframe an SSE body into one chunk per `data:` payload, so every chunk
/// handed to the assembler is a single structured record. Event boundaries
/// are blank lines; `event:` and comment lines are dropped.
pub fn sse_data_stream<S, E>(source: S) -> ByteStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = FrameState {
        source: source.boxed(),
        buf: Vec::new(),
        done: false,
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
        loop {
            if st.done {
                return None;
            }
            if let Some(payload) = next_payload(&mut st.buf) {
                return Some((Ok(payload), st));
            }
            match st.source.next().await {
                Some(Ok(bytes)) => st.buf.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(ProviderError::NetworkError(e.to_string())), st));
                }
                None => {
                    st.done = true;
                    // A final event may arrive without a trailing blank line.
                    let rest = std::mem::take(&mut st.buf);
                    match payload_from_frame(&rest) {
                        Some(payload) => return Some((Ok(payload), st)),
                        None => return None,
                    }
                }
            }
        }
    }))
}

fn next_payload(buf: &mut Vec<u8>) -> Option<Bytes> {
    loop {
        let pos = buf.windows(2).position(|w| w == b"\n\n")?;
        let frame: Vec<u8> = buf.drain(..pos + 2).collect();
        if let Some(payload) = payload_from_frame(&frame) {
            return Some(payload);
        }
    }
}

fn payload_from_frame(frame: &[u8]) -> Option<Bytes> {
    let text = String::from_utf8_lossy(frame);
    let mut data = String::new();
    for line in text.lines() {
        if let Some(payload) = line.strip_prefix("data: ") {
            data.push_str(payload);
        } else if let Some(payload) = line.strip_prefix("data:") {
            data.push_str(payload);
        }
    }
    if data.is_empty() {
        None
    } else {
        Some(Bytes::from(data))
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Bytes, Infallible>> {
        futures::stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from(p.to_string())))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect(stream: ByteStream) -> Vec<String> {
        stream
            .map(|item| String::from_utf8(item.unwrap().to_vec()).unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn splits_events_on_blank_lines() {
        let body = chunks(&[
            "event: content_block_delta\ndata: {\"a\":1}\n\n",
            "data: {\"b\":2}\n\n",
        ]);
        let payloads = collect(sse_data_stream(body)).await;
        assert_eq!(payloads, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[tokio::test]
    async fn reassembles_events_split_across_chunks() {
        let body = chunks(&["data: {\"a\"", ":1}\n", "\ndata: {\"b\":2}\n\n"]);
        let payloads = collect(sse_data_stream(body)).await;
        assert_eq!(payloads, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[tokio::test]
    async fn flushes_trailing_event_without_blank_line() {
        let body = chunks(&["data: {\"a\":1}"]);
        let payloads = collect(sse_data_stream(body)).await;
        assert_eq!(payloads, vec![r#"{"a":1}"#]);
    }

    #[tokio::test]
    async fn skips_frames_without_data_lines() {
        let body = chunks(&[": keepalive\n\n", "event: ping\n\n", "data: x\n\n"]);
        let payloads = collect(sse_data_stream(body)).await;
        assert_eq!(payloads, vec!["x"]);
    }
}
