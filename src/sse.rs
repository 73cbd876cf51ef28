//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! This module turns the raw byte stream of a `streamGenerateContent?alt=sse` call into a stream
//! of parsed [`GenerateContentResponse`] chunks.  Any failure (network, UTF-8, JSON, or an error
//! payload sent by the server) is yielded once as a transport error and ends the stream.

use std::error;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::types::{ApiErrorBody, GenerateContentResponse};
use crate::{Error, Result};

/// Process a stream of bytes into a stream of response chunks.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<GenerateContentResponse>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: error::Error + Send + Sync + 'static,
{
    // Convert transport errors to our error type
    let stream = byte_stream.map(|result| {
        result.map_err(|e| {
            Error::transport(format!("Error in HTTP stream: {e}"), None, Some(Box::new(e)))
        })
    });

    stream::unfold(
        (stream, EventBuffer::default(), false),
        move |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }
            loop {
                // First check if we have a complete event in the buffer
                if let Some(event_text) = buffer.next_event() {
                    match parse_event(&event_text) {
                        Some(item) => {
                            let done = item.is_err();
                            return Some((item, (stream, buffer, done)));
                        }
                        None => continue,
                    }
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        if let Err(e) = buffer.push(&bytes) {
                            return Some((Err(e), (stream, buffer, true)));
                        }
                    }
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer, true)));
                    }
                    None => {
                        // End of stream; the last event may lack its blank-line terminator.
                        let rest = buffer.take_rest();
                        return parse_event(&rest).map(|item| (item, (stream, buffer, true)));
                    }
                }
            }
        },
    )
}

/// Accumulates decoded text and splits it into events.
///
/// Bytes of a multi-byte character split across network chunks wait in `pending` until the rest
/// of the character arrives.  Carriage returns are dropped so `\r\n` framing looks like `\n`.
#[derive(Debug, Default)]
struct EventBuffer {
    text: String,
    pending: Vec<u8>,
}

impl EventBuffer {
    fn push(&mut self, bytes: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(bytes);
        let valid_up_to = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                return Err(Error::transport(
                    format!("Invalid UTF-8 in stream: {e}"),
                    None,
                    Some(Box::new(e)),
                ));
            }
        };
        if let Ok(decoded) = std::str::from_utf8(&self.pending[..valid_up_to]) {
            self.text.extend(decoded.chars().filter(|c| *c != '\r'));
        }
        self.pending.drain(..valid_up_to);
        Ok(())
    }

    fn next_event(&mut self) -> Option<String> {
        let end = self.text.find("\n\n")?;
        let event: String = self.text.drain(..end + 2).collect();
        Some(event)
    }

    fn take_rest(&mut self) -> String {
        std::mem::take(&mut self.text)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StreamPayload {
    Error { error: ApiErrorBody },
    Chunk(GenerateContentResponse),
}

/// Parse one event.  Events without data (comments, keep-alives) yield `None`.
fn parse_event(event_text: &str) -> Option<Result<GenerateContentResponse>> {
    let data: Vec<&str> = event_text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();
    if data.is_empty() {
        return None;
    }
    let data = data.join("\n");
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<StreamPayload>(data) {
        Ok(StreamPayload::Chunk(chunk)) => Some(Ok(chunk)),
        Ok(StreamPayload::Error { error }) => {
            let message = error
                .message
                .or(error.status)
                .unwrap_or_else(|| "stream error".to_string());
            Some(Err(Error::transport(message, error.code, None)))
        }
        Err(e) => Some(Err(Error::transport(
            format!("Failed to parse event JSON: {e}"),
            None,
            Some(Box::new(e)),
        ))),
    }
}
