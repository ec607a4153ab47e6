//! Server-push discovery stream
//!
//! The server writes `data: <descriptor json>` frames as nodes answer and a
//! final `event: done` frame once the probe window closes.

use std::collections::VecDeque;
use std::pin::Pin;

use futures::stream::{self, BoxStream, Stream, StreamExt};

use molfleet_api::HostDescriptor;

use crate::error::{ClientError, Result};

/// Name of the terminal event
pub const DONE_EVENT: &str = "done";

/// Item yielded by a discovery stream
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryItem {
    /// A node answered the probe
    Host(HostDescriptor),
    /// Explicit completion signal
    Done,
}

/// Stream of discovery items; ends after `Done` or the first error
pub type DiscoveryStream = BoxStream<'static, Result<DiscoveryItem>>;

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental line-oriented decoder for `text/event-stream` bodies
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of body bytes, returning every frame it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);

            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame { event, data })
    }
}

impl SseFrame {
    /// Interpret the frame as a discovery item
    ///
    /// Frames that do not parse are skipped rather than ending the run.
    #[must_use]
    pub fn into_item(self) -> Option<DiscoveryItem> {
        match self.event.as_deref() {
            Some(DONE_EVENT) => Some(DiscoveryItem::Done),
            None | Some("message") => match serde_json::from_str::<HostDescriptor>(&self.data) {
                Ok(descriptor) => Some(DiscoveryItem::Host(descriptor)),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to parse discovery event");
                    None
                }
            },
            Some(other) => {
                tracing::debug!(event = other, "ignoring unknown discovery event");
                None
            }
        }
    }
}

struct DecodeState<S> {
    body: Pin<Box<S>>,
    decoder: SseDecoder,
    ready: VecDeque<SseFrame>,
    finished: bool,
}

/// Turn a raw body stream into a discovery stream
///
/// The body ending before the `done` frame is reported as
/// `ClientError::ConnectionClosed`.
pub fn decode_discovery<S, B, E>(body: S) -> DiscoveryStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ClientError> + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if st.finished {
                return None;
            }

            if let Some(frame) = st.ready.pop_front() {
                match frame.into_item() {
                    Some(DiscoveryItem::Done) => {
                        st.finished = true;
                        return Some((Ok(DiscoveryItem::Done), st));
                    }
                    Some(item) => return Some((Ok(item), st)),
                    None => continue,
                }
            }

            match st.body.next().await {
                Some(Ok(chunk)) => {
                    let frames = st.decoder.feed(chunk.as_ref());
                    st.ready.extend(frames);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e.into()), st));
                }
                None => {
                    st.finished = true;
                    return Some((
                        Err(ClientError::ConnectionClosed(
                            "stream ended before completion".into(),
                        )),
                        st,
                    ));
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&str]) -> Vec<std::result::Result<Vec<u8>, ClientError>> {
        parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect()
    }

    #[test]
    fn test_decoder_splits_frames() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: {\"a\":1}\n\nevent: done\ndata: {}\n\n");

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event, None);
        assert_eq!(frames[0].data, "{\"a\":1}");
        assert_eq!(frames[1].event.as_deref(), Some("done"));
    }

    #[test]
    fn test_decoder_handles_split_chunks_and_crlf() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"host_").is_empty());
        assert!(decoder.feed(b"ip\":\"10.0.0.2\"}\r\n").is_empty());
        let frames = decoder.feed(b"\r\n");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "{\"host_ip\":\"10.0.0.2\"}");
    }

    #[test]
    fn test_decoder_ignores_comments() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b": keep-alive\n\n");
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn test_stream_yields_hosts_then_done() {
        let body = stream::iter(chunks(&[
            "data: {\"host_ip\":\"10.0.0.2\",\"version\":\"1.3.0\"}\n\n",
            "data: not-json\n\n",
            "data: {\"host_ip\":\"10.0.0.3\"}\n\nevent: done\ndata: {}\n\n",
        ]));

        let items: Vec<_> = decode_discovery(body).collect().await;

        assert_eq!(items.len(), 3);
        match &items[0] {
            Ok(DiscoveryItem::Host(d)) => assert_eq!(d.primary_ip(), Some("10.0.0.2")),
            other => panic!("unexpected item: {other:?}"),
        }
        assert!(matches!(items[1], Ok(DiscoveryItem::Host(_))));
        assert!(matches!(items[2], Ok(DiscoveryItem::Done)));
    }

    #[tokio::test]
    async fn test_stream_without_done_is_an_error() {
        let body = stream::iter(chunks(&["data: {\"host_ip\":\"10.0.0.2\"}\n\n"]));

        let items: Vec<_> = decode_discovery(body).collect().await;

        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(ClientError::ConnectionClosed(_))));
    }
}
