//! Server-Sent Events decoding for upstream streams.
//!
//! Turns a byte stream into the `data:` payloads of each event. Multi-line
//! `data:` fields are joined with `\n`, blank lines end an event, comments and
//! the other SSE fields (`event:`, `id:`, `retry:`) are ignored because the
//! Gemini stream never relies on them.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, BytesMut};
use futures::Stream;

/// Classify a single line.
#[derive(Debug, Clone, PartialEq)]
enum Line {
    Data(String),
    Blank,
    Other,
}

fn classify(line: &str) -> Line {
    if line.is_empty() {
        return Line::Blank;
    }
    match line.strip_prefix("data:") {
        Some(rest) => Line::Data(rest.strip_prefix(' ').unwrap_or(rest).to_string()),
        None => Line::Other,
    }
}

/// Stream of SSE event payloads.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences split across chunks decode correctly.
pub struct SseDataStream<S> {
    inner: S,
    buffer: BytesMut,
    pending: Vec<String>,
    finished: bool,
}

impl<S> SseDataStream<S> {
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
            pending: Vec::new(),
            finished: false,
        }
    }

    fn next_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|b| *b == b'\n')?;
        let raw = self.buffer.split_to(end);
        self.buffer.advance(1);
        let mut line = String::from_utf8_lossy(&raw).into_owned();
        if line.ends_with('\r') {
            line.pop();
        }
        Some(line)
    }

    /// Feed one line; returns a finished event payload at a boundary.
    fn accept(&mut self, line: &str) -> Option<String> {
        match classify(line) {
            Line::Data(data) => {
                self.pending.push(data);
                None
            }
            Line::Blank if !self.pending.is_empty() => {
                Some(std::mem::take(&mut self.pending).join("\n"))
            }
            Line::Blank | Line::Other => None,
        }
    }
}

impl<S, B, E> Stream for SseDataStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    type Item = Result<String, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            while let Some(line) = self.next_line() {
                if let Some(event) = self.accept(&line) {
                    return Poll::Ready(Some(Ok(event)));
                }
            }

            if self.finished {
                // Unterminated trailing line and event.
                if !self.buffer.is_empty() {
                    let rest = String::from_utf8_lossy(&self.buffer).into_owned();
                    self.buffer.clear();
                    if let Line::Data(data) = classify(rest.trim_end_matches('\r')) {
                        self.pending.push(data);
                    }
                }
                if self.pending.is_empty() {
                    return Poll::Ready(None);
                }
                return Poll::Ready(Some(Ok(std::mem::take(&mut self.pending).join("\n"))));
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => self.buffer.extend_from_slice(chunk.as_ref()),
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => self.finished = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::StreamExt;

    async fn collect_bytes(chunks: Vec<&'static [u8]>) -> Vec<String> {
        let stream = futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, ()>(Bytes::from_static(c))),
        );
        SseDataStream::new(stream)
            .map(|r| r.unwrap())
            .collect()
            .await
    }

    async fn collect(chunks: Vec<&'static str>) -> Vec<String> {
        collect_bytes(chunks.into_iter().map(str::as_bytes).collect()).await
    }

    #[tokio::test]
    async fn splits_events_on_blank_lines() {
        let got = collect(vec!["data: {\"a\":1}\n\ndata: {\"b\":2}\n\n"]).await;
        assert_eq!(got, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[tokio::test]
    async fn joins_multiline_data() {
        let got = collect(vec!["data: one\ndata: two\n\n"]).await;
        assert_eq!(got, vec!["one\ntwo"]);
    }

    #[tokio::test]
    async fn reassembles_lines_split_across_chunks() {
        let got = collect(vec!["da", "ta: hel", "lo\r\n", "\r\n"]).await;
        assert_eq!(got, vec!["hello"]);
    }

    #[tokio::test]
    async fn keeps_utf8_split_mid_character() {
        // "é" is 0xC3 0xA9
        let got = collect_bytes(vec![&b"data: caf\xC3"[..], &b"\xA9\n\n"[..]]).await;
        assert_eq!(got, vec!["café"]);
    }

    #[tokio::test]
    async fn ignores_comments_and_other_fields() {
        let got = collect(vec![": ping\nevent: x\nid: 1\ndata:payload\n\n"]).await;
        assert_eq!(got, vec!["payload"]);
    }

    #[tokio::test]
    async fn flushes_trailing_event_without_blank_line() {
        let got = collect(vec!["data: first\n\ndata: last"]).await;
        assert_eq!(got, vec!["first", "last"]);
    }

    #[tokio::test]
    async fn empty_input_yields_nothing() {
        assert!(collect(vec![]).await.is_empty());
        assert!(collect(vec!["\n\n\n"]).await.is_empty());
    }

    #[tokio::test]
    async fn propagates_transport_errors() {
        let stream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"data: a\n\n")),
            Err("boom"),
        ]);
        let mut sse = SseDataStream::new(stream);
        assert_eq!(sse.next().await.unwrap().unwrap(), "a");
        assert_eq!(sse.next().await.unwrap().unwrap_err(), "boom");
    }
}
