//! Line relay for streamed upstream responses.
//!
//! The upstream body is re-chunked on line boundaries (`\n`, `\r\n` or a lone
//! `\r`): every non-empty line is emitted as soon as it is complete, terminated
//! by a single `\n`. Nothing
//! else about the event-stream framing is interpreted. At most one partial
//! line is buffered at a time.

use axum::body::Bytes;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::io;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

struct LineRelay<S> {
    upstream: Pin<Box<S>>,
    buffer: Vec<u8>,
    /// Offset up to which `buffer` is known to contain no line break
    scanned: usize,
    idle_timeout: Duration,
    lines: usize,
    done: bool,
}

impl<S> LineRelay<S> {
    /// Pop the next complete, non-empty line from the buffer.
    fn next_line(&mut self) -> Option<Bytes> {
        let mut start = self.scanned.min(self.buffer.len());
        while let Some(pos) = self.buffer[start..]
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
        {
            let end = start + pos;
            let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
            start = 0;
            line.pop();
            // A `\r\n` pair leaves an empty line behind, which is dropped
            if let Some(framed) = frame(line) {
                self.scanned = 0;
                return Some(framed);
            }
        }
        self.scanned = self.buffer.len();
        None
    }

    /// Unterminated data left over once the upstream has finished.
    fn remainder(&mut self) -> Option<Bytes> {
        self.scanned = 0;
        frame(std::mem::take(&mut self.buffer))
    }

    /// Drop any partial line after a failed upstream read.
    fn discard(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}

impl<S> Drop for LineRelay<S> {
    fn drop(&mut self) {
        if !self.done {
            debug!(
                "Client went away after {} lines, closing upstream stream",
                self.lines
            );
        }
    }
}

fn frame(mut line: Vec<u8>) -> Option<Bytes> {
    if line.is_empty() {
        return None;
    }
    line.push(b'\n');
    Some(Bytes::from(line))
}

/// Relay `upstream` line by line.
///
/// Each wait for upstream data is bounded by `idle_timeout`; when it elapses,
/// or the upstream fails, the relay yields an error and ends.
pub fn relay_lines<S, E>(
    upstream: S,
    idle_timeout: Duration,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let relay = LineRelay {
        upstream: Box::pin(upstream),
        buffer: Vec::new(),
        scanned: 0,
        idle_timeout,
        lines: 0,
        done: false,
    };

    futures::stream::unfold(relay, |mut relay| async move {
        loop {
            if let Some(line) = relay.next_line() {
                relay.lines += 1;
                return Some((Ok(line), relay));
            }
            if relay.done {
                let line = relay.remainder()?;
                relay.lines += 1;
                return Some((Ok(line), relay));
            }

            match tokio::time::timeout(relay.idle_timeout, relay.upstream.next()).await {
                Ok(Some(Ok(chunk))) => relay.buffer.extend_from_slice(&chunk),
                Ok(Some(Err(e))) => {
                    warn!("Upstream stream failed after {} lines: {}", relay.lines, e);
                    relay.done = true;
                    relay.discard();
                    let err = io::Error::other(e.to_string());
                    return Some((Err(err), relay));
                }
                Ok(None) => {
                    debug!("Upstream stream finished");
                    relay.done = true;
                }
                Err(_) => {
                    warn!(
                        "No upstream data for {:?}, abandoning stream",
                        relay.idle_timeout
                    );
                    relay.done = true;
                    relay.discard();
                    let err = io::Error::new(io::ErrorKind::TimedOut, "Request timed out");
                    return Some((Err(err), relay));
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, io::Error>> {
        futures::stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect(parts: &[&'static str]) -> Vec<String> {
        relay_lines(chunks(parts), Duration::from_secs(5))
            .map(|item| String::from_utf8(item.unwrap().to_vec()).unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_blank_lines_dropped() {
        let lines = collect(&["data: A\n\ndata: B\n"]).await;
        assert_eq!(lines, vec!["data: A\n", "data: B\n"]);
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks() {
        let lines = collect(&["data: {\"id\"", ":1}\n", "\n", "data: [DO", "NE]\n\n"]).await;
        assert_eq!(lines, vec!["data: {\"id\":1}\n", "data: [DONE]\n"]);
    }

    #[tokio::test]
    async fn test_crlf_framing() {
        let lines = collect(&["data: A\r\n\r\ndata: B\r\n"]).await;
        assert_eq!(lines, vec!["data: A\n", "data: B\n"]);
    }

    #[tokio::test]
    async fn test_trailing_partial_line_flushed() {
        let lines = collect(&["data: A\n", "data: B"]).await;
        assert_eq!(lines, vec!["data: A\n", "data: B\n"]);
    }

    #[tokio::test]
    async fn test_empty_upstream() {
        assert!(collect(&[]).await.is_empty());
        assert!(collect(&["\n\n\r\n"]).await.is_empty());
    }

    #[tokio::test]
    async fn test_upstream_error_ends_stream() {
        let upstream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"data: A\ndata: part")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from_static(b"data: never\n")),
        ]);
        let items: Vec<_> = relay_lines(upstream, Duration::from_secs(5)).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().as_ref(), b"data: A\n");
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_idle_timeout() {
        let upstream = futures::stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(
            b"data: A\n",
        ))])
        .chain(futures::stream::pending());
        let items: Vec<_> = relay_lines(upstream, Duration::from_millis(50)).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().as_ref(), b"data: A\n");
        assert_eq!(
            items[1].as_ref().unwrap_err().kind(),
            io::ErrorKind::TimedOut
        );
    }

    #[tokio::test]
    async fn test_bare_cr_framing() {
        let lines = collect(&["data: A\rdata: B\n", "data: C\r", "\ndata: D\r"]).await;
        assert_eq!(lines, vec!["data: A\n", "data: B\n", "data: C\n", "data: D\n"]);
    }

    #[tokio::test]
    async fn test_idle_timeout_mid_line() {
        let upstream = futures::stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(
            b"data: A\ndata: par",
        ))])
        .chain(futures::stream::pending());
        let items: Vec<_> = relay_lines(upstream, Duration::from_millis(50)).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().as_ref(), b"data: A\n");
        assert_eq!(
            items[1].as_ref().unwrap_err().kind(),
            io::ErrorKind::TimedOut
        );
    }

    #[tokio::test]
    async fn test_upstream_error_before_any_line() {
        let upstream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"data: par")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let items: Vec<_> = relay_lines(upstream, Duration::from_secs(5)).collect().await;

        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }
}
