use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::Stream;
use http::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::config::HttpCfg;
use crate::error::{ChatError, CoreResult};

/// Per-request correlation data sent as headers.
#[derive(Clone, Copy, Default)]
pub struct RequestCtx<'a> {
    pub turn_id: Option<&'a str>,
}

/// Represents a single Server-Sent-Event line (already split on `\n`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseLine {
    pub line: String,
}

/// A boxed stream of raw body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = CoreResult<Bytes>> + Send>>;

/// A boxed stream of `SseLine` results.
pub type SseStream = Pin<Box<dyn Stream<Item = CoreResult<SseLine>> + Send>>;

/// Thin wrapper around reqwest::Client with defaults and helpers.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    user_agent: String,
    response_timeout: Duration,
}

impl HttpClient {
    pub fn new_default() -> CoreResult<Self> {
        Self::from_cfg(&HttpCfg::default())
    }

    pub fn from_cfg(cfg: &HttpCfg) -> CoreResult<Self> {
        // No total request timeout: a turn's body may stream for minutes. The session applies
        // an idle timeout between lines instead.
        let mut builder =
            Client::builder().connect_timeout(Duration::from_millis(cfg.connect_timeout_ms));
        if let Some(n) = cfg.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(n);
        }
        let inner = builder
            .build()
            .map_err(|e| ChatError::Other(anyhow::anyhow!("http client build failed: {e}")))?;
        Ok(Self {
            inner,
            user_agent: concat!("streamchat/", env!("CARGO_PKG_VERSION")).to_string(),
            response_timeout: Duration::from_millis(cfg.response_timeout_ms),
        })
    }

    /// POST JSON and return an SSE (Server-Sent Events) line stream.
    /// Each yielded item is one raw line (trim not applied) from the SSE channel.
    pub async fn post_sse_lines<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        ctx: &RequestCtx<'_>,
    ) -> CoreResult<SseStream> {
        let mut req = self
            .inner
            .post(url)
            .json(body)
            .header(USER_AGENT, &self.user_agent)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream");

        if let Some(tid) = ctx.turn_id {
            req = req.header("X-Turn-Id", tid);
        }

        let resp = tokio::time::timeout(self.response_timeout, req.send())
            .await
            .map_err(|_| ChatError::Timeout("response headers"))?
            .map_err(|e| ChatError::Transport(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        let byte_stream = futures_util::StreamExt::map(resp.bytes_stream(), |chunk| {
            chunk.map_err(|e| ChatError::Transport(format!("stream read failed: {e}")))
        });
        Ok(Box::pin(LineStream::new(Box::pin(byte_stream))))
    }
}

fn map_http_error(status: StatusCode, body: &str) -> ChatError {
    ChatError::UpstreamStatus {
        code: status.as_u16(),
        message: truncate(body, 300),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        let mut t = s[..end].to_string();
        t.push_str("...");
        t
    } else {
        s.to_string()
    }
}

/// Line splitter over a byte stream; yields `SseLine`s separated by '\n'.
///
/// Bytes are buffered raw and only decoded once a full line is present, so a line (or a
/// multi-byte character) split across two reads comes out whole.
pub struct LineStream {
    inner: ByteStream,
    buf: Vec<u8>,
    /// Prefix of `buf` already searched for a newline.
    scanned: usize,
    flushed_tail: bool,
}

impl LineStream {
    pub fn new(inner: ByteStream) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            scanned: 0,
            flushed_tail: false,
        }
    }

    fn take_line(&mut self, end: usize) -> SseLine {
        let mut raw: Vec<u8> = self.buf.drain(..end).collect();
        self.scanned = 0;
        if raw.last() == Some(&b'\n') {
            raw.pop();
        }
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        SseLine {
            line: String::from_utf8_lossy(&raw).into_owned(),
        }
    }
}

/// Wrap any chunk stream as a line stream.
pub fn lines_from_bytes(inner: ByteStream) -> SseStream {
    Box::pin(LineStream::new(inner))
}

impl Stream for LineStream {
    type Item = CoreResult<SseLine>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            // If we already have a newline in the buffer, split and yield immediately.
            let from = self.scanned;
            if let Some(idx) = self.buf[from..].iter().position(|b| *b == b'\n') {
                let line = self.take_line(from + idx + 1);
                return Poll::Ready(Some(Ok(line)));
            }
            self.scanned = self.buf.len();

            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    self.buf.extend_from_slice(&chunk);
                    continue;
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => {
                    if !self.flushed_tail && !self.buf.is_empty() {
                        self.flushed_tail = true;
                        let len = self.buf.len();
                        let line = self.take_line(len);
                        return Poll::Ready(Some(Ok(line)));
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;

    fn chunks(parts: Vec<&'static [u8]>) -> ByteStream {
        Box::pin(futures::stream::iter(
            parts.into_iter().map(|p| Ok(Bytes::from_static(p))),
        ))
    }

    async fn collect_lines(s: SseStream) -> Vec<String> {
        s.map(|l| l.unwrap().line).collect().await
    }

    #[tokio::test]
    async fn splits_lines_across_chunks() {
        let s = lines_from_bytes(chunks(vec![
            b"data: {\"type\":\"del",
            b"ta\",\"content\":\"Hi\"}\n\ndata: x\r\n",
            b"tail",
        ]));
        let lines = collect_lines(s).await;
        assert_eq!(
            lines,
            vec![
                r#"data: {"type":"delta","content":"Hi"}"#.to_string(),
                String::new(),
                "data: x".to_string(),
                "tail".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn multibyte_char_split_across_reads() {
        // "é" is 0xC3 0xA9
        let s = lines_from_bytes(chunks(vec![b"caf\xC3", b"\xA9\n"]));
        assert_eq!(collect_lines(s).await, vec!["caf\u{00E9}".to_string()]);
    }

    #[tokio::test]
    async fn byte_at_a_time_line_is_reassembled() {
        let body: &'static [u8] = b"data: {\"type\":\"delta\"}\r\ndata: two\n";
        let parts: Vec<&'static [u8]> = body.chunks(1).collect();
        let lines = collect_lines(lines_from_bytes(chunks(parts))).await;
        assert_eq!(lines, vec![r#"data: {"type":"delta"}"#, "data: two"]);
    }

    #[tokio::test]
    async fn read_error_is_forwarded() {
        let inner: ByteStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"data: a\n")),
            Err(ChatError::Transport("reset".into())),
        ]));
        let mut s = lines_from_bytes(inner);
        assert_eq!(s.next().await.unwrap().unwrap().line, "data: a");
        assert!(matches!(s.next().await, Some(Err(ChatError::Transport(_)))));
    }

    #[tokio::test]
    async fn post_sse_lines_streams_body() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST)
                .path("/chat")
                .header("accept", "text/event-stream")
                .header("x-turn-id", "t-1")
                .json_body(json!({"messages": []}));
            then.status(200)
                .header("content-type", "text/event-stream")
                .body("data: one\n\ndata: two\n\n");
        });

        let client = HttpClient::new_default().unwrap();
        let ctx = RequestCtx {
            turn_id: Some("t-1"),
        };
        let s = client
            .post_sse_lines(&format!("{}/chat", server.base_url()), &json!({"messages": []}), &ctx)
            .await
            .unwrap();
        let lines = collect_lines(s).await;
        assert_eq!(lines, vec!["data: one", "", "data: two", ""]);
        m.assert();
    }

    #[tokio::test]
    async fn non_success_maps_to_upstream_status() {
        let server = MockServer::start();
        let big = "x".repeat(1000);
        let _m = server.mock(|when, then| {
            when.method(POST).path("/chat");
            then.status(500).body(big.clone());
        });
        let client = HttpClient::new_default().unwrap();
        let err = match client
            .post_sse_lines(&format!("{}/chat", server.base_url()), &json!({}), &RequestCtx::default())
            .await
        {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        match err {
            ChatError::UpstreamStatus { code, message } => {
                assert_eq!(code, 500);
                assert!(message.ends_with("..."));
            }
            other => panic!("expected UpstreamStatus, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn network_error_maps_to_transport() {
        // Attempt to connect to a likely-closed port to simulate network error quickly.
        let client = HttpClient::new_default().expect("client");
        let res = client
            .post_sse_lines("http://127.0.0.1:9/chat", &json!({}), &RequestCtx::default())
            .await;
        assert!(matches!(res, Err(ChatError::Transport(_))));
    }
}
