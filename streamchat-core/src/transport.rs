use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::Config;
use crate::error::{ChatError, CoreResult};
use crate::http_client::{lines_from_bytes, ByteStream, HttpClient, RequestCtx, SseStream};
use crate::model::ChatRequest;

/// Opens the response stream for one turn.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    fn name(&self) -> &str;
    async fn open(&self, req: &ChatRequest, turn_id: &str) -> CoreResult<SseStream>;
}

/// POSTs the request to the configured endpoint and streams the SSE body back.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: HttpClient,
    url: String,
}

impl HttpTransport {
    pub fn new(http: HttpClient, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    pub fn from_config(cfg: &Config) -> CoreResult<Self> {
        cfg.validate()?;
        Ok(Self::new(HttpClient::from_cfg(&cfg.http)?, cfg.endpoint.url.trim()))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn open(&self, req: &ChatRequest, turn_id: &str) -> CoreResult<SseStream> {
        let ctx = RequestCtx {
            turn_id: Some(turn_id),
        };
        self.http.post_sse_lines(&self.url, req, &ctx).await
    }
}

/// One scripted step of a [`ScriptedTransport`] body.
#[derive(Debug, Clone)]
pub enum Chunk {
    Bytes(Vec<u8>),
    /// The connection drops at this point.
    Fail(String),
}

impl Chunk {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Bytes(s.into().into_bytes())
    }
}

/// A transport that replays canned byte chunks instead of touching the network.
/// Useful for tests or as an offline placeholder. Every request it sees is recorded.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<Vec<CoreResult<Vec<Chunk>>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the body for the next turn.
    pub fn push_body(&self, chunks: Vec<Chunk>) -> &Self {
        self.lock_scripts().push(Ok(chunks));
        self
    }

    /// Queue a failure to open the stream for the next turn.
    pub fn push_open_error(&self, err: ChatError) -> &Self {
        self.lock_scripts().push(Err(err));
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn lock_scripts(&self) -> std::sync::MutexGuard<'_, Vec<CoreResult<Vec<Chunk>>>> {
        self.scripts.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn open(&self, req: &ChatRequest, _turn_id: &str) -> CoreResult<SseStream> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(req.clone());
        let script = {
            let mut scripts = self.lock_scripts();
            if scripts.is_empty() {
                return Err(ChatError::Transport("no scripted response left".into()));
            }
            scripts.remove(0)
        }?;
        let items: Vec<CoreResult<Bytes>> = script
            .into_iter()
            .map(|c| match c {
                Chunk::Bytes(b) => Ok(Bytes::from(b)),
                Chunk::Fail(msg) => Err(ChatError::Transport(msg)),
            })
            .collect();
        let bytes: ByteStream = Box::pin(futures_util::stream::iter(items));
        Ok(lines_from_bytes(bytes))
    }
}
