use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

use crate::error::{ChatError, CoreResult};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct EndpointCfg {
    /// Full URL of the streaming chat endpoint, e.g. http://localhost:8000/chat
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpCfg {
    /// TCP connect timeout in milliseconds (default 5000ms)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Time allowed for the response headers to arrive (default 30000ms)
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Longest silence tolerated between two stream lines (default 120000ms)
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Optional per-host idle connection pool cap (None = reqwest default)
    #[serde(default)]
    pub pool_max_idle_per_host: Option<usize>,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            response_timeout_ms: default_response_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            pool_max_idle_per_host: None,
        }
    }
}

impl HttpCfg {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_response_timeout_ms() -> u64 {
    30_000
}
fn default_idle_timeout_ms() -> u64 {
    120_000
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct ToolsCfg {
    /// Hints sent when a turn does not name any.
    #[serde(default)]
    pub default_hints: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    pub endpoint: EndpointCfg,
    /// HTTP client configuration (timeouts, pooling). Missing → defaults.
    #[serde(default)]
    pub http: HttpCfg,
    #[serde(default)]
    pub tools: ToolsCfg,
}

impl Config {
    /// Config pointing at `url` with every other setting defaulted.
    pub fn for_endpoint(url: impl Into<String>) -> Self {
        Self {
            endpoint: EndpointCfg { url: url.into() },
            http: HttpCfg::default(),
            tools: ToolsCfg::default(),
        }
    }

    /// Load a Config from a file path (JSON or TOML by extension). If the
    /// extension is missing or unrecognized, try JSON first, then TOML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(ChatError::from)?;
        let s = std::str::from_utf8(&bytes).map_err(|e| ChatError::Other(e.into()))?;
        let cfg: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                serde_json::from_str::<Self>(s).map_err(|e| ChatError::Other(e.into()))?
            }
            Some("toml") => toml::from_str::<Self>(s).map_err(|e| ChatError::Other(e.into()))?,
            _ => serde_json::from_str::<Self>(s)
                .map_err(|e| ChatError::Other(e.into()))
                .or_else(|_| toml::from_str::<Self>(s).map_err(|e| ChatError::Other(e.into())))?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> CoreResult<()> {
        let url = self.endpoint.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ChatError::Validation(format!(
                "endpoint.url must be an http(s) URL, got '{url}'"
            )));
        }
        if self.http.idle_timeout_ms == 0 || self.http.response_timeout_ms == 0 {
            return Err(ChatError::Validation(
                "http timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_from_json() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("chat.json");
        let json = r#"{
          "endpoint": {"url": "http://localhost:8000/chat"},
          "tools": {"default_hints": ["web_search"]}
        }"#;
        fs::write(&file, json).unwrap();
        let cfg = Config::from_path(&file).unwrap();
        assert_eq!(cfg.endpoint.url, "http://localhost:8000/chat");
        assert_eq!(cfg.tools.default_hints, vec!["web_search"]);
        assert_eq!(cfg.http.connect_timeout_ms, 5_000);
        assert_eq!(cfg.http.response_timeout_ms, 30_000);
        assert_eq!(cfg.http.idle_timeout_ms, 120_000);
        assert_eq!(cfg.http.pool_max_idle_per_host, None);
    }

    #[test]
    fn load_from_toml() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("chat.toml");
        let toml = r#"
[endpoint]
url = "https://assistant.example.com/chat"

[http]
idle_timeout_ms = 1500
pool_max_idle_per_host = 2
"#;
        fs::write(&file, toml).unwrap();
        let cfg = Config::from_path(&file).unwrap();
        assert_eq!(cfg.http.idle_timeout(), Duration::from_millis(1500));
        assert_eq!(cfg.http.pool_max_idle_per_host, Some(2));
        assert_eq!(cfg.http.connect_timeout_ms, 5_000);
        assert!(cfg.tools.default_hints.is_empty());
    }

    #[test]
    fn missing_file_returns_io_error() {
        let missing = std::path::PathBuf::from("/definitely/not/here/streamchat-missing.json");
        let err = Config::from_path(&missing).unwrap_err();
        match err {
            ChatError::Io(_) => {}
            other => panic!("expected Io error, got: {:?}", other),
        }
    }

    #[test]
    fn bad_utf8_returns_other_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("bad.bin");
        fs::write(&file, vec![0xff, 0xfe, 0xfd, 0x00, 0x80]).unwrap();
        let err = Config::from_path(&file).unwrap_err();
        assert!(matches!(err, ChatError::Other(_)), "got: {err:?}");
    }

    #[test]
    fn unknown_extension_falls_back_to_json_then_toml() {
        let dir = tempdir().unwrap();
        let json_path = dir.path().join("chat.conf");
        fs::write(&json_path, r#"{"endpoint":{"url":"http://a/chat"}}"#).unwrap();
        assert_eq!(Config::from_path(&json_path).unwrap().endpoint.url, "http://a/chat");

        let toml_path = dir.path().join("chat2.conf");
        fs::write(&toml_path, "[endpoint]\nurl = \"http://b/chat\"\n").unwrap();
        assert_eq!(Config::from_path(&toml_path).unwrap().endpoint.url, "http://b/chat");
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("chat.json");
        fs::write(&file, r#"{"endpoint":{"url":"ftp://nope"}}"#).unwrap();
        let err = Config::from_path(&file).unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)), "got: {err:?}");
    }

    #[test]
    fn rejects_zero_timeouts() {
        let mut cfg = Config::for_endpoint("http://localhost/chat");
        cfg.http.idle_timeout_ms = 0;
        assert!(cfg.validate().is_err());
    }
}
