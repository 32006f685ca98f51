//! Transport boundary for all forge HTTP I/O.
//!
//! Clients build [`HttpRequest`] values and hand them to an [`HttpTransport`].
//! Production code uses [`ReqwestTransport`]; tests use [`MockTransport`],
//! which answers from queued responses without opening sockets.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::ForgeError;

/// HTTP methods the forge clients use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// Header name/value pairs. Lookups are case-insensitive.
pub type HttpHeaders = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            ..Self::get(url)
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Serialize `body` as the JSON payload and set `Content-Type`.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, ForgeError> {
        self.body = serde_json::to_vec(body)?;
        Ok(self.header("Content-Type", "application/json"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as lossy UTF-8, for diagnostics.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("http transport error: {0}")]
    Transport(String),

    #[error("no mock response registered for {method} {url}")]
    NoMockResponse { method: String, url: String },
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Send `request`, giving up with [`ForgeError::Cancelled`] if `cancel` fires first.
pub async fn send_cancellable(
    transport: &dyn HttpTransport,
    cancel: &CancellationToken,
    request: HttpRequest,
) -> Result<HttpResponse, ForgeError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ForgeError::Cancelled),
        result = transport.send(request) => Ok(result?),
    }
}

pub fn header_get<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

// ---------- reqwest transport ----------

/// Real transport backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Every request through this transport is bounded by `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("reposync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };

        let mut builder = self.client.request(method, &request.url);
        for (k, v) in request.headers {
            builder = builder.header(k, v);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        let headers: HttpHeaders = resp
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = resp
            .bytes()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

// ---------- in-memory mock transport ----------

#[cfg(any(test, feature = "test-util"))]
pub use mock::MockTransport;

#[cfg(any(test, feature = "test-util"))]
mod mock {
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Queue-backed transport for tests: no sockets, no loopback servers.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        inner: Arc<Mutex<Inner>>,
    }

    #[derive(Default)]
    struct Inner {
        routes: HashMap<(HttpMethod, String), VecDeque<HttpResponse>>,
        sticky: HashMap<(HttpMethod, String), HttpResponse>,
        requests: Vec<HttpRequest>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a one-shot response for `method url`. Queued responses are
        /// returned in FIFO order before any sticky response.
        pub fn push(&self, method: HttpMethod, url: impl Into<String>, response: HttpResponse) {
            let mut inner = self.inner.lock().expect("mock transport lock poisoned");
            inner
                .routes
                .entry((method, url.into()))
                .or_default()
                .push_back(response);
        }

        /// Answer every request for `method url` with `response`.
        pub fn always(&self, method: HttpMethod, url: impl Into<String>, response: HttpResponse) {
            let mut inner = self.inner.lock().expect("mock transport lock poisoned");
            inner.sticky.insert((method, url.into()), response);
        }

        /// Every request seen so far, in order.
        pub fn requests(&self) -> Vec<HttpRequest> {
            let inner = self.inner.lock().expect("mock transport lock poisoned");
            inner.requests.clone()
        }

        /// Number of requests seen for `method url`.
        pub fn count(&self, method: HttpMethod, url: &str) -> usize {
            self.requests()
                .iter()
                .filter(|r| r.method == method && r.url == url)
                .count()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let mut inner = self.inner.lock().expect("mock transport lock poisoned");
            let key = (request.method, request.url.clone());
            inner.requests.push(request);

            if let Some(resp) = inner.routes.get_mut(&key).and_then(|q| q.pop_front()) {
                return Ok(resp);
            }
            match inner.sticky.get(&key) {
                Some(resp) => Ok(resp.clone()),
                None => Err(HttpError::NoMockResponse {
                    method: key.0.as_str().to_string(),
                    url: key.1,
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_get_is_case_insensitive_and_returns_first_match() {
        let headers: HttpHeaders = vec![
            ("Link".to_string(), "<a>; rel=\"next\"".to_string()),
            ("link".to_string(), "<b>; rel=\"next\"".to_string()),
        ];
        assert_eq!(header_get(&headers, "LINK"), Some("<a>; rel=\"next\""));
    }

    #[test]
    fn json_body_sets_content_type() {
        let req = HttpRequest::post("http://x/repos/migrate")
            .json(&serde_json::json!({"repo_name": "a"}))
            .unwrap();
        assert_eq!(header_get(&req.headers, "content-type"), Some("application/json"));
        assert_eq!(req.body, br#"{"repo_name":"a"}"#);
    }

    #[tokio::test]
    async fn mock_prefers_queued_then_sticky_then_errors() {
        let mock = MockTransport::new();
        mock.push(HttpMethod::Get, "http://x/a", HttpResponse::new(201, "first"));
        mock.always(HttpMethod::Get, "http://x/a", HttpResponse::new(200, "again"));

        let first = mock.send(HttpRequest::get("http://x/a")).await.unwrap();
        let second = mock.send(HttpRequest::get("http://x/a")).await.unwrap();
        assert_eq!(first.status, 201);
        assert_eq!(second.text(), "again");

        let err = mock.send(HttpRequest::get("http://x/b")).await.unwrap_err();
        assert!(matches!(err, HttpError::NoMockResponse { .. }));
        assert_eq!(mock.count(HttpMethod::Get, "http://x/a"), 2);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_send() {
        let mock = MockTransport::new();
        mock.always(HttpMethod::Get, "http://x/a", HttpResponse::new(200, ""));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = send_cancellable(&mock, &cancel, HttpRequest::get("http://x/a"))
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Cancelled));
    }
}
