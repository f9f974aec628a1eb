use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Method, StatusCode};
use thiserror::Error;

const DEFAULT_USER_AGENT: &str = "repokit";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A single outgoing request: method, fully qualified URL, headers and body.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl RequestConfig {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("HTTP status {status} for url ({url})")]
    Status {
        status: StatusCode,
        url: String,
        body: Vec<u8>,
    },
}

impl HttpError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport { .. } => None,
        }
    }
}

/// Performs one HTTP exchange. Non-2xx responses are not errors at this layer.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: RequestConfig) -> anyhow::Result<HttpResponse>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: RequestConfig) -> anyhow::Result<HttpResponse> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Generic request helper shared by both authentication modes.
#[derive(Clone)]
pub struct HttpService {
    transport: Arc<dyn Transport>,
    calls: Arc<AtomicU64>,
}

impl HttpService {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn http_request(&self, request: RequestConfig) -> Result<HttpResponse, HttpError> {
        let url = request.url.clone();
        self.calls.fetch_add(1, Ordering::Relaxed);

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|source| HttpError::Transport {
                url: url.clone(),
                source,
            })?;

        if !response.status.is_success() {
            return Err(HttpError::Status {
                status: response.status,
                url,
                body: response.body,
            });
        }
        Ok(response)
    }

    pub fn api_call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn api_reset(&self) {
        self.calls.store(0, Ordering::Relaxed);
    }
}
