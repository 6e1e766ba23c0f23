//! Shared JSON-over-HTTP plumbing for the remote planner and the remote backend.

use std::time::Duration;
use std::{error::Error as StdError, fmt};

use serde_json::Value;

const BODY_PREVIEW_LIMIT: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    Timeout,
    Connect,
    Request,
    Body,
    Decode,
    Status,
    Unknown,
}

impl HttpErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Body => "body",
            Self::Decode => "decode",
            Self::Status => "status",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HttpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct HttpError {
    kind: HttpErrorKind,
    status: Option<u16>,
    url: String,
    message: String,
    source: Option<anyhow::Error>,
}

impl HttpError {
    pub fn kind(&self) -> HttpErrorKind {
        self.kind
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// The remote end could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self.kind, HttpErrorKind::Connect | HttpErrorKind::Timeout)
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, url: &str) -> Self {
        let kind = if err.is_timeout() {
            HttpErrorKind::Timeout
        } else if err.is_connect() {
            HttpErrorKind::Connect
        } else if err.is_request() {
            HttpErrorKind::Request
        } else if err.is_body() {
            HttpErrorKind::Body
        } else if err.is_decode() {
            HttpErrorKind::Decode
        } else {
            HttpErrorKind::Unknown
        };
        HttpError {
            kind,
            status: err.status().map(|s| s.as_u16()),
            url: url.to_string(),
            message: err.to_string(),
            source: Some(anyhow::Error::new(err)),
        }
    }

    fn status_error(status: u16, url: &str, preview: String) -> Self {
        HttpError {
            kind: HttpErrorKind::Status,
            status: Some(status),
            url: url.to_string(),
            message: preview,
            source: None,
        }
    }

    fn decode_error(status: u16, url: &str, err: serde_json::Error, preview: String) -> Self {
        HttpError {
            kind: HttpErrorKind::Decode,
            status: Some(status),
            url: url.to_string(),
            message: format!("failed to decode response body: {err} | body={preview}"),
            source: Some(anyhow::Error::new(err)),
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http error kind={}", self.kind)?;
        if let Some(status) = self.status {
            write!(f, " status={status}")?;
        }
        write!(f, " url={}: {}", self.url, self.message)
    }
}

impl StdError for HttpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|err| &**err as &(dyn StdError + 'static))
    }
}

pub(crate) fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    let mut out: String = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect();
    if trimmed.chars().nth(BODY_PREVIEW_LIMIT).is_some() {
        out.push_str("...");
    }
    out
}

/// POST JSON with optional bearer auth and decode a JSON reply.
#[derive(Clone)]
pub struct JsonClient {
    url: String,
    api_key: String,
    http: reqwest::Client,
}

impl JsonClient {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, timeout_ms: u64) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            url: url.into(),
            api_key: api_key.into(),
            http,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn post(&self, payload: &Value) -> Result<Value, HttpError> {
        let mut req = self.http.post(&self.url).json(payload);
        if !self.api_key.trim().is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        let resp = req
            .send()
            .await
            .map_err(|err| HttpError::from_reqwest(err, &self.url))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|err| HttpError::from_reqwest(err, &self.url))?;

        if !status.is_success() {
            return Err(HttpError::status_error(
                status.as_u16(),
                &self.url,
                preview_body(&body),
            ));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str::<Value>(&body).map_err(|err| {
            HttpError::decode_error(status.as_u16(), &self.url, err, preview_body(&body))
        })
    }
}
