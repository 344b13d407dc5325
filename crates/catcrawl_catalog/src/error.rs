//! Error types for the catalog client

use reqwest::Method;
use serde::Deserialize;
use std::error::Error as StdError;
use thiserror::Error;

/// Catalog client result type.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Primary error type for catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid catalog URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("failed to send {method} {url} request: {source}")]
    RequestSend {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} timed out")]
    Timeout { method: Method, url: String },

    #[error("failed to read the catalog response body: {0}")]
    Body(#[source] reqwest::Error),

    /// The catalog answered with a non-success status.
    #[error("catalog responded with error [{status}]: {message}")]
    Api {
        status: u16,
        message: String,
        /// Exception type reported by the catalog
        kind: Option<String>,
        cause: Option<String>,
    },

    #[error("failed to decode catalog response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Error document returned by the catalog on failure.
#[derive(Deserialize)]
struct ErrorDocument {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    cause: Option<String>,
}

impl CatalogError {
    /// Create an API error.
    pub fn api(
        status: u16,
        message: impl Into<String>,
        kind: Option<&str>,
        cause: Option<&str>,
    ) -> Self {
        Self::Api {
            status,
            message: message.into(),
            kind: kind.map(str::to_string),
            cause: cause.map(str::to_string),
        }
    }

    pub(crate) fn from_send(method: Method, url: &url::Url, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                method,
                url: url.to_string(),
            }
        } else {
            Self::RequestSend {
                method,
                url: url.to_string(),
                source,
            }
        }
    }

    pub(crate) fn from_body(method: Method, url: &url::Url, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                method,
                url: url.to_string(),
            }
        } else {
            Self::Body(source)
        }
    }

    /// Build an [`CatalogError::Api`] from a failed response body.
    ///
    /// Uses the catalog's `{message, type, cause}` document when present, the raw
    /// body otherwise.
    pub(crate) fn from_response(status: u16, body: &[u8]) -> Self {
        if let Ok(doc) = serde_json::from_slice::<ErrorDocument>(body) {
            if let Some(message) = doc.message {
                return Self::Api {
                    status,
                    message,
                    kind: doc.kind,
                    cause: doc.cause,
                };
            }
        }

        let text = String::from_utf8_lossy(body).trim().to_string();
        let message = if text.is_empty() {
            format!("HTTP {}", status)
        } else {
            text
        };
        Self::Api {
            status,
            message,
            kind: None,
            cause: None,
        }
    }

    /// Human readable message, without the status prefix for API errors.
    pub fn message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Error type: the catalog's exception type for API errors, the failure
    /// category otherwise.
    pub fn kind(&self) -> &str {
        match self {
            Self::Api {
                kind: Some(kind), ..
            } => kind.as_str(),
            Self::Api { kind: None, .. } => "ApiError",
            Self::InvalidUrl { .. } => "InvalidUrl",
            Self::HttpClient(_) => "HttpClient",
            Self::RequestSend { .. } => "RequestSend",
            Self::Timeout { .. } => "Timeout",
            Self::Body(_) => "Body",
            Self::Decode(_) => "Decode",
        }
    }

    /// Underlying cause, when one is known.
    pub fn cause(&self) -> Option<String> {
        match self {
            Self::Api { cause, .. } => cause.clone(),
            other => other.source().map(|source| source.to_string()),
        }
    }
}
