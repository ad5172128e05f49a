//! Error types for the transport layer.

use thiserror::Error;

/// Errors returned by a [`Transport`](super::Transport).
///
/// The throttling decorator never produces these itself; it hands back
/// whatever the wrapped transport returned.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level failure (DNS, connection refused, TLS, reset mid-body).
    #[error("network error sending {method} {url}: {source}")]
    Network {
        /// HTTP method of the failed request.
        method: String,
        /// Target URL of the failed request.
        url: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The request did not complete within the client's timeout.
    #[error("timeout sending {method} {url}")]
    Timeout {
        /// HTTP method of the failed request.
        method: String,
        /// Target URL of the failed request.
        url: String,
    },
}

impl TransportError {
    /// Classifies a client error, promoting timeouts to [`Self::Timeout`].
    pub fn from_reqwest(
        method: impl Into<String>,
        url: impl Into<String>,
        source: reqwest::Error,
    ) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                method: method.into(),
                url: url.into(),
            }
        } else {
            Self::Network {
                method: method.into(),
                url: url.into(),
                source,
            }
        }
    }

    /// Creates a timeout error.
    pub fn timeout(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Timeout {
            method: method.into(),
            url: url.into(),
        }
    }

    /// Returns the URL of the request that failed.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Network { url, .. } | Self::Timeout { url, .. } => url,
        }
    }
}
