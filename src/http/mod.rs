//! HTTP refresh capability.
//!
//! Reads a URL once per call and classifies the response either by its
//! status code or, when a JSON pointer is configured, by the string found at
//! that pointer in the body (for example `/properties/provisioningState`).
//! A 404 is always a not-found observation rather than an error so delete
//! confirmation can target it.

use std::sync::LazyLock;
use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::poll::Observation;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Response data kept from a probe.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpSnapshot {
    /// Status code returned by the server.
    pub status: u16,
    /// Decoded JSON body, present only when a state pointer is configured.
    pub body: Option<Value>,
}

/// Errors raised while probing a URL.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum HttpProbeError {
    /// Raised when the probe URL cannot be parsed.
    #[error("invalid probe URL '{url}': {message}")]
    InvalidUrl {
        /// URL passed by the caller.
        url: String,
        /// Parser error message.
        message: String,
    },
    /// Raised when the request cannot be sent or times out.
    #[error("request to {url} failed: {message}")]
    Request {
        /// URL being probed.
        url: String,
        /// Transport error message.
        message: String,
    },
    /// Raised when a state pointer is configured and the server answers with
    /// a non-success status other than 404.
    #[error("{url} returned status {status}")]
    Status {
        /// URL being probed.
        url: String,
        /// Status code returned by the server.
        status: u16,
    },
    /// Raised when the body is not valid JSON.
    #[error("failed to decode response from {url}: {message}")]
    Decode {
        /// URL being probed.
        url: String,
        /// Decoder error message.
        message: String,
    },
    /// Raised when the body has no string at the configured pointer.
    #[error("response from {url} has no string state at {pointer}")]
    MissingState {
        /// URL being probed.
        url: String,
        /// JSON pointer that was looked up.
        pointer: String,
    },
}

/// Refresh capability backed by a single HTTP GET.
#[derive(Clone, Debug)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: Url,
    state_pointer: Option<String>,
}

impl HttpProbe {
    /// Creates a probe for `url`, classifying by status code unless
    /// `state_pointer` is set.
    ///
    /// # Errors
    ///
    /// Returns [`HttpProbeError::InvalidUrl`] when `url` does not parse.
    pub fn new(url: &str, state_pointer: Option<String>) -> Result<Self, HttpProbeError> {
        let parsed = Url::parse(url).map_err(|err| HttpProbeError::InvalidUrl {
            url: url.to_owned(),
            message: err.to_string(),
        })?;
        Ok(Self {
            client: HTTP_CLIENT.clone(),
            url: parsed,
            state_pointer,
        })
    }

    /// URL probed by this instance.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Issues one GET and classifies the response.
    ///
    /// # Errors
    ///
    /// Returns [`HttpProbeError`] when the request fails, or when a state
    /// pointer is configured and the response cannot be classified.
    pub async fn observe(&self) -> Result<Observation<HttpSnapshot, String>, HttpProbeError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|err| HttpProbeError::Request {
                url: self.url.to_string(),
                message: err.to_string(),
            })?;
        let status = response.status();
        debug!(url = %self.url, status = status.as_u16(), "probe response");

        if status == StatusCode::NOT_FOUND {
            return Ok(Observation::absent(status.as_str().to_owned()));
        }

        let Some(pointer) = self.state_pointer.as_deref() else {
            return Ok(Observation::found(
                HttpSnapshot {
                    status: status.as_u16(),
                    body: None,
                },
                status.as_str().to_owned(),
            ));
        };

        if !status.is_success() {
            return Err(HttpProbeError::Status {
                url: self.url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|err| HttpProbeError::Decode {
                url: self.url.to_string(),
                message: err.to_string(),
            })?;
        let label = body
            .pointer(pointer)
            .and_then(Value::as_str)
            .ok_or_else(|| HttpProbeError::MissingState {
                url: self.url.to_string(),
                pointer: pointer.to_owned(),
            })?
            .to_owned();

        Ok(Observation::found(
            HttpSnapshot {
                status: status.as_u16(),
                body: Some(body),
            },
            label,
        ))
    }
}
