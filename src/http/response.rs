//! Raw response returned by the transports.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;

use crate::error::{ApiError, Error, REQUEST_ID_HEADER};
use crate::retry::parse_retry_after;

/// A fully read HTTP response: status, headers and body bytes.
#[derive(Debug, Clone)]
pub struct RawResponse {
    status: u16,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl RawResponse {
    /// Wraps an already-read response.
    #[must_use]
    pub fn new(status: u16, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// HTTP status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Body bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// True for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The `X-Request-ID` header, if present.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body decoded as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|source| Error::Decode {
            status: self.status,
            source,
        })
    }

    pub(crate) fn retry_after(&self) -> Option<std::time::Duration> {
        self.headers
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after)
    }

    pub(crate) fn into_api_error(self) -> ApiError {
        ApiError::from_response(self.status, self.headers, &self.body)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::Value;

    #[test]
    fn test_success_range() {
        assert!(RawResponse::new(200, HeaderMap::new(), Vec::new()).is_success());
        assert!(RawResponse::new(204, HeaderMap::new(), Vec::new()).is_success());
        assert!(!RawResponse::new(302, HeaderMap::new(), Vec::new()).is_success());
        assert!(!RawResponse::new(500, HeaderMap::new(), Vec::new()).is_success());
    }

    #[test]
    fn test_json_decode_and_failure() {
        let response = RawResponse::new(200, HeaderMap::new(), br#"{"ok": true}"#.to_vec());
        let value: Value = response.json().unwrap();
        assert_eq!(value["ok"], Value::Bool(true));

        let response = RawResponse::new(200, HeaderMap::new(), b"<html>".to_vec());
        let err = response.json::<Value>().unwrap_err();
        assert!(matches!(err, Error::Decode { status: 200, .. }));
    }

    #[test]
    fn test_request_id_and_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("req_9"));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        let response = RawResponse::new(503, headers, Vec::new());
        assert_eq!(response.request_id(), Some("req_9"));
        assert_eq!(response.retry_after(), Some(Duration::from_secs(3)));
    }
}
