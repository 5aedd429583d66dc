//! HTTP transport with retry and error mapping.
//!
//! This module provides two transports with identical semantics:
//!
//! - [`Transport`] - async, built on `reqwest::Client` and `tokio` sleeps
//! - [`BlockingTransport`] - blocking, built on `reqwest::blocking::Client`
//!
//! Both resolve an [`ApiRequest`] against the configured base URL, send it
//! up to `max_retries + 1` times, and return either the successful
//! [`RawResponse`] or a classified [`Error`](crate::Error).
//!
//! # Example
//!
//! ```no_run
//! use docutray::{ApiRequest, ClientConfig, Transport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::builder("sk_live_example").build()?;
//! let transport = Transport::new(config);
//! let response = transport.execute(&ApiRequest::get("/api/document-types")).await?;
//! println!("HTTP {}", response.status());
//! # Ok(())
//! # }
//! ```

mod attempt;
mod blocking;
pub mod constants;
mod request;
mod response;
mod transport;

pub use attempt::{AttemptOutcome, RetryCause, evaluate};
pub use blocking::BlockingTransport;
pub use constants::{CONNECT_TIMEOUT, DEFAULT_BASE_URL, REQUEST_TIMEOUT};
pub use request::{ApiRequest, FilePart, MultipartForm, RequestBody};
pub use response::RawResponse;
pub use transport::Transport;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};

use crate::config::ClientConfig;
use crate::error::Error;

/// Headers every request carries: bearer auth and `Accept: application/json`.
pub(crate) fn default_headers(config: &ClientConfig) -> Result<HeaderMap, Error> {
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key()))
        .map_err(|_| Error::invalid_request("API key contains characters not allowed in a header"))?;
    auth.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, auth);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    Ok(headers)
}
