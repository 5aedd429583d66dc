//! Constants for the HTTP transport (endpoint and timeouts).

use std::time::Duration;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.docutray.com";

/// Default HTTP connect timeout (5 seconds).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default per-attempt request timeout (60 seconds for large documents).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
