//! User-Agent string shared by the async and blocking transports.

/// Default User-Agent for API requests (identifies the client and its version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("docutray-rust/{version}")
}
