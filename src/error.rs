//! Error taxonomy for API requests.
//!
//! Every failure the engine reports is a single [`Error`]. Transport failures
//! become [`Error::Connection`] or [`Error::Timeout`]; non-success HTTP
//! responses become [`Error::Api`] wrapping an [`ApiError`] whose
//! [`ApiErrorKind`] is derived from the status code.
//!
//! # Status Code Mapping
//!
//! | Status | Kind |
//! |--------|------|
//! | 400 | [`ApiErrorKind::BadRequest`] |
//! | 401 | [`ApiErrorKind::Authentication`] |
//! | 403 | [`ApiErrorKind::PermissionDenied`] |
//! | 404 | [`ApiErrorKind::NotFound`] |
//! | 409 | [`ApiErrorKind::Conflict`] |
//! | 422 | [`ApiErrorKind::UnprocessableEntity`] |
//! | 429 | [`ApiErrorKind::RateLimit`] |
//! | other 5xx | [`ApiErrorKind::InternalServer`] |
//! | anything else | [`ApiErrorKind::Api`] |

use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::ConfigError;
use crate::job::JobKind;
use crate::retry::{MAX_RETRY_AFTER, parse_retry_after};

/// Response header carrying the server-side correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Errors returned by the transport, the poller and the pagination cursors.
#[derive(Debug, Error)]
pub enum Error {
    /// The server could not be reached or the connection broke mid-request.
    #[error("connection error: {message}")]
    Connection {
        /// Human-readable description of the failure.
        message: String,
        /// Whether another attempt may succeed (DNS failures, resets).
        retryable: bool,
        /// The underlying HTTP library error, when there is one.
        #[source]
        source: Option<reqwest::Error>,
    },

    /// A request, or a polled job, ran out of time.
    #[error("{message}")]
    Timeout {
        /// Human-readable description, including the job id for poll timeouts.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error(transparent)]
    Api(Box<ApiError>),

    /// `next_page()` was called on the last page.
    #[error("no more pages: page {page} is the last page of {total} items")]
    NoMorePages {
        /// Page number of the exhausted cursor.
        page: u32,
        /// Total items reported by the server.
        total: u64,
    },

    /// A job status without a refresh capability was handed to the poller.
    #[error("{kind} {id} cannot be polled: {reason}")]
    NotPollable {
        /// What kind of job the status describes.
        kind: JobKind,
        /// The job id.
        id: String,
        /// Why the status cannot be refreshed.
        reason: &'static str,
    },

    /// A success response body was not the JSON the caller asked for.
    #[error("failed to decode HTTP {status} response body: {source}")]
    Decode {
        /// Status code of the response that failed to decode.
        status: u16,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// A response decoded as JSON but is missing required fields.
    #[error("malformed response: {reason}")]
    MalformedResponse {
        /// What was wrong with the payload.
        reason: String,
    },

    /// The request could not be assembled (bad path, bad multipart part).
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// What was wrong with the request.
        reason: String,
    },

    /// Client configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Creates a connection error without an underlying library error.
    pub fn connection(message: impl Into<String>, retryable: bool) -> Self {
        Self::Connection {
            message: message.into(),
            retryable,
            source: None,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Creates a malformed-response error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
        }
    }

    /// Creates an invalid-request error.
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Creates the timeout raised when a polled job outlives its budget.
    pub(crate) fn job_timeout(kind: JobKind, id: &str, timeout: Duration) -> Self {
        Self::timeout(format!(
            "{kind} {id} did not complete within {} seconds",
            timeout.as_secs_f64()
        ))
    }

    /// Converts a failed `reqwest` send into the taxonomy.
    ///
    /// Timeouts map to [`Error::Timeout`]. Everything else is a connection
    /// error; request-construction and TLS failures are marked fatal because
    /// repeating them cannot help.
    pub(crate) fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::timeout(format!("request timed out: {error}"));
        }
        let retryable = !(error.is_builder() || is_tls_error(&error));
        Self::Connection {
            message: error.to_string(),
            retryable,
            source: Some(error),
        }
    }

    /// Returns the HTTP status code, if the error came from a response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api(api) => Some(api.status()),
            Self::Decode { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the server correlation id, if the error came from a response.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.as_api().and_then(ApiError::request_id)
    }

    /// Returns the API error details, if this is an [`Error::Api`].
    #[must_use]
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(api) => Some(api),
            _ => None,
        }
    }

    /// Returns the API error kind, if this is an [`Error::Api`].
    #[must_use]
    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        self.as_api().map(ApiError::kind)
    }
}

impl From<ApiError> for Error {
    fn from(error: ApiError) -> Self {
        Self::Api(Box::new(error))
    }
}

/// Checks if a reqwest error is a TLS/certificate error.
fn is_tls_error(error: &reqwest::Error) -> bool {
    let error_string = error.to_string().to_lowercase();
    error_string.contains("certificate")
        || error_string.contains("tls")
        || error_string.contains("ssl")
        || error_string.contains("handshake")
}

/// Classification of a non-success HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// HTTP 400.
    BadRequest,
    /// HTTP 401.
    Authentication,
    /// HTTP 403.
    PermissionDenied,
    /// HTTP 404.
    NotFound,
    /// HTTP 409.
    Conflict,
    /// HTTP 422.
    UnprocessableEntity,
    /// HTTP 429; see [`ApiError::rate_limit`].
    RateLimit,
    /// Any 5xx.
    InternalServer,
    /// Catch-all for codes without a dedicated kind (e.g. 418).
    Api,
}

impl ApiErrorKind {
    /// Maps a status code to its kind.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 => Self::Authentication,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            409 => Self::Conflict,
            422 => Self::UnprocessableEntity,
            429 => Self::RateLimit,
            500..=599 => Self::InternalServer,
            _ => Self::Api,
        }
    }

    /// Short human-readable name.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::BadRequest => "bad request",
            Self::Authentication => "authentication failed",
            Self::PermissionDenied => "permission denied",
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::UnprocessableEntity => "unprocessable entity",
            Self::RateLimit => "rate limit exceeded",
            Self::InternalServer => "internal server error",
            Self::Api => "API error",
        }
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Body of an error response: parsed JSON when possible, raw text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// The body parsed as JSON.
    Json(Value),
    /// The body was not JSON.
    Text(String),
}

impl ResponseBody {
    fn parse(raw: &[u8]) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }
        match serde_json::from_slice(raw) {
            Ok(value) => Some(Self::Json(value)),
            Err(_) => Some(Self::Text(String::from_utf8_lossy(raw).into_owned())),
        }
    }

    /// Returns the JSON value, if the body parsed as JSON.
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }
}

/// Rate-limit metadata attached to 429 responses.
///
/// Every field is optional; `None` means the server did not say, or said
/// something unparseable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// How long to wait, from `Retry-After` or the body's `retryAfter`.
    pub retry_after: Option<Duration>,
    /// Which window was exceeded (`minute`, `hour`, `day`).
    pub limit_type: Option<String>,
    /// Requests allowed in the window.
    pub limit: Option<u64>,
    /// Requests left in the window.
    pub remaining: Option<u64>,
    /// When the window resets (Unix timestamp).
    pub reset_time: Option<i64>,
}

impl RateLimitInfo {
    fn from_parts(headers: &HeaderMap, body: Option<&ResponseBody>) -> Self {
        let fields = body
            .and_then(ResponseBody::as_json)
            .and_then(Value::as_object);
        let field = |name: &str| fields.and_then(|map| field_ignore_case(map, name));

        let header_hint = headers
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);
        let retry_after = header_hint.or_else(|| field("retryAfter").and_then(seconds_from_json));

        Self {
            retry_after,
            limit_type: field("limitType")
                .and_then(Value::as_str)
                .map(str::to_string),
            limit: field("limit").and_then(Value::as_u64),
            remaining: field("remaining").and_then(Value::as_u64),
            reset_time: field("resetTime").and_then(Value::as_i64),
        }
    }
}

fn field_ignore_case<'a>(map: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value)
}

fn seconds_from_json(value: &Value) -> Option<Duration> {
    match value {
        Value::Number(number) => number
            .as_f64()
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| Duration::from_secs_f64(secs.min(MAX_RETRY_AFTER.as_secs_f64()))),
        Value::String(text) => parse_retry_after(text),
        _ => None,
    }
}

/// A non-success HTTP response, classified.
///
/// Built once by [`ApiError::from_response`] when the transport gives up on a
/// request; never modified afterwards.
#[derive(Debug, Clone)]
pub struct ApiError {
    kind: ApiErrorKind,
    status: u16,
    message: String,
    request_id: Option<String>,
    body: Option<ResponseBody>,
    headers: HeaderMap,
    rate_limit: Option<RateLimitInfo>,
}

impl ApiError {
    /// Classifies a response from its status, headers and raw body.
    ///
    /// The message is taken from `error.message`, `message` or `detail` in a
    /// JSON body, falling back to the raw body text and finally `HTTP <code>`.
    #[must_use]
    pub fn from_response(status: u16, headers: HeaderMap, raw_body: &[u8]) -> Self {
        let kind = ApiErrorKind::from_status(status);
        let body = ResponseBody::parse(raw_body);
        let message = extract_message(body.as_ref(), raw_body, status);
        let request_id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let rate_limit =
            (kind == ApiErrorKind::RateLimit).then(|| RateLimitInfo::from_parts(&headers, body.as_ref()));

        Self {
            kind,
            status,
            message,
            request_id,
            body,
            headers,
            rate_limit,
        }
    }

    /// The classification of this response.
    #[must_use]
    pub fn kind(&self) -> ApiErrorKind {
        self.kind
    }

    /// The HTTP status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// The human-readable message extracted from the body.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The `X-Request-ID` response header, if present.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// The response body, if it was not empty.
    #[must_use]
    pub fn body(&self) -> Option<&ResponseBody> {
        self.body.as_ref()
    }

    /// All response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Rate-limit metadata; only present for [`ApiErrorKind::RateLimit`].
    #[must_use]
    pub fn rate_limit(&self) -> Option<&RateLimitInfo> {
        self.rate_limit.as_ref()
    }

    /// Shortcut for the rate-limit retry-after value.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.rate_limit.as_ref().and_then(|info| info.retry_after)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.request_id {
            Some(id) => write!(
                f,
                "{} (HTTP {}, request {id}): {}",
                self.kind, self.status, self.message
            ),
            None => write!(f, "{} (HTTP {}): {}", self.kind, self.status, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

fn extract_message(body: Option<&ResponseBody>, raw_body: &[u8], status: u16) -> String {
    if let Some(value) = body.and_then(ResponseBody::as_json) {
        let candidates = [
            value.pointer("/error/message"),
            value.get("message"),
            value.get("detail"),
        ];
        if let Some(message) = candidates.into_iter().flatten().find_map(Value::as_str) {
            return message.to_string();
        }
    }

    let text = String::from_utf8_lossy(raw_body);
    let text = text.trim();
    if text.is_empty() {
        format!("HTTP {status}")
    } else {
        text.to_string()
    }
}
