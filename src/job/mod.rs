//! Asynchronous job status and polling.
//!
//! Long-running operations (conversion, identification, step execution)
//! return a [`JobStatus`] immediately. A status created by a transport
//! carries a [`Refresher`], the capability to re-fetch the job by id; the
//! [`poller`] uses it to wait for a terminal state.
//!
//! # Example
//!
//! ```no_run
//! use docutray::{ApiRequest, ClientConfig, JobKind, OnUpdate, PollOptions, Transport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Transport::new(ClientConfig::builder("sk_live_example").build()?);
//! let status = transport.job_status(JobKind::Conversion, "conv_123").await?;
//! let done = status
//!     .wait(PollOptions::default(), OnUpdate::sync(|s| println!("{}", s.state())))
//!     .await?;
//! println!("success: {}", done.is_success());
//! # Ok(())
//! # }
//! ```

pub mod poller;
mod remote;

pub use poller::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT, OnUpdate, PollOptions};
pub use remote::{BlockingRemoteStatusFetcher, RemoteStatusFetcher};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::Error;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    /// Accepted, not started.
    Enqueued,
    /// Running.
    Processing,
    /// Finished with data.
    Success,
    /// Finished with an error.
    Error,
}

impl JobState {
    /// True for [`Success`](Self::Success) and [`Error`](Self::Error).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enqueued => "ENQUEUED",
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of job a status describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Document conversion.
    Conversion,
    /// Document type identification.
    Identification,
    /// Workflow step execution.
    StepExecution,
}

impl JobKind {
    /// Human-readable name used in messages.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Conversion => "Conversion",
            Self::Identification => "Identification",
            Self::StepExecution => "Step execution",
        }
    }

    /// Payload fields that may hold the job id, highest priority first.
    #[must_use]
    pub fn id_fields(self) -> &'static [&'static str] {
        match self {
            Self::Conversion => &["conversion_id", "id"],
            Self::Identification => &["identification_id", "id"],
            Self::StepExecution => &["execution_id", "id", "conversion_id"],
        }
    }

    /// Status endpoint path for job `id`.
    #[must_use]
    pub fn status_path(self, id: &str) -> String {
        match self {
            Self::Conversion => format!("/api/convert-async/status/{id}"),
            Self::Identification => format!("/api/identify-async/status/{id}"),
            Self::StepExecution => format!("/api/steps-async/status/{id}"),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Re-fetches a job status by id (async).
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    /// Fetches the current status of job `id`.
    async fn fetch(&self, id: &str) -> Result<JobStatus, Error>;
}

/// Re-fetches a job status by id (blocking).
///
/// Implemented for every `Fn(&str) -> Result<JobStatus, Error>` closure.
pub trait BlockingStatusFetcher: Send + Sync {
    /// Fetches the current status of job `id`.
    fn fetch(&self, id: &str) -> Result<JobStatus, Error>;
}

impl<F> BlockingStatusFetcher for F
where
    F: Fn(&str) -> Result<JobStatus, Error> + Send + Sync,
{
    fn fetch(&self, id: &str) -> Result<JobStatus, Error> {
        self(id)
    }
}

/// The capability to refresh a status, bound to one execution mode.
#[derive(Clone)]
pub enum Refresher {
    /// Refreshes through an async fetcher.
    Async(Arc<dyn StatusFetcher>),
    /// Refreshes through a blocking fetcher.
    Blocking(Arc<dyn BlockingStatusFetcher>),
}

impl Refresher {
    /// Wraps an async fetcher.
    pub fn from_async(fetcher: impl StatusFetcher + 'static) -> Self {
        Self::Async(Arc::new(fetcher))
    }

    /// Wraps a blocking fetcher (or a closure).
    pub fn from_blocking(fetcher: impl BlockingStatusFetcher + 'static) -> Self {
        Self::Blocking(Arc::new(fetcher))
    }

    fn mode(&self) -> &'static str {
        match self {
            Self::Async(_) => "async",
            Self::Blocking(_) => "blocking",
        }
    }
}

impl fmt::Debug for Refresher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Refresher({})", self.mode())
    }
}

/// Snapshot of an asynchronous job.
///
/// Each poll produces a new value; nothing mutates a status in place. The
/// refresher is ignored by equality and serialization.
#[derive(Clone)]
pub struct JobStatus {
    kind: JobKind,
    id: String,
    state: JobState,
    data: Option<Value>,
    error: Option<Value>,
    request_timestamp: Option<String>,
    response_timestamp: Option<String>,
    extra: Map<String, Value>,
    refresher: Option<Refresher>,
}

impl JobStatus {
    /// Creates a status with no payload and no refresher.
    pub fn new(kind: JobKind, id: impl Into<String>, state: JobState) -> Self {
        Self {
            kind,
            id: id.into(),
            state,
            data: None,
            error: None,
            request_timestamp: None,
            response_timestamp: None,
            extra: Map::new(),
            refresher: None,
        }
    }

    /// Builds a status from a server payload.
    ///
    /// The id is taken from the first of [`JobKind::id_fields`] present in
    /// the payload, else from `fallback_id` (the id that was polled).
    /// Unrecognized fields are kept in [`extra`](Self::extra).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] if the payload is not an object,
    /// has no usable id, or has a missing or unknown `status`.
    pub fn from_json(kind: JobKind, value: Value, fallback_id: Option<&str>) -> Result<Self, Error> {
        let Value::Object(mut fields) = value else {
            return Err(Error::malformed(format!("{kind} status is not a JSON object")));
        };

        let id = kind
            .id_fields()
            .iter()
            .find_map(|name| fields.get(*name).and_then(id_text).map(|id| (*name, id)))
            .map(|(name, id)| {
                fields.remove(name);
                id
            })
            .or_else(|| fallback_id.map(str::to_string))
            .ok_or_else(|| Error::malformed(format!("{kind} status carries no job id")))?;

        let state = match fields.remove("status") {
            Some(raw) => serde_json::from_value::<JobState>(raw.clone()).map_err(|_| {
                Error::malformed(format!("{kind} {id} has unknown status {raw}"))
            })?,
            None => return Err(Error::malformed(format!("{kind} {id} has no status"))),
        };

        Ok(Self {
            kind,
            id,
            state,
            data: take_present(&mut fields, "data"),
            error: take_present(&mut fields, "error"),
            request_timestamp: take_text(&mut fields, "request_timestamp"),
            response_timestamp: take_text(&mut fields, "response_timestamp"),
            extra: fields,
            refresher: None,
        })
    }

    /// Attaches a refresh capability, replacing any existing one.
    #[must_use]
    pub fn with_refresher(mut self, refresher: Refresher) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Sets the result data.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Sets the error detail.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<Value>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// What kind of job this is.
    #[must_use]
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Canonical job id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Result data (present on success).
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Error detail as sent by the server: a string or an object.
    #[must_use]
    pub fn error(&self) -> Option<&Value> {
        self.error.as_ref()
    }

    /// Error detail flattened to text.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|error| match error {
            Value::String(text) => text.clone(),
            Value::Object(map) => map
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| error.to_string(), str::to_string),
            other => other.to_string(),
        })
    }

    /// When the job was started, as sent by the server.
    #[must_use]
    pub fn request_timestamp(&self) -> Option<&str> {
        self.request_timestamp.as_deref()
    }

    /// When the job finished, as sent by the server.
    #[must_use]
    pub fn response_timestamp(&self) -> Option<&str> {
        self.response_timestamp.as_deref()
    }

    /// Every other field of the payload (e.g. `document_type_code`).
    #[must_use]
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// The refresh capability, if any.
    #[must_use]
    pub fn refresher(&self) -> Option<&Refresher> {
        self.refresher.as_ref()
    }

    /// True once the job reached SUCCESS or ERROR.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state.is_terminal()
    }

    /// True if the job finished with SUCCESS.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == JobState::Success
    }

    /// True if the job finished with ERROR.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.state == JobState::Error
    }

    /// Polls until the job completes. See [`poller::wait`].
    ///
    /// # Errors
    ///
    /// Same as [`poller::wait`].
    pub async fn wait(&self, options: PollOptions, on_update: OnUpdate<'_>) -> Result<JobStatus, Error> {
        poller::wait(self.clone(), options, on_update).await
    }

    /// Polls until the job completes, blocking the thread. See
    /// [`poller::wait_blocking`].
    ///
    /// # Errors
    ///
    /// Same as [`poller::wait_blocking`].
    pub fn wait_blocking(
        &self,
        options: PollOptions,
        on_update: impl FnMut(&JobStatus),
    ) -> Result<JobStatus, Error> {
        poller::wait_blocking(self.clone(), options, on_update)
    }

    /// The status as a JSON object, with the id under the kind's primary
    /// id field.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut out = self.extra.clone();
        let id_field = self.kind.id_fields().first().copied().unwrap_or("id");
        out.insert(id_field.to_string(), Value::String(self.id.clone()));
        out.insert("status".to_string(), Value::String(self.state.as_str().to_string()));
        let optional = [
            ("data", self.data.clone()),
            ("error", self.error.clone()),
            ("request_timestamp", self.request_timestamp.clone().map(Value::String)),
            ("response_timestamp", self.response_timestamp.clone().map(Value::String)),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                out.insert(name.to_string(), value);
            }
        }
        Value::Object(out)
    }

    pub(crate) fn inherit_refresher(&mut self, refresher: Option<&Refresher>) {
        if self.refresher.is_none() {
            self.refresher = refresher.cloned();
        }
    }
}

impl PartialEq for JobStatus {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.id == other.id
            && self.state == other.state
            && self.data == other.data
            && self.error == other.error
            && self.request_timestamp == other.request_timestamp
            && self.response_timestamp == other.response_timestamp
            && self.extra == other.extra
    }
}

impl fmt::Debug for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobStatus")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("state", &self.state)
            .field("data", &self.data)
            .field("error", &self.error)
            .field("extra", &self.extra)
            .field("refresher", &self.refresher)
            .finish_non_exhaustive()
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn take_present(fields: &mut Map<String, Value>, name: &str) -> Option<Value> {
    fields.remove(name).filter(|value| !value.is_null())
}

fn take_text(fields: &mut Map<String, Value>, name: &str) -> Option<String> {
    match fields.remove(name)? {
        Value::String(text) => Some(text),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
