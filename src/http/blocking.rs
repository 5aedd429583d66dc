//! Blocking transport built on `reqwest::blocking::Client`.
//!
//! Same semantics as the async [`Transport`](super::Transport); the retry
//! wait is a thread sleep. Do not call it from inside an async runtime
//! thread; use `tokio::task::spawn_blocking` there.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument};
use url::Url;

use super::attempt::{AttemptOutcome, evaluate, exhausted, log_retry};
use super::request::{ApiRequest, RequestBody};
use super::response::RawResponse;
use super::default_headers;
use crate::config::ClientConfig;
use crate::error::Error;
use crate::job::{BlockingRemoteStatusFetcher, JobKind, JobStatus, Refresher};
use crate::pagination::{ListEnvelope, ListQuery, Page, PageFetcher};
use crate::user_agent;

/// Blocking HTTP transport with retry and error mapping.
///
/// Clones share the configuration and the connection pool.
#[derive(Clone)]
pub struct BlockingTransport {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    client: Mutex<Option<Client>>,
}

impl fmt::Debug for BlockingTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingTransport")
            .field("config", &self.inner.config)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl BlockingTransport {
    /// Creates a transport; no connection is opened until the first request.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                client: Mutex::new(None),
            }),
        }
    }

    /// The configuration this transport was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Whether a connection pool is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lock_client().is_some()
    }

    /// Releases the connection pool. The next request opens a new one.
    pub fn close(&self) {
        if self.lock_client().take().is_some() {
            debug!("connection pool released");
        }
    }

    fn lock_client(&self) -> MutexGuard<'_, Option<Client>> {
        self.inner
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn client(&self) -> Result<Client, Error> {
        let mut slot = self.lock_client();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let config = &self.inner.config;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .default_headers(default_headers(config)?)
            .build()
            .map_err(Error::from_transport)?;
        debug!(base_url = %config.base_url(), "connection pool opened");
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Sends a request, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Same as [`Transport::execute`](super::Transport::execute).
    #[instrument(skip(self, request), fields(method = %request.method(), path = %request.path()))]
    pub fn execute(&self, request: &ApiRequest) -> Result<RawResponse, Error> {
        let config = &self.inner.config;
        let url = request.url(config.base_url())?;
        let client = self.client()?;
        let retry = config.retry();

        for attempt in 0..=retry.max_retries() {
            let result = send(&client, request, &url);
            match evaluate(attempt, retry, result) {
                AttemptOutcome::Success(response) => {
                    debug!(status = response.status(), attempt, "request succeeded");
                    return Ok(response);
                }
                AttemptOutcome::Retry { cause, delay } => {
                    log_retry(config.log_retries(), attempt, retry.max_retries(), delay, &cause);
                    std::thread::sleep(delay);
                }
                AttemptOutcome::Terminal(error) => {
                    debug!(error = %error, attempt, "request failed");
                    return Err(error);
                }
            }
        }

        Err(exhausted())
    }

    /// Sends a request and decodes the JSON body.
    ///
    /// # Errors
    ///
    /// Same as [`Transport::request_json`](super::Transport::request_json).
    pub fn request_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, Error> {
        self.execute(request)?.json()
    }

    /// Sends a job-starting request and returns its pollable status.
    ///
    /// # Errors
    ///
    /// Same as [`Transport::start_job`](super::Transport::start_job).
    #[instrument(skip(self, request), fields(kind = %kind, path = %request.path()))]
    pub fn start_job(&self, kind: JobKind, request: &ApiRequest) -> Result<JobStatus, Error> {
        let value: Value = self.request_json(request)?;
        let status = JobStatus::from_json(kind, value, None)?;
        info!(id = status.id(), state = %status.state(), "job started");
        Ok(status.with_refresher(self.refresher(kind)))
    }

    /// Fetches the current status of a job.
    ///
    /// # Errors
    ///
    /// Same as [`Transport::job_status`](super::Transport::job_status).
    #[instrument(skip(self), fields(kind = %kind))]
    pub fn job_status(&self, kind: JobKind, id: &str) -> Result<JobStatus, Error> {
        let request = ApiRequest::get(kind.status_path(id));
        let value: Value = self.request_json(&request)?;
        let status = JobStatus::from_json(kind, value, Some(id))?;
        debug!(id = status.id(), state = %status.state(), "job status fetched");
        Ok(status.with_refresher(self.refresher(kind)))
    }

    /// Fetches the first requested page of a listing endpoint.
    ///
    /// # Errors
    ///
    /// Same as [`Transport::list`](super::Transport::list).
    #[instrument(skip(self, query), fields(path = query.path(), page = query.page()))]
    pub fn list<T>(&self, query: ListQuery) -> Result<Page<T>, Error>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let page = query.page();
        fetch_page(self.clone(), Arc::new(query), page)
    }

    fn refresher(&self, kind: JobKind) -> Refresher {
        Refresher::from_blocking(BlockingRemoteStatusFetcher::new(self.clone(), kind))
    }
}

fn send(client: &Client, request: &ApiRequest, url: &Url) -> Result<RawResponse, Error> {
    let builder = client.request(request.method().clone(), url.clone());
    let builder = match request.body() {
        RequestBody::Empty => builder,
        RequestBody::Json(body) => builder.json(body),
        RequestBody::Multipart(form) => builder.multipart(form.to_blocking_form()?),
    };

    let response = builder.send().map_err(Error::from_transport)?;
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response.bytes().map_err(Error::from_transport)?;
    Ok(RawResponse::new(status, headers, body.to_vec()))
}

fn fetch_page<T>(transport: BlockingTransport, query: Arc<ListQuery>, page: u32) -> Result<Page<T>, Error>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    let envelope: ListEnvelope<T> = transport.request_json(&query.request(page))?;
    let (items, info) = envelope.into_parts()?;
    debug!(path = query.path(), page, items = items.len(), total = info.total(), "page fetched");
    let fetcher: PageFetcher<T> =
        Arc::new(move |next| fetch_page(transport.clone(), Arc::clone(&query), next));
    Ok(Page::new(items, info, fetcher))
}
