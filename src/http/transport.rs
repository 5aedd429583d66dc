//! Async transport built on `reqwest::Client`.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::BoxFuture;
use reqwest::Client;
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
use crate::job::{JobKind, JobStatus, Refresher, RemoteStatusFetcher};
use crate::pagination::{AsyncPage, AsyncPageFetcher, ListEnvelope, ListQuery};
use crate::user_agent;

/// Async HTTP transport with retry and error mapping.
///
/// Cloning is cheap and yields a handle to the same transport: clones share
/// the configuration and the connection pool. The pool is created on the
/// first request and released by [`close`](Self::close).
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    client: Mutex<Option<Client>>,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("config", &self.inner.config)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Transport {
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

    fn lock_client(&self) -> std::sync::MutexGuard<'_, Option<Client>> {
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
    /// Returns [`Error::Api`] for a non-success status that is not retryable
    /// or outlived the retry budget, [`Error::Timeout`] / [`Error::Connection`]
    /// for transport failures, and [`Error::InvalidRequest`] if the request
    /// cannot be assembled.
    #[instrument(skip(self, request), fields(method = %request.method(), path = %request.path()))]
    pub async fn execute(&self, request: &ApiRequest) -> Result<RawResponse, Error> {
        let config = &self.inner.config;
        let url = request.url(config.base_url())?;
        let client = self.client()?;
        let retry = config.retry();

        for attempt in 0..=retry.max_retries() {
            let result = send(&client, request, &url).await;
            match evaluate(attempt, retry, result) {
                AttemptOutcome::Success(response) => {
                    debug!(status = response.status(), attempt, "request succeeded");
                    return Ok(response);
                }
                AttemptOutcome::Retry { cause, delay } => {
                    log_retry(config.log_retries(), attempt, retry.max_retries(), delay, &cause);
                    tokio::time::sleep(delay).await;
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
    /// Returns the errors of [`execute`](Self::execute), plus [`Error::Decode`]
    /// if the body is not valid JSON for `T`.
    pub async fn request_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, Error> {
        self.execute(request).await?.json()
    }

    /// Sends a job-starting request and returns its pollable status.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`execute`](Self::execute), plus
    /// [`Error::MalformedResponse`] if the reply carries no job id or state.
    #[instrument(skip(self, request), fields(kind = %kind, path = %request.path()))]
    pub async fn start_job(&self, kind: JobKind, request: &ApiRequest) -> Result<JobStatus, Error> {
        let value: Value = self.request_json(request).await?;
        let status = JobStatus::from_json(kind, value, None)?;
        info!(id = status.id(), state = %status.state(), "job started");
        Ok(status.with_refresher(self.refresher(kind)))
    }

    /// Fetches the current status of a job.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`execute`](Self::execute), plus
    /// [`Error::MalformedResponse`] if the reply carries no state.
    #[instrument(skip(self), fields(kind = %kind))]
    pub async fn job_status(&self, kind: JobKind, id: &str) -> Result<JobStatus, Error> {
        let request = ApiRequest::get(kind.status_path(id));
        let value: Value = self.request_json(&request).await?;
        let status = JobStatus::from_json(kind, value, Some(id))?;
        debug!(id = status.id(), state = %status.state(), "job status fetched");
        Ok(status.with_refresher(self.refresher(kind)))
    }

    /// Fetches the first requested page of a listing endpoint.
    ///
    /// Later pages reuse the query's filters through this transport.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`execute`](Self::execute), plus
    /// [`Error::MalformedResponse`] for an invalid page envelope.
    #[instrument(skip(self, query), fields(path = query.path(), page = query.page()))]
    pub async fn list<T>(&self, query: ListQuery) -> Result<AsyncPage<T>, Error>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let page = query.page();
        fetch_page(self.clone(), Arc::new(query), page).await
    }

    fn refresher(&self, kind: JobKind) -> Refresher {
        Refresher::from_async(RemoteStatusFetcher::new(self.clone(), kind))
    }
}

async fn send(client: &Client, request: &ApiRequest, url: &Url) -> Result<RawResponse, Error> {
    let builder = client.request(request.method().clone(), url.clone());
    let builder = match request.body() {
        RequestBody::Empty => builder,
        RequestBody::Json(body) => builder.json(body),
        RequestBody::Multipart(form) => builder.multipart(form.to_async_form()?),
    };

    let response = builder.send().await.map_err(Error::from_transport)?;
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response.bytes().await.map_err(Error::from_transport)?;
    Ok(RawResponse::new(status, headers, body.to_vec()))
}

fn fetch_page<T>(
    transport: Transport,
    query: Arc<ListQuery>,
    page: u32,
) -> BoxFuture<'static, Result<AsyncPage<T>, Error>>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    Box::pin(async move {
        let envelope: ListEnvelope<T> = transport.request_json(&query.request(page)).await?;
        let (items, info) = envelope.into_parts()?;
        debug!(path = query.path(), page, items = items.len(), total = info.total(), "page fetched");
        let fetcher: AsyncPageFetcher<T> =
            Arc::new(move |next| fetch_page(transport.clone(), Arc::clone(&query), next));
        Ok(AsyncPage::new(items, info, fetcher))
    })
}
