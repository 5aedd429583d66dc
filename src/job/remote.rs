//! Status fetchers backed by the HTTP transports.

use async_trait::async_trait;

use super::{BlockingStatusFetcher, JobKind, JobStatus, StatusFetcher};
use crate::error::Error;
use crate::http::{BlockingTransport, Transport};

/// Re-fetches a job through its status endpoint on an async [`Transport`].
#[derive(Debug, Clone)]
pub struct RemoteStatusFetcher {
    transport: Transport,
    kind: JobKind,
}

impl RemoteStatusFetcher {
    /// Binds a fetcher for jobs of `kind` to `transport`.
    #[must_use]
    pub fn new(transport: Transport, kind: JobKind) -> Self {
        Self { transport, kind }
    }
}

#[async_trait]
impl StatusFetcher for RemoteStatusFetcher {
    async fn fetch(&self, id: &str) -> Result<JobStatus, Error> {
        self.transport.job_status(self.kind, id).await
    }
}

/// Re-fetches a job through its status endpoint on a [`BlockingTransport`].
#[derive(Debug, Clone)]
pub struct BlockingRemoteStatusFetcher {
    transport: BlockingTransport,
    kind: JobKind,
}

impl BlockingRemoteStatusFetcher {
    /// Binds a fetcher for jobs of `kind` to `transport`.
    #[must_use]
    pub fn new(transport: BlockingTransport, kind: JobKind) -> Self {
        Self { transport, kind }
    }
}

impl BlockingStatusFetcher for BlockingRemoteStatusFetcher {
    fn fetch(&self, id: &str) -> Result<JobStatus, Error> {
        self.transport.job_status(self.kind, id)
    }
}
