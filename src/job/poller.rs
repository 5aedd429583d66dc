//! Polling loop that waits for a job to reach a terminal state.
//!
//! Each iteration checks the current status first and only then sleeps,
//! so a status that is already complete returns without any request and
//! the update callback runs exactly once per re-fetch.

use std::future::Future;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use tracing::{debug, info, instrument};

use super::{JobStatus, Refresher};
use crate::error::Error;

/// Default time between polls (2 seconds).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default overall wait budget (5 minutes).
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(300);

/// Poll timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Wait between consecutive re-fetches.
    pub poll_interval: Duration,
    /// Give up once this much time has elapsed.
    pub timeout: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl PollOptions {
    /// Creates options with explicit timing.
    #[must_use]
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Returns a copy with a different poll interval.
    #[must_use]
    pub fn with_poll_interval(self, poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..self
        }
    }

    /// Returns a copy with a different timeout.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }
}

enum Notified<'a> {
    Ready,
    Pending(BoxFuture<'a, ()>),
}

type Callback<'a> = Box<dyn FnMut(&JobStatus) -> Notified<'a> + Send + 'a>;

/// Update callback for the async poller.
///
/// Runs after every re-fetch with the new status, never with the initial
/// one. Build it with [`sync`](Self::sync) for a plain closure or
/// [`awaiting`](Self::awaiting) for a closure returning a future, which the
/// poller awaits before continuing.
pub struct OnUpdate<'a> {
    callback: Option<Callback<'a>>,
}

impl<'a> OnUpdate<'a> {
    /// No callback.
    #[must_use]
    pub fn none() -> Self {
        Self { callback: None }
    }

    /// A callback that completes synchronously.
    pub fn sync<F>(mut callback: F) -> Self
    where
        F: FnMut(&JobStatus) + Send + 'a,
    {
        Self {
            callback: Some(Box::new(move |status: &JobStatus| {
                callback(status);
                Notified::Ready
            })),
        }
    }

    /// A callback whose returned future is awaited before polling resumes.
    pub fn awaiting<F, Fut>(mut callback: F) -> Self
    where
        F: FnMut(&JobStatus) -> Fut + Send + 'a,
        Fut: Future<Output = ()> + Send + 'a,
    {
        Self {
            callback: Some(Box::new(move |status: &JobStatus| {
                Notified::Pending(Box::pin(callback(status)))
            })),
        }
    }

    async fn notify(&mut self, status: &JobStatus) {
        let Some(callback) = self.callback.as_mut() else {
            return;
        };
        if let Notified::Pending(future) = callback(status) {
            future.await;
        }
    }
}

impl Default for OnUpdate<'_> {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for OnUpdate<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnUpdate")
            .field("set", &self.callback.is_some())
            .finish()
    }
}

fn not_pollable(status: &JobStatus, reason: &'static str) -> Error {
    Error::NotPollable {
        kind: status.kind(),
        id: status.id().to_string(),
        reason,
    }
}

/// Polls an async-refreshable status until it completes.
///
/// # Errors
///
/// - [`Error::NotPollable`] if `initial` has no async refresher; checked
///   before anything else.
/// - [`Error::Timeout`] naming the job once `options.timeout` elapses.
/// - Any error from a re-fetch, unchanged.
#[instrument(skip_all, fields(kind = %initial.kind(), id = initial.id()))]
pub async fn wait(
    initial: JobStatus,
    options: PollOptions,
    mut on_update: OnUpdate<'_>,
) -> Result<JobStatus, Error> {
    let fetcher = match initial.refresher() {
        Some(Refresher::Async(fetcher)) => std::sync::Arc::clone(fetcher),
        Some(Refresher::Blocking(_)) => {
            return Err(not_pollable(&initial, "status refreshes through a blocking transport"));
        }
        None => return Err(not_pollable(&initial, "status has no refresh capability")),
    };

    let start = tokio::time::Instant::now();
    let mut current = initial;
    let mut polls = 0_u32;

    loop {
        if current.is_complete() {
            info!(state = %current.state(), polls, "job finished");
            return Ok(current);
        }
        if start.elapsed() >= options.timeout {
            return Err(Error::job_timeout(current.kind(), current.id(), options.timeout));
        }

        tokio::time::sleep(options.poll_interval).await;

        let mut next = fetcher.fetch(current.id()).await?;
        next.inherit_refresher(current.refresher());
        polls += 1;
        debug!(state = %next.state(), polls, "job polled");
        on_update.notify(&next).await;
        current = next;
    }
}

/// Polls a blocking-refreshable status until it completes, sleeping the
/// current thread between polls.
///
/// # Errors
///
/// Same as [`wait`], with [`Error::NotPollable`] for a status that
/// refreshes through an async transport.
#[instrument(skip_all, fields(kind = %initial.kind(), id = initial.id()))]
pub fn wait_blocking(
    initial: JobStatus,
    options: PollOptions,
    mut on_update: impl FnMut(&JobStatus),
) -> Result<JobStatus, Error> {
    let fetcher = match initial.refresher() {
        Some(Refresher::Blocking(fetcher)) => std::sync::Arc::clone(fetcher),
        Some(Refresher::Async(_)) => {
            return Err(not_pollable(&initial, "status refreshes through an async transport"));
        }
        None => return Err(not_pollable(&initial, "status has no refresh capability")),
    };

    let start = Instant::now();
    let mut current = initial;
    let mut polls = 0_u32;

    loop {
        if current.is_complete() {
            info!(state = %current.state(), polls, "job finished");
            return Ok(current);
        }
        if start.elapsed() >= options.timeout {
            return Err(Error::job_timeout(current.kind(), current.id(), options.timeout));
        }

        std::thread::sleep(options.poll_interval);

        let mut next = fetcher.fetch(current.id())?;
        next.inherit_refresher(current.refresher());
        polls += 1;
        debug!(state = %next.state(), polls, "job polled");
        on_update(&next);
        current = next;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::job::{JobKind, JobState, StatusFetcher};

    /// Replays a fixed sequence of states for one job.
    struct Scripted {
        states: Mutex<VecDeque<JobState>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(states: &[JobState]) -> Arc<Self> {
            Arc::new(Self {
                states: Mutex::new(states.iter().copied().collect()),
                calls: AtomicUsize::new(0),
            })
        }

        fn next(&self, id: &str) -> Result<JobStatus, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let state = self
                .states
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(JobState::Processing);
            Ok(JobStatus::new(JobKind::Conversion, id, state))
        }
    }

    struct AsyncScripted(Arc<Scripted>);

    #[async_trait]
    impl StatusFetcher for AsyncScripted {
        async fn fetch(&self, id: &str) -> Result<JobStatus, Error> {
            self.0.next(id)
        }
    }

    fn fast() -> PollOptions {
        PollOptions::new(Duration::from_millis(5), Duration::from_secs(5))
    }

    fn async_status(state: JobState, script: &Arc<Scripted>) -> JobStatus {
        JobStatus::new(JobKind::Conversion, "j1", state)
            .with_refresher(Refresher::from_async(AsyncScripted(Arc::clone(script))))
    }

    fn blocking_status(state: JobState, script: &Arc<Scripted>) -> JobStatus {
        let script = Arc::clone(script);
        JobStatus::new(JobKind::Conversion, "j1", state)
            .with_refresher(Refresher::from_blocking(move |id: &str| script.next(id)))
    }

    // ==================== Defaults Tests ====================

    #[test]
    fn test_default_poll_options() {
        let options = PollOptions::default();
        assert_eq!(options.poll_interval, Duration::from_secs(2));
        assert_eq!(options.timeout, Duration::from_secs(300));
        let tuned = options.with_timeout(Duration::from_secs(60));
        assert_eq!(tuned.timeout, Duration::from_secs(60));
        assert_eq!(tuned.poll_interval, Duration::from_secs(2));
    }

    // ==================== Async Poller Tests ====================

    #[tokio::test]
    async fn test_wait_initial_complete_returns_without_polling() {
        let script = Scripted::new(&[]);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);

        let done = wait(
            async_status(JobState::Success, &script),
            fast(),
            OnUpdate::sync(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await
        .unwrap();

        assert!(done.is_success());
        assert_eq!(script.calls.load(Ordering::SeqCst), 0);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wait_progress_invokes_callback_per_poll() {
        let script = Scripted::new(&[JobState::Processing, JobState::Success]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        let done = wait(
            async_status(JobState::Enqueued, &script),
            fast(),
            OnUpdate::sync(move |status| log.lock().unwrap().push(status.state())),
        )
        .await
        .unwrap();

        assert!(done.is_success());
        assert_eq!(script.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![JobState::Processing, JobState::Success]
        );
        assert!(done.refresher().is_some(), "final status keeps its refresher");
    }

    #[tokio::test]
    async fn test_wait_awaits_async_callback() {
        let script = Scripted::new(&[JobState::Error]);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);

        let done = wait(
            async_status(JobState::Processing, &script),
            fast(),
            OnUpdate::awaiting(move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    tokio::task::yield_now().await;
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
        )
        .await
        .unwrap();

        assert!(done.is_error());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wait_times_out_with_job_id() {
        let script = Scripted::new(&[]);
        let options = PollOptions::new(Duration::from_millis(10), Duration::from_millis(50));

        let err = wait(async_status(JobState::Processing, &script), options, OnUpdate::none())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        let msg = err.to_string();
        assert!(msg.contains("j1"), "Expected job id in: {msg}");
        assert!(msg.contains("Conversion"), "Expected job kind in: {msg}");
    }

    #[tokio::test]
    async fn test_wait_without_refresher_is_not_pollable() {
        let status = JobStatus::new(JobKind::Conversion, "j1", JobState::Success);
        let err = wait(status, fast(), OnUpdate::none()).await.unwrap_err();
        assert!(matches!(err, Error::NotPollable { .. }));
    }

    #[tokio::test]
    async fn test_wait_rejects_blocking_refresher() {
        let script = Scripted::new(&[]);
        let err = wait(blocking_status(JobState::Processing, &script), fast(), OnUpdate::none())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotPollable { .. }));
        assert_eq!(script.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wait_propagates_fetch_error() {
        struct Failing;

        #[async_trait]
        impl StatusFetcher for Failing {
            async fn fetch(&self, _id: &str) -> Result<JobStatus, Error> {
                Err(Error::connection("connection reset", true))
            }
        }

        let status = JobStatus::new(JobKind::Identification, "i1", JobState::Enqueued)
            .with_refresher(Refresher::from_async(Failing));
        let err = wait(status, fast(), OnUpdate::none()).await.unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
    }

    // ==================== Blocking Poller Tests ====================

    #[test]
    fn test_wait_blocking_progress() {
        let script = Scripted::new(&[JobState::Processing, JobState::Success]);
        let mut seen = Vec::new();

        let done = wait_blocking(blocking_status(JobState::Enqueued, &script), fast(), |status| {
            seen.push(status.state());
        })
        .unwrap();

        assert!(done.is_success());
        assert_eq!(seen, vec![JobState::Processing, JobState::Success]);
    }

    #[test]
    fn test_wait_blocking_times_out() {
        let script = Scripted::new(&[]);
        let options = PollOptions::new(Duration::from_millis(10), Duration::from_millis(40));
        let err = wait_blocking(blocking_status(JobState::Processing, &script), options, |_| {})
            .unwrap_err();
        assert!(err.to_string().contains("j1 did not complete"));
    }

    #[test]
    fn test_wait_blocking_rejects_async_refresher() {
        let script = Scripted::new(&[]);
        let err = wait_blocking(async_status(JobState::Processing, &script), fast(), |_| {})
            .unwrap_err();
        assert!(matches!(err, Error::NotPollable { .. }));
    }
}
