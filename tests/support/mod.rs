//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use docutray::{ClientConfig, RetryConfig};
use wiremock::{Request, Respond, ResponseTemplate};

/// Config pointing at `base_url` with millisecond backoff so retry tests run fast.
pub fn fast_config(base_url: &str, max_retries: u32) -> ClientConfig {
    let retry = RetryConfig::builder()
        .max_retries(max_retries)
        .initial_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(50))
        .build()
        .unwrap();
    ClientConfig::builder("sk_test_integration")
        .base_url(base_url)
        .retry(retry)
        .build()
        .unwrap()
}

/// Replies with `responses` in order, repeating the last one once exhausted.
pub struct SequenceResponder {
    responses: Vec<ResponseTemplate>,
    request_count: Arc<AtomicUsize>,
}

impl SequenceResponder {
    pub fn new(responses: Vec<ResponseTemplate>) -> (Self, Arc<AtomicUsize>) {
        assert!(!responses.is_empty(), "need at least one response");
        let request_count = Arc::new(AtomicUsize::new(0));
        let responder = Self {
            responses,
            request_count: Arc::clone(&request_count),
        };
        (responder, request_count)
    }
}

impl Respond for SequenceResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.request_count.fetch_add(1, Ordering::SeqCst);
        let index = n.min(self.responses.len() - 1);
        self.responses[index].clone()
    }
}

/// Reserves a local port and releases it, leaving nothing listening there.
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}
