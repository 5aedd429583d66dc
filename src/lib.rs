//! DocuTray API client core
//!
//! This library provides the resilient request/response engine behind the
//! DocuTray document-processing API client: conversion, identification and
//! workflow step execution all go through it.
//!
//! # Architecture
//!
//! The library is organized into the following modules, leaves first:
//! - [`error`] - Error taxonomy and HTTP status mapping
//! - [`retry`] - Retry policy with exponential backoff and jitter
//! - [`config`] - Validated client configuration
//! - [`http`] - Async and blocking transports with retry
//! - [`job`] - Asynchronous job status and polling
//! - [`pagination`] - Page cursors over listing endpoints

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod http;
pub mod job;
pub mod pagination;
pub mod retry;
mod user_agent;

// Re-export commonly used types
pub use config::{ClientConfig, ClientConfigBuilder, ConfigError, mask_api_key};
pub use error::{ApiError, ApiErrorKind, Error, RateLimitInfo, ResponseBody};
pub use http::{
    ApiRequest, BlockingTransport, FilePart, MultipartForm, RawResponse, RequestBody, Transport,
};
pub use job::{
    BlockingStatusFetcher, JobKind, JobState, JobStatus, OnUpdate, PollOptions, Refresher,
    StatusFetcher,
};
pub use pagination::{AsyncPage, ListEnvelope, ListQuery, Page, PageInfo};
pub use retry::{DEFAULT_MAX_RETRIES, Failure, RetryConfig, compute_delay, should_retry};
