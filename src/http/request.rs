//! Request description handed to the transports.
//!
//! An [`ApiRequest`] is plain data: method, path, query parameters and a
//! body. The transports turn it into a `reqwest` request once per attempt,
//! so a retried multipart upload resends exactly the same parts.

use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::error::Error;

/// One API call, independent of execution mode.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: RequestBody,
}

impl ApiRequest {
    /// Creates a request with no query and no body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    /// Shorthand for a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Shorthand for a POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Appends every query parameter from an iterator.
    #[must_use]
    pub fn query_pairs<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sends `body` as `application/json`.
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Sends `form` as `multipart/form-data`.
    #[must_use]
    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }

    /// The HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The path relative to the base URL.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters in insertion order.
    #[must_use]
    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }

    /// The request body.
    #[must_use]
    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// Resolves the full URL against `base`.
    ///
    /// The path is appended to the base URL's own path, so a base of
    /// `https://host/v1` and a path of `/api/x` give `https://host/v1/api/x`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the path is empty or absolute.
    pub fn url(&self, base: &Url) -> Result<Url, Error> {
        if self.path.trim().is_empty() {
            return Err(Error::invalid_request("request path is empty"));
        }
        if self.path.contains("://") {
            return Err(Error::invalid_request(format!(
                "request path must be relative to the base URL: {}",
                self.path
            )));
        }

        let mut url = base.clone();
        let joined = format!(
            "{}/{}",
            base.path().trim_end_matches('/'),
            self.path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url.set_query(None);
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }
}

/// Body of an [`ApiRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// A JSON document.
    Json(Value),
    /// A multipart form.
    Multipart(MultipartForm),
}

/// Multipart form kept as plain data so it can be rebuilt for every attempt.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultipartForm {
    fields: Vec<(String, String)>,
    files: Vec<FilePart>,
}

impl MultipartForm {
    /// Creates an empty form.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a text field.
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Adds a file part.
    #[must_use]
    pub fn file(mut self, part: FilePart) -> Self {
        self.files.push(part);
        self
    }

    /// Text fields in insertion order.
    #[must_use]
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// File parts in insertion order.
    #[must_use]
    pub fn files(&self) -> &[FilePart] {
        &self.files
    }

    pub(crate) fn to_async_form(&self) -> Result<reqwest::multipart::Form, Error> {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in &self.fields {
            form = form.text(name.clone(), value.clone());
        }
        for file in &self.files {
            let mut part = reqwest::multipart::Part::bytes(file.bytes.clone())
                .file_name(file.file_name.clone());
            if let Some(content_type) = &file.content_type {
                part = part.mime_str(content_type).map_err(|e| invalid_mime(file, &e))?;
            }
            form = form.part(file.name.clone(), part);
        }
        Ok(form)
    }

    pub(crate) fn to_blocking_form(&self) -> Result<reqwest::blocking::multipart::Form, Error> {
        let mut form = reqwest::blocking::multipart::Form::new();
        for (name, value) in &self.fields {
            form = form.text(name.clone(), value.clone());
        }
        for file in &self.files {
            let mut part = reqwest::blocking::multipart::Part::bytes(file.bytes.clone())
                .file_name(file.file_name.clone());
            if let Some(content_type) = &file.content_type {
                part = part.mime_str(content_type).map_err(|e| invalid_mime(file, &e))?;
            }
            form = form.part(file.name.clone(), part);
        }
        Ok(form)
    }
}

fn invalid_mime(file: &FilePart, error: &reqwest::Error) -> Error {
    Error::invalid_request(format!(
        "invalid content type for part {}: {error}",
        file.name
    ))
}

/// A file attached to a [`MultipartForm`].
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    name: String,
    file_name: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

impl FilePart {
    /// Creates a part named `name` carrying `bytes` as `file_name`.
    pub fn new(name: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            file_name: file_name.into(),
            content_type: None,
            bytes,
        }
    }

    /// Sets the part's content type (e.g. `application/pdf`).
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Form field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File name sent in the part's disposition.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// File contents.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}
