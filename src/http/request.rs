//! The incoming request as seen by the router.
//!
//! A [`Request`] is either built directly from a method and request target
//! ([`Request::new`]) or parsed from raw HTTP/1.x bytes with [`httparse`]
//! ([`Request::parse`]). In both cases the query component is split off the
//! path up front, so routing only ever sees the path.

use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing a raw HTTP/1.x request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete: more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// An incoming HTTP request.
///
/// # Examples
///
/// ```
/// use layered_router::http::{Method, Request};
///
/// let request = Request::new(Method::Get, "/search?q=rust%20lang&page=2");
/// assert_eq!(request.path(), "/search");
/// assert_eq!(request.query_string(), Some("q=rust%20lang&page=2"));
/// assert_eq!(request.query_param("q"), Some("rust lang"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    query_params: HashMap<String, String>,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Maximum number of headers accepted by [`Request::parse`].
    const MAX_HEADERS: usize = 64;

    /// Creates a request for `target`, which may carry a `?query` suffix.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = split_target(target);
        let query_params = query.as_deref().map(parse_query_string).unwrap_or_default();
        Self {
            method,
            path,
            query,
            query_params,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Parses a raw HTTP/1.x request from a byte slice.
    ///
    /// Everything after the header terminator is taken as the body.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`]: the header block has not been fully received.
    /// - [`RequestError::Parse`]: the bytes are not a valid HTTP request head.
    /// - [`RequestError::MissingField`]: method or path is absent.
    pub fn parse(buf: &[u8]) -> Result<Self, RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Request::new(&mut headers);

        let body_offset = match raw.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = raw
            .method
            .ok_or(RequestError::MissingField { field: "method" })?
            .parse::<Method>()
            .unwrap_or_else(|never| match never {});
        let target = raw.path.ok_or(RequestError::MissingField { field: "path" })?;

        let mut request = Self::new(method, target);
        request.headers = Headers::with_capacity(raw.headers.len());
        for header in raw.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                request.headers.append(header.name, value);
            }
        }
        request.body = Bytes::copy_from_slice(&buf[body_offset..]);
        Ok(request)
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request path, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// A percent-decoded query parameter value.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query_params.get(key).map(String::as_str)
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

fn split_target(target: &str) -> (String, Option<String>) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
        None => (target.to_owned(), None),
    }
}

// `+` is a space in form encoding; everything else goes through percent-decoding,
// keeping the raw text when it does not decode to UTF-8.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_splits_query_from_path() {
        let req = Request::new(Method::Get, "/posts?page=2&limit=100");
        assert_eq!(req.path(), "/posts");
        assert_eq!(req.query_param("page"), Some("2"));
        assert_eq!(req.query_param("limit"), Some("100"));
    }

    #[test]
    fn new_without_query() {
        let req = Request::new(Method::Post, "/posts");
        assert_eq!(req.path(), "/posts");
        assert_eq!(req.query_string(), None);
    }

    #[test]
    fn query_values_are_decoded() {
        let req = Request::new(Method::Get, "/s?name=J%C3%BCrgen+M&flag");
        assert_eq!(req.query_param("name"), Some("Jürgen M"));
        assert_eq!(req.query_param("flag"), Some(""));
    }

    #[test]
    fn parse_raw_request() {
        let raw = b"PUT /users/7?notify=1 HTTP/1.1\r\nHost: localhost\r\nContent-Length: 2\r\n\r\n{}";
        let req = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Put);
        assert_eq!(req.path(), "/users/7");
        assert_eq!(req.query_param("notify"), Some("1"));
        assert_eq!(req.headers().get("host"), Some("localhost"));
        assert_eq!(&req.body()[..], b"{}");
    }

    #[test]
    fn parse_incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }
}
