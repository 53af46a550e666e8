//! Response state written by handlers.
//!
//! Handlers mutate the response in place through
//! [`Context::response_mut`](crate::context::Context::response_mut); the host
//! serializes it once the pipeline finishes.

use bytes::Bytes;
use serde::Serialize;

use super::{Headers, StatusCode};

/// The response under construction for one request.
///
/// # Examples
///
/// ```
/// use layered_router::http::{Response, StatusCode};
///
/// let mut response = Response::new(StatusCode::NotFound);
/// response.set_status(StatusCode::Ok);
/// response.set_text("hello");
///
/// assert_eq!(response.status(), StatusCode::Ok);
/// assert_eq!(response.text(), Some("hello"));
/// assert_eq!(response.headers().get("content-type"), Some("text/plain; charset=utf-8"));
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
}

impl Response {
    /// Creates a response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The body as UTF-8 text, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Replaces the body with raw bytes. Headers are left untouched.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Replaces the body with text and sets a plain-text content type.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.headers.set("Content-Type", "text/plain; charset=utf-8");
        self.body = Bytes::from(text.into());
    }

    /// Serializes `value` as the JSON body and sets the content type.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if `value` cannot be serialized; the
    /// response is left unchanged in that case.
    pub fn set_json<T: Serialize>(&mut self, value: &T) -> Result<(), serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        self.headers.set("Content-Type", "application/json");
        self.body = Bytes::from(body);
        Ok(())
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::NotFound)
    }
}
