//! Per-request context: the request, the response being built, and whatever
//! routing attached to this particular request.
//!
//! A [`Context`] is created by the host for each request and handed by value
//! through the handler chain. Everything the router learns while matching
//! (parameters, the matched path, the router itself) is written here and never
//! onto shared routing state, which is what lets one router serve many
//! requests at once.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc,
};

use serde::Serialize;

use crate::http::{Request, Response, StatusCode};
use crate::router::Router;

/// Type-erased request extensions map: used to pass per-request state between
/// handlers without them knowing about each other's types.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous value of the same type.
    pub fn insert<T>(&mut self, value: T) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Get the value of type `T`, inserting `T::default()` first if absent.
    pub fn get_or_default<T>(&mut self) -> &mut T
    where
        T: Default + Send + Sync + 'static,
    {
        let slot = self
            .map
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::default()));
        match slot.downcast_mut::<T>() {
            Some(value) => value,
            None => unreachable!("extension slot keyed by TypeId holds another type"),
        }
    }

    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

/// The value captured for one path parameter.
///
/// Serializes as a bare string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// A single decoded segment, e.g. `:id`.
    Single(String),
    /// The segments of a repeated parameter (`:path+` / `:path*`), in order.
    Repeated(Vec<String>),
}

impl ParamValue {
    /// The value of a single parameter; `None` for repeated ones.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Single(value) => Some(value),
            Self::Repeated(_) => None,
        }
    }

    /// The segments of a repeated parameter; `None` for single ones.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::Single(_) => None,
            Self::Repeated(values) => Some(values),
        }
    }
}

/// Path parameters extracted from the matched route.
///
/// A bag only exists when at least one parameter was captured; routes that
/// capture nothing leave [`Context::params`] as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Params {
    map: HashMap<String, ParamValue>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.map.insert(name.into(), value);
    }

    /// The value of a single (non-repeated) parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).and_then(ParamValue::as_str)
    }

    /// The segments of a repeated parameter.
    pub fn get_all(&self, name: &str) -> Option<&[String]> {
        self.map.get(name).and_then(ParamValue::as_list)
    }

    pub fn value(&self, name: &str) -> Option<&ParamValue> {
        self.map.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Per-request state threaded through every handler.
///
/// The response starts out as `404 Not Found`; a handler that deals with the
/// request is expected to set a status of its own.
pub struct Context {
    request: Request,
    response: Response,
    params: Option<Params>,
    matched_path: Option<String>,
    router: Option<Arc<Router>>,
    extensions: Extensions,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            response: Response::new(StatusCode::NotFound),
            params: None,
            matched_path: None,
            router: None,
            extensions: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Parameters captured by the most recently executed route, if it captured any.
    pub fn params(&self) -> Option<&Params> {
        self.params.as_ref()
    }

    /// Shorthand for `params().and_then(|p| p.get(name))`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.as_ref().and_then(|params| params.get(name))
    }

    /// The path of the most recently executed route's match.
    pub fn matched_path(&self) -> Option<&str> {
        self.matched_path.as_deref()
    }

    /// The router currently dispatching this request.
    pub fn router(&self) -> Option<&Arc<Router>> {
        self.router.as_ref()
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Decode the request body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }

    /// Consume the context, keeping only the response.
    pub fn into_response(self) -> Response {
        self.response
    }

    // Overwrites rather than merges: each executed route sees only its own capture.
    pub(crate) fn set_match(&mut self, matched_path: String, params: Option<Params>) {
        self.matched_path = Some(matched_path);
        self.params = params;
    }

    pub(crate) fn set_router(&mut self, router: Arc<Router>) {
        self.router = Some(router);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    #[derive(Debug, Default, PartialEq)]
    struct Hits(u32);

    #[test]
    fn extensions_round_trip_by_type() {
        let mut ext = Extensions::new();
        assert!(ext.insert(Hits(1)).is_none());
        assert_eq!(ext.insert(Hits(2)), Some(Hits(1)));
        ext.get_mut::<Hits>().unwrap().0 += 1;
        assert_eq!(ext.get::<Hits>(), Some(&Hits(3)));
        assert_eq!(ext.remove::<Hits>(), Some(Hits(3)));
        assert!(ext.get::<Hits>().is_none());
    }

    #[test]
    fn get_or_default_inserts_once() {
        let mut ext = Extensions::new();
        ext.get_or_default::<Hits>().0 += 1;
        ext.get_or_default::<Hits>().0 += 1;
        assert_eq!(ext.get::<Hits>(), Some(&Hits(2)));
    }

    #[test]
    fn params_distinguish_single_and_repeated() {
        let mut params = Params::new();
        params.insert("id", ParamValue::Single("7".into()));
        params.insert("rest", ParamValue::Repeated(vec!["a".into(), "b".into()]));
        assert_eq!(params.get("id"), Some("7"));
        assert_eq!(params.get("rest"), None);
        assert_eq!(params.get_all("rest"), Some(&["a".to_owned(), "b".to_owned()][..]));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn params_serialize_as_plain_json() {
        let mut params = Params::new();
        params.insert("rest", ParamValue::Repeated(vec!["a".into(), "b".into()]));
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json, serde_json::json!({ "rest": ["a", "b"] }));
    }

    #[test]
    fn fresh_context_has_no_routing_state() {
        let ctx = Context::new(Request::new(Method::Get, "/"));
        assert!(ctx.params().is_none());
        assert!(ctx.matched_path().is_none());
        assert!(ctx.router().is_none());
        assert_eq!(ctx.response().status(), StatusCode::NotFound);
    }

    #[test]
    fn json_body_decodes() {
        #[derive(serde::Deserialize)]
        struct Post {
            title: String,
        }
        let req = Request::new(Method::Post, "/posts").with_body(r#"{"title":"hi"}"#);
        let post: Post = Context::new(req).json().unwrap();
        assert_eq!(post.title, "hi");
    }
}
