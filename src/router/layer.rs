//! A single registered route: pattern, method filter, and handler chain.

use std::fmt;

use crate::context::Context;
use crate::http::Method;
use crate::middleware::{BoxFuture, Handler, HandlerResult, Next, compose};

use super::RouteError;
use super::pattern::{Matcher, PathMatch, compile};

/// One entry in a [`Router`](super::Router)'s dispatch list.
///
/// A layer is immutable once built. Matching returns its result as a value
/// and [`execute`](Self::execute) writes that result into the request's
/// [`Context`], so a single layer can serve any number of concurrent requests.
pub struct Layer {
    matcher: Matcher,
    // `None` matches every method.
    method: Option<Method>,
    stack: Vec<Handler>,
    handler: Handler,
}

impl Layer {
    /// Compile `pattern` and compose `stack` into a layer.
    ///
    /// # Errors
    ///
    /// - [`RouteError::PatternSyntax`] if `pattern` does not compile.
    /// - [`RouteError::Validation`] if `stack` is empty.
    pub fn new(
        pattern: &str,
        stack: Vec<Handler>,
        method: Option<Method>,
    ) -> Result<Self, RouteError> {
        if stack.is_empty() {
            return Err(RouteError::Validation {
                reason: "a route needs at least one handler",
                value: pattern.to_owned(),
            });
        }
        let matcher = compile(pattern)?;
        let handler = compose(stack.clone());
        Ok(Self {
            matcher,
            method,
            stack,
            handler,
        })
    }

    /// A new layer for `pattern` sharing this layer's method and handlers.
    ///
    /// The composed chain is reused as is; only the matcher is rebuilt.
    pub(crate) fn rebased(&self, pattern: &str) -> Result<Self, RouteError> {
        Ok(Self {
            matcher: compile(pattern)?,
            method: self.method.clone(),
            stack: self.stack.clone(),
            handler: self.handler.clone(),
        })
    }

    pub fn pattern(&self) -> &str {
        self.matcher.pattern()
    }

    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// The handlers this layer was built from, in order.
    pub fn handlers(&self) -> &[Handler] {
        &self.stack
    }

    /// Test a request against this layer.
    ///
    /// The method comparison ignores case. Anything from the first `?` in
    /// `path` onwards is ignored.
    pub fn matches(&self, path: &str, method: &Method) -> Option<PathMatch> {
        if self.method.as_ref().is_some_and(|own| !own.matches(method)) {
            return None;
        }
        let path = path.split_once('?').map_or(path, |(path, _)| path);
        self.matcher.match_path(path)
    }

    /// Record `found` on the context and run this layer's chain to completion.
    ///
    /// The chain ends in a no-op continuation; whatever the handlers do with
    /// `next`, control returns here and then to the router.
    pub fn execute(&self, mut ctx: Context, found: PathMatch) -> BoxFuture<HandlerResult> {
        ctx.set_match(found.path, found.params);
        self.handler.handle(ctx, Next::end())
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("pattern", &self.pattern())
            .field("method", &self.method)
            .field("handlers", &self.stack.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Request, StatusCode};
    use crate::middleware::from_fn;

    fn ok() -> Handler {
        from_fn(|mut ctx: Context, next: Next| async move {
            ctx.response_mut().set_status(StatusCode::Ok);
            next.run(ctx).await
        })
    }

    #[test]
    fn empty_stack_is_a_validation_error() {
        let err = Layer::new("/users", Vec::new(), None).unwrap_err();
        assert!(matches!(err, RouteError::Validation { ref value, .. } if value == "/users"));
    }

    #[test]
    fn bad_pattern_is_a_syntax_error() {
        let err = Layer::new("/users/:", vec![ok()], None).unwrap_err();
        assert!(matches!(err, RouteError::PatternSyntax(_)));
    }

    #[test]
    fn method_filter() {
        let layer = Layer::new("/users", vec![ok()], Some(Method::Get)).unwrap();
        assert!(layer.matches("/users", &Method::Get).is_some());
        assert!(layer.matches("/users", &Method::Post).is_none());
        assert!(layer.matches("/users", &Method::Custom("get".into())).is_some());
    }

    #[test]
    fn any_method_layer() {
        let layer = Layer::new("/users", vec![ok()], None).unwrap();
        assert!(layer.matches("/users", &Method::Delete).is_some());
        assert!(layer.matches("/users", &Method::Custom("PURGE".into())).is_some());
    }

    #[test]
    fn query_is_ignored() {
        let layer = Layer::new("/posts", vec![ok()], Some(Method::Get)).unwrap();
        let found = layer.matches("/posts?page=2&limit=100", &Method::Get).unwrap();
        assert_eq!(found.path(), "/posts");
    }

    #[test]
    fn matching_leaves_layer_untouched() {
        let layer = Layer::new("/users/:id", vec![ok()], None).unwrap();
        let a = layer.matches("/users/1", &Method::Get).unwrap();
        let b = layer.matches("/users/2", &Method::Get).unwrap();
        assert_eq!(a.params().unwrap().get("id"), Some("1"));
        assert_eq!(b.params().unwrap().get("id"), Some("2"));
    }

    #[tokio::test]
    async fn execute_writes_match_into_context() {
        let layer = Layer::new("/users/:id", vec![ok()], None).unwrap();
        let found = layer.matches("/users/9", &Method::Get).unwrap();
        let ctx = Context::new(Request::new(Method::Get, "/users/9"));
        let ctx = layer.execute(ctx, found).await.unwrap();
        assert_eq!(ctx.param("id"), Some("9"));
        assert_eq!(ctx.matched_path(), Some("/users/9"));
        assert_eq!(ctx.response().status(), StatusCode::Ok);
    }

    #[test]
    fn rebased_layer_shares_handlers() {
        let layer = Layer::new("/posts", vec![ok(), ok()], Some(Method::Get)).unwrap();
        let moved = layer.rebased("/api/posts").unwrap();
        assert_eq!(moved.pattern(), "/api/posts");
        assert_eq!(moved.method(), Some(&Method::Get));
        assert_eq!(moved.handlers().len(), 2);
        assert!(std::sync::Arc::ptr_eq(&layer.handlers()[0], &moved.handlers()[0]));
        assert_eq!(layer.pattern(), "/posts");
    }
}
