//! Request routing: bind URL patterns and HTTP methods to handler chains.
//!
//! A [`Router`] keeps an ordered list of [`Layer`]s. Each registration call
//! appends one layer; [`Router::mount`] appends copies of another router's
//! layers with their patterns re-rooted under a prefix. Once set up, the
//! router is turned into a single [`Handler`] with
//! [`Router::into_middleware`] and placed in the host's pipeline.
//!
//! Dispatch does **not** stop at the first match. Every layer whose method and
//! pattern match the request runs, in registration order, which is what lets a
//! path-less [`Router::all`] handler wrap the routes registered after it. When
//! the last layer has been tried the outer continuation runs, matched or not.
//!
//! See [`pattern`] for the pattern syntax.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::context::Context;
use crate::http::Method;
use crate::middleware::{BoxFuture, Handler, HandlerResult, IntoChain, Middleware, Next};

pub mod layer;
pub mod pattern;

pub use layer::Layer;
pub use pattern::{CATCH_ALL, PatternError};

/// Errors raised while registering routes. These only ever occur during setup.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid route pattern: {0}")]
    PatternSyntax(#[from] PatternError),

    #[error("{reason}: {value:?}")]
    Validation { reason: &'static str, value: String },
}

/// Construction options for a [`Router`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RouterOptions {
    /// Prepended to every pattern registered on the router, and used as the
    /// join point for [`Router::mount`] without an explicit path.
    pub prefix: String,
}

/// The path part of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePath<'a> {
    /// Match every path ([`CATCH_ALL`]).
    Any,
    /// Match a route pattern.
    Pattern(&'a str),
}

impl RoutePath<'_> {
    fn as_pattern(&self) -> &str {
        match self {
            Self::Any => CATCH_ALL,
            Self::Pattern(pattern) => pattern,
        }
    }
}

impl<'a> From<&'a str> for RoutePath<'a> {
    fn from(pattern: &'a str) -> Self {
        Self::Pattern(pattern)
    }
}

impl<'a> From<&'a String> for RoutePath<'a> {
    fn from(pattern: &'a String) -> Self {
        Self::Pattern(pattern)
    }
}

/// An ordered list of routes that dispatches as one middleware.
///
/// Registration methods return `Result<&mut Router, RouteError>`, so calls
/// chain with `?`. Registration needs `&mut self` and
/// [`into_middleware`](Self::into_middleware) consumes the router, so every
/// route is in place before the first request is served.
///
/// # Examples
///
/// ```
/// use layered_router::middleware::{from_fn, Middleware, Next};
/// use layered_router::{Context, Method, Request, RoutePath, Router, RouterOptions, StatusCode};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
/// let mut posts = Router::new();
/// posts.get("/:id", from_fn(|mut ctx: Context, next: Next| async move {
///     let id = ctx.param("id").unwrap_or_default().to_owned();
///     ctx.response_mut().set_status(StatusCode::Ok);
///     ctx.response_mut().set_text(format!("post {id}"));
///     next.run(ctx).await
/// }))?;
///
/// let mut api = Router::with_options(RouterOptions { prefix: "/api".into() });
/// api.all(RoutePath::Any, from_fn(|ctx: Context, next: Next| next.run(ctx)))?
///     .mount_at("/posts", &posts)?;
///
/// let app = api.into_middleware();
/// let ctx = Context::new(Request::new(Method::Get, "/api/posts/7"));
/// let ctx = app.handle(ctx, Next::end()).await?;
/// assert_eq!(ctx.response().text(), Some("post 7"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct Router {
    layers: Vec<Layer>,
    options: RouterOptions,
}

impl Router {
    /// Create an empty router with no prefix.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: RouterOptions) -> Self {
        Self {
            layers: Vec::new(),
            options,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.options.prefix
    }

    /// Number of layers, including those imported by mounting.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layers in dispatch order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Register `handlers` for requests whose method matches `method` (`None`
    /// matches all methods) and whose path matches `path`.
    ///
    /// `path` gets the router's prefix prepended; registering `/` on a
    /// prefixed router registers the bare prefix.
    ///
    /// # Errors
    ///
    /// - [`RouteError::PatternSyntax`] if the prefixed pattern does not compile.
    /// - [`RouteError::Validation`] if `handlers` is empty.
    pub fn route<'p>(
        &mut self,
        method: Option<Method>,
        path: impl Into<RoutePath<'p>>,
        handlers: impl IntoChain,
    ) -> Result<&mut Self, RouteError> {
        let pattern = self.prefixed(path.into().as_pattern());
        let layer = Layer::new(&pattern, handlers.into_chain(), method)?;
        debug!(
            method = layer.method().map_or("*", Method::as_str),
            pattern = %layer.pattern(),
            "route registered"
        );
        self.layers.push(layer);
        Ok(self)
    }

    /// Register handlers for every method. This is the router's generic `use`.
    pub fn all<'p>(
        &mut self,
        path: impl Into<RoutePath<'p>>,
        handlers: impl IntoChain,
    ) -> Result<&mut Self, RouteError> {
        self.route(None, path, handlers)
    }

    /// Register handlers for `GET` requests.
    pub fn get<'p>(
        &mut self,
        path: impl Into<RoutePath<'p>>,
        handlers: impl IntoChain,
    ) -> Result<&mut Self, RouteError> {
        self.route(Some(Method::Get), path, handlers)
    }

    /// Register handlers for `POST` requests.
    pub fn post<'p>(
        &mut self,
        path: impl Into<RoutePath<'p>>,
        handlers: impl IntoChain,
    ) -> Result<&mut Self, RouteError> {
        self.route(Some(Method::Post), path, handlers)
    }

    /// Register handlers for `PUT` requests.
    pub fn put<'p>(
        &mut self,
        path: impl Into<RoutePath<'p>>,
        handlers: impl IntoChain,
    ) -> Result<&mut Self, RouteError> {
        self.route(Some(Method::Put), path, handlers)
    }

    /// Register handlers for `PATCH` requests.
    pub fn patch<'p>(
        &mut self,
        path: impl Into<RoutePath<'p>>,
        handlers: impl IntoChain,
    ) -> Result<&mut Self, RouteError> {
        self.route(Some(Method::Patch), path, handlers)
    }

    /// Register handlers for `DELETE` requests.
    pub fn delete<'p>(
        &mut self,
        path: impl Into<RoutePath<'p>>,
        handlers: impl IntoChain,
    ) -> Result<&mut Self, RouteError> {
        self.route(Some(Method::Delete), path, handlers)
    }

    /// Same as [`delete`](Self::delete).
    pub fn del<'p>(
        &mut self,
        path: impl Into<RoutePath<'p>>,
        handlers: impl IntoChain,
    ) -> Result<&mut Self, RouteError> {
        self.delete(path, handlers)
    }

    /// Register handlers for `OPTIONS` requests.
    pub fn options<'p>(
        &mut self,
        path: impl Into<RoutePath<'p>>,
        handlers: impl IntoChain,
    ) -> Result<&mut Self, RouteError> {
        self.route(Some(Method::Options), path, handlers)
    }

    /// Import all of `sub`'s layers, rooted at this router's prefix.
    ///
    /// See [`mount_at`](Self::mount_at) for how patterns are joined.
    pub fn mount(&mut self, sub: &Router) -> Result<&mut Self, RouteError> {
        let base = self.prefixed("");
        self.import(&base, sub)
    }

    /// Import all of `sub`'s layers, rooted at `path` (itself prefixed with
    /// this router's prefix).
    ///
    /// Each imported layer is a new [`Layer`] whose pattern is the base joined
    /// with the sub-layer's pattern:
    ///
    /// | base     | sub-pattern     | joined          |
    /// |----------|-----------------|-----------------|
    /// | `/api`   | `/` or empty    | `/api/`         |
    /// | `/api/`  | `/posts`        | `/api/posts`    |
    /// | `/api`   | `/posts`        | `/api/posts`    |
    /// | `/api`   | `posts`         | `/api/posts`    |
    ///
    /// Handlers are shared with the sub-router's layers; the sub-router itself
    /// is left untouched and can be mounted again elsewhere. Nothing is
    /// imported if any joined pattern fails to compile.
    pub fn mount_at(&mut self, path: &str, sub: &Router) -> Result<&mut Self, RouteError> {
        let base = self.prefixed(path);
        self.import(&base, sub)
    }

    fn import(&mut self, base: &str, sub: &Router) -> Result<&mut Self, RouteError> {
        let imported = sub
            .layers
            .iter()
            .map(|layer| layer.rebased(&join(base, layer.pattern())))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(base, layers = imported.len(), "router mounted");
        self.layers.extend(imported);
        Ok(self)
    }

    fn prefixed(&self, path: &str) -> String {
        let prefix = self.prefix();
        if prefix.is_empty() {
            path.to_owned()
        } else if path == "/" {
            prefix.to_owned()
        } else {
            format!("{prefix}{path}")
        }
    }

    /// Freeze the router into a [`Handler`] for the host pipeline.
    ///
    /// The handler attaches the router to the context, runs every matching
    /// layer in order, then calls the outer continuation. Handler errors abort
    /// dispatch and are returned as is.
    pub fn into_middleware(self) -> Handler {
        Arc::new(Dispatch {
            router: Arc::new(self),
        })
    }
}

fn join(base: &str, pattern: &str) -> String {
    let base_ends_with_slash = base.ends_with('/');
    if pattern.is_empty() || pattern == "/" {
        if base_ends_with_slash {
            base.to_owned()
        } else {
            format!("{base}/")
        }
    } else if let Some(rest) = pattern.strip_prefix('/') {
        if base_ends_with_slash {
            format!("{base}{rest}")
        } else {
            format!("{base}{pattern}")
        }
    } else if base_ends_with_slash {
        format!("{base}{pattern}")
    } else {
        format!("{base}/{pattern}")
    }
}

// The router as it sits in a pipeline.
struct Dispatch {
    router: Arc<Router>,
}

impl Middleware for Dispatch {
    fn handle(&self, mut ctx: Context, next: Next) -> BoxFuture<HandlerResult> {
        let router = Arc::clone(&self.router);
        Box::pin(async move {
            ctx.set_router(Arc::clone(&router));
            for layer in router.layers() {
                let Some(found) = layer.matches(ctx.request().path(), ctx.request().method()) else {
                    continue;
                };
                trace!(pattern = %layer.pattern(), path = %found.path(), "layer matched");
                ctx = layer.execute(ctx, found).await?;
            }
            next.run(ctx).await
        })
    }
}
