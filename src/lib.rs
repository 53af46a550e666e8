//! # layered-router
//!
//! An embeddable HTTP request router. Routes bind a URL pattern and an optional
//! method to a chain of cooperative handlers; the finished [`Router`] becomes a
//! single middleware the host places in its own pipeline.
//!
//! ## Quick Start
//!
//! ```rust
//! use layered_router::middleware::{from_fn, LoggerMiddleware, from_middleware};
//! use layered_router::{Context, Method, Next, Request, RoutePath, Router, StatusCode};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), layered_router::BoxError> {
//! let mut router = Router::new();
//! router
//!     .all(RoutePath::Any, from_middleware(LoggerMiddleware))?
//!     .get("/hello/:name", from_fn(|mut ctx: Context, next: Next| async move {
//!         let name = ctx.param("name").unwrap_or("world").to_owned();
//!         ctx.response_mut().set_status(StatusCode::Ok);
//!         ctx.response_mut().set_text(format!("Hello, {name}!"));
//!         next.run(ctx).await
//!     }))?;
//!
//! let pipeline = Next::new(vec![router.into_middleware()]);
//! let ctx = pipeline.run(Context::new(Request::new(Method::Get, "/hello/ferris"))).await?;
//! assert_eq!(ctx.response().text(), Some("Hello, ferris!"));
//! # Ok(())
//! # }
//! ```

// ── Host contract ─────────────────────────────────────────────────────────────
pub mod context;
pub mod http;

// ── Routing ───────────────────────────────────────────────────────────────────
pub mod config;
pub mod middleware;
pub mod router;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use config::{ConfigError, HandlerRegistry, RouteConfig, RouterConfig};
pub use context::{Context, ParamValue, Params};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::{
    BoxError, Handler, HandlerResult, Middleware, Next, compose, from_fn, from_middleware,
};
pub use router::{Layer, PatternError, RouteError, RoutePath, Router, RouterOptions};
