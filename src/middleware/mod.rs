//! Handler chains with explicit continuation passing.
//!
//! Every handler the router runs is a [`Middleware`]: it receives the
//! per-request [`Context`] by value together with a [`Next`] continuation.
//! Calling [`Next::run`] passes the context on to the rest of the chain and
//! hands it back once the rest of the chain is done, so a handler can do work
//! both before and after its successors. Returning without calling `next`
//! stops the chain right there (an auth check turning a request away, say).
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all handlers.
//! - [`Handler`]: type-erased, cheaply-cloneable handler.
//! - [`Next`]: cursor into the remaining chain.
//! - [`compose`]: folds an ordered list of handlers into one [`Handler`].
//! - [`from_fn`] / [`from_middleware`]: build a [`Handler`] from a closure or a type.
//! - [`LoggerMiddleware`]: built-in request logger.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::time::Instant;

use crate::context::Context;

/// Error type handlers may fail with. Anything implementing
/// `std::error::Error + Send + Sync` converts into it with `?`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What a handler resolves to: the context handed back, or an error.
pub type HandlerResult = Result<Context, BoxError>;

/// A heap-allocated, `Send` future as returned by [`Middleware::handle`].
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A type-erased, reference-counted handler.
///
/// Cloning a `Handler` only bumps a reference count, which is how the same
/// handler ends up in several routes (or in several mounted copies of a route)
/// without being copied.
pub type Handler = Arc<dyn Middleware>;

/// The core trait for everything that runs inside a handler chain.
///
/// Implementors may:
///
/// - **Pass through**: `next.run(ctx).await`.
/// - **Short-circuit**: return `Ok(ctx)` without calling `next`.
/// - **Wrap**: do work, call `next.run(ctx).await`, then inspect or modify
///   the returned context.
///
/// # Contract
///
/// One handler instance serves every request routed to it, concurrently.
/// Per-request state belongs in the [`Context`] (see
/// [`Context::extensions_mut`]), never in `self`.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to `next`.
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<HandlerResult>;
}

/// A cursor into the remaining handler chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so a handler can continue the
/// chain at most once.
pub struct Next {
    chain: Arc<[Handler]>,
    // Which handler in `chain` the next `run` call invokes.
    index: usize,
    // Where to continue once `chain` is exhausted; `None` ends the chain.
    tail: Option<Box<Next>>,
}

impl Next {
    /// A continuation that does nothing and hands the context straight back.
    pub fn end() -> Self {
        Self::new(Vec::new())
    }

    /// A continuation that runs `handlers` in order and then ends.
    ///
    /// This is how a host drives a whole pipeline:
    ///
    /// ```rust,no_run
    /// use layered_router::{Context, Method, Next, Request, Router};
    ///
    /// # async fn example(router: Router) -> Result<(), layered_router::BoxError> {
    /// let pipeline = Next::new(vec![router.into_middleware()]);
    /// let ctx = pipeline.run(Context::new(Request::new(Method::Get, "/"))).await?;
    /// println!("{}", ctx.response().status());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(handlers: Vec<Handler>) -> Self {
        Self {
            chain: handlers.into(),
            index: 0,
            tail: None,
        }
    }

    /// Invoke the next handler in the chain and resolve to the context it hands back.
    ///
    /// Once the chain is exhausted, control passes to the enclosing chain (for a
    /// [`compose`]d handler) or the context is returned unchanged.
    pub fn run(mut self, ctx: Context) -> BoxFuture<HandlerResult> {
        match self.chain.get(self.index).cloned() {
            Some(handler) => {
                self.index += 1;
                handler.handle(ctx, self)
            }
            None => match self.tail.take() {
                Some(tail) => tail.run(ctx),
                None => Box::pin(async move { Ok(ctx) }),
            },
        }
    }
}

// A fixed list of handlers acting as one.
struct Composed {
    chain: Arc<[Handler]>,
}

impl Middleware for Composed {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<HandlerResult> {
        Next {
            chain: Arc::clone(&self.chain),
            index: 0,
            tail: Some(Box::new(next)),
        }
        .run(ctx)
    }
}

/// Fold an ordered list of handlers into a single [`Handler`].
///
/// Inside the composed handler, handler *i*'s continuation invokes handler
/// *i + 1*; the last handler's continuation invokes whatever `next` the
/// composed handler itself was called with. The result is an ordinary
/// `Handler` and can be composed again.
///
/// # Examples
///
/// ```
/// use layered_router::middleware::{compose, from_fn, Next};
/// use layered_router::{Context, Method, Request, StatusCode};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let chain = compose(vec![
///     from_fn(|ctx: Context, next: Next| next.run(ctx)),
///     from_fn(|mut ctx: Context, next: Next| async move {
///         ctx.response_mut().set_status(StatusCode::Ok);
///         next.run(ctx).await
///     }),
/// ]);
///
/// let ctx = Context::new(Request::new(Method::Get, "/"));
/// let ctx = chain.handle(ctx, Next::end()).await.unwrap();
/// assert_eq!(ctx.response().status(), StatusCode::Ok);
/// # }
/// ```
pub fn compose(handlers: Vec<Handler>) -> Handler {
    Arc::new(Composed {
        chain: handlers.into(),
    })
}

// Adapter from a closure to `Middleware`.
struct FnMiddleware<F>(F);

impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<HandlerResult> {
        Box::pin((self.0)(ctx, next))
    }
}

/// Build a [`Handler`] from an async closure.
///
/// ```
/// use layered_router::middleware::{from_fn, Next};
/// use layered_router::{Context, StatusCode};
///
/// let ok = from_fn(|mut ctx: Context, next: Next| async move {
///     ctx.response_mut().set_status(StatusCode::Ok);
///     next.run(ctx).await
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnMiddleware(f))
}

/// Erase a [`Middleware`] implementation into a [`Handler`].
///
/// ```
/// use layered_router::middleware::{from_middleware, LoggerMiddleware};
///
/// let logger = from_middleware(LoggerMiddleware);
/// ```
pub fn from_middleware<M>(middleware: M) -> Handler
where
    M: Middleware + 'static,
{
    Arc::new(middleware)
}

/// Anything route registration accepts as a handler chain.
///
/// Implemented for a single [`Handler`], a `Vec<Handler>`, and arrays of handlers.
pub trait IntoChain {
    fn into_chain(self) -> Vec<Handler>;
}

impl IntoChain for Handler {
    fn into_chain(self) -> Vec<Handler> {
        vec![self]
    }
}

impl IntoChain for Vec<Handler> {
    fn into_chain(self) -> Vec<Handler> {
        self
    }
}

impl<const N: usize> IntoChain for [Handler; N] {
    fn into_chain(self) -> Vec<Handler> {
        self.into()
    }
}

/// Built-in middleware that logs each request's method, path, status, and duration.
///
/// Emits a single `tracing::info!` line once the rest of the chain has run.
/// A failing chain is logged at `warn` and the error passed on untouched.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<HandlerResult> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().to_string();
            let path = ctx.request().path().to_owned();

            match next.run(ctx).await {
                Ok(ctx) => {
                    let status = ctx.response().status().as_u16();
                    tracing::info!(
                        %method,
                        %path,
                        status,
                        elapsed = ?start.elapsed(),
                        "request handled"
                    );
                    Ok(ctx)
                }
                Err(error) => {
                    tracing::warn!(
                        %method,
                        %path,
                        %error,
                        elapsed = ?start.elapsed(),
                        "request failed"
                    );
                    Err(error)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Method, Request, StatusCode};

    #[derive(Default)]
    struct Trail(Vec<&'static str>);

    fn ctx() -> Context {
        Context::new(Request::new(Method::Get, "/"))
    }

    fn mark(label: &'static str) -> Handler {
        from_fn(move |mut ctx: Context, next: Next| async move {
            ctx.extensions_mut().get_or_default::<Trail>().0.push(label);
            next.run(ctx).await
        })
    }

    fn trail(ctx: &Context) -> Vec<&'static str> {
        ctx.extensions()
            .get::<Trail>()
            .map(|t| t.0.clone())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn end_returns_context_untouched() {
        let ctx = Next::end().run(ctx()).await.unwrap();
        assert_eq!(ctx.response().status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn compose_runs_in_order() {
        let chain = compose(vec![mark("a"), mark("b"), mark("c")]);
        let ctx = chain.handle(ctx(), Next::end()).await.unwrap();
        assert_eq!(trail(&ctx), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn code_after_next_runs_on_the_way_back() {
        let wrap = from_fn(|ctx: Context, next: Next| async move {
            let mut ctx = next.run(ctx).await?;
            ctx.extensions_mut().get_or_default::<Trail>().0.push("after");
            Ok(ctx)
        });
        let chain = compose(vec![wrap, mark("inner")]);
        let ctx = chain.handle(ctx(), Next::end()).await.unwrap();
        assert_eq!(trail(&ctx), ["inner", "after"]);
    }

    #[tokio::test]
    async fn not_calling_next_stops_the_chain() {
        let stop = from_fn(|mut ctx: Context, _next: Next| async move {
            ctx.response_mut().set_status(StatusCode::Unauthorized);
            Ok(ctx)
        });
        let chain = compose(vec![mark("a"), stop, mark("never")]);
        let ctx = chain.handle(ctx(), Next::end()).await.unwrap();
        assert_eq!(trail(&ctx), ["a"]);
        assert_eq!(ctx.response().status(), StatusCode::Unauthorized);
    }

    #[tokio::test]
    async fn composed_chain_continues_with_outer_next() {
        let inner = compose(vec![mark("x"), mark("y")]);
        let outer = Next::new(vec![mark("before"), inner, mark("after")]);
        let ctx = outer.run(ctx()).await.unwrap();
        assert_eq!(trail(&ctx), ["before", "x", "y", "after"]);
    }

    #[tokio::test]
    async fn composed_handler_is_reusable() {
        let chain = compose(vec![mark("a"), mark("b")]);
        for _ in 0..3 {
            let ctx = chain.handle(ctx(), Next::end()).await.unwrap();
            assert_eq!(trail(&ctx), ["a", "b"]);
        }
    }

    #[tokio::test]
    async fn errors_propagate_and_skip_the_rest() {
        let fail = from_fn(|_ctx: Context, _next: Next| async move {
            Err::<Context, BoxError>("boom".into())
        });
        let chain = compose(vec![mark("a"), fail, mark("never")]);
        let err = chain.handle(ctx(), Next::end()).await.err().unwrap();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn logger_passes_through() {
        let chain = compose(vec![from_middleware(LoggerMiddleware), mark("handled")]);
        let ctx = chain.handle(ctx(), Next::end()).await.unwrap();
        assert_eq!(trail(&ctx), ["handled"]);
    }

    #[test]
    fn into_chain_accepts_single_vec_and_array() {
        assert_eq!(mark("a").into_chain().len(), 1);
        assert_eq!(vec![mark("a"), mark("b")].into_chain().len(), 2);
        assert_eq!([mark("a"), mark("b"), mark("c")].into_chain().len(), 3);
    }
}
