//! A small blog API assembled from a route table and a hand-built sub-router,
//! driven with in-memory requests.
//!
//! ```sh
//! RUST_LOG=layered_router=trace,blog_api=info cargo run --example blog_api
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use layered_router::middleware::{LoggerMiddleware, from_fn, from_middleware};
use layered_router::{
    BoxError, Context, HandlerRegistry, Method, Next, Request, RouterConfig, Router, StatusCode,
};

const ROUTES: &str = r#"{
    "prefix": "/api",
    "routes": [
        { "handlers": ["logger"] },
        { "method": "GET", "path": "/health", "handlers": ["health"] }
    ]
}"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Post {
    title: String,
    tags: Vec<String>,
}

type Store = Arc<RwLock<Vec<Post>>>;

fn posts_router(store: Store) -> Result<Router, BoxError> {
    let mut posts = Router::new();

    let list = store.clone();
    posts.get("/", from_fn(move |mut ctx: Context, next: Next| {
        let store = list.clone();
        async move {
            let all = store.read().await.clone();
            ctx.response_mut().set_status(StatusCode::Ok);
            ctx.response_mut().set_json(&all)?;
            next.run(ctx).await
        }
    }))?;

    let show = store.clone();
    posts.get("/:id(\\d+)", from_fn(move |mut ctx: Context, next: Next| {
        let store = show.clone();
        async move {
            let id: usize = ctx.param("id").unwrap_or_default().parse()?;
            if let Some(post) = store.read().await.get(id) {
                ctx.response_mut().set_status(StatusCode::Ok);
                ctx.response_mut().set_json(post)?;
            }
            next.run(ctx).await
        }
    }))?;

    let create = store;
    posts.post("/", from_fn(move |mut ctx: Context, next: Next| {
        let store = create.clone();
        async move {
            let post: Post = ctx.json()?;
            store.write().await.push(post);
            ctx.response_mut().set_status(StatusCode::Created);
            next.run(ctx).await
        }
    }))?;

    posts.get("/tagged/:tags+", from_fn(|mut ctx: Context, next: Next| async move {
        let tags = ctx
            .params()
            .and_then(|params| params.get_all("tags"))
            .map(<[String]>::to_vec)
            .unwrap_or_default();
        ctx.response_mut().set_status(StatusCode::Ok);
        ctx.response_mut().set_json(&tags)?;
        next.run(ctx).await
    }))?;

    Ok(posts)
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "layered_router=debug,blog_api=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut registry = HandlerRegistry::new();
    registry
        .register("logger", from_middleware(LoggerMiddleware))
        .register("health", from_fn(|mut ctx: Context, next: Next| async move {
            ctx.response_mut().set_status(StatusCode::Ok);
            ctx.response_mut().set_text("ok");
            next.run(ctx).await
        }));

    let store = Store::default();
    let mut api = RouterConfig::from_json(ROUTES)?.build(&registry)?;
    api.mount_at("/posts", &posts_router(store)?)?;
    tracing::info!(layers = api.len(), prefix = api.prefix(), "router ready");

    // Host pipeline: the router, then a fallback that only fires when nothing claimed the request.
    let pipeline = vec![
        api.into_middleware(),
        from_fn(|mut ctx: Context, next: Next| async move {
            if ctx.response().status() == StatusCode::NotFound && ctx.response().body().is_empty() {
                ctx.response_mut().set_text("no such route");
            }
            next.run(ctx).await
        }),
    ];

    let raw = b"POST /api/posts HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\n\r\n\
                {\"title\":\"Hello\",\"tags\":[\"rust\"]}";
    let requests = [
        Request::new(Method::Get, "/api/health"),
        Request::parse(raw)?,
        Request::new(Method::Get, "/api/posts"),
        Request::new(Method::Get, "/api/posts/0?fields=title"),
        Request::new(Method::Get, "/api/posts/tagged/rust/async"),
        Request::new(Method::Delete, "/api/posts/0"),
    ];

    for request in requests {
        let line = format!("{} {}", request.method(), request.path());
        let ctx = Next::new(pipeline.clone()).run(Context::new(request)).await?;
        let response = ctx.into_response();
        tracing::info!(
            request = %line,
            status = response.status().as_u16(),
            body = response.text().unwrap_or_default(),
            "response"
        );
    }

    Ok(())
}
