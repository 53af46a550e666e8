//! Declarative route tables.
//!
//! Handlers are code, so a table refers to them by name. The names are resolved
//! against a [`HandlerRegistry`] the application fills in at startup:
//!
//! ```json
//! {
//!   "prefix": "/api",
//!   "routes": [
//!     { "handlers": ["logger"] },
//!     { "method": "GET", "path": "/posts/:id", "handlers": ["auth", "show_post"] }
//!   ]
//! }
//! ```
//!
//! A route without `method` answers every method; one without `path` matches
//! every path.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::http::Method;
use crate::middleware::Handler;
use crate::router::{RouteError, RoutePath, Router, RouterOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed route table: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Route(#[from] RouteError),
}

/// Named handlers available to route tables.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, handler: Handler) -> &mut Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn resolve(&self, names: &[String]) -> Result<Vec<Handler>, RouteError> {
        names
            .iter()
            .map(|name| {
                self.get(name).cloned().ok_or_else(|| RouteError::Validation {
                    reason: "unknown handler",
                    value: name.clone(),
                })
            })
            .collect()
    }
}

/// One entry of a route table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteConfig {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    pub handlers: Vec<String>,
}

/// A router described as data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RouterConfig {
    #[serde(flatten)]
    pub options: RouterOptions,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

impl RouterConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Register every route, in table order, on a new router.
    pub fn build(&self, registry: &HandlerRegistry) -> Result<Router, ConfigError> {
        let mut router = Router::with_options(self.options.clone());
        for route in &self.routes {
            let method = route.method.as_deref().map(parse_method).transpose()?;
            let path = route.path.as_deref().map_or(RoutePath::Any, RoutePath::Pattern);
            router.route(method, path, registry.resolve(&route.handlers)?)?;
        }
        Ok(router)
    }
}

// Method names are HTTP tokens (RFC 9110 §5.6.2).
fn parse_method(name: &str) -> Result<Method, RouteError> {
    let is_token = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));
    if !is_token {
        return Err(RouteError::Validation {
            reason: "invalid method",
            value: name.to_owned(),
        });
    }
    Ok(name.parse::<Method>().unwrap_or_else(|never| match never {}))
}
