//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup. The router is the last
//! link of the middleware chain: whatever survives the stages lands here.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

/// The application router.
///
/// Build it once at startup and hand it to
/// [`PipelineBuilder::router`](crate::PipelineBuilder::router). Each
/// registration returns `self` so calls chain.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax and are read with `req.param("name")`.
    ///
    /// # Panics
    ///
    /// Panics if the path is malformed or conflicts with an existing route.
    /// Routes are registered at startup, so this fails before serving begins.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.try_on(method, path, handler)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"))
    }

    /// Like [`on`](Router::on), reporting a bad route instead of panicking.
    pub(crate) fn try_on(
        mut self,
        method: Method,
        path: &str,
        handler: impl Handler,
    ) -> Result<Self, matchit::InsertError> {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())?;
        Ok(self)
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    /// Routes one request. Unknown routes get `404 Not Found`.
    pub(crate) fn dispatch(&self, mut req: Request) -> BoxFuture {
        match self.lookup(req.method(), req.path()) {
            Some((handler, params)) => {
                req.params = params;
                handler.call(req)
            }
            None => Box::pin(async { Response::status(StatusCode::NOT_FOUND) }),
        }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn get(path: &str) -> Request {
        http::Request::builder().uri(path).body(Bytes::new()).unwrap().into()
    }

    async fn user(req: Request) -> String {
        format!("user {}", req.param("id").unwrap_or("?"))
    }

    #[tokio::test]
    async fn dispatch_fills_path_params() {
        let router = Router::new().get("/users/{id}", user);
        let res = router.dispatch(get("/users/42")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"user 42");
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let router = Router::new().get("/users/{id}", user);
        assert_eq!(router.dispatch(get("/orders/1")).await.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    #[should_panic(expected = "invalid route `/users/{id}`")]
    fn conflicting_route_panics() {
        let _ = Router::new().get("/users/{id}", user).get("/users/{id}", user);
    }
}
