//! Cross-origin resource sharing.

use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_METHOD, CONTENT_TYPE, HeaderName,
    HeaderValue, ORIGIN, VARY,
};
use http::{HeaderMap, Method, StatusCode};

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

/// CORS policy: any origin, credentials allowed, a fixed method list and a
/// header allow-list.
///
/// Because credentials are allowed, the caller's `Origin` is echoed back
/// instead of `*`, which browsers reject on credentialed requests.
/// Preflight requests are answered here with `204 No Content`, or
/// `403 Forbidden` when the requested method is not allowed; they never
/// reach later stages.
#[derive(Clone, Debug)]
pub struct Cors {
    methods: Vec<Method>,
    headers: Vec<HeaderName>,
}

impl Cors {
    /// `GET`, `POST`, `DELETE`, `PUT`, `OPTIONS`; header `content-type`.
    pub fn new() -> Self {
        Self {
            methods: vec![Method::GET, Method::POST, Method::DELETE, Method::PUT, Method::OPTIONS],
            headers: vec![CONTENT_TYPE],
        }
    }

    /// Extends the header allow-list, skipping duplicates.
    pub fn allow_headers(mut self, headers: impl IntoIterator<Item = HeaderName>) -> Self {
        for header in headers {
            if !self.headers.contains(&header) {
                self.headers.push(header);
            }
        }
        self
    }

    pub fn allowed_headers(&self) -> &[HeaderName] {
        &self.headers
    }

    fn allows(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m.as_str().eq_ignore_ascii_case(method))
    }

    fn decorate(&self, headers: &mut HeaderMap, origin: HeaderValue) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        headers.append(VARY, HeaderValue::from_static("origin"));
    }

    fn preflight(&self, origin: HeaderValue) -> Response {
        let mut res = Response::status(StatusCode::NO_CONTENT);
        self.decorate(res.headers_mut(), origin);
        let methods = join(self.methods.iter().map(Method::as_str));
        let headers = join(self.headers.iter().map(HeaderName::as_str));
        for (name, value) in [(ACCESS_CONTROL_ALLOW_METHODS, methods), (ACCESS_CONTROL_ALLOW_HEADERS, headers)] {
            if let Ok(value) = HeaderValue::from_str(&value) {
                res.headers_mut().insert(name, value);
            }
        }
        res
    }
}

impl Default for Cors {
    fn default() -> Self { Self::new() }
}

fn join<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<Vec<_>>().join(",")
}

impl Middleware for Cors {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let Some(origin) = req.headers().get(ORIGIN).cloned() else {
            return next.run(req);
        };

        if req.method() == Method::OPTIONS {
            if let Some(requested) = req.header(ACCESS_CONTROL_REQUEST_METHOD.as_str()) {
                let res = if self.allows(requested) {
                    self.preflight(origin)
                } else {
                    Response::status(StatusCode::FORBIDDEN)
                };
                return Box::pin(async move { res });
            }
        }

        let cors = self.clone();
        Box::pin(async move {
            let mut res = next.run(req).await;
            cors.decorate(res.headers_mut(), origin);
            res
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;

    use super::*;
    use crate::middleware::Chain;
    use crate::Router;

    fn chain(cors: Cors) -> Arc<Chain> {
        let router = Router::new()
            .get("/items", |_req: Request| async { "items" })
            .on(Method::OPTIONS, "/items", |_req: Request| async { "options handler" });
        Chain::new(vec![Arc::new(cors)], router)
    }

    fn request(method: Method, headers: &[(&str, &str)]) -> Request {
        let mut builder = http::Request::builder().method(method).uri("/items");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(Bytes::new()).unwrap().into()
    }

    #[tokio::test]
    async fn preflight_is_answered_without_reaching_the_router() {
        let cors = Cors::new().allow_headers([HeaderName::from_static("rid")]);
        let req = request(Method::OPTIONS, &[
            ("origin", "https://app.example"),
            ("access-control-request-method", "POST"),
        ]);

        let res = chain(cors).start().run(req).await;
        assert_eq!(res.status_code(), StatusCode::NO_CONTENT);
        assert!(res.body().is_empty());
        let h = res.headers();
        assert_eq!(h[ACCESS_CONTROL_ALLOW_ORIGIN], "https://app.example");
        assert_eq!(h[ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(h[ACCESS_CONTROL_ALLOW_METHODS], "GET,POST,DELETE,PUT,OPTIONS");
        assert_eq!(h[ACCESS_CONTROL_ALLOW_HEADERS], "content-type,rid");
    }

    #[tokio::test]
    async fn preflight_for_a_disallowed_method_is_forbidden() {
        let req = request(Method::OPTIONS, &[
            ("origin", "https://app.example"),
            ("access-control-request-method", "PATCH"),
        ]);
        let res = chain(Cors::new()).start().run(req).await;
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert!(res.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn simple_request_is_decorated() {
        let req = request(Method::GET, &[("origin", "https://app.example")]);
        let res = chain(Cors::new()).start().run(req).await;
        assert_eq!(res.body(), b"items");
        assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "https://app.example");
        assert_eq!(res.headers()[VARY], "origin");
    }

    #[tokio::test]
    async fn same_origin_requests_pass_untouched() {
        let res = chain(Cors::new()).start().run(request(Method::GET, &[])).await;
        assert_eq!(res.body(), b"items");
        assert!(res.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());

        let plain_options = request(Method::OPTIONS, &[("origin", "https://app.example")]);
        let res = chain(Cors::new()).start().run(plain_options).await;
        assert_eq!(res.body(), b"options handler");
    }

    #[test]
    fn allow_headers_skips_duplicates() {
        let cors = Cors::new().allow_headers([CONTENT_TYPE, HeaderName::from_static("fdi-version")]);
        assert_eq!(cors.allowed_headers(), &[CONTENT_TYPE, HeaderName::from_static("fdi-version")]);
    }
}
