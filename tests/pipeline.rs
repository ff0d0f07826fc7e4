use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use http::header::{ACCESS_CONTROL_ALLOW_HEADERS, HeaderName};
use http::{Method, StatusCode};
use keel::logger::{Logger, MemorySink};
use keel::middleware::{self, Continuation, Next, SessionVerifier};
use keel::{BoxFuture, Error, Pipeline, Request, Response, Router, RunMode};

fn logger() -> (Arc<Logger>, MemorySink) {
    let out = MemorySink::new();
    let logger = Logger::builder("orders").without_console().sink(out.clone()).build().unwrap();
    (Arc::new(logger), out)
}

fn request(method: Method, path: &str, headers: &[(&str, &str)]) -> Request {
    let mut builder = http::Request::builder().method(method).uri(path).header("user-agent", "curl/8.5");
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }
    builder.body(Bytes::new()).unwrap().into()
}

/// Rejects every request and counts how often it was asked.
struct DenyAll(Arc<AtomicUsize>);

impl SessionVerifier for DenyAll {
    fn verify(&self, _req: Request, _on_success: Continuation) -> BoxFuture {
        self.0.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Response::status(StatusCode::UNAUTHORIZED) })
    }

    fn cors_headers(&self) -> Vec<HeaderName> {
        vec![HeaderName::from_static("rid"), HeaderName::from_static("st-auth-mode")]
    }
}

fn counted_routes(hits: Arc<AtomicUsize>) -> Router {
    Router::new().get("/private", move |_req: Request| {
        hits.fetch_add(1, Ordering::SeqCst);
        async { "secret" }
    })
}

#[tokio::test]
async fn liveness_bypasses_a_rejecting_verifier() {
    let (log, out) = logger();
    let checks = Arc::new(AtomicUsize::new(0));
    let pipeline = Pipeline::builder(log)
        .mode(RunMode::Production)
        .session(DenyAll(Arc::clone(&checks)))
        .build()
        .unwrap();

    let res = pipeline.handle(request(Method::GET, "/liveness", &[])).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.body(), br#"{"status":"UP"}"#);
    assert_eq!(checks.load(Ordering::SeqCst), 0);

    let lines = out.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("\"GET /liveness HTTP/1.1 200 "), "{}", lines[0]);
    assert!(lines[0].contains("\"curl/8.5\""), "{}", lines[0]);
}

#[tokio::test]
async fn rejected_session_stops_before_the_route() {
    let (log, out) = logger();
    let (checks, hits) = (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));
    let pipeline = Pipeline::builder(log)
        .mode(RunMode::Production)
        .session(DenyAll(Arc::clone(&checks)))
        .router(counted_routes(Arc::clone(&hits)))
        .build()
        .unwrap();

    let res = pipeline.handle(request(Method::GET, "/private", &[])).await;
    assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(checks.load(Ordering::SeqCst), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    // The rejection is still access-logged.
    assert!(out.contents().contains("\"GET /private HTTP/1.1 401 "));
}

#[tokio::test]
async fn development_mode_has_no_gate() {
    let (log, _out) = logger();
    let (checks, hits) = (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));
    let pipeline = Pipeline::builder(log)
        .mode(RunMode::Development)
        .session(DenyAll(Arc::clone(&checks)))
        .router(counted_routes(Arc::clone(&hits)))
        .build()
        .unwrap();

    // Access log and CORS only.
    assert_eq!(pipeline.stages(), 2);

    let res = pipeline.handle(request(Method::GET, "/private", &[])).await;
    assert_eq!(res.body(), b"secret");
    assert_eq!(checks.load(Ordering::SeqCst), 0);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn production_preflight_allows_verifier_headers() {
    let preflight = || {
        request(Method::OPTIONS, "/private", &[
            ("origin", "https://app.example"),
            ("access-control-request-method", "GET"),
        ])
    };

    let (log, _) = logger();
    let prod = Pipeline::builder(log)
        .mode(RunMode::Production)
        .session(DenyAll(Arc::new(AtomicUsize::new(0))))
        .build()
        .unwrap();
    let res = prod.handle(preflight()).await;
    assert_eq!(res.status_code(), StatusCode::NO_CONTENT);
    assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_HEADERS], "content-type,rid,st-auth-mode");

    let (log, _) = logger();
    let dev = Pipeline::builder(log).build().unwrap();
    let res = dev.handle(preflight()).await;
    assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_HEADERS], "content-type");
}

#[tokio::test]
async fn service_layers_run_after_the_gate() {
    let (log, _) = logger();
    let pipeline = Pipeline::builder(log)
        .layer(middleware::from_fn(|req: Request, next: Next| async move {
            let mut res = next.run(req).await;
            res.headers_mut().insert("x-request-id", "abc".parse().unwrap());
            res
        }))
        .build()
        .unwrap();

    assert_eq!(pipeline.stages(), 3);
    let res = pipeline.handle(request(Method::GET, "/liveness", &[])).await;
    assert_eq!(res.headers()["x-request-id"], "abc");
}

#[tokio::test]
async fn unknown_route_is_not_found_and_logged() {
    let (log, out) = logger();
    let pipeline = Pipeline::builder(log).build().unwrap();

    let res = pipeline.handle(request(Method::GET, "/nope", &[])).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert!(out.contents().contains(" 404 "));
}

#[test]
fn production_requires_a_verifier() {
    let (log, _) = logger();
    let err = Pipeline::builder(log).mode(RunMode::Production).build().err().unwrap();
    assert!(matches!(err, Error::Configuration { var: "RUN_MODE", .. }));
}

#[test]
fn a_service_liveness_route_is_rejected() {
    let (log, _) = logger();
    let routes = Router::new().get("/liveness", |_req: Request| async { "mine" });
    let err = Pipeline::builder(log).router(routes).build().err().unwrap();
    assert!(matches!(err, Error::Configuration { var: "router", .. }), "{err}");
}
