//! Session-verification gate.
//!
//! Session verification is owned by an external component with a plain
//! handler convention: it takes the request plus a success callback, calls
//! the callback with an enriched request when the session is valid, and
//! writes its own failure response otherwise. [`AuthGate`] adapts that
//! convention to the middleware chain.

use std::sync::Arc;

use http::header::HeaderName;

use super::{Middleware, Next};
use crate::config::RunMode;
use crate::handler::BoxFuture;
use crate::request::Request;

/// The success callback handed to a [`SessionVerifier`].
///
/// Called at most once, with the request carrying the verifier's session
/// data (typically in its extensions). It resumes the pipeline and resolves
/// to the pipeline's response.
pub type Continuation = Box<dyn FnOnce(Request) -> BoxFuture + Send>;

/// An external session verifier.
///
/// On success, return `on_success(enriched_request)`. On failure, return a
/// response of your own (e.g. `401 Unauthorized`) and drop `on_success`.
pub trait SessionVerifier: Send + Sync + 'static {
    fn verify(&self, req: Request, on_success: Continuation) -> BoxFuture;

    /// Request headers the verifier needs browsers to be allowed to send.
    fn cors_headers(&self) -> Vec<HeaderName> {
        Vec::new()
    }
}

impl<F> SessionVerifier for F
where
    F: Fn(Request, Continuation) -> BoxFuture + Send + Sync + 'static,
{
    fn verify(&self, req: Request, on_success: Continuation) -> BoxFuture {
        self(req, on_success)
    }
}

/// Splices a [`SessionVerifier`] into the chain.
///
/// The pipeline's [`Next`] is moved into the verifier's success callback:
/// when the verifier accepts, the chain resumes with the enriched request;
/// when it rejects, `Next` is dropped unused and the verifier's response is
/// the only one produced.
///
/// Outside [`RunMode::Production`] the gate passes every request through.
/// Exempt paths always pass through.
pub struct AuthGate {
    verifier: Option<Arc<dyn SessionVerifier>>,
    exempt: Vec<String>,
}

impl AuthGate {
    pub fn new(mode: RunMode, verifier: Arc<dyn SessionVerifier>) -> Self {
        Self {
            verifier: mode.is_production().then_some(verifier),
            exempt: Vec::new(),
        }
    }

    /// Lets requests for `path` (exact match) bypass verification.
    pub fn exempt(mut self, path: impl Into<String>) -> Self {
        self.exempt.push(path.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.verifier.is_some()
    }
}

impl Middleware for AuthGate {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let Some(verifier) = &self.verifier else {
            return next.run(req);
        };
        if self.exempt.iter().any(|path| path == req.path()) {
            return next.run(req);
        }
        let on_success: Continuation = Box::new(move |verified: Request| next.run(verified));
        verifier.verify(req, on_success)
    }
}
