//! Middleware chain.
//!
//! A stage receives the request and a [`Next`], the rest of the chain. It
//! either continues, by consuming `next` with [`Next::run`], or terminates by
//! returning its own response without touching `next`. `Next` is moved on
//! use, so a stage can continue at most once, and a stage that answers by
//! itself is guaranteed the chain stops there.
//!
//! ```text
//! request → AccessLog → Cors → AuthGate → service stages → Router → handler
//! response ←──────────────────────────────────────────────────────────┘
//! ```
//!
//! Built-in stages:
//! - [`AccessLog`]: one line per completed request
//! - [`Cors`]: cross-origin policy and preflight answers
//! - [`AuthGate`]: bridges an external session verifier into the chain

mod access_log;
mod auth;
mod cors;

use std::future::Future;
use std::sync::Arc;

use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

pub use access_log::AccessLog;
pub use auth::{AuthGate, Continuation, SessionVerifier};
pub use cors::Cors;

/// A pipeline stage.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: Request, next: Next) -> BoxFuture;
}

/// The remainder of the chain after the current stage.
pub struct Next {
    chain: Arc<Chain>,
    index: usize,
}

impl Next {
    /// Hands `req` to the next stage, or to the router after the last one.
    pub fn run(self, req: Request) -> BoxFuture {
        match self.chain.stages.get(self.index) {
            Some(stage) => {
                let stage = Arc::clone(stage);
                let next = Next { chain: self.chain, index: self.index + 1 };
                stage.handle(req, next)
            }
            None => self.chain.router.dispatch(req),
        }
    }
}

/// Ordered stages ending in a router. Immutable once built.
pub(crate) struct Chain {
    stages: Vec<Arc<dyn Middleware>>,
    router: Router,
}

impl Chain {
    pub(crate) fn new(stages: Vec<Arc<dyn Middleware>>, router: Router) -> Arc<Self> {
        Arc::new(Self { stages, router })
    }

    pub(crate) fn len(&self) -> usize {
        self.stages.len()
    }

    pub(crate) fn start(self: &Arc<Self>) -> Next {
        Next { chain: Arc::clone(self), index: 0 }
    }
}

// ── Closure middleware ────────────────────────────────────────────────────────

/// Turns an `async` closure into a stage.
///
/// ```rust
/// use keel::middleware::{self, Next};
/// use keel::Request;
///
/// let stamp = middleware::from_fn(|req: Request, next: Next| async move {
///     let mut res = next.run(req).await;
///     res.headers_mut().insert("x-served-by", "keel".parse().unwrap());
///     res
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    FromFn(f)
}

pub struct FromFn<F>(F);

impl<F, Fut> Middleware for FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        Box::pin((self.0)(req, next))
    }
}
