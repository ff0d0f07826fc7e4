//! Access logging.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use http::{Method, StatusCode, Version};

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::logger::Logger;
use crate::request::Request;

/// Writes one line per completed request:
///
/// ```text
/// [Mon, 19 Oct 2026 08:15:02 UTC] "GET /liveness HTTP/1.1 200 183.2µs "kube-probe/1.29" "
/// ```
///
/// Fields: timestamp (RFC 1123), method, path, protocol, status, latency,
/// user agent, and the error message the handler attached, if any.
pub struct AccessLog {
    logger: Arc<Logger>,
}

impl AccessLog {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self { logger }
    }
}

impl Middleware for AccessLog {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let logger = Arc::clone(&self.logger);
        let entry = Entry {
            method: req.method().clone(),
            path: req.path().to_owned(),
            version: req.version(),
            user_agent: req.user_agent().to_owned(),
        };
        let start = Instant::now();

        Box::pin(async move {
            let res = next.run(req).await;
            let line = entry.format(Utc::now(), res.status_code(), start.elapsed(), res.error().unwrap_or(""));
            if let Err(err) = logger.access(&line) {
                tracing::error!(%err, "access log write failed");
            }
            res
        })
    }
}

struct Entry {
    method: Method,
    path: String,
    version: Version,
    user_agent: String,
}

impl Entry {
    /// `done` is when the response came back, not when the request arrived.
    fn format(&self, done: DateTime<Utc>, status: StatusCode, latency: Duration, error: &str) -> String {
        format!(
            "[{}] \"{} {} {:?} {} {:?} \"{}\" {}\"",
            done.format("%a, %d %b %Y %H:%M:%S UTC"),
            self.method,
            self.path,
            self.version,
            status.as_u16(),
            latency,
            self.user_agent,
            error,
        )
    }
}
