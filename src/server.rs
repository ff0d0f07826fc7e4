//! HTTP server and graceful shutdown.
//!
//! On **SIGTERM** (what Kubernetes sends before killing a pod) or Ctrl-C the
//! server stops accepting connections, lets every in-flight connection
//! finish, and then returns from [`Server::serve`].

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::pipeline::Pipeline;
use crate::request::Request;
use crate::response::Response;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr = addr.parse().map_err(|e| Error::Configuration {
            var: "bind address",
            reason: format!("`{addr}`: {e}"),
        })?;
        Ok(Self { addr })
    }

    /// Accepts connections and runs each request through `pipeline`.
    ///
    /// Returns after a full graceful shutdown.
    pub async fn serve(self, pipeline: Pipeline) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_on(listener, pipeline, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve) on an already bound listener, stopping
    /// when `shutdown` resolves.
    pub async fn serve_on(
        self,
        listener: TcpListener,
        pipeline: Pipeline,
        shutdown: impl std::future::Future<Output = ()>,
    ) -> Result<(), Error> {
        // One pipeline for every connection task; cloning the Arc is a refcount bump.
        let pipeline = Arc::new(pipeline);
        let addr = listener.local_addr()?;
        info!(%addr, mode = ?pipeline.mode(), "keel listening");

        // Every connection task lands in the JoinSet, so shutdown can wait on them.
        let mut tasks = tokio::task::JoinSet::new();
        // `select!` polls the same shutdown future on every iteration; it must
        // stay put in memory between polls, hence the pin.
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // `biased` polls arms top to bottom instead of at random.
                // Shutdown comes first, so a SIGTERM stops accepting even
                // while connections are still queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, peer) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let pipeline = Arc::clone(&pipeline);
                    // Bridges tokio's AsyncRead/AsyncWrite to hyper's IO traits.
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on this connection, not once
                        // per connection, so keep-alive clients reuse it.
                        let svc = service_fn(move |req| {
                            let pipeline = Arc::clone(&pipeline);
                            async move { dispatch(pipeline, req, peer).await }
                        });

                        // Speaks HTTP/1.1 or HTTP/2, whichever the client negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(%peer, "connection error: {e}");
                        }
                    });
                }

                // Reap finished tasks so the set stays small on long-lived servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Drain: in-flight connections finish before we return.
        while tasks.join_next().await.is_some() {}

        info!("keel stopped");
        Ok(())
    }
}

/// Collects the body, runs the pipeline, converts back to hyper's types.
/// The peer address is available to stages as a `SocketAddr` extension.
///
/// Never fails from hyper's point of view: every outcome, including an
/// unreadable body, is expressed as a response.
async fn dispatch(
    pipeline: Arc<Pipeline>,
    req: hyper::Request<Incoming>,
    peer: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (mut parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(%peer, "failed to read request body: {e}");
            return Ok(Response::status(StatusCode::BAD_REQUEST).into_inner());
        }
    };
    parts.extensions.insert(peer);

    let response = pipeline.handle(Request::new(parts, body)).await;
    Ok(response.into_inner())
}

/// Resolves on SIGTERM or Ctrl-C (Ctrl-C only on non-Unix platforms).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // A future that never resolves disables the SIGTERM arm off Unix.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
