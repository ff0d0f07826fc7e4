//! Health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/liveness` | Is the process alive? Failure → restart. |
//! | **Readiness** | service-chosen | Can it reach its database? Failure → pulled from load-balancer. |
//!
//! Every [`Pipeline`](crate::Pipeline) serves [`liveness`] at
//! [`LIVENESS_PATH`], past CORS and the auth gate, so probes that send no
//! credentials always reach it. Readiness is opt-in:
//!
//! ```rust,no_run
//! use keel::{Router, health};
//! # fn app(pool: sqlx::PgPool) -> Router {
//! Router::new().get("/readiness", move |_req: keel::Request| {
//!     let pool = pool.clone();
//!     async move { health::readiness(&pool).await }
//! })
//! # }
//! ```

use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::db::Ping;
use crate::{Request, Response};

pub const LIVENESS_PATH: &str = "/liveness";

/// Body of every probe response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn up() -> Self {
        Self { status: "UP".to_owned() }
    }

    pub fn down() -> Self {
        Self { status: "DOWN".to_owned() }
    }

    fn respond(&self, code: StatusCode) -> Response {
        match serde_json::to_vec(self) {
            Ok(body) => Response::builder().status(code).json(body),
            Err(err) => Response::status(StatusCode::INTERNAL_SERVER_ERROR).with_error(err.to_string()),
        }
    }
}

/// Liveness probe: always `200 OK` with `{"status":"UP"}`.
///
/// If the process can answer HTTP at all it is alive, so this handler has
/// no dependencies.
pub async fn liveness(_req: Request) -> Response {
    HealthStatus::up().respond(StatusCode::OK)
}

/// Readiness probe: `200 {"status":"UP"}` when `pool` answers a trivial
/// query, `503 {"status":"DOWN"}` otherwise.
pub async fn readiness<P: Ping>(pool: &P) -> Response {
    match pool.ping().await {
        Ok(()) => HealthStatus::up().respond(StatusCode::OK),
        Err(err) => HealthStatus::down()
            .respond(StatusCode::SERVICE_UNAVAILABLE)
            .with_error(err.to_string()),
    }
}
