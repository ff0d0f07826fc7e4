//! # keel
//!
//! The shared bootstrap kernel every backend service starts from.
//!
//! A service built on keel gets, without writing any of it:
//!
//! - **Logging**: one process-wide [`Logger`](logger::Logger), created on
//!   first use, writing enriched records to the console and an optional
//!   remote log server
//! - **Database**: [`db::init_db`] opens and verifies a connection pool
//!   through a [`db::Connector`]
//! - **Request pipeline**: access log, CORS, session verification in
//!   production, the service's routes, and `GET /liveness`
//! - **Graceful shutdown**: SIGTERM / Ctrl-C drains in-flight requests
//!
//! ## Environment
//!
//! | Variable | Used by |
//! |---|---|
//! | `LOG_LEVEL`, `LOG_FORMAT`, `LOG_SERVER` | [`logger`] |
//! | `DATABASE_URL` or `DB_HOST`, `DB_PORT`, `DB_USERNAME`, `DB_PASSWORD`, `DB`, `DB_LOGS` | [`DbAuth`] |
//! | `RUN_MODE` | [`RunMode`] |
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use keel::db::{self, PgConnector};
//! use keel::{DbAuth, Pipeline, Request, Response, Router, RunMode, Server, logger};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), keel::Error> {
//!     let log = logger::get_logger("orders");
//!
//!     let connector = PgConnector::from_auth(&DbAuth::from_env(), "orders")?;
//!     let db = db::init_db(&connector).await?;
//!     let pool = db.into_pool();
//!
//!     let routes = Router::new().get("/orders/{id}", move |req: Request| {
//!         let _pool = pool.clone();
//!         async move { Response::text(format!("order {}", req.param("id").unwrap_or("?"))) }
//!     });
//!
//!     let pipeline = Pipeline::builder(log)
//!         .mode(RunMode::from_env())
//!         .router(routes)
//!         .build()?;
//!
//!     Server::bind("0.0.0.0:8080")?.serve(pipeline).await
//! }
//! ```

mod error;
mod handler;
mod pipeline;
mod request;
mod response;
mod router;
mod server;

pub mod config;
pub mod db;
pub mod health;
pub mod logger;
pub mod middleware;

pub use config::{DbAuth, RunMode};
pub use error::Error;
pub use handler::{BoxFuture, Handler};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
