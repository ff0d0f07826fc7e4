//! Database connection management.
//!
//! keel does not know which storage engine a service uses. A [`Connector`]
//! describes how to open one, [`init_db`] opens it, pings it once, and hands
//! back a [`ConnectionHandle`]. Pooling and retries belong to the engine's
//! client; keel adds neither.
//!
//! ```rust,no_run
//! use keel::config::DbAuth;
//! use keel::db::{self, PgConnector};
//!
//! # async fn run() -> Result<(), keel::Error> {
//! let connector = PgConnector::from_auth(&DbAuth::from_env(), "orders")?;
//! let handle = db::init_db(&connector).await?;
//! let rows = handle.context()
//!     .with_timeout(std::time::Duration::from_secs(2), sqlx::query("SELECT 1").fetch_all(handle.pool()))
//!     .await??;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::{Duration, Instant};

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::ConnectOptions;

use crate::config::DbAuth;
use crate::error::Error;

/// A trivial round trip proving a connection is usable.
pub trait Ping: Send + Sync {
    fn ping(&self) -> impl Future<Output = Result<(), Error>> + Send;
}

impl Ping for PgPool {
    fn ping(&self) -> impl Future<Output = Result<(), Error>> + Send {
        async move {
            sqlx::query("SELECT 1").execute(self).await?;
            Ok(())
        }
    }
}

/// Opens a connection pool for one storage engine.
pub trait Connector: Send + Sync {
    type Pool: Ping + 'static;

    /// Engine name, for diagnostics.
    fn engine(&self) -> &'static str;

    fn open(&self) -> impl Future<Output = Result<Self::Pool, Error>> + Send;
}

// ── RootContext ───────────────────────────────────────────────────────────────

/// The root of every database operation's context.
///
/// It never expires and cannot be cancelled. Request-scoped work derives its
/// own deadline with [`with_timeout`](RootContext::with_timeout).
#[derive(Clone, Copy, Debug)]
pub struct RootContext {
    created: Instant,
}

impl RootContext {
    pub fn background() -> Self {
        Self { created: Instant::now() }
    }

    pub fn deadline(&self) -> Option<Instant> {
        None
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    /// Runs `fut` under a deadline of `limit` from now.
    pub async fn with_timeout<F: Future>(&self, limit: Duration, fut: F) -> Result<F::Output, Error> {
        tokio::time::timeout(limit, fut).await.map_err(|_| Error::Timeout(limit))
    }
}

// ── ConnectionHandle ──────────────────────────────────────────────────────────

/// An opened pool plus its root context.
///
/// keel keeps no reference to it. Clone it (sqlx pools are cheap handles) to
/// share across requests.
#[derive(Clone, Debug)]
pub struct ConnectionHandle<P> {
    pool: P,
    context: RootContext,
}

impl<P: Ping> ConnectionHandle<P> {
    pub fn pool(&self) -> &P { &self.pool }
    pub fn context(&self) -> RootContext { self.context }
    pub fn into_pool(self) -> P { self.pool }

    pub async fn ping(&self) -> Result<(), Error> {
        self.pool.ping().await
    }
}

/// Opens `connector`'s pool and verifies it with one ping.
///
/// Any failure is returned; nothing is retried.
pub async fn init_db<C: Connector>(connector: &C) -> Result<ConnectionHandle<C::Pool>, Error> {
    let pool = connector.open().await?;
    pool.ping().await?;
    tracing::debug!(engine = connector.engine(), "database connection established");
    Ok(ConnectionHandle { pool, context: RootContext::background() })
}

// ── PgConnector ───────────────────────────────────────────────────────────────

/// PostgreSQL connector built from [`DbAuth`].
#[derive(Clone, Debug)]
pub struct PgConnector {
    options: PgConnectOptions,
    max_connections: u32,
    acquire_timeout: Duration,
}

impl PgConnector {
    /// Uses `DATABASE_URL` when set, otherwise the discrete `DB_*` fields.
    ///
    /// Fields-based connections run without TLS. `app_name` is reported to
    /// the server as the session's application name.
    pub fn from_auth(auth: &DbAuth, app_name: &str) -> Result<Self, Error> {
        let options = if auth.url.is_empty() {
            if auth.host.is_empty() {
                return Err(Error::Configuration { var: "DB_HOST", reason: "not set".into() });
            }
            let port = auth.port.parse::<u16>().map_err(|e| Error::Configuration {
                var: "DB_PORT",
                reason: format!("`{}`: {e}", auth.port),
            })?;
            PgConnectOptions::new()
                .host(&auth.host)
                .port(port)
                .username(&auth.username)
                .password(&auth.password)
                .database(&auth.name)
                .ssl_mode(PgSslMode::Disable)
        } else {
            auth.url.parse::<PgConnectOptions>().map_err(|e| Error::Configuration {
                var: "DATABASE_URL",
                reason: e.to_string(),
            })?
        };

        let mut options = options.application_name(app_name);
        if !auth.log_statements {
            options = options.disable_statement_logging();
        }

        Ok(Self { options, max_connections: 10, acquire_timeout: Duration::from_secs(5) })
    }

    pub fn options(&self) -> &PgConnectOptions {
        &self.options
    }
}

impl Connector for PgConnector {
    type Pool = PgPool;

    fn engine(&self) -> &'static str {
        "postgres"
    }

    fn open(&self) -> impl Future<Output = Result<PgPool, Error>> + Send {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout);
        let options = self.options.clone();
        async move { Ok(pool.connect_with(options).await?) }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Clone, Default)]
    struct MockPool {
        pings: Arc<AtomicUsize>,
        healthy: bool,
    }

    impl Ping for MockPool {
        fn ping(&self) -> impl Future<Output = Result<(), Error>> + Send {
            self.pings.fetch_add(1, Ordering::SeqCst);
            let healthy = self.healthy;
            async move {
                if healthy { Ok(()) } else { Err(Error::Connection(sqlx::Error::PoolTimedOut)) }
            }
        }
    }

    struct MockConnector {
        reachable: bool,
        pool: MockPool,
    }

    impl Connector for MockConnector {
        type Pool = MockPool;

        fn engine(&self) -> &'static str { "mock" }

        fn open(&self) -> impl Future<Output = Result<MockPool, Error>> + Send {
            let result = if self.reachable {
                Ok(self.pool.clone())
            } else {
                Err(Error::Connection(sqlx::Error::PoolClosed))
            };
            async move { result }
        }
    }

    #[tokio::test]
    async fn init_db_returns_a_pinged_handle() {
        let pool = MockPool { healthy: true, ..MockPool::default() };
        let connector = MockConnector { reachable: true, pool: pool.clone() };

        let handle = init_db(&connector).await.unwrap();
        assert_eq!(pool.pings.load(Ordering::SeqCst), 1);
        assert!(handle.context().deadline().is_none());
        handle.ping().await.unwrap();
        assert_eq!(pool.pings.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unreachable_engine_is_an_error() {
        let connector = MockConnector { reachable: false, pool: MockPool::default() };
        assert!(matches!(init_db(&connector).await, Err(Error::Connection(_))));
    }

    #[tokio::test]
    async fn failed_ping_is_an_error() {
        let connector = MockConnector { reachable: true, pool: MockPool::default() };
        assert!(matches!(init_db(&connector).await, Err(Error::Connection(_))));
    }

    #[tokio::test]
    async fn derived_deadline_expires() {
        let ctx = RootContext::background();
        assert!(ctx.deadline().is_none());
        assert!(ctx.created() <= Instant::now());
        let slow = tokio::time::sleep(Duration::from_secs(5));
        let err = ctx.with_timeout(Duration::from_millis(10), slow).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_millis(10)));
        assert_eq!(ctx.with_timeout(Duration::from_secs(1), async { 7 }).await.unwrap(), 7);
    }

    #[test]
    fn connector_from_fields() {
        let auth = DbAuth {
            host: "db.internal".into(),
            port: "6543".into(),
            username: "svc".into(),
            password: "pw".into(),
            name: "orders".into(),
            ..DbAuth::default()
        };
        let connector = PgConnector::from_auth(&auth, "orders-api").unwrap();
        let opts = connector.options();
        assert_eq!(opts.get_host(), "db.internal");
        assert_eq!(opts.get_port(), 6543);
        assert_eq!(opts.get_username(), "svc");
        assert_eq!(opts.get_database(), Some("orders"));
        assert_eq!(opts.get_application_name(), Some("orders-api"));
    }

    #[test]
    fn database_url_takes_precedence() {
        let auth = DbAuth {
            url: "postgres://app:pw@primary:5433/ledger".into(),
            host: "ignored".into(),
            ..DbAuth::default()
        };
        let connector = PgConnector::from_auth(&auth, "ledger").unwrap();
        assert_eq!(connector.options().get_host(), "primary");
        assert_eq!(connector.options().get_port(), 5433);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let no_host = DbAuth::default();
        assert!(matches!(
            PgConnector::from_auth(&no_host, "x"),
            Err(Error::Configuration { var: "DB_HOST", .. })
        ));

        let bad_port = DbAuth { host: "db".into(), port: "five".into(), ..DbAuth::default() };
        assert!(matches!(
            PgConnector::from_auth(&bad_port, "x"),
            Err(Error::Configuration { var: "DB_PORT", .. })
        ));

        let bad_url = DbAuth { url: "not a url".into(), ..DbAuth::default() };
        assert!(matches!(
            PgConnector::from_auth(&bad_url, "x"),
            Err(Error::Configuration { var: "DATABASE_URL", .. })
        ));
    }
}
