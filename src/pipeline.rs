//! Request pipeline assembly.
//!
//! Every service gets the same chain, in the same order:
//!
//! 1. [`AccessLog`]
//! 2. [`Cors`], extended with the verifier's headers in production
//! 3. [`AuthGate`], in production only
//! 4. service stages added with [`PipelineBuilder::layer`]
//! 5. the service's [`Router`], plus `GET /liveness`

use std::sync::Arc;

use http::Method;

use crate::config::RunMode;
use crate::error::Error;
use crate::health::{self, LIVENESS_PATH};
use crate::logger::Logger;
use crate::middleware::{AccessLog, AuthGate, Chain, Cors, Middleware, SessionVerifier};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// The assembled chain. Built once at startup; shared by every connection.
pub struct Pipeline {
    chain: Arc<Chain>,
    mode: RunMode,
}

impl Pipeline {
    pub fn builder(logger: Arc<Logger>) -> PipelineBuilder {
        PipelineBuilder {
            logger,
            mode: RunMode::default(),
            verifier: None,
            router: Router::new(),
            layers: Vec::new(),
        }
    }

    /// Runs one request through every stage.
    pub async fn handle(&self, req: Request) -> Response {
        self.chain.start().run(req).await
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Number of middleware stages, excluding the router.
    pub fn stages(&self) -> usize {
        self.chain.len()
    }
}

/// Configures a [`Pipeline`].
pub struct PipelineBuilder {
    logger: Arc<Logger>,
    mode: RunMode,
    verifier: Option<Arc<dyn SessionVerifier>>,
    router: Router,
    layers: Vec<Arc<dyn Middleware>>,
}

impl PipelineBuilder {
    pub fn mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// The session verifier the auth gate delegates to. Required in production.
    pub fn session(mut self, verifier: impl SessionVerifier) -> Self {
        self.verifier = Some(Arc::new(verifier));
        self
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Adds a service stage after the auth gate. Stages run in the order added.
    pub fn layer(mut self, stage: impl Middleware) -> Self {
        self.layers.push(Arc::new(stage));
        self
    }

    /// # Errors
    ///
    /// [`Error::Configuration`] in production mode without a session
    /// verifier, or when the router already claims `GET /liveness`.
    pub fn build(self) -> Result<Pipeline, Error> {
        let router = self
            .router
            .try_on(Method::GET, LIVENESS_PATH, health::liveness)
            .map_err(|e| Error::Configuration {
                var: "router",
                reason: format!("`GET {LIVENESS_PATH}` is reserved: {e}"),
            })?;

        let mut cors = Cors::new();
        let mut stages: Vec<Arc<dyn Middleware>> = vec![Arc::new(AccessLog::new(self.logger))];

        let gate = match (self.mode, self.verifier) {
            (RunMode::Production, None) => {
                return Err(Error::Configuration {
                    var: "RUN_MODE",
                    reason: "production mode requires a session verifier".into(),
                });
            }
            (RunMode::Production, Some(verifier)) => {
                cors = cors.allow_headers(verifier.cors_headers());
                Some(AuthGate::new(self.mode, verifier).exempt(LIVENESS_PATH))
            }
            (RunMode::Development, _) => None,
        };

        stages.push(Arc::new(cors));
        if let Some(gate) = gate {
            stages.push(Arc::new(gate));
        }
        stages.extend(self.layers);

        tracing::debug!(mode = ?self.mode, stages = stages.len(), "pipeline assembled");
        Ok(Pipeline { chain: Chain::new(stages, router), mode: self.mode })
    }
}
