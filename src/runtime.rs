//! Wiring of the broker session, event store, fan-out and pipeline.
//!
//! ```text
//! start():    broker -> session.start() -> store -> fan-out -> coordinator.start()
//! shutdown(): coordinator.stop() -> session.stop()
//! ```

use std::sync::Arc;

use axum::Router;
use tracing::info;

use crate::bus::{self, BrokerSession, SessionConfig};
use crate::config::Config;
use crate::handlers::fanout::LiveFanout;
use crate::handlers::http::{self, AppState};
use crate::pipeline::PipelineCoordinator;
use crate::storage::{self, EventStore};

/// Error type returned by runtime setup.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A running pipeline and the handles the HTTP API needs.
pub struct Runtime {
    session: Arc<BrokerSession>,
    store: Arc<dyn EventStore>,
    fanout: Arc<LiveFanout>,
    coordinator: Arc<PipelineCoordinator>,
}

impl Runtime {
    /// Connect everything described by `config` and start consuming.
    ///
    /// On failure, anything already started is stopped again.
    pub async fn start(config: &Config) -> Result<Self, BoxError> {
        let broker = bus::init_broker(&config.broker)?;
        let session = Arc::new(BrokerSession::new(
            broker,
            SessionConfig::from(&config.broker),
        ));
        session.start().await?;

        let store = match storage::init_storage(&config.storage).await {
            Ok(store) => store,
            Err(e) => {
                session.stop().await;
                return Err(e);
            }
        };

        let runtime = Self::assemble(session, store, config);
        if let Err(e) = runtime.coordinator.start().await {
            runtime.session.stop().await;
            return Err(e.into());
        }

        info!(
            topic = %runtime.session.topic(),
            storage_type = ?config.storage.storage_type,
            "Runtime started"
        );
        Ok(runtime)
    }

    /// Build a runtime around an already started session and an open store.
    ///
    /// The pipeline is not started.
    pub fn assemble(
        session: Arc<BrokerSession>,
        store: Arc<dyn EventStore>,
        config: &Config,
    ) -> Self {
        let fanout = Arc::new(LiveFanout::new());
        let coordinator = Arc::new(
            PipelineCoordinator::new(session.clone(), store.clone(), fanout.clone())
                .with_shutdown_grace(config.pipeline.shutdown_grace()),
        );
        Self {
            session,
            store,
            fanout,
            coordinator,
        }
    }

    pub fn session(&self) -> &Arc<BrokerSession> {
        &self.session
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    pub fn fanout(&self) -> &Arc<LiveFanout> {
        &self.fanout
    }

    pub fn coordinator(&self) -> &Arc<PipelineCoordinator> {
        &self.coordinator
    }

    /// Shared state for the HTTP API.
    pub fn app_state(&self) -> AppState {
        AppState {
            session: self.session.clone(),
            store: self.store.clone(),
            fanout: self.fanout.clone(),
            coordinator: self.coordinator.clone(),
        }
    }

    /// HTTP router bound to this runtime.
    pub fn router(&self) -> Router {
        http::router(self.app_state())
    }

    /// Stop the pipeline, then the broker session.
    pub async fn shutdown(&self) {
        info!("Shutting down runtime");
        self.coordinator.stop().await;
        self.session.stop().await;
        info!("Runtime shut down");
    }
}
