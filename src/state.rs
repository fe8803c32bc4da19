//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the long-lived components built in `main`: the UI hub, the
//! connector (which owns the gateway and the session), the projection
//! engine with its named managers, and the origin policy. Every field is
//! an `Arc` or cheap `Clone`.

use std::sync::Arc;

use crate::client::connector::Connector;
use crate::client::gateway::ConnectionGateway;
use crate::config::ServerConfig;
use crate::data::DataEngine;
use crate::data::managers::Managers;
use crate::hub::Hub;
use crate::routes::origin::OriginPolicy;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub hub: Hub,
    pub connector: Arc<Connector>,
    pub engine: Arc<DataEngine>,
    pub managers: Arc<Managers>,
    pub origins: Arc<OriginPolicy>,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: ServerConfig,
        hub: Hub,
        connector: Arc<Connector>,
        engine: Arc<DataEngine>,
        managers: Managers,
    ) -> Self {
        let origins = OriginPolicy::new(config.port, config.dev);
        Self {
            config: Arc::new(config),
            hub,
            connector,
            engine,
            managers: Arc::new(managers),
            origins: Arc::new(origins),
        }
    }

    #[must_use]
    pub fn gateway(&self) -> &Arc<ConnectionGateway> {
        self.connector.gateway()
    }
}
