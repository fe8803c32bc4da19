mod client;
mod config;
mod data;
mod exit;
mod hub;
mod routes;
mod state;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use client::connector::{Connector, ConnectorParts};
use client::event_stream::EventStreamClient;
use client::gateway::ConnectionGateway;
use client::process::{self, ProcessError};
use client::session::SessionStore;
use client::tls;
use config::Config;
use data::projection::ProjectionContext;
use exit::{ExitCode, FatalSignal};
use hub::Hub;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    if config.server.dev {
        tracing::warn!("==============================================================");
        tracing::warn!("development build: dev-server origins are allowed");
        tracing::warn!("==============================================================");
    }

    let (fatal, mut fatal_rx) = FatalSignal::channel();

    let tls = match tls::loopback_client_config() {
        Ok(tls) => tls,
        Err(e) => {
            tracing::error!(error = %e, "TLS setup failed");
            ExitCode::CertificateSetupFailed.exit();
        }
    };

    let processes = match process::for_current_os() {
        Ok(handler) => handler,
        Err(e @ ProcessError::HelperNotFound(_)) => {
            tracing::error!(error = %e, "process handler unavailable");
            ExitCode::HelperExecutableNotFound.exit();
        }
        Err(e) => {
            tracing::error!(error = %e, "process handler unavailable");
            ExitCode::NoProcessHandler.exit();
        }
    };

    let hub = Hub::new();
    let gateway = match ConnectionGateway::new(Some(tls.clone()), SessionStore::new(), config.upstream.clone()) {
        Ok(gateway) => Arc::new(gateway),
        Err(e) => {
            tracing::error!(error = %e, "gateway setup failed");
            ExitCode::CertificateSetupFailed.exit();
        }
    };

    let ctx = ProjectionContext { gateway: gateway.clone(), hub: hub.clone() };
    let (engine, managers) = match data::managers::standard_engine(&ctx) {
        Ok(built) => built,
        Err(e) => {
            tracing::error!(error = %e, "projection registry failed to build");
            ExitCode::ModuleLoadFailed.exit();
        }
    };
    let engine = Arc::new(engine);

    let events = EventStreamClient::new(config.upstream.clone(), Some(tls), engine.clone());
    let connector = Connector::new(ConnectorParts {
        gateway,
        events,
        engine: engine.clone(),
        processes,
        hub: hub.clone(),
        fatal,
    });

    let port = config.server.port;
    let auto_connect = config.server.auto_connect;
    let state = state::AppState::new(config.server, hub, connector.clone(), engine, managers);
    let app = routes::app(state);

    let listener = match tokio::net::TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port))).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%port, error = %e, "bind failed");
            ExitCode::ServerBindFailed.exit();
        }
    };
    tracing::info!(%port, "rcls listening");

    if auto_connect {
        connector.connect();
    }

    tokio::select! {
        served = axum::serve(listener, app) => {
            if let Err(e) = served {
                tracing::error!(error = %e, "server failed");
            }
        }
        Some(code) = fatal_rx.recv() => {
            connector.shutdown().await;
            code.exit();
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            connector.shutdown().await;
        }
    }
}
