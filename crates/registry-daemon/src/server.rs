//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::{DaemonConfig, StorageConfig};
use crate::error::{DaemonError, DaemonResult};
use registry_doi::{
    DataCiteMetadataBuilder, DoiIssuer, DoiLifecycleService, MetadataBuilder, QueueDispatcher,
    RecordingAuthority, RegistrationTargets, RegistrationWorker, RegistryStores,
};
use registry_storage::InMemoryRegistryStorage;
use registry_types::GbifPrefix;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// How long the worker may take to drain queued commands on shutdown
const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Registry Daemon Server
pub struct Server {
    config: DaemonConfig,
    service: Arc<DoiLifecycleService>,
    worker: RegistrationWorker,
}

impl Server {
    /// Create a new server with the given configuration
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let stores = build_stores(&config.storage).await?;

        let prefix = GbifPrefix::new(&config.doi.prefix)
            .map_err(|e| DaemonError::Config(format!("Invalid DOI prefix: {}", e)))?;
        let targets = RegistrationTargets::from_portal(&config.doi.portal_url)
            .map_err(|e| DaemonError::Config(format!("Invalid portal URL: {}", e)))?;
        let metadata: Arc<dyn MetadataBuilder> = Arc::new(DataCiteMetadataBuilder::default());

        let (dispatcher, receiver) = QueueDispatcher::new(
            prefix.clone(),
            metadata.clone(),
            targets,
            config.doi.dataset_parent_exclude_list.clone(),
            config.dispatcher.queue_capacity,
        );

        tracing::warn!("No external DOI authority configured, registrations are recorded in memory");
        let worker = RegistrationWorker::new(
            receiver,
            stores.dois.clone(),
            Arc::new(RecordingAuthority::new()),
            &config.dispatcher,
        );

        let issuer = DoiIssuer::new(prefix, stores.dois.clone(), config.doi.max_issue_attempts);
        let service = Arc::new(DoiLifecycleService::new(
            stores,
            issuer,
            metadata,
            Arc::new(dispatcher),
        ));

        Ok(Self {
            config,
            service,
            worker,
        })
    }

    /// Run the server
    pub async fn run(self) -> DaemonResult<()> {
        let Server {
            config,
            service,
            worker,
        } = self;
        let addr = config.server.listen_addr;

        let app = create_router(AppState::new(service), config.server.enable_cors);
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Registry daemon listening on {}", addr);
        tracing::info!(prefix = %config.doi.prefix, "DOI prefix");

        // Start registration worker in background
        let worker = tokio::spawn(worker.run());

        // Run server with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("Registry daemon shutting down");

        // The router owned the last dispatcher; the worker stops after draining
        match tokio::time::timeout(WORKER_DRAIN_TIMEOUT, worker).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Registration worker panicked"),
            Err(_) => tracing::warn!("Registration worker did not drain in time"),
        }

        Ok(())
    }
}

async fn build_stores(config: &StorageConfig) -> DaemonResult<RegistryStores> {
    match config {
        StorageConfig::Memory => {
            tracing::info!("Using in-memory storage");
            Ok(RegistryStores::from(&InMemoryRegistryStorage::new()))
        }
        #[cfg(feature = "postgres")]
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            let storage = registry_storage::PostgresRegistryStorage::connect_with_options(
                url,
                *max_connections,
                *connect_timeout_secs,
            )
            .await?;
            tracing::info!("Using PostgreSQL storage");
            Ok(RegistryStores::shared(Arc::new(storage)))
        }
        #[cfg(not(feature = "postgres"))]
        StorageConfig::Postgres { .. } => Err(DaemonError::Config(
            "PostgreSQL storage requires the `postgres` feature".to_string(),
        )),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
