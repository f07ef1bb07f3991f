use anyhow::{Context, Result};
use face_service::{
    api,
    camera::HttpSnapshotSource,
    config::{FaceServiceConfig, SearchProvider},
    events::{EventDispatcher, MemoryEventBus},
    poller::SnapshotPoller,
    search::{FaceSearchClient, MockSearchClient, RekognitionSearchClient},
    FaceServiceState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = telemetry::init_with_service("face-service");

    info!("Starting face service...");

    let config = FaceServiceConfig::from_env()?;
    info!(
        "Face service configuration: bind={}, node_id={}, region={}, collection={}",
        config.bind_addr, config.node_id, config.aws.region, config.recognition.collection_id
    );

    let client: Arc<dyn FaceSearchClient> = match config.aws.provider {
        SearchProvider::Rekognition => Arc::new(RekognitionSearchClient::connect(&config.aws).await),
        SearchProvider::Mock => {
            warn!("Using mock face search, no frames will be sent to Rekognition");
            Arc::new(MockSearchClient::new())
        }
    };

    let history = Arc::new(MemoryEventBus::new(config.events.history_size));
    let events = EventDispatcher::from_settings(&config.events, history.clone())?;
    info!("Event buses: {:?}", events.bus_types());

    let state = FaceServiceState::new(
        config.node_id.clone(),
        config.recognition.clone(),
        client,
        events,
        history,
    );

    let cancel = CancellationToken::new();
    let mut pollers = Vec::new();
    for source in &config.sources {
        let processor = state
            .add_source(source.clone())
            .await
            .with_context(|| format!("Failed to register source {}", source.camera_entity))?;

        if let Some(url) = &source.snapshot_url {
            let frames = Arc::new(HttpSnapshotSource::new(url.clone())?);
            let poller = SnapshotPoller::new(
                processor,
                frames,
                Duration::from_secs(config.scan_interval_secs),
            );
            pollers.push(poller.spawn(cancel.clone()));
        }
    }
    info!(
        "Registered {} sources ({} polled)",
        state.source_count().await,
        pollers.len()
    );

    let app = api::router(state);

    info!("Binding to {}", config.bind_addr);
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Face service listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stopping snapshot pollers...");
    cancel.cancel();
    for poller in pollers {
        if let Err(e) = poller.await {
            error!("Snapshot poller ended abnormally: {}", e);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
}
