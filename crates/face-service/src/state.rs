use crate::config::{RecognitionSettings, SourceConfig};
use crate::error::RecognitionError;
use crate::events::{EventDispatcher, MemoryEventBus, RecordedEvent};
use crate::processor::FaceRecognitionProcessor;
use crate::search::FaceSearchClient;
use anyhow::{anyhow, Result};
use common::faces::{CycleReport, SourceState};
use std::collections::BTreeMap;
use std::sync::Arc;
use telemetry::metrics::FACE_SOURCES_CONFIGURED;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

/// Why a submitted frame produced no cycle report
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("source '{0}' not found")]
    UnknownSource(String),

    #[error(transparent)]
    Rejected(#[from] RecognitionError),
}

#[derive(Clone)]
pub struct FaceServiceState {
    inner: Arc<FaceServiceStateInner>,
}

struct FaceServiceStateInner {
    node_id: String,
    settings: RecognitionSettings,
    client: Arc<dyn FaceSearchClient>,
    events: EventDispatcher,
    history: Arc<MemoryEventBus>,
    processors: RwLock<BTreeMap<String, Arc<FaceRecognitionProcessor>>>,
}

impl FaceServiceState {
    /// `history` must also be registered on `events` for `/v1/events` to see
    /// anything.
    pub fn new(
        node_id: String,
        settings: RecognitionSettings,
        client: Arc<dyn FaceSearchClient>,
        events: EventDispatcher,
        history: Arc<MemoryEventBus>,
    ) -> Self {
        Self {
            inner: Arc::new(FaceServiceStateInner {
                node_id,
                settings,
                client,
                events,
                history,
                processors: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    pub fn provider(&self) -> &'static str {
        self.inner.client.provider()
    }

    pub async fn add_source(&self, source: SourceConfig) -> Result<Arc<FaceRecognitionProcessor>> {
        source.validate()?;

        let processor = Arc::new(FaceRecognitionProcessor::new(
            source,
            self.inner.settings.clone(),
            self.inner.client.clone(),
            self.inner.events.clone(),
        ));

        let mut processors = self.inner.processors.write().await;
        if processors.contains_key(processor.source_id()) {
            return Err(anyhow!("Source '{}' already exists", processor.source_id()));
        }
        processors.insert(processor.source_id().to_string(), processor.clone());
        FACE_SOURCES_CONFIGURED.set(processors.len() as i64);

        info!(
            source = %processor.source_id(),
            camera = %processor.source().camera_entity,
            "Registered face source"
        );

        Ok(processor)
    }

    pub async fn get(&self, source_id: &str) -> Option<Arc<FaceRecognitionProcessor>> {
        self.inner.processors.read().await.get(source_id).cloned()
    }

    pub async fn source_count(&self) -> usize {
        self.inner.processors.read().await.len()
    }

    pub async fn list_states(&self) -> Vec<SourceState> {
        let processors: Vec<_> = self.inner.processors.read().await.values().cloned().collect();
        let mut states = Vec::with_capacity(processors.len());
        for processor in processors {
            states.push(processor.state().await);
        }
        states
    }

    pub async fn process_frame(&self, source_id: &str, image: &[u8]) -> Result<CycleReport, FrameError> {
        let processor = self
            .get(source_id)
            .await
            .ok_or_else(|| FrameError::UnknownSource(source_id.to_string()))?;

        processor
            .process_image(image)
            .await
            .map_err(FrameError::from)
    }

    pub fn recent_events(&self, limit: usize) -> Vec<RecordedEvent> {
        self.inner.history.recent(limit)
    }

    pub async fn search_healthy(&self) -> bool {
        self.inner.client.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::MockSearchClient;

    fn state() -> FaceServiceState {
        let history = Arc::new(MemoryEventBus::new(10));
        FaceServiceState::new(
            "node-1".to_string(),
            RecognitionSettings::new("home_faces"),
            Arc::new(MockSearchClient::new()),
            EventDispatcher::new().with_bus(history.clone()),
            history,
        )
    }

    #[tokio::test]
    async fn test_sources_listed_in_id_order() {
        let state = state();
        state.add_source(SourceConfig::new("camera.porch")).await.unwrap();
        state
            .add_source(SourceConfig::new("camera.garage").with_name("Garage"))
            .await
            .unwrap();

        let ids: Vec<_> = state.list_states().await.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["garage", "rekognition_face_porch"]);
        assert_eq!(state.provider(), "mock");
    }

    #[tokio::test]
    async fn test_duplicate_source_rejected() {
        let state = state();
        state.add_source(SourceConfig::new("camera.porch")).await.unwrap();
        assert!(state.add_source(SourceConfig::new("camera.porch")).await.is_err());
        assert_eq!(state.source_count().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_source() {
        let state = state();
        let err = state.process_frame("nope", &[1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, FrameError::UnknownSource(id) if id == "nope"));
    }
}
