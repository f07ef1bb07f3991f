//! One face recognition cycle per frame: build request, search, interpret,
//! emit events, then optionally annotate and save.

use crate::annotate::Annotator;
use crate::config::{RecognitionSettings, SourceConfig};
use crate::error::RecognitionError;
use crate::events::EventDispatcher;
use crate::interpreter::{interpret, SearchOutcome};
use crate::search::{FaceSearchClient, SearchRequest};
use chrono::{DateTime, Local};
use common::faces::{
    CycleOutcome, CycleReport, FaceMatch, ProcessingResult, SaveReport, SourceAttributes,
    SourceState, UNIT_OF_MEASUREMENT,
};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics::{
    FACE_CYCLES_PROCESSED, FACE_MATCHES, FACE_SEARCH_ERRORS, FACE_SEARCH_LATENCY,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

#[derive(Debug, Default)]
struct Snapshot {
    result: Option<ProcessingResult>,
    last_face_recognition: Option<String>,
}

pub struct FaceRecognitionProcessor {
    source: SourceConfig,
    source_id: String,
    entity_id: String,
    settings: RecognitionSettings,
    client: Arc<dyn FaceSearchClient>,
    events: EventDispatcher,
    annotator: Option<Arc<Annotator>>,
    snapshot: RwLock<Snapshot>,
    cycle: Mutex<()>,
}

impl FaceRecognitionProcessor {
    pub fn new(
        source: SourceConfig,
        settings: RecognitionSettings,
        client: Arc<dyn FaceSearchClient>,
        events: EventDispatcher,
    ) -> Self {
        let source_id = source.source_id();
        let annotator = settings.save.as_ref().map(|s| Arc::new(Annotator::new(s)));

        Self {
            entity_id: format!("image_processing.{}", source_id),
            source_id,
            source,
            settings,
            client,
            events,
            annotator,
            snapshot: RwLock::new(Snapshot::default()),
            cycle: Mutex::new(()),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Identifier carried by emitted events
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    pub async fn process_image(&self, image: &[u8]) -> Result<CycleReport, RecognitionError> {
        self.process_image_at(image, Local::now()).await
    }

    /// Run one cycle with `now` as the cycle time. Only an empty or undecodable
    /// payload returns an error; search failures collapse to zero matches.
    pub async fn process_image_at(
        &self,
        image: &[u8],
        now: DateTime<Local>,
    ) -> Result<CycleReport, RecognitionError> {
        let _cycle = self.cycle.lock().await;

        let request = SearchRequest::build(&self.settings, image).inspect_err(|e| {
            warn!(source = %self.source_id, error = %e, "Rejected frame");
            self.count_cycle("rejected");
        })?;

        let decoded = image::load_from_memory(image).map_err(|e| {
            let err = RecognitionError::Decode(e.to_string());
            warn!(source = %self.source_id, error = %err, "Skipping frame");
            self.count_cycle("decode_error");
            err
        })?;

        let started = Instant::now();
        let reply = self.client.search_faces_by_image(&request).await;
        FACE_SEARCH_LATENCY
            .with_label_values(&[self.source_id.as_str()])
            .observe(started.elapsed().as_secs_f64());

        let (outcome, result) = match interpret(reply, self.settings.similarity_threshold) {
            SearchOutcome::Matches(matches) => {
                let result = ProcessingResult::from_matches(matches, now.to_rfc3339());
                let outcome = if result.has_matches() {
                    CycleOutcome::Matched
                } else {
                    CycleOutcome::NoMatches
                };
                (outcome, result)
            }
            SearchOutcome::NoFaces => {
                info!(source = %self.source_id, "No faces in frame");
                (CycleOutcome::NoFaces, ProcessingResult::empty())
            }
            SearchOutcome::Failed(err) => {
                error!(
                    source = %self.source_id,
                    kind = %err.kind,
                    retryable = err.is_retryable(),
                    error = %err.message,
                    "Face search failed"
                );
                FACE_SEARCH_ERRORS
                    .with_label_values(&[self.source_id.as_str(), err.kind.as_str()])
                    .inc();
                let outcome = CycleOutcome::ServiceError {
                    kind: err.kind,
                    retryable: err.is_retryable(),
                    message: err.message,
                };
                (outcome, ProcessingResult::empty())
            }
        };

        {
            let mut snapshot = self.snapshot.write().await;
            if result.timestamp.is_some() {
                snapshot.last_face_recognition = result.timestamp.clone();
            }
            snapshot.result = Some(result.clone());
        }

        let events_fired = match outcome {
            CycleOutcome::Matched => self.events.emit_matches(&self.entity_id, &result).await,
            _ => 0,
        };

        let saved = match &self.annotator {
            Some(annotator) if annotator.should_save(result.match_count) => Some(
                self.save(annotator.clone(), decoded, result.matches.clone(), now)
                    .await,
            ),
            _ => None,
        };

        self.count_cycle(outcome.as_str());
        if result.has_matches() {
            FACE_MATCHES
                .with_label_values(&[self.source_id.as_str()])
                .inc_by(result.match_count as u64);
            info!(
                source = %self.source_id,
                match_count = result.match_count,
                "Recognised faces"
            );
        }

        Ok(CycleReport {
            source: self.source_id.clone(),
            outcome,
            result,
            events_fired,
            saved,
        })
    }

    async fn save(
        &self,
        annotator: Arc<Annotator>,
        image: DynamicImage,
        matches: Vec<FaceMatch>,
        now: DateTime<Local>,
    ) -> SaveReport {
        let source_id = self.source_id.clone();
        let task = tokio::task::spawn_blocking(move || {
            annotator.save(&source_id, &image, &matches, &now)
        });

        match task.await {
            Ok(report) => report,
            Err(e) => {
                error!(source = %self.source_id, error = %e, "Image save task failed");
                SaveReport {
                    errors: vec![e.to_string()],
                    ..SaveReport::default()
                }
            }
        }
    }

    /// Entity view of this source
    pub async fn state(&self) -> SourceState {
        let snapshot = self.snapshot.read().await;
        SourceState {
            id: self.source_id.clone(),
            name: self.source.display_name(),
            camera_entity: self.source.camera_entity.clone(),
            state: snapshot.result.as_ref().map(|r| r.match_count),
            unit_of_measurement: UNIT_OF_MEASUREMENT.to_string(),
            attributes: SourceAttributes {
                collection_id: self.settings.collection_id.clone(),
                similarity_threshold: self.settings.similarity_threshold,
                matches: snapshot
                    .result
                    .as_ref()
                    .map(|r| r.matches.clone())
                    .unwrap_or_default(),
                last_face_recognition: snapshot.last_face_recognition.clone(),
            },
        }
    }

    fn count_cycle(&self, outcome: &str) {
        FACE_CYCLES_PROCESSED
            .with_label_values(&[self.source_id.as_str(), outcome])
            .inc();
    }
}
