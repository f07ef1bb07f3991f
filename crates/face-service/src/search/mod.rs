//! Remote face search against an indexed face collection.
//!
//! The processor only talks to [`FaceSearchClient`]; the Rekognition client and
//! the scripted mock both sit behind it.

pub mod mock;
pub mod rekognition;

use crate::config::RecognitionSettings;
use crate::error::{RecognitionError, SearchError};
use async_trait::async_trait;
use common::faces::BoundingBox;

pub use mock::MockSearchClient;
pub use rekognition::RekognitionSearchClient;

/// One search-by-image request
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub collection_id: String,
    /// Encoded image bytes exactly as received from the camera
    pub image: Vec<u8>,
    pub similarity_threshold: f32,
    pub max_faces: i32,
}

impl SearchRequest {
    /// Build the request for one frame. Empty payloads are rejected here so no
    /// remote call is ever made without an image.
    pub fn build(settings: &RecognitionSettings, image: &[u8]) -> Result<Self, RecognitionError> {
        if image.is_empty() {
            return Err(RecognitionError::EmptyImage);
        }

        Ok(Self {
            collection_id: settings.collection_id.clone(),
            image: image.to_vec(),
            similarity_threshold: settings.similarity_threshold as f32,
            max_faces: settings.max_faces,
        })
    }
}

/// Raw search response, before threshold filtering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    pub face_matches: Vec<SearchMatch>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchMatch {
    pub similarity: f64,
    pub external_image_id: Option<String>,
    pub face_id: Option<String>,
    pub bounding_box: Option<BoundingBox>,
}

impl SearchMatch {
    pub fn new(external_image_id: Option<&str>, similarity: f64) -> Self {
        Self {
            similarity,
            external_image_id: external_image_id.map(str::to_string),
            face_id: None,
            bounding_box: None,
        }
    }

    pub fn with_face_id(mut self, face_id: impl Into<String>) -> Self {
        self.face_id = Some(face_id.into());
        self
    }

    pub fn with_bounding_box(mut self, bounding_box: BoundingBox) -> Self {
        self.bounding_box = Some(bounding_box);
        self
    }
}

/// Client for a face collection search service
#[async_trait]
pub trait FaceSearchClient: Send + Sync {
    /// Short provider name used in logs and readiness output
    fn provider(&self) -> &'static str;

    /// Search the collection for faces matching those in the image
    async fn search_faces_by_image(
        &self,
        request: &SearchRequest,
    ) -> Result<SearchResponse, SearchError>;

    /// Verify the service is reachable
    async fn health_check(&self) -> bool {
        true
    }
}
