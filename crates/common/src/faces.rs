//! Face recognition contracts shared between the processing pipeline and its
//! consumers (HTTP clients, event subscribers).
//!
//! Everything here is plain data: matches as returned by the collection search,
//! the per-cycle result, the event payload and the per-source entity view.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Event topic fired once per recognised face
pub const EVENT_FACE_RECOGNISED: &str = "rekognition.face_recognised";

/// Unit reported alongside the source state
pub const UNIT_OF_MEASUREMENT: &str = "faces";

/// Round a similarity score to two decimals, clamped to the 0-100 scale
pub fn round_similarity(value: f64) -> f64 {
    (value.clamp(0.0, 100.0) * 100.0).round() / 100.0
}

/// Face bounding box as fractions of the image dimensions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

/// Bounding box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    /// Scale to pixel coordinates, clipped to the image. Returns `None` when the
    /// box falls entirely outside the frame.
    pub fn to_pixels(&self, image_width: u32, image_height: u32) -> Option<PixelRect> {
        let w = image_width as f64;
        let h = image_height as f64;

        let x_min = (self.left.max(0.0) * w).round();
        let y_min = (self.top.max(0.0) * h).round();
        let x_max = ((self.left + self.width).min(1.0) * w).round();
        let y_max = ((self.top + self.height).min(1.0) * h).round();

        if x_max <= x_min || y_max <= y_min {
            return None;
        }

        Some(PixelRect {
            x: x_min as u32,
            y: y_min as u32,
            width: (x_max - x_min) as u32,
            height: (y_max - y_min) as u32,
        })
    }
}

/// One recognised face: an enrolled face of the collection paired with a face
/// found in the submitted frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceMatch {
    /// Label attached to the face when it was indexed into the collection
    pub external_image_id: String,

    /// Identifier of the enrolled face
    pub face_id: Option<String>,

    /// Similarity score (0-100, two decimals)
    pub similarity: f64,

    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
}

impl FaceMatch {
    pub fn new(
        external_image_id: impl Into<String>,
        face_id: Option<String>,
        similarity: f64,
        bounding_box: Option<BoundingBox>,
    ) -> Self {
        Self {
            external_image_id: external_image_id.into(),
            face_id,
            similarity: round_similarity(similarity),
            bounding_box,
        }
    }

    /// Caption drawn next to the face box
    pub fn label(&self) -> String {
        format!("{}: {:.1}%", self.external_image_id, self.similarity)
    }
}

/// Outcome of one image processing cycle
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub match_count: usize,

    pub matches: Vec<FaceMatch>,

    /// ISO-8601 time of the recognition, present only when faces matched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ProcessingResult {
    /// Zero matches, used for the no-faces and failure paths
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_matches(matches: Vec<FaceMatch>, timestamp: impl Into<String>) -> Self {
        let timestamp = if matches.is_empty() {
            None
        } else {
            Some(timestamp.into())
        };

        Self {
            match_count: matches.len(),
            matches,
            timestamp,
        }
    }

    pub fn has_matches(&self) -> bool {
        self.match_count > 0
    }
}

/// Payload of a `rekognition.face_recognised` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecognisedEvent {
    pub external_image_id: String,

    pub face_id: Option<String>,

    pub similarity: f64,

    pub bounding_box: Option<BoundingBox>,

    /// Identifier of the source entity that processed the frame
    pub entity_id: String,

    /// Shared by every event of the same cycle
    pub timestamp: String,
}

impl FaceRecognisedEvent {
    pub fn from_match(face: &FaceMatch, entity_id: &str, timestamp: &str) -> Self {
        Self {
            external_image_id: face.external_image_id.clone(),
            face_id: face.face_id.clone(),
            similarity: face.similarity,
            bounding_box: face.bounding_box,
            entity_id: entity_id.to_string(),
            timestamp: timestamp.to_string(),
        }
    }
}

/// Classification of a failed face search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchErrorKind {
    /// Request rejected as invalid (bad threshold, malformed parameters)
    InvalidParameter,
    /// Image format or size rejected by the service
    InvalidImage,
    /// Credentials missing, wrong or lacking permission
    AccessDenied,
    /// The configured collection does not exist
    CollectionNotFound,
    /// Rate limited or provisioned throughput exceeded
    Throttled,
    /// Any other error reported by the service
    Service,
    /// The request never got a response (DNS, TLS, timeout, connection reset)
    Transport,
}

impl SearchErrorKind {
    /// Whether a later attempt with the same input could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled | Self::Service | Self::Transport)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidParameter => "invalid_parameter",
            Self::InvalidImage => "invalid_image",
            Self::AccessDenied => "access_denied",
            Self::CollectionNotFound => "collection_not_found",
            Self::Throttled => "throttled",
            Self::Service => "service",
            Self::Transport => "transport",
        }
    }
}

impl std::fmt::Display for SearchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a cycle ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// At least one face matched the collection
    Matched,
    /// Faces may be present but none matched the collection
    NoMatches,
    /// The service found no faces in the frame
    NoFaces,
    /// The search failed; the result collapsed to zero matches
    ServiceError {
        kind: SearchErrorKind,
        retryable: bool,
        message: String,
    },
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::NoMatches => "no_matches",
            Self::NoFaces => "no_faces",
            Self::ServiceError { .. } => "service_error",
        }
    }
}

/// Files written by the annotator during one cycle
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SaveReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamped: Option<PathBuf>,

    /// One entry per failed directory creation or file write
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Everything one cycle produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub source: String,

    pub outcome: CycleOutcome,

    pub result: ProcessingResult,

    pub events_fired: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved: Option<SaveReport>,
}

/// Attributes exposed by a source, mirroring the host entity attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAttributes {
    pub collection_id: String,

    pub similarity_threshold: f64,

    pub matches: Vec<FaceMatch>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_face_recognition: Option<String>,
}

/// Observable state of one camera source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceState {
    /// Slug used in URLs and saved file names
    pub id: String,

    pub name: String,

    pub camera_entity: String,

    /// Match count of the last cycle, absent before the first one
    pub state: Option<usize>,

    pub unit_of_measurement: String,

    pub attributes: SourceAttributes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceListResponse {
    pub sources: Vec<SourceState>,
}
