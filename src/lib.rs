//! Face recognition for home automation cameras, backed by AWS Rekognition.

pub use common::faces;
pub use face_service::{api, config, FaceRecognitionProcessor, FaceServiceConfig, FaceServiceState};
