use super::{FaceSearchClient, SearchMatch, SearchRequest, SearchResponse};
use crate::config::AwsSettings;
use crate::error::SearchError;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_rekognition::config::{Credentials, Region};
use aws_sdk_rekognition::error::{DisplayErrorContext, SdkError};
use aws_sdk_rekognition::operation::search_faces_by_image::{
    SearchFacesByImageError, SearchFacesByImageOutput,
};
use aws_sdk_rekognition::primitives::Blob;
use aws_sdk_rekognition::types::Image;
use aws_sdk_rekognition::Client;
use common::faces::{BoundingBox, SearchErrorKind};
use tracing::{debug, info};

/// Face search backed by an AWS Rekognition collection
pub struct RekognitionSearchClient {
    client: Client,
}

impl RekognitionSearchClient {
    /// Build the SDK client. Static credentials are used when configured,
    /// otherwise the default provider chain (env, profile, instance role).
    pub async fn connect(settings: &AwsSettings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "face-service-static",
            ));
        }

        let sdk_config = loader.load().await;
        info!(region = %settings.region, "Rekognition client configured");

        Self {
            client: Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl FaceSearchClient for RekognitionSearchClient {
    fn provider(&self) -> &'static str {
        "rekognition"
    }

    async fn search_faces_by_image(
        &self,
        request: &SearchRequest,
    ) -> Result<SearchResponse, SearchError> {
        debug!(
            collection_id = %request.collection_id,
            bytes = request.image.len(),
            threshold = request.similarity_threshold,
            "Calling SearchFacesByImage"
        );

        let image = Image::builder()
            .bytes(Blob::new(request.image.clone()))
            .build();

        let output = self
            .client
            .search_faces_by_image()
            .collection_id(&request.collection_id)
            .image(image)
            .face_match_threshold(request.similarity_threshold)
            .max_faces(request.max_faces)
            .send()
            .await
            .map_err(classify_error)?;

        Ok(convert_output(&output))
    }
}

fn convert_output(output: &SearchFacesByImageOutput) -> SearchResponse {
    let face_matches = output
        .face_matches()
        .iter()
        .map(|face_match| {
            let face = face_match.face();
            SearchMatch {
                similarity: face_match.similarity().unwrap_or_default() as f64,
                external_image_id: face
                    .and_then(|f| f.external_image_id())
                    .map(str::to_string),
                face_id: face.and_then(|f| f.face_id()).map(str::to_string),
                bounding_box: face.and_then(|f| f.bounding_box()).map(|b| {
                    BoundingBox::new(
                        b.top().unwrap_or_default() as f64,
                        b.left().unwrap_or_default() as f64,
                        b.width().unwrap_or_default() as f64,
                        b.height().unwrap_or_default() as f64,
                    )
                }),
            }
        })
        .collect();

    SearchResponse { face_matches }
}

fn classify_error(err: SdkError<SearchFacesByImageError>) -> SearchError {
    let message = DisplayErrorContext(&err).to_string();

    let kind = match err.as_service_error() {
        Some(e) if e.is_invalid_parameter_exception() => SearchErrorKind::InvalidParameter,
        Some(e) if e.is_invalid_image_format_exception() || e.is_image_too_large_exception() => {
            SearchErrorKind::InvalidImage
        }
        Some(e) if e.is_access_denied_exception() => SearchErrorKind::AccessDenied,
        Some(e) if e.is_resource_not_found_exception() => SearchErrorKind::CollectionNotFound,
        Some(e)
            if e.is_throttling_exception() || e.is_provisioned_throughput_exceeded_exception() =>
        {
            SearchErrorKind::Throttled
        }
        Some(_) => SearchErrorKind::Service,
        None => SearchErrorKind::Transport,
    };

    SearchError::new(kind, message)
}
