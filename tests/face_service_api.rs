/// Integration tests for the face service HTTP API
use axum::body::Bytes;
use axum_test::TestServer;
use common::faces::{
    BoundingBox, CycleReport, SearchErrorKind, SourceListResponse, SourceState,
    EVENT_FACE_RECOGNISED,
};
use face_service::config::{RecognitionSettings, SourceConfig};
use face_service::events::{EventDispatcher, MemoryEventBus};
use face_service::search::{MockSearchClient, SearchMatch, SearchResponse};
use face_service::{api, FaceServiceState, SearchError};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;

async fn setup_test_service(client: MockSearchClient) -> (TestServer, Arc<MockSearchClient>) {
    let client = Arc::new(client);
    let history = Arc::new(MemoryEventBus::new(20));
    let state = FaceServiceState::new(
        "test-node".to_string(),
        RecognitionSettings::new("home_faces"),
        client.clone(),
        EventDispatcher::new().with_bus(history.clone()),
        history,
    );

    state
        .add_source(SourceConfig::new("camera.front_door"))
        .await
        .unwrap();
    state
        .add_source(SourceConfig::new("camera.garage").with_name("Garage Faces"))
        .await
        .unwrap();

    let server = TestServer::new(api::router(state)).unwrap();
    (server, client)
}

fn jpeg_frame() -> Bytes {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([120, 80, 40])))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .unwrap();
    Bytes::from(bytes)
}

fn alice() -> SearchResponse {
    SearchResponse {
        face_matches: vec![SearchMatch::new(Some("alice"), 96.5)
            .with_face_id("face-alice")
            .with_bounding_box(BoundingBox::new(0.2, 0.3, 0.25, 0.3))],
    }
}

#[tokio::test]
async fn test_healthz() {
    let (server, _) = setup_test_service(MockSearchClient::new()).await;

    let response = server.get("/healthz").await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "face-service");
}

#[tokio::test]
async fn test_readyz_reports_sources() {
    let (server, _) = setup_test_service(MockSearchClient::new()).await;

    let response = server.get("/readyz").await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["status"], "ready");
    assert_eq!(body["provider"], "mock");
    assert_eq!(body["sources"], 2);
}

#[tokio::test]
async fn test_list_sources() {
    let (server, _) = setup_test_service(MockSearchClient::new()).await;

    let response = server.get("/v1/sources").await;

    assert_eq!(response.status_code(), 200);
    let list: SourceListResponse = response.json();
    let ids: Vec<_> = list.sources.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["garage_faces", "rekognition_face_front_door"]);
    assert!(list.sources.iter().all(|s| s.state.is_none()));
}

#[tokio::test]
async fn test_get_nonexistent_source() {
    let (server, _) = setup_test_service(MockSearchClient::new()).await;

    let response = server.get("/v1/sources/nope").await;

    assert_eq!(response.status_code(), 404);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_submit_frame_with_match() {
    let (server, client) = setup_test_service(MockSearchClient::with_response(alice())).await;

    let response = server
        .post("/v1/sources/rekognition_face_front_door/frames")
        .bytes(jpeg_frame())
        .await;

    assert_eq!(response.status_code(), 200);
    let report: CycleReport = response.json();
    assert_eq!(report.source, "rekognition_face_front_door");
    assert_eq!(report.result.match_count, 1);
    assert_eq!(report.events_fired, 1);
    assert_eq!(client.calls(), 1);

    let state: SourceState = server
        .get("/v1/sources/rekognition_face_front_door")
        .await
        .json();
    assert_eq!(state.state, Some(1));
    assert_eq!(state.unit_of_measurement, "faces");
    assert_eq!(state.attributes.matches[0].external_image_id, "alice");
    assert_eq!(state.attributes.last_face_recognition, report.result.timestamp);

    let events: Value = server.get("/v1/events").await.json();
    let events = events["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event_type"], EVENT_FACE_RECOGNISED);
    assert_eq!(events[0]["data"]["external_image_id"], "alice");
    assert_eq!(events[0]["data"]["similarity"], 96.5);
    assert_eq!(
        events[0]["data"]["entity_id"],
        "image_processing.rekognition_face_front_door"
    );
}

#[tokio::test]
async fn test_submit_frame_service_error_is_zero_matches() {
    let (server, _) = setup_test_service(MockSearchClient::with_error(SearchError::new(
        SearchErrorKind::CollectionNotFound,
        "ResourceNotFoundException: The collection id: home_faces does not exist",
    )))
    .await;

    let response = server
        .post("/v1/sources/garage_faces/frames")
        .bytes(jpeg_frame())
        .await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["outcome"]["status"], "service_error");
    assert_eq!(body["outcome"]["kind"], "collection_not_found");
    assert_eq!(body["outcome"]["retryable"], false);
    assert_eq!(body["result"]["match_count"], 0);
    assert_eq!(body["events_fired"], 0);

    let events: Value = server.get("/v1/events").await.json();
    assert!(events["events"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_submit_undecodable_frame() {
    let (server, client) = setup_test_service(MockSearchClient::with_response(alice())).await;

    let response = server
        .post("/v1/sources/garage_faces/frames")
        .bytes(Bytes::from_static(b"not an image"))
        .await;

    assert_eq!(response.status_code(), 400);
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_submit_empty_frame() {
    let (server, client) = setup_test_service(MockSearchClient::new()).await;

    let response = server
        .post("/v1/sources/garage_faces/frames")
        .bytes(Bytes::new())
        .await;

    assert_eq!(response.status_code(), 400);
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_submit_frame_unknown_source() {
    let (server, _) = setup_test_service(MockSearchClient::new()).await;

    let response = server
        .post("/v1/sources/nope/frames")
        .bytes(jpeg_frame())
        .await;

    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (server, _) = setup_test_service(MockSearchClient::new()).await;

    server
        .post("/v1/sources/garage_faces/frames")
        .bytes(jpeg_frame())
        .await;

    let response = server.get("/metrics").await;

    assert_eq!(response.status_code(), 200);
    assert!(response.text().contains("face_cycles_processed_total"));
}
