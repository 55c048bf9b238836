/// Integration tests for the plate service HTTP API
use async_trait::async_trait;
use axum_test::TestServer;
use base64::Engine;
use common::ocr::{BoundingBox, OcrFrame, TextLine};
use common::sessions::{
    DetectionReport, FrameSubmission, SendMode, SessionCreateRequest, SessionInfo,
    SessionListResponse,
};
use image::{DynamicImage, Rgb, RgbImage};
use plate_service::transport::DetectionTransport;
use plate_service::{api, PlateServiceConfig, PlateServiceState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Collects every report instead of sending it anywhere
#[derive(Default)]
struct RecordingTransport {
    reports: Mutex<Vec<DetectionReport>>,
    fail: bool,
}

#[async_trait]
impl DetectionTransport for RecordingTransport {
    async fn send(&self, report: &DetectionReport) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("collector unreachable");
        }
        self.reports.lock().await.push(report.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

fn setup(transport: Arc<RecordingTransport>) -> (TestServer, PlateServiceState) {
    telemetry::init();
    let mut config = PlateServiceConfig::standalone("test-node");
    config.site_id = "lot-7".to_string();
    let state = PlateServiceState::with_transport(&config, transport);
    let server = TestServer::new(api::router(state.clone())).unwrap();
    (server, state)
}

fn create_request(id: &str, send_mode: Option<SendMode>) -> SessionCreateRequest {
    SessionCreateRequest {
        id: id.to_string(),
        send_mode,
        pipeline_config: Value::Null,
    }
}

fn plate_frame(text: &str, sequence: u64) -> FrameSubmission {
    FrameSubmission {
        timestamp: Some(1_700_000_000_000 + sequence),
        sequence,
        ocr: Some(OcrFrame::from_lines(vec![TextLine::new(
            text,
            Some(BoundingBox::new(10, 10, 200, 50)),
        )])),
        ..FrameSubmission::default()
    }
}

async fn wait_for_reports(transport: &RecordingTransport, count: usize) -> Vec<DetectionReport> {
    for _ in 0..100 {
        {
            let reports = transport.reports.lock().await;
            if reports.len() >= count {
                return reports.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    transport.reports.lock().await.clone()
}

#[tokio::test]
async fn test_health_endpoints() {
    let (server, _state) = setup(Arc::new(RecordingTransport::default()));

    let health = server.get("/healthz").await;
    assert_eq!(health.status_code(), 200);
    assert_eq!(health.json::<Value>()["service"], "plate-service");

    let ready = server.get("/readyz").await;
    assert_eq!(ready.status_code(), 200);
    let body: Value = ready.json();
    assert_eq!(body["site_id"], "lot-7");
    assert_eq!(body["transport"], true);
}

#[tokio::test]
async fn test_session_crud() {
    let (server, _state) = setup(Arc::new(RecordingTransport::default()));

    let created = server
        .post("/v1/sessions")
        .json(&create_request("gate-1", None))
        .await;
    assert_eq!(created.status_code(), 201);
    assert_eq!(created.json::<Value>()["accepted"], true);

    let duplicate = server
        .post("/v1/sessions")
        .json(&create_request("gate-1", None))
        .await;
    assert_eq!(duplicate.status_code(), 409);
    assert_eq!(duplicate.json::<Value>()["accepted"], false);

    let info: SessionInfo = server.get("/v1/sessions/gate-1").await.json();
    assert_eq!(info.id, "gate-1");
    assert_eq!(info.frames_processed, 0);

    let list: SessionListResponse = server.get("/v1/sessions").await.json();
    assert_eq!(list.sessions.len(), 1);

    let removed = server.delete("/v1/sessions/gate-1").await;
    assert_eq!(removed.status_code(), 204);

    let missing = server.get("/v1/sessions/gate-1").await;
    assert_eq!(missing.status_code(), 404);
    assert!(missing.json::<Value>()["error"]
        .as_str()
        .unwrap()
        .contains("gate-1"));
}

#[tokio::test]
async fn test_invalid_pipeline_config_rejected() {
    let (server, _state) = setup(Arc::new(RecordingTransport::default()));

    let response = server
        .post("/v1/sessions")
        .json(&json!({
            "id": "gate-1",
            "pipeline_config": { "min_observations": 0 }
        }))
        .await;
    assert_eq!(response.status_code(), 400);

    let schema = server.get("/v1/config/schema").await;
    assert_eq!(schema.status_code(), 200);
    assert!(schema.json::<Value>()["properties"]["min_observations"].is_object());
}

#[tokio::test]
async fn test_accepted_plate_is_reported_once() {
    let transport = Arc::new(RecordingTransport::default());
    let (server, state) = setup(transport.clone());

    server
        .post("/v1/sessions")
        .json(&create_request("gate-1", None))
        .await;

    let first: Value = server
        .post("/v1/sessions/gate-1/frames")
        .json(&plate_frame("12가1234", 1))
        .await
        .json();
    assert_eq!(first["outcome"], "insufficient_corroboration");
    assert_eq!(first["observations"], 1);

    let second: Value = server
        .post("/v1/sessions/gate-1/frames")
        .json(&plate_frame("12가1234", 2))
        .await
        .json();
    assert_eq!(second["outcome"], "accepted");
    assert_eq!(second["plate"], "12가1234");
    assert_eq!(second["region_source"], "ocr_line");
    assert_eq!(second["message"], "Plate detected: 12가1234");

    let third: Value = server
        .post("/v1/sessions/gate-1/frames")
        .json(&plate_frame("12가1234", 3))
        .await
        .json();
    assert_eq!(third["outcome"], "duplicate_suppressed");

    let reports = wait_for_reports(&transport, 1).await;
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.plate, "12가1234");
    assert_eq!(report.device_id, "test-node");
    assert_eq!(report.site_id, "lot-7");
    assert_eq!(report.observations, 2);
    assert_eq!(report.timestamp, 1_700_000_000_002);
    assert!(report.image.is_none());

    let info = state.get_session("gate-1").await.unwrap();
    assert_eq!(info.plates_accepted, 1);
    assert_eq!(info.last_outcome.as_deref(), Some("duplicate_suppressed"));
}

#[tokio::test]
async fn test_cropped_region_report_carries_image() {
    let transport = Arc::new(RecordingTransport::default());
    let (server, _state) = setup(transport.clone());

    server
        .post("/v1/sessions")
        .json(&create_request("gate-2", Some(SendMode::CroppedRegion)))
        .await;

    let frame_image = DynamicImage::ImageRgb8(RgbImage::from_pixel(320, 120, Rgb([200, 200, 200])));
    let mut encoded = Vec::new();
    frame_image
        .write_to(
            &mut std::io::Cursor::new(&mut encoded),
            image::ImageFormat::Png,
        )
        .unwrap();
    let image_b64 = base64::prelude::BASE64_STANDARD.encode(&encoded);

    // 80x20 line: both geometry checks pass, confidence 1.0 accepts immediately
    let submission = FrameSubmission {
        timestamp: Some(5),
        sequence: 1,
        ocr: Some(OcrFrame::from_lines(vec![TextLine::new(
            "34나5678",
            Some(BoundingBox::new(100, 50, 80, 20)),
        )])),
        image: Some(image_b64),
        ..FrameSubmission::default()
    };

    let response: Value = server
        .post("/v1/sessions/gate-2/frames")
        .json(&submission)
        .await
        .json();
    assert_eq!(response["outcome"], "accepted");

    let reports = wait_for_reports(&transport, 1).await;
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.region, Some(BoundingBox::new(92, 46, 96, 28)));
    assert_eq!(report.image_format.as_deref(), Some("jpeg"));

    let bytes = base64::prelude::BASE64_STANDARD
        .decode(report.image.as_deref().unwrap())
        .unwrap();
    let crop = image::load_from_memory(&bytes).unwrap();
    assert_eq!((crop.width(), crop.height()), (96, 28));
}

#[tokio::test]
async fn test_transport_failure_is_only_status() {
    let transport = Arc::new(RecordingTransport {
        fail: true,
        ..RecordingTransport::default()
    });
    let (server, state) = setup(transport);

    server
        .post("/v1/sessions")
        .json(&create_request("gate-3", None))
        .await;

    let response = server
        .post("/v1/sessions/gate-3/frames")
        .json(&FrameSubmission {
            sequence: 1,
            ocr: Some(OcrFrame::from_lines(vec![TextLine::new(
                "12가3456",
                Some(BoundingBox::new(0, 0, 80, 20)),
            )])),
            ..FrameSubmission::default()
        })
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>()["outcome"], "accepted");

    let mut status = None;
    for _ in 0..100 {
        status = state
            .get_session("gate-3")
            .await
            .and_then(|info| info.transport_status);
        if status.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(status.unwrap().contains("collector unreachable"));

    let next = server
        .post("/v1/sessions/gate-3/frames")
        .json(&plate_frame("34나5678", 2))
        .await;
    assert_eq!(next.status_code(), 200);
}

#[tokio::test]
async fn test_frame_errors() {
    let (server, _state) = setup(Arc::new(RecordingTransport::default()));

    let missing = server
        .post("/v1/sessions/nope/frames")
        .json(&plate_frame("12가1234", 1))
        .await;
    assert_eq!(missing.status_code(), 404);

    server
        .post("/v1/sessions")
        .json(&create_request("gate-1", None))
        .await;

    let empty = server
        .post("/v1/sessions/gate-1/frames")
        .json(&json!({ "sequence": 1 }))
        .await;
    assert_eq!(empty.status_code(), 400);

    let failed: Value = server
        .post("/v1/sessions/gate-1/frames")
        .json(&json!({ "sequence": 2, "ocr_error": "lens covered" }))
        .await
        .json();
    assert_eq!(failed["outcome"], "recognition_failed");
    assert_eq!(failed["reason"], "lens covered");
}

#[tokio::test]
async fn test_restart_endpoint() {
    let (server, _state) = setup(Arc::new(RecordingTransport::default()));

    server
        .post("/v1/sessions")
        .json(&create_request("gate-1", None))
        .await;
    for sequence in 1..=2 {
        server
            .post("/v1/sessions/gate-1/frames")
            .json(&plate_frame("12가1234", sequence))
            .await;
    }

    let restarted = server.post("/v1/sessions/gate-1/restart").await;
    assert_eq!(restarted.status_code(), 200);
    let info: SessionInfo = restarted.json();
    assert!(info.last_accepted_plate.is_none());

    let after: Value = server
        .post("/v1/sessions/gate-1/frames")
        .json(&plate_frame("12가1234", 3))
        .await
        .json();
    assert_eq!(after["outcome"], "insufficient_corroboration");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (server, _state) = setup(Arc::new(RecordingTransport::default()));

    server
        .post("/v1/sessions")
        .json(&create_request("gate-9", None))
        .await;
    server
        .post("/v1/sessions/gate-9/frames")
        .json(&plate_frame("12가1234", 1))
        .await;

    let response = server.get("/metrics").await;
    assert_eq!(response.status_code(), 200);
    let body = response.text();
    assert!(body.contains("plate_frames_processed_total"));
    assert!(body.contains("plate_active_sessions"));
}
