use crate::config::PlateServiceConfig;
use crate::error::SessionError;
use crate::locator::{EdgeContourLocator, PlateLocator};
use crate::plate::{PipelineConfig, PlateOutcome, PlatePipeline};
use crate::transport::{build_report, decode_frame_image, AcceptedDetection, DetectionTransport};
use common::ocr::OcrFrame;
use common::sessions::{FrameSubmission, SendMode, SessionCreateRequest, SessionInfo};
use common::validation::{safe_unix_timestamp_ms, validate_id, validate_ocr_frame};
use image::DynamicImage;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use telemetry::metrics::{
    PLATE_ACTIVE_SESSIONS, PLATE_FRAMES_DROPPED, PLATE_FRAMES_PROCESSED, PLATE_TRANSPORT_SENDS,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Result of one submitted frame
#[derive(Debug, Clone, Serialize)]
pub struct FrameResponse {
    pub session_id: String,
    pub sequence: u64,
    pub timestamp: u64,
    #[serde(flatten)]
    pub outcome: PlateOutcome,
    /// Notification text for the outcome
    pub message: String,
}

#[derive(Debug, Default)]
struct SessionStats {
    frames_processed: u64,
    frames_dropped: u64,
    plates_accepted: u64,
    last_accepted_plate: Option<String>,
    last_accepted_at: Option<u64>,
    last_outcome: Option<String>,
    transport_status: Option<String>,
}

/// One camera feed: an exclusively owned pipeline plus bookkeeping
struct Session {
    id: String,
    send_mode: SendMode,
    created_at: u64,
    pipeline: Arc<Mutex<PlatePipeline>>,
    stats: RwLock<SessionStats>,
}

impl Session {
    async fn info(&self) -> SessionInfo {
        let stats = self.stats.read().await;
        SessionInfo {
            id: self.id.clone(),
            send_mode: self.send_mode,
            created_at: self.created_at,
            frames_processed: stats.frames_processed,
            frames_dropped: stats.frames_dropped,
            plates_accepted: stats.plates_accepted,
            last_accepted_plate: stats.last_accepted_plate.clone(),
            last_accepted_at: stats.last_accepted_at,
            last_outcome: stats.last_outcome.clone(),
            transport_status: stats.transport_status.clone(),
        }
    }
}

#[derive(Clone)]
pub struct PlateServiceState {
    inner: Arc<PlateServiceStateInner>,
}

struct PlateServiceStateInner {
    node_id: String,
    site_id: String,
    default_send_mode: SendMode,
    transport: Option<Arc<dyn DetectionTransport>>,
    locator: Arc<dyn PlateLocator>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl PlateServiceState {
    pub fn new(config: &PlateServiceConfig) -> Self {
        Self::build(config, None)
    }

    pub fn with_transport(
        config: &PlateServiceConfig,
        transport: Arc<dyn DetectionTransport>,
    ) -> Self {
        Self::build(config, Some(transport))
    }

    fn build(config: &PlateServiceConfig, transport: Option<Arc<dyn DetectionTransport>>) -> Self {
        Self {
            inner: Arc::new(PlateServiceStateInner {
                node_id: config.node_id.clone(),
                site_id: config.site_id.clone(),
                default_send_mode: config.send_mode,
                transport,
                locator: Arc::new(EdgeContourLocator::default()),
                sessions: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    pub fn site_id(&self) -> &str {
        &self.inner.site_id
    }

    pub fn has_transport(&self) -> bool {
        self.inner.transport.is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    pub async fn create_session(
        &self,
        request: SessionCreateRequest,
    ) -> Result<SessionInfo, SessionError> {
        validate_id(&request.id, "session_id")
            .map_err(|e| SessionError::InvalidRequest(e.to_string()))?;

        let config = PipelineConfig::from_value(request.pipeline_config)
            .map_err(|e| SessionError::InvalidConfig(e.to_string()))?;

        let pipeline = PlatePipeline::new(config).with_locator(self.inner.locator.clone());
        let session = Arc::new(Session {
            id: request.id.clone(),
            send_mode: request.send_mode.unwrap_or(self.inner.default_send_mode),
            created_at: safe_unix_timestamp_ms(),
            pipeline: Arc::new(Mutex::new(pipeline)),
            stats: RwLock::new(SessionStats::default()),
        });

        {
            let mut sessions = self.inner.sessions.write().await;
            if sessions.contains_key(&request.id) {
                return Err(SessionError::AlreadyExists(request.id));
            }
            sessions.insert(request.id.clone(), session.clone());
            PLATE_ACTIVE_SESSIONS.set(sessions.len() as i64);
        }

        info!(
            session_id = %request.id,
            send_mode = ?session.send_mode,
            "Created plate session"
        );

        Ok(session.info().await)
    }

    async fn session(&self, session_id: &str) -> Result<Arc<Session>, SessionError> {
        let sessions = self.inner.sessions.read().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    pub async fn get_session(&self, session_id: &str) -> Option<SessionInfo> {
        let session = self.session(session_id).await.ok()?;
        Some(session.info().await)
    }

    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let sessions: Vec<Arc<Session>> = {
            let sessions = self.inner.sessions.read().await;
            sessions.values().cloned().collect()
        };

        let mut infos = Vec::with_capacity(sessions.len());
        for session in sessions {
            infos.push(session.info().await);
        }
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Clear a session's detection memory and last accepted plate
    pub async fn restart_session(&self, session_id: &str) -> Result<SessionInfo, SessionError> {
        let session = self.session(session_id).await?;
        // waits for an in-flight frame rather than dropping the restart
        session.pipeline.lock().await.restart();

        {
            let mut stats = session.stats.write().await;
            stats.last_accepted_plate = None;
            stats.last_accepted_at = None;
        }

        info!(session_id = %session_id, "Restarted plate session");
        Ok(session.info().await)
    }

    pub async fn remove_session(&self, session_id: &str) -> Result<(), SessionError> {
        let mut sessions = self.inner.sessions.write().await;
        if sessions.remove(session_id).is_none() {
            return Err(SessionError::NotFound(session_id.to_string()));
        }
        PLATE_ACTIVE_SESSIONS.set(sessions.len() as i64);
        info!(session_id = %session_id, "Removed plate session");
        Ok(())
    }

    /// Run one frame through the session pipeline.
    ///
    /// A frame arriving while the session is still processing the previous
    /// one is dropped with [`SessionError::Busy`]; frames are never queued.
    pub async fn submit_frame(
        &self,
        session_id: &str,
        submission: FrameSubmission,
    ) -> Result<FrameResponse, SessionError> {
        let session = self.session(session_id).await?;

        let Ok(mut pipeline) = session.pipeline.clone().try_lock_owned() else {
            session.stats.write().await.frames_dropped += 1;
            PLATE_FRAMES_DROPPED.inc();
            debug!(session_id = %session_id, sequence = submission.sequence, "frame dropped, pipeline busy");
            return Err(SessionError::Busy(session_id.to_string()));
        };

        let timestamp = submission
            .timestamp
            .unwrap_or_else(safe_unix_timestamp_ms);

        let frame: Result<OcrFrame, String> = match (submission.ocr, submission.ocr_error) {
            (_, Some(reason)) => Err(reason),
            (Some(frame), None) => {
                validate_ocr_frame(&frame)
                    .map_err(|e| SessionError::InvalidRequest(e.to_string()))?;
                Ok(frame)
            }
            (None, None) => {
                return Err(SessionError::InvalidRequest(
                    "frame must carry either 'ocr' or 'ocr_error'".to_string(),
                ))
            }
        };

        // image decode and the locator are CPU bound and run on the blocking pool
        let image_data = submission.image;
        let log_session_id = session_id.to_string();
        let (outcome, image) = tokio::task::spawn_blocking(move || {
            let image = match image_data.as_deref() {
                Some(data) => match decode_frame_image(data) {
                    Ok(image) => Some(image),
                    Err(e) => {
                        warn!(session_id = %log_session_id, error = %e, "ignoring undecodable frame image");
                        None
                    }
                },
                None => None,
            };
            let outcome = pipeline.process_result(frame, image.as_ref(), timestamp);
            (outcome, image)
        })
        .await
        .map_err(|e| SessionError::Internal(format!("frame processing task failed: {}", e)))?;

        PLATE_FRAMES_PROCESSED
            .with_label_values(&[outcome.label()])
            .inc();

        {
            let mut stats = session.stats.write().await;
            stats.frames_processed += 1;
            stats.last_outcome = Some(outcome.label().to_string());
            if let Some(plate) = outcome.accepted_plate() {
                stats.plates_accepted += 1;
                stats.last_accepted_plate = Some(plate.to_string());
                stats.last_accepted_at = Some(timestamp);
            }
        }

        if let PlateOutcome::Accepted {
            plate,
            confidence,
            observations,
            region,
            ..
        } = &outcome
        {
            self.dispatch(
                session.clone(),
                AcceptedDetection {
                    plate: plate.clone(),
                    confidence: *confidence,
                    observations: *observations,
                    region: *region,
                    timestamp,
                },
                image,
            );
        }

        Ok(FrameResponse {
            session_id: session_id.to_string(),
            sequence: submission.sequence,
            timestamp,
            message: outcome.status_message(),
            outcome,
        })
    }

    /// Hand an accepted detection to the transport without waiting for it
    fn dispatch(
        &self,
        session: Arc<Session>,
        detection: AcceptedDetection,
        image: Option<DynamicImage>,
    ) {
        let Some(transport) = self.inner.transport.clone() else {
            return;
        };
        let node_id = self.inner.node_id.clone();
        let site_id = self.inner.site_id.clone();

        tokio::spawn(async move {
            let plate = detection.plate.clone();
            let result = async {
                let report = build_report(
                    detection,
                    &node_id,
                    &site_id,
                    session.send_mode,
                    image.as_ref(),
                )?;
                transport.send(&report).await
            }
            .await;

            let status = match result {
                Ok(()) => {
                    PLATE_TRANSPORT_SENDS.with_label_values(&["success"]).inc();
                    format!("Sent {} via {}", plate, transport.name())
                }
                Err(e) => {
                    PLATE_TRANSPORT_SENDS.with_label_values(&["failure"]).inc();
                    warn!(session_id = %session.id, plate = %plate, error = %e, "detection send failed");
                    format!("Send failed for {}: {}", plate, e)
                }
            };

            session.stats.write().await.transport_status = Some(status);
        });
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        info!("Shutting down plate service...");

        let mut sessions = self.inner.sessions.write().await;
        let count = sessions.len();
        sessions.clear();
        PLATE_ACTIVE_SESSIONS.set(0);

        info!(sessions = count, "Plate service shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ocr::{BoundingBox, TextLine};

    fn state() -> PlateServiceState {
        PlateServiceState::new(&PlateServiceConfig::standalone("test-node"))
    }

    fn request(id: &str) -> SessionCreateRequest {
        SessionCreateRequest {
            id: id.to_string(),
            send_mode: None,
            pipeline_config: serde_json::Value::Null,
        }
    }

    fn plate_frame(text: &str) -> FrameSubmission {
        FrameSubmission {
            timestamp: Some(1_000),
            ocr: Some(OcrFrame::from_lines(vec![TextLine::new(
                text,
                Some(BoundingBox::new(0, 0, 200, 50)),
            )])),
            ..FrameSubmission::default()
        }
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let state = state();
        let info = state.create_session(request("gate-1")).await.unwrap();
        assert_eq!(info.id, "gate-1");
        assert_eq!(info.send_mode, SendMode::TextOnly);

        assert!(matches!(
            state.create_session(request("gate-1")).await,
            Err(SessionError::AlreadyExists(_))
        ));

        assert_eq!(state.list_sessions().await.len(), 1);
        state.remove_session("gate-1").await.unwrap();
        assert!(state.get_session("gate-1").await.is_none());
        assert!(matches!(
            state.remove_session("gate-1").await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_session_requests() {
        let state = state();
        assert!(matches!(
            state.create_session(request("../etc")).await,
            Err(SessionError::InvalidRequest(_))
        ));

        let mut bad_config = request("gate-2");
        bad_config.pipeline_config = serde_json::json!({ "confidence_threshold": 5.0 });
        assert!(matches!(
            state.create_session(bad_config).await,
            Err(SessionError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_frames_corroborate_then_suppress() {
        let state = state();
        state.create_session(request("gate-1")).await.unwrap();

        let first = state
            .submit_frame("gate-1", plate_frame("12가1234"))
            .await
            .unwrap();
        assert_eq!(first.outcome.label(), "insufficient_corroboration");

        let second = state
            .submit_frame("gate-1", plate_frame("12가1234"))
            .await
            .unwrap();
        assert_eq!(second.outcome.accepted_plate(), Some("12가1234"));

        let third = state
            .submit_frame("gate-1", plate_frame("12가1234"))
            .await
            .unwrap();
        assert_eq!(third.outcome.label(), "duplicate_suppressed");

        let info = state.get_session("gate-1").await.unwrap();
        assert_eq!(info.frames_processed, 3);
        assert_eq!(info.plates_accepted, 1);
        assert_eq!(info.last_accepted_plate.as_deref(), Some("12가1234"));
    }

    #[tokio::test]
    async fn test_restart_allows_reacceptance() {
        let state = state();
        state.create_session(request("gate-1")).await.unwrap();
        state.submit_frame("gate-1", plate_frame("12가1234")).await.unwrap();
        state.submit_frame("gate-1", plate_frame("12가1234")).await.unwrap();

        let info = state.restart_session("gate-1").await.unwrap();
        assert!(info.last_accepted_plate.is_none());

        let after = state
            .submit_frame("gate-1", plate_frame("12가1234"))
            .await
            .unwrap();
        assert_eq!(after.outcome.label(), "insufficient_corroboration");
    }

    #[tokio::test]
    async fn test_ocr_error_and_missing_payload() {
        let state = state();
        state.create_session(request("gate-1")).await.unwrap();

        let failed = state
            .submit_frame(
                "gate-1",
                FrameSubmission {
                    ocr_error: Some("camera offline".to_string()),
                    ..FrameSubmission::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(failed.outcome.label(), "recognition_failed");
        assert_eq!(failed.message, "Recognition failed: camera offline");

        assert!(matches!(
            state.submit_frame("gate-1", FrameSubmission::default()).await,
            Err(SessionError::InvalidRequest(_))
        ));
        assert!(matches!(
            state.submit_frame("missing", plate_frame("12가1234")).await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_busy_pipeline_drops_frame() {
        let state = state();
        state.create_session(request("gate-1")).await.unwrap();

        let session = state.session("gate-1").await.unwrap();
        let guard = session.pipeline.lock().await;

        assert!(matches!(
            state.submit_frame("gate-1", plate_frame("12가1234")).await,
            Err(SessionError::Busy(_))
        ));
        drop(guard);

        let info = state.get_session("gate-1").await.unwrap();
        assert_eq!(info.frames_dropped, 1);
        assert_eq!(info.frames_processed, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_frames_with_images_across_sessions() {
        use crate::transport::encode_jpeg_base64;
        use image::{Rgb, RgbImage};

        let state = state();
        state.create_session(request("gate-1")).await.unwrap();
        state.create_session(request("gate-2")).await.unwrap();

        let picture = DynamicImage::ImageRgb8(RgbImage::from_pixel(640, 480, Rgb([90, 90, 90])));
        let with_image = |text: &str| FrameSubmission {
            image: Some(encode_jpeg_base64(&picture).unwrap()),
            ..plate_frame(text)
        };

        let (first, second) = tokio::join!(
            state.submit_frame("gate-1", with_image("12가1234")),
            state.submit_frame("gate-2", with_image("34나5678")),
        );
        assert_eq!(first.unwrap().outcome.label(), "insufficient_corroboration");
        assert_eq!(second.unwrap().outcome.label(), "insufficient_corroboration");

        let broken = FrameSubmission {
            image: Some("not base64 at all".to_string()),
            ..plate_frame("12가1234")
        };
        let accepted = state.submit_frame("gate-1", broken).await.unwrap();
        assert_eq!(accepted.outcome.accepted_plate(), Some("12가1234"));
    }

    #[tokio::test]
    async fn test_shutdown_clears_sessions() {
        let state = state();
        state.create_session(request("gate-1")).await.unwrap();
        state.create_session(request("gate-2")).await.unwrap();
        state.shutdown().await.unwrap();
        assert_eq!(state.session_count().await, 0);
    }
}
