//! Session contracts for the plate recognition service.
//!
//! A session is one camera feed with its own pipeline state. This module
//! defines the request/response shapes for session lifecycle, frame
//! submission, and the detection report handed to the transport.

use crate::ocr::{BoundingBox, OcrFrame};
use serde::{Deserialize, Serialize};

/// What gets attached to an outgoing detection report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendMode {
    /// Plate text and metadata only
    #[default]
    TextOnly,

    /// Attach the whole submitted frame image
    FullFrame,

    /// Attach the frame cropped to the plate region of interest
    CroppedRegion,
}

impl std::str::FromStr for SendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text_only" | "text" => Ok(Self::TextOnly),
            "full_frame" | "full" => Ok(Self::FullFrame),
            "cropped_region" | "cropped" | "crop" => Ok(Self::CroppedRegion),
            other => Err(format!("unknown send mode '{}'", other)),
        }
    }
}

/// Request to open a new camera session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCreateRequest {
    /// Unique session identifier
    pub id: String,

    /// Overrides the service-wide send mode for this session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_mode: Option<SendMode>,

    /// Pipeline configuration (JSON object, defaults apply when null)
    #[serde(default)]
    pub pipeline_config: serde_json::Value,
}

/// Response to a session create request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCreateResponse {
    pub accepted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Session information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,

    pub send_mode: SendMode,

    /// Unix timestamp in milliseconds
    pub created_at: u64,

    pub frames_processed: u64,

    /// Frames discarded because the pipeline was busy
    pub frames_dropped: u64,

    pub plates_accepted: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accepted_plate: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accepted_at: Option<u64>,

    /// Label of the most recent frame outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<String>,

    /// Human-readable status of the most recent transport attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_status: Option<String>,
}

/// List of open sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionInfo>,
}

/// One frame's worth of OCR output submitted to a session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameSubmission {
    /// Frame timestamp (Unix timestamp in milliseconds); server clock when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,

    /// Frame sequence number
    #[serde(default)]
    pub sequence: u64,

    /// Recognition result, absent when the engine failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr: Option<OcrFrame>,

    /// Upstream recognition failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_error: Option<String>,

    /// Frame image (base64 encoded jpeg/png), used for region location and transport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Accepted plate packaged for the transport collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub plate: String,

    /// Acceptance time (Unix timestamp in milliseconds)
    pub timestamp: u64,

    pub device_id: String,

    pub site_id: String,

    pub confidence: f32,

    /// Frames this plate was observed in, including the accepting one
    pub observations: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<BoundingBox>,

    /// Image format of `image` (e.g., "jpeg")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_format: Option<String>,

    /// Attached image (base64 encoded), per the session send mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}
