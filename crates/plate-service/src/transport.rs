//! Delivery of accepted detections to a downstream collector.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use common::ocr::BoundingBox;
use common::sessions::{DetectionReport, SendMode};
use common::validation::MAX_IMAGE_BASE64_LENGTH;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use reqwest::Url;
use std::time::Duration;
use tracing::debug;

const JPEG_QUALITY: u8 = 85;
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait DetectionTransport: Send + Sync {
    async fn send(&self, report: &DetectionReport) -> Result<()>;

    /// Short name for logs and status text
    fn name(&self) -> &str;
}

/// Posts reports as JSON to a fixed endpoint
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(endpoint: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl DetectionTransport for HttpTransport {
    async fn send(&self, report: &DetectionReport) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(report)
            .send()
            .await
            .context("Failed to send detection report")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Detection endpoint responded with status: {}",
                response.status()
            );
        }

        debug!(plate = %report.plate, endpoint = %self.endpoint, "detection report delivered");
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Decode a base64 frame image (any format the `image` crate can sniff)
pub fn decode_frame_image(data: &str) -> Result<DynamicImage> {
    if data.len() > MAX_IMAGE_BASE64_LENGTH {
        anyhow::bail!(
            "Frame image exceeds maximum size of {} bytes",
            MAX_IMAGE_BASE64_LENGTH
        );
    }
    let bytes = base64::prelude::BASE64_STANDARD
        .decode(data.trim())
        .context("Failed to decode base64 image")?;
    image::load_from_memory(&bytes).context("Failed to load image")
}

/// Encode an image as base64 JPEG
pub fn encode_jpeg_base64(image: &DynamicImage) -> Result<String> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
    DynamicImage::ImageRgb8(image.to_rgb8())
        .write_with_encoder(encoder)
        .context("Failed to encode JPEG")?;
    Ok(base64::prelude::BASE64_STANDARD.encode(buffer))
}

/// Crop `image` to `region`, clipped to the image bounds
pub fn crop_to_region(image: &DynamicImage, region: &BoundingBox) -> Option<DynamicImage> {
    let (width, height) = (image.width(), image.height());
    if region.x >= width || region.y >= height {
        return None;
    }
    let w = region.width.min(width - region.x);
    let h = region.height.min(height - region.y);
    if w == 0 || h == 0 {
        return None;
    }
    Some(image.crop_imm(region.x, region.y, w, h))
}

/// Everything known about one accepted plate, before packaging
#[derive(Debug, Clone)]
pub struct AcceptedDetection {
    pub plate: String,
    pub confidence: f32,
    pub observations: u32,
    pub region: Option<BoundingBox>,
    pub timestamp: u64,
}

/// Package an accepted detection for the transport.
///
/// The attached image follows `mode`. A cropped report without a usable
/// region falls back to the whole frame; a missing frame image yields a
/// text-only report.
pub fn build_report(
    detection: AcceptedDetection,
    device_id: &str,
    site_id: &str,
    mode: SendMode,
    image: Option<&DynamicImage>,
) -> Result<DetectionReport> {
    let attachment = match (mode, image) {
        (SendMode::TextOnly, _) | (_, None) => None,
        (SendMode::FullFrame, Some(frame)) => Some(encode_jpeg_base64(frame)?),
        (SendMode::CroppedRegion, Some(frame)) => {
            let cropped = detection
                .region
                .as_ref()
                .and_then(|region| crop_to_region(frame, region));
            match cropped {
                Some(crop) => Some(encode_jpeg_base64(&crop)?),
                None => Some(encode_jpeg_base64(frame)?),
            }
        }
    };

    Ok(DetectionReport {
        plate: detection.plate,
        timestamp: detection.timestamp,
        device_id: device_id.to_string(),
        site_id: site_id.to_string(),
        confidence: detection.confidence,
        observations: detection.observations,
        region: detection.region,
        image_format: attachment.as_ref().map(|_| "jpeg".to_string()),
        image: attachment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn detection(region: Option<BoundingBox>) -> AcceptedDetection {
        AcceptedDetection {
            plate: "12가3456".to_string(),
            confidence: 0.9,
            observations: 2,
            region,
            timestamp: 1_700_000_000_000,
        }
    }

    fn frame() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([40, 80, 120])))
    }

    #[test]
    fn test_text_only_report() {
        let image = frame();
        let report =
            build_report(detection(None), "cam-1", "none", SendMode::TextOnly, Some(&image))
                .unwrap();

        assert_eq!(report.plate, "12가3456");
        assert_eq!(report.device_id, "cam-1");
        assert_eq!(report.site_id, "none");
        assert!(report.image.is_none());
        assert!(report.image_format.is_none());
    }

    #[test]
    fn test_full_frame_report_round_trips_image() {
        let image = frame();
        let report =
            build_report(detection(None), "cam-1", "none", SendMode::FullFrame, Some(&image))
                .unwrap();

        let decoded = decode_frame_image(report.image.as_deref().unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
        assert_eq!(report.image_format.as_deref(), Some("jpeg"));
    }

    #[test]
    fn test_cropped_report() {
        let image = frame();
        let region = BoundingBox::new(10, 10, 30, 12);
        let report = build_report(
            detection(Some(region)),
            "cam-1",
            "none",
            SendMode::CroppedRegion,
            Some(&image),
        )
        .unwrap();

        let decoded = decode_frame_image(report.image.as_deref().unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (30, 12));
        assert_eq!(report.region, Some(region));
    }

    #[test]
    fn test_cropped_without_region_sends_full_frame() {
        let image = frame();
        let report = build_report(
            detection(None),
            "cam-1",
            "none",
            SendMode::CroppedRegion,
            Some(&image),
        )
        .unwrap();

        let decoded = decode_frame_image(report.image.as_deref().unwrap()).unwrap();
        assert_eq!(decoded.width(), 64);
    }

    #[test]
    fn test_missing_image_is_text_only() {
        let report =
            build_report(detection(None), "cam-1", "none", SendMode::FullFrame, None).unwrap();
        assert!(report.image.is_none());
    }

    #[test]
    fn test_crop_is_clipped_to_bounds() {
        let image = frame();
        let crop = crop_to_region(&image, &BoundingBox::new(50, 40, 100, 100)).unwrap();
        assert_eq!((crop.width(), crop.height()), (14, 8));

        assert!(crop_to_region(&image, &BoundingBox::new(64, 0, 10, 10)).is_none());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_frame_image("not base64!").is_err());
        let not_an_image = base64::prelude::BASE64_STANDARD.encode(b"hello");
        assert!(decode_frame_image(&not_an_image).is_err());
    }

    #[test]
    fn test_http_transport_builds() {
        let endpoint = Url::parse("http://127.0.0.1:9/detections").unwrap();
        let transport = HttpTransport::new(endpoint.clone()).unwrap();
        assert_eq!(transport.endpoint(), &endpoint);
        assert_eq!(transport.name(), "http");
    }
}
