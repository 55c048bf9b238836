//! Per-session decision pipeline.
//!
//! Owns the detection memory and last-accepted state for one camera feed and
//! turns each frame's OCR output into exactly one [`PlateOutcome`].

use common::ocr::{BoundingBox, OcrFrame};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics::{PLATE_CANDIDATES, PLATE_PIPELINE_LATENCY};
use tracing::{debug, info};

use super::extractor::{extract, Candidate};
use super::memory::{DetectionMemory, MAX_RECENT};
use super::scorer::{ConfidenceScorer, ScorerConfig};
use super::validator::PlateValidator;
use crate::locator::PlateLocator;

/// Pipeline tuning, supplied per session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Minimum confidence for a candidate to be considered at all
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Observations needed before a plate is accepted
    #[serde(default = "default_min_observations")]
    pub min_observations: u32,

    /// Confidence above which a single observation is enough
    #[serde(default = "default_high_confidence_override")]
    pub high_confidence_override: f32,

    /// Distinct plates remembered for corroboration
    #[serde(default = "default_max_recent")]
    pub max_recent: usize,

    /// Confidence given to matches found only in the whole-frame text
    #[serde(default = "default_text_only_confidence")]
    pub text_only_confidence: f32,

    #[serde(default)]
    pub skip_charset_check: bool,

    /// Horizontal region padding, fraction of line width per side
    #[serde(default = "default_roi_pad_x")]
    pub roi_pad_x: f32,

    /// Vertical region padding, fraction of line height per side
    #[serde(default = "default_roi_pad_y")]
    pub roi_pad_y: f32,

    #[serde(default)]
    pub scorer: ScorerConfig,
}

fn default_confidence_threshold() -> f32 {
    0.7
}

fn default_min_observations() -> u32 {
    2
}

fn default_high_confidence_override() -> f32 {
    0.85
}

fn default_max_recent() -> usize {
    MAX_RECENT
}

fn default_text_only_confidence() -> f32 {
    0.5
}

fn default_roi_pad_x() -> f32 {
    0.1
}

fn default_roi_pad_y() -> f32 {
    0.2
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            min_observations: default_min_observations(),
            high_confidence_override: default_high_confidence_override(),
            max_recent: default_max_recent(),
            text_only_confidence: default_text_only_confidence(),
            skip_charset_check: false,
            roi_pad_x: default_roi_pad_x(),
            roi_pad_y: default_roi_pad_y(),
            scorer: ScorerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a session's JSON config, `null` meaning all defaults
    pub fn from_value(value: serde_json::Value) -> anyhow::Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        use common::validation::validate_range;

        validate_range(self.confidence_threshold, 0.0, 1.0, "confidence_threshold")?;
        validate_range(
            self.high_confidence_override,
            0.0,
            1.0,
            "high_confidence_override",
        )?;
        validate_range(self.text_only_confidence, 0.0, 1.0, "text_only_confidence")?;
        validate_range(self.roi_pad_x, 0.0, 1.0, "roi_pad_x")?;
        validate_range(self.roi_pad_y, 0.0, 1.0, "roi_pad_y")?;
        validate_range(self.min_observations, 1, 100, "min_observations")?;
        validate_range(self.max_recent, 1, 10_000, "max_recent")?;
        self.scorer.validate()?;
        Ok(())
    }

    /// JSON schema describing the accepted keys
    pub fn config_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "confidence_threshold": {
                    "type": "number",
                    "minimum": 0.0,
                    "maximum": 1.0,
                    "default": 0.7,
                    "description": "Minimum candidate confidence"
                },
                "min_observations": {
                    "type": "integer",
                    "minimum": 1,
                    "default": 2,
                    "description": "Frames a plate must be seen in before acceptance"
                },
                "high_confidence_override": {
                    "type": "number",
                    "minimum": 0.0,
                    "maximum": 1.0,
                    "default": 0.85,
                    "description": "Confidence above which one observation suffices"
                },
                "max_recent": {
                    "type": "integer",
                    "minimum": 1,
                    "default": 10,
                    "description": "Distinct plates kept for corroboration"
                },
                "text_only_confidence": {
                    "type": "number",
                    "minimum": 0.0,
                    "maximum": 1.0,
                    "default": 0.5,
                    "description": "Confidence for matches in frames without line geometry"
                },
                "skip_charset_check": {
                    "type": "boolean",
                    "default": false,
                    "description": "Skip the character set check during validation"
                },
                "roi_pad_x": {
                    "type": "number",
                    "minimum": 0.0,
                    "maximum": 1.0,
                    "default": 0.1
                },
                "roi_pad_y": {
                    "type": "number",
                    "minimum": 0.0,
                    "maximum": 1.0,
                    "default": 0.2
                },
                "scorer": {
                    "type": "object",
                    "properties": {
                        "aspect_band": { "type": "array", "items": { "type": "number" }, "default": [3.5, 5.0] },
                        "density_band": { "type": "array", "items": { "type": "number" }, "default": [0.05, 0.15] },
                        "aspect_weight": { "type": "number", "default": 0.3 },
                        "aspect_fallback_weight": { "type": "number", "default": 0.1 },
                        "density_weight": { "type": "number", "default": 0.3 },
                        "density_fallback_weight": { "type": "number", "default": 0.1 },
                        "baseline_weight": { "type": "number", "default": 0.4 }
                    }
                }
            }
        })
    }
}

/// Last accepted plate, mutated only on acceptance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineState {
    pub last_accepted_plate: String,
    /// Unix timestamp in milliseconds, 0 before the first acceptance
    pub last_accepted_time: u64,
}

/// Where an accepted plate's region of interest came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionSource {
    OcrLine,
    ImageLocator,
}

/// Terminal result of one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PlateOutcome {
    NoDetection,
    LowConfidence {
        plate: String,
        confidence: f32,
    },
    DuplicateSuppressed {
        plate: String,
    },
    InsufficientCorroboration {
        plate: String,
        confidence: f32,
        observations: u32,
    },
    Accepted {
        plate: String,
        confidence: f32,
        observations: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        region: Option<BoundingBox>,
        #[serde(skip_serializing_if = "Option::is_none")]
        region_source: Option<RegionSource>,
    },
    RecognitionFailed {
        reason: String,
    },
}

impl PlateOutcome {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            PlateOutcome::NoDetection => "no_detection",
            PlateOutcome::LowConfidence { .. } => "low_confidence",
            PlateOutcome::DuplicateSuppressed { .. } => "duplicate_suppressed",
            PlateOutcome::InsufficientCorroboration { .. } => "insufficient_corroboration",
            PlateOutcome::Accepted { .. } => "accepted",
            PlateOutcome::RecognitionFailed { .. } => "recognition_failed",
        }
    }

    /// Human-readable status for display
    pub fn status_message(&self) -> String {
        match self {
            PlateOutcome::NoDetection => "No plate detected".to_string(),
            PlateOutcome::LowConfidence { plate, confidence } => {
                format!("Low confidence for {} ({:.2})", plate, confidence)
            }
            PlateOutcome::DuplicateSuppressed { plate } => {
                format!("Duplicate plate {} suppressed", plate)
            }
            PlateOutcome::InsufficientCorroboration {
                plate,
                observations,
                ..
            } => format!(
                "Waiting for more observations of {} (seen {})",
                plate, observations
            ),
            PlateOutcome::Accepted { plate, .. } => format!("Plate detected: {}", plate),
            PlateOutcome::RecognitionFailed { reason } => {
                format!("Recognition failed: {}", reason)
            }
        }
    }

    pub fn accepted_plate(&self) -> Option<&str> {
        match self {
            PlateOutcome::Accepted { plate, .. } => Some(plate),
            _ => None,
        }
    }
}

/// Highest confidence, then longer string, then lexicographically smallest
fn best_candidate(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates.iter().max_by(|a, b| {
        a.confidence
            .total_cmp(&b.confidence)
            .then_with(|| a.plate.chars().count().cmp(&b.plate.chars().count()))
            .then_with(|| b.plate.cmp(&a.plate))
    })
}

pub struct PlatePipeline {
    config: PipelineConfig,
    scorer: ConfidenceScorer,
    validator: PlateValidator,
    memory: DetectionMemory,
    state: PipelineState,
    locator: Option<Arc<dyn PlateLocator>>,
}

impl PlatePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            scorer: ConfidenceScorer::new(config.scorer.clone()),
            validator: PlateValidator::new(config.skip_charset_check),
            memory: DetectionMemory::new(config.max_recent),
            state: PipelineState::default(),
            locator: None,
            config,
        }
    }

    /// Use `locator` when OCR lines cannot place an accepted plate
    pub fn with_locator(mut self, locator: Arc<dyn PlateLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn memory(&self) -> &DetectionMemory {
        &self.memory
    }

    /// Forget all observations and the last accepted plate
    pub fn restart(&mut self) {
        self.memory.clear();
        self.state = PipelineState::default();
        debug!("plate pipeline restarted");
    }

    /// Apply the acceptance rules to one frame's candidates
    pub fn decide(&mut self, candidates: &[Candidate], now_ms: u64) -> PlateOutcome {
        let Some(best) = best_candidate(candidates) else {
            return PlateOutcome::NoDetection;
        };

        if best.confidence < self.config.confidence_threshold {
            return PlateOutcome::LowConfidence {
                plate: best.plate.clone(),
                confidence: best.confidence,
            };
        }

        if best.plate == self.state.last_accepted_plate {
            return PlateOutcome::DuplicateSuppressed {
                plate: best.plate.clone(),
            };
        }

        let observations = self.memory.record(&best.plate);

        if observations >= self.config.min_observations
            || best.confidence > self.config.high_confidence_override
        {
            self.state.last_accepted_plate = best.plate.clone();
            self.state.last_accepted_time = now_ms;

            info!(
                plate = %best.plate,
                confidence = best.confidence,
                observations,
                "plate accepted"
            );

            return PlateOutcome::Accepted {
                plate: best.plate.clone(),
                confidence: best.confidence,
                observations,
                region: None,
                region_source: None,
            };
        }

        PlateOutcome::InsufficientCorroboration {
            plate: best.plate.clone(),
            confidence: best.confidence,
            observations,
        }
    }

    /// Run one frame through extraction and decision.
    ///
    /// `image` is only consulted for region location when the frame has no
    /// usable line geometry for the accepted plate.
    pub fn process(
        &mut self,
        frame: &OcrFrame,
        image: Option<&DynamicImage>,
        now_ms: u64,
    ) -> PlateOutcome {
        let started = Instant::now();
        let extraction = extract(
            frame,
            &self.scorer,
            &self.validator,
            self.config.text_only_confidence,
        );
        PLATE_PIPELINE_LATENCY
            .with_label_values(&["extract"])
            .observe(started.elapsed().as_secs_f64());
        PLATE_CANDIDATES.inc_by(extraction.candidates.len() as u64);

        debug!(
            candidates = extraction.candidates.len(),
            text_matches = extraction.text_matches.len(),
            "frame extracted"
        );

        let mut outcome = self.decide(&extraction.candidates, now_ms);

        if let PlateOutcome::Accepted {
            region,
            region_source,
            ..
        } = &mut outcome
        {
            let located = self.region_of_interest(extraction.best_region, image);
            *region = located.map(|(bbox, _)| bbox);
            *region_source = located.map(|(_, source)| source);
        }

        PLATE_PIPELINE_LATENCY
            .with_label_values(&["total"])
            .observe(started.elapsed().as_secs_f64());

        debug!(outcome = outcome.label(), "frame decided");
        outcome
    }

    /// Like [`process`](Self::process), for a frame the OCR engine may have failed on
    pub fn process_result(
        &mut self,
        frame: Result<OcrFrame, String>,
        image: Option<&DynamicImage>,
        now_ms: u64,
    ) -> PlateOutcome {
        match frame {
            Ok(frame) => self.process(&frame, image, now_ms),
            Err(reason) => {
                debug!(%reason, "upstream recognition failed");
                PlateOutcome::RecognitionFailed { reason }
            }
        }
    }

    fn region_of_interest(
        &self,
        line_box: Option<BoundingBox>,
        image: Option<&DynamicImage>,
    ) -> Option<(BoundingBox, RegionSource)> {
        if let Some(bbox) = line_box {
            let padded = bbox.expand(self.config.roi_pad_x, self.config.roi_pad_y);
            return Some((padded, RegionSource::OcrLine));
        }

        let locator = self.locator.as_ref()?;
        let image = image?;
        locator
            .locate_plate_region(image)
            .map(|bbox| (bbox, RegionSource::ImageLocator))
    }
}

impl std::fmt::Debug for PlatePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatePipeline")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("remembered", &self.memory.len())
            .field("has_locator", &self.locator.is_some())
            .finish()
    }
}
