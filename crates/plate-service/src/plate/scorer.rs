//! Line-level plausibility scoring.
//!
//! The score is a sum of independent components. Each component contributes
//! its full weight when its condition holds and a smaller fallback weight
//! otherwise, so no single feature acts as a hard cutoff.

use common::ocr::BoundingBox;
use serde::{Deserialize, Serialize};

/// Score returned for lines without geometry
pub const NEUTRAL_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Preferred width/height band of a plate line (inclusive)
    #[serde(default = "default_aspect_band")]
    pub aspect_band: (f32, f32),

    /// Preferred characters-per-pixel band (inclusive)
    #[serde(default = "default_density_band")]
    pub density_band: (f32, f32),

    #[serde(default = "default_aspect_weight")]
    pub aspect_weight: f32,

    #[serde(default = "default_fallback_weight")]
    pub aspect_fallback_weight: f32,

    #[serde(default = "default_density_weight")]
    pub density_weight: f32,

    #[serde(default = "default_fallback_weight")]
    pub density_fallback_weight: f32,

    /// Constant contribution of a pattern match
    #[serde(default = "default_baseline_weight")]
    pub baseline_weight: f32,
}

fn default_aspect_band() -> (f32, f32) {
    (3.5, 5.0)
}

fn default_density_band() -> (f32, f32) {
    (0.05, 0.15)
}

fn default_aspect_weight() -> f32 {
    0.3
}

fn default_density_weight() -> f32 {
    0.3
}

fn default_fallback_weight() -> f32 {
    0.1
}

fn default_baseline_weight() -> f32 {
    0.4
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            aspect_band: default_aspect_band(),
            density_band: default_density_band(),
            aspect_weight: default_aspect_weight(),
            aspect_fallback_weight: default_fallback_weight(),
            density_weight: default_density_weight(),
            density_fallback_weight: default_fallback_weight(),
            baseline_weight: default_baseline_weight(),
        }
    }
}

impl ScorerConfig {
    /// Bands must be ordered and non-negative; weights must be non-negative
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_band(self.aspect_band, "scorer.aspect_band")?;
        validate_band(self.density_band, "scorer.density_band")?;
        for (value, name) in [
            (self.aspect_weight, "scorer.aspect_weight"),
            (self.aspect_fallback_weight, "scorer.aspect_fallback_weight"),
            (self.density_weight, "scorer.density_weight"),
            (self.density_fallback_weight, "scorer.density_fallback_weight"),
            (self.baseline_weight, "scorer.baseline_weight"),
        ] {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("{} must be a non-negative number, got {}", name, value);
            }
        }
        Ok(())
    }
}

fn validate_band((low, high): (f32, f32), name: &str) -> anyhow::Result<()> {
    if !low.is_finite() || !high.is_finite() || low < 0.0 || low > high {
        anyhow::bail!("{} must satisfy 0 <= low <= high, got ({}, {})", name, low, high);
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    config: ScorerConfig,
}

impl ConfidenceScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Score a line of text with its box, in `[0, 1]`
    pub fn score(&self, text: &str, bbox: Option<&BoundingBox>) -> f32 {
        let Some(bbox) = bbox else {
            return NEUTRAL_CONFIDENCE;
        };

        let c = &self.config;

        let aspect = match bbox.aspect_ratio() {
            Some(ratio) if in_band(ratio, c.aspect_band) => c.aspect_weight,
            _ => c.aspect_fallback_weight,
        };

        let density = match char_density(text, bbox.width) {
            Some(d) if in_band(d, c.density_band) => c.density_weight,
            _ => c.density_fallback_weight,
        };

        let score = aspect + density + c.baseline_weight;
        if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            NEUTRAL_CONFIDENCE
        }
    }
}

fn in_band(value: f32, (low, high): (f32, f32)) -> bool {
    value >= low && value <= high
}

/// Non-whitespace characters per pixel of box width
fn char_density(text: &str, width: u32) -> Option<f32> {
    if width == 0 {
        return None;
    }
    let chars = text.chars().filter(|c| !c.is_whitespace()).count();
    Some(chars as f32 / width as f32)
}
