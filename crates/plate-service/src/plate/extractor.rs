//! Candidate extraction from one OCR frame.

use common::ocr::{BoundingBox, OcrFrame};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::catalog;
use super::scorer::ConfidenceScorer;
use super::validator::PlateValidator;

/// A validated plate string with its line-level confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub plate: String,
    pub confidence: f32,
}

impl Candidate {
    pub fn new(plate: impl Into<String>, confidence: f32) -> Self {
        Self {
            plate: plate.into(),
            confidence,
        }
    }
}

/// Everything extraction learned about a frame
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Deduplicated candidates, highest confidence first
    pub candidates: Vec<Candidate>,

    /// Raw shape matches over the whole-frame text (before validation)
    pub text_matches: Vec<String>,

    /// Box of the highest-scoring line that matched any shape
    pub best_region: Option<BoundingBox>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Raw shape matches in a stripped line.
///
/// Glyph correction is left to the validator so it only ever touches the
/// matched window, never the characters around it.
fn line_matches(stripped: &str) -> Vec<String> {
    catalog::find_all(stripped)
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn keep_max(best: &mut HashMap<String, f32>, plate: String, confidence: f32) {
    best.entry(plate)
        .and_modify(|c| {
            if confidence > *c {
                *c = confidence;
            }
        })
        .or_insert(confidence);
}

/// Extract validated candidates from a frame.
///
/// Lines are scored once and every shape match on a line inherits that score.
/// A frame without any lines falls back to the whole-frame text with the flat
/// `text_only_confidence`.
pub fn extract(
    frame: &OcrFrame,
    scorer: &ConfidenceScorer,
    validator: &PlateValidator,
    text_only_confidence: f32,
) -> Extraction {
    let mut best: HashMap<String, f32> = HashMap::new();

    let stripped_full = strip_whitespace(&frame.text);
    let mut text_matches: Vec<String> = catalog::find_all(&frame.text)
        .into_iter()
        .chain(catalog::find_all(&stripped_full))
        .map(str::to_string)
        .collect();
    text_matches.sort();
    text_matches.dedup();

    let mut best_region: Option<(f32, BoundingBox)> = None;

    if frame.has_lines() {
        for line in frame.lines() {
            let stripped = strip_whitespace(&line.text);
            if stripped.is_empty() {
                continue;
            }

            let matches = line_matches(&stripped);
            if matches.is_empty() {
                continue;
            }

            let score = scorer.score(&line.text, line.bbox.as_ref());

            if let Some(bbox) = line.bbox {
                if best_region.map_or(true, |(s, _)| score > s) {
                    best_region = Some((score, bbox));
                }
            }

            for raw in matches {
                if let Some(plate) = validator.validate(&raw) {
                    keep_max(&mut best, plate, score);
                }
            }
        }
    } else {
        for raw in &text_matches {
            if let Some(plate) = validator.validate(raw) {
                keep_max(&mut best, plate, text_only_confidence);
            }
        }
    }

    let mut candidates: Vec<Candidate> = best
        .into_iter()
        .map(|(plate, confidence)| Candidate { plate, confidence })
        .collect();
    candidates.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.plate.cmp(&b.plate))
    });

    Extraction {
        candidates,
        text_matches,
        best_region: best_region.map(|(_, bbox)| bbox),
    }
}
