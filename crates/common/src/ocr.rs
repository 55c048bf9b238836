//! OCR contracts consumed by the plate pipeline.
//!
//! The OCR engine itself is external; these types mirror what it hands over
//! per frame: the whole-frame text plus blocks of lines with optional boxes.

use serde::{Deserialize, Serialize};

/// Bounding box in image pixel space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Width divided by height, `None` for a zero-height box
    pub fn aspect_ratio(&self) -> Option<f32> {
        if self.height == 0 {
            None
        } else {
            Some(self.width as f32 / self.height as f32)
        }
    }

    /// Grow the box by a fraction of its own size on every side.
    ///
    /// `pad_x` is applied to the left and right edges as a fraction of the
    /// width, `pad_y` to the top and bottom as a fraction of the height. The
    /// origin is clamped at zero, so a box touching the frame edge only grows
    /// inwards on that side.
    pub fn expand(&self, pad_x: f32, pad_y: f32) -> Self {
        let dx = (self.width as f32 * pad_x).round() as i64;
        let dy = (self.height as f32 * pad_y).round() as i64;

        let left = (self.x as i64 - dx).max(0);
        let top = (self.y as i64 - dy).max(0);
        let right = self.x as i64 + self.width as i64 + dx;
        let bottom = self.y as i64 + self.height as i64 + dy;

        Self {
            x: left as u32,
            y: top as u32,
            width: saturate_u32(right - left),
            height: saturate_u32(bottom - top),
        }
    }
}

fn saturate_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// A single recognized line of text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLine {
    /// Raw recognized text
    pub text: String,

    /// Line geometry, absent when the engine could not place the line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

impl TextLine {
    pub fn new(text: impl Into<String>, bbox: Option<BoundingBox>) -> Self {
        Self {
            text: text.into(),
            bbox,
        }
    }
}

/// Group of lines as reported by the engine (grouping only)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextBlock {
    #[serde(default)]
    pub lines: Vec<TextLine>,
}

/// OCR output for one camera frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrFrame {
    /// Whole-frame concatenated text
    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub blocks: Vec<TextBlock>,
}

impl OcrFrame {
    /// Build a frame from lines, deriving the full text by joining them
    pub fn from_lines(lines: Vec<TextLine>) -> Self {
        let text = lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            text,
            blocks: vec![TextBlock { lines }],
        }
    }

    /// Iterate every line across all blocks, in engine order
    pub fn lines(&self) -> impl Iterator<Item = &TextLine> {
        self.blocks.iter().flat_map(|b| b.lines.iter())
    }

    pub fn has_lines(&self) -> bool {
        self.lines().next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && !self.has_lines()
    }
}
