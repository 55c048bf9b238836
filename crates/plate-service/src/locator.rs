//! Image-based plate region location.
//!
//! Used only when OCR geometry cannot place the accepted plate.

use common::ocr::BoundingBox;
use image::{DynamicImage, GrayImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::contrast::equalize_histogram;
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::morphology::dilate;

/// Locates a likely plate rectangle in a frame image
pub trait PlateLocator: Send + Sync {
    fn locate_plate_region(&self, image: &DynamicImage) -> Option<BoundingBox>;
}

/// Edge and contour heuristic over a grayscale frame.
///
/// Equalize, Canny, dilate to join character strokes, then keep the largest
/// outer contour whose bounding box has a plate-like aspect ratio.
#[derive(Debug, Clone)]
pub struct EdgeContourLocator {
    pub canny_low: f32,
    pub canny_high: f32,
    /// Dilation radius (L-infinity), joins neighbouring glyph edges
    pub dilate_radius: u8,
    pub min_aspect: f32,
    pub max_aspect: f32,
    /// Minimum box area as a fraction of the frame area
    pub min_area_fraction: f32,
}

impl Default for EdgeContourLocator {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            dilate_radius: 2,
            min_aspect: 2.0,
            max_aspect: 6.0,
            min_area_fraction: 0.002,
        }
    }
}

impl EdgeContourLocator {
    fn edges(&self, gray: &GrayImage) -> GrayImage {
        let equalized = equalize_histogram(gray);
        let edges = canny(&equalized, self.canny_low, self.canny_high);
        dilate(&edges, Norm::LInf, self.dilate_radius)
    }

    fn is_plate_like(&self, bbox: &BoundingBox, frame_area: f32) -> bool {
        let Some(aspect) = bbox.aspect_ratio() else {
            return false;
        };
        let area = bbox.width as f32 * bbox.height as f32;
        aspect >= self.min_aspect
            && aspect <= self.max_aspect
            && area >= frame_area * self.min_area_fraction
    }
}

fn contour_bounds(contour: &Contour<u32>) -> Option<BoundingBox> {
    let first = contour.points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &contour.points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(BoundingBox::new(
        min_x,
        min_y,
        max_x - min_x + 1,
        max_y - min_y + 1,
    ))
}

impl PlateLocator for EdgeContourLocator {
    fn locate_plate_region(&self, image: &DynamicImage) -> Option<BoundingBox> {
        let gray = image.to_luma8();
        if gray.width() < 8 || gray.height() < 8 {
            return None;
        }

        let frame_area = gray.width() as f32 * gray.height() as f32;
        let edges = self.edges(&gray);
        let contours: Vec<Contour<u32>> = find_contours(&edges);

        contours
            .iter()
            .filter(|c| c.border_type == BorderType::Outer)
            .filter_map(contour_bounds)
            .filter(|b| self.is_plate_like(b, frame_area))
            .max_by_key(|b| u64::from(b.width) * u64::from(b.height))
    }
}
