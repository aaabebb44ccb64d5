//! Draws detection boxes onto the inspected image.

use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, Rgba, RgbaImage};
use tracing::debug;

use assetguard_shared::{Annotator, AssetGuardError, BoundingBox, DetectedProblem, ImagePayload, Result};

const PALETTE: [Rgba<u8>; 6] = [
    Rgba([230, 25, 75, 255]),
    Rgba([60, 180, 75, 255]),
    Rgba([0, 130, 200, 255]),
    Rgba([245, 130, 48, 255]),
    Rgba([145, 30, 180, 255]),
    Rgba([255, 225, 25, 255]),
];

/// Outlines every problem's box (one colour per class) and re-encodes as PNG.
pub struct BoxAnnotator {
    thickness: u32,
}

impl BoxAnnotator {
    pub fn new(thickness: u32) -> Self {
        Self {
            thickness: thickness.max(1),
        }
    }
}

impl Default for BoxAnnotator {
    fn default() -> Self {
        Self::new(3)
    }
}

/// `annotated_<stem>.png`
pub fn annotated_name(original: &str) -> String {
    let stem = Path::new(original)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    format!("annotated_{stem}.png")
}

/// Box clamped to the image, as inclusive pixel corners. `None` if it lies outside.
fn pixel_rect(b: &BoundingBox, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    if width == 0 || height == 0 {
        return None;
    }
    let clamp_x = |v: f64| v.round().clamp(0.0, f64::from(width - 1)) as u32;
    let clamp_y = |v: f64| v.round().clamp(0.0, f64::from(height - 1)) as u32;
    if b.x_max < 0.0 || b.y_max < 0.0 || b.x_min > f64::from(width) || b.y_min > f64::from(height) {
        return None;
    }
    Some((clamp_x(b.x_min), clamp_y(b.y_min), clamp_x(b.x_max), clamp_y(b.y_max)))
}

fn draw_outline(canvas: &mut RgbaImage, rect: (u32, u32, u32, u32), thickness: u32, colour: Rgba<u8>) {
    let (x0, y0, x1, y1) = rect;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let on_edge = x - x0 < thickness || x1 - x < thickness || y - y0 < thickness || y1 - y < thickness;
            if on_edge {
                canvas.put_pixel(x, y, colour);
            }
        }
    }
}

impl Annotator for BoxAnnotator {
    fn annotate(&self, image: &ImagePayload, problems: &[DetectedProblem]) -> Result<ImagePayload> {
        let decoded = image::load_from_memory(&image.bytes)
            .map_err(|e| AssetGuardError::Image(format!("{}: {e}", image.name)))?;
        let mut canvas = decoded.to_rgba8();
        let (width, height) = canvas.dimensions();

        let mut classes: Vec<&str> = Vec::new();
        for problem in problems {
            let index = match classes.iter().position(|c| *c == problem.class) {
                Some(i) => i,
                None => {
                    classes.push(&problem.class);
                    classes.len() - 1
                }
            };
            if let Some(rect) = pixel_rect(&problem.bounding_box, width, height) {
                draw_outline(&mut canvas, rect, self.thickness, PALETTE[index % PALETTE.len()]);
            }
        }

        let mut bytes = Vec::new();
        canvas
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| AssetGuardError::Image(format!("PNG encoding failed: {e}")))?;

        let name = annotated_name(&image.name);
        debug!(%name, boxes = problems.len(), "image annotated");
        Ok(ImagePayload::new(name, bytes))
    }
}
