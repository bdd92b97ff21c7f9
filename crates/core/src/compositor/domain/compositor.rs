use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use thiserror::Error;

use crate::compositor::domain::output_surface::OutputSurface;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

#[derive(Error, Debug, PartialEq)]
pub enum CompositeError {
    #[error("compositor expects RGB frames, got {0} channels")]
    UnsupportedChannels(u8),
    #[error("display box {0:?} does not overlap the frame")]
    EmptyCrop(BoundingBox),
    #[error("frame buffer does not match its dimensions")]
    InvalidFrame,
}

/// Crops the display box out of a frame and scales it onto the preview.
pub struct Compositor {
    circle_mask: bool,
    background: [u8; 3],
    filter: FilterType,
}

impl Compositor {
    pub fn new() -> Self {
        Self {
            circle_mask: true,
            background: [0, 0, 0],
            filter: FilterType::Triangle,
        }
    }

    /// When enabled, pixels outside the inscribed circle (ellipse for
    /// non-square surfaces) are filled with the background colour.
    pub fn with_circle_mask(mut self, enabled: bool) -> Self {
        self.circle_mask = enabled;
        self
    }

    pub fn with_background(mut self, rgb: [u8; 3]) -> Self {
        self.background = rgb;
        self
    }

    /// Draws `display` from `frame` into `surface`, replacing its content.
    pub fn draw(
        &self,
        frame: &Frame,
        display: &BoundingBox,
        surface: &mut dyn OutputSurface,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (out_w, out_h) = surface.size();
        let composed = self.render(frame, display, out_w, out_h)?;
        surface.present(composed)
    }

    /// Crop-and-scale without a surface; the result is `out_w × out_h` RGB.
    pub fn render(
        &self,
        frame: &Frame,
        display: &BoundingBox,
        out_w: u32,
        out_h: u32,
    ) -> Result<Frame, CompositeError> {
        if frame.channels() != 3 {
            return Err(CompositeError::UnsupportedChannels(frame.channels()));
        }
        let (x, y, w, h) = pixel_rect(display, frame.width(), frame.height())
            .ok_or(CompositeError::EmptyCrop(*display))?;

        let source = RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
            .ok_or(CompositeError::InvalidFrame)?;
        let crop = imageops::crop_imm(&source, x, y, w, h).to_image();
        let mut scaled = imageops::resize(&crop, out_w, out_h, self.filter);

        if self.circle_mask {
            apply_circle_mask(&mut scaled, self.background);
        }

        Ok(Frame::new(
            scaled.into_raw(),
            out_w,
            out_h,
            3,
            frame.timestamp(),
        ))
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}

/// Snaps a fractional box outward to whole pixels inside the frame.
///
/// Returns `(x, y, width, height)`, or `None` when nothing of the box is
/// inside the frame.
fn pixel_rect(display: &BoundingBox, frame_w: u32, frame_h: u32) -> Option<(u32, u32, u32, u32)> {
    let x1 = display.origin_x.floor().clamp(0.0, frame_w as f64);
    let y1 = display.origin_y.floor().clamp(0.0, frame_h as f64);
    let x2 = display.right().ceil().clamp(0.0, frame_w as f64);
    let y2 = display.bottom().ceil().clamp(0.0, frame_h as f64);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some((x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32))
}

fn apply_circle_mask(image: &mut RgbImage, background: [u8; 3]) {
    let rx = image.width() as f64 / 2.0;
    let ry = image.height() as f64 / 2.0;
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let dx = (x as f64 + 0.5 - rx) / rx;
        let dy = (y as f64 + 0.5 - ry) / ry;
        if dx * dx + dy * dy > 1.0 {
            *pixel = Rgb(background);
        }
    }
}
