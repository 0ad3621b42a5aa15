//! Per-frame overlay: what to draw, and a rasterizer for RGB frames.
//!
//! Labels need a [`LabelFont`]; without one only shapes are drawn.

use std::fs;
use std::path::Path;

use ab_glyph::{FontArc, InvalidFont, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect as PixelRect;

use crate::error::ConfigError;
use crate::geometry::{Line, Point};
use crate::tracker::{Rect, Track};

const ROI_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const LINE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const COASTING_COLOR: Rgb<u8> = Rgb([128, 128, 128]);
const ID_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
const SPEED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Gap between a box edge and its label, in pixels
const LABEL_GAP: f32 = 2.0;

/// Font used for the `ID:n` and speed labels.
#[derive(Debug, Clone)]
pub struct LabelFont {
    font: FontArc,
    scale: PxScale,
}

impl LabelFont {
    /// `size` is the glyph height in pixels.
    pub fn new(font: FontArc, size: f32) -> Self {
        Self {
            font,
            scale: PxScale::from(size),
        }
    }

    /// Parse a TrueType/OpenType font.
    pub fn from_bytes(data: Vec<u8>, size: f32) -> Result<Self, InvalidFont> {
        Ok(Self::new(FontArc::try_from_vec(data)?, size))
    }

    pub fn load(path: impl AsRef<Path>, size: f32) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(data, size).map_err(|_| {
            ConfigError::invalid("label_font", format!("{} is not a font", path.display()))
        })
    }

    pub fn size(&self) -> f32 {
        self.scale.y
    }
}

/// One in-ROI track as it should be drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackOverlay {
    pub track_id: u64,
    pub rect: Rect,
    pub speed_kmph: Option<f64>,
    pub coasting: bool,
}

impl TrackOverlay {
    pub fn from_track(track: &Track) -> Self {
        Self {
            track_id: track.id(),
            rect: track.rect(),
            speed_kmph: track.speed(),
            coasting: track.is_coasting(),
        }
    }

    pub fn id_label(&self) -> String {
        format!("ID:{}", self.track_id)
    }

    pub fn speed_label(&self) -> Option<String> {
        self.speed_kmph.map(|s| format!("{s:.1} km/h"))
    }
}

/// Everything drawn on top of one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub roi: Vec<Point>,
    pub lines: [Line; 2],
    pub tracks: Vec<TrackOverlay>,
}

/// Rasterize `overlay` onto `image`. Shapes are clipped to the frame.
///
/// With `labels`, each box gets its id above it and, once known, its speed
/// below it.
pub fn draw_overlay(image: &mut RgbImage, overlay: &Overlay, labels: Option<&LabelFont>) {
    if image.width() == 0 || image.height() == 0 {
        return;
    }

    for (i, &start) in overlay.roi.iter().enumerate() {
        let end = overlay.roi[(i + 1) % overlay.roi.len()];
        draw_segment(image, start, end, ROI_COLOR);
    }

    for line in &overlay.lines {
        draw_segment(image, line.start, line.end, LINE_COLOR);
    }

    for track in &overlay.tracks {
        let color = if track.coasting { COASTING_COLOR } else { BOX_COLOR };
        let Some(rect) = to_pixel_rect(&track.rect) else {
            continue;
        };
        draw_hollow_rect_mut(image, rect, color);

        if let Some(labels) = labels {
            draw_labels(image, track, rect, labels);
        }
    }
}

fn draw_labels(image: &mut RgbImage, track: &TrackOverlay, rect: PixelRect, labels: &LabelFont) {
    let above = rect.top() - (labels.scale.y + LABEL_GAP).round() as i32;
    draw_text_mut(
        image,
        ID_COLOR,
        rect.left(),
        above,
        labels.scale,
        &labels.font,
        &track.id_label(),
    );

    if let Some(speed) = track.speed_label() {
        let below = rect.bottom() + LABEL_GAP.round() as i32;
        draw_text_mut(
            image,
            SPEED_COLOR,
            rect.left(),
            below,
            labels.scale,
            &labels.font,
            &speed,
        );
    }
}

fn draw_segment(image: &mut RgbImage, start: Point, end: Point, color: Rgb<u8>) {
    draw_line_segment_mut(
        image,
        (start.x as f32, start.y as f32),
        (end.x as f32, end.y as f32),
        color,
    );
}

fn to_pixel_rect(rect: &Rect) -> Option<PixelRect> {
    let width = rect.width.round();
    let height = rect.height.round();
    if !(width >= 1.0 && height >= 1.0 && rect.x.is_finite() && rect.y.is_finite()) {
        return None;
    }
    Some(
        PixelRect::at(rect.x.round() as i32, rect.y.round() as i32)
            .of_size(width as u32, height as u32),
    )
}
