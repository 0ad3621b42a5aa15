use crate::geometry::Point;

/// Axis-aligned bounding box in pixel coordinates.
///
/// Stored as top-left corner plus size. Conversions cover the two other
/// formats the tracker deals with:
/// - TLBR: x1, y1, x2, y2 (what detectors emit)
/// - XYAH: center x, center y, aspect ratio (w/h), height (Kalman measurement space)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    /// Top-left x coordinate
    pub x: f64,
    /// Top-left y coordinate
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[inline]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a Rect from corner coordinates (x1, y1, x2, y2).
    #[inline]
    pub fn from_tlbr(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        }
    }

    /// Create a Rect from XYAH format (center x, center y, aspect ratio, height).
    #[inline]
    pub fn from_xyah(cx: f64, cy: f64, aspect_ratio: f64, height: f64) -> Self {
        let width = aspect_ratio * height;
        Self {
            x: cx - width / 2.0,
            y: cy - height / 2.0,
            width,
            height,
        }
    }

    #[inline]
    pub fn to_tlbr(&self) -> [f64; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }

    /// Convert to XYAH. A zero-height box reports an aspect ratio of 0.
    #[inline]
    pub fn to_xyah(&self) -> [f64; 4] {
        let Point { x: cx, y: cy } = self.centroid();
        let aspect_ratio = if self.height > 0.0 {
            self.width / self.height
        } else {
            0.0
        };
        [cx, cy, aspect_ratio, self.height]
    }

    /// Center of the box, `((x1 + x2) / 2, (y1 + y2) / 2)`.
    #[inline]
    pub fn centroid(&self) -> Point {
        let [x1, y1, x2, y2] = self.to_tlbr();
        Point::new((x1 + x2) / 2.0, (y1 + y2) / 2.0)
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// True when the box has positive extent on both axes.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// Intersection over Union with another box.
    ///
    /// Disjoint boxes give 0. A non-positive union (degenerate boxes) also
    /// gives 0 instead of dividing by zero.
    pub fn iou(&self, other: &Rect) -> f64 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union_area = self.area() + other.area() - inter_area;

        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }
}
