//! Detector seam and vehicle-class filtering.

use image::RgbImage;

use crate::tracker::Detection;

/// One decoded video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in the stream, starting at 0
    pub index: u64,
    /// Stream time in seconds, `index / fps`
    pub timestamp: f64,
    pub image: RgbImage,
}

/// Trait for object detection backends.
///
/// Implement this to plug a model into [`SpeedPipeline`](super::SpeedPipeline).
/// Called once per frame, synchronously; an error ends the run.
///
/// # Example
///
/// ```ignore
/// use speedtrack::{Detection, Detector, Frame};
///
/// struct MyYolo { /* session, class names */ }
///
/// impl Detector for MyYolo {
///     type Error = std::io::Error;
///
///     fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Self::Error> {
///         // run inference on frame.image
///         Ok(vec![Detection::new(10.0, 20.0, 60.0, 80.0).with_label("car")])
///     }
/// }
/// ```
pub trait Detector {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Detect objects in `frame`. Must not modify the frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Self::Error>;
}

impl<D: Detector + ?Sized> Detector for &mut D {
    type Error = D::Error;

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Self::Error> {
        (**self).detect(frame)
    }
}

/// Class allow-list applied to detector output before tracking.
///
/// Labels compare case-insensitively. Unlabeled detections pass, on the
/// assumption that the detector already filtered them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleFilter {
    classes: Vec<String>,
}

impl VehicleFilter {
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classes: classes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, detection: &Detection) -> bool {
        match &detection.label {
            Some(label) => self.classes.iter().any(|c| c.eq_ignore_ascii_case(label)),
            None => true,
        }
    }

    pub fn apply(&self, detections: Vec<Detection>) -> Vec<Detection> {
        detections.into_iter().filter(|d| self.allows(d)).collect()
    }
}
