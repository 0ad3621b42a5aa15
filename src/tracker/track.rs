//! A single tracked vehicle.

use crate::geometry::Point;
use crate::tracker::kalman_filter::{KalmanFilter, StateCovariance, StateVector};
use crate::tracker::matching::Detection;
use crate::tracker::rect::Rect;

/// State of one tracked object. Owned by the [`Tracker`](crate::Tracker).
#[derive(Debug, Clone)]
pub struct Track {
    id: u64,
    /// Observed box on matched frames, filter prediction on missed ones
    rect: Rect,
    label: Option<String>,
    mean: StateVector,
    covariance: StateCovariance,
    /// Matched observations, the seeding detection included
    hits: u32,
    /// Consecutive frames without a match
    misses: u32,
    /// Last computed speed, kept until the track dies
    speed: Option<f64>,
}

impl Track {
    pub(crate) fn new(id: u64, detection: &Detection, kalman_filter: &KalmanFilter) -> Self {
        let (mean, covariance) = kalman_filter.initiate(detection.bbox.to_xyah());
        Self {
            id,
            rect: detection.bbox,
            label: detection.label.clone(),
            mean,
            covariance,
            hits: 1,
            misses: 0,
            speed: None,
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current best-estimate box.
    #[inline]
    pub fn rect(&self) -> Rect {
        self.rect
    }

    #[inline]
    pub fn centroid(&self) -> Point {
        self.rect.centroid()
    }

    /// Box implied by the motion filter state.
    pub fn predicted_rect(&self) -> Rect {
        Rect::from_xyah(self.mean[0], self.mean[1], self.mean[2], self.mean[3])
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    #[inline]
    pub fn hits(&self) -> u32 {
        self.hits
    }

    #[inline]
    pub fn misses(&self) -> u32 {
        self.misses
    }

    /// True when the current box is a prediction rather than an observation.
    #[inline]
    pub fn is_coasting(&self) -> bool {
        self.misses > 0
    }

    #[inline]
    pub fn speed(&self) -> Option<f64> {
        self.speed
    }

    pub fn set_speed(&mut self, speed_kmph: f64) {
        self.speed = Some(speed_kmph);
    }

    /// Advance the motion filter by one frame.
    pub(crate) fn predict(&mut self, kalman_filter: &KalmanFilter) {
        let (mean, covariance) = kalman_filter.predict(&self.mean, &self.covariance);
        self.mean = mean;
        self.covariance = covariance;
    }

    pub(crate) fn update(&mut self, detection: &Detection, kalman_filter: &KalmanFilter) {
        let measurement = detection.bbox.to_xyah();
        (self.mean, self.covariance) = kalman_filter
            .update(&self.mean, &self.covariance, measurement)
            .unwrap_or_else(|| kalman_filter.initiate(measurement));

        self.rect = detection.bbox;
        if detection.label.is_some() {
            self.label.clone_from(&detection.label);
        }
        self.hits += 1;
        self.misses = 0;
    }

    pub(crate) fn mark_missed(&mut self) {
        self.misses += 1;
        self.rect = self.predicted_rect();
    }
}
