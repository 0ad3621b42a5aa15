//! Line-crossing timekeeping and speed computation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

const MS_TO_KMH: f64 = 3.6;

/// Screen direction traffic is expected to move in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelDirection {
    /// Increasing y (towards the bottom of the frame)
    #[default]
    Down,
    /// Decreasing y
    Up,
}

impl TravelDirection {
    /// Whether a centroid at `y` has reached a line at `line_y`.
    #[inline]
    pub fn has_reached(self, y: f64, line_y: f64) -> bool {
        match self {
            Self::Down => y >= line_y,
            Self::Up => y <= line_y,
        }
    }

    /// Whether `second` lies strictly after `first` along this direction.
    #[inline]
    pub fn is_ordered(self, first: f64, second: f64) -> bool {
        match self {
            Self::Down => second > first,
            Self::Up => second < first,
        }
    }
}

/// Crossing timestamps for one track.
///
/// `t1` and `t2` are each written at most once, and `t2` only after `t1`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CrossingRecord {
    t1: Option<f64>,
    t2: Option<f64>,
    last_y: Option<f64>,
}

impl CrossingRecord {
    pub fn first_crossing(&self) -> Option<f64> {
        self.t1
    }

    pub fn second_crossing(&self) -> Option<f64> {
        self.t2
    }

    /// Both lines crossed. No further speed can come out of this record.
    pub fn is_complete(&self) -> bool {
        self.t2.is_some()
    }
}

/// Converts two line-crossing timestamps per track into a speed.
#[derive(Debug, Clone)]
pub struct SpeedEstimator {
    real_world_distance_m: f64,
    direction: TravelDirection,
    crossings: HashMap<u64, CrossingRecord>,
}

impl SpeedEstimator {
    pub fn new(real_world_distance_m: f64) -> Self {
        Self {
            real_world_distance_m,
            direction: TravelDirection::default(),
            crossings: HashMap::new(),
        }
    }

    pub fn with_direction(mut self, direction: TravelDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn real_world_distance_m(&self) -> f64 {
        self.real_world_distance_m
    }

    pub fn direction(&self) -> TravelDirection {
        self.direction
    }

    /// Feed one observation of a track and return its speed in km/h the
    /// single time the second line is crossed.
    ///
    /// Line 1 counts as crossed as soon as `y_center` has reached it. Line 2
    /// additionally requires the previous observation of the same track to be
    /// short of it, so tracks that show up already past both lines, or move
    /// against `direction`, never produce a speed. When the lines are not
    /// ordered along `direction` nothing is ever recorded.
    ///
    /// A non-positive interval between the crossings yields `None` and
    /// retires the record for good.
    pub fn update_and_get_speed(
        &mut self,
        track_id: u64,
        y_center: f64,
        timestamp: f64,
        line1_y: f64,
        line2_y: f64,
    ) -> Option<f64> {
        let direction = self.direction;
        if !direction.is_ordered(line1_y, line2_y) {
            return None;
        }

        let record = self.crossings.entry(track_id).or_default();
        let previous_y = record.last_y.replace(y_center);

        match (record.t1, record.t2) {
            (None, _) => {
                if direction.has_reached(y_center, line1_y) {
                    record.t1 = Some(timestamp);
                }
                None
            }
            (Some(t1), None) => {
                let already_past = previous_y.is_some_and(|y| direction.has_reached(y, line2_y));
                if already_past || !direction.has_reached(y_center, line2_y) {
                    return None;
                }
                record.t2 = Some(timestamp);

                let dt = timestamp - t1;
                (dt > 0.0).then(|| round_tenth(self.real_world_distance_m / dt * MS_TO_KMH))
            }
            (Some(_), Some(_)) => None,
        }
    }

    pub fn record(&self, track_id: u64) -> Option<&CrossingRecord> {
        self.crossings.get(&track_id)
    }

    /// Drop the record of a track that will never be seen again.
    pub fn forget(&mut self, track_id: u64) -> Option<CrossingRecord> {
        self.crossings.remove(&track_id)
    }

    /// Keep only the records whose track id satisfies `live`.
    pub fn retain_tracks(&mut self, mut live: impl FnMut(u64) -> bool) {
        self.crossings.retain(|&id, _| live(id));
    }

    pub fn len(&self) -> usize {
        self.crossings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crossings.is_empty()
    }

    pub fn clear(&mut self) {
        self.crossings.clear();
    }
}

/// Round to one decimal using the exact binary value, ties to even.
///
/// Scaling by 10 first would round the product, turning 0.15 (stored just
/// below 0.15) into 0.2.
fn round_tenth(value: f64) -> f64 {
    format!("{value:.1}").parse().unwrap_or(value)
}
