//! IoU association tracker.

use tracing::{debug, trace};

use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::matching::{self, AssignmentResult, Detection};
use crate::tracker::rect::Rect;
use crate::tracker::track::Track;

/// How detections are assigned to live tracks each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Assignment {
    /// Each detection, in input order, takes the first free track above the
    /// IoU threshold. Cheap and reproducible, not globally optimal.
    #[default]
    Greedy,
    /// Minimum total `1 - IoU` cost over all pairs.
    Optimal,
}

/// Configuration for the [`Tracker`].
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// A pair is only associated when IoU is strictly above this
    pub iou_threshold: f64,
    /// Consecutive unmatched frames a track survives. 0 drops a track on its
    /// first miss.
    pub max_misses: u32,
    /// Match against the motion-filter prediction instead of the last box
    pub predict: bool,
    pub assignment: Assignment,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            max_misses: 0,
            predict: false,
            assignment: Assignment::Greedy,
        }
    }
}

/// Turns per-frame detections into tracks with stable ids.
///
/// Ids come from a counter owned by this instance: they start at 0, increase
/// strictly, and are never handed out twice.
pub struct Tracker {
    tracks: Vec<Track>,
    next_id: u64,
    frame_count: u64,
    config: TrackerConfig,
    kalman_filter: KalmanFilter,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 0,
            frame_count: 0,
            config,
            kalman_filter: KalmanFilter::default(),
        }
    }

    /// Associate one frame of detections and return the live tracks.
    ///
    /// The returned slice is ordered by ascending id. Tracks that matched carry
    /// the observed box; tracks coasting through a miss carry the predicted box.
    pub fn update(&mut self, detections: Vec<Detection>) -> &mut [Track] {
        self.frame_count += 1;

        for track in self.tracks.iter_mut() {
            track.predict(&self.kalman_filter);
        }

        let predict = self.config.predict;
        let track_rects: Vec<Rect> = self
            .tracks
            .iter()
            .map(|t| if predict { t.predicted_rect() } else { t.rect() })
            .collect();
        let det_rects: Vec<Rect> = detections.iter().map(|d| d.bbox).collect();
        let ious = matching::iou_matrix(&track_rects, &det_rects);

        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = match self.config.assignment {
            Assignment::Greedy => matching::greedy_assignment(&ious, self.config.iou_threshold),
            Assignment::Optimal => matching::optimal_assignment(&ious, self.config.iou_threshold),
        };

        for &(itrack, idet) in &matches {
            self.tracks[itrack].update(&detections[idet], &self.kalman_filter);
        }
        for &itrack in &unmatched_tracks {
            self.tracks[itrack].mark_missed();
        }

        let max_misses = self.config.max_misses;
        let frame = self.frame_count;
        self.tracks.retain(|t| {
            let alive = t.misses() <= max_misses;
            if !alive {
                debug!(frame, track_id = t.id(), hits = t.hits(), "track retired");
            }
            alive
        });

        for &idet in &unmatched_detections {
            let id = self.next_id;
            self.next_id += 1;
            trace!(frame, track_id = id, "track born");
            self.tracks
                .push(Track::new(id, &detections[idet], &self.kalman_filter));
        }

        debug!(
            frame,
            detections = detections.len(),
            matched = matches.len(),
            live = self.tracks.len(),
            "tracker updated"
        );

        &mut self.tracks
    }

    /// Live tracks as of the last [`update`](Self::update).
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Number of `update` calls so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Drop every live track. The id counter keeps running so ids stay unique
    /// for the lifetime of this instance.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.frame_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(tracks: &[Track]) -> Vec<u64> {
        tracks.iter().map(|t| t.id()).collect()
    }

    #[test]
    fn test_ids_follow_input_order() {
        let mut tracker = Tracker::default();
        let tracks = tracker.update(vec![
            Detection::new(0.0, 0.0, 10.0, 10.0),
            Detection::new(100.0, 100.0, 110.0, 110.0),
        ]);
        assert_eq!(ids(tracks), vec![0, 1]);
        assert!(tracks.iter().all(|t| t.hits() == 1));
    }

    #[test]
    fn test_strict_policy_drops_unmatched() {
        let mut tracker = Tracker::default();
        tracker.update(vec![Detection::new(0.0, 0.0, 10.0, 10.0)]);
        let tracks = tracker.update(vec![]);
        assert!(tracks.is_empty());

        // reappearing in the same place is a new identity
        let tracks = tracker.update(vec![Detection::new(0.0, 0.0, 10.0, 10.0)]);
        assert_eq!(ids(tracks), vec![1]);
    }

    #[test]
    fn test_tolerance_coasts_on_prediction() {
        let mut tracker = Tracker::new(TrackerConfig {
            max_misses: 2,
            ..TrackerConfig::default()
        });

        for step in 0..6 {
            let dy = 5.0 * step as f64;
            tracker.update(vec![Detection::new(0.0, dy, 50.0, 50.0 + dy)]);
        }
        let observed = tracker.tracks()[0].rect();

        let tracks = tracker.update(vec![]);
        assert_eq!(tracks.len(), 1);
        assert!(tracks[0].is_coasting());
        assert_eq!(tracks[0].rect(), tracks[0].predicted_rect());
        assert!(tracks[0].rect().y > observed.y);

        // a detection near the predicted position picks the track back up
        let tracks = tracker.update(vec![Detection::new(0.0, 35.0, 50.0, 85.0)]);
        assert_eq!(ids(tracks), vec![0]);
        assert_eq!(tracks[0].misses(), 0);
        assert_eq!(tracks[0].hits(), 7);
    }

    #[test]
    fn test_tolerance_retires_after_max_misses() {
        let mut tracker = Tracker::new(TrackerConfig {
            max_misses: 2,
            ..TrackerConfig::default()
        });
        tracker.update(vec![Detection::new(0.0, 0.0, 10.0, 10.0)]);
        assert_eq!(tracker.update(vec![]).len(), 1);
        assert_eq!(tracker.update(vec![]).len(), 1);
        assert!(tracker.update(vec![]).is_empty());
    }

    #[test]
    fn test_optimal_assignment_keeps_identities() {
        // Track 0 is wide, track 1 narrow. In the next frame the first
        // detection overlaps both; greedy would hand it to track 0.
        let frame1 = vec![
            Detection::new(0.0, 0.0, 100.0, 50.0),
            Detection::new(60.0, 0.0, 100.0, 50.0),
        ];
        let frame2 = vec![
            Detection::new(60.0, 0.0, 100.0, 50.0),
            Detection::new(0.0, 0.0, 90.0, 50.0),
        ];

        let mut greedy = Tracker::default();
        greedy.update(frame1.clone());
        let tracks = greedy.update(frame2.clone());
        assert_eq!(tracks[0].id(), 0);
        assert_eq!(tracks[0].rect(), frame2[0].bbox);

        let mut optimal = Tracker::new(TrackerConfig {
            assignment: Assignment::Optimal,
            ..TrackerConfig::default()
        });
        optimal.update(frame1);
        let tracks = optimal.update(frame2.clone());
        assert_eq!(ids(tracks), vec![0, 1]);
        assert_eq!(tracks[0].rect(), frame2[1].bbox);
        assert_eq!(tracks[1].rect(), frame2[0].bbox);
    }

    #[test]
    fn test_reset_keeps_id_counter() {
        let mut tracker = Tracker::default();
        tracker.update(vec![Detection::new(0.0, 0.0, 10.0, 10.0)]);
        tracker.reset();
        assert!(tracker.tracks().is_empty());
        let tracks = tracker.update(vec![Detection::new(0.0, 0.0, 10.0, 10.0)]);
        assert_eq!(ids(tracks), vec![1]);
    }

    #[test]
    fn test_degenerate_detection_becomes_new_track() {
        let mut tracker = Tracker::default();
        tracker.update(vec![Detection::new(0.0, 0.0, 10.0, 10.0)]);
        let tracks = tracker.update(vec![
            Detection::new(0.0, 0.0, 10.0, 10.0),
            Detection::new(5.0, 5.0, 5.0, 5.0),
        ]);
        assert_eq!(ids(tracks), vec![0, 1]);
    }
}
