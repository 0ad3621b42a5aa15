//! Detection input and track-to-detection assignment.

use ndarray::Array2;
use tracing::warn;

use crate::tracker::rect::Rect;

/// Detection input for the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: Rect,
    /// Class label reported by the detector, if any
    pub label: Option<String>,
}

impl Detection {
    /// Create an unlabeled detection from corner coordinates (x1, y1, x2, y2).
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self::from_rect(Rect::from_tlbr(x1, y1, x2, y2))
    }

    pub fn from_rect(bbox: Rect) -> Self {
        Self {
            bbox,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// IoU between every track box (rows) and every detection box (columns).
pub fn iou_matrix(track_boxes: &[Rect], det_boxes: &[Rect]) -> Array2<f64> {
    let mut ious = Array2::zeros((track_boxes.len(), det_boxes.len()));
    for (i, t) in track_boxes.iter().enumerate() {
        for (j, d) in det_boxes.iter().enumerate() {
            ious[[i, j]] = t.iou(d);
        }
    }
    ious
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentResult {
    /// `(track index, detection index)` pairs
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

impl AssignmentResult {
    fn from_matches(matches: Vec<(usize, usize)>, num_tracks: usize, num_dets: usize) -> Self {
        let mut track_used = vec![false; num_tracks];
        let mut det_used = vec![false; num_dets];
        for &(t, d) in &matches {
            track_used[t] = true;
            det_used[d] = true;
        }

        let unused = |used: Vec<bool>| -> Vec<usize> {
            used.iter()
                .enumerate()
                .filter_map(|(i, &u)| if u { None } else { Some(i) })
                .collect()
        };

        Self {
            matches,
            unmatched_tracks: unused(track_used),
            unmatched_detections: unused(det_used),
        }
    }
}

/// First-match-wins greedy association.
///
/// Detections are visited in column order; each takes the first still-free
/// track (in row order) whose IoU is strictly above `thresh`.
pub fn greedy_assignment(ious: &Array2<f64>, thresh: f64) -> AssignmentResult {
    let (num_tracks, num_dets) = ious.dim();
    let mut track_taken = vec![false; num_tracks];
    let mut matches = Vec::new();

    for det in 0..num_dets {
        let first_free = (0..num_tracks).find(|&t| !track_taken[t] && ious[[t, det]] > thresh);
        if let Some(track) = first_free {
            track_taken[track] = true;
            matches.push((track, det));
        }
    }

    AssignmentResult::from_matches(matches, num_tracks, num_dets)
}

/// Globally optimal association on `1 - IoU` costs (Jonker-Volgenant).
///
/// Pairs whose IoU is not above `thresh` are rejected after solving.
pub fn optimal_assignment(ious: &Array2<f64>, thresh: f64) -> AssignmentResult {
    let (num_tracks, num_dets) = ious.dim();
    if num_tracks == 0 || num_dets == 0 {
        return AssignmentResult::from_matches(Vec::new(), num_tracks, num_dets);
    }

    let size = num_tracks.max(num_dets);
    let mut padded = Array2::<f64>::from_elem((size, size), 1e6);
    for i in 0..num_tracks {
        for j in 0..num_dets {
            padded[[i, j]] = 1.0 - ious[[i, j]];
        }
    }

    let matches = match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => row_to_col
            .iter()
            .enumerate()
            .filter(|&(row, &col)| row < num_tracks && col < num_dets && ious[[row, col]] > thresh)
            .map(|(row, &col)| (row, col))
            .collect(),
        Err(err) => {
            warn!(?err, num_tracks, num_dets, "linear assignment failed, leaving frame unmatched");
            Vec::new()
        }
    };

    AssignmentResult::from_matches(matches, num_tracks, num_dets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_iou_matrix_shape() {
        let tracks = [Rect::new(0.0, 0.0, 10.0, 10.0)];
        let dets = [Rect::new(0.0, 0.0, 10.0, 10.0), Rect::new(50.0, 50.0, 10.0, 10.0)];
        let ious = iou_matrix(&tracks, &dets);
        assert_eq!(ious.dim(), (1, 2));
        assert_eq!(ious[[0, 0]], 1.0);
        assert_eq!(ious[[0, 1]], 0.0);
    }

    #[test]
    fn test_greedy_takes_first_track_above_threshold() {
        // Both tracks overlap detection 0; track 0 comes first even though
        // track 1 is the better fit.
        let ious = array![[0.4, 0.0], [0.9, 0.5]];
        let result = greedy_assignment(&ious, 0.3);
        assert_eq!(result.matches, vec![(0, 0), (1, 1)]);
        assert!(result.unmatched_tracks.is_empty());
        assert!(result.unmatched_detections.is_empty());
    }

    #[test]
    fn test_greedy_never_reuses_a_track() {
        let ious = array![[0.8, 0.7]];
        let result = greedy_assignment(&ious, 0.3);
        assert_eq!(result.matches, vec![(0, 0)]);
        assert_eq!(result.unmatched_detections, vec![1]);
    }

    #[test]
    fn test_threshold_is_strict() {
        let ious = array![[0.3]];
        let result = greedy_assignment(&ious, 0.3);
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_tracks, vec![0]);
        assert_eq!(result.unmatched_detections, vec![0]);
    }

    #[test]
    fn test_optimal_beats_greedy_on_crossed_pairs() {
        // Greedy hands detection 0 to track 0 and strands detection 1.
        let ious = array![[0.5, 0.9], [0.6, 0.0]];
        let greedy = greedy_assignment(&ious, 0.3);
        assert_eq!(greedy.matches, vec![(0, 0)]);

        let optimal = optimal_assignment(&ious, 0.3);
        let mut matches = optimal.matches.clone();
        matches.sort();
        assert_eq!(matches, vec![(0, 1), (1, 0)]);
        assert!(optimal.unmatched_detections.is_empty());
    }

    #[test]
    fn test_optimal_handles_empty_sides() {
        let ious = Array2::<f64>::zeros((0, 3));
        let result = optimal_assignment(&ious, 0.3);
        assert_eq!(result.unmatched_detections, vec![0, 1, 2]);

        let ious = Array2::<f64>::zeros((2, 0));
        let result = optimal_assignment(&ious, 0.3);
        assert_eq!(result.unmatched_tracks, vec![0, 1]);
    }

    #[test]
    fn test_detection_builders() {
        let det = Detection::new(1.0, 2.0, 11.0, 22.0).with_label("car");
        assert_eq!(det.bbox, Rect::new(1.0, 2.0, 10.0, 20.0));
        assert_eq!(det.label.as_deref(), Some("car"));
    }
}
