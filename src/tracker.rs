mod iou_tracker;
mod kalman_filter;
mod matching;
mod rect;
mod track;

pub use iou_tracker::{Assignment, Tracker, TrackerConfig};
pub use matching::{AssignmentResult, Detection, greedy_assignment, iou_matrix, optimal_assignment};
pub use rect::Rect;
pub use track::Track;
