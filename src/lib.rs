//! Vehicle speed estimation from per-frame detections.
//!
//! Detections are associated into tracks by IoU ([`Tracker`]), each track's
//! centroid is gated by a region of interest, and the time it takes to travel
//! between two virtual lines is turned into a speed ([`SpeedEstimator`]).
//! [`SpeedPipeline`] wires the pieces together for one video run.

pub mod config;
pub mod error;
pub mod geometry;
pub mod integration;
pub mod speed;
pub mod tracker;

pub use config::SceneConfig;
pub use error::{ConfigError, PipelineError, ReplayError, SinkError};
pub use geometry::{Line, Point, point_in_polygon};
pub use integration::{
    CsvSink, DetectionLog, Detector, Frame, FrameReport, LabelFont, MemorySink, MemorySource,
    Overlay, PipelineOptions, ProcessedFrame, RecordSink, RunState, SpeedPipeline, SpeedRecord,
    StreamInfo, TrackOverlay, VehicleFilter, VideoSource,
};
pub use speed::{CrossingRecord, SpeedEstimator, TravelDirection};
pub use tracker::{Assignment, Detection, Rect, Track, Tracker, TrackerConfig};
