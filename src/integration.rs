//! Integration module for running the tracker and speed estimator over video.
//!
//! This module provides the seams to the outside world (detector, video
//! source, record sink), the frame overlay, and the [`SpeedPipeline`] that
//! drives one run end to end.

mod annotate;
mod detector;
mod pipeline;
mod replay;
mod sink;
mod source;

pub use annotate::{LabelFont, Overlay, TrackOverlay, draw_overlay};
pub use detector::{Detector, Frame, VehicleFilter};
pub use pipeline::{FrameReport, PipelineOptions, ProcessedFrame, RunState, SpeedPipeline};
pub use replay::{DetectionLog, parse_frame};
pub use sink::{CsvSink, MemorySink, RecordSink, SpeedRecord};
pub use source::{MemorySource, StreamInfo, VideoSource};
