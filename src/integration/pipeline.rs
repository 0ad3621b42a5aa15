//! SpeedPipeline: detection, tracking and speed estimation for one video run.

use std::collections::HashSet;

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::config::SceneConfig;
use crate::error::PipelineError;
use crate::geometry::point_in_polygon;
use crate::speed::SpeedEstimator;
use crate::tracker::{Detection, Tracker, TrackerConfig};

use super::annotate::{LabelFont, Overlay, TrackOverlay, draw_overlay};
use super::detector::{Detector, Frame, VehicleFilter};
use super::sink::{RecordSink, SpeedRecord};
use super::source::VideoSource;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Configured, no frame seen yet
    Init,
    Streaming,
    /// Records flushed; the pipeline accepts no more frames
    Drained,
}

/// Runtime knobs that are not part of the scene.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub tracker: TrackerConfig,
    /// Rasterize the overlay onto each processed frame
    pub render: bool,
    /// Font for id and speed labels; boxes are drawn unlabeled without one
    pub labels: Option<LabelFont>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            render: true,
            labels: None,
        }
    }
}

/// What one frame produced.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub frame_index: u64,
    pub timestamp: f64,
    pub overlay: Overlay,
    /// Speeds resolved on this frame, at most one per track for its lifetime
    pub new_records: Vec<SpeedRecord>,
}

/// An annotated frame together with its report.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub frame: Frame,
    pub report: FrameReport,
}

/// Per-run orchestration of tracker and speed estimator.
///
/// Both are created in [`new`](Self::new) and live exactly as long as the run,
/// so a new run always starts from empty track and crossing state. The
/// detector and the video source are passed in by the caller.
///
/// # Example
///
/// ```ignore
/// let scene = SceneConfig::load("scene.json")?;
/// let mut pipeline = SpeedPipeline::new(scene, source.info().fps, PipelineOptions::default())?;
/// let (mut sink, _) = CsvSink::create_in("outputs", &pipeline.scene().video_name)?;
/// let records = pipeline.run(&mut detector, &mut source, &mut sink, |processed| {
///     display.show(&processed.frame.image);
/// })?;
/// ```
pub struct SpeedPipeline {
    scene: SceneConfig,
    fps: f64,
    render: bool,
    labels: Option<LabelFont>,
    filter: VehicleFilter,
    tracker: Tracker,
    estimator: SpeedEstimator,
    line1_y: f64,
    line2_y: f64,
    records: Vec<SpeedRecord>,
    next_frame: u64,
    state: RunState,
}

impl SpeedPipeline {
    pub fn new(scene: SceneConfig, fps: f64, options: PipelineOptions) -> Result<Self, PipelineError> {
        scene.validate()?;
        if !(fps.is_finite() && fps > 0.0) {
            return Err(PipelineError::InvalidFrameRate(fps));
        }
        if !scene.lines_ordered() {
            warn!(
                video = %scene.video_name,
                line1_y = scene.line1_y(),
                line2_y = scene.line2_y(),
                direction = ?scene.direction,
                "line 2 does not follow line 1 in the travel direction, no speed will be measured"
            );
        }

        info!(
            video = %scene.video_name,
            fps,
            distance_m = scene.real_world_distance_m,
            "speed pipeline initialized"
        );

        Ok(Self {
            filter: VehicleFilter::new(scene.vehicle_classes.iter().cloned()),
            tracker: Tracker::new(options.tracker),
            estimator: SpeedEstimator::new(scene.real_world_distance_m)
                .with_direction(scene.direction),
            line1_y: scene.line1_y(),
            line2_y: scene.line2_y(),
            scene,
            fps,
            render: options.render,
            labels: options.labels,
            records: Vec::new(),
            next_frame: 0,
            state: RunState::Init,
        })
    }

    /// Build a pipeline using the frame rate reported by `source`.
    pub fn for_source<V: VideoSource>(
        scene: SceneConfig,
        source: &V,
        options: PipelineOptions,
    ) -> Result<Self, PipelineError> {
        Self::new(scene, source.info().fps, options)
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn scene(&self) -> &SceneConfig {
        &self.scene
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Records accumulated so far in this run.
    pub fn records(&self) -> &[SpeedRecord] {
        &self.records
    }

    /// Index the next frame will get.
    pub fn next_frame_index(&self) -> u64 {
        self.next_frame
    }

    /// Run the detector on `image` and process the result as the next frame.
    ///
    /// A detector error is fatal for the run and is returned as is; the frame
    /// counter does not advance.
    pub fn process_frame<D: Detector>(
        &mut self,
        detector: &mut D,
        image: RgbImage,
    ) -> Result<ProcessedFrame, PipelineError> {
        self.ensure_open()?;

        let mut frame = Frame {
            index: self.next_frame,
            timestamp: self.timestamp_of(self.next_frame),
            image,
        };
        let detections = detector
            .detect(&frame)
            .map_err(|err| PipelineError::Detector {
                frame: frame.index,
                source: Box::new(err),
            })?;

        let report = self.observe(detections)?;
        if self.render {
            draw_overlay(&mut frame.image, &report.overlay, self.labels.as_ref());
        }
        Ok(ProcessedFrame { frame, report })
    }

    /// Process already-detected boxes as the next frame.
    pub fn observe(&mut self, detections: Vec<Detection>) -> Result<FrameReport, PipelineError> {
        self.ensure_open()?;
        self.state = RunState::Streaming;

        let frame_index = self.next_frame;
        let timestamp = self.timestamp_of(frame_index);
        self.next_frame += 1;

        let detections = self.filter.apply(detections);
        let tracks = self.tracker.update(detections);

        let mut overlay_tracks = Vec::new();
        let mut new_records = Vec::new();
        for track in tracks.iter_mut() {
            let centroid = track.centroid();
            if !point_in_polygon(centroid, &self.scene.polygon_roi) {
                continue;
            }

            if let Some(speed_kmph) = self.estimator.update_and_get_speed(
                track.id(),
                centroid.y,
                timestamp,
                self.line1_y,
                self.line2_y,
            ) {
                track.set_speed(speed_kmph);
                info!(
                    video = %self.scene.video_name,
                    track_id = track.id(),
                    speed_kmph,
                    frame = frame_index,
                    "speed measured"
                );
                new_records.push(SpeedRecord {
                    video: self.scene.video_name.clone(),
                    track_id: track.id(),
                    speed_kmph,
                    timestamp,
                    frame: frame_index,
                });
            }

            overlay_tracks.push(TrackOverlay::from_track(track));
        }

        let live: HashSet<u64> = tracks.iter().map(|t| t.id()).collect();
        self.estimator.retain_tracks(|id| live.contains(&id));

        debug!(
            frame = frame_index,
            live_tracks = live.len(),
            in_roi = overlay_tracks.len(),
            "frame processed"
        );

        self.records.extend(new_records.iter().cloned());
        Ok(FrameReport {
            frame_index,
            timestamp,
            overlay: Overlay {
                roi: self.scene.polygon_roi.clone(),
                lines: [self.scene.line_1, self.scene.line_2],
                tracks: overlay_tracks,
            },
            new_records,
        })
    }

    /// Process every frame of `source`, then drain into `sink`.
    ///
    /// A source read error ends the stream like a normal end of stream; the
    /// records collected up to that point are still written.
    pub fn run<D, V, S, F>(
        &mut self,
        detector: &mut D,
        source: &mut V,
        sink: &mut S,
        mut on_frame: F,
    ) -> Result<Vec<SpeedRecord>, PipelineError>
    where
        D: Detector,
        V: VideoSource,
        S: RecordSink + ?Sized,
        F: FnMut(&ProcessedFrame),
    {
        loop {
            let image = match source.next_frame() {
                Ok(Some(image)) => image,
                Ok(None) => break,
                Err(err) => {
                    warn!(
                        video = %self.scene.video_name,
                        frame = self.next_frame,
                        error = %err,
                        "video source failed, ending stream"
                    );
                    break;
                }
            };
            let processed = self.process_frame(detector, image)?;
            on_frame(&processed);
        }
        self.drain(sink)
    }

    /// Write every record of the run to `sink` and close the run.
    ///
    /// If the sink fails the run stays open so the records can be drained
    /// into another sink.
    pub fn drain<S: RecordSink + ?Sized>(
        &mut self,
        sink: &mut S,
    ) -> Result<Vec<SpeedRecord>, PipelineError> {
        self.ensure_open()?;
        sink.write_records(&self.records)?;

        info!(
            video = %self.scene.video_name,
            frames = self.next_frame,
            records = self.records.len(),
            "run drained"
        );

        self.state = RunState::Drained;
        self.tracker.reset();
        self.estimator.clear();
        Ok(std::mem::take(&mut self.records))
    }

    fn ensure_open(&self) -> Result<(), PipelineError> {
        match self.state {
            RunState::Drained => Err(PipelineError::Drained),
            RunState::Init | RunState::Streaming => Ok(()),
        }
    }

    #[inline]
    fn timestamp_of(&self, frame_index: u64) -> f64 {
        frame_index as f64 / self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Line, Point};
    use crate::error::SinkError;
    use crate::integration::annotate::LabelFont;
    use crate::integration::sink::MemorySink;
    use crate::integration::source::{MemorySource, StreamInfo};
    use crate::speed::TravelDirection;

    fn scene() -> SceneConfig {
        SceneConfig {
            video_name: "unit".into(),
            polygon_roi: vec![
                Point::new(0.0, 0.0),
                Point::new(200.0, 0.0),
                Point::new(200.0, 200.0),
                Point::new(0.0, 200.0),
            ],
            line_1: Line::horizontal(50.0, 0.0, 200.0),
            line_2: Line::horizontal(150.0, 0.0, 200.0),
            real_world_distance_m: 10.0,
            direction: TravelDirection::Down,
            vehicle_classes: vec!["car".into()],
        }
    }

    /// 20x20 box centered at (cx, cy)
    fn car_at(cx: f64, cy: f64) -> Detection {
        Detection::new(cx - 10.0, cy - 10.0, cx + 10.0, cy + 10.0).with_label("car")
    }

    struct Scripted {
        frames: Vec<Vec<Detection>>,
        calls: usize,
    }

    impl Detector for Scripted {
        type Error = std::io::Error;

        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, Self::Error> {
            let dets = self.frames.get(self.calls).cloned().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "script exhausted")
            })?;
            self.calls += 1;
            Ok(dets)
        }
    }

    #[test]
    fn test_rejects_bad_frame_rate() {
        assert!(matches!(
            SpeedPipeline::new(scene(), 0.0, PipelineOptions::default()),
            Err(PipelineError::InvalidFrameRate(_))
        ));
        assert!(matches!(
            SpeedPipeline::new(scene(), f64::NAN, PipelineOptions::default()),
            Err(PipelineError::InvalidFrameRate(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_scene() {
        let mut bad = scene();
        bad.polygon_roi.truncate(2);
        assert!(matches!(
            SpeedPipeline::new(bad, 10.0, PipelineOptions::default()),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_measures_speed_once_and_keeps_it_sticky() {
        let mut pipeline = SpeedPipeline::new(scene(), 10.0, PipelineOptions::default()).unwrap();
        assert_eq!(pipeline.state(), RunState::Init);

        // 10 px per frame: line 1 at frame 5 (t=0.5), line 2 at frame 15 (t=1.5)
        let mut records = Vec::new();
        let mut last = None;
        for frame in 0..19 {
            let report = pipeline.observe(vec![car_at(100.0, frame as f64 * 10.0)]).unwrap();
            records.extend(report.new_records);
            last = Some(report.overlay);
        }
        assert_eq!(pipeline.state(), RunState::Streaming);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].track_id, 0);
        assert_eq!(records[0].frame, 15);
        assert_eq!(records[0].timestamp, 1.5);
        // 10 m in 1 s
        assert_eq!(records[0].speed_kmph, 36.0);

        let overlay = last.unwrap();
        assert_eq!(overlay.tracks.len(), 1);
        assert_eq!(overlay.tracks[0].speed_kmph, Some(36.0));
        assert_eq!(pipeline.tracker().tracks()[0].speed(), Some(36.0));
    }

    #[test]
    fn test_non_vehicle_classes_are_ignored() {
        let mut pipeline = SpeedPipeline::new(scene(), 10.0, PipelineOptions::default()).unwrap();
        let person = Detection::new(90.0, 90.0, 110.0, 110.0).with_label("person");
        let report = pipeline.observe(vec![person]).unwrap();
        assert!(report.overlay.tracks.is_empty());
        assert!(pipeline.tracker().tracks().is_empty());
    }

    #[test]
    fn test_outside_roi_never_measured() {
        let mut pipeline = SpeedPipeline::new(scene(), 10.0, PipelineOptions::default()).unwrap();
        // x = 300 is right of the ROI, but y sweeps across both lines
        for frame in 0..20 {
            let report = pipeline.observe(vec![car_at(300.0, frame as f64 * 10.0)]).unwrap();
            assert!(report.new_records.is_empty());
            assert!(report.overlay.tracks.is_empty());
        }
        assert_eq!(pipeline.tracker().tracks().len(), 1);
    }

    #[test]
    fn test_detector_error_is_fatal() {
        let mut pipeline = SpeedPipeline::new(scene(), 10.0, PipelineOptions::default()).unwrap();
        let mut detector = Scripted { frames: vec![vec![]], calls: 0 };

        assert!(pipeline.process_frame(&mut detector, RgbImage::new(4, 4)).is_ok());
        let err = pipeline.process_frame(&mut detector, RgbImage::new(4, 4)).unwrap_err();
        assert!(matches!(err, PipelineError::Detector { frame: 1, .. }));
        assert_eq!(pipeline.next_frame_index(), 1);
    }

    #[test]
    fn test_run_drains_and_closes() {
        let frames = (0..19).map(|f| vec![car_at(100.0, f as f64 * 10.0)]).collect();
        let mut detector = Scripted { frames, calls: 0 };
        let mut source = MemorySource::blank(200, 200, 10.0, 19);
        let mut sink = MemorySink::default();

        let mut pipeline =
            SpeedPipeline::for_source(scene(), &source, PipelineOptions::default()).unwrap();
        let mut seen = Vec::new();
        let records = pipeline
            .run(&mut detector, &mut source, &mut sink, |p| {
                seen.push((p.frame.index, p.frame.timestamp));
            })
            .unwrap();

        assert_eq!(seen.len(), 19);
        assert_eq!(seen[10], (10, 1.0));
        assert_eq!(records.len(), 1);
        assert_eq!(sink.records, records);
        assert_eq!(pipeline.state(), RunState::Drained);
        assert!(pipeline.tracker().tracks().is_empty());

        assert!(matches!(pipeline.observe(vec![]), Err(PipelineError::Drained)));
        assert!(matches!(pipeline.drain(&mut sink), Err(PipelineError::Drained)));
    }

    #[test]
    fn test_render_draws_on_frame() {
        let mut pipeline = SpeedPipeline::new(scene(), 10.0, PipelineOptions::default()).unwrap();
        let mut detector = Scripted {
            frames: vec![vec![car_at(100.0, 100.0)]],
            calls: 0,
        };
        let processed = pipeline.process_frame(&mut detector, RgbImage::new(200, 200)).unwrap();
        // left edge of the car box
        assert_ne!(*processed.frame.image.get_pixel(90, 100), image::Rgb([0, 0, 0]));

        let mut pipeline = SpeedPipeline::new(
            scene(),
            10.0,
            PipelineOptions {
                render: false,
                ..PipelineOptions::default()
            },
        )
        .unwrap();
        let mut detector = Scripted {
            frames: vec![vec![car_at(100.0, 100.0)]],
            calls: 0,
        };
        let processed = pipeline.process_frame(&mut detector, RgbImage::new(200, 200)).unwrap();
        assert_eq!(*processed.frame.image.get_pixel(90, 100), image::Rgb([0, 0, 0]));
    }

    /// Yields `frames` blank frames, then fails.
    struct FailingSource {
        frames: usize,
    }

    impl VideoSource for FailingSource {
        type Error = std::io::Error;

        fn info(&self) -> StreamInfo {
            StreamInfo {
                width: 200,
                height: 200,
                fps: 10.0,
            }
        }

        fn next_frame(&mut self) -> Result<Option<RgbImage>, Self::Error> {
            if self.frames == 0 {
                return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "corrupt packet"));
            }
            self.frames -= 1;
            Ok(Some(RgbImage::new(200, 200)))
        }
    }

    struct BrokenSink;

    impl RecordSink for BrokenSink {
        fn write_records(&mut self, _records: &[SpeedRecord]) -> Result<(), SinkError> {
            Err(SinkError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        }
    }

    #[test]
    fn test_source_error_ends_stream_and_drains() {
        let frames = (0..30).map(|f| vec![car_at(100.0, f as f64 * 10.0)]).collect();
        let mut detector = Scripted { frames, calls: 0 };
        // speed resolves on frame 15, the source breaks after frame 16
        let mut source = FailingSource { frames: 17 };
        let mut sink = MemorySink::default();

        let mut pipeline =
            SpeedPipeline::for_source(scene(), &source, PipelineOptions::default()).unwrap();
        let mut seen = 0;
        let records = pipeline
            .run(&mut detector, &mut source, &mut sink, |_| seen += 1)
            .unwrap();

        assert_eq!(seen, 17);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].frame, 15);
        assert_eq!(sink.records, records);
        assert_eq!(pipeline.state(), RunState::Drained);
    }

    #[test]
    fn test_sink_error_keeps_run_open() {
        let mut pipeline = SpeedPipeline::new(scene(), 10.0, PipelineOptions::default()).unwrap();
        for frame in 0..19 {
            pipeline.observe(vec![car_at(100.0, frame as f64 * 10.0)]).unwrap();
        }
        assert_eq!(pipeline.records().len(), 1);

        let err = pipeline.drain(&mut BrokenSink).unwrap_err();
        assert!(matches!(err, PipelineError::Sink(SinkError::Io(_))));
        assert_eq!(pipeline.state(), RunState::Streaming);
        assert_eq!(pipeline.records().len(), 1);

        let mut sink = MemorySink::default();
        let records = pipeline.drain(&mut sink).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(sink.records, records);
        assert_eq!(pipeline.state(), RunState::Drained);
    }

    #[test]
    fn test_render_with_labels() {
        let data = include_bytes!("../../tests/fixtures/DejaVuSansMono.ttf");
        let font = LabelFont::from_bytes(data.to_vec(), 14.0).unwrap();

        let mut frames = Vec::new();
        for labels in [None, Some(font)] {
            let mut pipeline = SpeedPipeline::new(
                scene(),
                10.0,
                PipelineOptions {
                    labels,
                    ..PipelineOptions::default()
                },
            )
            .unwrap();
            let mut detector = Scripted {
                frames: vec![vec![car_at(100.0, 100.0)]],
                calls: 0,
            };
            let processed = pipeline.process_frame(&mut detector, RgbImage::new(200, 200)).unwrap();
            frames.push(processed.frame.image);
        }

        // box top edge is row 90; the id label sits in the rows above it
        let differs = (70..90)
            .flat_map(|y| (80..140).map(move |x| (x, y)))
            .any(|(x, y)| frames[0].get_pixel(x, y) != frames[1].get_pixel(x, y));
        assert!(differs);
    }
}
