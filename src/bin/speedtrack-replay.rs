//! Replay a recorded detection log through the speed pipeline and write the
//! measured speeds to `speeds_<video_name>.csv`.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use speedtrack::{
    Assignment, CsvSink, DetectionLog, PipelineOptions, SceneConfig, SpeedPipeline,
    TrackerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "speedtrack-replay", about = "Vehicle speed estimation over recorded detections")]
struct Args {
    /// Scene configuration (ROI, lines, distance)
    #[arg(long, value_name = "PATH")]
    config: PathBuf,
    /// JSON-lines detection log, one frame per line
    #[arg(long, value_name = "PATH")]
    detections: PathBuf,
    #[arg(long)]
    fps: f64,
    #[arg(long, default_value = "outputs")]
    output_dir: PathBuf,
    /// Missed frames a track survives, coasting on its prediction
    #[arg(long, default_value_t = 0)]
    max_misses: u32,
    /// Optimal IoU assignment instead of greedy first match
    #[arg(long)]
    optimal: bool,
    /// Match against Kalman-predicted boxes
    #[arg(long)]
    predict: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "speedtrack=info".into()),
        )
        .init();
    let args = Args::parse();
    run(args)
}

fn run(args: Args) -> Result<()> {
    let scene = SceneConfig::load(&args.config)
        .with_context(|| format!("loading scene config {}", args.config.display()))?;
    let log = File::open(&args.detections)
        .with_context(|| format!("opening detection log {}", args.detections.display()))?;

    let options = PipelineOptions {
        tracker: TrackerConfig {
            max_misses: args.max_misses,
            predict: args.predict,
            assignment: if args.optimal {
                Assignment::Optimal
            } else {
                Assignment::Greedy
            },
            ..TrackerConfig::default()
        },
        render: false,
        labels: None,
    };
    let mut pipeline = SpeedPipeline::new(scene, args.fps, options)?;

    for frame in DetectionLog::new(BufReader::new(log)) {
        let detections = frame.context("reading detection log")?;
        pipeline.observe(detections)?;
    }

    let (mut sink, path) = CsvSink::create_in(&args.output_dir, &pipeline.scene().video_name)
        .with_context(|| format!("creating output in {}", args.output_dir.display()))?;
    let records = pipeline.drain(&mut sink)?;

    info!(records = records.len(), output = %path.display(), "replay finished");
    for record in &records {
        println!("ID:{} {:.1} km/h", record.track_id, record.speed_kmph);
    }
    Ok(())
}
