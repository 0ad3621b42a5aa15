//! Speed records and where they go at the end of a run.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SinkError;

/// One measured vehicle. Emitted once per track, on its second crossing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedRecord {
    pub video: String,
    pub track_id: u64,
    pub speed_kmph: f64,
    /// Stream time of the second crossing, in seconds
    pub timestamp: f64,
    pub frame: u64,
}

const CSV_HEADER: [&str; 5] = ["video", "track_id", "speed_kmph", "timestamp", "frame"];

/// Destination for the records of a finished run.
pub trait RecordSink {
    fn write_records(&mut self, records: &[SpeedRecord]) -> Result<(), SinkError>;
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn write_records(&mut self, records: &[SpeedRecord]) -> Result<(), SinkError> {
        (**self).write_records(records)
    }
}

/// Flat CSV table, header included even when no vehicle was measured.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    header_written: bool,
}

impl CsvSink<File> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        Ok(Self::from_writer(File::create(path)?))
    }

    /// Create `speeds_<video_name>.csv` inside `dir`, creating `dir` if needed.
    pub fn create_in(
        dir: impl AsRef<Path>,
        video_name: &str,
    ) -> Result<(Self, PathBuf), SinkError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("speeds_{video_name}.csv"));
        Ok((Self::create(&path)?, path))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn from_writer(writer: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new().has_headers(false).from_writer(writer),
            header_written: false,
        }
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(self) -> Result<W, SinkError> {
        self.writer
            .into_inner()
            .map_err(|err| SinkError::Io(err.into_error()))
    }
}

impl<W: Write> RecordSink for CsvSink<W> {
    fn write_records(&mut self, records: &[SpeedRecord]) -> Result<(), SinkError> {
        if !self.header_written {
            self.writer.write_record(CSV_HEADER)?;
            self.header_written = true;
        }
        for record in records {
            self.writer.serialize(record)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub records: Vec<SpeedRecord>,
}

impl RecordSink for MemorySink {
    fn write_records(&mut self, records: &[SpeedRecord]) -> Result<(), SinkError> {
        self.records.extend_from_slice(records);
        Ok(())
    }
}
