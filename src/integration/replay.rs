//! Recorded detector output, one frame per line.
//!
//! Each line is a JSON array of `[x1, y1, x2, y2, label]` tuples, the label
//! being a string or `null`. Blank lines are frames with no detections.
//!
//! ```text
//! [[100, 200, 150, 250, "car"], [300, 400, 350, 450, "truck"]]
//! []
//! [[105, 205, 155, 255, null]]
//! ```

use std::io::BufRead;

use crate::error::ReplayError;
use crate::tracker::Detection;

type LoggedDetection = (f64, f64, f64, f64, Option<String>);

/// Parse one line of a detection log.
pub fn parse_frame(line: &str) -> Result<Vec<Detection>, serde_json::Error> {
    if line.trim().is_empty() {
        return Ok(Vec::new());
    }
    let logged: Vec<LoggedDetection> = serde_json::from_str(line)?;
    Ok(logged
        .into_iter()
        .map(|(x1, y1, x2, y2, label)| {
            let detection = Detection::new(x1, y1, x2, y2);
            match label {
                Some(label) => detection.with_label(label),
                None => detection,
            }
        })
        .collect())
}

/// Iterator over the frames of a detection log.
pub struct DetectionLog<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
}

impl<R: BufRead> DetectionLog<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> Iterator for DetectionLog<R> {
    type Item = Result<Vec<Detection>, ReplayError>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = self.lines.next()?;
        self.line_no += 1;
        let line_no = self.line_no;
        Some(line.map_err(ReplayError::from).and_then(|line| {
            parse_frame(&line).map_err(|source| ReplayError::Parse {
                line: line_no,
                source,
            })
        }))
    }
}
