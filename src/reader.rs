//! JSON-Lines trace reading
//!
//! The reader owns the event-source positioning concerns: skip-count and the
//! optional PC region of interest both happen here, before the collector ever
//! sees an event. Blank lines are tolerated; malformed lines are fatal.

use std::fs::File;
use std::io::{self, BufRead, BufReader};

use thiserror::Error;

use crate::cli::ProfilerConfig;
use crate::event::InstEvent;

/// Errors produced while opening or reading a trace
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("failed to open trace {path}: {source}")]
    Open { path: String, source: io::Error },

    #[error("trace line {line}: {source}")]
    Parse {
        line: u64,
        source: serde_json::Error,
    },

    #[error("trace read failed at line {line}: {source}")]
    Io { line: u64, source: io::Error },
}

/// Region-of-interest window state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoiState {
    /// Discarding events until the start PC shows up
    BeforeStart,
    /// Emitting events until the stop PC shows up
    Inside,
    /// Stop PC seen; the stream is over
    Done,
}

/// Iterator of decoded instruction events from a JSON-Lines source
pub struct TraceReader {
    source: Box<dyn BufRead>,
    line_no: u64,
    skip_remaining: u64,
    roi: Option<(u64, u64)>,
    roi_state: RoiState,
}

impl TraceReader {
    /// Open the trace named by the configuration (`-` reads stdin) with its
    /// skip-count and ROI positioning applied
    pub fn open(config: &ProfilerConfig) -> Result<Self, TraceError> {
        let source: Box<dyn BufRead> = if config.trace == "-" {
            Box::new(BufReader::new(io::stdin()))
        } else {
            let file = File::open(&config.trace).map_err(|source| TraceError::Open {
                path: config.trace.clone(),
                source,
            })?;
            Box::new(BufReader::new(file))
        };
        Ok(Self::from_source(
            source,
            config.skip_count,
            config.roi,
        ))
    }

    /// Build a reader over any buffered source; used directly by tests
    pub fn from_source(
        source: Box<dyn BufRead>,
        skip_count: u64,
        roi: Option<(u64, u64)>,
    ) -> Self {
        Self {
            source,
            line_no: 0,
            skip_remaining: skip_count,
            roi,
            roi_state: if roi.is_some() {
                RoiState::BeforeStart
            } else {
                RoiState::Inside
            },
        }
    }

    /// Read and parse the next non-blank line
    fn next_raw(&mut self) -> Option<Result<InstEvent, TraceError>> {
        loop {
            let mut line = String::new();
            self.line_no += 1;
            match self.source.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(source) => {
                    return Some(Err(TraceError::Io {
                        line: self.line_no,
                        source,
                    }))
                }
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str(trimmed).map_err(|source| TraceError::Parse {
                    line: self.line_no,
                    source,
                }),
            );
        }
    }
}

impl Iterator for TraceReader {
    type Item = Result<InstEvent, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.roi_state == RoiState::Done {
                return None;
            }
            let event = match self.next_raw()? {
                Ok(event) => event,
                Err(e) => return Some(Err(e)),
            };
            if self.skip_remaining > 0 {
                self.skip_remaining -= 1;
                continue;
            }
            match (self.roi_state, self.roi) {
                (RoiState::BeforeStart, Some((start, _))) => {
                    if event.pc == start {
                        tracing::debug!(pc = format_args!("{:#x}", event.pc), "ROI start");
                        self.roi_state = RoiState::Inside;
                        return Some(Ok(event));
                    }
                }
                (RoiState::Inside, Some((_, stop))) if event.pc == stop => {
                    tracing::debug!(pc = format_args!("{:#x}", event.pc), "ROI stop");
                    self.roi_state = RoiState::Done;
                    return None;
                }
                _ => return Some(Ok(event)),
            }
        }
    }
}
