//! Report output destinations
//!
//! Reports go to a file or to stdout (`-`). The sorted report derives its own
//! filename from the primary one so both can live side by side.

use std::fs::File;
use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};

/// Suffix convention for primary and sorted reports
const IMEM_EXT: &str = ".imem";
const SORTED_EXT: &str = ".s_imem";

/// A report destination: buffered file or stdout
pub struct ReportSink {
    writer: Box<dyn Write>,
    stdout: bool,
}

impl ReportSink {
    /// Open `dest` for writing; `-` selects stdout
    pub fn create(dest: &str) -> Result<Self> {
        if dest == "-" {
            Ok(Self {
                writer: Box::new(io::stdout()),
                stdout: true,
            })
        } else {
            let file =
                File::create(dest).with_context(|| format!("failed to create output {dest}"))?;
            Ok(Self {
                writer: Box::new(BufWriter::new(file)),
                stdout: false,
            })
        }
    }

    pub fn is_stdout(&self) -> bool {
        self.stdout
    }
}

impl Write for ReportSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Destination for the sorted report derived from the primary destination:
/// replace a trailing `.imem` with `.s_imem`, append `.s_imem` otherwise,
/// keep stdout as stdout
pub fn sorted_destination(primary: &str) -> String {
    if primary == "-" {
        return "-".to_string();
    }
    match primary.strip_suffix(IMEM_EXT) {
        Some(stem) => format!("{stem}{SORTED_EXT}"),
        None => format!("{primary}{SORTED_EXT}"),
    }
}
