//! CLI argument parsing for Huella

use anyhow::{bail, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "huella")]
#[command(version)]
#[command(about = "Instruction-memory access profiler for decoded instruction traces", long_about = None)]
pub struct Cli {
    /// Trace file to read (JSON Lines, one event per line; `-` for stdin)
    pub trace: String,

    /// Report destination (`-` for stdout)
    #[arg(short = 'o', long = "output", default_value = "-", value_name = "FILE")]
    pub output: String,

    /// Only include events with this hardware thread id (0 = unfiltered)
    #[arg(long = "hw-tid", default_value = "0", value_name = "ID")]
    pub hw_tid: u32,

    /// Only include events with this process id (0 = unfiltered)
    #[arg(long = "pid", default_value = "0", value_name = "ID")]
    pub pid: u32,

    /// Only include events with this thread id (0 = unfiltered)
    #[arg(long = "tid", default_value = "0", value_name = "ID")]
    pub tid: u32,

    /// Skip this many events before profiling starts
    #[arg(long = "skip", default_value = "0", value_name = "N")]
    pub skip: u64,

    /// Stop profiling after this many counted events
    #[arg(long = "keep", value_name = "N")]
    pub keep: Option<u64>,

    /// Number of leading events counted as warmup
    #[arg(long = "warmup", default_value = "0", value_name = "N")]
    pub warmup: u64,

    /// Steady-state window: events below this index count toward runlength
    #[arg(long = "runlength", value_name = "N")]
    pub runlength: Option<u64>,

    /// Also write a hotness-sorted report
    #[arg(short = 's', long = "sort-output")]
    pub sort_output: bool,

    /// Append stride/branch history annotations in the sorted report
    #[arg(short = 'l', long = "local-history")]
    pub local_history: bool,

    /// Track warmup/runlength columns and emit a config header block
    #[arg(short = 't', long = "track")]
    pub track: bool,

    /// Show per-entry percentages of the total event count
    #[arg(short = 'p', long = "percent")]
    pub show_percentage: bool,

    /// Show physical addresses next to virtual ones
    #[arg(long = "physpc")]
    pub show_physpc: bool,

    /// Expect overlaid/JIT code: disambiguate reused addresses across opcodes
    #[arg(short = 'j', long = "overlay")]
    pub overlay: bool,

    /// Start profiling at the first occurrence of this PC (requires --roi-stop-pc)
    #[arg(long = "roi-start-pc", value_name = "PC", value_parser = parse_maybe_hex)]
    pub roi_start_pc: Option<u64>,

    /// Stop profiling at the next occurrence of this PC (requires --roi-start-pc)
    #[arg(long = "roi-stop-pc", value_name = "PC", value_parser = parse_maybe_hex)]
    pub roi_stop_pc: Option<u64>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

/// Accept both decimal and 0x-prefixed hex PCs
fn parse_maybe_hex(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else {
        s.parse().map_err(|e: std::num::ParseIntError| e.to_string())
    }
}

/// Validated profiler configuration, shared by the reader, collector, and
/// report generator
#[derive(Debug, Clone)]
pub struct ProfilerConfig {
    pub trace: String,
    pub output: String,
    pub hw_tid: u32,
    pub pid: u32,
    pub tid: u32,
    pub skip_count: u64,
    pub keep_count: u64,
    pub warmup_count: u64,
    pub runlength_count: u64,
    pub sort_output: bool,
    pub local_history: bool,
    pub track: bool,
    pub show_percentage: bool,
    pub show_physpc: bool,
    pub overlay: bool,
    /// Profile only between the first occurrence of `.0` (inclusive) and the
    /// next occurrence of `.1` (exclusive)
    pub roi: Option<(u64, u64)>,
}

impl Default for ProfilerConfig {
    /// Unfiltered, unwindowed profiling from stdin to stdout
    fn default() -> Self {
        Self {
            trace: "-".to_string(),
            output: "-".to_string(),
            hw_tid: 0,
            pid: 0,
            tid: 0,
            skip_count: 0,
            keep_count: u64::MAX,
            warmup_count: 0,
            runlength_count: u64::MAX,
            sort_output: false,
            local_history: false,
            track: false,
            show_percentage: false,
            show_physpc: false,
            overlay: false,
            roi: None,
        }
    }
}

impl Cli {
    /// Validate and convert into a `ProfilerConfig`.
    ///
    /// A half-configured ROI window and a zero keep count are fatal here;
    /// everything downstream may assume the configuration is coherent.
    pub fn into_config(self) -> Result<ProfilerConfig> {
        let roi = match (self.roi_start_pc, self.roi_stop_pc) {
            (Some(start), Some(stop)) => Some((start, stop)),
            (None, None) => None,
            _ => bail!("--roi-start-pc and --roi-stop-pc must be supplied together"),
        };
        if self.keep == Some(0) {
            bail!("--keep must be nonzero");
        }
        Ok(ProfilerConfig {
            trace: self.trace,
            output: self.output,
            hw_tid: self.hw_tid,
            pid: self.pid,
            tid: self.tid,
            skip_count: self.skip,
            keep_count: self.keep.unwrap_or(u64::MAX),
            warmup_count: self.warmup,
            runlength_count: self.runlength.unwrap_or(u64::MAX),
            sort_output: self.sort_output,
            local_history: self.local_history,
            track: self.track,
            show_percentage: self.show_percentage,
            show_physpc: self.show_physpc,
            overlay: self.overlay,
            roi,
        })
    }
}
