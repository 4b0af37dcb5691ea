//! Report generation
//!
//! One forward scan over the finished tables drives both report forms: the
//! address-ordered plain listing and the optional hotness-sorted listing. The
//! reporting pass is read-only; column widths are recomputed here from the
//! finalized data rather than cached during collection.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{bail, Result};

use crate::cli::ProfilerConfig;
use crate::disasm::Disassemble;
use crate::event::OpcodeWidth;
use crate::format;
use crate::output::{sorted_destination, ReportSink};
use crate::profile::AddressProfile;
use crate::table::Disambiguator;

const TABLE_FIELD_WIDTH: usize = 8;
const NOPHYSPC_WIDTH: usize = 16;
const PHYSPC_WIDTH: usize = NOPHYSPC_WIDTH + 17;

/// A maximal run of address-contiguous entries
#[derive(Debug, Default)]
struct Block<'a> {
    total: u64,
    entries: Vec<(u64, &'a AddressProfile)>,
}

/// Closed blocks keyed by `(block total, first address)`.
///
/// Reverse iteration yields higher counts first and, on a count tie, the
/// higher starting address first. Values are vectors because distinct tables
/// can close blocks with identical keys.
type SortedBlocks<'a> = BTreeMap<(u64, u64), Vec<Block<'a>>>;

/// Renders the two report forms from the finished table state
pub struct ReportGenerator<'a> {
    config: &'a ProfilerConfig,
    tables: &'a Disambiguator,
    visit_count: u64,
    dis: &'a dyn Disassemble,
    max_count: u64,
    count_width: usize,
    warmup_width: usize,
    runlength_width: usize,
}

impl<'a> ReportGenerator<'a> {
    pub fn new(
        config: &'a ProfilerConfig,
        tables: &'a Disambiguator,
        visit_count: u64,
        dis: &'a dyn Disassemble,
    ) -> Self {
        let mut max_count = 0;
        let mut max_warmup = 0;
        let mut max_runlength = 0;
        for table in tables.tables() {
            for profile in table.values() {
                max_count = max_count.max(profile.total());
                max_warmup = max_warmup.max(profile.warmup());
                max_runlength = max_runlength.max(profile.runlength());
            }
        }
        Self {
            config,
            tables,
            visit_count,
            dis,
            max_count,
            count_width: TABLE_FIELD_WIDTH.max(format::dec_width(max_count)),
            warmup_width: TABLE_FIELD_WIDTH.max(format::dec_width(max_warmup)),
            runlength_width: TABLE_FIELD_WIDTH.max(format::dec_width(max_runlength)),
        }
    }

    /// Write the plain report (and the sorted report if configured) to the
    /// configured destinations
    pub fn write_reports(&self) -> Result<()> {
        let mut sink = ReportSink::create(&self.config.output)?;
        // With both reports on stdout, plain item lines would drown the
        // sorted listing; the original tool suppresses them too
        let suppress_items = sink.is_stdout() && self.config.sort_output;
        let sorted = self.render_plain(&mut sink, suppress_items)?;
        sink.flush()?;

        if self.config.sort_output {
            if sorted.is_empty() {
                eprintln!("Warning: generated profile was empty! Skipping sorted report.");
                return Ok(());
            }
            let dest = sorted_destination(&self.config.output);
            let mut sorted_sink = ReportSink::create(&dest)?;
            let separator = sorted_sink.is_stdout();
            self.render_sorted(&sorted, &mut sorted_sink, separator)?;
            sorted_sink.flush()?;
        }
        Ok(())
    }

    /// The single forward scan: plain listing plus block accumulation.
    ///
    /// Tables are walked from most recently created to oldest, ascending
    /// address within each. Contiguity state deliberately survives table
    /// boundaries.
    fn render_plain(
        &self,
        out: &mut dyn Write,
        suppress_items: bool,
    ) -> Result<SortedBlocks<'a>> {
        let mut sorted = SortedBlocks::new();
        let mut current = Block::default();
        let mut prev_pc = 0u64;
        let mut prev_size = 0u64;
        let mut first = true;

        self.render_track_header(out)?;

        for (map_num, table) in self.tables.tables().iter().enumerate() {
            writeln!(out)?;
            writeln!(out, "============ MAP {} ============", map_num + 1)?;

            for (&pc, profile) in table.iter() {
                if first || prev_pc + prev_size != pc {
                    if first {
                        first = false;
                    } else if self.config.sort_output {
                        self.close_block(&mut sorted, &mut current);
                    } else {
                        writeln!(out, "...")?;
                    }
                }
                if self.config.sort_output {
                    current.total += profile.total();
                    current.entries.push((pc, profile));
                }
                if !suppress_items {
                    self.render_plain_item(out, pc, profile)?;
                }
                prev_pc = pc;
                prev_size = profile.opcode_size();
            }
        }
        if self.config.sort_output && !current.entries.is_empty() {
            self.close_block(&mut sorted, &mut current);
        }
        Ok(sorted)
    }

    fn close_block(&self, sorted: &mut SortedBlocks<'a>, current: &mut Block<'a>) {
        let key = (current.total, current.entries[0].0);
        sorted.entry(key).or_default().push(std::mem::take(current));
    }

    /// CONFIG block and ruled column header, only under `--track`
    fn render_track_header(&self, out: &mut dyn Write) -> Result<()> {
        if !self.config.track {
            return Ok(());
        }
        writeln!(out, "============ CONFIG  ============")?;
        writeln!(out, "original trace: {}", self.config.trace)?;
        writeln!(out, "warmup: {}", self.config.warmup_count)?;
        writeln!(out, "overlay: {}", self.config.overlay)?;

        let mut header = String::new();
        if self.config.show_percentage {
            header.push_str(&format::header_field("total%", TABLE_FIELD_WIDTH, false));
            header.push_str(&format::header_field("warm%", TABLE_FIELD_WIDTH, false));
            header.push_str(&format::header_field("run%", TABLE_FIELD_WIDTH, false));
        }
        header.push_str(&format::header_field("total", self.count_width, false));
        header.push_str(&format::header_field("warm", self.warmup_width, false));
        header.push_str(&format::header_field("runl", self.runlength_width, false));
        let pc_width = if self.config.show_physpc {
            PHYSPC_WIDTH
        } else {
            NOPHYSPC_WIDTH
        };
        header.push_str(&format::header_field("instpc", pc_width, false));
        header.push_str(&format::header_field("opcode", TABLE_FIELD_WIDTH, false));
        header.push_str(&format::header_field("disasm", TABLE_FIELD_WIDTH, true));
        writeln!(out, "{header}")?;
        Ok(())
    }

    fn render_plain_item(
        &self,
        out: &mut dyn Write,
        pc: u64,
        profile: &AddressProfile,
    ) -> Result<()> {
        let mut line = String::new();
        if self.config.show_percentage {
            line.push_str(&format::percent(
                profile.total(),
                self.visit_count,
                7,
                4,
                TABLE_FIELD_WIDTH,
            ));
            if self.config.track {
                line.push_str(&self.window_percent(profile.warmup(), self.config.warmup_count));
                line.push_str(
                    &self.window_percent(profile.runlength(), self.config.runlength_count),
                );
            }
        }
        line.push_str(&format!(
            "{:>width$}",
            profile.total(),
            width = self.count_width
        ));
        if self.config.track {
            line.push_str(&format!(
                "  {:>width$}",
                profile.warmup(),
                width = self.warmup_width
            ));
            line.push_str(&format!(
                "  {:>width$}",
                profile.runlength(),
                width = self.runlength_width
            ));
        }
        line.push_str("  ");
        line.push_str(&format::hex_va(pc));
        if self.config.show_physpc {
            line.push(':');
            line.push_str(&format::hex_va(profile.phys_pc()));
        }
        line.push_str("  ");
        line.push_str(&format::hex_opcode(
            profile.opcode(),
            profile.width() == OpcodeWidth::Half,
        ));
        line.push(' ');
        line.push_str(&self.dis.disassemble(pc, profile.opcode()));
        writeln!(out, "{line}")?;
        Ok(())
    }

    /// Warmup/runlength percentage against its configured window, or a flat
    /// 0% when the window is disabled
    fn window_percent(&self, numerator: u64, window: u64) -> String {
        if window != 0 {
            format::percent(numerator, window, 7, 4, TABLE_FIELD_WIDTH)
        } else {
            format::percent(0, 1, 7, 4, TABLE_FIELD_WIDTH)
        }
    }

    /// Hotness-sorted listing plus the conservation check
    fn render_sorted(
        &self,
        sorted: &SortedBlocks<'a>,
        out: &mut dyn Write,
        separator: bool,
    ) -> Result<()> {
        if separator {
            writeln!(out, "-----------------------------------------")?;
        }
        writeln!(
            out,
            "Total inst count = {}",
            format::with_commas(self.visit_count)
        )?;
        writeln!(
            out,
            "Max count        = {}",
            format::with_commas(self.max_count)
        )?;

        let comma_width = format::comma_width(self.count_width);
        let mut cumulative = 0u64;

        for (&(count, _start), blocks) in sorted.iter().rev() {
            for block in blocks {
                let mut banner = String::from("-------------------------");
                banner.push_str(&format::percent(count, self.visit_count, 6, 1, 7));
                banner.push_str(&format!(
                    "- {} inst, {} addr",
                    format::with_commas(count),
                    block.entries.len()
                ));
                writeln!(out, "{banner}")?;
                for &(pc, profile) in &block.entries {
                    cumulative += profile.total();
                    self.render_sorted_item(out, pc, profile, cumulative, comma_width)?;
                }
            }
        }

        // Every counted visit must land in exactly one printed entry; a
        // mismatch means statistics were silently dropped somewhere
        if cumulative != self.visit_count {
            bail!(
                "not all blocks were included in sorted output! \
                 cumulative_count = {cumulative}, inst_count = {}",
                self.visit_count
            );
        }
        Ok(())
    }

    fn render_sorted_item(
        &self,
        out: &mut dyn Write,
        pc: u64,
        profile: &AddressProfile,
        cumulative: u64,
        comma_width: usize,
    ) -> Result<()> {
        let mut line = format!(
            "{:>width$}",
            format::with_commas(profile.total()),
            width = comma_width
        );
        line.push_str("  ");
        line.push_str(&format::percent(profile.total(), self.visit_count, 5, 1, 7));
        line.push_str(&format::percent(cumulative, self.visit_count, 5, 1, 7));
        line.push_str(&format::hex_va(pc));
        if self.config.show_physpc {
            line.push(':');
            line.push_str(&format::hex_va(profile.phys_pc()));
        }
        line.push_str("  ");
        line.push_str(&format::hex_opcode(
            profile.opcode(),
            profile.width() == OpcodeWidth::Half,
        ));
        line.push_str("  ");
        line.push_str(&self.dis.disassemble(pc, profile.opcode()));

        if self.config.local_history {
            if profile.is_load_store() {
                line.push_str("    LStrides={");
                for stride in profile.strides() {
                    line.push_str(&stride.to_string());
                    line.push(',');
                }
                line.push('}');
            } else if profile.is_branch() {
                line.push_str("    LHR={");
                for idx in 0..crate::profile::LOCAL_HISTORY {
                    line.push(if profile.branch_bit(idx) { '1' } else { '0' });
                }
                line.push('}');
            }
        }
        writeln!(out, "{line}")?;
        Ok(())
    }
}
