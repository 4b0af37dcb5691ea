//! Event-consumption state machine
//!
//! A straight-line reducer over the trace: filter, classify, dispatch into the
//! profile tables, count, and cut off at the configured keep count. The update
//! strategy (simple vs. overlay disambiguation) is chosen once at construction
//! and dispatched statically.

use anyhow::Result;

use crate::cli::ProfilerConfig;
use crate::event::{EventClass, InstEvent, OpcodeWidth};
use crate::profile::AddressProfile;
use crate::reader::TraceReader;
use crate::table::Disambiguator;

/// One counted visit, pre-classified and pre-windowed
#[derive(Debug, Clone, Copy)]
pub struct Visit {
    pub pc: u64,
    pub phys_pc: u64,
    pub opcode: u32,
    pub width: OpcodeWidth,
    pub class: EventClass,
    /// Global visit index is below the warmup threshold
    pub in_warmup: bool,
    /// Global visit index is below the runlength threshold
    pub in_runlength: bool,
}

impl Visit {
    /// Fresh profile for this visit, counters already advanced.
    ///
    /// Load/store creation seeds the last-seen address without a stride;
    /// branch creation records the first outcome.
    fn new_profile(&self) -> AddressProfile {
        let mut profile = match self.class {
            EventClass::LoadStore { address } => {
                AddressProfile::new_load_store(self.opcode, self.width, self.phys_pc, address)
            }
            EventClass::Branch { taken } => {
                AddressProfile::new_branch(self.opcode, self.width, self.phys_pc, taken)
            }
            EventClass::Plain => AddressProfile::new(self.opcode, self.width, self.phys_pc),
        };
        self.advance_counters(&mut profile);
        profile
    }

    /// Counter accounting shared by creation and revisit: `total` always,
    /// then warmup or runlength but never both
    fn advance_counters(&self, profile: &mut AddressProfile) {
        profile.inc_total();
        if self.in_warmup {
            profile.inc_warmup();
        } else if self.in_runlength {
            profile.inc_runlength();
        }
    }

    /// Update an existing matching entry
    fn touch(&self, profile: &mut AddressProfile) {
        self.advance_counters(profile);
        match self.class {
            EventClass::LoadStore { address } => profile.record_stride(address),
            EventClass::Branch { taken } => profile.record_branch(taken),
            EventClass::Plain => {}
        }
    }
}

/// How a visit lands in the profile tables
pub trait UpdateStrategy {
    fn record(&self, tables: &mut Disambiguator, visit: &Visit);
}

/// Single-table strategy for traces without code overlay.
///
/// An address revisited under a different opcode is a warning; the conflicting
/// update is dropped and the prior statistics stand.
#[derive(Debug, Default)]
pub struct SimpleUpdate;

impl UpdateStrategy for SimpleUpdate {
    fn record(&self, tables: &mut Disambiguator, visit: &Visit) {
        match tables.active_table_mut().entry(visit.pc) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(visit.new_profile());
            }
            std::collections::btree_map::Entry::Occupied(mut slot) => {
                if slot.get().matches(visit.opcode) {
                    visit.touch(slot.get_mut());
                } else {
                    eprintln!(
                        "WARN: 0x{:016x} two opcodes 0x{:08x} 0x{:08x}",
                        visit.pc,
                        slot.get().opcode(),
                        visit.opcode
                    );
                }
            }
        }
    }
}

/// Multi-table strategy for overlaid/JIT-generated code.
///
/// Each opcode variant ever hosted at an address keeps its own entry in some
/// table. The active table almost always matches, so the common case stays
/// O(1); an ambiguous visit pays an O(tables) search.
#[derive(Debug, Default)]
pub struct OverlayUpdate;

impl UpdateStrategy for OverlayUpdate {
    fn record(&self, tables: &mut Disambiguator, visit: &Visit) {
        // Fast path: the active table already holds the matching entry
        let active = tables.active_index();
        if let Some(profile) = tables.table_mut(active).get_mut(&visit.pc) {
            if profile.matches(visit.opcode) {
                visit.touch(profile);
                return;
            }
        }

        // Some table may hold this (address, opcode) variant
        for idx in 0..tables.table_count() {
            if let Some(profile) = tables.table_mut(idx).get_mut(&visit.pc) {
                if profile.matches(visit.opcode) {
                    visit.touch(profile);
                    tables.set_active(idx);
                    return;
                }
            }
        }

        // New variant: insert into the active table if it lacks the address,
        // else into the last table lacking it, else into a brand-new table
        let target = if !tables.table(active).contains_key(&visit.pc) {
            active
        } else if let Some(idx) =
            (0..tables.table_count()).filter(|&i| !tables.table(i).contains_key(&visit.pc)).last()
        {
            idx
        } else {
            tables.prepend_table()
        };
        tables.set_active(target);
        tables.table_mut(target).insert(visit.pc, visit.new_profile());
    }
}

/// The profiling pass: consumes events one at a time until the stream ends or
/// the keep count cuts it off
pub struct ProfileCollector<S: UpdateStrategy> {
    strategy: S,
    tables: Disambiguator,
    hw_tid: u32,
    pid: u32,
    tid: u32,
    warmup_count: u64,
    runlength_count: u64,
    keep_count: u64,
    visit_count: u64,
    events_seen: u64,
    finished: bool,
}

impl<S: UpdateStrategy> ProfileCollector<S> {
    pub fn new(config: &ProfilerConfig, strategy: S) -> Self {
        Self {
            strategy,
            tables: Disambiguator::new(),
            hw_tid: config.hw_tid,
            pid: config.pid,
            tid: config.tid,
            warmup_count: config.warmup_count,
            runlength_count: config.runlength_count,
            keep_count: config.keep_count,
            visit_count: 0,
            events_seen: 0,
            finished: false,
        }
    }

    /// Consume one event. Returns false once the collector has finished;
    /// further events must not be offered.
    pub fn consume(&mut self, event: &InstEvent) -> bool {
        if self.finished {
            return false;
        }
        self.events_seen += 1;

        if !event.valid {
            eprintln!(
                "ERROR: {} invalid instruction 0x{:08x} PC 0x{:016x}",
                self.events_seen, event.opcode, event.pc
            );
        }

        if self.hw_tid != 0 && self.hw_tid != event.hw_tid {
            return true;
        }
        if self.pid != 0 && self.pid != event.pid {
            return true;
        }
        if self.tid != 0 && self.tid != event.tid {
            return true;
        }

        // Faulting instructions are replayed by the trace; counting them
        // would double-count execution
        if event.is_fault() {
            return true;
        }

        let visit = Visit {
            pc: event.pc,
            phys_pc: event.physpc,
            opcode: event.opcode,
            width: event.width,
            class: event.classify(),
            in_warmup: self.visit_count < self.warmup_count,
            in_runlength: self.visit_count < self.runlength_count,
        };
        self.strategy.record(&mut self.tables, &visit);

        self.visit_count += 1;
        if self.visit_count >= self.keep_count {
            tracing::debug!(visits = self.visit_count, "keep count reached");
            self.finished = true;
            return false;
        }
        true
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn visit_count(&self) -> u64 {
        self.visit_count
    }

    pub fn tables(&self) -> &Disambiguator {
        &self.tables
    }

    /// End the profiling pass, yielding the finished tables and the global
    /// visit counter
    pub fn finish(self) -> (Disambiguator, u64) {
        (self.tables, self.visit_count)
    }
}

/// Open the configured trace and run the full profiling pass with the
/// strategy the configuration selects
pub fn profile_trace(config: &ProfilerConfig) -> Result<(Disambiguator, u64)> {
    let reader = TraceReader::open(config)?;
    if config.overlay {
        drain(reader, config, OverlayUpdate)
    } else {
        drain(reader, config, SimpleUpdate)
    }
}

fn drain<S: UpdateStrategy>(
    reader: TraceReader,
    config: &ProfilerConfig,
    strategy: S,
) -> Result<(Disambiguator, u64)> {
    let mut collector = ProfileCollector::new(config, strategy);
    for event in reader {
        let event = event?;
        if !collector.consume(&event) {
            break;
        }
    }
    Ok(collector.finish())
}
