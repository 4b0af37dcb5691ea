//! Property-based tests for the profiling invariants

use proptest::prelude::*;

use huella::cli::ProfilerConfig;
use huella::collector::{OverlayUpdate, ProfileCollector, SimpleUpdate};
use huella::event::{AccessKind, InstEvent, MemAccess, OpcodeWidth};
use huella::profile::{AddressProfile, LOCAL_HISTORY};

fn event(pc: u64, opcode: u32) -> InstEvent {
    InstEvent {
        pc,
        physpc: 0,
        opcode,
        width: OpcodeWidth::Word,
        fault: false,
        interrupt: false,
        hw_tid: 0,
        pid: 0,
        tid: 0,
        mem: Vec::new(),
        branch: None,
        valid: true,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Property: after k visits, the stride ring holds min(k-1, 50) deltas,
    // each equal to address[i] - address[i-1], with the most recent delta at
    // the slot just before the cursor
    #[test]
    fn prop_stride_ring_matches_address_deltas(
        addresses in prop::collection::vec(0u64..1_000_000, 2..120),
    ) {
        let mut profile =
            AddressProfile::new_load_store(0x3, OpcodeWidth::Word, 0, addresses[0]);
        for &addr in &addresses[1..] {
            profile.record_stride(addr);
        }

        let deltas = addresses.len() - 1;
        prop_assert_eq!(profile.stride_cursor(), deltas % LOCAL_HISTORY);

        // every surviving slot holds the delta that was last written there
        for (i, pair) in addresses.windows(2).enumerate() {
            let slot = i % LOCAL_HISTORY;
            let is_latest_writer = i + LOCAL_HISTORY >= deltas;
            if is_latest_writer {
                let expected = pair[1].wrapping_sub(pair[0]) as i64;
                prop_assert_eq!(profile.strides()[slot], expected);
            }
        }
    }

    // Property: the branch history bit in each slot equals the outcome of
    // the last visit that wrote that slot
    #[test]
    fn prop_branch_history_matches_outcomes(
        outcomes in prop::collection::vec(any::<bool>(), 1..120),
    ) {
        let mut profile = AddressProfile::new(0x63, OpcodeWidth::Word, 0);
        for &taken in &outcomes {
            profile.record_branch(taken);
        }

        prop_assert!(profile.is_branch());
        prop_assert_eq!(profile.branch_cursor(), outcomes.len() % LOCAL_HISTORY);
        for (i, &taken) in outcomes.iter().enumerate() {
            let slot = i % LOCAL_HISTORY;
            if i + LOCAL_HISTORY >= outcomes.len() {
                prop_assert_eq!(profile.branch_bit(slot), taken);
            }
        }
    }

    // Property: for a single address visited n times,
    // warmup == min(n, warmup_count) and runlength fills the remainder of
    // the runlength window; the two never overlap
    #[test]
    fn prop_window_counters(
        visits in 1u64..200,
        warmup_count in 0u64..100,
        runlength_count in 0u64..150,
    ) {
        let config = ProfilerConfig {
            warmup_count,
            runlength_count,
            ..ProfilerConfig::default()
        };
        let mut collector = ProfileCollector::new(&config, SimpleUpdate);
        let e = event(0x100, 0x1);
        for _ in 0..visits {
            collector.consume(&e);
        }
        let (tables, _) = collector.finish();
        let profile = tables.table(0).get(&0x100).unwrap();

        prop_assert_eq!(profile.total(), visits);
        prop_assert_eq!(profile.warmup(), visits.min(warmup_count));
        let expected_runlength = visits.min(runlength_count).saturating_sub(warmup_count);
        prop_assert_eq!(profile.runlength(), expected_runlength);
        prop_assert!(profile.warmup() + profile.runlength() <= profile.total());
    }

    // Property: without filters or collisions, every counted event lands in
    // exactly one entry (the sorted-report conservation invariant)
    #[test]
    fn prop_total_conservation_simple(
        pcs in prop::collection::vec(0u64..64, 1..300),
    ) {
        let config = ProfilerConfig::default();
        let mut collector = ProfileCollector::new(&config, SimpleUpdate);
        for &pc in &pcs {
            // one opcode per address: no collisions possible
            collector.consume(&event(pc * 4, pc as u32 + 1));
        }
        let (tables, visit_count) = collector.finish();
        let sum: u64 = tables
            .tables()
            .iter()
            .flat_map(|t| t.values())
            .map(AddressProfile::total)
            .sum();
        prop_assert_eq!(sum, visit_count);
        prop_assert_eq!(visit_count, pcs.len() as u64);
    }

    // Property: overlay mode conserves totals even when addresses are reused
    // under many different opcodes
    #[test]
    fn prop_total_conservation_overlay(
        visits in prop::collection::vec((0u64..16, 0u32..4), 1..300),
    ) {
        let config = ProfilerConfig {
            overlay: true,
            ..ProfilerConfig::default()
        };
        let mut collector = ProfileCollector::new(&config, OverlayUpdate);
        for &(pc, opcode) in &visits {
            collector.consume(&event(pc * 4, opcode + 1));
        }
        let (tables, visit_count) = collector.finish();
        let sum: u64 = tables
            .tables()
            .iter()
            .flat_map(|t| t.values())
            .map(AddressProfile::total)
            .sum();
        prop_assert_eq!(sum, visit_count);

        // and each (address, opcode) variant appears in at most one table
        for &(pc, opcode) in &visits {
            let holders = tables
                .tables()
                .iter()
                .filter(|t| t.get(&(pc * 4)).map(|p| p.matches(opcode + 1)).unwrap_or(false))
                .count();
            prop_assert_eq!(holders, 1);
        }
    }

    // Property: stride recording through the collector reproduces the
    // access-address deltas of a strided load
    #[test]
    fn prop_collector_strided_load(
        base in 0u64..1_000_000,
        stride in 1u64..4096,
        count in 2usize..60,
    ) {
        let config = ProfilerConfig::default();
        let mut collector = ProfileCollector::new(&config, SimpleUpdate);
        for i in 0..count {
            let mut e = event(0x100, 0x3);
            e.mem = vec![MemAccess {
                addr: base + stride * i as u64,
                size: 8,
                kind: AccessKind::Read,
            }];
            collector.consume(&e);
        }
        let (tables, _) = collector.finish();
        let profile = tables.table(0).get(&0x100).unwrap();
        prop_assert!(profile.is_load_store());
        for slot in 0..(count - 1).min(LOCAL_HISTORY) {
            prop_assert_eq!(profile.strides()[slot], stride as i64);
        }
    }
}
