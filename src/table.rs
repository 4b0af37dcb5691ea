//! Profile tables and address-reuse disambiguation
//!
//! A `ProfileTable` maps addresses to their profiles in ascending order; the
//! ordering is load-bearing for report generation (contiguity detection and
//! listing order). The `Disambiguator` owns a list of tables so that each
//! opcode variant ever hosted at a reused address keeps independent
//! statistics.

use std::collections::BTreeMap;

use crate::profile::AddressProfile;

/// Address-ordered map from instruction address to its profile.
///
/// One opcode signature per key within a table.
pub type ProfileTable = BTreeMap<u64, AddressProfile>;

/// Ordered collection of profile tables plus the active-table cursor.
///
/// The front of the list is the most recently created table. For a given
/// address at most one table holds the actively-updated entry for a given
/// opcode; the same address may appear in several tables when it has hosted
/// different opcodes over the run.
#[derive(Debug)]
pub struct Disambiguator {
    tables: Vec<ProfileTable>,
    active: usize,
}

impl Disambiguator {
    /// Start with a single empty table, which is active
    pub fn new() -> Self {
        Self {
            tables: vec![ProfileTable::new()],
            active: 0,
        }
    }

    /// Number of tables currently allocated
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Index of the active table
    pub fn active_index(&self) -> usize {
        self.active
    }

    /// Make the table at `idx` active
    pub fn set_active(&mut self, idx: usize) {
        debug_assert!(idx < self.tables.len());
        self.active = idx;
    }

    pub fn table(&self, idx: usize) -> &ProfileTable {
        &self.tables[idx]
    }

    pub fn table_mut(&mut self, idx: usize) -> &mut ProfileTable {
        &mut self.tables[idx]
    }

    pub fn active_table_mut(&mut self) -> &mut ProfileTable {
        &mut self.tables[self.active]
    }

    /// Tables from most recently created to oldest
    pub fn tables(&self) -> &[ProfileTable] {
        &self.tables
    }

    /// Allocate a fresh table at the front of the list, make it active, and
    /// return its index (always 0)
    pub fn prepend_table(&mut self) -> usize {
        tracing::debug!(tables = self.tables.len() + 1, "allocating profile table");
        self.tables.insert(0, ProfileTable::new());
        self.active = 0;
        self.active
    }

    /// Total entries across all tables
    pub fn entry_count(&self) -> usize {
        self.tables.iter().map(BTreeMap::len).sum()
    }
}

impl Default for Disambiguator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::OpcodeWidth;

    #[test]
    fn test_new_has_one_active_table() {
        let tables = Disambiguator::new();
        assert_eq!(tables.table_count(), 1);
        assert_eq!(tables.active_index(), 0);
        assert_eq!(tables.entry_count(), 0);
    }

    #[test]
    fn test_prepend_table_becomes_active_front() {
        let mut tables = Disambiguator::new();
        tables
            .active_table_mut()
            .insert(0x100, AddressProfile::new(0x1, OpcodeWidth::Word, 0));

        let idx = tables.prepend_table();
        assert_eq!(idx, 0);
        assert_eq!(tables.table_count(), 2);
        assert_eq!(tables.active_index(), 0);
        // the old table (now at index 1) keeps its entry
        assert!(tables.table(0).is_empty());
        assert!(tables.table(1).contains_key(&0x100));
    }

    #[test]
    fn test_table_iteration_is_address_ascending() {
        let mut tables = Disambiguator::new();
        let table = tables.active_table_mut();
        table.insert(0x300, AddressProfile::new(0x3, OpcodeWidth::Word, 0));
        table.insert(0x100, AddressProfile::new(0x1, OpcodeWidth::Word, 0));
        table.insert(0x200, AddressProfile::new(0x2, OpcodeWidth::Word, 0));

        let addrs: Vec<u64> = tables.table(0).keys().copied().collect();
        assert_eq!(addrs, vec![0x100, 0x200, 0x300]);
    }

    #[test]
    fn test_set_active() {
        let mut tables = Disambiguator::new();
        tables.prepend_table();
        tables.set_active(1);
        assert_eq!(tables.active_index(), 1);
    }

    #[test]
    fn test_entry_count_spans_tables() {
        let mut tables = Disambiguator::new();
        tables
            .active_table_mut()
            .insert(0x100, AddressProfile::new(0x1, OpcodeWidth::Word, 0));
        tables.prepend_table();
        tables
            .active_table_mut()
            .insert(0x100, AddressProfile::new(0x2, OpcodeWidth::Word, 0));
        assert_eq!(tables.entry_count(), 2);
    }
}
