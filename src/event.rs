//! Decoded instruction event model
//!
//! One `InstEvent` per executed instruction, produced by an external trace
//! reader/decoder. The profiler never re-decodes: classification only looks at
//! the metadata carried on the event.

use serde::{Deserialize, Serialize};

/// Width class of a decoded opcode (16- or 32-bit encoding)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum OpcodeWidth {
    /// 16-bit (compressed) encoding
    Half,
    /// 32-bit encoding
    Word,
}

impl OpcodeWidth {
    /// Opcode size in bytes
    pub fn bytes(self) -> u64 {
        match self {
            OpcodeWidth::Half => 2,
            OpcodeWidth::Word => 4,
        }
    }
}

impl TryFrom<u8> for OpcodeWidth {
    type Error = String;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            16 => Ok(OpcodeWidth::Half),
            32 => Ok(OpcodeWidth::Word),
            other => Err(format!("invalid opcode width {other}, expected 16 or 32")),
        }
    }
}

impl From<OpcodeWidth> for u8 {
    fn from(width: OpcodeWidth) -> u8 {
        match width {
            OpcodeWidth::Half => 16,
            OpcodeWidth::Word => 32,
        }
    }
}

/// Direction of a memory sub-access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    Read,
    Write,
}

/// One memory sub-access carried by a load/store instruction
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MemAccess {
    /// Target address of the access
    pub addr: u64,
    /// Access size in bytes
    pub size: u32,
    /// Read or write
    pub kind: AccessKind,
}

/// A single decoded instruction execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstEvent {
    /// Program counter
    pub pc: u64,
    /// Physical program counter
    #[serde(default)]
    pub physpc: u64,
    /// Opcode value
    pub opcode: u32,
    /// Opcode width class
    pub width: OpcodeWidth,
    /// Instruction faulted (will be replayed by the trace)
    #[serde(default)]
    pub fault: bool,
    /// Instruction was an interrupt entry
    #[serde(default)]
    pub interrupt: bool,
    /// Hardware thread id
    #[serde(default)]
    pub hw_tid: u32,
    /// Process id
    #[serde(default)]
    pub pid: u32,
    /// Thread id
    #[serde(default)]
    pub tid: u32,
    /// Ordered memory sub-accesses (empty for non-memory instructions)
    #[serde(default)]
    pub mem: Vec<MemAccess>,
    /// Branch outcome: `None` when the decoder could not prove the
    /// instruction is a branch, otherwise the taken predicate
    #[serde(default)]
    pub branch: Option<bool>,
    /// Decode validity; invalid opcodes are reported but still profiled
    #[serde(default = "default_true")]
    pub valid: bool,
}

fn default_true() -> bool {
    true
}

/// Profiling classification of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    /// Load or store; `address` is the target of the last sub-access
    LoadStore { address: u64 },
    /// Branch with its taken/not-taken outcome
    Branch { taken: bool },
    /// Anything else
    Plain,
}

impl InstEvent {
    /// True for events the profiler must discard (replayed by the trace)
    pub fn is_fault(&self) -> bool {
        self.fault || self.interrupt
    }

    /// Classify the event for profiling.
    ///
    /// Instructions carrying both memory accesses and a branch outcome count
    /// as load/store. Only the last sub-access address is recorded.
    pub fn classify(&self) -> EventClass {
        if let Some(access) = self.mem.last() {
            EventClass::LoadStore {
                address: access.addr,
            }
        } else if let Some(taken) = self.branch {
            EventClass::Branch { taken }
        } else {
            EventClass::Plain
        }
    }
}
