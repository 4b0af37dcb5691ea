//! Disassembly collaborator boundary
//!
//! Report generation needs text for each (address, opcode) pair but never
//! decodes anything itself. Callers with a real disassembler implement
//! `Disassemble`; the built-in fallback names RISC-V major-opcode classes so
//! reports stay readable without one.

/// A pure `(address, opcode) -> text` disassembler
pub trait Disassemble {
    fn disassemble(&self, pc: u64, opcode: u32) -> String;
}

/// Fallback disassembler: classifies by RISC-V major opcode
#[derive(Debug, Default)]
pub struct OpcodeClassDisassembler;

impl Disassemble for OpcodeClassDisassembler {
    fn disassemble(&self, _pc: u64, opcode: u32) -> String {
        // Compressed encodings keep the low two bits below 0b11
        if opcode & 0b11 != 0b11 {
            return format!(".insn.c 0x{:04x}", opcode & 0xffff);
        }
        let class = match opcode & 0x7f {
            0x03 => "load",
            0x0f => "fence",
            0x13 => "op-imm",
            0x17 => "auipc",
            0x1b => "op-imm-32",
            0x23 => "store",
            0x2f => "amo",
            0x33 => "op",
            0x37 => "lui",
            0x3b => "op-32",
            0x63 => "branch",
            0x67 => "jalr",
            0x6f => "jal",
            0x73 => "system",
            _ => return format!(".insn 0x{opcode:08x}"),
        };
        class.to_string()
    }
}
