use indexmap::IndexMap;
use thiserror::Error;

/// Opcode of `PUSH0`; `PUSHn` is `PUSH_BASE + n`.
pub const PUSH_BASE: u8 = 0x5F;
pub const PUSH1: u8 = 0x60;
pub const PUSH2: u8 = 0x61;
pub const PUSH32: u8 = 0x7F;
pub const JUMPDEST: u8 = 0x5B;
pub const MAX_PUSH_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("push payload must be 1 to {MAX_PUSH_BYTES} bytes, got {len}")]
    PayloadWidth { len: usize },
}

/// Opcode byte for a push of `len` payload bytes.
pub fn push_opcode(len: usize) -> Result<u8, EncodeError> {
    if len == 0 || len > MAX_PUSH_BYTES {
        return Err(EncodeError::PayloadWidth { len });
    }
    Ok(PUSH_BASE + len as u8)
}

/// Payload width carried by `opcode`, zero for anything but `PUSH1..=PUSH32`.
pub fn push_width(opcode: u8) -> usize {
    if (PUSH1..=PUSH32).contains(&opcode) {
        usize::from(opcode - PUSH_BASE)
    } else {
        0
    }
}

const NAMED_OPCODES: &[(&str, u8)] = &[
    ("stop", 0x00),
    ("add", 0x01),
    ("mul", 0x02),
    ("sub", 0x03),
    ("div", 0x04),
    ("sdiv", 0x05),
    ("mod", 0x06),
    ("smod", 0x07),
    ("addmod", 0x08),
    ("mulmod", 0x09),
    ("exp", 0x0A),
    ("signextend", 0x0B),
    ("lt", 0x10),
    ("gt", 0x11),
    ("slt", 0x12),
    ("sgt", 0x13),
    ("eq", 0x14),
    ("iszero", 0x15),
    ("and", 0x16),
    ("or", 0x17),
    ("xor", 0x18),
    ("not", 0x19),
    ("byte", 0x1A),
    ("shl", 0x1B),
    ("shr", 0x1C),
    ("sar", 0x1D),
    ("sha3", 0x20),
    ("address", 0x30),
    ("balance", 0x31),
    ("origin", 0x32),
    ("caller", 0x33),
    ("callvalue", 0x34),
    ("calldataload", 0x35),
    ("calldatasize", 0x36),
    ("calldatacopy", 0x37),
    ("codesize", 0x38),
    ("codecopy", 0x39),
    ("gasprice", 0x3A),
    ("extcodesize", 0x3B),
    ("extcodecopy", 0x3C),
    ("returndatasize", 0x3D),
    ("returndatacopy", 0x3E),
    ("extcodehash", 0x3F),
    ("blockhash", 0x40),
    ("coinbase", 0x41),
    ("timestamp", 0x42),
    ("number", 0x43),
    ("difficulty", 0x44),
    ("gaslimit", 0x45),
    ("chainid", 0x46),
    ("selfbalance", 0x47),
    ("basefee", 0x48),
    ("pop", 0x50),
    ("mload", 0x51),
    ("mstore", 0x52),
    ("mstore8", 0x53),
    ("sload", 0x54),
    ("sstore", 0x55),
    ("jump", 0x56),
    ("jumpi", 0x57),
    ("pc", 0x58),
    ("msize", 0x59),
    ("gas", 0x5A),
    ("jumpdest", JUMPDEST),
    ("push0", PUSH_BASE),
    ("create", 0xF0),
    ("call", 0xF1),
    ("callcode", 0xF2),
    ("return", 0xF3),
    ("delegatecall", 0xF4),
    ("create2", 0xF5),
    ("staticcall", 0xFA),
    ("revert", 0xFD),
    ("invalid", 0xFE),
    ("selfdestruct", 0xFF),
];

/// Mnemonic to byte mapping, fixed once a compilation starts.
#[derive(Debug, Clone)]
pub struct OpcodeTable {
    by_mnemonic: IndexMap<String, u8>,
    by_opcode: Vec<Option<String>>,
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self::evm()
    }
}

impl OpcodeTable {
    pub fn empty() -> Self {
        Self {
            by_mnemonic: IndexMap::new(),
            by_opcode: vec![None; 256],
        }
    }

    pub fn evm() -> Self {
        let mut table = Self::empty();
        for (mnemonic, opcode) in NAMED_OPCODES {
            table.insert(*mnemonic, *opcode);
        }
        table.insert("keccak256", 0x20);
        for n in 1..=32u8 {
            table.insert(format!("push{n}"), PUSH_BASE + n);
        }
        for n in 1..=16u8 {
            table.insert(format!("dup{n}"), 0x7F + n);
            table.insert(format!("swap{n}"), 0x8F + n);
        }
        for n in 0..=4u8 {
            table.insert(format!("log{n}"), 0xA0 + n);
        }
        table
    }

    /// Adds or overrides a mnemonic. The first name registered for a byte is
    /// the one used when disassembling.
    pub fn insert(&mut self, mnemonic: impl Into<String>, opcode: u8) {
        let mnemonic = mnemonic.into();
        let slot = &mut self.by_opcode[usize::from(opcode)];
        if slot.is_none() {
            *slot = Some(mnemonic.clone());
        }
        self.by_mnemonic.insert(mnemonic, opcode);
    }

    pub fn opcode(&self, mnemonic: &str) -> Option<u8> {
        self.by_mnemonic.get(mnemonic).copied()
    }

    pub fn is_mnemonic(&self, word: &str) -> bool {
        self.by_mnemonic.contains_key(word)
    }

    pub fn mnemonic(&self, opcode: u8) -> Option<&str> {
        self.by_opcode[usize::from(opcode)].as_deref()
    }

    pub fn len(&self) -> usize {
        self.by_mnemonic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_mnemonic.is_empty()
    }
}

#[derive(Debug)]
pub struct DecodedInstruction<'a> {
    pub opcode: u8,
    pub mnemonic: Option<&'a str>,
    pub operand: &'a [u8],
}

impl DecodedInstruction<'_> {
    pub fn len(&self) -> usize {
        1 + self.operand.len()
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("cannot decode instruction from empty byte slice")]
    EmptyInput,
    #[error(
        "truncated instruction for opcode {opcode:#04X}: expected {expected} operand bytes, got {actual}"
    )]
    Truncated {
        opcode: u8,
        expected: usize,
        actual: usize,
    },
}

pub fn decode_instruction<'a>(
    bytes: &'a [u8],
    table: &'a OpcodeTable,
) -> Result<DecodedInstruction<'a>, DecodeError> {
    let (&opcode, rest) = bytes.split_first().ok_or(DecodeError::EmptyInput)?;
    let width = push_width(opcode);
    if rest.len() < width {
        return Err(DecodeError::Truncated {
            opcode,
            expected: width,
            actual: rest.len(),
        });
    }

    Ok(DecodedInstruction {
        opcode,
        mnemonic: table.mnemonic(opcode),
        operand: &rest[..width],
    })
}

pub fn format_instruction(decoded: &DecodedInstruction<'_>) -> String {
    let Some(mnemonic) = decoded.mnemonic else {
        return format!(".byte {:#04x}", decoded.opcode);
    };
    if decoded.operand.is_empty() {
        return mnemonic.to_string();
    }
    let mut operand = String::with_capacity(2 + decoded.operand.len() * 2);
    operand.push_str("0x");
    for byte in decoded.operand {
        operand.push_str(&format!("{byte:02x}"));
    }
    format!("{mnemonic} {operand}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evm_table_has_expected_opcodes() {
        let table = OpcodeTable::evm();
        assert_eq!(table.opcode("add"), Some(0x01));
        assert_eq!(table.opcode("jumpdest"), Some(JUMPDEST));
        assert_eq!(table.opcode("push2"), Some(PUSH2));
        assert_eq!(table.opcode("dup4"), Some(0x83));
        assert_eq!(table.opcode("swap2"), Some(0x91));
        assert_eq!(table.opcode("log4"), Some(0xA4));
        assert_eq!(table.opcode("ADD"), None);
    }

    #[test]
    fn first_registered_name_wins_for_disassembly() {
        let table = OpcodeTable::evm();
        assert_eq!(table.mnemonic(0x20), Some("sha3"));
        assert_eq!(table.opcode("keccak256"), Some(0x20));
    }

    #[test]
    fn push_opcode_bounds() {
        assert_eq!(push_opcode(1).expect("push1"), PUSH1);
        assert_eq!(push_opcode(32).expect("push32"), PUSH32);
        assert!(push_opcode(0).is_err());
        assert!(push_opcode(33).is_err());
    }

    #[test]
    fn decodes_push_with_operand() {
        let table = OpcodeTable::evm();
        let decoded = decode_instruction(&[0x61, 0x12, 0x34, 0x01], &table).expect("decode");
        assert_eq!(decoded.len(), 3);
        assert_eq!(format_instruction(&decoded), "push2 0x1234");
    }

    #[test]
    fn reports_truncated_push() {
        let table = OpcodeTable::evm();
        let err = decode_instruction(&[0x62, 0x00], &table).expect_err("must fail");
        assert!(matches!(
            err,
            DecodeError::Truncated {
                opcode: 0x62,
                expected: 3,
                actual: 1
            }
        ));
    }

    #[test]
    fn formats_unassigned_bytes() {
        let table = OpcodeTable::evm();
        let decoded = decode_instruction(&[0x0C], &table).expect("decode");
        assert_eq!(format_instruction(&decoded), ".byte 0x0c");
    }
}
