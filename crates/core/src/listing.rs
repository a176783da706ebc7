use huffc_isa::{OpcodeTable, decode_instruction, format_instruction};

use crate::span::SourceLocation;

/// One line per instruction: offset, raw bytes, disassembly and the source
/// line the first byte came from.
pub fn format_listing(bytecode: &[u8], sourcemap: &[SourceLocation], opcodes: &OpcodeTable) -> String {
    let mut out = String::new();
    let mut offset = 0;
    while offset < bytecode.len() {
        let (len, asm) = match decode_instruction(&bytecode[offset..], opcodes) {
            Ok(decoded) => (decoded.len(), format_instruction(&decoded)),
            Err(_) => (1, format!(".byte {:#04x}", bytecode[offset])),
        };
        let raw = &bytecode[offset..offset + len];
        let hex = raw
            .iter()
            .map(|byte| format!("{byte:02X}"))
            .collect::<Vec<_>>()
            .join(" ");

        let mut line = format!("{offset:04X}: {hex:<8} {asm:<20}");
        if let Some(location) = sourcemap.get(offset) {
            line.push_str(&format!(
                " ; {}  {}",
                location.display_position(),
                location.line_text.trim()
            ));
        }
        out.push_str(line.trim_end());
        out.push('\n');
        offset += len;
    }
    out
}
