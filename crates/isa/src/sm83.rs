use crate::{InstructionSet, Layout, Platform, TableBuilder};

const REGISTERS: [&str; 8] = ["B", "C", "D", "E", "H", "L", "[HL]", "A"];
const PAIRS: [&str; 4] = ["BC", "DE", "HL", "SP"];
const STACK_PAIRS: [&str; 4] = ["BC", "DE", "HL", "AF"];
const CONDITIONS: [&str; 4] = ["NZ", "Z", "NC", "C"];
const ALU: [&str; 8] = ["add", "adc", "sub", "sbc", "and", "xor", "or", "cp"];
const ROTATES: [&str; 8] = ["rlc", "rrc", "rl", "rr", "sla", "sra", "swap", "srl"];

/// Adds a form under both memory-operand spellings, `[hl]` and `(hl)`.
fn add(builder: &mut TableBuilder, mnemonic: &str, pattern: &str, layout: Layout, width: u8, opcode: &[u8]) {
    builder.add(mnemonic, pattern, layout, width, opcode);
    let parenthesized = parenthesize(pattern);
    if parenthesized != pattern {
        builder.add(mnemonic, &parenthesized, layout, width, opcode);
    }
}

fn parenthesize(pattern: &str) -> String {
    pattern
        .split("[exp]")
        .map(|literal| literal.replace('[', "(").replace(']', ")"))
        .collect::<Vec<_>>()
        .join("[exp]")
}

fn fixed(builder: &mut TableBuilder, mnemonic: &str, pattern: &str, opcode: &[u8]) {
    add(builder, mnemonic, pattern, Layout::Fixed, 0, opcode);
}

pub(crate) fn build() -> InstructionSet {
    let mut b = TableBuilder::default();

    for (mnemonic, opcode) in [
        ("nop", 0x00),
        ("halt", 0x76),
        ("di", 0xF3),
        ("ei", 0xFB),
        ("daa", 0x27),
        ("cpl", 0x2F),
        ("scf", 0x37),
        ("ccf", 0x3F),
        ("rlca", 0x07),
        ("rrca", 0x0F),
        ("rla", 0x17),
        ("rra", 0x1F),
        ("reti", 0xD9),
    ] {
        fixed(&mut b, mnemonic, "", &[opcode]);
    }
    fixed(&mut b, "stop", "", &[0x10, 0x00]);
    fixed(&mut b, "cpl", "A", &[0x2F]);

    // 8-bit loads
    for (dst, dst_name) in REGISTERS.iter().enumerate() {
        for (src, src_name) in REGISTERS.iter().enumerate() {
            if dst == 6 && src == 6 {
                continue;
            }
            let opcode = 0x40 + (dst as u8) * 8 + src as u8;
            fixed(&mut b, "ld", &format!("{dst_name},{src_name}"), &[opcode]);
        }
        let opcode = 0x06 + (dst as u8) * 8;
        add(&mut b, "ld", &format!("{dst_name},[exp]"), Layout::Value, 1, &[opcode]);
    }
    for (pattern, opcode) in [
        ("[BC],A", 0x02),
        ("[DE],A", 0x12),
        ("[HL+],A", 0x22),
        ("[HLI],A", 0x22),
        ("[HL-],A", 0x32),
        ("[HLD],A", 0x32),
        ("A,[BC]", 0x0A),
        ("A,[DE]", 0x1A),
        ("A,[HL+]", 0x2A),
        ("A,[HLI]", 0x2A),
        ("A,[HL-]", 0x3A),
        ("A,[HLD]", 0x3A),
        ("[C],A", 0xE2),
        ("[$FF00+C],A", 0xE2),
        ("A,[C]", 0xF2),
        ("A,[$FF00+C]", 0xF2),
        ("SP,HL", 0xF9),
    ] {
        fixed(&mut b, "ld", pattern, &[opcode]);
    }
    add(&mut b, "ld", "[[exp]],A", Layout::Value, 2, &[0xEA]);
    add(&mut b, "ld", "A,[[exp]]", Layout::Value, 2, &[0xFA]);
    add(&mut b, "ld", "[[exp]],SP", Layout::Value, 2, &[0x08]);
    add(&mut b, "ld", "HL,SP+[exp]", Layout::SignedByte, 1, &[0xF8]);
    for (pattern, opcode) in [("[HL],A", 0x22), ("A,[HL]", 0x2A)] {
        fixed(&mut b, "ldi", pattern, &[opcode]);
    }
    for (pattern, opcode) in [("[HL],A", 0x32), ("A,[HL]", 0x3A)] {
        fixed(&mut b, "ldd", pattern, &[opcode]);
    }
    fixed(&mut b, "ldh", "[C],A", &[0xE2]);
    fixed(&mut b, "ldh", "A,[C]", &[0xF2]);
    add(&mut b, "ldh", "[[exp]],A", Layout::HighPage, 1, &[0xE0]);
    add(&mut b, "ldh", "A,[[exp]]", Layout::HighPage, 1, &[0xF0]);

    // 16-bit loads and stack
    for (index, pair) in PAIRS.iter().enumerate() {
        let row = (index as u8) << 4;
        add(&mut b, "ld", &format!("{pair},[exp]"), Layout::Value, 2, &[0x01 | row]);
        fixed(&mut b, "inc", pair, &[0x03 | row]);
        fixed(&mut b, "dec", pair, &[0x0B | row]);
        fixed(&mut b, "add", &format!("HL,{pair}"), &[0x09 | row]);
    }
    for (index, pair) in STACK_PAIRS.iter().enumerate() {
        let row = (index as u8) << 4;
        fixed(&mut b, "push", pair, &[0xC5 | row]);
        fixed(&mut b, "pop", pair, &[0xC1 | row]);
    }
    add(&mut b, "add", "SP,[exp]", Layout::SignedByte, 1, &[0xE8]);

    // 8-bit arithmetic
    for (op, mnemonic) in ALU.iter().enumerate() {
        let column = (op as u8) * 8;
        for (src, name) in REGISTERS.iter().enumerate() {
            let opcode = 0x80 + column + src as u8;
            fixed(&mut b, mnemonic, &format!("A,{name}"), &[opcode]);
            fixed(&mut b, mnemonic, name, &[opcode]);
        }
        add(&mut b, mnemonic, "A,[exp]", Layout::Value, 1, &[0xC6 + column]);
        add(&mut b, mnemonic, "[exp]", Layout::Value, 1, &[0xC6 + column]);
    }
    for (reg, name) in REGISTERS.iter().enumerate() {
        let row = (reg as u8) * 8;
        fixed(&mut b, "inc", name, &[0x04 + row]);
        fixed(&mut b, "dec", name, &[0x05 + row]);
    }

    // CB-prefixed rotates, shifts and bit operations
    for (op, mnemonic) in ROTATES.iter().enumerate() {
        for (reg, name) in REGISTERS.iter().enumerate() {
            fixed(&mut b, mnemonic, name, &[0xCB, (op as u8) * 8 + reg as u8]);
        }
    }
    for (mnemonic, base) in [("bit", 0x40u8), ("res", 0x80), ("set", 0xC0)] {
        for (reg, name) in REGISTERS.iter().enumerate() {
            add(
                &mut b,
                mnemonic,
                &format!("[exp],{name}"),
                Layout::BitOpcode { shift: 3, max: 7 },
                0,
                &[0xCB, base + reg as u8],
            );
        }
    }

    // Control flow
    add(&mut b, "jp", "[exp]", Layout::Value, 2, &[0xC3]);
    fixed(&mut b, "jp", "HL", &[0xE9]);
    fixed(&mut b, "jp", "[HL]", &[0xE9]);
    add(&mut b, "jr", "[exp]", Layout::Relative, 1, &[0x18]);
    add(&mut b, "call", "[exp]", Layout::Value, 2, &[0xCD]);
    fixed(&mut b, "ret", "", &[0xC9]);
    for (index, condition) in CONDITIONS.iter().enumerate() {
        let row = (index as u8) << 3;
        add(&mut b, "jp", &format!("{condition},[exp]"), Layout::Value, 2, &[0xC2 | row]);
        add(&mut b, "jr", &format!("{condition},[exp]"), Layout::Relative, 1, &[0x20 | row]);
        add(&mut b, "call", &format!("{condition},[exp]"), Layout::Value, 2, &[0xC4 | row]);
        fixed(&mut b, "ret", condition, &[0xC0 | row]);
    }
    add(&mut b, "rst", "[exp]", Layout::Restart, 0, &[0xC7]);

    b.finish(Platform::Sm83)
}
