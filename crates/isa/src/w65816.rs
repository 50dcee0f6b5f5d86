use crate::{InstructionSet, Layout, Platform, TableBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum AddressingMode {
    Implied,
    Accumulator,
    Immediate8,
    Immediate16,
    ImmediateM,
    ImmediateX,
    DirectPage,
    DirectPageX,
    DirectPageY,
    DirectPageIndirect,
    DirectPageIndirectLong,
    DirectPageIndexedIndirectX,
    DirectPageIndirectIndexedY,
    DirectPageIndirectLongIndexedY,
    StackRelative,
    StackRelativeIndirectIndexedY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    AbsoluteLong,
    AbsoluteLongX,
    AbsoluteIndirect,
    AbsoluteIndexedIndirectX,
    AbsoluteIndirectLong,
    Relative8,
    Relative16,
    BlockMove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpcodeDescriptor {
    mnemonic: &'static str,
    mode: AddressingMode,
}

macro_rules! op {
    ($mnemonic:literal, $mode:ident) => {
        OpcodeDescriptor {
            mnemonic: $mnemonic,
            mode: AddressingMode::$mode,
        }
    };
}

const OPCODE_TABLE: [OpcodeDescriptor; 256] = [
    // 0x00
    op!("brk", Immediate8),
    op!("ora", DirectPageIndexedIndirectX),
    op!("cop", Immediate8),
    op!("ora", StackRelative),
    op!("tsb", DirectPage),
    op!("ora", DirectPage),
    op!("asl", DirectPage),
    op!("ora", DirectPageIndirectLong),
    op!("php", Implied),
    op!("ora", ImmediateM),
    op!("asl", Accumulator),
    op!("phd", Implied),
    op!("tsb", Absolute),
    op!("ora", Absolute),
    op!("asl", Absolute),
    op!("ora", AbsoluteLong),
    // 0x10
    op!("bpl", Relative8),
    op!("ora", DirectPageIndirectIndexedY),
    op!("ora", DirectPageIndirect),
    op!("ora", StackRelativeIndirectIndexedY),
    op!("trb", DirectPage),
    op!("ora", DirectPageX),
    op!("asl", DirectPageX),
    op!("ora", DirectPageIndirectLongIndexedY),
    op!("clc", Implied),
    op!("ora", AbsoluteY),
    op!("inc", Accumulator),
    op!("tcs", Implied),
    op!("trb", Absolute),
    op!("ora", AbsoluteX),
    op!("asl", AbsoluteX),
    op!("ora", AbsoluteLongX),
    // 0x20
    op!("jsr", Absolute),
    op!("and", DirectPageIndexedIndirectX),
    op!("jsl", AbsoluteLong),
    op!("and", StackRelative),
    op!("bit", DirectPage),
    op!("and", DirectPage),
    op!("rol", DirectPage),
    op!("and", DirectPageIndirectLong),
    op!("plp", Implied),
    op!("and", ImmediateM),
    op!("rol", Accumulator),
    op!("pld", Implied),
    op!("bit", Absolute),
    op!("and", Absolute),
    op!("rol", Absolute),
    op!("and", AbsoluteLong),
    // 0x30
    op!("bmi", Relative8),
    op!("and", DirectPageIndirectIndexedY),
    op!("and", DirectPageIndirect),
    op!("and", StackRelativeIndirectIndexedY),
    op!("bit", DirectPageX),
    op!("and", DirectPageX),
    op!("rol", DirectPageX),
    op!("and", DirectPageIndirectLongIndexedY),
    op!("sec", Implied),
    op!("and", AbsoluteY),
    op!("dec", Accumulator),
    op!("tsc", Implied),
    op!("bit", AbsoluteX),
    op!("and", AbsoluteX),
    op!("rol", AbsoluteX),
    op!("and", AbsoluteLongX),
    // 0x40
    op!("rti", Implied),
    op!("eor", DirectPageIndexedIndirectX),
    op!("wdm", Immediate8),
    op!("eor", StackRelative),
    op!("mvp", BlockMove),
    op!("eor", DirectPage),
    op!("lsr", DirectPage),
    op!("eor", DirectPageIndirectLong),
    op!("pha", Implied),
    op!("eor", ImmediateM),
    op!("lsr", Accumulator),
    op!("phk", Implied),
    op!("jmp", Absolute),
    op!("eor", Absolute),
    op!("lsr", Absolute),
    op!("eor", AbsoluteLong),
    // 0x50
    op!("bvc", Relative8),
    op!("eor", DirectPageIndirectIndexedY),
    op!("eor", DirectPageIndirect),
    op!("eor", StackRelativeIndirectIndexedY),
    op!("mvn", BlockMove),
    op!("eor", DirectPageX),
    op!("lsr", DirectPageX),
    op!("eor", DirectPageIndirectLongIndexedY),
    op!("cli", Implied),
    op!("eor", AbsoluteY),
    op!("phy", Implied),
    op!("tcd", Implied),
    op!("jml", AbsoluteLong),
    op!("eor", AbsoluteX),
    op!("lsr", AbsoluteX),
    op!("eor", AbsoluteLongX),
    // 0x60
    op!("rts", Implied),
    op!("adc", DirectPageIndexedIndirectX),
    op!("per", Relative16),
    op!("adc", StackRelative),
    op!("stz", DirectPage),
    op!("adc", DirectPage),
    op!("ror", DirectPage),
    op!("adc", DirectPageIndirectLong),
    op!("pla", Implied),
    op!("adc", ImmediateM),
    op!("ror", Accumulator),
    op!("rtl", Implied),
    op!("jmp", AbsoluteIndirect),
    op!("adc", Absolute),
    op!("ror", Absolute),
    op!("adc", AbsoluteLong),
    // 0x70
    op!("bvs", Relative8),
    op!("adc", DirectPageIndirectIndexedY),
    op!("adc", DirectPageIndirect),
    op!("adc", StackRelativeIndirectIndexedY),
    op!("stz", DirectPageX),
    op!("adc", DirectPageX),
    op!("ror", DirectPageX),
    op!("adc", DirectPageIndirectLongIndexedY),
    op!("sei", Implied),
    op!("adc", AbsoluteY),
    op!("ply", Implied),
    op!("tdc", Implied),
    op!("jmp", AbsoluteIndexedIndirectX),
    op!("adc", AbsoluteX),
    op!("ror", AbsoluteX),
    op!("adc", AbsoluteLongX),
    // 0x80
    op!("bra", Relative8),
    op!("sta", DirectPageIndexedIndirectX),
    op!("brl", Relative16),
    op!("sta", StackRelative),
    op!("sty", DirectPage),
    op!("sta", DirectPage),
    op!("stx", DirectPage),
    op!("sta", DirectPageIndirectLong),
    op!("dey", Implied),
    op!("bit", ImmediateM),
    op!("txa", Implied),
    op!("phb", Implied),
    op!("sty", Absolute),
    op!("sta", Absolute),
    op!("stx", Absolute),
    op!("sta", AbsoluteLong),
    // 0x90
    op!("bcc", Relative8),
    op!("sta", DirectPageIndirectIndexedY),
    op!("sta", DirectPageIndirect),
    op!("sta", StackRelativeIndirectIndexedY),
    op!("sty", DirectPageX),
    op!("sta", DirectPageX),
    op!("stx", DirectPageY),
    op!("sta", DirectPageIndirectLongIndexedY),
    op!("tya", Implied),
    op!("sta", AbsoluteY),
    op!("txs", Implied),
    op!("txy", Implied),
    op!("stz", Absolute),
    op!("sta", AbsoluteX),
    op!("stz", AbsoluteX),
    op!("sta", AbsoluteLongX),
    // 0xA0
    op!("ldy", ImmediateX),
    op!("lda", DirectPageIndexedIndirectX),
    op!("ldx", ImmediateX),
    op!("lda", StackRelative),
    op!("ldy", DirectPage),
    op!("lda", DirectPage),
    op!("ldx", DirectPage),
    op!("lda", DirectPageIndirectLong),
    op!("tay", Implied),
    op!("lda", ImmediateM),
    op!("tax", Implied),
    op!("plb", Implied),
    op!("ldy", Absolute),
    op!("lda", Absolute),
    op!("ldx", Absolute),
    op!("lda", AbsoluteLong),
    // 0xB0
    op!("bcs", Relative8),
    op!("lda", DirectPageIndirectIndexedY),
    op!("lda", DirectPageIndirect),
    op!("lda", StackRelativeIndirectIndexedY),
    op!("ldy", DirectPageX),
    op!("lda", DirectPageX),
    op!("ldx", DirectPageY),
    op!("lda", DirectPageIndirectLongIndexedY),
    op!("clv", Implied),
    op!("lda", AbsoluteY),
    op!("tsx", Implied),
    op!("tyx", Implied),
    op!("ldy", AbsoluteX),
    op!("lda", AbsoluteX),
    op!("ldx", AbsoluteY),
    op!("lda", AbsoluteLongX),
    // 0xC0
    op!("cpy", ImmediateX),
    op!("cmp", DirectPageIndexedIndirectX),
    op!("rep", Immediate8),
    op!("cmp", StackRelative),
    op!("cpy", DirectPage),
    op!("cmp", DirectPage),
    op!("dec", DirectPage),
    op!("cmp", DirectPageIndirectLong),
    op!("iny", Implied),
    op!("cmp", ImmediateM),
    op!("dex", Implied),
    op!("wai", Implied),
    op!("cpy", Absolute),
    op!("cmp", Absolute),
    op!("dec", Absolute),
    op!("cmp", AbsoluteLong),
    // 0xD0
    op!("bne", Relative8),
    op!("cmp", DirectPageIndirectIndexedY),
    op!("cmp", DirectPageIndirect),
    op!("cmp", StackRelativeIndirectIndexedY),
    op!("pei", DirectPageIndirect),
    op!("cmp", DirectPageX),
    op!("dec", DirectPageX),
    op!("cmp", DirectPageIndirectLongIndexedY),
    op!("cld", Implied),
    op!("cmp", AbsoluteY),
    op!("phx", Implied),
    op!("stp", Implied),
    op!("jmp", AbsoluteIndirectLong),
    op!("cmp", AbsoluteX),
    op!("dec", AbsoluteX),
    op!("cmp", AbsoluteLongX),
    // 0xE0
    op!("cpx", ImmediateX),
    op!("sbc", DirectPageIndexedIndirectX),
    op!("sep", Immediate8),
    op!("sbc", StackRelative),
    op!("cpx", DirectPage),
    op!("sbc", DirectPage),
    op!("inc", DirectPage),
    op!("sbc", DirectPageIndirectLong),
    op!("inx", Implied),
    op!("sbc", ImmediateM),
    op!("nop", Implied),
    op!("xba", Implied),
    op!("cpx", Absolute),
    op!("sbc", Absolute),
    op!("inc", Absolute),
    op!("sbc", AbsoluteLong),
    // 0xF0
    op!("beq", Relative8),
    op!("sbc", DirectPageIndirectIndexedY),
    op!("sbc", DirectPageIndirect),
    op!("sbc", StackRelativeIndirectIndexedY),
    op!("pea", Immediate16),
    op!("sbc", DirectPageX),
    op!("inc", DirectPageX),
    op!("sbc", DirectPageIndirectLongIndexedY),
    op!("sed", Implied),
    op!("sbc", AbsoluteY),
    op!("plx", Implied),
    op!("xce", Implied),
    op!("jsr", AbsoluteIndexedIndirectX),
    op!("sbc", AbsoluteX),
    op!("inc", AbsoluteX),
    op!("sbc", AbsoluteLongX),
];

/// Opcodes the original NMOS 6502 documents; everything else in the table is 65C816-only.
const NMOS_OPCODES: [u8; 151] = [
    0x00, 0x01, 0x05, 0x06, 0x08, 0x09, 0x0A, 0x0D, 0x0E, 0x10, 0x11, 0x15, 0x16, 0x18, 0x19,
    0x1D, 0x1E, 0x20, 0x21, 0x24, 0x25, 0x26, 0x28, 0x29, 0x2A, 0x2C, 0x2D, 0x2E, 0x30, 0x31,
    0x35, 0x36, 0x38, 0x39, 0x3D, 0x3E, 0x40, 0x41, 0x45, 0x46, 0x48, 0x49, 0x4A, 0x4C, 0x4D,
    0x4E, 0x50, 0x51, 0x55, 0x56, 0x58, 0x59, 0x5D, 0x5E, 0x60, 0x61, 0x65, 0x66, 0x68, 0x69,
    0x6A, 0x6C, 0x6D, 0x6E, 0x70, 0x71, 0x75, 0x76, 0x78, 0x79, 0x7D, 0x7E, 0x81, 0x84, 0x85,
    0x86, 0x88, 0x8A, 0x8C, 0x8D, 0x8E, 0x90, 0x91, 0x94, 0x95, 0x96, 0x98, 0x99, 0x9A, 0x9D,
    0xA0, 0xA1, 0xA2, 0xA4, 0xA5, 0xA6, 0xA8, 0xA9, 0xAA, 0xAC, 0xAD, 0xAE, 0xB0, 0xB1, 0xB4,
    0xB5, 0xB6, 0xB8, 0xB9, 0xBA, 0xBC, 0xBD, 0xBE, 0xC0, 0xC1, 0xC4, 0xC5, 0xC6, 0xC8, 0xC9,
    0xCA, 0xCC, 0xCD, 0xCE, 0xD0, 0xD1, 0xD5, 0xD6, 0xD8, 0xD9, 0xDD, 0xDE, 0xE0, 0xE1, 0xE4,
    0xE5, 0xE6, 0xE8, 0xE9, 0xEA, 0xEC, 0xED, 0xEE, 0xF0, 0xF1, 0xF5, 0xF6, 0xF8, 0xF9, 0xFD,
    0xFE,
];

/// Operand templates for an addressing mode, as `(pattern, layout, operand width)`.
fn mode_forms(mode: AddressingMode, wide_immediates: bool) -> Vec<(&'static str, Layout, u8)> {
    use AddressingMode as M;
    use Layout::{Fixed, Relative, Value};

    match mode {
        M::Implied => vec![("", Fixed, 0)],
        M::Accumulator => vec![("A", Fixed, 0), ("", Fixed, 0)],
        M::Immediate8 => vec![("#[exp]", Value, 1)],
        M::ImmediateM | M::ImmediateX if wide_immediates => {
            vec![("#[exp]", Value, 1), ("#[exp]", Value, 2)]
        }
        M::ImmediateM | M::ImmediateX => vec![("#[exp]", Value, 1)],
        M::Immediate16 => vec![("[exp]", Value, 2), ("#[exp]", Value, 2)],
        M::DirectPage => vec![("[exp]", Value, 1)],
        M::Absolute => vec![("[exp]", Value, 2)],
        M::AbsoluteLong => vec![("[exp]", Value, 3)],
        M::DirectPageX => vec![("[exp],X", Value, 1)],
        M::AbsoluteX => vec![("[exp],X", Value, 2)],
        M::AbsoluteLongX => vec![("[exp],X", Value, 3)],
        M::DirectPageY => vec![("[exp],Y", Value, 1)],
        M::AbsoluteY => vec![("[exp],Y", Value, 2)],
        M::DirectPageIndirect => vec![("([exp])", Value, 1)],
        M::AbsoluteIndirect => vec![("([exp])", Value, 2)],
        M::DirectPageIndirectLong => vec![("[[exp]]", Value, 1)],
        M::AbsoluteIndirectLong => vec![("[[exp]]", Value, 2)],
        M::DirectPageIndexedIndirectX => vec![("([exp],X)", Value, 1)],
        M::AbsoluteIndexedIndirectX => vec![("([exp],X)", Value, 2)],
        M::DirectPageIndirectIndexedY => vec![("([exp]),Y", Value, 1)],
        M::DirectPageIndirectLongIndexedY => vec![("[[exp]],Y", Value, 1)],
        M::StackRelative => vec![("[exp],S", Value, 1)],
        M::StackRelativeIndirectIndexedY => vec![("([exp],S),Y", Value, 1)],
        M::Relative8 => vec![("[exp]", Relative, 1)],
        M::Relative16 => vec![("[exp]", Relative, 2)],
        M::BlockMove => vec![("[exp],[exp]", Layout::Pair { reversed: true }, 2)],
    }
}

fn add_descriptor(builder: &mut TableBuilder, opcode: u8, wide_immediates: bool) {
    let descriptor = OPCODE_TABLE[usize::from(opcode)];
    for (pattern, layout, width) in mode_forms(descriptor.mode, wide_immediates) {
        builder.add(descriptor.mnemonic, pattern, layout, width, &[opcode]);
    }
}

pub(crate) fn build_w65816() -> InstructionSet {
    let mut builder = TableBuilder::default();
    for opcode in 0..=u8::MAX {
        add_descriptor(&mut builder, opcode, true);
    }
    // brk and cop are commonly written without the signature byte.
    builder.add("brk", "", Layout::Fixed, 0, &[0x00]);
    builder.add("brk", "[exp]", Layout::Value, 1, &[0x00]);
    builder.add("cop", "[exp]", Layout::Value, 1, &[0x02]);
    builder.add("jml", "[[exp]]", Layout::Value, 2, &[0xDC]);
    builder.finish(Platform::W65816)
}

pub(crate) fn build_mos6502() -> InstructionSet {
    let mut builder = TableBuilder::default();
    for opcode in NMOS_OPCODES {
        add_descriptor(&mut builder, opcode, false);
    }
    builder.add("brk", "", Layout::Fixed, 0, &[0x00]);
    builder.finish(Platform::Mos6502)
}
