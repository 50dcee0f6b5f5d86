use crate::Layout::{Fixed, Relative, Value};
use crate::{InstructionSet, Layout, Platform, TableBuilder};

/// Direct-page and absolute flavours of one operand shape. `!` forces the absolute form.
fn memory(b: &mut TableBuilder, mnemonic: &str, shape: &str, dp: Option<u8>, abs: Option<u8>) {
    let plain = shape.replace('@', "[exp]");
    if let Some(opcode) = dp {
        b.add(mnemonic, &plain, Value, 1, &[opcode]);
    }
    if let Some(opcode) = abs {
        b.add(mnemonic, &plain, Value, 2, &[opcode]);
        b.add(mnemonic, &shape.replace('@', "![exp]"), Value, 2, &[opcode]);
    }
}

fn fixed(b: &mut TableBuilder, mnemonic: &str, pattern: &str, opcode: u8) {
    b.add(mnemonic, pattern, Fixed, 0, &[opcode]);
}

pub(crate) fn build() -> InstructionSet {
    let mut b = TableBuilder::default();

    // mov
    b.add("mov", "A,#[exp]", Value, 1, &[0xE8]);
    fixed(&mut b, "mov", "A,(X)", 0xE6);
    fixed(&mut b, "mov", "A,(X)+", 0xBF);
    memory(&mut b, "mov", "A,@", Some(0xE4), Some(0xE5));
    memory(&mut b, "mov", "A,@+X", Some(0xF4), Some(0xF5));
    memory(&mut b, "mov", "A,@+Y", None, Some(0xF6));
    b.add("mov", "A,[[exp]+X]", Value, 1, &[0xE7]);
    b.add("mov", "A,[[exp]]+Y", Value, 1, &[0xF7]);
    b.add("mov", "X,#[exp]", Value, 1, &[0xCD]);
    memory(&mut b, "mov", "X,@", Some(0xF8), Some(0xE9));
    b.add("mov", "X,[exp]+Y", Value, 1, &[0xF9]);
    b.add("mov", "Y,#[exp]", Value, 1, &[0x8D]);
    memory(&mut b, "mov", "Y,@", Some(0xEB), Some(0xEC));
    b.add("mov", "Y,[exp]+X", Value, 1, &[0xFB]);
    fixed(&mut b, "mov", "(X),A", 0xC6);
    fixed(&mut b, "mov", "(X)+,A", 0xAF);
    memory(&mut b, "mov", "@,A", Some(0xC4), Some(0xC5));
    memory(&mut b, "mov", "@+X,A", Some(0xD4), Some(0xD5));
    memory(&mut b, "mov", "@+Y,A", None, Some(0xD6));
    b.add("mov", "[[exp]+X],A", Value, 1, &[0xC7]);
    b.add("mov", "[[exp]]+Y,A", Value, 1, &[0xD7]);
    memory(&mut b, "mov", "@,X", Some(0xD8), Some(0xC9));
    b.add("mov", "[exp]+Y,X", Value, 1, &[0xD9]);
    memory(&mut b, "mov", "@,Y", Some(0xCB), Some(0xCC));
    b.add("mov", "[exp]+X,Y", Value, 1, &[0xDB]);
    for (pattern, opcode) in [
        ("A,X", 0x7D),
        ("A,Y", 0xDD),
        ("X,A", 0x5D),
        ("Y,A", 0xFD),
        ("X,SP", 0x9D),
        ("SP,X", 0xBD),
    ] {
        fixed(&mut b, "mov", pattern, opcode);
    }
    b.add("mov", "[exp],[exp]", Layout::Pair { reversed: true }, 2, &[0xFA]);
    b.add("mov", "[exp],#[exp]", Layout::Pair { reversed: true }, 2, &[0x8F]);

    // Accumulator arithmetic and logic share one column layout.
    for (mnemonic, base) in [
        ("or", 0x00u8),
        ("and", 0x20),
        ("eor", 0x40),
        ("cmp", 0x60),
        ("adc", 0x80),
        ("sbc", 0xA0),
    ] {
        b.add(mnemonic, "A,#[exp]", Value, 1, &[base + 0x08]);
        fixed(&mut b, mnemonic, "A,(X)", base + 0x06);
        memory(&mut b, mnemonic, "A,@", Some(base + 0x04), Some(base + 0x05));
        memory(&mut b, mnemonic, "A,@+X", Some(base + 0x14), Some(base + 0x15));
        memory(&mut b, mnemonic, "A,@+Y", None, Some(base + 0x16));
        b.add(mnemonic, "A,[[exp]+X]", Value, 1, &[base + 0x07]);
        b.add(mnemonic, "A,[[exp]]+Y", Value, 1, &[base + 0x17]);
        fixed(&mut b, mnemonic, "(X),(Y)", base + 0x19);
        b.add(mnemonic, "[exp],[exp]", Layout::Pair { reversed: true }, 2, &[base + 0x09]);
        b.add(mnemonic, "[exp],#[exp]", Layout::Pair { reversed: true }, 2, &[base + 0x18]);
    }
    b.add("cmp", "X,#[exp]", Value, 1, &[0xC8]);
    memory(&mut b, "cmp", "X,@", Some(0x3E), Some(0x1E));
    b.add("cmp", "Y,#[exp]", Value, 1, &[0xAD]);
    memory(&mut b, "cmp", "Y,@", Some(0x7E), Some(0x5E));

    // Read-modify-write
    for (mnemonic, acc, dp, dpx, abs) in [
        ("inc", 0xBC, 0xAB, 0xBB, 0xAC),
        ("dec", 0x9C, 0x8B, 0x9B, 0x8C),
        ("asl", 0x1C, 0x0B, 0x1B, 0x0C),
        ("lsr", 0x5C, 0x4B, 0x5B, 0x4C),
        ("rol", 0x3C, 0x2B, 0x3B, 0x2C),
        ("ror", 0x7C, 0x6B, 0x7B, 0x6C),
    ] {
        fixed(&mut b, mnemonic, "A", acc);
        memory(&mut b, mnemonic, "@", Some(dp), Some(abs));
        b.add(mnemonic, "[exp]+X", Value, 1, &[dpx]);
    }
    fixed(&mut b, "inc", "X", 0x3D);
    fixed(&mut b, "inc", "Y", 0xFC);
    fixed(&mut b, "dec", "X", 0x1D);
    fixed(&mut b, "dec", "Y", 0xDC);
    fixed(&mut b, "xcn", "A", 0x9F);

    // 16-bit
    b.add("movw", "YA,[exp]", Value, 1, &[0xBA]);
    b.add("movw", "[exp],YA", Value, 1, &[0xDA]);
    b.add("incw", "[exp]", Value, 1, &[0x3A]);
    b.add("decw", "[exp]", Value, 1, &[0x1A]);
    b.add("addw", "YA,[exp]", Value, 1, &[0x7A]);
    b.add("subw", "YA,[exp]", Value, 1, &[0x9A]);
    b.add("cmpw", "YA,[exp]", Value, 1, &[0x5A]);
    fixed(&mut b, "mul", "YA", 0xCF);
    fixed(&mut b, "div", "YA,X", 0x9E);
    fixed(&mut b, "daa", "A", 0xDF);
    fixed(&mut b, "das", "A", 0xBE);

    // Branches
    for (mnemonic, opcode) in [
        ("bra", 0x2F),
        ("beq", 0xF0),
        ("bne", 0xD0),
        ("bcs", 0xB0),
        ("bcc", 0x90),
        ("bvs", 0x70),
        ("bvc", 0x50),
        ("bmi", 0x30),
        ("bpl", 0x10),
    ] {
        b.add(mnemonic, "[exp]", Relative, 1, &[opcode]);
    }
    b.add("bbs", "[exp].[exp],[exp]", Layout::DirectBitRelative, 2, &[0x03]);
    b.add("bbc", "[exp].[exp],[exp]", Layout::DirectBitRelative, 2, &[0x13]);
    b.add("cbne", "[exp],[exp]", Layout::DirectRelative, 2, &[0x2E]);
    b.add("cbne", "[exp]+X,[exp]", Layout::DirectRelative, 2, &[0xDE]);
    b.add("dbnz", "[exp],[exp]", Layout::DirectRelative, 2, &[0x6E]);
    b.add("dbnz", "Y,[exp]", Relative, 1, &[0xFE]);

    // Calls and jumps
    memory(&mut b, "jmp", "@", None, Some(0x5F));
    b.add("jmp", "[![exp]+X]", Value, 2, &[0x1F]);
    b.add("jmp", "[[exp]+X]", Value, 2, &[0x1F]);
    memory(&mut b, "call", "@", None, Some(0x3F));
    b.add("pcall", "[exp]", Value, 1, &[0x4F]);
    b.add("tcall", "[exp]", Layout::BitOpcode { shift: 4, max: 15 }, 0, &[0x01]);
    for (mnemonic, opcode) in [
        ("brk", 0x0F),
        ("ret", 0x6F),
        ("reti", 0x7F),
        ("clrc", 0x60),
        ("setc", 0x80),
        ("notc", 0xED),
        ("clrv", 0xE0),
        ("clrp", 0x20),
        ("setp", 0x40),
        ("ei", 0xA0),
        ("di", 0xC0),
        ("nop", 0x00),
        ("sleep", 0xEF),
        ("stop", 0xFF),
    ] {
        fixed(&mut b, mnemonic, "", opcode);
    }
    for (register, push, pop) in [
        ("A", 0x2D, 0xAE),
        ("X", 0x4D, 0xCE),
        ("Y", 0x6D, 0xEE),
        ("PSW", 0x0D, 0x8E),
    ] {
        fixed(&mut b, "push", register, push);
        fixed(&mut b, "pop", register, pop);
    }

    // Bit manipulation
    b.add("set1", "[exp].[exp]", Layout::DirectBit, 1, &[0x02]);
    b.add("clr1", "[exp].[exp]", Layout::DirectBit, 1, &[0x12]);
    memory(&mut b, "tset1", "@", None, Some(0x0E));
    memory(&mut b, "tclr1", "@", None, Some(0x4E));
    b.add("and1", "C,[exp].[exp]", Layout::MemoryBit, 2, &[0x4A]);
    b.add("and1", "C,/[exp].[exp]", Layout::MemoryBit, 2, &[0x6A]);
    b.add("or1", "C,[exp].[exp]", Layout::MemoryBit, 2, &[0x0A]);
    b.add("or1", "C,/[exp].[exp]", Layout::MemoryBit, 2, &[0x2A]);
    b.add("eor1", "C,[exp].[exp]", Layout::MemoryBit, 2, &[0x8A]);
    b.add("not1", "[exp].[exp]", Layout::MemoryBit, 2, &[0xEA]);
    b.add("mov1", "C,[exp].[exp]", Layout::MemoryBit, 2, &[0xAA]);
    b.add("mov1", "[exp].[exp],C", Layout::MemoryBit, 2, &[0xCA]);

    b.finish(Platform::Spc700)
}
