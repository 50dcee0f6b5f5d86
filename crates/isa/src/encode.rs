use crate::EncodeError;

/// How placeholder values turn into bytes after the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// No operand bytes.
    Fixed,
    /// One value, little-endian, `width` bytes.
    Value,
    /// One branch target, stored as a displacement from the end of the instruction.
    Relative,
    /// Two single-byte values; `reversed` stores the second operand first.
    Pair { reversed: bool },
    /// A small constant folded into the last opcode byte (`bit 3,a`, `tcall 5`).
    BitOpcode { shift: u8, max: u8 },
    /// Game Boy `rst`: vector added to the opcode.
    Restart,
    /// Game Boy `ldh`: address in $FF00-$FFFF (or 0-$FF) stored as its low byte.
    HighPage,
    /// Signed 8-bit offset (`add sp,e`).
    SignedByte,
    /// SPC700 `set1 dp.bit`: bit folded into the opcode, then the direct-page address.
    DirectBit,
    /// SPC700 `bbs dp.bit,target`.
    DirectBitRelative,
    /// SPC700 `cbne dp,target`.
    DirectRelative,
    /// SPC700 `mov1 c,addr.bit`: 13-bit address with the bit index in the top three bits.
    MemoryBit,
}

impl Layout {
    pub const fn placeholders(self) -> usize {
        match self {
            Self::Fixed => 0,
            Self::Value
            | Self::Relative
            | Self::BitOpcode { .. }
            | Self::Restart
            | Self::HighPage
            | Self::SignedByte => 1,
            Self::Pair { .. } | Self::DirectBit | Self::DirectRelative | Self::MemoryBit => 2,
            Self::DirectBitRelative => 3,
        }
    }

    /// True when the layout stores a branch displacement and depends on the program counter.
    pub const fn is_relative(self) -> bool {
        matches!(
            self,
            Self::Relative | Self::DirectBitRelative | Self::DirectRelative
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoding {
    /// Operand bytes following the opcode.
    pub width: u8,
    pub opcode: Vec<u8>,
}

impl Encoding {
    pub fn len(&self) -> usize {
        self.opcode.len() + usize::from(self.width)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn fits(value: i64, width: u8) -> bool {
    match width {
        0 => return false,
        8.. => return true,
        _ => {}
    }
    let bits = u32::from(width) * 8;
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << bits) - 1;
    (min..=max).contains(&value)
}

fn push_le(out: &mut Vec<u8>, value: i64, width: u8) {
    let bytes = value.to_le_bytes();
    out.extend_from_slice(&bytes[..usize::from(width)]);
}

fn byte(value: i64) -> Result<u8, EncodeError> {
    if !fits(value, 1) {
        return Err(EncodeError::ValueOutOfRange { value, width: 1 });
    }
    Ok(value as u8)
}

fn bit_index(value: i64, max: u8) -> Result<u8, EncodeError> {
    if !(0..=i64::from(max)).contains(&value) {
        return Err(EncodeError::BitOutOfRange { value, max });
    }
    Ok(value as u8)
}

fn displacement(target: i64, next_pc: i64, width: u8) -> Result<i64, EncodeError> {
    let bits = u32::from(width) * 8;
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << (bits - 1)) - 1;
    let displacement = target - next_pc;
    if !(min..=max).contains(&displacement) {
        return Err(EncodeError::BranchOutOfRange {
            displacement,
            min,
            max,
        });
    }
    Ok(displacement)
}

pub(crate) fn encode(
    layout: Layout,
    encoding: &Encoding,
    values: &[i64],
    pc: i64,
) -> Result<Vec<u8>, EncodeError> {
    let mut out = encoding.opcode.clone();
    let next_pc = pc + encoding.len() as i64;
    let value = |index: usize| values.get(index).copied().unwrap_or_default();

    match layout {
        Layout::Fixed => {}
        Layout::Value => {
            let value = value(0);
            if !fits(value, encoding.width) {
                return Err(EncodeError::ValueOutOfRange {
                    value,
                    width: encoding.width,
                });
            }
            push_le(&mut out, value, encoding.width);
        }
        Layout::Relative => {
            let displacement = displacement(value(0), next_pc, encoding.width)?;
            push_le(&mut out, displacement, encoding.width);
        }
        Layout::Pair { reversed } => {
            let first = byte(value(0))?;
            let second = byte(value(1))?;
            if reversed {
                out.extend([second, first]);
            } else {
                out.extend([first, second]);
            }
        }
        Layout::BitOpcode { shift, max } => {
            let bit = bit_index(value(0), max)?;
            if let Some(last) = out.last_mut() {
                *last |= bit << shift;
            }
        }
        Layout::Restart => {
            let vector = value(0);
            if !(0..=0x38).contains(&vector) || vector % 8 != 0 {
                return Err(EncodeError::InvalidRestart { value: vector });
            }
            out[0] |= vector as u8;
        }
        Layout::HighPage => {
            let address = value(0);
            if !(0..=0xFF).contains(&address) && !(0xFF00..=0xFFFF).contains(&address) {
                return Err(EncodeError::InvalidHighPage { value: address });
            }
            out.push((address & 0xFF) as u8);
        }
        Layout::SignedByte => {
            let offset = value(0);
            if !(-128..=127).contains(&offset) {
                return Err(EncodeError::SignedOutOfRange { value: offset });
            }
            push_le(&mut out, offset, 1);
        }
        Layout::DirectBit => {
            let address = byte(value(0))?;
            let bit = bit_index(value(1), 7)?;
            out[0] |= bit << 5;
            out.push(address);
        }
        Layout::DirectBitRelative => {
            let address = byte(value(0))?;
            let bit = bit_index(value(1), 7)?;
            let displacement = displacement(value(2), next_pc, 1)?;
            out[0] |= bit << 5;
            out.push(address);
            push_le(&mut out, displacement, 1);
        }
        Layout::DirectRelative => {
            let address = byte(value(0))?;
            let displacement = displacement(value(1), next_pc, 1)?;
            out.push(address);
            push_le(&mut out, displacement, 1);
        }
        Layout::MemoryBit => {
            let address = value(0);
            if !(0..=0x1FFF).contains(&address) {
                return Err(EncodeError::BitAddressOutOfRange { value: address });
            }
            let bit = bit_index(value(1), 7)?;
            let packed = address | (i64::from(bit) << 13);
            push_le(&mut out, packed, 2);
        }
    }
    Ok(out)
}
