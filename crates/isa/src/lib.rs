mod encode;
mod pattern;
mod sm83;
mod spc700;
mod w65816;

use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use std::sync::LazyLock;

use rustc_hash::FxHashMap;
use thiserror::Error;

pub use crate::encode::{Encoding, Layout};
pub use crate::pattern::{OperandView, Pattern};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Platform {
    Mos6502,
    #[default]
    W65816,
    /// The Game Boy CPU (Z80 variant).
    Sm83,
    Spc700,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Mos6502,
        Platform::W65816,
        Platform::Sm83,
        Platform::Spc700,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Mos6502 => "6502",
            Self::W65816 => "65816",
            Self::Sm83 => "gb",
            Self::Spc700 => "spc700",
        }
    }

    pub fn instruction_set(self) -> &'static InstructionSet {
        static MOS6502: LazyLock<InstructionSet> = LazyLock::new(w65816::build_mos6502);
        static W65816: LazyLock<InstructionSet> = LazyLock::new(w65816::build_w65816);
        static SM83: LazyLock<InstructionSet> = LazyLock::new(sm83::build);
        static SPC700: LazyLock<InstructionSet> = LazyLock::new(spc700::build);

        match self {
            Self::Mos6502 => &MOS6502,
            Self::W65816 => &W65816,
            Self::Sm83 => &SM83,
            Self::Spc700 => &SPC700,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Platform {
    type Err = EncodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "6502" | "mos6502" | "nes" => Ok(Self::Mos6502),
            "65816" | "65c816" | "w65816" | "snes" => Ok(Self::W65816),
            "gb" | "sm83" | "gbz80" | "lr35902" => Ok(Self::Sm83),
            "spc700" | "spc" => Ok(Self::Spc700),
            _ => Err(EncodeError::UnknownPlatform {
                name: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("unknown platform '{name}' (expected 6502, 65816, gb or spc700)")]
    UnknownPlatform { name: String },
    #[error("unknown mnemonic '{mnemonic}'")]
    UnknownMnemonic { mnemonic: String },
    #[error("'{mnemonic}' does not accept the operand '{operand}'")]
    NoMatchingForm { mnemonic: String, operand: String },
    #[error("this addressing mode has no {width}-byte form")]
    WidthUnavailable { width: u8 },
    #[error("value {value} (${value:X}) does not fit in {width} byte(s)")]
    ValueOutOfRange { value: i64, width: u8 },
    #[error("branch target out of range: displacement {displacement} not in {min}..={max}")]
    BranchOutOfRange { displacement: i64, min: i64, max: i64 },
    #[error("bit index {value} out of range 0..={max}")]
    BitOutOfRange { value: i64, max: u8 },
    #[error("invalid restart vector ${value:X} (expected a multiple of 8 up to $38)")]
    InvalidRestart { value: i64 },
    #[error("address ${value:X} is outside the high page ($FF00-$FFFF)")]
    InvalidHighPage { value: i64 },
    #[error("signed offset {value} out of range -128..=127")]
    SignedOutOfRange { value: i64 },
    #[error("bit address ${value:X} exceeds $1FFF")]
    BitAddressOutOfRange { value: i64 },
}

/// One addressing mode of a mnemonic: a template plus the opcode for each operand width it
/// can be encoded with, narrowest first.
#[derive(Debug, Clone)]
pub struct Form {
    pattern: Pattern,
    layout: Layout,
    encodings: Vec<Encoding>,
}

impl Form {
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn encodings(&self) -> &[Encoding] {
        &self.encodings
    }

    pub fn widest(&self) -> &Encoding {
        &self.encodings[self.encodings.len() - 1]
    }

    /// Picks the encoding for an operand value. Unknown values take the widest encoding, and
    /// no encoding narrower than `min_width` is chosen.
    pub fn select(
        &self,
        value: Option<i64>,
        forced_width: Option<u8>,
        min_width: u8,
    ) -> Result<&Encoding, EncodeError> {
        if let Some(width) = forced_width {
            return self
                .encodings
                .iter()
                .find(|encoding| encoding.width == width)
                .ok_or(EncodeError::WidthUnavailable { width });
        }

        let widest = self.widest();
        let floor = min_width.min(widest.width);
        match (self.layout, value) {
            (Layout::Value, Some(value)) => self
                .encodings
                .iter()
                .filter(|encoding| encoding.width >= floor)
                .find(|encoding| encode::fits(value, encoding.width))
                .ok_or(EncodeError::ValueOutOfRange {
                    value,
                    width: widest.width,
                }),
            _ => Ok(widest),
        }
    }

    pub fn encode(
        &self,
        encoding: &Encoding,
        values: &[i64],
        pc: i64,
    ) -> Result<Vec<u8>, EncodeError> {
        encode::encode(self.layout, encoding, values, pc)
    }
}

#[derive(Debug)]
pub struct OperandMatch<'a> {
    pub form: &'a Form,
    /// Byte range of each placeholder within the operand text.
    pub slices: Vec<Range<usize>>,
}

#[derive(Debug)]
pub struct InstructionSet {
    platform: Platform,
    mnemonics: FxHashMap<String, Vec<Form>>,
}

impl InstructionSet {
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// True for a mnemonic of this platform, with or without a `.b`/`.w`/`.l` width suffix.
    pub fn is_mnemonic(&self, word: &str) -> bool {
        let (base, _) = split_width_suffix(word);
        self.mnemonics.contains_key(&base.to_ascii_lowercase())
    }

    pub fn forms(&self, mnemonic: &str) -> Option<&[Form]> {
        self.mnemonics
            .get(&mnemonic.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    pub fn mnemonics(&self) -> impl Iterator<Item = &str> {
        self.mnemonics.keys().map(String::as_str)
    }

    pub fn match_operand(
        &self,
        mnemonic: &str,
        operand: &str,
    ) -> Result<OperandMatch<'_>, EncodeError> {
        let forms = self
            .forms(mnemonic)
            .ok_or_else(|| EncodeError::UnknownMnemonic {
                mnemonic: mnemonic.to_string(),
            })?;
        let view = OperandView::new(operand);
        forms
            .iter()
            .find_map(|form| {
                form.pattern
                    .match_view(&view)
                    .map(|slices| OperandMatch { form, slices })
            })
            .ok_or_else(|| EncodeError::NoMatchingForm {
                mnemonic: mnemonic.to_string(),
                operand: operand.trim().to_string(),
            })
    }
}

/// Splits `lda.w` into `("lda", Some(2))`. Words without a recognised suffix are returned whole.
pub fn split_width_suffix(word: &str) -> (&str, Option<u8>) {
    let Some((base, suffix)) = word.rsplit_once('.') else {
        return (word, None);
    };
    if base.is_empty() {
        return (word, None);
    }
    match suffix.to_ascii_lowercase().as_str() {
        "b" => (base, Some(1)),
        "w" => (base, Some(2)),
        "l" => (base, Some(3)),
        _ => (word, None),
    }
}

/// Collects forms while a platform table is generated.
#[derive(Debug, Default)]
pub(crate) struct TableBuilder {
    mnemonics: FxHashMap<String, Vec<Form>>,
}

impl TableBuilder {
    pub(crate) fn add(
        &mut self,
        mnemonic: &str,
        pattern: &str,
        layout: Layout,
        width: u8,
        opcode: &[u8],
    ) {
        let forms = self
            .mnemonics
            .entry(mnemonic.to_ascii_lowercase())
            .or_default();
        let compiled = Pattern::compile(pattern);
        let encoding = Encoding {
            width,
            opcode: opcode.to_vec(),
        };
        if let Some(form) = forms
            .iter_mut()
            .find(|form| form.pattern == compiled && form.layout == layout)
        {
            if !form.encodings.iter().any(|existing| existing.width == width) {
                form.encodings.push(encoding);
            }
            return;
        }
        forms.push(Form {
            pattern: compiled,
            layout,
            encodings: vec![encoding],
        });
    }

    pub(crate) fn finish(mut self, platform: Platform) -> InstructionSet {
        for forms in self.mnemonics.values_mut() {
            for form in forms.iter_mut() {
                form.encodings.sort_by_key(|encoding| encoding.width);
            }
            forms.sort_by_key(|form| std::cmp::Reverse(form.pattern.literal_len()));
        }
        InstructionSet {
            platform,
            mnemonics: self.mnemonics,
        }
    }
}
