use std::ops::Range;

use thiserror::Error;

/// Largest output offset the image accepts (16 MiB, the 65C816 address space).
pub const MAX_IMAGE_SIZE: usize = 0x100_0000;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("output offset {offset} is negative")]
    Negative { offset: i64 },
    #[error("output offset ${offset:X} is beyond the ${limit:X}-byte image limit")]
    TooLarge { offset: i64, limit: usize },
}

/// Sparse output: every offset either holds a byte or was never written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteImage {
    bytes: Vec<Option<u8>>,
}

impl ByteImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Writes `data` starting at `offset`. `None` entries reserve space without writing.
    pub fn write(&mut self, offset: i64, data: &[Option<u8>]) -> Result<(), ImageError> {
        if data.is_empty() {
            return Ok(());
        }
        if offset < 0 {
            return Err(ImageError::Negative { offset });
        }
        let start = offset as usize;
        let end = start.saturating_add(data.len());
        if end > MAX_IMAGE_SIZE {
            return Err(ImageError::TooLarge {
                offset: end as i64 - 1,
                limit: MAX_IMAGE_SIZE,
            });
        }
        if self.bytes.len() < end {
            self.bytes.resize(end, None);
        }
        for (slot, byte) in self.bytes[start..end].iter_mut().zip(data) {
            if byte.is_some() {
                *slot = *byte;
            }
        }
        Ok(())
    }

    pub fn get(&self, offset: usize) -> Option<u8> {
        self.bytes.get(offset).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.iter().all(Option::is_none)
    }

    /// Each offset as a signed value: the byte, or -1 where nothing was written.
    pub fn to_signed(&self) -> Vec<i16> {
        self.bytes
            .iter()
            .map(|byte| byte.map_or(-1, i16::from))
            .collect()
    }

    /// Lowest to one past the highest written offset.
    pub fn written_range(&self) -> Option<Range<usize>> {
        let start = self.bytes.iter().position(Option::is_some)?;
        let end = self.bytes.iter().rposition(Option::is_some)? + 1;
        Some(start..end)
    }

    /// Flat bytes from offset zero (or from the first written byte when `trim_leading` is set)
    /// to the last written byte, with holes filled by `fill`.
    pub fn to_flat(&self, fill: u8, trim_leading: bool) -> Vec<u8> {
        let Some(range) = self.written_range() else {
            return Vec::new();
        };
        let start = if trim_leading { range.start } else { 0 };
        self.bytes[start..range.end]
            .iter()
            .map(|byte| byte.unwrap_or(fill))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_offsets_are_minus_one() {
        let mut image = ByteImage::new();
        image.write(2, &[Some(0xA9), None, Some(0x01)]).expect("write");
        assert_eq!(image.to_signed(), vec![-1, -1, 0xA9, -1, 0x01]);
        assert_eq!(image.written_range(), Some(2..5));
        assert_eq!(image.to_flat(0xFF, true), vec![0xA9, 0xFF, 0x01]);
        assert_eq!(image.to_flat(0x00, false), vec![0, 0, 0xA9, 0, 0x01]);
    }

    #[test]
    fn later_writes_overwrite_and_limits_are_checked() {
        let mut image = ByteImage::new();
        image.write(0, &[Some(1), Some(2)]).expect("write");
        image.write(1, &[Some(3)]).expect("overwrite");
        assert_eq!(image.get(1), Some(3));
        assert_eq!(
            image.write(-1, &[Some(0)]),
            Err(ImageError::Negative { offset: -1 })
        );
        assert!(matches!(
            image.write(MAX_IMAGE_SIZE as i64, &[Some(0)]),
            Err(ImageError::TooLarge { .. })
        ));
        assert!(ByteImage::new().is_empty());
    }
}
