use crate::AssetError;

/// The part of an `.INCBIN` file selected by an optional start offset and length.
pub fn slice_binary(
    data: &[u8],
    start: Option<i64>,
    length: Option<i64>,
) -> Result<&[u8], AssetError> {
    let len = data.len();
    let begin = start.unwrap_or(0);
    let end = match length {
        Some(length) => begin.saturating_add(length),
        None => len as i64,
    };
    if begin < 0 || end < begin || end > len as i64 {
        return Err(AssetError::OutOfRange {
            start: begin,
            end,
            len,
        });
    }
    Ok(&data[begin as usize..end as usize])
}
