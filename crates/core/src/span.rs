use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub source_id: SourceId,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(source_id: SourceId, start: usize, end: usize) -> Self {
        Self {
            source_id,
            start,
            end,
        }
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut line_starts = vec![0];
        for (offset, ch) in text.char_indices() {
            if ch == '\n' {
                line_starts.push(offset + 1);
            }
        }

        Self {
            name: name.into(),
            text,
            line_starts,
        }
    }

    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let line_idx = self
            .line_starts
            .partition_point(|line_start| *line_start <= offset)
            .saturating_sub(1);
        let line_start = self.line_starts[line_idx];
        let line = line_idx + 1;
        let col = offset.saturating_sub(line_start) + 1;
        (line, col)
    }

    pub fn slice(&self, span: Span) -> &str {
        &self.text[span.start..span.end]
    }

    /// Each line with its 1-based number and the byte offset it starts at. Line terminators
    /// (`\n` or `\r\n`) are not part of the yielded text.
    pub fn lines(&self) -> impl Iterator<Item = (usize, usize, &str)> + '_ {
        self.line_starts
            .iter()
            .enumerate()
            .map(move |(index, &start)| {
                let end = self
                    .line_starts
                    .get(index + 1)
                    .map_or(self.text.len(), |next| next - 1);
                let line = &self.text[start..end];
                (index + 1, start, line.strip_suffix('\r').unwrap_or(line))
            })
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
    free: Vec<SourceId>,
}

impl SourceMap {
    /// Stores a source, reusing the most recently removed slot when there is one.
    pub fn add_source(&mut self, name: impl Into<String>, text: impl Into<String>) -> SourceId {
        let file = SourceFile::new(name, text);
        if let Some(id) = self.free.pop() {
            self.files[id.0 as usize] = file;
            return id;
        }
        let id = SourceId(self.files.len() as u32);
        self.files.push(file);
        id
    }

    /// Drops the text of a source and frees its id for the next `add_source`.
    pub fn remove_source(&mut self, source_id: SourceId) {
        let index = source_id.0 as usize;
        if index >= self.files.len() || self.free.contains(&source_id) {
            return;
        }
        self.files[index] = SourceFile::new("", "");
        self.free.push(source_id);
    }

    /// Number of slots, removed ones included.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, source_id: SourceId) -> Option<&SourceFile> {
        self.files.get(source_id.0 as usize)
    }

    pub fn name(&self, source_id: SourceId) -> &str {
        self.get(source_id).map_or("<unknown>", |file| file.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_line_and_column() {
        let mut map = SourceMap::default();
        let source_id = map.add_source("test", "first\nsecond\nthird");
        let file = map.get(source_id).expect("source");
        assert_eq!(file.line_col(0), (1, 1));
        assert_eq!(file.line_col(7), (2, 2));
        assert_eq!(file.line_col(14), (3, 2));
    }

    #[test]
    fn removed_slots_are_reused() {
        let mut map = SourceMap::default();
        let first = map.add_source("a.asm", "nop");
        let second = map.add_source("b.asm", "brk");
        map.remove_source(first);
        map.remove_source(first);
        assert_eq!(map.add_source("c.asm", "rts"), first);
        assert_eq!(map.name(first), "c.asm");
        assert_eq!(map.name(second), "b.asm");
        assert_eq!(map.len(), 2);
        assert_ne!(map.add_source("d.asm", ""), first);
    }

    #[test]
    fn iterates_lines_with_offsets() {
        let mut map = SourceMap::default();
        let source_id = map.add_source("test", "nop\r\n  lda #1\n");
        let file = map.get(source_id).expect("source");
        let lines: Vec<_> = file.lines().collect();
        assert_eq!(lines, vec![(1, 0, "nop"), (2, 5, "  lda #1"), (3, 14, "")]);
    }
}
