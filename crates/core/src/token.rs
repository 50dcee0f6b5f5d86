use std::ops::Range;

use crate::span::{SourceId, Span};

/// A piece of source text that remembers where it came from. `line` is 1-based, `column` is the
/// byte offset inside that line and `offset` the byte offset inside the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub source_id: SourceId,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
    pub text: String,
}

impl Token {
    pub fn new(
        source_id: SourceId,
        line: usize,
        column: usize,
        offset: usize,
        text: impl Into<String>,
    ) -> Self {
        Self {
            source_id,
            line,
            column,
            offset,
            text: text.into(),
        }
    }

    pub fn span(&self) -> Span {
        Span::new(self.source_id, self.offset, self.offset + self.text.len())
    }

    /// Span of `start..end` inside this token's text, clamped to the token.
    pub fn sub_span(&self, start: usize, end: usize) -> Span {
        let len = self.text.len();
        let start = start.min(len);
        let end = end.clamp(start, len);
        Span::new(self.source_id, self.offset + start, self.offset + end)
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn slice(&self, range: Range<usize>) -> Token {
        Token {
            source_id: self.source_id,
            line: self.line,
            column: self.column + range.start,
            offset: self.offset + range.start,
            text: self.text[range].to_string(),
        }
    }

    pub fn trimmed(&self) -> Token {
        let start = self.text.len() - self.text.trim_start().len();
        let end = self.text.trim_end().len().max(start);
        self.slice(start..end)
    }

    /// Splits on `separator` wherever it appears outside quotes and brackets. Pieces are
    /// trimmed; empty text yields no pieces at all.
    pub fn split_top_level(&self, separator: char) -> Vec<Token> {
        if self.text.trim().is_empty() {
            return Vec::new();
        }
        let mut pieces = Vec::new();
        let mut start = 0;
        for index in top_level_matches(&self.text, |ch| ch == separator) {
            pieces.push(self.slice(start..index).trimmed());
            start = index + separator.len_utf8();
        }
        pieces.push(self.slice(start..self.text.len()).trimmed());
        pieces
    }

    /// The first word (ended by whitespace or a comma) and everything after it, with a single
    /// separating comma dropped.
    pub fn split_first_word(&self) -> (Token, Token) {
        let trimmed = self.trimmed();
        let end = trimmed
            .text
            .find(|ch: char| ch.is_whitespace() || ch == ',')
            .unwrap_or(trimmed.text.len());
        let word = trimmed.slice(0..end);
        let mut rest = trimmed.slice(end..trimmed.text.len()).trimmed();
        if rest.text.starts_with(',') {
            rest = rest.slice(1..rest.text.len()).trimmed();
        }
        (word, rest)
    }
}

/// Byte offsets of characters accepted by `wanted` that sit outside string/char literals and
/// outside any `()`, `[]` or `{}` nesting.
pub(crate) fn top_level_matches(text: &str, wanted: impl Fn(char) -> bool) -> Vec<usize> {
    let mut matches = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (index, ch) in text.char_indices() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ if depth == 0 && wanted(ch) => matches.push(index),
            _ => {}
        }
    }
    matches
}

/// Byte offset of the first `;` that starts a comment (outside string and char literals).
pub(crate) fn comment_start(text: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (index, ch) in text.char_indices() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            ';' => return Some(index),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str) -> Token {
        Token::new(SourceId(0), 3, 4, 40, text)
    }

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|token| token.text.as_str()).collect()
    }

    #[test]
    fn splits_on_top_level_commas_only() {
        let pieces = token(" 1, (2, 3) , \"a,b\", ',' ").split_top_level(',');
        assert_eq!(texts(&pieces), vec!["1", "(2, 3)", "\"a,b\"", "','"]);
        assert_eq!(pieces[1].column, 8);
        assert_eq!(pieces[1].offset, 44);
        assert!(token("   ").split_top_level(',').is_empty());
        assert_eq!(texts(&token("1,,2").split_top_level(',')), vec!["1", "", "2"]);
    }

    #[test]
    fn splits_first_word() {
        let (word, rest) = token("  speed, 3 * 4").split_first_word();
        assert_eq!(word.text, "speed");
        assert_eq!(word.column, 6);
        assert_eq!(rest.text, "3 * 4");
        let (word, rest) = token("move src dst").split_first_word();
        assert_eq!((word.text.as_str(), rest.text.as_str()), ("move", "src dst"));
    }

    #[test]
    fn finds_comments_outside_literals() {
        assert_eq!(comment_start("lda #1 ; load"), Some(7));
        assert_eq!(comment_start(".db \";\", ';' ; real"), Some(13));
        assert_eq!(comment_start("nop"), None);
    }

    #[test]
    fn sub_spans_are_clamped() {
        let token = token("abc");
        assert_eq!(token.sub_span(1, 2).as_range(), 41..42);
        assert_eq!(token.sub_span(2, 9).as_range(), 42..43);
    }
}
