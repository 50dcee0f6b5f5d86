use std::ops::Range;

use logos::Logos;

/// Coarse pieces of a content line. The classifier only needs to find words and a top-level
/// `=`; everything inside expressions is left to the expression engine.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip(r"[ \t\r\f]+"))]
pub enum PieceKind {
    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("=")]
    Eq,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,

    #[regex(r#""([^"\\]|\\.)*""#)]
    String,

    #[regex(r"'([^'\\]|\\.)'")]
    Char,

    #[regex(r"\$[0-9a-fA-F]+|@[01]+|[0-9][0-9A-Za-z_.]*")]
    Number,

    #[regex(r"[A-Za-z_.][A-Za-z0-9_.]*")]
    Word,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    /// `None` for a character no rule accepts (operators, brackets, `#`, ...).
    pub kind: Option<PieceKind>,
    pub range: Range<usize>,
}

pub fn scan(text: &str) -> Vec<Piece> {
    let mut lexer = PieceKind::lexer(text);
    let mut pieces = Vec::new();
    while let Some(next) = lexer.next() {
        pieces.push(Piece {
            kind: next.ok(),
            range: lexer.span(),
        });
    }
    pieces
}

/// Words of `text` with their byte ranges.
pub fn words(text: &str) -> impl Iterator<Item = (&str, Range<usize>)> + '_ {
    scan(text)
        .into_iter()
        .filter(|piece| piece.kind == Some(PieceKind::Word))
        .map(move |piece| (&text[piece.range.clone()], piece.range))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<Option<PieceKind>> {
        scan(text).into_iter().map(|piece| piece.kind).collect()
    }

    #[test]
    fn scans_words_strings_and_assignments() {
        assert_eq!(
            kinds("count = \"a=b\" + 'x'"),
            vec![
                Some(PieceKind::Word),
                Some(PieceKind::Eq),
                Some(PieceKind::String),
                None,
                Some(PieceKind::Char),
            ]
        );
        assert_eq!(
            kinds("a == $FF"),
            vec![
                Some(PieceKind::Word),
                Some(PieceKind::EqEq),
                Some(PieceKind::Number)
            ]
        );
    }

    #[test]
    fn words_keep_dots_and_ranges() {
        let found: Vec<_> = words("loop: lda.w .local,x").collect();
        assert_eq!(
            found,
            vec![("loop", 0..4), ("lda.w", 6..11), (".local", 12..18), ("x", 19..20)]
        );
    }
}
