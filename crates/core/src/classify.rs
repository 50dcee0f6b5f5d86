use retroasm_isa::{InstructionSet, split_width_suffix};

use crate::directives::Directive;
use crate::lexer::{PieceKind, scan};
use crate::line::{CommandLine, InstructionLine, LineKind, VariableLine};
use crate::span::{SourceFile, SourceId};
use crate::token::{Token, comment_start};

/// A content line after classification, before it is placed in a scope.
#[derive(Debug, Clone)]
pub struct ClassifiedLine {
    pub origin: Token,
    pub label: Option<Token>,
    pub kind: LineKind,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommentMarker {
    Plain,
    /// `;+`: keeps accumulating across blank lines.
    Sticky,
    /// `;-`: never attached to anything.
    Detached,
}

fn comment_marker(comment: &str) -> (CommentMarker, &str) {
    if let Some(rest) = comment.strip_prefix('+') {
        (CommentMarker::Sticky, rest.trim())
    } else if let Some(rest) = comment.strip_prefix('-') {
        (CommentMarker::Detached, rest.trim())
    } else {
        (CommentMarker::Plain, comment.trim())
    }
}

/// Turns raw source lines into classified lines. Comment-only lines accumulate into a pending
/// comment that is attached to the next line with content.
pub struct Classifier<'a> {
    isa: &'a InstructionSet,
    pending: Option<String>,
    sticky: bool,
}

impl<'a> Classifier<'a> {
    pub fn new(isa: &'a InstructionSet) -> Self {
        Self {
            isa,
            pending: None,
            sticky: false,
        }
    }

    fn accumulate(&mut self, text: &str) {
        match &mut self.pending {
            Some(pending) => {
                pending.push('\n');
                pending.push_str(text);
            }
            None => self.pending = Some(text.to_string()),
        }
    }

    /// Classifies one raw line. Blank and comment-only lines yield `None`.
    pub fn classify(
        &mut self,
        source_id: SourceId,
        line: usize,
        offset: usize,
        raw: &str,
    ) -> Option<ClassifiedLine> {
        let whole = Token::new(source_id, line, 0, offset, raw);
        let (content, comment) = match comment_start(raw) {
            Some(at) => (whole.slice(0..at), Some(comment_marker(&raw[at + 1..]))),
            None => (whole.clone(), None),
        };
        let content = content.trimmed();

        if content.is_empty() {
            match comment {
                None if !self.sticky => self.pending = None,
                None => {}
                Some((CommentMarker::Detached, _)) => {
                    self.pending = None;
                    self.sticky = false;
                }
                Some((marker, text)) => {
                    self.accumulate(text);
                    self.sticky |= marker == CommentMarker::Sticky;
                }
            }
            return None;
        }

        let mut doc = self.pending.take();
        self.sticky = false;
        if let Some((marker, text)) = comment {
            if marker != CommentMarker::Detached && !text.is_empty() {
                doc = Some(match doc {
                    Some(mut pending) => {
                        pending.push('\n');
                        pending.push_str(text);
                        pending
                    }
                    None => text.to_string(),
                });
            }
        }

        let (label, kind) = classify_content(self.isa, &content);
        Some(ClassifiedLine {
            origin: content,
            label,
            kind,
            comment: doc,
        })
    }
}

/// Text before a keyword, without a trailing `:`. Empty text means no label.
pub(crate) fn label_before(content: &Token, end: usize) -> Option<Token> {
    let text = content.slice(0..end).trimmed();
    let text = match text.text.strip_suffix(':') {
        Some(stripped) => text.slice(0..stripped.len()).trimmed(),
        None => text,
    };
    (!text.is_empty()).then_some(text)
}

fn classify_content(isa: &InstructionSet, content: &Token) -> (Option<Token>, LineKind) {
    for piece in scan(&content.text) {
        match piece.kind {
            Some(PieceKind::Word) => {
                let word = &content.text[piece.range.clone()];
                let rest = content.slice(piece.range.end..content.text.len()).trimmed();
                if let Some(directive) = Directive::from_keyword(word) {
                    let keyword = content.slice(piece.range.clone());
                    let args = directive.split_args(&rest);
                    let label = label_before(content, piece.range.start);
                    let command = CommandLine::new(directive, keyword, args);
                    return (label, LineKind::Command(command));
                }
                if isa.is_mnemonic(word) {
                    let (base, forced_width) = split_width_suffix(word);
                    let instruction = InstructionLine {
                        mnemonic: content.slice(piece.range.clone()),
                        base: base.to_ascii_lowercase(),
                        forced_width,
                        operand: rest,
                        matched: None,
                        locked_width: 0,
                    };
                    let label = label_before(content, piece.range.start);
                    return (label, LineKind::Instruction(instruction));
                }
            }
            Some(PieceKind::Eq) => {
                let name = label_before(content, piece.range.start);
                let expression = content.slice(piece.range.end..content.text.len()).trimmed();
                if let Some(name) = name {
                    let variable = VariableLine {
                        name,
                        expression,
                        parsed: None,
                        label: None,
                    };
                    return (None, LineKind::Variable(variable));
                }
                return (None, LineKind::Unknown);
            }
            _ => {}
        }
    }
    (None, LineKind::Unknown)
}

/// Classifies every line of a source file.
pub fn classify_source(isa: &InstructionSet, source_id: SourceId, file: &SourceFile) -> Vec<ClassifiedLine> {
    let mut classifier = Classifier::new(isa);
    file.lines()
        .filter_map(|(line, offset, text)| classifier.classify(source_id, line, offset, text))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use retroasm_isa::Platform;

    fn classify_all(text: &str) -> Vec<ClassifiedLine> {
        let isa = Platform::W65816.instruction_set();
        let mut classifier = Classifier::new(isa);
        text.lines()
            .enumerate()
            .filter_map(|(index, line)| classifier.classify(SourceId(0), index + 1, 0, line))
            .collect()
    }

    fn one(text: &str) -> ClassifiedLine {
        classify_all(text).remove(0)
    }

    fn label_text(line: &ClassifiedLine) -> Option<&str> {
        line.label.as_ref().map(|label| label.text.as_str())
    }

    #[test]
    fn splits_label_and_instruction() {
        let line = one("loop:  lda.w  table,x ; fetch");
        assert_eq!(label_text(&line), Some("loop"));
        let LineKind::Instruction(instruction) = &line.kind else {
            panic!("expected instruction, got {:?}", line.kind);
        };
        assert_eq!(instruction.base, "lda");
        assert_eq!(instruction.forced_width, Some(2));
        assert_eq!(instruction.operand.text, "table,x");
        assert_eq!(instruction.operand.column, 14);
        assert_eq!(line.origin.text, "loop:  lda.w  table,x");
        assert_eq!(line.comment.as_deref(), Some("fetch"));
    }

    #[test]
    fn label_text_is_everything_before_the_keyword() {
        assert_eq!(label_text(&one("start nop")), Some("start"));
        assert_eq!(label_text(&one("- bne -")), Some("-"));
        assert_eq!(label_text(&one("+: .db 1")), Some("+"));
        assert_eq!(label_text(&one("   rts")), None);
    }

    #[test]
    fn recognises_directives_with_arguments() {
        let line = one("table .db 1, \"a;b\", 3");
        assert_eq!(label_text(&line), Some("table"));
        let LineKind::Command(command) = &line.kind else {
            panic!("expected command");
        };
        assert_eq!(command.directive, Directive::Db);
        let args: Vec<_> = command.args.iter().map(|arg| arg.text.as_str()).collect();
        assert_eq!(args, vec!["1", "\"a;b\"", "3"]);
    }

    #[test]
    fn variables_and_unknown_lines() {
        let line = one("count = count + 1");
        let LineKind::Variable(variable) = &line.kind else {
            panic!("expected variable");
        };
        assert_eq!(variable.name.text, "count");
        assert_eq!(variable.expression.text, "count + 1");

        assert!(matches!(one("done:").kind, LineKind::Unknown));
        assert!(matches!(one("wait_vblank 2").kind, LineKind::Unknown));
        assert!(matches!(one("x == 1").kind, LineKind::Unknown));
    }

    #[test]
    fn comment_only_lines_attach_to_the_next_line() {
        let lines = classify_all("; first\n; second\nreset: sei\n\n; lost\n\nnmi: rti");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].comment.as_deref(), Some("first\nsecond"));
        assert_eq!(lines[1].comment, None);
    }

    #[test]
    fn sticky_and_detached_comments() {
        let lines = classify_all(";+ kept\n\nirq: rti\n;- ignored\nbrk_: brk");
        assert_eq!(lines[0].comment.as_deref(), Some("kept"));
        assert_eq!(lines[1].comment, None);
    }
}
