use std::ops::Range;

const PLACEHOLDER: &str = "[EXP]";

/// An addressing-mode template such as `([exp]),Y`, split once into the literal text around
/// each `[exp]` placeholder. Literals are stored uppercase with whitespace removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    text: String,
    literals: Vec<Vec<char>>,
}

impl Pattern {
    pub fn compile(text: &str) -> Self {
        let normalized: String = text
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .map(|ch| ch.to_ascii_uppercase())
            .collect();
        let literals = normalized
            .split(PLACEHOLDER)
            .map(|literal| literal.chars().collect())
            .collect();
        Self {
            text: text.to_string(),
            literals,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn placeholders(&self) -> usize {
        self.literals.len() - 1
    }

    /// Total literal characters; more literal text means a more specific template.
    pub fn literal_len(&self) -> usize {
        self.literals.iter().map(Vec::len).sum()
    }

    /// Matches an operand and returns the byte range of every placeholder in the original text.
    pub fn match_view(&self, view: &OperandView<'_>) -> Option<Vec<Range<usize>>> {
        let len = view.len();
        let first = &self.literals[0];
        let last = &self.literals[self.literals.len() - 1];

        if self.placeholders() == 0 {
            return (len == first.len() && view.literal_at(0, first)).then(Vec::new);
        }
        if first.len() + last.len() >= len {
            return None;
        }
        if !view.literal_at(0, first) || !view.literal_at(len - last.len(), last) {
            return None;
        }

        let start = first.len();
        let mut end = len - last.len();
        let mut spans = Vec::with_capacity(self.placeholders());

        // Middle literals bind to their rightmost top-level occurrence.
        for literal in self.literals[1..self.literals.len() - 1].iter().rev() {
            let found = (start + 1..end.saturating_sub(literal.len()))
                .rev()
                .find(|&at| {
                    view.literal_at(at, literal)
                        && view.single_expression(start, at)
                        && view.single_expression(at + literal.len(), end)
                })?;
            spans.push(view.source_range(found + literal.len(), end));
            end = found;
        }

        if end <= start || !view.single_expression(start, end) {
            return None;
        }
        spans.push(view.source_range(start, end));
        spans.reverse();
        Some(spans)
    }
}

/// Operand text with whitespace outside quotes removed and letters uppercased, remembering
/// where every remaining character sits in the original text.
#[derive(Debug)]
pub struct OperandView<'a> {
    source: &'a str,
    chars: Vec<char>,
    offsets: Vec<usize>,
    quoted: Vec<bool>,
}

impl<'a> OperandView<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut view = Self {
            source,
            chars: Vec::with_capacity(source.len()),
            offsets: Vec::with_capacity(source.len()),
            quoted: Vec::with_capacity(source.len()),
        };
        let mut quote: Option<char> = None;
        let mut escaped = false;
        for (offset, ch) in source.char_indices() {
            if let Some(open) = quote {
                view.push(ch, offset, true);
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == open {
                    quote = None;
                }
                continue;
            }
            if ch.is_whitespace() {
                continue;
            }
            if ch == '"' || ch == '\'' {
                quote = Some(ch);
                view.push(ch, offset, true);
                continue;
            }
            view.push(ch.to_ascii_uppercase(), offset, false);
        }
        view
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    fn push(&mut self, ch: char, offset: usize, quoted: bool) {
        self.chars.push(ch);
        self.offsets.push(offset);
        self.quoted.push(quoted);
    }

    fn literal_at(&self, at: usize, literal: &[char]) -> bool {
        if at + literal.len() > self.chars.len() {
            return false;
        }
        literal
            .iter()
            .enumerate()
            .all(|(index, ch)| !self.quoted[at + index] && self.chars[at + index] == *ch)
    }

    /// Brackets balance and no comma sits outside them.
    fn single_expression(&self, from: usize, to: usize) -> bool {
        let mut depth = 0usize;
        for index in from..to {
            if self.quoted[index] {
                continue;
            }
            match self.chars[index] {
                ',' if depth == 0 => return false,
                '(' | '[' => depth += 1,
                ')' | ']' => {
                    let Some(next) = depth.checked_sub(1) else {
                        return false;
                    };
                    depth = next;
                }
                _ => {}
            }
        }
        depth == 0
    }

    fn source_range(&self, from: usize, to: usize) -> Range<usize> {
        let start = self.offsets[from];
        let last = self.offsets[to - 1];
        let end = last + self.source[last..].chars().next().map_or(1, char::len_utf8);
        start..end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slices<'a>(pattern: &str, operand: &'a str) -> Option<Vec<&'a str>> {
        let view = OperandView::new(operand);
        Pattern::compile(pattern)
            .match_view(&view)
            .map(|ranges| ranges.into_iter().map(|range| &operand[range]).collect())
    }

    #[test]
    fn matches_indexed_indirect_forms_case_insensitively() {
        assert_eq!(slices("([exp]),Y", "(ptr + 1), y"), Some(vec!["ptr + 1"]));
        assert_eq!(slices("([exp],X)", "( table ,x )"), Some(vec!["table"]));
        assert_eq!(slices("[exp],X", "(ptr),y"), None);
    }

    #[test]
    fn literal_only_patterns_require_exact_text() {
        assert_eq!(slices("A", " a "), Some(vec![]));
        assert_eq!(slices("A,[HL]", "a, [hl]"), Some(vec![]));
        assert_eq!(slices("A", "alpha"), None);
    }

    #[test]
    fn placeholders_must_be_bracket_balanced() {
        assert_eq!(slices("([exp])", "(a)+(b)"), None);
        assert_eq!(slices("[exp]", "(a)+(b)"), Some(vec!["(a)+(b)"]));
    }

    #[test]
    fn placeholders_reject_top_level_commas() {
        assert_eq!(slices("[exp]", "(1),z"), None);
        assert_eq!(slices("[exp],[exp]", "a, b, c"), None);
        assert_eq!(slices("#[exp]", "#max(1, 2)"), Some(vec!["max(1, 2)"]));
    }

    #[test]
    fn middle_literals_take_the_rightmost_top_level_occurrence() {
        assert_eq!(
            slices("[exp].[exp],[exp]", "flags.ready.3, .wait"),
            Some(vec!["flags.ready", "3", ".wait"])
        );
        assert_eq!(
            slices("[exp],[exp]", "max(1,2), 4"),
            Some(vec!["max(1,2)", "4"])
        );
    }

    #[test]
    fn literals_inside_quotes_do_not_match() {
        assert_eq!(slices("[exp],X", "\",x\""), None);
        assert_eq!(slices("#[exp]", "#\"a b\""), Some(vec!["\"a b\""]));
    }
}
