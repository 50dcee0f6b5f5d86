use std::fmt;

use crate::{EvalError, Number};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Not,
    Negate,
    LowByte,
    HighByte,
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

impl Operator {
    pub const fn precedence(self) -> u8 {
        match self {
            Self::Not | Self::Negate | Self::LowByte | Self::HighByte => 11,
            Self::Mul | Self::Div | Self::Rem => 10,
            Self::Add | Self::Sub => 9,
            Self::Shl | Self::Shr => 8,
            Self::Lt | Self::Le | Self::Gt | Self::Ge => 7,
            Self::Eq | Self::Ne => 6,
            Self::BitAnd => 5,
            Self::BitXor => 4,
            Self::BitOr => 3,
            Self::And => 2,
            Self::Or => 1,
        }
    }

    pub const fn is_unary(self) -> bool {
        matches!(
            self,
            Self::Not | Self::Negate | Self::LowByte | Self::HighByte
        )
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Not => "!",
            Self::Negate => "-",
            Self::LowByte => "<",
            Self::HighByte => ">",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::BitAnd => "&",
            Self::BitXor => "^",
            Self::BitOr => "|",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

/// How a label part names its target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LabelRef {
    Named(String),
    /// `+`, `++`, ...: the n-th nameless label after the reference.
    Forward(usize),
    /// `-`, `--`, ...: the n-th nameless label before the reference.
    Backward(usize),
    /// `*`: the current program counter.
    Current,
}

impl fmt::Display for LabelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Forward(count) => f.write_str(&"+".repeat(*count)),
            Self::Backward(count) => f.write_str(&"-".repeat(*count)),
            Self::Current => f.write_str("*"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PartKind {
    Number(Number),
    Str(String),
    Label(LabelRef),
    Operator(Operator),
    Open,
    Close,
}

/// One piece of a split expression. `start..end` is the byte range in the text that was split.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionPart {
    pub kind: PartKind,
    pub start: usize,
    pub end: usize,
}

impl ExpressionPart {
    fn new(kind: PartKind, start: usize, end: usize) -> Self {
        Self { kind, start, end }
    }
}

/// An expression reordered into postfix form, ready for repeated evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    text: String,
    parts: Vec<ExpressionPart>,
}

impl Expression {
    pub fn parse(input: &str) -> Result<Self, EvalError> {
        let infix = split(input)?;
        let parts = reorder(infix)?;
        Ok(Self {
            text: input.to_string(),
            parts,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Parts in evaluation order.
    pub fn parts(&self) -> &[ExpressionPart] {
        &self.parts
    }

    pub fn labels(&self) -> impl Iterator<Item = (&LabelRef, usize, usize)> + '_ {
        self.parts.iter().filter_map(|part| match &part.kind {
            PartKind::Label(reference) => Some((reference, part.start, part.end)),
            _ => None,
        })
    }

    /// A bare string literal, as used by `.INCLUDE "file"` style arguments.
    pub fn as_string_literal(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [
                ExpressionPart {
                    kind: PartKind::Str(text),
                    ..
                },
            ] => Some(text),
            _ => None,
        }
    }
}

/// Splits an expression into literals, label references, operators and brackets, in source order.
pub fn split(input: &str) -> Result<Vec<ExpressionPart>, EvalError> {
    let mut splitter = Splitter::new(input);
    splitter.split_all()?;
    Ok(splitter.parts)
}

struct Splitter<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    expect_operand: bool,
    parts: Vec<ExpressionPart>,
}

impl<'a> Splitter<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
            expect_operand: true,
            parts: Vec::new(),
        }
    }

    fn split_all(&mut self) -> Result<(), EvalError> {
        loop {
            self.skip_ws();
            if self.pos >= self.bytes.len() {
                break;
            }
            if self.expect_operand {
                self.split_operand()?;
            } else {
                self.split_operator()?;
            }
        }
        if self.parts.is_empty() {
            return Err(EvalError::Empty);
        }
        if self.expect_operand {
            return Err(EvalError::UnexpectedEof { at: self.pos });
        }
        Ok(())
    }

    fn split_operand(&mut self) -> Result<(), EvalError> {
        let start = self.pos;
        let ch = self.bytes[self.pos];
        match ch {
            b'(' => {
                self.pos += 1;
                self.push(PartKind::Open, start);
                return Ok(());
            }
            b'+' | b'-' if self.is_nameless_run() => {
                let count = self.run_length(ch);
                self.pos += count;
                let reference = if ch == b'+' {
                    LabelRef::Forward(count)
                } else {
                    LabelRef::Backward(count)
                };
                self.push(PartKind::Label(reference), start);
            }
            b'-' => {
                self.pos += 1;
                self.push(PartKind::Operator(Operator::Negate), start);
                return Ok(());
            }
            b'!' => {
                self.pos += 1;
                self.push(PartKind::Operator(Operator::Not), start);
                return Ok(());
            }
            b'<' => {
                self.pos += 1;
                self.push(PartKind::Operator(Operator::LowByte), start);
                return Ok(());
            }
            b'>' => {
                self.pos += 1;
                self.push(PartKind::Operator(Operator::HighByte), start);
                return Ok(());
            }
            b'*' => {
                self.pos += 1;
                self.push(PartKind::Label(LabelRef::Current), start);
            }
            b'"' => {
                let text = self.lex_string()?;
                self.push(PartKind::Str(text), start);
            }
            b'\'' => {
                let value = self.lex_char()?;
                self.push(PartKind::Number(Number::Int(value)), start);
            }
            b'$' => {
                let value = self.lex_radix(1, 16)?;
                self.push(PartKind::Number(value), start);
            }
            b'@' => {
                let value = self.lex_radix(1, 2)?;
                self.push(PartKind::Number(value), start);
            }
            b'0' if matches!(self.peek(1), Some(b'x' | b'X')) => {
                let value = self.lex_radix(2, 16)?;
                self.push(PartKind::Number(value), start);
            }
            b'0'..=b'9' => {
                let value = self.lex_decimal()?;
                self.push(PartKind::Number(value), start);
            }
            b'.' if matches!(self.peek(1), Some(next) if next.is_ascii_digit()) => {
                let value = self.lex_decimal()?;
                self.push(PartKind::Number(value), start);
            }
            b'A'..=b'Z' | b'a'..=b'z' | b'_' | b'.' => {
                while self.pos < self.bytes.len() && is_ident_byte(self.bytes[self.pos]) {
                    self.pos += 1;
                }
                let name = self.input[start..self.pos].to_string();
                self.push(PartKind::Label(LabelRef::Named(name)), start);
            }
            _ => return Err(self.unexpected(start)),
        }
        self.expect_operand = false;
        Ok(())
    }

    fn split_operator(&mut self) -> Result<(), EvalError> {
        let start = self.pos;
        if self.bytes[self.pos] == b')' {
            self.pos += 1;
            self.push(PartKind::Close, start);
            return Ok(());
        }

        macro_rules! binary {
            ($literal:literal, $op:expr) => {
                if self.input[self.pos..].starts_with($literal) {
                    self.pos += $literal.len();
                    self.push(PartKind::Operator($op), start);
                    self.expect_operand = true;
                    return Ok(());
                }
            };
        }

        binary!("<<", Operator::Shl);
        binary!(">>", Operator::Shr);
        binary!("<=", Operator::Le);
        binary!(">=", Operator::Ge);
        binary!("==", Operator::Eq);
        binary!("!=", Operator::Ne);
        binary!("&&", Operator::And);
        binary!("||", Operator::Or);
        binary!("<", Operator::Lt);
        binary!(">", Operator::Gt);
        binary!("*", Operator::Mul);
        binary!("/", Operator::Div);
        binary!("%", Operator::Rem);
        binary!("+", Operator::Add);
        binary!("-", Operator::Sub);
        binary!("&", Operator::BitAnd);
        binary!("^", Operator::BitXor);
        binary!("|", Operator::BitOr);

        let end = self.token_end(start);
        Err(EvalError::ExpectedOperator {
            token: self.input[start..end].to_string(),
            start,
            end,
        })
    }

    /// A `+`/`-` run in operand position names a nameless label when nothing but a closing
    /// bracket or the end of the text follows it.
    fn is_nameless_run(&self) -> bool {
        let ch = self.bytes[self.pos];
        let mut cursor = self.pos + self.run_length(ch);
        while cursor < self.bytes.len() && self.bytes[cursor].is_ascii_whitespace() {
            cursor += 1;
        }
        cursor >= self.bytes.len() || self.bytes[cursor] == b')'
    }

    fn run_length(&self, ch: u8) -> usize {
        self.bytes[self.pos..]
            .iter()
            .take_while(|byte| **byte == ch)
            .count()
    }

    fn lex_radix(&mut self, prefix: usize, radix: u32) -> Result<Number, EvalError> {
        let start = self.pos;
        self.pos += prefix;
        let digits_start = self.pos;
        while self.pos < self.bytes.len() && is_ident_byte(self.bytes[self.pos]) {
            self.pos += 1;
        }
        let digits = self.input[digits_start..self.pos].replace('_', "");
        if digits.is_empty() {
            return Err(self.invalid_number(start));
        }
        i64::from_str_radix(&digits, radix)
            .map(Number::Int)
            .map_err(|_| self.invalid_number(start))
    }

    fn lex_decimal(&mut self) -> Result<Number, EvalError> {
        let start = self.pos;
        while self.pos < self.bytes.len()
            && (is_ident_byte(self.bytes[self.pos]) || self.bytes[self.pos] == b'.')
        {
            self.pos += 1;
        }
        let literal = &self.input[start..self.pos];
        if literal.contains('.') {
            let value: f64 = literal.parse().map_err(|_| self.invalid_number(start))?;
            return crate::number_from_f64(value).map_err(|_| self.invalid_number(start));
        }
        literal
            .parse::<i64>()
            .map(Number::Int)
            .map_err(|_| self.invalid_number(start))
    }

    fn lex_string(&mut self) -> Result<String, EvalError> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        let mut chars = self.input[self.pos..].char_indices();
        while let Some((offset, ch)) = chars.next() {
            match ch {
                '"' => {
                    self.pos += offset + 1;
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, escaped)) => out.push(unescape(escaped)),
                    None => break,
                },
                other => out.push(other),
            }
        }
        Err(EvalError::UnterminatedString { start })
    }

    fn lex_char(&mut self) -> Result<i64, EvalError> {
        let start = self.pos;
        let rest = &self.input[start + 1..];
        let mut chars = rest.char_indices();
        let (value, consumed) = match chars.next() {
            Some((_, '\\')) => match chars.next() {
                Some((offset, escaped)) => (unescape(escaped), offset + escaped.len_utf8()),
                None => return Err(EvalError::UnterminatedString { start }),
            },
            Some((_, '\'')) | None => return Err(EvalError::UnterminatedString { start }),
            Some((_, ch)) => (ch, ch.len_utf8()),
        };
        if !rest[consumed..].starts_with('\'') {
            return Err(EvalError::UnterminatedString { start });
        }
        self.pos = start + 1 + consumed + 1;
        Ok(value as i64)
    }

    fn push(&mut self, kind: PartKind, start: usize) {
        self.parts.push(ExpressionPart::new(kind, start, self.pos));
    }

    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn token_end(&self, start: usize) -> usize {
        let mut end = start + 1;
        while end < self.bytes.len() && !self.input.is_char_boundary(end) {
            end += 1;
        }
        end
    }

    fn unexpected(&self, start: usize) -> EvalError {
        let end = self.token_end(start);
        EvalError::UnexpectedToken {
            token: self.input[start..end].to_string(),
            start,
            end,
        }
    }

    fn invalid_number(&self, start: usize) -> EvalError {
        EvalError::InvalidNumber {
            literal: self.input[start..self.pos].to_string(),
            start,
            end: self.pos,
        }
    }
}

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'.'
}

fn unescape(ch: char) -> char {
    match ch {
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        '0' => '\0',
        other => other,
    }
}

/// Shunting-yard: operands go straight to the output, operators wait on a stack until an
/// operator of lower precedence (or a closing bracket) releases them.
pub(crate) fn reorder(infix: Vec<ExpressionPart>) -> Result<Vec<ExpressionPart>, EvalError> {
    let mut output = Vec::with_capacity(infix.len());
    let mut stack: Vec<ExpressionPart> = Vec::new();

    for part in infix {
        match &part.kind {
            PartKind::Number(_) | PartKind::Str(_) | PartKind::Label(_) => output.push(part),
            PartKind::Open => stack.push(part),
            PartKind::Close => loop {
                match stack.pop() {
                    Some(ExpressionPart {
                        kind: PartKind::Open,
                        ..
                    }) => break,
                    Some(top) => output.push(top),
                    None => return Err(EvalError::UnbalancedBracket { at: part.start }),
                }
            },
            PartKind::Operator(op) if op.is_unary() => stack.push(part),
            PartKind::Operator(op) => {
                let precedence = op.precedence();
                while let Some(top) = stack.last() {
                    let PartKind::Operator(top_op) = &top.kind else {
                        break;
                    };
                    if top_op.precedence() < precedence {
                        break;
                    }
                    if let Some(top) = stack.pop() {
                        output.push(top);
                    }
                }
                stack.push(part);
            }
        }
    }

    while let Some(top) = stack.pop() {
        if matches!(top.kind, PartKind::Open) {
            return Err(EvalError::UnbalancedBracket { at: top.start });
        }
        output.push(top);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<PartKind> {
        Expression::parse(input)
            .expect("parse")
            .parts()
            .iter()
            .map(|part| part.kind.clone())
            .collect()
    }

    #[test]
    fn reorders_by_precedence() {
        assert_eq!(
            kinds("1 + 2 * 3"),
            vec![
                PartKind::Number(Number::Int(1)),
                PartKind::Number(Number::Int(2)),
                PartKind::Number(Number::Int(3)),
                PartKind::Operator(Operator::Mul),
                PartKind::Operator(Operator::Add),
            ]
        );
    }

    #[test]
    fn equal_precedence_is_left_associative() {
        assert_eq!(
            kinds("8 - 2 - 1"),
            vec![
                PartKind::Number(Number::Int(8)),
                PartKind::Number(Number::Int(2)),
                PartKind::Operator(Operator::Sub),
                PartKind::Number(Number::Int(1)),
                PartKind::Operator(Operator::Sub),
            ]
        );
    }

    #[test]
    fn unary_and_binary_forms_are_context_sensitive() {
        let parts = split("<label > -2").expect("split");
        let ops: Vec<_> = parts
            .iter()
            .filter_map(|part| match part.kind {
                PartKind::Operator(op) => Some(op),
                _ => None,
            })
            .collect();
        assert_eq!(ops, vec![Operator::LowByte, Operator::Gt, Operator::Negate]);
    }

    #[test]
    fn nameless_runs_become_positional_references() {
        assert_eq!(kinds("++"), vec![PartKind::Label(LabelRef::Forward(2))]);
        assert_eq!(kinds("(-)"), vec![PartKind::Label(LabelRef::Backward(1))]);
        assert_eq!(
            kinds("-1"),
            vec![
                PartKind::Number(Number::Int(1)),
                PartKind::Operator(Operator::Negate),
            ]
        );
    }

    #[test]
    fn star_in_operand_position_is_current_address() {
        assert_eq!(
            kinds("* + 2"),
            vec![
                PartKind::Label(LabelRef::Current),
                PartKind::Number(Number::Int(2)),
                PartKind::Operator(Operator::Add),
            ]
        );
    }

    #[test]
    fn labels_keep_source_offsets() {
        let expression = Expression::parse("start + .loop_2").expect("parse");
        let labels: Vec<_> = expression
            .labels()
            .map(|(reference, start, end)| (reference.to_string(), start, end))
            .collect();
        assert_eq!(
            labels,
            vec![("start".to_string(), 0, 5), (".loop_2".to_string(), 8, 15)]
        );
    }

    #[test]
    fn strings_and_chars_are_literals() {
        assert_eq!(
            kinds(r#""say \"hi\"""#),
            vec![PartKind::Str("say \"hi\"".to_string())]
        );
        assert_eq!(kinds("'A'"), vec![PartKind::Number(Number::Int(65))]);
        assert_eq!(kinds(r"'\n'"), vec![PartKind::Number(Number::Int(10))]);
    }

    #[test]
    fn rejects_unbalanced_brackets() {
        assert!(matches!(
            Expression::parse("(1 + 2"),
            Err(EvalError::UnbalancedBracket { at: 0 })
        ));
        assert!(matches!(
            Expression::parse("1 + 2)"),
            Err(EvalError::UnbalancedBracket { at: 5 })
        ));
    }

    #[test]
    fn rejects_operand_where_operator_expected() {
        assert!(matches!(
            Expression::parse("1 2"),
            Err(EvalError::ExpectedOperator { start: 2, .. })
        ));
        assert!(matches!(
            Expression::parse("1 +"),
            Err(EvalError::UnexpectedEof { .. })
        ));
        assert!(matches!(
            Expression::parse("* )"),
            Err(EvalError::UnbalancedBracket { .. })
        ));
        assert!(matches!(Expression::parse("   "), Err(EvalError::Empty)));
    }

    #[test]
    fn rejects_trailing_garbage_in_numbers() {
        assert!(matches!(
            Expression::parse("12ab"),
            Err(EvalError::InvalidNumber { literal, .. }) if literal == "12ab"
        ));
        assert!(matches!(
            Expression::parse("$G0"),
            Err(EvalError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn string_literal_is_exposed() {
        let expression = Expression::parse("\"data.bin\"").expect("parse");
        assert_eq!(expression.as_string_literal(), Some("data.bin"));
        let sum = Expression::parse("\"a\" + 1").expect("parse");
        assert_eq!(sum.as_string_literal(), None);
    }
}
