mod eval;
mod expr;

use std::fmt;

use thiserror::Error;

pub use crate::eval::{EvalMode, Evaluation, Pending, SymbolResolver};
pub use crate::expr::{Expression, ExpressionPart, LabelRef, Operator, PartKind, split};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub const fn int(value: i64) -> Self {
        Self::Int(value)
    }

    pub const fn float(value: f64) -> Self {
        Self::Float(value)
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(value) => value as f64,
            Self::Float(value) => value,
        }
    }

    pub fn to_i64_exact(self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(value),
            Self::Float(value) => {
                if !value.is_finite() || value.fract() != 0.0 {
                    return None;
                }
                if value < i64::MIN as f64 || value > i64::MAX as f64 {
                    return None;
                }
                Some(value as i64)
            }
        }
    }

    /// Integer view used when a value lands in emitted bytes; fractions truncate toward zero.
    pub fn to_i64_truncated(self) -> i64 {
        match self {
            Self::Int(value) => value,
            Self::Float(value) => value.trunc() as i64,
        }
    }

    pub fn is_truthy(self) -> bool {
        match self {
            Self::Int(value) => value != 0,
            Self::Float(value) => value != 0.0,
        }
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self, EvalError> {
        match (self, rhs) {
            (Self::Int(lhs), Self::Int(rhs)) => lhs
                .checked_add(rhs)
                .map(Self::Int)
                .ok_or(EvalError::Overflow),
            (lhs, rhs) => number_from_f64(lhs.as_f64() + rhs.as_f64()),
        }
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self, EvalError> {
        match (self, rhs) {
            (Self::Int(lhs), Self::Int(rhs)) => lhs
                .checked_sub(rhs)
                .map(Self::Int)
                .ok_or(EvalError::Overflow),
            (lhs, rhs) => number_from_f64(lhs.as_f64() - rhs.as_f64()),
        }
    }

    pub fn checked_mul(self, rhs: Self) -> Result<Self, EvalError> {
        match (self, rhs) {
            (Self::Int(lhs), Self::Int(rhs)) => lhs
                .checked_mul(rhs)
                .map(Self::Int)
                .ok_or(EvalError::Overflow),
            (lhs, rhs) => number_from_f64(lhs.as_f64() * rhs.as_f64()),
        }
    }

    pub fn checked_div(self, rhs: Self) -> Result<Self, EvalError> {
        if rhs.as_f64() == 0.0 {
            return Err(EvalError::DivisionByZero);
        }
        match (self, rhs) {
            (Self::Int(lhs), Self::Int(rhs)) => {
                if lhs == i64::MIN && rhs == -1 {
                    return Err(EvalError::Overflow);
                }
                if lhs % rhs == 0 {
                    Ok(Self::Int(lhs / rhs))
                } else {
                    number_from_f64(lhs as f64 / rhs as f64)
                }
            }
            (lhs, rhs) => number_from_f64(lhs.as_f64() / rhs.as_f64()),
        }
    }

    pub fn checked_rem(self, rhs: Self) -> Result<Self, EvalError> {
        let (lhs, rhs) = integer_operands(self, rhs, "%")?;
        if rhs == 0 {
            return Err(EvalError::DivisionByZero);
        }
        lhs.checked_rem(rhs)
            .map(Self::Int)
            .ok_or(EvalError::Overflow)
    }

    pub fn checked_shl(self, rhs: Self) -> Result<Self, EvalError> {
        let (lhs, rhs) = integer_operands(self, rhs, "<<")?;
        let amount = u32::try_from(rhs).map_err(|_| EvalError::Overflow)?;
        lhs.checked_shl(amount)
            .map(Self::Int)
            .ok_or(EvalError::Overflow)
    }

    pub fn checked_shr(self, rhs: Self) -> Result<Self, EvalError> {
        let (lhs, rhs) = integer_operands(self, rhs, ">>")?;
        let amount = u32::try_from(rhs).map_err(|_| EvalError::Overflow)?;
        lhs.checked_shr(amount)
            .map(Self::Int)
            .ok_or(EvalError::Overflow)
    }

    pub fn bit_and(self, rhs: Self) -> Result<Self, EvalError> {
        let (lhs, rhs) = integer_operands(self, rhs, "&")?;
        Ok(Self::Int(lhs & rhs))
    }

    pub fn bit_xor(self, rhs: Self) -> Result<Self, EvalError> {
        let (lhs, rhs) = integer_operands(self, rhs, "^")?;
        Ok(Self::Int(lhs ^ rhs))
    }

    pub fn bit_or(self, rhs: Self) -> Result<Self, EvalError> {
        let (lhs, rhs) = integer_operands(self, rhs, "|")?;
        Ok(Self::Int(lhs | rhs))
    }

    pub fn checked_neg(self) -> Result<Self, EvalError> {
        match self {
            Self::Int(value) => value
                .checked_neg()
                .map(Self::Int)
                .ok_or(EvalError::Overflow),
            Self::Float(value) => number_from_f64(-value),
        }
    }

    pub fn low_byte(self) -> Self {
        Self::Int(self.to_i64_truncated() & 0xFF)
    }

    pub fn high_byte(self) -> Self {
        Self::Int((self.to_i64_truncated() >> 8) & 0xFF)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
        }
    }
}

fn integer_operands(lhs: Number, rhs: Number, op: &'static str) -> Result<(i64, i64), EvalError> {
    let lhs = lhs
        .to_i64_exact()
        .ok_or(EvalError::IntegerRequired { op })?;
    let rhs = rhs
        .to_i64_exact()
        .ok_or(EvalError::IntegerRequired { op })?;
    Ok((lhs, rhs))
}

pub(crate) fn number_from_f64(value: f64) -> Result<Number, EvalError> {
    if !value.is_finite() {
        return Err(EvalError::Overflow);
    }
    if value.fract() == 0.0 && value >= i64::MIN as f64 && value <= i64::MAX as f64 {
        return Ok(Number::Int(value as i64));
    }
    Ok(Number::Float(value))
}

/// Result of evaluating an expression: a number, or a string literal (possibly forwarded
/// through a label such as a macro parameter).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(Number),
    Str(String),
}

impl Value {
    pub const fn int(value: i64) -> Self {
        Self::Number(Number::Int(value))
    }

    /// Numeric view of the value. A one-character string stands for its character code.
    pub fn as_number(&self) -> Result<Number, EvalError> {
        match self {
            Self::Number(number) => Ok(*number),
            Self::Str(text) => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) => Ok(Number::Int(ch as i64)),
                    _ => Err(EvalError::StringInNumericContext {
                        text: text.clone(),
                    }),
                }
            }
        }
    }

    pub fn as_int(&self) -> Result<i64, EvalError> {
        self.as_number().map(Number::to_i64_truncated)
    }

    pub fn is_truthy(&self) -> Result<bool, EvalError> {
        match self {
            Self::Str(text) if text.chars().count() != 1 => Ok(!text.is_empty()),
            other => other.as_number().map(Number::is_truthy),
        }
    }
}

impl From<Number> for Value {
    fn from(value: Number) -> Self {
        Self::Number(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::Str(text) => write!(f, "{text}"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvalError {
    #[error("unexpected '{token}' in expression")]
    UnexpectedToken {
        token: String,
        start: usize,
        end: usize,
    },
    #[error("expected an operator after operand, found '{token}'")]
    ExpectedOperator {
        token: String,
        start: usize,
        end: usize,
    },
    #[error("unexpected end of expression")]
    UnexpectedEof { at: usize },
    #[error("empty expression")]
    Empty,
    #[error("invalid number literal '{literal}'")]
    InvalidNumber {
        literal: String,
        start: usize,
        end: usize,
    },
    #[error("unterminated string literal")]
    UnterminatedString { start: usize },
    #[error("unbalanced bracket")]
    UnbalancedBracket { at: usize },
    #[error("unresolved label '{name}'")]
    Unresolved {
        name: String,
        start: usize,
        end: usize,
    },
    #[error("string \"{text}\" cannot be used as a number")]
    StringInNumericContext { text: String },
    #[error("operator '{op}' requires exact integer operands")]
    IntegerRequired { op: &'static str },
    #[error("division by zero")]
    DivisionByZero,
    #[error("arithmetic overflow")]
    Overflow,
}

impl EvalError {
    /// Byte range inside the evaluated text the error points at, when known.
    pub fn range(&self) -> Option<(usize, usize)> {
        match self {
            Self::UnexpectedToken { start, end, .. }
            | Self::ExpectedOperator { start, end, .. }
            | Self::InvalidNumber { start, end, .. }
            | Self::Unresolved { start, end, .. } => Some((*start, *end)),
            Self::UnexpectedEof { at } | Self::UnbalancedBracket { at } => Some((*at, *at + 1)),
            Self::UnterminatedString { start } => Some((*start, *start + 1)),
            _ => None,
        }
    }
}

struct NoSymbols;

impl SymbolResolver for NoSymbols {
    fn resolve(&self, _reference: &LabelRef, _start: usize, _end: usize) -> Option<Value> {
        None
    }
}

/// Parses and evaluates a self-contained expression (no label references).
pub fn evaluate(input: &str) -> Result<Value, EvalError> {
    let expression = Expression::parse(input)?;
    match expression.evaluate(&NoSymbols, EvalMode::Final)? {
        Evaluation::Resolved(value) => Ok(value),
        Evaluation::Pending(pending) => Err(EvalError::Unresolved {
            name: pending.label,
            start: pending.start,
            end: pending.end,
        }),
    }
}

pub fn evaluate_with(
    input: &str,
    resolver: &dyn SymbolResolver,
    mode: EvalMode,
) -> Result<Evaluation, EvalError> {
    Expression::parse(input)?.evaluate(resolver, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_basic_arithmetic() {
        assert_eq!(evaluate("1 + 2 * 3").expect("eval"), Value::int(7));
        assert_eq!(evaluate("(1 + 2) * 3").expect("eval"), Value::int(9));
    }

    #[test]
    fn evaluates_numeric_literal_forms() {
        assert_eq!(evaluate("$FF").expect("eval"), Value::int(255));
        assert_eq!(evaluate("@1010").expect("eval"), Value::int(10));
        assert_eq!(evaluate("255").expect("eval"), Value::int(255));
    }

    #[test]
    fn rejects_malformed_literals() {
        assert!(matches!(
            evaluate("$"),
            Err(EvalError::InvalidNumber { literal, .. }) if literal == "$"
        ));
        assert!(matches!(
            evaluate("@2"),
            Err(EvalError::InvalidNumber { literal, .. }) if literal == "@2"
        ));
    }

    #[test]
    fn single_character_strings_coerce_to_codes() {
        assert_eq!(evaluate("\"A\" + 1").expect("eval"), Value::int(66));
        assert!(matches!(
            evaluate("\"AB\" * 2"),
            Err(EvalError::StringInNumericContext { .. })
        ));
    }

    #[test]
    fn fractional_division_keeps_precision_until_truncated() {
        let value = evaluate("5 / 2 * 2").expect("eval");
        assert_eq!(value, Value::int(5));
        let half = evaluate("3 / 2").expect("eval");
        assert_eq!(half.as_int().expect("int"), 1);
    }
}
