use crate::expr::{Expression, LabelRef, Operator, PartKind};
use crate::{EvalError, Number, Value};

/// Looks up label values while an expression is evaluated. `start..end` locates the reference
/// inside the expression text, which nameless lookups need to find their neighbours.
pub trait SymbolResolver {
    fn resolve(&self, reference: &LabelRef, start: usize, end: usize) -> Option<Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// Unresolved labels make the result pending without an error.
    Tentative,
    /// Unresolved labels are errors.
    Final,
}

/// The first label that kept a tentative evaluation from completing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    pub label: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Resolved(Value),
    Pending(Pending),
}

impl Evaluation {
    pub fn resolved(self) -> Option<Value> {
        match self {
            Self::Resolved(value) => Some(value),
            Self::Pending(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

impl Expression {
    pub fn evaluate(
        &self,
        resolver: &dyn SymbolResolver,
        mode: EvalMode,
    ) -> Result<Evaluation, EvalError> {
        let mut stack: Vec<Value> = Vec::with_capacity(self.parts().len());
        for part in self.parts() {
            match &part.kind {
                PartKind::Number(number) => stack.push(Value::Number(*number)),
                PartKind::Str(text) => stack.push(Value::Str(text.clone())),
                PartKind::Label(reference) => {
                    match resolver.resolve(reference, part.start, part.end) {
                        Some(value) => stack.push(value),
                        None if mode == EvalMode::Tentative => {
                            return Ok(Evaluation::Pending(Pending {
                                label: reference.to_string(),
                                start: part.start,
                                end: part.end,
                            }));
                        }
                        None => {
                            return Err(EvalError::Unresolved {
                                name: reference.to_string(),
                                start: part.start,
                                end: part.end,
                            });
                        }
                    }
                }
                PartKind::Operator(op) if op.is_unary() => {
                    let operand = pop(&mut stack, part.start)?;
                    stack.push(apply_unary(*op, operand)?);
                }
                PartKind::Operator(op) => {
                    let rhs = pop(&mut stack, part.start)?;
                    let lhs = pop(&mut stack, part.start)?;
                    stack.push(apply_binary(*op, lhs, rhs)?);
                }
                PartKind::Open | PartKind::Close => {
                    return Err(EvalError::UnbalancedBracket { at: part.start });
                }
            }
        }
        let result = pop(&mut stack, self.text().len())?;
        if !stack.is_empty() {
            return Err(EvalError::Empty);
        }
        Ok(Evaluation::Resolved(result))
    }
}

fn pop(stack: &mut Vec<Value>, at: usize) -> Result<Value, EvalError> {
    stack.pop().ok_or(EvalError::UnexpectedEof { at })
}

fn apply_unary(op: Operator, operand: Value) -> Result<Value, EvalError> {
    let value = match op {
        Operator::Not => Number::Int(i64::from(!operand.is_truthy()?)),
        Operator::Negate => operand.as_number()?.checked_neg()?,
        Operator::LowByte => operand.as_number()?.low_byte(),
        Operator::HighByte => operand.as_number()?.high_byte(),
        _ => unreachable!("binary operator {op:?} applied as unary"),
    };
    Ok(Value::Number(value))
}

fn apply_binary(op: Operator, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    if let (Value::Str(left), Value::Str(right)) = (&lhs, &rhs) {
        match op {
            Operator::Add => return Ok(Value::Str(format!("{left}{right}"))),
            Operator::Eq => return Ok(bool_value(left == right)),
            Operator::Ne => return Ok(bool_value(left != right)),
            _ => {}
        }
    }

    let value = match op {
        Operator::And => return Ok(bool_value(lhs.is_truthy()? && rhs.is_truthy()?)),
        Operator::Or => return Ok(bool_value(lhs.is_truthy()? || rhs.is_truthy()?)),
        _ => {
            let left = lhs.as_number()?;
            let right = rhs.as_number()?;
            match op {
                Operator::Mul => left.checked_mul(right)?,
                Operator::Div => left.checked_div(right)?,
                Operator::Rem => left.checked_rem(right)?,
                Operator::Add => left.checked_add(right)?,
                Operator::Sub => left.checked_sub(right)?,
                Operator::Shl => left.checked_shl(right)?,
                Operator::Shr => left.checked_shr(right)?,
                Operator::BitAnd => left.bit_and(right)?,
                Operator::BitXor => left.bit_xor(right)?,
                Operator::BitOr => left.bit_or(right)?,
                Operator::Lt => return Ok(bool_value(left.as_f64() < right.as_f64())),
                Operator::Le => return Ok(bool_value(left.as_f64() <= right.as_f64())),
                Operator::Gt => return Ok(bool_value(left.as_f64() > right.as_f64())),
                Operator::Ge => return Ok(bool_value(left.as_f64() >= right.as_f64())),
                Operator::Eq => return Ok(bool_value(left.as_f64() == right.as_f64())),
                Operator::Ne => return Ok(bool_value(left.as_f64() != right.as_f64())),
                _ => unreachable!("unary operator {op:?} applied as binary"),
            }
        }
    };
    Ok(Value::Number(value))
}

fn bool_value(value: bool) -> Value {
    Value::int(i64::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Table(HashMap<String, i64>);

    impl SymbolResolver for Table {
        fn resolve(&self, reference: &LabelRef, _start: usize, _end: usize) -> Option<Value> {
            match reference {
                LabelRef::Named(name) => self.0.get(name).copied().map(Value::int),
                LabelRef::Current => Some(Value::int(0x8000)),
                _ => None,
            }
        }
    }

    fn table() -> Table {
        Table(HashMap::from([
            ("screen".to_string(), 0x2100),
            ("count".to_string(), 3),
        ]))
    }

    fn eval(input: &str, mode: EvalMode) -> Result<Evaluation, EvalError> {
        Expression::parse(input)
            .expect("parse")
            .evaluate(&table(), mode)
    }

    #[test]
    fn resolves_labels_through_resolver() {
        assert_eq!(
            eval("screen + count * 2", EvalMode::Final).expect("eval"),
            Evaluation::Resolved(Value::int(0x2106))
        );
        assert_eq!(
            eval("* + 3", EvalMode::Final).expect("eval"),
            Evaluation::Resolved(Value::int(0x8003))
        );
    }

    #[test]
    fn tentative_mode_reports_pending_without_error() {
        let result = eval("later + 1", EvalMode::Tentative).expect("tentative");
        assert_eq!(
            result,
            Evaluation::Pending(Pending {
                label: "later".to_string(),
                start: 0,
                end: 5,
            })
        );
    }

    #[test]
    fn final_mode_rejects_unresolved_labels() {
        let err = eval("1 + later", EvalMode::Final).expect_err("must fail");
        assert_eq!(
            err,
            EvalError::Unresolved {
                name: "later".to_string(),
                start: 4,
                end: 9,
            }
        );
    }

    #[test]
    fn unresolved_nameless_reference_is_pending() {
        let result = eval("--", EvalMode::Tentative).expect("tentative");
        assert!(matches!(result, Evaluation::Pending(Pending { label, .. }) if label == "--"));
    }

    #[test]
    fn byte_selectors_and_logic() {
        assert_eq!(
            eval("<screen", EvalMode::Final).expect("eval"),
            Evaluation::Resolved(Value::int(0x00))
        );
        assert_eq!(
            eval(">screen", EvalMode::Final).expect("eval"),
            Evaluation::Resolved(Value::int(0x21))
        );
        assert_eq!(
            eval("count > 2 && !0", EvalMode::Final).expect("eval"),
            Evaluation::Resolved(Value::int(1))
        );
        assert_eq!(
            eval("1 << 4 | 1 == 1", EvalMode::Final).expect("eval"),
            Evaluation::Resolved(Value::int(17))
        );
    }

    #[test]
    fn strings_compare_and_concatenate() {
        assert_eq!(
            eval("\"ab\" == \"ab\"", EvalMode::Final).expect("eval"),
            Evaluation::Resolved(Value::int(1))
        );
        assert_eq!(
            eval("\"ab\" + \"cd\"", EvalMode::Final).expect("eval"),
            Evaluation::Resolved(Value::Str("abcd".to_string()))
        );
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(
            eval("4 / (count - 3)", EvalMode::Final).expect_err("must fail"),
            EvalError::DivisionByZero
        );
    }
}
