use std::fmt::Write;

use retroasm_eval::Value;
use tracing::info;

use crate::context::{CompileContext, Flow, Reported};
use crate::line::LineId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Radix {
    Decimal,
    Hex,
    Binary,
}

/// Substitutes `{n}` (decimal), `${n}` (hex) and `@{n}` (binary) with the n-th value.
/// Braces that do not hold an index are copied unchanged.
fn render(format: &str, values: &[Value]) -> Result<String, String> {
    let mut out = String::with_capacity(format.len());
    let mut rest = format;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|close| open + close) else {
            break;
        };
        let Ok(index) = rest[open + 1..close].trim().parse::<usize>() else {
            out.push_str(&rest[..=close]);
            rest = &rest[close + 1..];
            continue;
        };
        let (prefix, radix) = match rest[..open].chars().last() {
            Some('$') => (open - 1, Radix::Hex),
            Some('@') => (open - 1, Radix::Binary),
            _ => (open, Radix::Decimal),
        };
        let value = values
            .get(index)
            .ok_or_else(|| format!("placeholder {{{index}}} has no matching argument"))?;
        out.push_str(&rest[..prefix]);
        match radix {
            Radix::Decimal => {
                let _ = write!(out, "{value}");
            }
            Radix::Hex | Radix::Binary => {
                let number = value.as_int().map_err(|error| error.to_string())?;
                let _ = match radix {
                    Radix::Hex => write!(out, "{number:X}"),
                    _ => write!(out, "{number:b}"),
                };
            }
        }
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Evaluates the format string and its arguments. Only called on the final pass.
fn format_message(ctx: &mut CompileContext<'_>, id: LineId) -> Result<String, Reported> {
    let Some(command) = ctx.lines.get(id).command() else {
        return Err(Reported);
    };
    let arguments: Vec<_> = command
        .args
        .iter()
        .cloned()
        .zip(command.expressions.iter().cloned())
        .collect();
    let mut values = Vec::with_capacity(arguments.len());
    for (token, expression) in &arguments {
        let Some(expression) = expression else {
            return Err(Reported);
        };
        let Some(value) = ctx.evaluate(id, expression, token)? else {
            return Err(Reported);
        };
        values.push(value);
    }
    let Some((format, values)) = values.split_first() else {
        return Err(Reported);
    };
    let (first, _) = &arguments[0];
    let Value::Str(format) = format else {
        return Err(ctx.fail(id, first.span(), "expected a format string"));
    };
    render(format, values).map_err(|message| ctx.fail(id, first.span(), message))
}

/// `.MSG` prints on the final pass only.
pub(super) fn compile_message(ctx: &mut CompileContext<'_>, id: LineId) -> Flow {
    if !ctx.pass.is_final() {
        return Flow::Continue;
    }
    if let Ok(message) = format_message(ctx, id) {
        info!(target: "retroasm::msg", "{message}");
        ctx.messages.push(message);
    }
    Flow::Continue
}

/// `.ERROR` stops the enclosing file or expansion on every pass and fails the build on the
/// final one.
pub(super) fn compile_error(ctx: &mut CompileContext<'_>, id: LineId) -> Flow {
    if !ctx.pass.is_final() {
        return Flow::Halt;
    }
    let has_arguments = ctx
        .lines
        .get(id)
        .command()
        .is_some_and(|command| !command.args.is_empty());
    let message = if has_arguments {
        match format_message(ctx, id) {
            Ok(message) => message,
            Err(Reported) => return Flow::Halt,
        }
    } else {
        "error directive reached".to_string()
    };
    let span = ctx.lines.get(id).origin.span();
    ctx.fail(id, span, message);
    Flow::Halt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_placeholders_in_each_radix() {
        let values = [Value::int(10), Value::int(255)];
        assert_eq!(
            render("a={0} b=${1} c=@{0}", &values).expect("render"),
            "a=10 b=FF c=1010"
        );
    }

    #[test]
    fn keeps_braces_without_an_index() {
        let values = [Value::int(1)];
        assert_eq!(render("{x} {0}", &values).expect("render"), "{x} 1");
        assert_eq!(render("open { only", &values).expect("render"), "open { only");
    }

    #[test]
    fn strings_format_as_text() {
        let values = [Value::Str("hero".to_string())];
        assert_eq!(render("name: {0}", &values).expect("render"), "name: hero");
    }

    #[test]
    fn missing_arguments_are_errors() {
        let error = render("{2}", &[Value::int(1)]).expect_err("missing");
        assert!(error.contains("{2}"), "{error}");
    }
}
