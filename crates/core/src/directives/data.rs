use retroasm_eval::{Expression, Value};

use crate::context::{CompileContext, Flow};
use crate::line::{LineId, LineState};
use crate::symbols::{DataGroup, LabelKind, LabelScope, classify_name};
use crate::token::{Token, top_level_matches};

use super::{DataCell, Directive, DirectiveState, put_state, take_state};

/// Little-endian cell of `width` bytes. Values outside both the signed and unsigned range of
/// the width are truncated with a warning on the final pass.
fn cell(ctx: &mut CompileContext<'_>, token: &Token, value: i64, width: usize) -> Vec<Option<u8>> {
    let bits = (width * 8) as u32;
    let (min, max) = (-(1i64 << (bits - 1)), (1i64 << bits) - 1);
    let truncated = value & max;
    if !(min..=max).contains(&value) && ctx.pass.is_final() {
        ctx.warning(
            token.span(),
            format!("value {value} does not fit in {width} byte(s), truncated to ${truncated:X}"),
        );
    }
    value.to_le_bytes()[..width].iter().copied().map(Some).collect()
}

/// Bytes for one data argument. Strings produce one cell per character; values that are not
/// known yet reserve a cell.
pub(super) fn encode_value(
    ctx: &mut CompileContext<'_>,
    id: LineId,
    token: &Token,
    expression: &Expression,
    width: usize,
) -> Vec<Option<u8>> {
    match ctx.evaluate(id, expression, token) {
        Ok(Some(Value::Str(text))) if text.chars().count() != 1 => text
            .chars()
            .flat_map(|ch| cell(ctx, token, i64::from(u32::from(ch)), width))
            .collect(),
        Ok(Some(value)) => match value.as_int() {
            Ok(value) => cell(ctx, token, value, width),
            Err(error) => {
                ctx.fail(id, token.span(), error.to_string());
                vec![None; width]
            }
        },
        Ok(None) | Err(_) => vec![None; width],
    }
}

/// `.DB`, `.DW` and `.DL`.
pub(super) fn compile_values(ctx: &mut CompileContext<'_>, id: LineId, directive: Directive) -> Flow {
    let width = directive.data_width().unwrap_or(1);
    let Some(command) = ctx.lines.get(id).command() else {
        return Flow::Continue;
    };
    let arguments: Vec<(Token, Option<Expression>)> = command
        .args
        .iter()
        .cloned()
        .zip(command.expressions.iter().cloned())
        .collect();
    let mut bytes = Vec::new();
    for (token, expression) in arguments {
        match expression {
            Some(expression) => bytes.extend(encode_value(ctx, id, &token, &expression, width)),
            None => bytes.extend(std::iter::repeat_n(None, width)),
        }
    }
    ctx.emit(id, bytes);
    Flow::Continue
}

/// Splits a data-group row into its optional `name:` and its cells.
fn split_row(row: &Token) -> (Option<Token>, Token) {
    let colon = top_level_matches(&row.text, |ch| ch == ':').first().copied();
    match colon {
        Some(at) => {
            let name = row.slice(0..at).trimmed();
            let rest = row.slice(at + 1..row.text.len()).trimmed();
            (Some(name), rest)
        }
        None => (None, row.clone()),
    }
}

/// Indexes the rows of a `.DBG`/`.DWG`/`.DLG` block. Row names become labels whose value is
/// the element index of the row's first cell.
pub(super) fn declare_group(ctx: &mut CompileContext<'_>, id: LineId) {
    let line = ctx.lines.get(id);
    let Some(command) = line.command() else {
        return;
    };
    let rows = command.sections.first().map(|section| section.body.clone()).unwrap_or_default();
    let owner = line
        .label
        .as_ref()
        .filter(|label| classify_name(&label.text) != Some(LabelScope::Nameless))
        .map(|label| label.text.clone());
    let (scope, source_id) = (line.scope, line.origin.source_id);

    let mut group = DataGroup::new(owner.clone().unwrap_or_default(), source_id);
    let mut cells = Vec::new();
    for row in rows {
        let row_line = ctx.lines.get(row);
        let (origin, comment) = (row_line.origin.clone(), row_line.comment.clone());
        ctx.lines.get_mut(row).mark(LineState::Finished);
        let (name, rest) = split_row(&origin);
        let element = cells.len();

        if let Some(name) = name {
            let full = match &owner {
                Some(owner) => format!("{owner}.{}", name.text),
                None => name.text.clone(),
            };
            let token = Token {
                text: full,
                ..name.clone()
            };
            if let Some(label) = ctx.define_label(id, &token, scope, LabelKind::Defined, false) {
                ctx.symbols.label_mut(label).doc = comment;
                ctx.set_label_value(label, Some(Value::int(element as i64)));
            }
            group.record(&name.text.clone(), name, element);
        }

        for (offset, token) in rest.split_top_level(',').into_iter().enumerate() {
            if token.is_empty() {
                let span = origin.span();
                ctx.fail(id, span, "empty cell in data row");
                continue;
            }
            if matches!(
                classify_name(&token.text),
                Some(LabelScope::Global | LabelScope::Local)
            ) {
                group.record(&token.text, token.clone(), element + offset);
            }
            cells.push(DataCell {
                row,
                token,
                expression: None,
            });
        }
    }
    if owner.is_some() {
        ctx.symbols.add_data_group(group);
    }
    put_state(ctx, id, DirectiveState::DataGroup(cells));
}

pub(super) fn parse_group(ctx: &mut CompileContext<'_>, id: LineId) {
    let DirectiveState::DataGroup(mut cells) = take_state(ctx, id) else {
        return;
    };
    for cell in &mut cells {
        cell.expression = ctx.parse_expression(id, &cell.token);
    }
    put_state(ctx, id, DirectiveState::DataGroup(cells));
}

pub(super) fn compile_group(ctx: &mut CompileContext<'_>, id: LineId, directive: Directive) -> Flow {
    let width = directive.data_width().unwrap_or(1);
    let cells = match ctx.lines.get(id).command().map(|command| &command.state) {
        Some(DirectiveState::DataGroup(cells)) => cells.clone(),
        _ => return Flow::Continue,
    };
    let mut bytes = Vec::new();
    for cell in cells {
        match &cell.expression {
            Some(expression) => bytes.extend(encode_value(ctx, id, &cell.token, expression, width)),
            None => bytes.extend(std::iter::repeat_n(None, width)),
        }
    }
    ctx.emit(id, bytes);
    Flow::Continue
}

/// `.HEX`: whitespace-separated groups of hex digit pairs.
pub(super) fn parse_hex(ctx: &mut CompileContext<'_>, id: LineId) {
    let Some(arg) = ctx.lines.get(id).command().and_then(|command| command.args.first().cloned())
    else {
        return;
    };
    let mut bytes = Vec::new();
    let mut start = None;
    let mut groups = Vec::new();
    for (index, ch) in arg.text.char_indices().chain([(arg.text.len(), ' ')]) {
        match (ch.is_whitespace(), start) {
            (false, None) => start = Some(index),
            (true, Some(from)) => {
                groups.push(arg.slice(from..index));
                start = None;
            }
            _ => {}
        }
    }
    for group in groups {
        let text = group.text.as_str();
        if text.len() % 2 != 0 || !text.chars().all(|ch| ch.is_ascii_hexdigit()) {
            ctx.fail(id, group.span(), format!("invalid hex group '{text}'"));
            return;
        }
        for offset in (0..text.len()).step_by(2) {
            match u8::from_str_radix(&text[offset..offset + 2], 16) {
                Ok(byte) => bytes.push(byte),
                Err(error) => {
                    ctx.fail(id, group.span(), error.to_string());
                    return;
                }
            }
        }
    }
    put_state(ctx, id, DirectiveState::Binary(bytes));
}

/// Emits bytes captured in an earlier phase (`.HEX`).
pub(super) fn compile_binary(ctx: &mut CompileContext<'_>, id: LineId) -> Flow {
    let bytes = match ctx.lines.get(id).command().map(|command| &command.state) {
        Some(DirectiveState::Binary(bytes)) => bytes.iter().copied().map(Some).collect(),
        _ => return Flow::Continue,
    };
    ctx.emit(id, bytes);
    Flow::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::SourceId;

    #[test]
    fn rows_split_at_the_first_top_level_colon() {
        let row = Token::new(SourceId(0), 3, 4, 40, "hp: 10, \"a:b\"");
        let (name, rest) = split_row(&row);
        assert_eq!(name.map(|name| name.text), Some("hp".to_string()));
        assert_eq!(rest.text, "10, \"a:b\"");
        assert_eq!(rest.column, 8);

        let (name, rest) = split_row(&Token::new(SourceId(0), 1, 0, 0, "1, 2"));
        assert!(name.is_none());
        assert_eq!(rest.text, "1, 2");
    }
}
