use retroasm_eval::Value;

use crate::context::{CompileContext, Flow};
use crate::line::{LineId, LineState};
use crate::symbols::LabelKind;

use super::{DirectiveState, EnumRow, parse_arguments, put_state};

/// `.DEF name expr` creates the constant up front so every line can see it.
pub(super) fn declare(ctx: &mut CompileContext<'_>, id: LineId) {
    let line = ctx.lines.get(id);
    let Some(name) = line.command().and_then(|command| command.args.first().cloned()) else {
        return;
    };
    let (scope, comment) = (line.scope, line.comment.clone());
    if let Some(label) = ctx.define_label(id, &name, scope, LabelKind::Defined, false) {
        ctx.symbols.label_mut(label).doc = comment;
        put_state(ctx, id, DirectiveState::Define(label));
    }
}

pub(super) fn parse(ctx: &mut CompileContext<'_>, id: LineId) {
    parse_arguments(ctx, id, 1);
}

pub(super) fn compile(ctx: &mut CompileContext<'_>, id: LineId) -> Flow {
    let Some(command) = ctx.lines.get(id).command() else {
        return Flow::Continue;
    };
    let DirectiveState::Define(label) = command.state else {
        return Flow::Continue;
    };
    let (Some(expression), Some(token)) = (command.expression(1).cloned(), command.args.get(1).cloned())
    else {
        return Flow::Continue;
    };
    if let Ok(Some(value)) = ctx.evaluate(id, &expression, &token) {
        ctx.set_label_value(label, Some(value));
    }
    Flow::Continue
}

/// Creates one label per `.ENUM` row. Rows are `name` or `name, length`.
pub(super) fn declare_enum(ctx: &mut CompileContext<'_>, id: LineId) {
    let line = ctx.lines.get(id);
    let Some(command) = line.command() else {
        return;
    };
    let rows = command.sections.first().map(|section| section.body.clone()).unwrap_or_default();
    let scope = line.scope;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let row_line = ctx.lines.get(row);
        let (origin, comment) = (row_line.origin.clone(), row_line.comment.clone());
        ctx.lines.get_mut(row).mark(LineState::Finished);

        let mut parts = origin.split_top_level(',').into_iter();
        let (Some(name), length, None) = (parts.next(), parts.next(), parts.next()) else {
            ctx.fail(id, origin.span(), "expected 'name' or 'name, length' in .ENUM");
            continue;
        };
        let name = match name.text.strip_suffix(':') {
            Some(stripped) => name.slice(0..stripped.len()).trimmed(),
            None => name,
        };
        let Some(label) = ctx.define_label(id, &name, scope, LabelKind::Defined, false) else {
            continue;
        };
        ctx.symbols.label_mut(label).doc = comment;
        entries.push(EnumRow {
            name,
            label,
            length,
            expression: None,
        });
    }
    put_state(ctx, id, DirectiveState::Enum(entries));
}

pub(super) fn parse_enum(ctx: &mut CompileContext<'_>, id: LineId) {
    parse_arguments(ctx, id, 0);
    let state = super::take_state(ctx, id);
    let DirectiveState::Enum(mut rows) = state else {
        put_state(ctx, id, state);
        return;
    };
    for row in &mut rows {
        if let Some(length) = &row.length {
            row.expression = ctx.parse_expression(id, length);
        }
    }
    put_state(ctx, id, DirectiveState::Enum(rows));
}

/// Assigns consecutive values. Once a length is unknown the rows below it keep the value
/// from the previous pass.
pub(super) fn compile_enum(ctx: &mut CompileContext<'_>, id: LineId) -> Flow {
    let Some(command) = ctx.lines.get(id).command() else {
        return Flow::Continue;
    };
    let DirectiveState::Enum(rows) = &command.state else {
        return Flow::Continue;
    };
    let (rows, has_start) = (rows.clone(), !command.args.is_empty());
    let mut current = if has_start {
        ctx.command_int(id, 0).ok().flatten()
    } else {
        Some(0)
    };
    for row in rows {
        if let Some(value) = current {
            ctx.set_label_value(row.label, Some(Value::int(value)));
        }
        let length = match (&row.expression, &row.length) {
            (Some(expression), Some(token)) => ctx.evaluate_int(id, expression, token).ok().flatten(),
            (None, Some(_)) => None,
            _ => Some(1),
        };
        current = current.zip(length).map(|(value, length)| value + length);
    }
    Flow::Continue
}
