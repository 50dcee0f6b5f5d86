use tracing::trace;

use crate::compiler::{analyze, compile_lines};
use crate::context::{CompileContext, Flow, MAX_EXPANSION_DEPTH};
use crate::line::LineId;
use crate::symbols::ScopeKind;

use super::{DirectiveState, RepeatState, put_state, take_state};

const MAX_REPEAT_COUNT: i64 = 0x1_0000;

/// Copies the body once per iteration, each copy in its own scope, and analyses the copies.
fn materialize(ctx: &mut CompileContext<'_>, id: LineId, count: usize) -> Vec<Vec<LineId>> {
    let line = ctx.lines.get(id);
    let parent = line.scope;
    let source_id = ctx.symbols.scope(parent).source_id;
    let template = line
        .command()
        .and_then(|command| command.sections.first())
        .map(|section| section.body.clone())
        .unwrap_or_default();
    trace!(count, lines = template.len(), "materialising repeat block");

    ctx.expansion_depth += 1;
    let iterations = (0..count)
        .map(|_| {
            let scope = ctx.symbols.add_scope(ScopeKind::Repeat, parent, source_id);
            let copies = ctx.lines.instantiate(&template, scope);
            analyze(ctx, &copies)
        })
        .collect();
    ctx.expansion_depth -= 1;
    iterations
}

/// The count is evaluated once, on the first pass where it is known; later passes recompile
/// the same copies.
pub(super) fn compile(ctx: &mut CompileContext<'_>, id: LineId) -> Flow {
    let mut state = match take_state(ctx, id) {
        DirectiveState::Repeat(state) => state,
        _ => RepeatState::default(),
    };
    if state.iterations.is_none() {
        let count = match ctx.command_int(id, 0) {
            Ok(Some(count)) => count,
            _ => {
                put_state(ctx, id, DirectiveState::Repeat(state));
                return Flow::Continue;
            }
        };
        let span = ctx.lines.get(id).origin.span();
        if !(0..=MAX_REPEAT_COUNT).contains(&count) {
            ctx.fail(id, span, format!("repeat count {count} is outside 0..={MAX_REPEAT_COUNT}"));
            return Flow::Continue;
        }
        if ctx.expansion_depth >= MAX_EXPANSION_DEPTH {
            ctx.fail(id, span, "repeat blocks are nested too deeply");
            return Flow::Continue;
        }
        state.iterations = Some(materialize(ctx, id, count as usize));
    }

    let iterations = state.iterations.clone().unwrap_or_default();
    put_state(ctx, id, DirectiveState::Repeat(state));
    ctx.expansion_depth += 1;
    for lines in &iterations {
        if compile_lines(ctx, lines) == Flow::Halt {
            break;
        }
    }
    ctx.expansion_depth -= 1;
    Flow::Continue
}
