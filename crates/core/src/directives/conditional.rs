//! `.IF`, `.IFDEF` and `.IFNDEF` blocks.
//!
//! Branch conditions are evaluated on every compile pass. A branch body is analysed the first
//! time it is chosen; the labels it created are recorded so that switching to a different
//! branch in a later pass can hide them again and switching back can restore them.

use tracing::trace;

use crate::compiler::{analyze_structured, check_label, compile_lines};
use crate::context::{CompileContext, Flow};
use crate::line::{LineId, LineKind, LineState, Section};
use crate::symbols::{LabelScope, classify_name};

use super::{
    ConditionalState, Directive, DirectiveState, check_arguments, parse_arguments, put_state,
    take_state,
};

fn sections(ctx: &CompileContext<'_>, id: LineId) -> Vec<Section> {
    ctx.lines
        .get(id)
        .command()
        .map(|command| command.sections.clone())
        .unwrap_or_default()
}

/// Parses the condition of every branch header. Bodies are left alone until chosen.
pub(super) fn parse(ctx: &mut CompileContext<'_>, id: LineId) {
    let sections = sections(ctx, id);
    for section in &sections {
        let header = section.header;
        if header != id {
            check_arguments(ctx, header);
            check_label(ctx, header);
        }
        if ctx.lines.get(header).is_skipped() {
            continue;
        }
        match ctx.lines.get(header).directive() {
            Some(Directive::If | Directive::Elseif) => parse_arguments(ctx, header, 0),
            Some(Directive::Ifdef | Directive::Ifndef) => {
                let Some(name) = ctx
                    .lines
                    .get(header)
                    .command()
                    .and_then(|command| command.args.first().cloned())
                else {
                    continue;
                };
                if !matches!(
                    classify_name(&name.text),
                    Some(LabelScope::Global | LabelScope::Local)
                ) {
                    ctx.fail(header, name.span(), format!("'{}' is not a label name", name.text));
                }
            }
            _ => {}
        }
        if header != id {
            ctx.lines.get_mut(header).mark(LineState::Finished);
        }
    }
    if sections
        .iter()
        .any(|section| section.header != id && ctx.lines.get(section.header).is_skipped())
    {
        ctx.lines.get_mut(id).mark(LineState::Error);
    }
    let count = sections.len();
    put_state(
        ctx,
        id,
        DirectiveState::Conditional(ConditionalState {
            active: None,
            activated: vec![false; count],
            bound: vec![Vec::new(); count],
        }),
    );
}

/// Index of the first branch whose condition holds. `None` when no branch applies or a
/// condition is not known yet.
fn choose(ctx: &mut CompileContext<'_>, id: LineId, sections: &[Section]) -> Option<usize> {
    for (index, section) in sections.iter().enumerate() {
        let header = section.header;
        if header != id {
            ctx.begin_line(header);
        }
        let command = ctx.lines.get(header).command()?;
        let directive = command.directive;
        let argument = command.args.first().cloned();
        let expression = command.expression(0).cloned();
        let taken = match directive {
            Directive::Else => true,
            Directive::Ifdef | Directive::Ifndef => {
                let scope = ctx.lines.get(header).scope;
                let defined = ctx.symbols.find_label(&argument?.text, scope).is_some();
                defined == (directive == Directive::Ifdef)
            }
            _ => {
                let (expression, token) = (expression?, argument?);
                let value = ctx.evaluate(header, &expression, &token).ok()??;
                match value.is_truthy() {
                    Ok(truthy) => truthy,
                    Err(error) => {
                        ctx.fail(header, token.span(), error.to_string());
                        return None;
                    }
                }
            }
        };
        if taken {
            return Some(index);
        }
    }
    None
}

/// Makes the body of branch `index` live: analyses it on first use, otherwise restores the
/// labels it created back then.
fn activate(
    ctx: &mut CompileContext<'_>,
    id: LineId,
    state: &mut ConditionalState,
    body: &[LineId],
    index: usize,
) {
    if state.activated[index] {
        for label in state.bound[index].clone() {
            if let Err(error) = ctx.symbols.rebind(label) {
                let span = ctx.symbols.label(label).token.span();
                ctx.report_symbol_error(id, &error, span);
            }
        }
        return;
    }
    trace!(branch = index, lines = body.len(), "activating conditional branch");
    state.activated[index] = true;
    ctx.recorders.push(Vec::new());
    analyze_structured(ctx, body);
    state.bound[index] = ctx.recorders.pop().unwrap_or_default();
}

fn deactivate(ctx: &mut CompileContext<'_>, state: &ConditionalState, sections: &[Section], index: usize) {
    for label in &state.bound[index] {
        ctx.symbols.unbind(*label);
    }
    if let Some(section) = sections.get(index) {
        retract(ctx, &section.body);
    }
}

pub(super) fn compile(ctx: &mut CompileContext<'_>, id: LineId) -> Flow {
    let DirectiveState::Conditional(mut state) = take_state(ctx, id) else {
        return Flow::Continue;
    };
    let sections = sections(ctx, id);
    if let Some(previous) = state.active.take() {
        deactivate(ctx, &state, &sections, previous);
    }

    let Some(index) = choose(ctx, id, &sections) else {
        put_state(ctx, id, DirectiveState::Conditional(state));
        return Flow::Continue;
    };
    activate(ctx, id, &mut state, &sections[index].body, index);
    state.active = Some(index);
    put_state(ctx, id, DirectiveState::Conditional(state));
    compile_lines(ctx, &sections[index].body)
}

/// Hides everything the active branches below `lines` contributed, recursing into nested
/// conditionals, expansions, repeats and includes.
pub(crate) fn retract(ctx: &mut CompileContext<'_>, lines: &[LineId]) {
    for &id in lines {
        let nested: Vec<Vec<LineId>> = match &ctx.lines.get(id).kind {
            LineKind::MacroCall(call) => call
                .expansion
                .iter()
                .map(|expansion| expansion.lines.clone())
                .collect(),
            LineKind::Command(command) => match &command.state {
                DirectiveState::Repeat(repeat) => repeat.iterations.clone().unwrap_or_default(),
                DirectiveState::Include(include) => vec![include.lines.clone()],
                DirectiveState::Conditional(_) => {
                    let DirectiveState::Conditional(mut state) = take_state(ctx, id) else {
                        continue;
                    };
                    if let Some(previous) = state.active.take() {
                        let sections = sections(ctx, id);
                        deactivate(ctx, &state, &sections, previous);
                    }
                    put_state(ctx, id, DirectiveState::Conditional(state));
                    continue;
                }
                _ => continue,
            },
            _ => continue,
        };
        for lines in nested {
            retract(ctx, &lines);
        }
    }
}
