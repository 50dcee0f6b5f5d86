use std::path::{Path, PathBuf};

use retroasm_assets::{PathType, slice_binary};
use tracing::trace;

use crate::compiler::{compile_lines, declare, parse as parse_lines, resolve as resolve_lines, structure};
use crate::context::{CompileContext, Flow, MAX_INCLUDE_DEPTH, Reported};
use crate::line::LineId;

use super::{DirectiveState, IncludeState, parse_arguments, put_state};

/// The quoted file name in argument 0.
fn file_argument(ctx: &mut CompileContext<'_>, id: LineId) -> Result<String, Reported> {
    let Some(token) = ctx
        .lines
        .get(id)
        .command()
        .and_then(|command| command.args.first().cloned())
    else {
        return Err(Reported);
    };
    let expression = ctx.parse_expression(id, &token).ok_or(Reported)?;
    match expression.as_string_literal() {
        Some(name) => Ok(name.to_string()),
        None => Err(ctx.fail(id, token.span(), "expected a quoted file name")),
    }
}

/// Looks next to the including file first, then in each include directory.
fn locate(ctx: &mut CompileContext<'_>, id: LineId, name: &str) -> Result<PathBuf, Reported> {
    let source_id = ctx.lines.get(id).origin.source_id;
    let including = Path::new(ctx.sources.name(source_id));
    let mut candidates = vec![match including.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }];
    candidates.extend(ctx.options.include_dirs.iter().map(|dir| dir.join(name)));
    if let Some(found) = candidates
        .into_iter()
        .find(|candidate| ctx.fs.path_type(candidate) == PathType::File)
    {
        return Ok(found);
    }
    let span = ctx.lines.get(id).origin.span();
    Err(ctx.fail(id, span, format!("file not found: '{name}'")))
}

/// `.INCLUDE`: loads, structures and declares the file during the first pass.
pub(super) fn load(ctx: &mut CompileContext<'_>, id: LineId) {
    let Ok(name) = file_argument(ctx, id) else {
        return;
    };
    let Ok(path) = locate(ctx, id, &name) else {
        return;
    };
    let span = ctx.lines.get(id).origin.span();
    if ctx.include_stack.contains(&path) {
        let chain = ctx
            .include_stack
            .iter()
            .chain([&path])
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(" -> ");
        ctx.fail(id, span, format!("include cycle: {chain}"));
        return;
    }
    if ctx.include_stack.len() >= MAX_INCLUDE_DEPTH {
        ctx.fail(id, span, format!("includes are nested deeper than {MAX_INCLUDE_DEPTH}"));
        return;
    }
    let text = match ctx.fs.read_text(&path) {
        Ok(text) => text,
        Err(error) => {
            ctx.fail(id, span, error.to_string());
            return;
        }
    };
    trace!(path = %path.display(), "including file");

    let (source_id, _, lines) = ctx.load_source(&path.display().to_string(), &text);
    if let Some(root) = ctx.include_stack.first()
        && let Some(file) = ctx.files.iter_mut().find(|file| &file.path == root)
    {
        file.includes.push(source_id);
    }
    ctx.include_stack.push(path.clone());
    let lines = structure(ctx, &lines);
    declare(ctx, &lines);
    ctx.include_stack.pop();
    put_state(ctx, id, DirectiveState::Include(IncludeState { path, lines }));
}

fn included_lines(ctx: &CompileContext<'_>, id: LineId) -> Option<IncludeState> {
    match &ctx.lines.get(id).command()?.state {
        DirectiveState::Include(state) => Some(state.clone()),
        _ => None,
    }
}

pub(super) fn resolve(ctx: &mut CompileContext<'_>, id: LineId) {
    if let Some(state) = included_lines(ctx, id) {
        resolve_lines(ctx, &state.lines);
    }
}

pub(super) fn parse(ctx: &mut CompileContext<'_>, id: LineId) {
    if let Some(state) = included_lines(ctx, id) {
        parse_lines(ctx, &state.lines);
    }
}

/// Compiles the included lines in place. `.ERROR` inside stops only the included file.
pub(super) fn compile(ctx: &mut CompileContext<'_>, id: LineId) -> Flow {
    let Some(state) = included_lines(ctx, id) else {
        return Flow::Continue;
    };
    ctx.include_stack.push(state.path);
    compile_lines(ctx, &state.lines);
    ctx.include_stack.pop();
    Flow::Continue
}

/// `.INCBIN "file"[, start[, length]]`: the file is read once, during the third pass.
pub(super) fn load_binary(ctx: &mut CompileContext<'_>, id: LineId) {
    let Ok(name) = file_argument(ctx, id) else {
        return;
    };
    parse_arguments(ctx, id, 1);
    let Ok(path) = locate(ctx, id, &name) else {
        return;
    };
    match ctx.fs.read(&path) {
        Ok(data) => {
            trace!(path = %path.display(), bytes = data.len(), "loaded binary");
            put_state(ctx, id, DirectiveState::Binary(data));
        }
        Err(error) => {
            let span = ctx.lines.get(id).origin.span();
            ctx.fail(id, span, error.to_string());
        }
    }
}

pub(super) fn compile_binary(ctx: &mut CompileContext<'_>, id: LineId) -> Flow {
    let Some(command) = ctx.lines.get(id).command() else {
        return Flow::Continue;
    };
    let DirectiveState::Binary(data) = &command.state else {
        return Flow::Continue;
    };
    let (data, argument_count) = (data.clone(), command.args.len());
    let mut window = [None, None];
    let mut pending = false;
    for (slot, index) in window.iter_mut().zip(1..argument_count) {
        match ctx.command_int(id, index) {
            Ok(Some(value)) => *slot = Some(value),
            Ok(None) => pending = true,
            Err(_) => return Flow::Continue,
        }
    }
    if pending {
        // Until the window is known, hold the widest slice it can still describe.
        let reserved = match window {
            [_, Some(length)] => length.max(0) as usize,
            [Some(start), None] => data.len().saturating_sub(start.max(0) as usize),
            [None, None] => data.len(),
        };
        ctx.emit(id, vec![None; reserved]);
        return Flow::Continue;
    }
    match slice_binary(&data, window[0], window[1]) {
        Ok(bytes) => {
            let bytes = bytes.iter().copied().map(Some).collect();
            ctx.emit(id, bytes);
        }
        Err(error) => {
            let span = ctx.lines.get(id).origin.span();
            ctx.value_error(id, span, error.to_string());
        }
    }
    Flow::Continue
}

