//! Phase drivers. Source lines go through structuring (block matching), declaration,
//! resolution and parsing once; compile passes then run over the result until label values
//! settle or the pass budget runs out.

use retroasm_eval::Value;
use tracing::{debug, warn};

use crate::classify::label_before;
use crate::context::{CompileContext, Cursor, Flow, Pass, PassProgress};
use crate::directives::{
    Directive, DirectivePhases, check_arguments, compile_macro_call, expand_macro,
    parse_macro_call,
};
use crate::instruction;
use crate::lexer::words;
use crate::line::{LineId, LineKind, LineState, MacroCallLine, Section};
use crate::symbols::{LabelKind, classify_name};

impl CompileContext<'_> {
    /// Records where a line starts before it is compiled.
    pub(crate) fn begin_line(&mut self, id: LineId) {
        let (org, base) = (self.cursor.org(), self.cursor.base());
        let result = &mut self.lines.get_mut(id).result;
        result.org = org;
        result.base = base;
        result.bytes.clear();
    }

    /// Writes a line's bytes at the current base address and advances the cursor. `None`
    /// reserves space without writing.
    pub(crate) fn emit(&mut self, id: LineId, bytes: Vec<Option<u8>>) {
        if let Err(error) = self.image.write(self.cursor.base(), &bytes) {
            let span = self.lines.get(id).origin.span();
            self.fail(id, span, error.to_string());
        }
        self.cursor.advance(bytes.len());
        self.lines.get_mut(id).result.bytes = bytes;
    }
}

/// Moves the interior of every block directive into its `sections` and drops the end lines.
/// Returns the remaining top-level sequence.
pub(crate) fn structure(ctx: &mut CompileContext<'_>, lines: &[LineId]) -> Vec<LineId> {
    let mut out = Vec::with_capacity(lines.len());
    let mut index = 0;
    while index < lines.len() {
        let id = lines[index];
        index += 1;
        out.push(id);
        let line = ctx.lines.get(id);
        let (Some(directive), false) = (line.directive(), line.is_skipped()) else {
            continue;
        };
        let Some(keyword) = line.command().map(|command| command.keyword.span()) else {
            continue;
        };

        if let Some(end) = directive.spec().end {
            let Some(offset) = find_end(ctx, &lines[index..], end) else {
                ctx.fail(
                    id,
                    keyword,
                    format!("{} without a matching {}", directive.name(), end.name()),
                );
                for rest in &lines[index..] {
                    ctx.lines.get_mut(*rest).mark(LineState::Ignored);
                }
                out.extend_from_slice(&lines[index..]);
                break;
            };
            let interior = lines[index..index + offset].to_vec();
            close_block(ctx, id, directive, interior, lines[index + offset]);
            index += offset + 1;
        } else if directive.is_end_keyword()
            || matches!(directive, Directive::Elseif | Directive::Else)
        {
            ctx.fail(
                id,
                keyword,
                format!("{} without a matching block start", directive.name()),
            );
        }
    }
    out
}

fn find_end(ctx: &CompileContext<'_>, lines: &[LineId], end: Directive) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, id) in lines.iter().enumerate() {
        let Some(directive) = ctx.lines.get(*id).directive() else {
            continue;
        };
        if directive.opens(end) {
            depth += 1;
        } else if directive == end {
            if depth == 0 {
                return Some(offset);
            }
            depth -= 1;
        }
    }
    None
}

fn close_block(
    ctx: &mut CompileContext<'_>,
    id: LineId,
    directive: Directive,
    interior: Vec<LineId>,
    end_line: LineId,
) {
    check_arguments(ctx, end_line);
    check_label(ctx, end_line);
    ctx.lines.get_mut(end_line).mark(LineState::Finished);
    let end = ctx
        .lines
        .get(end_line)
        .command()
        .map(|command| command.keyword.clone());

    let sections = if directive.spec().interior.is_empty() {
        vec![Section {
            header: id,
            body: interior,
        }]
    } else {
        split_sections(ctx, id, interior)
    };
    if let Some(command) = ctx.lines.get_mut(id).command_mut() {
        command.sections = sections;
        command.end = end;
    }
}

/// Splits a conditional block at its depth-0 `.ELSEIF`/`.ELSE` lines and structures each body.
fn split_sections(ctx: &mut CompileContext<'_>, header: LineId, interior: Vec<LineId>) -> Vec<Section> {
    let mut sections = vec![Section {
        header,
        body: Vec::new(),
    }];
    let mut depth = 0usize;
    let mut seen_else = false;
    for id in interior {
        match ctx.lines.get(id).directive() {
            Some(directive) if directive.opens(Directive::Endif) => depth += 1,
            Some(Directive::Endif) => depth = depth.saturating_sub(1),
            Some(directive @ (Directive::Elseif | Directive::Else)) if depth == 0 => {
                if seen_else {
                    let span = ctx.lines.get(id).origin.span();
                    ctx.fail(id, span, format!("{} after .ELSE", directive.name()));
                    continue;
                }
                seen_else = directive == Directive::Else;
                sections.push(Section {
                    header: id,
                    body: Vec::new(),
                });
                continue;
            }
            _ => {}
        }
        if let Some(section) = sections.last_mut() {
            section.body.push(id);
        }
    }
    for section in &mut sections {
        section.body = structure(ctx, &section.body);
    }
    sections
}

/// Rejects a label on a directive that does not take one.
pub(crate) fn check_label(ctx: &mut CompileContext<'_>, id: LineId) -> bool {
    let line = ctx.lines.get(id);
    let (Some(label), Some(directive)) = (&line.label, line.directive()) else {
        return true;
    };
    if directive.spec().allows_label {
        return true;
    }
    let span = label.span();
    ctx.fail(id, span, format!("{} cannot have a label", directive.name()));
    false
}

fn check_placement(ctx: &mut CompileContext<'_>, id: LineId, directive: Directive) -> bool {
    if !directive.spec().in_macro && ctx.in_macro(id) {
        let span = ctx.lines.get(id).origin.span();
        ctx.fail(
            id,
            span,
            format!("{} is not allowed inside a macro", directive.name()),
        );
        return false;
    }
    check_label(ctx, id)
}

/// First pass: binds line labels and runs the declaring directives.
pub(crate) fn declare(ctx: &mut CompileContext<'_>, lines: &[LineId]) {
    for &id in lines {
        if ctx.is_cancelled() {
            return;
        }
        let line = ctx.lines.get(id);
        if line.is_skipped() {
            continue;
        }
        match &line.kind {
            LineKind::Instruction(_) => ctx.define_line_label(id),
            LineKind::Command(command) => {
                let directive = command.directive;
                check_arguments(ctx, id);
                if ctx.lines.get(id).is_skipped() || !check_placement(ctx, id, directive) {
                    continue;
                }
                ctx.define_line_label(id);
                directive.first_pass(ctx, id);
            }
            LineKind::Variable(_) => declare_variable(ctx, id),
            _ => {}
        }
    }
}

fn declare_variable(ctx: &mut CompileContext<'_>, id: LineId) {
    let line = ctx.lines.get(id);
    let LineKind::Variable(variable) = &line.kind else {
        return;
    };
    let (name, scope, comment) = (variable.name.clone(), line.scope, line.comment.clone());
    let label = match ctx.symbols.find_label(&name.text, scope) {
        Some(existing) if ctx.symbols.label(existing).kind == LabelKind::Variable => Some(existing),
        _ => {
            let created = ctx.define_label(id, &name, scope, LabelKind::Variable, false);
            if let Some(label) = created {
                ctx.symbols.label_mut(label).doc = comment;
            }
            created
        }
    };
    if let LineKind::Variable(variable) = &mut ctx.lines.get_mut(id).kind {
        variable.label = label;
    }
}

/// Second pass: decides what unknown lines are and expands macros.
pub(crate) fn resolve(ctx: &mut CompileContext<'_>, lines: &[LineId]) {
    for &id in lines {
        if ctx.is_cancelled() {
            return;
        }
        let line = ctx.lines.get(id);
        if line.is_skipped() {
            continue;
        }
        match &line.kind {
            LineKind::Unknown => resolve_unknown(ctx, id),
            LineKind::Command(command) => {
                let directive = command.directive;
                directive.second_pass(ctx, id);
            }
            _ => {}
        }
    }
}

fn resolve_unknown(ctx: &mut CompileContext<'_>, id: LineId) {
    let origin = ctx.lines.get(id).origin.clone();
    let call = words(&origin.text)
        .find(|(word, _)| ctx.symbols.macro_named(word).is_some())
        .map(|(_, range)| range);

    if let Some(range) = call {
        let name = origin.slice(range.clone());
        let args = origin.slice(range.end..origin.text.len()).split_top_level(',');
        let line = ctx.lines.get_mut(id);
        line.label = label_before(&origin, range.start);
        line.kind = LineKind::MacroCall(MacroCallLine {
            name,
            args,
            arguments: Vec::new(),
            expansion: None,
        });
        ctx.define_line_label(id);
        expand_macro(ctx, id);
        return;
    }

    let label = label_before(&origin, origin.text.len())
        .filter(|label| classify_name(&label.text).is_some());
    match label {
        Some(label) => {
            let line = ctx.lines.get_mut(id);
            line.label = Some(label);
            line.kind = LineKind::LabelOnly;
            ctx.define_line_label(id);
        }
        None => {
            let word = origin.split_first_word().0;
            ctx.fail(
                id,
                word.span(),
                format!("unknown instruction, directive or macro '{}'", word.text),
            );
        }
    }
}

/// Third pass: parses operands and arguments.
pub(crate) fn parse(ctx: &mut CompileContext<'_>, lines: &[LineId]) {
    for &id in lines {
        if ctx.is_cancelled() {
            return;
        }
        let line = ctx.lines.get(id);
        if line.is_skipped() {
            continue;
        }
        match &line.kind {
            LineKind::Instruction(_) => instruction::parse(ctx, id),
            LineKind::Variable(_) => parse_variable(ctx, id),
            LineKind::Command(command) => {
                let directive = command.directive;
                directive.third_pass(ctx, id);
            }
            LineKind::MacroCall(_) => parse_macro_call(ctx, id),
            LineKind::LabelOnly | LineKind::Unknown => {}
        }
        ctx.lines.get_mut(id).mark(LineState::Finished);
    }
}

fn parse_variable(ctx: &mut CompileContext<'_>, id: LineId) {
    let LineKind::Variable(variable) = &ctx.lines.get(id).kind else {
        return;
    };
    let token = variable.expression.clone();
    let parsed = ctx.parse_expression(id, &token);
    if let LineKind::Variable(variable) = &mut ctx.lines.get_mut(id).kind {
        variable.parsed = parsed;
    }
}

/// Declaration, resolution and parsing for lines that are already structured.
pub(crate) fn analyze_structured(ctx: &mut CompileContext<'_>, lines: &[LineId]) {
    declare(ctx, lines);
    resolve(ctx, lines);
    parse(ctx, lines);
}

/// Full analysis of freshly instantiated lines.
pub(crate) fn analyze(ctx: &mut CompileContext<'_>, lines: &[LineId]) -> Vec<LineId> {
    let lines = structure(ctx, lines);
    analyze_structured(ctx, &lines);
    lines
}

/// Analyses the given top-level files. Declarations of all of them come before any
/// resolution so macros may be used before the file that defines them.
pub(crate) fn analyze_files(ctx: &mut CompileContext<'_>, files: &[usize]) {
    for &index in files {
        let lines = ctx.files[index].lines.clone();
        let lines = structure(ctx, &lines);
        ctx.include_stack = vec![ctx.files[index].path.clone()];
        declare(ctx, &lines);
        ctx.include_stack.clear();
        ctx.files[index].lines = lines;
    }
    for &index in files {
        let lines = ctx.files[index].lines.clone();
        resolve(ctx, &lines);
    }
    for &index in files {
        let lines = ctx.files[index].lines.clone();
        parse(ctx, &lines);
    }
}

pub(crate) fn compile_lines(ctx: &mut CompileContext<'_>, lines: &[LineId]) -> Flow {
    for &id in lines {
        if ctx.is_cancelled() {
            return Flow::Halt;
        }
        if compile_line(ctx, id) == Flow::Halt {
            return Flow::Halt;
        }
    }
    Flow::Continue
}

fn compile_line(ctx: &mut CompileContext<'_>, id: LineId) -> Flow {
    if ctx.lines.get(id).is_skipped() {
        return Flow::Continue;
    }
    ctx.begin_line(id);
    if let Some(label) = ctx.lines.get(id).label_id {
        let org = ctx.cursor.org();
        ctx.set_label_value(label, Some(Value::int(org)));
    }
    match &ctx.lines.get(id).kind {
        LineKind::LabelOnly | LineKind::Unknown => Flow::Continue,
        LineKind::Instruction(_) => {
            instruction::compile(ctx, id);
            Flow::Continue
        }
        LineKind::Variable(_) => {
            compile_variable(ctx, id);
            Flow::Continue
        }
        LineKind::Command(command) => {
            let directive = command.directive;
            directive.compile(ctx, id)
        }
        LineKind::MacroCall(_) => compile_macro_call(ctx, id),
    }
}

fn compile_variable(ctx: &mut CompileContext<'_>, id: LineId) {
    let LineKind::Variable(variable) = &ctx.lines.get(id).kind else {
        return;
    };
    let (Some(label), Some(expression)) = (variable.label, variable.parsed.clone()) else {
        return;
    };
    let token = variable.expression.clone();
    if let Ok(Some(value)) = ctx.evaluate(id, &expression, &token) {
        ctx.set_label_value(label, Some(value));
    }
}

/// Runs compile passes until labels settle. The last pass evaluates in final mode, so
/// anything still unresolved then is an error.
pub(crate) fn run_passes(ctx: &mut CompileContext<'_>) {
    let total = ctx.options.pass_count.max(1);
    let mut index = 0;
    let mut last = total == 1;
    loop {
        ctx.pass = Pass::Compile { index, last };
        ctx.progress = PassProgress::default();
        ctx.cursor = Cursor::default();
        ctx.image.clear();
        debug!(pass = index, last, "starting compile pass");

        for file in 0..ctx.files.len() {
            let (path, lines) = (ctx.files[file].path.clone(), ctx.files[file].lines.clone());
            ctx.include_stack = vec![path];
            if compile_lines(ctx, &lines) == Flow::Halt && ctx.is_cancelled() {
                break;
            }
        }
        ctx.include_stack.clear();

        let progress = ctx.progress;
        debug!(
            pass = index,
            changed = progress.changed,
            pending = progress.pending,
            "finished compile pass"
        );
        if ctx.is_cancelled() {
            debug!("compilation cancelled");
            break;
        }
        if last {
            if let Some(span) = progress.unsettled {
                warn!(passes = index + 1, "label values did not settle");
                ctx.warning(
                    span,
                    format!("label values did not settle within {} passes", index + 1),
                );
            }
            break;
        }
        index += 1;
        last = (!progress.changed && progress.pending == 0) || index + 1 >= total;
    }
}
