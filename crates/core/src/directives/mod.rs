//! Directive handlers. Every directive runs through the same four phases as any other line:
//! declaration (labels, macros, includes), resolution, expression parsing and compilation.

mod address;
mod conditional;
mod data;
mod define;
mod include;
mod macros;
mod message;
mod repeat;
mod table;

use std::path::PathBuf;

use retroasm_eval::Expression;

use crate::context::{CompileContext, Flow};
use crate::line::LineId;
use crate::symbols::LabelId;
use crate::token::Token;

pub use table::{ArgStyle, Directive, DirectiveSpec, all_keywords};

pub(crate) use conditional::retract;
pub(crate) use macros::{compile_macro_call, expand_macro, parse_macro_call};

/// Per-line state a directive keeps between phases and passes.
#[derive(Debug, Clone, Default)]
pub enum DirectiveState {
    #[default]
    None,
    Define(LabelId),
    Conditional(ConditionalState),
    Repeat(RepeatState),
    Include(IncludeState),
    /// `.INCBIN` file contents or `.HEX` bytes.
    Binary(Vec<u8>),
    Enum(Vec<EnumRow>),
    DataGroup(Vec<DataCell>),
}

#[derive(Debug, Clone, Default)]
pub struct ConditionalState {
    /// Section whose body was compiled in the current pass.
    pub active: Option<usize>,
    pub activated: Vec<bool>,
    /// Labels each section created when it was first activated.
    pub bound: Vec<Vec<LabelId>>,
}

#[derive(Debug, Clone, Default)]
pub struct RepeatState {
    /// Materialised copies of the body, one per iteration.
    pub iterations: Option<Vec<Vec<LineId>>>,
}

#[derive(Debug, Clone)]
pub struct IncludeState {
    pub path: PathBuf,
    pub lines: Vec<LineId>,
}

#[derive(Debug, Clone)]
pub struct EnumRow {
    pub name: Token,
    pub label: LabelId,
    pub length: Option<Token>,
    pub expression: Option<Expression>,
}

#[derive(Debug, Clone)]
pub struct DataCell {
    pub row: LineId,
    pub token: Token,
    pub expression: Option<Expression>,
}

pub(crate) trait DirectivePhases {
    /// Runs once, in source order, before any line is resolved.
    fn first_pass(self, ctx: &mut CompileContext<'_>, id: LineId);

    /// Runs once macros and unknown lines are known.
    fn second_pass(self, ctx: &mut CompileContext<'_>, id: LineId);

    /// Parses argument expressions; forward references are fine here.
    fn third_pass(self, ctx: &mut CompileContext<'_>, id: LineId);

    fn compile(self, ctx: &mut CompileContext<'_>, id: LineId) -> Flow;
}

impl DirectivePhases for Directive {
    fn first_pass(self, ctx: &mut CompileContext<'_>, id: LineId) {
        match self {
            Directive::Def => define::declare(ctx, id),
            Directive::Enum => define::declare_enum(ctx, id),
            Directive::Dbg | Directive::Dwg | Directive::Dlg => data::declare_group(ctx, id),
            Directive::Macro => macros::define(ctx, id),
            Directive::Include => include::load(ctx, id),
            _ => {}
        }
    }

    fn second_pass(self, ctx: &mut CompileContext<'_>, id: LineId) {
        if self == Directive::Include {
            include::resolve(ctx, id);
        }
    }

    fn third_pass(self, ctx: &mut CompileContext<'_>, id: LineId) {
        match self {
            Directive::Org | Directive::Base | Directive::Db | Directive::Dw | Directive::Dl => {
                parse_arguments(ctx, id, 0);
            }
            Directive::Msg | Directive::Error | Directive::Repeat => parse_arguments(ctx, id, 0),
            Directive::Def => define::parse(ctx, id),
            Directive::Enum => define::parse_enum(ctx, id),
            Directive::Dbg | Directive::Dwg | Directive::Dlg => data::parse_group(ctx, id),
            Directive::If | Directive::Ifdef | Directive::Ifndef => conditional::parse(ctx, id),
            Directive::Include => include::parse(ctx, id),
            Directive::Incbin => include::load_binary(ctx, id),
            Directive::Hex => data::parse_hex(ctx, id),
            _ => {}
        }
    }

    fn compile(self, ctx: &mut CompileContext<'_>, id: LineId) -> Flow {
        match self {
            Directive::Org | Directive::Base => address::compile(ctx, id, self),
            Directive::Db | Directive::Dw | Directive::Dl => data::compile_values(ctx, id, self),
            Directive::Dbg | Directive::Dwg | Directive::Dlg => data::compile_group(ctx, id, self),
            Directive::Hex => data::compile_binary(ctx, id),
            Directive::Def => define::compile(ctx, id),
            Directive::Enum => define::compile_enum(ctx, id),
            Directive::If | Directive::Ifdef | Directive::Ifndef => conditional::compile(ctx, id),
            Directive::Repeat => repeat::compile(ctx, id),
            Directive::Include => include::compile(ctx, id),
            Directive::Incbin => include::compile_binary(ctx, id),
            Directive::Msg => message::compile_message(ctx, id),
            Directive::Error => message::compile_error(ctx, id),
            _ => Flow::Continue,
        }
    }
}

/// Checks the argument count against the directive table.
pub(crate) fn check_arguments(ctx: &mut CompileContext<'_>, id: LineId) {
    let Some(command) = ctx.lines.get(id).command() else {
        return;
    };
    let spec = command.directive.spec();
    let count = command.args.len();
    let message = match spec.max_args {
        _ if count < spec.min_args => format!(
            "{} expects at least {} argument(s), found {count}",
            spec.names[0], spec.min_args
        ),
        Some(max) if count > max => {
            format!("{} expects at most {max} argument(s), found {count}", spec.names[0])
        }
        _ => return,
    };
    let span = command.keyword.span();
    ctx.fail(id, span, message);
}

/// Parses every argument from `first` on into `CommandLine::expressions`, keeping indices
/// aligned with `args`.
pub(crate) fn parse_arguments(ctx: &mut CompileContext<'_>, id: LineId, first: usize) {
    let Some(command) = ctx.lines.get(id).command() else {
        return;
    };
    let args = command.args.clone();
    let mut expressions = vec![None; args.len()];
    for (index, arg) in args.iter().enumerate().skip(first) {
        expressions[index] = ctx.parse_expression(id, arg);
    }
    if let Some(command) = ctx.lines.get_mut(id).command_mut() {
        command.expressions = expressions;
    }
}

/// Takes the directive state out of a line so it can be updated while `ctx` is borrowed.
pub(crate) fn take_state(ctx: &mut CompileContext<'_>, id: LineId) -> DirectiveState {
    ctx.lines
        .get_mut(id)
        .command_mut()
        .map(|command| std::mem::take(&mut command.state))
        .unwrap_or_default()
}

pub(crate) fn put_state(ctx: &mut CompileContext<'_>, id: LineId, state: DirectiveState) {
    if let Some(command) = ctx.lines.get_mut(id).command_mut() {
        command.state = state;
    }
}
