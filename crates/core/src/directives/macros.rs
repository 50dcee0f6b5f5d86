use rustc_hash::FxHashSet;
use tracing::trace;

use crate::compiler::{compile_lines, declare, parse, resolve, structure};
use crate::context::{CompileContext, Flow, MAX_EXPANSION_DEPTH};
use crate::line::{Expansion, LineId, LineKind};
use crate::symbols::{LabelKind, LabelScope, Macro, ScopeKind, classify_name};
use crate::token::Token;

/// `.MACRO name p1, p2, ...`: stores the raw body; nothing is emitted here.
pub(super) fn define(ctx: &mut CompileContext<'_>, id: LineId) {
    let line = ctx.lines.get(id);
    let Some(command) = line.command() else {
        return;
    };
    let (args, source_id) = (command.args.clone(), line.origin.source_id);
    let body = command
        .sections
        .first()
        .map(|section| section.body.clone())
        .unwrap_or_default();
    let Some((name, parameters)) = args.split_first() else {
        return;
    };

    if classify_name(&name.text) != Some(LabelScope::Global) || ctx.is_reserved(&name.text) {
        ctx.fail(id, name.span(), format!("'{}' is not a valid macro name", name.text));
        return;
    }
    let mut seen = FxHashSet::default();
    for parameter in parameters {
        let valid = matches!(
            classify_name(&parameter.text),
            Some(LabelScope::Global | LabelScope::Local)
        ) && !ctx.is_reserved(&parameter.text);
        if !valid {
            let message = format!("'{}' is not a valid parameter name", parameter.text);
            ctx.fail(id, parameter.span(), message);
            return;
        }
        if !seen.insert(parameter.text.as_str()) {
            let message = format!("parameter '{}' is listed twice", parameter.text);
            ctx.fail(id, parameter.span(), message);
            return;
        }
    }

    let definition = Macro {
        name: name.text.clone(),
        parameters: parameters.iter().map(|parameter| parameter.text.clone()).collect(),
        body,
        source_id,
        token: name.clone(),
    };
    trace!(name = %definition.name, parameters = definition.parameters.len(), "defined macro");
    if let Err(error) = ctx.symbols.define_macro(definition) {
        ctx.report_symbol_error(id, &error, name.span());
    }
}

/// Instantiates the macro body for one call site: a fresh scope holding the parameters, then
/// structuring, declaration and resolution of the copy. Parsing follows in the third pass.
pub(crate) fn expand_macro(ctx: &mut CompileContext<'_>, id: LineId) {
    let line = ctx.lines.get(id);
    let LineKind::MacroCall(call) = &line.kind else {
        return;
    };
    let (name, argument_count) = (call.name.clone(), call.args.len());
    let parent = line.scope;
    // Expansions belong to the file owning the call, not to the file defining the macro.
    let source_id = ctx.symbols.scope(parent).source_id;
    let Some(definition) = ctx.symbols.macro_named(&name.text).cloned() else {
        ctx.fail(id, name.span(), format!("unknown macro '{}'", name.text));
        return;
    };
    if argument_count != definition.parameters.len() {
        let message = format!(
            "macro '{}' expects {} argument(s), found {argument_count}",
            definition.name,
            definition.parameters.len()
        );
        ctx.fail(id, name.span(), message);
        return;
    }
    if ctx.expansion_depth >= MAX_EXPANSION_DEPTH {
        let message = format!("macro '{}' is expanded too deeply", definition.name);
        ctx.fail(id, name.span(), message);
        return;
    }
    trace!(name = %definition.name, depth = ctx.expansion_depth, "expanding macro");

    let scope = ctx.symbols.add_scope(ScopeKind::Macro, parent, source_id);
    let mut parameters = Vec::with_capacity(definition.parameters.len());
    for parameter in &definition.parameters {
        let token = Token {
            text: parameter.clone(),
            ..definition.token.clone()
        };
        match ctx.define_label(id, &token, scope, LabelKind::Parameter, false) {
            Some(label) => parameters.push(label),
            None => return,
        }
    }

    ctx.expansion_depth += 1;
    let copies = ctx.lines.instantiate(&definition.body, scope);
    let lines = structure(ctx, &copies);
    declare(ctx, &lines);
    resolve(ctx, &lines);
    ctx.expansion_depth -= 1;

    if let LineKind::MacroCall(call) = &mut ctx.lines.get_mut(id).kind {
        call.expansion = Some(Expansion {
            scope,
            parameters,
            lines,
        });
    }
}

pub(crate) fn parse_macro_call(ctx: &mut CompileContext<'_>, id: LineId) {
    let LineKind::MacroCall(call) = &ctx.lines.get(id).kind else {
        return;
    };
    let args = call.args.clone();
    let lines = call
        .expansion
        .as_ref()
        .map(|expansion| expansion.lines.clone())
        .unwrap_or_default();
    let arguments: Vec<_> = args
        .iter()
        .map(|arg| ctx.parse_expression(id, arg))
        .collect();
    if let LineKind::MacroCall(call) = &mut ctx.lines.get_mut(id).kind {
        call.arguments = arguments;
    }
    parse(ctx, &lines);
}

/// Binds the call-site argument values to the parameters, then compiles the expansion.
/// `.ERROR` inside the body stops only this expansion.
pub(crate) fn compile_macro_call(ctx: &mut CompileContext<'_>, id: LineId) -> Flow {
    let LineKind::MacroCall(call) = &ctx.lines.get(id).kind else {
        return Flow::Continue;
    };
    let Some(expansion) = call.expansion.clone() else {
        return Flow::Continue;
    };
    let arguments: Vec<_> = call
        .args
        .iter()
        .cloned()
        .zip(call.arguments.iter().cloned())
        .collect();

    for ((token, expression), label) in arguments.into_iter().zip(&expansion.parameters) {
        let value = match expression {
            Some(expression) => ctx.evaluate(id, &expression, &token).ok().flatten(),
            None => None,
        };
        ctx.set_label_value(*label, value);
    }

    ctx.expansion_depth += 1;
    compile_lines(ctx, &expansion.lines);
    ctx.expansion_depth -= 1;
    Flow::Continue
}
