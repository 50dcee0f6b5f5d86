use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use retroasm_assets::AssetFS;
use retroasm_eval::{EvalError, EvalMode, Evaluation, Expression, LabelRef, SymbolResolver, Value};
use retroasm_isa::{InstructionSet, Platform};

use crate::classify::classify_source;
use crate::diag::{Diagnostic, Diagnostics};
use crate::directives::Directive;
use crate::image::ByteImage;
use crate::line::{CommonLine, LineArena, LineId, LineKind, LineResult, LineState};
use crate::span::{SourceId, SourceMap, Span};
use crate::symbols::{LabelId, LabelKind, ScopeId, ScopeKind, SymbolError, SymbolTable};
use crate::token::Token;

pub const DEFAULT_PASS_COUNT: usize = 2;
pub const MAX_INCLUDE_DEPTH: usize = 32;
pub const MAX_EXPANSION_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub platform: Platform,
    /// Upper bound on compile passes; forward references need at least two.
    pub pass_count: usize,
    /// Searched after the including file's own directory.
    pub include_dirs: Vec<PathBuf>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            platform: Platform::default(),
            pass_count: DEFAULT_PASS_COUNT,
            include_dirs: Vec::new(),
        }
    }
}

/// Shared stop flag, checked before every line.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Analysis only; nothing is compiled.
    Analysis,
    Compile { index: usize, last: bool },
}

impl Pass {
    /// -1 while analysing, then 0, 1, ... for the compile passes.
    pub fn number(self) -> i64 {
        match self {
            Self::Analysis => -1,
            Self::Compile { index, .. } => index as i64,
        }
    }

    pub fn is_final(self) -> bool {
        matches!(self, Self::Compile { last: true, .. })
    }

    pub fn eval_mode(self) -> EvalMode {
        if self.is_final() {
            EvalMode::Final
        } else {
            EvalMode::Tentative
        }
    }
}

/// Logical program counter (`org`) and physical output offset (`base`). The first one set
/// also initialises the other, so a lone `.ORG` maps addresses one to one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    org: Option<i64>,
    base: Option<i64>,
}

impl Cursor {
    pub fn org(&self) -> i64 {
        self.org.or(self.base).unwrap_or(0)
    }

    pub fn base(&self) -> i64 {
        self.base.or(self.org).unwrap_or(0)
    }

    pub fn offset(&self) -> i64 {
        self.base() - self.org()
    }

    pub fn set_org(&mut self, org: i64) {
        if self.base.is_none() {
            self.base = Some(org);
        }
        self.org = Some(org);
    }

    pub fn set_base(&mut self, base: i64) {
        if self.org.is_none() {
            self.org = Some(base);
        }
        self.base = Some(base);
    }

    pub fn advance(&mut self, len: usize) {
        let len = len as i64;
        let (org, base) = (self.org(), self.base());
        self.org = Some(org + len);
        self.base = Some(base + len);
    }
}

/// What happened during one compile pass, used to stop early once nothing moves.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PassProgress {
    pub changed: bool,
    pub pending: usize,
    pub unsettled: Option<Span>,
}

/// Result of a line-level step that already pushed its own diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Reported;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    /// `.ERROR` or cancellation: stop the current file or expansion.
    Halt,
}

/// A top-level input file.
#[derive(Debug, Clone)]
pub struct FileUnit {
    pub path: PathBuf,
    pub source_id: SourceId,
    pub scope: ScopeId,
    pub lines: Vec<LineId>,
    /// Sources pulled in by `.INCLUDE`, at any depth.
    pub includes: Vec<SourceId>,
}

/// Everything one analysis or compile run works on.
pub struct CompileContext<'fs> {
    pub(crate) options: CompileOptions,
    pub(crate) isa: &'static InstructionSet,
    pub(crate) fs: &'fs dyn AssetFS,
    pub(crate) sources: SourceMap,
    pub(crate) files: Vec<FileUnit>,
    /// Number of leading `files` that went through analysis.
    pub(crate) analyzed: usize,
    pub(crate) lines: LineArena,
    pub(crate) symbols: SymbolTable,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) cursor: Cursor,
    pub(crate) pass: Pass,
    pub(crate) image: ByteImage,
    pub(crate) messages: Vec<String>,
    pub(crate) cancel: CancelToken,
    pub(crate) progress: PassProgress,
    /// Open recorders; every label created is appended to each of them.
    pub(crate) recorders: Vec<Vec<LabelId>>,
    pub(crate) include_stack: Vec<PathBuf>,
    pub(crate) expansion_depth: usize,
}

struct ScopeResolver<'a> {
    symbols: &'a SymbolTable,
    scope: ScopeId,
    token: &'a Token,
    org: i64,
}

impl SymbolResolver for ScopeResolver<'_> {
    fn resolve(&self, reference: &LabelRef, start: usize, _end: usize) -> Option<Value> {
        if *reference == LabelRef::Current {
            return Some(Value::int(self.org));
        }
        let id = self.symbols.resolve(
            reference,
            self.scope,
            self.token.line,
            self.token.column + start,
        )?;
        self.symbols.label(id).value.clone()
    }
}

impl<'fs> CompileContext<'fs> {
    pub fn new(options: CompileOptions, fs: &'fs dyn AssetFS) -> Self {
        let isa = options.platform.instruction_set();
        Self {
            options,
            isa,
            fs,
            sources: SourceMap::default(),
            files: Vec::new(),
            analyzed: 0,
            lines: LineArena::default(),
            symbols: SymbolTable::new(),
            diagnostics: Diagnostics::default(),
            cursor: Cursor::default(),
            pass: Pass::Analysis,
            image: ByteImage::new(),
            messages: Vec::new(),
            cancel: CancelToken::new(),
            progress: PassProgress::default(),
            recorders: Vec::new(),
            include_stack: Vec::new(),
            expansion_depth: 0,
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn sources(&self) -> &SourceMap {
        &self.sources
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn image(&self) -> &ByteImage {
        &self.image
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn pass(&self) -> Pass {
        self.pass
    }

    pub fn line(&self, id: LineId) -> &CommonLine {
        self.lines.get(id)
    }

    /// Line slots in the arena, released ones included.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Adds a source text and classifies it into lines owned by a new file scope.
    pub(crate) fn load_source(&mut self, name: &str, text: &str) -> (SourceId, ScopeId, Vec<LineId>) {
        let source_id = self.sources.add_source(name, text);
        let scope = self
            .symbols
            .add_scope(ScopeKind::File, ScopeId::GLOBAL, source_id);
        let classified = match self.sources.get(source_id) {
            Some(file) => classify_source(self.isa, source_id, file),
            None => Vec::new(),
        };
        let lines = classified
            .into_iter()
            .map(|line| {
                self.lines.push(CommonLine {
                    origin: line.origin,
                    scope,
                    label: line.label,
                    label_id: None,
                    comment: line.comment,
                    kind: line.kind,
                    state: LineState::Unresolved,
                    result: LineResult::default(),
                })
            })
            .collect();
        (source_id, scope, lines)
    }

    /// Frees what `sources` own: their lines with every expansion made from them, their
    /// symbols and diagnostics, and the source slots. The last source listed is the first one
    /// `load_source` hands out again.
    pub(crate) fn release_sources(&mut self, sources: &[SourceId]) {
        let symbols = &self.symbols;
        let owned = self
            .lines
            .owned_by(|scope| sources.contains(&symbols.scope(scope).source_id));
        self.lines.release(&owned);
        for &source_id in sources {
            self.symbols.release_file(source_id);
            self.diagnostics.clear_source(source_id);
            self.sources.remove_source(source_id);
        }
    }

    pub(crate) fn error(&mut self, span: Span, message: impl Into<String>) {
        self.diagnostics.push_error(span, message);
    }

    pub(crate) fn warning(&mut self, span: Span, message: impl Into<String>) {
        self.diagnostics.push_warning(span, message);
    }

    /// Pushes an error and puts the line into the `Error` state.
    pub(crate) fn fail(&mut self, id: LineId, span: Span, message: impl Into<String>) -> Reported {
        self.error(span, message);
        self.lines.get_mut(id).mark(LineState::Error);
        Reported
    }

    /// A failure that may disappear once labels settle: an error on the final pass, a pending
    /// line before that.
    pub(crate) fn value_error(&mut self, id: LineId, span: Span, message: impl Into<String>) -> Reported {
        if self.pass.is_final() {
            self.fail(id, span, message)
        } else {
            self.progress.pending += 1;
            Reported
        }
    }

    fn symbol_diagnostic(&self, error: &SymbolError, span: Span) -> Diagnostic {
        let diagnostic = Diagnostic::error(span, error.to_string());
        match error {
            SymbolError::Duplicate { previous, .. } | SymbolError::DuplicateMacro { previous, .. } => {
                diagnostic.with_label(previous.span(), "first defined here")
            }
            _ => diagnostic,
        }
    }

    pub(crate) fn report_symbol_error(&mut self, id: LineId, error: &SymbolError, span: Span) {
        let diagnostic = self.symbol_diagnostic(error, span);
        self.diagnostics.push(diagnostic);
        self.lines.get_mut(id).mark(LineState::Error);
    }

    pub(crate) fn is_reserved(&self, name: &str) -> bool {
        self.isa.is_mnemonic(name) || Directive::from_keyword(name).is_some()
    }

    /// Creates a label for `token` as seen from `scope`, reporting failures on line `id`.
    pub(crate) fn define_label(
        &mut self,
        id: LineId,
        token: &Token,
        scope: ScopeId,
        kind: LabelKind,
        allow_nameless: bool,
    ) -> Option<LabelId> {
        if self.is_reserved(&token.text) {
            self.fail(
                id,
                token.span(),
                format!("'{}' is reserved and cannot be used as a label", token.text),
            );
            return None;
        }
        match self.symbols.create_label(token, scope, kind, allow_nameless) {
            Ok(label) => {
                for recorder in &mut self.recorders {
                    recorder.push(label);
                }
                Some(label)
            }
            Err(error) => {
                self.report_symbol_error(id, &error, token.span());
                None
            }
        }
    }

    /// Binds the label written in front of line `id`, if any.
    pub(crate) fn define_line_label(&mut self, id: LineId) {
        let line = self.lines.get(id);
        let (Some(token), None) = (line.label.clone(), line.label_id) else {
            return;
        };
        let (scope, comment) = (line.scope, line.comment.clone());
        if let Some(label) = self.define_label(id, &token, scope, LabelKind::Label, true) {
            self.symbols.label_mut(label).doc = comment;
            self.lines.get_mut(id).label_id = Some(label);
        }
    }

    /// Stores a label value and tracks whether the pass changed anything.
    pub(crate) fn set_label_value(&mut self, label: LabelId, value: Option<Value>) {
        let had_value = self.symbols.label(label).value.is_some();
        let has_value = value.is_some();
        if !self.symbols.set_value(label, value) {
            return;
        }
        if self.symbols.label(label).kind == LabelKind::Variable {
            return;
        }
        self.progress.changed = true;
        if self.pass.is_final() && had_value && has_value && self.progress.unsettled.is_none() {
            self.progress.unsettled = Some(self.symbols.label(label).token.span());
        }
    }

    /// Parses an expression argument, reporting syntax errors on line `id`.
    pub(crate) fn parse_expression(&mut self, id: LineId, token: &Token) -> Option<Expression> {
        match Expression::parse(&token.text) {
            Ok(expression) => {
                for (reference, _, _) in expression.labels() {
                    if let LabelRef::Named(name) = reference {
                        self.symbols.add_reference(token.source_id, name);
                    }
                }
                Some(expression)
            }
            Err(error) => {
                let span = match error.range() {
                    Some((start, end)) => token.sub_span(start, end),
                    None => token.span(),
                };
                self.fail(id, span, error.to_string());
                None
            }
        }
    }

    /// Evaluates an expression for line `id`. `Ok(None)` means it is still pending, which is
    /// only possible before the final pass.
    pub(crate) fn evaluate(
        &mut self,
        id: LineId,
        expression: &Expression,
        token: &Token,
    ) -> Result<Option<Value>, Reported> {
        let line = self.lines.get(id);
        let resolver = ScopeResolver {
            symbols: &self.symbols,
            scope: line.scope,
            token,
            org: line.result.org,
        };
        match expression.evaluate(&resolver, self.pass.eval_mode()) {
            Ok(Evaluation::Resolved(value)) => Ok(Some(value)),
            Ok(Evaluation::Pending(_)) => {
                self.progress.pending += 1;
                Ok(None)
            }
            Err(error) => {
                let span = match &error {
                    EvalError::Unresolved { start, end, .. } => token.sub_span(*start, *end),
                    _ => token.span(),
                };
                Err(self.value_error(id, span, error.to_string()))
            }
        }
    }

    pub(crate) fn evaluate_int(
        &mut self,
        id: LineId,
        expression: &Expression,
        token: &Token,
    ) -> Result<Option<i64>, Reported> {
        let Some(value) = self.evaluate(id, expression, token)? else {
            return Ok(None);
        };
        match value.as_int() {
            Ok(value) => Ok(Some(value)),
            Err(error) => Err(self.fail(id, token.span(), error.to_string())),
        }
    }

    /// Evaluates argument `index` of a directive line as an integer.
    pub(crate) fn command_int(&mut self, id: LineId, index: usize) -> Result<Option<i64>, Reported> {
        let Some(command) = self.lines.get(id).command() else {
            return Ok(None);
        };
        let (Some(expression), Some(token)) = (
            command.expression(index).cloned(),
            command.args.get(index).cloned(),
        ) else {
            return Ok(None);
        };
        self.evaluate_int(id, &expression, &token)
    }

    pub(crate) fn scope_kind(&self, scope: ScopeId) -> ScopeKind {
        self.symbols.scope(scope).kind
    }

    /// True when line `id` sits inside a macro expansion, at any depth.
    pub(crate) fn in_macro(&self, id: LineId) -> bool {
        let mut scope = Some(self.lines.get(id).scope);
        while let Some(current) = scope {
            if self.scope_kind(current) == ScopeKind::Macro {
                return true;
            }
            scope = self.symbols.scope(current).parent;
        }
        false
    }

    pub(crate) fn line_kind(&self, id: LineId) -> &LineKind {
        &self.lines.get(id).kind
    }
}
