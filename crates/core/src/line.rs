use retroasm_eval::Expression;
use retroasm_isa::Form;

use crate::directives::{Directive, DirectiveState};
use crate::span::SourceId;
use crate::symbols::{LabelId, ScopeId};
use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineId(u32);

/// Analysis progress of a line. It only moves away from `Unresolved`; `Error` can still
/// replace `Finished` when a later compile pass fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineState {
    #[default]
    Unresolved,
    Finished,
    Error,
    Ignored,
}

/// Addresses the line was compiled at and the bytes it produced. `None` reserves a byte
/// whose value is not known yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineResult {
    pub org: i64,
    pub base: i64,
    pub bytes: Vec<Option<u8>>,
}

#[derive(Debug, Clone)]
pub struct MatchedOperand {
    pub form: &'static Form,
    pub expressions: Vec<(Token, Expression)>,
}

#[derive(Debug, Clone)]
pub struct InstructionLine {
    pub mnemonic: Token,
    /// Lower-case mnemonic without the width suffix.
    pub base: String,
    pub forced_width: Option<u8>,
    pub operand: Token,
    pub matched: Option<MatchedOperand>,
    /// Widest operand width chosen so far; later passes never pick a narrower one.
    pub locked_width: u8,
}

/// One header line of a block directive and the lines it owns, e.g. an `.ELSEIF` and its body.
#[derive(Debug, Clone)]
pub struct Section {
    pub header: LineId,
    pub body: Vec<LineId>,
}

#[derive(Debug, Clone)]
pub struct CommandLine {
    pub directive: Directive,
    pub keyword: Token,
    pub args: Vec<Token>,
    /// Parsed form of each argument that is an expression.
    pub expressions: Vec<Option<Expression>>,
    pub sections: Vec<Section>,
    pub end: Option<Token>,
    pub state: DirectiveState,
}

impl CommandLine {
    pub fn new(directive: Directive, keyword: Token, args: Vec<Token>) -> Self {
        Self {
            directive,
            keyword,
            args,
            expressions: Vec::new(),
            sections: Vec::new(),
            end: None,
            state: DirectiveState::None,
        }
    }

    pub fn expression(&self, index: usize) -> Option<&Expression> {
        self.expressions.get(index).and_then(Option::as_ref)
    }
}

#[derive(Debug, Clone)]
pub struct VariableLine {
    pub name: Token,
    pub expression: Token,
    pub parsed: Option<Expression>,
    pub label: Option<LabelId>,
}

#[derive(Debug, Clone)]
pub struct Expansion {
    pub scope: ScopeId,
    pub parameters: Vec<LabelId>,
    pub lines: Vec<LineId>,
}

#[derive(Debug, Clone)]
pub struct MacroCallLine {
    pub name: Token,
    pub args: Vec<Token>,
    pub arguments: Vec<Option<Expression>>,
    pub expansion: Option<Expansion>,
}

#[derive(Debug, Clone)]
pub enum LineKind {
    LabelOnly,
    Instruction(InstructionLine),
    Command(CommandLine),
    Variable(VariableLine),
    MacroCall(MacroCallLine),
    /// Not classifiable until every macro is known.
    Unknown,
}

#[derive(Debug, Clone)]
pub struct CommonLine {
    /// The content of the line without its comment.
    pub origin: Token,
    pub scope: ScopeId,
    pub label: Option<Token>,
    pub label_id: Option<LabelId>,
    pub comment: Option<String>,
    pub kind: LineKind,
    pub state: LineState,
    pub result: LineResult,
}

impl CommonLine {
    fn vacant() -> Self {
        Self {
            origin: Token::new(SourceId(u32::MAX), 0, 0, 0, ""),
            scope: ScopeId::GLOBAL,
            label: None,
            label_id: None,
            comment: None,
            kind: LineKind::LabelOnly,
            state: LineState::Ignored,
            result: LineResult::default(),
        }
    }

    /// Moves the line out of `Unresolved`. The one later move is `Finished` to `Error`: a line
    /// settled in an early pass can still fail in the final one, and from then on it is
    /// skipped. `Error` and `Ignored` are terminal.
    pub fn mark(&mut self, state: LineState) {
        match (self.state, state) {
            (LineState::Unresolved, _) | (LineState::Finished, LineState::Error) => {
                self.state = state;
            }
            _ => {}
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.state, LineState::Error | LineState::Ignored)
    }

    pub fn command(&self) -> Option<&CommandLine> {
        match &self.kind {
            LineKind::Command(command) => Some(command),
            _ => None,
        }
    }

    pub fn command_mut(&mut self) -> Option<&mut CommandLine> {
        match &mut self.kind {
            LineKind::Command(command) => Some(command),
            _ => None,
        }
    }

    pub fn directive(&self) -> Option<Directive> {
        self.command().map(|command| command.directive)
    }

    /// A fresh, unanalysed copy for a macro or repeat expansion living in `scope`.
    fn template_copy(&self, scope: ScopeId) -> Self {
        let kind = match &self.kind {
            LineKind::Instruction(instruction) => LineKind::Instruction(InstructionLine {
                matched: None,
                locked_width: 0,
                ..instruction.clone()
            }),
            LineKind::Command(command) => LineKind::Command(CommandLine::new(
                command.directive,
                command.keyword.clone(),
                command.args.clone(),
            )),
            LineKind::Variable(variable) => LineKind::Variable(VariableLine {
                parsed: None,
                label: None,
                ..variable.clone()
            }),
            LineKind::MacroCall(call) => LineKind::MacroCall(MacroCallLine {
                name: call.name.clone(),
                args: call.args.clone(),
                arguments: Vec::new(),
                expansion: None,
            }),
            LineKind::LabelOnly => LineKind::LabelOnly,
            LineKind::Unknown => LineKind::Unknown,
        };
        Self {
            origin: self.origin.clone(),
            scope,
            label: self.label.clone(),
            label_id: None,
            comment: self.comment.clone(),
            kind,
            state: LineState::Unresolved,
            result: LineResult::default(),
        }
    }
}

/// Owner of every line: file lines, included lines and expansion copies alike. Released
/// slots are handed out again, lowest id first.
#[derive(Debug, Clone, Default)]
pub struct LineArena {
    lines: Vec<CommonLine>,
    free: Vec<LineId>,
}

impl LineArena {
    pub fn push(&mut self, line: CommonLine) -> LineId {
        if let Some(id) = self.free.pop() {
            self.lines[id.0 as usize] = line;
            return id;
        }
        let id = LineId(self.lines.len() as u32);
        self.lines.push(line);
        id
    }

    /// Ids of the live lines that sit in a scope accepted by `owned`.
    pub fn owned_by(&self, mut owned: impl FnMut(ScopeId) -> bool) -> Vec<LineId> {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.scope != ScopeId::GLOBAL && owned(line.scope))
            .map(|(index, _)| LineId(index as u32))
            .collect()
    }

    /// Empties the slots of `ids`. Vacant lines sit in the global scope, which no file owns.
    pub fn release(&mut self, ids: &[LineId]) {
        let mut ids = ids.to_vec();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.dedup();
        for id in ids {
            if self.free.contains(&id) {
                continue;
            }
            self.lines[id.0 as usize] = CommonLine::vacant();
            self.free.push(id);
        }
    }

    pub fn get(&self, id: LineId) -> &CommonLine {
        &self.lines[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: LineId) -> &mut CommonLine {
        &mut self.lines[id.0 as usize]
    }

    /// Number of slots, released ones included.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Copies template lines into new arena slots owned by `scope`.
    pub fn instantiate(&mut self, template: &[LineId], scope: ScopeId) -> Vec<LineId> {
        template
            .iter()
            .map(|id| {
                let copy = self.get(*id).template_copy(scope);
                self.push(copy)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{ScopeKind, SymbolTable};

    fn line(text: &str, kind: LineKind) -> CommonLine {
        CommonLine {
            origin: Token::new(SourceId(0), 1, 0, 0, text),
            scope: ScopeId::GLOBAL,
            label: None,
            label_id: None,
            comment: None,
            kind,
            state: LineState::Unresolved,
            result: LineResult::default(),
        }
    }

    #[test]
    fn finished_lines_can_only_turn_into_errors() {
        let mut settled = line("nop", LineKind::LabelOnly);
        settled.mark(LineState::Finished);
        settled.mark(LineState::Unresolved);
        assert_eq!(settled.state, LineState::Finished);
        settled.mark(LineState::Error);
        assert_eq!(settled.state, LineState::Error);
        settled.mark(LineState::Finished);
        assert_eq!(settled.state, LineState::Error);
        assert!(settled.is_skipped());

        let mut ignored = line("nop", LineKind::LabelOnly);
        ignored.mark(LineState::Ignored);
        ignored.mark(LineState::Error);
        assert_eq!(ignored.state, LineState::Ignored);
    }

    #[test]
    fn instantiation_resets_analysis_results() {
        let mut arena = LineArena::default();
        let keyword = Token::new(SourceId(0), 1, 0, 0, ".db");
        let mut original = line(
            ".db 1",
            LineKind::Command(CommandLine::new(Directive::Db, keyword, Vec::new())),
        );
        original.state = LineState::Finished;
        original.result.bytes = vec![Some(1)];
        let template = arena.push(original);

        let copies = arena.instantiate(&[template, template], ScopeId::GLOBAL);
        assert_eq!(copies.len(), 2);
        assert_ne!(copies[0], copies[1]);
        let copy = arena.get(copies[1]);
        assert_eq!(copy.state, LineState::Unresolved);
        assert!(copy.result.bytes.is_empty());
        assert_eq!(copy.directive(), Some(Directive::Db));
        assert_eq!(arena.len(), 3);
    }

    #[test]
    fn released_slots_are_reused_in_order() {
        let mut symbols = SymbolTable::new();
        let file = symbols.add_scope(ScopeKind::File, ScopeId::GLOBAL, SourceId(0));
        let mut arena = LineArena::default();
        let kept = arena.push(line("nop", LineKind::LabelOnly));
        let mut first = line("brk", LineKind::LabelOnly);
        first.scope = file;
        let mut second = first.clone();
        second.origin = Token::new(SourceId(0), 2, 0, 4, "rts");
        let ids = vec![arena.push(first), arena.push(second)];

        let owned = arena.owned_by(|scope| scope == file);
        assert_eq!(owned, ids);
        arena.release(&owned);
        arena.release(&owned);
        assert!(arena.owned_by(|_| true).is_empty());
        assert_eq!(arena.get(ids[0]).state, LineState::Ignored);

        let again = arena.push(line("inx", LineKind::LabelOnly));
        assert_eq!(again, ids[0]);
        assert_eq!(arena.push(line("iny", LineKind::LabelOnly)), ids[1]);
        assert_eq!(arena.len(), 3);
        assert_eq!(arena.get(kept).origin.text, "nop");
    }
}
