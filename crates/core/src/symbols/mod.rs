mod groups;
mod tree;

use indexmap::IndexMap;
use retroasm_eval::{LabelRef, Value};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::span::SourceId;
use crate::token::Token;

pub use groups::{DataGroup, Macro};
pub use tree::LabelTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u32);

impl ScopeId {
    pub const GLOBAL: ScopeId = ScopeId(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelScope {
    Global,
    Local,
    Nameless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    /// Bound to the address of the line it is written on.
    Label,
    /// `.DEF`, `.ENUM` and data-group row names.
    Defined,
    /// `name = expr`; may be reassigned further down.
    Variable,
    /// A macro parameter inside one expansion.
    Parameter,
    Unresolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    File,
    Macro,
    Repeat,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub source_id: SourceId,
}

#[derive(Debug, Clone)]
pub struct Label {
    pub name: String,
    pub scope: LabelScope,
    pub scope_id: ScopeId,
    pub source_id: SourceId,
    pub token: Token,
    pub value: Option<Value>,
    pub kind: LabelKind,
    pub doc: Option<String>,
    bound: bool,
}

impl Label {
    fn vacant() -> Self {
        Self {
            name: String::new(),
            scope: LabelScope::Global,
            scope_id: ScopeId::GLOBAL,
            source_id: SourceId(u32::MAX),
            token: Token::new(SourceId(u32::MAX), 0, 0, 0, ""),
            value: None,
            kind: LabelKind::Label,
            doc: None,
            bound: false,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn int_value(&self) -> Option<i64> {
        self.value.as_ref().and_then(|value| value.as_int().ok())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SymbolError {
    #[error("label '{name}' is already defined")]
    Duplicate { name: String, previous: Token },
    #[error("'{name}' is not a valid label name")]
    IllegalName { name: String },
    #[error("nameless label '{name}' is not allowed here")]
    NamelessNotAllowed { name: String },
    #[error("macro '{name}' is already defined")]
    DuplicateMacro { name: String, previous: Token },
}

/// Which kind of label `name` would be, or `None` when it is not a label name at all.
pub fn classify_name(name: &str) -> Option<LabelScope> {
    if name.is_empty() {
        return None;
    }
    if name.chars().all(|ch| ch == '+') || name.chars().all(|ch| ch == '-') {
        return Some(LabelScope::Nameless);
    }
    let is_tail = |ch: char| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.';
    if name.ends_with('.') || name.contains("..") {
        return None;
    }
    if let Some(local) = name.strip_prefix('.') {
        let first = local.chars().next()?;
        let valid = (first.is_ascii_alphanumeric() || first == '_') && local.chars().all(is_tail);
        return valid.then_some(LabelScope::Local);
    }
    let first = name.chars().next()?;
    ((first.is_ascii_alphabetic() || first == '_') && name.chars().all(is_tail))
        .then_some(LabelScope::Global)
}

#[derive(Debug, Clone, Copy)]
struct NamelessEntry {
    line: usize,
    column: usize,
    label: LabelId,
}

#[derive(Debug, Clone)]
pub struct SymbolTable {
    labels: Vec<Label>,
    scopes: Vec<Scope>,
    names: FxHashMap<ScopeId, FxHashMap<String, LabelId>>,
    nameless: FxHashMap<ScopeId, Vec<NamelessEntry>>,
    tree: LabelTree,
    macros: IndexMap<String, Macro>,
    data_groups: IndexMap<String, DataGroup>,
    references: FxHashMap<SourceId, Vec<String>>,
    free_labels: Vec<LabelId>,
    free_scopes: Vec<ScopeId>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            labels: Vec::new(),
            scopes: vec![Scope {
                kind: ScopeKind::Global,
                parent: None,
                source_id: SourceId(u32::MAX),
            }],
            names: FxHashMap::default(),
            nameless: FxHashMap::default(),
            tree: LabelTree::default(),
            macros: IndexMap::new(),
            data_groups: IndexMap::new(),
            references: FxHashMap::default(),
            free_labels: Vec::new(),
            free_scopes: Vec::new(),
        }
    }

    pub fn add_scope(&mut self, kind: ScopeKind, parent: ScopeId, source_id: SourceId) -> ScopeId {
        let scope = Scope {
            kind,
            parent: Some(parent),
            source_id,
        };
        if let Some(id) = self.free_scopes.pop() {
            self.scopes[id.0 as usize] = scope;
            return id;
        }
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(scope);
        id
    }

    /// Label and scope slots in use or waiting for reuse.
    pub fn slot_counts(&self) -> (usize, usize) {
        (self.labels.len(), self.scopes.len())
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn label(&self, id: LabelId) -> &Label {
        &self.labels[id.0 as usize]
    }

    pub fn label_mut(&mut self, id: LabelId) -> &mut Label {
        &mut self.labels[id.0 as usize]
    }

    pub fn tree(&self) -> &LabelTree {
        &self.tree
    }

    /// The scope a new label named like `scope` would be stored in when defined from a line
    /// that lives in `line_scope`. Expansions keep everything to themselves; in a file, local
    /// and nameless labels stay in the file and the rest is global.
    fn target_scope(&self, scope: LabelScope, line_scope: ScopeId) -> ScopeId {
        match self.scope(line_scope).kind {
            ScopeKind::Macro | ScopeKind::Repeat | ScopeKind::Global => line_scope,
            ScopeKind::File if scope == LabelScope::Global => ScopeId::GLOBAL,
            ScopeKind::File => line_scope,
        }
    }

    pub fn create_label(
        &mut self,
        token: &Token,
        line_scope: ScopeId,
        kind: LabelKind,
        allow_nameless: bool,
    ) -> Result<LabelId, SymbolError> {
        let name = token.text.as_str();
        let scope = classify_name(name).ok_or_else(|| SymbolError::IllegalName {
            name: name.to_string(),
        })?;
        if scope == LabelScope::Nameless && !allow_nameless {
            return Err(SymbolError::NamelessNotAllowed {
                name: name.to_string(),
            });
        }
        let scope_id = self.target_scope(scope, line_scope);
        if scope != LabelScope::Nameless {
            if let Some(existing) = self.lookup_in(scope_id, name) {
                return Err(SymbolError::Duplicate {
                    name: name.to_string(),
                    previous: self.label(existing).token.clone(),
                });
            }
        }

        let label = Label {
            name: name.to_string(),
            scope,
            scope_id,
            source_id: token.source_id,
            token: token.clone(),
            value: None,
            kind,
            doc: None,
            bound: false,
        };
        let id = match self.free_labels.pop() {
            Some(id) => {
                self.labels[id.0 as usize] = label;
                id
            }
            None => {
                self.labels.push(label);
                LabelId(self.labels.len() as u32 - 1)
            }
        };
        self.bind(id);
        Ok(id)
    }

    fn lookup_in(&self, scope_id: ScopeId, name: &str) -> Option<LabelId> {
        self.names.get(&scope_id)?.get(name).copied()
    }

    fn bind(&mut self, id: LabelId) {
        let label = &self.labels[id.0 as usize];
        let (scope_id, name) = (label.scope_id, label.name.clone());
        match label.scope {
            LabelScope::Nameless => {
                let entry = NamelessEntry {
                    line: label.token.line,
                    column: label.token.column,
                    label: id,
                };
                let list = self.nameless.entry(scope_id).or_default();
                let at = list.partition_point(|other| {
                    (other.line, other.column) <= (entry.line, entry.column)
                });
                list.insert(at, entry);
            }
            _ => {
                self.names.entry(scope_id).or_default().insert(name.clone(), id);
                if scope_id == ScopeId::GLOBAL {
                    self.tree.insert(&name);
                }
            }
        }
        self.labels[id.0 as usize].bound = true;
    }

    /// Makes a label invisible to lookups while keeping it (and its value) for a later
    /// `rebind`. Unbinding twice is harmless.
    pub fn unbind(&mut self, id: LabelId) {
        let label = &self.labels[id.0 as usize];
        if !label.bound {
            return;
        }
        let (scope_id, name, scope) = (label.scope_id, label.name.clone(), label.scope);
        match scope {
            LabelScope::Nameless => {
                if let Some(list) = self.nameless.get_mut(&scope_id) {
                    list.retain(|entry| entry.label != id);
                }
            }
            _ => {
                if let Some(names) = self.names.get_mut(&scope_id) {
                    if names.get(&name) == Some(&id) {
                        names.remove(&name);
                    }
                }
                if scope_id == ScopeId::GLOBAL {
                    self.tree.remove(&name);
                }
            }
        }
        self.labels[id.0 as usize].bound = false;
    }

    pub fn rebind(&mut self, id: LabelId) -> Result<(), SymbolError> {
        let label = self.label(id);
        if label.bound {
            return Ok(());
        }
        if label.scope != LabelScope::Nameless {
            if let Some(existing) = self.lookup_in(label.scope_id, &label.name) {
                return Err(SymbolError::Duplicate {
                    name: label.name.clone(),
                    previous: self.label(existing).token.clone(),
                });
            }
        }
        self.bind(id);
        Ok(())
    }

    /// Finds a named label visible from `scope`, walking outwards to the global scope.
    pub fn find_label(&self, name: &str, scope: ScopeId) -> Option<LabelId> {
        let mut current = Some(scope);
        while let Some(scope_id) = current {
            if let Some(id) = self.lookup_in(scope_id, name) {
                return Some(id);
            }
            current = self.scope(scope_id).parent;
        }
        None
    }

    /// Resolves `+`/`-` runs by position: the k-th nameless label strictly after (or before)
    /// `line:column` in the same scope.
    pub fn find_nameless(
        &self,
        reference: &LabelRef,
        scope: ScopeId,
        line: usize,
        column: usize,
    ) -> Option<LabelId> {
        let list = self.nameless.get(&self.nameless_scope(scope))?;
        let here = (line, column);
        let entry = match *reference {
            LabelRef::Forward(count) if count > 0 => {
                let after = list.partition_point(|entry| (entry.line, entry.column) <= here);
                list.get(after + count - 1)
            }
            LabelRef::Backward(count) if count > 0 => {
                let before = list.partition_point(|entry| (entry.line, entry.column) < here);
                before.checked_sub(count).and_then(|index| list.get(index))
            }
            _ => None,
        }?;
        Some(entry.label)
    }

    fn nameless_scope(&self, scope: ScopeId) -> ScopeId {
        match self.scope(scope).kind {
            ScopeKind::Global => ScopeId::GLOBAL,
            _ => scope,
        }
    }

    /// Resolves any label reference except `*`.
    pub fn resolve(
        &self,
        reference: &LabelRef,
        scope: ScopeId,
        line: usize,
        column: usize,
    ) -> Option<LabelId> {
        match reference {
            LabelRef::Named(name) => self.find_label(name, scope),
            LabelRef::Forward(_) | LabelRef::Backward(_) => {
                self.find_nameless(reference, scope, line, column)
            }
            LabelRef::Current => None,
        }
    }

    /// Stores a new value and reports whether it differs from the previous one.
    pub fn set_value(&mut self, id: LabelId, value: Option<Value>) -> bool {
        let label = self.label_mut(id);
        if label.value == value {
            return false;
        }
        label.value = value;
        true
    }

    /// Records that a line of `source_id` refers to the global name `name`, which keeps its
    /// label-tree node alive.
    pub fn add_reference(&mut self, source_id: SourceId, name: &str) {
        if classify_name(name) != Some(LabelScope::Global) {
            return;
        }
        self.tree.add_reference(name);
        self.references
            .entry(source_id)
            .or_default()
            .push(name.to_string());
    }

    pub fn define_macro(&mut self, definition: Macro) -> Result<(), SymbolError> {
        if let Some(existing) = self.macros.get(&definition.name) {
            return Err(SymbolError::DuplicateMacro {
                name: definition.name.clone(),
                previous: existing.token.clone(),
            });
        }
        self.macros.insert(definition.name.clone(), definition);
        Ok(())
    }

    pub fn macro_named(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }

    pub fn macros(&self) -> impl Iterator<Item = &Macro> {
        self.macros.values()
    }

    pub fn add_data_group(&mut self, group: DataGroup) {
        self.data_groups.insert(group.owner.clone(), group);
    }

    pub fn data_group(&self, owner: &str) -> Option<&DataGroup> {
        self.data_groups.get(owner)
    }

    /// Global and file-local labels that are currently visible, sorted by name.
    pub fn public_labels(&self) -> Vec<&Label> {
        let mut labels: Vec<&Label> = self
            .labels
            .iter()
            .filter(|label| label.bound && label.scope != LabelScope::Nameless)
            .filter(|label| {
                matches!(
                    self.scope(label.scope_id).kind,
                    ScopeKind::Global | ScopeKind::File
                )
            })
            .collect();
        labels.sort_by(|a, b| a.name.cmp(&b.name).then(a.source_id.cmp(&b.source_id)));
        labels
    }

    /// Forgets everything `source_id` contributed: its labels (including those of expansions
    /// it owns), nameless lists, macros, data groups and label-tree references.
    pub fn clear_file(&mut self, source_id: SourceId) {
        let owned: Vec<LabelId> = self
            .labels
            .iter()
            .enumerate()
            .filter(|(_, label)| {
                label.bound
                    && (label.source_id == source_id
                        || self.scope(label.scope_id).source_id == source_id)
            })
            .map(|(index, _)| LabelId(index as u32))
            .collect();
        for id in owned {
            self.unbind(id);
        }
        let scopes: Vec<ScopeId> = self
            .nameless
            .keys()
            .copied()
            .filter(|scope| self.scope(*scope).source_id == source_id)
            .collect();
        for scope in scopes {
            self.nameless.remove(&scope);
        }
        self.macros.retain(|_, definition| definition.source_id != source_id);
        self.data_groups.retain(|_, group| group.source_id != source_id);
        for name in self.references.remove(&source_id).unwrap_or_default() {
            self.tree.release_reference(&name);
        }
    }

    /// Clears `source_id` like [`clear_file`](Self::clear_file), then hands its scopes and
    /// the labels stored in them back for reuse. A global label belongs to the source that
    /// defined it; any other label belongs to its scope. Callers must drop every line of
    /// those scopes first, since their `LabelId`s and `ScopeId`s become stale.
    pub fn release_file(&mut self, source_id: SourceId) {
        if source_id == self.scope(ScopeId::GLOBAL).source_id {
            return;
        }
        self.clear_file(source_id);
        let released: Vec<LabelId> = self
            .labels
            .iter()
            .enumerate()
            .filter(|(_, label)| match label.scope_id {
                ScopeId::GLOBAL => label.source_id == source_id,
                scope => self.scope(scope).source_id == source_id,
            })
            .map(|(index, _)| LabelId(index as u32))
            .collect();
        for id in released.into_iter().rev() {
            self.unbind(id);
            self.labels[id.0 as usize] = Label::vacant();
            self.free_labels.push(id);
        }

        let scopes: Vec<ScopeId> = (1..self.scopes.len())
            .map(|index| ScopeId(index as u32))
            .filter(|scope| self.scope(*scope).source_id == source_id)
            .collect();
        for id in scopes.into_iter().rev() {
            self.names.remove(&id);
            self.nameless.remove(&id);
            self.scopes[id.0 as usize] = Scope {
                kind: ScopeKind::Global,
                parent: None,
                source_id: SourceId(u32::MAX),
            };
            self.free_scopes.push(id);
        }
    }
}

#[cfg(test)]
mod tests;
