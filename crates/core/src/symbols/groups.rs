use indexmap::IndexMap;

use crate::line::LineId;
use crate::span::SourceId;
use crate::token::Token;

/// A `.MACRO` definition. The body lines are kept unanalysed; each invocation works on its
/// own copy.
#[derive(Debug, Clone)]
pub struct Macro {
    pub name: String,
    pub parameters: Vec<String>,
    pub body: Vec<LineId>,
    pub source_id: SourceId,
    pub token: Token,
}

/// Index over the cells of a `.DBG`/`.DWG`/`.DLG` block: for every name used in the block,
/// where it appears and at which element index.
#[derive(Debug, Clone)]
pub struct DataGroup {
    pub owner: String,
    pub source_id: SourceId,
    index: IndexMap<String, Vec<(Token, usize)>>,
}

impl DataGroup {
    pub fn new(owner: impl Into<String>, source_id: SourceId) -> Self {
        Self {
            owner: owner.into(),
            source_id,
            index: IndexMap::new(),
        }
    }

    pub fn record(&mut self, name: &str, token: Token, element: usize) {
        self.index
            .entry(name.to_string())
            .or_default()
            .push((token, element));
    }

    pub fn occurrences(&self, name: &str) -> &[(Token, usize)] {
        self.index.get(name).map_or(&[], Vec::as_slice)
    }

    /// Element index of the first occurrence of `name`.
    pub fn element_of(&self, name: &str) -> Option<usize> {
        self.occurrences(name).first().map(|(_, element)| *element)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }
}
