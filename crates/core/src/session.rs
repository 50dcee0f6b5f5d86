//! Long-lived analysis for editors and other tooling: files can be replaced one at a time
//! without rebuilding the whole symbol table.

use std::path::Path;

use retroasm_assets::AssetFS;
use tracing::debug;

use crate::compiler::analyze_files;
use crate::context::{CompileContext, CompileOptions, FileUnit};
use crate::diag::Diagnostic;
use crate::driver::LabelEntry;
use crate::span::SourceId;

pub struct AnalysisSession<'fs> {
    ctx: CompileContext<'fs>,
}

impl<'fs> AnalysisSession<'fs> {
    pub fn new(options: CompileOptions, fs: &'fs dyn AssetFS) -> Self {
        Self {
            ctx: CompileContext::new(options, fs),
        }
    }

    fn index_of(&self, path: &str) -> Option<usize> {
        self.ctx.files.iter().position(|file| file.path == Path::new(path))
    }

    fn owned_sources(file: &FileUnit) -> impl Iterator<Item = SourceId> + '_ {
        std::iter::once(file.source_id).chain(file.includes.iter().copied())
    }

    /// Frees what the file and everything it included contributed. Its own source id is
    /// released last, so a replacement loaded next takes it over.
    fn release(&mut self, index: usize) {
        let mut sources: Vec<SourceId> = Self::owned_sources(&self.ctx.files[index]).collect();
        sources.reverse();
        self.ctx.release_sources(&sources);
    }

    /// Adds or replaces a file and analyses it. Other files are not re-analysed.
    pub fn set_file(&mut self, path: &str, text: &str) {
        let existing = self.index_of(path);
        if let Some(index) = existing {
            self.release(index);
        }
        let (source_id, scope, lines) = self.ctx.load_source(path, text);
        let unit = FileUnit {
            path: path.into(),
            source_id,
            scope,
            lines,
            includes: Vec::new(),
        };
        let index = match existing {
            Some(index) => {
                self.ctx.files[index] = unit;
                index
            }
            None => {
                self.ctx.files.push(unit);
                self.ctx.files.len() - 1
            }
        };
        debug!(path, "analysing file");
        analyze_files(&mut self.ctx, &[index]);
        self.ctx.analyzed = self.ctx.files.len();
    }

    /// Returns false when the file was not part of the session.
    pub fn remove_file(&mut self, path: &str) -> bool {
        let Some(index) = self.index_of(path) else {
            return false;
        };
        self.release(index);
        self.ctx.files.remove(index);
        self.ctx.analyzed = self.ctx.files.len();
        true
    }

    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.ctx.files.iter().map(|file| file.path.as_path())
    }

    /// Labels defined by `path` or the files it includes.
    pub fn labels(&self, path: &str) -> Vec<LabelEntry> {
        let Some(index) = self.index_of(path) else {
            return Vec::new();
        };
        let names: Vec<String> = Self::owned_sources(&self.ctx.files[index])
            .map(|source_id| self.ctx.sources.name(source_id).to_string())
            .collect();
        self.ctx
            .label_entries()
            .into_iter()
            .filter(|label| names.contains(&label.file))
            .collect()
    }

    /// Every label visible to the whole session.
    pub fn all_labels(&self) -> Vec<LabelEntry> {
        self.ctx.label_entries()
    }

    /// Names of the macros defined by `path`.
    pub fn macros(&self, path: &str) -> Vec<String> {
        let Some(index) = self.index_of(path) else {
            return Vec::new();
        };
        let sources: Vec<SourceId> = Self::owned_sources(&self.ctx.files[index]).collect();
        self.ctx
            .symbols
            .macros()
            .filter(|definition| sources.contains(&definition.source_id))
            .map(|definition| definition.name.clone())
            .collect()
    }

    pub fn diagnostics(&self, path: &str) -> Vec<Diagnostic> {
        let Some(index) = self.index_of(path) else {
            return Vec::new();
        };
        let sources: Vec<SourceId> = Self::owned_sources(&self.ctx.files[index]).collect();
        sources
            .into_iter()
            .flat_map(|source_id| self.ctx.diagnostics.for_source(source_id).cloned())
            .collect()
    }

    pub fn all_diagnostics(&self) -> &[Diagnostic] {
        self.ctx.diagnostics.as_slice()
    }

    pub fn context(&self) -> &CompileContext<'fs> {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use retroasm_assets::MemoryAssetFS;

    use super::*;

    fn names(labels: &[LabelEntry]) -> Vec<&str> {
        labels.iter().map(|label| label.name.as_str()).collect()
    }

    #[test]
    fn replacing_a_file_drops_its_old_labels() {
        let fs = MemoryAssetFS::new();
        let mut session = AnalysisSession::new(CompileOptions::default(), &fs);
        session.set_file("a.asm", "first: .DB 1\nsecond: .DB 2");
        session.set_file("b.asm", "other: .DB 3");
        assert_eq!(names(&session.labels("a.asm")), vec!["first", "second"]);

        session.set_file("a.asm", "third: .DB 1");
        assert_eq!(names(&session.labels("a.asm")), vec!["third"]);
        assert_eq!(names(&session.all_labels()), vec!["other", "third"]);
    }

    #[test]
    fn duplicate_errors_clear_when_the_file_is_fixed() {
        let fs = MemoryAssetFS::new();
        let mut session = AnalysisSession::new(CompileOptions::default(), &fs);
        session.set_file("a.asm", "dup: .DB 1\ndup: .DB 2");
        assert_eq!(session.diagnostics("a.asm").len(), 1);

        session.set_file("a.asm", "dup: .DB 1");
        assert!(session.diagnostics("a.asm").is_empty());
    }

    #[test]
    fn removed_files_take_their_macros_along() {
        let fs = MemoryAssetFS::new();
        let mut session = AnalysisSession::new(CompileOptions::default(), &fs);
        session.set_file("macros.asm", ".MACRO pad n\n.DB n\n.ENDM");
        assert_eq!(session.macros("macros.asm"), vec!["pad".to_string()]);

        assert!(session.remove_file("macros.asm"));
        assert!(!session.remove_file("macros.asm"));
        assert_eq!(session.files().count(), 0);
        assert!(session.context().symbols().macro_named("pad").is_none());
    }

    #[test]
    fn included_files_belong_to_the_includer() {
        let fs = MemoryAssetFS::new().with_file("defs.asm", "shared: .DB 0");
        let mut session = AnalysisSession::new(CompileOptions::default(), &fs);
        session.set_file("main.asm", ".INCLUDE \"defs.asm\"\nstart: .DB 1");
        assert_eq!(names(&session.labels("main.asm")), vec!["shared", "start"]);

        session.set_file("main.asm", "start: .DB 1");
        assert_eq!(names(&session.all_labels()), vec!["start"]);
    }

    #[test]
    fn repeated_edits_reuse_freed_slots() {
        let fs = MemoryAssetFS::new().with_file("defs.asm", "shared: .DB 0\n- .DB 1");
        let mut session = AnalysisSession::new(CompileOptions::default(), &fs);
        session.set_file("lib.asm", ".MACRO pad n\nfill: .DB n\n.ENDM");
        let text = ".INCLUDE \"defs.asm\"\nstart: nop\npad 1\npad 2\n- nop\nbra -";
        session.set_file("main.asm", text);

        let sizes = |session: &AnalysisSession<'_>| {
            let ctx = session.context();
            (ctx.line_count(), ctx.symbols().slot_counts(), ctx.sources().len())
        };
        let source_id = session.context().files()[1].source_id;
        let first = sizes(&session);
        for _ in 0..100 {
            session.set_file("main.asm", text);
        }
        assert_eq!(sizes(&session), first);
        assert_eq!(session.context().files()[1].source_id, source_id);
        assert_eq!(names(&session.labels("main.asm")), vec!["shared", "start"]);
        assert!(session.diagnostics("main.asm").is_empty());
        assert_eq!(session.macros("lib.asm"), vec!["pad".to_string()]);
    }
}
