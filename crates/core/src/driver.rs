use std::path::PathBuf;

use retroasm_assets::{AssetFS, StdAssetFS};
use retroasm_eval::Value;
use thiserror::Error;
use tracing::debug;

use crate::compiler::{analyze_files, run_passes};
use crate::context::{CompileContext, CompileOptions, FileUnit};
use crate::diag::{Diagnostic, RenderOptions, render_diagnostics_with_options};
use crate::image::ByteImage;
use crate::span::SourceMap;
use crate::symbols::LabelKind;

/// A resolved label as exported for tooling and the `labels` listing.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelEntry {
    pub name: String,
    pub value: Option<Value>,
    pub kind: LabelKind,
    pub file: String,
    pub line: usize,
    pub doc: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub image: ByteImage,
    /// Warnings only; any error fails the compile.
    pub diagnostics: Vec<Diagnostic>,
    pub messages: Vec<String>,
    pub labels: Vec<LabelEntry>,
    pub sources: SourceMap,
}

#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub diagnostics: Vec<Diagnostic>,
    pub labels: Vec<LabelEntry>,
    pub macros: Vec<String>,
    pub sources: SourceMap,
}

#[derive(Debug, Error)]
#[error("compilation failed")]
pub struct CompileError {
    pub diagnostics: Vec<Diagnostic>,
    pub rendered: String,
}

impl CompileContext<'_> {
    /// Adds a top-level file. It is analysed by the next `analyze` or `compile` call.
    pub fn add_file(&mut self, name: &str, text: &str) -> usize {
        let (source_id, scope, lines) = self.load_source(name, text);
        self.files.push(FileUnit {
            path: PathBuf::from(name),
            source_id,
            scope,
            lines,
            includes: Vec::new(),
        });
        self.files.len() - 1
    }

    /// Runs the analysis phases over every file added since the last call.
    pub fn analyze(&mut self) {
        let pending: Vec<usize> = (self.analyzed..self.files.len()).collect();
        if pending.is_empty() {
            return;
        }
        debug!(files = pending.len(), "analysing files");
        analyze_files(self, &pending);
        self.analyzed = self.files.len();
    }

    /// Analyses outstanding files, then runs the compile passes over all of them.
    pub fn compile(&mut self) {
        self.analyze();
        run_passes(self);
    }

    pub fn files(&self) -> &[FileUnit] {
        &self.files
    }

    /// Every visible label, sorted by name.
    pub fn label_entries(&self) -> Vec<LabelEntry> {
        self.symbols
            .public_labels()
            .into_iter()
            .filter(|label| label.kind != LabelKind::Parameter)
            .map(|label| LabelEntry {
                name: label.name.clone(),
                value: label.value.clone(),
                kind: label.kind,
                file: self.sources.name(label.source_id).to_string(),
                line: label.token.line,
                doc: label.doc.clone(),
            })
            .collect()
    }
}

pub fn compile_source(source_name: &str, source_text: &str) -> Result<CompileOutput, CompileError> {
    let fs = StdAssetFS;
    compile_source_with_fs(source_name, source_text, &fs)
}

pub fn compile_source_with_fs(
    source_name: &str,
    source_text: &str,
    fs: &dyn AssetFS,
) -> Result<CompileOutput, CompileError> {
    compile_source_with_options(source_name, source_text, fs, CompileOptions::default())
}

pub fn compile_source_with_options(
    source_name: &str,
    source_text: &str,
    fs: &dyn AssetFS,
    options: CompileOptions,
) -> Result<CompileOutput, CompileError> {
    compile_files(&[(source_name, source_text)], fs, options)
}

/// Compiles several top-level files in order into one image.
pub fn compile_files(
    files: &[(&str, &str)],
    fs: &dyn AssetFS,
    options: CompileOptions,
) -> Result<CompileOutput, CompileError> {
    compile_files_with_render(files, fs, options, RenderOptions::plain())
}

/// Like [`compile_files`], with control over how `CompileError::rendered` is drawn.
pub fn compile_files_with_render(
    files: &[(&str, &str)],
    fs: &dyn AssetFS,
    options: CompileOptions,
    render: RenderOptions,
) -> Result<CompileOutput, CompileError> {
    let mut ctx = CompileContext::new(options, fs);
    for (name, text) in files {
        ctx.add_file(name, text);
    }
    ctx.compile();

    if ctx.diagnostics.has_errors() {
        return Err(fail_with_rendered(&ctx.sources, ctx.diagnostics.as_slice(), render));
    }
    let labels = ctx.label_entries();
    Ok(CompileOutput {
        image: std::mem::take(&mut ctx.image),
        diagnostics: std::mem::take(&mut ctx.diagnostics).into_vec(),
        messages: std::mem::take(&mut ctx.messages),
        labels,
        sources: std::mem::take(&mut ctx.sources),
    })
}

/// Declares, resolves and parses the files without compiling them. Labels carry no values.
pub fn parse_for_analysis(
    files: &[(&str, &str)],
    fs: &dyn AssetFS,
    options: CompileOptions,
) -> AnalysisOutput {
    let mut ctx = CompileContext::new(options, fs);
    for (name, text) in files {
        ctx.add_file(name, text);
    }
    ctx.analyze();
    AnalysisOutput {
        labels: ctx.label_entries(),
        macros: ctx
            .symbols
            .macros()
            .map(|definition| definition.name.clone())
            .collect(),
        diagnostics: std::mem::take(&mut ctx.diagnostics).into_vec(),
        sources: std::mem::take(&mut ctx.sources),
    }
}

fn fail_with_rendered(
    source_map: &SourceMap,
    diagnostics: &[Diagnostic],
    render: RenderOptions,
) -> CompileError {
    let rendered = render_diagnostics_with_options(source_map, diagnostics, render);
    CompileError {
        diagnostics: diagnostics.to_vec(),
        rendered,
    }
}
