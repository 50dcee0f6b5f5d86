pub mod classify;
mod compiler;
pub mod context;
pub mod diag;
pub mod directives;
pub mod driver;
pub mod image;
mod instruction;
pub mod lexer;
pub mod line;
pub mod session;
pub mod span;
pub mod symbols;
pub mod token;

pub use context::{CancelToken, CompileContext, CompileOptions, FileUnit, Pass};
pub use diag::RenderOptions;
pub use driver::{
    AnalysisOutput, CompileError, CompileOutput, LabelEntry, compile_files,
    compile_files_with_render, compile_source, compile_source_with_fs,
    compile_source_with_options, parse_for_analysis,
};
pub use image::ByteImage;
pub use retroasm_isa::Platform;
pub use session::AnalysisSession;
