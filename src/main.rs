mod config;

use std::path::{Path, PathBuf};
use std::{env, fs, io, io::IsTerminal};

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand};
use retroasm_assets::{AssetFS, StdAssetFS};
use retroasm_core::diag::{Diagnostic, render_diagnostics_with_options};
use retroasm_core::span::SourceMap;
use retroasm_core::{
    CompileOptions, LabelEntry, Platform, RenderOptions, compile_files_with_render,
    parse_for_analysis,
};
use retroasm_eval::Value;
use tracing::{Level, info};

use crate::config::{Overrides, Settings, load_manifest};

#[derive(Debug, Parser)]
#[command(
    name = "retroasm",
    version,
    about = "Multi-target assembler for the 6502, 65C816, Game Boy and SPC700",
    long_about = None,
    after_help = "Examples:\n  retroasm build game.asm -o game.bin\n  retroasm build boot.asm -p spc700 --passes 4\n  retroasm check src/\n  retroasm labels game.asm"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// One of `TRACE`, `DEBUG`, `INFO`, `WARN`, or `ERROR`
    #[arg(long, global = true, default_value_t = Level::INFO)]
    log_level: Level,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Assemble a source file into a flat binary.
    Build(BuildArgs),
    /// Analyse sources without producing output.
    Check(CheckArgs),
    /// Assemble a source file and print its label table.
    Labels(LabelsArgs),
}

#[derive(Debug, Args)]
struct TargetArgs {
    /// Target CPU: 6502, 65816, gb or spc700.
    #[arg(short = 'p', long = "platform", value_name = "PLATFORM")]
    platform: Option<Platform>,
    /// Upper bound on compile passes.
    #[arg(long = "passes", value_name = "N")]
    passes: Option<usize>,
    /// Extra directories searched by .INCLUDE and .INCBIN.
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    include: Vec<PathBuf>,
    /// Project manifest; defaults to retroasm.toml next to the input.
    #[arg(long = "config", value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct BuildArgs {
    #[arg(value_name = "INPUT")]
    input: PathBuf,
    /// Output binary path.
    #[arg(short = 'o', long = "output", value_name = "OUT")]
    output: Option<PathBuf>,
    /// Byte used for addresses that were never written.
    #[arg(long = "fill", value_name = "BYTE")]
    fill: Option<u8>,
    #[command(flatten)]
    target: TargetArgs,
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Source files, or directories to search for .asm files.
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,
    #[command(flatten)]
    target: TargetArgs,
}

#[derive(Debug, Args)]
struct LabelsArgs {
    #[arg(value_name = "INPUT")]
    input: PathBuf,
    #[command(flatten)]
    target: TargetArgs,
}

fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    if let Err(err) = run(cli) {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Build(args)) => build_command(args),
        Some(Commands::Check(args)) => check_command(args),
        Some(Commands::Labels(args)) => labels_command(args),
        None => {
            print_banner();
            println!();
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

fn print_banner() {
    println!("retroasm, version {}.", env!("CARGO_PKG_VERSION"));
    println!("Targets: 6502, 65C816, Game Boy (SM83), SPC700.");
    println!("License: 0BSD - free to use, copy, modify, and distribute.");
}

fn stderr_supports_color() -> bool {
    if env::var_os("NO_COLOR").is_some() {
        return false;
    }

    if let Some(force) = env::var_os("CLICOLOR_FORCE") {
        return force != "0";
    }

    if let Some(choice) = env::var_os("CLICOLOR") {
        if choice == "0" {
            return false;
        }
    }

    io::stderr().is_terminal()
}

fn render_options() -> RenderOptions {
    RenderOptions {
        color: stderr_supports_color(),
    }
}

fn settings_for(
    target: TargetArgs,
    input: &Path,
    output: Option<PathBuf>,
    fill: Option<u8>,
) -> Result<Settings> {
    let (manifest, root) = load_manifest(target.config.as_deref(), input)?;
    Settings::resolve(
        manifest,
        &root,
        Overrides {
            platform: target.platform,
            passes: target.passes,
            include: target.include,
            output,
            fill,
        },
    )
}

fn print_diagnostics(sources: &SourceMap, diagnostics: &[Diagnostic]) {
    if diagnostics.is_empty() {
        return;
    }
    eprintln!(
        "{}",
        render_diagnostics_with_options(sources, diagnostics, render_options())
    );
}

/// Compiles one input and prints its warnings; errors come back rendered.
fn compile_input(input: &Path, options: CompileOptions) -> Result<retroasm_core::CompileOutput> {
    let source = fs::read_to_string(input)
        .with_context(|| format!("failed to read '{}'", input.display()))?;
    let name = input.display().to_string();
    let files = [(name.as_str(), source.as_str())];
    let output = compile_files_with_render(&files, &StdAssetFS, options, render_options())
        .map_err(|error| anyhow!(error.rendered))?;
    print_diagnostics(&output.sources, &output.diagnostics);
    Ok(output)
}

fn build_command(args: BuildArgs) -> Result<()> {
    let settings = settings_for(args.target, &args.input, args.output, args.fill)?;
    let output = compile_input(&args.input, settings.options)?;

    let bytes = output.image.to_flat(settings.fill, true);
    let out_path = settings
        .output
        .unwrap_or_else(|| args.input.with_extension("bin"));
    fs::write(&out_path, &bytes)
        .with_context(|| format!("failed to write '{}'", out_path.display()))?;
    info!(path = %out_path.display(), bytes = bytes.len(), "wrote binary");
    Ok(())
}

fn is_source_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ["asm", "s"].iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

fn check_command(args: CheckArgs) -> Result<()> {
    let fs_access = StdAssetFS;
    let mut paths = Vec::new();
    for input in &args.inputs {
        if input.is_dir() {
            let found = fs_access.folder_files(input)?;
            paths.extend(found.into_iter().filter(|path| is_source_path(path)));
        } else {
            paths.push(input.clone());
        }
    }
    let Some(first) = paths.first() else {
        anyhow::bail!("no source files found");
    };
    let settings = settings_for(args.target, first, None, None)?;

    let mut texts = Vec::with_capacity(paths.len());
    for path in &paths {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        texts.push((path.display().to_string(), text));
    }
    let files: Vec<(&str, &str)> = texts
        .iter()
        .map(|(name, text)| (name.as_str(), text.as_str()))
        .collect();
    let analysis = parse_for_analysis(&files, &fs_access, settings.options);
    print_diagnostics(&analysis.sources, &analysis.diagnostics);

    let errors = analysis
        .diagnostics
        .iter()
        .filter(|diagnostic| diagnostic.is_error())
        .count();
    if errors > 0 {
        anyhow::bail!("{errors} error(s) in {} file(s)", files.len());
    }
    println!("{} file(s) checked, no errors", files.len());
    Ok(())
}

fn format_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::Str(text)) => format!("{text:?}"),
        Some(value) => match value.as_int() {
            Ok(number) if number < 0 => format!("{number}"),
            Ok(number) => format!("${number:04X}"),
            Err(_) => value.to_string(),
        },
        None => "?".to_string(),
    }
}

fn print_labels(labels: &[LabelEntry]) {
    let width = labels.iter().map(|label| label.name.len()).max().unwrap_or(0);
    for label in labels {
        println!(
            "{:<width$}  {:>8}  {}:{}",
            label.name,
            format_value(label.value.as_ref()),
            label.file,
            label.line
        );
    }
}

fn labels_command(args: LabelsArgs) -> Result<()> {
    let settings = settings_for(args.target, &args.input, None, None)?;
    let output = compile_input(&args.input, settings.options)?;
    print_labels(&output.labels);
    Ok(())
}
