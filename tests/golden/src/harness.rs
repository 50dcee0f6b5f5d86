use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use retroasm_assets::StdAssetFS;
use retroasm_core::diag::render_plain;
use retroasm_core::{ByteImage, CompileContext, CompileOptions, Platform};

const INPUT_FILE: &str = "input.asm";
const PLATFORM_FILE: &str = "platform";
const EXPECTED_HEX: &str = "expected.hex";
const EXPECTED_ERR: &str = "expected.err";

#[derive(Debug, Clone, Copy, Default)]
pub struct BlessOptions {
    pub errors_only: bool,
}

#[derive(Debug, Default)]
pub struct BlessSummary {
    pub processed_cases: usize,
    pub updated_files: Vec<PathBuf>,
}

/// What one fixture produced: a hex dump of the image, or its diagnostics when any of them is
/// an error.
enum Outcome {
    Image(String),
    Failed(String),
}

pub fn run_case(case: &str) -> Result<()> {
    let fixture_dir = fixture_dir(case);
    let outcome = assemble(&fixture_dir)?;

    let expected_error_path = fixture_dir.join(EXPECTED_ERR);
    if expected_error_path.exists() {
        let expected_error = std::fs::read_to_string(&expected_error_path)
            .with_context(|| format!("failed to read '{}'", expected_error_path.display()))?;
        let actual = match outcome {
            Outcome::Failed(rendered) => rendered,
            Outcome::Image(_) => {
                return Err(anyhow!(
                    "fixture '{}' expected errors, but assembly succeeded",
                    fixture_dir.display()
                ));
            }
        };
        similar_asserts::assert_eq!(expected_error.trim_end(), actual.trim_end());
        return Ok(());
    }

    let dump = match outcome {
        Outcome::Image(dump) => dump,
        Outcome::Failed(rendered) => {
            return Err(anyhow!(
                "fixture '{}' failed to assemble:\n{rendered}",
                fixture_dir.display()
            ));
        }
    };
    let expected_path = fixture_dir.join(EXPECTED_HEX);
    let expected = std::fs::read_to_string(&expected_path)
        .with_context(|| format!("failed to read '{}'", expected_path.display()))?;
    similar_asserts::assert_eq!(expected.trim_end(), dump.trim_end());
    Ok(())
}

/// Fixture directory names under `fixtures/`, sorted.
pub fn discover_cases() -> Result<Vec<String>> {
    let fixtures_dir = fixtures_root();
    let entries = std::fs::read_dir(&fixtures_dir)
        .with_context(|| format!("failed to read '{}'", fixtures_dir.display()))?;
    let mut cases = Vec::new();
    for entry in entries {
        let entry = entry.context("failed to read fixture entry")?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry
            .file_name()
            .into_string()
            .map_err(|name| anyhow!("fixture name {name:?} is not valid UTF-8"))?;
        cases.push(name);
    }
    cases.sort();
    Ok(cases)
}

/// Rewrites the expected files of each case from what the assembler currently produces.
pub fn bless_cases(cases: &[String], options: BlessOptions) -> Result<BlessSummary> {
    let mut summary = BlessSummary::default();
    for case in cases {
        let fixture_dir = fixture_dir(case);
        if !fixture_dir.join(INPUT_FILE).exists() {
            return Err(anyhow!("unknown golden case '{case}'"));
        }
        let outcome = assemble(&fixture_dir)?;
        summary.processed_cases += 1;

        let (keep, drop, contents) = match outcome {
            Outcome::Failed(rendered) => (EXPECTED_ERR, EXPECTED_HEX, rendered),
            Outcome::Image(_) if options.errors_only => continue,
            Outcome::Image(dump) => (EXPECTED_HEX, EXPECTED_ERR, dump),
        };
        let keep_path = fixture_dir.join(keep);
        if write_if_changed(&keep_path, &contents)? {
            summary.updated_files.push(keep_path);
        }
        let drop_path = fixture_dir.join(drop);
        if drop_path.exists() {
            std::fs::remove_file(&drop_path)
                .with_context(|| format!("failed to remove '{}'", drop_path.display()))?;
            summary.updated_files.push(drop_path);
        }
    }
    Ok(summary)
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

fn fixture_dir(case: &str) -> PathBuf {
    fixtures_root().join(case)
}

fn fixture_options(fixture_dir: &Path) -> Result<CompileOptions> {
    let platform_path = fixture_dir.join(PLATFORM_FILE);
    let platform = if platform_path.exists() {
        let name = std::fs::read_to_string(&platform_path)
            .with_context(|| format!("failed to read '{}'", platform_path.display()))?;
        name.parse::<Platform>()
            .with_context(|| format!("invalid platform in '{}'", platform_path.display()))?
    } else {
        Platform::default()
    };
    Ok(CompileOptions {
        platform,
        include_dirs: vec![fixture_dir.to_path_buf()],
        ..CompileOptions::default()
    })
}

fn assemble(fixture_dir: &Path) -> Result<Outcome> {
    let input_path = fixture_dir.join(INPUT_FILE);
    let source = std::fs::read_to_string(&input_path)
        .with_context(|| format!("failed to read fixture input '{}'", input_path.display()))?;
    let options = fixture_options(fixture_dir)?;

    let fs = StdAssetFS;
    let mut ctx = CompileContext::new(options, &fs);
    ctx.add_file(INPUT_FILE, &source);
    ctx.compile();

    let diagnostics = ctx.diagnostics();
    if diagnostics.has_errors() {
        let mut rendered = String::new();
        for diagnostic in diagnostics.iter() {
            rendered.push_str(&render_plain(ctx.sources(), diagnostic));
            rendered.push('\n');
        }
        return Ok(Outcome::Failed(rendered));
    }
    Ok(Outcome::Image(hex_dump(ctx.image())))
}

/// Sixteen offsets per row, starting on the row holding the first written byte. Unwritten
/// offsets print as `--`.
fn hex_dump(image: &ByteImage) -> String {
    let mut out = String::new();
    let Some(range) = image.written_range() else {
        return out;
    };
    let mut row = range.start & !0xF;
    while row < range.end {
        let _ = write!(out, "{row:04X}:");
        for offset in row..row + 16 {
            match image.get(offset) {
                Some(byte) if offset < range.end => {
                    let _ = write!(out, " {byte:02X}");
                }
                _ if offset < range.end => out.push_str(" --"),
                _ => {}
            }
        }
        out.push('\n');
        row += 16;
    }
    out
}

fn write_if_changed(path: &Path, contents: &str) -> Result<bool> {
    if let Ok(existing) = std::fs::read_to_string(path)
        && existing == contents
    {
        return Ok(false);
    }
    std::fs::write(path, contents).with_context(|| format!("failed to write '{}'", path.display()))?;
    Ok(true)
}
