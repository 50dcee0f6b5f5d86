use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use retroasm_core::{CompileOptions, Platform};
use serde::Deserialize;
use tracing::debug;

pub const PROJECT_MANIFEST: &str = "retroasm.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectManifest {
    #[serde(default)]
    pub build: BuildSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSection {
    pub platform: Option<String>,
    pub passes: Option<usize>,
    pub include: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub fill: Option<u8>,
}

/// Command-line values that override the manifest.
#[derive(Debug, Default)]
pub struct Overrides {
    pub platform: Option<Platform>,
    pub passes: Option<usize>,
    pub include: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub fill: Option<u8>,
}

#[derive(Debug)]
pub struct Settings {
    pub options: CompileOptions,
    pub output: Option<PathBuf>,
    pub fill: u8,
}

/// Reads `explicit`, or `retroasm.toml` next to the input when there is one.
pub fn load_manifest(explicit: Option<&Path>, input: &Path) -> Result<(ProjectManifest, PathBuf)> {
    let input_dir = input.parent().unwrap_or(Path::new(".")).to_path_buf();
    let manifest_path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let candidate = input_dir.join(PROJECT_MANIFEST);
            if !candidate.is_file() {
                return Ok((ProjectManifest::default(), input_dir));
            }
            candidate
        }
    };
    let text = fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read '{}'", manifest_path.display()))?;
    let manifest: ProjectManifest = toml::from_str(&text)
        .with_context(|| format!("failed to parse '{}'", manifest_path.display()))?;
    debug!(path = %manifest_path.display(), "loaded project manifest");
    let root = manifest_path
        .parent()
        .unwrap_or(Path::new("."))
        .to_path_buf();
    Ok((manifest, root))
}

impl Settings {
    /// Merges the manifest under the command-line values. Manifest include paths are relative
    /// to the manifest's directory.
    pub fn resolve(manifest: ProjectManifest, root: &Path, overrides: Overrides) -> Result<Self> {
        let build = manifest.build;
        let platform = match (overrides.platform, build.platform) {
            (Some(platform), _) => platform,
            (None, Some(name)) => name
                .parse()
                .with_context(|| format!("invalid platform in {PROJECT_MANIFEST}"))?,
            (None, None) => Platform::default(),
        };
        let pass_count = overrides
            .passes
            .or(build.passes)
            .unwrap_or(CompileOptions::default().pass_count);
        if pass_count == 0 {
            anyhow::bail!("the pass count must be at least 1");
        }
        let mut include_dirs = overrides.include;
        include_dirs.extend(build.include.into_iter().map(|dir| root.join(dir)));

        Ok(Self {
            options: CompileOptions {
                platform,
                pass_count,
                include_dirs,
            },
            output: overrides.output.or(build.output.map(|path| root.join(path))),
            fill: overrides.fill.or(build.fill).unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_values_win() {
        let manifest: ProjectManifest =
            toml::from_str("[build]\nplatform = \"gb\"\npasses = 4\ninclude = [\"inc\"]\nfill = 255\n")
                .expect("manifest");
        let overrides = Overrides {
            platform: Some(Platform::Spc700),
            include: vec![PathBuf::from("cli")],
            ..Overrides::default()
        };
        let settings = Settings::resolve(manifest, Path::new("proj"), overrides).expect("settings");
        assert_eq!(settings.options.platform, Platform::Spc700);
        assert_eq!(settings.options.pass_count, 4);
        assert_eq!(
            settings.options.include_dirs,
            vec![PathBuf::from("cli"), PathBuf::from("proj/inc")]
        );
        assert_eq!(settings.fill, 255);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let error = toml::from_str::<ProjectManifest>("[build]\nspeed = 3\n").expect_err("unknown key");
        assert!(error.to_string().contains("speed"), "{error}");
    }

    #[test]
    fn bad_platform_names_are_reported() {
        let manifest: ProjectManifest =
            toml::from_str("[build]\nplatform = \"z80\"\n").expect("manifest");
        let error = Settings::resolve(manifest, Path::new("."), Overrides::default())
            .expect_err("unknown platform");
        assert!(format!("{error:#}").contains("z80"), "{error:#}");
    }
}
