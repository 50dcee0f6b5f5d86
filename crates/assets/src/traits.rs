use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathType {
    File,
    Directory,
    None,
}

/// Where `.INCLUDE` and `.INCBIN` get their bytes from. The assembler itself never touches the
/// disk; it asks an implementation of this trait.
pub trait AssetFS: Send + Sync {
    fn read(&self, path: &Path) -> Result<Vec<u8>, AssetError>;

    fn path_type(&self, path: &Path) -> PathType;

    /// Files below `path`, recursively, in a stable order.
    fn folder_files(&self, path: &Path) -> Result<Vec<PathBuf>, AssetError>;

    fn read_text(&self, path: &Path) -> Result<String, AssetError> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|_| AssetError::NotUtf8 {
            path: path.display().to_string(),
        })
    }
}

#[derive(Debug, Default)]
pub struct StdAssetFS;

impl AssetFS for StdAssetFS {
    fn read(&self, path: &Path) -> Result<Vec<u8>, AssetError> {
        std::fs::read(path).map_err(|source| AssetError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    fn path_type(&self, path: &Path) -> PathType {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => PathType::Directory,
            Ok(_) => PathType::File,
            Err(_) => PathType::None,
        }
    }

    fn folder_files(&self, path: &Path) -> Result<Vec<PathBuf>, AssetError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(path).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|err| AssetError::Walk {
                path: path.display().to_string(),
                message: err.to_string(),
            })?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}

/// In-memory file tree for tests and editor buffers that are not saved yet.
#[derive(Debug, Default, Clone)]
pub struct MemoryAssetFS {
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl MemoryAssetFS {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), contents.into());
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }
}

impl AssetFS for MemoryAssetFS {
    fn read(&self, path: &Path) -> Result<Vec<u8>, AssetError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::NotFound {
                path: path.display().to_string(),
            })
    }

    fn path_type(&self, path: &Path) -> PathType {
        if self.files.contains_key(path) {
            PathType::File
        } else if self.files.keys().any(|file| file.starts_with(path)) {
            PathType::Directory
        } else {
            PathType::None
        }
    }

    fn folder_files(&self, path: &Path) -> Result<Vec<PathBuf>, AssetError> {
        Ok(self
            .files
            .keys()
            .filter(|file| file.starts_with(path) && file.as_path() != path)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("file not found: '{path}'")]
    NotFound { path: String },
    #[error("failed to read '{path}'")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to list '{path}': {message}")]
    Walk { path: String, message: String },
    #[error("'{path}' is not valid UTF-8 text")]
    NotUtf8 { path: String },
    #[error("range {start}..{end} is outside the {len}-byte file")]
    OutOfRange { start: i64, end: i64, len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn memory_fs_reports_files_and_directories() {
        let fs = MemoryAssetFS::new()
            .with_file("src/main.asm", "nop\n")
            .with_file("src/inc/regs.asm", "")
            .with_file("data/tiles.bin", vec![1, 2, 3]);

        assert_eq!(fs.path_type(Path::new("src/main.asm")), PathType::File);
        assert_eq!(fs.path_type(Path::new("src/inc")), PathType::Directory);
        assert_eq!(fs.path_type(Path::new("missing")), PathType::None);
        assert_eq!(
            fs.folder_files(Path::new("src")).expect("list"),
            vec![PathBuf::from("src/inc/regs.asm"), PathBuf::from("src/main.asm")]
        );
        assert_eq!(fs.read_text(Path::new("src/main.asm")).expect("read"), "nop\n");
        assert!(matches!(
            fs.read(Path::new("nope.bin")),
            Err(AssetError::NotFound { .. })
        ));
    }

    #[test]
    fn std_fs_walks_nested_folders() {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should move forward")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("retroasm-assets-{unique}"));
        std::fs::create_dir_all(root.join("nested")).expect("create dirs");
        std::fs::write(root.join("a.asm"), "nop").expect("write a");
        std::fs::write(root.join("nested/b.bin"), [0xFFu8]).expect("write b");

        let fs = StdAssetFS;
        assert_eq!(fs.path_type(&root), PathType::Directory);
        assert_eq!(fs.path_type(&root.join("a.asm")), PathType::File);
        let files = fs.folder_files(&root).expect("walk");
        assert_eq!(files, vec![root.join("a.asm"), root.join("nested/b.bin")]);
        assert_eq!(fs.read(&root.join("nested/b.bin")).expect("read"), vec![0xFF]);

        let _ = std::fs::remove_dir_all(&root);
    }
}
