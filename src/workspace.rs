use crate::error::{AnagramError, IoContext, Stage};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier of an intermediate file, unique within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u64);

impl FileId {
    pub fn new(raw: u64) -> Self {
        FileId(raw)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out strictly increasing file ids; an id is never handed out twice.
#[derive(Debug)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        IdAllocator { next: 1 }
    }

    pub fn allocate(&mut self) -> FileId {
        let id = FileId(self.next);
        self.next += 1;
        id
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Working directory of a single pipeline run
#[derive(Debug)]
pub struct RunWorkspace {
    dir: PathBuf,
    extension: String,
}

impl RunWorkspace {
    /// Creates `<temp_root>/<stem><millis>`, suffixing `_N` when a concurrent run
    /// already claimed the name.
    pub fn create(temp_root: &Path, source: &Path, extension: &str) -> Result<Self, AnagramError> {
        fs::create_dir_all(temp_root)
            .stage(Stage::Partition, || format!("creating {}", temp_root.display()))?;

        let base = format!("{}{}", source_stem(source), unix_millis());
        let mut attempt = 0usize;
        loop {
            let name = if attempt == 0 {
                base.clone()
            } else {
                format!("{}_{}", base, attempt)
            };
            let dir = temp_root.join(name);
            match fs::create_dir(&dir) {
                Ok(()) => {
                    return Ok(Self {
                        dir,
                        extension: extension.to_string(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => {
                    return Err(AnagramError::io(
                        Stage::Partition,
                        format!("creating {}", dir.display()),
                        e,
                    ));
                }
            }
        }
    }

    /// Wraps an existing directory (tests and tools)
    pub fn at(dir: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_path(&self, id: FileId) -> PathBuf {
        self.dir.join(format!("{}{}", id, self.extension))
    }

    /// Moves a file to a fresh id. The old id is consumed.
    pub fn rename(&self, from: FileId, to: FileId) -> Result<(), AnagramError> {
        fs::rename(self.file_path(from), self.file_path(to))
            .stage(Stage::Merge, || format!("moving file {} to {}", from, to))
    }

    /// Deletes the final intermediate file and the then-empty directory
    pub fn finish(&self, last: FileId) -> Result<(), AnagramError> {
        let last_path = self.file_path(last);
        match fs::remove_file(&last_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(AnagramError::io(
                    Stage::Cleanup,
                    format!("removing {}", last_path.display()),
                    e,
                ));
            }
        }
        fs::remove_dir(&self.dir).stage(Stage::Cleanup, || format!("removing {}", self.dir.display()))
    }

    /// Removes the directory and anything left in it, logging instead of failing
    pub fn discard(self) {
        if !self.dir.exists() {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            tracing::warn!(dir = %self.dir.display(), error = %e, "failed to clean up working directory");
        } else {
            tracing::debug!(dir = %self.dir.display(), "working directory removed");
        }
    }
}

/// File name up to its first dot (`words.big.txt` -> `words`)
pub fn source_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    match name.split('.').next() {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => "input".to_string(),
    }
}

pub fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
