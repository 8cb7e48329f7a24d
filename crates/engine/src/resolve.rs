//! Include reference resolution and the source-loading seam.
//!
//! Resolution tiers, first match wins:
//! 1. `/`-prefixed references resolve under the document root (and only
//!    there);
//! 2. host-absolute references resolve as given;
//! 3. relative references try the current working directory;
//! 4. then the root directory, when it differs from the cwd.
//!
//! Existence checks and reads go through [`SourceLoader`], so embedders
//! and tests can serve documents from memory.

use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};

pub trait SourceLoader {
    fn exists(&self, path: &Path) -> bool;
    fn read(&self, path: &Path) -> io::Result<String>;
}

/// Filesystem-backed loader; the default.
#[derive(Debug, Default)]
pub struct FsLoader;

impl SourceLoader for FsLoader {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// In-memory loader keyed by normalized path. Serves tests and embedders
/// that keep their documents out of the filesystem.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    files: BTreeMap<PathBuf, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> &mut Self {
        self.files.insert(normalize(&path.into()), contents.into());
        self
    }

    pub fn with(mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.insert(path, contents);
        self
    }
}

impl SourceLoader for MemoryLoader {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize(path))
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        self.files
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }
}

/// Lexically normalize `.` and `..` components so joined paths compare
/// stably across loaders (no filesystem round trip).
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Map an include reference to a concrete path, or `None` when no tier
/// matches.
pub fn resolve_include(
    reference: &str,
    cwd: &Path,
    root: &Path,
    loader: &dyn SourceLoader,
) -> Option<PathBuf> {
    if let Some(stripped) = reference.strip_prefix('/') {
        let candidate = normalize(&root.join(stripped));
        return loader.exists(&candidate).then_some(candidate);
    }

    let as_path = Path::new(reference);
    if as_path.is_absolute() {
        let candidate = normalize(as_path);
        return loader.exists(&candidate).then_some(candidate);
    }

    let candidate = normalize(&cwd.join(reference));
    if loader.exists(&candidate) {
        return Some(candidate);
    }

    if normalize(cwd) != normalize(root) {
        let candidate = normalize(&root.join(reference));
        if loader.exists(&candidate) {
            return Some(candidate);
        }
    }

    None
}
