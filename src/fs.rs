use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};

/// The file access the compiler needs: reading whole files and listing the
/// files under a directory (for directory includes).
pub trait FileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    fn is_dir(&self, path: &Path) -> bool;

    /// Every file below `dir`, recursively, in sorted order.
    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;
}

/// The real file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            for entry in std::fs::read_dir(&current)? {
                let path = entry?.path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

/// An in-memory file tree, mostly for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct MemoryFileSystem {
    files: BTreeMap<PathBuf, String>,
}

impl MemoryFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, text: impl Into<String>) -> &mut Self {
        self.files
            .insert(normalize_path(path.as_ref()), text.into());
        self
    }

    #[must_use]
    pub fn with_file(mut self, path: impl AsRef<Path>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }

    fn is_dir(&self, path: &Path) -> bool {
        let dir = normalize_path(path);
        self.files
            .keys()
            .any(|file| file != &dir && file.starts_with(&dir))
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let dir = normalize_path(dir);
        Ok(self
            .files
            .keys()
            .filter(|file| *file != &dir && file.starts_with(&dir))
            .cloned()
            .collect())
    }
}

/// Resolves `.` and `..` lexically, without touching the file system.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// The files an include of `target` from the file at `from` refers to: the
/// file itself, or every file below it when it names a directory.
pub fn resolve_include(
    fs: &dyn FileSystem,
    from: Option<&Path>,
    target: &str,
) -> io::Result<Vec<PathBuf>> {
    let base = from.and_then(Path::parent).unwrap_or_else(|| Path::new(""));
    let path = normalize_path(&base.join(target));
    if fs.is_dir(&path) {
        fs.list_files(&path)
    } else {
        Ok(vec![path])
    }
}
