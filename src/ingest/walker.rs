use walkdir::WalkDir;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use crate::error::{RagsyncError, Result};

const SQLITE_SIDECARS: [&str; 3] = ["-wal", "-shm", "-journal"];

/// Metadata for a discovered file
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// Path as walked (root joined with the entry name); used as `source_path`.
    pub path: PathBuf,
    /// Path relative to the walk root (the file name for a single-file root).
    pub relative_path: String,
    pub extension: String,
    pub file_size: u64,
    pub modified: std::time::SystemTime,
}

impl FileMetadata {
    pub fn source_path(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Files a walk must skip, compared by canonical path.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    paths: HashSet<PathBuf>,
}

impl Exclusions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: &Path) -> Self {
        self.paths.insert(canonical_path(path));
        self
    }

    /// Exclude a SQLite database file together with its `-wal`, `-shm` and
    /// `-journal` sidecars, whether or not they exist yet.
    pub fn with_database(mut self, db_path: &Path) -> Self {
        let base = canonical_path(db_path);
        for suffix in SQLITE_SIDECARS {
            let mut name: OsString = base.as_os_str().to_owned();
            name.push(suffix);
            self.paths.insert(PathBuf::from(name));
        }
        self.paths.insert(base);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        !self.paths.is_empty() && self.paths.contains(&canonical_path(path))
    }
}

/// Absolute path with symlinks and `.`/`..` resolved.
///
/// A file that does not exist (yet, or any more) is resolved through its
/// parent directory so it still compares equal to the path it will have.
fn canonical_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|p| p.join(name))
            .unwrap_or(absolute),
        _ => absolute,
    }
}

/// Recursively enumerate every regular file under `root`.
///
/// A file root yields exactly that file. Entries are visited in file-name
/// order within each directory. Symlinks are followed. Nothing is filtered
/// by extension here: unsupported files are rejected by the loader so a
/// stray file fails the run instead of being silently skipped.
pub fn discover_files(root: &Path) -> Result<Vec<FileMetadata>> {
    discover_files_excluding(root, &Exclusions::default())
}

/// [`discover_files`], skipping anything in `excluded`.
pub fn discover_files_excluding(root: &Path, excluded: &Exclusions) -> Result<Vec<FileMetadata>> {
    let root_meta = std::fs::metadata(root).map_err(|e| RagsyncError::from_io(root, e))?;

    if root_meta.is_file() {
        if excluded.contains(root) {
            return Ok(Vec::new());
        }
        let relative_path = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.to_string_lossy().into_owned());
        return Ok(vec![file_metadata(root, relative_path, &root_meta)?]);
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(walk_error)?;

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if excluded.contains(path) {
            log::debug!("Skipping excluded file {}", path.display());
            continue;
        }
        let metadata = entry.metadata().map_err(walk_error)?;

        let relative_path = path
            .strip_prefix(root)
            .map_err(|_| RagsyncError::InvalidInput(
                format!("Failed to compute relative path for: {}", path.display())
            ))?
            .to_string_lossy()
            .replace('\\', "/");

        files.push(file_metadata(path, relative_path, &metadata)?);
    }

    log::info!("Discovered {} files in {}", files.len(), root.display());
    Ok(files)
}

fn file_metadata(path: &Path, relative_path: String, metadata: &std::fs::Metadata) -> Result<FileMetadata> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();

    Ok(FileMetadata {
        path: path.to_path_buf(),
        relative_path,
        extension,
        file_size: metadata.len(),
        modified: metadata.modified().map_err(|e| RagsyncError::from_io(path, e))?,
    })
}

fn walk_error(err: walkdir::Error) -> RagsyncError {
    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
    if err.loop_ancestor().is_some() {
        return RagsyncError::Io {
            path,
            source: std::io::Error::new(std::io::ErrorKind::Other, "symlink loop"),
        };
    }
    match err.into_io_error() {
        Some(io) => RagsyncError::from_io(&path, io),
        None => RagsyncError::Io {
            path,
            source: std::io::Error::new(std::io::ErrorKind::Other, "directory walk failed"),
        },
    }
}
