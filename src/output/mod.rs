//! Managed output directory: staging area, atomic placement, packaging

pub mod pack;

use crate::error::{AcquireError, Result, SetupError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::{PathPersistError, TempDir, TempPath};
use tracing::debug;
use walkdir::WalkDir;

pub use pack::pack;

/// Names tried for one placement before giving up
const MAX_NAME_ATTEMPTS: usize = 10_000;
const MAX_NAME_BYTES: usize = 200;

/// Shared output root. Files only appear here through `place`, which never
/// overwrites an existing entry.
#[derive(Debug, Clone)]
pub struct OutputDir {
    root: PathBuf,
    staging: PathBuf,
}

impl OutputDir {
    /// Create the root and staging area and check that the root is writable
    pub fn prepare(root: impl Into<PathBuf>, staging_name: &str) -> std::result::Result<Self, SetupError> {
        let requested = root.into();
        let setup_err = |source| SetupError::OutputRoot {
            path: requested.clone(),
            source,
        };

        std::fs::create_dir_all(requested.join(staging_name)).map_err(setup_err)?;
        // External programs run inside work dirs, so paths must be absolute
        let root = requested.canonicalize().map_err(setup_err)?;
        let staging = root.join(staging_name);

        tempfile::Builder::new()
            .prefix(".write-check-")
            .tempfile_in(&root)
            .map_err(setup_err)?;

        debug!(root = %root.display(), "Output directory ready");
        Ok(Self { root, staging })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging(&self) -> &Path {
        &self.staging
    }

    /// Empty file in the staging area, removed on drop unless placed
    pub fn partial_file(&self) -> Result<TempPath> {
        tempfile::Builder::new()
            .prefix(".part-")
            .tempfile_in(&self.staging)
            .map(|file| file.into_temp_path())
            .map_err(|e| AcquireError::io("create partial file", e))
    }

    /// Private working directory in the staging area, removed on drop
    pub fn work_dir(&self, label: &str) -> Result<TempDir> {
        tempfile::Builder::new()
            .prefix(&format!("{label}-"))
            .tempdir_in(&self.staging)
            .map_err(|e| AcquireError::io("create work directory", e))
    }

    /// Move a finished file into the root as `name`, or `name-N.ext` when
    /// taken
    pub fn place(&self, file: TempPath, name: &str) -> Result<PathBuf> {
        let name = sanitize_file_name(name).unwrap_or_else(fallback_name);
        let mut file = file;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = self.root.join(candidate_name(&name, attempt));
            match file.persist_noclobber(&candidate) {
                Ok(()) => {
                    debug!(path = %candidate.display(), "File placed");
                    return Ok(candidate);
                }
                Err(PathPersistError { error, path }) if error.kind() == ErrorKind::AlreadyExists => {
                    file = path;
                }
                Err(PathPersistError { error, .. }) => {
                    return Err(AcquireError::io(
                        format!("place {}", candidate.display()),
                        error,
                    ));
                }
            }
        }

        Err(AcquireError::io(
            format!("place {name}"),
            std::io::Error::new(ErrorKind::AlreadyExists, "no free file name"),
        ))
    }

    /// Place a file produced by an external program; `path` must live on
    /// the same filesystem (the staging area)
    pub fn relocate(&self, path: &Path) -> Result<PathBuf> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(fallback_name);
        self.place(TempPath::from_path(path), &name)
    }

    /// Zip the root, minus the staging area, beside the root
    pub async fn pack(&self, archive_name: &str) -> Result<PathBuf> {
        let staging = self
            .staging
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .into_iter()
            .collect::<Vec<_>>();
        pack(&self.root, archive_name, &staging).await
    }
}

/// `name` for attempt 0, then `stem-N.ext`
pub fn candidate_name(name: &str, attempt: usize) -> String {
    if attempt == 0 {
        return name.to_string();
    }

    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}-{attempt}.{ext}"),
        None => format!("{stem}-{attempt}"),
    }
}

/// Strip path components and characters that are unsafe in file names.
/// Returns `None` when nothing usable remains.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name);

    let sanitized: String = base
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = sanitized.trim().trim_start_matches('.').trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        return None;
    }

    Some(truncate_name(trimmed, MAX_NAME_BYTES))
}

/// Keep the extension when shortening an overlong name
fn truncate_name(name: &str, max_bytes: usize) -> String {
    if name.len() <= max_bytes {
        return name.to_string();
    }

    let path = Path::new(name);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.len() < 16)
        .map(|e| format!(".{e}"))
        .unwrap_or_default();

    let budget = max_bytes.saturating_sub(ext.len());
    let mut end = budget.min(name.len());
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{ext}", &name[..end])
}

fn fallback_name() -> String {
    format!("download-{}", uuid::Uuid::new_v4().simple())
}

/// Regular files under `dir` whose lowercased extension is listed
pub fn scan_media(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let context = format!("scan {}", dir.display());
            AcquireError::io(context, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if has_extension(entry.path(), extensions) {
            found.push(entry.into_path());
        }
    }

    Ok(found)
}

pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    extensions
        .iter()
        .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn output() -> (tempfile::TempDir, OutputDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let output = OutputDir::prepare(dir.path().join("out"), ".staging").unwrap();
        (dir, output)
    }

    #[test]
    fn test_candidate_names() {
        assert_eq!(candidate_name("x.mp3", 0), "x.mp3");
        assert_eq!(candidate_name("x.mp3", 1), "x-1.mp3");
        assert_eq!(candidate_name("x.mp3", 2), "x-2.mp3");
        assert_eq!(candidate_name("README", 3), "README-3");
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_file_name("track 01.mp3").as_deref(), Some("track 01.mp3"));
        assert_eq!(sanitize_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_file_name("a:b?.flac").as_deref(), Some("a_b_.flac"));
        assert_eq!(sanitize_file_name(".hidden").as_deref(), Some("hidden"));
        assert_eq!(sanitize_file_name(".."), None);
        assert_eq!(sanitize_file_name("dir/"), None);

        let long = format!("{}.mp3", "é".repeat(300));
        let cut = sanitize_file_name(&long).unwrap();
        assert!(cut.len() <= MAX_NAME_BYTES);
        assert!(cut.ends_with(".mp3"));
    }

    #[test]
    fn test_prepare_creates_staging() {
        let (_dir, output) = output();
        assert!(output.root().is_dir());
        assert!(output.staging().is_dir());
        assert!(output.staging().starts_with(output.root()));
    }

    #[cfg(unix)]
    #[test]
    fn test_prepare_rejects_unwritable_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();

        let err = OutputDir::prepare(&file, ".staging").unwrap_err();
        assert!(matches!(err, SetupError::OutputRoot { .. }));
    }

    #[test]
    fn test_place_never_overwrites() {
        let (_dir, output) = output();

        let first = output.partial_file().unwrap();
        fs::write(&first, b"one").unwrap();
        let a = output.place(first, "x.mp3").unwrap();

        let second = output.partial_file().unwrap();
        fs::write(&second, b"two").unwrap();
        let b = output.place(second, "x.mp3").unwrap();

        assert_eq!(a.file_name().unwrap(), "x.mp3");
        assert_eq!(b.file_name().unwrap(), "x-1.mp3");
        assert_eq!(fs::read(&a).unwrap(), b"one");
        assert_eq!(fs::read(&b).unwrap(), b"two");
    }

    #[test]
    fn test_dropped_partial_file_is_removed() {
        let (_dir, output) = output();
        let partial = output.partial_file().unwrap();
        let path = partial.to_path_buf();
        assert!(path.exists());
        drop(partial);
        assert!(!path.exists());
    }

    #[test]
    fn test_relocate_from_work_dir() {
        let (_dir, output) = output();
        let work = output.work_dir("swarm").unwrap();
        let song = work.path().join("album").join("song.flac");
        fs::create_dir_all(song.parent().unwrap()).unwrap();
        fs::write(&song, b"flac").unwrap();

        let placed = output.relocate(&song).unwrap();
        assert_eq!(placed, output.root().join("song.flac"));
        assert!(!song.exists());
    }

    #[test]
    fn test_scan_media_filters_extensions() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("cd1")).unwrap();
        fs::write(dir.path().join("cd1/a.FLAC"), b"").unwrap();
        fs::write(dir.path().join("b.mp3"), b"").unwrap();
        fs::write(dir.path().join("cover.jpg"), b"").unwrap();

        let extensions = vec![".mp3".to_string(), ".flac".to_string()];
        let found = scan_media(dir.path(), &extensions).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| has_extension(p, &extensions)));
    }
}
