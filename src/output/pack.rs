//! Zip packaging of an output tree

use crate::error::{AcquireError, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

/// Package `source` into `<parent>/<archive_name>` (`.zip` appended when
/// missing). Top-level directories named in `skip_dirs` are left out. The
/// source tree is never modified.
pub async fn pack(source: &Path, archive_name: &str, skip_dirs: &[String]) -> Result<PathBuf> {
    let source = source.to_path_buf();
    let archive_name = archive_name.to_string();
    let skip_dirs = skip_dirs.to_vec();

    tokio::task::spawn_blocking(move || pack_blocking(&source, &archive_name, &skip_dirs))
        .await
        .map_err(|e| AcquireError::Packaging(format!("packaging task failed: {e}")))?
}

fn pack_blocking(source: &Path, archive_name: &str, skip_dirs: &[String]) -> Result<PathBuf> {
    let source = source
        .canonicalize()
        .map_err(|e| AcquireError::Packaging(format!("cannot read {}: {e}", source.display())))?;
    if !source.is_dir() {
        return Err(AcquireError::Packaging(format!(
            "{} is not a directory",
            source.display()
        )));
    }

    let archive_path = archive_path(&source, archive_name)?;
    let parent = archive_path
        .parent()
        .ok_or_else(|| AcquireError::Packaging("archive has no parent directory".into()))?;

    let temp = tempfile::Builder::new()
        .prefix(".pack-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| packaging_io("create temporary archive", e))?;

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);
    let mut writer = ZipWriter::new(temp);
    let mut files = 0usize;

    let walker = WalkDir::new(&source)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !(entry.depth() == 1
                && entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| skip_dirs.iter().any(|skip| skip == name)))
        });

    for entry in walker {
        let entry = entry.map_err(|e| packaging_io("walk output tree", e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(&source)
            .map_err(|e| AcquireError::Packaging(e.to_string()))?;
        let name = entry_name(relative);

        if entry.file_type().is_dir() {
            writer
                .add_directory(name, options)
                .map_err(|e| AcquireError::Packaging(e.to_string()))?;
        } else if entry.file_type().is_file() {
            writer
                .start_file(name, options)
                .map_err(|e| AcquireError::Packaging(e.to_string()))?;
            let mut input = File::open(entry.path())
                .map_err(|e| packaging_io(&format!("open {}", entry.path().display()), e))?;
            io::copy(&mut input, &mut writer)
                .map_err(|e| packaging_io(&format!("compress {}", entry.path().display()), e))?;
            files += 1;
        }
    }

    if files == 0 {
        return Err(AcquireError::Packaging(format!(
            "{} contains no files",
            source.display()
        )));
    }

    let temp = writer
        .finish()
        .map_err(|e| AcquireError::Packaging(e.to_string()))?;
    temp.persist(&archive_path)
        .map_err(|e| packaging_io("finalize archive", e.error))?;

    info!(archive = %archive_path.display(), files, "Archive written");
    Ok(archive_path)
}

fn archive_path(source: &Path, archive_name: &str) -> Result<PathBuf> {
    let name = Path::new(archive_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AcquireError::Packaging(format!("invalid archive name '{archive_name}'")))?;

    let name = if name.to_ascii_lowercase().ends_with(".zip") {
        name.to_string()
    } else {
        format!("{name}.zip")
    };

    let parent = source.parent().unwrap_or(source);
    Ok(parent.join(name))
}

/// Zip entry names always use '/'
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn packaging_io(context: &str, e: io::Error) -> AcquireError {
    AcquireError::Packaging(format!("{context}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use zip::ZipArchive;

    fn read_names(archive: &Path) -> Vec<String> {
        let mut zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
        let mut names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_pack_tree() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("downloads");
        fs::create_dir_all(out.join("album")).unwrap();
        fs::create_dir_all(out.join(".staging")).unwrap();
        fs::write(out.join("a.mp3"), b"aaaa").unwrap();
        fs::write(out.join("album/b.flac"), b"bbbb").unwrap();
        fs::write(out.join(".staging/.part-x"), b"partial").unwrap();

        let archive = pack(&out, "music", &[".staging".to_string()]).await.unwrap();

        assert_eq!(archive.file_name().unwrap(), "music.zip");
        assert_eq!(
            archive.parent().unwrap().canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
        assert_eq!(read_names(&archive), vec!["a.mp3", "album/", "album/b.flac"]);

        // Source untouched
        assert!(out.join("a.mp3").exists());
        assert!(out.join(".staging/.part-x").exists());
    }

    #[tokio::test]
    async fn test_pack_keeps_zip_suffix() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("downloads");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("a.mp3"), b"a").unwrap();

        let archive = pack(&out, "backup.ZIP", &[]).await.unwrap();
        assert_eq!(archive.file_name().unwrap(), "backup.ZIP");
    }

    #[tokio::test]
    async fn test_empty_directory_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("downloads");
        fs::create_dir_all(&out).unwrap();

        let err = pack(&out, "empty", &[]).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Packaging);
        assert!(!dir.path().join("empty.zip").exists());
    }

    #[tokio::test]
    async fn test_missing_directory_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = pack(&dir.path().join("nope"), "x", &[]).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Packaging);
    }
}
