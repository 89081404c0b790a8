//! Resolve a user-supplied path into an ordered list of input files.

use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;
use walkdir::WalkDir;

/// Configuration errors raised while resolving inputs. The operation aborts for that input.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("input path does not exist: {}", .0.display())]
    Missing(PathBuf),
    #[error("input path must be a {expected} file or a directory containing {expected} files: {}", .path.display())]
    Unsupported { path: PathBuf, expected: String },
    #[error("no {expected} files found in directory: {}", .path.display())]
    Empty { path: PathBuf, expected: String },
    #[error("failed to list directory {}", .path.display())]
    Listing {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// List files directly inside `dir` whose extension matches one of `exts` (case-insensitive),
/// sorted by path.
pub fn collect_files(dir: &Path, exts: &[&str]) -> Result<Vec<PathBuf>, InputError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false) {
        let entry = entry.map_err(|source| InputError::Listing {
            path: dir.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if has_extension(entry.path(), exts) {
            files.push(entry.into_path());
        } else {
            debug!("Skipping {}", entry.path().display());
        }
    }
    files.sort();
    Ok(files)
}

/// Resolve `path` to a single matching file or the sorted matching files of a directory.
///
/// A file with the wrong extension, a missing path, or a directory with no matches is an error.
pub fn resolve_inputs(path: &Path, exts: &[&str]) -> Result<Vec<PathBuf>, InputError> {
    let expected = exts
        .iter()
        .map(|e| format!(".{e}"))
        .collect::<Vec<_>>()
        .join("/");
    if path.is_file() {
        if has_extension(path, exts) {
            return Ok(vec![path.to_path_buf()]);
        }
        return Err(InputError::Unsupported {
            path: path.to_path_buf(),
            expected,
        });
    }
    if path.is_dir() {
        let files = collect_files(path, exts)?;
        if files.is_empty() {
            return Err(InputError::Empty {
                path: path.to_path_buf(),
                expected,
            });
        }
        return Ok(files);
    }
    Err(InputError::Missing(path.to_path_buf()))
}

/// Case-insensitive extension check.
pub fn has_extension(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| exts.iter().any(|want| e.eq_ignore_ascii_case(want)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn lists_matching_files_in_sorted_order() {
        let dir = tempdir().unwrap();
        for name in ["b.png", "a.PNG", "c.txt", "d.png"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("nested.png")).unwrap();

        let files = collect_files(dir.path(), &["png"]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.PNG", "b.png", "d.png"]);
    }

    #[test]
    fn resolves_single_file_and_rejects_wrong_type() {
        let dir = tempdir().unwrap();
        let png = dir.path().join("frame.png");
        let txt = dir.path().join("notes.txt");
        fs::write(&png, b"x").unwrap();
        fs::write(&txt, b"x").unwrap();

        assert_eq!(resolve_inputs(&png, &["png"]).unwrap(), vec![png]);
        assert!(matches!(
            resolve_inputs(&txt, &["png"]),
            Err(InputError::Unsupported { .. })
        ));
    }

    #[test]
    fn empty_directory_and_missing_path_are_errors() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            resolve_inputs(dir.path(), &["png"]),
            Err(InputError::Empty { .. })
        ));
        assert!(matches!(
            resolve_inputs(&dir.path().join("gone"), &["png"]),
            Err(InputError::Missing(_))
        ));
    }
}
