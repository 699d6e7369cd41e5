use glob::Pattern;
use std::io;
use std::path::{Path, PathBuf};
use tracing::error;
use walkdir::{DirEntry, WalkDir};

/// Walk `root` and return every file whose extension is in `extensions`
/// (case-insensitive), skipping anything matched by an ignore glob and any
/// directory named `skip_dir_name`. Symlinks and empty files are skipped.
///
/// Results are sorted so repeated scans of the same tree agree on order.
pub fn enumerate_fonts(
    root: &Path,
    extensions: &[String],
    ignore_globs: &[String],
    skip_dir_name: Option<&str>,
) -> io::Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Not a directory: {}", root.display()),
        ));
    }

    let ignore_patterns: Vec<Pattern> = ignore_globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect();

    let keep = |entry: &DirEntry| -> bool {
        if ignore_patterns.iter().any(|p| p.matches_path(entry.path())) {
            return false;
        }
        !(entry.file_type().is_dir()
            && entry.depth() > 0
            && skip_dir_name.is_some_and(|name| entry.file_name() == name))
    };

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(keep)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if err.io_error().map(|e| e.kind()) == Some(io::ErrorKind::PermissionDenied) {
                    error!("Access denied during walk: {}", err);
                    continue;
                }
                let kind = err.io_error().map(|e| e.kind()).unwrap_or(io::ErrorKind::Other);
                return Err(io::Error::new(kind, format!("Error walking {}: {}", root.display(), err)));
            }
        };

        if !entry.file_type().is_file() || !has_font_extension(entry.path(), extensions) {
            continue;
        }
        match entry.metadata() {
            Ok(metadata) if metadata.len() > 0 => files.push(entry.into_path()),
            Ok(_) => {}
            Err(err) => error!("Error getting metadata for {}: {}", entry.path().display(), err),
        }
    }

    files.sort();
    Ok(files)
}

fn has_font_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn exts() -> Vec<String> {
        vec!["otf".to_string(), "ttf".to_string()]
    }

    #[test]
    fn test_enumerate_filters_extension_staging_and_globs() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("A/Alpha")).unwrap();
        fs::create_dir_all(root.join(".staging")).unwrap();
        fs::create_dir_all(root.join("skipme")).unwrap();
        fs::write(root.join("A/Alpha/Alpha-Regular.OTF"), b"x").unwrap();
        fs::write(root.join("A/Alpha/readme.txt"), b"x").unwrap();
        fs::write(root.join("A/Alpha/empty.ttf"), b"").unwrap();
        fs::write(root.join("B.ttf"), b"x").unwrap();
        fs::write(root.join(".staging/Old.otf"), b"x").unwrap();
        fs::write(root.join("skipme/Skip.otf"), b"x").unwrap();

        let ignore = vec![format!("{}/skipme", root.display())];
        let files = enumerate_fonts(root, &exts(), &ignore, Some(".staging")).unwrap();

        assert_eq!(
            files,
            vec![root.join("A/Alpha/Alpha-Regular.OTF"), root.join("B.ttf")]
        );
    }

    #[test]
    fn test_enumerate_missing_root() {
        let tmp = tempdir().unwrap();
        let err = enumerate_fonts(&tmp.path().join("nope"), &exts(), &[], None).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
