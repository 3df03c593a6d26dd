//! Some utilities.

use std::error::Error as StdError;
use std::fs;
use std::path::{Path, PathBuf};

use crate::Result;

/// Logs an error, including its causes.
pub fn log_err(err: &(dyn StdError + 'static)) {
    let mut cause = err.source();
    if cause.is_none() {
        error!("{}", err);
        return;
    }

    error!("           {}", err);
    while let Some(err) = cause {
        error!("caused by: {}", err);
        cause = err.source();
    }
}

/// Formats a list of addresses the way they appear in a `To` header.
pub fn join_addresses<S: AsRef<str>>(emails: &[S]) -> String {
    emails
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<&str>>()
        .join(", ")
}

/// The regular files of a directory, sorted by name. A missing directory has none.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn joins_addresses_with_commas() {
        assert_eq!(join_addresses(&["a@x.ru", "b@x.ru"]), "a@x.ru, b@x.ru");
        assert_eq!(join_addresses::<&str>(&[]), "");
    }

    #[test]
    fn lists_only_files_in_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.png"), "").unwrap();
        fs::write(dir.path().join("a.png"), "").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let names = list_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a.png", "b.png"]);
        assert!(list_files(&dir.path().join("missing")).unwrap().is_empty());
    }
}
