//! Release notes sources.

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::PathBuf;

use crate::mailing::types::Component;
use crate::{ErrorKind, Result};

/// Somewhere the release notes of a component version can be fetched from.
pub trait ReleaseNotes: Send + Sync {
    /// The notes for a component version, one entry per item.
    fn notes(&self, component: Component, version: &str, language: &str) -> Result<Vec<String>>;
}

/// Release notes kept as text files, `<root>/<component>/<version>.<language>.txt`, one entry
/// per non-blank line.
#[derive(Clone, Debug)]
pub struct DirectoryNotes {
    root: PathBuf,
}

impl DirectoryNotes {
    pub fn new(root: PathBuf) -> DirectoryNotes {
        DirectoryNotes { root }
    }

    fn path(&self, component: Component, version: &str, language: &str) -> PathBuf {
        self.root
            .join(component.as_str())
            .join(format!("{}.{}.txt", version, language))
    }
}

impl ReleaseNotes for DirectoryNotes {
    fn notes(&self, component: Component, version: &str, language: &str) -> Result<Vec<String>> {
        let path = self.path(component, version, language);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(ref err) if err.kind() == IoErrorKind::NotFound => {
                return Err(ErrorKind::ReleaseNotesMissing {
                    component: component.name(),
                    version: version.to_string(),
                    language: language.to_string(),
                }
                .into())
            }
            Err(err) => return Err(err.into()),
        };

        let notes = text
            .trim_start_matches('\u{feff}')
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| line.to_string())
            .collect::<Vec<_>>();
        if notes.is_empty() {
            return Err(ErrorKind::ReleaseNotesMissing {
                component: component.name(),
                version: version.to_string(),
                language: language.to_string(),
            }
            .into());
        }
        Ok(notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reads_lines() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("server")).unwrap();
        fs::write(
            dir.path().join("server").join("3.1.0.ru.txt"),
            "BoardMaps Core:\n  Новый поиск\n\nИсправления\n",
        )
        .unwrap();

        let notes = DirectoryNotes::new(dir.path().to_path_buf());
        assert_eq!(
            notes.notes(Component::Server, "3.1.0", "ru").unwrap(),
            vec!["BoardMaps Core:", "Новый поиск", "Исправления"]
        );
    }

    #[test]
    fn missing_notes() {
        let dir = TempDir::new().unwrap();
        let notes = DirectoryNotes::new(dir.path().to_path_buf());
        match notes.notes(Component::Ipad, "3.1.0", "en").unwrap_err().kind() {
            ErrorKind::ReleaseNotesMissing { component, version, .. } => {
                assert_eq!(*component, "iPad");
                assert_eq!(version, "3.1.0");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
