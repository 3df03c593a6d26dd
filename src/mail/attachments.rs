//! The working directory attachments are staged in.
//!
//! Every send starts from an empty directory, copies the documentation for the recipient's
//! language into `<root>/<LANG>/`, and attaches whatever ended up there. Since the directory is
//! shared, a send holds the area's lock from the clearing to the composing of its message.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::util::list_files;
use crate::Result;

/// The attachments working directory.
#[derive(Debug)]
pub struct AttachmentArea {
    root: PathBuf,
    lock: Mutex<()>,
}

/// Exclusive access to an `AttachmentArea`.
pub struct Staging<'a> {
    root: &'a Path,
    _guard: MutexGuard<'a, ()>,
}

impl AttachmentArea {
    pub fn new(root: PathBuf) -> AttachmentArea {
        AttachmentArea {
            root,
            lock: Mutex::new(()),
        }
    }

    /// Waits for exclusive access to the directory.
    pub fn lock(&self) -> Staging<'_> {
        let guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Staging {
            root: &self.root,
            _guard: guard,
        }
    }
}

impl<'a> Staging<'a> {
    /// Removes everything in the directory. Failures are logged and skipped.
    pub fn clear(&self) {
        let entries = match fs::read_dir(self.root) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("Nothing to clear in {}: {}", self.root.display(), err);
                return;
            }
        };

        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(err) => {
                    error!("Could not read an entry of {}: {}", self.root.display(), err);
                    continue;
                }
            };
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match removed {
                Ok(()) => info!("Removed {}", path.display()),
                Err(err) => error!("Could not remove {}: {}", path.display(), err),
            }
        }
    }

    /// The directory files for a language are staged in.
    pub fn language_dir(&self, language: &str) -> PathBuf {
        self.root.join(language.to_uppercase())
    }

    /// Copies `<documentation_dir>/<LANG>/*` into the directory, returning how many files were
    /// copied. Missing documentation is not an error.
    pub fn stage(&self, language: &str, documentation_dir: &Path) -> Result<usize> {
        let target = self.language_dir(language);
        fs::create_dir_all(&target)?;

        let source = documentation_dir.join(language.to_uppercase());
        if !source.is_dir() {
            warn!("No documentation in {}", source.display());
            return Ok(0);
        }

        let mut copied = 0;
        for entry in fs::read_dir(&source)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name() {
                fs::copy(&path, target.join(name))?;
                copied += 1;
            }
        }
        info!("Staged {} file(s) from {}", copied, source.display());
        Ok(copied)
    }

    /// The files staged for a language, sorted by name.
    pub fn files(&self, language: &str) -> Result<Vec<PathBuf>> {
        list_files(&self.language_dir(language))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: PathBuf, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn clear_empties_the_directory() {
        let dir = TempDir::new().unwrap();
        write(dir.path().join("RU").join("old.pdf"), "old");
        write(dir.path().join("stray.txt"), "stray");

        let area = AttachmentArea::new(dir.path().to_path_buf());
        area.lock().clear();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn clear_tolerates_a_missing_directory() {
        let dir = TempDir::new().unwrap();
        let area = AttachmentArea::new(dir.path().join("absent"));
        area.lock().clear();
    }

    #[test]
    fn stages_one_language() {
        let docs = TempDir::new().unwrap();
        write(docs.path().join("RU").join("guide.pdf"), "ru guide");
        write(docs.path().join("RU").join("notes.pdf"), "ru notes");
        write(docs.path().join("EN").join("guide.pdf"), "en guide");

        let work = TempDir::new().unwrap();
        let area = AttachmentArea::new(work.path().to_path_buf());
        let staging = area.lock();
        staging.clear();
        assert_eq!(staging.stage("ru", docs.path()).unwrap(), 2);

        let files = staging.files("ru").unwrap();
        let names = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["guide.pdf", "notes.pdf"]);
        assert!(staging.files("en").unwrap().is_empty());
    }

    #[test]
    fn missing_documentation_stages_nothing() {
        let docs = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let area = AttachmentArea::new(work.path().to_path_buf());
        let staging = area.lock();
        assert_eq!(staging.stage("en", docs.path()).unwrap(), 0);
        assert!(staging.files("en").unwrap().is_empty());
    }
}
