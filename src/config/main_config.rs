//! Loading of the external `Main.config` JSON document.
//!
//! The document is optional. Every failure degrades to an empty mapping, so callers must treat
//! every key as optional.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

/// The file name looked up in every candidate directory.
pub const FILE_NAME: &str = "Main.config";

const UTF8_BOM: char = '\u{feff}';

/// Returns the candidate locations of `Main.config`, in lookup order: the base directory, its
/// parent, and the current working directory.
pub fn candidate_paths(base_dir: &Path) -> Vec<PathBuf> {
    let mut paths = vec![
        base_dir.join(FILE_NAME),
        base_dir.join("..").join(FILE_NAME),
    ];
    match env::current_dir() {
        Ok(cwd) => paths.push(cwd.join(FILE_NAME)),
        Err(err) => warn!("Cannot determine the working directory: {}", err),
    }
    paths
}

/// Loads `Main.config` from the default candidate locations.
pub fn load(base_dir: &Path) -> Map<String, Value> {
    load_from(&candidate_paths(base_dir))
}

/// Reads the first existing candidate. Never fails: read or parse errors are logged and yield an
/// empty mapping, as does the absence of every candidate.
pub fn load_from(candidates: &[PathBuf]) -> Map<String, Value> {
    let path = match candidates.iter().find(|path| path.is_file()) {
        Some(path) => path,
        None => {
            warn!(
                "{} not found in any of {:?}, using an empty configuration",
                FILE_NAME, candidates
            );
            return Map::new();
        }
    };

    match read(path) {
        Ok(config) => {
            info!("Loaded configuration from {}", path.display());
            config
        }
        Err(err) => {
            error!("Error loading config {}: {}", path.display(), err);
            Map::new()
        }
    }
}

fn read(path: &Path) -> Result<Map<String, Value>, String> {
    let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(&text);
    match serde_json::from_str(text).map_err(|e| e.to_string())? {
        Value::Object(map) => Ok(map),
        other => Err(format!("expected a JSON object, found {}", kind_of(&other))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Three candidate directories; only those named in `present` get a config file.
    fn scenario(present: &[usize]) -> (TempDir, Vec<PathBuf>) {
        let root = TempDir::new().unwrap();
        let mut candidates = Vec::new();
        for i in 0..3 {
            let dir = root.path().join(format!("c{}", i));
            fs::create_dir_all(&dir).unwrap();
            let path = dir.join(FILE_NAME);
            if present.contains(&i) {
                fs::write(&path, format!(r#"{{"SOURCE": {}}}"#, i)).unwrap();
            }
            candidates.push(path);
        }
        (root, candidates)
    }

    #[test]
    fn uses_the_only_existing_candidate() {
        for i in 0..3 {
            let (_root, candidates) = scenario(&[i]);
            let config = load_from(&candidates);
            assert_eq!(config["SOURCE"], Value::from(i), "candidate {}", i);
        }
    }

    #[test]
    fn first_existing_candidate_wins() {
        let (_root, candidates) = scenario(&[1, 2]);
        assert_eq!(load_from(&candidates)["SOURCE"], Value::from(1));
    }

    #[test]
    fn missing_file_yields_empty_mapping() {
        let (_root, candidates) = scenario(&[]);
        assert!(load_from(&candidates).is_empty());
        assert!(load_from(&[]).is_empty());
    }

    #[test]
    fn malformed_file_yields_empty_mapping() {
        let (_root, candidates) = scenario(&[]);
        for body in &["{not json", "", "[1, 2]", "\"text\""] {
            fs::write(&candidates[0], body).unwrap();
            assert!(load_from(&candidates).is_empty(), "body {:?}", body);
        }
    }

    #[test]
    fn malformed_first_candidate_does_not_fall_through() {
        let (_root, candidates) = scenario(&[1]);
        fs::write(&candidates[0], "{oops").unwrap();
        assert!(load_from(&candidates).is_empty());
    }

    #[test]
    fn tolerates_byte_order_mark() {
        let (_root, candidates) = scenario(&[]);
        fs::write(&candidates[0], "\u{feff}{\"MAIL_SETTINGS\": {\"PORT\": 587}}").unwrap();
        let config = load_from(&candidates);
        assert_eq!(config["MAIL_SETTINGS"]["PORT"], Value::from(587));
    }

    #[test]
    fn candidates_are_base_parent_and_cwd() {
        let base = Path::new("/srv/app");
        let paths = candidate_paths(base);
        assert_eq!(paths[0], base.join(FILE_NAME));
        assert_eq!(paths[1], base.join("..").join(FILE_NAME));
        assert_eq!(paths[2], env::current_dir().unwrap().join(FILE_NAME));
    }
}
