//! Global puzzle-identifier registry.
//!
//! Built once over every source directory before any chunk is written, then
//! treated as read-only by all downstream stages. Ids are assigned in
//! first-seen order starting at 1; id 0 is reserved for "blank" and renders
//! as [`BLANK_IDENTIFIER`] in the persisted list.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::{info, warn};

use crate::puzzle::{declared_name, discover_puzzle_files};
use crate::BLANK_IDENTIFIER;

#[derive(Clone, Debug, Default)]
pub struct IdentifierRegistry {
    map: HashMap<String, i32>,
    names: Vec<String>,
}

impl IdentifierRegistry {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            names: vec![BLANK_IDENTIFIER.to_string()],
        }
    }

    /// Scan directories in the given order, files in sorted order within
    /// each, assigning ids first-seen. Missing directories and malformed
    /// files are skipped with a warning.
    pub fn build<P: AsRef<Path>>(dirs: &[P]) -> Self {
        let mut registry = Self::new();
        for dir in dirs {
            let dir = dir.as_ref();
            if !dir.is_dir() {
                warn!(
                    "identifier scan: directory {} not found, skipping",
                    dir.display()
                );
                continue;
            }
            for file in discover_puzzle_files(dir) {
                match declared_name(&file) {
                    Ok(name) => {
                        registry.insert(name);
                    }
                    Err(err) => warn!("identifier scan: skipping {}: {err}", file.display()),
                }
            }
        }
        info!(
            "identifier registry holds {} names ({} ids including blank)",
            registry.names.len() - 1,
            registry.names.len()
        );
        registry
    }

    fn insert(&mut self, name: String) -> i32 {
        if let Some(&id) = self.map.get(&name) {
            return id;
        }
        let id = self.names.len() as i32;
        self.names.push(name.clone());
        self.map.insert(name, id);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<i32> {
        self.map.get(name).copied()
    }

    /// Number of ids including the blank sentinel; this is the
    /// `num_puzzle_identifiers` every metadata record carries.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.len() <= 1
    }

    /// Names indexed by id; index 0 is the blank sentinel.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Persist as a JSON list indexed by id.
    pub fn write(&self, path: &Path, overwrite: bool) -> Result<()> {
        if path.exists() && !overwrite {
            bail!(
                "identifier map {} already exists (use overwrite option)",
                path.display()
            );
        }
        let json = serde_json::to_string(&self.names)?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Load the persisted id-ordered name list.
    pub fn load_names(path: &Path) -> Result<Vec<String>> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let names: Vec<String> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        if names.first().map(String::as_str) != Some(BLANK_IDENTIFIER) {
            bail!(
                "{} does not start with the blank sentinel",
                path.display()
            );
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_puzzle(dir: &Path, file: &str, name: Option<&str>) {
        let mut json = serde_json::json!({
            "train": [{"input": [[1]], "output": [[2]]}],
        });
        if let Some(n) = name {
            json["name"] = serde_json::json!(n);
        }
        fs::write(dir.join(file), serde_json::to_string(&json).unwrap()).unwrap();
    }

    #[test]
    fn assigns_ids_in_first_seen_order_with_blank_at_zero() {
        let dir = tempdir().unwrap();
        write_puzzle(dir.path(), "beta.json", None);
        write_puzzle(dir.path(), "alpha.json", None);

        let registry = IdentifierRegistry::build(&[dir.path()]);
        assert_eq!(registry.names()[0], BLANK_IDENTIFIER);
        // files scan in sorted order: alpha before beta
        assert_eq!(registry.lookup("alpha"), Some(1));
        assert_eq!(registry.lookup("beta"), Some(2));
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.lookup("missing"), None);
    }

    #[test]
    fn superset_of_directories_preserves_existing_ids() {
        let dir_a = tempdir().unwrap();
        let dir_b = tempdir().unwrap();
        write_puzzle(dir_a.path(), "one.json", None);
        write_puzzle(dir_a.path(), "two.json", None);
        write_puzzle(dir_b.path(), "three.json", None);

        let small = IdentifierRegistry::build(&[dir_a.path()]);
        let large = IdentifierRegistry::build(&[dir_a.path(), dir_b.path()]);
        for name in ["one", "two"] {
            assert_eq!(small.lookup(name), large.lookup(name));
        }
        assert_eq!(large.lookup("three"), Some(3));
    }

    #[test]
    fn duplicate_names_share_one_id() {
        let dir = tempdir().unwrap();
        write_puzzle(dir.path(), "a.json", Some("shared"));
        write_puzzle(dir.path(), "b.json", Some("shared"));

        let registry = IdentifierRegistry::build(&[dir.path()]);
        assert_eq!(registry.lookup("shared"), Some(1));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn missing_directory_is_skipped() {
        let dir = tempdir().unwrap();
        write_puzzle(dir.path(), "a.json", None);
        let missing = dir.path().join("nope");

        let registry = IdentifierRegistry::build(&[dir.path(), missing.as_path()]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = tempdir().unwrap();
        write_puzzle(dir.path(), "a.json", None);
        let registry = IdentifierRegistry::build(&[dir.path()]);

        let path = dir.path().join("identifiers.json");
        registry.write(&path, false).unwrap();
        assert!(registry.write(&path, false).is_err(), "overwrite gate");
        registry.write(&path, true).unwrap();

        let names = IdentifierRegistry::load_names(&path).unwrap();
        assert_eq!(names, registry.names());
    }
}
