//! Reading and updating `deposit.properties`.
//!
//! The file is a list of `key = value` lines. Updates rewrite known keys in place and
//! append new ones, keeping comments and unrelated lines as they were.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{IngestError, Result};

pub const PROPERTIES_FILE: &str = "deposit.properties";
pub const UPDATES_DATASET_KEY: &str = "updates-dataset";

#[derive(Debug, Clone, Default)]
pub struct DepositProperties {
    path: PathBuf,
    lines: Vec<String>,
}

impl DepositProperties {
    /// Loads the properties of a deposit directory; a missing file yields an empty set.
    pub fn load(deposit_dir: &Path) -> Result<Self> {
        let path = deposit_dir.join(PROPERTIES_FILE);
        let lines = if path.is_file() {
            fs::read_to_string(&path)
                .map_err(|e| IngestError::io("read properties", &path, e))?
                .lines()
                .map(str::to_string)
                .collect()
        } else {
            Vec::new()
        };
        Ok(Self { path, lines })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines
            .iter()
            .filter_map(|line| split_entry(line))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    pub fn set(&mut self, key: &str, value: &str) {
        let entry = format!("{key} = {value}");
        match self
            .lines
            .iter()
            .position(|line| split_entry(line).is_some_and(|(k, _)| k == key))
        {
            Some(index) => self.lines[index] = entry,
            None => self.lines.push(entry),
        }
    }

    /// Writes the properties back next to the deposit they were loaded from.
    pub fn save(&self) -> Result<()> {
        let mut content = self.lines.join("\n");
        content.push('\n');
        fs::write(&self.path, content)
            .map_err(|e| IngestError::io("write properties", &self.path, e))?;
        debug!(path = %self.path.display(), "Saved deposit properties");
        Ok(())
    }
}

fn split_entry(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
        return None;
    }
    let (key, value) = trimmed.split_once(['=', ':'])?;
    Some((key.trim(), value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_and_rewrites_entries_in_place() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(PROPERTIES_FILE),
            "# created by depositor\nupdates-dataset = doi:10.5072/ABC\nstate.label: SUBMITTED\n",
        )
        .unwrap();

        let mut props = DepositProperties::load(dir.path()).unwrap();
        assert_eq!(props.get(UPDATES_DATASET_KEY), Some("doi:10.5072/ABC"));
        assert_eq!(props.get("state.label"), Some("SUBMITTED"));

        props.set("state.label", "PUBLISHED");
        props.set("identifier.doi", "doi:10.5072/ABC");
        props.save().unwrap();

        let content = fs::read_to_string(dir.path().join(PROPERTIES_FILE)).unwrap();
        assert_eq!(
            content,
            "# created by depositor\nupdates-dataset = doi:10.5072/ABC\nstate.label = PUBLISHED\nidentifier.doi = doi:10.5072/ABC\n"
        );
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let props = DepositProperties::load(dir.path()).unwrap();
        assert_eq!(props.get(UPDATES_DATASET_KEY), None);
    }
}
