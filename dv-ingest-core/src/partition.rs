//! Splits a bag's payload into the file sets the pipeline acts on.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::deposit::EditInstructions;
use crate::error::{IngestError, Result};

/// The four disjoint file sets of one bag. Paths are relative to the data directory,
/// with `/` separators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSets {
    /// Logical paths of remote files to delete. Not checked against the data directory.
    pub delete: BTreeSet<String>,
    pub replace: BTreeSet<String>,
    pub add_restricted: BTreeSet<String>,
    pub add_unrestricted: BTreeSet<String>,
}

/// Lists every regular file under `data_dir`, as sorted relative paths.
/// A missing data directory is an empty payload.
pub fn list_data_files(data_dir: &Path) -> Result<BTreeSet<String>> {
    let mut files = BTreeSet::new();
    if !data_dir.exists() {
        return Ok(files);
    }
    for entry in WalkDir::new(data_dir).sort_by_file_name() {
        let entry = entry.map_err(|source| IngestError::Walk {
            path: data_dir.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(data_dir) {
            files.insert(to_relative_string(relative));
        }
    }
    Ok(files)
}

/// Partitions the files of `data_dir` according to the edit instructions.
///
/// Fails with a rejection when an instruction path is not a plain relative path or a
/// replace target is absent from the data directory.
pub fn partition(data_dir: &Path, edit: Option<&EditInstructions>) -> Result<FileSets> {
    let all_files = list_data_files(data_dir)?;
    let Some(edit) = edit else {
        debug!(files = all_files.len(), "No edit instructions, all files unrestricted");
        return Ok(FileSets {
            add_unrestricted: all_files,
            ..FileSets::default()
        });
    };

    for path in edit
        .delete_files
        .iter()
        .chain(&edit.replace_files)
        .chain(&edit.add_restricted_files)
    {
        check_relative(path)?;
    }

    if let Some(missing) = edit
        .replace_files
        .iter()
        .find(|path| !all_files.contains(path.as_str()))
    {
        return Err(IngestError::Rejected(format!(
            "File to replace not found in {}: {missing}",
            data_dir.display()
        )));
    }

    let mut sets = FileSets {
        delete: edit.delete_files.clone(),
        replace: edit.replace_files.clone(),
        ..FileSets::default()
    };
    for file in all_files {
        if sets.replace.contains(&file) {
            continue;
        }
        if edit.add_restricted_files.contains(&file) {
            sets.add_restricted.insert(file);
        } else {
            sets.add_unrestricted.insert(file);
        }
    }
    debug!(
        delete = sets.delete.len(),
        replace = sets.replace.len(),
        add_restricted = sets.add_restricted.len(),
        add_unrestricted = sets.add_unrestricted.len(),
        "Partitioned data files"
    );
    Ok(sets)
}

/// Resolves relative paths against the data directory, in order.
pub fn absolute_paths<'a>(
    data_dir: &'a Path,
    paths: impl IntoIterator<Item = &'a String> + 'a,
) -> impl Iterator<Item = PathBuf> + 'a {
    paths.into_iter().map(move |p| data_dir.join(p))
}

fn check_relative(path: &str) -> Result<()> {
    let candidate = Path::new(path);
    let plain = !path.is_empty()
        && candidate
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if plain {
        Ok(())
    } else {
        Err(IngestError::Rejected(format!(
            "Instruction path must be relative to the data directory: {path}"
        )))
    }
}

fn to_relative_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
