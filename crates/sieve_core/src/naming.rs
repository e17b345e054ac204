//! Output naming rules.

use std::path::{Component, Path, PathBuf};

use crate::FilterOptions;

/// Output path of a single-output result for the source file at `rel_path`.
///
/// Priority: `change_file_name`, then `target_extension`, then `rel_path`.
pub(crate) fn single_output_path(options: &FilterOptions, rel_path: &Path) -> PathBuf {
    if let Some(rename) = &options.change_file_name {
        return rename(rel_path);
    }

    if let Some(ext) = &options.target_extension {
        return rel_path.with_extension(ext.trim_start_matches('.'));
    }

    rel_path.to_path_buf()
}

/// Normalizes an output path, rejecting anything that could escape the
/// output tree. `.` components are dropped.
pub(crate) fn normalize_output_path(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if normalized.as_os_str().is_empty() {
        None
    } else {
        Some(normalized)
    }
}
