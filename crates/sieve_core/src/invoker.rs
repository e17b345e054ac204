//! Runs the transform for a stale file and stages its outputs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use sieve_cache::StagedOutputs;
use tracing::debug;

use crate::naming::{normalize_output_path, single_output_path};
use crate::{Content, Encoding, FilterError, FilterOptions, Transform, TransformOutput};

/// Reads the source file, invokes the transform and stages the normalized
/// outputs under `cache_root`. Nothing becomes visible in the cache until
/// the returned outputs are committed.
pub(crate) async fn invoke<T: Transform>(
    transform: &T,
    options: &FilterOptions,
    src_dir: &Path,
    rel_path: &Path,
    cache_root: &Path,
) -> Result<StagedOutputs, FilterError> {
    let content = read_content(&src_dir.join(rel_path), options.encoding).await?;

    let output = transform
        .transform(content, rel_path, src_dir)
        .await
        .map_err(|source| FilterError::Transform {
            path: rel_path.to_path_buf(),
            source,
        })?;

    let outputs = normalize(output, rel_path, options)?;
    debug!("{} produced {} output(s)", rel_path.display(), outputs.len());

    let root = cache_root.to_path_buf();
    tokio::task::spawn_blocking(move || StagedOutputs::stage(&root, outputs))
        .await
        .map_err(|e| FilterError::Internal(format!("Staging task failed: {}", e)))?
        .map_err(FilterError::from)
}

async fn read_content(path: &Path, encoding: Encoding) -> Result<Content, FilterError> {
    match encoding {
        Encoding::Utf8 => tokio::fs::read_to_string(path).await.map(Content::Text),
        Encoding::Binary => tokio::fs::read(path).await.map(Content::Bytes),
    }
    .map_err(|e| FilterError::io(path, e))
}

/// Maps a transform result to `(output path, bytes)` pairs.
///
/// Every path is normalized and checked to stay inside the output tree, and
/// a result may not name the same output twice.
pub(crate) fn normalize(
    output: TransformOutput,
    rel_path: &Path,
    options: &FilterOptions,
) -> Result<Vec<(PathBuf, Vec<u8>)>, FilterError> {
    let raw = match output {
        TransformOutput::Single(content) => {
            vec![(single_output_path(options, rel_path), content)]
        }
        TransformOutput::Multi(files) => files
            .into_iter()
            .map(|file| (file.path, file.content))
            .collect(),
    };

    let mut seen = HashSet::with_capacity(raw.len());
    let mut outputs = Vec::with_capacity(raw.len());
    for (path, content) in raw {
        let normalized =
            normalize_output_path(&path).ok_or_else(|| FilterError::InvalidOutputPath {
                source_path: rel_path.to_path_buf(),
                output: path.clone(),
            })?;

        if !seen.insert(normalized.clone()) {
            return Err(FilterError::OutputCollision {
                output: normalized,
                first: rel_path.to_path_buf(),
                second: rel_path.to_path_buf(),
            });
        }

        outputs.push((normalized, content.into_bytes()));
    }

    Ok(outputs)
}
