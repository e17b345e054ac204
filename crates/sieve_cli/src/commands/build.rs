//! Build command implementation

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use miette::{IntoDiagnostic, Result, miette};
use sieve_core::{Encoding, Filter, FilterOptions, MaterializeMode};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::cli::{BuildArgs, Cli};
use crate::exec::CommandTransform;

/// Options file picked up from the current directory when `--config` is
/// not given.
const OPTIONS_FILE: &str = ".sieve.json";

/// Runs one pass and writes the destination tree to `--out`.
///
/// Returns `Ok(true)` if the pass failed. Invalid options are returned as
/// errors.
pub fn run_build(cli: &Cli, args: &BuildArgs) -> Result<bool> {
    let options = load_options(cli.config.as_deref(), args)?;
    check_paths(&args.source, &args.out)?;

    let transform = CommandTransform::new(&args.exec, options.encoding == Encoding::Binary);
    let mut filter = Filter::new(args.source.clone(), transform, options).into_diagnostic()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    let failed = match runtime.block_on(filter.build()) {
        Ok(dest) => match write_output(dest, &args.out) {
            Ok(written) => {
                let stats = filter.last_stats().unwrap_or_default();
                println!(
                    "Built {} file(s) into {} ({} transformed, {} cached)",
                    written,
                    args.out.display(),
                    stats.misses,
                    stats.hits
                );
                false
            }
            Err(e) => {
                error!("Failed to write {}: {}", args.out.display(), e);
                true
            }
        },
        Err(e) => {
            error!("Build failed: {}", e);
            true
        }
    };

    if let Err(e) = filter.cleanup() {
        warn!("Failed to remove temporary directories: {}", e);
    }

    Ok(failed)
}

/// Loads the options file, if any, and applies command-line overrides.
///
/// Without `--config`, `.sieve.json` in the current directory is used when
/// present.
fn load_options(config: Option<&Path>, args: &BuildArgs) -> Result<FilterOptions> {
    let path = config.map(Path::to_path_buf).or_else(find_options_file);
    let mut options = match path {
        Some(path) => {
            info!("Using options from {}", path.display());
            FilterOptions::from_file(&path).into_diagnostic()?
        }
        None => FilterOptions::default(),
    };

    if !args.files.is_empty() {
        options = options.with_files(args.files.iter().cloned());
    }
    if !args.exclude.is_empty() {
        options = options.with_exclude(args.exclude.iter().cloned());
    }
    if let Some(ext) = &args.target_extension {
        options = options.with_target_extension(ext.clone());
    }
    if args.binary {
        options = options.with_encoding(Encoding::Binary);
    }
    if args.copy {
        options = options.with_materialize(MaterializeMode::Copy);
    }

    Ok(options)
}

/// Looks for an options file in the current directory.
fn find_options_file() -> Option<PathBuf> {
    let path = PathBuf::from(OPTIONS_FILE);
    path.is_file().then_some(path)
}

/// Rejects an output directory that overlaps the source directory, since
/// replacing its contents would delete sources or feed outputs back in.
fn check_paths(source: &Path, out: &Path) -> Result<()> {
    let source = std::path::absolute(source).into_diagnostic()?;
    let out = std::path::absolute(out).into_diagnostic()?;

    if out.starts_with(&source) || source.starts_with(&out) {
        return Err(miette!(
            "Output directory {} overlaps source directory {}",
            out.display(),
            source.display()
        ));
    }

    Ok(())
}

/// Replaces the contents of `out` with a copy of `dest`. Returns the number
/// of files written.
fn write_output(dest: &Path, out: &Path) -> io::Result<usize> {
    match fs::remove_dir_all(out) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(out)?;

    let mut written = 0;
    for entry in WalkDir::new(dest).min_depth(1) {
        let entry = entry?;
        let rel_path = entry.path().strip_prefix(dest).map_err(io::Error::other)?;
        let target = out.join(rel_path);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            written += 1;
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn args(source: &Path, out: &Path) -> BuildArgs {
        BuildArgs {
            source: source.to_path_buf(),
            out: out.to_path_buf(),
            exec: "cat".to_string(),
            files: Vec::new(),
            exclude: Vec::new(),
            target_extension: None,
            binary: false,
            copy: false,
        }
    }

    #[test]
    fn test_write_output_replaces_contents() {
        let dest = tempdir().unwrap();
        let out = tempdir().unwrap();
        fs::create_dir(dest.path().join("nested")).unwrap();
        fs::write(dest.path().join("nested/a.txt"), "a").unwrap();
        fs::write(dest.path().join("b.txt"), "b").unwrap();
        fs::write(out.path().join("stale.txt"), "old").unwrap();

        let written = write_output(dest.path(), out.path()).unwrap();

        assert_eq!(written, 2);
        assert!(!out.path().join("stale.txt").exists());
        assert_eq!(
            fs::read_to_string(out.path().join("nested/a.txt")).unwrap(),
            "a"
        );
    }

    #[test]
    fn test_write_output_creates_missing_out() {
        let dest = tempdir().unwrap();
        let parent = tempdir().unwrap();
        fs::write(dest.path().join("a.txt"), "a").unwrap();
        let out = parent.path().join("build/out");

        assert_eq!(write_output(dest.path(), &out).unwrap(), 1);
        assert!(out.join("a.txt").is_file());
    }

    #[test]
    fn test_check_paths_rejects_nested_out() {
        let src = tempdir().unwrap();
        assert!(check_paths(src.path(), &src.path().join("dist")).is_err());
        assert!(check_paths(&src.path().join("lib"), src.path()).is_err());
    }

    #[test]
    fn test_check_paths_accepts_siblings() {
        let root = tempdir().unwrap();
        assert!(check_paths(&root.path().join("src"), &root.path().join("dist")).is_ok());
    }

    #[test]
    fn test_flags_override_options_file() {
        let dir = tempdir().unwrap();
        let config = dir.path().join(".sieve.json");
        fs::write(
            &config,
            r#"{ "files": ["**/*.md"], "targetExtension": "html", "materialize": "link" }"#,
        )
        .unwrap();

        let mut build = args(dir.path(), &dir.path().join("out"));
        build.target_extension = Some("txt".to_string());
        build.copy = true;

        let options = load_options(Some(&config), &build).unwrap();

        assert_eq!(options.files, vec!["**/*.md".to_string()]);
        assert_eq!(options.target_extension.as_deref(), Some("txt"));
        assert_eq!(options.materialize, MaterializeMode::Copy);
        assert_eq!(options.encoding, Encoding::Utf8);
    }

    #[test]
    fn test_invalid_options_file_is_error() {
        let dir = tempdir().unwrap();
        let config = dir.path().join(".sieve.json");
        fs::write(&config, r#"{ "unknownKey": true }"#).unwrap();

        let build = args(dir.path(), &dir.path().join("out"));
        assert!(load_options(Some(&config), &build).is_err());
    }
}
