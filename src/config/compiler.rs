//! Compiles validated [`Token`]s into a tracked-file set and a path cache (§4.2).
//!
//! Two independent walks run per `D`/`IF` directive: one honoring [`ExcludePolicy`] to build
//! the tracked-file set that gets pushed into the kernel hash, and a second, exclusion-unaware
//! walk that populates the [`PathCache`] so every reachable object (even excluded ones) can
//! still have its path reconstructed when an ancestor event needs it.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use log::warn;
use thiserror::Error;
use walkdir::WalkDir;

use crate::filekey::FileKey;
use crate::filter::FilterList;
use crate::path_cache::PathCache;

use super::token::{Command, Token};

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("compiled policy tracks zero files; check your config's D/IF directives")]
    Empty,
}

/// A single-byte presence marker: the kernel tracked-file hash only cares whether a key exists.
pub type TrackedFileValue = u8;

/// Directory/extension/suffix exclusions compiled from `E`/`EE`/`ES` directives.
#[derive(Debug, Clone, Default)]
pub struct ExcludePolicy {
    pub dirs: HashSet<FileKey>,
    pub extensions: HashSet<String>,
    pub suffixes: Vec<String>,
}

pub struct CompiledPolicy {
    pub tracked: HashMap<FileKey, TrackedFileValue>,
    pub path_cache: PathCache,
    pub filters: FilterList,
}

/// Builds the exclude policy from `E`/`EE`/`ES` tokens.
///
/// An `E` directory that fails to `stat` (already gone, permission denied) is logged and
/// skipped rather than failing the whole compile: an exclusion that can't be resolved just
/// excludes nothing.
fn build_exclude_policy(tokens: &[Token]) -> ExcludePolicy {
    let mut policy = ExcludePolicy::default();
    for token in tokens {
        match token.command {
            Command::ExcludeDir => match FileKey::stat(Path::new(&token.argument)) {
                Ok(key) => {
                    policy.dirs.insert(key);
                }
                Err(err) => {
                    warn!(
                        "line {}: cannot exclude '{}': {}",
                        token.line, token.argument, err
                    );
                }
            },
            Command::ExcludeExt => {
                policy.extensions.insert(token.argument.clone());
            }
            Command::ExcludeSuffix => {
                policy.suffixes.push(token.argument.clone());
            }
            Command::IncludeDir | Command::IncludeFile => {}
        }
    }
    policy
}

fn is_excluded(key: FileKey, basename: &str, exclude: &ExcludePolicy) -> bool {
    if exclude.dirs.contains(&key) {
        return true;
    }
    let ext = Path::new(basename)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()));
    if let Some(ext) = ext {
        if exclude.extensions.contains(&ext) {
            return true;
        }
    }
    exclude.suffixes.iter().any(|s| basename.ends_with(s.as_str()))
}

/// Walks `root`, inserting every non-excluded reachable object into `tracked`.
///
/// Exclusion is evaluated per entry (directories included), and `filter_entry` stops recursion
/// the moment a directory matches, so excluded subtrees are never descended into. Entries whose
/// `stat` fails (gone between directory read and this walk, permission denied) are logged and
/// skipped; they don't abort the walk.
fn walk_tracked(root: &str, exclude: &ExcludePolicy, tracked: &mut HashMap<FileKey, TrackedFileValue>) {
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        let basename = entry.file_name().to_string_lossy();
        match FileKey::stat(entry.path()) {
            Ok(key) => !is_excluded(key, &basename, exclude),
            Err(_) => true,
        }
    });
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                warn!("walk error under '{}': {}", root, err);
                continue;
            }
        };
        let key = match FileKey::stat(entry.path()) {
            Ok(key) => key,
            Err(err) => {
                warn!("cannot stat '{}': {}", entry.path().display(), err);
                continue;
            }
        };
        tracked.entry(key).or_insert(1);
    }
}

/// Second, exclusion-unaware walk of `root` that populates `path_cache` for every reachable
/// object, matching `preprocess.buildCache` in the original implementation.
fn walk_path_cache(root: &str, path_cache: &mut PathCache) {
    let mut stack: Vec<FileKey> = vec![FileKey::ROOT];
    for entry in WalkDir::new(root).into_iter() {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                warn!("walk error under '{}': {}", root, err);
                continue;
            }
        };
        let depth = entry.depth();
        let key = match FileKey::stat(entry.path()) {
            Ok(key) => key,
            Err(err) => {
                warn!("cannot stat '{}': {}", entry.path().display(), err);
                continue;
            }
        };
        let basename = if depth == 0 {
            root.to_owned()
        } else {
            entry.file_name().to_string_lossy().into_owned()
        };
        let parent = stack.get(depth).copied().unwrap_or(FileKey::ROOT);
        path_cache.put(key, parent, basename);

        if entry.file_type().is_dir() {
            if stack.len() > depth + 1 {
                stack.truncate(depth + 1);
            }
            stack.push(key);
        }
    }
}

/// Inserts a single file unconditionally (`IF` directives aren't subject to exclusion).
fn include_file(
    path: &str,
    tracked: &mut HashMap<FileKey, TrackedFileValue>,
    path_cache: &mut PathCache,
) {
    let key = match FileKey::stat(Path::new(path)) {
        Ok(key) => key,
        Err(err) => {
            warn!("cannot stat included file '{}': {}", path, err);
            return;
        }
    };
    tracked.entry(key).or_insert(1);

    let p = Path::new(path);
    let basename = p
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_owned());
    let parent = p
        .parent()
        .and_then(|parent| FileKey::stat(parent).ok())
        .unwrap_or(FileKey::ROOT);
    path_cache.put(key, parent, basename);
}

pub fn compile(tokens: &[Token]) -> Result<CompiledPolicy, PolicyError> {
    let exclude = build_exclude_policy(tokens);
    let mut tracked = HashMap::new();
    let mut path_cache = PathCache::new();

    for token in tokens {
        match token.command {
            Command::IncludeDir => walk_tracked(&token.argument, &exclude, &mut tracked),
            Command::IncludeFile => include_file(&token.argument, &mut tracked, &mut path_cache),
            Command::ExcludeDir | Command::ExcludeExt | Command::ExcludeSuffix => {}
        }
    }
    for token in tokens {
        if token.command == Command::IncludeDir {
            walk_path_cache(&token.argument, &mut path_cache);
        }
    }

    if tracked.is_empty() {
        return Err(PolicyError::Empty);
    }

    let filters = FilterList {
        ignored_extensions: exclude.extensions.clone(),
        ignored_suffixes: exclude.suffixes.clone(),
    };

    Ok(CompiledPolicy {
        tracked,
        path_cache,
        filters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn token(command: Command, argument: &str) -> Token {
        Token {
            line: 1,
            command,
            argument: argument.to_owned(),
        }
    }

    #[test]
    fn compiles_tracked_set_for_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"hi").unwrap();

        let tokens = vec![token(Command::IncludeDir, dir.path().to_str().unwrap())];
        let compiled = compile(&tokens).unwrap();

        // root dir + a.txt + sub + sub/b.txt
        assert_eq!(compiled.tracked.len(), 4);
    }

    #[test]
    fn excludes_directory_subtree() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("skip")).unwrap();
        fs::write(dir.path().join("skip/b.txt"), b"hi").unwrap();
        fs::write(dir.path().join("a.txt"), b"hi").unwrap();

        let tokens = vec![
            token(Command::ExcludeDir, dir.path().join("skip").to_str().unwrap()),
            token(Command::IncludeDir, dir.path().to_str().unwrap()),
        ];
        let compiled = compile(&tokens).unwrap();

        for key in compiled.tracked.keys() {
            let entry = compiled.path_cache.get(key);
            if let Some(entry) = entry {
                assert_ne!(entry.basename, "b.txt");
            }
        }
        // root dir + a.txt only (skip/ and skip/b.txt excluded)
        assert_eq!(compiled.tracked.len(), 2);
    }

    #[test]
    fn excludes_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.log"), b"hi").unwrap();
        fs::write(dir.path().join("a.txt"), b"hi").unwrap();

        let tokens = vec![
            token(Command::ExcludeExt, ".log"),
            token(Command::IncludeDir, dir.path().to_str().unwrap()),
        ];
        let compiled = compile(&tokens).unwrap();
        // root dir + a.txt (a.log excluded)
        assert_eq!(compiled.tracked.len(), 2);
    }

    #[test]
    fn include_file_bypasses_exclusion() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.log");
        fs::write(&file, b"hi").unwrap();

        let tokens = vec![
            token(Command::ExcludeExt, ".log"),
            token(Command::IncludeFile, file.to_str().unwrap()),
        ];
        let compiled = compile(&tokens).unwrap();
        assert_eq!(compiled.tracked.len(), 1);
    }

    #[test]
    fn empty_policy_is_an_error() {
        let tokens: Vec<Token> = vec![];
        assert!(matches!(compile(&tokens), Err(PolicyError::Empty)));
    }

    #[test]
    fn path_cache_covers_excluded_entries_too() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("skip")).unwrap();
        fs::write(dir.path().join("skip/b.txt"), b"hi").unwrap();

        let tokens = vec![
            token(Command::ExcludeDir, dir.path().join("skip").to_str().unwrap()),
            token(Command::IncludeDir, dir.path().to_str().unwrap()),
        ];
        let compiled = compile(&tokens).unwrap();

        let skip_key = FileKey::stat(&dir.path().join("skip")).unwrap();
        assert!(compiled.path_cache.contains(&skip_key));
    }
}
