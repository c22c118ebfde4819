//! Path helpers: source directory normalisation, listing cache file names,
//! and never-overwrite alternate names for output files.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use regex::Regex;

use crate::error::Result;

/// Cache file stem used for the filesystem root `/`.
const ROOT_STEM: &str = "-";

/// Normalise a source directory to `/a/b/` form.
///
/// Backslashes become `/`, and a leading and trailing `/` are ensured.
/// Returns `None` for blank input.
pub fn normalize_dir(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut dir = trimmed.replace('\\', "/");
    if !dir.starts_with('/') {
        dir.insert(0, '/');
    }
    if !dir.ends_with('/') {
        dir.push('/');
    }
    Some(dir)
}

/// Normalise a list of directories, dropping blank entries.
pub fn normalize_dirs<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .filter_map(|dir| normalize_dir(dir.as_ref()))
        .collect()
}

/// Local cache file holding the listing of `dir`.
///
/// `/data/ds1/` maps to `<cache_dir>/data/ds1.txt`. The transform is
/// reversible with [`dir_for_cache_file`].
pub fn cache_file_for(cache_dir: &Path, dir: &str) -> PathBuf {
    let stem = dir.trim_matches('/');
    let stem = if stem.is_empty() { ROOT_STEM } else { stem };
    cache_dir.join(format!("{}.txt", stem))
}

/// Inverse of [`cache_file_for`].
pub fn dir_for_cache_file(cache_dir: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(cache_dir).ok()?;
    let text = relative.to_str()?.replace('\\', "/");
    let stem = text.strip_suffix(".txt")?;
    if stem == ROOT_STEM {
        return Some("/".to_string());
    }
    normalize_dir(stem)
}

/// Next free `name (N).ext` sibling of `path`.
///
/// An existing ` (N)` suffix is incremented; numbers already taken on disk
/// are skipped.
pub fn alternate_name(path: &Path) -> PathBuf {
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (mut stem, extension) = match file_name.rfind('.') {
        Some(dot) if dot > 0 => (
            file_name[..dot].to_string(),
            file_name[dot..].to_string(),
        ),
        _ => (file_name.clone(), String::new()),
    };

    let mut version = 0u32;
    if let Ok(re) = Regex::new(r"^(.+?)\s*\((\d+)\)$") {
        if let Some(caps) = re.captures(&stem) {
            version = caps[2].parse().unwrap_or(0);
            stem = caps[1].trim().to_string();
        }
    }

    loop {
        version += 1;
        let candidate = dir.join(format!("{} ({}){}", stem, version, extension));
        if !candidate.exists() {
            return candidate;
        }
    }
}

/// Script file stem built from listing file names: stems joined with `_`,
/// lowercased.
pub fn script_name<P: AsRef<Path>>(files: &[P]) -> String {
    files
        .iter()
        .filter_map(|file| file.as_ref().file_name())
        .map(|name| {
            let name = name.to_string_lossy();
            match name.find('.') {
                Some(dot) if dot > 0 => name[..dot].to_string(),
                _ => name.into_owned(),
            }
        })
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// Create `file` with `content`, retrying once under an alternate name when
/// creation fails.
pub fn write_new_file(file: &Path, content: &[u8]) -> Result<PathBuf> {
    if let Some(parent) = file.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    match create_and_write(file, content) {
        Ok(()) => {
            info!("File {} is saved", file.display());
            Ok(file.to_path_buf())
        }
        Err(e) if is_conflict(&e) => {
            let alternate = alternate_name(file);
            warn!(
                "Cannot create {} ({}), writing {} instead",
                file.display(),
                e,
                alternate.display()
            );
            create_and_write(&alternate, content)?;
            info!("File {} is saved", alternate.display());
            Ok(alternate)
        }
        Err(e) => Err(e.into()),
    }
}

fn create_and_write(file: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut handle = OpenOptions::new().write(true).create_new(true).open(file)?;
    handle.write_all(content)?;
    handle.flush()
}

fn is_conflict(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::AlreadyExists | ErrorKind::PermissionDenied | ErrorKind::IsADirectory
    )
}
