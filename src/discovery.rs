use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use log::warn;
use walkdir::WalkDir;

use crate::error::Result;

pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Every PDF under `root`, recursively, in traversal order.
///
/// `skip` prunes one subtree (an output directory nested in the input),
/// matched by resolved location rather than spelling. Unreadable entries
/// below the root are logged and skipped; an unreadable root is an error.
pub fn find_pdfs(root: &Path, skip: Option<&Path>) -> Result<Vec<PathBuf>> {
    let skip = skip.map(resolve_dir).transpose()?;
    let mut found = Vec::new();
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        let Some(skip) = &skip else { return true };
        !entry.file_type().is_dir()
            || entry
                .path()
                .canonicalize()
                .map_or(true, |resolved| &resolved != skip)
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() && is_pdf(entry.path()) {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

/// PDFs directly inside `dir`, sorted by file name.
pub fn list_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && is_pdf(&path) {
            found.push(path);
        }
    }
    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(found)
}

/// Absolute form of `path` with symlinks, `.` and `..` resolved. Trailing
/// components that do not exist yet are appended to the deepest existing
/// ancestor, so an output directory can be compared before it is created.
pub fn resolve_dir(path: &Path) -> io::Result<PathBuf> {
    let mut base = path.to_path_buf();
    let mut missing: Vec<OsString> = Vec::new();
    loop {
        match base.canonicalize() {
            Ok(mut resolved) => {
                for part in missing.iter().rev() {
                    if part == ".." {
                        resolved.pop();
                    } else {
                        resolved.push(part);
                    }
                }
                return Ok(resolved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                match base.components().next_back() {
                    Some(Component::Normal(part)) => missing.push(part.to_os_string()),
                    Some(Component::ParentDir) => missing.push(OsString::from("..")),
                    _ => return Err(e),
                }
                base.pop();
                if base.as_os_str().is_empty() {
                    base = PathBuf::from(".");
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// `source` with the `input_dir` prefix swapped for `output_dir`.
pub fn mirrored_path(input_dir: &Path, output_dir: &Path, source: &Path) -> Option<PathBuf> {
    source
        .strip_prefix(input_dir)
        .ok()
        .map(|relative| output_dir.join(relative))
}
