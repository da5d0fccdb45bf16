//! Write-once content store.
//!
//! Files land at `{root}/{subject}/{filename}`. Two rules hold:
//!
//! - a path already handed out during this run is never handed out again;
//!   the next one gets `_1`, `_2`, ... before the extension;
//! - an existing file is never overwritten. Bytes go to a temporary sibling
//!   first and are renamed into place, so an interrupted run never leaves a
//!   half-written file under a final name.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::FilesystemError;
use crate::models::StoredFile;

/// Highest numeric suffix tried before giving up on a name.
pub const MAX_SUFFIX: u32 = 9_999;

/// Split `name` into stem and extension (including the dot).
pub(crate) fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    }
}

/// `stem_N.ext` for `n > 0`, the name itself for `n == 0`.
pub(crate) fn suffixed(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }
    let (stem, ext) = split_extension(name);
    format!("{}_{}{}", stem, n, ext)
}

/// First name in `name, name_1, name_2, ...` for which `taken` is false.
pub(crate) fn first_free(
    dir: &Path,
    name: &str,
    mut taken: impl FnMut(&str) -> bool,
) -> Result<String, FilesystemError> {
    (0..=MAX_SUFFIX)
        .map(|n| suffixed(name, n))
        .find(|candidate| !taken(candidate))
        .ok_or_else(|| FilesystemError::SuffixExhausted {
            path: dir.join(name),
        })
}

/// Turn a subject name into a directory name.
pub fn subject_dir_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | '&' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let capped: String = collapsed.chars().take(80).collect();
    let trimmed = capped.trim_end_matches([' ', '.']).to_string();
    if trimmed.is_empty() {
        "Untitled".to_string()
    } else {
        trimmed
    }
}

#[derive(Debug)]
pub struct ContentStore {
    root: PathBuf,
    claimed: HashMap<PathBuf, HashSet<String>>,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            claimed: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a subject, created on demand.
    pub fn subject_dir(&self, subject: &str) -> Result<PathBuf, FilesystemError> {
        let dir = self.root.join(subject_dir_name(subject));
        fs::create_dir_all(&dir).map_err(|e| FilesystemError::io(&dir, e))?;
        Ok(dir)
    }

    /// Reserve a path for `filename` in `dir` that no earlier claim in this
    /// run has received.
    pub fn claim(&mut self, dir: &Path, filename: &str) -> Result<PathBuf, FilesystemError> {
        let names = self.claimed.entry(dir.to_path_buf()).or_default();
        let free = first_free(dir, filename, |c| names.contains(c))?;
        names.insert(free.clone());
        Ok(dir.join(free))
    }

    /// Give back a claim that was never committed.
    pub fn release(&mut self, path: &Path) {
        if let (Some(dir), Some(name)) = (path.parent(), path.file_name()) {
            if let Some(names) = self.claimed.get_mut(dir) {
                names.remove(&*name.to_string_lossy());
            }
        }
    }

    /// Mark `path` as taken, e.g. after post-processing renamed a file.
    pub fn record(&mut self, path: &Path) {
        if let (Some(dir), Some(name)) = (path.parent(), path.file_name()) {
            self.claimed
                .entry(dir.to_path_buf())
                .or_default()
                .insert(name.to_string_lossy().into_owned());
        }
    }

    /// Claim a name for `filename` in `dir` and write `bytes` there.
    pub fn commit(
        &mut self,
        dir: &Path,
        filename: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, FilesystemError> {
        let path = self.claim(dir, filename)?;
        self.write_claimed(&path, bytes)
    }

    /// Write `bytes` to a path obtained from [`claim`](Self::claim).
    ///
    /// If something appeared at that path in the meantime the next free
    /// suffix is used instead.
    pub fn write_claimed(&mut self, path: &Path, bytes: &[u8]) -> Result<StoredFile, FilesystemError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| FilesystemError::io(dir, e))?;

        let target = if path.exists() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let names = self.claimed.entry(dir.to_path_buf()).or_default();
            let free = first_free(dir, &name, |c| names.contains(c) || dir.join(c).exists())?;
            names.insert(free.clone());
            dir.join(free)
        } else {
            path.to_path_buf()
        };

        let tmp = temp_sibling(&target);
        write_file(&tmp, bytes)?;
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(FilesystemError::io(&target, e));
        }

        Ok(StoredFile {
            path: target,
            size_bytes: bytes.len() as u64,
        })
    }
}

/// `<name>.tmp` next to `path`.
pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), FilesystemError> {
    let mut file = fs::File::create(path).map_err(|e| FilesystemError::io(path, e))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| FilesystemError::io(path, e))
}
