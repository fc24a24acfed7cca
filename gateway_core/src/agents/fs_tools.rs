//! Path-confined, TOCTOU-safe filesystem tools for sub-agents.
//!
//! Every public entry point here runs its actual syscalls on a blocking
//! worker thread (`tokio::task::spawn_blocking`), since none of this is
//! safely expressible as non-blocking I/O, and returns a short string on
//! any failure rather than raising.

use std::ffi::CString;
use std::fs;
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::os::unix::io::FromRawFd;
use std::path::{Path, PathBuf};

const READ_LIMIT: u64 = 1024 * 1024;

/// Owns the single workspace directory all reads/writes must resolve
/// under.
#[derive(Clone)]
pub struct WorkspaceFs {
    root: PathBuf,
}

impl WorkspaceFs {
    /// Build tools confined to `root`. The caller should have already
    /// verified `root` is a directory (the gateway binary does this at
    /// startup and raises [`crate::error::GatewayError::InvalidWorkspace`]
    /// otherwise).
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Read a workspace-confined file, enforcing the 1 MiB size cap and an
    /// lstat/fstat identity check against TOCTOU swaps.
    pub async fn read_file(&self, path: String) -> Result<Vec<u8>, String> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || read_file_sync(&root, &path))
            .await
            .unwrap_or_else(|_| Err("Internal error".to_string()))
    }

    /// Read a workspace-confined file as UTF-8 text, replacing the bytes
    /// error with a short denial string to match the other tool handlers.
    pub async fn read_file_text(&self, path: String) -> Result<String, String> {
        let bytes = self.read_file(path).await?;
        String::from_utf8(bytes).map_err(|_| "denied: not valid UTF-8".to_string())
    }

    /// Atomically write `content` to a workspace-confined file.
    pub async fn write_file(&self, path: String, content: Vec<u8>) -> Result<String, String> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || write_file_sync(&root, &path, &content))
            .await
            .unwrap_or_else(|_| Err("Internal error".to_string()))
    }
}

fn read_file_sync(root: &Path, raw_path: &str) -> Result<Vec<u8>, String> {
    if raw_path.is_empty() {
        return Err("Empty path".to_string());
    }

    let resolved = resolve_within_workspace(root, raw_path)?;

    let pre_stat = fs::symlink_metadata(&resolved).map_err(|_| "denied".to_string())?;
    if pre_stat.file_type().is_symlink() {
        return Err("possible symlink".to_string());
    }
    let pre_identity = (pre_stat.ino(), pre_stat.dev());

    let c_path = CString::new(resolved.as_os_str().as_bytes()).map_err(|_| "denied".to_string())?;
    let flags = libc::O_RDONLY | libc::O_NOFOLLOW | libc::O_NOCTTY;
    let fd = unsafe { libc::open(c_path.as_ptr(), flags) };
    if fd < 0 {
        let err = io::Error::last_os_error();
        return match err.raw_os_error() {
            Some(code) if code == libc::ELOOP => Err("possible symlink".to_string()),
            _ => Err("denied".to_string()),
        };
    }

    // SAFETY: `fd` was just returned by a successful `open(2)` call above
    // and is not used anywhere else.
    let mut file = unsafe { fs::File::from_raw_fd(fd) };

    let post_stat = file.metadata().map_err(|_| "denied".to_string())?;
    if (post_stat.ino(), post_stat.dev()) != pre_identity {
        return Err("TOCTOU detected".to_string());
    }

    if post_stat.len() > READ_LIMIT {
        return Err("too large".to_string());
    }

    let mut buf = Vec::with_capacity(post_stat.len() as usize);
    file.read_to_end(&mut buf).map_err(|_| "denied".to_string())?;
    Ok(buf)
}

fn write_file_sync(root: &Path, raw_path: &str, content: &[u8]) -> Result<String, String> {
    if raw_path.is_empty() {
        return Err("Empty path".to_string());
    }

    let destination = lexical_join(root, raw_path)?;
    let parent = destination.parent().ok_or_else(|| "denied".to_string())?;

    if has_symlink_component(root, raw_path)? {
        return Err("possible symlink".to_string());
    }

    // Pre-stat the destination, if it exists: must be a regular file.
    let pre_identity = match fs::symlink_metadata(&destination) {
        Ok(meta) => {
            if meta.file_type().is_symlink() || !meta.is_file() {
                return Err("symlink detected".to_string());
            }
            Some((meta.ino(), meta.dev()))
        }
        Err(_) => None,
    };

    fs::create_dir_all(parent).map_err(|_| "denied".to_string())?;

    let canonical_root = fs::canonicalize(root).map_err(|_| "denied".to_string())?;
    let canonical_parent = fs::canonicalize(parent).map_err(|_| "denied".to_string())?;
    if !canonical_parent.starts_with(&canonical_root) {
        return Err("denied: outside workspace".to_string());
    }

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|_| "denied".to_string())?;
    temp.write_all(content).map_err(|_| "denied".to_string())?;
    temp.flush().map_err(|_| "denied".to_string())?;

    // Re-check the destination's identity right before the rename.
    match fs::symlink_metadata(&destination) {
        Ok(meta) => {
            if meta.file_type().is_symlink() {
                return Err("symlink detected".to_string());
            }
            if Some((meta.ino(), meta.dev())) != pre_identity {
                return Err("TOCTOU detected".to_string());
            }
        }
        Err(_) if pre_identity.is_some() => {
            return Err("TOCTOU detected".to_string());
        }
        Err(_) => {}
    }

    temp.persist(&destination).map_err(|_| "denied".to_string())?;

    Ok(format!("File {} written successfully.", destination.display()))
}

/// Join `raw_path` onto `root` without touching the filesystem, rejecting
/// `..` components that would escape the workspace lexically. The caller is
/// still responsible for the post-creation canonical-prefix check, which
/// catches symlinked ancestor directories this lexical check cannot see.
fn lexical_join(root: &Path, raw_path: &str) -> Result<PathBuf, String> {
    let mut result = root.to_path_buf();
    for component in Path::new(raw_path).components() {
        use std::path::Component;
        match component {
            Component::Normal(part) => result.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err("denied: outside workspace".to_string()),
            Component::RootDir | Component::Prefix(_) => {
                return Err("denied: outside workspace".to_string())
            }
        }
    }
    Ok(result)
}

fn has_symlink_component(root: &Path, raw_path: &str) -> Result<bool, String> {
    let mut current = root.to_path_buf();
    for component in Path::new(raw_path).components() {
        use std::path::Component;
        if let Component::Normal(part) = component {
            current.push(part);
        }
        if let Ok(meta) = fs::symlink_metadata(&current) {
            if meta.file_type().is_symlink() {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn resolve_within_workspace(root: &Path, raw_path: &str) -> Result<PathBuf, String> {
    let candidate = lexical_join(root, raw_path)?;

    if has_symlink_component(root, raw_path)? {
        return Err("possible symlink".to_string());
    }

    let canonical_root = fs::canonicalize(root).map_err(|_| "denied".to_string())?;
    let canonical = fs::canonicalize(&candidate).map_err(|_| "denied".to_string())?;

    if !canonical.starts_with(&canonical_root) {
        return Err("denied: outside workspace".to_string());
    }

    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    fn workspace() -> (tempfile::TempDir, WorkspaceFs) {
        let dir = tempfile::tempdir().unwrap();
        let fs = WorkspaceFs::new(dir.path().to_path_buf());
        (dir, fs)
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let (_dir, fs) = workspace();
        let result = fs.write_file("a.txt".into(), b"hello".to_vec()).await.unwrap();
        assert!(result.contains("written successfully"));
        let content = fs.read_file_text("a.txt".into()).await.unwrap();
        assert_eq!(content, "hello");
    }

    #[tokio::test]
    async fn empty_path_is_rejected() {
        let (_dir, fs) = workspace();
        assert_eq!(fs.read_file("".into()).await.unwrap_err(), "Empty path");
        assert_eq!(fs.write_file("".into(), vec![]).await.unwrap_err(), "Empty path");
    }

    #[tokio::test]
    async fn traversal_outside_workspace_is_denied() {
        let (_dir, fs) = workspace();
        let result = fs.read_file("../outside.txt".into()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn symlinked_file_is_rejected_for_read() {
        let (dir, fs) = workspace();
        let target = dir.path().join("real.txt");
        std::fs::write(&target, "secret").unwrap();
        let link = dir.path().join("link.txt");
        symlink(&target, &link).unwrap();

        let result = fs.read_file("link.txt".into()).await;
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.contains("symlink"), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn write_to_existing_symlink_destination_is_rejected() {
        let (dir, fs) = workspace();
        let target = dir.path().join("real.txt");
        std::fs::write(&target, "original").unwrap();
        let link = dir.path().join("link.txt");
        symlink(&target, &link).unwrap();

        let result = fs.write_file("link.txt".into(), b"overwritten".to_vec()).await;
        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "original");
    }

    #[tokio::test]
    async fn oversized_read_is_rejected() {
        let (dir, fs) = workspace();
        let big = vec![0u8; READ_LIMIT as usize + 1];
        std::fs::write(dir.path().join("big.bin"), &big).unwrap();
        let result = fs.read_file("big.bin".into()).await;
        assert_eq!(result.unwrap_err(), "too large");
    }
}
