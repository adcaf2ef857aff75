//! Guest-path → host-path translation, the only entry point filesystem
//! syscall handlers are allowed to use.

use std::path::{Path, PathBuf};

use crate::error::Errno;

pub struct Sandbox {
    root: PathBuf,
    cwd: String,
}

impl Sandbox {
    pub fn new(root: PathBuf, initial_cwd: &str) -> Self {
        Self { root, cwd: normalize_guest_path(initial_cwd, "/") }
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn set_cwd(&mut self, new_cwd: String) {
        self.cwd = new_cwd;
    }

    /// Resolves a guest path to an absolute guest-space path (component
    /// normalisation only, no host round-trip).
    pub fn resolve_guest(&self, path: &str) -> String {
        if path.starts_with('/') {
            normalize_guest_path(path, "/")
        } else {
            normalize_guest_path(path, &self.cwd)
        }
    }

    /// Resolves a guest path to a host path guaranteed to be a descendant of
    /// the sandbox root, canonicalising symlinks and re-checking the
    /// result. Fails with `EACCES` on any attempted escape.
    pub fn resolve_host(&self, path: &str) -> Result<PathBuf, Errno> {
        let guest_abs = self.resolve_guest(path);
        let host_path = join_guest_onto_root(&self.root, &guest_abs);

        // Canonicalise the deepest existing ancestor, then re-append the
        // remaining (possibly not-yet-existing) components, so creation
        // syscalls (openat O_CREAT, etc.) still get sandbox-checked.
        let mut existing = host_path.clone();
        let mut tail = Vec::new();
        while !existing.exists() {
            match existing.file_name() {
                Some(name) => {
                    tail.push(name.to_owned());
                    existing.pop();
                }
                None => break,
            }
        }
        let canon = existing.canonicalize().unwrap_or(existing);
        let root_canon = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());
        if !canon.starts_with(&root_canon) {
            return Err(Errno::EACCES);
        }
        let mut result = canon;
        for component in tail.into_iter().rev() {
            result.push(component);
        }
        if !result.starts_with(&root_canon) {
            return Err(Errno::EACCES);
        }
        Ok(result)
    }

}

/// Joins a normalised absolute guest path (leading `/`) onto the host root.
fn join_guest_onto_root(root: &Path, guest_abs: &str) -> PathBuf {
    let mut out = root.to_path_buf();
    for comp in guest_abs.split('/').filter(|c| !c.is_empty()) {
        out.push(comp);
    }
    out
}

/// Joins `path` onto `base` (both guest-space) and resolves `.`/`..`,
/// never popping above the guest root `/`.
fn normalize_guest_path(path: &str, base: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    let starting = if path.starts_with('/') { "" } else { base };
    for comp in starting.split('/').chain(path.split('/')) {
        match comp {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            c => stack.push(c),
        }
    }
    format!("/{}", stack.join("/"))
}
