//! Crate-wide error taxonomies.
//!
//! Three kinds never mix: CPU [`Trap`]s (see [`crate::cpu`]), in-band syscall
//! failures (see [`Errno`]), and host/emulator setup failures ([`EmuError`])
//! that abort before the first instruction runs.

use thiserror::Error;

/// Linux errno values the syscall shim is allowed to return, per the fixed
/// syscall table. Values match the standard small positive
/// Linux numbers; the shim negates them before writing to `a0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    ENOENT = 2,
    EBADF = 9,
    ENOMEM = 12,
    EACCES = 13,
    EEXIST = 17,
    ENOTDIR = 20,
    EISDIR = 21,
    EINVAL = 22,
    ESPIPE = 29,
    ERANGE = 34,
    ENOSYS = 38,
}

impl Errno {
    pub fn to_negated(self) -> i64 {
        -(self as i64)
    }

    /// Best-effort mapping from a host `std::io::Error` to a guest errno.
    pub fn from_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            NotFound => Errno::ENOENT,
            PermissionDenied => Errno::EACCES,
            AlreadyExists => Errno::EEXIST,
            InvalidInput => Errno::EINVAL,
            _ => match err.raw_os_error() {
                Some(20) => Errno::ENOTDIR,
                Some(21) => Errno::EISDIR,
                _ => Errno::EINVAL,
            },
        }
    }
}

/// Host/emulator failures: ELF malformed, RAM allocation failed, sandbox
/// root unreachable, stdin/stdout/stderr binding failed. These abort the
/// run before the first instruction executes and map to process exit code 2.
#[derive(Debug, Error)]
pub enum EmuError {
    #[error("ELF load error: {0}")]
    Elf(#[from] crate::elf::ElfError),

    #[error("sandbox error: {0}")]
    Sandbox(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
