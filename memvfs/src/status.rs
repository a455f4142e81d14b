//! The core's error taxonomy, mapped to the engine's expected status-code flavors.
//!
//! `memvfs` never talks raw SQLite return codes directly: that translation lives in
//! `sqld-libsql-bindings`, which is the only place that needs to know what a `c_int` means.
//! Keeping the boundary here means the core stays usable outside of a SQLite embedding.

use std::fmt;

/// Errno-flavored status returned by every fallible `memvfs` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Status {
    #[error("not found")]
    NotFound,
    #[error("cannot open")]
    CantOpen,
    #[error("busy")]
    Busy,
    #[error("corruption")]
    Corrupt,
    #[error("read I/O error")]
    IoErrRead,
    #[error("write I/O error")]
    IoErrWrite,
    #[error("truncate I/O error")]
    IoErrTruncate,
    #[error("fsync I/O error")]
    IoErrFsync,
    #[error("delete I/O error")]
    IoErrDelete,
    #[error("protocol error")]
    Protocol,
    #[error("out of memory")]
    NoMemory,
}

/// A read that returned fewer bytes than requested and zero-filled the remainder.
///
/// This is not an error: the engine expects short reads on sparse/empty files and relies on
/// the zero-fill, but it still wants to know that the read was short so it can distinguish
/// "legitimately empty" from "read past what was written".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortRead;

pub type Result<T> = std::result::Result<T, Status>;

impl fmt::Display for ShortRead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("short read")
    }
}
