#![allow(improper_ctypes)]

//! Registers a [`memvfs::Backend`] as a named `sqlite3_vfs` and opens `rusqlite` connections
//! against it.
//!
//! This is the only place in the workspace that speaks raw SQLite C ABI: every other crate
//! talks to `memvfs::Backend` or to `rusqlite::Connection` and knows nothing about
//! `sqlite3_file`/`sqlite3_vfs` layout.

mod io;
mod vfs;

use std::ffi::CString;
use std::os::raw::c_int;
use std::sync::{Arc, Mutex};

use memvfs::Backend;
use once_cell::sync::Lazy;
use parking_lot::Mutex as PLMutex;
use rusqlite::ffi;

pub(crate) struct Registration {
    pub backend: Mutex<Backend>,
    pub name: CString,
}

/// A VFS registered under a unique name, kept alive for as long as connections may still open
/// against it. Dropping this value leaks the registration rather than unregistering it:
/// SQLite has no notion of "this VFS is no longer needed" short of process exit, and tearing
/// one down while a connection still references it is undefined behavior.
pub struct RegisteredVfs {
    name: String,
    registration: Arc<Registration>,
}

impl RegisteredVfs {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `f` against the backend this VFS is fronting. Useful for tests and for the
    /// replication sink to pull frames straight out of memory without going through SQLite.
    pub fn with_backend<R>(&self, f: impl FnOnce(&mut Backend) -> R) -> R {
        let mut backend = self.registration.backend.lock().unwrap();
        f(&mut backend)
    }
}

// Registering the same VFS name twice races with rusqlite opening a connection against a
// half-registered one; a process-wide lock keeps register-then-open atomic.
static REGISTRATION_MUTEX: Lazy<PLMutex<()>> = Lazy::new(|| PLMutex::new(()));

/// Registers a fresh, empty [`Backend`] as the named VFS. Pass `as_default = true` to make it
/// the engine's default VFS for connections that don't name one explicitly.
pub fn register(name: &str, as_default: bool) -> anyhow::Result<RegisteredVfs> {
    let _guard = REGISTRATION_MUTEX.lock();

    let c_name = CString::new(name)?;
    let registration = Arc::new(Registration {
        backend: Mutex::new(Backend::new()),
        name: c_name,
    });

    let app_data = Arc::into_raw(registration.clone()) as *mut std::ffi::c_void;
    let raw_vfs = Box::into_raw(Box::new(vfs::build(registration.name.as_ptr(), app_data)));

    let result = unsafe { ffi::sqlite3_vfs_register(raw_vfs, as_default as c_int) };
    if result != ffi::SQLITE_OK {
        // SAFETY: registration failed, so SQLite never took ownership of either allocation.
        unsafe {
            drop(Box::from_raw(raw_vfs));
            drop(Arc::from_raw(app_data as *const Registration));
        }
        anyhow::bail!("sqlite3_vfs_register failed with code {result}");
    }

    tracing::debug!(vfs = name, "registered in-memory VFS");
    Ok(RegisteredVfs {
        name: name.to_string(),
        registration,
    })
}

/// Opens a `rusqlite` connection against a registered VFS.
pub fn open(vfs: &RegisteredVfs, db_name: &str, flags: rusqlite::OpenFlags) -> anyhow::Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open_with_flags_and_vfs(db_name, flags, vfs.name())?;
    conn.pragma_update(None, "journal_mode", "wal")?;
    Ok(conn)
}

pub(crate) fn registration_from_app_data(app_data: *mut std::ffi::c_void) -> Arc<Registration> {
    // SAFETY: `app_data` is the pointer stashed in `pAppData` by `register`, which always
    // holds one extra `Arc` strong count for exactly this purpose.
    let registration = unsafe { Arc::from_raw(app_data as *const Registration) };
    let cloned = registration.clone();
    std::mem::forget(registration);
    cloned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_twice_with_different_names_both_succeed() {
        let a = register("memvfs-test-a", false).unwrap();
        let b = register("memvfs-test-b", false).unwrap();
        assert_ne!(a.name(), b.name());
    }
}
