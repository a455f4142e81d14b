//! `sqlite3_io_methods` callbacks: everything the engine does to a file once `xOpen` has
//! handed it an `sqlite3_file*`.

use std::os::raw::{c_char, c_int, c_void};
use std::sync::Arc;

use memvfs::{FileControl, FileControlOutcome, FileHandle, LockDirection, LockMode, ReadOutcome, Status};
use rusqlite::ffi;

use crate::Registration;

/// Layout must start with `base: sqlite3_file` — SQLite casts an `sqlite3_file*` straight to
/// `MemFile*` and back, so the base struct has to sit at offset 0.
#[repr(C)]
pub(crate) struct MemFile {
    base: ffi::sqlite3_file,
    registration: Arc<Registration>,
    handle: Option<FileHandle>,
}

impl MemFile {
    pub(crate) fn new(registration: Arc<Registration>, handle: FileHandle) -> Self {
        MemFile {
            base: ffi::sqlite3_file { pMethods: std::ptr::null() },
            registration,
            handle: Some(handle),
        }
    }
}

fn status_to_rc(status: Status) -> c_int {
    match status {
        Status::NotFound => ffi::SQLITE_CANTOPEN,
        Status::CantOpen => ffi::SQLITE_CANTOPEN,
        Status::Busy => ffi::SQLITE_BUSY,
        Status::Corrupt => ffi::SQLITE_CORRUPT,
        Status::IoErrRead => ffi::SQLITE_IOERR_READ,
        Status::IoErrWrite => ffi::SQLITE_IOERR_WRITE,
        Status::IoErrTruncate => ffi::SQLITE_IOERR_TRUNCATE,
        Status::IoErrFsync => ffi::SQLITE_IOERR_FSYNC,
        Status::IoErrDelete => ffi::SQLITE_IOERR_DELETE,
        Status::Protocol => ffi::SQLITE_PROTOCOL,
        Status::NoMemory => ffi::SQLITE_NOMEM,
    }
}

unsafe fn file_mut<'a>(p: *mut ffi::sqlite3_file) -> &'a mut MemFile {
    &mut *(p as *mut MemFile)
}

pub(crate) unsafe extern "C" fn close(p: *mut ffi::sqlite3_file) -> c_int {
    // SQLite owns and frees the `sqlite3_file` allocation itself; we only need to run the
    // `MemFile`'s destructors (drop the `Arc<Registration>`, hand the handle back), not free
    // the backing memory, so `ptr::read` rather than `Box::from_raw`.
    let file = std::ptr::read(p as *mut MemFile);
    let mut backend = file.registration.backend.lock().unwrap();
    match file.handle {
        Some(handle) => match backend.close(handle) {
            Ok(()) => ffi::SQLITE_OK,
            Err(status) => status_to_rc(status),
        },
        None => ffi::SQLITE_OK,
    }
}

pub(crate) unsafe extern "C" fn read(
    p: *mut ffi::sqlite3_file,
    buf: *mut c_void,
    amount: c_int,
    offset: ffi::sqlite3_int64,
) -> c_int {
    let file = file_mut(p);
    let handle = file.handle.as_ref().expect("file not closed");
    let slice = std::slice::from_raw_parts_mut(buf as *mut u8, amount as usize);
    let mut backend = file.registration.backend.lock().unwrap();
    match backend.read(handle, slice, offset as u64) {
        Ok(ReadOutcome::Full) => ffi::SQLITE_OK,
        Ok(ReadOutcome::Short) => ffi::SQLITE_IOERR_SHORT_READ,
        Err(status) => status_to_rc(status),
    }
}

pub(crate) unsafe extern "C" fn write(
    p: *mut ffi::sqlite3_file,
    buf: *const c_void,
    amount: c_int,
    offset: ffi::sqlite3_int64,
) -> c_int {
    let file = file_mut(p);
    let handle = file.handle.as_ref().expect("file not closed");
    let slice = std::slice::from_raw_parts(buf as *const u8, amount as usize);
    let mut backend = file.registration.backend.lock().unwrap();
    match backend.write(handle, slice, offset as u64) {
        Ok(()) => ffi::SQLITE_OK,
        Err(status) => status_to_rc(status),
    }
}

pub(crate) unsafe extern "C" fn truncate(p: *mut ffi::sqlite3_file, size: ffi::sqlite3_int64) -> c_int {
    let file = file_mut(p);
    let handle = file.handle.as_ref().expect("file not closed");
    let mut backend = file.registration.backend.lock().unwrap();
    match backend.truncate(handle, size as u64) {
        Ok(()) => ffi::SQLITE_OK,
        Err(status) => status_to_rc(status),
    }
}

pub(crate) unsafe extern "C" fn sync(p: *mut ffi::sqlite3_file, _flags: c_int) -> c_int {
    let file = file_mut(p);
    let handle = file.handle.as_ref().expect("file not closed");
    let backend = file.registration.backend.lock().unwrap();
    match backend.sync(handle) {
        Ok(()) => ffi::SQLITE_OK,
        Err(status) => status_to_rc(status),
    }
}

pub(crate) unsafe extern "C" fn file_size(p: *mut ffi::sqlite3_file, out: *mut ffi::sqlite3_int64) -> c_int {
    let file = file_mut(p);
    let handle = file.handle.as_ref().expect("file not closed");
    let backend = file.registration.backend.lock().unwrap();
    match backend.file_size(handle) {
        Ok(size) => {
            *out = size as ffi::sqlite3_int64;
            ffi::SQLITE_OK
        }
        Err(status) => status_to_rc(status),
    }
}

pub(crate) unsafe extern "C" fn lock(p: *mut ffi::sqlite3_file, _level: c_int) -> c_int {
    let file = file_mut(p);
    let handle = file.handle.as_ref().expect("file not closed");
    let backend = file.registration.backend.lock().unwrap();
    match backend.file_lock(handle) {
        Ok(()) => ffi::SQLITE_OK,
        Err(status) => status_to_rc(status),
    }
}

pub(crate) unsafe extern "C" fn unlock(p: *mut ffi::sqlite3_file, _level: c_int) -> c_int {
    let file = file_mut(p);
    let handle = file.handle.as_ref().expect("file not closed");
    let backend = file.registration.backend.lock().unwrap();
    match backend.file_unlock(handle) {
        Ok(()) => ffi::SQLITE_OK,
        Err(status) => status_to_rc(status),
    }
}

pub(crate) unsafe extern "C" fn check_reserved_lock(p: *mut ffi::sqlite3_file, out: *mut c_int) -> c_int {
    let file = file_mut(p);
    let handle = file.handle.as_ref().expect("file not closed");
    let backend = file.registration.backend.lock().unwrap();
    *out = backend.check_reserved_lock(handle) as c_int;
    ffi::SQLITE_OK
}

pub(crate) unsafe extern "C" fn file_control(p: *mut ffi::sqlite3_file, op: c_int, arg: *mut c_void) -> c_int {
    let file = file_mut(p);
    let name = match file.handle.as_ref().and_then(FileHandle::name) {
        Some(name) => name.to_string(),
        None => return ffi::SQLITE_NOTFOUND,
    };

    let request = match op {
        ffi::SQLITE_FCNTL_PRAGMA => {
            let args = arg as *mut *mut c_char;
            let pragma = std::ffi::CStr::from_ptr(*args.offset(1)).to_string_lossy();
            let value = if (*args.offset(2)).is_null() {
                None
            } else {
                Some(std::ffi::CStr::from_ptr(*args.offset(2)).to_string_lossy().to_string())
            };
            match (pragma.as_ref(), value) {
                ("page_size", Some(v)) => v.parse::<u32>().ok().map(FileControl::PageSize),
                ("journal_mode", Some(v)) => Some(FileControl::JournalMode(v)),
                _ => Some(FileControl::Other),
            }
        }
        _ => Some(FileControl::Other),
    };

    let Some(request) = request else {
        return ffi::SQLITE_NOTFOUND;
    };

    let mut backend = file.registration.backend.lock().unwrap();
    match backend.file_control(&name, &request) {
        Ok(FileControlOutcome::NotFound) => ffi::SQLITE_NOTFOUND,
        Ok(FileControlOutcome::Refused) => ffi::SQLITE_ERROR,
        Err(status) => status_to_rc(status),
    }
}

pub(crate) unsafe extern "C" fn sector_size(_p: *mut ffi::sqlite3_file) -> c_int {
    0
}

pub(crate) unsafe extern "C" fn device_characteristics(_p: *mut ffi::sqlite3_file) -> c_int {
    0
}

pub(crate) unsafe extern "C" fn shm_map(
    p: *mut ffi::sqlite3_file,
    region: c_int,
    region_size: c_int,
    extend: c_int,
    out: *mut *mut c_void,
) -> c_int {
    let file = file_mut(p);
    let name = file.handle.as_ref().and_then(FileHandle::name).expect("shm on named file");
    let mut backend = file.registration.backend.lock().unwrap();
    match backend.shm_map(name, region as usize, region_size as usize, extend != 0) {
        Ok(Some(slice)) => {
            *out = slice.as_mut_ptr() as *mut c_void;
            ffi::SQLITE_OK
        }
        Ok(None) => {
            *out = std::ptr::null_mut();
            ffi::SQLITE_OK
        }
        Err(status) => status_to_rc(status),
    }
}

pub(crate) unsafe extern "C" fn shm_lock(
    p: *mut ffi::sqlite3_file,
    offset: c_int,
    len: c_int,
    flags: c_int,
) -> c_int {
    let file = file_mut(p);
    let name = file.handle.as_ref().and_then(FileHandle::name).expect("shm on named file");
    let mode = if flags & ffi::SQLITE_SHM_EXCLUSIVE != 0 {
        LockMode::Exclusive
    } else {
        LockMode::Shared
    };
    let dir = if flags & ffi::SQLITE_SHM_LOCK != 0 {
        LockDirection::Acquire
    } else {
        LockDirection::Release
    };
    let mut backend = file.registration.backend.lock().unwrap();
    match backend.shm_lock(name, offset as usize, len as usize, mode, dir) {
        Ok(()) => ffi::SQLITE_OK,
        Err(status) => status_to_rc(status),
    }
}

pub(crate) unsafe extern "C" fn shm_barrier(p: *mut ffi::sqlite3_file) {
    let file = file_mut(p);
    let backend = file.registration.backend.lock().unwrap();
    backend.shm_barrier();
}

pub(crate) unsafe extern "C" fn shm_unmap(p: *mut ffi::sqlite3_file, _delete_flag: c_int) -> c_int {
    let file = file_mut(p);
    let name = file.handle.as_ref().and_then(FileHandle::name).expect("shm on named file");
    let backend = file.registration.backend.lock().unwrap();
    match backend.shm_unmap(name) {
        Ok(()) => ffi::SQLITE_OK,
        Err(status) => status_to_rc(status),
    }
}
