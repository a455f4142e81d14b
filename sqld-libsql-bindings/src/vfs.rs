//! `sqlite3_vfs` callbacks: the directory-level operations (open, delete, access) that hand
//! out `sqlite3_file*` handles for [`crate::io`] to then drive.

use std::os::raw::{c_char, c_int, c_void};

use memvfs::{FileKind, OpenFlags, Status};
use rusqlite::ffi;

use crate::io::{self, MemFile};
use crate::registration_from_app_data;

fn kind_from_flags(flags: c_int) -> Option<FileKind> {
    if flags & ffi::SQLITE_OPEN_MAIN_DB != 0 {
        Some(FileKind::Database)
    } else if flags & ffi::SQLITE_OPEN_MAIN_JOURNAL != 0 {
        Some(FileKind::Journal)
    } else if flags & ffi::SQLITE_OPEN_WAL != 0 {
        Some(FileKind::Wal)
    } else {
        None
    }
}

fn status_to_rc(status: Status) -> c_int {
    match status {
        Status::NotFound | Status::CantOpen => ffi::SQLITE_CANTOPEN,
        Status::Busy => ffi::SQLITE_BUSY,
        Status::Corrupt => ffi::SQLITE_CORRUPT,
        Status::IoErrDelete => ffi::SQLITE_IOERR_DELETE,
        _ => ffi::SQLITE_IOERR,
    }
}

pub(crate) unsafe extern "C" fn open(
    vfs: *mut ffi::sqlite3_vfs,
    name: *const c_char,
    file: *mut ffi::sqlite3_file,
    flags: c_int,
    out_flags: *mut c_int,
) -> c_int {
    let registration = registration_from_app_data((*vfs).pAppData);

    let name = if name.is_null() {
        None
    } else {
        Some(std::ffi::CStr::from_ptr(name).to_string_lossy().to_string())
    };

    let Some(kind) = (if name.is_none() {
        Some(FileKind::Database)
    } else {
        kind_from_flags(flags)
    }) else {
        return ffi::SQLITE_CANTOPEN;
    };

    let open_flags = OpenFlags {
        create: flags & ffi::SQLITE_OPEN_CREATE != 0,
        exclusive: flags & ffi::SQLITE_OPEN_EXCLUSIVE != 0,
        readonly: flags & ffi::SQLITE_OPEN_READONLY != 0,
        delete_on_close: flags & ffi::SQLITE_OPEN_DELETEONCLOSE != 0,
    };

    let handle = {
        let mut backend = registration.backend.lock().unwrap();
        match backend.open(name.as_deref(), kind, open_flags) {
            Ok(handle) => handle,
            Err(status) => return status_to_rc(status),
        }
    };

    let mem_file = MemFile::new(registration, handle);
    std::ptr::write(file as *mut MemFile, mem_file);
    (*file).pMethods = &IO_METHODS;

    if !out_flags.is_null() {
        *out_flags = flags;
    }
    ffi::SQLITE_OK
}

pub(crate) unsafe extern "C" fn delete(
    vfs: *mut ffi::sqlite3_vfs,
    name: *const c_char,
    _sync_dir: c_int,
) -> c_int {
    let registration = registration_from_app_data((*vfs).pAppData);
    let name = std::ffi::CStr::from_ptr(name).to_string_lossy();
    let mut backend = registration.backend.lock().unwrap();
    match backend.delete(&name) {
        Ok(()) => ffi::SQLITE_OK,
        Err(status) => status_to_rc(status),
    }
}

pub(crate) unsafe extern "C" fn access(
    vfs: *mut ffi::sqlite3_vfs,
    name: *const c_char,
    _flags: c_int,
    out: *mut c_int,
) -> c_int {
    let registration = registration_from_app_data((*vfs).pAppData);
    let name = std::ffi::CStr::from_ptr(name).to_string_lossy();
    let backend = registration.backend.lock().unwrap();
    *out = backend.access(&name) as c_int;
    ffi::SQLITE_OK
}

pub(crate) unsafe extern "C" fn full_pathname(
    _vfs: *mut ffi::sqlite3_vfs,
    name: *const c_char,
    out_len: c_int,
    out: *mut c_char,
) -> c_int {
    let name = std::ffi::CStr::from_ptr(name);
    let bytes = name.to_bytes_with_nul();
    if bytes.len() > out_len as usize {
        return ffi::SQLITE_CANTOPEN;
    }
    std::ptr::copy_nonoverlapping(bytes.as_ptr() as *const c_char, out, bytes.len());
    ffi::SQLITE_OK
}

pub(crate) unsafe extern "C" fn randomness(_vfs: *mut ffi::sqlite3_vfs, len: c_int, out: *mut c_char) -> c_int {
    use rand::RngCore;
    let slice = std::slice::from_raw_parts_mut(out as *mut u8, len as usize);
    rand::thread_rng().fill_bytes(slice);
    len
}

pub(crate) unsafe extern "C" fn sleep(_vfs: *mut ffi::sqlite3_vfs, microseconds: c_int) -> c_int {
    microseconds
}

pub(crate) unsafe extern "C" fn current_time(_vfs: *mut ffi::sqlite3_vfs, out: *mut f64) -> c_int {
    // Julian day number for the Unix epoch; no embedder has yet needed wall-clock fidelity
    // from an in-memory VFS, so this is a fixed stand-in rather than a real clock read.
    *out = 2440587.5;
    ffi::SQLITE_OK
}

pub(crate) unsafe extern "C" fn current_time_int64(
    _vfs: *mut ffi::sqlite3_vfs,
    out: *mut ffi::sqlite3_int64,
) -> c_int {
    *out = 210866760000000;
    ffi::SQLITE_OK
}

pub(crate) unsafe extern "C" fn get_last_error(
    vfs: *mut ffi::sqlite3_vfs,
    len: c_int,
    out: *mut c_char,
) -> c_int {
    let registration = registration_from_app_data((*vfs).pAppData);
    let backend = registration.backend.lock().unwrap();
    let message = match backend.last_error() {
        Some(status) => status.to_string(),
        None => return 0,
    };
    let bytes = message.as_bytes();
    let n = bytes.len().min(len.max(0) as usize);
    std::ptr::copy_nonoverlapping(bytes.as_ptr() as *const c_char, out, n);
    if (n as c_int) < len {
        *out.add(n) = 0;
    }
    0
}

static IO_METHODS: ffi::sqlite3_io_methods = ffi::sqlite3_io_methods {
    iVersion: 2,
    xClose: Some(io::close),
    xRead: Some(io::read),
    xWrite: Some(io::write),
    xTruncate: Some(io::truncate),
    xSync: Some(io::sync),
    xFileSize: Some(io::file_size),
    xLock: Some(io::lock),
    xUnlock: Some(io::unlock),
    xCheckReservedLock: Some(io::check_reserved_lock),
    xFileControl: Some(io::file_control),
    xSectorSize: Some(io::sector_size),
    xDeviceCharacteristics: Some(io::device_characteristics),
    xShmMap: Some(io::shm_map),
    xShmLock: Some(io::shm_lock),
    xShmBarrier: Some(io::shm_barrier),
    xShmUnmap: Some(io::shm_unmap),
    xFetch: None,
    xUnfetch: None,
};

pub(crate) fn build(name: *const c_char, app_data: *mut c_void) -> ffi::sqlite3_vfs {
    ffi::sqlite3_vfs {
        iVersion: 2,
        szOsFile: std::mem::size_of::<MemFile>() as c_int,
        mxPathname: 512,
        pNext: std::ptr::null_mut(),
        zName: name,
        pAppData: app_data,
        xOpen: Some(open),
        xDelete: Some(delete),
        xAccess: Some(access),
        xFullPathname: Some(full_pathname),
        xDlOpen: None,
        xDlError: None,
        xDlSym: None,
        xDlClose: None,
        xRandomness: Some(randomness),
        xSleep: Some(sleep),
        xCurrentTime: Some(current_time),
        xGetLastError: Some(get_last_error),
        xCurrentTimeInt64: Some(current_time_int64),
        xSetSystemCall: None,
        xGetSystemCall: None,
        xNextSystemCall: None,
    }
}
