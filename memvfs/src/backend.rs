//! The file-state registry and the read/write/lock dispatch that sits behind every VFS
//! callback. This is the single entry point `sqld-libsql-bindings` drives; nothing else in
//! this crate is reachable from outside without going through a `Backend`.

use std::collections::HashMap;
use std::os::unix::fs::FileExt;

use crate::control::{FileControl, FileControlOutcome};
use crate::handle::{FileHandle, FileKind, OpenFlags};
use crate::header;
use crate::names;
use crate::page::FRAME_HEADER_SIZE;
use crate::shm::{LockDirection, LockMode};
use crate::state::{DatabaseState, FileState, JournalState, WalState};
use crate::status::{Result, Status};

/// Whether a read filled the caller's buffer completely or came up short and was zero-filled.
/// Short reads are not an error: the engine relies on them to detect sparse/unwritten pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Full,
    Short,
}

/// The in-memory analogue of a directory of files: every database, WAL and rollback journal
/// the process has opened, keyed by name, plus the most recent registry-level error.
///
/// A `Backend` has no knowledge of SQLite; `FileControl`, `LockMode` and friends are generic
/// enough to be driven by any embedder, which is what keeps the crate testable without a VFS
/// registration at all.
#[derive(Default)]
pub struct Backend {
    files: HashMap<String, FileState>,
    last_error: Option<Status>,
}

impl Backend {
    pub fn new() -> Self {
        Backend::default()
    }

    fn fail(&mut self, status: Status) -> Status {
        self.last_error = Some(status);
        status
    }

    /// Returns the most recent error raised by `open` or `delete`. Per-I/O failures don't
    /// update this: it mirrors `xGetLastError`, which callers only poll after an open failure.
    pub fn last_error(&self) -> Option<Status> {
        self.last_error
    }

    pub fn access(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    pub fn full_pathname<'a>(&self, name: &'a str) -> &'a str {
        name
    }

    pub fn page_size(&self, name: &str) -> Option<u32> {
        match self.files.get(name)? {
            FileState::Database(db) if db.page_size > 0 => Some(db.page_size),
            FileState::Wal(wal) if wal.page_size > 0 => Some(wal.page_size),
            _ => None,
        }
    }

    pub fn open(&mut self, name: Option<&str>, kind: FileKind, flags: OpenFlags) -> Result<FileHandle> {
        let Some(name) = name else {
            let file = tempfile::tempfile().map_err(|_| Status::CantOpen)?;
            return Ok(FileHandle::Temp {
                file,
                delete_on_close: true,
            });
        };

        let exists = self.files.contains_key(name);
        if exists && flags.exclusive && flags.create {
            return Err(self.fail(Status::CantOpen));
        }
        if !exists && !flags.create {
            return Err(self.fail(Status::NotFound));
        }

        if !exists {
            if kind == FileKind::Wal {
                let db_name = match names::db_name_for_wal(name) {
                    Some(db_name) => db_name,
                    None => return Err(self.fail(Status::CantOpen)),
                };
                if !self.files.contains_key(db_name) {
                    return Err(self.fail(Status::CantOpen));
                }
            }
            let state = match kind {
                FileKind::Database => FileState::Database(DatabaseState::new(name.to_string())),
                FileKind::Journal => FileState::Journal(JournalState::new(name.to_string())),
                FileKind::Wal => FileState::Wal(WalState::new(name.to_string())),
            };
            self.files.insert(name.to_string(), state);
        }

        self.files.get_mut(name).expect("just inserted").incref();

        Ok(FileHandle::Named {
            name: name.to_string(),
            kind,
            flags,
        })
    }

    pub fn close(&mut self, handle: FileHandle) -> Result<()> {
        match handle {
            FileHandle::Temp { file, .. } => {
                drop(file);
                Ok(())
            }
            FileHandle::Named { name, flags, .. } => {
                let remaining = {
                    let state = match self.files.get_mut(&name) {
                        Some(state) => state,
                        None => return Ok(()),
                    };
                    let remaining = state.decref();
                    if remaining == 0 {
                        if let FileState::Database(db) = state {
                            db.shm = crate::shm::SharedMemory::new();
                        }
                    }
                    remaining
                };
                if remaining == 0 && flags.delete_on_close {
                    self.files.remove(&name);
                }
                Ok(())
            }
        }
    }

    pub fn delete(&mut self, name: &str) -> Result<()> {
        match self.files.get(name) {
            None => Err(self.fail(Status::NotFound)),
            Some(state) if state.refcount() > 0 => Err(self.fail(Status::Busy)),
            Some(_) => {
                self.files.remove(name);
                Ok(())
            }
        }
    }

    // --- read/write -----------------------------------------------------

    pub fn read(&mut self, handle: &FileHandle, buf: &mut [u8], offset: u64) -> Result<ReadOutcome> {
        match handle {
            FileHandle::Temp { file, .. } => match file.read_exact_at(buf, offset) {
                Ok(()) => Ok(ReadOutcome::Full),
                Err(_) => {
                    buf.fill(0);
                    Ok(ReadOutcome::Short)
                }
            },
            FileHandle::Named { name, kind, .. } => match kind {
                FileKind::Journal => Err(Status::IoErrRead),
                FileKind::Database => self.read_database(name, buf, offset),
                FileKind::Wal => self.read_wal(name, buf, offset),
            },
        }
    }

    fn read_database(&self, name: &str, buf: &mut [u8], offset: u64) -> Result<ReadOutcome> {
        let db = self
            .files
            .get(name)
            .and_then(FileState::as_database)
            .ok_or(Status::IoErrRead)?;
        let amount = buf.len();

        if offset == 0 {
            if db.page_size > 0 && amount > db.page_size as usize {
                return Err(Status::IoErrRead);
            }
            return Ok(match db.pages.lookup_page(1) {
                None => {
                    buf.fill(0);
                    ReadOutcome::Short
                }
                Some(page) => {
                    let n = amount.min(page.body.len());
                    buf[..n].copy_from_slice(&page.body[..n]);
                    if n < amount {
                        buf[n..].fill(0);
                    }
                    ReadOutcome::Full
                }
            });
        }

        if db.page_size == 0 || amount != db.page_size as usize || offset % db.page_size as u64 != 0 {
            return Err(Status::IoErrRead);
        }
        let pgno = (offset / db.page_size as u64) as u32 + 1;
        Ok(match db.pages.lookup_page(pgno) {
            None => {
                buf.fill(0);
                ReadOutcome::Short
            }
            Some(page) => {
                buf.copy_from_slice(&page.body);
                ReadOutcome::Full
            }
        })
    }

    fn read_wal(&mut self, name: &str, buf: &mut [u8], offset: u64) -> Result<ReadOutcome> {
        self.inherit_wal_page_size(name)?;
        let wal = self
            .files
            .get(name)
            .and_then(FileState::as_wal)
            .ok_or(Status::IoErrRead)?;
        let page_size = wal.page_size as u64;
        let amount = buf.len();

        if offset == 0 && amount == header::WAL_HEADER_SIZE {
            buf.copy_from_slice(&wal.header);
            return Ok(ReadOutcome::Full);
        }
        if amount == 8 && offset == 24 {
            buf.copy_from_slice(&wal.header[16..24]);
            return Ok(ReadOutcome::Full);
        }

        let stride = page_size + FRAME_HEADER_SIZE as u64;

        if amount == FRAME_HEADER_SIZE {
            let pgno = frame_pgno(offset, 32, stride)?;
            return self.read_wal_frame(name, pgno, buf, FramePart::Header);
        }
        if amount == 8 {
            let pgno = frame_pgno(offset, 48, stride)?;
            return self.read_wal_frame(name, pgno, buf, FramePart::Checksum);
        }
        if amount as u64 == page_size {
            let pgno = frame_pgno(offset, 32 + FRAME_HEADER_SIZE as u64, stride)?;
            return self.read_wal_frame(name, pgno, buf, FramePart::Body);
        }
        if amount as u64 == page_size + FRAME_HEADER_SIZE as u64 {
            let pgno = frame_pgno(offset, 32, stride)?;
            return self.read_wal_frame(name, pgno, buf, FramePart::Full);
        }

        Err(Status::IoErrRead)
    }

    fn read_wal_frame(
        &self,
        name: &str,
        pgno: u32,
        buf: &mut [u8],
        part: FramePart,
    ) -> Result<ReadOutcome> {
        let wal = self
            .files
            .get(name)
            .and_then(FileState::as_wal)
            .ok_or(Status::IoErrRead)?;
        match wal.pages.lookup_page(pgno) {
            None => {
                buf.fill(0);
                Ok(ReadOutcome::Short)
            }
            Some(page) => {
                let frame_header = page.frame_header.as_ref().expect("wal page has a frame header");
                match part {
                    FramePart::Header => buf.copy_from_slice(frame_header),
                    FramePart::Checksum => buf.copy_from_slice(&frame_header[16..24]),
                    FramePart::Body => buf.copy_from_slice(&page.body),
                    FramePart::Full => {
                        let split = frame_header.len();
                        buf[..split].copy_from_slice(frame_header);
                        buf[split..].copy_from_slice(&page.body);
                    }
                }
                Ok(ReadOutcome::Full)
            }
        }
    }

    pub fn write(&mut self, handle: &FileHandle, buf: &[u8], offset: u64) -> Result<()> {
        match handle {
            FileHandle::Temp { file, .. } => {
                file.write_all_at(buf, offset).map_err(|_| Status::IoErrWrite)
            }
            FileHandle::Named { name, kind, .. } => match kind {
                FileKind::Journal => Ok(()),
                FileKind::Database => self.write_database(name, buf, offset),
                FileKind::Wal => self.write_wal(name, buf, offset),
            },
        }
    }

    fn write_database(&mut self, name: &str, buf: &[u8], offset: u64) -> Result<()> {
        let db = self
            .files
            .get_mut(name)
            .and_then(FileState::as_database_mut)
            .ok_or(Status::IoErrWrite)?;

        if offset == 0 {
            if buf.len() < header::DB_HEADER_SIZE {
                return Err(Status::IoErrWrite);
            }
            let decoded = header::decode_db_page_size(buf).ok_or(Status::IoErrWrite)?;
            if db.page_size == 0 {
                db.page_size = decoded;
            } else if db.page_size != decoded {
                return Err(Status::IoErrWrite);
            }
            let page_size = db.page_size as usize;
            let page = db.pages.ensure_page(1, page_size)?;
            let n = buf.len().min(page.body.len());
            page.body[..n].copy_from_slice(&buf[..n]);
            return Ok(());
        }

        if db.page_size == 0 || buf.len() != db.page_size as usize || offset % db.page_size as u64 != 0 {
            return Err(Status::IoErrWrite);
        }
        let pgno = (offset / db.page_size as u64) as u32 + 1;
        let page_size = db.page_size as usize;
        let page = db.pages.ensure_page(pgno, page_size)?;
        page.body.copy_from_slice(buf);
        Ok(())
    }

    fn write_wal(&mut self, name: &str, buf: &[u8], offset: u64) -> Result<()> {
        self.inherit_wal_page_size(name)?;
        let wal = self
            .files
            .get_mut(name)
            .and_then(FileState::as_wal_mut)
            .ok_or(Status::IoErrWrite)?;
        let page_size = wal.page_size;

        if offset == 0 && buf.len() == header::WAL_HEADER_SIZE {
            let decoded = header::decode_wal_page_size(buf).ok_or(Status::Corrupt)?;
            if decoded != page_size {
                return Err(Status::Corrupt);
            }
            wal.header.copy_from_slice(buf);
            wal.header_written = true;
            return Ok(());
        }

        let stride = page_size as u64 + FRAME_HEADER_SIZE as u64;

        if buf.len() == FRAME_HEADER_SIZE {
            let pgno = frame_pgno(offset, 32, stride)?;
            let page = wal.pages.ensure_page(pgno, page_size as usize)?;
            page.frame_header
                .get_or_insert_with(|| bytes::BytesMut::zeroed(FRAME_HEADER_SIZE))
                .copy_from_slice(buf);
            return Ok(());
        }

        if buf.len() as u32 == page_size {
            let pgno = frame_pgno(offset, 32 + FRAME_HEADER_SIZE as u64, stride)?;
            let page = wal.pages.lookup_page_mut(pgno).ok_or(Status::IoErrWrite)?;
            page.body.copy_from_slice(buf);
            return Ok(());
        }

        Err(Status::IoErrWrite)
    }

    /// Copies the page size down from the paired database the first time a WAL is touched.
    /// Cheap to call repeatedly: a no-op once `page_size` is set.
    fn inherit_wal_page_size(&mut self, wal_name: &str) -> Result<()> {
        let current = self
            .files
            .get(wal_name)
            .and_then(FileState::as_wal)
            .map(|wal| wal.page_size)
            .ok_or(Status::IoErrRead)?;
        if current > 0 {
            return Ok(());
        }
        let db_name = names::db_name_for_wal(wal_name)
            .ok_or(Status::Corrupt)?
            .to_string();
        let db_page_size = self
            .files
            .get(&db_name)
            .and_then(FileState::as_database)
            .map(|db| db.page_size)
            .unwrap_or(0);
        if db_page_size == 0 {
            return Err(Status::IoErrRead);
        }
        if let Some(wal) = self.files.get_mut(wal_name).and_then(FileState::as_wal_mut) {
            wal.page_size = db_page_size;
        }
        Ok(())
    }

    // --- size / truncate --------------------------------------------------

    pub fn file_size(&self, handle: &FileHandle) -> Result<u64> {
        match handle {
            FileHandle::Temp { file, .. } => {
                file.metadata().map(|m| m.len()).map_err(|_| Status::IoErrRead)
            }
            FileHandle::Named { name, kind, .. } => match kind {
                FileKind::Journal => Ok(0),
                FileKind::Database => {
                    let db = self
                        .files
                        .get(name)
                        .and_then(FileState::as_database)
                        .ok_or(Status::IoErrRead)?;
                    Ok(db.page_size as u64 * db.pages.page_count() as u64)
                }
                FileKind::Wal => {
                    let wal = self
                        .files
                        .get(name)
                        .and_then(FileState::as_wal)
                        .ok_or(Status::IoErrRead)?;
                    let header_bytes = if wal.header_written {
                        header::WAL_HEADER_SIZE as u64
                    } else {
                        0
                    };
                    Ok(header_bytes
                        + wal.pages.page_count() as u64 * (FRAME_HEADER_SIZE as u64 + wal.page_size as u64))
                }
            },
        }
    }

    pub fn truncate(&mut self, handle: &FileHandle, size: u64) -> Result<()> {
        match handle {
            FileHandle::Temp { file, .. } => file.set_len(size).map_err(|_| Status::IoErrTruncate),
            FileHandle::Named { name, kind, .. } => match kind {
                FileKind::Journal => Ok(()),
                FileKind::Database => {
                    let db = self
                        .files
                        .get_mut(name)
                        .and_then(FileState::as_database_mut)
                        .ok_or(Status::IoErrTruncate)?;
                    if db.page_size == 0 {
                        return if size == 0 { Ok(()) } else { Err(Status::IoErrTruncate) };
                    }
                    if size % db.page_size as u64 != 0 {
                        return Err(Status::IoErrTruncate);
                    }
                    let n = (size / db.page_size as u64) as u32;
                    db.pages.truncate(n)?;
                    if n == 0 {
                        db.page_size = 0;
                    }
                    Ok(())
                }
                FileKind::Wal => {
                    let wal = self
                        .files
                        .get_mut(name)
                        .and_then(FileState::as_wal_mut)
                        .ok_or(Status::IoErrTruncate)?;
                    if size != 0 {
                        return Err(Status::Protocol);
                    }
                    wal.pages.truncate(0)?;
                    wal.header = [0; 32];
                    wal.header_written = false;
                    Ok(())
                }
            },
        }
    }

    pub fn sync(&self, handle: &FileHandle) -> Result<()> {
        match handle {
            FileHandle::Temp { file, .. } => file.sync_all().map_err(|_| Status::IoErrFsync),
            FileHandle::Named { .. } => Err(Status::IoErrFsync),
        }
    }

    // --- locking ------------------------------------------------------

    pub fn file_lock(&self, _handle: &FileHandle) -> Result<()> {
        Ok(())
    }

    pub fn file_unlock(&self, _handle: &FileHandle) -> Result<()> {
        Ok(())
    }

    pub fn check_reserved_lock(&self, _handle: &FileHandle) -> bool {
        true
    }

    pub fn shm_map(&mut self, name: &str, index: usize, size: usize, extend: bool) -> Result<Option<&mut [u8]>> {
        let db = self
            .files
            .get_mut(name)
            .and_then(FileState::as_database_mut)
            .ok_or(Status::IoErrWrite)?;
        db.shm.map(index, size, extend)
    }

    pub fn shm_lock(
        &mut self,
        name: &str,
        offset: usize,
        len: usize,
        mode: LockMode,
        dir: LockDirection,
    ) -> Result<()> {
        let db = self
            .files
            .get_mut(name)
            .and_then(FileState::as_database_mut)
            .ok_or(Status::IoErrWrite)?;
        db.shm.lock(offset, len, mode, dir)
    }

    pub fn shm_unmap(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    pub fn shm_barrier(&self) {}

    // --- pragmas --------------------------------------------------------

    pub fn file_control(&mut self, name: &str, op: &FileControl) -> Result<FileControlOutcome> {
        match op {
            FileControl::PageSize(n) => {
                if header::is_valid_page_size(*n) {
                    let db = self
                        .files
                        .get_mut(name)
                        .and_then(FileState::as_database_mut)
                        .ok_or(Status::IoErrWrite)?;
                    if db.page_size != 0 && db.page_size != *n {
                        return Err(Status::IoErrWrite);
                    }
                    if db.page_size == 0 {
                        db.page_size = *n;
                    }
                }
                Ok(FileControlOutcome::NotFound)
            }
            FileControl::JournalMode(mode) => {
                if mode.eq_ignore_ascii_case("wal") {
                    Ok(FileControlOutcome::NotFound)
                } else {
                    Ok(FileControlOutcome::Refused)
                }
            }
            FileControl::Other => Ok(FileControlOutcome::NotFound),
        }
    }

    pub(crate) fn files(&self) -> &HashMap<String, FileState> {
        &self.files
    }

    pub(crate) fn files_mut(&mut self) -> &mut HashMap<String, FileState> {
        &mut self.files
    }
}

#[derive(Clone, Copy)]
enum FramePart {
    Header,
    Checksum,
    Body,
    Full,
}

fn frame_pgno(offset: u64, skip: u64, stride: u64) -> Result<u32> {
    let base = offset.checked_sub(skip).ok_or(Status::IoErrRead)?;
    if stride == 0 || base % stride != 0 {
        return Err(Status::IoErrRead);
    }
    Ok((base / stride) as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_header(page_size: u16) -> Vec<u8> {
        let mut h = vec![0u8; header::DB_HEADER_SIZE];
        h[16..18].copy_from_slice(&page_size.to_be_bytes());
        h
    }

    fn open_db(backend: &mut Backend, name: &str) -> FileHandle {
        backend
            .open(
                Some(name),
                FileKind::Database,
                OpenFlags {
                    create: true,
                    ..Default::default()
                },
            )
            .unwrap()
    }

    #[test]
    fn first_database_write_negotiates_page_size() {
        let mut backend = Backend::new();
        let handle = open_db(&mut backend, "a.db");
        let page = db_header(4096);
        backend.write(&handle, &page, 0).unwrap();
        assert_eq!(backend.page_size("a.db"), Some(4096));
        assert_eq!(backend.file_size(&handle).unwrap(), 4096);
    }

    #[test]
    fn short_database_header_write_is_rejected() {
        let mut backend = Backend::new();
        let handle = open_db(&mut backend, "a.db");
        assert!(backend.write(&handle, &[0u8; 50], 0).is_err());
    }

    #[test]
    fn wal_open_without_paired_database_fails() {
        let mut backend = Backend::new();
        let result = backend.open(
            Some("a.db-wal"),
            FileKind::Wal,
            OpenFlags {
                create: true,
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(Status::CantOpen)));
    }

    #[test]
    fn wal_frame_round_trips_through_read_and_write() {
        let mut backend = Backend::new();
        let db_handle = open_db(&mut backend, "a.db");
        backend.write(&db_handle, &db_header(512), 0).unwrap();

        let wal_handle = backend
            .open(
                Some("a.db-wal"),
                FileKind::Wal,
                OpenFlags {
                    create: true,
                    ..Default::default()
                },
            )
            .unwrap();

        let mut wal_header = vec![0u8; header::WAL_HEADER_SIZE];
        wal_header[8..12].copy_from_slice(&512u32.to_be_bytes());
        backend.write(&wal_handle, &wal_header, 0).unwrap();

        let frame_header = vec![7u8; FRAME_HEADER_SIZE];
        backend.write(&wal_handle, &frame_header, 32).unwrap();
        let body = vec![9u8; 512];
        backend.write(&wal_handle, &body, 32 + FRAME_HEADER_SIZE as u64).unwrap();

        let mut read_header = vec![0u8; FRAME_HEADER_SIZE];
        backend.read(&wal_handle, &mut read_header, 32).unwrap();
        assert_eq!(read_header, frame_header);

        let mut read_body = vec![0u8; 512];
        backend
            .read(&wal_handle, &mut read_body, 32 + FRAME_HEADER_SIZE as u64)
            .unwrap();
        assert_eq!(read_body, body);
    }

    #[test]
    fn short_read_past_end_zero_fills() {
        let mut backend = Backend::new();
        let handle = open_db(&mut backend, "a.db");
        backend.write(&handle, &db_header(512), 0).unwrap();
        let mut buf = vec![0xffu8; 512];
        let outcome = backend.read(&handle, &mut buf, 512).unwrap();
        assert_eq!(outcome, ReadOutcome::Short);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn delete_busy_while_open() {
        let mut backend = Backend::new();
        let _handle = open_db(&mut backend, "a.db");
        assert!(matches!(backend.delete("a.db"), Err(Status::Busy)));
    }

    #[test]
    fn shm_lock_reports_busy_on_contention() {
        let mut backend = Backend::new();
        open_db(&mut backend, "a.db");
        backend
            .shm_lock("a.db", 0, 1, LockMode::Exclusive, LockDirection::Acquire)
            .unwrap();
        assert!(matches!(
            backend.shm_lock("a.db", 0, 1, LockMode::Shared, LockDirection::Acquire),
            Err(Status::Busy)
        ));
    }
}
