//! An in-memory, replication-friendly virtual file system backend for an embedded SQLite
//! engine.
//!
//! A [`Backend`] stands in for a directory: every database, write-ahead log and rollback
//! journal the embedding process opens lives as a [`state::FileState`] in one name-keyed map,
//! with no filesystem or OS locking underneath it. The crate knows nothing about SQLite's C
//! ABI; `sqld-libsql-bindings` is the only place that translates this into `sqlite3_vfs`
//! callbacks.

pub mod backend;
pub mod control;
mod export;
pub mod handle;
pub mod header;
pub mod names;
pub mod page;
pub mod shm;
pub mod state;
pub mod status;

pub use backend::{Backend, ReadOutcome};
pub use control::{FileControl, FileControlOutcome};
pub use handle::{FileHandle, FileKind, OpenFlags};
pub use shm::{LockDirection, LockMode};
pub use status::{Result, ShortRead, Status};

#[cfg(test)]
mod scenario_tests {
    use super::*;

    fn create(backend: &mut Backend, name: &str, kind: FileKind) -> FileHandle {
        backend
            .open(
                Some(name),
                kind,
                OpenFlags {
                    create: true,
                    ..Default::default()
                },
            )
            .unwrap()
    }

    fn db_header(page_size: u16) -> Vec<u8> {
        let mut h = vec![0u8; header::DB_HEADER_SIZE];
        h[16..18].copy_from_slice(&page_size.to_be_bytes());
        h
    }

    /// Scenario: a page-size pragma negotiates the size before the first page-1 write, and a
    /// mismatched later write is rejected.
    #[test]
    fn page_size_negotiation() {
        let mut backend = Backend::new();
        let handle = create(&mut backend, "a.db", FileKind::Database);

        backend
            .file_control("a.db", &FileControl::PageSize(4096))
            .unwrap();
        assert_eq!(backend.page_size("a.db"), Some(4096));

        backend.write(&handle, &db_header(4096), 0).unwrap();
        assert!(backend.write(&handle, &db_header(8192), 0).is_err());
    }

    /// Scenario: opening a WAL with create before its database exists is cannot-open.
    #[test]
    fn wal_before_database_is_cannot_open() {
        let mut backend = Backend::new();
        let result = backend.open(
            Some("db-wal"),
            FileKind::Wal,
            OpenFlags {
                create: true,
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(Status::CantOpen)));
    }

    /// Scenario: a WAL frame written at one offset reads back bit-identical at every offset
    /// convention the engine uses to address it (header, checksum tail, body, combined).
    #[test]
    fn wal_frame_round_trip_every_addressing_mode() {
        let mut backend = Backend::new();
        let db = create(&mut backend, "db", FileKind::Database);
        backend.write(&db, &db_header(512), 0).unwrap();
        let wal = create(&mut backend, "db-wal", FileKind::Wal);

        let mut wal_header = vec![0u8; header::WAL_HEADER_SIZE];
        wal_header[8..12].copy_from_slice(&512u32.to_be_bytes());
        backend.write(&wal, &wal_header, 0).unwrap();

        let mut frame_header = vec![0u8; 24];
        frame_header[16..24].copy_from_slice(&0xdead_beef_cafe_babeu64.to_be_bytes());
        backend.write(&wal, &frame_header, 32).unwrap();
        let body = vec![5u8; 512];
        backend.write(&wal, &body, 32 + 24).unwrap();

        let mut got_checksum = vec![0u8; 8];
        backend.read(&wal, &mut got_checksum, 32 + 16).unwrap();
        assert_eq!(got_checksum, &frame_header[16..24]);

        let mut got_full = vec![0u8; 24 + 512];
        backend.read(&wal, &mut got_full, 32).unwrap();
        assert_eq!(&got_full[..24], &frame_header[..]);
        assert_eq!(&got_full[24..], &body[..]);
    }

    /// Scenario: reading past the end of a freshly opened, never-written file is a short read
    /// that zero-fills rather than an error.
    #[test]
    fn short_read_on_empty_file() {
        let mut backend = Backend::new();
        let handle = create(&mut backend, "a.db", FileKind::Database);
        let mut buf = vec![0xaau8; 100];
        let outcome = backend.read(&handle, &mut buf, 0).unwrap();
        assert_eq!(outcome, ReadOutcome::Short);
        assert!(buf.iter().all(|&b| b == 0));
    }

    /// Scenario: an exclusive shared-memory lock held by one connection contends with a shared
    /// lock requested by another, reported as busy rather than blocking.
    #[test]
    fn lock_contention_reports_busy_not_blocking() {
        let mut backend = Backend::new();
        create(&mut backend, "a.db", FileKind::Database);
        backend
            .shm_lock("a.db", 0, 1, LockMode::Exclusive, LockDirection::Acquire)
            .unwrap();
        assert!(matches!(
            backend.shm_lock("a.db", 0, 1, LockMode::Shared, LockDirection::Acquire),
            Err(Status::Busy)
        ));
    }

    /// Scenario: deleting a file that is still open (refcount > 0) is refused as busy.
    #[test]
    fn delete_while_open_is_busy() {
        let mut backend = Backend::new();
        create(&mut backend, "a.db", FileKind::Database);
        assert!(matches!(backend.delete("a.db"), Err(Status::Busy)));
    }

    /// Write-then-read round trip law: any page written is read back byte-identical.
    #[test]
    fn write_then_read_round_trip() {
        let mut backend = Backend::new();
        let handle = create(&mut backend, "a.db", FileKind::Database);
        backend.write(&handle, &db_header(1024), 0).unwrap();
        let page2 = vec![42u8; 1024];
        backend.write(&handle, &page2, 1024).unwrap();

        let mut got = vec![0u8; 1024];
        backend.read(&handle, &mut got, 1024).unwrap();
        assert_eq!(got, page2);
    }

    /// Truncate idempotence law: truncating to the current size twice in a row is a no-op
    /// both times.
    #[test]
    fn truncate_is_idempotent() {
        let mut backend = Backend::new();
        let handle = create(&mut backend, "a.db", FileKind::Database);
        backend.write(&handle, &db_header(512), 0).unwrap();
        backend.write(&handle, &vec![1u8; 512], 512).unwrap();

        backend.truncate(&handle, 1024).unwrap();
        backend.truncate(&handle, 1024).unwrap();
        assert_eq!(backend.file_size(&handle).unwrap(), 1024);
    }

    /// Lock idempotence law: releasing a shared lock that was already fully drained does not
    /// error or affect other holders.
    #[test]
    fn unlock_idempotence() {
        let mut backend = Backend::new();
        create(&mut backend, "a.db", FileKind::Database);
        backend
            .shm_lock("a.db", 2, 1, LockMode::Shared, LockDirection::Acquire)
            .unwrap();
        backend
            .shm_lock("a.db", 2, 1, LockMode::Shared, LockDirection::Release)
            .unwrap();
        backend
            .shm_lock("a.db", 2, 1, LockMode::Shared, LockDirection::Release)
            .unwrap();
        backend
            .shm_lock("a.db", 2, 1, LockMode::Exclusive, LockDirection::Acquire)
            .unwrap();
    }
}
