use crate::page::PageStore;
use crate::shm::SharedMemory;

/// A paged store plus the shared-memory lock region used to coordinate readers and writers.
pub struct DatabaseState {
    pub name: String,
    pub page_size: u32,
    pub pages: PageStore,
    pub shm: SharedMemory,
    pub refcount: u32,
}

impl DatabaseState {
    pub fn new(name: String) -> Self {
        DatabaseState {
            name,
            page_size: 0,
            pages: PageStore::new(false),
            shm: SharedMemory::new(),
            refcount: 0,
        }
    }
}

/// A paged store whose pages additionally carry a 24-byte frame header, plus the 32-byte WAL
/// header buffer. The page size is inherited from the paired database on first access.
pub struct WalState {
    pub name: String,
    pub page_size: u32,
    pub header: [u8; 32],
    pub header_written: bool,
    pub pages: PageStore,
    pub refcount: u32,
}

impl WalState {
    pub fn new(name: String) -> Self {
        WalState {
            name,
            page_size: 0,
            header: [0; 32],
            header_written: false,
            pages: PageStore::new(true),
            refcount: 0,
        }
    }
}

/// A name-only placeholder: the engine still opens rollback journal files even when WAL mode
/// is enforced, but all reads/writes against them are no-ops.
pub struct JournalState {
    pub name: String,
    pub refcount: u32,
}

impl JournalState {
    pub fn new(name: String) -> Self {
        JournalState { name, refcount: 0 }
    }
}

pub enum FileState {
    Database(DatabaseState),
    Wal(WalState),
    Journal(JournalState),
}

impl FileState {
    pub fn name(&self) -> &str {
        match self {
            FileState::Database(s) => &s.name,
            FileState::Wal(s) => &s.name,
            FileState::Journal(s) => &s.name,
        }
    }

    pub fn refcount(&self) -> u32 {
        match self {
            FileState::Database(s) => s.refcount,
            FileState::Wal(s) => s.refcount,
            FileState::Journal(s) => s.refcount,
        }
    }

    pub fn incref(&mut self) {
        match self {
            FileState::Database(s) => s.refcount += 1,
            FileState::Wal(s) => s.refcount += 1,
            FileState::Journal(s) => s.refcount += 1,
        }
    }

    /// Decrements the refcount and returns the new value.
    pub fn decref(&mut self) -> u32 {
        let count = match self {
            FileState::Database(s) => &mut s.refcount,
            FileState::Wal(s) => &mut s.refcount,
            FileState::Journal(s) => &mut s.refcount,
        };
        *count = count.saturating_sub(1);
        *count
    }

    pub fn as_database(&self) -> Option<&DatabaseState> {
        match self {
            FileState::Database(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_database_mut(&mut self) -> Option<&mut DatabaseState> {
        match self {
            FileState::Database(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_wal_mut(&mut self) -> Option<&mut WalState> {
        match self {
            FileState::Wal(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_wal(&self) -> Option<&WalState> {
        match self {
            FileState::Wal(s) => Some(s),
            _ => None,
        }
    }
}
