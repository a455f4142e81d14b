/// The narrow slice of `PRAGMA`-driven file-control opcodes the core cares about; every other
/// opcode the engine might send is represented by `Other` and always answered `NotFound`.
#[derive(Debug, Clone)]
pub enum FileControl {
    PageSize(u32),
    JournalMode(String),
    Other,
}

/// SQLite's own file-control convention: `NotFound` tells the engine "I didn't claim this
/// pragma, go apply your own handling too"; `Refused` actually blocks the pragma outcome
/// (used only to reject a non-`wal` `journal_mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileControlOutcome {
    NotFound,
    Refused,
}
