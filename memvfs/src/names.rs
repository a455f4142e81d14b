//! Name derivation between a database and its paired WAL file.
//!
//! The pairing is a lookup by name, not a stored pointer: the `Backend`'s file-state map is
//! the single source of truth, and the partner name is recomputed whenever it's needed.

const WAL_SUFFIX: &str = "-wal";

pub fn wal_name_for(db_name: &str) -> String {
    format!("{db_name}{WAL_SUFFIX}")
}

pub fn db_name_for_wal(wal_name: &str) -> Option<&str> {
    wal_name.strip_suffix(WAL_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        assert_eq!(wal_name_for("test.db"), "test.db-wal");
        assert_eq!(db_name_for_wal("test.db-wal"), Some("test.db"));
        assert_eq!(db_name_for_wal("test.db"), None);
    }
}
