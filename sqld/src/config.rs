use std::time::Duration;

use clap::Parser;

/// Command-line configuration for a single-node gateway process. There is no config file
/// format here: every embedder of this crate is expected to either run the binary with flags
/// or construct a `Config` directly and skip `Config::parse()`.
#[derive(Debug, Clone, Parser)]
#[command(name = "sqld", about = "An embedded SQLite engine fronted by an in-memory VFS")]
pub struct Config {
    /// Name under which the in-memory VFS is registered with SQLite. Must be unique per process.
    #[arg(long, env = "SQLD_VFS_NAME", default_value = "memvfs")]
    pub vfs_name: String,

    /// Name of the main database file inside the VFS's namespace.
    #[arg(long, env = "SQLD_DB_NAME", default_value = "main.db")]
    pub db_name: String,

    /// How long a write transaction may sit idle before it is rolled back and its deadline
    /// reported as a timeout to the next query on that connection.
    #[arg(long, env = "SQLD_WRITE_TIMEOUT_SECS", default_value = "5")]
    pub write_timeout_secs: u64,

    /// Register the VFS as SQLite's process-wide default.
    #[arg(long, env = "SQLD_VFS_AS_DEFAULT", default_value = "false")]
    pub vfs_as_default: bool,
}

impl Config {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}
