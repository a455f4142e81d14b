//! The connection actor: one dedicated OS thread owns a single `rusqlite::Connection` opened
//! against the in-memory VFS, and every caller talks to it over a bounded channel. Serializing
//! access this way means the VFS backend never has to reason about concurrent mutation of the
//! same named file from more than one thread.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::RecvTimeoutError;
use rusqlite::types::Value;
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::Error;
use crate::query_analysis::{State, Statement, StmtKind};
use crate::replication::{self, ReplicationSink};
use crate::Result;

/// One statement's outcome: columns, materialized rows, and the `sqlite3_changes()` count for
/// writes (always 0 for reads, matching the engine's own semantics).
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub affected_rows: usize,
}

pub type QueryResult = std::result::Result<QueryOutcome, Error>;

struct Message {
    statements: Vec<Statement>,
    resp: oneshot::Sender<(Vec<QueryResult>, State)>,
}

#[derive(Clone)]
pub struct LibSqlDb {
    sender: crossbeam::channel::Sender<Message>,
}

fn execute_statement(conn: &rusqlite::Connection, stmt: &Statement) -> QueryResult {
    let mut prepared = conn.prepare(&stmt.stmt).map_err(Error::from)?;
    let columns = prepared
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    let mut raw = prepared.raw_query();
    while let Some(row) = raw.next().map_err(Error::from)? {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(row.get::<usize, Value>(i).map_err(Error::from)?);
        }
        rows.push(values);
    }
    drop(raw);

    let affected_rows = if stmt.is_iud { conn.changes() as usize } else { 0 };

    Ok(QueryOutcome {
        columns,
        rows,
        affected_rows,
    })
}

struct ConnectionState {
    state: State,
    timeout_deadline: Option<Instant>,
    write_timeout: Duration,
}

impl ConnectionState {
    fn initial(write_timeout: Duration) -> Self {
        Self {
            state: State::Init,
            timeout_deadline: None,
            write_timeout,
        }
    }

    fn deadline(&self) -> Option<Instant> {
        self.timeout_deadline
    }

    fn reset(&mut self) {
        self.state.reset();
        self.timeout_deadline.take();
    }

    fn step(&mut self, stmt: &Statement) {
        let old_state = self.state;
        self.state.step(stmt.kind);
        match (old_state, self.state) {
            (State::Init, State::Txn) => {
                self.timeout_deadline.replace(Instant::now() + self.write_timeout);
            }
            (State::Txn, State::Init) => self.reset(),
            (_, State::Invalid) => panic!("invalid transaction state transition"),
            _ => (),
        }
    }
}

fn handle_statement(conn: &rusqlite::Connection, stmt: Statement, state: &mut ConnectionState) -> QueryResult {
    let result = execute_statement(conn, &stmt);
    if result.is_ok() {
        state.step(&stmt);
    }
    result
}

fn rollback(conn: &rusqlite::Connection) {
    let _ = conn.execute("rollback transaction;", ());
}

macro_rules! ok_or_exit {
    ($e:expr) => {
        if $e.is_err() {
            return;
        }
    };
}

impl LibSqlDb {
    /// Spawns the connection actor against `vfs`, opening `db_name` through
    /// `sqld_libsql_bindings::open`. When `sink` is set, every batch that commits at least one
    /// write has the database's WAL exported and shipped to it before the caller is answered.
    pub fn new(
        vfs: sqld_libsql_bindings::RegisteredVfs,
        db_name: String,
        write_timeout: Duration,
        sink: Option<Arc<dyn ReplicationSink>>,
    ) -> crate::Result<Self> {
        let (sender, receiver) = crossbeam::channel::unbounded::<Message>();

        std::thread::Builder::new()
            .name(format!("libsql-conn-{db_name}"))
            .spawn(move || {
                let conn = match sqld_libsql_bindings::open(
                    &vfs,
                    &db_name,
                    rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE | rusqlite::OpenFlags::SQLITE_OPEN_CREATE,
                ) {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to open connection actor database");
                        return;
                    }
                };
                let wal_name = memvfs::names::wal_name_for(&db_name);

                let mut state = ConnectionState::initial(write_timeout);
                let mut pending_write = false;
                let mut timedout = false;
                loop {
                    let Message { statements, resp } = match state.deadline() {
                        Some(deadline) => match receiver.recv_deadline(deadline) {
                            Ok(msg) => msg,
                            Err(RecvTimeoutError::Timeout) => {
                                warn!("transaction timed out");
                                rollback(&conn);
                                timedout = true;
                                state.reset();
                                continue;
                            }
                            Err(RecvTimeoutError::Disconnected) => break,
                        },
                        None => match receiver.recv() {
                            Ok(msg) => msg,
                            Err(_) => break,
                        },
                    };

                    if !timedout {
                        let mut results = Vec::with_capacity(statements.len());
                        for stmt in statements {
                            let is_write = !stmt.is_read_only();
                            let result = handle_statement(&conn, stmt, &mut state);
                            if is_write && result.is_ok() {
                                pending_write = true;
                            }
                            results.push(result);
                        }

                        if pending_write && state.state == State::Init {
                            if let Some(sink) = sink.as_deref() {
                                if let Err(e) = replication::ship_wal(&vfs, &wal_name, sink) {
                                    tracing::error!(error = %e, wal = %wal_name, "failed to ship committed frames");
                                }
                            }
                            pending_write = false;
                        }

                        ok_or_exit!(resp.send((results, state.state)));
                    } else {
                        let errors = std::iter::repeat_with(|| Err(Error::TxTimeout))
                            .take(statements.len())
                            .collect();
                        ok_or_exit!(resp.send((errors, state.state)));
                        timedout = false;
                    }
                }
            })
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(Self { sender })
    }

    pub async fn execute_batch(&self, statements: Vec<Statement>) -> Result<(Vec<QueryResult>, State)> {
        let (resp, receiver) = oneshot::channel();
        let _ = self.sender.send(Message { statements, resp });
        Ok(receiver.await.map_err(Error::from)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_tracks_transaction_boundary() {
        let mut state = ConnectionState::initial(Duration::from_secs(5));
        state.step(&Statement {
            stmt: "begin".into(),
            kind: StmtKind::TxnBegin,
            is_iud: false,
            is_insert: false,
        });
        assert_eq!(state.state, State::Txn);
        assert!(state.deadline().is_some());

        state.step(&Statement {
            stmt: "commit".into(),
            kind: StmtKind::TxnEnd,
            is_iud: false,
            is_insert: false,
        });
        assert_eq!(state.state, State::Init);
        assert!(state.deadline().is_none());
    }

    #[tokio::test]
    async fn committing_a_write_ships_wal_frames_to_the_sink() {
        use std::sync::atomic::{AtomicU32, Ordering};

        static VFS_COUNTER: AtomicU32 = AtomicU32::new(0);
        let n = VFS_COUNTER.fetch_add(1, Ordering::Relaxed);
        let vfs = sqld_libsql_bindings::register(&format!("test-ship-vfs-{n}"), false).unwrap();

        let sink = Arc::new(replication::VecSink::new());
        let db = LibSqlDb::new(vfs, "ship-test.db".into(), Duration::from_secs(5), Some(sink.clone())).unwrap();

        let statements: Vec<Statement> = Statement::parse("create table t(a);")
            .collect::<anyhow::Result<Vec<_>>>()
            .unwrap();
        let (results, state) = db.execute_batch(statements).await.unwrap();

        assert!(results[0].is_ok());
        assert_eq!(state, State::Init);
        assert!(!sink.shipped().is_empty());
    }
}
