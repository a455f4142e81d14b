//! The narrow replication surface this gateway depends on. The teacher's WAL-hook
//! (`ReplicationLoggerHook`) intercepts committed frames as SQLite writes them to a real,
//! on-disk WAL file; there is no disk here, so the equivalent signal is "pull whatever the
//! in-memory WAL currently holds and hand it to a sink" after a write commits.

use crate::Result;

/// Whether this node may accept writes directly, or must forward them to whoever can.
pub trait Leader: Send + Sync {
    fn is_leader(&self) -> bool;

    /// Forwards already-classified write statements to the leader. A non-leader that receives
    /// a write call without ever having forwarded is a programmer error upstream, not something
    /// this trait defends against.
    fn forward(&self, statements: Vec<crate::query_analysis::Statement>) -> Result<Vec<crate::database::QueryResult>>;
}

/// Routes a batch of statements to wherever they should run: locally if this node is the
/// leader and the batch is a pure read, or via `Leader::forward` otherwise.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, statements: Vec<crate::query_analysis::Statement>) -> Result<Vec<crate::database::QueryResult>>;
}

/// Receives exported WAL bytes after a commit. `sqld-libsql-bindings` calls `ship` with
/// whatever `Backend::export` returns for the WAL file backing the connection that just
/// committed; what happens to those bytes (shipped over the network, written to a replica's
/// own `Backend::import`, dropped on the floor in tests) is entirely up to the sink.
pub trait ReplicationSink: Send + Sync {
    fn ship(&self, wal_name: &str, frames: bytes::Bytes) -> Result<()>;
}

/// An in-memory sink used by tests and by single-node deployments that don't replicate at all.
#[derive(Default)]
pub struct VecSink {
    shipped: std::sync::Mutex<Vec<(String, bytes::Bytes)>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shipped(&self) -> Vec<(String, bytes::Bytes)> {
        self.shipped.lock().unwrap().clone()
    }
}

impl ReplicationSink for VecSink {
    fn ship(&self, wal_name: &str, frames: bytes::Bytes) -> Result<()> {
        self.shipped.lock().unwrap().push((wal_name.to_string(), frames));
        Ok(())
    }
}

/// Exports the named WAL from `vfs` and hands the bytes to `sink`. Called by the gateway after
/// a write batch commits; a read-only batch never touches this.
pub fn ship_wal(
    vfs: &sqld_libsql_bindings::RegisteredVfs,
    wal_name: &str,
    sink: &dyn ReplicationSink,
) -> Result<()> {
    let bytes = vfs.with_backend(|backend| backend.export(wal_name))?;
    sink.ship(wal_name, bytes::Bytes::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_records_every_shipment() {
        let sink = VecSink::new();
        sink.ship("a.db-wal", bytes::Bytes::from_static(b"frame")).unwrap();
        sink.ship("a.db-wal", bytes::Bytes::from_static(b"frame2")).unwrap();
        assert_eq!(sink.shipped().len(), 2);
    }

    /// A node with no peers: it is always its own leader, and forwarding to itself just means
    /// reporting that nothing was actually run, since there is no local executor wired into this
    /// trait object. Stands in for what a real leader-election implementation would decide.
    struct LoneNode;

    impl Leader for LoneNode {
        fn is_leader(&self) -> bool {
            true
        }

        fn forward(&self, statements: Vec<crate::query_analysis::Statement>) -> Result<Vec<crate::database::QueryResult>> {
            Ok(statements
                .iter()
                .map(|_| Ok(crate::database::QueryOutcome::default()))
                .collect())
        }
    }

    struct ForwardingDispatcher<'a>(&'a dyn Leader);

    impl<'a> Dispatcher for ForwardingDispatcher<'a> {
        fn dispatch(&self, statements: Vec<crate::query_analysis::Statement>) -> Result<Vec<crate::database::QueryResult>> {
            self.0.forward(statements)
        }
    }

    #[test]
    fn dispatcher_routes_through_leader() {
        let leader = LoneNode;
        let dispatcher = ForwardingDispatcher(&leader);
        assert!(leader.is_leader());

        let statements = vec![crate::query_analysis::Statement::empty()];
        let results = dispatcher.dispatch(statements).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }
}
