//! Fixed-size pool of node database connections.

use crate::error::{NodeDbError, NodeDbResult};
use crate::source::ConnectionSource;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Longest a waiting caller blocks on one slot before rescanning the others.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// A pooled connection, returned to the pool when dropped.
pub type PooledConnection<'a> = MutexGuard<'a, Connection>;

/// A fixed set of connections shared by concurrent callers.
///
/// Each connection sits behind its own mutex, so a caller holds exactly one
/// connection for the duration of a statement and never shares it.
pub struct ConnectionPool {
    slots: Vec<Mutex<Connection>>,
    cursor: AtomicUsize,
    acquire_timeout: Duration,
}

impl ConnectionPool {
    /// Opens `size` connections from `source`.
    ///
    /// Fails on the first connection that cannot be opened; connections
    /// already opened are dropped.
    pub fn open(
        source: &dyn ConnectionSource,
        size: usize,
        acquire_timeout: Duration,
    ) -> NodeDbResult<Self> {
        if size == 0 {
            return Err(NodeDbError::invalid_config("pool_size must be at least 1"));
        }

        let mut slots = Vec::with_capacity(size);
        for _ in 0..size {
            slots.push(Mutex::new(source.open()?));
        }

        Ok(Self {
            slots,
            cursor: AtomicUsize::new(0),
            acquire_timeout,
        })
    }

    /// Number of connections in the pool.
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Borrows a free connection on behalf of `operation`.
    ///
    /// Scans every slot without blocking, then keeps rescanning with short
    /// waits on one slot at a time until a connection frees up or the
    /// acquire timeout passes.
    pub fn acquire(&self, operation: &str) -> NodeDbResult<PooledConnection<'_>> {
        let deadline = Instant::now() + self.acquire_timeout;
        let n = self.slots.len();
        let mut start = self.cursor.fetch_add(1, Ordering::Relaxed) % n;

        loop {
            for i in 0..n {
                if let Some(guard) = self.slots[(start + i) % n].try_lock() {
                    return Ok(guard);
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(NodeDbError::timeout(operation, self.acquire_timeout));
            }
            if let Some(guard) = self.slots[start].try_lock_for(remaining.min(POLL_INTERVAL)) {
                return Ok(guard);
            }
            start = (start + 1) % n;
        }
    }

    /// Runs `f` against every connection in turn, stopping at the first error.
    pub fn for_each<F>(&self, mut f: F) -> NodeDbResult<()>
    where
        F: FnMut(&Connection) -> NodeDbResult<()>,
    {
        for slot in &self.slots {
            f(&slot.lock())?;
        }
        Ok(())
    }

    /// Closes every connection, returning how many failed to close cleanly.
    pub fn close(self) -> usize {
        let mut failures = 0;
        for slot in self.slots {
            if let Err((_, e)) = slot.into_inner().close() {
                tracing::warn!(error = %e, "failed to close node database connection");
                failures += 1;
            }
        }
        failures
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("size", &self.slots.len())
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MemorySource;

    impl ConnectionSource for MemorySource {
        fn open(&self) -> NodeDbResult<Connection> {
            Connection::open_in_memory().map_err(|e| NodeDbError::Connection {
                context: "memory".to_string(),
                message: "open failed".to_string(),
                source: Some(e),
            })
        }

        fn describe(&self) -> String {
            "memory".to_string()
        }
    }

    struct BrokenSource;

    impl ConnectionSource for BrokenSource {
        fn open(&self) -> NodeDbResult<Connection> {
            Err(NodeDbError::connection("broken", "database unreachable"))
        }

        fn describe(&self) -> String {
            "broken".to_string()
        }
    }

    #[test]
    fn opens_requested_size() {
        let pool = ConnectionPool::open(&MemorySource, 3, Duration::from_millis(10)).unwrap();
        assert_eq!(pool.size(), 3);
        assert_eq!(pool.close(), 0);
    }

    #[test]
    fn zero_size_is_rejected() {
        let err = ConnectionPool::open(&MemorySource, 0, Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, NodeDbError::InvalidConfig { .. }));
    }

    #[test]
    fn source_failure_propagates() {
        let err = ConnectionPool::open(&BrokenSource, 2, Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, NodeDbError::Connection { .. }));
    }

    #[test]
    fn acquire_hands_out_distinct_connections() {
        let pool = ConnectionPool::open(&MemorySource, 2, Duration::from_millis(10)).unwrap();
        let a = pool.acquire("test").unwrap();
        let b = pool.acquire("test").unwrap();
        assert!(!std::ptr::eq(&*a, &*b));
    }

    #[test]
    fn exhausted_pool_times_out() {
        let pool = ConnectionPool::open(&MemorySource, 1, Duration::from_millis(20)).unwrap();
        let _held = pool.acquire("first").unwrap();
        let err = pool.acquire("second").unwrap_err();
        match err {
            NodeDbError::Timeout { operation, waited } => {
                assert_eq!(operation, "second");
                assert_eq!(waited, Duration::from_millis(20));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn waiter_takes_whichever_slot_frees_first() {
        let pool = ConnectionPool::open(&MemorySource, 2, Duration::from_millis(300)).unwrap();
        let a = pool.acquire("a").unwrap();
        let b = pool.acquire("b").unwrap();

        std::thread::scope(|scope| {
            let waiter = scope.spawn(|| {
                let started = Instant::now();
                let result = pool.acquire("c").map(drop);
                (result, started.elapsed())
            });

            std::thread::sleep(Duration::from_millis(20));
            drop(b);

            let (result, elapsed) = waiter.join().unwrap();
            assert!(result.is_ok(), "{result:?}");
            assert!(elapsed < Duration::from_millis(200), "waited {elapsed:?}");
        });
        drop(a);
    }

    #[test]
    fn released_connection_is_reusable() {
        let pool = ConnectionPool::open(&MemorySource, 1, Duration::from_millis(20)).unwrap();
        drop(pool.acquire("first").unwrap());
        assert!(pool.acquire("second").is_ok());
    }
}
