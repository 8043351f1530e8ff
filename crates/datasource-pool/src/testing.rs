//! In-memory connection manager for exercising pools without a database.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use r2d2::ManageConnection;

/// Error raised by [`MemoryManager`] while the network is unreachable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{url} is unreachable")]
pub struct MemoryError {
    pub url: String,
}

/// A connection handed out by [`MemoryManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConnection {
    pub id: u64,
    pub url: String,
}

#[derive(Debug)]
struct NetworkState {
    reachable: AtomicBool,
    connects: AtomicU64,
}

/// Shared switch controlling whether managers created from it can connect.
#[derive(Debug, Clone)]
pub struct MemoryNetwork {
    state: Arc<NetworkState>,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self {
            state: Arc::new(NetworkState {
                reachable: AtomicBool::new(true),
                connects: AtomicU64::new(0),
            }),
        }
    }

    /// Toggle reachability; existing connections become invalid while unreachable.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Successful connects across every manager sharing this network.
    pub fn connects(&self) -> u64 {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Connection manager for `url`.
    pub fn manager(&self, url: &str) -> MemoryManager {
        MemoryManager {
            url: url.to_owned(),
            state: Arc::clone(&self.state),
        }
    }
}

/// r2d2 connection manager backed by a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemoryManager {
    url: String,
    state: Arc<NetworkState>,
}

impl MemoryManager {
    fn check(&self) -> Result<(), MemoryError> {
        if self.state.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MemoryError {
                url: self.url.clone(),
            })
        }
    }
}

impl ManageConnection for MemoryManager {
    type Connection = MemoryConnection;
    type Error = MemoryError;

    fn connect(&self) -> Result<MemoryConnection, MemoryError> {
        self.check()?;
        let id = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MemoryConnection {
            id,
            url: self.url.clone(),
        })
    }

    fn is_valid(&self, _conn: &mut MemoryConnection) -> Result<(), MemoryError> {
        self.check()
    }

    fn has_broken(&self, _conn: &mut MemoryConnection) -> bool {
        false
    }
}
