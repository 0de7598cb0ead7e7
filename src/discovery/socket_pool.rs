//! Endpoint to socket map kept by a discovered pool.
//!
//! Endpoints are kept in a `BTreeMap`, so reconciliation visits them in a
//! stable lexical order and LOST/FOUND events come out deterministically.

use std::collections::{BTreeMap, BTreeSet};

/// Endpoints to close and to open so that a pool matches a desired set.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct PoolDiff {
    /// Live endpoints missing from the desired set.
    pub(crate) lost: Vec<String>,
    /// Desired endpoints without a live socket.
    pub(crate) found: Vec<String>,
}

impl PoolDiff {
    pub(crate) fn is_empty(&self) -> bool {
        self.lost.is_empty() && self.found.is_empty()
    }
}

/// Live sockets of a pool, one per endpoint.
#[derive(Debug)]
pub(crate) struct SocketPool<S> {
    sockets: BTreeMap<String, S>,
}

impl<S> SocketPool<S> {
    pub(crate) fn new() -> Self {
        Self {
            sockets: BTreeMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.sockets.len()
    }

    /// Returns `true` if `socket` is one of the pool's sockets.
    pub(crate) fn holds(&self, socket: &S) -> bool
    where
        S: PartialEq,
    {
        self.sockets.values().any(|live| live == socket)
    }

    /// Live endpoints in lexical order.
    pub(crate) fn endpoints(&self) -> Vec<String> {
        self.sockets.keys().cloned().collect()
    }

    /// Adds a socket. Returns the socket it replaced, if any.
    pub(crate) fn insert(&mut self, endpoint: String, socket: S) -> Option<S> {
        self.sockets.insert(endpoint, socket)
    }

    pub(crate) fn remove(&mut self, endpoint: &str) -> Option<S> {
        self.sockets.remove(endpoint)
    }

    /// Empties the pool, returning every socket in endpoint order.
    pub(crate) fn drain(&mut self) -> Vec<(String, S)> {
        std::mem::take(&mut self.sockets).into_iter().collect()
    }

    /// Compares the live endpoints with `desired`.
    pub(crate) fn diff(&self, desired: &BTreeSet<String>) -> PoolDiff {
        let lost = self
            .sockets
            .keys()
            .filter(|endpoint| !desired.contains(*endpoint))
            .cloned()
            .collect();
        let found = desired
            .iter()
            .filter(|endpoint| !self.sockets.contains_key(*endpoint))
            .cloned()
            .collect();
        PoolDiff { lost, found }
    }
}

impl<S> Default for SocketPool<S> {
    fn default() -> Self {
        Self::new()
    }
}
