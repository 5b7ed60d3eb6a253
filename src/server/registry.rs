//! Live connections keyed by remote address.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use parking_lot::Mutex;

use crate::connection::{Connection, ConnectionState};
use crate::error::{FramelinkError, Result};

/// Connection registry. One lock guards the whole map; it is never held
/// across I/O or an await.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Mutex<HashMap<String, Connection>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `conn` under its peer address.
    ///
    /// An occupied key is a [`FramelinkError::RegistrationConflict`] and
    /// leaves the existing entry untouched.
    pub fn register(&self, conn: &Connection) -> Result<()> {
        self.register_with(conn, |_| Ok(()))
    }

    /// Like [`register`](Self::register), but runs `activate` on a vacant
    /// key before inserting, with the lock held. A failed activation leaves
    /// the registry unchanged.
    ///
    /// `activate` must not block or touch the registry.
    pub fn register_with<F>(&self, conn: &Connection, activate: F) -> Result<()>
    where
        F: FnOnce(&Connection) -> Result<()>,
    {
        let mut entries = self.entries.lock();
        match entries.entry(conn.peer_addr().to_string()) {
            Entry::Occupied(occupied) => Err(FramelinkError::RegistrationConflict(occupied.key().clone())),
            Entry::Vacant(vacant) => {
                activate(conn)?;
                vacant.insert(conn.clone());
                Ok(())
            }
        }
    }

    pub fn get(&self, peer_addr: &str) -> Option<Connection> {
        self.entries.lock().get(peer_addr).cloned()
    }

    pub fn contains(&self, peer_addr: &str) -> bool {
        self.entries.lock().contains_key(peer_addr)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Snapshot of the registered connections.
    pub fn connections(&self) -> Vec<Connection> {
        self.entries.lock().values().cloned().collect()
    }

    /// Remove every entry whose connection has closed and return their
    /// keys. Entries not yet started are kept. Closes nothing.
    pub fn sweep(&self) -> Vec<String> {
        let mut entries = self.entries.lock();
        let dead: Vec<String> = entries
            .iter()
            .filter(|(_, conn)| conn.state() == ConnectionState::Closed)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &dead {
            entries.remove(key);
        }
        dead
    }

    /// Empty the registry, handing back what it held.
    pub(crate) fn drain(&self) -> Vec<Connection> {
        self.entries.lock().drain().map(|(_, conn)| conn).collect()
    }
}
