//! Session-scoped translation of captured handles to live handles
//!
//! The replay dispatcher inserts a mapping after every call that creates an
//! object; decoders only read. Lookups take a shared lock, insertions an
//! exclusive one. Every insertion bumps a generation counter and wakes
//! threads blocked in [`HandleRemapContext::wait_for`], which is how a
//! parallel decoder waits for the call that creates a handle it references.

use std::sync::{Condvar, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use hashbrown::hash_map::Entry;
use tracing::trace;

use crate::handle::{HandleId, HandleType, LiveHandle};

/// Error returned to the dispatcher when a mapping cannot be recorded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemapError {
    #[error(
        "captured handle {id:?} of type {handle_type:?} is already mapped to {existing:?}, refusing {attempted:?}"
    )]
    Conflict {
        handle_type: HandleType,
        id: HandleId,
        existing: LiveHandle,
        attempted: LiveHandle,
    },

    #[error(
        "captured handle {id:?} of type {handle_type:?} was destroyed, refusing to map it again"
    )]
    Destroyed { handle_type: HandleType, id: HandleId },

    #[error("the null handle cannot be mapped")]
    NullHandle,
}

type Key = (HandleType, HandleId);

/// Table entry; destroyed keys stay as tombstones so ids are never reassigned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Live(LiveHandle),
    Destroyed,
}

impl Slot {
    fn live(self) -> Option<LiveHandle> {
        match self {
            Self::Live(live) => Some(live),
            Self::Destroyed => None,
        }
    }
}

/// Handle remap table for one replay session
#[derive(Debug, Default)]
pub struct HandleRemapContext {
    table: RwLock<HashMap<Key, Slot>>,
    generation: Mutex<u64>,
    inserted: Condvar,
}

impl HandleRemapContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `(handle_type, id) -> live`
    ///
    /// Entries are write-once: inserting the same mapping again is a no-op,
    /// a different live handle for an existing key is a [`RemapError::Conflict`]
    /// and a key that was removed is [`RemapError::Destroyed`].
    pub fn insert(
        &self,
        handle_type: HandleType,
        id: HandleId,
        live: LiveHandle,
    ) -> Result<(), RemapError> {
        if id.is_null() {
            return Err(RemapError::NullHandle);
        }

        {
            let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
            match table.entry((handle_type, id)) {
                Entry::Occupied(entry) => {
                    return match *entry.get() {
                        Slot::Live(existing) if existing == live => Ok(()),
                        Slot::Live(existing) => Err(RemapError::Conflict {
                            handle_type,
                            id,
                            existing,
                            attempted: live,
                        }),
                        Slot::Destroyed => Err(RemapError::Destroyed { handle_type, id }),
                    };
                }
                Entry::Vacant(entry) => {
                    entry.insert(Slot::Live(live));
                }
            }
        }

        let mut generation = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *generation += 1;
        self.inserted.notify_all();
        trace!(
            handle_type = handle_type.0,
            id = id.0,
            live = live.0,
            "handle mapped"
        );
        Ok(())
    }

    /// Forget a mapping when the dispatcher destroys the object
    ///
    /// The key stays reserved: capture never reuses an id within one trace,
    /// so a later insert for it is refused.
    pub fn remove(&self, handle_type: HandleType, id: HandleId) -> Option<LiveHandle> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let slot = table.get_mut(&(handle_type, id))?;
        std::mem::replace(slot, Slot::Destroyed).live()
    }

    /// Look up a mapping without blocking
    pub fn resolve(&self, handle_type: HandleType, id: HandleId) -> Option<LiveHandle> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(handle_type, id))
            .and_then(|slot| slot.live())
    }

    /// Look up a mapping, blocking until it is inserted or `timeout` elapses
    pub fn wait_for(
        &self,
        handle_type: HandleType,
        id: HandleId,
        timeout: Duration,
    ) -> Option<LiveHandle> {
        let deadline = Instant::now() + timeout;
        let mut generation = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        loop {
            if let Some(live) = self.resolve(handle_type, id) {
                return Some(live);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .inserted
                .wait_timeout(generation, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            generation = guard;
        }
    }

    /// Number of insertions so far
    pub fn generation(&self) -> u64 {
        *self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live mappings
    pub fn len(&self) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| matches!(slot, Slot::Live(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
