use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;

use crate::{Datatype, UnitOfWork};

/// A cached row: field name to value, as produced by `Entity::to_datatypes`.
pub type Snapshot = Vec<(&'static str, Datatype)>;

#[derive(Clone, Debug)]
enum Write {
    Set(String, Snapshot),
    Delete(String),
}

#[derive(Debug, Default)]
struct State {
    entries: IndexMap<String, Snapshot>,
    staged: Option<Vec<Write>>,
}

impl State {
    fn apply(&mut self, write: Write) {
        match write {
            Write::Set(key, snapshot) => {
                self.entries.insert(key, snapshot);
            }
            Write::Delete(key) => {
                self.entries.shift_remove(&key);
            }
        }
    }

    fn write(&mut self, write: Write) {
        match &mut self.staged {
            Some(staged) => staged.push(write),
            None => self.apply(write),
        }
    }
}

/// An in-memory keyed cache that doubles as a [`UnitOfWork`].
///
/// While a unit of work is open, writes are staged and become visible to
/// other readers only on commit. Reads see staged writes first.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("a unit of work is already open")]
    TransactionAlreadyOpen,
    #[error("no unit of work is open")]
    NoOpenTransaction,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, key: impl Into<String>, snapshot: Snapshot) {
        self.state().write(Write::Set(key.into(), snapshot));
    }

    pub fn delete(&self, key: impl Into<String>) {
        self.state().write(Write::Delete(key.into()));
    }

    pub fn get(&self, key: &str) -> Option<Snapshot> {
        let state = self.state();

        let staged = state.staged.iter().flatten().rev().find_map(|write| match write {
            Write::Set(k, snapshot) if k == key => Some(Some(snapshot.clone())),
            Write::Delete(k) if k == key => Some(None),
            _ => None,
        });

        staged.unwrap_or_else(|| state.entries.get(key).cloned())
    }

    /// Committed keys, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.state().entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }

    pub fn in_transaction(&self) -> bool {
        self.state().staged.is_some()
    }
}

impl UnitOfWork for MemoryStore {
    type Error = StoreError;

    fn begin(&self) -> Result<(), Self::Error> {
        let mut state = self.state();
        if state.staged.is_some() {
            return Err(StoreError::TransactionAlreadyOpen);
        }
        state.staged = Some(Vec::new());
        Ok(())
    }

    fn commit(&self) -> Result<(), Self::Error> {
        let mut state = self.state();
        let staged = state.staged.take().ok_or(StoreError::NoOpenTransaction)?;
        for write in staged {
            state.apply(write);
        }
        Ok(())
    }

    fn rollback(&self) -> Result<(), Self::Error> {
        self.state()
            .staged
            .take()
            .map(drop)
            .ok_or(StoreError::NoOpenTransaction)
    }
}
