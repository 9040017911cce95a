use std::fmt::Debug;
use std::sync::Arc;
use parking_lot::MutexGuard;
use tracing::{debug, warn};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::partition::Partition;
use crate::core::types::{AttributeId, Entry, EntryId, Value};
use crate::index::index::{Index, IndexChange};

/// Transaction state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

/// Which index a batch of undo changes belongs to.
#[derive(Debug, Clone)]
enum UndoOp {
    User(AttributeId, Vec<IndexChange<Value>>),
    Presence(Vec<IndexChange<AttributeId>>),
    EntryName(Vec<IndexChange<String>>),
    OneLevel(Vec<IndexChange<EntryId>>),
    SubLevel(Vec<IndexChange<EntryId>>),
    Alias(Vec<IndexChange<String>>),
    OneAlias(Vec<IndexChange<EntryId>>),
    SubAlias(Vec<IndexChange<EntryId>>),
    Master(EntryId, Option<Arc<Entry>>),
}

/// Single-writer transaction over one partition.
///
/// Every index change is applied immediately and its inverse is logged.
/// `commit` forgets the log; `rollback` (or dropping an active transaction)
/// replays it backwards, leaving every index and the master table as they
/// were at `begin`.
pub struct WriteTransaction<'a> {
    partition: &'a Partition,
    undo: Vec<UndoOp>,
    state: TransactionState,
    _writer: MutexGuard<'a, ()>,
}

impl<'a> WriteTransaction<'a> {
    pub(crate) fn begin(partition: &'a Partition, writer: MutexGuard<'a, ()>) -> Self {
        WriteTransaction {
            partition,
            undo: Vec::new(),
            state: TransactionState::Active,
            _writer: writer,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn user(&mut self, attribute: &AttributeId, changes: Vec<IndexChange<Value>>) -> Result<()> {
        self.check_active()?;
        let index = self.partition.user_index(attribute)?;
        let undo = index.apply(&changes)?;
        self.undo.push(UndoOp::User(attribute.clone(), undo));
        Ok(())
    }

    pub fn presence(&mut self, changes: Vec<IndexChange<AttributeId>>) -> Result<()> {
        let undo = self.stage(self.partition.presence_index(), &changes)?;
        self.undo.push(UndoOp::Presence(undo));
        Ok(())
    }

    pub fn entry_name(&mut self, changes: Vec<IndexChange<String>>) -> Result<()> {
        let undo = self.stage(&self.partition.system().entry_name, &changes)?;
        self.undo.push(UndoOp::EntryName(undo));
        Ok(())
    }

    pub fn one_level(&mut self, changes: Vec<IndexChange<EntryId>>) -> Result<()> {
        let undo = self.stage(&self.partition.system().one_level, &changes)?;
        self.undo.push(UndoOp::OneLevel(undo));
        Ok(())
    }

    pub fn sub_level(&mut self, changes: Vec<IndexChange<EntryId>>) -> Result<()> {
        let undo = self.stage(&self.partition.system().sub_level, &changes)?;
        self.undo.push(UndoOp::SubLevel(undo));
        Ok(())
    }

    pub fn alias(&mut self, changes: Vec<IndexChange<String>>) -> Result<()> {
        let undo = self.stage(&self.partition.system().alias, &changes)?;
        self.undo.push(UndoOp::Alias(undo));
        Ok(())
    }

    pub fn one_alias(&mut self, changes: Vec<IndexChange<EntryId>>) -> Result<()> {
        let undo = self.stage(&self.partition.system().one_alias, &changes)?;
        self.undo.push(UndoOp::OneAlias(undo));
        Ok(())
    }

    pub fn sub_alias(&mut self, changes: Vec<IndexChange<EntryId>>) -> Result<()> {
        let undo = self.stage(&self.partition.system().sub_alias, &changes)?;
        self.undo.push(UndoOp::SubAlias(undo));
        Ok(())
    }

    /// Stores or replaces the record under its id.
    pub fn put_entry(&mut self, entry: Arc<Entry>) -> Result<()> {
        self.check_active()?;
        let id = entry.id;
        let previous = self.partition.replace_master(id, Some(entry));
        self.undo.push(UndoOp::Master(id, previous));
        Ok(())
    }

    pub fn remove_entry(&mut self, id: EntryId) -> Result<()> {
        self.check_active()?;
        let previous = self.partition.replace_master(id, None);
        self.undo.push(UndoOp::Master(id, previous));
        Ok(())
    }

    pub fn commit(mut self) -> Result<()> {
        self.check_active()?;
        debug!(changes = self.undo.len(), "transaction committed");
        self.undo.clear();
        self.state = TransactionState::Committed;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.check_active()?;
        self.undo_all()
    }

    fn stage<K: Ord + Clone + Debug>(
        &self,
        index: &Index<K>,
        changes: &[IndexChange<K>],
    ) -> Result<Vec<IndexChange<K>>> {
        self.check_active()?;
        index.apply(changes)
    }

    fn undo_all(&mut self) -> Result<()> {
        self.state = TransactionState::Aborted;
        let partition = self.partition;
        let mut first_error = None;

        while let Some(op) = self.undo.pop() {
            let result = match op {
                UndoOp::User(attribute, changes) => partition
                    .user_index(&attribute)
                    .and_then(|index| revert(&index, changes)),
                UndoOp::Presence(changes) => revert(partition.presence_index(), changes),
                UndoOp::EntryName(changes) => revert(&partition.system().entry_name, changes),
                UndoOp::OneLevel(changes) => revert(&partition.system().one_level, changes),
                UndoOp::SubLevel(changes) => revert(&partition.system().sub_level, changes),
                UndoOp::Alias(changes) => revert(&partition.system().alias, changes),
                UndoOp::OneAlias(changes) => revert(&partition.system().one_alias, changes),
                UndoOp::SubAlias(changes) => revert(&partition.system().sub_alias, changes),
                UndoOp::Master(id, previous) => {
                    partition.replace_master(id, previous);
                    Ok(())
                }
            };
            if let Err(e) = result {
                warn!(error = %e, "failed to undo index change during rollback");
                first_error.get_or_insert(e);
            }
        }

        debug!("transaction rolled back");
        match first_error {
            None => Ok(()),
            Some(e) => Err(Error::new(
                ErrorKind::InvariantViolation,
                format!("rollback incomplete: {}", e),
            )),
        }
    }

    fn check_active(&self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(Error::new(
                ErrorKind::NotAllowed,
                "Transaction is not active".to_string(),
            ));
        }
        Ok(())
    }
}

impl Drop for WriteTransaction<'_> {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            let _ = self.undo_all();
        }
    }
}

fn revert<K: Ord + Clone + Debug>(index: &Index<K>, mut changes: Vec<IndexChange<K>>) -> Result<()> {
    changes.reverse();
    index.apply(&changes).map(|_| ())
}
