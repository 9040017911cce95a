use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};
use crate::core::config::PartitionConfig;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::master::{MasterCursor, MasterTable};
use crate::core::stats::PartitionStats;
use crate::core::transaction::WriteTransaction;
use crate::core::types::{AttributeId, Dn, Entry, EntryId, Modification, ModificationOp, Rdn, Value};
use crate::index::index::{Index, IndexChange};
use crate::index::system::{IndexStats, SystemIndex, SystemIndices, PRESENCE_INDEX};
use crate::schema::schema::{AttributeSchema, Schema};

/// Resolved alias -> target relation of one alias entry.
#[derive(Debug, Clone)]
struct AliasLink {
    alias: EntryId,
    parent: Option<EntryId>,
    target_ndn: String,
    target: EntryId,
    target_dn: Dn,
}

/// In-memory entry store with its system, presence and user indices.
///
/// Readers never block each other: lookups and cursors work on `Arc`
/// snapshots. All mutations go through a single writer lock and a
/// [`WriteTransaction`], so a failed operation leaves nothing behind.
pub struct Partition {
    config: PartitionConfig,
    schema: Arc<dyn Schema>,
    suffix: Dn,
    master: RwLock<Arc<MasterTable>>,
    next_id: AtomicU64,
    system: SystemIndices,
    presence: Index<AttributeId>,
    user: RwLock<HashMap<AttributeId, Arc<Index<Value>>>>,
    writer: Mutex<()>,
}

impl Partition {
    pub fn new(config: PartitionConfig) -> Result<Self> {
        let schema = Arc::new(AttributeSchema::from_config(&config.attribute_types));
        Self::with_schema(config, schema)
    }

    pub fn with_schema(config: PartitionConfig, schema: Arc<dyn Schema>) -> Result<Self> {
        let suffix = Dn::parse(&config.suffix)?;
        if suffix.is_root() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Partition suffix must not be empty".to_string(),
            ));
        }

        let partition = Partition {
            config,
            schema,
            suffix,
            master: RwLock::new(Arc::new(MasterTable::new())),
            next_id: AtomicU64::new(1),
            system: SystemIndices::new(),
            presence: Index::new(PRESENCE_INDEX, true),
            user: RwLock::new(HashMap::new()),
            writer: Mutex::new(()),
        };

        for attribute in partition.config.indexed_attributes.clone() {
            partition.add_index(&attribute)?;
        }

        info!(suffix = %partition.suffix, indices = partition.user.read().len(), "partition opened");
        Ok(partition)
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    pub fn schema(&self) -> &dyn Schema {
        self.schema.as_ref()
    }

    pub fn suffix(&self) -> &Dn {
        &self.suffix
    }

    // ---- index management ----

    /// Creates a user index on `attribute` and fills it from stored entries.
    /// Returns the existing index when there already is one.
    pub fn add_index(&self, attribute: &str) -> Result<Arc<Index<Value>>> {
        let attribute = AttributeId::new(attribute);
        let _writer = self.writer.lock();
        if let Some(existing) = self.user.read().get(&attribute) {
            return Ok(existing.clone());
        }

        let index = Arc::new(Index::new(attribute.as_str(), self.schema.has_ordering(&attribute)));
        let mut tuples = Vec::new();
        let mut present = Vec::new();
        for (id, entry) in self.master_snapshot().iter() {
            if let Some(values) = entry.get(&attribute) {
                for value in self.normalize_all(&attribute, values)? {
                    tuples.push(IndexChange::Add(value, *id));
                }
                present.push(IndexChange::Add(attribute.clone(), *id));
            }
        }
        index.apply(&tuples)?;
        self.presence.apply(&present)?;

        debug!(attribute = %attribute, tuples = tuples.len(), ordered = index.is_ordered(), "user index created");
        self.user.write().insert(attribute, index.clone());
        Ok(index)
    }

    pub fn user_index(&self, attribute: &AttributeId) -> Result<Arc<Index<Value>>> {
        self.find_user_index(attribute).ok_or_else(|| {
            Error::new(
                ErrorKind::NoSuchIndex,
                format!("No user index on attribute '{}'", attribute),
            )
        })
    }

    pub fn find_user_index(&self, attribute: &AttributeId) -> Option<Arc<Index<Value>>> {
        self.user.read().get(attribute).cloned()
    }

    pub fn has_user_index(&self, attribute: &AttributeId) -> bool {
        self.user.read().contains_key(attribute)
    }

    pub fn indexed_attributes(&self) -> Vec<AttributeId> {
        let mut attributes: Vec<_> = self.user.read().keys().cloned().collect();
        attributes.sort();
        attributes
    }

    /// attribute -> ids of entries holding at least one value of it,
    /// maintained for user-indexed attributes only.
    pub fn presence_index(&self) -> &Index<AttributeId> {
        &self.presence
    }

    pub fn system(&self) -> &SystemIndices {
        &self.system
    }

    pub fn system_index(&self, name: &str) -> Result<SystemIndex<'_>> {
        self.system.get(name)
    }

    // ---- record store ----

    pub fn lookup(&self, id: EntryId) -> Result<Arc<Entry>> {
        self.get_entry(id)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("No entry with id {}", id)))
    }

    pub fn get_entry(&self, id: EntryId) -> Option<Arc<Entry>> {
        self.master.read().get(&id).cloned()
    }

    pub fn entry_id(&self, dn: &Dn) -> Option<EntryId> {
        self.entry_id_by_ndn(&dn.normalized())
    }

    fn entry_id_by_ndn(&self, ndn: &str) -> Option<EntryId> {
        self.system.entry_name.forward(&ndn.to_string()).min().map(EntryId)
    }

    pub fn lookup_dn(&self, dn: &Dn) -> Result<Arc<Entry>> {
        let id = self
            .entry_id(dn)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("No entry named '{}'", dn)))?;
        self.lookup(id)
    }

    pub fn child_count(&self, id: EntryId) -> u64 {
        self.system.one_level.count_value(&id)
    }

    pub fn count(&self) -> u64 {
        self.master.read().len() as u64
    }

    pub fn master_snapshot(&self) -> Arc<MasterTable> {
        self.master.read().clone()
    }

    pub fn master_cursor(&self) -> MasterCursor {
        MasterCursor::new(self.master_snapshot())
    }

    pub(crate) fn replace_master(&self, id: EntryId, entry: Option<Arc<Entry>>) -> Option<Arc<Entry>> {
        let mut guard = self.master.write();
        let table = Arc::make_mut(&mut *guard);
        match entry {
            Some(entry) => table.insert(id, entry),
            None => table.remove(&id),
        }
    }

    /// Starts a raw transaction holding the writer lock.
    pub fn begin(&self) -> WriteTransaction<'_> {
        WriteTransaction::begin(self, self.writer.lock())
    }

    pub fn stats(&self) -> PartitionStats {
        let user = self.user.read();
        let mut user_indices: Vec<_> = user.values().map(|i| IndexStats::of(i.as_ref())).collect();
        user_indices.sort_by(|a, b| a.name.cmp(&b.name));
        PartitionStats {
            suffix: self.suffix.to_string(),
            entry_count: self.count(),
            next_id: self.next_id.load(Ordering::SeqCst),
            system_indices: self.system.stats(),
            presence: IndexStats::of(&self.presence),
            user_indices,
        }
    }

    // ---- writes ----

    /// Stores a new entry and indexes it. The parent must exist unless the
    /// entry is the partition suffix.
    pub fn add(&self, mut entry: Entry) -> Result<EntryId> {
        let writer = self.writer.lock();

        let ndn = entry.dn.normalized();
        if self.entry_id_by_ndn(&ndn).is_some() {
            return Err(Error::new(ErrorKind::AlreadyExists, format!("Entry '{}' already exists", entry.dn)));
        }

        let parent = if ndn == self.suffix.normalized() {
            None
        } else {
            if !entry.dn.is_descendant_of(&self.suffix) {
                return Err(Error::new(
                    ErrorKind::NotAllowed,
                    format!("'{}' is outside partition '{}'", entry.dn, self.suffix),
                ));
            }
            let parent_dn = entry.dn.parent().unwrap_or_else(Dn::root);
            let parent_id = self.entry_id(&parent_dn).ok_or_else(|| {
                Error::new(ErrorKind::NotFound, format!("Parent '{}' does not exist", parent_dn))
            })?;
            if self.lookup(parent_id)?.is_alias() {
                return Err(Error::new(
                    ErrorKind::NotAllowed,
                    format!("Cannot add '{}' below an alias", entry.dn),
                ));
            }
            Some(parent_id)
        };

        self.ensure_rdn_value(&mut entry)?;
        self.validate_values(&entry)?;

        let id = EntryId(self.next_id.fetch_add(1, Ordering::SeqCst));
        entry.id = id;
        entry.parent = parent;
        let link = if entry.is_alias() { Some(self.alias_link(&entry)?) } else { None };
        let entry = Arc::new(entry);

        let mut txn = WriteTransaction::begin(self, writer);
        txn.put_entry(entry.clone())?;
        txn.entry_name(vec![IndexChange::Add(ndn, id)])?;
        if let Some(parent) = parent {
            txn.one_level(vec![IndexChange::Add(parent, id)])?;
        }
        let mut sub_level = vec![IndexChange::Add(id, id)];
        sub_level.extend(self.ancestors(parent)?.into_iter().map(|a| IndexChange::Add(a, id)));
        txn.sub_level(sub_level)?;
        self.index_attribute_changes(&mut txn, id, &Entry::new(Dn::root()), &entry)?;
        if let Some(link) = &link {
            self.add_alias_indices(&mut txn, link)?;
        }
        txn.commit()?;

        debug!(%id, dn = %entry.dn, alias = link.is_some(), "entry added");
        Ok(id)
    }

    /// Applies attribute modifications to one entry.
    pub fn modify(&self, id: EntryId, modifications: &[Modification]) -> Result<()> {
        let writer = self.writer.lock();
        let old = self.lookup(id)?;

        let mut updated = (*old).clone();
        for modification in modifications {
            self.apply_modification(&mut updated, modification)?;
        }
        self.validate_values(&updated)?;

        let old_link = if old.is_alias() { Some(self.existing_alias_link(&old)?) } else { None };
        let new_link = if updated.is_alias() { Some(self.alias_link(&updated)?) } else { None };
        let relink = old_link.as_ref().map(|l| l.target) != new_link.as_ref().map(|l| l.target);

        let updated = Arc::new(updated);
        let mut txn = WriteTransaction::begin(self, writer);
        if relink {
            if let Some(link) = &old_link {
                self.drop_alias_indices(&mut txn, link)?;
            }
        }
        self.index_attribute_changes(&mut txn, id, &old, &updated)?;
        txn.put_entry(updated)?;
        if relink {
            if let Some(link) = &new_link {
                self.add_alias_indices(&mut txn, link)?;
            }
        }
        txn.commit()?;

        debug!(%id, modifications = modifications.len(), "entry modified");
        Ok(())
    }

    /// Removes a leaf entry and every index tuple referencing it.
    pub fn delete(&self, id: EntryId) -> Result<()> {
        let writer = self.writer.lock();
        let entry = self.lookup(id)?;

        if self.child_count(id) > 0 {
            return Err(Error::new(
                ErrorKind::NotAllowedOnNonLeaf,
                format!("Entry '{}' has children", entry.dn),
            ));
        }
        let ndn = entry.dn.normalized();
        if self.system.alias.count_value(&ndn) > 0 {
            return Err(Error::new(
                ErrorKind::NotAllowed,
                format!("Entry '{}' is the target of an alias", entry.dn),
            ));
        }
        let link = if entry.is_alias() { Some(self.existing_alias_link(&entry)?) } else { None };

        let mut txn = WriteTransaction::begin(self, writer);
        if let Some(link) = &link {
            self.drop_alias_indices(&mut txn, link)?;
        }
        let user: Vec<_> = self.user.read().iter().map(|(a, i)| (a.clone(), i.clone())).collect();
        for (attribute, index) in user {
            let drops = drop_all(index.reverse_values(id), id);
            if !drops.is_empty() {
                txn.user(&attribute, drops)?;
            }
        }
        txn.presence(drop_all(self.presence.reverse_values(id), id))?;
        txn.entry_name(vec![IndexChange::Drop(ndn, id)])?;
        if let Some(parent) = entry.parent {
            txn.one_level(vec![IndexChange::Drop(parent, id)])?;
        }
        txn.sub_level(drop_all(self.system.sub_level.reverse_values(id), id))?;
        txn.remove_entry(id)?;
        txn.commit()?;

        debug!(%id, dn = %entry.dn, "entry deleted");
        Ok(())
    }

    /// Gives the entry a new RDN under the same parent. The new RDN value
    /// is added to the entry; the old one is kept.
    pub fn rename(&self, id: EntryId, new_rdn: Rdn) -> Result<()> {
        self.move_and_rename(id, None, Some(new_rdn))
    }

    /// Moves the entry and its whole subtree below `new_parent`.
    pub fn move_entry(&self, id: EntryId, new_parent: &Dn) -> Result<()> {
        self.move_and_rename(id, Some(new_parent), None)
    }

    pub fn move_and_rename(&self, id: EntryId, new_parent: Option<&Dn>, new_rdn: Option<Rdn>) -> Result<()> {
        let writer = self.writer.lock();
        let entry = self.lookup(id)?;
        let old_parent = entry.parent.ok_or_else(|| {
            Error::new(ErrorKind::NotAllowed, "The partition suffix cannot be moved or renamed".to_string())
        })?;

        let new_parent_id = match new_parent {
            None => old_parent,
            Some(dn) => {
                let parent_id = self.entry_id(dn).ok_or_else(|| {
                    Error::new(ErrorKind::NotFound, format!("New parent '{}' does not exist", dn))
                })?;
                if self.system.sub_level.has(&id, parent_id) {
                    return Err(Error::new(
                        ErrorKind::NotAllowed,
                        format!("Cannot move '{}' below itself", entry.dn),
                    ));
                }
                if self.lookup(parent_id)?.is_alias() {
                    return Err(Error::new(ErrorKind::NotAllowed, format!("Cannot move '{}' below an alias", entry.dn)));
                }
                parent_id
            }
        };

        let rdn = match new_rdn {
            Some(rdn) => rdn,
            None => entry.dn.rdn().cloned().ok_or_else(|| {
                Error::new(ErrorKind::InvariantViolation, format!("Entry {} has an empty DN", id))
            })?,
        };
        let new_dn = self.lookup(new_parent_id)?.dn.child(rdn);
        let old_ndn = entry.dn.normalized();
        let new_ndn = new_dn.normalized();
        if new_ndn != old_ndn && self.entry_id_by_ndn(&new_ndn).is_some() {
            return Err(Error::new(ErrorKind::AlreadyExists, format!("Entry '{}' already exists", new_dn)));
        }

        let subtree: Vec<EntryId> = self.system.sub_level.forward(&id).iter().map(EntryId).collect();
        let mut moved_aliases = Vec::new();
        for &member in &subtree {
            let member_entry = self.lookup(member)?;
            if self.system.alias.count_value(&member_entry.dn.normalized()) > 0 {
                return Err(Error::new(
                    ErrorKind::NotAllowed,
                    format!("'{}' is the target of an alias and cannot be moved", member_entry.dn),
                ));
            }
            if member_entry.is_alias() {
                moved_aliases.push(self.existing_alias_link(&member_entry)?);
            }
        }
        let old_ancestors = self.ancestors(Some(old_parent))?;
        let new_ancestors = self.ancestors(Some(new_parent_id))?;

        let mut txn = WriteTransaction::begin(self, writer);
        for link in &moved_aliases {
            self.drop_alias_indices(&mut txn, link)?;
        }

        let mut drops = Vec::with_capacity(subtree.len());
        let mut adds = Vec::with_capacity(subtree.len());
        for &member in &subtree {
            let current = self.lookup(member)?;
            let member_dn = current.dn.rebase(&entry.dn, &new_dn).ok_or_else(|| {
                Error::new(
                    ErrorKind::InvariantViolation,
                    format!("'{}' is indexed below '{}' but is not named below it", current.dn, entry.dn),
                )
            })?;
            drops.push(IndexChange::Drop(current.dn.normalized(), member));
            adds.push(IndexChange::Add(member_dn.normalized(), member));

            let mut updated = (*current).clone();
            updated.dn = member_dn;
            if member == id {
                updated.parent = Some(new_parent_id);
                self.ensure_rdn_value(&mut updated)?;
                self.validate_values(&updated)?;
                self.index_attribute_changes(&mut txn, id, &current, &updated)?;
            }
            txn.put_entry(Arc::new(updated))?;
        }
        drops.extend(adds);
        txn.entry_name(drops)?;

        if new_parent_id != old_parent {
            txn.one_level(vec![IndexChange::Drop(old_parent, id), IndexChange::Add(new_parent_id, id)])?;
            let mut changes = Vec::new();
            for &member in &subtree {
                changes.extend(old_ancestors.iter().map(|&a| IndexChange::Drop(a, member)));
                changes.extend(new_ancestors.iter().map(|&a| IndexChange::Add(a, member)));
            }
            txn.sub_level(changes)?;
        }

        for link in &moved_aliases {
            let relinked = self.alias_link(&*self.lookup(link.alias)?)?;
            self.add_alias_indices(&mut txn, &relinked)?;
        }
        txn.commit()?;

        debug!(%id, from = %entry.dn, to = %new_dn, subtree = subtree.len(), "entry moved");
        Ok(())
    }

    // ---- helpers ----

    /// Ids of `parent` and all of its ancestors, nearest first.
    fn ancestors(&self, parent: Option<EntryId>) -> Result<Vec<EntryId>> {
        let mut ancestors = Vec::new();
        let mut current = parent;
        while let Some(id) = current {
            ancestors.push(id);
            current = self.lookup(id)?.parent;
        }
        Ok(ancestors)
    }

    fn normalize_all(&self, attribute: &AttributeId, values: &[Value]) -> Result<BTreeSet<Value>> {
        values.iter().map(|v| self.schema.normalize(attribute, v)).collect()
    }

    fn validate_values(&self, entry: &Entry) -> Result<()> {
        for (attribute, values) in &entry.attributes {
            self.normalize_all(attribute, values)?;
        }
        Ok(())
    }

    fn ensure_rdn_value(&self, entry: &mut Entry) -> Result<()> {
        let Some(rdn) = entry.dn.rdn().cloned() else {
            return Ok(());
        };
        let value = Value::from(rdn.value.as_str());
        let wanted = self.schema.normalize(&rdn.attribute, &value)?;
        let present = match entry.get(&rdn.attribute) {
            Some(values) => self.normalize_all(&rdn.attribute, values)?.contains(&wanted),
            None => false,
        };
        if !present {
            entry.add_value(rdn.attribute, value);
        }
        Ok(())
    }

    fn apply_modification(&self, entry: &mut Entry, modification: &Modification) -> Result<()> {
        let attribute = &modification.attribute;
        let current = entry.attributes.remove(attribute).unwrap_or_default();
        let mut kept = current
            .into_iter()
            .map(|v| -> Result<(Value, Value)> { Ok((self.schema.normalize(attribute, &v)?, v)) })
            .collect::<Result<Vec<_>>>()?;

        match modification.op {
            ModificationOp::Add => {
                for value in &modification.values {
                    let normalized = self.schema.normalize(attribute, value)?;
                    if !kept.iter().any(|(n, _)| *n == normalized) {
                        kept.push((normalized, value.clone()));
                    }
                }
            }
            ModificationOp::Remove => {
                if modification.values.is_empty() {
                    kept.clear();
                } else {
                    let removed = self.normalize_all(attribute, &modification.values)?;
                    kept.retain(|(n, _)| !removed.contains(n));
                }
            }
            ModificationOp::Replace => {
                kept.clear();
                for value in &modification.values {
                    let normalized = self.schema.normalize(attribute, value)?;
                    if !kept.iter().any(|(n, _)| *n == normalized) {
                        kept.push((normalized, value.clone()));
                    }
                }
            }
        }

        if !kept.is_empty() {
            entry.attributes.insert(attribute.clone(), kept.into_iter().map(|(_, v)| v).collect());
        }
        Ok(())
    }

    /// Brings user and presence indices from `old` attribute values to `new` ones.
    fn index_attribute_changes(
        &self,
        txn: &mut WriteTransaction<'_>,
        id: EntryId,
        old: &Entry,
        new: &Entry,
    ) -> Result<()> {
        let attributes: BTreeSet<&AttributeId> = old.attributes.keys().chain(new.attributes.keys()).collect();
        let mut presence = Vec::new();

        for attribute in attributes {
            if !self.has_user_index(attribute) {
                continue;
            }
            let before = self.normalize_all(attribute, old.get(attribute).unwrap_or(&[]))?;
            let after = self.normalize_all(attribute, new.get(attribute).unwrap_or(&[]))?;

            let mut changes: Vec<_> = before.difference(&after).map(|v| IndexChange::Drop(v.clone(), id)).collect();
            changes.extend(after.difference(&before).map(|v| IndexChange::Add(v.clone(), id)));
            if !changes.is_empty() {
                txn.user(attribute, changes)?;
            }

            match (before.is_empty(), after.is_empty()) {
                (true, false) => presence.push(IndexChange::Add(attribute.clone(), id)),
                (false, true) => presence.push(IndexChange::Drop(attribute.clone(), id)),
                _ => {}
            }
        }

        if !presence.is_empty() {
            txn.presence(presence)?;
        }
        Ok(())
    }

    /// Validates a new or changed alias against the current tree.
    fn alias_link(&self, alias: &Entry) -> Result<AliasLink> {
        let target = alias.alias_target().ok_or_else(|| {
            Error::new(ErrorKind::InvalidInput, format!("Alias '{}' has no target", alias.dn))
        })?;
        let target_dn = Dn::parse(target)?;
        let target_ndn = target_dn.normalized();
        let alias_ndn = alias.dn.normalized();

        if target_ndn == alias_ndn {
            return Err(Error::new(ErrorKind::NotAllowed, format!("Alias '{}' refers to itself", alias.dn)));
        }
        if alias.dn.is_descendant_of(&target_dn) {
            return Err(Error::new(
                ErrorKind::NotAllowed,
                format!("Alias '{}' refers to its own ancestor '{}'", alias.dn, target_dn),
            ));
        }
        if self.system.alias.count_value(&alias_ndn) > 0 {
            return Err(Error::new(
                ErrorKind::NotAllowed,
                format!("'{}' is the target of another alias and cannot become one", alias.dn),
            ));
        }
        let target_id = self.entry_id_by_ndn(&target_ndn).ok_or_else(|| {
            Error::new(ErrorKind::NotFound, format!("Alias target '{}' does not exist", target_dn))
        })?;
        let target_entry = self.lookup(target_id)?;
        if target_entry.is_alias() {
            return Err(Error::new(
                ErrorKind::NotAllowed,
                format!("Alias '{}' refers to another alias '{}'", alias.dn, target_dn),
            ));
        }

        Ok(AliasLink {
            alias: alias.id,
            parent: alias.parent,
            target_ndn,
            target: target_id,
            target_dn: target_entry.dn.clone(),
        })
    }

    /// Link of an alias as currently recorded in the alias index.
    fn existing_alias_link(&self, alias: &Entry) -> Result<AliasLink> {
        let missing = |what: &str| {
            Error::new(
                ErrorKind::InvariantViolation,
                format!("Alias {} has no indexed {}", alias.id, what),
            )
        };
        let target_ndn = self.system.alias.reverse(alias.id).ok_or_else(|| missing("target"))?;
        let target = self.entry_id_by_ndn(&target_ndn).ok_or_else(|| missing("target entry"))?;
        Ok(AliasLink {
            alias: alias.id,
            parent: alias.parent,
            target_ndn,
            target,
            target_dn: self.lookup(target)?.dn.clone(),
        })
    }

    fn add_alias_indices(&self, txn: &mut WriteTransaction<'_>, link: &AliasLink) -> Result<()> {
        txn.alias(vec![IndexChange::Add(link.target_ndn.clone(), link.alias)])?;

        let Some(parent) = link.parent else {
            return Ok(());
        };
        let alias_parent_ndn = self.lookup(parent)?.dn.normalized();
        let target_parent_ndn = link.target_dn.parent().map(|p| p.normalized());
        if target_parent_ndn.as_deref() != Some(alias_parent_ndn.as_str()) {
            txn.one_alias(vec![IndexChange::Add(parent, link.target)])?;
        }

        let mut sub_alias = Vec::new();
        for ancestor in self.ancestors(Some(parent))? {
            if !link.target_dn.is_descendant_of(&self.lookup(ancestor)?.dn) {
                sub_alias.push(IndexChange::Add(ancestor, link.target));
            }
        }
        txn.sub_alias(sub_alias)
    }

    /// Removes the alias tuples, keeping the ones another alias still needs.
    fn drop_alias_indices(&self, txn: &mut WriteTransaction<'_>, link: &AliasLink) -> Result<()> {
        let others: Vec<Arc<Entry>> = self
            .system
            .alias
            .forward(&link.target_ndn)
            .iter()
            .map(EntryId)
            .filter(|&other| other != link.alias)
            .map(|other| self.lookup(other))
            .collect::<Result<_>>()?;

        if let Some(parent) = link.parent {
            if !others.iter().any(|o| o.parent == Some(parent)) {
                txn.one_alias(vec![IndexChange::Drop(parent, link.target)])?;
            }
            let mut sub_alias = Vec::new();
            for ancestor in self.ancestors(Some(parent))? {
                if !others.iter().any(|o| self.system.sub_level.has(&ancestor, o.id)) {
                    sub_alias.push(IndexChange::Drop(ancestor, link.target));
                }
            }
            txn.sub_alias(sub_alias)?;
        }

        txn.alias(vec![IndexChange::Drop(link.target_ndn.clone(), link.alias)])
    }
}

fn drop_all<K>(keys: Vec<K>, id: EntryId) -> Vec<IndexChange<K>> {
    keys.into_iter().map(|k| IndexChange::Drop(k, id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::schema::Syntax;

    fn partition() -> Partition {
        let config = PartitionConfig::new("dc=example")
            .with_index("cn")
            .with_index("uidNumber")
            .with_attribute_type("uidNumber", Syntax::Integer, true);
        let p = Partition::new(config).unwrap();
        p.add(Entry::new(Dn::parse("dc=example").unwrap()).with_attribute("objectClass", ["domain"]))
            .unwrap();
        p.add(Entry::new(Dn::parse("ou=people,dc=example").unwrap()).with_attribute("objectClass", ["organizationalUnit"]))
            .unwrap();
        p
    }

    fn person(p: &Partition, name: &str, uid: i64) -> EntryId {
        p.add(
            Entry::new(Dn::parse(&format!("cn={},ou=people,dc=example", name)).unwrap())
                .with_attribute("objectClass", ["person"])
                .with_attribute("uidNumber", [uid]),
        )
        .unwrap()
    }

    #[test]
    fn add_indexes_structure_and_attributes() {
        let p = partition();
        let id = person(&p, "Alice", 10);
        let people = p.entry_id(&Dn::parse("ou=people,dc=example").unwrap()).unwrap();
        let suffix = p.entry_id(p.suffix()).unwrap();

        assert_eq!(p.child_count(people), 1);
        assert!(p.system().sub_level.has(&suffix, id));
        assert!(p.system().sub_level.has(&id, id));
        assert!(p.user_index(&AttributeId::new("cn")).unwrap().has(&Value::from("alice"), id));
        assert!(p.user_index(&AttributeId::new("uidnumber")).unwrap().has(&Value::Integer(10), id));
        assert!(p.presence_index().has(&AttributeId::new("cn"), id));
        assert_eq!(p.count(), 3);
    }

    #[test]
    fn add_rejects_duplicates_and_orphans() {
        let p = partition();
        person(&p, "alice", 1);
        let dup = p.add(Entry::new(Dn::parse("CN=ALICE,ou=people,dc=example").unwrap()));
        assert_eq!(dup.unwrap_err().kind, ErrorKind::AlreadyExists);

        let orphan = p.add(Entry::new(Dn::parse("cn=x,ou=missing,dc=example").unwrap()));
        assert_eq!(orphan.unwrap_err().kind, ErrorKind::NotFound);

        let outside = p.add(Entry::new(Dn::parse("dc=other").unwrap()));
        assert_eq!(outside.unwrap_err().kind, ErrorKind::NotAllowed);
    }

    #[test]
    fn invalid_value_leaves_no_trace() {
        let p = partition();
        let before = p.stats();
        let bad = p.add(
            Entry::new(Dn::parse("cn=bad,ou=people,dc=example").unwrap()).with_attribute("uidNumber", ["many"]),
        );
        assert_eq!(bad.unwrap_err().kind, ErrorKind::InvalidInput);
        let after = p.stats();
        assert_eq!(before.entry_count, after.entry_count);
        assert_eq!(before.system_indices, after.system_indices);
        assert_eq!(before.user_indices, after.user_indices);
    }

    #[test]
    fn delete_requires_leaf() {
        let p = partition();
        let people = p.entry_id(&Dn::parse("ou=people,dc=example").unwrap()).unwrap();
        let id = person(&p, "bob", 2);
        assert_eq!(p.delete(people).unwrap_err().kind, ErrorKind::NotAllowedOnNonLeaf);
        p.delete(id).unwrap();
        assert!(p.get_entry(id).is_none());
        assert!(p.system().sub_level.reverse_values(id).is_empty());
        assert!(p.presence_index().reverse_values(id).is_empty());
        p.delete(people).unwrap();
    }

    #[test]
    fn modify_updates_indices() {
        let p = partition();
        let id = person(&p, "carol", 3);
        p.modify(id, &[Modification::replace("uidNumber", [4i64]), Modification::add("cn", ["Caz"])])
            .unwrap();

        let uid = p.user_index(&AttributeId::new("uidnumber")).unwrap();
        assert!(!uid.has(&Value::Integer(3), id));
        assert!(uid.has(&Value::Integer(4), id));
        assert!(p.user_index(&AttributeId::new("cn")).unwrap().has(&Value::from("caz"), id));

        p.modify(id, &[Modification::remove("uidNumber", Vec::<Value>::new())]).unwrap();
        assert!(uid.reverse_values(id).is_empty());
        assert!(!p.presence_index().has(&AttributeId::new("uidnumber"), id));
    }

    #[test]
    fn add_index_backfills() {
        let p = partition();
        let id = person(&p, "dave", 5);
        let index = p.add_index("objectClass").unwrap();
        assert!(index.has(&Value::from("person"), id));
        assert!(p.presence_index().has(&AttributeId::object_class(), id));
    }

    #[test]
    fn rename_and_move_reindex_subtree() {
        let p = partition();
        let alice = person(&p, "alice", 1);
        let staff = p
            .add(Entry::new(Dn::parse("ou=staff,dc=example").unwrap()))
            .unwrap();
        let people = p.entry_id(&Dn::parse("ou=people,dc=example").unwrap()).unwrap();

        p.rename(people, Rdn::new("ou", "humans")).unwrap();
        assert_eq!(
            p.lookup(alice).unwrap().dn.normalized(),
            "cn=alice,ou=humans,dc=example"
        );
        assert!(p.entry_id(&Dn::parse("ou=people,dc=example").unwrap()).is_none());

        p.move_entry(people, &Dn::parse("ou=staff,dc=example").unwrap()).unwrap();
        assert_eq!(
            p.lookup(alice).unwrap().dn.normalized(),
            "cn=alice,ou=humans,ou=staff,dc=example"
        );
        assert!(p.system().sub_level.has(&staff, alice));
        assert_eq!(p.child_count(staff), 1);

        let err = p.move_entry(staff, &Dn::parse("ou=humans,ou=staff,dc=example").unwrap()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotAllowed);
    }

    #[test]
    fn alias_indices_follow_the_rules() {
        let p = partition();
        let target = person(&p, "target", 9);
        p.add(Entry::new(Dn::parse("ou=links,dc=example").unwrap())).unwrap();
        let links = p.entry_id(&Dn::parse("ou=links,dc=example").unwrap()).unwrap();
        let suffix = p.entry_id(p.suffix()).unwrap();
        let alias = p
            .add(
                Entry::new(Dn::parse("cn=link,ou=links,dc=example").unwrap())
                    .with_attribute("objectClass", ["alias"])
                    .with_attribute("aliasedObjectName", ["cn=target,ou=people,dc=example"]),
            )
            .unwrap();

        assert!(p.system().alias.has(&"cn=target,ou=people,dc=example".to_string(), alias));
        assert!(p.system().one_alias.has(&links, target));
        assert!(p.system().sub_alias.has(&links, target));
        // target already lives below the suffix
        assert!(!p.system().sub_alias.has(&suffix, target));

        assert_eq!(p.delete(target).unwrap_err().kind, ErrorKind::NotAllowed);
        p.delete(alias).unwrap();
        assert_eq!(p.system().one_alias.count(), 0);
        assert_eq!(p.system().sub_alias.count(), 0);
        assert_eq!(p.system().alias.count(), 0);
    }

    #[test]
    fn alias_chains_are_refused() {
        let p = partition();
        person(&p, "target", 9);
        p.add(
            Entry::new(Dn::parse("cn=a1,dc=example").unwrap())
                .with_attribute("objectClass", ["alias"])
                .with_attribute("aliasedObjectName", ["cn=target,ou=people,dc=example"]),
        )
        .unwrap();
        let chained = p.add(
            Entry::new(Dn::parse("cn=a2,dc=example").unwrap())
                .with_attribute("objectClass", ["alias"])
                .with_attribute("aliasedObjectName", ["cn=a1,dc=example"]),
        );
        assert_eq!(chained.unwrap_err().kind, ErrorKind::NotAllowed);

        let to_ancestor = p.add(
            Entry::new(Dn::parse("cn=up,ou=people,dc=example").unwrap())
                .with_attribute("objectClass", ["alias"])
                .with_attribute("aliasedObjectName", ["dc=example"]),
        );
        assert_eq!(to_ancestor.unwrap_err().kind, ErrorKind::NotAllowed);
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let p = partition();
        let id = person(&p, "erin", 7);
        {
            let mut txn = p.begin();
            txn.user(&AttributeId::new("cn"), vec![IndexChange::Add(Value::from("ghost"), id)]).unwrap();
            txn.remove_entry(id).unwrap();
        }
        assert!(!p.user_index(&AttributeId::new("cn")).unwrap().has(&Value::from("ghost"), id));
        assert!(p.get_entry(id).is_some());
    }
}
