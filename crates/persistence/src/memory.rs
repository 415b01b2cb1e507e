use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::EntityId;
use domain::Filter;
use tokio::sync::RwLock;

use crate::{
    PersistenceError, RecordQuery, Result,
    matcher::{compare_rows, matches},
    store::{Change, Store, StoreTransaction, StoredRecord},
};

type Tables = HashMap<String, Vec<StoredRecord>>;

/// In-memory store implementation for testing and local runs.
///
/// Rows are kept per entity type in insertion order. Filters are evaluated
/// with the same three-valued semantics as the PostgreSQL store. A
/// transaction works on its own copy of each table it touches; commit replays
/// its changes onto the latest committed tables and swaps them in, so readers
/// never observe a partially applied transaction.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    fail_on: Arc<RwLock<Option<EntityId>>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of rows stored for `entity_type`.
    pub async fn row_count(&self, entity_type: &str) -> usize {
        self.tables
            .read()
            .await
            .get(entity_type)
            .map_or(0, Vec::len)
    }

    /// Clears all rows.
    pub async fn clear(&self) {
        self.tables.write().await.clear();
    }

    /// Makes every later write touching `id` fail, simulating a driver error.
    pub async fn fail_writes_to(&self, id: EntityId) {
        *self.fail_on.write().await = Some(id);
    }

    /// Stops injecting write failures.
    pub async fn heal(&self) {
        *self.fail_on.write().await = None;
    }
}

fn apply_to(tables: &mut Tables, change: &Change) -> Result<()> {
    let rows = tables.entry(change.entity_type().to_string()).or_default();
    let position = rows.iter().position(|row| row.id == change.id());

    match (change, position) {
        (Change::Insert { id, .. }, Some(_)) => Err(PersistenceError::Conflict(format!(
            "{} {id} already exists",
            change.entity_type()
        ))),
        (Change::Insert { id, data, .. }, None) => {
            rows.push(StoredRecord {
                id: *id,
                data: data.clone(),
            });
            Ok(())
        }
        (Change::Update { data, .. }, Some(index)) => {
            rows[index].data = data.clone();
            Ok(())
        }
        (Change::Delete { .. }, Some(index)) => {
            rows.remove(index);
            Ok(())
        }
        (Change::Update { entity_type, id, .. } | Change::Delete { entity_type, id }, None) => {
            Err(PersistenceError::NotFound {
                entity_type: *entity_type,
                id: *id,
            })
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn fetch(&self, entity_type: &str, query: &RecordQuery) -> Result<Vec<StoredRecord>> {
        let tables = self.tables.read().await;
        let Some(rows) = tables.get(entity_type) else {
            return Ok(Vec::new());
        };

        let mut selected: Vec<&StoredRecord> = rows
            .iter()
            .filter(|row| matches(&query.filter, &row.data))
            .collect();
        if !query.sort.is_empty() {
            selected.sort_by(|a, b| compare_rows(&query.sort, &a.data, &b.data));
        }

        let offset = usize::try_from(query.offset).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));

        Ok(selected
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self, entity_type: &str, filter: &Filter) -> Result<u64> {
        let tables = self.tables.read().await;
        let count = tables.get(entity_type).map_or(0, |rows| {
            rows.iter().filter(|row| matches(filter, &row.data)).count()
        });
        Ok(count as u64)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            store: self.clone(),
            working: Tables::new(),
            pending: Vec::new(),
        }))
    }
}

/// A buffered transaction on an [`InMemoryStore`].
///
/// `working` holds the committed rows of every table this transaction has
/// touched with its own changes applied; each table is copied once.
struct InMemoryTransaction {
    store: InMemoryStore,
    working: Tables,
    pending: Vec<Change>,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn apply(&mut self, change: &Change) -> Result<()> {
        if *self.store.fail_on.read().await == Some(change.id()) {
            return Err(PersistenceError::Conflict(format!(
                "injected failure writing {} {}",
                change.entity_type(),
                change.id()
            )));
        }

        let entity_type = change.entity_type();
        if !self.working.contains_key(entity_type) {
            let rows = self
                .store
                .tables
                .read()
                .await
                .get(entity_type)
                .cloned()
                .unwrap_or_default();
            self.working.insert(entity_type.to_string(), rows);
        }

        // A rejected change leaves the working copy as it was.
        apply_to(&mut self.working, change)?;
        self.pending.push(change.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut tables = self.store.tables.write().await;
        let mut next: Tables = self
            .working
            .keys()
            .map(|entity_type| {
                let rows = tables.get(entity_type).cloned().unwrap_or_default();
                (entity_type.clone(), rows)
            })
            .collect();
        for change in &self.pending {
            apply_to(&mut next, change)?;
        }
        tables.extend(next);
        tracing::debug!(changes = self.pending.len(), "in-memory transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        tracing::debug!(
            changes = self.pending.len(),
            "in-memory transaction rolled back"
        );
        Ok(())
    }
}
