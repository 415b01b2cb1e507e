//! The seam between repositories and a concrete storage engine.
//!
//! A store keeps entity rows as JSON documents partitioned by entity type.
//! It evaluates [`Filter`] trees with its own query engine and applies
//! staged changes inside a transaction.

use async_trait::async_trait;
use common::EntityId;
use domain::{Comparison, FieldKind, FieldRef, Filter, Value};

use crate::{RecordQuery, Result};

/// One persisted entity row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: EntityId,
    pub data: serde_json::Value,
}

/// A write staged by a repository and applied when the unit of work commits.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Insert {
        entity_type: &'static str,
        id: EntityId,
        data: serde_json::Value,
    },
    Update {
        entity_type: &'static str,
        id: EntityId,
        data: serde_json::Value,
    },
    Delete {
        entity_type: &'static str,
        id: EntityId,
    },
}

impl Change {
    pub fn entity_type(&self) -> &'static str {
        match self {
            Change::Insert { entity_type, .. }
            | Change::Update { entity_type, .. }
            | Change::Delete { entity_type, .. } => entity_type,
        }
    }

    pub fn id(&self) -> EntityId {
        match self {
            Change::Insert { id, .. } | Change::Update { id, .. } | Change::Delete { id, .. } => *id,
        }
    }

    /// Short name of the operation, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Change::Insert { .. } => "insert",
            Change::Update { .. } => "update",
            Change::Delete { .. } => "delete",
        }
    }
}

/// Core trait for storage engines.
///
/// Reads go straight to committed state; writes only happen through a
/// [`StoreTransaction`]. All implementations must be thread-safe.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the rows of `entity_type` selected by `query`.
    async fn fetch(&self, entity_type: &str, query: &RecordQuery) -> Result<Vec<StoredRecord>>;

    /// Counts the rows of `entity_type` that satisfy `filter`.
    async fn count(&self, entity_type: &str, filter: &Filter) -> Result<u64>;

    /// Starts a transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;
}

/// A transaction on a [`Store`].
///
/// Dropping a transaction without committing discards its changes.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Applies one change. Changes are applied in call order.
    ///
    /// Inserting an existing id fails with `Conflict`; updating or deleting
    /// a missing id fails with `NotFound`.
    async fn apply(&mut self, change: &Change) -> Result<()>;

    /// Makes every applied change durable.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discards every applied change.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Filter matching the row with the given id.
pub fn id_filter(id: EntityId) -> Filter {
    Filter::Compare {
        field: FieldRef {
            name: "id",
            kind: FieldKind::Uuid,
        },
        op: Comparison::Eq,
        value: Value::Uuid(id.as_uuid()),
    }
}

/// Extension trait providing convenience methods for stores.
#[async_trait]
pub trait StoreExt: Store {
    /// Fetches a single row by id.
    async fn fetch_by_id(&self, entity_type: &str, id: EntityId) -> Result<Option<StoredRecord>> {
        let query = RecordQuery::filtered(&id_filter(id)).window(0, 1);
        Ok(self.fetch(entity_type, &query).await?.into_iter().next())
    }

    /// Checks whether a row exists.
    async fn contains(&self, entity_type: &str, id: EntityId) -> Result<bool> {
        Ok(self.count(entity_type, &id_filter(id)).await? > 0)
    }
}

// Blanket implementation for all Store implementations
impl<T: Store + ?Sized> StoreExt for T {}
