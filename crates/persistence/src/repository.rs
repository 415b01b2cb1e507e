//! Generic repository over one entity type.
//!
//! Reads go straight to the store and always see committed state. Writes
//! are staged in the owning unit of work's [`ChangeSet`] together with the
//! events drained from the entity, and only reach the store on commit.

use std::marker::PhantomData;
use std::sync::Arc;

use common::{Clock, EntityId};
use domain::{Entity, EventEnvelope, HardDeletable, Predicate, SoftDeletable, SortKey};
use tokio::sync::Mutex;

use crate::{
    Page, PagedResult, PersistenceError, RecordQuery, Result, Search,
    store::{Change, Store, StoreExt, StoredRecord},
};

/// A staged write plus the events raised by the entity it writes.
#[derive(Debug, Clone)]
pub struct StagedChange {
    pub change: Change,
    pub events: Vec<EventEnvelope>,
}

/// Writes staged by the repositories of one unit of work, in call order.
#[derive(Debug, Default)]
pub struct ChangeSet {
    staged: Vec<StagedChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: Change, events: Vec<EventEnvelope>) {
        self.staged.push(StagedChange { change, events });
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Removes and returns everything staged so far.
    pub fn take(&mut self) -> Vec<StagedChange> {
        std::mem::take(&mut self.staged)
    }

    pub fn clear(&mut self) {
        self.staged.clear();
    }
}

/// Shared handles a repository needs: the store, the staging area and the clock.
#[derive(Clone)]
pub struct RepositoryContext {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) staging: Arc<Mutex<ChangeSet>>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl RepositoryContext {
    pub fn new(
        store: Arc<dyn Store>,
        staging: Arc<Mutex<ChangeSet>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            staging,
            clock,
        }
    }
}

/// Repository for entities of type `T`.
///
/// Cloning is cheap and yields a handle to the same repository instance.
pub struct Repository<T> {
    context: Arc<RepositoryContext>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
            _entity: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}

impl<T: Entity> Repository<T> {
    /// Creates a new repository instance.
    pub fn new(context: RepositoryContext) -> Self {
        Self {
            context: Arc::new(context),
            _entity: PhantomData,
        }
    }

    /// Returns true if both handles refer to the same repository instance.
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.context, &other.context)
    }

    fn store(&self) -> &dyn Store {
        self.context.store.as_ref()
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.context.clock.now()
    }

    fn decode(record: StoredRecord) -> Result<T> {
        Ok(serde_json::from_value(record.data)?)
    }

    fn decode_all(records: Vec<StoredRecord>) -> Result<Vec<T>> {
        records.into_iter().map(Self::decode).collect()
    }

    fn ensure_id(id: EntityId) -> Result<()> {
        if id.is_nil() {
            return Err(PersistenceError::InvalidArgument(format!(
                "{} id must not be empty",
                T::ENTITY_TYPE
            )));
        }
        Ok(())
    }

    async fn stage(&self, change: Change, events: Vec<EventEnvelope>) {
        tracing::debug!(
            entity_type = T::ENTITY_TYPE,
            entity_id = %change.id(),
            change = change.kind(),
            events = events.len(),
            "staged change"
        );
        self.context.staging.lock().await.push(change, events);
    }

    /// Stamps the creation time if unset, validates, and stages an insert.
    ///
    /// The entity's pending events move into the staging area with the row.
    #[tracing::instrument(skip(self, entity), fields(entity_type = T::ENTITY_TYPE, entity_id = %entity.id()))]
    pub async fn add(&self, entity: &mut T) -> Result<()> {
        Self::ensure_id(entity.id())?;
        entity.mark_created(self.now());
        entity.validate()?;

        let data = serde_json::to_value(&*entity)?;
        let events = entity.drain_events();
        self.stage(
            Change::Insert {
                entity_type: T::ENTITY_TYPE,
                id: entity.id(),
                data,
            },
            events,
        )
        .await;
        Ok(())
    }

    /// Stamps the modification time, validates, and stages an update.
    #[tracing::instrument(skip(self, entity), fields(entity_type = T::ENTITY_TYPE, entity_id = %entity.id()))]
    pub async fn update(&self, entity: &mut T) -> Result<()> {
        Self::ensure_id(entity.id())?;
        entity.mark_updated(self.now());
        entity.validate()?;
        self.stage_update(entity).await
    }

    async fn stage_update(&self, entity: &mut T) -> Result<()> {
        let data = serde_json::to_value(&*entity)?;
        let events = entity.drain_events();
        self.stage(
            Change::Update {
                entity_type: T::ENTITY_TYPE,
                id: entity.id(),
                data,
            },
            events,
        )
        .await;
        Ok(())
    }

    /// Looks up one entity. Absence is not an error.
    #[tracing::instrument(skip(self), fields(entity_type = T::ENTITY_TYPE))]
    pub async fn get_by_id(&self, id: EntityId) -> Result<Option<T>> {
        Self::ensure_id(id)?;
        let query = RecordQuery::filtered(T::ID.equals(id).filter()).window(0, 1);
        let records = self.store().fetch(T::ENTITY_TYPE, &query).await?;
        records.into_iter().next().map(Self::decode).transpose()
    }

    /// Returns every entity matching `predicate`, in store order.
    #[tracing::instrument(skip(self, predicate), fields(entity_type = T::ENTITY_TYPE, predicate = %predicate))]
    pub async fn find(&self, predicate: &Predicate<T>) -> Result<Vec<T>> {
        let records = self
            .store()
            .fetch(T::ENTITY_TYPE, &RecordQuery::filtered(predicate.filter()))
            .await?;
        Self::decode_all(records)
    }

    /// Returns every entity, including soft-deleted ones.
    pub async fn all(&self) -> Result<Vec<T>> {
        let records = self.store().fetch(T::ENTITY_TYPE, &RecordQuery::all()).await?;
        Self::decode_all(records)
    }

    /// Counts the entities matching `predicate`, or all of them.
    pub async fn count(&self, predicate: Option<&Predicate<T>>) -> Result<u64> {
        let always = Predicate::always(true);
        let predicate = predicate.unwrap_or(&always);
        self.store().count(T::ENTITY_TYPE, predicate.filter()).await
    }

    /// Returns true if any entity matches `predicate`.
    pub async fn exists(&self, predicate: &Predicate<T>) -> Result<bool> {
        Ok(self.count(Some(predicate)).await? > 0)
    }

    /// Runs a paged search: filter, count, order, skip, take, materialize.
    ///
    /// Rows are ordered by the requested sort keys, or by creation time when
    /// none are given, with the id as a final tie-breaker so pages never
    /// overlap.
    #[tracing::instrument(
        skip(self, search),
        fields(entity_type = T::ENTITY_TYPE, page = search.page, page_size = search.page_size)
    )]
    pub async fn search(&self, search: Search<T>) -> Result<Page<T>> {
        PagedResult::new(search.page, search.page_size, 0)?;
        metrics::counter!("repository_searches_total", "entity_type" => T::ENTITY_TYPE)
            .increment(1);

        let filter = search.filter.unwrap_or_default();
        let total = self.store().count(T::ENTITY_TYPE, filter.filter()).await?;
        let paging = PagedResult::new(search.page, search.page_size, total)?;

        let mut keys: Vec<SortKey> = match &search.order_by {
            Some(sort) => sort.keys().to_vec(),
            None => T::CREATED_AT.ascending().keys().to_vec(),
        };
        keys.extend_from_slice(T::ID.ascending().keys());

        let items = if paging.first_row_on_page() == 0 {
            Vec::new()
        } else {
            let query = RecordQuery::filtered(filter.filter())
                .sort(&keys)
                .window(paging.skip(), u64::from(paging.page_size()));
            Self::decode_all(self.store().fetch(T::ENTITY_TYPE, &query).await?)?
        };

        tracing::debug!(
            total_count = paging.total_count(),
            returned = items.len(),
            "search completed"
        );
        Ok(Page { items, paging })
    }
}

impl<T: SoftDeletable> Repository<T> {
    /// Soft-deletes the entity with `id`. Returns `None` if there is no such entity.
    ///
    /// Disabling an already-disabled entity stages nothing.
    pub async fn disable(&self, id: EntityId) -> Result<Option<T>> {
        self.set_enabled(id, false).await
    }

    /// Restores a soft-deleted entity. Returns `None` if there is no such entity.
    pub async fn enable(&self, id: EntityId) -> Result<Option<T>> {
        self.set_enabled(id, true).await
    }

    /// Enables or disables the entity with `id`.
    #[tracing::instrument(skip(self), fields(entity_type = T::ENTITY_TYPE))]
    pub async fn set_enabled(&self, id: EntityId, enabled: bool) -> Result<Option<T>> {
        let Some(mut entity) = self.get_by_id(id).await? else {
            tracing::debug!(entity_id = %id, "nothing to toggle");
            return Ok(None);
        };

        let now = self.now();
        let changed = if enabled {
            entity.restore(now)?
        } else {
            entity.soft_delete(now)?
        };
        if changed {
            self.stage_update(&mut entity).await?;
        }
        Ok(Some(entity))
    }
}

impl<T: HardDeletable> Repository<T> {
    /// Stages removal of the row with `id`.
    ///
    /// Fails with `NotFound`, staging nothing, when no such row exists.
    #[tracing::instrument(skip(self), fields(entity_type = T::ENTITY_TYPE))]
    pub async fn remove(&self, id: EntityId) -> Result<()> {
        Self::ensure_id(id)?;
        if !self.store().contains(T::ENTITY_TYPE, id).await? {
            return Err(PersistenceError::NotFound {
                entity_type: T::ENTITY_TYPE,
                id,
            });
        }
        self.stage(
            Change::Delete {
                entity_type: T::ENTITY_TYPE,
                id,
            },
            Vec::new(),
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use chrono::{TimeZone, Utc};
    use common::FixedClock;
    use domain::{Category, Comment};

    struct Fixture {
        store: InMemoryStore,
        staging: Arc<Mutex<ChangeSet>>,
        clock: FixedClock,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: InMemoryStore::new(),
                staging: Arc::new(Mutex::new(ChangeSet::new())),
                clock: FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()),
            }
        }

        fn repository<T: Entity>(&self) -> Repository<T> {
            Repository::new(RepositoryContext::new(
                Arc::new(self.store.clone()),
                Arc::clone(&self.staging),
                Arc::new(self.clock.clone()),
            ))
        }

        /// Applies and clears the staging area.
        async fn flush(&self) {
            let staged = self.staging.lock().await.take();
            let mut tx = self.store.begin().await.unwrap();
            for item in &staged {
                tx.apply(&item.change).await.unwrap();
            }
            tx.commit().await.unwrap();
        }
    }

    #[tokio::test]
    async fn add_stages_row_and_moves_events() {
        let fx = Fixture::new();
        let repo = fx.repository::<Category>();
        let mut category = Category::create("Hardware", "Broken devices", &fx.clock).unwrap();

        repo.add(&mut category).await.unwrap();

        assert!(category.events().is_empty());
        let staging = fx.staging.lock().await;
        assert_eq!(staging.len(), 1);
        assert_eq!(staging.staged[0].events.len(), 1);
        assert_eq!(fx.store.row_count("Category").await, 0);
    }

    #[tokio::test]
    async fn get_by_id_rejects_nil_and_returns_absence() {
        let fx = Fixture::new();
        let repo = fx.repository::<Category>();

        assert!(matches!(
            repo.get_by_id(EntityId::nil()).await,
            Err(PersistenceError::InvalidArgument(_))
        ));
        assert!(repo.get_by_id(EntityId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_rejects_zero_paging_before_any_read() {
        let fx = Fixture::new();
        let repo = fx.repository::<Category>();

        let result = repo.search(Search::new().page_size(0)).await;
        assert!(matches!(
            result,
            Err(PersistenceError::OutOfRange { parameter: "page_size", .. })
        ));
        let result = repo.search(Search::new().page(0)).await;
        assert!(matches!(
            result,
            Err(PersistenceError::OutOfRange { parameter: "page", .. })
        ));
    }

    #[tokio::test]
    async fn disable_twice_stages_once() {
        let fx = Fixture::new();
        let repo = fx.repository::<Category>();
        let mut category = Category::create("Network", "Outages", &fx.clock).unwrap();
        repo.add(&mut category).await.unwrap();
        fx.flush().await;

        let first = repo.disable(category.id()).await.unwrap().unwrap();
        fx.flush().await;
        let second = repo.disable(category.id()).await.unwrap().unwrap();

        assert!(first.is_deleted());
        assert_eq!(first.deletion().deleted_at(), second.deletion().deleted_at());
        assert!(fx.staging.lock().await.is_empty());
    }

    #[tokio::test]
    async fn toggling_a_missing_id_is_ignored() {
        let fx = Fixture::new();
        let repo = fx.repository::<Category>();

        assert!(repo.disable(EntityId::new()).await.unwrap().is_none());
        assert!(repo.enable(EntityId::new()).await.unwrap().is_none());
        assert!(fx.staging.lock().await.is_empty());
    }

    #[tokio::test]
    async fn remove_missing_row_fails_without_staging() {
        let fx = Fixture::new();
        let repo = fx.repository::<Comment>();
        let id = EntityId::new();

        let err = repo.remove(id).await.unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::NotFound { entity_type: "Comment", id: missing } if missing == id
        ));
        assert!(fx.staging.lock().await.is_empty());
    }

    #[tokio::test]
    async fn clones_share_the_instance() {
        let fx = Fixture::new();
        let repo = fx.repository::<Category>();
        let other = fx.repository::<Category>();

        assert!(repo.same_instance(&repo.clone()));
        assert!(!repo.same_instance(&other));
    }
}
