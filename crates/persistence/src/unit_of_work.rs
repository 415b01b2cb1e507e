//! Unit of work: one transaction, its staged changes, and post-commit dispatch.
//!
//! A unit of work is scoped to a single logical operation. Repositories it
//! hands out stage writes into its change set; [`UnitOfWork::commit`] flushes
//! them inside one store transaction and, once that is durable, dispatches
//! every event drained from the staged entities.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use common::{Clock, SystemClock};
use domain::{Entity, EventEnvelope};
use tokio::sync::Mutex;

use crate::{
    PersistenceError, Result,
    dispatcher::DomainEventDispatcher,
    registry::RepositoryRegistry,
    repository::{ChangeSet, Repository, RepositoryContext, StagedChange},
    store::{Store, StoreTransaction},
};

/// Where a unit of work is in its commit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfWorkState {
    Idle,
    Committing,
    Dispatching,
    RolledBack,
}

impl std::fmt::Display for UnitOfWorkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            UnitOfWorkState::Idle => "idle",
            UnitOfWorkState::Committing => "committing",
            UnitOfWorkState::Dispatching => "dispatching",
            UnitOfWorkState::RolledBack => "rolled_back",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Number of staged changes written to the store.
    pub changes_applied: usize,

    /// Number of domain events handed to the dispatcher.
    pub events_dispatched: usize,
}

/// Creates units of work that share a store, registry, dispatcher and clock.
#[derive(Clone)]
pub struct UnitOfWorkFactory {
    store: Arc<dyn Store>,
    registry: Arc<RepositoryRegistry>,
    dispatcher: Arc<dyn DomainEventDispatcher>,
    clock: Arc<dyn Clock>,
}

impl UnitOfWorkFactory {
    /// Creates a factory using the system clock.
    pub fn new(
        store: Arc<dyn Store>,
        registry: RepositoryRegistry,
        dispatcher: Arc<dyn DomainEventDispatcher>,
    ) -> Self {
        Self {
            store,
            registry: Arc::new(registry),
            dispatcher,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used for audit stamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Starts a fresh unit of work.
    pub fn create(&self) -> UnitOfWork {
        UnitOfWork::new(
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.clock),
        )
    }
}

/// Binds repository writes into one transaction.
///
/// Not meant to be shared between concurrent operations.
pub struct UnitOfWork {
    store: Arc<dyn Store>,
    registry: Arc<RepositoryRegistry>,
    dispatcher: Arc<dyn DomainEventDispatcher>,
    clock: Arc<dyn Clock>,
    staging: Arc<Mutex<ChangeSet>>,
    repositories: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    transaction: Option<Box<dyn StoreTransaction>>,
    state: UnitOfWorkState,
}

impl UnitOfWork {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<RepositoryRegistry>,
        dispatcher: Arc<dyn DomainEventDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            registry,
            dispatcher,
            clock,
            staging: Arc::new(Mutex::new(ChangeSet::new())),
            repositories: HashMap::new(),
            transaction: None,
            state: UnitOfWorkState::Idle,
        }
    }

    pub fn state(&self) -> UnitOfWorkState {
        self.state
    }

    /// Returns true while a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Number of changes staged and not yet committed.
    pub async fn pending_changes(&self) -> usize {
        self.staging.lock().await.len()
    }

    fn transition(&mut self, next: UnitOfWorkState) {
        tracing::debug!(from = %self.state, to = %next, "unit of work state");
        self.state = next;
    }

    /// Returns the repository for `T`, building it on first access.
    ///
    /// Every later call returns a handle to the same instance.
    pub fn repository<T: Entity>(&mut self) -> Result<Repository<T>> {
        let key = TypeId::of::<T>();
        if let Some(repository) = self
            .repositories
            .get(&key)
            .and_then(|cached| cached.downcast_ref::<Repository<T>>())
        {
            return Ok(repository.clone());
        }

        let context = RepositoryContext::new(
            Arc::clone(&self.store),
            Arc::clone(&self.staging),
            Arc::clone(&self.clock),
        );
        let repository = self
            .registry
            .build::<T>(context)
            .ok_or(PersistenceError::UnregisteredRepository(T::ENTITY_TYPE))?;
        self.repositories.insert(key, Box::new(repository.clone()));
        Ok(repository)
    }

    /// Opens a transaction unless one is already open.
    ///
    /// A store that cannot open one fails with `TransactionFailure`.
    #[tracing::instrument(skip(self))]
    pub async fn begin_transaction(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            tracing::debug!("transaction already open");
            return Ok(());
        }
        let tx = self.store.begin().await.map_err(|e| {
            tracing::warn!(error = %e, "could not open transaction");
            PersistenceError::TransactionFailure(Box::new(e))
        })?;
        self.transaction = Some(tx);
        Ok(())
    }

    /// Commits staged changes and dispatches their events.
    pub async fn commit(&mut self) -> Result<CommitReport> {
        self.commit_until(std::future::pending()).await
    }

    /// Like [`commit`](Self::commit), giving up if `cancel` completes first.
    ///
    /// Cancellation before the store commit rolls back and returns
    /// `Cancelled`. Once the data is durable, dispatch runs regardless.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn commit_until<F>(&mut self, cancel: F) -> Result<CommitReport>
    where
        F: Future<Output = ()> + Send,
    {
        let started = Instant::now();
        let staged = self.staging.lock().await.take();
        if staged.is_empty() && self.transaction.is_none() {
            tracing::debug!("nothing to commit");
            return Ok(CommitReport::default());
        }

        self.transition(UnitOfWorkState::Committing);
        let mut tx = match self.transaction.take() {
            Some(tx) => tx,
            None => match self.store.begin().await {
                Ok(tx) => tx,
                Err(e) => {
                    self.record_rollback(staged.len());
                    return Err(PersistenceError::TransactionFailure(Box::new(e)));
                }
            },
        };

        let flushed = {
            let flush = flush(tx.as_mut(), &staged);
            tokio::pin!(cancel);
            tokio::select! {
                biased;
                () = &mut cancel => Err(PersistenceError::Cancelled),
                result = flush => result.map_err(|e| PersistenceError::TransactionFailure(Box::new(e))),
            }
        };

        if let Err(error) = flushed {
            if let Err(e) = tx.rollback().await {
                tracing::warn!(error = %e, "rollback after failed flush also failed");
            }
            tracing::warn!(error = %error, changes = staged.len(), "commit rolled back");
            self.record_rollback(staged.len());
            return Err(error);
        }

        if let Err(e) = tx.commit().await {
            tracing::warn!(error = %e, changes = staged.len(), "store commit failed");
            self.record_rollback(staged.len());
            return Err(PersistenceError::TransactionFailure(Box::new(e)));
        }

        let changes_applied = staged.len();
        let events: Vec<EventEnvelope> = staged.into_iter().flat_map(|s| s.events).collect();

        metrics::counter!("uow_commits_total").increment(1);
        metrics::histogram!("uow_commit_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        let dispatched = self.dispatch(&events).await;
        self.transition(UnitOfWorkState::Idle);
        dispatched?;

        tracing::info!(changes_applied, events_dispatched = events.len(), "committed");
        Ok(CommitReport {
            changes_applied,
            events_dispatched: events.len(),
        })
    }

    async fn dispatch(&mut self, events: &[EventEnvelope]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        self.transition(UnitOfWorkState::Dispatching);
        match self.dispatcher.dispatch(events).await {
            Ok(()) => {
                metrics::counter!("domain_events_dispatched_total").increment(events.len() as u64);
                Ok(())
            }
            Err(e) => {
                metrics::counter!("domain_event_dispatch_failures_total").increment(1);
                tracing::warn!(error = %e, events = events.len(), "dispatch failed after commit");
                Err(PersistenceError::DispatchFailure(e))
            }
        }
    }

    fn record_rollback(&mut self, discarded: usize) {
        metrics::counter!("uow_rollbacks_total").increment(1);
        self.transition(UnitOfWorkState::RolledBack);
        tracing::debug!(discarded, "staged changes discarded");
        self.transition(UnitOfWorkState::Idle);
    }

    /// Discards staged changes and ends the open transaction, if any.
    #[tracing::instrument(skip(self))]
    pub async fn rollback(&mut self) -> Result<()> {
        let discarded = self.staging.lock().await.take().len();
        let transaction = self.transaction.take();
        if discarded == 0 && transaction.is_none() {
            return Ok(());
        }

        self.record_rollback(discarded);
        if let Some(tx) = transaction {
            tx.rollback().await?;
        }
        Ok(())
    }
}

async fn flush(tx: &mut dyn StoreTransaction, staged: &[StagedChange]) -> Result<()> {
    for item in staged {
        tx.apply(&item.change).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::RecordingDispatcher;
    use crate::memory::InMemoryStore;
    use crate::query::RecordQuery;
    use crate::store::StoredRecord;
    use async_trait::async_trait;
    use domain::{Category, Filter};

    /// A store whose connection is gone.
    struct Unreachable;

    #[async_trait]
    impl Store for Unreachable {
        async fn fetch(&self, _: &str, _: &RecordQuery) -> Result<Vec<StoredRecord>> {
            Err(PersistenceError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn count(&self, _: &str, _: &Filter) -> Result<u64> {
            Err(PersistenceError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
            Err(PersistenceError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    fn unit(store: &InMemoryStore, dispatcher: &RecordingDispatcher) -> UnitOfWork {
        UnitOfWorkFactory::new(
            Arc::new(store.clone()),
            RepositoryRegistry::new().register::<Category>(),
            Arc::new(dispatcher.clone()),
        )
        .create()
    }

    #[tokio::test]
    async fn empty_commit_is_a_no_op() {
        let store = InMemoryStore::new();
        let dispatcher = RecordingDispatcher::new();
        let mut uow = unit(&store, &dispatcher);

        let report = uow.commit().await.unwrap();
        assert_eq!(report, CommitReport::default());
        assert_eq!(uow.state(), UnitOfWorkState::Idle);
    }

    #[tokio::test]
    async fn begin_transaction_twice_is_tolerated() {
        let store = InMemoryStore::new();
        let dispatcher = RecordingDispatcher::new();
        let mut uow = unit(&store, &dispatcher);

        uow.begin_transaction().await.unwrap();
        uow.begin_transaction().await.unwrap();
        assert!(uow.in_transaction());

        uow.commit().await.unwrap();
        assert!(!uow.in_transaction());
    }

    #[tokio::test]
    async fn failure_to_begin_is_a_transaction_failure() {
        let dispatcher = RecordingDispatcher::new();
        let mut uow = UnitOfWorkFactory::new(
            Arc::new(Unreachable),
            RepositoryRegistry::new().register::<Category>(),
            Arc::new(dispatcher),
        )
        .create();

        let err = uow.begin_transaction().await.unwrap_err();
        match &err {
            PersistenceError::TransactionFailure(source) => {
                assert!(matches!(**source, PersistenceError::Database(_)));
            }
            other => panic!("expected TransactionFailure, got {other:?}"),
        }
        assert!(err.is_rolled_back());
        assert!(!uow.in_transaction());
        assert_eq!(uow.state(), UnitOfWorkState::Idle);
    }

    #[tokio::test]
    async fn rollback_without_transaction_is_a_no_op() {
        let store = InMemoryStore::new();
        let dispatcher = RecordingDispatcher::new();
        let mut uow = unit(&store, &dispatcher);

        uow.rollback().await.unwrap();
        assert_eq!(uow.state(), UnitOfWorkState::Idle);
    }

    #[tokio::test]
    async fn unregistered_types_are_reported() {
        let store = InMemoryStore::new();
        let dispatcher = RecordingDispatcher::new();
        let mut uow = unit(&store, &dispatcher);

        let result = uow.repository::<domain::Comment>();
        assert!(matches!(
            result,
            Err(PersistenceError::UnregisteredRepository("Comment"))
        ));
    }

    #[tokio::test]
    async fn repository_is_built_once_per_unit() {
        let store = InMemoryStore::new();
        let dispatcher = RecordingDispatcher::new();
        let mut uow = unit(&store, &dispatcher);

        let first = uow.repository::<Category>().unwrap();
        let second = uow.repository::<Category>().unwrap();
        assert!(first.same_instance(&second));

        let other = unit(&store, &dispatcher).repository::<Category>().unwrap();
        assert!(!first.same_instance(&other));
    }
}
