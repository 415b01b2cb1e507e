//! Persistence layer for the helpdesk core.
//!
//! Repositories turn predicates, ordering and paging into store queries and
//! stage writes; a unit of work commits those writes in one transaction and
//! then hands the drained domain events to a dispatcher.

pub mod dispatcher;
pub mod error;
pub mod matcher;
pub mod memory;
pub mod paging;
pub mod postgres;
pub mod query;
pub mod registry;
pub mod repository;
pub mod store;
pub mod unit_of_work;

pub use dispatcher::{
    DomainEventDispatcher, EventHandler, HandlerDispatcher, HandlerError, LoggingDispatcher,
    RecordingDispatcher,
};
pub use error::{DispatchError, PersistenceError, Result};
pub use memory::InMemoryStore;
pub use paging::{Page, PagedResult};
pub use postgres::PostgresStore;
pub use query::{DEFAULT_PAGE_SIZE, RecordQuery, Search};
pub use registry::RepositoryRegistry;
pub use repository::{ChangeSet, Repository, RepositoryContext, StagedChange};
pub use store::{Change, Store, StoreExt, StoreTransaction, StoredRecord};
pub use unit_of_work::{CommitReport, UnitOfWork, UnitOfWorkFactory, UnitOfWorkState};
