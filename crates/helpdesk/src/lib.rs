//! Helpdesk runner wiring: store selection, repository registration,
//! event handlers and a demonstration seed run.

pub mod config;
pub mod error;

use std::sync::Arc;

use async_trait::async_trait;
use common::{Clock, EntityId};
use domain::{
    Category, Comment, Department, Entity, EventEnvelope, NewTicket, SoftDeletable, Ticket,
    TicketDetails, TicketStatus,
};
use persistence::{
    DomainEventDispatcher, EventHandler, HandlerDispatcher, HandlerError, InMemoryStore,
    PostgresStore, RepositoryRegistry, Search, Store, UnitOfWorkFactory,
};
use sqlx::postgres::PgPoolOptions;

pub use config::{Config, ConfigError, LogFormat, StoreBackend};
pub use error::AppError;

/// Opens the store selected by `config`, running migrations for PostgreSQL.
pub async fn connect_store(config: &Config) -> Result<Arc<dyn Store>, AppError> {
    match config.store_backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or(ConfigError::MissingDatabaseUrl)?;
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await?;
            let store = PostgresStore::new(pool);
            store
                .run_migrations()
                .await
                .map_err(persistence::PersistenceError::from)?;
            Ok(Arc::new(store))
        }
    }
}

/// Registers every helpdesk entity.
pub fn registry() -> RepositoryRegistry {
    RepositoryRegistry::new()
        .register::<Category>()
        .register::<Department>()
        .register::<Ticket>()
        .register::<Comment>()
}

/// Logs every lifecycle event of the helpdesk entities.
pub struct AuditLogHandler;

#[async_trait]
impl EventHandler for AuditLogHandler {
    fn name(&self) -> &'static str {
        "audit_log"
    }

    fn event_types(&self) -> &[&'static str] {
        &[
            "CategoryCreated",
            "CategoryUpdated",
            "DepartmentCreated",
            "DepartmentUpdated",
            "TicketCreated",
            "TicketUpdated",
            "TicketClosed",
            "CommentCreated",
        ]
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<(), HandlerError> {
        tracing::info!(
            event_type = %event.event_type,
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            occurred_at = %event.occurred_at,
            "audit"
        );
        Ok(())
    }
}

/// Builds the dispatcher used by the runner.
pub fn dispatcher() -> Arc<dyn DomainEventDispatcher> {
    Arc::new(HandlerDispatcher::new().register(Arc::new(AuditLogHandler)))
}

/// What a seed run left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedSummary {
    pub categories: u64,
    pub active_categories: u64,
    pub open_tickets: u64,
    pub events_dispatched: usize,
}

/// Seeds a small helpdesk, walks a ticket through its lifecycle and reads it back.
#[tracing::instrument(skip(factory, clock))]
pub async fn seed_demo(
    factory: &UnitOfWorkFactory,
    clock: &dyn Clock,
    page_size: u32,
) -> Result<SeedSummary, AppError> {
    let mut events_dispatched = 0;

    let mut uow = factory.create();
    let categories = uow.repository::<Category>()?;
    let departments = uow.repository::<Department>()?;
    let tickets = uow.repository::<Ticket>()?;
    let comments = uow.repository::<Comment>()?;
    uow.begin_transaction().await?;

    let mut hardware = Category::create("Hardware", "Laptops, printers and peripherals", clock)?;
    let mut network = Category::create("Network", "Connectivity and VPN", clock)?;
    let mut legacy = Category::create("Legacy", "Retired systems", clock)?;
    for category in [&mut hardware, &mut network, &mut legacy] {
        categories.add(category).await?;
    }
    let mut service_desk = Department::create("Service Desk", "First line support", clock)?;
    departments.add(&mut service_desk).await?;

    let mut ticket = Ticket::open(
        NewTicket {
            title: "VPN disconnects every hour".to_string(),
            description: "Remote staff lose the tunnel roughly every sixty minutes".to_string(),
            category_id: network.id(),
            department_id: service_desk.id(),
            requesting_user_email: "requester@example.com".to_string(),
            due_date: None,
        },
        clock,
    )?;
    tickets.add(&mut ticket).await?;
    events_dispatched += uow.commit().await?.events_dispatched;

    ticket.assign_to("agent@example.com", clock)?;
    ticket.change_status(TicketStatus::InProgress, clock)?;
    ticket.update(
        TicketDetails {
            title: "VPN disconnects every hour".to_string(),
            description: "Tunnel drops after the key lifetime expires".to_string(),
            category_id: network.id(),
            department_id: service_desk.id(),
            due_date: None,
        },
        clock,
    )?;
    tickets.update(&mut ticket).await?;
    let mut comment = Comment::post(
        ticket.id(),
        EntityId::new(),
        "agent@example.com",
        "Raised the IKE lifetime on the concentrator",
        clock,
    )?;
    comments.add(&mut comment).await?;
    categories.disable(legacy.id()).await?;
    events_dispatched += uow.commit().await?.events_dispatched;

    let open = tickets
        .search(
            Search::matching(Ticket::STATUS.not_equals(TicketStatus::Closed))
                .order_by(Ticket::OPENING_DATE.descending())
                .page_size(page_size),
        )
        .await?;
    for ticket in &open.items {
        tracing::info!(ticket_id = %ticket.id(), title = ticket.title(), status = %ticket.status(), "open ticket");
    }

    Ok(SeedSummary {
        categories: categories.count(None).await?,
        active_categories: categories.count(Some(&Category::not_deleted())).await?,
        open_tickets: open.paging.total_count(),
        events_dispatched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use common::FixedClock;

    #[tokio::test]
    async fn seed_demo_runs_against_memory() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 9, 2, 9, 0, 0).unwrap());
        let store = connect_store(&Config::default()).await.unwrap();
        let factory = UnitOfWorkFactory::new(store, registry(), dispatcher())
            .with_clock(Arc::new(clock.clone()));

        let summary = seed_demo(&factory, &clock, 10).await.unwrap();

        assert_eq!(summary.categories, 3);
        assert_eq!(summary.active_categories, 2);
        assert_eq!(summary.open_tickets, 1);
        // 3 categories, 1 department, ticket created, 3 ticket updates, 1 comment.
        assert_eq!(summary.events_dispatched, 9);
    }
}
