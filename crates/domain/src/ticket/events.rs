//! Ticket domain events.

use chrono::{DateTime, Utc};
use common::EntityId;
use serde::{Deserialize, Serialize};

use crate::event::DomainEvent;

use super::TicketStatus;

/// Events raised by a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TicketEvent {
    /// Ticket was opened.
    TicketCreated(TicketCreatedData),

    /// Ticket details, assignee or status changed.
    TicketUpdated(TicketUpdatedData),

    /// Ticket was evaluated and closed.
    TicketClosed(TicketClosedData),
}

impl DomainEvent for TicketEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TicketEvent::TicketCreated(_) => "TicketCreated",
            TicketEvent::TicketUpdated(_) => "TicketUpdated",
            TicketEvent::TicketClosed(_) => "TicketClosed",
        }
    }
}

/// Data for TicketCreated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketCreatedData {
    pub ticket_id: EntityId,
    pub title: String,
    pub category_id: EntityId,
    pub department_id: EntityId,
    pub requesting_user_email: String,
    pub opening_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Data for TicketUpdated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketUpdatedData {
    pub ticket_id: EntityId,
    pub title: String,
    pub status: TicketStatus,
    pub category_id: EntityId,
    pub department_id: EntityId,
    pub responsible_user_email: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Data for TicketClosed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketClosedData {
    pub ticket_id: EntityId,
    pub closing_date: DateTime<Utc>,
    pub evaluation: i64,
}
