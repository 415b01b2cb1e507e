//! Domain layer for the helpdesk persistence core.
//!
//! This crate provides:
//! - The entity lifecycle model (identity, audit stamps, soft delete, pending events)
//! - Domain events and their envelopes
//! - The predicate composer and sort keys used by repository searches
//! - Entity validation rules
//! - The helpdesk entities: categories, departments, tickets and comments

pub mod catalog;
pub mod comment;
pub mod entity;
pub mod error;
pub mod event;
pub mod ordering;
pub mod predicate;
pub mod ticket;
pub mod validation;

pub use catalog::{Category, CategoryEvent, Department, DepartmentEvent};
pub use comment::{Comment, CommentEvent};
pub use entity::{AuditInfo, DeletionInfo, Entity, HardDeletable, SoftDeletable};
pub use error::DomainError;
pub use event::{DomainEvent, EventBuffer, EventEnvelope, EventId};
pub use ordering::{Sort, SortDirection, SortKey};
pub use predicate::{Comparison, Field, FieldKind, FieldRef, FieldValue, Filter, Predicate, Value};
pub use ticket::{NewTicket, Ticket, TicketDetails, TicketEvent, TicketStatus};
pub use validation::ValidationErrors;
