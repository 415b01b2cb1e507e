use chrono::{DateTime, Utc};
use common::{Clock, EntityId};
use serde::{Deserialize, Serialize};

use crate::entity::{AuditInfo, DeletionInfo, Entity, SoftDeletable};
use crate::error::DomainError;
use crate::event::EventBuffer;
use crate::predicate::Field;
use crate::validation::{ValidationErrors, check_email, check_reference, check_text};

use super::events::{TicketClosedData, TicketCreatedData, TicketEvent, TicketUpdatedData};
use super::status::TicketStatus;

const TITLE_MAX_LEN: usize = 200;
const DESCRIPTION_MAX_LEN: usize = 500;
const EMAIL_MAX_LEN: usize = 200;
const MIN_EVALUATION: i64 = 1;
const MAX_EVALUATION: i64 = 5;

/// Input for opening a ticket.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub category_id: EntityId,
    pub department_id: EntityId,
    pub requesting_user_email: String,
    pub due_date: Option<DateTime<Utc>>,
}

/// Editable ticket details.
#[derive(Debug, Clone)]
pub struct TicketDetails {
    pub title: String,
    pub description: String,
    pub category_id: EntityId,
    pub department_id: EntityId,
    pub due_date: Option<DateTime<Utc>>,
}

/// A support request raised by a user and worked on by a department.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    id: EntityId,
    title: String,
    description: String,
    status: TicketStatus,
    category_id: EntityId,
    department_id: EntityId,
    requesting_user_email: String,
    responsible_user_email: Option<String>,
    opening_date: DateTime<Utc>,
    due_date: Option<DateTime<Utc>>,
    closing_date: Option<DateTime<Utc>>,
    evaluation: Option<i64>,
    #[serde(flatten)]
    audit: AuditInfo,
    #[serde(flatten)]
    deletion: DeletionInfo,
    #[serde(skip)]
    events: EventBuffer,
}

impl Ticket {
    pub const TITLE: Field<Ticket, String> = Field::new("title");
    pub const DESCRIPTION: Field<Ticket, String> = Field::new("description");
    pub const STATUS: Field<Ticket, TicketStatus> = Field::new("status");
    pub const CATEGORY_ID: Field<Ticket, EntityId> = Field::new("category_id");
    pub const DEPARTMENT_ID: Field<Ticket, EntityId> = Field::new("department_id");
    pub const REQUESTING_USER_EMAIL: Field<Ticket, String> = Field::new("requesting_user_email");
    pub const RESPONSIBLE_USER_EMAIL: Field<Ticket, String> =
        Field::new("responsible_user_email");
    pub const OPENING_DATE: Field<Ticket, DateTime<Utc>> = Field::new("opening_date");
    pub const DUE_DATE: Field<Ticket, DateTime<Utc>> = Field::new("due_date");
    pub const CLOSING_DATE: Field<Ticket, DateTime<Utc>> = Field::new("closing_date");
    pub const EVALUATION: Field<Ticket, i64> = Field::new("evaluation");

    /// Opens a ticket and raises `TicketCreated`.
    pub fn open(new: NewTicket, clock: &dyn Clock) -> Result<Self, DomainError> {
        let now = clock.now();
        let mut ticket = Self {
            id: EntityId::new(),
            title: new.title,
            description: new.description,
            status: TicketStatus::Open,
            category_id: new.category_id,
            department_id: new.department_id,
            requesting_user_email: new.requesting_user_email,
            responsible_user_email: None,
            opening_date: now,
            due_date: new.due_date,
            closing_date: None,
            evaluation: None,
            audit: AuditInfo::default(),
            deletion: DeletionInfo::default(),
            events: EventBuffer::new(),
        };
        ticket.mark_created(now);
        ticket.validate()?;

        let event = TicketEvent::TicketCreated(TicketCreatedData {
            ticket_id: ticket.id,
            title: ticket.title.clone(),
            category_id: ticket.category_id,
            department_id: ticket.department_id,
            requesting_user_email: ticket.requesting_user_email.clone(),
            opening_date: ticket.opening_date,
            due_date: ticket.due_date,
        });
        ticket.add_event(&event, now)?;
        Ok(ticket)
    }

    /// Replaces the editable details and raises `TicketUpdated`.
    #[tracing::instrument(skip(self, details, clock), fields(ticket_id = %self.id))]
    pub fn update(&mut self, details: TicketDetails, clock: &dyn Clock) -> Result<(), DomainError> {
        self.ensure_not_closed("update")?;
        self.revise(clock.now(), |t| {
            t.title = details.title;
            t.description = details.description;
            t.category_id = details.category_id;
            t.department_id = details.department_id;
            t.due_date = details.due_date;
        })?;
        self.raise_updated(clock)
    }

    /// Hands the ticket to a responsible user and raises `TicketUpdated`.
    #[tracing::instrument(skip(self, clock), fields(ticket_id = %self.id))]
    pub fn assign_to(&mut self, email: &str, clock: &dyn Clock) -> Result<(), DomainError> {
        self.ensure_not_closed("assign")?;
        let email = email.to_string();
        self.revise(clock.now(), |t| t.responsible_user_email = Some(email))?;
        self.raise_updated(clock)
    }

    /// Moves the ticket along its workflow and raises `TicketUpdated`.
    #[tracing::instrument(skip(self, clock), fields(ticket_id = %self.id))]
    pub fn change_status(
        &mut self,
        status: TicketStatus,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if !self.status.can_move_to(status) {
            return Err(self.invalid_transition("change the status of"));
        }
        self.revise(clock.now(), |t| t.status = status)?;
        self.raise_updated(clock)
    }

    /// Records the requester's evaluation, closes the ticket and raises `TicketClosed`.
    #[tracing::instrument(skip(self, clock), fields(ticket_id = %self.id))]
    pub fn close(&mut self, evaluation: i64, clock: &dyn Clock) -> Result<(), DomainError> {
        if !self.status.can_close() {
            return Err(self.invalid_transition("close"));
        }
        let now = clock.now();
        self.revise(now, |t| {
            t.status = TicketStatus::Closed;
            t.evaluation = Some(evaluation);
            t.closing_date = Some(now);
        })?;

        let event = TicketEvent::TicketClosed(TicketClosedData {
            ticket_id: self.id,
            closing_date: now,
            evaluation,
        });
        self.add_event(&event, now)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> TicketStatus {
        self.status
    }

    pub fn category_id(&self) -> EntityId {
        self.category_id
    }

    pub fn department_id(&self) -> EntityId {
        self.department_id
    }

    pub fn requesting_user_email(&self) -> &str {
        &self.requesting_user_email
    }

    pub fn responsible_user_email(&self) -> Option<&str> {
        self.responsible_user_email.as_deref()
    }

    pub fn opening_date(&self) -> DateTime<Utc> {
        self.opening_date
    }

    pub fn due_date(&self) -> Option<DateTime<Utc>> {
        self.due_date
    }

    pub fn closing_date(&self) -> Option<DateTime<Utc>> {
        self.closing_date
    }

    pub fn evaluation(&self) -> Option<i64> {
        self.evaluation
    }

    fn ensure_not_closed(&self, action: &'static str) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(self.invalid_transition(action));
        }
        Ok(())
    }

    fn invalid_transition(&self, action: &'static str) -> DomainError {
        DomainError::InvalidStateTransition {
            entity_type: Self::ENTITY_TYPE,
            current_state: self.status.to_string(),
            action,
        }
    }

    fn raise_updated(&mut self, clock: &dyn Clock) -> Result<(), DomainError> {
        let event = TicketEvent::TicketUpdated(TicketUpdatedData {
            ticket_id: self.id,
            title: self.title.clone(),
            status: self.status,
            category_id: self.category_id,
            department_id: self.department_id,
            responsible_user_email: self.responsible_user_email.clone(),
            due_date: self.due_date,
        });
        self.add_event(&event, clock.now())
    }
}

impl Entity for Ticket {
    const ENTITY_TYPE: &'static str = "Ticket";

    fn id(&self) -> EntityId {
        self.id
    }

    fn audit(&self) -> &AuditInfo {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditInfo {
        &mut self.audit
    }

    fn events(&self) -> &EventBuffer {
        &self.events
    }

    fn events_mut(&mut self) -> &mut EventBuffer {
        &mut self.events
    }

    fn deletion_info(&self) -> Option<&DeletionInfo> {
        Some(&self.deletion)
    }

    fn check_rules(&self, errors: &mut ValidationErrors) {
        check_text(&self.title, "title", 1, TITLE_MAX_LEN, errors);
        check_text(&self.description, "description", 1, DESCRIPTION_MAX_LEN, errors);
        check_reference(self.category_id, "category", errors);
        check_reference(self.department_id, "department", errors);
        check_email(
            &self.requesting_user_email,
            "requesting user email",
            EMAIL_MAX_LEN,
            errors,
        );
        if let Some(email) = &self.responsible_user_email {
            check_email(email, "responsible user email", EMAIL_MAX_LEN, errors);
        }

        errors.ensure(
            (self.status == TicketStatus::Closed) == self.closing_date.is_some(),
            "A closed ticket must carry its closing date.",
        );
        if let Some(closing_date) = self.closing_date {
            errors.ensure(
                closing_date >= self.opening_date,
                "The closing date cannot precede the opening date.",
            );
        }
        if let Some(evaluation) = self.evaluation {
            errors.ensure(
                (MIN_EVALUATION..=MAX_EVALUATION).contains(&evaluation),
                "The evaluation must be between 1 and 5.",
            );
        }
    }
}

impl SoftDeletable for Ticket {
    fn deletion(&self) -> &DeletionInfo {
        &self.deletion
    }

    fn deletion_mut(&mut self) -> &mut DeletionInfo {
        &mut self.deletion
    }
}
