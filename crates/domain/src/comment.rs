//! Comments left on tickets.
//!
//! Comments carry no history worth keeping once removed, so they are
//! hard-deleted.

use common::{Clock, EntityId};
use serde::{Deserialize, Serialize};

use crate::entity::{AuditInfo, Entity, HardDeletable};
use crate::error::DomainError;
use crate::event::{DomainEvent, EventBuffer};
use crate::predicate::Field;
use crate::validation::{ValidationErrors, check_email, check_reference, check_text};

const TEXT_MAX_LEN: usize = 1000;
const EMAIL_MAX_LEN: usize = 200;

/// Events raised by a comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CommentEvent {
    /// Comment was posted on a ticket.
    CommentCreated(CommentCreatedData),
}

impl DomainEvent for CommentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CommentEvent::CommentCreated(_) => "CommentCreated",
        }
    }
}

/// Data for CommentCreated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentCreatedData {
    pub comment_id: EntityId,
    pub ticket_id: EntityId,
    pub user_id: EntityId,
    pub user_email: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    id: EntityId,
    ticket_id: EntityId,
    user_id: EntityId,
    user_email: String,
    text: String,
    #[serde(flatten)]
    audit: AuditInfo,
    #[serde(skip)]
    events: EventBuffer,
}

impl Comment {
    pub const TICKET_ID: Field<Comment, EntityId> = Field::new("ticket_id");
    pub const USER_ID: Field<Comment, EntityId> = Field::new("user_id");
    pub const TEXT: Field<Comment, String> = Field::new("text");

    /// Posts a comment and raises `CommentCreated`.
    pub fn post(
        ticket_id: EntityId,
        user_id: EntityId,
        user_email: impl Into<String>,
        text: impl Into<String>,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        let now = clock.now();
        let mut comment = Self {
            id: EntityId::new(),
            ticket_id,
            user_id,
            user_email: user_email.into(),
            text: text.into(),
            audit: AuditInfo::default(),
            events: EventBuffer::new(),
        };
        comment.mark_created(now);
        comment.validate()?;

        let event = CommentEvent::CommentCreated(CommentCreatedData {
            comment_id: comment.id,
            ticket_id,
            user_id,
            user_email: comment.user_email.clone(),
            text: comment.text.clone(),
        });
        comment.add_event(&event, now)?;
        Ok(comment)
    }

    pub fn ticket_id(&self) -> EntityId {
        self.ticket_id
    }

    pub fn user_id(&self) -> EntityId {
        self.user_id
    }

    pub fn user_email(&self) -> &str {
        &self.user_email
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Entity for Comment {
    const ENTITY_TYPE: &'static str = "Comment";

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

    fn check_rules(&self, errors: &mut ValidationErrors) {
        check_text(&self.text, "comment text", 1, TEXT_MAX_LEN, errors);
        check_reference(self.ticket_id, "ticket", errors);
        check_reference(self.user_id, "user", errors);
        check_email(&self.user_email, "user email", EMAIL_MAX_LEN, errors);
    }
}

impl HardDeletable for Comment {}

#[cfg(test)]
mod tests {
    use super::*;
    use common::SystemClock;

    #[test]
    fn post_raises_comment_created() {
        let ticket_id = EntityId::new();
        let mut comment = Comment::post(
            ticket_id,
            EntityId::new(),
            "ana@example.com",
            "Rebooted, still broken",
            &SystemClock,
        )
        .unwrap();

        assert!(comment.deletion_info().is_none());
        let events = comment.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "CommentCreated");
        assert_eq!(events[0].payload["data"]["ticket_id"], serde_json::json!(ticket_id));
    }

    #[test]
    fn post_rejects_empty_text() {
        let err = Comment::post(EntityId::new(), EntityId::new(), "a@b.c", " ", &SystemClock)
            .unwrap_err();
        assert!(err.validation_errors().unwrap().mentions("comment text is required"));
    }
}
