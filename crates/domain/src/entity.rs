//! Entity lifecycle model.
//!
//! Every persisted entity is a plain struct that embeds an [`AuditInfo`],
//! an [`EventBuffer`] and, when it can be soft-deleted, a [`DeletionInfo`].
//! The [`Entity`] trait exposes those parts to the repository; the
//! [`SoftDeletable`] and [`HardDeletable`] capability traits decide which
//! deletion policy a type supports.

use chrono::{DateTime, Utc};
use common::{EntityId, storage_precision};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::DomainError;
use crate::event::{DomainEvent, EventBuffer, EventEnvelope};
use crate::predicate::{Field, Predicate};
use crate::validation::{ValidationErrors, check_lifecycle};

/// Creation and last-modification timestamps.
///
/// Stamps are kept at microsecond precision so they compare the same in
/// every store. Serialized flat into the entity row as `created_at` / `updated_at`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditInfo {
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl AuditInfo {
    /// Audit info for an entity created at `now`.
    pub fn created(now: DateTime<Utc>) -> Self {
        Self {
            created_at: Some(storage_precision(now)),
            updated_at: None,
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Stamps the creation time unless one is already set.
    ///
    /// Returns true if the stamp was applied.
    pub fn mark_created(&mut self, now: DateTime<Utc>) -> bool {
        if self.created_at.is_some() {
            return false;
        }
        self.created_at = Some(storage_precision(now));
        true
    }

    /// Stamps the modification time, never earlier than the creation time.
    pub fn mark_updated(&mut self, now: DateTime<Utc>) {
        let now = storage_precision(now);
        let stamp = match self.created_at {
            Some(created_at) if created_at > now => created_at,
            _ => now,
        };
        self.updated_at = Some(stamp);
    }
}

/// Soft-delete flag and timestamp.
///
/// `is_deleted` is true exactly when `deleted_at` is set; the mutators keep
/// both in step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionInfo {
    #[serde(default)]
    is_deleted: bool,
    #[serde(default)]
    deleted_at: Option<DateTime<Utc>>,
}

impl DeletionInfo {
    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// Marks as deleted at `now`. Already-deleted info keeps its original date.
    ///
    /// Returns true if the state changed.
    pub fn mark_deleted(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_deleted {
            return false;
        }
        self.is_deleted = true;
        self.deleted_at = Some(storage_precision(now));
        true
    }

    /// Clears the deleted flag and date.
    ///
    /// Returns true if the state changed.
    pub fn restore(&mut self) -> bool {
        if !self.is_deleted && self.deleted_at.is_none() {
            return false;
        }
        self.is_deleted = false;
        self.deleted_at = None;
        true
    }
}

/// A persisted object with stable identity, audit timestamps and a buffer of
/// pending domain events.
///
/// The serialized form must expose the id as `id` and the flattened
/// [`AuditInfo`] fields, since the repository filters on them by name. The
/// event buffer is never serialized.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name of the entity type, used as the storage partition and event origin.
    const ENTITY_TYPE: &'static str;

    const ID: Field<Self, EntityId> = Field::new("id");
    const CREATED_AT: Field<Self, DateTime<Utc>> = Field::new("created_at");
    const UPDATED_AT: Field<Self, DateTime<Utc>> = Field::new("updated_at");

    fn id(&self) -> EntityId;

    fn audit(&self) -> &AuditInfo;

    fn audit_mut(&mut self) -> &mut AuditInfo;

    fn events(&self) -> &EventBuffer;

    fn events_mut(&mut self) -> &mut EventBuffer;

    /// Soft-delete state, for types that have one.
    fn deletion_info(&self) -> Option<&DeletionInfo> {
        None
    }

    /// Appends the rules specific to this entity type.
    fn check_rules(&self, _errors: &mut ValidationErrors) {}

    /// Runs the lifecycle rules followed by the entity's own rules.
    fn validate(&self) -> Result<(), DomainError> {
        let mut errors = ValidationErrors::new();
        check_lifecycle(self.id(), self.audit(), self.deletion_info(), &mut errors);
        self.check_rules(&mut errors);
        errors.into_result().map_err(DomainError::from)
    }

    /// Stamps the creation time if it has not been stamped yet.
    fn mark_created(&mut self, now: DateTime<Utc>) -> bool {
        self.audit_mut().mark_created(now)
    }

    fn mark_updated(&mut self, now: DateTime<Utc>) {
        self.audit_mut().mark_updated(now);
    }

    /// Applies `change` to a copy, stamps `updated_at` and keeps the copy only if it validates.
    ///
    /// A rejected change leaves `self` untouched.
    fn revise<F>(&mut self, now: DateTime<Utc>, change: F) -> Result<(), DomainError>
    where
        F: FnOnce(&mut Self),
    {
        let mut next = self.clone();
        change(&mut next);
        next.mark_updated(now);
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// Buffers `event` for dispatch after the next commit that stages this entity.
    fn add_event<E: DomainEvent>(&mut self, event: &E, now: DateTime<Utc>) -> Result<(), DomainError> {
        let envelope = EventEnvelope::new(Self::ENTITY_TYPE, self.id(), event, now)?;
        self.events_mut().push(envelope);
        Ok(())
    }

    /// Returns the buffered events and leaves the buffer empty.
    fn drain_events(&mut self) -> Vec<EventEnvelope> {
        self.events_mut().drain()
    }
}

/// Entities removed by flagging rather than deleting the row.
///
/// The flattened [`DeletionInfo`] must be serialized as `is_deleted` /
/// `deleted_at`.
pub trait SoftDeletable: Entity {
    const IS_DELETED: Field<Self, bool> = Field::new("is_deleted");
    const DELETED_AT: Field<Self, DateTime<Utc>> = Field::new("deleted_at");

    fn deletion(&self) -> &DeletionInfo;

    fn deletion_mut(&mut self) -> &mut DeletionInfo;

    fn is_deleted(&self) -> bool {
        self.deletion().is_deleted()
    }

    /// Flags the entity as deleted at `now` and re-validates.
    ///
    /// Deleting an already-deleted entity leaves both timestamps untouched.
    /// A failed validation leaves `self` untouched. Returns true if the state
    /// changed.
    fn soft_delete(&mut self, now: DateTime<Utc>) -> Result<bool, DomainError> {
        let mut next = self.clone();
        let changed = next.deletion_mut().mark_deleted(now);
        if changed {
            next.mark_updated(now);
        }
        next.validate()?;
        *self = next;
        Ok(changed)
    }

    /// Clears the deleted flag and re-validates.
    ///
    /// A failed validation leaves `self` untouched. Returns true if the state
    /// changed.
    fn restore(&mut self, now: DateTime<Utc>) -> Result<bool, DomainError> {
        let mut next = self.clone();
        let changed = next.deletion_mut().restore();
        if changed {
            next.mark_updated(now);
        }
        next.validate()?;
        *self = next;
        Ok(changed)
    }

    /// Matches entities that are not soft-deleted.
    fn not_deleted() -> Predicate<Self> {
        Self::IS_DELETED.equals(false)
    }

    /// Matches soft-deleted entities.
    fn deleted() -> Predicate<Self> {
        Self::IS_DELETED.equals(true)
    }
}

/// Entities whose rows are removed outright.
pub trait HardDeletable: Entity {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Note {
        id: EntityId,
        text: String,
        #[serde(flatten)]
        audit: AuditInfo,
        #[serde(flatten)]
        deletion: DeletionInfo,
        #[serde(skip)]
        events: EventBuffer,
    }

    #[derive(Debug, Serialize)]
    struct NoteWritten {
        text: String,
    }

    impl DomainEvent for NoteWritten {
        fn event_type(&self) -> &'static str {
            "NoteWritten"
        }
    }

    impl Entity for Note {
        const ENTITY_TYPE: &'static str = "Note";

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
            errors.ensure(!self.text.is_empty(), "The text is required.");
        }
    }

    impl SoftDeletable for Note {
        fn deletion(&self) -> &DeletionInfo {
            &self.deletion
        }

        fn deletion_mut(&mut self) -> &mut DeletionInfo {
            &mut self.deletion
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn note(created: DateTime<Utc>) -> Note {
        Note {
            id: EntityId::new(),
            text: "hello".to_string(),
            audit: AuditInfo::created(created),
            deletion: DeletionInfo::default(),
            events: EventBuffer::new(),
        }
    }

    #[test]
    fn creation_stamp_is_set_once() {
        let mut audit = AuditInfo::default();
        assert!(audit.mark_created(start()));
        assert!(!audit.mark_created(start() + Duration::days(1)));
        assert_eq!(audit.created_at(), Some(start()));
    }

    #[test]
    fn update_stamp_never_precedes_creation() {
        let mut audit = AuditInfo::created(start());
        audit.mark_updated(start() - Duration::hours(1));
        assert_eq!(audit.updated_at(), Some(start()));
    }

    #[test]
    fn soft_delete_then_restore_round_trips() {
        let mut n = note(start());
        let later = start() + Duration::minutes(10);

        assert!(n.soft_delete(later).unwrap());
        assert!(n.is_deleted());
        assert_eq!(n.deletion().deleted_at(), Some(later));
        assert_eq!(n.audit().updated_at(), Some(later));

        assert!(n.restore(later + Duration::minutes(1)).unwrap());
        assert!(!n.is_deleted());
        assert_eq!(n.deletion().deleted_at(), None);
        assert!(!n.restore(later + Duration::minutes(2)).unwrap());
    }

    #[test]
    fn validation_runs_entity_rules_after_lifecycle_rules() {
        let mut n = note(start());
        n.id = EntityId::nil();
        n.text.clear();
        let err = n.validate().unwrap_err();
        let rules: Vec<_> = err.validation_errors().unwrap().iter().collect();
        assert_eq!(rules, vec!["The id cannot be empty.", "The text is required."]);
    }

    #[test]
    fn soft_delete_reports_violations_in_post_state() {
        let mut n = note(start());
        n.text.clear();
        assert!(n.soft_delete(start()).is_err());
        assert!(!n.is_deleted());
        assert_eq!(n.deletion().deleted_at(), None);
        assert_eq!(n.audit().updated_at(), None);
    }

    #[test]
    fn rejected_restore_leaves_entity_deleted() {
        let mut n = note(start());
        let later = start() + Duration::minutes(5);
        n.soft_delete(later).unwrap();
        n.text.clear();

        assert!(n.restore(later + Duration::minutes(1)).is_err());
        assert!(n.is_deleted());
        assert_eq!(n.deletion().deleted_at(), Some(later));
        assert_eq!(n.audit().updated_at(), Some(later));
    }

    #[test]
    fn stamps_are_truncated_to_microseconds() {
        let precise = start() + Duration::nanoseconds(123_456_789);
        let stored = start() + Duration::microseconds(123_456);

        let mut audit = AuditInfo::default();
        audit.mark_created(precise);
        audit.mark_updated(precise + Duration::seconds(1));
        assert_eq!(audit.created_at(), Some(stored));
        assert_eq!(audit.updated_at(), Some(stored + Duration::seconds(1)));

        let mut deletion = DeletionInfo::default();
        deletion.mark_deleted(precise);
        assert_eq!(deletion.deleted_at(), Some(stored));
    }

    #[test]
    fn serialized_row_exposes_filterable_fields_and_hides_events() {
        let mut n = note(start());
        n.add_event(&NoteWritten { text: "hi".into() }, start()).unwrap();
        let row = serde_json::to_value(&n).unwrap();

        assert_eq!(row["id"], serde_json::json!(n.id));
        assert!(row.get("created_at").is_some());
        assert_eq!(row["is_deleted"], false);
        assert!(row.get("events").is_none());

        let back: Note = serde_json::from_value(row).unwrap();
        assert_eq!(back.audit, n.audit);
        assert!(back.events.is_empty());
    }

    #[test]
    fn added_events_carry_entity_origin() {
        let mut n = note(start());
        n.add_event(&NoteWritten { text: "a".into() }, start()).unwrap();
        let events = n.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].entity_type, "Note");
        assert_eq!(events[0].entity_id, n.id);
        assert_eq!(events[0].event_type, "NoteWritten");
    }

    #[test]
    fn rejected_revision_leaves_entity_untouched() {
        let mut n = note(start());
        let later = start() + Duration::hours(1);

        let err = n.revise(later, |n| n.text.clear()).unwrap_err();
        assert!(err.validation_errors().unwrap().mentions("text is required"));
        assert_eq!(n.text, "hello");
        assert_eq!(n.audit().updated_at(), None);

        n.revise(later, |n| n.text = "edited".into()).unwrap();
        assert_eq!(n.text, "edited");
        assert_eq!(n.audit().updated_at(), Some(later));
    }

    #[test]
    fn not_deleted_filters_on_the_flag() {
        assert_eq!(Note::not_deleted().to_string(), "is_deleted = false");
        assert_eq!(Note::deleted().to_string(), "is_deleted = true");
    }

    proptest! {
        #[test]
        fn soft_delete_is_idempotent(offset in 0i64..1_000_000, again in 0i64..1_000_000) {
            let mut n = note(start());
            let first = start() + Duration::seconds(offset);
            n.soft_delete(first).unwrap();
            let after_one = (n.deletion, n.audit);

            let changed = n.soft_delete(first + Duration::seconds(again)).unwrap();
            prop_assert!(!changed);
            prop_assert_eq!((n.deletion, n.audit), after_one);
            prop_assert!(n.is_deleted());

            n.restore(first).unwrap();
            prop_assert!(!n.deletion.is_deleted());
            prop_assert_eq!(n.deletion.deleted_at(), None);
        }

        #[test]
        fn buffer_drains_exactly_once(first in 0usize..8, second in 0usize..8) {
            let mut n = note(start());
            for i in 0..first {
                n.add_event(&NoteWritten { text: i.to_string() }, start()).unwrap();
            }
            let drained = n.drain_events();
            prop_assert_eq!(drained.len(), first);
            prop_assert!(n.drain_events().is_empty());

            for i in 0..second {
                n.add_event(&NoteWritten { text: i.to_string() }, start()).unwrap();
            }
            let next = n.drain_events();
            prop_assert_eq!(next.len(), second);
            prop_assert!(next.iter().all(|e| drained.iter().all(|d| d.event_id != e.event_id)));
        }
    }
}
