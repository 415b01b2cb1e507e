use common::{Clock, EntityId};
use serde::{Deserialize, Serialize};

use crate::entity::{AuditInfo, DeletionInfo, Entity, SoftDeletable};
use crate::error::DomainError;
use crate::event::EventBuffer;
use crate::predicate::Field;
use crate::validation::{ValidationErrors, check_text};

use super::events::{DepartmentData, DepartmentEvent};
use super::{DESCRIPTION_MAX_LEN, NAME_MAX_LEN, NAME_MIN_LEN};

/// The team a ticket is routed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    id: EntityId,
    name: String,
    description: String,
    #[serde(flatten)]
    audit: AuditInfo,
    #[serde(flatten)]
    deletion: DeletionInfo,
    #[serde(skip)]
    events: EventBuffer,
}

impl Department {
    pub const NAME: Field<Department, String> = Field::new("name");
    pub const DESCRIPTION: Field<Department, String> = Field::new("description");

    pub fn create(
        name: impl Into<String>,
        description: impl Into<String>,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        let now = clock.now();
        let mut department = Self {
            id: EntityId::new(),
            name: name.into(),
            description: description.into(),
            audit: AuditInfo::default(),
            deletion: DeletionInfo::default(),
            events: EventBuffer::new(),
        };
        department.mark_created(now);
        department.validate()?;

        let event = DepartmentEvent::DepartmentCreated(department.snapshot());
        department.add_event(&event, now)?;
        Ok(department)
    }

    pub fn update(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let now = clock.now();
        let (name, description) = (name.into(), description.into());
        self.revise(now, |d| {
            d.name = name;
            d.description = description;
        })?;

        let event = DepartmentEvent::DepartmentUpdated(self.snapshot());
        self.add_event(&event, now)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    fn snapshot(&self) -> DepartmentData {
        DepartmentData {
            department_id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }
}

impl Entity for Department {
    const ENTITY_TYPE: &'static str = "Department";

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
        check_text(&self.name, "department name", NAME_MIN_LEN, NAME_MAX_LEN, errors);
        check_text(
            &self.description,
            "department description",
            0,
            DESCRIPTION_MAX_LEN,
            errors,
        );
    }
}

impl SoftDeletable for Department {
    fn deletion(&self) -> &DeletionInfo {
        &self.deletion
    }

    fn deletion_mut(&mut self) -> &mut DeletionInfo {
        &mut self.deletion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::SystemClock;

    #[test]
    fn create_raises_department_created() {
        let mut department = Department::create("Support", "First line", &SystemClock).unwrap();
        let events = department.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "DepartmentCreated");
        assert_eq!(events[0].entity_type, "Department");
    }

    #[test]
    fn soft_delete_keeps_the_department_valid() {
        let mut department = Department::create("Support", "First line", &SystemClock).unwrap();
        assert!(department.soft_delete(SystemClock.now()).unwrap());
        assert!(department.validate().is_ok());
    }
}
