use common::{Clock, EntityId};
use serde::{Deserialize, Serialize};

use crate::entity::{AuditInfo, DeletionInfo, Entity, SoftDeletable};
use crate::error::DomainError;
use crate::event::EventBuffer;
use crate::predicate::Field;
use crate::validation::{ValidationErrors, check_text};

use super::events::{CategoryData, CategoryEvent};
use super::{DESCRIPTION_MAX_LEN, NAME_MAX_LEN, NAME_MIN_LEN};

/// A ticket category. Soft-deleted so closed tickets keep their classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
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

impl Category {
    pub const NAME: Field<Category, String> = Field::new("name");
    pub const DESCRIPTION: Field<Category, String> = Field::new("description");

    /// Creates a validated category and raises `CategoryCreated`.
    pub fn create(
        name: impl Into<String>,
        description: impl Into<String>,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        let now = clock.now();
        let mut category = Self {
            id: EntityId::new(),
            name: name.into(),
            description: description.into(),
            audit: AuditInfo::default(),
            deletion: DeletionInfo::default(),
            events: EventBuffer::new(),
        };
        category.mark_created(now);
        category.validate()?;

        let event = CategoryEvent::CategoryCreated(category.snapshot());
        category.add_event(&event, now)?;
        Ok(category)
    }

    /// Renames or redescribes the category and raises `CategoryUpdated`.
    pub fn update(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let now = clock.now();
        let (name, description) = (name.into(), description.into());
        self.revise(now, |c| {
            c.name = name;
            c.description = description;
        })?;

        let event = CategoryEvent::CategoryUpdated(self.snapshot());
        self.add_event(&event, now)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    fn snapshot(&self) -> CategoryData {
        CategoryData {
            category_id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }
}

impl Entity for Category {
    const ENTITY_TYPE: &'static str = "Category";

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
        check_text(&self.name, "category name", NAME_MIN_LEN, NAME_MAX_LEN, errors);
        check_text(
            &self.description,
            "category description",
            0,
            DESCRIPTION_MAX_LEN,
            errors,
        );
    }
}

impl SoftDeletable for Category {
    fn deletion(&self) -> &DeletionInfo {
        &self.deletion
    }

    fn deletion_mut(&mut self) -> &mut DeletionInfo {
        &mut self.deletion
    }
}
