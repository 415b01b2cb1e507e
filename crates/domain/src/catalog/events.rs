//! Category and department domain events.

use common::EntityId;
use serde::{Deserialize, Serialize};

use crate::event::DomainEvent;

/// Events raised by a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CategoryEvent {
    /// Category was created.
    CategoryCreated(CategoryData),

    /// Category name or description changed.
    CategoryUpdated(CategoryData),
}

impl DomainEvent for CategoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CategoryEvent::CategoryCreated(_) => "CategoryCreated",
            CategoryEvent::CategoryUpdated(_) => "CategoryUpdated",
        }
    }
}

/// Snapshot of a category carried by its events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryData {
    pub category_id: EntityId,
    pub name: String,
    pub description: String,
}

/// Events raised by a department.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DepartmentEvent {
    /// Department was created.
    DepartmentCreated(DepartmentData),

    /// Department name or description changed.
    DepartmentUpdated(DepartmentData),
}

impl DomainEvent for DepartmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DepartmentEvent::DepartmentCreated(_) => "DepartmentCreated",
            DepartmentEvent::DepartmentUpdated(_) => "DepartmentUpdated",
        }
    }
}

/// Snapshot of a department carried by its events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentData {
    pub department_id: EntityId,
    pub name: String,
    pub description: String,
}
