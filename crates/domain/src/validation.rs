//! Entity invariant checking.

use chrono::{DateTime, Datelike, Utc};
use common::EntityId;
use thiserror::Error;

use crate::entity::{AuditInfo, DeletionInfo};

/// Earliest year accepted for any entity timestamp.
pub const MIN_SUPPORTED_YEAR: i32 = 1900;

/// Latest year accepted for any entity timestamp.
pub const MAX_SUPPORTED_YEAR: i32 = 3000;

/// The ordered list of rules an entity violates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{}", .errors.join("; "))]
pub struct ValidationErrors {
    errors: Vec<String>,
}

impl ValidationErrors {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a violated rule.
    pub fn push(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Records `message` unless `holds` is true.
    pub fn ensure(&mut self, holds: bool, message: impl Into<String>) {
        if !holds {
            self.push(message);
        }
    }

    /// Returns true if no rule was violated.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of violated rules.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Iterates over the violation messages in the order they were found.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(String::as_str)
    }

    /// Returns true if any violation message contains `fragment`.
    pub fn mentions(&self, fragment: &str) -> bool {
        self.errors.iter().any(|e| e.contains(fragment))
    }

    /// Converts the collection into a result.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

fn in_supported_range(ts: DateTime<Utc>) -> bool {
    (MIN_SUPPORTED_YEAR..=MAX_SUPPORTED_YEAR).contains(&ts.year())
}

/// Rules shared by every persisted entity.
pub fn check_lifecycle(
    id: EntityId,
    audit: &AuditInfo,
    deletion: Option<&DeletionInfo>,
    errors: &mut ValidationErrors,
) {
    errors.ensure(!id.is_nil(), "The id cannot be empty.");

    match audit.created_at() {
        None => errors.push("The creation date must be provided."),
        Some(created_at) => errors.ensure(
            in_supported_range(created_at),
            "The creation date must be between 1900 and 3000.",
        ),
    }

    if let Some(updated_at) = audit.updated_at() {
        errors.ensure(
            in_supported_range(updated_at),
            "The update date must be between 1900 and 3000.",
        );
        if let Some(created_at) = audit.created_at() {
            errors.ensure(
                updated_at >= created_at,
                "The update date cannot precede the creation date.",
            );
        }
    }

    if let Some(deletion) = deletion {
        errors.ensure(
            deletion.is_deleted() == deletion.deleted_at().is_some(),
            "A deleted entity must carry its deletion date.",
        );
        if let Some(deleted_at) = deletion.deleted_at() {
            errors.ensure(
                in_supported_range(deleted_at),
                "The deletion date must be between 1900 and 3000.",
            );
        }
    }
}

/// Checks a required text field's presence and length bounds, counted in characters.
pub fn check_text(
    value: &str,
    label: &str,
    min: usize,
    max: usize,
    errors: &mut ValidationErrors,
) {
    if value.trim().is_empty() {
        errors.push(format!("The {label} is required."));
        return;
    }
    let len = value.chars().count();
    if len < min {
        errors.push(format!("The {label} must have at least {min} characters."));
    }
    if len > max {
        errors.push(format!("The {label} must have at most {max} characters."));
    }
}

/// Checks that a required reference to another entity is set.
pub fn check_reference(id: EntityId, label: &str, errors: &mut ValidationErrors) {
    errors.ensure(!id.is_nil(), format!("The {label} is required."));
}

/// Checks a required email address: one `@` with text on both sides, at most `max` characters.
pub fn check_email(value: &str, label: &str, max: usize, errors: &mut ValidationErrors) {
    if value.trim().is_empty() {
        errors.push(format!("The {label} is required."));
        return;
    }
    let well_formed = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@') && !value.contains(' ')
        }
        None => false,
    };
    errors.ensure(well_formed, format!("The {label} is not a valid email address."));
    if value.chars().count() > max {
        errors.push(format!("The {label} must have at most {max} characters."));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(year: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn lifecycle_rules_accept_a_fresh_entity() {
        let mut errors = ValidationErrors::new();
        check_lifecycle(EntityId::new(), &AuditInfo::created(at(2024)), None, &mut errors);
        assert!(errors.is_empty(), "{errors}");
    }

    #[test]
    fn lifecycle_rules_reject_nil_id_and_missing_creation() {
        let mut errors = ValidationErrors::new();
        check_lifecycle(EntityId::nil(), &AuditInfo::default(), None, &mut errors);
        assert_eq!(errors.len(), 2);
        assert!(errors.mentions("id cannot be empty"));
        assert!(errors.mentions("creation date must be provided"));
    }

    #[test]
    fn lifecycle_rules_reject_out_of_range_dates() {
        let mut errors = ValidationErrors::new();
        check_lifecycle(EntityId::new(), &AuditInfo::created(at(1850)), None, &mut errors);
        assert!(errors.mentions("between 1900 and 3000"));
    }

    #[test]
    fn text_rules_report_each_violation() {
        let mut errors = ValidationErrors::new();
        check_text("  ", "name", 2, 100, &mut errors);
        check_text("a", "title", 2, 100, &mut errors);
        check_text(&"x".repeat(101), "label", 2, 100, &mut errors);
        check_text("ok", "other", 2, 100, &mut errors);

        let messages: Vec<_> = errors.iter().collect();
        assert_eq!(
            messages,
            vec![
                "The name is required.",
                "The title must have at least 2 characters.",
                "The label must have at most 100 characters.",
            ]
        );
    }

    #[test]
    fn errors_display_joins_messages() {
        let mut errors = ValidationErrors::new();
        errors.push("first");
        errors.push("second");
        assert_eq!(errors.to_string(), "first; second");
        assert!(errors.clone().into_result().is_err());
        assert!(ValidationErrors::new().into_result().is_ok());
    }

    #[test]
    fn email_rules_require_a_single_at_sign() {
        let mut errors = ValidationErrors::new();
        check_email("agent@example.com", "email", 200, &mut errors);
        assert!(errors.is_empty());

        check_email("agent.example.com", "email", 200, &mut errors);
        check_email("a@b@c", "email", 200, &mut errors);
        check_email("", "email", 200, &mut errors);
        assert_eq!(errors.len(), 3);
        assert!(errors.mentions("email is required"));
    }

    #[test]
    fn reference_rules_reject_nil_ids() {
        let mut errors = ValidationErrors::new();
        check_reference(EntityId::new(), "category", &mut errors);
        check_reference(EntityId::nil(), "department", &mut errors);
        let messages: Vec<_> = errors.iter().collect();
        assert_eq!(messages, vec!["The department is required."]);
    }
}
