//! Sort keys for repository searches.

use std::marker::PhantomData;

use crate::predicate::FieldRef;

/// Direction of a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// One untyped ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortKey {
    pub field: FieldRef,
    pub direction: SortDirection,
}

/// An ordered list of sort keys over entities of type `T`.
///
/// Built from fields, e.g. `Ticket::PRIORITY.descending().then(Ticket::TITLE.ascending())`.
/// Absent values sort last ascending and first descending, matching PostgreSQL.
pub struct Sort<T> {
    keys: Vec<SortKey>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Sort<T> {
    pub(crate) fn by(field: FieldRef, direction: SortDirection) -> Self {
        Self {
            keys: vec![SortKey { field, direction }],
            _entity: PhantomData,
        }
    }

    /// Breaks ties with the keys of `next`.
    pub fn then(mut self, next: Sort<T>) -> Self {
        self.keys.extend(next.keys);
        self
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }
}

impl<T> Clone for Sort<T> {
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Sort<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Sort").field(&self.keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::Field;

    struct Probe;

    const NAME: Field<Probe, String> = Field::new("name");
    const RANK: Field<Probe, i64> = Field::new("rank");

    #[test]
    fn then_appends_tie_breakers_in_order() {
        let sort = RANK.descending().then(NAME.ascending());
        let keys = sort.keys();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].field.name, "rank");
        assert_eq!(keys[0].direction, SortDirection::Descending);
        assert_eq!(keys[1].field.name, "name");
        assert_eq!(keys[1].direction.as_sql(), "ASC");
    }
}
