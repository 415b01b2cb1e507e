//! Composable, unevaluated filters over entity fields.
//!
//! A [`Predicate<T>`] is a typed handle over an immutable [`Filter`] tree.
//! Composition builds new trees that share their operands, so a base
//! predicate can be reused across any number of call sites. Nothing in this
//! module evaluates a filter: stores translate the tree into their own query
//! language.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::EntityId;
use uuid::Uuid;

use crate::ordering::{Sort, SortDirection};

/// The storage type of a field, used by stores to compare and cast values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Boolean,
    Uuid,
    Timestamp,
}

/// A literal operand inside a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Returns the kind of this literal.
    pub fn kind(&self) -> FieldKind {
        match self {
            Value::Text(_) => FieldKind::Text,
            Value::Integer(_) => FieldKind::Integer,
            Value::Float(_) => FieldKind::Float,
            Value::Boolean(_) => FieldKind::Boolean,
            Value::Uuid(_) => FieldKind::Uuid,
            Value::Timestamp(_) => FieldKind::Timestamp,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Uuid(u) => write!(f, "'{u}'"),
            Value::Timestamp(ts) => write!(f, "'{}'", ts.to_rfc3339()),
        }
    }
}

/// Rust types that can appear as field values in a filter.
pub trait FieldValue {
    /// The storage kind of this type.
    const KIND: FieldKind;

    /// Converts into a filter literal.
    fn into_value(self) -> Value;
}

impl FieldValue for String {
    const KIND: FieldKind = FieldKind::Text;

    fn into_value(self) -> Value {
        Value::Text(self)
    }
}

impl FieldValue for i64 {
    const KIND: FieldKind = FieldKind::Integer;

    fn into_value(self) -> Value {
        Value::Integer(self)
    }
}

impl FieldValue for f64 {
    const KIND: FieldKind = FieldKind::Float;

    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl FieldValue for bool {
    const KIND: FieldKind = FieldKind::Boolean;

    fn into_value(self) -> Value {
        Value::Boolean(self)
    }
}

impl FieldValue for Uuid {
    const KIND: FieldKind = FieldKind::Uuid;

    fn into_value(self) -> Value {
        Value::Uuid(self)
    }
}

impl FieldValue for EntityId {
    const KIND: FieldKind = FieldKind::Uuid;

    fn into_value(self) -> Value {
        Value::Uuid(self.as_uuid())
    }
}

impl FieldValue for DateTime<Utc> {
    const KIND: FieldKind = FieldKind::Timestamp;

    fn into_value(self) -> Value {
        Value::Timestamp(self)
    }
}

/// Untyped reference to a stored field: its document key and kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    /// Returns the SQL spelling of the operator.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }
}

/// The engine-agnostic filter tree a store translates into its query language.
///
/// Semantics follow SQL: a comparison against an absent (null) field is
/// unknown, and unknown rows never match.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Const(bool),
    Compare {
        field: FieldRef,
        op: Comparison,
        value: Value,
    },
    /// Case-insensitive substring match on a text field.
    Contains {
        field: FieldRef,
        needle: String,
    },
    OneOf {
        field: FieldRef,
        values: Vec<Value>,
    },
    IsNull(FieldRef),
    And(Arc<Filter>, Arc<Filter>),
    Or(Arc<Filter>, Arc<Filter>),
    Not(Arc<Filter>),
}

impl Filter {
    /// Returns true if this filter matches every row.
    pub fn is_match_all(&self) -> bool {
        matches!(self, Filter::Const(true))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Const(true) => f.write_str("TRUE"),
            Filter::Const(false) => f.write_str("FALSE"),
            Filter::Compare { field, op, value } => {
                write!(f, "{field} {} {value}", op.as_sql())
            }
            Filter::Contains { field, needle } => write!(f, "{field} CONTAINS '{needle}'"),
            Filter::OneOf { field, values } => {
                write!(f, "{field} IN (")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str(")")
            }
            Filter::IsNull(field) => write!(f, "{field} IS NULL"),
            Filter::And(a, b) => write!(f, "({a} AND {b})"),
            Filter::Or(a, b) => write!(f, "({a} OR {b})"),
            Filter::Not(a) => write!(f, "NOT {a}"),
        }
    }
}

fn conjoin(a: &Arc<Filter>, b: &Arc<Filter>) -> Arc<Filter> {
    match (a.as_ref(), b.as_ref()) {
        (Filter::Const(true), _) => Arc::clone(b),
        (_, Filter::Const(true)) => Arc::clone(a),
        (Filter::Const(false), _) | (_, Filter::Const(false)) => Arc::new(Filter::Const(false)),
        _ => Arc::new(Filter::And(Arc::clone(a), Arc::clone(b))),
    }
}

fn disjoin(a: &Arc<Filter>, b: &Arc<Filter>) -> Arc<Filter> {
    match (a.as_ref(), b.as_ref()) {
        (Filter::Const(false), _) => Arc::clone(b),
        (_, Filter::Const(false)) => Arc::clone(a),
        (Filter::Const(true), _) | (_, Filter::Const(true)) => Arc::new(Filter::Const(true)),
        _ => Arc::new(Filter::Or(Arc::clone(a), Arc::clone(b))),
    }
}

fn negate(a: &Arc<Filter>) -> Arc<Filter> {
    match a.as_ref() {
        Filter::Const(b) => Arc::new(Filter::Const(!b)),
        Filter::Not(inner) => Arc::clone(inner),
        _ => Arc::new(Filter::Not(Arc::clone(a))),
    }
}

/// A boolean test over entities of type `T`, built but never evaluated here.
///
/// Predicates over different entity types do not mix:
///
/// ```compile_fail
/// use domain::{Category, Department};
///
/// let by_name = Category::NAME.equals("Hardware");
/// let by_department = Department::NAME.equals("IT");
/// let _ = by_name.and(&by_department);
/// ```
pub struct Predicate<T> {
    root: Arc<Filter>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Predicate<T> {
    fn from_root(root: Arc<Filter>) -> Self {
        Self {
            root,
            _entity: PhantomData,
        }
    }

    fn leaf(filter: Filter) -> Self {
        Self::from_root(Arc::new(filter))
    }

    /// A predicate that matches everything (`true`) or nothing (`false`).
    ///
    /// `always(true)` is the usual seed when ANDing optional filters together.
    pub fn always(value: bool) -> Self {
        Self::leaf(Filter::Const(value))
    }

    /// Matches entities that satisfy both predicates.
    pub fn and(&self, other: &Predicate<T>) -> Predicate<T> {
        Self::from_root(conjoin(&self.root, &other.root))
    }

    /// Matches entities that satisfy either predicate.
    pub fn or(&self, other: &Predicate<T>) -> Predicate<T> {
        Self::from_root(disjoin(&self.root, &other.root))
    }

    /// Matches entities that do not satisfy this predicate.
    pub fn negate(&self) -> Predicate<T> {
        Self::from_root(negate(&self.root))
    }

    /// ANDs this predicate with `other` when one is supplied.
    pub fn and_maybe(&self, other: Option<&Predicate<T>>) -> Predicate<T> {
        match other {
            Some(other) => self.and(other),
            None => self.clone(),
        }
    }

    /// Folds predicates with AND, seeded with `always(true)`.
    pub fn all_of<'a, I>(predicates: I) -> Predicate<T>
    where
        I: IntoIterator<Item = &'a Predicate<T>>,
        T: 'a,
    {
        predicates
            .into_iter()
            .fold(Self::always(true), |acc, p| acc.and(p))
    }

    /// Folds predicates with OR, seeded with `always(false)`.
    pub fn any_of<'a, I>(predicates: I) -> Predicate<T>
    where
        I: IntoIterator<Item = &'a Predicate<T>>,
        T: 'a,
    {
        predicates
            .into_iter()
            .fold(Self::always(false), |acc, p| acc.or(p))
    }

    /// Returns the filter tree for a store to translate.
    pub fn filter(&self) -> &Filter {
        &self.root
    }
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        Self::from_root(Arc::clone(&self.root))
    }
}

impl<T> Default for Predicate<T> {
    fn default() -> Self {
        Self::always(true)
    }
}

impl<T> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.root).finish()
    }
}

impl<T> fmt::Display for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root.fmt(f)
    }
}

impl<T> BitAnd for Predicate<T> {
    type Output = Predicate<T>;

    fn bitand(self, rhs: Self) -> Self::Output {
        Predicate::and(&self, &rhs)
    }
}

impl<T> BitAnd for &Predicate<T> {
    type Output = Predicate<T>;

    fn bitand(self, rhs: Self) -> Self::Output {
        Predicate::and(self, rhs)
    }
}

impl<T> BitOr for Predicate<T> {
    type Output = Predicate<T>;

    fn bitor(self, rhs: Self) -> Self::Output {
        Predicate::or(&self, &rhs)
    }
}

impl<T> BitOr for &Predicate<T> {
    type Output = Predicate<T>;

    fn bitor(self, rhs: Self) -> Self::Output {
        Predicate::or(self, rhs)
    }
}

impl<T> Not for Predicate<T> {
    type Output = Predicate<T>;

    fn not(self) -> Self::Output {
        self.negate()
    }
}

impl<T> Not for &Predicate<T> {
    type Output = Predicate<T>;

    fn not(self) -> Self::Output {
        self.negate()
    }
}

/// A typed field of entity `T` holding values of type `V`.
///
/// Entities expose their filterable fields as associated constants, e.g.
/// `Category::NAME`.
pub struct Field<T, V> {
    field: FieldRef,
    _marker: PhantomData<fn() -> (T, V)>,
}

impl<T, V> Clone for Field<T, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, V> Copy for Field<T, V> {}

impl<T, V> fmt::Debug for Field<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.field.name)
            .field("kind", &self.field.kind)
            .finish()
    }
}

impl<T, V: FieldValue> Field<T, V> {
    /// Declares a field stored under the document key `name`.
    pub const fn new(name: &'static str) -> Self {
        Self {
            field: FieldRef {
                name,
                kind: V::KIND,
            },
            _marker: PhantomData,
        }
    }

    /// Returns the document key.
    pub fn name(&self) -> &'static str {
        self.field.name
    }

    /// Returns the untyped reference stores work with.
    pub fn field_ref(&self) -> FieldRef {
        self.field
    }

    fn compare(&self, op: Comparison, value: impl Into<V>) -> Predicate<T> {
        Predicate::leaf(Filter::Compare {
            field: self.field,
            op,
            value: value.into().into_value(),
        })
    }

    pub fn equals(&self, value: impl Into<V>) -> Predicate<T> {
        self.compare(Comparison::Eq, value)
    }

    pub fn not_equals(&self, value: impl Into<V>) -> Predicate<T> {
        self.compare(Comparison::Ne, value)
    }

    pub fn less_than(&self, value: impl Into<V>) -> Predicate<T> {
        self.compare(Comparison::Lt, value)
    }

    pub fn at_most(&self, value: impl Into<V>) -> Predicate<T> {
        self.compare(Comparison::Le, value)
    }

    pub fn greater_than(&self, value: impl Into<V>) -> Predicate<T> {
        self.compare(Comparison::Gt, value)
    }

    pub fn at_least(&self, value: impl Into<V>) -> Predicate<T> {
        self.compare(Comparison::Ge, value)
    }

    /// Matches when the field equals any of `values`. An empty list matches nothing.
    pub fn one_of<I, X>(&self, values: I) -> Predicate<T>
    where
        I: IntoIterator<Item = X>,
        X: Into<V>,
    {
        let values: Vec<Value> = values
            .into_iter()
            .map(|v| v.into().into_value())
            .collect();
        if values.is_empty() {
            return Predicate::always(false);
        }
        Predicate::leaf(Filter::OneOf {
            field: self.field,
            values,
        })
    }

    pub fn is_null(&self) -> Predicate<T> {
        Predicate::leaf(Filter::IsNull(self.field))
    }

    pub fn is_not_null(&self) -> Predicate<T> {
        self.is_null().negate()
    }

    /// Orders by this field, smallest first.
    pub fn ascending(&self) -> Sort<T> {
        Sort::by(self.field, SortDirection::Ascending)
    }

    /// Orders by this field, largest first.
    pub fn descending(&self) -> Sort<T> {
        Sort::by(self.field, SortDirection::Descending)
    }
}

impl<T> Field<T, String> {
    /// Case-insensitive substring match.
    pub fn contains(&self, needle: impl Into<String>) -> Predicate<T> {
        Predicate::leaf(Filter::Contains {
            field: self.field,
            needle: needle.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe;

    const NAME: Field<Probe, String> = Field::new("name");
    const RANK: Field<Probe, i64> = Field::new("rank");
    const ACTIVE: Field<Probe, bool> = Field::new("active");

    #[test]
    fn fields_carry_their_kind() {
        assert_eq!(NAME.field_ref().kind, FieldKind::Text);
        assert_eq!(RANK.field_ref().kind, FieldKind::Integer);
        assert_eq!(ACTIVE.field_ref().kind, FieldKind::Boolean);
    }

    #[test]
    fn composition_builds_new_trees_without_touching_operands() {
        let p = NAME.equals("alpha");
        let q = RANK.greater_than(3);
        let before_p = p.filter().clone();
        let before_q = q.filter().clone();

        let both = p.and(&q);
        let either = p.or(&q);
        let neither = !(&either);

        assert_eq!(p.filter(), &before_p);
        assert_eq!(q.filter(), &before_q);
        assert!(matches!(both.filter(), Filter::And(_, _)));
        assert!(matches!(either.filter(), Filter::Or(_, _)));
        assert!(matches!(neither.filter(), Filter::Not(_)));
    }

    #[test]
    fn always_true_is_the_identity_for_and() {
        let p = NAME.equals("alpha");
        let seeded = Predicate::always(true).and(&p);
        assert_eq!(seeded.filter(), p.filter());
        assert_eq!(Predicate::all_of([&p]).filter(), p.filter());
        assert!(Predicate::<Probe>::all_of([]).filter().is_match_all());
    }

    #[test]
    fn always_false_is_the_identity_for_or() {
        let p = NAME.equals("alpha");
        assert_eq!(Predicate::always(false).or(&p).filter(), p.filter());
        assert_eq!(
            Predicate::<Probe>::any_of([]).filter(),
            &Filter::Const(false)
        );
    }

    #[test]
    fn absorbing_constants_collapse() {
        let p = NAME.equals("alpha");
        assert_eq!(
            p.and(&Predicate::always(false)).filter(),
            &Filter::Const(false)
        );
        assert_eq!(
            p.or(&Predicate::always(true)).filter(),
            &Filter::Const(true)
        );
    }

    #[test]
    fn double_negation_cancels() {
        let p = RANK.at_most(10);
        assert_eq!(p.negate().negate().filter(), p.filter());
        assert_eq!(
            Predicate::<Probe>::always(true).negate().filter(),
            &Filter::Const(false)
        );
    }

    #[test]
    fn and_maybe_only_narrows_when_given_a_filter() {
        let base = ACTIVE.equals(true);
        let extra = NAME.contains("net");
        assert_eq!(base.and_maybe(None).filter(), base.filter());
        assert!(matches!(
            base.and_maybe(Some(&extra)).filter(),
            Filter::And(_, _)
        ));
    }

    #[test]
    fn empty_one_of_matches_nothing() {
        let none: Vec<String> = Vec::new();
        assert_eq!(NAME.one_of(none).filter(), &Filter::Const(false));
        assert!(matches!(
            NAME.one_of(["a", "b"]).filter(),
            Filter::OneOf { values, .. } if values.len() == 2
        ));
    }

    #[test]
    fn display_reads_like_sql() {
        let p = NAME.equals("alpha") & (RANK.less_than(3) | ACTIVE.equals(false).negate());
        assert_eq!(
            p.to_string(),
            "(name = 'alpha' AND (rank < 3 OR NOT active = false))"
        );
        assert_eq!(NAME.is_not_null().to_string(), "NOT name IS NULL");
    }
}
