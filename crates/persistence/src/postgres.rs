use async_trait::async_trait;
use common::EntityId;
use domain::{FieldKind, FieldRef, Filter, SortKey, Value};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    PersistenceError, RecordQuery, Result,
    store::{Change, Store, StoreTransaction, StoredRecord},
};

/// SQLSTATE for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL-backed store implementation.
///
/// Every entity type shares the `entities` table; rows are `jsonb`
/// documents and filters are translated into SQL over `data ->> field`.
/// Field names and values are always bound as parameters.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<StoredRecord> {
        Ok(StoredRecord {
            id: EntityId::from_uuid(row.try_get::<Uuid, _>("id")?),
            data: row.try_get("data")?,
        })
    }
}

fn push_field(qb: &mut QueryBuilder<'_, Postgres>, field: &FieldRef) {
    qb.push("(data ->> ");
    qb.push_bind(field.name);
    match field.kind {
        FieldKind::Text => qb.push(") COLLATE \"C\""),
        FieldKind::Integer => qb.push(")::bigint"),
        FieldKind::Float => qb.push(")::double precision"),
        FieldKind::Boolean => qb.push(")::boolean"),
        FieldKind::Uuid => qb.push(")::uuid"),
        FieldKind::Timestamp => qb.push(")::timestamptz"),
    };
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: &Value) {
    match value {
        Value::Text(s) => qb.push_bind(s.clone()),
        Value::Integer(i) => qb.push_bind(*i),
        Value::Float(x) => qb.push_bind(*x),
        Value::Boolean(b) => qb.push_bind(*b),
        Value::Uuid(u) => qb.push_bind(*u),
        Value::Timestamp(ts) => qb.push_bind(*ts),
    };
}

/// Escapes LIKE wildcards so `needle` matches literally.
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Appends `filter` as a parenthesized SQL boolean expression.
pub(crate) fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    match filter {
        Filter::Const(true) => {
            qb.push("TRUE");
        }
        Filter::Const(false) => {
            qb.push("FALSE");
        }
        Filter::Compare { field, op, value } => {
            qb.push("(");
            push_field(qb, field);
            qb.push(" ").push(op.as_sql()).push(" ");
            push_value(qb, value);
            qb.push(")");
        }
        Filter::Contains { field, needle } => {
            qb.push("((data ->> ");
            qb.push_bind(field.name);
            qb.push(") ILIKE ");
            qb.push_bind(like_pattern(needle));
            qb.push(" ESCAPE '\\')");
        }
        Filter::OneOf { field, values } => {
            qb.push("(");
            push_field(qb, field);
            qb.push(" IN (");
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_value(qb, value);
            }
            qb.push("))");
        }
        Filter::IsNull(field) => {
            qb.push("((data ->> ");
            qb.push_bind(field.name);
            qb.push(") IS NULL)");
        }
        Filter::And(a, b) => {
            qb.push("(");
            push_filter(qb, a);
            qb.push(" AND ");
            push_filter(qb, b);
            qb.push(")");
        }
        Filter::Or(a, b) => {
            qb.push("(");
            push_filter(qb, a);
            qb.push(" OR ");
            push_filter(qb, b);
            qb.push(")");
        }
        Filter::Not(a) => {
            qb.push("(NOT ");
            push_filter(qb, a);
            qb.push(")");
        }
    }
}

fn push_order(qb: &mut QueryBuilder<'_, Postgres>, keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    qb.push(" ORDER BY ");
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        push_field(qb, &key.field);
        qb.push(" ").push(key.direction.as_sql());
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl Store for PostgresStore {
    async fn fetch(&self, entity_type: &str, query: &RecordQuery) -> Result<Vec<StoredRecord>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id, data FROM entities WHERE entity_type = ");
        qb.push_bind(entity_type.to_string());
        qb.push(" AND ");
        push_filter(&mut qb, &query.filter);
        push_order(&mut qb, &query.sort);
        if query.offset > 0 {
            qb.push(" OFFSET ").push_bind(to_i64(query.offset));
        }
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(to_i64(limit));
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn count(&self, entity_type: &str, filter: &Filter) -> Result<u64> {
        let mut qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM entities WHERE entity_type = ");
        qb.push_bind(entity_type.to_string());
        qb.push(" AND ");
        push_filter(&mut qb, filter);

        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }
}

/// A transaction on a [`PostgresStore`]. Dropping it rolls back.
struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn apply(&mut self, change: &Change) -> Result<()> {
        let result = match change {
            Change::Insert {
                entity_type,
                id,
                data,
            } => sqlx::query("INSERT INTO entities (entity_type, id, data) VALUES ($1, $2, $3)")
                .bind(*entity_type)
                .bind(id.as_uuid())
                .bind(data)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| {
                    if let sqlx::Error::Database(ref db_err) = e
                        && db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
                    {
                        return PersistenceError::Conflict(format!(
                            "{entity_type} {id} already exists"
                        ));
                    }
                    PersistenceError::Database(e)
                })?,
            Change::Update {
                entity_type,
                id,
                data,
            } => {
                sqlx::query(
                    "UPDATE entities SET data = $3, updated_at = NOW() WHERE entity_type = $1 AND id = $2",
                )
                .bind(*entity_type)
                .bind(id.as_uuid())
                .bind(data)
                .execute(&mut *self.tx)
                .await?
            }
            Change::Delete { entity_type, id } => {
                sqlx::query("DELETE FROM entities WHERE entity_type = $1 AND id = $2")
                    .bind(*entity_type)
                    .bind(id.as_uuid())
                    .execute(&mut *self.tx)
                    .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound {
                entity_type: change.entity_type(),
                id: change.id(),
            });
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Field, Predicate};

    struct Doc;

    const NAME: Field<Doc, String> = Field::new("name");
    const RANK: Field<Doc, i64> = Field::new("rank");

    fn sql(predicate: &Predicate<Doc>) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("");
        push_filter(&mut qb, predicate.filter());
        qb.sql().to_string()
    }

    #[test]
    fn field_names_and_values_are_bound() {
        let text = sql(&NAME.equals("robert'); DROP TABLE entities;--"));
        assert_eq!(text, "((data ->> $1) COLLATE \"C\" = $2)");
    }

    #[test]
    fn connectives_nest_with_parentheses() {
        let text = sql(&(NAME.contains("net") | RANK.at_least(3)).negate());
        assert_eq!(
            text,
            "(NOT (((data ->> $1) ILIKE $2 ESCAPE '\\') OR ((data ->> $3)::bigint >= $4)))"
        );
    }

    #[test]
    fn one_of_and_null_checks() {
        assert_eq!(
            sql(&RANK.one_of([1, 2])),
            "((data ->> $1)::bigint IN ($2, $3))"
        );
        assert_eq!(sql(&NAME.is_null()), "((data ->> $1) IS NULL)");
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }
}
