//! services/api/src/adapters/db.rs
//!
//! The Postgres implementation of the `DocumentStore` port. Every collection lives
//! in one `documents` table keyed by `(collection, id)` with the fields kept as JSONB;
//! query conditions are translated into JSONB path expressions.

use async_trait::async_trait;
use job_board_core::domain::{Document, Fields, FilterOp, QueryCondition};
use job_board_core::ports::{DocumentStore, PortError, PortResult};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the embedded migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

//=========================================================================================
// Row Structs and Error Mapping
//=========================================================================================

#[derive(FromRow)]
struct DocumentRecord {
    id: String,
    data: Json<Value>,
}

impl DocumentRecord {
    fn to_domain(self) -> Document {
        let fields = match self.data.0 {
            Value::Object(fields) => fields,
            _ => Fields::new(),
        };
        Document::new(self.id, fields)
    }
}

/// Maps database failures onto document-store codes. Connection-level failures
/// become `unavailable`, which the facade treats as offline.
pub(crate) fn map_sqlx_error(e: sqlx::Error) -> PortError {
    match &e {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => {
            PortError::store("unavailable", format!("The database is unreachable: {}", e))
        }
        sqlx::Error::RowNotFound => PortError::NotFound(e.to_string()),
        _ => PortError::store("internal", e.to_string()),
    }
}

//=========================================================================================
// Query Translation
//=========================================================================================

/// Builds the `SELECT` for a filtered collection read.
fn select_documents(
    collection: &str,
    conditions: &[QueryCondition],
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT id, data FROM documents WHERE collection = ");
    qb.push_bind(collection.to_string());
    for condition in conditions {
        qb.push(" AND ");
        push_condition(&mut qb, condition);
    }
    qb.push(" ORDER BY id");
    qb
}

fn push_field(qb: &mut QueryBuilder<'static, Postgres>, condition: &QueryCondition) {
    qb.push("(data #> ");
    qb.push_bind(field_path(condition));
    qb.push(")");
}

/// The field as text, for string comparisons.
fn push_field_text(qb: &mut QueryBuilder<'static, Postgres>, condition: &QueryCondition) {
    qb.push("(data #>> ");
    qb.push_bind(field_path(condition));
    qb.push(")");
}

fn field_path(condition: &QueryCondition) -> Vec<String> {
    condition.path().into_iter().map(str::to_string).collect()
}

fn push_type_guard(qb: &mut QueryBuilder<'static, Postgres>, condition: &QueryCondition, kind: &str) {
    qb.push("jsonb_typeof");
    push_field(qb, condition);
    qb.push(format!(" = '{}' AND ", kind));
}

fn push_condition(qb: &mut QueryBuilder<'static, Postgres>, condition: &QueryCondition) {
    let value = condition.value.clone();
    qb.push("(");
    match condition.op {
        FilterOp::Eq => {
            push_field(qb, condition);
            qb.push(" = ");
            qb.push_bind(Json(value));
        }
        FilterOp::Ne => {
            push_field(qb, condition);
            qb.push(" IS NOT NULL AND ");
            push_field(qb, condition);
            qb.push(" <> ");
            qb.push_bind(Json(value));
        }
        FilterOp::Lt | FilterOp::Le | FilterOp::Gt | FilterOp::Ge => {
            push_range(qb, condition, value);
        }
        FilterOp::ArrayContains => {
            // Element equality; jsonb `@>` would also match nested containment.
            push_type_guard(qb, condition, "array");
            qb.push("EXISTS (SELECT 1 FROM jsonb_array_elements");
            push_field(qb, condition);
            qb.push(" AS elem(v) WHERE elem.v = ");
            qb.push_bind(Json(value));
            qb.push(")");
        }
        FilterOp::ArrayContainsAny => {
            push_type_guard(qb, condition, "array");
            qb.push("EXISTS (SELECT 1 FROM jsonb_array_elements");
            push_field(qb, condition);
            qb.push(" AS elem(v) WHERE elem.v IN (SELECT jsonb_array_elements(");
            qb.push_bind(Json(value));
            qb.push(")))");
        }
        FilterOp::In => {
            push_field(qb, condition);
            qb.push(" IN (SELECT jsonb_array_elements(");
            qb.push_bind(Json(value));
            qb.push("))");
        }
        FilterOp::NotIn => {
            push_field(qb, condition);
            qb.push(" IS NOT NULL AND ");
            push_field(qb, condition);
            qb.push(" NOT IN (SELECT jsonb_array_elements(");
            qb.push_bind(Json(value));
            qb.push("))");
        }
    }
    qb.push(")");
}

/// Ordering only applies between two numbers, two strings, two booleans or two
/// nulls. Strings compare byte-wise, independent of the database collation.
fn push_range(qb: &mut QueryBuilder<'static, Postgres>, condition: &QueryCondition, value: Value) {
    let op = condition.op.as_str();
    match value {
        Value::Number(_) | Value::Bool(_) => {
            let kind = if value.is_number() { "number" } else { "boolean" };
            push_type_guard(qb, condition, kind);
            push_field(qb, condition);
            qb.push(format!(" {} ", op));
            qb.push_bind(Json(value));
        }
        Value::String(text) => {
            push_type_guard(qb, condition, "string");
            push_field_text(qb, condition);
            qb.push(format!(" COLLATE \"C\" {} ", op));
            qb.push_bind(text);
        }
        Value::Null if matches!(condition.op, FilterOp::Le | FilterOp::Ge) => {
            qb.push("jsonb_typeof");
            push_field(qb, condition);
            qb.push(" = 'null'");
        }
        Value::Null | Value::Array(_) | Value::Object(_) => {
            qb.push("FALSE");
        }
    }
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn query(
        &self,
        collection: &str,
        conditions: &[QueryCondition],
    ) -> PortResult<Vec<Document>> {
        let records = select_documents(collection, conditions)
            .build_query_as::<DocumentRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<Document>> {
        let record = sqlx::query_as::<_, DocumentRecord>(
            "SELECT id, data FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3) \
             ON CONFLICT (collection, id) DO UPDATE SET data = EXCLUDED.data, updated_at = now()",
        )
        .bind(collection)
        .bind(id)
        .bind(Json(Value::Object(fields)))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn probe(&self) -> PortResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unfiltered_read_only_scopes_the_collection() {
        let qb = select_documents("jobs", &[]);
        assert_eq!(
            qb.sql(),
            "SELECT id, data FROM documents WHERE collection = $1 ORDER BY id"
        );
    }

    #[test]
    fn equality_uses_a_jsonb_path() {
        let qb = select_documents("jobs", &[QueryCondition::new("userId", FilterOp::Eq, "u1")]);
        assert_eq!(
            qb.sql(),
            "SELECT id, data FROM documents WHERE collection = $1 AND ((data #> $2) = $3) ORDER BY id"
        );
    }

    #[test]
    fn numeric_ranges_only_compare_numbers() {
        let qb = select_documents(
            "jobs",
            &[QueryCondition::new("salary", FilterOp::Ge, 50000)],
        );
        assert!(qb
            .sql()
            .contains("(jsonb_typeof(data #> $2) = 'number' AND (data #> $3) >= $4)"));
    }

    #[test]
    fn string_ranges_compare_bytewise() {
        let qb = select_documents(
            "jobs",
            &[QueryCondition::new("title", FilterOp::Lt, "M")],
        );
        assert!(qb
            .sql()
            .contains("(jsonb_typeof(data #> $2) = 'string' AND (data #>> $3) COLLATE \"C\" < $4)"));
    }

    #[test]
    fn ranges_over_structured_values_never_match() {
        let qb = select_documents(
            "jobs",
            &[
                QueryCondition::new("tags", FilterOp::Gt, json!(["a"])),
                QueryCondition::new("address", FilterOp::Le, json!({ "city": "Oslo" })),
                QueryCondition::new("closedAt", FilterOp::Lt, Value::Null),
            ],
        );
        assert_eq!(
            qb.sql(),
            "SELECT id, data FROM documents WHERE collection = $1 AND (FALSE) AND (FALSE) AND (FALSE) ORDER BY id"
        );

        let qb = select_documents(
            "jobs",
            &[QueryCondition::new("closedAt", FilterOp::Ge, Value::Null)],
        );
        assert!(qb.sql().contains("(jsonb_typeof(data #> $2) = 'null')"));
    }

    #[test]
    fn array_contains_compares_whole_elements() {
        let qb = select_documents(
            "jobs",
            &[QueryCondition::new("skills", FilterOp::ArrayContains, json!({ "name": "rust" }))],
        );
        let sql = qb.sql();
        assert!(sql.contains(
            "(jsonb_typeof(data #> $2) = 'array' AND EXISTS (SELECT 1 FROM jsonb_array_elements(data #> $3) AS elem(v) WHERE elem.v = $4))"
        ));
        assert!(!sql.contains("@>"));
    }

    #[test]
    fn conditions_are_anded_with_fresh_placeholders() {
        let qb = select_documents(
            "jobs",
            &[
                QueryCondition::new("skills", FilterOp::ArrayContains, "rust"),
                QueryCondition::new("type", FilterOp::NotIn, json!(["contract"])),
            ],
        );
        let sql = qb.sql();
        assert!(sql.contains("WHERE elem.v = $4)"));
        assert!(sql.contains("NOT IN (SELECT jsonb_array_elements($7))"));
        assert!(sql.ends_with(" ORDER BY id"));
    }

    #[test]
    fn connection_failures_are_unavailable() {
        assert_eq!(map_sqlx_error(sqlx::Error::PoolTimedOut).code(), "unavailable");
        assert_eq!(
            map_sqlx_error(sqlx::Error::Protocol("bad frame".to_string())).code(),
            "internal"
        );
    }
}
