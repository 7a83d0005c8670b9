//! Postgres-backed document store.
//!
//! Every collection lives in one `documents` table with a `jsonb` body.
//! Filter clauses are compiled to SQL with bound parameters; a textual
//! filter value is tried against each JSON type it could denote (number,
//! boolean, string), mirroring the in-memory coercion rules.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` (primary key on `(collection, id)`) |
//! | Database (other) | Any other | `Backend` |
//! | Other | N/A | `Backend` |
//!
//! Unique indexes declared by resources are checked with a lookup before the
//! write, not by a database constraint.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::instrument;

use natours_core::timestamp;
use natours_query::{ComparisonOp, Direction, FilterClause};

use super::eval::lookup;
use super::{Document, DocumentQuery, DocumentStore, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    seq BIGSERIAL,
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    body JSONB NOT NULL,
    PRIMARY KEY (collection, id)
)
"#;

#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: Arc<PgPool>,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and make sure the `documents` table exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn first_id(
        &self,
        collection: &str,
        clauses: &[FilterClause],
    ) -> Result<Option<String>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id FROM documents WHERE collection = ");
        qb.push_bind(collection.to_string());
        push_clauses(&mut qb, clauses);
        qb.push(" ORDER BY seq ASC LIMIT 1");

        let row = qb
            .build()
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("first_id", e))?;
        row.map(|r| r.try_get::<String, _>("id"))
            .transpose()
            .map_err(|e| map_sqlx_error("first_id", e))
    }

    /// Fail with `Duplicate` if another document holds `doc`'s unique values.
    async fn check_unique(
        &self,
        collection: &str,
        doc: &Document,
        unique: &[&[&str]],
    ) -> Result<(), StoreError> {
        let own_id = document_id(doc)?;
        for index in unique {
            let values: Option<Vec<&Value>> = index
                .iter()
                .map(|field| lookup(doc, field).filter(|v| !v.is_null()))
                .collect();
            let Some(values) = values else {
                continue;
            };

            let mut qb =
                QueryBuilder::<Postgres>::new("SELECT 1 AS taken FROM documents WHERE collection = ");
            qb.push_bind(collection.to_string());
            qb.push(" AND id <> ");
            qb.push_bind(own_id.clone());
            for (field, value) in index.iter().zip(&values) {
                qb.push(" AND body #> ");
                qb.push_bind(path(field));
                qb.push(" = ");
                qb.push_bind(Json((*value).clone()));
            }
            qb.push(" LIMIT 1");

            let taken = qb
                .build()
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("check_unique", e))?
                .is_some();
            if taken {
                return Err(StoreError::Duplicate {
                    field: index.join(", "),
                    value: values
                        .iter()
                        .map(|v| match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    #[instrument(skip(self, doc, unique), err)]
    async fn insert(
        &self,
        collection: &str,
        doc: Document,
        unique: &[&[&str]],
    ) -> Result<(), StoreError> {
        self.check_unique(collection, &doc, unique).await?;
        let id = document_id(&doc)?;

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, body)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(doc))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert", e))?;
        Ok(())
    }

    #[instrument(skip(self, query), fields(collection = query.collection), err)]
    async fn find(&self, query: &DocumentQuery) -> Result<Vec<Document>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT body FROM documents WHERE collection = ");
        qb.push_bind(query.collection.to_string());
        push_clauses(&mut qb, &query.clauses);

        qb.push(" ORDER BY ");
        if let Some(spec) = &query.sort {
            for key in spec.keys() {
                qb.push("body #> ");
                qb.push_bind(path(&key.field));
                qb.push(match key.direction {
                    Direction::Ascending => " ASC NULLS FIRST, ",
                    Direction::Descending => " DESC NULLS LAST, ",
                });
            }
        }
        qb.push("seq ASC");

        if let Some(limit) = query.limit {
            qb.push(" LIMIT ");
            qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(query.skip).unwrap_or(i64::MAX));

        let rows = qb
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<Json<Document>, _>("body")
                    .map(|body| body.0)
                    .map_err(|e| StoreError::Malformed(format!("failed to decode document row: {e}")))
            })
            .collect()
    }

    #[instrument(skip(self, clauses), err)]
    async fn find_one(
        &self,
        collection: &str,
        clauses: &[FilterClause],
    ) -> Result<Option<Document>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT body FROM documents WHERE collection = ");
        qb.push_bind(collection.to_string());
        push_clauses(&mut qb, clauses);
        qb.push(" ORDER BY seq ASC LIMIT 1");

        let row = qb
            .build()
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_one", e))?;
        row.map(|r| {
            r.try_get::<Json<Document>, _>("body")
                .map(|body| body.0)
                .map_err(|e| StoreError::Malformed(format!("failed to decode document row: {e}")))
        })
        .transpose()
    }

    #[instrument(skip(self, clauses, doc, unique), err)]
    async fn replace(
        &self,
        collection: &str,
        clauses: &[FilterClause],
        doc: Document,
        unique: &[&[&str]],
    ) -> Result<bool, StoreError> {
        let Some(id) = self.first_id(collection, clauses).await? else {
            return Ok(false);
        };
        self.check_unique(collection, &doc, unique).await?;

        let result = sqlx::query(
            r#"
            UPDATE documents SET body = $3
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(doc))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("replace", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, clauses), err)]
    async fn delete(
        &self,
        collection: &str,
        clauses: &[FilterClause],
    ) -> Result<Option<Document>, StoreError> {
        let Some(id) = self.first_id(collection, clauses).await? else {
            return Ok(None);
        };

        let row = sqlx::query(
            r#"
            DELETE FROM documents
            WHERE collection = $1 AND id = $2
            RETURNING body
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete", e))?;

        row.map(|r| {
            r.try_get::<Json<Document>, _>("body")
                .map(|body| body.0)
                .map_err(|e| StoreError::Malformed(format!("failed to decode document row: {e}")))
        })
        .transpose()
    }
}

fn document_id(doc: &Document) -> Result<String, StoreError> {
    doc.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StoreError::Malformed("document has no string id".to_string()))
}

fn path(field: &str) -> Vec<String> {
    field.split('.').map(str::to_string).collect()
}

fn push_clauses(qb: &mut QueryBuilder<'_, Postgres>, clauses: &[FilterClause]) {
    for clause in clauses {
        qb.push(" AND ");
        push_clause(qb, clause);
    }
}

/// The JSON values a filter value may stand for.
enum Candidate {
    Number(f64),
    Bool(bool),
    Text(String),
    Null,
}

fn candidates(value: &Value) -> Vec<Candidate> {
    match value {
        Value::Null => vec![Candidate::Null],
        Value::Bool(b) => vec![Candidate::Bool(*b)],
        Value::Number(n) => n.as_f64().map(Candidate::Number).into_iter().collect(),
        // Stored instants are fixed-width, so a queried instant is rewritten
        // to the same width before it is compared as text.
        Value::String(s) => {
            let text = timestamp::parse(s).map_or_else(|| s.clone(), |at| timestamp::format(&at));
            let mut out = vec![Candidate::Text(text)];
            if let Ok(n) = s.trim().parse::<f64>() {
                out.push(Candidate::Number(n));
            }
            match s.as_str() {
                "true" => out.push(Candidate::Bool(true)),
                "false" => out.push(Candidate::Bool(false)),
                _ => {}
            }
            out
        }
        other => vec![Candidate::Text(other.to_string())],
    }
}

/// `NOT (...)` for `Ne`, so a missing field satisfies it.
fn push_clause(qb: &mut QueryBuilder<'_, Postgres>, clause: &FilterClause) {
    let sql_op = match clause.op {
        ComparisonOp::Eq | ComparisonOp::Ne => "=",
        ComparisonOp::Gt => ">",
        ComparisonOp::Gte => ">=",
        ComparisonOp::Lt => "<",
        ComparisonOp::Lte => "<=",
    };
    let equality = matches!(clause.op, ComparisonOp::Eq | ComparisonOp::Ne);
    let field = path(&clause.field);

    if clause.op == ComparisonOp::Ne {
        qb.push("NOT ");
    }
    qb.push("(FALSE");
    for candidate in candidates(&clause.value) {
        qb.push(" OR COALESCE(");
        match candidate {
            Candidate::Number(n) => {
                qb.push("(jsonb_typeof(body #> ");
                qb.push_bind(field.clone());
                qb.push(") = 'number' AND (body #>> ");
                qb.push_bind(field.clone());
                qb.push(")::double precision ");
                qb.push(sql_op);
                qb.push(" ");
                qb.push_bind(n);
                qb.push(")");
                if equality {
                    qb.push(" OR body #> ");
                    qb.push_bind(field.clone());
                    qb.push(" @> jsonb_build_array(");
                    qb.push_bind(n);
                    qb.push(")");
                }
            }
            Candidate::Bool(b) => {
                qb.push("(jsonb_typeof(body #> ");
                qb.push_bind(field.clone());
                qb.push(") = 'boolean' AND (body #>> ");
                qb.push_bind(field.clone());
                qb.push(")::boolean ");
                qb.push(sql_op);
                qb.push(" ");
                qb.push_bind(b);
                qb.push(")");
            }
            Candidate::Text(s) => {
                qb.push("(jsonb_typeof(body #> ");
                qb.push_bind(field.clone());
                qb.push(") = 'string' AND (body #>> ");
                qb.push_bind(field.clone());
                qb.push(") ");
                qb.push(sql_op);
                qb.push(" ");
                qb.push_bind(s.clone());
                qb.push(")");
                if equality {
                    qb.push(" OR body #> ");
                    qb.push_bind(field.clone());
                    qb.push(" @> jsonb_build_array(");
                    qb.push_bind(s);
                    qb.push("::text)");
                }
            }
            Candidate::Null => {
                qb.push("(body #> ");
                qb.push_bind(field.clone());
                qb.push(" IS NULL OR jsonb_typeof(body #> ");
                qb.push_bind(field.clone());
                qb.push(") = 'null')");
            }
        }
        qb.push(", FALSE)");
    }
    qb.push(")");
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code() {
                Some(code) if code.as_ref() == "23505" => StoreError::Duplicate {
                    field: "id".to_string(),
                    value: msg,
                },
                _ => StoreError::Backend(msg),
            }
        }
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn texts(value: Value) -> Vec<String> {
        candidates(&value)
            .into_iter()
            .filter_map(|c| match c {
                Candidate::Text(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn queried_instants_match_the_stored_width() {
        assert_eq!(
            texts(json!("2021-04-25T11:00:00+02:00")),
            vec!["2021-04-25T09:00:00.000000000Z".to_string()]
        );
        assert_eq!(texts(json!("easy")), vec!["easy".to_string()]);
        assert_eq!(texts(json!("2021-07-01")), vec!["2021-07-01".to_string()]);
    }

    #[test]
    fn schema_is_safe_to_apply_on_every_connect() {
        assert!(SCHEMA.trim_start().starts_with("CREATE TABLE IF NOT EXISTS documents"));
        assert_eq!(SCHEMA.matches("CREATE").count(), 1);
    }

    #[test]
    fn numeric_and_boolean_text_also_tries_typed_values() {
        let all = candidates(&json!("397"));
        assert!(all.iter().any(|c| matches!(c, Candidate::Number(n) if *n == 397.0)));
        let all = candidates(&json!("false"));
        assert!(all.iter().any(|c| matches!(c, Candidate::Bool(false))));
    }
}
