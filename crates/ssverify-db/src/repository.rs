use serde_json::Value;
use sqlx::{PgPool, Pool, Postgres};
use ssverify_core::error::AppError;
use ssverify_core::models::{Document, Filter, NewDocument, StoredRecord};
use uuid::Uuid;

/// Listing documents and audit snapshots in PostgreSQL.
///
/// Each row keeps the document body in a JSONB `doc` column next to its
/// `kind`. Updates merge keys into the existing body.
#[derive(Clone)]
pub struct ListingRepository {
    pool: Pool<Postgres>,
}

impl ListingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All documents matching the filter, oldest first.
    pub async fn find(&self, filter: &Filter) -> Result<Vec<StoredRecord>, AppError> {
        let query = match filter {
            Filter::Kind(kind) => sqlx::query_as::<_, ListingRow>(
                r#"
                SELECT id, kind, doc
                FROM listings
                WHERE kind = $1
                ORDER BY created_at, id
                "#,
            )
            .bind(kind),
            Filter::Id(id) => sqlx::query_as::<_, ListingRow>(
                r#"
                SELECT id, kind, doc
                FROM listings
                WHERE id = $1
                "#,
            )
            .bind(id),
        };

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(StoredRecord::try_from).collect()
    }

    pub async fn insert_one(&self, doc: &NewDocument) -> Result<Uuid, AppError> {
        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO listings (kind, doc)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(&doc.kind)
        .bind(Value::Object(doc.doc.clone()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.0)
    }

    /// Insert all documents in one transaction.
    pub async fn insert_many(&self, docs: &[NewDocument]) -> Result<Vec<Uuid>, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            let row: (Uuid,) = sqlx::query_as(
                r#"
                INSERT INTO listings (kind, doc)
                VALUES ($1, $2)
                RETURNING id
                "#,
            )
            .bind(&doc.kind)
            .bind(Value::Object(doc.doc.clone()))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
            ids.push(row.0);
        }

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(ids)
    }

    /// Merge `set` into the first matching document. Returns the matched count.
    pub async fn update_one(&self, filter: &Filter, set: &Document) -> Result<u64, AppError> {
        let patch = Value::Object(set.clone());
        let query = match filter {
            Filter::Id(id) => sqlx::query(
                r#"
                UPDATE listings
                SET doc = doc || $2
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(patch),
            Filter::Kind(kind) => sqlx::query(
                r#"
                UPDATE listings
                SET doc = doc || $2
                WHERE id = (
                    SELECT id FROM listings
                    WHERE kind = $1
                    ORDER BY created_at, id
                    LIMIT 1
                )
                "#,
            )
            .bind(kind)
            .bind(patch),
        };

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct ListingRow {
    id: Uuid,
    kind: String,
    doc: Value,
}

impl TryFrom<ListingRow> for StoredRecord {
    type Error = AppError;

    fn try_from(row: ListingRow) -> Result<Self, Self::Error> {
        match row.doc {
            Value::Object(doc) => Ok(StoredRecord {
                id: row.id,
                kind: row.kind,
                doc,
            }),
            other => Err(AppError::DatabaseError(format!(
                "Document {} is not a JSON object: {other}",
                row.id
            ))),
        }
    }
}

// -- Trait implementation --

impl ssverify_core::traits::ListingStore for ListingRepository {
    async fn find(&self, filter: &Filter) -> Result<Vec<StoredRecord>, AppError> {
        ListingRepository::find(self, filter).await
    }

    async fn insert_one(&self, doc: &NewDocument) -> Result<Uuid, AppError> {
        ListingRepository::insert_one(self, doc).await
    }

    async fn insert_many(&self, docs: &[NewDocument]) -> Result<Vec<Uuid>, AppError> {
        ListingRepository::insert_many(self, docs).await
    }

    async fn update_one(&self, filter: &Filter, set: &Document) -> Result<u64, AppError> {
        ListingRepository::update_one(self, filter, set).await
    }
}
