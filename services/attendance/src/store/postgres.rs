//! PostgreSQL backend
//!
//! Keeps the document as a single JSONB row. Upserts only move the stored
//! version forward.

use sqlx::{PgPool, types::Json};
use tracing::{error, info};

use common::database::{DatabaseConfig, health_check, init_pool};
use common::error::DatabaseError;

use super::{Document, StoreError};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS attendance_documents (
        id TEXT PRIMARY KEY,
        version BIGINT NOT NULL,
        body JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

pub struct PgBackend {
    pool: PgPool,
    document_id: String,
}

impl PgBackend {
    /// Connect, check the database is reachable and make sure the table exists
    pub async fn connect(
        config: &DatabaseConfig,
        document_id: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let pool = init_pool(config).await?;
        health_check(&pool).await?;

        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(DatabaseError::Schema)?;

        let document_id = document_id.into();
        info!("PostgreSQL store ready for document '{}'", document_id);

        Ok(Self { pool, document_id })
    }

    pub async fn load(&self) -> Result<Document, StoreError> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT body FROM attendance_documents WHERE id = $1")
                .bind(&self.document_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::Query)?;

        let Some((body,)) = row else {
            info!("No stored document '{}', creating one", self.document_id);
            let document = Document::default();
            self.overwrite(&document).await?;
            return Ok(document);
        };

        match serde_json::from_value::<Document>(body) {
            Ok(document) => Ok(document),
            Err(e) => {
                error!(
                    "Stored document '{}' is unreadable ({}); resetting it. \
                     All sessions, attendance and history it held are lost",
                    self.document_id, e
                );
                let document = Document::default();
                self.overwrite(&document).await?;
                Ok(document)
            }
        }
    }

    pub async fn save(&self, document: &Document) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO attendance_documents (id, version, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET
                version = EXCLUDED.version,
                body = EXCLUDED.body,
                updated_at = NOW()
            WHERE attendance_documents.version < EXCLUDED.version
            "#,
        )
        .bind(&self.document_id)
        .bind(document.version as i64)
        .bind(Json(document))
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        Ok(())
    }

    /// Unconditional write, used when the stored body had to be discarded
    async fn overwrite(&self, document: &Document) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO attendance_documents (id, version, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET
                version = EXCLUDED.version,
                body = EXCLUDED.body,
                updated_at = NOW()
            "#,
        )
        .bind(&self.document_id)
        .bind(document.version as i64)
        .bind(Json(document))
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        Ok(())
    }
}
