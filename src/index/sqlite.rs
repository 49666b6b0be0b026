//! SQLite index backend.
//!
//! Entries live in an `objects` table keyed by variant identity. Workspace
//! membership is a scalar text column holding delimited markers. Fulltext
//! buffers live in a separate `fulltext` table with one row per
//! (target, source, bucket).

use crate::error::{IndexError, Result};
use crate::index::{FulltextBuffer, FulltextFragments, IndexClient, IndexEntry};
use crate::indexer::membership::WorkspaceMembership;
use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS objects (
        variant_identity TEXT PRIMARY KEY NOT NULL,
        node_identity TEXT NOT NULL,
        dimensions_hash TEXT NOT NULL,
        node_type TEXT NOT NULL,
        owner_workspace TEXT NOT NULL,
        workspace_membership TEXT NOT NULL,
        properties TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS objects_node_identity ON objects (node_identity)",
    "CREATE TABLE IF NOT EXISTS fulltext (
        target TEXT NOT NULL,
        source TEXT NOT NULL,
        bucket TEXT NOT NULL,
        content TEXT NOT NULL,
        PRIMARY KEY (target, source, bucket)
    )",
    "CREATE INDEX IF NOT EXISTS fulltext_source ON fulltext (source)",
];

type ObjectRow = (String, String, String, String, String, String, String);

const SELECT_OBJECTS: &str = "SELECT variant_identity, node_identity, dimensions_hash, node_type, \
     owner_workspace, workspace_membership, properties FROM objects";

/// Index entries persisted in SQLite.
#[derive(Debug, Clone)]
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Connect to `database_url` (e.g. `sqlite://index.db` or
    /// `sqlite::memory:`), creating the database and schema if missing.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Every connection to an in-memory database opens a fresh, empty one,
        // so the pool must hold on to exactly one connection for its lifetime.
        let in_memory = database_url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options.connect_with(options).await?;
        Self::open(pool).await
    }

    /// Wrap an existing pool and make sure the schema exists.
    pub async fn open(pool: SqlitePool) -> Result<Self> {
        let index = Self { pool };
        index.create_schema().await?;
        Ok(index)
    }

    async fn create_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::debug!("sqlite index schema ready");
        Ok(())
    }

    /// Number of stored entries.
    pub async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM objects")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    fn decode_row(row: ObjectRow) -> Result<IndexEntry> {
        let (
            variant_identity,
            node_identity,
            dimensions_hash,
            node_type,
            owner_workspace,
            workspace_membership,
            properties,
        ) = row;

        let corrupt = |reason: String| IndexError::Corrupt {
            variant_identity: variant_identity.clone(),
            reason,
        };

        let workspace_membership = WorkspaceMembership::decode(&workspace_membership)
            .map_err(|e| corrupt(format!("workspace membership: {e}")))?;
        let properties = serde_json::from_str(&properties)
            .map_err(|e| corrupt(format!("properties: {e}")))?;

        Ok(IndexEntry {
            variant_identity,
            node_identity,
            dimensions_hash,
            node_type,
            owner_workspace,
            properties,
            workspace_membership,
        })
    }
}

#[async_trait]
impl IndexClient for SqliteIndex {
    async fn find_by_node_identity(&self, node_identity: &str) -> Result<Vec<IndexEntry>> {
        let rows: Vec<ObjectRow> = sqlx::query_as(&format!(
            "{SELECT_OBJECTS} WHERE node_identity = ? ORDER BY variant_identity"
        ))
        .bind(node_identity)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::decode_row).collect()
    }

    async fn find_one_by_variant_identity(
        &self,
        variant_identity: &str,
    ) -> Result<Option<IndexEntry>> {
        let row: Option<ObjectRow> =
            sqlx::query_as(&format!("{SELECT_OBJECTS} WHERE variant_identity = ?"))
                .bind(variant_identity)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Self::decode_row).transpose()
    }

    async fn upsert(&self, entry: &IndexEntry) -> Result<()> {
        let properties = serde_json::to_string(&entry.properties).map_err(|e| IndexError::Corrupt {
            variant_identity: entry.variant_identity.clone(),
            reason: format!("properties: {e}"),
        })?;

        sqlx::query(
            "INSERT INTO objects (variant_identity, node_identity, dimensions_hash, node_type, \
             owner_workspace, workspace_membership, properties) VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (variant_identity) DO UPDATE SET \
             node_identity = excluded.node_identity, \
             dimensions_hash = excluded.dimensions_hash, \
             node_type = excluded.node_type, \
             owner_workspace = excluded.owner_workspace, \
             workspace_membership = excluded.workspace_membership, \
             properties = excluded.properties",
        )
        .bind(&entry.variant_identity)
        .bind(&entry.node_identity)
        .bind(&entry.dimensions_hash)
        .bind(&entry.node_type)
        .bind(&entry.owner_workspace)
        .bind(entry.workspace_membership.encode())
        .bind(properties)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, variant_identity: &str) -> Result<()> {
        let mut transaction = self.pool.begin().await?;
        sqlx::query("DELETE FROM objects WHERE variant_identity = ?")
            .bind(variant_identity)
            .execute(&mut *transaction)
            .await?;
        sqlx::query("DELETE FROM fulltext WHERE target = ? OR source = ?")
            .bind(variant_identity)
            .bind(variant_identity)
            .execute(&mut *transaction)
            .await?;
        transaction.commit().await?;
        Ok(())
    }

    async fn append_fulltext(
        &self,
        target: &str,
        source: &str,
        fragments: &FulltextFragments,
    ) -> Result<()> {
        let mut transaction = self.pool.begin().await?;
        sqlx::query("DELETE FROM fulltext WHERE source = ?")
            .bind(source)
            .execute(&mut *transaction)
            .await?;
        for (bucket, content) in fragments {
            sqlx::query("INSERT INTO fulltext (target, source, bucket, content) VALUES (?, ?, ?, ?)")
                .bind(target)
                .bind(source)
                .bind(bucket)
                .bind(content)
                .execute(&mut *transaction)
                .await?;
        }
        transaction.commit().await?;
        Ok(())
    }

    async fn withdraw_fulltext(&self, source: &str) -> Result<()> {
        sqlx::query("DELETE FROM fulltext WHERE source = ?")
            .bind(source)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fulltext(&self, variant_identity: &str) -> Result<FulltextBuffer> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT source, bucket, content FROM fulltext WHERE target = ? ORDER BY source, bucket",
        )
        .bind(variant_identity)
        .fetch_all(&self.pool)
        .await?;

        let mut buffer = FulltextBuffer::default();
        for (source, bucket, content) in rows {
            buffer.push_fragment(&source, &bucket, &content);
        }
        Ok(buffer)
    }
}
