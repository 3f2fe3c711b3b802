use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::database::store::{document_id, Collection, Document, DocumentStore, StorageError};
use crate::filter::{Filter, FilterData};
use crate::tenancy::Partition;

/// Administrative database used for partition discovery and creation
const ADMIN_DB_NAME: &str = "postgres";

/// Postgres identifiers longer than this are silently truncated
const MAX_IDENTIFIER_LEN: usize = 63;

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// Document store backed by one Postgres database per partition. Every
/// collection is a table of `(id TEXT, body JSONB)` rows; connection pools
/// are created lazily and cached by database name.
pub struct PgDocumentStore {
    base_url: url::Url,
    max_connections: u32,
    pools: Arc<RwLock<HashMap<String, PgPool>>>,
}

impl PgDocumentStore {
    pub fn new(config: &DatabaseConfig) -> Result<Self, StorageError> {
        let raw = config.url.as_deref().ok_or(StorageError::ConfigMissing("DATABASE_URL"))?;
        let base_url = url::Url::parse(raw).map_err(|_| StorageError::InvalidDatabaseUrl)?;
        Ok(Self {
            base_url,
            max_connections: config.max_connections,
            pools: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Get existing pool or create a new one lazily
    async fn pool(&self, database_name: &str) -> Result<PgPool, StorageError> {
        if database_name != ADMIN_DB_NAME && !is_valid_partition_name(database_name) {
            return Err(StorageError::InvalidPartitionName(database_name.to_string()));
        }

        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(database_name) {
                return Ok(pool.clone());
            }
        }

        let connection_string = self.connection_string(database_name);
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&connection_string)
            .await?;

        let mut pools = self.pools.write().await;
        // Another task may have raced us here; keep whichever pool landed first
        let pool = pools.entry(database_name.to_string()).or_insert(pool).clone();
        info!("Created database pool for: {}", database_name);
        Ok(pool)
    }

    async fn admin_pool(&self) -> Result<PgPool, StorageError> {
        self.pool(ADMIN_DB_NAME).await
    }

    async fn partition_pool(&self, partition: &Partition) -> Result<PgPool, StorageError> {
        self.pool(partition.name()).await
    }

    /// Swap the database name into the configured URL path
    fn connection_string(&self, database_name: &str) -> String {
        let mut url = self.base_url.clone();
        url.set_path(&format!("/{}", database_name));
        url.into()
    }

    async fn ensure_schema(&self, name: &str) -> Result<(), StorageError> {
        let pool = self.pool(name).await?;
        for collection in Collection::ALL {
            for statement in schema_statements(collection) {
                sqlx::query(&statement).execute(&pool).await?;
            }
        }
        debug!("Ensured collections for partition {}", name);
        Ok(())
    }

    /// Close and remove all pools (e.g., on shutdown)
    pub async fn close_all(&self) {
        let mut pools = self.pools.write().await;
        for (name, pool) in pools.drain() {
            pool.close().await;
            info!("Closed database pool: {}", name);
        }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn partition_exists(&self, name: &str) -> Result<bool, StorageError> {
        if !is_valid_partition_name(name) {
            return Ok(false);
        }
        let pool = self.admin_pool().await?;
        let row = sqlx::query("SELECT 1 FROM pg_database WHERE datname = $1")
            .bind(name)
            .fetch_optional(&pool)
            .await?;
        Ok(row.is_some())
    }

    async fn list_partitions(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let pool = self.admin_pool().await?;
        let rows = sqlx::query("SELECT datname FROM pg_database WHERE datistemplate = false ORDER BY datname")
            .fetch_all(&pool)
            .await?;
        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("datname")?;
            if name.starts_with(prefix) {
                names.push(name);
            }
        }
        Ok(names)
    }

    async fn create_partition(&self, name: &str) -> Result<(), StorageError> {
        if !is_valid_partition_name(name) {
            return Err(StorageError::InvalidPartitionName(name.to_string()));
        }
        if !self.partition_exists(name).await? {
            let admin = self.admin_pool().await?;
            let statement = format!("CREATE DATABASE {}", quote_identifier(name));
            sqlx::query(&statement).execute(&admin).await?;
            info!("Created partition database {}", name);
        }
        self.ensure_schema(name).await
    }

    async fn insert(&self, partition: &Partition, collection: Collection, document: Document)
        -> Result<(), StorageError>
    {
        let pool = self.partition_pool(partition).await?;
        let id = document_id(&document)?;
        let statement = format!("INSERT INTO {} (id, body) VALUES ($1, $2)", quote_identifier(collection.name()));
        sqlx::query(&statement)
            .bind(id)
            .bind(Json(Value::Object(document)))
            .execute(&pool)
            .await
            .map_err(map_write_error)?;
        Ok(())
    }

    async fn find(&self, partition: &Partition, collection: Collection, filter_data: FilterData)
        -> Result<Vec<Document>, StorageError>
    {
        let pool = self.partition_pool(partition).await?;
        let mut filter = Filter::new(collection.name())?;
        filter.assign(filter_data)?;
        let sql = filter.to_sql()?;

        let rows = bind_params(sqlx::query(&sql.query), &sql.params).fetch_all(&pool).await?;
        rows.iter().map(decode_body).collect()
    }

    async fn count(&self, partition: &Partition, collection: Collection, where_clause: Value)
        -> Result<u64, StorageError>
    {
        let pool = self.partition_pool(partition).await?;
        let mut filter = Filter::new(collection.name())?;
        filter.where_clause(where_clause)?;
        let sql = filter.to_count_sql()?;

        let row = bind_params(sqlx::query(&sql.query), &sql.params).fetch_one(&pool).await?;
        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }

    async fn update_many(
        &self,
        partition: &Partition,
        collection: Collection,
        where_clause: Value,
        set: Document,
    ) -> Result<u64, StorageError> {
        let pool = self.partition_pool(partition).await?;
        let mut filter = Filter::new(collection.name())?;
        filter.where_clause(where_clause)?;
        let sql = filter.to_update_sql(&set)?;

        let result = bind_params(sqlx::query(&sql.query), &sql.params)
            .execute(&pool)
            .await
            .map_err(map_write_error)?;
        Ok(result.rows_affected())
    }

    /// Locks the prior row, inserts the new version and retires the prior in
    /// one transaction.
    async fn promote_version(
        &self,
        partition: &Partition,
        collection: Collection,
        new_version: Document,
        prior_document_id: &str,
        prior_patch: Document,
    ) -> Result<(), StorageError> {
        let pool = self.partition_pool(partition).await?;
        let table = quote_identifier(collection.name());
        let new_id = document_id(&new_version)?;

        let mut tx = pool.begin().await?;

        let lock = format!(
            "SELECT id FROM {} WHERE id = $1 AND body->>'versionStatus' = 'ACTIVE' FOR UPDATE",
            table
        );
        let prior = sqlx::query(&lock).bind(prior_document_id).fetch_optional(&mut *tx).await?;
        if prior.is_none() {
            tx.rollback().await?;
            return Err(StorageError::Conflict(prior_document_id.to_string()));
        }

        let insert = format!("INSERT INTO {} (id, body) VALUES ($1, $2)", table);
        sqlx::query(&insert)
            .bind(new_id)
            .bind(Json(Value::Object(new_version)))
            .execute(&mut *tx)
            .await
            .map_err(map_write_error)?;

        let retire = format!("UPDATE {} SET body = body || $1::jsonb WHERE id = $2", table);
        sqlx::query(&retire)
            .bind(Json(Value::Object(prior_patch)))
            .bind(prior_document_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn schema_statements(collection: Collection) -> Vec<String> {
    let table = collection.name();
    let mut statements = vec![format!(
        "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, body JSONB NOT NULL)",
        quote_identifier(table)
    )];
    if matches!(collection, Collection::ConsentTemplates | Collection::Consents) {
        statements.push(format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ((body->>'logicalId'), (body->>'version'))",
            quote_identifier(&format!("{}_logical_version_key", table)),
            quote_identifier(table)
        ));
    }
    statements
}

/// Filter parameters are bound as text; the generated SQL casts them back
fn bind_params<'q>(mut query: PgQuery<'q>, params: &[Value]) -> PgQuery<'q> {
    for param in params {
        query = match param {
            Value::Null => query.bind(Option::<String>::None),
            Value::String(s) => query.bind(s.clone()),
            Value::Bool(b) => query.bind(b.to_string()),
            Value::Number(n) => query.bind(n.to_string()),
            Value::Array(_) | Value::Object(_) => query.bind(Json(param.clone())),
        };
    }
    query
}

fn decode_body(row: &PgRow) -> Result<Document, StorageError> {
    let Json(body): Json<Value> = row.try_get("body")?;
    match body {
        Value::Object(document) => Ok(document),
        other => Err(StorageError::QueryError(format!("Stored body is not an object: {}", other))),
    }
}

fn map_write_error(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(ref db) = err {
        if db.code().as_deref() == Some("23505") {
            let key = db.constraint().unwrap_or("unique").to_string();
            return StorageError::Conflict(key);
        }
    }
    StorageError::Sqlx(err)
}

/// Quote SQL identifier to prevent injection
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Partition names are tenant-derived, so only a narrow alphabet is accepted
fn is_valid_partition_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_IDENTIFIER_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
