//! Diesel-backed outbox: a durable [`MessageStore`] over SQLite or
//! PostgreSQL.
//!
//! Mirrors `mxd::db::connection`'s backend-selection shape: exactly one of
//! `sqlite`/`postgres` must be enabled, each resolves to its own
//! [`DbConnection`]/[`DbPool`] type and its own embedded migration set, and
//! [`establish_pool`] builds a `bb8` pool via `diesel-async`.

use cfg_if::cfg_if;
use diesel::{OptionalExtension, prelude::*};
use diesel_async::{
    RunQueryDsl,
    pooled_connection::{AsyncDieselConnectionManager, PoolError, bb8::Pool},
};
#[cfg(feature = "sqlite")]
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use uuid::Uuid;

use crate::{
    errors::MessagingError,
    message::{CorrelationId, MessageId, MessageType, WireBody, WireHeader, WireMessage},
    schema::outbox,
};

cfg_if! {
    if #[cfg(all(feature = "sqlite", feature = "postgres"))] {
        compile_error!("Either feature 'sqlite' or 'postgres' must be enabled, not both");
    } else if #[cfg(feature = "sqlite")] {
        use diesel::sqlite::Sqlite;
        /// Database backend type for the outbox.
        pub type Backend = Sqlite;
        /// Embedded outbox migrations for SQLite.
        pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/sqlite");
        /// Connection type for outbox access.
        pub type DbConnection = SyncConnectionWrapper<diesel::sqlite::SqliteConnection>;
        /// Pooled connection type for outbox access.
        pub type DbPool = Pool<DbConnection>;
    } else if #[cfg(feature = "postgres")] {
        use diesel::pg::Pg;
        use diesel_async::AsyncPgConnection;
        /// Database backend type for the outbox.
        pub type Backend = Pg;
        /// Embedded outbox migrations for PostgreSQL.
        pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/postgres");
        /// Connection type for outbox access.
        pub type DbConnection = AsyncPgConnection;
        /// Pooled connection type for outbox access.
        pub type DbPool = Pool<DbConnection>;
    } else {
        compile_error!("Either feature 'sqlite' or 'postgres' must be enabled to use diesel_store");
    }
}

/// Create a pooled connection to the outbox database.
///
/// # Errors
///
/// Returns any error reported by the underlying connection pool builder.
pub async fn establish_pool(database_url: &str) -> Result<DbPool, PoolError> {
    let config = AsyncDieselConnectionManager::<DbConnection>::new(database_url);
    Pool::builder().build(config).await
}

/// Apply the embedded outbox migrations.
///
/// # Errors
///
/// Returns any error produced by Diesel while running migrations.
#[cfg(feature = "sqlite")]
pub async fn apply_migrations(conn: &mut DbConnection) -> diesel::QueryResult<()> {
    conn.spawn_blocking(|c| {
        c.run_pending_migrations(MIGRATIONS).map(|_| ()).map_err(|e| {
            diesel::result::Error::SerializationError(Box::<dyn std::error::Error + Send + Sync>::from(
                e.to_string(),
            ))
        })
    })
    .await
}

/// Apply the embedded outbox migrations.
///
/// # Errors
///
/// Returns any error produced by Diesel while running migrations.
#[cfg(all(feature = "postgres", not(feature = "sqlite")))]
pub async fn apply_migrations(database_url: &str) -> diesel::QueryResult<()> {
    use diesel::Connection;
    let url = database_url.to_owned();
    tokio::task::spawn_blocking(move || -> diesel::QueryResult<()> {
        let mut conn = diesel::pg::PgConnection::establish(&url).map_err(|e| {
            diesel::result::Error::SerializationError(Box::<dyn std::error::Error + Send + Sync>::from(
                e.to_string(),
            ))
        })?;
        conn.run_pending_migrations(MIGRATIONS).map(|_| ()).map_err(|e| {
            diesel::result::Error::SerializationError(Box::<dyn std::error::Error + Send + Sync>::from(
                e.to_string(),
            ))
        })
    })
    .await
    .map_err(|e| diesel::result::Error::SerializationError(Box::<dyn std::error::Error + Send + Sync>::from(e.to_string())))?
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = outbox, check_for_backend(Backend))]
struct OutboxRow {
    id: String,
    topic: String,
    message_type: String,
    correlation_id: Option<String>,
    reply_to: Option<String>,
    content_type: String,
    body_type: String,
    payload: Vec<u8>,
}

#[derive(Insertable)]
#[diesel(table_name = outbox)]
struct NewOutboxRow<'a> {
    id: String,
    topic: &'a str,
    message_type: &'static str,
    correlation_id: Option<String>,
    reply_to: Option<&'a str>,
    content_type: &'a str,
    body_type: &'a str,
    payload: &'a [u8],
}

impl From<OutboxRow> for WireMessage {
    fn from(row: OutboxRow) -> Self {
        let id = Uuid::parse_str(&row.id).map_or_else(|_| MessageId::new(), MessageId::from);
        let correlation_id = row
            .correlation_id
            .as_deref()
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(CorrelationId::from);
        Self::new(
            WireHeader::new(
                id,
                row.topic,
                MessageType::from_wire_str(&row.message_type),
                correlation_id,
                row.reply_to,
                row.content_type,
            ),
            WireBody::new(row.payload, row.body_type),
        )
    }
}

/// A [`crate::store::MessageStore`] backed by the `outbox` table.
pub struct DieselMessageStore {
    pool: DbPool,
}

impl DieselMessageStore {
    /// Wrap an already-established, migrated connection pool.
    #[must_use]
    pub const fn new(pool: DbPool) -> Self { Self { pool } }
}

#[async_trait::async_trait]
impl crate::store::MessageStore for DieselMessageStore {
    async fn add(&self, message: WireMessage) -> Result<(), MessagingError> {
        let mut conn = self.pool.get().await.map_err(|e| MessagingError::Store(Box::new(e)))?;
        let header = message.header();
        let new_row = NewOutboxRow {
            id: header.id().to_string(),
            topic: header.topic(),
            message_type: header.message_type().as_wire_str(),
            correlation_id: header.correlation_id().map(|c| c.to_string()),
            reply_to: header.reply_to(),
            content_type: header.content_type(),
            body_type: message.body().body_type(),
            payload: message.body().as_bytes(),
        };
        diesel::insert_into(outbox::table)
            .values(&new_row)
            .execute(&mut conn)
            .await
            .map_err(|e| MessagingError::Store(Box::new(e)))?;
        Ok(())
    }

    async fn get_message(&self, id: MessageId) -> Option<WireMessage> {
        let mut conn = self.pool.get().await.ok()?;
        let row = outbox::table
            .filter(outbox::id.eq(id.to_string()))
            .select(OutboxRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .ok()
            .flatten()?;
        Some(row.into())
    }
}
