use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use ssverify_core::AppError;

use crate::config::DatabaseConfig;
use crate::repository::ListingRepository;

/// Handle to the listings database.
///
/// The CLI connects once per `run`, applies `migrations/` and hands the
/// resulting [`ListingRepository`] to the poll loop as its store.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open a pool of at most `max_connections` against `config.url`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect: {e}")))?;

        tracing::debug!(max_connections = config.max_connections, "Connected to database");
        Ok(Self { pool })
    }

    /// Wrap a pool the caller already owns, e.g. one pointing at a test container.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `listings` table and its indexes if they are missing.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Store for `ad` documents and their `old_<field>` snapshots.
    pub fn listing_repo(&self) -> ListingRepository {
        ListingRepository::new(self.pool.clone())
    }
}
