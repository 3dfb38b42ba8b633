use crate::config::DatabaseConfig;
use crate::error::{DropError, Result};
use libsql::{Builder, Connection, Database};
use tracing::info;

pub struct DatabaseManager {
    db: Database,
}

impl DatabaseManager {
    /// Connects to Turso when `url` is remote (`libsql://`, `https://`), else opens a local file.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| DropError::database("LIBSQL_URL is not set"))?;

        let db = if url.starts_with("libsql://") || url.starts_with("https://") {
            let auth_token = config
                .auth_token
                .clone()
                .ok_or_else(|| DropError::database("LIBSQL_AUTH_TOKEN is not set"))?;
            info!("Connecting to Turso database at {}", url);
            Builder::new_remote(url, auth_token).build().await
        } else {
            info!("Opening local database at {}", url);
            Builder::new_local(url.trim_start_matches("file:")).build().await
        }
        .map_err(|e| DropError::database(format!("Failed to connect to database: {e}")))?;

        Ok(Self { db })
    }

    /// Get a connection to the database
    pub async fn get_connection(&self) -> Result<Connection> {
        self.db
            .connect()
            .map_err(|e| DropError::database(format!("Failed to get database connection: {e}")))
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");

        let conn = self.get_connection().await?;
        let migration_sql = include_str!("../migrations/001_initial_schema.sql");

        conn.execute_batch(migration_sql)
            .await
            .map_err(|e| DropError::database(format!("Failed to run migrations: {e}")))?;

        info!("Database migrations completed successfully");
        Ok(())
    }
}
