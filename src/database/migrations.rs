//! # Schema Migrations
//!
//! The dashboard owns the schema in production. The SQL files under
//! `migrations/` describe the tables the workers read and write; they are
//! embedded at compile time and applied only when `database.run_migrations`
//! is enabled, or by `#[sqlx::test]` fixtures.
//!
//! `sqlx` serialises concurrent runs with a PostgreSQL advisory lock, so
//! both worker roles may start with migrations enabled.

use sqlx::migrate::{MigrateError, Migrator};
use sqlx::PgPool;
use tracing::info;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub struct DatabaseMigrations;

impl DatabaseMigrations {
    /// Apply every pending migration in version order
    pub async fn run_all(pool: &PgPool) -> Result<(), MigrateError> {
        info!(
            available = MIGRATOR.iter().count(),
            "Applying database migrations"
        );
        MIGRATOR.run(pool).await?;
        info!("Database migrations complete");
        Ok(())
    }
}
