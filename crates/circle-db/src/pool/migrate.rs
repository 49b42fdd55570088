//! Schema migrations, read from the crate's `migrations/` directory at runtime

use std::path::Path;

use sqlx::migrate::{MigrateError, Migrator};
use sqlx::PgPool;
use tracing::info;

/// Apply every pending migration
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
    let migrator = Migrator::new(dir.as_path()).await?;
    migrator.run(pool).await?;
    info!(migrations = migrator.iter().count(), "Database schema up to date");
    Ok(())
}
