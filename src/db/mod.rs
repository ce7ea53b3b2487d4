use anyhow::Result;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::Config;

mod clients;
mod files;
mod orders;
mod payments;
mod products;
mod projects;
mod services;
mod users;

pub use orders::{CheckoutLine, NewOrder, OrderFilter, OrderUpdate};
pub use payments::PaymentUpdate;
pub use clients::ClientChanges;
pub use files::FileChanges;
pub use products::ProductChanges;
pub use projects::ProjectChanges;
pub use services::ServiceChanges;
pub use users::{NewUser, UserChanges, UserFilter};

/// Database connection pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new Database instance with a connection pool
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(config.database_url())
            .await?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    #[cfg(test)]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(self.get_pool()).await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(self.get_pool()).await?;
        Ok(())
    }
}

/// Initialize the database connection pool
pub async fn init(config: &Config, migrate: bool) -> Result<Database> {
    let db = Database::new(config).await?;

    if migrate || config.run_migrations {
        info!("Running database migrations");
        db.migrate().await?;
    }

    Ok(db)
}
