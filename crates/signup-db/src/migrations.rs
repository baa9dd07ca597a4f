use tracing::info;

use crate::error::DbError;
use crate::Database;

pub const SCHEMA: &str = include_str!("../sql/schema.sql");
pub const DROP_SCHEMA: &str = include_str!("../sql/drop.sql");

impl Database {
    /// Create the `users`, `events` and `registrations` tables if missing.
    pub async fn create_schema(&self) -> Result<(), DbError> {
        self.execute_script(SCHEMA).await?;
        info!("Database schema created");
        Ok(())
    }

    pub async fn drop_schema(&self) -> Result<(), DbError> {
        self.execute_script(DROP_SCHEMA).await?;
        info!("Database schema dropped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::open_with_schema;

    #[tokio::test]
    async fn schema_is_repeatable() {
        let db = open_with_schema(1).await;
        db.create_schema().await.unwrap();

        db.drop_schema().await.unwrap();
        assert!(db.execute("SELECT id FROM users", vec![]).await.is_err());

        db.create_schema().await.unwrap();
        assert!(db.execute("SELECT id FROM users", vec![]).await.unwrap().is_empty());
    }
}
